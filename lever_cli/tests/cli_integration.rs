use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::tempdir;

// Short phases so a whole trial finishes in well under a second
fn write_quick_config(dir: &tempfile::TempDir) -> PathBuf {
    let toml = r#"
[trial]
cue_ms = 20
moving_timeout_ms = 100
timeout_hold_ms = 20
reset_hold_ms = 10
settle_ms = 20
fixed_tier = 0

[sampling]
encoder_period_ms = 1

[events]
mode = "immediate"
"#;
    let path = dir.path().join("rig.toml");
    fs::write(&path, toml).unwrap();
    path
}

#[rstest]
#[case(&["--help"], 0, "Usage:", "stdout")]
#[case(&["self-check"], 0, "self-check ok", "stdout")]
#[case(&["frame", "reset-encoder"], 0, "8014492d", "stdout")]
#[case(&["frame", "read-encoder"], 0, "8010", "stdout")]
#[case(
    &["frame", "drive", "--accel", "800", "--speed", "100", "--decel", "2000", "--position", "0", "--buffered"],
    0,
    "80410000032000000064000007d00000000001ac7e",
    "stdout"
)]
#[case(&["frame"], 2, "Usage", "stderr")]
#[case(&["run", "--trials", "1", "--subject", "idle"], 0, "TRIAL,TIMEOUT,", "stdout")]
#[case(&["run", "--trials", "1", "--subject", "idle"], 0, "session complete: 1 trials", "stderr")]
fn cli_table_cases(
    #[case] args: &[&str],
    #[case] exit_code: i32,
    #[case] needle: &str,
    #[case] stream: &str,
) {
    let dir = tempdir().unwrap();
    let cfg = write_quick_config(&dir);

    let mut cmd = Command::cargo_bin("lever_cli").unwrap();

    // Always include a valid config to avoid relying on default path
    cmd.arg("--config").arg(&cfg);
    for a in args {
        cmd.arg(a);
    }

    let assert = cmd.assert().code(exit_code);
    match stream {
        "stdout" => {
            assert.stdout(predicate::str::contains(needle));
        }
        "stderr" => {
            assert.stderr(predicate::str::contains(needle));
        }
        other => panic!("unknown stream: {other}"),
    }
}

#[test]
fn run_writes_markers_and_trial_to_telemetry_file() {
    let dir = tempdir().unwrap();
    let cfg = write_quick_config(&dir);
    let out = dir.path().join("session.csv");

    let mut cmd = Command::cargo_bin("lever_cli").unwrap();
    cmd.arg("--config")
        .arg(&cfg)
        .args(["run", "--trials", "1", "--subject", "idle", "--telemetry"])
        .arg(&out);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("TRIAL,").not());

    let text = fs::read_to_string(&out).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert!(lines[0].starts_with("EVENT,INIT,1,"), "first line: {}", lines[0]);
    let order: Vec<&str> = lines
        .iter()
        .filter_map(|l| l.strip_prefix("EVENT,"))
        .filter_map(|l| l.split(',').next())
        .collect();
    assert_eq!(order, vec!["INIT", "CUE_0", "MOVING", "TIMEOUT", "RESET"]);
    assert_eq!(lines.iter().filter(|l| l.starts_with("TRIAL,")).count(), 1);
}

#[test]
fn invalid_config_is_explained() {
    let dir = tempdir().unwrap();
    let cfg = dir.path().join("bad.toml");
    fs::write(&cfg, "[control]\nloop_hz = 0\n").unwrap();

    let mut cmd = Command::cargo_bin("lever_cli").unwrap();
    cmd.arg("--config").arg(&cfg).arg("self-check");
    cmd.assert().code(3).stderr(predicate::str::contains(
        "What happened: Invalid configuration (control.loop_hz",
    ));
}

#[test]
fn missing_config_fails_except_for_frames() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("nope.toml");

    let mut check = Command::cargo_bin("lever_cli").unwrap();
    check.arg("--config").arg(&missing).arg("self-check");
    check
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Invalid configuration"));

    let mut frame = Command::cargo_bin("lever_cli").unwrap();
    frame.arg("--config").arg(&missing).args(["frame", "pid"]);
    // SET_PID with the default homing gains: D=0, P=600 (Q10 614400).
    frame
        .assert()
        .success()
        .stdout(predicate::str::starts_with("803d0000000000096000"));
}

#[test]
fn json_errors_are_structured() {
    let dir = tempdir().unwrap();
    let cfg = dir.path().join("bad.toml");
    fs::write(&cfg, "[tiers\n").unwrap();

    let mut cmd = Command::cargo_bin("lever_cli").unwrap();
    cmd.arg("--config").arg(&cfg).arg("--json").arg("self-check");
    let out = cmd.assert().code(3).get_output().stdout.clone();
    let v: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(v["reason"], "Config");
    assert_eq!(v["exit_code"], 3);
    assert!(v["message"].as_str().unwrap().contains("What happened"));
}

#[test]
fn json_run_ends_with_summary() {
    let dir = tempdir().unwrap();
    let cfg = write_quick_config(&dir);

    let mut cmd = Command::cargo_bin("lever_cli").unwrap();
    cmd.arg("--config")
        .arg(&cfg)
        .args(["--json", "run", "--trials", "2", "--subject", "idle"]);
    let out = cmd.assert().success().get_output().stdout.clone();
    let text = String::from_utf8(out).unwrap();
    let last = text.lines().last().unwrap();
    let v: serde_json::Value = serde_json::from_str(last).unwrap();
    assert_eq!(v["trials"], 2);
    assert_eq!(v["timeouts"], 2);
    assert_eq!(v["dropped_markers"], 0);
}

#[test]
fn tuning_from_stdin_is_accepted() {
    let dir = tempdir().unwrap();
    let cfg = write_quick_config(&dir);

    let mut cmd = assert_cmd::Command::cargo_bin("lever_cli").unwrap();
    cmd.arg("--config")
        .arg(&cfg)
        .args(["run", "--trials", "1", "--subject", "idle", "--tune-stdin"])
        .write_stdin("SET_KP_0.3\nBOGUS\nSET_DEADZONE_4\n");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("TRIAL,TIMEOUT,"));
}
