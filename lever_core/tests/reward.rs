use lever_core::RewardSequencer;
use lever_hardware::RecordingDigitalOutput;
use rstest::rstest;

const HALF: u64 = 500;

/// Drive the sequencer in 2 ms steps until it goes idle.
fn run_out(r: &mut RewardSequencer<RecordingDigitalOutput>, start_ms: u64) -> u64 {
    let mut now = start_ms;
    while r.is_active() {
        now += 2;
        r.update(now);
        assert!(now < start_ms + 60_000, "sequencer never finished");
    }
    now
}

#[rstest]
#[case(1)]
#[case(2)]
#[case(3)]
fn n_pulses_toggle_2n_times(#[case] n: u32) {
    let line = RecordingDigitalOutput::new();
    let mut r = RewardSequencer::new(line.clone(), HALF);
    r.start(n, 100);
    let done = run_out(&mut r, 100);

    let levels = line.levels();
    // Initial high plus one write per phase.
    assert_eq!(levels.len() as u32, 1 + 2 * n);
    assert_eq!(levels.iter().filter(|l| **l).count() as u32, n);
    assert!(!line.level());
    assert_eq!(done, 100 + 2 * u64::from(n) * HALF);
}

#[test]
fn late_update_advances_only_one_phase() {
    let line = RecordingDigitalOutput::new();
    let mut r = RewardSequencer::new(line.clone(), HALF);
    r.start(3, 0);
    // Far past several boundaries; still only one step.
    assert_eq!(r.update(5_000), Some(false));
    assert_eq!(r.sequence().phases_remaining, 5);
    assert_eq!(r.update(5_499), None);
    assert_eq!(r.update(5_500), Some(true));
}

#[test]
fn restart_after_completion_reuses_line() {
    let line = RecordingDigitalOutput::new();
    let mut r = RewardSequencer::new(line.clone(), HALF);
    r.start(1, 0);
    run_out(&mut r, 0);
    r.start(1, 2_000);
    assert!(r.is_active());
    assert!(line.level());
    run_out(&mut r, 2_000);
    assert_eq!(line.levels(), vec![true, false, true, false]);
}

#[test]
fn abort_mid_low_phase_keeps_line_low() {
    let line = RecordingDigitalOutput::new();
    let mut r = RewardSequencer::new(line.clone(), HALF);
    r.start(2, 0);
    r.update(500);
    r.abort();
    assert!(!r.is_active());
    assert_eq!(line.levels(), vec![true, false, false]);
    // Idle abort writes nothing more.
    r.abort();
    assert_eq!(line.levels().len(), 3);
}
