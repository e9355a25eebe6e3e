//! `self-check` and `frame`: exercise the devices without running trials.

use std::sync::Arc;
use std::time::Duration;

use lever_core::analog::dac_code;
use lever_core::event::{EventCode, EventPulseTable, ImmediateEmitter};
use lever_core::mocks::SimulatedBoard;
use lever_core::protocol::{HomingProfile, MotorBoard};
use lever_core::{BoardParams, PositionSource, PositionTracker};
use lever_hardware::dac::mcp4725_packet;
use lever_hardware::{RecordingPulseOutput, SimulatedLever, SubjectModel};
use lever_traits::Actuator;
use lever_traits::clock::ManualClock;

use crate::cli::FrameCmd;

fn hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut s, b| {
        let _ = write!(s, "{b:02x}");
        s
    })
}

/// Frames `cmd` would put on the wire, one hex string per frame.
pub fn frame_hex(cfg: &lever_config::Config, cmd: &FrameCmd) -> eyre::Result<Vec<String>> {
    let board = SimulatedBoard::new();
    let mut drv = MotorBoard::new(
        board.clone(),
        Duration::from_millis(cfg.protocol.read_timeout_ms),
    );
    match *cmd {
        FrameCmd::Drive {
            accel,
            speed,
            decel,
            position,
            buffered,
        } => {
            if buffered {
                drv.set_position(accel, speed, decel, position, true)?;
            } else {
                drv.drive_m1(accel, speed, decel, position)?;
            }
        }
        FrameCmd::ResetEncoder => drv.reset_encoder_counter()?,
        FrameCmd::ReadEncoder => {
            drv.read_encoder_value();
        }
        FrameCmd::Pid => drv.update_pid(&(&cfg.protocol.homing).into())?,
    }
    Ok(board.frames().iter().map(|f| hex(f)).collect())
}

fn check_lever() -> eyre::Result<i32> {
    let clock = ManualClock::new();
    let lever = SimulatedLever::new(Arc::new(clock.clone()), SubjectModel::Idle);
    let mut tracker = PositionTracker::new(lever.counter());
    let mut actuator = lever.actuator();
    actuator
        .apply(50.0)
        .map_err(|e| eyre::eyre!("simulated actuator: {e}"))?;
    clock.advance_ms(200);
    let moved = tracker.read_position()?;
    actuator
        .stop()
        .map_err(|e| eyre::eyre!("simulated actuator: {e}"))?;
    if moved <= 0 {
        eyre::bail!("simulated lever did not follow the actuator (position {moved})");
    }
    Ok(moved)
}

fn check_board(cfg: &lever_config::Config) -> eyre::Result<()> {
    let board = SimulatedBoard::new();
    board.set_position(123);
    let mut drv = MotorBoard::new(board, Duration::from_millis(cfg.protocol.read_timeout_ms));
    drv.reset_encoder_counter()?;
    let params = BoardParams::from(cfg);
    let profile: &HomingProfile = &params.homing;
    drv.home(profile)?;
    let readback = drv.read_pid()?;
    if (readback.p - profile.pid.p).abs() > 1.0 / 1024.0
        || readback.deadzone != profile.pid.deadzone
    {
        eyre::bail!("board PID read-back mismatch: sent {:?}, read {readback:?}", profile.pid);
    }
    let reading = drv.read_encoder_value();
    if reading.stale || reading.position != profile.home {
        eyre::bail!(
            "board did not home: position {} (stale: {}), expected {}",
            reading.position,
            reading.stale,
            profile.home
        );
    }
    Ok(())
}

fn check_markers(cfg: &lever_config::Config) -> eyre::Result<()> {
    let out = RecordingPulseOutput::new();
    let mut emitter = ImmediateEmitter::new(out.clone(), EventPulseTable::from(&cfg.events));
    for code in EventCode::ALL {
        emitter.emit(code)?;
    }
    let mut widths: Vec<u32> = out.pulses().iter().map(|&(high, _)| high).collect();
    widths.sort_unstable();
    widths.dedup();
    if widths.len() != EventCode::ALL.len() {
        eyre::bail!(
            "marker widths collide at events.resolution_hz = {}",
            cfg.events.resolution_hz
        );
    }
    Ok(())
}

/// Validate the devices the session would use. The simulated set is always
/// checked; hardware builds also open the real pins.
pub fn self_check(cfg: &lever_config::Config) -> eyre::Result<Vec<String>> {
    let mut report = Vec::new();

    let moved = check_lever()?;
    report.push(format!("lever: ok (moved {moved} counts)"));

    check_board(cfg)?;
    report.push("motor board protocol: ok".into());

    check_markers(cfg)?;
    report.push(format!("markers: ok ({} distinct widths)", EventCode::ALL.len()));

    let mid = dac_code(0, cfg.analog.range);
    report.push(format!(
        "analog mirror: ok (rest code {mid}, packet {})",
        hex(&mcp4725_packet(mid))
    ));

    #[cfg(all(feature = "hardware", target_os = "linux"))]
    {
        let telemetry: Box<dyn lever_core::TelemetrySink> =
            Box::new(lever_core::telemetry::MemorySink::new());
        let mut rig = crate::session::hardware_rig(cfg, telemetry)?;
        rig.actuator
            .stop()
            .map_err(|e| eyre::eyre!("motor stop: {e}"))?;
        report.push("hardware: ok".into());
    }

    for line in &report {
        tracing::info!("{line}");
    }
    Ok(report)
}
