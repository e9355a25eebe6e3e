//! Rig assembly and session execution for `lever run`.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use eyre::WrapErr;
use lever_core::telemetry::{FileSink, StdoutSink, TelemetrySink};
use lever_core::{Rig, SessionReport, TuningReader, run_session};
use lever_traits::clock::{Clock, MonotonicClock};

use crate::cli::{RtLock, RunArgs, SimSubject};
use crate::rt::setup_rt_once;

/// Subject pulling toward negative counts for 800 ms every 2 s.
#[cfg_attr(all(feature = "hardware", target_os = "linux"), allow(dead_code))]
pub const PULLER: lever_hardware::SubjectModel = lever_hardware::SubjectModel::Periodic {
    period_ms: 2_000,
    pull_ms: 800,
    offset_ms: 700,
    force: -2_000.0,
};

#[cfg_attr(all(feature = "hardware", target_os = "linux"), allow(dead_code))]
fn subject_model(subject: SimSubject) -> lever_hardware::SubjectModel {
    match subject {
        SimSubject::Idle => lever_hardware::SubjectModel::Idle,
        SimSubject::Puller => PULLER,
    }
}

fn open_telemetry(
    args: &RunArgs,
    cfg: &lever_config::Config,
) -> eyre::Result<Box<dyn TelemetrySink>> {
    let path = args
        .telemetry
        .clone()
        .or_else(|| cfg.logging.telemetry_file.as_ref().map(Into::into));
    match path {
        Some(p) => {
            let sink = FileSink::open(&p)
                .wrap_err_with(|| format!("open telemetry file {}", p.display()))?;
            tracing::info!(path = %p.display(), "telemetry to file");
            Ok(Box::new(sink))
        }
        None => Ok(Box::new(StdoutSink)),
    }
}

#[cfg_attr(all(feature = "hardware", target_os = "linux"), allow(dead_code))]
pub fn simulated_rig(
    cfg: &lever_config::Config,
    clock: Arc<dyn Clock + Send + Sync>,
    subject: SimSubject,
    telemetry: Box<dyn TelemetrySink>,
) -> Rig {
    use lever_hardware::{
        RecordingDac, RecordingDigitalOutput, RecordingPulseOutput, SimulatedCue, SimulatedLever,
    };

    let lever = SimulatedLever::new(clock, subject_model(subject));
    let link = cfg.protocol.enabled.then(|| {
        Box::new(lever_core::mocks::SimulatedBoard::new())
            as Box<dyn lever_traits::SerialLink + Send>
    });
    Rig {
        source: Box::new(lever_core::PositionTracker::new(lever.counter())),
        actuator: Box::new(lever.actuator()),
        pulse_out: Box::new(RecordingPulseOutput::new()),
        reward_out: Box::new(RecordingDigitalOutput::new()),
        cue: Box::new(SimulatedCue::new()),
        dac: Some(Box::new(RecordingDac::new())),
        link,
        telemetry,
    }
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub fn hardware_rig(
    cfg: &lever_config::Config,
    telemetry: Box<dyn TelemetrySink>,
) -> eyre::Result<Rig> {
    use lever_hardware::gpio::{GpioLine, GpioPulse, GpioQuadrature, Mcp4725, PwmMotor, PwmTone};
    use lever_hardware::serial::SerialPortLink;
    use std::time::Duration;

    let p = &cfg.pins;
    let counter =
        GpioQuadrature::new(p.encoder_a, p.encoder_b).wrap_err("open encoder pins")?;
    let motor =
        PwmMotor::new(p.motor_pwm, p.motor_dir, cfg.control.pwm_hz).wrap_err("open motor pins")?;
    let pulse_out =
        GpioPulse::new(p.event_out, cfg.events.resolution_hz).wrap_err("open event pin")?;
    let reward_out = GpioLine::new(p.reward_out).wrap_err("open reward pin")?;
    let cue = PwmTone::new(p.buzzer).wrap_err("open buzzer pin")?;

    // The analog mirror is auxiliary; run without it rather than refuse to start.
    let dac: Option<Box<dyn lever_traits::Dac + Send>> = if cfg.analog.enabled {
        match Mcp4725::new() {
            Ok(d) => Some(Box::new(d)),
            Err(e) => {
                tracing::warn!(error = %e, "MCP4725 unavailable; analog mirror disabled");
                None
            }
        }
    } else {
        None
    };

    let link: Option<Box<dyn lever_traits::SerialLink + Send>> = if cfg.protocol.enabled {
        let port = SerialPortLink::open(
            &cfg.protocol.port,
            cfg.protocol.baud,
            Duration::from_millis(cfg.protocol.read_timeout_ms),
        )
        .wrap_err_with(|| format!("open motor board on {}", cfg.protocol.port))?;
        Some(Box::new(port))
    } else {
        None
    };

    Ok(Rig {
        source: Box::new(lever_core::PositionTracker::new(counter)),
        actuator: Box::new(motor),
        pulse_out: Box::new(pulse_out),
        reward_out: Box::new(reward_out),
        cue: Box::new(cue),
        dac,
        link,
        telemetry,
    })
}

/// Assemble the rig, apply real-time settings and run until done or `shutdown`.
pub fn run(
    cfg: &lever_config::Config,
    args: &RunArgs,
    shutdown: Arc<AtomicBool>,
) -> eyre::Result<SessionReport> {
    let mut cfg = cfg.clone();
    if let Some(n) = args.trials {
        cfg.trial.max_trials = n;
    }

    let telemetry = open_telemetry(args, &cfg)?;
    let clock: Arc<dyn Clock + Send + Sync> = Arc::new(MonotonicClock::new());

    #[cfg(all(feature = "hardware", target_os = "linux"))]
    let rig = {
        let _ = args.subject;
        hardware_rig(&cfg, telemetry)?
    };
    #[cfg(not(all(feature = "hardware", target_os = "linux")))]
    let rig = simulated_rig(&cfg, clock.clone(), args.subject, telemetry);

    setup_rt_once(
        args.rt,
        args.rt_prio,
        args.rt_lock.unwrap_or(RtLock::os_default()),
        args.rt_cpu,
    );

    let tuning = args
        .tune_stdin
        .then(|| TuningReader::spawn(std::io::BufReader::new(std::io::stdin())));

    tracing::info!(
        max_trials = cfg.trial.max_trials,
        loop_hz = cfg.control.loop_hz,
        markers = ?cfg.events.mode,
        board = cfg.protocol.enabled,
        "session start"
    );
    let report = run_session(rig, &cfg, clock, tuning, shutdown)?;
    tracing::info!(
        trials = report.stats.total,
        correct = report.stats.correct,
        timeouts = report.stats.timeouts,
        aborts = report.stats.aborts,
        ticks = report.ticks,
        max_latency_us = report.max_latency_us,
        missed_deadlines = report.missed_deadlines,
        dropped_markers = report.dropped_markers,
        "session complete"
    );
    Ok(report)
}

/// One-line human summary; telemetry owns stdout so this goes to stderr.
pub fn summary_line(report: &SessionReport) -> String {
    format!(
        "session complete: {} trials ({} correct, {} timeouts, {} aborted), {} missed deadlines",
        report.stats.total,
        report.stats.correct,
        report.stats.timeouts,
        report.stats.aborts,
        report.missed_deadlines
    )
}

pub fn summary_json(report: &SessionReport) -> String {
    serde_json::json!({
        "trials": report.stats.total,
        "correct": report.stats.correct,
        "timeouts": report.stats.timeouts,
        "aborts": report.stats.aborts,
        "ticks": report.ticks,
        "max_latency_us": report.max_latency_us,
        "missed_deadlines": report.missed_deadlines,
        "dropped_markers": report.dropped_markers,
        "samples": report.samples,
        "sample_errors": report.sample_errors,
    })
    .to_string()
}
