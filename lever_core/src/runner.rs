//! Session runner: wires the threads together and drives the trial loop.
//!
//! Threads:
//! - sampler: sole writer of the shared position snapshot
//! - event consumer (queued marker mode): owns the pulse generator
//! - tuning reader (optional): forwards operator commands
//! - caller's thread: the fixed-rate orchestrator loop

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use lever_traits::clock::Clock;
use lever_traits::{Actuator, CuePresenter, Dac, DigitalOutput, PulseOutput, SerialLink};

use crate::analog::AnalogMirror;
use crate::config::TrialConfig;
use crate::encoder::PositionSource;
use crate::error::Result;
use crate::event::{
    EventConsumer, EventPulseTable, EventSender, ImmediateEmitter, Marker, event_queue,
};
use crate::protocol::MotorBoard;
use crate::sampler::Sampler;
use crate::shared::SharedState;
use crate::status::TrialStatus;
use crate::telemetry::TelemetrySink;
use crate::trial::{SessionStats, TrialController};
use crate::tuning::TuningReader;

/// The devices one session runs against.
pub struct Rig {
    pub source: Box<dyn PositionSource + Send>,
    pub actuator: Box<dyn Actuator + Send>,
    pub pulse_out: Box<dyn PulseOutput + Send>,
    pub reward_out: Box<dyn DigitalOutput + Send>,
    pub cue: Box<dyn CuePresenter + Send>,
    pub dac: Option<Box<dyn Dac + Send>>,
    /// Motor-board link; used only when `protocol.enabled`
    pub link: Option<Box<dyn SerialLink + Send>>,
    pub telemetry: Box<dyn TelemetrySink>,
}

impl core::fmt::Debug for Rig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Rig")
            .field("dac", &self.dac.is_some())
            .field("link", &self.link.is_some())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionReport {
    pub stats: SessionStats,
    pub ticks: u64,
    /// Worst single orchestrator step
    pub max_latency_us: u64,
    /// Ticks that started after their deadline
    pub missed_deadlines: u64,
    pub dropped_markers: u64,
    pub samples: u64,
    pub sample_errors: u64,
}

/// Run trials until `max_trials` complete or `shutdown` is raised.
///
/// The actuator is stopped before returning, on success or error.
pub fn run_session(
    rig: Rig,
    config: &lever_config::Config,
    clock: Arc<dyn Clock + Send + Sync>,
    tuning: Option<TuningReader>,
    shutdown: Arc<AtomicBool>,
) -> Result<SessionReport> {
    let Rig {
        source,
        actuator,
        pulse_out,
        reward_out,
        cue,
        dac,
        link,
        telemetry,
    } = rig;
    let trial_cfg = TrialConfig::from(config);
    let shared = Arc::new(SharedState::new());

    // Markers: queued through the consumer thread, or straight from the loop.
    let emitter = ImmediateEmitter::new(pulse_out, EventPulseTable::from(&config.events));
    let (marker, consumer, sender) = match config.events.mode {
        lever_config::MarkerMode::Queued => {
            let (tx, rx) = event_queue(config.events.queue_capacity);
            let consumer = EventConsumer::spawn(rx, emitter, config.events.rt_priority);
            let marker: Box<dyn Marker + Send> = Box::new(tx.clone());
            (marker, Some(consumer), Some(tx))
        }
        lever_config::MarkerMode::Immediate => {
            let marker: Box<dyn Marker + Send> = Box::new(emitter);
            (marker, None, None)
        }
    };

    let analog = match dac {
        Some(dac) if config.analog.enabled => Some(AnalogMirror::new(dac, config.analog.range)),
        _ => None,
    };
    let sampler = Sampler::spawn(
        source,
        Duration::from_millis(config.sampling.encoder_period_ms),
        clock.clone(),
        shared.clone(),
        analog,
    );

    let mut builder = TrialController::builder()
        .with_actuator(actuator)
        .with_config(trial_cfg)
        .with_reward_output(reward_out)
        .with_cue(cue)
        .with_telemetry(telemetry)
        .with_shared(shared.clone())
        .with_clock(clock.clone());
    if config.protocol.enabled
        && let Some(link) = link
    {
        let mut board = MotorBoard::new(
            link,
            Duration::from_millis(config.protocol.read_timeout_ms),
        );
        if let Err(e) = board.reset_encoder_counter() {
            tracing::warn!(error = %e, "board encoder reset failed");
        }
        builder = builder.with_motor_board(board);
    }
    let mut ctrl = builder.with_marker(marker).build()?;

    let result = drive(&mut ctrl, config, clock.as_ref(), tuning.as_ref(), &shutdown);
    ctrl.shutdown();

    let dropped_markers = sender.as_ref().map_or(0, EventSender::dropped);
    let samples = sampler.samples();
    let sample_errors = sampler.errors();
    drop(sampler);
    drop(ctrl);
    drop(sender);
    if let Some(c) = consumer {
        tracing::debug!(emitted = c.emitted(), "event consumer stopping");
    }

    let mut report = result?;
    report.dropped_markers = dropped_markers;
    report.samples = samples;
    report.sample_errors = sample_errors;
    tracing::info!(
        trials = report.stats.total,
        correct = report.stats.correct,
        timeouts = report.stats.timeouts,
        aborts = report.stats.aborts,
        ticks = report.ticks,
        max_latency_us = report.max_latency_us,
        missed = report.missed_deadlines,
        dropped_markers,
        "session finished"
    );
    Ok(report)
}

/// Fixed-rate orchestrator loop.
fn drive(
    ctrl: &mut TrialController,
    config: &lever_config::Config,
    clock: &(dyn Clock + Send + Sync),
    tuning: Option<&TuningReader>,
    shutdown: &AtomicBool,
) -> Result<SessionReport> {
    let period = Duration::from_micros(crate::util::period_us(config.control.loop_hz));
    let status_every = Duration::from_millis(config.sampling.status_period_ms.max(1));
    let max_trials = config.trial.max_trials;
    let mut report = SessionReport::default();
    let mut completed: u32 = 0;

    ctrl.begin();
    let mut next = clock.now();
    let mut last_status = next;
    while !shutdown.load(Ordering::Relaxed) {
        if let Some(reader) = tuning {
            for cmd in reader.drain() {
                if let TrialStatus::Aborted(e) = ctrl.apply_tuning(cmd) {
                    tracing::debug!(error = %e, "operator reset");
                }
            }
        }

        let started = clock.now();
        let status = ctrl.step_shared()?;
        let took = clock.now().saturating_duration_since(started);
        report.ticks += 1;
        report.max_latency_us = report
            .max_latency_us
            .max(u64::try_from(took.as_micros()).unwrap_or(u64::MAX));

        match status {
            TrialStatus::Running => {}
            TrialStatus::Completed(record) => {
                completed += 1;
                tracing::debug!(trial = record.trial_number, completed, "trial reported");
                if max_trials > 0 && completed >= max_trials {
                    break;
                }
            }
            TrialStatus::Aborted(e) => tracing::debug!(error = %e, "trial heading to reset"),
        }

        let now = clock.now();
        if now.saturating_duration_since(last_status) >= status_every {
            last_status = now;
            tracing::debug!(
                phase = ctrl.phase().name(),
                position = ctrl.last_position(),
                trial = ctrl.stats().trial_number,
                paused = ctrl.is_paused(),
                "status"
            );
        }

        next += period;
        if now > next {
            report.missed_deadlines += 1;
            next = now;
        } else {
            clock.sleep(next.saturating_duration_since(now));
        }
    }
    report.stats = ctrl.stats();
    Ok(report)
}
