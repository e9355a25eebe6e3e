//! Simulated rig: a lever plant driven by the motor and an optional subject,
//! plus recording stand-ins for the marker, reward, DAC and cue outputs.
//!
//! All handles share state through `Arc<Mutex<_>>` so the sampler thread,
//! the orchestrator and tests can each hold their own piece.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use lever_traits::{
    Actuator, BoxError, Clock, CuePresenter, Dac, DigitalOutput, PulseCounter, PulseOutput,
};

/// How the simulated animal acts on the lever.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SubjectModel {
    /// Never touches the lever.
    Idle,
    /// Pulls with a constant force (counts/s^2, signed) for `pull_ms` out of
    /// every `period_ms`, starting `offset_ms` after the plant is created.
    Periodic {
        period_ms: u64,
        pull_ms: u64,
        offset_ms: u64,
        force: f64,
    },
}

impl SubjectModel {
    fn force_at(&self, since_start_ms: u64) -> f64 {
        match *self {
            SubjectModel::Idle => 0.0,
            SubjectModel::Periodic {
                period_ms,
                pull_ms,
                offset_ms,
                force,
            } => {
                if since_start_ms < offset_ms || period_ms == 0 {
                    return 0.0;
                }
                if (since_start_ms - offset_ms) % period_ms < pull_ms {
                    force
                } else {
                    0.0
                }
            }
        }
    }
}

/// Point-mass lever with viscous friction.
#[derive(Debug)]
struct LeverPlant {
    position: f64,
    velocity: f64,
    effort: f32,
    subject: SubjectModel,
    started: Instant,
    last: Instant,
    /// counts/s^2 per unit of effort
    motor_gain: f64,
    /// 1/s
    friction: f64,
}

const MAX_SUBSTEP_S: f64 = 0.001;

impl LeverPlant {
    fn advance(&mut self, now: Instant) {
        let mut dt = now.saturating_duration_since(self.last).as_secs_f64();
        let mut t = self.last;
        self.last = now;
        while dt > 0.0 {
            let h = dt.min(MAX_SUBSTEP_S);
            let since_ms = u64::try_from(t.saturating_duration_since(self.started).as_millis())
                .unwrap_or(u64::MAX);
            let accel = self.motor_gain * f64::from(self.effort) + self.subject.force_at(since_ms)
                - self.friction * self.velocity;
            self.velocity += accel * h;
            self.position += self.velocity * h;
            t += std::time::Duration::from_secs_f64(h);
            dt -= h;
        }
    }
}

/// Simulated lever; hand out `counter()` and `actuator()` to the rig.
#[derive(Clone)]
pub struct SimulatedLever {
    plant: Arc<Mutex<LeverPlant>>,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl core::fmt::Debug for SimulatedLever {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SimulatedLever")
            .field("position", &self.position())
            .finish()
    }
}

impl SimulatedLever {
    pub fn new(clock: Arc<dyn Clock + Send + Sync>, subject: SubjectModel) -> Self {
        let now = clock.now();
        Self {
            plant: Arc::new(Mutex::new(LeverPlant {
                position: 0.0,
                velocity: 0.0,
                effort: 0.0,
                subject,
                started: now,
                last: now,
                motor_gain: 60.0,
                friction: 12.0,
            })),
            clock,
        }
    }

    pub fn counter(&self) -> SimulatedCounter {
        SimulatedCounter {
            lever: self.clone(),
        }
    }

    pub fn actuator(&self) -> SimulatedActuator {
        SimulatedActuator {
            lever: self.clone(),
        }
    }

    /// Current position in counts after integrating up to now.
    pub fn position(&self) -> f64 {
        let now = self.clock.now();
        match self.plant.lock() {
            Ok(mut p) => {
                p.advance(now);
                p.position
            }
            Err(_) => 0.0,
        }
    }

    /// Teleport the lever (tests, or manual displacement in the sim).
    pub fn set_position(&self, counts: f64) {
        let now = self.clock.now();
        if let Ok(mut p) = self.plant.lock() {
            p.advance(now);
            p.position = counts;
            p.velocity = 0.0;
        }
    }

    pub fn effort(&self) -> f32 {
        self.plant.lock().map(|p| p.effort).unwrap_or(0.0)
    }

    fn set_effort(&self, effort: f32) {
        let now = self.clock.now();
        if let Ok(mut p) = self.plant.lock() {
            p.advance(now);
            p.effort = effort.clamp(-100.0, 100.0);
        }
    }
}

/// 16-bit wrapping view of the plant position, like the hardware counter.
#[derive(Debug, Clone)]
pub struct SimulatedCounter {
    lever: SimulatedLever,
}

impl PulseCounter for SimulatedCounter {
    fn count(&mut self) -> i16 {
        // Truncation to 16 bits is the wraparound the real register shows.
        (self.lever.position().round() as i64) as i16
    }
}

#[derive(Debug, Clone)]
pub struct SimulatedActuator {
    lever: SimulatedLever,
}

impl Actuator for SimulatedActuator {
    fn apply(&mut self, effort: f32) -> Result<(), BoxError> {
        self.lever.set_effort(effort);
        Ok(())
    }
    fn stop(&mut self) -> Result<(), BoxError> {
        self.lever.set_effort(0.0);
        Ok(())
    }
}

/// Records every emitted marker as `(high_ticks, low_ticks)`.
#[derive(Debug, Clone, Default)]
pub struct RecordingPulseOutput {
    pulses: Arc<Mutex<Vec<(u32, u32)>>>,
}

impl RecordingPulseOutput {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn pulses(&self) -> Vec<(u32, u32)> {
        self.pulses.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

impl PulseOutput for RecordingPulseOutput {
    fn emit(&mut self, high_ticks: u32, low_ticks: u32) -> Result<(), BoxError> {
        tracing::trace!(high_ticks, low_ticks, "sim marker pulse");
        if let Ok(mut v) = self.pulses.lock() {
            v.push((high_ticks, low_ticks));
        }
        Ok(())
    }
}

/// Records every level written to the line.
#[derive(Debug, Clone, Default)]
pub struct RecordingDigitalOutput {
    levels: Arc<Mutex<Vec<bool>>>,
}

impl RecordingDigitalOutput {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn levels(&self) -> Vec<bool> {
        self.levels.lock().map(|v| v.clone()).unwrap_or_default()
    }
    pub fn level(&self) -> bool {
        self.levels().last().copied().unwrap_or(false)
    }
}

impl DigitalOutput for RecordingDigitalOutput {
    fn set_level(&mut self, high: bool) -> Result<(), BoxError> {
        if let Ok(mut v) = self.levels.lock() {
            v.push(high);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecordingDac {
    codes: Arc<Mutex<Vec<u16>>>,
}

impl RecordingDac {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn codes(&self) -> Vec<u16> {
        self.codes.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

impl Dac for RecordingDac {
    fn write_code(&mut self, code: u16) -> Result<(), BoxError> {
        if let Ok(mut v) = self.codes.lock() {
            v.push(code);
        }
        Ok(())
    }
}

/// Cue presenter that records `Some(hz)` on start and `None` on stop.
#[derive(Debug, Clone, Default)]
pub struct SimulatedCue {
    events: Arc<Mutex<Vec<Option<u32>>>>,
}

impl SimulatedCue {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn events(&self) -> Vec<Option<u32>> {
        self.events.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

impl CuePresenter for SimulatedCue {
    fn start(&mut self, freq_hz: u32) -> Result<(), BoxError> {
        tracing::debug!(freq_hz, "sim tone on");
        if let Ok(mut v) = self.events.lock() {
            v.push(Some(freq_hz));
        }
        Ok(())
    }
    fn stop(&mut self) -> Result<(), BoxError> {
        tracing::debug!("sim tone off");
        if let Ok(mut v) = self.events.lock() {
            v.push(None);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lever_traits::ManualClock;

    #[test]
    fn idle_lever_stays_put() {
        let clock = ManualClock::new();
        let lever = SimulatedLever::new(Arc::new(clock.clone()), SubjectModel::Idle);
        let mut counter = lever.counter();
        clock.advance_ms(500);
        assert_eq!(counter.count(), 0);
    }

    #[test]
    fn positive_effort_moves_lever_forward() {
        let clock = ManualClock::new();
        let lever = SimulatedLever::new(Arc::new(clock.clone()), SubjectModel::Idle);
        let mut act = lever.actuator();
        act.apply(50.0).unwrap();
        clock.advance_ms(200);
        assert!(lever.position() > 10.0);
        act.stop().unwrap();
        assert_eq!(lever.effort(), 0.0);
    }

    #[test]
    fn counter_wraps_like_a_16_bit_register() {
        let clock = ManualClock::new();
        let lever = SimulatedLever::new(Arc::new(clock), SubjectModel::Idle);
        lever.set_position(32_768.0);
        assert_eq!(lever.counter().count(), i16::MIN);
    }

    #[test]
    fn periodic_subject_pulls_only_inside_window() {
        let s = SubjectModel::Periodic {
            period_ms: 1000,
            pull_ms: 200,
            offset_ms: 100,
            force: -500.0,
        };
        assert_eq!(s.force_at(50), 0.0);
        assert_eq!(s.force_at(150), -500.0);
        assert_eq!(s.force_at(350), 0.0);
        assert_eq!(s.force_at(1150), -500.0);
    }
}
