#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the lever rig.
//!
//! Every section has defaults matching the tiered-reward task, so an empty
//! file is a valid configuration. `Config::validate` rejects values the
//! orchestrator cannot run safely with.
use serde::Deserialize;

/// Highest tier count the event table can mark (CUE_0..3 / REWARD_0..3).
pub const MAX_TIERS: usize = 4;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Pins {
    pub encoder_a: u8,
    pub encoder_b: u8,
    pub motor_pwm: u8,
    pub motor_dir: u8,
    pub event_out: u8,
    pub reward_out: u8,
    pub buzzer: u8,
}

impl Default for Pins {
    fn default() -> Self {
        Self {
            encoder_a: 17,
            encoder_b: 27,
            motor_pwm: 18,
            motor_dir: 23,
            event_out: 4,
            reward_out: 5,
            buzzer: 12,
        }
    }
}

/// PID law and control-loop cadence.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ControlCfg {
    /// Orchestrator/control loop rate
    pub loop_hz: u32,
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    /// Counts around the target where the PID brakes to zero
    pub deadzone: i32,
    /// Motor PWM carrier (hardware backend only)
    pub pwm_hz: f64,
}

impl Default for ControlCfg {
    fn default() -> Self {
        Self {
            loop_hz: 500,
            kp: 0.21,
            ki: 0.001,
            kd: 0.003,
            deadzone: 5,
            pwm_hz: 20_000.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ViscousCfg {
    /// Velocity low-pass time constant (s)
    pub tau_s: f32,
}

impl Default for ViscousCfg {
    fn default() -> Self {
        Self { tau_s: 0.02 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RampCfg {
    /// Setpoint the ramp drives toward (counts)
    pub target: i32,
    pub rate_cps: f32,
    /// Delay after entering Moving before the ramp starts (ms)
    pub delay_ms: u64,
}

impl Default for RampCfg {
    fn default() -> Self {
        Self {
            target: 50,
            rate_cps: 80.0,
            delay_ms: 100,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MovingLaw {
    /// Lever is free; actuator held at zero
    None,
    /// Viscous field with the tier's damping
    #[default]
    Viscous,
    /// Ramped PID toward `ramp.target`
    Ramp,
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Crossing {
    /// Success when position < threshold
    #[default]
    Below,
    /// Success when position >= threshold
    Above,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TrialCfg {
    pub cue_ms: u64,
    /// Crossing must persist this long to count
    pub reward_hold_ms: u64,
    pub moving_timeout_ms: u64,
    pub timeout_hold_ms: u64,
    pub home: i32,
    pub reset_tolerance: i32,
    pub reset_hold_ms: u64,
    /// Pause after the trial line before the next Init
    pub settle_ms: u64,
    pub moving_law: MovingLaw,
    pub crossing: Crossing,
    /// Pin every trial to one tier instead of drawing at random
    pub fixed_tier: Option<u8>,
    /// Seed for tier selection; 0 seeds from the wall clock
    pub seed: u64,
    /// Stop after this many trials (0 = run until interrupted)
    pub max_trials: u32,
}

impl Default for TrialCfg {
    fn default() -> Self {
        Self {
            cue_ms: 500,
            reward_hold_ms: 50,
            moving_timeout_ms: 3000,
            timeout_hold_ms: 500,
            home: 0,
            reset_tolerance: 5,
            reset_hold_ms: 100,
            settle_ms: 1000,
            moving_law: MovingLaw::Viscous,
            crossing: Crossing::Below,
            fixed_tier: None,
            seed: 0,
            max_trials: 0,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct TierCfg {
    pub threshold: i32,
    pub pulses: u32,
    pub cue_hz: u32,
    /// Viscous damping coefficient B
    #[serde(default = "default_damping")]
    pub damping: f32,
}

fn default_damping() -> f32 {
    0.003
}

pub fn default_tiers() -> Vec<TierCfg> {
    [500, 1000, 2000, 3000]
        .into_iter()
        .zip(0u32..)
        .map(|(cue_hz, pulses)| TierCfg {
            threshold: -25,
            pulses,
            cue_hz,
            damping: default_damping(),
        })
        .collect()
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RewardCfg {
    pub half_period_ms: u64,
    /// Tone played during high phases (0 disables)
    pub tone_hz: u32,
}

impl Default for RewardCfg {
    fn default() -> Self {
        Self {
            half_period_ms: 500,
            tone_hz: 5000,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MarkerMode {
    /// Bounded queue drained by a dedicated thread
    #[default]
    Queued,
    /// Emit synchronously from the control loop
    Immediate,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EventsCfg {
    /// Pulse generator resolution (ticks per second)
    pub resolution_hz: u32,
    pub queue_capacity: usize,
    /// Low time appended after every marker pulse (generator ticks)
    pub trailing_low_ticks: u32,
    pub mode: MarkerMode,
    /// SCHED_FIFO priority for the marker thread (rt builds)
    pub rt_priority: Option<i32>,
}

impl Default for EventsCfg {
    fn default() -> Self {
        Self {
            resolution_hz: 10_000_000,
            queue_capacity: 8,
            trailing_low_ticks: 1,
            mode: MarkerMode::Queued,
            rt_priority: None,
        }
    }
}

/// Per-state ceilings; exceeding one forces the trial toward Reset.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DwellCfg {
    pub init_ms: u64,
    pub cue_ms: u64,
    pub moving_ms: u64,
    pub reward_ms: u64,
    pub timeout_ms: u64,
    pub reset_ms: u64,
}

impl Default for DwellCfg {
    fn default() -> Self {
        Self {
            init_ms: 100,
            cue_ms: 1500,
            moving_ms: 5000,
            reward_ms: 6000,
            timeout_ms: 2000,
            reset_ms: 10_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SafetyCfg {
    /// |position| beyond this aborts the trial (counts)
    pub mechanical_limit: i32,
    /// Consecutive stale board reads tolerated before aborting
    pub max_stale_reads: u32,
    pub dwell: DwellCfg,
}

impl Default for SafetyCfg {
    fn default() -> Self {
        Self {
            mechanical_limit: 1000,
            max_stale_reads: 10,
            dwell: DwellCfg::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HomingCfg {
    pub p: f32,
    pub i: f32,
    pub d: f32,
    pub max_integral: u32,
    pub deadzone: u32,
    pub min_pos: i32,
    pub max_pos: i32,
    pub accel: i32,
    pub speed: i32,
    pub decel: i32,
    /// Soft-PID deadzone spanning the free range once homed
    pub unlock_range: u32,
    pub unlock_p: f32,
    pub unlock_i: f32,
}

impl Default for HomingCfg {
    fn default() -> Self {
        Self {
            p: 600.0,
            i: 0.0,
            d: 0.0,
            max_integral: 200,
            deadzone: 10,
            min_pos: -5000,
            max_pos: 5000,
            accel: 800,
            speed: 100,
            decel: 2000,
            unlock_range: 200,
            unlock_p: 200.0,
            unlock_i: 0.03,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ProtocolCfg {
    /// Drive an external motor board instead of the local PWM motor
    pub enabled: bool,
    pub port: String,
    pub baud: u32,
    pub read_timeout_ms: u64,
    /// How often the orchestrator cross-checks the board encoder
    pub poll_ms: u64,
    pub homing: HomingCfg,
}

impl Default for ProtocolCfg {
    fn default() -> Self {
        Self {
            enabled: false,
            port: "/dev/ttyAMA0".into(),
            baud: 38_400,
            read_timeout_ms: 10,
            poll_ms: 50,
            homing: HomingCfg::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AnalogCfg {
    pub enabled: bool,
    /// Symmetric position range mapped onto the 12-bit DAC
    pub range: i32,
}

impl Default for AnalogCfg {
    fn default() -> Self {
        Self {
            enabled: true,
            range: 200,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SamplingCfg {
    pub encoder_period_ms: u64,
    pub status_period_ms: u64,
}

impl Default for SamplingCfg {
    fn default() -> Self {
        Self {
            encoder_period_ms: 5,
            status_period_ms: 10,
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
    /// Where TRIAL/EVENT lines go; stdout when absent
    pub telemetry_file: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub pins: Pins,
    #[serde(default)]
    pub control: ControlCfg,
    #[serde(default)]
    pub viscous: ViscousCfg,
    #[serde(default)]
    pub ramp: RampCfg,
    #[serde(default)]
    pub trial: TrialCfg,
    #[serde(default = "default_tiers")]
    pub tiers: Vec<TierCfg>,
    #[serde(default)]
    pub reward: RewardCfg,
    #[serde(default)]
    pub events: EventsCfg,
    #[serde(default)]
    pub safety: SafetyCfg,
    #[serde(default)]
    pub protocol: ProtocolCfg,
    #[serde(default)]
    pub analog: AnalogCfg,
    #[serde(default)]
    pub sampling: SamplingCfg,
    #[serde(default)]
    pub logging: Logging,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pins: Pins::default(),
            control: ControlCfg::default(),
            viscous: ViscousCfg::default(),
            ramp: RampCfg::default(),
            trial: TrialCfg::default(),
            tiers: default_tiers(),
            reward: RewardCfg::default(),
            events: EventsCfg::default(),
            safety: SafetyCfg::default(),
            protocol: ProtocolCfg::default(),
            analog: AnalogCfg::default(),
            sampling: SamplingCfg::default(),
            logging: Logging::default(),
        }
    }
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Read, parse and validate a config file.
pub fn load_file(path: &std::path::Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("read config {}: {e}", path.display()))?;
    let cfg = load_toml(&text).map_err(|e| eyre::eyre!("parse config {}: {e}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

impl Config {
    /// Longest reward sequence any tier can run (ms).
    pub fn longest_reward_ms(&self) -> u64 {
        let max_pulses = self.tiers.iter().map(|t| t.pulses).max().unwrap_or(0);
        // Tier with zero pulses still waits one phase.
        u64::from(max_pulses.max(1))
            .saturating_mul(2)
            .saturating_mul(self.reward.half_period_ms)
    }

    pub fn validate(&self) -> eyre::Result<()> {
        // Control
        if self.control.loop_hz == 0 || self.control.loop_hz > 10_000 {
            eyre::bail!("control.loop_hz must be in [1, 10000]");
        }
        for (name, v) in [
            ("kp", self.control.kp),
            ("ki", self.control.ki),
            ("kd", self.control.kd),
        ] {
            if !v.is_finite() || v < 0.0 {
                eyre::bail!("control.{name} must be finite and >= 0");
            }
        }
        if self.control.deadzone < 0 {
            eyre::bail!("control.deadzone must be >= 0");
        }
        if self.control.pwm_hz.is_nan() || self.control.pwm_hz <= 0.0 {
            eyre::bail!("control.pwm_hz must be > 0");
        }

        // Viscous / ramp
        if !self.viscous.tau_s.is_finite() || self.viscous.tau_s < 0.0 {
            eyre::bail!("viscous.tau_s must be finite and >= 0");
        }
        if !self.ramp.rate_cps.is_finite() || self.ramp.rate_cps <= 0.0 {
            eyre::bail!("ramp.rate_cps must be > 0");
        }

        // Tiers
        if self.tiers.is_empty() || self.tiers.len() > MAX_TIERS {
            eyre::bail!("tiers must list between 1 and {MAX_TIERS} entries");
        }
        for (i, t) in self.tiers.iter().enumerate() {
            if t.cue_hz == 0 {
                eyre::bail!("tiers[{i}].cue_hz must be > 0");
            }
            if !t.damping.is_finite() || t.damping < 0.0 {
                eyre::bail!("tiers[{i}].damping must be finite and >= 0");
            }
            if t.pulses > 16 {
                eyre::bail!("tiers[{i}].pulses must be <= 16");
            }
        }
        if let Some(tier) = self.trial.fixed_tier
            && usize::from(tier) >= self.tiers.len()
        {
            eyre::bail!("trial.fixed_tier must index into tiers (0..{})", self.tiers.len());
        }

        // Trial timings
        if self.trial.cue_ms == 0 {
            eyre::bail!("trial.cue_ms must be >= 1");
        }
        if self.trial.moving_timeout_ms == 0 {
            eyre::bail!("trial.moving_timeout_ms must be >= 1");
        }
        if self.trial.reward_hold_ms >= self.trial.moving_timeout_ms {
            eyre::bail!("trial.reward_hold_ms must be < trial.moving_timeout_ms");
        }
        if self.trial.reset_tolerance < 0 {
            eyre::bail!("trial.reset_tolerance must be >= 0");
        }
        if self.reward.half_period_ms == 0 {
            eyre::bail!("reward.half_period_ms must be >= 1");
        }

        // Events
        if self.events.resolution_hz == 0 {
            eyre::bail!("events.resolution_hz must be > 0");
        }
        if self.events.queue_capacity == 0 {
            eyre::bail!("events.queue_capacity must be >= 1");
        }
        // Longest marker (160 ms) must fit in u32 ticks.
        if u64::from(self.events.resolution_hz) * 160_000 / 1_000_000 > u64::from(u32::MAX) {
            eyre::bail!("events.resolution_hz is too high for 32-bit tick widths");
        }

        // Safety: each ceiling must leave room for the nominal phase
        let d = &self.safety.dwell;
        if self.safety.mechanical_limit <= 0 {
            eyre::bail!("safety.mechanical_limit must be > 0");
        }
        if self.tiers.iter().any(|t| t.threshold.abs() >= self.safety.mechanical_limit) {
            eyre::bail!("safety.mechanical_limit must exceed every tier threshold");
        }
        if d.init_ms == 0 {
            eyre::bail!("safety.dwell.init_ms must be >= 1");
        }
        if d.cue_ms <= self.trial.cue_ms {
            eyre::bail!("safety.dwell.cue_ms must exceed trial.cue_ms");
        }
        if d.moving_ms <= self.trial.moving_timeout_ms {
            eyre::bail!("safety.dwell.moving_ms must exceed trial.moving_timeout_ms");
        }
        if d.reward_ms <= self.longest_reward_ms() {
            eyre::bail!("safety.dwell.reward_ms must exceed the longest reward sequence");
        }
        if d.timeout_ms <= self.trial.timeout_hold_ms {
            eyre::bail!("safety.dwell.timeout_ms must exceed trial.timeout_hold_ms");
        }
        if d.reset_ms <= self.trial.reset_hold_ms.saturating_add(self.trial.settle_ms) {
            eyre::bail!("safety.dwell.reset_ms must exceed trial.reset_hold_ms + trial.settle_ms");
        }

        // Protocol
        if self.protocol.enabled {
            if self.protocol.port.trim().is_empty() {
                eyre::bail!("protocol.port must be set when protocol.enabled");
            }
            if self.protocol.baud == 0 {
                eyre::bail!("protocol.baud must be > 0");
            }
        }
        if self.protocol.read_timeout_ms == 0 || self.protocol.read_timeout_ms > 100 {
            eyre::bail!("protocol.read_timeout_ms must be in [1, 100]");
        }
        if self.protocol.poll_ms == 0 {
            eyre::bail!("protocol.poll_ms must be >= 1");
        }
        let h = &self.protocol.homing;
        if h.min_pos > h.max_pos {
            eyre::bail!("protocol.homing.min_pos must be <= max_pos");
        }
        for (name, v) in [
            ("p", h.p),
            ("i", h.i),
            ("d", h.d),
            ("unlock_p", h.unlock_p),
            ("unlock_i", h.unlock_i),
        ] {
            // Gains travel as Q10 i32 on the wire.
            if !v.is_finite() || v.abs() * 1024.0 > i32::MAX as f32 {
                eyre::bail!("protocol.homing.{name} is out of range for Q10 encoding");
            }
        }

        // Analog / sampling
        if self.analog.range <= 0 {
            eyre::bail!("analog.range must be > 0");
        }
        if self.sampling.encoder_period_ms == 0 || self.sampling.encoder_period_ms > 50 {
            eyre::bail!("sampling.encoder_period_ms must be in [1, 50]");
        }
        if self.sampling.status_period_ms == 0 {
            eyre::bail!("sampling.status_period_ms must be >= 1");
        }

        // Logging
        if let Some(rot) = self.logging.rotation.as_deref()
            && !matches!(rot, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_valid_with_defaults() {
        let cfg = load_toml("").unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.tiers.len(), 4);
        assert_eq!(cfg.tiers[2].pulses, 2);
        assert_eq!(cfg.tiers[3].cue_hz, 3000);
        assert_eq!(cfg.events.queue_capacity, 8);
    }

    #[test]
    fn longest_reward_counts_zero_pulse_wait() {
        let cfg = Config {
            tiers: vec![TierCfg {
                threshold: -25,
                pulses: 0,
                cue_hz: 500,
                damping: 0.0,
            }],
            ..Config::default()
        };
        assert_eq!(cfg.longest_reward_ms(), 1000);
    }
}
