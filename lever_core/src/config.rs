//! Runtime configuration for the trial controller.
//!
//! These are separate from the TOML-deserialized config in `lever_config`;
//! `conversions` maps one onto the other.

use crate::protocol::{HomingProfile, PidUpload};

/// Gains, loop period and the ramp used by the Moving phase.
#[derive(Debug, Clone)]
pub struct ControlParams {
    pub loop_hz: u32,
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    pub deadzone: i32,
    /// Viscous velocity filter time constant (s)
    pub tau_s: f32,
    pub ramp_target: i32,
    pub ramp_rate_cps: f32,
    pub ramp_delay_ms: u64,
}

impl ControlParams {
    /// Control period in seconds.
    pub fn dt(&self) -> f32 {
        crate::util::period_s(self.loop_hz)
    }
}

impl Default for ControlParams {
    fn default() -> Self {
        Self {
            loop_hz: 500,
            kp: 0.21,
            ki: 0.001,
            kd: 0.003,
            deadzone: 5,
            tau_s: 0.02,
            ramp_target: 50,
            ramp_rate_cps: 80.0,
            ramp_delay_ms: 100,
        }
    }
}

/// Law that drives the actuator while the subject may respond.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MovingLaw {
    None,
    #[default]
    Viscous,
    Ramp,
}

/// Which side of the threshold counts as a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Crossing {
    #[default]
    Below,
    Above,
}

impl Crossing {
    pub fn crossed(self, position: i32, threshold: i32) -> bool {
        match self {
            Self::Below => position < threshold,
            Self::Above => position >= threshold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tier {
    pub threshold: i32,
    pub pulses: u32,
    pub cue_hz: u32,
    pub damping: f32,
}

#[derive(Debug, Clone)]
pub struct TrialTimings {
    pub cue_ms: u64,
    pub reward_hold_ms: u64,
    pub moving_timeout_ms: u64,
    pub timeout_hold_ms: u64,
    pub home: i32,
    pub reset_tolerance: i32,
    pub reset_hold_ms: u64,
    pub settle_ms: u64,
    pub moving_law: MovingLaw,
    pub crossing: Crossing,
    pub fixed_tier: Option<u8>,
    /// 0 seeds tier selection from the wall clock
    pub seed: u64,
}

impl Default for TrialTimings {
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
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RewardParams {
    pub half_period_ms: u64,
    /// 0 disables the reward tone
    pub tone_hz: u32,
}

impl Default for RewardParams {
    fn default() -> Self {
        Self {
            half_period_ms: 500,
            tone_hz: 5000,
        }
    }
}

/// Per-phase dwell ceilings (ms).
#[derive(Debug, Clone, Copy)]
pub struct DwellLimits {
    pub init_ms: u64,
    pub cue_ms: u64,
    pub moving_ms: u64,
    pub reward_ms: u64,
    pub timeout_ms: u64,
    pub reset_ms: u64,
}

impl Default for DwellLimits {
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

#[derive(Debug, Clone, Copy)]
pub struct SafetyParams {
    pub mechanical_limit: i32,
    pub max_stale_reads: u32,
    pub dwell: DwellLimits,
}

impl Default for SafetyParams {
    fn default() -> Self {
        Self {
            mechanical_limit: 1000,
            max_stale_reads: 10,
            dwell: DwellLimits::default(),
        }
    }
}

/// Motor-board behavior when one is attached.
#[derive(Debug, Clone, Copy)]
pub struct BoardParams {
    /// Encoder cross-check interval
    pub poll_ms: u64,
    pub homing: HomingProfile,
    pub unlock_range: u32,
}

impl Default for BoardParams {
    fn default() -> Self {
        Self {
            poll_ms: 50,
            homing: HomingProfile {
                pid: PidUpload {
                    p: 600.0,
                    i: 0.0,
                    d: 0.0,
                    max_integral: 200,
                    deadzone: 10,
                    min_pos: -5000,
                    max_pos: 5000,
                },
                accel: 800,
                speed: 100,
                decel: 2000,
                home: 0,
                unlock_p: 200.0,
                unlock_i: 0.03,
            },
            unlock_range: 200,
        }
    }
}

/// Everything the trial controller is parameterized by.
#[derive(Debug, Clone)]
pub struct TrialConfig {
    pub control: ControlParams,
    pub tiers: Vec<Tier>,
    pub timings: TrialTimings,
    pub reward: RewardParams,
    pub safety: SafetyParams,
    pub board: BoardParams,
}

impl Default for TrialConfig {
    fn default() -> Self {
        Self::from(&lever_config::Config::default())
    }
}
