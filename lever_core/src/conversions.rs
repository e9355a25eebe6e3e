//! `From` implementations bridging `lever_config` types to `lever_core` types.

use crate::config::{
    BoardParams, ControlParams, Crossing, DwellLimits, MovingLaw, RewardParams, SafetyParams,
    Tier, TrialConfig, TrialTimings,
};
use crate::event::EventPulseTable;
use crate::protocol::{HomingProfile, PidUpload};

// ── Control ──────────────────────────────────────────────────────────────────

impl From<&lever_config::Config> for ControlParams {
    fn from(c: &lever_config::Config) -> Self {
        Self {
            loop_hz: c.control.loop_hz,
            kp: c.control.kp,
            ki: c.control.ki,
            kd: c.control.kd,
            deadzone: c.control.deadzone,
            tau_s: c.viscous.tau_s,
            ramp_target: c.ramp.target,
            ramp_rate_cps: c.ramp.rate_cps,
            ramp_delay_ms: c.ramp.delay_ms,
        }
    }
}

// ── Trial ────────────────────────────────────────────────────────────────────

impl From<lever_config::MovingLaw> for MovingLaw {
    fn from(m: lever_config::MovingLaw) -> Self {
        match m {
            lever_config::MovingLaw::None => Self::None,
            lever_config::MovingLaw::Viscous => Self::Viscous,
            lever_config::MovingLaw::Ramp => Self::Ramp,
        }
    }
}

impl From<lever_config::Crossing> for Crossing {
    fn from(c: lever_config::Crossing) -> Self {
        match c {
            lever_config::Crossing::Below => Self::Below,
            lever_config::Crossing::Above => Self::Above,
        }
    }
}

impl From<&lever_config::TierCfg> for Tier {
    fn from(t: &lever_config::TierCfg) -> Self {
        Self {
            threshold: t.threshold,
            pulses: t.pulses,
            cue_hz: t.cue_hz,
            damping: t.damping,
        }
    }
}

impl From<&lever_config::TrialCfg> for TrialTimings {
    fn from(t: &lever_config::TrialCfg) -> Self {
        Self {
            cue_ms: t.cue_ms,
            reward_hold_ms: t.reward_hold_ms,
            moving_timeout_ms: t.moving_timeout_ms,
            timeout_hold_ms: t.timeout_hold_ms,
            home: t.home,
            reset_tolerance: t.reset_tolerance,
            reset_hold_ms: t.reset_hold_ms,
            settle_ms: t.settle_ms,
            moving_law: t.moving_law.into(),
            crossing: t.crossing.into(),
            fixed_tier: t.fixed_tier,
            seed: t.seed,
        }
    }
}

impl From<&lever_config::RewardCfg> for RewardParams {
    fn from(r: &lever_config::RewardCfg) -> Self {
        Self {
            half_period_ms: r.half_period_ms,
            tone_hz: r.tone_hz,
        }
    }
}

// ── Safety ───────────────────────────────────────────────────────────────────

impl From<&lever_config::DwellCfg> for DwellLimits {
    fn from(d: &lever_config::DwellCfg) -> Self {
        Self {
            init_ms: d.init_ms,
            cue_ms: d.cue_ms,
            moving_ms: d.moving_ms,
            reward_ms: d.reward_ms,
            timeout_ms: d.timeout_ms,
            reset_ms: d.reset_ms,
        }
    }
}

impl From<&lever_config::SafetyCfg> for SafetyParams {
    fn from(s: &lever_config::SafetyCfg) -> Self {
        Self {
            mechanical_limit: s.mechanical_limit,
            max_stale_reads: s.max_stale_reads,
            dwell: (&s.dwell).into(),
        }
    }
}

// ── Motor board ──────────────────────────────────────────────────────────────

impl From<&lever_config::HomingCfg> for PidUpload {
    fn from(h: &lever_config::HomingCfg) -> Self {
        Self {
            p: h.p,
            i: h.i,
            d: h.d,
            max_integral: h.max_integral,
            deadzone: h.deadzone,
            min_pos: h.min_pos,
            max_pos: h.max_pos,
        }
    }
}

impl From<&lever_config::Config> for BoardParams {
    fn from(c: &lever_config::Config) -> Self {
        let h = &c.protocol.homing;
        Self {
            poll_ms: c.protocol.poll_ms,
            homing: HomingProfile {
                pid: h.into(),
                accel: h.accel,
                speed: h.speed,
                decel: h.decel,
                home: c.trial.home,
                unlock_p: h.unlock_p,
                unlock_i: h.unlock_i,
            },
            unlock_range: h.unlock_range,
        }
    }
}

// ── Events ───────────────────────────────────────────────────────────────────

impl From<&lever_config::EventsCfg> for EventPulseTable {
    fn from(e: &lever_config::EventsCfg) -> Self {
        Self::new(e.resolution_hz, e.trailing_low_ticks)
    }
}

// ── Whole controller ─────────────────────────────────────────────────────────

impl From<&lever_config::Config> for TrialConfig {
    fn from(c: &lever_config::Config) -> Self {
        Self {
            control: c.into(),
            tiers: c.tiers.iter().map(Tier::from).collect(),
            timings: (&c.trial).into(),
            reward: (&c.reward).into(),
            safety: (&c.safety).into(),
            board: c.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_carry_through() {
        let cfg = TrialConfig::from(&lever_config::Config::default());
        assert_eq!(cfg.control.loop_hz, 500);
        assert!((cfg.control.dt() - 0.002).abs() < 1e-9);
        assert_eq!(cfg.tiers.len(), 4);
        assert_eq!(cfg.tiers[3].pulses, 3);
        assert_eq!(cfg.timings.crossing, Crossing::Below);
        assert_eq!(cfg.board.homing.pid.deadzone, 10);
        assert_eq!(cfg.safety.dwell.reset_ms, 10_000);
    }
}
