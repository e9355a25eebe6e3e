//! Timed multi-pulse reward TTL.
//!
//! `start(n)` drives the line high and arms `2n` phases; each `update` that
//! lands on or past a half-period boundary advances exactly one phase and
//! writes the new level. The final phase always leaves the line low.

use lever_traits::DigitalOutput;

use crate::error::Result;
use crate::hw_error::map_hw_error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewardSequence {
    pub phases_remaining: u32,
    pub level_high: bool,
    pub last_toggle_ms: u64,
}

pub struct RewardSequencer<O: DigitalOutput> {
    out: O,
    half_period_ms: u64,
    seq: RewardSequence,
    /// Phase index within the current sequence
    phase: u32,
}

impl<O: DigitalOutput> core::fmt::Debug for RewardSequencer<O> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RewardSequencer")
            .field("half_period_ms", &self.half_period_ms)
            .field("seq", &self.seq)
            .finish_non_exhaustive()
    }
}

impl<O: DigitalOutput> RewardSequencer<O> {
    pub fn new(out: O, half_period_ms: u64) -> Self {
        Self {
            out,
            half_period_ms: half_period_ms.max(1),
            seq: RewardSequence {
                phases_remaining: 0,
                level_high: false,
                last_toggle_ms: 0,
            },
            phase: 0,
        }
    }

    fn write(&mut self, high: bool) {
        self.seq.level_high = high;
        if let Err(e) = self.out.set_level(high) {
            let e = eyre::Report::new(map_hw_error(&*e));
            tracing::warn!(error = %e, high, "reward line write failed");
        }
    }

    /// Arm `pulses` high/low cycles starting now. Zero pulses leaves the
    /// sequencer inactive.
    pub fn start(&mut self, pulses: u32, now_ms: u64) {
        self.seq.phases_remaining = pulses.saturating_mul(2);
        self.seq.last_toggle_ms = now_ms;
        self.phase = 0;
        if pulses > 0 {
            self.write(true);
        }
    }

    /// Advance at most one phase. Returns the level written, if any.
    pub fn update(&mut self, now_ms: u64) -> Option<bool> {
        if !self.is_active() {
            return None;
        }
        if now_ms.saturating_sub(self.seq.last_toggle_ms) < self.half_period_ms {
            return None;
        }
        self.seq.phases_remaining -= 1;
        self.phase += 1;
        self.seq.last_toggle_ms = now_ms;
        let high = self.seq.phases_remaining > 0 && self.phase % 2 == 0;
        self.write(high);
        Some(high)
    }

    pub fn is_active(&self) -> bool {
        self.seq.phases_remaining > 0
    }

    /// Cut the sequence short and drive the line low.
    pub fn abort(&mut self) {
        let was_active = self.is_active();
        self.seq.phases_remaining = 0;
        if was_active || self.seq.level_high {
            self.write(false);
        }
    }

    pub fn sequence(&self) -> RewardSequence {
        self.seq
    }

    pub fn half_period_ms(&self) -> u64 {
        self.half_period_ms
    }

    /// Direct line access for bring-up checks.
    pub fn pulse_once(&mut self, high: bool) -> Result<()> {
        self.out
            .set_level(high)
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)).wrap_err("reward line"))
    }
}
