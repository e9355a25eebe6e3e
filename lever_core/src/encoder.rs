//! Quadrature position tracking.
//!
//! The hardware counter is a 16-bit register that wraps in both directions.
//! `PositionTracker` turns successive raw reads into a signed 32-bit running
//! total by interpreting each difference as a wrapping 16-bit delta, so no
//! counts are lost as long as the lever moves less than 32767 counts between
//! samples.

use lever_traits::PulseCounter;

use crate::error::Result;

/// Snapshot of the tracker's registers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncoderState {
    /// Last hardware register read
    pub raw_count: i16,
    pub last_raw: i16,
    /// Accumulated signed position
    pub total: i32,
}

/// Anything the sampler can pull a position from.
pub trait PositionSource {
    fn read_position(&mut self) -> Result<i32>;
}

impl<T: PositionSource + ?Sized> PositionSource for Box<T> {
    fn read_position(&mut self) -> Result<i32> {
        (**self).read_position()
    }
}

#[derive(Debug)]
pub struct PositionTracker<C: PulseCounter> {
    counter: C,
    state: EncoderState,
}

impl<C: PulseCounter> PositionTracker<C> {
    /// Wrap `counter`, adopting its current register as the zero point.
    pub fn new(mut counter: C) -> Self {
        let raw = counter.count();
        Self {
            counter,
            state: EncoderState {
                raw_count: raw,
                last_raw: raw,
                total: 0,
            },
        }
    }

    /// Read the counter once and return the updated total.
    pub fn sample(&mut self) -> i32 {
        let raw = self.counter.count();
        self.accumulate(raw)
    }

    /// Fold an externally read raw value into the total.
    pub fn accumulate(&mut self, raw: i16) -> i32 {
        let delta = raw.wrapping_sub(self.state.last_raw);
        self.state.raw_count = raw;
        self.state.last_raw = raw;
        self.state.total = self.state.total.wrapping_add(i32::from(delta));
        self.state.total
    }

    /// Zero the total and re-latch the current register.
    pub fn reset(&mut self) {
        let raw = self.counter.count();
        self.state = EncoderState {
            raw_count: raw,
            last_raw: raw,
            total: 0,
        };
    }

    pub fn state(&self) -> EncoderState {
        self.state
    }

    pub fn total(&self) -> i32 {
        self.state.total
    }
}

impl<C: PulseCounter> PositionSource for PositionTracker<C> {
    fn read_position(&mut self) -> Result<i32> {
        Ok(self.sample())
    }
}
