//! x4 quadrature decoding shared between per-pin edge callbacks.
//!
//! Each channel's callback may run on its own thread. The A/B state byte is
//! updated with a single read-modify-write so the step is always computed
//! against the state the edge actually replaced.

use std::sync::atomic::{AtomicI32, AtomicU8, Ordering};

// Gray-code transition table indexed by (prev_ab << 2) | next_ab.
const QUAD_TABLE: [i8; 16] = [0, -1, 1, 0, 1, 0, 0, -1, -1, 0, 0, 1, 0, 1, -1, 0];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    A,
    B,
}

impl Channel {
    const fn bit(self) -> u8 {
        match self {
            Self::A => 0b10,
            Self::B => 0b01,
        }
    }
}

#[derive(Debug, Default)]
pub struct QuadDecoder {
    state: AtomicU8,
    count: AtomicI32,
}

impl QuadDecoder {
    pub fn new(a_high: bool, b_high: bool) -> Self {
        let mut initial = 0u8;
        if a_high {
            initial |= Channel::A.bit();
        }
        if b_high {
            initial |= Channel::B.bit();
        }
        Self {
            state: AtomicU8::new(initial),
            count: AtomicI32::new(0),
        }
    }

    /// Record one edge on `channel`; returns the step applied to the count.
    pub fn edge(&self, channel: Channel, high: bool) -> i8 {
        let bit = channel.bit();
        let prev = if high {
            self.state.fetch_or(bit, Ordering::AcqRel)
        } else {
            self.state.fetch_and(!bit, Ordering::AcqRel)
        };
        let next = if high { prev | bit } else { prev & !bit };
        let step = QUAD_TABLE[usize::from((prev << 2) | next)];
        if step != 0 {
            self.count.fetch_add(i32::from(step), Ordering::AcqRel);
        }
        step
    }

    pub fn count(&self) -> i32 {
        self.count.load(Ordering::Acquire)
    }

    /// Current (A, B) levels as the decoder last saw them.
    pub fn levels(&self) -> (bool, bool) {
        let s = self.state.load(Ordering::Acquire);
        (s & Channel::A.bit() != 0, s & Channel::B.bit() != 0)
    }
}
