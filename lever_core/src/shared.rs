//! The one piece of cross-thread mutable state: the latest lever position.
//!
//! The sampler thread is the only writer. Readers take a full snapshot under
//! the lock so a control tick never sees a half-updated record. Critical
//! sections copy a few words and never span I/O.

use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PositionSnapshot {
    pub position: i32,
    /// Actuator is holding the lever (Reset/homing)
    pub motor_locked: bool,
    pub sampled_at_ms: u64,
    /// Bumped on every publish; lets readers spot a stalled sampler
    pub seq: u64,
}

#[derive(Debug, Default)]
pub struct SharedState {
    inner: Mutex<PositionSnapshot>,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, PositionSnapshot> {
        // A panicked writer leaves plain data behind; keep using it.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn publish(&self, position: i32, at_ms: u64) {
        let mut s = self.lock();
        s.position = position;
        s.sampled_at_ms = at_ms;
        s.seq = s.seq.wrapping_add(1);
    }

    pub fn snapshot(&self) -> PositionSnapshot {
        *self.lock()
    }

    pub fn set_motor_locked(&self, locked: bool) {
        self.lock().motor_locked = locked;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_is_visible_in_snapshot() {
        let s = SharedState::new();
        s.publish(-12, 40);
        s.set_motor_locked(true);
        let snap = s.snapshot();
        assert_eq!(snap.position, -12);
        assert_eq!(snap.sampled_at_ms, 40);
        assert!(snap.motor_locked);
        assert_eq!(snap.seq, 1);
    }
}
