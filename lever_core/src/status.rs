//! Status returned from each orchestrator tick.

use crate::error::{AbortReason, RigError};
use crate::telemetry::TrialOutcome;

/// Summary of one finished trial, as reported on its `TRIAL` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrialRecord {
    pub trial_number: u32,
    pub tier: u8,
    pub outcome: TrialOutcome,
    pub reaction_time_ms: u64,
    pub final_position: i32,
    /// Set when the watchdog or a safety check cut the trial short
    pub abort: Option<AbortReason>,
}

/// Public status of a single step of the trial loop.
#[derive(Debug)]
pub enum TrialStatus {
    /// Keep going.
    Running,
    /// The trial line went out on this tick; actuator already stopped.
    Completed(TrialRecord),
    /// A safety check fired on this tick; the trial is heading to Reset.
    Aborted(RigError),
}
