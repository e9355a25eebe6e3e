use thiserror::Error;

use crate::trial::Phase;

/// Why a trial was cut short and forced toward Reset.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    #[error("{phase:?} exceeded its dwell limit of {limit_ms} ms")]
    DwellExceeded { phase: Phase, limit_ms: u64 },
    #[error("position {position} beyond mechanical limit {limit}")]
    OutOfRange { position: i32, limit: i32 },
    #[error("{count} consecutive stale motor-board reads")]
    StaleReadings { count: u32 },
    #[error("reset requested by operator")]
    Operator,
}

/// Response from the motor board could not be trusted.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("crc mismatch: expected {expected:#06x}, got {got:#06x}")]
    CrcMismatch { expected: u16, got: u16 },
    #[error("short read: expected {expected} bytes")]
    ShortRead { expected: usize },
    #[error("no response within {0} ms")]
    Timeout(u64),
    #[error("payload of {0} bytes exceeds frame limit")]
    PayloadTooLong(usize),
    #[error("frame already sealed with its crc")]
    Sealed,
}

#[derive(Debug, Error, Clone)]
pub enum RigError {
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("timeout waiting for device")]
    Timeout,
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("invalid state: {0}")]
    State(String),
    #[error("trial aborted: {0}")]
    Abort(AbortReason),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing actuator")]
    MissingActuator,
    #[error("missing event marker")]
    MissingMarker,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
