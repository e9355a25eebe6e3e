#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Lever rig control core (hardware-agnostic).
//!
//! This crate runs behavioral trials on a motorized lever. All hardware
//! interactions go through the traits in `lever_traits`.
//!
//! ## Architecture
//!
//! - **Position**: 16-bit wrapping counter accumulated to a signed total (`encoder`)
//! - **Control**: PID with anti-windup and deadzone brake, viscous field, setpoint ramp (`control`)
//! - **Motor board**: CRC16-framed serial driver with stale-read fallback (`protocol`)
//! - **Markers**: fixed-width TTL pulses, immediate or through a bounded queue (`event`)
//! - **Reward**: non-blocking pulse-train sequencer (`reward`)
//! - **Trials**: `Init -> Cue -> Moving -> Reward|Timeout -> Reset` with dwell watchdogs (`trial`)
//! - **Threads**: sampler, marker consumer and the fixed-rate loop (`sampler`, `runner`)
//!
//! The wire-contract telemetry (`TRIAL,...`/`EVENT,...`) is written through a
//! `TelemetrySink`; diagnostics go through `tracing`.

pub mod analog;
pub mod builder;
pub mod config;
pub mod control;
pub mod conversions;
pub mod encoder;
pub mod error;
pub mod event;
pub mod hw_error;
pub mod mocks;
pub mod protocol;
pub mod reward;
pub mod runner;
pub mod sampler;
pub mod shared;
pub mod status;
pub mod telemetry;
pub mod trial;
pub mod tuning;
pub mod util;

pub use builder::{Missing, Set, TrialControllerBuilder};
pub use config::{
    BoardParams, ControlParams, Crossing, DwellLimits, MovingLaw, RewardParams, SafetyParams,
    Tier, TrialConfig, TrialTimings,
};
pub use control::{ControlLaw, MotionController, PidController, SetpointRamp, ViscousField};
pub use encoder::{PositionSource, PositionTracker};
pub use error::{AbortReason, BuildError, ProtocolError, RigError};
pub use event::{EventCode, EventConsumer, EventSender, ImmediateEmitter, Marker, StateGuard};
pub use protocol::{MotorBoard, crc16};
pub use reward::RewardSequencer;
pub use runner::{Rig, SessionReport, run_session};
pub use sampler::Sampler;
pub use shared::SharedState;
pub use status::{TrialRecord, TrialStatus};
pub use telemetry::{TelemetrySink, TrialOutcome};
pub use trial::{Phase, SessionStats, TrialController};
pub use tuning::{TuningCommand, TuningReader};
