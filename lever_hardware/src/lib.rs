#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Device backends for the lever rig.
//!
//! - `quadrature`: x4 decoder shared by per-pin edge callbacks
//! - `sim`: simulated lever plant and recording outputs (always available)
//! - `gpio`: Raspberry Pi GPIO/I2C devices (`hardware` feature, Linux)
//! - `serial`: motor-board serial link (`hardware` feature)
//! - `rt`: SCHED_FIFO / affinity / mlockall helpers (`rt` feature)

pub mod dac;
pub mod error;
pub mod quadrature;
pub mod sim;
pub mod util;

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod gpio;
#[cfg(feature = "rt")]
pub mod rt;
#[cfg(feature = "hardware")]
pub mod serial;

pub use error::HwError;
pub use sim::{
    RecordingDac, RecordingDigitalOutput, RecordingPulseOutput, SimulatedActuator,
    SimulatedCounter, SimulatedCue, SimulatedLever, SubjectModel,
};
