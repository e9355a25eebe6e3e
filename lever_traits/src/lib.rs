//! Hardware seams for the lever rig.
//!
//! Every peripheral the control core touches is reached through one of these
//! traits. Fallible operations return a boxed error so backends can surface
//! their own error types; `lever_core::hw_error` maps them to typed errors.

pub mod clock;

pub use clock::{Clock, ManualClock, MonotonicClock};

/// Error type carried across the trait boundary.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Hardware pulse counter fed by the quadrature encoder.
///
/// Returns the raw 16-bit register. The register wraps; accumulation is the
/// caller's job.
pub trait PulseCounter {
    fn count(&mut self) -> i16;
}

/// Motor output driven with a signed effort in `[-100, 100]`.
pub trait Actuator {
    fn apply(&mut self, effort: f32) -> Result<(), BoxError>;
    fn stop(&mut self) -> Result<(), BoxError>;
}

/// Pulse generator for event markers. Widths are in generator ticks.
pub trait PulseOutput {
    fn emit(&mut self, high_ticks: u32, low_ticks: u32) -> Result<(), BoxError>;
}

/// Single digital line (reward TTL).
pub trait DigitalOutput {
    fn set_level(&mut self, high: bool) -> Result<(), BoxError>;
}

/// Half-duplex serial link to the motor-driver board.
pub trait SerialLink {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), BoxError>;
    /// Discard anything already buffered on the receive side.
    fn clear_input(&mut self) -> Result<(), BoxError>;
    /// Fill `buf` completely or fail once `timeout` expires.
    fn read_exact_timeout(
        &mut self,
        buf: &mut [u8],
        timeout: std::time::Duration,
    ) -> Result<(), BoxError>;
}

/// 12-bit DAC mirroring lever position to an analog line.
pub trait Dac {
    fn write_code(&mut self, code: u16) -> Result<(), BoxError>;
}

/// Tone/visual cue presenter. Synthesis itself lives outside the core.
pub trait CuePresenter {
    fn start(&mut self, freq_hz: u32) -> Result<(), BoxError>;
    fn stop(&mut self) -> Result<(), BoxError>;
}

impl<T: PulseCounter + ?Sized> PulseCounter for Box<T> {
    fn count(&mut self) -> i16 {
        (**self).count()
    }
}

impl<T: Actuator + ?Sized> Actuator for Box<T> {
    fn apply(&mut self, effort: f32) -> Result<(), BoxError> {
        (**self).apply(effort)
    }
    fn stop(&mut self) -> Result<(), BoxError> {
        (**self).stop()
    }
}

impl<T: PulseOutput + ?Sized> PulseOutput for Box<T> {
    fn emit(&mut self, high_ticks: u32, low_ticks: u32) -> Result<(), BoxError> {
        (**self).emit(high_ticks, low_ticks)
    }
}

impl<T: DigitalOutput + ?Sized> DigitalOutput for Box<T> {
    fn set_level(&mut self, high: bool) -> Result<(), BoxError> {
        (**self).set_level(high)
    }
}

impl<T: SerialLink + ?Sized> SerialLink for Box<T> {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), BoxError> {
        (**self).write_all(bytes)
    }
    fn clear_input(&mut self) -> Result<(), BoxError> {
        (**self).clear_input()
    }
    fn read_exact_timeout(
        &mut self,
        buf: &mut [u8],
        timeout: std::time::Duration,
    ) -> Result<(), BoxError> {
        (**self).read_exact_timeout(buf, timeout)
    }
}

impl<T: Dac + ?Sized> Dac for Box<T> {
    fn write_code(&mut self, code: u16) -> Result<(), BoxError> {
        (**self).write_code(code)
    }
}

impl<T: CuePresenter + ?Sized> CuePresenter for Box<T> {
    fn start(&mut self, freq_hz: u32) -> Result<(), BoxError> {
        (**self).start(freq_hz)
    }
    fn stop(&mut self) -> Result<(), BoxError> {
        (**self).stop()
    }
}
