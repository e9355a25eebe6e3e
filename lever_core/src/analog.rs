//! Position mirrored onto a 12-bit DAC for analog recording.

use lever_traits::Dac;

use crate::hw_error::map_hw_error;

pub const DAC_MAX: u16 = 4095;

/// `(clamp(pos, -R, R) + R) * 4095 / (2R)`, in integer arithmetic.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn dac_code(position: i32, range: i32) -> u16 {
    let r = i64::from(range.max(1));
    let p = i64::from(position).clamp(-r, r);
    ((p + r) * i64::from(DAC_MAX) / (2 * r)) as u16
}

pub struct AnalogMirror<D: Dac> {
    dac: D,
    range: i32,
    last_code: Option<u16>,
    failures: u64,
}

impl<D: Dac> core::fmt::Debug for AnalogMirror<D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AnalogMirror")
            .field("range", &self.range)
            .field("last_code", &self.last_code)
            .field("failures", &self.failures)
            .finish_non_exhaustive()
    }
}

impl<D: Dac> AnalogMirror<D> {
    pub fn new(dac: D, range: i32) -> Self {
        Self {
            dac,
            range,
            last_code: None,
            failures: 0,
        }
    }

    /// Write the code for `position`. Bus errors are logged and skipped; the
    /// next sample rewrites the line anyway.
    pub fn update(&mut self, position: i32) {
        let code = dac_code(position, self.range);
        if self.last_code == Some(code) {
            return;
        }
        match self.dac.write_code(code) {
            Ok(()) => self.last_code = Some(code),
            Err(e) => {
                self.failures += 1;
                let e = map_hw_error(&*e);
                tracing::warn!(error = %e, code, "dac write failed");
            }
        }
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }
}
