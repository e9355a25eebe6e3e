//! Maps `Box<dyn Error>` from trait boundaries to typed `RigError`.
//!
//! The traits in `lever_traits` use `Box<dyn Error + Send + Sync>` so every
//! backend can report its own error type; this module converts those to our
//! typed enum, with a feature-gated path for `lever_hardware::HwError`.

use crate::error::RigError;

/// Map a trait-boundary error to a typed `RigError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> RigError {
    #[cfg(feature = "hardware-errors")]
    {
        use lever_hardware::error::HwError;
        if let Some(hw) = e.downcast_ref::<HwError>() {
            return match hw {
                HwError::Timeout => RigError::Timeout,
                HwError::ShortRead { expected, .. } => {
                    RigError::Protocol(crate::error::ProtocolError::ShortRead {
                        expected: *expected,
                    })
                }
                other => RigError::HardwareFault(other.to_string()),
            };
        }
    }

    if let Some(rig) = e.downcast_ref::<RigError>() {
        return rig.clone();
    }

    // Fallback: string-based detection
    let s = e.to_string();
    if s.to_lowercase().contains("timeout") || s.to_lowercase().contains("timed out") {
        RigError::Timeout
    } else {
        RigError::Hardware(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_io_timeout_maps_to_timeout() {
        let e = std::io::Error::new(std::io::ErrorKind::TimedOut, "read timed out");
        assert!(matches!(map_hw_error(&e), RigError::Timeout));
    }

    #[test]
    fn unknown_error_keeps_message() {
        let e = std::io::Error::other("bus fault");
        match map_hw_error(&e) {
            RigError::Hardware(msg) => assert!(msg.contains("bus fault")),
            other => panic!("unexpected mapping: {other:?}"),
        }
    }

    #[cfg(feature = "hardware-errors")]
    #[test]
    fn hw_error_is_downcast() {
        let boxed: Box<dyn std::error::Error + Send + Sync> =
            Box::new(lever_hardware::HwError::Gpio("pin 4 busy".into()));
        assert!(matches!(
            map_hw_error(boxed.as_ref()),
            RigError::HardwareFault(_)
        ));
        let boxed: Box<dyn std::error::Error + Send + Sync> =
            Box::new(lever_hardware::HwError::Timeout);
        assert!(matches!(map_hw_error(boxed.as_ref()), RigError::Timeout));
    }
}
