//! Human-readable error descriptions and structured JSON error formatting.

/// Context attached to every config load failure; `humanize` keys on it.
pub const CONFIG_CONTEXT: &str = "invalid configuration";

fn is_config_error(err: &eyre::Report) -> bool {
    err.chain()
        .any(|e| e.to_string().starts_with(CONFIG_CONTEXT))
}

/// Map an `eyre::Report` to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    use lever_core::error::{BuildError, ProtocolError, RigError};
    use lever_hardware::HwError;

    if is_config_error(err) {
        let detail = err.root_cause();
        return format!(
            "What happened: Invalid configuration ({detail}).\nLikely causes: Missing file, TOML syntax error, or an out-of-range value.\nHow to fix: Edit the config file (see etc/lever_rig.toml for a sample), then rerun."
        );
    }

    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingActuator => {
                "What happened: No actuator was provided to the trial controller.\nLikely causes: The motor driver failed to initialize or was not wired into the builder.\nHow to fix: Ensure the motor is created successfully and passed via with_actuator(...).".to_string()
            }
            BuildError::MissingMarker => {
                "What happened: No event marker was provided to the trial controller.\nLikely causes: The marker output pin failed to initialize.\nHow to fix: Check pins.event_out and GPIO permissions.".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid trial configuration ({msg}).\nLikely causes: Out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun."
            ),
        };
    }

    if let Some(hw) = err.downcast_ref::<HwError>() {
        return match hw {
            HwError::Serial(_) | HwError::Timeout | HwError::ShortRead { .. } => format!(
                "What happened: Motor board serial link failed ({hw}).\nLikely causes: Wrong protocol.port, board unpowered, or baud mismatch.\nHow to fix: Check the cable and [protocol] port/baud, or set protocol.enabled = false."
            ),
            HwError::Realtime(_) => format!(
                "What happened: Real-time setup failed ({hw}).\nLikely causes: Missing CAP_SYS_NICE or a low memlock ulimit.\nHow to fix: Run with the needed privileges, or drop --rt."
            ),
            _ => format!(
                "What happened: Failed to initialize hardware ({hw}).\nLikely causes: Incorrect pin numbers or insufficient GPIO/I2C permissions.\nHow to fix: Fix the [pins] values in the config; ensure the process may access GPIO and I2C."
            ),
        };
    }

    if let Some(re) = err.downcast_ref::<RigError>() {
        return match re {
            RigError::Timeout | RigError::Protocol(ProtocolError::Timeout(_)) => {
                "What happened: A device did not answer in time.\nLikely causes: Motor board unpowered or protocol.read_timeout_ms too low.\nHow to fix: Verify power and wiring, and consider raising protocol.read_timeout_ms.".to_string()
            }
            RigError::Protocol(pe) => format!(
                "What happened: Motor board sent a corrupt response ({pe}).\nLikely causes: Electrical noise on the serial line or a baud mismatch.\nHow to fix: Check grounding and protocol.baud."
            ),
            RigError::Hardware(msg) | RigError::HardwareFault(msg) => format!(
                "What happened: Hardware error ({msg}).\nLikely causes: Wiring, power, or a device fault.\nHow to fix: Inspect the rig, then rerun with --log-level=debug."
            ),
            _ => format!(
                "What happened: {re}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    // Generic fallback
    let msg = err.to_string();
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Error: {msg}"
    )
}

/// Stable machine name for the error category.
pub fn reason_name(err: &eyre::Report) -> &'static str {
    use lever_core::error::{BuildError, RigError};
    use lever_hardware::HwError;

    if is_config_error(err) {
        return "Config";
    }
    if err.downcast_ref::<BuildError>().is_some() {
        return "Build";
    }
    if let Some(hw) = err.downcast_ref::<HwError>() {
        return match hw {
            HwError::Serial(_) | HwError::Timeout | HwError::ShortRead { .. } => "Serial",
            HwError::Realtime(_) => "Realtime",
            _ => "Hardware",
        };
    }
    match err.downcast_ref::<RigError>() {
        Some(RigError::Timeout) => "Timeout",
        Some(RigError::Protocol(_)) => "Protocol",
        Some(RigError::Hardware(_) | RigError::HardwareFault(_)) => "Hardware",
        _ => "Error",
    }
}

/// Stable exit codes per error category; 2 is left to clap usage errors.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    match reason_name(err) {
        "Config" | "Build" => 3,
        "Hardware" | "Realtime" => 4,
        "Serial" | "Protocol" | "Timeout" => 5,
        _ => 1,
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    serde_json::json!({
        "reason": reason_name(err),
        "message": humanize(err),
        "exit_code": exit_code_for_error(err),
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use eyre::WrapErr;
    use lever_core::error::{BuildError, ProtocolError, RigError};

    #[test]
    fn config_errors_name_the_failing_key() {
        let err = Err::<(), _>(eyre::eyre!("control.loop_hz must be in [1, 10000]"))
            .wrap_err(CONFIG_CONTEXT)
            .unwrap_err();
        let msg = humanize(&err);
        assert!(msg.starts_with("What happened: Invalid configuration (control.loop_hz"));
        assert_eq!(exit_code_for_error(&err), 3);
    }

    #[test]
    fn typed_errors_map_to_categories() {
        let build = eyre::Report::new(BuildError::MissingActuator);
        assert_eq!(reason_name(&build), "Build");

        let proto = eyre::Report::new(RigError::Protocol(ProtocolError::CrcMismatch {
            expected: 1,
            got: 2,
        }));
        assert_eq!(reason_name(&proto), "Protocol");
        assert_eq!(exit_code_for_error(&proto), 5);
        assert!(humanize(&proto).contains("corrupt response"));

        let timeout = eyre::Report::new(RigError::Timeout);
        assert!(humanize(&timeout).contains("did not answer"));
    }

    #[test]
    fn json_error_is_parseable() {
        let err = eyre::Report::new(lever_hardware::HwError::Gpio("pin 99".into()));
        let v: serde_json::Value = serde_json::from_str(&format_error_json(&err)).unwrap();
        assert_eq!(v["reason"], "Hardware");
        assert_eq!(v["exit_code"], 4);
        assert!(v["message"].as_str().unwrap().contains("pin 99"));
    }

    #[test]
    fn unknown_errors_fall_back_to_generic_text() {
        let err = eyre::eyre!("boom");
        assert_eq!(exit_code_for_error(&err), 1);
        assert!(humanize(&err).contains("Error: boom"));
    }
}
