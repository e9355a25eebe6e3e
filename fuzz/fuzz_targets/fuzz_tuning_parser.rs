#![no_main]
use libfuzzer_sys::fuzz_target;
use lever_core::TuningCommand;

fuzz_target!(|line: &str| {
    // Accepted values must be finite; targets must be whole counts.
    match TuningCommand::parse(line) {
        Some(
            TuningCommand::SetKp(v)
            | TuningCommand::SetKi(v)
            | TuningCommand::SetKd(v)
            | TuningCommand::SetViscous(v),
        ) => assert!(v.is_finite()),
        _ => {}
    }
});
