#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse errors and validation errors are fine; panics are not.
    if let Ok(cfg) = toml::from_str::<lever_config::Config>(data)
        && cfg.validate().is_ok()
    {
        // Conversions of an accepted config must not panic either.
        let _trial = lever_core::TrialConfig::from(&cfg);
        let _board = lever_core::BoardParams::from(&cfg);
    }
});
