use lever_core::TrialController;
use lever_core::error::BuildError;
use lever_core::event::{EventCode, Marker};
use lever_core::mocks::NullActuator;
use lever_core::{Tier, TrialConfig};
use rstest::rstest;

struct Quiet;

impl Marker for Quiet {
    fn mark(&mut self, _code: EventCode) -> bool {
        true
    }
}

#[rstest]
fn builder_missing_actuator_yields_typed_build_error() {
    let err = TrialController::builder()
        // missing with_actuator()
        .with_marker(Quiet)
        .try_build()
        .expect_err("should fail with MissingActuator");

    match err.downcast_ref::<BuildError>() {
        Some(BuildError::MissingActuator) => {}
        other => panic!("expected MissingActuator, got: {other:?}"),
    }
}

fn five_tiers(cfg: &mut TrialConfig) {
    let t = Tier {
        threshold: -25,
        pulses: 1,
        cue_hz: 1000,
        damping: 0.0,
    };
    cfg.tiers = vec![t; 5];
}

#[rstest]
#[case::too_many_tiers(five_tiers as fn(&mut TrialConfig))]
#[case::fixed_tier_out_of_range(|c: &mut TrialConfig| c.timings.fixed_tier = Some(4))]
#[case::zero_loop_rate(|c: &mut TrialConfig| c.control.loop_hz = 0)]
#[case::zero_half_period(|c: &mut TrialConfig| c.reward.half_period_ms = 0)]
#[case::negative_tolerance(|c: &mut TrialConfig| c.timings.reset_tolerance = -1)]
#[case::zero_limit(|c: &mut TrialConfig| c.safety.mechanical_limit = 0)]
#[case::negative_deadzone(|c: &mut TrialConfig| c.control.deadzone = -2)]
fn invalid_config_is_rejected(#[case] tweak: fn(&mut TrialConfig)) {
    let mut cfg = TrialConfig::default();
    tweak(&mut cfg);
    let err = TrialController::builder()
        .with_actuator(NullActuator)
        .with_marker(Quiet)
        .with_config(cfg)
        .build()
        .expect_err("config should be rejected");
    assert!(
        matches!(err.downcast_ref::<BuildError>(), Some(BuildError::InvalidConfig(_))),
        "got: {err:?}"
    );
}

#[test]
fn defaults_build() {
    let ctrl = TrialController::builder()
        .with_actuator(NullActuator)
        .with_marker(Quiet)
        .build()
        .unwrap();
    assert_eq!(ctrl.config().tiers.len(), 4);
    assert!(!ctrl.is_paused());
}
