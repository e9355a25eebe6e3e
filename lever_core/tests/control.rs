use lever_core::control::{ControlLaw, MotionController, PidController, SetpointRamp, ViscousField};
use rstest::rstest;

const DT: f32 = 0.002;

#[test]
fn saturated_step_does_not_wind_up() {
    let mut pid = PidController::new(1.0, 1.0, 0.0, 0, DT);
    for _ in 0..500 {
        assert_eq!(pid.step(0, 200.0), 100.0);
    }
    // Every raw sum was clamped, so nothing was integrated.
    assert_eq!(pid.state().integral, 0.0);
    assert_eq!(pid.state().last_error, 200.0);

    // Back inside the limits the integrator picks up where it should.
    let out = pid.step(0, 50.0);
    assert!((pid.state().integral - 0.1).abs() < 1e-6);
    assert!((out - 50.1).abs() < 1e-4);
}

#[test]
fn negative_saturation_also_holds_integral() {
    let mut pid = PidController::new(2.0, 5.0, 0.0, 0, DT);
    pid.set_memory(1.5, 0.0);
    assert_eq!(pid.step(100, 0.0), -100.0);
    assert_eq!(pid.state().integral, 1.5);
}

#[rstest]
#[case(3, 5)]
#[case(-5, 5)]
#[case(0, 0)]
fn deadzone_brakes_and_forgets(#[case] error: i32, #[case] deadzone: i32) {
    let mut pid = PidController::new(0.5, 0.2, 0.1, deadzone, DT);
    pid.set_memory(7.0, 4.0);
    let out = pid.step(100 - error, 100.0);
    assert_eq!(out, 0.0);
    let s = pid.state();
    assert_eq!((s.integral, s.last_error), (0.0, 0.0));
}

#[test]
fn just_outside_deadzone_acts() {
    let mut pid = PidController::new(0.5, 0.0, 0.0, 5, DT);
    assert!((pid.step(94, 100.0) - 3.0).abs() < 1e-6);
}

#[test]
fn derivative_uses_last_error() {
    let mut pid = PidController::new(0.0, 0.0, 0.01, 0, DT);
    pid.set_memory(0.0, 10.0);
    // (20 - 10) / 0.002 * 0.01 = 50
    assert!((pid.step(0, 20.0) - 50.0).abs() < 1e-3);
}

#[test]
fn negative_deadzone_setting_is_clamped() {
    let mut pid = PidController::new(1.0, 0.0, 0.0, 5, DT);
    pid.set_deadzone(-3);
    assert_eq!(pid.state().deadzone, 0);
}

#[test]
fn viscous_filter_tracks_constant_velocity() {
    let mut field = ViscousField::new(0.02, 0.01, DT);
    field.prime(0);
    // 1 count per tick = 500 counts/s
    let mut out = 0.0;
    for k in 1..=200 {
        out = field.step(k);
    }
    assert!((field.state().last_filtered_velocity - 500.0).abs() < 1.0);
    assert!((out + 5.0).abs() < 0.01);
}

#[test]
fn zero_tau_uses_raw_velocity() {
    let mut field = ViscousField::new(0.0, 1.0, DT);
    assert_eq!(field.alpha(), 1.0);
    field.prime(10);
    // One count in one tick is 500 counts/s, unfiltered.
    assert_eq!(field.step(11), -100.0);
}

#[test]
fn ramp_is_rate_limited() {
    let mut ramp = SetpointRamp::new();
    ramp.prime(0, 10, 1000.0, DT, 0, 0);
    let steps: Vec<f32> = (0..6).map(|t| ramp.advance(t).unwrap()).collect();
    assert_eq!(steps, vec![2.0, 4.0, 6.0, 8.0, 10.0, 10.0]);
    assert!(ramp.reached());
}

#[test]
fn ramped_pid_is_idle_until_delay() {
    let mut mc = MotionController::new(
        PidController::new(1.0, 0.0, 0.0, 0, DT),
        ViscousField::new(0.02, 0.0, DT),
    );
    mc.ramp.prime(0, 50, 80.0, DT, 100, 1_000);
    assert_eq!(mc.step(ControlLaw::RampedPid, 0, 1_050), 0.0);
    let out = mc.step(ControlLaw::RampedPid, 0, 1_100);
    // First step moves the setpoint 0.16 counts.
    assert!((out - 0.16).abs() < 1e-4);
}

#[test]
fn hold_pid_drives_toward_target() {
    let mut mc = MotionController::new(
        PidController::new(0.21, 0.001, 0.003, 5, DT),
        ViscousField::new(0.02, 0.0, DT),
    );
    assert!(mc.step(ControlLaw::HoldPid(0), 40, 0) < 0.0);
    assert!(mc.step(ControlLaw::HoldPid(0), -40, 2) > 0.0);
    assert_eq!(mc.step(ControlLaw::HoldPid(0), 3, 4), 0.0);
}
