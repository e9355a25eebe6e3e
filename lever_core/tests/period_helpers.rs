// Focused tests for period helpers.
use lever_core::util::{period_ms, period_s, period_us};

#[test]
fn period_us_clamps_and_floors() {
    // hz=500 → the 2 ms control tick
    assert_eq!(period_us(500), 2_000);
    assert_eq!(period_us(1), 1_000_000);
    // Very high hz floors to 1µs minimum
    assert_eq!(period_us(1_000_000), 1);
    assert_eq!(period_us(u32::MAX), 1);
    // hz=0 is treated as 1
    assert_eq!(period_us(0), 1_000_000);
}

#[test]
fn period_ms_minimum() {
    assert_eq!(period_ms(200), 5);
    assert_eq!(period_ms(2), 500);
    // hz>=1000 floors to 0ms but we cap to >=1ms
    assert_eq!(period_ms(1000), 1);
    assert_eq!(period_ms(u32::MAX), 1);
    assert_eq!(period_ms(0), 1000);
}

#[test]
fn period_s_is_control_dt() {
    assert!((period_s(500) - 0.002).abs() < f32::EPSILON);
    assert!((period_s(0) - 1.0).abs() < f32::EPSILON);
}
