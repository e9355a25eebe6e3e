//! Sampler thread lifecycle: publishing, mirroring and clean joins.

use std::sync::Arc;
use std::time::{Duration, Instant};

use lever_core::analog::AnalogMirror;
use lever_core::encoder::{PositionSource, PositionTracker};
use lever_core::mocks::NoopCounter;
use lever_core::sampler::Sampler;
use lever_core::shared::SharedState;
use lever_hardware::RecordingDac;
use lever_traits::Dac;
use lever_traits::clock::MonotonicClock;

/// Walks outward one count per read.
struct Ramp(i32);

impl PositionSource for Ramp {
    fn read_position(&mut self) -> lever_core::error::Result<i32> {
        self.0 += 1;
        Ok(self.0)
    }
}

/// Fails every other read.
struct Flaky(u32);

impl PositionSource for Flaky {
    fn read_position(&mut self) -> lever_core::error::Result<i32> {
        self.0 += 1;
        if self.0 % 2 == 0 {
            eyre::bail!("encoder glitch");
        }
        Ok(7)
    }
}

fn wait_for(mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !done() {
        assert!(Instant::now() < deadline, "sampler made no progress");
        std::thread::sleep(Duration::from_millis(2));
    }
}

#[test]
fn sampler_thread_exits_on_drop() {
    let shared = Arc::new(SharedState::new());
    let sampler = Sampler::spawn(
        PositionTracker::new(NoopCounter),
        Duration::from_millis(5),
        MonotonicClock::new(),
        shared.clone(),
        None,
    );
    wait_for(|| sampler.samples() > 0);
    drop(sampler);

    // Nothing publishes once the thread is joined.
    let seq = shared.snapshot().seq;
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(shared.snapshot().seq, seq);
}

#[test]
fn multiple_samplers_dont_leak_threads() {
    for _ in 0..10 {
        let shared = Arc::new(SharedState::new());
        let sampler = Sampler::spawn(
            Ramp(0),
            Duration::from_millis(1),
            MonotonicClock::new(),
            shared,
            None,
        );
        std::thread::sleep(Duration::from_millis(3));
        drop(sampler);
    }
}

#[test]
fn readings_are_published_in_order() {
    let shared = Arc::new(SharedState::new());
    let sampler = Sampler::spawn(
        Ramp(0),
        Duration::from_millis(1),
        MonotonicClock::new(),
        shared.clone(),
        None,
    );
    wait_for(|| shared.snapshot().seq >= 5);
    let a = shared.snapshot();
    wait_for(|| shared.snapshot().seq > a.seq);
    let b = shared.snapshot();
    drop(sampler);

    // Ramp position equals the number of reads so far.
    assert_eq!(i64::from(a.position), i64::try_from(a.seq).unwrap());
    assert!(b.position > a.position);
    assert!(b.sampled_at_ms >= a.sampled_at_ms);
}

#[test]
fn read_errors_are_counted_and_skipped() {
    let shared = Arc::new(SharedState::new());
    let sampler = Sampler::spawn(
        Flaky(0),
        Duration::from_millis(1),
        MonotonicClock::new(),
        shared.clone(),
        None,
    );
    wait_for(|| sampler.errors() >= 3);
    assert!(sampler.samples() >= 2);
    assert_eq!(shared.snapshot().position, 7);
}

#[test]
fn analog_mirror_follows_samples() {
    let dac = RecordingDac::new();
    let mirror: AnalogMirror<Box<dyn Dac + Send>> = AnalogMirror::new(Box::new(dac.clone()), 200);
    let shared = Arc::new(SharedState::new());
    let sampler = Sampler::spawn(
        PositionTracker::new(NoopCounter),
        Duration::from_millis(1),
        MonotonicClock::new(),
        shared,
        Some(mirror),
    );
    wait_for(|| sampler.samples() >= 3);
    drop(sampler);
    // Constant position, so the code is written once.
    assert_eq!(dac.codes(), vec![2047]);
}
