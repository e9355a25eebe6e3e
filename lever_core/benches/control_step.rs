use std::sync::Arc;

use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use lever_core::control::{ControlLaw, MotionController, PidController, ViscousField};
use lever_core::event::{EventCode, Marker};
use lever_core::mocks::NullActuator;
use lever_core::telemetry::MemorySink;
use lever_core::{TrialConfig, TrialController};
use lever_traits::clock::ManualClock;

// Synthetic lever trace: slow pull and release with a little jitter
fn synth_positions(n: usize, seed: u32) -> Vec<i32> {
    let mut state = seed.max(1);
    let mut jitter = || {
        let mut x = state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        state = x;
        (x % 5) as i32 - 2
    };
    (0..n)
        .map(|i| {
            let t = i as f32 / 500.0;
            (-60.0 * (t * 1.5).sin()) as i32 + jitter()
        })
        .collect()
}

struct Discard;

impl Marker for Discard {
    fn mark(&mut self, _code: EventCode) -> bool {
        true
    }
}

fn sample_size(g: &mut criterion::BenchmarkGroup<'_, criterion::measurement::WallTime>) {
    // Allow quick tweaking without CLI flags (Criterion 0.5):
    //   BENCH_SAMPLE_SIZE=10 BENCH_MEAS_MS=50 cargo bench -p lever_core --bench control_step
    if let Ok(ss) = std::env::var("BENCH_SAMPLE_SIZE")
        && let Ok(n) = ss.parse::<usize>()
    {
        g.sample_size(n.max(1));
    } else {
        g.sample_size(50);
    }
    if let Ok(ms) = std::env::var("BENCH_MEAS_MS")
        && let Ok(ms_u64) = ms.parse::<u64>()
    {
        g.measurement_time(std::time::Duration::from_millis(ms_u64));
    }
}

pub fn bench_laws(c: &mut Criterion) {
    let mut g = c.benchmark_group("control_laws");
    sample_size(&mut g);
    let trace = synth_positions(10_000, 0xC0FFEE);

    for (name, law) in [
        ("viscous", ControlLaw::Viscous),
        ("hold_pid", ControlLaw::HoldPid(0)),
        ("ramped_pid", ControlLaw::RampedPid),
    ] {
        g.bench_function(name, |b| {
            b.iter_batched(
                || {
                    let mut mc = MotionController::new(
                        PidController::new(0.21, 0.001, 0.003, 5, 0.002),
                        ViscousField::new(0.02, 0.003, 0.002),
                    );
                    mc.ramp.prime(0, 50, 80.0, 0.002, 0, 0);
                    mc
                },
                |mut mc| {
                    for (k, &p) in trace.iter().enumerate() {
                        black_box(mc.step(law, black_box(p), 2 * k as u64));
                    }
                },
                BatchSize::SmallInput,
            )
        });
    }
    g.finish();
}

pub fn bench_orchestrator(c: &mut Criterion) {
    let mut g = c.benchmark_group("orchestrator");
    sample_size(&mut g);
    let trace = synth_positions(5_000, 0xBEEF);

    g.bench_function("step_10s", |b| {
        b.iter_batched(
            || {
                let clock = ManualClock::new();
                let mut ctrl = TrialController::builder()
                    .with_actuator(NullActuator)
                    .with_marker(Discard)
                    .with_telemetry(MemorySink::new())
                    .with_clock(Arc::new(clock.clone()))
                    .with_config(TrialConfig::default())
                    .build()
                    .unwrap();
                ctrl.begin();
                (ctrl, clock)
            },
            |(mut ctrl, clock)| {
                for &p in &trace {
                    clock.advance_ms(2);
                    black_box(ctrl.step(black_box(p)).unwrap());
                }
            },
            BatchSize::SmallInput,
        )
    });
    g.finish();
}

criterion_group!(control_step, bench_laws, bench_orchestrator);
criterion_main!(control_step);
