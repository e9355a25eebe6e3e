use std::time::{Duration, Instant};

/// Busy-wait for `d`. Used where a sleep would add scheduler jitter to a
/// pulse edge (sub-millisecond widths).
#[inline]
pub fn spin_for(d: Duration) {
    let deadline = Instant::now() + d;
    while Instant::now() < deadline {
        std::hint::spin_loop();
    }
}

/// Convert generator ticks at `resolution_hz` into a wall-clock duration.
#[inline]
pub fn ticks_to_duration(ticks: u32, resolution_hz: u32) -> Duration {
    let nanos = u64::from(ticks) * 1_000_000_000 / u64::from(resolution_hz.max(1));
    Duration::from_nanos(nanos)
}

/// Sleep for most of `d`, then spin the final `spin_margin` so the wake-up
/// edge lands close to the deadline without burning a core for long pulses.
pub fn sleep_then_spin(d: Duration, spin_margin: Duration) {
    let deadline = Instant::now() + d;
    if d > spin_margin {
        std::thread::sleep(d - spin_margin);
    }
    let remaining = deadline.saturating_duration_since(Instant::now());
    spin_for(remaining);
}
