//! Event markers: fixed-width pulses whose width identifies a trial event to
//! downstream recording hardware.
//!
//! Two emission paths share one precomputed pulse table:
//! - `ImmediateEmitter` drives the pulse generator synchronously.
//! - `EventSender` pushes onto a bounded queue drained by `EventConsumer`,
//!   a dedicated thread that owns the generator. A full queue drops the
//!   marker with a warning; the producer never blocks.
//!
//! `StateGuard` sits between the state machine and either path so that a
//! state re-entering its own handler on later ticks marks only once.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use crossbeam_channel as xch;
use lever_traits::PulseOutput;

use crate::error::Result;
use crate::hw_error::map_hw_error;

/// Closed set of markable events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventCode {
    Init,
    Cue0,
    Cue1,
    Cue2,
    Cue3,
    Moving,
    Reward0,
    Reward1,
    Reward2,
    Reward3,
    Timeout,
    Reset,
}

pub const EVENT_COUNT: usize = 12;

impl EventCode {
    pub const ALL: [Self; EVENT_COUNT] = [
        Self::Init,
        Self::Cue0,
        Self::Cue1,
        Self::Cue2,
        Self::Cue3,
        Self::Moving,
        Self::Reward0,
        Self::Reward1,
        Self::Reward2,
        Self::Reward3,
        Self::Timeout,
        Self::Reset,
    ];

    /// Pulse width in microseconds. Recording-side decoders depend on
    /// these exact values.
    pub const fn width_us(self) -> u32 {
        match self {
            Self::Init => 10_000,
            Self::Cue0 => 30_000,
            Self::Cue1 => 40_000,
            Self::Cue2 => 50_000,
            Self::Cue3 => 60_000,
            Self::Moving => 16_000,
            Self::Reward0 => 70_000,
            Self::Reward1 => 80_000,
            Self::Reward2 => 90_000,
            Self::Reward3 => 100_000,
            Self::Timeout => 160_000,
            Self::Reset => 12_000,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::Cue0 => "CUE_0",
            Self::Cue1 => "CUE_1",
            Self::Cue2 => "CUE_2",
            Self::Cue3 => "CUE_3",
            Self::Moving => "MOVING",
            Self::Reward0 => "REWARD_0",
            Self::Reward1 => "REWARD_1",
            Self::Reward2 => "REWARD_2",
            Self::Reward3 => "REWARD_3",
            Self::Timeout => "TIMEOUT",
            Self::Reset => "RESET",
        }
    }

    /// Cue marker for a tier; tiers past the table share the last code.
    pub const fn cue(tier: u8) -> Self {
        match tier {
            0 => Self::Cue0,
            1 => Self::Cue1,
            2 => Self::Cue2,
            _ => Self::Cue3,
        }
    }

    pub const fn reward(tier: u8) -> Self {
        match tier {
            0 => Self::Reward0,
            1 => Self::Reward1,
            2 => Self::Reward2,
            _ => Self::Reward3,
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

impl core::fmt::Display for EventCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// One pulse in generator ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PulseDescriptor {
    pub level_high_ticks: u32,
    pub trailing_low_ticks: u32,
}

/// Immutable code-to-pulse table, built once at init.
#[derive(Debug, Clone)]
pub struct EventPulseTable {
    descriptors: [PulseDescriptor; EVENT_COUNT],
    resolution_hz: u32,
}

impl EventPulseTable {
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(resolution_hz: u32, trailing_low_ticks: u32) -> Self {
        let mut descriptors = [PulseDescriptor::default(); EVENT_COUNT];
        for code in EventCode::ALL {
            let ticks = u64::from(code.width_us()) * u64::from(resolution_hz) / 1_000_000;
            descriptors[code.index()] = PulseDescriptor {
                level_high_ticks: ticks.min(u64::from(u32::MAX)) as u32,
                trailing_low_ticks,
            };
        }
        Self {
            descriptors,
            resolution_hz,
        }
    }

    pub fn get(&self, code: EventCode) -> PulseDescriptor {
        self.descriptors[code.index()]
    }

    pub fn resolution_hz(&self) -> u32 {
        self.resolution_hz
    }
}

/// Anything that can mark an event. Returns whether the marker went out
/// (or was accepted for emission).
pub trait Marker {
    fn mark(&mut self, code: EventCode) -> bool;
}

impl<T: Marker + ?Sized> Marker for Box<T> {
    fn mark(&mut self, code: EventCode) -> bool {
        (**self).mark(code)
    }
}

/// Synchronous emission on the caller's thread.
pub struct ImmediateEmitter<P: PulseOutput> {
    out: P,
    table: EventPulseTable,
}

impl<P: PulseOutput> core::fmt::Debug for ImmediateEmitter<P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ImmediateEmitter")
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

impl<P: PulseOutput> ImmediateEmitter<P> {
    pub fn new(out: P, table: EventPulseTable) -> Self {
        Self { out, table }
    }

    pub fn emit(&mut self, code: EventCode) -> Result<()> {
        let d = self.table.get(code);
        self.out
            .emit(d.level_high_ticks, d.trailing_low_ticks)
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)).wrap_err(format!("emit {code}")))
    }
}

impl<P: PulseOutput> Marker for ImmediateEmitter<P> {
    fn mark(&mut self, code: EventCode) -> bool {
        match self.emit(code) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, %code, "marker pulse failed");
                false
            }
        }
    }
}

/// Producer side of the marker queue.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: xch::Sender<EventCode>,
    dropped: Arc<AtomicU64>,
}

/// Create the bounded marker queue.
pub fn event_queue(capacity: usize) -> (EventSender, xch::Receiver<EventCode>) {
    let (tx, rx) = xch::bounded(capacity.max(1));
    (
        EventSender {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        },
        rx,
    )
}

impl EventSender {
    /// Queue `code` without waiting. Returns false when it was dropped.
    pub fn enqueue(&self, code: EventCode) -> bool {
        match self.tx.try_send(code) {
            Ok(()) => true,
            Err(xch::TrySendError::Full(_)) => {
                let n = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(%code, dropped = n, "event queue full; dropping marker");
                false
            }
            Err(xch::TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(%code, "event consumer gone; dropping marker");
                false
            }
        }
    }

    /// Markers dropped so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Marker for EventSender {
    fn mark(&mut self, code: EventCode) -> bool {
        self.enqueue(code)
    }
}

/// Dedicated thread that owns the pulse generator and drains the queue in
/// FIFO order.
///
/// The thread is shut down and joined when the consumer is dropped; markers
/// still queued at that point are emitted first.
pub struct EventConsumer {
    shutdown: Arc<AtomicBool>,
    emitted: Arc<AtomicU64>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

const CONSUMER_POLL: Duration = Duration::from_millis(20);

impl EventConsumer {
    pub fn spawn<P: PulseOutput + Send + 'static>(
        rx: xch::Receiver<EventCode>,
        mut emitter: ImmediateEmitter<P>,
        rt_priority: Option<i32>,
    ) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let emitted = Arc::new(AtomicU64::new(0));
        let emitted_clone = emitted.clone();

        let join_handle = std::thread::spawn(move || {
            raise_priority(rt_priority);
            loop {
                match rx.recv_timeout(CONSUMER_POLL) {
                    Ok(code) => {
                        if emitter.mark(code) {
                            emitted_clone.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    Err(xch::RecvTimeoutError::Timeout) => {}
                    Err(xch::RecvTimeoutError::Disconnected) => {
                        tracing::debug!("event producers gone, consumer exiting");
                        break;
                    }
                }
                if shutdown_clone.load(Ordering::Relaxed) {
                    for code in rx.try_iter() {
                        if emitter.mark(code) {
                            emitted_clone.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    tracing::debug!("event consumer received shutdown signal");
                    break;
                }
            }
            tracing::trace!("event consumer exiting cleanly");
        });

        Self {
            shutdown,
            emitted,
            join_handle: Some(join_handle),
        }
    }

    /// Pulses actually driven by the consumer thread.
    pub fn emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }
}

impl Drop for EventConsumer {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(()) => tracing::trace!("event consumer joined"),
                Err(e) => tracing::warn!(?e, "event consumer panicked during shutdown"),
            }
        }
    }
}

#[cfg(feature = "rt")]
fn raise_priority(prio: Option<i32>) {
    match lever_hardware::rt::set_thread_fifo(prio) {
        Ok(applied) => tracing::info!(priority = applied, "event consumer on SCHED_FIFO"),
        Err(e) => tracing::warn!(error = %e, "event consumer keeps normal scheduling"),
    }
}

#[cfg(not(feature = "rt"))]
fn raise_priority(prio: Option<i32>) {
    if prio.is_some() {
        tracing::debug!("rt feature disabled; event consumer priority unchanged");
    }
}

/// Marks each distinct state transition exactly once.
#[derive(Debug, Clone)]
pub struct StateGuard<S> {
    current: Option<S>,
}

impl<S> Default for StateGuard<S> {
    fn default() -> Self {
        Self { current: None }
    }
}

impl<S: Copy + PartialEq> StateGuard<S> {
    pub fn new() -> Self {
        Self { current: None }
    }

    /// Move to `next`, marking `code` if this is a change. Returns whether
    /// the transition happened.
    pub fn enter<M: Marker + ?Sized>(&mut self, next: S, code: EventCode, marker: &mut M) -> bool {
        if self.current == Some(next) {
            return false;
        }
        self.current = Some(next);
        marker.mark(code);
        true
    }

    /// Move to `next` without marking.
    pub fn enter_silent(&mut self, next: S) -> bool {
        if self.current == Some(next) {
            return false;
        }
        self.current = Some(next);
        true
    }

    pub fn current(&self) -> Option<S> {
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_scales_with_resolution() {
        let t = EventPulseTable::new(10_000_000, 1);
        assert_eq!(t.get(EventCode::Init).level_high_ticks, 100_000);
        assert_eq!(t.get(EventCode::Timeout).level_high_ticks, 1_600_000);
        let t = EventPulseTable::new(1_000_000, 1);
        assert_eq!(t.get(EventCode::Reward3).level_high_ticks, 100_000);
        assert_eq!(t.get(EventCode::Reward3).trailing_low_ticks, 1);
    }

    #[test]
    fn every_code_has_a_distinct_width() {
        let mut widths: Vec<u32> = EventCode::ALL.iter().map(|c| c.width_us()).collect();
        widths.sort_unstable();
        widths.dedup();
        assert_eq!(widths.len(), EVENT_COUNT);
    }

    #[test]
    fn tier_codes_saturate() {
        assert_eq!(EventCode::cue(2), EventCode::Cue2);
        assert_eq!(EventCode::reward(9), EventCode::Reward3);
        assert_eq!(EventCode::Reward1.to_string(), "REWARD_1");
    }

    struct Count(u32);
    impl Marker for Count {
        fn mark(&mut self, _code: EventCode) -> bool {
            self.0 += 1;
            true
        }
    }

    #[test]
    fn silent_entry_still_dedups() {
        let mut g = StateGuard::new();
        let mut m = Count(0);
        assert!(g.enter_silent(1u8));
        assert!(!g.enter(1u8, EventCode::Init, &mut m));
        assert!(g.enter(2u8, EventCode::Cue0, &mut m));
        assert_eq!(m.0, 1);
        assert_eq!(g.current(), Some(2));
    }
}
