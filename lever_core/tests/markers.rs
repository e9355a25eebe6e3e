use std::time::{Duration, Instant};

use lever_core::event::{
    EventCode, EventConsumer, EventPulseTable, ImmediateEmitter, Marker, StateGuard, event_queue,
};
use lever_core::trial::Phase;
use lever_hardware::RecordingPulseOutput;
use lever_traits::{BoxError, PulseOutput};

fn table() -> EventPulseTable {
    EventPulseTable::new(1_000_000, 1)
}

struct BrokenGenerator;

impl PulseOutput for BrokenGenerator {
    fn emit(&mut self, _high: u32, _low: u32) -> Result<(), BoxError> {
        Err("pulse generator offline".into())
    }
}

fn wait_for(mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !done() {
        assert!(Instant::now() < deadline, "timed out waiting for consumer");
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn repeated_entry_marks_once() {
    let out = RecordingPulseOutput::new();
    let mut emitter = ImmediateEmitter::new(out.clone(), table());
    let mut guard = StateGuard::new();

    assert!(guard.enter(Phase::Cue, EventCode::Cue1, &mut emitter));
    assert!(!guard.enter(Phase::Cue, EventCode::Cue1, &mut emitter));
    assert!(guard.enter(Phase::Moving, EventCode::Moving, &mut emitter));

    assert_eq!(out.pulses(), vec![(40_000, 1), (16_000, 1)]);
}

#[test]
fn failed_pulse_is_reported_not_fatal() {
    let mut emitter = ImmediateEmitter::new(BrokenGenerator, table());
    assert!(!emitter.mark(EventCode::Init));
    assert!(emitter.emit(EventCode::Init).is_err());
}

#[test]
fn full_queue_drops_newest() {
    let (tx, rx) = event_queue(8);
    for _ in 0..8 {
        assert!(tx.enqueue(EventCode::Moving));
    }
    assert!(!tx.enqueue(EventCode::Timeout));
    assert_eq!(tx.dropped(), 1);
    // The eight accepted markers are intact.
    assert_eq!(rx.try_iter().count(), 8);
}

#[test]
fn enqueue_after_consumer_gone_counts_as_dropped() {
    let (mut tx, rx) = event_queue(8);
    drop(rx);
    assert!(!tx.mark(EventCode::Reset));
    assert_eq!(tx.dropped(), 1);
}

#[test]
fn consumer_emits_in_fifo_order() {
    let out = RecordingPulseOutput::new();
    let (tx, rx) = event_queue(8);
    let consumer = EventConsumer::spawn(rx, ImmediateEmitter::new(out.clone(), table()), None);

    for code in [EventCode::Init, EventCode::Cue3, EventCode::Moving, EventCode::Reward3] {
        assert!(tx.enqueue(code));
    }
    wait_for(|| out.pulses().len() == 4);
    assert_eq!(consumer.emitted(), 4);

    let widths: Vec<u32> = out.pulses().iter().map(|p| p.0).collect();
    assert_eq!(widths, vec![10_000, 60_000, 16_000, 100_000]);
}

#[test]
fn dropping_consumer_flushes_backlog() {
    let out = RecordingPulseOutput::new();
    let (tx, rx) = event_queue(8);
    let consumer = EventConsumer::spawn(rx, ImmediateEmitter::new(out.clone(), table()), None);
    for _ in 0..5 {
        tx.enqueue(EventCode::Timeout);
    }
    drop(consumer);
    assert_eq!(out.pulses().len(), 5);
}

#[test]
fn consumer_exits_when_producers_are_gone() {
    let out = RecordingPulseOutput::new();
    let (tx, rx) = event_queue(8);
    let consumer = EventConsumer::spawn(rx, ImmediateEmitter::new(out.clone(), table()), None);
    tx.enqueue(EventCode::Init);
    drop(tx);
    // Join must not hang on a disconnected queue.
    drop(consumer);
    assert_eq!(out.pulses(), vec![(10_000, 1)]);
}
