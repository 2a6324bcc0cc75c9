// Event queue - bounded SPSC ring between the scan loop and the transport
//
// The producer side lives on the time-critical scanning context and must
// never block: a full queue is reported as a bool and the event is dropped.
// The consumer drains under a time budget and signals one flush to the
// transport per drain that dispatched anything, so the transport can batch
// its wire writes.
//
// Built on an rtrb SPSC ring buffer: each index has a single writer, so the
// two sides may live on different execution contexts without a mutex.

use std::time::{Duration, Instant};

use rtrb::{Consumer, Producer, RingBuffer};
use serde::{Deserialize, Serialize};

/// Default ring capacity; enough for a burst across a full keyboard
pub const DEFAULT_QUEUE_CAPACITY: usize = 128;

/// Kind of outgoing event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    NoteOn,
    NoteOff,
    ControlChange,
}

/// A small fixed-size outgoing event with no identity beyond its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MidiEvent {
    pub kind: EventKind,
    /// MIDI channel 1..=16
    pub channel: u8,
    /// Note number or controller number
    pub data1: u8,
    /// Velocity or controller value
    pub data2: u8,
}

impl MidiEvent {
    pub fn note_on(channel: u8, note: u8, velocity: u8) -> Self {
        Self {
            kind: EventKind::NoteOn,
            channel,
            data1: note,
            data2: velocity,
        }
    }

    pub fn note_off(channel: u8, note: u8) -> Self {
        Self {
            kind: EventKind::NoteOff,
            channel,
            data1: note,
            data2: 0,
        }
    }

    pub fn control_change(channel: u8, controller: u8, value: u8) -> Self {
        Self {
            kind: EventKind::ControlChange,
            channel,
            data1: controller,
            data2: value,
        }
    }
}

/// Downstream consumer of dispatched events
///
/// `send` hands over one event; `flush` tells the transport a drain batch
/// ended and buffered bytes should go on the wire.
pub trait Transport {
    fn send(&mut self, event: &MidiEvent);
    fn flush(&mut self);
}

/// Factory for the producer/consumer pair
pub struct EventQueue;

impl EventQueue {
    /// Create a bounded queue, returning its two endpoints
    ///
    /// # Panics
    /// Panics if `capacity` is 0
    pub fn with_capacity(capacity: usize) -> (EventProducer, EventDrainer) {
        assert!(capacity > 0, "capacity must be greater than 0");
        let (producer, consumer) = RingBuffer::new(capacity);
        (
            EventProducer { inner: producer },
            EventDrainer { inner: consumer },
        )
    }
}

/// Scan-loop side of the queue
pub struct EventProducer {
    inner: Producer<MidiEvent>,
}

impl EventProducer {
    /// Non-blocking enqueue; false means the event was dropped because the
    /// ring is full, and the queue's contents are untouched
    pub fn enqueue(&mut self, event: MidiEvent) -> bool {
        self.inner.push(event).is_ok()
    }

    pub fn is_full(&self) -> bool {
        self.inner.is_full()
    }
}

/// Transport side of the queue
pub struct EventDrainer {
    inner: Consumer<MidiEvent>,
}

impl EventDrainer {
    /// Pop and dispatch events until the ring is empty or the elapsed time
    /// meets `budget`, then flush exactly once if anything was dispatched
    ///
    /// A partially drained ring resumes on the next call; nothing is
    /// dispatched twice or skipped. A zero budget still dispatches at most
    /// one event so a saturated producer can always make progress.
    pub fn drain(&mut self, budget: Duration, transport: &mut dyn Transport) {
        let start = Instant::now();
        let mut dispatched = false;
        while let Ok(event) = self.inner.pop() {
            transport.send(&event);
            dispatched = true;
            if start.elapsed() >= budget {
                break;
            }
        }
        if dispatched {
            transport.flush();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
