//! Note scheduler
//!
//! A dedicated dispatcher thread owns the MIDI sink. The sampling loop hands
//! it commands over an unbounded channel and never waits on it; delayed
//! messages (note-offs, jittered note-ons) sit in a deadline-ordered queue on
//! the dispatcher side and fire when due, however busy the sampling loop is.
//!
//! Failed sends are logged and dropped, never retried.

use crate::midi::{MidiMessage, MidiSink};
use crate::notes::NoteEvent;
use crossbeam::channel::{unbounded, RecvTimeoutError, Sender};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// A message waiting for its deadline
#[derive(Debug, Clone, Copy)]
struct Pending {
    fire_at: Instant,
    /// Insertion order; keeps equal deadlines FIFO and identical messages distinct
    seq: u64,
    msg: MidiMessage,
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.fire_at == other.fire_at && self.seq == other.seq
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    // Reversed so the max-heap pops the earliest deadline
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .fire_at
            .cmp(&self.fire_at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Deadline-ordered queue of delayed messages
#[derive(Debug, Default)]
pub struct PendingQueue {
    heap: BinaryHeap<Pending>,
    next_seq: u64,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, fire_at: Instant, msg: MidiMessage) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Pending { fire_at, seq, msg });
    }

    /// Remove and return every message due at or before `now`, earliest first
    pub fn pop_due(&mut self, now: Instant) -> Vec<MidiMessage> {
        let mut due = Vec::new();
        while let Some(top) = self.heap.peek() {
            if top.fire_at > now {
                break;
            }
            if let Some(p) = self.heap.pop() {
                due.push(p.msg);
            }
        }
        due
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.heap.peek().map(|p| p.fire_at)
    }

    /// Empty the queue, earliest first
    pub fn drain(&mut self) -> Vec<MidiMessage> {
        let mut all = Vec::with_capacity(self.heap.len());
        while let Some(p) = self.heap.pop() {
            all.push(p.msg);
        }
        all
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

/// Commands sent to the dispatcher thread
#[derive(Debug, Clone)]
enum Command {
    Send(MidiMessage),
    At(Instant, MidiMessage),
    Shutdown,
}

/// Delivery counters reported when the dispatcher stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub sent: u64,
    pub dropped: u64,
}

/// Sends notes and control changes without blocking the caller
pub struct NoteScheduler {
    sender: Sender<Command>,
    handle: Option<thread::JoinHandle<DispatchStats>>,
    channel: u8,
}

impl NoteScheduler {
    /// Start the dispatcher thread. With `panic` set, All Sound Off / All
    /// Notes Off go out on every channel first and again at shutdown.
    pub fn spawn(sink: Box<dyn MidiSink>, channel: u8, panic: bool) -> Self {
        let (sender, receiver) = unbounded::<Command>();

        let handle = thread::Builder::new()
            .name("phytophon-scheduler".to_string())
            .spawn(move || {
                let mut dispatcher = Dispatcher::new(sink);
                if panic {
                    dispatcher.panic();
                }

                let mut queue = PendingQueue::new();
                loop {
                    for msg in queue.pop_due(Instant::now()) {
                        dispatcher.deliver(&msg);
                    }

                    let cmd = match queue.next_deadline() {
                        Some(at) => receiver.recv_deadline(at),
                        None => receiver.recv().map_err(|_| RecvTimeoutError::Disconnected),
                    };

                    match cmd {
                        Ok(Command::Send(msg)) => dispatcher.deliver(&msg),
                        Ok(Command::At(at, msg)) => queue.push(at, msg),
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(Command::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }

                // Outstanding note-offs still go out; notes that never started stay silent
                let pending = queue.drain();
                if !pending.is_empty() {
                    info!("Flushing {} pending messages", pending.len());
                }
                for msg in pending {
                    if let MidiMessage::NoteOff { .. } = msg {
                        dispatcher.deliver(&msg);
                    }
                }
                if panic {
                    dispatcher.panic();
                }
                dispatcher.stats
            })
            .ok();

        if handle.is_none() {
            warn!("Could not start scheduler thread; MIDI output disabled");
        }

        Self {
            sender,
            handle,
            channel,
        }
    }

    /// Play a note: note-on after its onset delay, note-off `hold_duration`
    /// later. Returns immediately.
    pub fn fire(&self, note: &NoteEvent) {
        let now = Instant::now();
        let on = MidiMessage::NoteOn {
            channel: self.channel,
            note: note.pitch.min(127),
            velocity: note.velocity.clamp(1, 127),
        };
        let off = MidiMessage::NoteOff {
            channel: self.channel,
            note: note.pitch.min(127),
        };

        let onset = seconds(note.onset_delay);
        if onset.is_zero() {
            self.submit(Command::Send(on));
        } else {
            self.submit(Command::At(now + onset, on));
        }
        self.submit(Command::At(now + onset + seconds(note.hold_duration), off));
    }

    pub fn control(&self, controller: u8, value: u8) {
        self.submit(Command::Send(MidiMessage::ControlChange {
            channel: self.channel,
            controller: controller.min(127),
            value: value.min(127),
        }));
    }

    /// Stop the dispatcher after flushing pending note-offs
    pub fn shutdown(mut self) -> DispatchStats {
        self.stop()
    }

    fn stop(&mut self) -> DispatchStats {
        let _ = self.sender.send(Command::Shutdown);
        match self.handle.take() {
            Some(handle) => handle.join().unwrap_or_default(),
            None => DispatchStats::default(),
        }
    }

    fn submit(&self, cmd: Command) {
        if self.sender.send(cmd).is_err() {
            debug!("Scheduler is gone; dropping message");
        }
    }
}

impl Drop for NoteScheduler {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.stop();
        }
    }
}

/// Negative and non-finite durations collapse to zero
fn seconds(s: f64) -> Duration {
    if s.is_finite() && s > 0.0 {
        Duration::from_secs_f64(s)
    } else {
        Duration::ZERO
    }
}

struct Dispatcher {
    sink: Box<dyn MidiSink>,
    stats: DispatchStats,
}

impl Dispatcher {
    fn new(sink: Box<dyn MidiSink>) -> Self {
        Self {
            sink,
            stats: DispatchStats::default(),
        }
    }

    fn deliver(&mut self, msg: &MidiMessage) {
        match self.sink.send(msg) {
            Ok(()) => self.stats.sent += 1,
            Err(e) => {
                if self.stats.dropped == 0 {
                    warn!("Sink '{}' failed, dropping messages: {}", self.sink.name(), e);
                } else {
                    debug!(?msg, "dropped: {}", e);
                }
                self.stats.dropped += 1;
            }
        }
    }

    fn panic(&mut self) {
        for msg in MidiMessage::panic_sequence() {
            self.deliver(&msg);
        }
    }
}
