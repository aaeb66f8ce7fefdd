/// Note scheduler timing and failure handling
///
/// The scheduler runs on its own thread, so these tests use short holds and
/// generous sleeps, then inspect what a recording sink received and when.

use phytophon::midi::{MidiMessage, RecordingSink, ALL_NOTES_OFF, ALL_SOUND_OFF};
use phytophon::notes::NoteEvent;
use phytophon::scheduler::NoteScheduler;
use std::thread;
use std::time::{Duration, Instant};

fn note(pitch: u8, hold: f64) -> NoteEvent {
    NoteEvent {
        pitch,
        velocity: 100,
        hold_duration: hold,
        onset_delay: 0.0,
    }
}

#[test]
fn test_note_on_is_immediate_and_off_follows_hold() {
    let sink = RecordingSink::new();
    let recording = sink.recording();
    let scheduler = NoteScheduler::spawn(Box::new(sink), 2, false);

    let fired = Instant::now();
    scheduler.fire(&note(64, 0.05));
    // The call must not wait for the hold
    assert!(fired.elapsed() < Duration::from_millis(20));

    thread::sleep(Duration::from_millis(200));
    let log = recording.lock().unwrap().clone();
    assert_eq!(log.len(), 2);

    let (on_at, on) = log[0];
    let (off_at, off) = log[1];
    assert_eq!(
        on,
        MidiMessage::NoteOn {
            channel: 2,
            note: 64,
            velocity: 100
        }
    );
    assert_eq!(off, MidiMessage::NoteOff { channel: 2, note: 64 });
    assert!(on_at.duration_since(fired) < Duration::from_millis(30));
    assert!(off_at.duration_since(fired) >= Duration::from_millis(50));
    drop(scheduler);
}

#[test]
fn test_overlapping_same_pitch_offs_all_fire() {
    let sink = RecordingSink::new();
    let scheduler = NoteScheduler::spawn(Box::new(sink.clone()), 0, false);

    scheduler.fire(&note(60, 0.04));
    scheduler.fire(&note(60, 0.05));
    scheduler.fire(&note(60, 0.06));
    thread::sleep(Duration::from_millis(250));

    let offs = sink
        .messages()
        .into_iter()
        .filter(|m| matches!(m, MidiMessage::NoteOff { note: 60, .. }))
        .count();
    assert_eq!(offs, 3);
    scheduler.shutdown();
}

#[test]
fn test_offs_arrive_in_deadline_order() {
    let sink = RecordingSink::new();
    let scheduler = NoteScheduler::spawn(Box::new(sink.clone()), 0, false);

    scheduler.fire(&note(70, 0.09));
    scheduler.fire(&note(50, 0.03));
    thread::sleep(Duration::from_millis(250));
    scheduler.shutdown();

    let offs: Vec<u8> = sink
        .messages()
        .into_iter()
        .filter_map(|m| match m {
            MidiMessage::NoteOff { note, .. } => Some(note),
            _ => None,
        })
        .collect();
    assert_eq!(offs, vec![50, 70]);
}

#[test]
fn test_onset_delay_defers_note_on() {
    let sink = RecordingSink::new();
    let recording = sink.recording();
    let scheduler = NoteScheduler::spawn(Box::new(sink), 0, false);

    let fired = Instant::now();
    scheduler.fire(&NoteEvent {
        pitch: 40,
        velocity: 30,
        hold_duration: 0.02,
        onset_delay: 0.04,
    });
    thread::sleep(Duration::from_millis(200));
    scheduler.shutdown();

    let log = recording.lock().unwrap().clone();
    assert_eq!(log.len(), 2);
    assert!(log[0].0.duration_since(fired) >= Duration::from_millis(40));
    assert!(log[1].0.duration_since(fired) >= Duration::from_millis(60));
}

#[test]
fn test_shutdown_flushes_pending_offs_and_panics() {
    let sink = RecordingSink::new();
    let scheduler = NoteScheduler::spawn(Box::new(sink.clone()), 0, true);

    scheduler.fire(&note(72, 30.0));
    let started = Instant::now();
    let stats = scheduler.shutdown();
    assert!(started.elapsed() < Duration::from_secs(5));

    let msgs = sink.messages();
    // startup panic, note-on, flushed note-off, shutdown panic
    assert_eq!(msgs.len(), 32 + 1 + 1 + 32);
    assert_eq!(
        msgs[0],
        MidiMessage::ControlChange {
            channel: 0,
            controller: ALL_SOUND_OFF,
            value: 0
        }
    );
    assert_eq!(msgs[33], MidiMessage::NoteOff { channel: 0, note: 72 });
    assert_eq!(
        msgs[msgs.len() - 1],
        MidiMessage::ControlChange {
            channel: 15,
            controller: ALL_NOTES_OFF,
            value: 0
        }
    );
    assert_eq!(stats.sent, msgs.len() as u64);
    assert_eq!(stats.dropped, 0);
}

#[test]
fn test_failing_sink_is_swallowed() {
    let scheduler = NoteScheduler::spawn(Box::new(RecordingSink::failing()), 0, false);
    scheduler.fire(&note(60, 0.01));
    scheduler.control(74, 10);
    thread::sleep(Duration::from_millis(100));

    let stats = scheduler.shutdown();
    assert_eq!(stats.sent, 0);
    assert_eq!(stats.dropped, 3);
}

#[test]
fn test_control_change_clamped() {
    let sink = RecordingSink::new();
    let scheduler = NoteScheduler::spawn(Box::new(sink.clone()), 0, false);
    scheduler.control(200, 255);
    scheduler.shutdown();
    assert_eq!(
        sink.messages(),
        vec![MidiMessage::ControlChange {
            channel: 0,
            controller: 127,
            value: 127
        }]
    );
}
