//! End-to-end checks: bytes in, decoded events out, sink traffic from
//! playing them.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use miditone::midi::player::{AudioSink, Player, PlayerConfig};
use miditone::midi::{EventKind, FormatError, parse_bytes, select_track};

fn varint(mut value: u32) -> Vec<u8> {
    let mut out = vec![(value & 0x7F) as u8];
    value >>= 7;
    while value > 0 {
        out.insert(0, (value & 0x7F) as u8 | 0x80);
        value >>= 7;
    }
    out
}

fn smf(division: u16, tracks: &[Vec<u8>]) -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"MThd");
    bytes.extend_from_slice(&6u32.to_be_bytes());
    bytes.extend_from_slice(&1u16.to_be_bytes());
    bytes.extend_from_slice(&(tracks.len() as u16).to_be_bytes());
    bytes.extend_from_slice(&division.to_be_bytes());
    for track in tracks {
        bytes.extend_from_slice(b"MTrk");
        bytes.extend_from_slice(&(track.len() as u32).to_be_bytes());
        bytes.extend_from_slice(track);
    }
    bytes
}

fn named_track(name: &str, notes: &[(u32, u8, u8, u8)]) -> Vec<u8> {
    let mut out = varint(0);
    out.extend([0xFF, 0x03]);
    out.extend(varint(name.len() as u32));
    out.extend_from_slice(name.as_bytes());
    for &(delta, status, note, velocity) in notes {
        out.extend(varint(delta));
        out.extend([status, note, velocity]);
    }
    out.extend(varint(0));
    out.extend([0xFF, 0x2F, 0x00]);
    out
}

#[derive(Debug, PartialEq)]
enum Call {
    Start { id: u32, frequency: f64 },
    Stop { id: u32 },
}

#[derive(Debug)]
struct SinkError;

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("sink error")
    }
}

impl std::error::Error for SinkError {}

#[derive(Clone, Default)]
struct RecordingSink {
    calls: Rc<RefCell<Vec<Call>>>,
    next_id: Rc<RefCell<u32>>,
}

impl AudioSink for RecordingSink {
    type Handle = u32;
    type Error = SinkError;

    fn start_voice(&mut self, frequency: f64, _tone: &[i16]) -> Result<u32, SinkError> {
        let mut next = self.next_id.borrow_mut();
        *next += 1;
        self.calls.borrow_mut().push(Call::Start {
            id: *next,
            frequency,
        });
        Ok(*next)
    }

    fn stop_voice(&mut self, voice: u32) -> Result<(), SinkError> {
        self.calls.borrow_mut().push(Call::Stop { id: voice });
        Ok(())
    }
}

fn demo_file() -> Vec<u8> {
    // 24 ticks at 480 tpqn and the default tempo is 25ms.
    let melody = named_track(
        "Melody",
        &[
            (24, 0x90, 60, 100),
            (24, 0x80, 60, 0),
            (24, 0x90, 64, 100),
            (24, 0x80, 64, 0),
        ],
    );
    let bass = named_track("Bass", &[(0, 0x90, 36, 100), (96, 0x80, 36, 0)]);
    smf(480, &[melody, bass])
}

#[test]
fn decode_select_and_play_one_track() {
    let events = parse_bytes(&demo_file()).unwrap();
    assert_eq!(events.len(), 6);

    let melody = select_track(&events, "Melody");
    assert_eq!(melody.len(), 4);
    assert_eq!(melody[0].kind, EventKind::NoteOn);
    assert_eq!(melody[0].timestamp, 0.025);
    assert_eq!(melody[3].timestamp, 0.1);
    assert!(melody.iter().all(|event| event.track == "Melody"));

    let sink = RecordingSink::default();
    let mut player = Player::with_config(sink.clone(), PlayerConfig { tone_duration: 0.2 });
    player.play(&melody).unwrap();

    let calls = sink.calls.borrow();
    assert_eq!(calls.len(), 4);
    match (&calls[0], &calls[1]) {
        (Call::Start { id: a, frequency }, Call::Stop { id: b }) => {
            assert_eq!(a, b);
            // Middle C.
            assert!((frequency - 261.6256).abs() < 0.001);
        }
        other => panic!("unexpected call order: {other:?}"),
    }
    match (&calls[2], &calls[3]) {
        (Call::Start { id: a, frequency }, Call::Stop { id: b }) => {
            assert_eq!(a, b);
            // E above middle C.
            assert!((frequency - 329.6276).abs() < 0.001);
        }
        other => panic!("unexpected call order: {other:?}"),
    }
}

#[test]
fn selecting_an_absent_track_plays_nothing() {
    let events = parse_bytes(&demo_file()).unwrap();
    let selection = select_track(&events, "Drums");
    assert!(selection.is_empty());

    let sink = RecordingSink::default();
    let mut player = Player::with_config(sink.clone(), PlayerConfig { tone_duration: 0.2 });
    player.play(&selection).unwrap();
    assert!(sink.calls.borrow().is_empty());
}

#[test]
fn corrupt_file_fails_without_events() {
    let mut bytes = demo_file();
    bytes[0] = b'X';
    assert!(matches!(
        parse_bytes(&bytes),
        Err(FormatError::BadChunkTag { .. })
    ));

    bytes = demo_file();
    bytes.truncate(20);
    assert!(matches!(
        parse_bytes(&bytes),
        Err(FormatError::Malformed { .. })
    ));
}
