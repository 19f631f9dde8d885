use std::fs;
use std::path::Path;

use tracing::{debug, trace};

use crate::midi::error::FormatError;
use crate::midi::event::{EventKind, TimedEvent};
use crate::midi::reader::ByteReader;

/// Tag opening the file header chunk.
const HEADER_TAG: &[u8; 4] = b"MThd";
/// Tag opening each track chunk.
const TRACK_TAG: &[u8; 4] = b"MTrk";
/// Tempo assumed until a set-tempo event says otherwise: 120 BPM.
const DEFAULT_TEMPO_MICROS: u32 = 500_000;

/// Fixed fields of the `MThd` chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    /// Format type: 0 single track, 1 simultaneous tracks, 2 independent
    /// sequences.
    pub format: u16,
    /// Number of track chunks that follow.
    pub track_count: u16,
    /// Delta-time resolution in ticks per quarter note.
    pub ticks_per_quarter_note: u16,
}

/// Tempo in effect while decoding one track.
///
/// A set-tempo event replaces the value from that point on; conversions
/// already made are not rescaled. Every track starts back at the
/// default, so a tempo change never leaks into the next track chunk.
#[derive(Debug, Clone, Copy)]
struct TempoState {
    micros_per_quarter_note: u32,
}

impl TempoState {
    fn new() -> Self {
        Self {
            micros_per_quarter_note: DEFAULT_TEMPO_MICROS,
        }
    }

    /// Convert a tick delta into seconds at the current tempo.
    fn delta_seconds(&self, delta_ticks: u32, ticks_per_quarter_note: u16) -> f64 {
        (f64::from(delta_ticks) / f64::from(ticks_per_quarter_note))
            * (f64::from(self.micros_per_quarter_note) / 1_000_000.0)
    }
}

/// Decode state for a single track chunk, discarded when the track ends.
struct TrackContext {
    /// Name attached to emitted events, until a name event replaces it.
    name: String,
    /// Last status byte seen, reused when a data byte turns up in status
    /// position.
    running_status: Option<u8>,
    /// Seconds since the start of the track.
    seconds: f64,
    tempo: TempoState,
}

impl TrackContext {
    fn new(track_index: u16) -> Self {
        Self {
            name: format!("Track {}", track_index + 1),
            running_status: None,
            seconds: 0.0,
            tempo: TempoState::new(),
        }
    }
}

/// Parse a MIDI file into its note events.
///
/// Events carry per-track timestamps and appear in file order; no
/// cross-track merge is applied. Use [`select_track`] to pull out one
/// track in playable order.
///
/// [`select_track`]: crate::midi::select_track
pub fn parse<P: AsRef<Path>>(path: P) -> Result<Vec<TimedEvent>, FormatError> {
    let bytes = fs::read(path)?;
    parse_bytes(&bytes)
}

/// Read just the `MThd` header chunk of an in-memory file image.
pub fn parse_header(bytes: &[u8]) -> Result<FileHeader, FormatError> {
    read_header(&mut ByteReader::new(bytes))
}

/// Parse an in-memory MIDI file image.
pub fn parse_bytes(bytes: &[u8]) -> Result<Vec<TimedEvent>, FormatError> {
    let mut reader = ByteReader::new(bytes);
    let header = read_header(&mut reader)?;
    debug!(
        format = header.format,
        tracks = header.track_count,
        ticks_per_quarter_note = header.ticks_per_quarter_note,
        "parsed header chunk"
    );

    let mut events = Vec::new();
    // Cursor for the diagnostic `duration` field: absolute time of the
    // previous decoded event, shared across all tracks.
    let mut previous_timestamp = 0.0;

    for track_index in 0..header.track_count {
        reader.expect_tag(TRACK_TAG)?;
        let length = reader.read_u32_be()? as usize;
        let mut track = reader.sub_reader(length)?;
        decode_track(
            &mut track,
            &header,
            track_index,
            &mut events,
            &mut previous_timestamp,
        )?;
    }

    Ok(events)
}

fn read_header(reader: &mut ByteReader<'_>) -> Result<FileHeader, FormatError> {
    reader.expect_tag(HEADER_TAG)?;
    let length = reader.read_u32_be()? as usize;

    let format = reader.read_u16_be()?;
    let track_count = reader.read_u16_be()?;
    let division_offset = reader.offset();
    let division = reader.read_u16_be()?;

    // The header body is always 6 bytes; tolerate a longer declaration
    // by skipping the surplus so track framing stays aligned.
    if length > 6 {
        reader.skip(length - 6)?;
    }

    if division & 0x8000 != 0 {
        return Err(FormatError::UnsupportedDivision { division });
    }
    if division == 0 {
        return Err(FormatError::Malformed {
            offset: division_offset,
            reason: "zero ticks per quarter note",
        });
    }

    Ok(FileHeader {
        format,
        track_count,
        ticks_per_quarter_note: division,
    })
}

/// Decode the events of one track chunk.
///
/// `reader` is bounded to the chunk's declared byte range. Running out
/// of that range is an implicit end of track; an `FF 2F` event ends the
/// track early and whatever remains of the range is discarded.
fn decode_track(
    reader: &mut ByteReader<'_>,
    header: &FileHeader,
    track_index: u16,
    events: &mut Vec<TimedEvent>,
    previous_timestamp: &mut f64,
) -> Result<(), FormatError> {
    let mut ctx = TrackContext::new(track_index);

    while !reader.is_empty() {
        let delta_ticks = reader.read_varint()?;
        ctx.seconds += ctx
            .tempo
            .delta_seconds(delta_ticks, header.ticks_per_quarter_note);
        let duration = ctx.seconds - *previous_timestamp;

        // A data byte in status position means running status: reuse the
        // previous status byte and leave this one for the data reads.
        let status = match reader.peek_u8()? {
            byte if byte & 0x80 == 0 => match ctx.running_status {
                Some(status) => status,
                None => {
                    return Err(FormatError::Malformed {
                        offset: reader.offset(),
                        reason: "data byte with no running status",
                    });
                }
            },
            byte => {
                reader.skip(1)?;
                ctx.running_status = Some(byte);
                byte
            }
        };

        if status == 0xFF {
            if decode_meta_event(reader, &mut ctx)? {
                break;
            }
        } else if status & 0xF0 == 0xF0 {
            // System exclusive and friends: length-prefixed payload we
            // have no use for.
            let length = reader.read_varint()? as usize;
            reader.skip(length)?;
            trace!(status, length, "skipped system event");
        } else {
            decode_channel_event(reader, &ctx, status, duration, events)?;
        }

        *previous_timestamp = ctx.seconds;
    }

    debug!(track = %ctx.name, seconds = ctx.seconds, "track decoded");
    Ok(())
}

/// Handle one meta event. Returns true for end-of-track.
fn decode_meta_event(
    reader: &mut ByteReader<'_>,
    ctx: &mut TrackContext,
) -> Result<bool, FormatError> {
    let meta_type = reader.read_u8()?;
    let length = reader.read_varint()? as usize;
    let data_offset = reader.offset();
    let data = reader.read_bytes(length)?;

    match meta_type {
        // Track name, applied to events emitted from here on.
        0x03 => {
            ctx.name = String::from_utf8_lossy(data).into_owned();
            debug!(track = %ctx.name, "track named");
        }
        // Set tempo: three big-endian bytes of microseconds per quarter
        // note. Longer payloads happen in the wild; the tail is ignored.
        0x51 => {
            if data.len() < 3 {
                return Err(FormatError::Malformed {
                    offset: data_offset,
                    reason: "set-tempo event shorter than 3 bytes",
                });
            }
            let micros =
                u32::from(data[0]) << 16 | u32::from(data[1]) << 8 | u32::from(data[2]);
            ctx.tempo.micros_per_quarter_note = micros;
            debug!(track = %ctx.name, micros_per_quarter_note = micros, "tempo change");
        }
        // End of track.
        0x2F => {
            trace!(track = %ctx.name, "end of track");
            return Ok(true);
        }
        // Read for framing, otherwise ignored.
        _ => trace!(meta_type, length, "skipped meta event"),
    }
    Ok(false)
}

fn decode_channel_event(
    reader: &mut ByteReader<'_>,
    ctx: &TrackContext,
    status: u8,
    duration: f64,
    events: &mut Vec<TimedEvent>,
) -> Result<(), FormatError> {
    // Program change and channel pressure carry one data byte; every
    // other channel message carries two.
    let data_len = match status & 0xF0 {
        0xC0 | 0xD0 => 1,
        _ => 2,
    };
    let data = reader.read_bytes(data_len)?;

    let kind = match status & 0xF0 {
        // A note-on at velocity zero is the conventional note-off.
        0x90 if data[1] > 0 => EventKind::NoteOn,
        0x90 | 0x80 => EventKind::NoteOff,
        // Control changes, pitch bends and the rest are consumed for
        // framing but not played.
        _ => return Ok(()),
    };

    let event = TimedEvent {
        kind,
        track: ctx.name.clone(),
        timestamp: ctx.seconds,
        channel: status & 0x0F,
        note: data[0],
        velocity: data[1],
        duration,
    };
    trace!(
        kind = ?event.kind,
        track = %event.track,
        note = event.note,
        velocity = event.velocity,
        timestamp = event.timestamp,
        "note event"
    );
    events.push(event);
    Ok(())
}
