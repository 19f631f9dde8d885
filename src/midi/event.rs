/// Whether a decoded event starts or ends a note.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    NoteOn,
    NoteOff,
}

/// A note event with its absolute position in the piece.
#[derive(Debug, Clone, PartialEq)]
pub struct TimedEvent {
    pub kind: EventKind,
    /// Display name of the originating track.
    pub track: String,
    /// Seconds from the start of the event's track.
    pub timestamp: f64,
    /// MIDI channel, 0-15.
    pub channel: u8,
    /// Note number, 0-127.
    pub note: u8,
    /// Key velocity, 0-127.
    pub velocity: u8,
    /// Gap in seconds since the previous decoded event, counted across
    /// the whole file rather than per track. A format-dump diagnostic;
    /// playback never reads it.
    pub duration: f64,
}

/// Keep only the events of one named track, ordered by timestamp.
///
/// The sort is stable: events sharing a timestamp keep the relative
/// order they had in the file, so an off/on pair for the same note at
/// the same instant stays off-then-on.
pub fn select_track(events: &[TimedEvent], track: &str) -> Vec<TimedEvent> {
    let mut selected: Vec<TimedEvent> = events
        .iter()
        .filter(|event| event.track == track)
        .cloned()
        .collect();
    selected.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
    selected
}
