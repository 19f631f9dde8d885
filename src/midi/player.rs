use std::collections::HashMap;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, TryRecvError, never};
use tracing::{debug, info, trace, warn};

use crate::midi::event::{EventKind, TimedEvent};
use crate::synth;

/// How long the dispatch loop sleeps between clock polls. Dispatch
/// timing has jitter bounded by this granularity.
const POLL_GRANULARITY: Duration = Duration::from_millis(1);

/// Destination for synthesized voices.
///
/// Implementations are synchronous: when `start_voice` returns, the
/// voice is sounding, and the handle stays valid until passed back to
/// `stop_voice`.
pub trait AudioSink {
    /// Identifies one sounding voice from start to stop.
    type Handle;
    type Error: std::error::Error;

    /// Upload a tone buffer and start it sounding.
    fn start_voice(&mut self, frequency: f64, tone: &[i16]) -> Result<Self::Handle, Self::Error>;

    /// Stop a sounding voice and release its resources.
    fn stop_voice(&mut self, voice: Self::Handle) -> Result<(), Self::Error>;
}

/// Active voices keyed by note number.
///
/// The key structure keeps at most one voice per note; starting a note
/// that is already sounding goes through [`VoiceTable::take`] first so
/// the old voice can be stopped.
#[derive(Debug)]
pub struct VoiceTable<H> {
    active: HashMap<u8, H>,
}

impl<H> VoiceTable<H> {
    pub fn new() -> Self {
        Self {
            active: HashMap::new(),
        }
    }

    /// Remove and return the voice for `note`, if one is sounding.
    pub fn take(&mut self, note: u8) -> Option<H> {
        self.active.remove(&note)
    }

    /// Record `handle` as the sounding voice for `note`.
    pub fn insert(&mut self, note: u8, handle: H) -> Option<H> {
        self.active.insert(note, handle)
    }

    /// Remove and yield every active voice.
    pub fn drain(&mut self) -> impl Iterator<Item = (u8, H)> + '_ {
        self.active.drain()
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}

impl<H> Default for VoiceTable<H> {
    fn default() -> Self {
        Self::new()
    }
}

/// Playback settings.
#[derive(Debug, Clone)]
pub struct PlayerConfig {
    /// Length in seconds of each synthesized tone.
    pub tone_duration: f64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self { tone_duration: 2.0 }
    }
}

/// Replays an ordered event sequence against the wall clock.
///
/// The player owns the sink and the voice table for the whole session;
/// playback runs on the calling thread.
pub struct Player<S: AudioSink> {
    sink: S,
    config: PlayerConfig,
    voices: VoiceTable<S::Handle>,
}

impl<S: AudioSink> Player<S> {
    pub fn new(sink: S) -> Self {
        Self::with_config(sink, PlayerConfig::default())
    }

    pub fn with_config(sink: S, config: PlayerConfig) -> Self {
        Self {
            sink,
            config,
            voices: VoiceTable::new(),
        }
    }

    /// Play `events` to completion, blocking until the last one has been
    /// dispatched.
    ///
    /// The sequence must already be ordered by timestamp, as
    /// [`select_track`](crate::midi::select_track) leaves it.
    pub fn play(&mut self, events: &[TimedEvent]) -> Result<(), S::Error> {
        self.play_until(events, &never())
    }

    /// Play `events` until the sequence drains or `stop` signals.
    ///
    /// A message on `stop`, or its sender going away, cancels playback at
    /// the next poll. Cancelled or not, every voice still sounding when
    /// the loop exits is released before this returns.
    pub fn play_until(
        &mut self,
        events: &[TimedEvent],
        stop: &Receiver<()>,
    ) -> Result<(), S::Error> {
        if events.is_empty() {
            info!("no events to play");
            return Ok(());
        }

        let clock = Instant::now();
        let mut cursor = 0;
        let mut result = Ok(());

        'poll: while cursor < events.len() {
            match stop.try_recv() {
                Ok(()) => {
                    debug!("stop requested, cancelling playback");
                    break;
                }
                Err(TryRecvError::Disconnected) => {
                    debug!("stop channel closed, cancelling playback");
                    break;
                }
                Err(TryRecvError::Empty) => {}
            }

            // Dispatch everything that is due, then yield the CPU.
            let now = clock.elapsed().as_secs_f64();
            while cursor < events.len() && events[cursor].timestamp <= now {
                if let Err(err) = self.dispatch(&events[cursor]) {
                    result = Err(err);
                    break 'poll;
                }
                cursor += 1;
            }

            thread::sleep(POLL_GRANULARITY);
        }

        // Nothing keeps sounding past the loop, even after cancellation
        // or a failed dispatch.
        let cleanup = self.stop_all();
        result.and(cleanup)
    }

    fn dispatch(&mut self, event: &TimedEvent) -> Result<(), S::Error> {
        match event.kind {
            // Velocity zero is a note-off in disguise; the decoder
            // normalizes it away, but handle it here as well.
            EventKind::NoteOn if event.velocity > 0 => self.start_note(event),
            EventKind::NoteOn | EventKind::NoteOff => self.stop_note(event.note),
        }
    }

    fn start_note(&mut self, event: &TimedEvent) -> Result<(), S::Error> {
        // Last note-on wins: silence any voice already holding this note
        // before the replacement starts.
        if let Some(voice) = self.voices.take(event.note) {
            trace!(note = event.note, "replacing active voice");
            self.sink.stop_voice(voice)?;
        }

        let frequency = synth::note_frequency(event.note);
        let tone = synth::generate_tone(frequency, self.config.tone_duration);
        let handle = self.sink.start_voice(frequency, &tone)?;
        self.voices.insert(event.note, handle);
        trace!(note = event.note, frequency, "voice started");
        Ok(())
    }

    fn stop_note(&mut self, note: u8) -> Result<(), S::Error> {
        match self.voices.take(note) {
            Some(voice) => {
                trace!(note, "voice stopped");
                self.sink.stop_voice(voice)
            }
            None => {
                // Note-off with nothing sounding; nothing to do.
                debug!(note, "note-off for inactive note");
                Ok(())
            }
        }
    }

    /// Release every active voice, continuing past individual failures.
    /// The first failure is reported once the table is empty.
    fn stop_all(&mut self) -> Result<(), S::Error> {
        let mut result = Ok(());
        for (note, voice) in self.voices.drain() {
            if let Err(err) = self.sink.stop_voice(voice) {
                warn!(note, error = %err, "failed to stop voice during cleanup");
                if result.is_ok() {
                    result = Err(err);
                }
            }
        }
        result
    }
}
