//! Decode Standard MIDI Files and replay one track as synthesized sine
//! tones.
//!
//! [`midi::parse`] turns a file into a flat list of timestamped note
//! events, [`midi::select_track`] pulls out one named track in playable
//! order, and [`midi::player::Player`] replays that sequence in real
//! time against any [`midi::player::AudioSink`]. The [`openal`] module
//! provides the default sink; [`synth`] makes the tones it plays.

pub mod midi;
pub mod openal;
pub mod synth;
