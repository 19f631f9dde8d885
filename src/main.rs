use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use clap::Parser;
use thousands::Separable;
use tracing::info;
use tracing_subscriber::EnvFilter;

use miditone::midi::{self, EventKind};
use miditone::midi::player::{Player, PlayerConfig};
use miditone::openal::OpenAlSink;

/// Play one track of a MIDI file as sine tones.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// MIDI file to play.
    file: PathBuf,

    /// Name of the track to play.
    #[arg(long, default_value = "Track 3")]
    track: String,

    /// Length in seconds of each synthesized tone.
    #[arg(long, default_value_t = 2.0)]
    tone_duration: f64,

    /// List the track names found in the file and exit.
    #[arg(long)]
    list_tracks: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("miditone=info")),
        )
        .init();

    let args = Args::parse();

    let bytes = fs::read(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let header = midi::parse_header(&bytes)
        .with_context(|| format!("failed to parse {}", args.file.display()))?;
    println!(
        "Tracks: {}, Time division: {}",
        header.track_count, header.ticks_per_quarter_note
    );

    let start = Instant::now();
    let events = midi::parse_bytes(&bytes)
        .with_context(|| format!("failed to parse {}", args.file.display()))?;

    let note_count = events
        .iter()
        .filter(|event| event.kind == EventKind::NoteOn)
        .count();
    let total_seconds = events
        .iter()
        .map(|event| event.timestamp)
        .fold(0.0f64, f64::max);
    let total_ms = (total_seconds * 1000.0) as u64;

    println!(
        "Parsed MIDI Summary:\n\
     - Events: {}\n\
     - Note Count: {}\n\
     - Total Duration: {:02}:{:02}.{:03}\n\
     - Parse Time: {:.2?}",
        events.len().separate_with_commas(),
        note_count.separate_with_commas(),
        total_ms / 60_000,
        (total_ms % 60_000) / 1_000,
        total_ms % 1_000,
        start.elapsed()
    );

    if args.list_tracks {
        let names: BTreeSet<&str> = events.iter().map(|event| event.track.as_str()).collect();
        for name in names {
            println!("{name}");
        }
        return Ok(());
    }

    let selection = midi::select_track(&events, &args.track);
    if selection.is_empty() {
        bail!(
            "no note events on track {:?} (use --list-tracks to see what the file contains)",
            args.track
        );
    }
    info!(track = %args.track, events = selection.len(), "starting playback");

    let sink = OpenAlSink::open().context("failed to open the audio backend")?;
    let mut player = Player::with_config(
        sink,
        PlayerConfig {
            tone_duration: args.tone_duration,
        },
    );
    player.play(&selection)?;

    println!("Playback finished.");
    Ok(())
}
