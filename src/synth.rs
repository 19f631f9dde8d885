use std::f64::consts::PI;

/// Output sample rate in Hz.
pub const SAMPLE_RATE: u32 = 44_100;

/// Linear attack ramp applied to every tone, in seconds.
pub const DEFAULT_ATTACK: f64 = 0.10;
/// Linear release ramp applied to every tone, in seconds.
pub const DEFAULT_RELEASE: f64 = 0.10;

/// Equal-tempered frequency of a MIDI note number, with A4 (69) at 440 Hz.
pub fn note_frequency(note: u8) -> f64 {
    440.0 * 2f64.powf((f64::from(note) - 69.0) / 12.0)
}

/// Synthesize a sine tone with the default attack and release ramps.
pub fn generate_tone(frequency: f64, duration: f64) -> Vec<i16> {
    generate_tone_with_envelope(frequency, duration, DEFAULT_ATTACK, DEFAULT_RELEASE)
}

/// Synthesize a full-scale sine tone as 16-bit mono samples.
///
/// The envelope ramps linearly from silence over `attack` seconds,
/// sustains at full scale, and ramps back to silence over the final
/// `release` seconds. Ramps longer than the tone degenerate gracefully;
/// a non-positive duration yields an empty buffer.
pub fn generate_tone_with_envelope(
    frequency: f64,
    duration: f64,
    attack: f64,
    release: f64,
) -> Vec<i16> {
    let length = (duration * f64::from(SAMPLE_RATE)) as usize;
    let increment = 2.0 * PI * frequency / f64::from(SAMPLE_RATE);

    let attack_samples = (attack * f64::from(SAMPLE_RATE)) as usize;
    let release_samples = (release * f64::from(SAMPLE_RATE)) as usize;
    let sustain_end = length.saturating_sub(release_samples);

    let mut samples = Vec::with_capacity(length);
    for i in 0..length {
        let envelope = if i < attack_samples {
            i as f64 / attack_samples as f64
        } else if i < sustain_end {
            1.0
        } else {
            (length - i) as f64 / release_samples as f64
        };
        samples.push(((increment * i as f64).sin() * f64::from(i16::MAX) * envelope) as i16);
    }
    samples
}
