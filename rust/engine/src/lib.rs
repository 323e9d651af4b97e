#![warn(
    nonstandard_style,
    rust_2018_idioms,
    future_incompatible,
    clippy::pedantic,
    clippy::todo
)]
#![allow(
    clippy::type_complexity,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::default_trait_access,
    clippy::module_name_repetitions
)]

//! Synthesis engine for a tracker-style software instrument.
//!
//! The engine is organized around one [`synth::SynthUnit`] (an FM, chip
//! or harmonics voice bank) and a set of [`effects`] modules, all of
//! which advance their control state on a shared _tick_ clock derived
//! from the tempo: 24 parts per beat, 2 ticks per part. Audio is
//! rendered in mono by the synth and shaped by the effect chain; the
//! plugin layer owns ordering and stereo conversion.

pub mod effects;
pub mod envelope;
pub mod filtering;
pub mod params;
pub mod synth;
pub mod wavetables;

/// Engine version written into saved state; loads require an exact match.
pub const VERSION: (u32, u32, u32) = (0, 2, 1);

/// Parts per beat of the control clock.
pub const PARTS_PER_BEAT: u32 = 24;
/// Ticks per part of the control clock.
pub const TICKS_PER_PART: u32 = 2;
/// Ticks per beat: the smallest control-rate unit spans 1/48 beat.
pub const TICKS_PER_BEAT: u32 = PARTS_PER_BEAT * TICKS_PER_PART;

/// Timing and modulation context for one tick. `beat` must increase
/// continuously for the tremolo curves to work; when the song is not
/// playing the caller advances it from the bpm alone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickContext {
    /// Effective tempo in beats per minute.
    pub bpm: f64,
    /// Position on the beats timeline at the start of the tick.
    pub beat: f64,
    /// Tick length in samples at the current tempo.
    pub samples_per_tick: f64,
    /// Two-axis modulation pad, each in `[0, 1]`.
    pub mod_x: f64,
    /// See [`TickContext::mod_x`].
    pub mod_y: f64,
}

/// Tick length in samples for a tempo at a sample rate.
#[must_use]
pub fn samples_per_tick(bpm: f64, sample_rate: f64) -> f64 {
    let beats_per_sec = bpm / 60.0;
    let ticks_per_sec = f64::from(TICKS_PER_BEAT) * beats_per_sec;
    sample_rate / ticks_per_sec
}

#[cfg(test)]
mod tests {
    use assert_approx_eq::assert_approx_eq;

    use super::samples_per_tick;

    #[test]
    fn tick_length_at_120_bpm() {
        // 120 bpm -> 96 ticks/sec -> 500 samples at 48kHz.
        assert_approx_eq!(samples_per_tick(120.0, 48000.0), 500.0);
    }
}
