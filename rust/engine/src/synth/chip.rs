//! Chip wavetable core: a fixed bank of single-cycle waves with
//! unison detuning. Sub-oscillator phases persist across parameter
//! changes so switching waves or unisons mid-note stays continuous.

use std::sync::OnceLock;

use super::MAX_VOICES;
use crate::envelope::{ComputeIndex, EnvelopeComputer};
use crate::params::{choice, ParamInfo};
use crate::wavetables::key_to_hz;

/// Number of chip-specific parameters.
pub const PARAM_COUNT: usize = 2;
/// Local index of the waveform selector.
pub const PARAM_WAVEFORM: usize = 0;
/// Local index of the unison selector.
pub const PARAM_UNISON: usize = 1;

/// Number of waves in the bank.
pub const WAVE_COUNT: usize = 9;
/// Samples per single-cycle wave; must be a power of two.
pub const WAVE_LENGTH: usize = 64;

static WAVE_VALUES: [&str; WAVE_COUNT] = [
    "Rounded",
    "Triangle",
    "Square",
    "1/4 Pulse",
    "1/8 Pulse",
    "Sawtooth",
    "Double Saw",
    "Double Pulse",
    "Spiky",
];

static UNISON_VALUES: [&str; 10] = [
    "None",
    "Shimmer",
    "Hum",
    "Honky Tonk",
    "Dissonant",
    "Fifth",
    "Octave",
    "Bowed",
    "Piano",
    "Warbled",
];

/// Parameter descriptors for the chip core.
pub static PARAMS: [ParamInfo; PARAM_COUNT] = [
    choice(*b"chpWave\0", "Waveform", "Chip", &WAVE_VALUES, 0.0),
    choice(*b"chpUnisn", "Unison", "Chip", &UNISON_VALUES, 0.0),
];

#[derive(Debug, Clone, Copy)]
pub(crate) struct Unison {
    pub voices: usize,
    /// Detune between the two sub-oscillators, in semitones.
    pub spread: f64,
    /// Interval offset of the second sub-oscillator, in semitones.
    pub offset: f64,
    pub expression: f64,
    pub sign: f64,
}

pub(crate) static UNISONS: [Unison; 10] = [
    Unison {
        voices: 1,
        spread: 0.0,
        offset: 0.0,
        expression: 1.4,
        sign: 1.0,
    },
    Unison {
        voices: 2,
        spread: 0.018,
        offset: 0.0,
        expression: 0.8,
        sign: 1.0,
    },
    Unison {
        voices: 2,
        spread: 0.045,
        offset: 0.0,
        expression: 1.0,
        sign: 1.0,
    },
    Unison {
        voices: 2,
        spread: 0.09,
        offset: 0.0,
        expression: 1.0,
        sign: 1.0,
    },
    Unison {
        voices: 2,
        spread: 0.25,
        offset: 0.0,
        expression: 0.9,
        sign: 1.0,
    },
    Unison {
        voices: 2,
        spread: 3.5,
        offset: 3.5,
        expression: 0.9,
        sign: 1.0,
    },
    Unison {
        voices: 2,
        spread: 6.0,
        offset: 6.0,
        expression: 0.8,
        sign: 1.0,
    },
    Unison {
        voices: 2,
        spread: 0.02,
        offset: 0.0,
        expression: 1.0,
        sign: -1.0,
    },
    Unison {
        voices: 2,
        spread: 0.01,
        offset: 0.19,
        expression: 1.0,
        sign: 0.7,
    },
    Unison {
        voices: 2,
        spread: 0.25,
        offset: 0.05,
        expression: 0.9,
        sign: -0.8,
    },
];

const CHIP_BASE_EXPRESSION: f64 = 0.5;

type WaveTable = [f32; WAVE_LENGTH + 1];

static WAVES: OnceLock<[WaveTable; WAVE_COUNT]> = OnceLock::new();

fn build_wave(shape: impl Fn(f64) -> f64) -> WaveTable {
    let mut table = [0.0f32; WAVE_LENGTH + 1];
    for i in 0..WAVE_LENGTH {
        table[i] = shape(i as f64 / WAVE_LENGTH as f64) as f32;
    }
    table[WAVE_LENGTH] = table[0];
    table
}

fn chip_waves() -> &'static [WaveTable; WAVE_COUNT] {
    WAVES.get_or_init(|| {
        let tau = std::f64::consts::TAU;
        [
            // Rounded: a softened square.
            build_wave(|t| (3.0 * (tau * t).sin()).tanh()),
            build_wave(|t| 1.0 - 4.0 * (t - 0.5).abs()),
            build_wave(|t| if t < 0.5 { 1.0 } else { -1.0 }),
            build_wave(|t| if t < 0.25 { 1.0 } else { -1.0 }),
            build_wave(|t| if t < 0.125 { 1.0 } else { -1.0 }),
            build_wave(|t| 2.0 * t - 1.0),
            // Double saw: the second ramp at half amplitude.
            build_wave(|t| {
                let first = 2.0 * (2.0 * t % 1.0) - 1.0;
                if t < 0.5 {
                    first
                } else {
                    first * 0.5
                }
            }),
            build_wave(|t| {
                let u = 2.0 * t % 1.0;
                if u < 0.25 {
                    1.0
                } else {
                    -1.0
                }
            }),
            // Spiky: opposing narrow pulses.
            build_wave(|t| {
                if t < 0.125 {
                    1.0
                } else if (0.5..0.625).contains(&t) {
                    -1.0
                } else {
                    0.0
                }
            }),
        ]
    })
}

/// Interpolated lookup; `phase` is in table units.
#[inline]
pub(crate) fn wave_at(table: &[f32], phase: f64) -> f64 {
    let length = table.len() - 1;
    let index = (phase as usize) & (length - 1);
    let fraction = phase - phase.floor();
    util::f64::lerp(
        f64::from(table[index]),
        f64::from(table[index + 1]),
        fraction,
    )
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct SubOsc {
    pub phase: f64,
    pub phase_delta: f64,
}

#[derive(Debug, Clone, Copy, Default)]
struct ChipVoice {
    subs: [SubOsc; 2],
    wave: usize,
    voice_count: usize,
    expression: f64,
    second_sign: f64,
}

#[derive(Debug)]
pub(crate) struct ChipCore {
    pub(crate) params: [f64; PARAM_COUNT],
    voices: [ChipVoice; MAX_VOICES],
}

impl ChipCore {
    pub(crate) fn new() -> Self {
        chip_waves();
        let mut params = [0.0; PARAM_COUNT];
        for (value, info) in params.iter_mut().zip(&PARAMS) {
            *value = info.default;
        }
        Self {
            params,
            voices: Default::default(),
        }
    }

    pub(crate) fn reset_voice(&mut self, slot: usize) {
        self.voices[slot] = Default::default();
    }

    pub(crate) fn tick_voice(
        &mut self,
        slot: usize,
        pitch: f64,
        envelopes: &EnvelopeComputer,
        sample_rate: f64,
    ) {
        let unison = &UNISONS[(self.params[PARAM_UNISON] as usize).min(UNISONS.len() - 1)];
        let spread = unison.spread * envelopes.end(ComputeIndex::Unison);
        let sample_len = 1.0 / sample_rate;
        let table_len = WAVE_LENGTH as f64;

        let voice = &mut self.voices[slot];
        voice.wave = (self.params[PARAM_WAVEFORM] as usize).min(WAVE_COUNT - 1);
        voice.voice_count = unison.voices;
        voice.expression = unison.expression * CHIP_BASE_EXPRESSION;
        voice.second_sign = unison.sign;
        voice.subs[0].phase_delta = key_to_hz(pitch + spread) * sample_len * table_len;
        voice.subs[1].phase_delta =
            key_to_hz(pitch + unison.offset - spread) * sample_len * table_len;
        for sub in &mut voice.subs {
            sub.phase = util::f64::wrap(sub.phase, table_len);
        }
    }

    pub(crate) fn render_voice(&mut self, slot: usize, output: &mut [f32]) {
        let table = &chip_waves()[self.voices[slot].wave];
        let voice = &mut self.voices[slot];
        for sample in output.iter_mut() {
            let mut value = wave_at(table, voice.subs[0].phase);
            if voice.voice_count == 2 {
                value += wave_at(table, voice.subs[1].phase) * voice.second_sign;
            }
            for sub in &mut voice.subs {
                sub.phase += sub.phase_delta;
            }
            *sample = (value * voice.expression) as f32;
        }
    }
}

#[cfg(test)]
mod tests;
