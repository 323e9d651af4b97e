//! Additive core: 28 harmonic amplitude controls rendered into a
//! single-cycle table, played back like the chip core (including
//! unison). The table lives in a fixed array and is rebuilt whenever a
//! control changes, so the audio thread never allocates.

use super::chip::{wave_at, SubOsc, UNISONS};
use super::MAX_VOICES;
use crate::envelope::{ComputeIndex, EnvelopeComputer};
use crate::params::{choice, stepped, ParamInfo};
use crate::wavetables::key_to_hz;

/// Number of harmonic amplitude controls.
pub const CONTROL_COUNT: usize = 28;
/// Number of harmonics-specific parameters.
pub const PARAM_COUNT: usize = CONTROL_COUNT + 1;
/// Local index of the unison selector.
pub const PARAM_UNISON: usize = CONTROL_COUNT;
/// Highest harmonic control setting.
pub const CONTROL_MAX: f64 = 7.0;

/// Samples in the rendered table; must be a power of two.
pub const TABLE_LENGTH: usize = 256;

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

/// Parameter descriptors for the harmonics core.
pub static PARAMS: [ParamInfo; PARAM_COUNT] = [
    stepped(*b"hrmCtl00", "Harmonic 1", "Harmonics", CONTROL_MAX, 7.0),
    stepped(*b"hrmCtl01", "Harmonic 2", "Harmonics", CONTROL_MAX, 0.0),
    stepped(*b"hrmCtl02", "Harmonic 3", "Harmonics", CONTROL_MAX, 0.0),
    stepped(*b"hrmCtl03", "Harmonic 4", "Harmonics", CONTROL_MAX, 0.0),
    stepped(*b"hrmCtl04", "Harmonic 5", "Harmonics", CONTROL_MAX, 0.0),
    stepped(*b"hrmCtl05", "Harmonic 6", "Harmonics", CONTROL_MAX, 0.0),
    stepped(*b"hrmCtl06", "Harmonic 7", "Harmonics", CONTROL_MAX, 0.0),
    stepped(*b"hrmCtl07", "Harmonic 8", "Harmonics", CONTROL_MAX, 0.0),
    stepped(*b"hrmCtl08", "Harmonic 9", "Harmonics", CONTROL_MAX, 0.0),
    stepped(*b"hrmCtl09", "Harmonic 10", "Harmonics", CONTROL_MAX, 0.0),
    stepped(*b"hrmCtl10", "Harmonic 11", "Harmonics", CONTROL_MAX, 0.0),
    stepped(*b"hrmCtl11", "Harmonic 12", "Harmonics", CONTROL_MAX, 0.0),
    stepped(*b"hrmCtl12", "Harmonic 13", "Harmonics", CONTROL_MAX, 0.0),
    stepped(*b"hrmCtl13", "Harmonic 14", "Harmonics", CONTROL_MAX, 0.0),
    stepped(*b"hrmCtl14", "Harmonic 15", "Harmonics", CONTROL_MAX, 0.0),
    stepped(*b"hrmCtl15", "Harmonic 16", "Harmonics", CONTROL_MAX, 0.0),
    stepped(*b"hrmCtl16", "Harmonic 17", "Harmonics", CONTROL_MAX, 0.0),
    stepped(*b"hrmCtl17", "Harmonic 18", "Harmonics", CONTROL_MAX, 0.0),
    stepped(*b"hrmCtl18", "Harmonic 19", "Harmonics", CONTROL_MAX, 0.0),
    stepped(*b"hrmCtl19", "Harmonic 20", "Harmonics", CONTROL_MAX, 0.0),
    stepped(*b"hrmCtl20", "Harmonic 21", "Harmonics", CONTROL_MAX, 0.0),
    stepped(*b"hrmCtl21", "Harmonic 22", "Harmonics", CONTROL_MAX, 0.0),
    stepped(*b"hrmCtl22", "Harmonic 23", "Harmonics", CONTROL_MAX, 0.0),
    stepped(*b"hrmCtl23", "Harmonic 24", "Harmonics", CONTROL_MAX, 0.0),
    stepped(*b"hrmCtl24", "Harmonic 25", "Harmonics", CONTROL_MAX, 0.0),
    stepped(*b"hrmCtl25", "Harmonic 26", "Harmonics", CONTROL_MAX, 0.0),
    stepped(*b"hrmCtl26", "Harmonic 27", "Harmonics", CONTROL_MAX, 0.0),
    stepped(*b"hrmCtl27", "Harmonic 28", "Harmonics", CONTROL_MAX, 0.0),
    choice(*b"hrmUnisn", "Unison", "Harmonics", &UNISON_VALUES, 0.0),
];

const HARMONICS_BASE_EXPRESSION: f64 = 0.5;

#[derive(Debug, Clone, Copy, Default)]
struct HarmonicsVoice {
    subs: [SubOsc; 2],
    voice_count: usize,
    expression: f64,
    second_sign: f64,
}

#[derive(Debug)]
pub(crate) struct HarmonicsCore {
    pub(crate) params: [f64; PARAM_COUNT],
    voices: [HarmonicsVoice; MAX_VOICES],
    table: [f32; TABLE_LENGTH + 1],
    table_dirty: bool,
}

impl HarmonicsCore {
    pub(crate) fn new() -> Self {
        let mut params = [0.0; PARAM_COUNT];
        for (value, info) in params.iter_mut().zip(&PARAMS) {
            *value = info.default;
        }
        let mut core = Self {
            params,
            voices: Default::default(),
            table: [0.0; TABLE_LENGTH + 1],
            table_dirty: false,
        };
        core.rebuild_table();
        core
    }

    pub(crate) fn set_param(&mut self, index: usize, value: f64) {
        if self.params[index] != value && index < CONTROL_COUNT {
            self.table_dirty = true;
        }
        self.params[index] = value;
    }

    fn rebuild_table(&mut self) {
        let tau = std::f64::consts::TAU;
        let mut amplitudes = [0.0f64; CONTROL_COUNT];
        let mut total = 0.0;
        for (h, amp) in amplitudes.iter_mut().enumerate() {
            let control = self.params[h] / CONTROL_MAX;
            *amp = control * control;
            total += *amp;
        }
        let scale = if total > 1.0 { 1.0 / total } else { 1.0 };

        for i in 0..TABLE_LENGTH {
            let t = i as f64 / TABLE_LENGTH as f64;
            let mut value = 0.0;
            for (h, amp) in amplitudes.iter().enumerate() {
                if *amp > 0.0 {
                    value += amp * (tau * (h + 1) as f64 * t).sin();
                }
            }
            self.table[i] = (value * scale) as f32;
        }
        self.table[TABLE_LENGTH] = self.table[0];
        self.table_dirty = false;
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
        if self.table_dirty {
            self.rebuild_table();
        }
        let unison = &UNISONS[(self.params[PARAM_UNISON] as usize).min(UNISONS.len() - 1)];
        let spread = unison.spread * envelopes.end(ComputeIndex::Unison);
        let sample_len = 1.0 / sample_rate;
        let table_len = TABLE_LENGTH as f64;

        let voice = &mut self.voices[slot];
        voice.voice_count = unison.voices;
        voice.expression = unison.expression * HARMONICS_BASE_EXPRESSION;
        voice.second_sign = unison.sign;
        voice.subs[0].phase_delta = key_to_hz(pitch + spread) * sample_len * table_len;
        voice.subs[1].phase_delta =
            key_to_hz(pitch + unison.offset - spread) * sample_len * table_len;
        for sub in &mut voice.subs {
            sub.phase = util::f64::wrap(sub.phase, table_len);
        }
    }

    pub(crate) fn render_voice(&mut self, slot: usize, output: &mut [f32]) {
        let table = &self.table;
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
