//! Sample-rate and bit-depth decimation (mono).

use super::{defaults, EffectModule};
use crate::params::{stepped, ParamInfo};
use crate::TickContext;

/// Number of bitcrusher parameters.
pub const PARAM_COUNT: usize = 2;
/// Local index of the frequency-crush setting.
pub const PARAM_FREQ: usize = 0;
/// Local index of the bit-crush setting.
pub const PARAM_QUANTIZATION: usize = 1;

/// Parameter descriptors for the bitcrusher module.
pub static PARAMS: [ParamInfo; PARAM_COUNT] = [
    stepped(
        *b"bcFreq\0\0",
        "Frequency Crush",
        "Effects/Bitcrusher",
        14.0,
        7.0,
    ),
    stepped(
        *b"bcQuant\0",
        "Bit Crush",
        "Effects/Bitcrusher",
        8.0,
        4.0,
    ),
];

/// The bitcrusher module.
#[derive(Debug)]
pub struct Bitcrusher {
    values: [f64; PARAM_COUNT],
    /// Input samples per held output sample.
    period: f64,
    levels: f32,
    phase: f64,
    held: f32,
}

impl Bitcrusher {
    /// Creates the module with default parameters.
    #[must_use]
    pub fn new() -> Self {
        Self {
            values: defaults(&PARAMS),
            period: 1.0,
            levels: 256.0,
            phase: 0.0,
            held: 0.0,
        }
    }

    /// Decimates `samples` in place.
    pub fn run_mono(&mut self, samples: &mut [f32]) {
        for sample in samples {
            self.phase += 1.0;
            if self.phase >= self.period {
                self.phase -= self.period;
                self.held = (*sample * self.levels).round() / self.levels;
            }
            *sample = self.held;
        }
    }
}

impl Default for Bitcrusher {
    fn default() -> Self {
        Self::new()
    }
}

impl EffectModule for Bitcrusher {
    fn infos(&self) -> &'static [ParamInfo] {
        &PARAMS
    }

    fn values(&self) -> &[f64] {
        &self.values
    }

    fn values_mut(&mut self) -> &mut [f64] {
        &mut self.values
    }

    fn tick(&mut self, _ctx: &TickContext) {
        self.period = 2.0_f64.powf(self.values[PARAM_FREQ] / 2.0);
        let bits = (8.0 - self.values[PARAM_QUANTIZATION] * 0.875).max(1.0);
        self.levels = 2.0_f32.powf(bits as f32);
    }

    fn stop(&mut self) {
        self.phase = 0.0;
        self.held = 0.0;
    }
}
