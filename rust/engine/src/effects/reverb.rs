//! Reverb: four delay lines mixed through a Householder reflection,
//! which diffuses energy between the lines without coloring the sum.

use itertools::izip;

use super::{defaults, EffectModule};
use crate::params::{stepped, ParamInfo};
use crate::TickContext;

/// Number of reverb parameters.
pub const PARAM_COUNT: usize = 1;
/// Local index of the wet amount.
pub const PARAM_MIX: usize = 0;

const LINE_COUNT: usize = 4;
/// Mutually prime line lengths at 44.1kHz, scaled to the actual rate.
const BASE_LENGTHS: [usize; LINE_COUNT] = [1687, 1601, 2053, 2251];
const DECAY: f32 = 0.77;

/// Parameter descriptors for the reverb module.
pub static PARAMS: [ParamInfo; PARAM_COUNT] =
    [stepped(*b"rvMix\0\0\0", "Reverb", "Effects/Reverb", 32.0, 8.0)];

/// The reverb module.
#[derive(Debug)]
pub struct Reverb {
    values: [f64; PARAM_COUNT],
    sample_rate: f64,
    lines: [Vec<f32>; LINE_COUNT],
    writes: [usize; LINE_COUNT],
    wet: f32,
}

impl Reverb {
    /// Creates the module with default parameters.
    #[must_use]
    pub fn new() -> Self {
        let mut reverb = Self {
            values: defaults(&PARAMS),
            sample_rate: 48000.0,
            lines: Default::default(),
            writes: [0; LINE_COUNT],
            wet: 0.25,
        };
        reverb.allocate();
        reverb
    }

    fn allocate(&mut self) {
        let scale = self.sample_rate / 44100.0;
        for (line, base) in self.lines.iter_mut().zip(BASE_LENGTHS) {
            let length = ((base as f64 * scale) as usize).max(4);
            line.clear();
            line.resize(length, 0.0);
        }
        self.writes = [0; LINE_COUNT];
    }

    /// Processes a stereo pair in place.
    pub fn run_stereo(&mut self, left: &mut [f32], right: &mut [f32]) {
        debug_assert_eq!(left.len(), right.len());
        let wet = self.wet;
        let dry = 1.0 - wet * 0.5;
        for (l, r) in izip!(left.iter_mut(), right.iter_mut()) {
            let input = (*l + *r) * 0.5;

            let mut taps = [0.0f32; LINE_COUNT];
            for (tap, (line, write)) in
                taps.iter_mut().zip(self.lines.iter().zip(&self.writes))
            {
                *tap = line[*write];
            }

            // Householder reflection: y_i = x_i - (sum / 2).
            let half_sum = (taps[0] + taps[1] + taps[2] + taps[3]) * 0.5;
            for (i, (line, write)) in
                self.lines.iter_mut().zip(self.writes.iter_mut()).enumerate()
            {
                line[*write] = input + (taps[i] - half_sum) * DECAY;
                *write += 1;
                if *write == line.len() {
                    *write = 0;
                }
            }

            *l = *l * dry + (taps[0] + taps[2]) * wet;
            *r = *r * dry + (taps[1] + taps[3]) * wet;
        }
    }
}

impl Default for Reverb {
    fn default() -> Self {
        Self::new()
    }
}

impl EffectModule for Reverb {
    fn infos(&self) -> &'static [ParamInfo] {
        &PARAMS
    }

    fn values(&self) -> &[f64] {
        &self.values
    }

    fn values_mut(&mut self) -> &mut [f64] {
        &mut self.values
    }

    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.allocate();
    }

    fn tick(&mut self, _ctx: &TickContext) {
        self.wet = (self.values[PARAM_MIX] / 32.0) as f32;
    }

    fn stop(&mut self) {
        for line in &mut self.lines {
            line.fill(0.0);
        }
        self.writes = [0; LINE_COUNT];
    }
}
