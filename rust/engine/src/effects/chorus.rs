//! Chorus: two LFO-modulated delay taps per channel, LFOs in
//! quadrature between the channels.

use itertools::izip;

use super::{defaults, EffectModule};
use crate::params::{double, ParamInfo};
use crate::TickContext;

/// Number of chorus parameters.
pub const PARAM_COUNT: usize = 1;
/// Local index of the wet amount.
pub const PARAM_MIX: usize = 0;

const LFO_HZ: f64 = 0.6;
const MIN_DELAY_SECS: f64 = 0.0017;
const MAX_DELAY_SECS: f64 = 0.0051;
const TAP_PHASE_OFFSET: f64 = std::f64::consts::TAU / 3.0;

/// Parameter descriptors for the chorus module.
pub static PARAMS: [ParamInfo; PARAM_COUNT] =
    [double(*b"chMix\0\0\0", "Chorus", "Effects/Chorus", 0.0, 8.0, 4.0)];

/// The chorus module.
#[derive(Debug)]
pub struct Chorus {
    values: [f64; PARAM_COUNT],
    sample_rate: f64,
    buffers: [Vec<f32>; 2],
    mask: usize,
    write: usize,
    lfo_phase: f64,
    wet: f32,
}

impl Chorus {
    /// Creates the module with default parameters.
    #[must_use]
    pub fn new() -> Self {
        let mut chorus = Self {
            values: defaults(&PARAMS),
            sample_rate: 48000.0,
            buffers: [Vec::new(), Vec::new()],
            mask: 0,
            write: 0,
            lfo_phase: 0.0,
            wet: 0.5,
        };
        chorus.allocate();
        chorus
    }

    fn allocate(&mut self) {
        let needed = (MAX_DELAY_SECS * self.sample_rate).ceil() as usize + 2;
        let length = needed.next_power_of_two();
        for buffer in &mut self.buffers {
            buffer.clear();
            buffer.resize(length, 0.0);
        }
        self.mask = length - 1;
        self.write = 0;
    }

    fn tap(&self, channel: usize, delay: f64) -> f32 {
        let delay_int = delay as usize;
        let fraction = (delay - delay_int as f64) as f32;
        let buffer = &self.buffers[channel];
        let a = buffer[(self.write + buffer.len() - delay_int) & self.mask];
        let b = buffer[(self.write + buffer.len() - delay_int - 1) & self.mask];
        a + (b - a) * fraction
    }

    /// Processes a stereo pair in place.
    pub fn run_stereo(&mut self, left: &mut [f32], right: &mut [f32]) {
        debug_assert_eq!(left.len(), right.len());
        let center = (MIN_DELAY_SECS + MAX_DELAY_SECS) * 0.5 * self.sample_rate;
        let depth = (MAX_DELAY_SECS - MIN_DELAY_SECS) * 0.5 * self.sample_rate - 1.0;
        let phase_incr = std::f64::consts::TAU * LFO_HZ / self.sample_rate;
        let wet = self.wet;
        let dry = 1.0 - wet;

        for (l, r) in izip!(left.iter_mut(), right.iter_mut()) {
            self.buffers[0][self.write] = *l;
            self.buffers[1][self.write] = *r;

            let mut out = [0.0f32; 2];
            for (channel, slot) in out.iter_mut().enumerate() {
                // Right channel runs a quarter period behind.
                let phase =
                    self.lfo_phase + channel as f64 * std::f64::consts::FRAC_PI_2;
                let tap_a = center + depth * phase.sin();
                let tap_b = center + depth * (phase + TAP_PHASE_OFFSET).sin();
                *slot = (self.tap(channel, tap_a) + self.tap(channel, tap_b)) * 0.5;
            }

            self.write = (self.write + 1) & self.mask;
            self.lfo_phase += phase_incr;
            if self.lfo_phase >= std::f64::consts::TAU {
                self.lfo_phase -= std::f64::consts::TAU;
            }

            *l = *l * dry + out[0] * wet;
            *r = *r * dry + out[1] * wet;
        }
    }
}

impl Default for Chorus {
    fn default() -> Self {
        Self::new()
    }
}

impl EffectModule for Chorus {
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
        self.wet = (self.values[PARAM_MIX] / 8.0) as f32;
    }

    fn stop(&mut self) {
        for buffer in &mut self.buffers {
            buffer.fill(0.0);
        }
        self.write = 0;
        self.lfo_phase = 0.0;
    }
}
