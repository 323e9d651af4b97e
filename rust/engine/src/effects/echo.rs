//! Feedback echo. The delay length chases its tempo-derived target a
//! little per tick instead of jumping, which keeps length changes free
//! of splicing artifacts.

use itertools::izip;

use super::{defaults, EffectModule};
use crate::params::{stepped, ParamInfo};
use crate::{TickContext, TICKS_PER_PART};

/// Number of echo parameters.
pub const PARAM_COUNT: usize = 2;
/// Local index of the feedback sustain.
pub const PARAM_SUSTAIN: usize = 0;
/// Local index of the delay-length setting.
pub const PARAM_DELAY: usize = 1;

/// Delay setting steps, in parts (half a beat per 12 parts).
const PARTS_PER_STEP: f64 = 6.0;
const MAX_DELAY_SECS: f64 = 2.0;
/// Fraction of the remaining distance covered per tick.
const DELAY_CHASE: f64 = 0.25;

/// Parameter descriptors for the echo module.
pub static PARAMS: [ParamInfo; PARAM_COUNT] = [
    stepped(*b"ecSustn\0", "Echo Sustain", "Effects/Echo", 8.0, 3.0),
    stepped(*b"ecDelay\0", "Echo Delay", "Effects/Echo", 11.0, 3.0),
];

/// The echo module.
#[derive(Debug)]
pub struct Echo {
    values: [f64; PARAM_COUNT],
    sample_rate: f64,
    buffers: [Vec<f32>; 2],
    mask: usize,
    write: usize,
    delay_samples: f64,
    feedback: f32,
}

impl Echo {
    /// Creates the module with default parameters.
    #[must_use]
    pub fn new() -> Self {
        let mut echo = Self {
            values: defaults(&PARAMS),
            sample_rate: 48000.0,
            buffers: [Vec::new(), Vec::new()],
            mask: 0,
            write: 0,
            delay_samples: 1.0,
            feedback: 0.0,
        };
        echo.allocate();
        echo
    }

    fn allocate(&mut self) {
        let length = ((MAX_DELAY_SECS * self.sample_rate).ceil() as usize).next_power_of_two();
        for buffer in &mut self.buffers {
            buffer.clear();
            buffer.resize(length, 0.0);
        }
        self.mask = length - 1;
        self.write = 0;
    }

    fn target_delay(&self, samples_per_tick: f64) -> f64 {
        let parts = (self.values[PARAM_DELAY] + 1.0) * PARTS_PER_STEP;
        let samples = parts * f64::from(TICKS_PER_PART) * samples_per_tick;
        samples.clamp(1.0, (self.mask as f64) - 2.0)
    }

    fn tap(&self, channel: usize) -> f32 {
        let delay_int = self.delay_samples as usize;
        let fraction = (self.delay_samples - delay_int as f64) as f32;
        let buffer = &self.buffers[channel];
        let a = buffer[(self.write + buffer.len() - delay_int) & self.mask];
        let b = buffer[(self.write + buffer.len() - delay_int - 1) & self.mask];
        a + (b - a) * fraction
    }

    /// Processes a stereo pair in place.
    pub fn run_stereo(&mut self, left: &mut [f32], right: &mut [f32]) {
        debug_assert_eq!(left.len(), right.len());
        let feedback = self.feedback;
        for (l, r) in izip!(left.iter_mut(), right.iter_mut()) {
            let tap_l = self.tap(0);
            let tap_r = self.tap(1);
            self.buffers[0][self.write] = *l + tap_l * feedback;
            self.buffers[1][self.write] = *r + tap_r * feedback;
            self.write = (self.write + 1) & self.mask;
            *l += tap_l * feedback;
            *r += tap_r * feedback;
        }
    }
}

impl Default for Echo {
    fn default() -> Self {
        Self::new()
    }
}

impl EffectModule for Echo {
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

    fn tick(&mut self, ctx: &TickContext) {
        self.feedback = (self.values[PARAM_SUSTAIN] / 8.0 * 0.9) as f32;
        let target = self.target_delay(ctx.samples_per_tick);
        self.delay_samples += (target - self.delay_samples) * DELAY_CHASE;
    }

    fn stop(&mut self) {
        for buffer in &mut self.buffers {
            buffer.fill(0.0);
        }
        self.write = 0;
    }
}
