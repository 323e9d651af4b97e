//! Final volume stage, interpolated across each tick to avoid zipper
//! noise.

use itertools::izip;

use super::{defaults, EffectModule};
use crate::params::{double, ParamInfo};
use crate::TickContext;

/// Number of fader parameters.
pub const PARAM_COUNT: usize = 1;
/// Local index of the volume setting.
pub const PARAM_VOLUME: usize = 0;

const VOLUME_LOG_SCALE: f64 = 0.1428;

/// Parameter descriptors for the fader module.
pub static PARAMS: [ParamInfo; PARAM_COUNT] =
    [double(*b"vlVolume", "Volume", "Volume", -25.0, 25.0, 0.0)];

/// Linear gain for a volume setting. The minimum setting is a hard
/// mute rather than a small gain.
#[must_use]
pub fn volume_to_mult(volume: f64) -> f64 {
    if volume <= -25.0 {
        0.0
    } else {
        2.0_f64.powf(VOLUME_LOG_SCALE * volume)
    }
}

/// The fader module.
#[derive(Debug)]
pub struct Fader {
    values: [f64; PARAM_COUNT],
    gain: f64,
    gain_delta: f64,
}

impl Fader {
    /// Creates the module at unity gain.
    #[must_use]
    pub fn new() -> Self {
        let values = defaults(&PARAMS);
        Self {
            values,
            gain: volume_to_mult(values[PARAM_VOLUME]),
            gain_delta: 0.0,
        }
    }

    /// Applies the interpolated gain to a stereo pair in place.
    pub fn run_stereo(&mut self, left: &mut [f32], right: &mut [f32]) {
        debug_assert_eq!(left.len(), right.len());
        let mut gain = self.gain;
        for (l, r) in izip!(left.iter_mut(), right.iter_mut()) {
            *l *= gain as f32;
            *r *= gain as f32;
            gain += self.gain_delta;
        }
        self.gain = gain;
    }
}

impl Default for Fader {
    fn default() -> Self {
        Self::new()
    }
}

impl EffectModule for Fader {
    fn infos(&self) -> &'static [ParamInfo] {
        &PARAMS
    }

    fn values(&self) -> &[f64] {
        &self.values
    }

    fn values_mut(&mut self) -> &mut [f64] {
        &mut self.values
    }

    fn tick(&mut self, ctx: &TickContext) {
        let target = volume_to_mult(self.values[PARAM_VOLUME]);
        self.gain_delta = (target - self.gain) / ctx.samples_per_tick;
    }

    fn stop(&mut self) {
        self.gain = volume_to_mult(self.values[PARAM_VOLUME]);
        self.gain_delta = 0.0;
    }
}
