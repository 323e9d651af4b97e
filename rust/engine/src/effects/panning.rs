//! Pan position and stereo width; the mono→stereo transition of the
//! effect chain happens here.

use itertools::izip;

use super::{defaults, EffectModule};
use crate::params::{double, ParamInfo};
use crate::TickContext;

/// Number of panning parameters.
pub const PARAM_COUNT: usize = 2;
/// Local index of the pan position.
pub const PARAM_PAN: usize = 0;
/// Local index of the stereo-width delay amount.
pub const PARAM_DELAY: usize = 1;

/// Maximum inter-channel delay at full width, in seconds.
const MAX_DELAY_SECS: f64 = 0.0005;
const DELAY_LINE_LENGTH: usize = 64;

/// Parameter descriptors for the panning module.
pub static PARAMS: [ParamInfo; PARAM_COUNT] = [
    double(*b"pnPan\0\0\0", "Pan", "Panning", 0.0, 100.0, 50.0),
    double(*b"pnDelay\0", "Stereo Delay", "Panning", 0.0, 1.0, 0.0),
];

/// The panning module.
#[derive(Debug)]
pub struct Panning {
    values: [f64; PARAM_COUNT],
    sample_rate: f64,
    left_gain: f32,
    right_gain: f32,
    delay_samples: usize,
    delay_left: bool,
    delay_line: [f32; DELAY_LINE_LENGTH],
    write: usize,
}

impl Panning {
    /// Creates the module centered with no width delay.
    #[must_use]
    pub fn new() -> Self {
        let mut panning = Self {
            values: defaults(&PARAMS),
            sample_rate: 48000.0,
            left_gain: 0.0,
            right_gain: 0.0,
            delay_samples: 0,
            delay_left: false,
            delay_line: [0.0; DELAY_LINE_LENGTH],
            write: 0,
        };
        panning.update();
        panning
    }

    fn update(&mut self) {
        let position = self.values[PARAM_PAN] / 100.0;
        let angle = util::f64::rescale(
            self.values[PARAM_PAN],
            0.0..=100.0,
            0.0..=std::f64::consts::FRAC_PI_2,
        );
        self.left_gain = angle.cos() as f32;
        self.right_gain = angle.sin() as f32;
        let delay = self.values[PARAM_DELAY] * MAX_DELAY_SECS * self.sample_rate;
        self.delay_samples = (delay.round() as usize).min(DELAY_LINE_LENGTH - 1);
        // The channel the sound is panned away from arrives late.
        self.delay_left = position >= 0.5;
    }

    /// Reads the mono signal from `left` and writes the panned stereo
    /// pair into `left` and `right`.
    pub fn run(&mut self, left: &mut [f32], right: &mut [f32]) {
        debug_assert_eq!(left.len(), right.len());
        for (l, r) in izip!(left.iter_mut(), right.iter_mut()) {
            let mono = *l;
            self.delay_line[self.write] = mono;
            let read =
                (self.write + DELAY_LINE_LENGTH - self.delay_samples) % DELAY_LINE_LENGTH;
            let delayed = self.delay_line[read];
            self.write = (self.write + 1) % DELAY_LINE_LENGTH;

            if self.delay_left {
                *l = delayed * self.left_gain;
                *r = mono * self.right_gain;
            } else {
                *l = mono * self.left_gain;
                *r = delayed * self.right_gain;
            }
        }
    }
}

impl Default for Panning {
    fn default() -> Self {
        Self::new()
    }
}

impl EffectModule for Panning {
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
        self.update();
    }

    fn tick(&mut self, _ctx: &TickContext) {
        self.update();
    }

    fn stop(&mut self) {
        self.delay_line.fill(0.0);
        self.write = 0;
    }
}
