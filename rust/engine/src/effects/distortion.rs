//! Asymmetric waveshaping distortion (mono). Positive excursions clip
//! harder than negative ones, adding even harmonics.

use super::{defaults, EffectModule};
use crate::params::{double, ParamInfo};
use crate::TickContext;

/// Number of distortion parameters.
pub const PARAM_COUNT: usize = 1;
/// Local index of the drive amount.
pub const PARAM_DRIVE: usize = 0;

/// Parameter descriptors for the distortion module.
pub static PARAMS: [ParamInfo; PARAM_COUNT] = [double(
    *b"dsDrive\0",
    "Distortion",
    "Effects/Distortion",
    0.0,
    8.0,
    2.0,
)];

/// The distortion module.
#[derive(Debug)]
pub struct Distortion {
    values: [f64; PARAM_COUNT],
    drive: f64,
}

impl Distortion {
    /// Creates the module with default parameters.
    #[must_use]
    pub fn new() -> Self {
        let values = defaults(&PARAMS);
        Self {
            values,
            drive: values[PARAM_DRIVE],
        }
    }

    /// Shapes `samples` in place. The negative half drives at half the
    /// strength of the positive half.
    pub fn run_mono(&mut self, samples: &mut [f32]) {
        let a = self.drive as f32;
        if a <= 0.0 {
            return;
        }
        let negative = a * 0.5;
        for sample in samples {
            let x = *sample;
            *sample = if x >= 0.0 {
                x * (1.0 + a) / (1.0 + a * x)
            } else {
                x * (1.0 + negative) / (1.0 - negative * x)
            };
        }
    }
}

impl Default for Distortion {
    fn default() -> Self {
        Self::new()
    }
}

impl EffectModule for Distortion {
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
        self.drive = self.values[PARAM_DRIVE];
    }

    fn stop(&mut self) {}
}
