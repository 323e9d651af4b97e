//! Post EQ: a cascade of up to eight biquad poles (mono).

use super::{defaults, EffectModule};
use crate::filtering::{
    pole_coefficients, Biquad, FilterPole, PoleKind, FREQ_SETTING_MAX, GAIN_SETTING_MAX,
    POLE_COUNT,
};
use crate::params::{choice, stepped, ParamInfo};
use crate::TickContext;
use num_traits::FromPrimitive;

/// Number of EQ parameters: three per pole.
pub const PARAM_COUNT: usize = POLE_COUNT * 3;

static POLE_KIND_VALUES: [&str; 4] = ["Off", "Low-pass", "High-pass", "Peak"];

/// Parameter descriptors for the EQ module.
pub static PARAMS: [ParamInfo; PARAM_COUNT] = [
    choice(*b"eqTyp0\0\0", "EQ 1 Type", "Effects/EQ", &POLE_KIND_VALUES, 0.0),
    stepped(*b"eqFrq0\0\0", "EQ 1 Freq", "Effects/EQ", FREQ_SETTING_MAX, 0.0),
    stepped(*b"eqGan0\0\0", "EQ 1 Gain", "Effects/EQ", GAIN_SETTING_MAX, 0.0),
    choice(*b"eqTyp1\0\0", "EQ 2 Type", "Effects/EQ", &POLE_KIND_VALUES, 0.0),
    stepped(*b"eqFrq1\0\0", "EQ 2 Freq", "Effects/EQ", FREQ_SETTING_MAX, 0.0),
    stepped(*b"eqGan1\0\0", "EQ 2 Gain", "Effects/EQ", GAIN_SETTING_MAX, 0.0),
    choice(*b"eqTyp2\0\0", "EQ 3 Type", "Effects/EQ", &POLE_KIND_VALUES, 0.0),
    stepped(*b"eqFrq2\0\0", "EQ 3 Freq", "Effects/EQ", FREQ_SETTING_MAX, 0.0),
    stepped(*b"eqGan2\0\0", "EQ 3 Gain", "Effects/EQ", GAIN_SETTING_MAX, 0.0),
    choice(*b"eqTyp3\0\0", "EQ 4 Type", "Effects/EQ", &POLE_KIND_VALUES, 0.0),
    stepped(*b"eqFrq3\0\0", "EQ 4 Freq", "Effects/EQ", FREQ_SETTING_MAX, 0.0),
    stepped(*b"eqGan3\0\0", "EQ 4 Gain", "Effects/EQ", GAIN_SETTING_MAX, 0.0),
    choice(*b"eqTyp4\0\0", "EQ 5 Type", "Effects/EQ", &POLE_KIND_VALUES, 0.0),
    stepped(*b"eqFrq4\0\0", "EQ 5 Freq", "Effects/EQ", FREQ_SETTING_MAX, 0.0),
    stepped(*b"eqGan4\0\0", "EQ 5 Gain", "Effects/EQ", GAIN_SETTING_MAX, 0.0),
    choice(*b"eqTyp5\0\0", "EQ 6 Type", "Effects/EQ", &POLE_KIND_VALUES, 0.0),
    stepped(*b"eqFrq5\0\0", "EQ 6 Freq", "Effects/EQ", FREQ_SETTING_MAX, 0.0),
    stepped(*b"eqGan5\0\0", "EQ 6 Gain", "Effects/EQ", GAIN_SETTING_MAX, 0.0),
    choice(*b"eqTyp6\0\0", "EQ 7 Type", "Effects/EQ", &POLE_KIND_VALUES, 0.0),
    stepped(*b"eqFrq6\0\0", "EQ 7 Freq", "Effects/EQ", FREQ_SETTING_MAX, 0.0),
    stepped(*b"eqGan6\0\0", "EQ 7 Gain", "Effects/EQ", GAIN_SETTING_MAX, 0.0),
    choice(*b"eqTyp7\0\0", "EQ 8 Type", "Effects/EQ", &POLE_KIND_VALUES, 0.0),
    stepped(*b"eqFrq7\0\0", "EQ 8 Freq", "Effects/EQ", FREQ_SETTING_MAX, 0.0),
    stepped(*b"eqGan7\0\0", "EQ 8 Gain", "Effects/EQ", GAIN_SETTING_MAX, 0.0),
];

/// The post-EQ module.
#[derive(Debug)]
pub struct Eq {
    values: [f64; PARAM_COUNT],
    filters: [Biquad; POLE_COUNT],
    active: [bool; POLE_COUNT],
    sample_rate: f64,
}

impl Eq {
    /// Creates the module with every pole off.
    #[must_use]
    pub fn new() -> Self {
        Self {
            values: defaults(&PARAMS),
            filters: Default::default(),
            active: [false; POLE_COUNT],
            sample_rate: 48000.0,
        }
    }

    /// The pole at `index`, assembled from its three parameters.
    #[must_use]
    pub fn pole(&self, index: usize) -> FilterPole {
        let at = index * 3;
        FilterPole {
            kind: PoleKind::from_f64(self.values[at]).unwrap_or_default(),
            freq: self.values[at + 1],
            gain: self.values[at + 2],
        }
    }

    /// Runs the active poles over `samples` in place.
    pub fn run_mono(&mut self, samples: &mut [f32]) {
        for sample in samples {
            let mut value = f64::from(*sample);
            for (filter, active) in self.filters.iter_mut().zip(&self.active) {
                if *active {
                    value = filter.process(value);
                }
            }
            *sample = value as f32;
        }
    }
}

impl Default for Eq {
    fn default() -> Self {
        Self::new()
    }
}

impl EffectModule for Eq {
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
    }

    fn tick(&mut self, _ctx: &TickContext) {
        for i in 0..POLE_COUNT {
            let pole = self.pole(i);
            self.active[i] = pole.kind != PoleKind::Off;
            self.filters[i].set_coefficients(pole_coefficients(&pole, self.sample_rate, 1.0, 1.0));
        }
    }

    fn stop(&mut self) {
        for filter in &mut self.filters {
            filter.reset();
        }
    }
}
