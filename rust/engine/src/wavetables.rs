//! Process-wide read-only lookup tables, built on first use.

use std::sync::OnceLock;

/// Must be a power of two; lookups mask the integer phase with
/// `SINE_WAVE_LENGTH - 1`.
pub const SINE_WAVE_LENGTH: usize = 256;

static SINE_WAVE: OnceLock<[f64; SINE_WAVE_LENGTH + 1]> = OnceLock::new();

/// The shared sine table. One guard sample is appended so interpolating
/// reads of `index + 1` need no second mask.
#[must_use]
pub fn sine_wave() -> &'static [f64; SINE_WAVE_LENGTH + 1] {
    SINE_WAVE.get_or_init(|| {
        let mut table = [0.0; SINE_WAVE_LENGTH + 1];
        for (i, v) in table.iter_mut().enumerate() {
            *v = (std::f64::consts::TAU * i as f64 / SINE_WAVE_LENGTH as f64).sin();
        }
        table
    })
}

/// Linearly-interpolated sine lookup. `phase_mix` is in table units, so
/// one period spans `SINE_WAVE_LENGTH`.
#[inline]
#[must_use]
pub fn sine_at(phase_mix: f64) -> f64 {
    let table = sine_wave();
    let phase_int = phase_mix as i64;
    let index = (phase_int as usize) & (SINE_WAVE_LENGTH - 1);
    util::f64::lerp(table[index], table[index + 1], phase_mix - phase_int as f64)
}

/// Equal-tempered key to frequency; key 69 is concert A at 440 Hz.
#[must_use]
pub fn key_to_hz(key: f64) -> f64 {
    2.0_f64.powf((key - 69.0) / 12.0) * 440.0
}

#[cfg(test)]
mod tests {
    use assert_approx_eq::assert_approx_eq;

    use super::{key_to_hz, sine_at, SINE_WAVE_LENGTH};

    #[test]
    fn key_69_is_concert_a() {
        assert_approx_eq!(key_to_hz(69.0), 440.0);
        assert_approx_eq!(key_to_hz(81.0), 880.0);
        assert_approx_eq!(key_to_hz(57.0), 220.0);
    }

    #[test]
    fn sine_quarter_points() {
        let quarter = SINE_WAVE_LENGTH as f64 / 4.0;
        assert_approx_eq!(sine_at(0.0), 0.0);
        assert_approx_eq!(sine_at(quarter), 1.0);
        assert_approx_eq!(sine_at(quarter * 2.0), 0.0, 1e-9);
    }

    #[test]
    fn interpolation_is_continuous_at_wrap() {
        let just_before = sine_at(SINE_WAVE_LENGTH as f64 - 1e-6);
        assert_approx_eq!(just_before, 0.0, 1e-4);
    }
}
