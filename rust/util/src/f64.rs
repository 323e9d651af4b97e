//! Scalar helpers on `f64`.

use std::ops::RangeInclusive;

/// Linear interpolation; `t` is not clamped.
#[must_use]
pub fn lerp(value_at_zero: f64, value_at_one: f64, t: f64) -> f64 {
    value_at_zero * (1.0 - t) + value_at_one * t
}

/// Maps `input` from one span onto another, extrapolating outside it.
#[must_use]
pub fn rescale_points(input: f64, from_low: f64, from_high: f64, to_low: f64, to_high: f64) -> f64 {
    let input = (input - from_low) / (from_high - from_low);
    input * (to_high - to_low) + to_low
}

/// Range-based form of [`rescale_points`].
#[must_use]
pub fn rescale(input: f64, from: RangeInclusive<f64>, to: RangeInclusive<f64>) -> f64 {
    rescale_points(input, *from.start(), *from.end(), *to.start(), *to.end())
}

/// Wraps `value` into `[0, length)`. `length` must be positive.
#[must_use]
pub fn wrap(value: f64, length: f64) -> f64 {
    let rem = value % length;
    if rem < 0.0 {
        rem + length
    } else {
        rem
    }
}

#[cfg(test)]
mod tests {
    use assert_approx_eq::assert_approx_eq;

    use super::{lerp, rescale, wrap};

    #[test]
    fn lerp_endpoints() {
        assert_approx_eq!(lerp(2.0, 6.0, 0.0), 2.0);
        assert_approx_eq!(lerp(2.0, 6.0, 1.0), 6.0);
        assert_approx_eq!(lerp(2.0, 6.0, 0.5), 4.0);
    }

    #[test]
    fn rescale_maps_ranges() {
        assert_approx_eq!(rescale(5.0, 0.0..=10.0, 0.0..=1.0), 0.5);
        assert_approx_eq!(rescale(0.0, -1.0..=1.0, 0.0..=100.0), 50.0);
    }

    #[test]
    fn wrap_negative_values() {
        assert_approx_eq!(wrap(-0.25, 1.0), 0.75);
        assert_approx_eq!(wrap(2.5, 1.0), 0.5);
    }
}
