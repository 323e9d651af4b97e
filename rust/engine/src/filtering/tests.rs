use assert_approx_eq::assert_approx_eq;
use more_asserts::{assert_gt, assert_lt};

use super::{
    freq_setting_to_hz, gain_setting_to_linear, insert_pole, low_pass, peak, pole_coefficients,
    remove_pole, Biquad, FilterPole, PoleKind, POLE_COUNT,
};

fn pole(kind: PoleKind, freq: f64) -> FilterPole {
    FilterPole {
        kind,
        freq,
        gain: 7.0,
    }
}

#[test]
fn setting_scales() {
    assert_approx_eq!(freq_setting_to_hz(28.0), 8000.0);
    assert_approx_eq!(freq_setting_to_hz(24.0), 4000.0);
    assert_approx_eq!(gain_setting_to_linear(7.0), 1.0);
    assert_approx_eq!(gain_setting_to_linear(9.0), 2.0);
}

#[test]
fn remove_shifts_down_and_clears_last() {
    let mut poles = [FilterPole::default(); POLE_COUNT];
    poles[0] = pole(PoleKind::LowPass, 10.0);
    poles[1] = pole(PoleKind::Peak, 20.0);
    poles[2] = pole(PoleKind::HighPass, 30.0);
    remove_pole(&mut poles, 1);
    assert_eq!(poles[0].kind, PoleKind::LowPass);
    assert_eq!(poles[1].kind, PoleKind::HighPass);
    assert_eq!(poles[2], FilterPole::default());
    assert_eq!(poles[POLE_COUNT - 1], FilterPole::default());
}

#[test]
fn insert_shifts_up() {
    let mut poles = [FilterPole::default(); POLE_COUNT];
    poles[0] = pole(PoleKind::LowPass, 10.0);
    poles[1] = pole(PoleKind::HighPass, 30.0);
    insert_pole(&mut poles, 1, pole(PoleKind::Peak, 20.0));
    assert_eq!(poles[0].kind, PoleKind::LowPass);
    assert_eq!(poles[1].kind, PoleKind::Peak);
    assert_eq!(poles[2].kind, PoleKind::HighPass);
}

fn magnitude_at(biquad: &mut Biquad, freq: f64, sample_rate: f64) -> f64 {
    // Drive with a sine and measure steady-state RMS against the input RMS.
    let frames = (sample_rate as usize) / 4;
    let mut sum = 0.0;
    let mut in_sum = 0.0;
    for i in 0..frames {
        let x = (std::f64::consts::TAU * freq * i as f64 / sample_rate).sin();
        let y = biquad.process(x);
        // Skip the transient.
        if i > frames / 4 {
            sum += y * y;
            in_sum += x * x;
        }
    }
    (sum / in_sum).sqrt()
}

#[test]
fn low_pass_attenuates_high_frequencies() {
    let mut biquad = Biquad::default();
    biquad.set_coefficients(low_pass(1000.0, 48000.0, 1.0));
    let low = magnitude_at(&mut biquad, 100.0, 48000.0);
    biquad.reset();
    let high = magnitude_at(&mut biquad, 10000.0, 48000.0);
    assert_gt!(low, 0.9);
    assert_lt!(high, 0.1);
}

#[test]
fn peak_boosts_at_center() {
    let mut biquad = Biquad::default();
    biquad.set_coefficients(peak(1000.0, 48000.0, 4.0));
    let center = magnitude_at(&mut biquad, 1000.0, 48000.0);
    biquad.reset();
    let far = magnitude_at(&mut biquad, 100.0, 48000.0);
    assert_gt!(center, 2.0);
    assert_approx_eq!(far, 1.0, 0.1);
}

#[test]
fn off_pole_is_identity() {
    let coefficients = pole_coefficients(&FilterPole::default(), 48000.0, 1.0, 1.0);
    let mut biquad = Biquad::default();
    biquad.set_coefficients(coefficients);
    for x in [0.0, 0.5, -1.0] {
        assert_approx_eq!(biquad.process(x), x);
    }
}
