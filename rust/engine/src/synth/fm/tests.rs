use assert_approx_eq::assert_approx_eq;
use more_asserts::assert_gt;

use super::{
    operator_amplitude_curve, param_freq, param_volume, FmCore, ALGORITHMS, ALGORITHM_COUNT,
    FEEDBACKS, FREQ_RATIOS, OP_COUNT, PARAMS, PARAM_COUNT,
};
use crate::envelope::EnvelopeComputer;

#[test]
fn param_table_layout() {
    assert_eq!(PARAMS.len(), PARAM_COUNT);
    assert_eq!(param_freq(0), 1);
    assert_eq!(param_volume(3), 8);
    assert_eq!(PARAMS[param_volume(0)].default, 1.0);
    assert_eq!(PARAMS[param_volume(1)].default, 0.0);
}

#[test]
fn amplitude_curve_endpoints() {
    assert_approx_eq!(operator_amplitude_curve(0.0), 0.0);
    assert_approx_eq!(operator_amplitude_curve(1.0), 1.0);
    // The curve is convex: half volume is well below half amplitude.
    assert_gt!(0.5, operator_amplitude_curve(0.5));
}

#[test]
fn modulators_always_have_higher_indices() {
    // The renderer evaluates operators from 4 down to 1; a modulator
    // with an index at or below its target would read a stale value.
    for algo in &ALGORITHMS {
        for (target, modulators) in algo.modulators.iter().enumerate() {
            for &m in *modulators {
                assert_gt!(m, target);
                assert!(m < OP_COUNT);
            }
        }
    }
}

#[test]
fn carrier_counts_match_topologies() {
    let expected = [1, 1, 1, 1, 1, 2, 2, 2, 2, 2, 3, 3, 4];
    for (algo, expected) in ALGORITHMS.iter().zip(expected) {
        assert_eq!(algo.carrier_count, expected);
        // Carriers are unmodulated by anything below them, and every
        // associated carrier must actually be a carrier.
        for &associated in &algo.associated_carriers {
            assert!(associated < algo.carrier_count);
        }
    }
    assert_eq!(ALGORITHMS.len(), ALGORITHM_COUNT);
}

#[test]
fn feedback_tables_are_well_formed() {
    for edges in &FEEDBACKS {
        assert!(!edges.is_empty());
        for edge in *edges {
            assert!(edge.from < OP_COUNT);
            assert!(edge.to < OP_COUNT);
        }
    }
    // The first four entries are the single self-feedback loops.
    for (i, edges) in FEEDBACKS[..4].iter().enumerate() {
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].from, i);
        assert_eq!(edges[0].to, i);
    }
}

#[test]
fn ratio_table_has_detuned_twins() {
    assert_eq!(FREQ_RATIOS.len(), 35);
    assert_approx_eq!(FREQ_RATIOS[4].mult, 1.0);
    // Entry 5 beats against entry 4.
    assert_approx_eq!(FREQ_RATIOS[5].mult, 1.0);
    assert_approx_eq!(FREQ_RATIOS[5].hz_offset, 1.5);
    assert_approx_eq!(FREQ_RATIOS[5].amplitude_sign, -1.0);
}

#[test]
fn default_patch_renders_a_sine() {
    let mut core = FmCore::new();
    let envelopes = EnvelopeComputer::default();
    core.tick_voice(0, 69.0, &envelopes, 48000.0);

    let mut output = [0.0f32; 480];
    core.render_voice(0, &mut output);

    let rms = (output.iter().map(|s| f64::from(*s) * f64::from(*s)).sum::<f64>()
        / output.len() as f64)
        .sqrt();
    // A full-volume sine carrier has RMS ~0.707.
    assert_approx_eq!(rms, std::f64::consts::FRAC_1_SQRT_2, 0.05);

    // 440 Hz at 48kHz crosses zero ~8.8 times in 480 samples.
    let crossings = output
        .windows(2)
        .filter(|w| (w[0] >= 0.0) != (w[1] >= 0.0))
        .count();
    assert!((7..=10).contains(&crossings), "crossings = {crossings}");
}

#[test]
fn modulation_adds_sidebands() {
    let mut core = FmCore::new();
    // Algorithm 4: 1 <- 2 <- 3 <- 4; drive op 2 hard.
    core.params[super::PARAM_ALGORITHM] = 4.0;
    core.params[param_volume(1)] = 1.0;
    let envelopes = EnvelopeComputer::default();
    core.tick_voice(0, 69.0, &envelopes, 48000.0);

    let mut modulated = [0.0f32; 480];
    core.render_voice(0, &mut modulated);

    let mut pure = FmCore::new();
    pure.tick_voice(0, 69.0, &envelopes, 48000.0);
    let mut sine = [0.0f32; 480];
    pure.render_voice(0, &mut sine);

    let difference: f64 = modulated
        .iter()
        .zip(&sine)
        .map(|(a, b)| f64::from((a - b).abs()))
        .sum();
    assert_gt!(difference, 1.0);
}
