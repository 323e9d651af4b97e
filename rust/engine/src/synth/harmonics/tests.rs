use assert_approx_eq::assert_approx_eq;
use more_asserts::assert_gt;

use super::{HarmonicsCore, CONTROL_COUNT, PARAMS, PARAM_COUNT, TABLE_LENGTH};
use crate::envelope::EnvelopeComputer;

#[test]
fn param_table_layout() {
    assert_eq!(PARAMS.len(), PARAM_COUNT);
    assert_eq!(PARAM_COUNT, CONTROL_COUNT + 1);
    // The fundamental defaults to full, everything else to silent.
    assert_eq!(PARAMS[0].default, 7.0);
    assert_eq!(PARAMS[1].default, 0.0);
    // Persistent ids must be unique.
    for (i, a) in PARAMS.iter().enumerate() {
        for b in &PARAMS[i + 1..] {
            assert_ne!(a.id, b.id);
        }
    }
}

#[test]
fn default_table_is_a_sine() {
    let core = HarmonicsCore::new();
    let quarter = TABLE_LENGTH / 4;
    assert_approx_eq!(f64::from(core.table[0]), 0.0, 1e-6);
    assert_approx_eq!(f64::from(core.table[quarter]), 1.0, 1e-6);
    assert_approx_eq!(f64::from(core.table[quarter * 3]), -1.0, 1e-6);
}

#[test]
fn adding_a_harmonic_rebuilds_the_table() {
    let mut core = HarmonicsCore::new();
    // Second harmonic at full: the table gains a faster component.
    core.set_param(1, 7.0);
    assert!(core.table_dirty);
    let envelopes = EnvelopeComputer::default();
    core.tick_voice(0, 69.0, &envelopes, 48000.0);
    assert!(!core.table_dirty);

    // A pure sine satisfies table[i] == -table[i + half]; the second
    // harmonic breaks that symmetry.
    let eighth = TABLE_LENGTH / 8;
    let difference = (f64::from(core.table[eighth]) + f64::from(core.table[eighth * 5])).abs();
    assert_gt!(difference, 0.5);
}

#[test]
fn renders_nonsilent_audio() {
    let mut core = HarmonicsCore::new();
    let envelopes = EnvelopeComputer::default();
    core.tick_voice(0, 60.0, &envelopes, 48000.0);
    let mut output = [0.0f32; 512];
    core.render_voice(0, &mut output);
    let rms = (output.iter().map(|s| f64::from(*s) * f64::from(*s)).sum::<f64>()
        / output.len() as f64)
        .sqrt();
    assert_gt!(rms, 0.1);
}
