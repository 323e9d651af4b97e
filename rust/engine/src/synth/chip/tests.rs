use assert_approx_eq::assert_approx_eq;
use more_asserts::{assert_gt, assert_lt};

use super::{chip_waves, wave_at, ChipCore, PARAM_UNISON, PARAM_WAVEFORM, UNISONS, WAVE_COUNT};
use crate::envelope::EnvelopeComputer;

#[test]
fn wave_bank_is_complete_and_bounded() {
    let waves = chip_waves();
    assert_eq!(waves.len(), WAVE_COUNT);
    for wave in waves {
        for sample in wave {
            assert!(sample.abs() <= 1.0);
        }
        // Guard sample wraps.
        assert_approx_eq!(wave[wave.len() - 1], wave[0]);
    }
}

#[test]
fn unison_table_shapes() {
    assert_eq!(UNISONS.len(), 10);
    assert_eq!(UNISONS[0].voices, 1);
    for unison in &UNISONS[1..] {
        assert_eq!(unison.voices, 2);
    }
    // Fifth and octave sit at their musical intervals.
    assert_approx_eq!(UNISONS[5].offset, 3.5);
    assert_approx_eq!(UNISONS[6].offset, 6.0);
}

#[test]
fn interpolated_lookup_is_exact_at_integers() {
    let waves = chip_waves();
    let square = &waves[2];
    assert_approx_eq!(wave_at(square, 0.0), 1.0);
    assert_approx_eq!(wave_at(square, 40.0), -1.0);
}

#[test]
fn square_renders_at_note_frequency() {
    let mut core = ChipCore::new();
    core.params[PARAM_WAVEFORM] = 2.0;
    let envelopes = EnvelopeComputer::default();
    core.tick_voice(0, 69.0, &envelopes, 48000.0);

    let mut output = [0.0f32; 480];
    core.render_voice(0, &mut output);

    let crossings = output
        .windows(2)
        .filter(|w| (w[0] >= 0.0) != (w[1] >= 0.0))
        .count();
    // 440 Hz over 10ms.
    assert!((7..=10).contains(&crossings), "crossings = {crossings}");
}

#[test]
fn unison_detune_beats_against_itself() {
    let mut core = ChipCore::new();
    core.params[PARAM_UNISON] = 4.0; // dissonant, quarter-semitone spread
    let envelopes = EnvelopeComputer::default();
    core.tick_voice(0, 69.0, &envelopes, 48000.0);

    let deltas = {
        let voice = &core.voices[0];
        (voice.subs[0].phase_delta, voice.subs[1].phase_delta)
    };
    assert_gt!(deltas.0, deltas.1);
    assert_lt!((deltas.0 - deltas.1).abs() / deltas.0, 0.05);
}

#[test]
fn phases_persist_across_parameter_changes() {
    let mut core = ChipCore::new();
    let envelopes = EnvelopeComputer::default();
    core.tick_voice(0, 69.0, &envelopes, 48000.0);
    let mut output = [0.0f32; 100];
    core.render_voice(0, &mut output);
    let phase_before = core.voices[0].subs[0].phase;

    core.params[PARAM_WAVEFORM] = 5.0;
    core.tick_voice(0, 69.0, &envelopes, 48000.0);
    let phase_after = core.voices[0].subs[0].phase;
    assert_approx_eq!(phase_before, phase_after);
}
