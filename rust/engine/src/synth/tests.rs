use more_asserts::assert_gt;

use super::{
    base_param, SynthKind, SynthUnit, VibratoPreset, VibratoType, BASE_PARAMS, BASE_PARAM_COUNT,
    MAX_VOICES,
};
use crate::envelope::{ComputeIndex, Envelope, MAX_ENVELOPES};
use crate::{samples_per_tick, TickContext};

fn unit(kind: SynthKind) -> SynthUnit {
    let mut unit = SynthUnit::new(kind);
    unit.set_sample_rate(48000.0);
    unit.configure(512);
    unit
}

fn ctx() -> TickContext {
    TickContext {
        bpm: 150.0,
        beat: 0.0,
        samples_per_tick: samples_per_tick(150.0, 48000.0),
        mod_x: 0.0,
        mod_y: 0.0,
    }
}

fn rms(samples: &[f32]) -> f64 {
    (samples
        .iter()
        .map(|s| f64::from(*s) * f64::from(*s))
        .sum::<f64>()
        / samples.len() as f64)
        .sqrt()
}

#[test]
fn kind_tags_round_trip() {
    for kind in [SynthKind::Chip, SynthKind::Fm, SynthKind::Harmonics] {
        assert_eq!(SynthKind::from_tag(kind.tag()), Some(kind));
    }
    assert_eq!(SynthKind::from_tag(2), None);
    assert_eq!(SynthKind::from_tag(99), None);
}

#[test]
fn idle_unit_renders_silence() {
    let mut unit = unit(SynthKind::Fm);
    let mut output = [1.0f32; 256];
    unit.run(&mut output);
    assert!(output.iter().all(|s| *s == 0.0));
}

#[test]
fn note_produces_audio_immediately() {
    let mut unit = unit(SynthKind::Fm);
    unit.begin_note(69, 1.0, None);
    let mut output = [0.0f32; 256];
    unit.run(&mut output);
    assert_gt!(rms(&output), 0.1);
}

#[test]
fn released_voice_fades_and_reports_its_end() {
    let mut unit = unit(SynthKind::Fm);
    let slot = unit.begin_note(69, 1.0, None);
    let mut output = [0.0f32; 400];
    unit.tick(&ctx());
    unit.run(&mut output);
    assert_eq!(unit.take_ended().len(), 0);

    unit.end_note(slot);
    // Default fade-out resolves to a single tick.
    unit.tick(&ctx());
    unit.run(&mut output);
    unit.tick(&ctx());

    let ended = unit.take_ended();
    assert_eq!(ended.as_slice(), &[slot]);
    assert_eq!(unit.active_voice_count(), 0);
    // The report is one-shot.
    assert_eq!(unit.take_ended().len(), 0);
}

#[test]
fn voice_pool_steals_when_exhausted() {
    let mut unit = unit(SynthKind::Fm);
    let first = unit.begin_note(40, 1.0, None);
    for key in 41..48 {
        unit.begin_note(key, 1.0, None);
    }
    assert_eq!(unit.active_voice_count(), MAX_VOICES);

    // The ninth note steals the oldest voice, which must be reported
    // as ended so the host can retire its note.
    let stolen = unit.begin_note(60, 1.0, None);
    assert_eq!(stolen, first);
    assert_eq!(unit.active_voice_count(), MAX_VOICES);
    assert!(unit.take_ended().contains(&first));
}

#[test]
fn envelope_list_caps_at_limit() {
    let mut unit = unit(SynthKind::Fm);
    for _ in 0..MAX_ENVELOPES {
        assert!(unit.add_envelope().is_some());
    }
    assert!(unit.add_envelope().is_none());
    assert_eq!(unit.envelope_count(), MAX_ENVELOPES);

    unit.remove_envelope(0);
    assert_eq!(unit.envelope_count(), MAX_ENVELOPES - 1);
    unit.clear_envelopes();
    assert_eq!(unit.envelope_count(), 0);
}

#[test]
fn envelope_modification_is_visible() {
    let mut unit = unit(SynthKind::Fm);
    unit.add_envelope();
    let envelope = Envelope {
        target: ComputeIndex::NoteVolume,
        curve_preset: 8,
    };
    unit.set_envelope(0, envelope);
    assert_eq!(unit.envelope(0), Some(envelope));
}

#[test]
fn set_param_clamps_and_reports_the_stored_value() {
    let mut unit = unit(SynthKind::Fm);
    assert_eq!(unit.set_param(base_param::FADE_IN, -5.0), Ok(0.0));
    assert_eq!(unit.get_param(base_param::FADE_IN), Some(0.0));
    assert_eq!(unit.set_param(base_param::FADE_IN, 100.0), Ok(9.0));
    assert!(unit.set_param(base_param::FADE_IN, f64::NAN).is_err());
    assert_eq!(unit.get_param(base_param::FADE_IN), Some(9.0));
    assert!(unit.set_param(usize::MAX, 1.0).is_err());
}

#[test]
fn vibrato_presets_have_fixed_constants() {
    let light = VibratoPreset::Light.params().unwrap();
    assert_eq!(light.depth, 0.15);
    assert_eq!(light.speed, 1.0);
    assert_eq!(light.kind, VibratoType::Normal);

    let delayed = VibratoPreset::Delayed.params().unwrap();
    assert_eq!(delayed.depth, 0.3);
    assert_gt!(delayed.delay, 0.0);

    let shaky = VibratoPreset::Shaky.params().unwrap();
    assert_eq!(shaky.kind, VibratoType::Shaky);

    assert!(VibratoPreset::Custom.params().is_none());
}

#[test]
fn persistent_ids_are_unique_per_kind() {
    for kind in [SynthKind::Chip, SynthKind::Fm, SynthKind::Harmonics] {
        let unit = SynthUnit::new(kind);
        let ids: Vec<_> = (0..unit.param_count())
            .map(|i| unit.param_info(i).unwrap().id)
            .collect();
        for (i, a) in ids.iter().enumerate() {
            for b in &ids[i + 1..] {
                assert_ne!(a, b, "duplicate persistent id {:?}", a);
            }
        }
        assert_eq!(ids.len(), BASE_PARAM_COUNT + unit.core.param_count());
    }
    assert_eq!(BASE_PARAMS.len(), BASE_PARAM_COUNT);
}

#[test]
fn rendering_is_deterministic() {
    let render = || {
        let mut unit = unit(SynthKind::Chip);
        unit.begin_note(57, 0.8, None);
        let mut output = [0.0f32; 400];
        unit.tick(&ctx());
        unit.run(&mut output);
        output
    };
    assert_eq!(render(), render());
}
