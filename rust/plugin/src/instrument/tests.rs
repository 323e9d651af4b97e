use engine::synth::{base_param, SynthKind};

use super::{control_param, global_id, split_id, synth_param, Instrument, Module};
use crate::events::OutputEvent;

#[test]
fn global_ids_pack_module_and_local() {
    let id = global_id(Module::Echo, 1);
    assert_eq!(id >> 16, Module::Echo as u32);
    assert_eq!(id & 0xFFFF, 1);
    assert_eq!(split_id(id), (Some(Module::Echo), 1));
    assert_eq!(split_id(0xFFFF_0000).0, None);
}

#[test]
fn presentation_order_starts_with_control_head() {
    let instrument = Instrument::new(SynthKind::Fm);
    assert_eq!(
        instrument.param_id_at(0),
        Some(global_id(Module::Control, control_param::GAIN as u32))
    );
    assert_eq!(
        instrument.param_id_at(control_param::ENABLE_DISTORTION),
        Some(global_id(Module::Volume, 0))
    );
}

#[test]
fn every_index_resolves_and_ids_are_unique() {
    for kind in [SynthKind::Chip, SynthKind::Fm, SynthKind::Harmonics] {
        let instrument = Instrument::new(kind);
        let ids: Vec<u32> = instrument.param_ids().collect();
        assert_eq!(ids.len(), instrument.params_count());
        for (i, a) in ids.iter().enumerate() {
            assert!(instrument.param_info(*a).is_some());
            for b in &ids[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}

#[test]
fn toggles_precede_their_effect_params() {
    let instrument = Instrument::new(SynthKind::Fm);
    let ids: Vec<u32> = instrument.param_ids().collect();
    let toggle = ids
        .iter()
        .position(|&id| {
            id == global_id(Module::Control, control_param::ENABLE_DISTORTION as u32)
        })
        .unwrap();
    assert_eq!(ids[toggle + 1], global_id(Module::Distortion, 0));
}

#[test]
fn persistent_ids_resolve_back() {
    let instrument = Instrument::new(SynthKind::Fm);
    for id in instrument.param_ids() {
        let persistent = instrument.param_info(id).unwrap().id;
        assert_eq!(instrument.resolve_persistent_id(&persistent), Some(id));
    }
    assert_eq!(instrument.resolve_persistent_id(b"noSuchId"), None);
}

#[test]
fn volume_clamps_to_declared_max() {
    let mut instrument = Instrument::new(SynthKind::Fm);
    let volume = global_id(Module::Volume, 0);
    assert_eq!(instrument.set_param(volume, 1e9), Ok(25.0));
    assert_eq!(instrument.get_param(volume), Some(25.0));
}

#[test]
fn fade_in_clamps_at_zero() {
    let mut instrument = Instrument::new(SynthKind::Fm);
    let fade_in = synth_param(base_param::FADE_IN);
    assert_eq!(instrument.set_param(fade_in, -5.0), Ok(0.0));
    assert_eq!(instrument.get_param(fade_in), Some(0.0));
}

#[test]
fn nan_is_rejected_without_mutation() {
    let mut instrument = Instrument::new(SynthKind::Fm);
    let volume = global_id(Module::Volume, 0);
    instrument.set_param(volume, 5.0).unwrap();
    assert!(instrument.set_param(volume, f64::NAN).is_err());
    assert_eq!(instrument.get_param(volume), Some(5.0));
}

#[test]
fn unknown_ids_are_inert() {
    let mut instrument = Instrument::new(SynthKind::Fm);
    assert_eq!(instrument.get_param(0x7777_0000), None);
    assert!(instrument.set_param(0x7777_0000, 1.0).is_err());
}

#[test]
fn stepped_params_round_on_set() {
    let mut instrument = Instrument::new(SynthKind::Fm);
    let algorithm = synth_param(engine::synth::BASE_PARAM_COUNT);
    assert_eq!(instrument.set_param(algorithm, 4.6), Ok(5.0));
    assert_eq!(instrument.get_param(algorithm), Some(5.0));
}

#[test]
fn note_matching_honors_wildcards() {
    let mut instrument = Instrument::new(SynthKind::Fm);
    instrument.activate(48000.0, 256);
    let mut out: Vec<OutputEvent> = Vec::new();
    instrument.begin_note(60, 1.0, 7, 0, 0, 0, &mut out);
    instrument.begin_note(64, 1.0, 8, 0, 1, 0, &mut out);
    assert_eq!(instrument.active_voice_count(), 2);

    // Wildcard channel, specific key: only the matching voice ends.
    instrument.end_notes(60, -1, -1, -1);
    let mut left = [0.0f32; 256];
    let mut right = [0.0f32; 256];
    // Two ticks let the released voice fade out and report.
    instrument.process(&mut left, &mut right, 0, &mut out);
    instrument.process(&mut left, &mut right, 0, &mut out);
    instrument.process(&mut left, &mut right, 0, &mut out);
    instrument.process(&mut left, &mut right, 0, &mut out);

    let ends: Vec<i32> = out
        .iter()
        .filter_map(|event| match event {
            OutputEvent::NoteEnd { note_id, .. } => Some(*note_id),
            _ => None,
        })
        .collect();
    assert_eq!(ends, vec![7]);
    assert_eq!(instrument.active_voice_count(), 1);
}

#[test]
fn disabling_an_effect_resets_it_immediately() {
    let mut instrument = Instrument::new(SynthKind::Fm);
    instrument.activate(48000.0, 128);
    let toggle = global_id(Module::Control, control_param::ENABLE_ECHO as u32);
    instrument.set_param(toggle, 1.0).unwrap();
    assert_eq!(instrument.get_param(toggle), Some(1.0));
    instrument.set_param(toggle, 0.0).unwrap();
    assert_eq!(instrument.get_param(toggle), Some(0.0));
}
