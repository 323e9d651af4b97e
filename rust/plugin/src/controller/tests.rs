use engine::synth::{base_param, SynthKind, VibratoPreset, BASE_PARAM_COUNT};
use more_asserts::assert_gt;

use super::{Controller, SendFlags, SEND_TO_GUI};
use crate::events::{EventData, InputEvent, OutputEvent, ProcessStatus, Transport};
use crate::instrument::{control_param, global_id, synth_param, Module};
use crate::queue::GuiEvent;

const BLOCK: usize = 128;
const RATE: f64 = 48000.0;

fn controller() -> Controller {
    let mut controller = Controller::new(SynthKind::Fm);
    controller.activate(RATE, BLOCK);
    controller
}

fn note_on(time: u32, key: i16, velocity: f64, note_id: i32) -> InputEvent {
    InputEvent {
        time,
        data: EventData::NoteOn {
            note_id,
            port: 0,
            channel: 0,
            key,
            velocity,
        },
    }
}

fn note_off(time: u32, note_id: i32) -> InputEvent {
    InputEvent {
        time,
        data: EventData::NoteOff {
            note_id,
            port: -1,
            channel: -1,
            key: -1,
        },
    }
}

struct Run {
    left: Vec<f32>,
    right: Vec<f32>,
    out: Vec<OutputEvent>,
    statuses: Vec<ProcessStatus>,
}

/// Processes `blocks` blocks, dispatching `events` (whole-run frame
/// offsets) into the right block.
fn run_blocks(controller: &mut Controller, blocks: usize, events: &[InputEvent]) -> Run {
    let mut run = Run {
        left: Vec::new(),
        right: Vec::new(),
        out: Vec::new(),
        statuses: Vec::new(),
    };
    for block in 0..blocks {
        let start = (block * BLOCK) as u32;
        let end = start + BLOCK as u32;
        let block_events: Vec<InputEvent> = events
            .iter()
            .filter(|event| event.time >= start && event.time < end)
            .map(|event| InputEvent {
                time: event.time - start,
                data: event.data,
            })
            .collect();
        let mut left = [0.0f32; BLOCK];
        let mut right = [0.0f32; BLOCK];
        let mut out = Vec::new();
        let status = controller.process(&mut left, &mut right, &block_events, None, &mut out);
        for event in out {
            // Re-base note-end offsets onto the whole run for easier
            // assertions.
            run.out.push(match event {
                OutputEvent::NoteEnd {
                    time,
                    note_id,
                    port,
                    channel,
                    key,
                } => OutputEvent::NoteEnd {
                    time: time + start,
                    note_id,
                    port,
                    channel,
                    key,
                },
                other => other,
            });
        }
        run.left.extend_from_slice(&left);
        run.right.extend_from_slice(&right);
        run.statuses.push(status);
    }
    run
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
fn idle_blocks_are_silent_and_sleep() {
    let mut controller = controller();
    let run = run_blocks(&mut controller, 10, &[]);
    assert!(run.left.iter().all(|s| *s == 0.0));
    assert!(run.right.iter().all(|s| *s == 0.0));
    for status in &run.statuses[1..] {
        assert_eq!(*status, ProcessStatus::Sleep);
    }
}

#[test]
fn single_note_sounds_and_reports_its_end() {
    let mut controller = controller();
    let blocks = 48000 / BLOCK;
    let run = run_blocks(&mut controller, blocks, &[note_on(0, 69, 1.0, 7)]);
    assert_gt!(rms(&run.left), 0.01);
    assert_gt!(rms(&run.right), 0.01);
    assert!(run.out.is_empty());
    assert!(run.statuses.iter().all(|s| *s == ProcessStatus::Continue));

    let tail_blocks = 4800 / BLOCK + 1;
    let tail = run_blocks(&mut controller, tail_blocks, &[note_off(0, 7)]);
    let ends: Vec<(u32, i32)> = tail
        .out
        .iter()
        .filter_map(|event| match event {
            OutputEvent::NoteEnd { time, note_id, .. } => Some((*time, *note_id)),
            _ => None,
        })
        .collect();
    assert_eq!(ends.len(), 1);
    assert_eq!(ends[0].1, 7);
    assert!(ends[0].0 < 4800);
}

#[test]
fn first_nonzero_sample_is_at_or_after_the_note_on() {
    let mut controller = controller();
    let run = run_blocks(&mut controller, 2, &[note_on(100, 69, 1.0, 1)]);
    assert!(run.left[..100].iter().all(|s| *s == 0.0));
    let first_nonzero = run.left.iter().position(|s| *s != 0.0);
    assert!(first_nonzero.is_some());
    assert!(first_nonzero.unwrap() >= 100);
}

#[test]
fn rendering_is_deterministic_from_a_cold_start() {
    let render = || {
        let mut controller = controller();
        let events = [note_on(17, 64, 0.9, 3), note_off(4000, 3)];
        run_blocks(&mut controller, 40, &events).left
    };
    assert_eq!(render(), render());
}

#[test]
fn vibrato_preset_writes_derived_parameters() {
    let mut controller = controller();
    let mut out = Vec::new();
    let preset = synth_param(base_param::VIBRATO_PRESET);
    let light = f64::from(VibratoPreset::Light as u8);
    assert!(controller.set_value(preset, light, SEND_TO_GUI, &mut out));

    let depth = controller
        .get_value(synth_param(base_param::VIBRATO_DEPTH))
        .unwrap();
    let speed = controller
        .get_value(synth_param(base_param::VIBRATO_SPEED))
        .unwrap();
    assert_eq!(depth, 0.15);
    assert_eq!(speed, 1.0);

    // The derived writes are visible to the host in the same block.
    let mirrored: Vec<u32> = out
        .iter()
        .filter_map(|event| match event {
            OutputEvent::ParamValue { param_id, .. } => Some(*param_id),
            _ => None,
        })
        .collect();
    assert!(mirrored.contains(&synth_param(base_param::VIBRATO_DEPTH)));
    assert!(mirrored.contains(&synth_param(base_param::VIBRATO_TYPE)));
}

#[test]
fn editing_a_derived_parameter_switches_to_custom() {
    let mut controller = controller();
    let mut out = Vec::new();
    let preset = synth_param(base_param::VIBRATO_PRESET);
    controller.set_value(
        preset,
        f64::from(VibratoPreset::Light as u8),
        SEND_TO_GUI,
        &mut out,
    );
    controller.set_value(
        synth_param(base_param::VIBRATO_DEPTH),
        0.3,
        SEND_TO_GUI,
        &mut out,
    );
    assert_eq!(
        controller.get_value(preset),
        Some(f64::from(VibratoPreset::Custom as u8))
    );
}

#[test]
fn clamping_scenarios() {
    let mut controller = controller();
    let mut out = Vec::new();
    let volume = global_id(Module::Volume, 0);
    assert!(controller.set_value(volume, 1e9, SendFlags::default(), &mut out));
    assert_eq!(controller.get_value(volume), Some(25.0));

    let fade_in = synth_param(base_param::FADE_IN);
    assert!(controller.set_value(fade_in, -5.0, SendFlags::default(), &mut out));
    assert_eq!(controller.get_value(fade_in), Some(0.0));

    assert!(!controller.set_value(volume, f64::NAN, SendFlags::default(), &mut out));
    assert_eq!(controller.get_value(volume), Some(25.0));
}

#[test]
fn tempo_derivation_at_120_bpm() {
    // 48000 / (2 * 24 * 120 / 60) == 500 samples per tick.
    assert_eq!(engine::samples_per_tick(120.0, RATE), 500.0);

    let mut controller = controller();
    let transport = Transport {
        bpm: Some(120.0),
        playing: true,
        song_pos_beats: Some(0.0),
    };
    let mut left = [0.0f32; BLOCK];
    let mut right = [0.0f32; BLOCK];
    let mut out = Vec::new();
    controller.process(&mut left, &mut right, &[], Some(&transport), &mut out);
    // 128 frames consumed from the 500-sample tick.
    assert_eq!(
        controller.instrument().frames_until_next_tick(),
        500 - BLOCK as u32
    );
}

#[test]
fn enabling_an_effect_defers_to_the_next_tick_boundary() {
    // Default tempo: 150 bpm -> 400 samples per tick. Process 384
    // samples (3 blocks), then enable distortion and render the block
    // that crosses the boundary at sample 400.
    let events = [note_on(0, 60, 1.0, 1)];
    let toggle = global_id(Module::Control, control_param::ENABLE_DISTORTION as u32);

    let render = |enable_at_block3: bool| {
        let mut controller = controller();
        let mut collected = Vec::new();
        for block in 0..4 {
            if block == 3 && enable_at_block3 {
                let mut out = Vec::new();
                controller.set_value(toggle, 1.0, SendFlags::default(), &mut out);
            }
            let block_events: Vec<InputEvent> =
                if block == 0 { events.to_vec() } else { Vec::new() };
            let mut left = [0.0f32; BLOCK];
            let mut right = [0.0f32; BLOCK];
            let mut out = Vec::new();
            controller.process(&mut left, &mut right, &block_events, None, &mut out);
            collected.extend_from_slice(&left);
        }
        collected
    };

    let clean = render(false);
    let driven = render(true);
    // Samples 384..400 precede the tick boundary and must match the
    // clean run; the distorted region starts at the boundary.
    assert_eq!(&driven[384..400], &clean[384..400]);
    assert!(driven[400..512] != clean[400..512]);
}

#[test]
fn gui_events_apply_and_mirror_to_the_host() {
    let mut controller = controller();
    let endpoints = controller.take_editor_endpoints().unwrap();
    let volume = global_id(Module::Volume, 0);
    endpoints.to_audio.enqueue(GuiEvent::ParamChange {
        param_id: volume,
        value: 12.5,
    });
    endpoints
        .to_audio
        .enqueue(GuiEvent::GestureEnd { param_id: volume });

    let mut left = [0.0f32; BLOCK];
    let mut right = [0.0f32; BLOCK];
    let mut out = Vec::new();
    controller.process(&mut left, &mut right, &[], None, &mut out);

    assert_eq!(controller.get_value(volume), Some(12.5));
    assert!(out.contains(&OutputEvent::ParamValue {
        param_id: volume,
        value: 12.5,
    }));
    assert!(out.contains(&OutputEvent::ParamGestureEnd { param_id: volume }));
}

#[test]
fn host_param_events_echo_to_the_gui_mirror() {
    let mut controller = controller();
    let endpoints = controller.take_editor_endpoints().unwrap();
    let volume = global_id(Module::Volume, 0);
    let event = InputEvent {
        time: 0,
        data: EventData::ParamValue {
            param_id: volume,
            value: 1e9,
        },
    };
    let mut left = [0.0f32; BLOCK];
    let mut right = [0.0f32; BLOCK];
    let mut out = Vec::new();
    controller.process(&mut left, &mut right, &[event], None, &mut out);

    // The gui sees the clamped value, keeping its mirror consistent.
    assert_eq!(
        endpoints.from_audio.dequeue(),
        Some(GuiEvent::ParamChange {
            param_id: volume,
            value: 25.0,
        })
    );
}

#[test]
fn midi_note_events_drive_voices() {
    let mut controller = controller();
    let on = InputEvent {
        time: 0,
        data: EventData::Midi {
            port: 0,
            bytes: [0x90, 69, 100],
        },
    };
    let mut left = [0.0f32; BLOCK];
    let mut right = [0.0f32; BLOCK];
    let mut out = Vec::new();
    controller.process(&mut left, &mut right, &[on], None, &mut out);
    assert_eq!(controller.instrument().active_voice_count(), 1);
    assert_gt!(rms(&left), 0.001);

    // CC 123: all notes off.
    let all_off = InputEvent {
        time: 0,
        data: EventData::Midi {
            port: 0,
            bytes: [0xB0, 123, 0],
        },
    };
    let mut out = Vec::new();
    for _ in 0..8 {
        controller.process(&mut left, &mut right, &[all_off], None, &mut out);
    }
    assert_eq!(controller.instrument().active_voice_count(), 0);
}

#[test]
fn value_text_round_trips() {
    let controller = controller();
    let algorithm = synth_param(BASE_PARAM_COUNT);
    let text = controller.value_to_text(algorithm, 0.0).unwrap();
    assert_eq!(text, "1<-(2 3 4)");
    assert_eq!(controller.text_to_value(algorithm, &text), Some(0.0));

    let volume = global_id(Module::Volume, 0);
    assert_eq!(controller.value_to_text(volume, -3.25).unwrap(), "-3.2");
    assert_eq!(controller.text_to_value(volume, "4.5"), Some(4.5));

    let freq = synth_param(BASE_PARAM_COUNT + 1);
    assert_eq!(controller.value_to_text(freq, 12.0).unwrap(), "12");
    assert_eq!(controller.text_to_value(freq, "12"), Some(12.0));
}

#[test]
fn state_round_trip_through_the_controller() {
    let mut controller = controller();
    let mut out = Vec::new();
    controller.set_value(
        synth_param(BASE_PARAM_COUNT),
        5.0,
        SendFlags::default(),
        &mut out,
    );
    controller.set_value(
        synth_param(BASE_PARAM_COUNT + 1),
        12.0,
        SendFlags::default(),
        &mut out,
    );
    controller.set_value(
        synth_param(base_param::VIBRATO_PRESET),
        f64::from(VibratoPreset::Heavy as u8),
        SendFlags::default(),
        &mut out,
    );

    let mut buffer = Vec::new();
    assert!(controller.state_save(&mut buffer));

    let mut restored = Controller::new(SynthKind::Fm);
    restored.activate(RATE, BLOCK);
    assert!(restored.state_load(&mut buffer.as_slice()));
    for index in 0..controller.params_count() {
        let id = controller.param_id_at(index).unwrap();
        assert_eq!(controller.get_value(id), restored.get_value(id));
    }
}

#[test]
fn loading_garbage_fails_and_preserves_state() {
    let mut controller = controller();
    let mut out = Vec::new();
    let volume = global_id(Module::Volume, 0);
    controller.set_value(volume, 7.0, SendFlags::default(), &mut out);

    let garbage = [0xFFu8; 16];
    assert!(!controller.state_load(&mut garbage.as_slice()));
    assert_eq!(controller.get_value(volume), Some(7.0));
}
