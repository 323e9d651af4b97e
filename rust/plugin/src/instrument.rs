//! The instrument aggregate: one synth, the effect chain, the voice
//! identity table, and the global parameter space the host sees.
//!
//! Global parameter ids pack a module tag and a module-local index
//! into 32 bits (`module << 16 | local`). The id of a parameter is
//! stable for the lifetime of an instrument kind; the *order* the
//! parameters are listed in interleaves the effect-enable toggles with
//! their effect's parameters so hosts display them together.

use engine::effects::{
    bitcrusher, chorus, distortion, echo, eq, fader, panning, reverb, EffectModule,
};
use engine::params::{toggle, ParamInfo, ParamKind, PersistentId, SetParamError};
use engine::synth::{base_param, SynthKind, SynthUnit, VoiceId, BASE_PARAM_COUNT, MAX_VOICES};
use engine::{samples_per_tick, TickContext};
use fxhash::FxHashMap;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

use crate::events::{OutputEvent, OutputSink, Transport};

#[cfg(test)]
mod tests;

/// Sentinel for "no such parameter".
pub const INVALID_PARAM_ID: u32 = u32::MAX;

const DEFAULT_BPM: f64 = 150.0;

/// Module tags partitioning the global parameter space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive)]
#[repr(u16)]
pub enum Module {
    /// The active synth's local parameters.
    Synth,
    /// Plugin-level controls and effect toggles.
    Control,
    /// Pan position and stereo width.
    Panning,
    /// Waveshaping distortion.
    Distortion,
    /// Sample-rate and bit-depth decimation.
    Bitcrusher,
    /// Modulated-delay chorus.
    Chorus,
    /// Feedback echo.
    Echo,
    /// Diffusion-network reverb.
    Reverb,
    /// Post EQ.
    Eq,
    /// Final volume stage.
    Volume,
}

/// Packs a module tag and a module-local index into a global id.
#[must_use]
pub fn global_id(module: Module, local: u32) -> u32 {
    (local & 0xFFFF) | (u32::from(module as u16) << 16)
}

/// Splits a global id into its module tag and local index.
#[must_use]
pub fn split_id(id: u32) -> (Option<Module>, u32) {
    (Module::from_u32(id >> 16), id & 0xFFFF)
}

/// Global id of a synth-local parameter.
#[must_use]
pub fn synth_param(local: usize) -> u32 {
    global_id(Module::Synth, local as u32)
}

/// Local indices of the plugin-level control parameters.
pub mod control_param {
    /// Output gain.
    pub const GAIN: usize = 0;
    /// Tempo-override toggle.
    pub const TEMPO_USE_OVERRIDE: usize = 1;
    /// Multiplier on the effective tempo.
    pub const TEMPO_MULTIPLIER: usize = 2;
    /// Tempo used when the override is on.
    pub const TEMPO_OVERRIDE: usize = 3;
    /// Modulation pad X axis.
    pub const MOD_X: usize = 4;
    /// Modulation pad Y axis.
    pub const MOD_Y: usize = 5;
    /// Distortion toggle. The effect toggles trail the head block;
    /// they are listed next to their effect's parameters in index
    /// order.
    pub const ENABLE_DISTORTION: usize = 6;
    /// Bitcrusher toggle.
    pub const ENABLE_BITCRUSHER: usize = 7;
    /// Chorus toggle.
    pub const ENABLE_CHORUS: usize = 8;
    /// Echo toggle.
    pub const ENABLE_ECHO: usize = 9;
    /// Reverb toggle.
    pub const ENABLE_REVERB: usize = 10;
    /// Number of control parameters.
    pub const COUNT: usize = 11;
}

static CONTROL_PARAMS: [ParamInfo; control_param::COUNT] = [
    ParamInfo {
        id: *b"ctGain\0\0",
        name: "Gain",
        group: "Control",
        kind: ParamKind::Double,
        min: -10.0,
        max: 10.0,
        default: 0.0,
        flags: engine::params::Flags { no_automation: true },
        enum_values: None,
    },
    ParamInfo {
        id: *b"ctTmpMod",
        name: "Force Tempo",
        group: "Control",
        kind: ParamKind::U8,
        min: 0.0,
        max: 1.0,
        default: 0.0,
        flags: engine::params::Flags { no_automation: true },
        enum_values: Some(&engine::params::BOOL_ENUM_VALUES),
    },
    ParamInfo {
        id: *b"ctTmpMul",
        name: "Tempo Multiplier",
        group: "Control",
        kind: ParamKind::Double,
        min: 0.0,
        max: 10.0,
        default: 1.0,
        flags: engine::params::Flags { no_automation: true },
        enum_values: None,
    },
    ParamInfo {
        id: *b"ctTmpOvr",
        name: "Tempo Force Value",
        group: "Control",
        kind: ParamKind::Double,
        min: 1.0,
        max: 500.0,
        default: 150.0,
        flags: engine::params::Flags { no_automation: true },
        enum_values: None,
    },
    ParamInfo {
        id: *b"ctModX\0\0",
        name: "Modulation X",
        group: "Control",
        kind: ParamKind::Double,
        min: 0.0,
        max: 1.0,
        default: 0.0,
        flags: engine::params::Flags {
            no_automation: false,
        },
        enum_values: None,
    },
    ParamInfo {
        id: *b"ctModY\0\0",
        name: "Modulation Y",
        group: "Control",
        kind: ParamKind::Double,
        min: 0.0,
        max: 1.0,
        default: 0.0,
        flags: engine::params::Flags {
            no_automation: false,
        },
        enum_values: None,
    },
    toggle(*b"ctDistor", "Distortion Toggle", "Effects/Distortion"),
    toggle(*b"ctBitcru", "Bitcrusher Toggle", "Effects/Bitcrusher"),
    toggle(*b"ctChorus", "Chorus Toggle", "Effects/Chorus"),
    toggle(*b"ctEcho\0\0", "Echo Toggle", "Effects/Echo"),
    toggle(*b"ctReverb", "Reverb Toggle", "Effects/Reverb"),
];

#[derive(Debug, Clone, Copy, Default)]
struct VoiceHandle {
    active: bool,
    note_id: i32,
    port: i16,
    channel: i16,
    key: i16,
}

impl VoiceHandle {
    fn matches(&self, note_id: i32, port: i16, channel: i16, key: i16) -> bool {
        (note_id == -1 || note_id == self.note_id)
            && (port == -1 || port == self.port)
            && (channel == -1 || channel == self.channel)
            && (key == -1 || key == self.key)
    }
}

/// One synth plus the effect chain and the host-facing voice identity
/// table.
#[derive(Debug)]
pub struct Instrument {
    synth: SynthUnit,
    fader: fader::Fader,
    panning: panning::Panning,
    eq: eq::Eq,
    distortion: distortion::Distortion,
    bitcrusher: bitcrusher::Bitcrusher,
    chorus: chorus::Chorus,
    echo: echo::Echo,
    reverb: reverb::Reverb,

    control_values: [f64; control_param::COUNT],
    /// Whether each toggled module is currently processing. Enables
    /// only take effect at tick boundaries; disables are immediate.
    use_distortion: bool,
    use_bitcrusher: bool,
    use_chorus: bool,
    use_echo: bool,
    use_reverb: bool,

    bpm: f64,
    is_playing: bool,
    cur_beat: f64,
    frames_until_next_tick: u32,
    sample_rate: f64,

    voices: [VoiceHandle; MAX_VOICES],
    mono_buffer: Vec<f32>,
    block: [Vec<f32>; 2],
    id_lookup: FxHashMap<PersistentId, u32>,
}

impl Instrument {
    /// Creates an instrument of the given synth kind with default
    /// parameters and every toggled effect off.
    #[must_use]
    pub fn new(kind: SynthKind) -> Self {
        let mut control_values = [0.0; control_param::COUNT];
        for (value, info) in control_values.iter_mut().zip(&CONTROL_PARAMS) {
            *value = info.default;
        }
        let mut instrument = Self {
            synth: SynthUnit::new(kind),
            fader: fader::Fader::new(),
            panning: panning::Panning::new(),
            eq: eq::Eq::new(),
            distortion: distortion::Distortion::new(),
            bitcrusher: bitcrusher::Bitcrusher::new(),
            chorus: chorus::Chorus::new(),
            echo: echo::Echo::new(),
            reverb: reverb::Reverb::new(),
            control_values,
            use_distortion: false,
            use_bitcrusher: false,
            use_chorus: false,
            use_echo: false,
            use_reverb: false,
            bpm: DEFAULT_BPM,
            is_playing: false,
            cur_beat: 0.0,
            frames_until_next_tick: 0,
            sample_rate: 48000.0,
            voices: Default::default(),
            mono_buffer: Vec::new(),
            block: [Vec::new(), Vec::new()],
            id_lookup: FxHashMap::default(),
        };
        let lookup: FxHashMap<PersistentId, u32> = instrument
            .param_ids()
            .map(|id| (instrument.param_info(id).unwrap().id, id))
            .collect();
        instrument.id_lookup = lookup;
        instrument
    }

    /// The synth kind this instrument was created with.
    #[must_use]
    pub fn kind(&self) -> SynthKind {
        self.synth.kind()
    }

    /// The owned synth.
    #[must_use]
    pub fn synth(&self) -> &SynthUnit {
        &self.synth
    }

    /// Mutable access to the owned synth.
    pub fn synth_mut(&mut self) -> &mut SynthUnit {
        &mut self.synth
    }

    /// Prepares for processing: sets sample rates and sizes the
    /// internal buffers for the host's maximum block length.
    pub fn activate(&mut self, sample_rate: f64, max_frames: usize) {
        self.sample_rate = sample_rate;
        self.synth.set_sample_rate(sample_rate);
        self.synth.configure(max_frames);
        self.fader.set_sample_rate(sample_rate);
        self.panning.set_sample_rate(sample_rate);
        self.eq.set_sample_rate(sample_rate);
        self.distortion.set_sample_rate(sample_rate);
        self.bitcrusher.set_sample_rate(sample_rate);
        self.chorus.set_sample_rate(sample_rate);
        self.echo.set_sample_rate(sample_rate);
        self.reverb.set_sample_rate(sample_rate);
        self.mono_buffer.resize(max_frames, 0.0);
        for channel in &mut self.block {
            channel.resize(max_frames, 0.0);
        }
        self.frames_until_next_tick = 0;
    }

    /// Releases the processing buffers.
    pub fn deactivate(&mut self) {
        self.mono_buffer = Vec::new();
        self.block = [Vec::new(), Vec::new()];
    }

    // ---- parameter space ------------------------------------------------

    /// Total number of parameters across all modules.
    #[must_use]
    pub fn params_count(&self) -> usize {
        control_param::COUNT
            + fader::PARAM_COUNT
            + panning::PARAM_COUNT
            + self.synth.param_count()
            + eq::PARAM_COUNT
            + distortion::PARAM_COUNT
            + bitcrusher::PARAM_COUNT
            + chorus::PARAM_COUNT
            + echo::PARAM_COUNT
            + reverb::PARAM_COUNT
    }

    /// Global id of the parameter at `index` in presentation order.
    #[must_use]
    pub fn param_id_at(&self, index: usize) -> Option<u32> {
        let mut index = index;

        let mut segment = |module: Module, start: usize, count: usize| -> Option<u32> {
            if index < count {
                return Some(global_id(module, (start + index) as u32));
            }
            index -= count;
            None
        };

        // Control head (everything before the effect toggles).
        if let Some(id) = segment(Module::Control, 0, control_param::ENABLE_DISTORTION) {
            return Some(id);
        }
        if let Some(id) = segment(Module::Volume, 0, fader::PARAM_COUNT) {
            return Some(id);
        }
        if let Some(id) = segment(Module::Panning, 0, panning::PARAM_COUNT) {
            return Some(id);
        }
        // Synth: general params, then kind-specific, then note effects.
        if let Some(id) = segment(Module::Synth, 0, base_param::NOTE_EFFECT_START) {
            return Some(id);
        }
        let specific = self.synth.param_count() - BASE_PARAM_COUNT;
        if let Some(id) = segment(Module::Synth, BASE_PARAM_COUNT, specific) {
            return Some(id);
        }
        let note_effects = BASE_PARAM_COUNT - base_param::NOTE_EFFECT_START;
        if let Some(id) = segment(Module::Synth, base_param::NOTE_EFFECT_START, note_effects) {
            return Some(id);
        }
        if let Some(id) = segment(Module::Eq, 0, eq::PARAM_COUNT) {
            return Some(id);
        }
        // Each toggled effect is preceded by its enable toggle.
        if let Some(id) = segment(Module::Control, control_param::ENABLE_DISTORTION, 1) {
            return Some(id);
        }
        if let Some(id) = segment(Module::Distortion, 0, distortion::PARAM_COUNT) {
            return Some(id);
        }
        if let Some(id) = segment(Module::Control, control_param::ENABLE_BITCRUSHER, 1) {
            return Some(id);
        }
        if let Some(id) = segment(Module::Bitcrusher, 0, bitcrusher::PARAM_COUNT) {
            return Some(id);
        }
        if let Some(id) = segment(Module::Control, control_param::ENABLE_CHORUS, 1) {
            return Some(id);
        }
        if let Some(id) = segment(Module::Chorus, 0, chorus::PARAM_COUNT) {
            return Some(id);
        }
        if let Some(id) = segment(Module::Control, control_param::ENABLE_ECHO, 1) {
            return Some(id);
        }
        if let Some(id) = segment(Module::Echo, 0, echo::PARAM_COUNT) {
            return Some(id);
        }
        if let Some(id) = segment(Module::Control, control_param::ENABLE_REVERB, 1) {
            return Some(id);
        }
        if let Some(id) = segment(Module::Reverb, 0, reverb::PARAM_COUNT) {
            return Some(id);
        }
        None
    }

    /// All global ids in presentation order.
    pub fn param_ids(&self) -> impl Iterator<Item = u32> + '_ {
        (0..self.params_count()).filter_map(|index| self.param_id_at(index))
    }

    /// Descriptor of the parameter with the given global id.
    #[must_use]
    pub fn param_info(&self, id: u32) -> Option<&'static ParamInfo> {
        let (module, local) = split_id(id);
        let local = local as usize;
        match module? {
            Module::Synth => self.synth.param_info(local),
            Module::Control => CONTROL_PARAMS.get(local),
            Module::Volume => self.fader.param_info(local),
            Module::Panning => self.panning.param_info(local),
            Module::Eq => self.eq.param_info(local),
            Module::Distortion => self.distortion.param_info(local),
            Module::Bitcrusher => self.bitcrusher.param_info(local),
            Module::Chorus => self.chorus.param_info(local),
            Module::Echo => self.echo.param_info(local),
            Module::Reverb => self.reverb.param_info(local),
        }
    }

    /// Resolves a persistent 8-byte id to the current global id.
    #[must_use]
    pub fn resolve_persistent_id(&self, id: &PersistentId) -> Option<u32> {
        self.id_lookup.get(id).copied()
    }

    /// Sets a parameter, returning the value as stored. Out-of-range
    /// values clamp; NaN is rejected without touching storage.
    pub fn set_param(&mut self, id: u32, value: f64) -> Result<f64, SetParamError> {
        let (module, local) = split_id(id);
        let local = local as usize;
        match module.ok_or(SetParamError::UnknownIndex)? {
            Module::Synth => self.synth.set_param(local, value),
            Module::Control => self.set_control(local, value),
            Module::Volume => self.fader.set_param(local, value),
            Module::Panning => self.panning.set_param(local, value),
            Module::Eq => self.eq.set_param(local, value),
            Module::Distortion => self.distortion.set_param(local, value),
            Module::Bitcrusher => self.bitcrusher.set_param(local, value),
            Module::Chorus => self.chorus.set_param(local, value),
            Module::Echo => self.echo.set_param(local, value),
            Module::Reverb => self.reverb.set_param(local, value),
        }
    }

    /// Current value of the parameter with the given global id.
    #[must_use]
    pub fn get_param(&self, id: u32) -> Option<f64> {
        let (module, local) = split_id(id);
        let local = local as usize;
        match module? {
            Module::Synth => self.synth.get_param(local),
            Module::Control => self.control_values.get(local).copied(),
            Module::Volume => self.fader.get_param(local),
            Module::Panning => self.panning.get_param(local),
            Module::Eq => self.eq.get_param(local),
            Module::Distortion => self.distortion.get_param(local),
            Module::Bitcrusher => self.bitcrusher.get_param(local),
            Module::Chorus => self.chorus.get_param(local),
            Module::Echo => self.echo.get_param(local),
            Module::Reverb => self.reverb.get_param(local),
        }
    }

    fn set_control(&mut self, local: usize, value: f64) -> Result<f64, SetParamError> {
        let info = CONTROL_PARAMS
            .get(local)
            .ok_or(SetParamError::UnknownIndex)?;
        let stored = info.clamp(value).ok_or(SetParamError::Invalid)?;
        self.control_values[local] = stored;
        let enable = stored != 0.0;
        match local {
            control_param::ENABLE_DISTORTION if !enable => {
                self.distortion.stop();
                self.use_distortion = false;
            }
            control_param::ENABLE_BITCRUSHER if !enable => {
                self.bitcrusher.stop();
                self.use_bitcrusher = false;
            }
            control_param::ENABLE_CHORUS if !enable => {
                self.chorus.stop();
                self.use_chorus = false;
            }
            control_param::ENABLE_ECHO if !enable => {
                self.echo.stop();
                self.use_echo = false;
            }
            control_param::ENABLE_REVERB if !enable => {
                self.reverb.stop();
                self.use_reverb = false;
            }
            _ => {}
        }
        Ok(stored)
    }

    // ---- notes ----------------------------------------------------------

    /// Starts a note under the given host identity. A stolen voice's
    /// previous note is reported ended at `time`.
    pub fn begin_note(
        &mut self,
        key: i16,
        velocity: f64,
        note_id: i32,
        port: i16,
        channel: i16,
        time: u32,
        out: &mut impl OutputSink,
    ) {
        let slot = self.synth.begin_note(key.max(0) as u16, velocity, None);
        // A stolen voice must report its note as ended before the slot
        // is reused for the new identity.
        self.emit_ended(time, out);
        self.voices[slot] = VoiceHandle {
            active: true,
            note_id,
            port,
            channel,
            key,
        };
    }

    /// Releases every voice matching the identifiers; `-1` wildcards.
    pub fn end_notes(&mut self, key: i16, note_id: i32, port: i16, channel: i16) {
        for slot in 0..MAX_VOICES {
            if self.voices[slot].active && self.voices[slot].matches(note_id, port, channel, key) {
                self.synth.end_note(slot);
            }
        }
    }

    /// Number of voices currently sounding.
    #[must_use]
    pub fn active_voice_count(&self) -> usize {
        self.synth.active_voice_count()
    }

    /// Samples left before the next tick boundary.
    #[must_use]
    pub fn frames_until_next_tick(&self) -> u32 {
        self.frames_until_next_tick
    }

    fn emit_ended(&mut self, time: u32, out: &mut impl OutputSink) {
        for slot in self.synth.take_ended() {
            self.retire_voice(slot, time, out);
        }
    }

    fn retire_voice(&mut self, slot: VoiceId, time: u32, out: &mut impl OutputSink) {
        let voice = &mut self.voices[slot];
        if !voice.active {
            return;
        }
        voice.active = false;
        out.push(OutputEvent::NoteEnd {
            time,
            note_id: voice.note_id,
            port: voice.port,
            channel: voice.channel,
            key: voice.key,
        });
    }

    // ---- transport & processing ----------------------------------------

    /// Applies a host transport snapshot: tempo, play state, and the
    /// beats-timeline position on play-state flips.
    pub fn apply_transport(&mut self, transport: &Transport) {
        self.bpm = transport.bpm.unwrap_or(DEFAULT_BPM);

        // A play-state flip re-anchors the beat position; while playing
        // steadily the instrument advances the beat on its own.
        if transport.playing != self.is_playing {
            if let Some(beats) = transport.song_pos_beats {
                self.cur_beat = beats;
            }
            if transport.playing {
                self.synth.begin_transport(self.cur_beat, self.bpm);
            }
        }
        self.is_playing = transport.playing;
    }

    fn active_bpm(&self) -> f64 {
        let base = if self.control_values[control_param::TEMPO_USE_OVERRIDE] != 0.0 {
            self.control_values[control_param::TEMPO_OVERRIDE]
        } else {
            self.bpm
        };
        // A zero tempo would make the next tick infinitely far away.
        (base * self.control_values[control_param::TEMPO_MULTIPLIER]).max(1.0)
    }

    /// Renders one event-free span of the block. `start_frame` is the
    /// span's offset within the host block, used to stamp note-end
    /// events.
    pub fn process(
        &mut self,
        left: &mut [f32],
        right: &mut [f32],
        start_frame: u32,
        out: &mut impl OutputSink,
    ) {
        let frame_count = left.len();
        debug_assert_eq!(frame_count, right.len());
        debug_assert!(frame_count <= self.mono_buffer.len());

        let active_bpm = self.active_bpm();
        let beats_per_sec = active_bpm / 60.0;
        let sample_len = 1.0 / self.sample_rate;
        let spt = samples_per_tick(active_bpm, self.sample_rate);

        let mut i = 0usize;
        let mut cur_sample = start_frame;
        while i < frame_count {
            if self.frames_until_next_tick == 0 {
                let ctx = TickContext {
                    bpm: active_bpm,
                    beat: self.cur_beat,
                    samples_per_tick: spt,
                    mod_x: self.control_values[control_param::MOD_X],
                    mod_y: self.control_values[control_param::MOD_Y],
                };
                self.synth.tick(&ctx);
                self.emit_ended(cur_sample, out);

                self.panning.tick(&ctx);
                self.eq.tick(&ctx);
                self.fader.tick(&ctx);

                // Pending enables engage here, never mid-segment.
                self.use_distortion =
                    self.control_values[control_param::ENABLE_DISTORTION] != 0.0;
                self.use_bitcrusher =
                    self.control_values[control_param::ENABLE_BITCRUSHER] != 0.0;
                self.use_chorus = self.control_values[control_param::ENABLE_CHORUS] != 0.0;
                self.use_echo = self.control_values[control_param::ENABLE_ECHO] != 0.0;
                self.use_reverb = self.control_values[control_param::ENABLE_REVERB] != 0.0;

                if self.use_distortion {
                    self.distortion.tick(&ctx);
                }
                if self.use_bitcrusher {
                    self.bitcrusher.tick(&ctx);
                }
                if self.use_chorus {
                    self.chorus.tick(&ctx);
                }
                if self.use_echo {
                    self.echo.tick(&ctx);
                }
                if self.use_reverb {
                    self.reverb.tick(&ctx);
                }

                self.frames_until_next_tick = spt.ceil() as u32;
                self.cur_beat +=
                    beats_per_sec * sample_len * f64::from(self.frames_until_next_tick);
            }

            let span = (frame_count - i).min(self.frames_until_next_tick as usize);

            self.synth.run(&mut self.mono_buffer[i..i + span]);

            let (left_block, right_block) = {
                let [l, r] = &mut self.block;
                (&mut l[i..i + span], &mut r[i..i + span])
            };
            left_block.copy_from_slice(&self.mono_buffer[i..i + span]);
            right_block.fill(0.0);

            if self.use_distortion {
                self.distortion.run_mono(left_block);
            }
            if self.use_bitcrusher {
                self.bitcrusher.run_mono(left_block);
            }
            self.eq.run_mono(left_block);

            self.panning.run(left_block, right_block);

            if self.use_chorus {
                self.chorus.run_stereo(left_block, right_block);
            }
            if self.use_echo {
                self.echo.run_stereo(left_block, right_block);
            }
            if self.use_reverb {
                self.reverb.run_stereo(left_block, right_block);
            }
            self.fader.run_stereo(left_block, right_block);

            i += span;
            cur_sample += span as u32;
            self.frames_until_next_tick -= span as u32;
        }

        let control_gain =
            10.0_f64.powf(self.control_values[control_param::GAIN] / 10.0) as f32;
        left.copy_from_slice(&self.block[0][..frame_count]);
        right.copy_from_slice(&self.block[1][..frame_count]);
        util::slice_ops::mul_constant_in_place(control_gain, left);
        util::slice_ops::mul_constant_in_place(control_gain, right);
    }
}
