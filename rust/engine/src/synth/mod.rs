//! Synth cores and the note lifecycle shared between them.
//!
//! A [`SynthUnit`] owns a fixed voice pool, the envelope list, and one
//! of the three cores (FM, chip, harmonics). The shared layer handles
//! allocation and stealing, transition and chord behavior, vibrato,
//! per-voice envelopes and the note filter; cores only update their
//! oscillator state per tick and render raw per-voice audio.

use arrayvec::ArrayVec;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

use crate::envelope::{
    secs_fade_in, ticks_fade_out, ComputeIndex, CurveInput, Envelope, EnvelopeComputer,
    MAX_ENVELOPES,
};
use crate::filtering::{pole_coefficients, Biquad, FilterPole, PoleKind, POLE_COUNT};
use crate::params::{choice, double, stepped, toggle, ParamInfo, SetParamError};
use crate::{samples_per_tick, TickContext, TICKS_PER_BEAT};

pub mod chip;
pub mod fm;
pub mod harmonics;

#[cfg(test)]
mod tests;

/// Fixed size of every voice pool.
pub const MAX_VOICES: usize = 8;

/// Index of a voice slot, stable for the lifetime of the note.
pub type VoiceId = usize;

/// Discriminants match the persisted instrument type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SynthKind {
    /// Wavetable core.
    Chip = 0,
    /// Four-operator FM core.
    Fm = 1,
    /// Additive core.
    Harmonics = 4,
}

impl SynthKind {
    /// Resolves a persisted type tag.
    #[must_use]
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Chip),
            1 => Some(Self::Fm),
            4 => Some(Self::Harmonics),
            _ => None,
        }
    }

    /// The tag written into saved state.
    #[must_use]
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Display name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Chip => "Chip",
            Self::Fm => "FM",
            Self::Harmonics => "Harmonics",
        }
    }
}

/// How a new note interacts with voices already sounding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, Default)]
#[repr(u8)]
pub enum TransitionType {
    /// Allocate a fresh voice.
    #[default]
    Normal,
    /// Cut sounding voices short, then allocate.
    Interrupt,
    /// Retarget the newest voice, keeping its phase.
    Continue,
    /// Retarget the newest voice, gliding to the new pitch.
    Slide,
}

/// How simultaneously-held keys map onto voices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, Default)]
#[repr(u8)]
pub enum ChordType {
    /// Every key gets its own voice at once.
    #[default]
    Simultaneous,
    /// Successive keys in one tick start staggered.
    Strum,
    /// Held keys alternate on a tick counter.
    Arpeggio,
    /// Additional keys retune the sounding voice.
    CustomInterval,
}

/// Vibrato waveform flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, Default)]
#[repr(u8)]
pub enum VibratoType {
    /// Single sine.
    #[default]
    Normal,
    /// Stacked detuned sines.
    Shaky,
}

/// Named vibrato configurations; all but `Custom` pin the four derived
/// parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, Default)]
#[repr(u8)]
pub enum VibratoPreset {
    /// Vibrato off.
    #[default]
    None,
    /// Shallow.
    Light,
    /// Medium depth with a warm-up delay.
    Delayed,
    /// Deep.
    Heavy,
    /// Shallow with the shaky waveform.
    Shaky,
    /// Free-form; the derived parameters are user-controlled.
    Custom,
}

/// The four parameters a vibrato preset derives.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VibratoParams {
    /// Pitch excursion in semitones.
    pub depth: f64,
    /// Rate multiplier on the base vibrato period.
    pub speed: f64,
    /// Warm-up time in ticks before the vibrato reaches full depth.
    pub delay: f64,
    /// Waveform flavor.
    pub kind: VibratoType,
}

impl VibratoPreset {
    /// Derived parameter values, or `None` for [`VibratoPreset::Custom`].
    #[must_use]
    pub fn params(self) -> Option<VibratoParams> {
        let (depth, speed, delay, kind) = match self {
            Self::None => (0.0, 1.0, 0.0, VibratoType::Normal),
            Self::Light => (0.15, 1.0, 0.0, VibratoType::Normal),
            Self::Delayed => (0.3, 1.0, 18.5, VibratoType::Normal),
            Self::Heavy => (0.45, 1.0, 0.0, VibratoType::Normal),
            Self::Shaky => (0.1, 1.0, 0.0, VibratoType::Shaky),
            Self::Custom => return None,
        };
        Some(VibratoParams {
            depth,
            speed,
            delay,
            kind,
        })
    }
}

/// Local indices of the shared parameter block.
pub mod base_param {
    /// Fade-in setting.
    pub const FADE_IN: usize = 0;
    /// Fade-out setting.
    pub const FADE_OUT: usize = 1;
    /// Everything from here up to [`COUNT`] is a note-effect parameter.
    pub const NOTE_EFFECT_START: usize = 2;
    /// Transition toggle.
    pub const ENABLE_TRANSITION: usize = 2;
    /// Transition type.
    pub const TRANSITION_TYPE: usize = 3;
    /// Chord toggle.
    pub const ENABLE_CHORD: usize = 4;
    /// Chord type.
    pub const CHORD_TYPE: usize = 5;
    /// Arpeggio rate.
    pub const ARPEGGIO_SPEED: usize = 6;
    /// Double-rate two-key arpeggio toggle.
    pub const FAST_TWO_NOTE: usize = 7;
    /// Pitch-shift toggle.
    pub const ENABLE_PITCH_SHIFT: usize = 8;
    /// Pitch shift in semitones, centered at 12.
    pub const PITCH_SHIFT: usize = 9;
    /// Detune toggle.
    pub const ENABLE_DETUNE: usize = 10;
    /// Detune in cents.
    pub const DETUNE: usize = 11;
    /// Vibrato toggle.
    pub const ENABLE_VIBRATO: usize = 12;
    /// Vibrato preset selector.
    pub const VIBRATO_PRESET: usize = 13;
    /// Vibrato depth.
    pub const VIBRATO_DEPTH: usize = 14;
    /// Vibrato speed.
    pub const VIBRATO_SPEED: usize = 15;
    /// Vibrato warm-up delay.
    pub const VIBRATO_DELAY: usize = 16;
    /// Vibrato waveform type.
    pub const VIBRATO_TYPE: usize = 17;
    /// Note-filter toggle.
    pub const ENABLE_NOTE_FILTER: usize = 18;
    /// Eight poles follow, three parameters each: kind, freq, gain.
    pub const NOTE_FILTER_START: usize = 19;
    /// Size of the shared parameter block.
    pub const COUNT: usize = NOTE_FILTER_START + super::POLE_COUNT * 3;
}

/// Size of the parameter block every synth kind shares.
pub const BASE_PARAM_COUNT: usize = base_param::COUNT;

static TRANSITION_VALUES: [&str; 4] = ["Normal", "Interrupt", "Continue", "Slide"];
static CHORD_VALUES: [&str; 4] = ["Simultaneous", "Strum", "Arpeggio", "Custom Interval"];
static VIBRATO_PRESET_VALUES: [&str; 6] = ["None", "Light", "Delayed", "Heavy", "Shaky", "Custom"];
static VIBRATO_TYPE_VALUES: [&str; 2] = ["Normal", "Shaky"];
static POLE_KIND_VALUES: [&str; 4] = ["Off", "Low-pass", "High-pass", "Peak"];

static BASE_PARAMS: [ParamInfo; BASE_PARAM_COUNT] = [
    double(*b"fadeIn\0\0", "Fade In", "Note", 0.0, 9.0, 0.0),
    double(*b"fadeOut\0", "Fade Out", "Note", -4.0, 6.0, 0.0),
    toggle(*b"trnEnab\0", "Transition Toggle", "Note/Transition"),
    choice(
        *b"trnType\0",
        "Transition Type",
        "Note/Transition",
        &TRANSITION_VALUES,
        0.0,
    ),
    toggle(*b"chdEnab\0", "Chord Toggle", "Note/Chord"),
    choice(*b"chdType\0", "Chord Type", "Note/Chord", &CHORD_VALUES, 0.0),
    double(*b"chdArpSp", "Arpeggio Speed", "Note/Chord", 0.0, 3.0, 1.0),
    choice(
        *b"chdFast2",
        "Fast Two-Note Arpeggio",
        "Note/Chord",
        &crate::params::BOOL_ENUM_VALUES,
        0.0,
    ),
    toggle(*b"pshEnab\0", "Pitch Shift Toggle", "Note/Pitch Shift"),
    stepped(*b"pshShift", "Pitch Shift", "Note/Pitch Shift", 24.0, 12.0),
    toggle(*b"dtnEnab\0", "Detune Toggle", "Note/Detune"),
    double(*b"dtnCents", "Detune", "Note/Detune", -200.0, 200.0, 0.0),
    toggle(*b"vibEnab\0", "Vibrato Toggle", "Note/Vibrato"),
    choice(
        *b"vibPrset",
        "Vibrato Preset",
        "Note/Vibrato",
        &VIBRATO_PRESET_VALUES,
        0.0,
    ),
    double(*b"vibDepth", "Vibrato Depth", "Note/Vibrato", 0.0, 2.0, 0.0),
    double(*b"vibSpeed", "Vibrato Speed", "Note/Vibrato", 0.0, 3.0, 1.0),
    double(*b"vibDelay", "Vibrato Delay", "Note/Vibrato", 0.0, 50.0, 0.0),
    choice(
        *b"vibType\0",
        "Vibrato Type",
        "Note/Vibrato",
        &VIBRATO_TYPE_VALUES,
        0.0,
    ),
    toggle(*b"nflEnab\0", "Note Filter Toggle", "Note/Filter"),
    choice(*b"nflTyp0\0", "Note Filter 1 Type", "Note/Filter", &POLE_KIND_VALUES, 0.0),
    stepped(*b"nflFrq0\0", "Note Filter 1 Freq", "Note/Filter", 33.0, 0.0),
    stepped(*b"nflGan0\0", "Note Filter 1 Gain", "Note/Filter", 14.0, 0.0),
    choice(*b"nflTyp1\0", "Note Filter 2 Type", "Note/Filter", &POLE_KIND_VALUES, 0.0),
    stepped(*b"nflFrq1\0", "Note Filter 2 Freq", "Note/Filter", 33.0, 0.0),
    stepped(*b"nflGan1\0", "Note Filter 2 Gain", "Note/Filter", 14.0, 0.0),
    choice(*b"nflTyp2\0", "Note Filter 3 Type", "Note/Filter", &POLE_KIND_VALUES, 0.0),
    stepped(*b"nflFrq2\0", "Note Filter 3 Freq", "Note/Filter", 33.0, 0.0),
    stepped(*b"nflGan2\0", "Note Filter 3 Gain", "Note/Filter", 14.0, 0.0),
    choice(*b"nflTyp3\0", "Note Filter 4 Type", "Note/Filter", &POLE_KIND_VALUES, 0.0),
    stepped(*b"nflFrq3\0", "Note Filter 4 Freq", "Note/Filter", 33.0, 0.0),
    stepped(*b"nflGan3\0", "Note Filter 4 Gain", "Note/Filter", 14.0, 0.0),
    choice(*b"nflTyp4\0", "Note Filter 5 Type", "Note/Filter", &POLE_KIND_VALUES, 0.0),
    stepped(*b"nflFrq4\0", "Note Filter 5 Freq", "Note/Filter", 33.0, 0.0),
    stepped(*b"nflGan4\0", "Note Filter 5 Gain", "Note/Filter", 14.0, 0.0),
    choice(*b"nflTyp5\0", "Note Filter 6 Type", "Note/Filter", &POLE_KIND_VALUES, 0.0),
    stepped(*b"nflFrq5\0", "Note Filter 6 Freq", "Note/Filter", 33.0, 0.0),
    stepped(*b"nflGan5\0", "Note Filter 6 Gain", "Note/Filter", 14.0, 0.0),
    choice(*b"nflTyp6\0", "Note Filter 7 Type", "Note/Filter", &POLE_KIND_VALUES, 0.0),
    stepped(*b"nflFrq6\0", "Note Filter 7 Freq", "Note/Filter", 33.0, 0.0),
    stepped(*b"nflGan6\0", "Note Filter 7 Gain", "Note/Filter", 14.0, 0.0),
    choice(*b"nflTyp7\0", "Note Filter 8 Type", "Note/Filter", &POLE_KIND_VALUES, 0.0),
    stepped(*b"nflFrq7\0", "Note Filter 8 Freq", "Note/Filter", 33.0, 0.0),
    stepped(*b"nflGan7\0", "Note Filter 8 Gain", "Note/Filter", 14.0, 0.0),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum VoiceState {
    #[default]
    Idle,
    Active,
    Releasing,
}

#[derive(Debug, Clone, Default)]
struct VoiceBase {
    state: VoiceState,
    key: f64,
    target_key: f64,
    key_delta: f64,
    velocity: f64,
    length_ticks: Option<f64>,
    /// Strum countdown; the voice is silent while positive.
    delay_ticks: f64,
    age_secs: f64,
    age_ticks: f64,
    secs_since_release: f64,
    ticks_since_release: f64,
    release_fade_ticks: f64,
    expression: f64,
    expression_delta: f64,
    arp_muted: bool,
    vibrato_phase: f64,
    order: u64,
    envelopes: EnvelopeComputer,
    filters: [Biquad; POLE_COUNT],
}

impl VoiceBase {
    fn sounding(&self) -> bool {
        matches!(self.state, VoiceState::Active | VoiceState::Releasing)
    }
}

#[derive(Debug)]
struct SynthBase {
    sample_rate: f64,
    params: [f64; BASE_PARAM_COUNT],
    envelopes: ArrayVec<Envelope, MAX_ENVELOPES>,
    voices: [VoiceBase; MAX_VOICES],
    ended: ArrayVec<VoiceId, MAX_VOICES>,
    order_counter: u64,
    arp_counter: f64,
    strum_started_this_tick: f64,
    last_ctx: TickContext,
    scratch: Vec<f32>,
}

impl SynthBase {
    fn new() -> Self {
        let mut params = [0.0; BASE_PARAM_COUNT];
        for (value, info) in params.iter_mut().zip(&BASE_PARAMS) {
            *value = info.default;
        }
        Self {
            sample_rate: 48000.0,
            params,
            envelopes: ArrayVec::new(),
            voices: Default::default(),
            ended: ArrayVec::new(),
            order_counter: 0,
            arp_counter: 0.0,
            strum_started_this_tick: 0.0,
            last_ctx: TickContext {
                bpm: 150.0,
                beat: 0.0,
                samples_per_tick: samples_per_tick(150.0, 48000.0),
                mod_x: 0.0,
                mod_y: 0.0,
            },
            scratch: Vec::new(),
        }
    }

    fn transition(&self) -> TransitionType {
        if self.params[base_param::ENABLE_TRANSITION] == 0.0 {
            return TransitionType::Normal;
        }
        TransitionType::from_f64(self.params[base_param::TRANSITION_TYPE]).unwrap_or_default()
    }

    fn chord(&self) -> ChordType {
        if self.params[base_param::ENABLE_CHORD] == 0.0 {
            return ChordType::Simultaneous;
        }
        ChordType::from_f64(self.params[base_param::CHORD_TYPE]).unwrap_or_default()
    }

    fn vibrato(&self) -> Option<VibratoParams> {
        if self.params[base_param::ENABLE_VIBRATO] == 0.0 {
            return None;
        }
        Some(VibratoParams {
            depth: self.params[base_param::VIBRATO_DEPTH],
            speed: self.params[base_param::VIBRATO_SPEED],
            delay: self.params[base_param::VIBRATO_DELAY],
            kind: VibratoType::from_f64(self.params[base_param::VIBRATO_TYPE])
                .unwrap_or_default(),
        })
    }

    /// Base pitch offset applied to every voice: pitch shift and detune,
    /// scaled by their envelopes.
    fn pitch_offset(&self, envelopes: &EnvelopeComputer) -> f64 {
        let mut offset = 0.0;
        if self.params[base_param::ENABLE_PITCH_SHIFT] != 0.0 {
            let shift = self.params[base_param::PITCH_SHIFT] - 12.0;
            offset += shift * envelopes.end(ComputeIndex::PitchShift);
        }
        if self.params[base_param::ENABLE_DETUNE] != 0.0 {
            let cents = self.params[base_param::DETUNE];
            offset += cents / 100.0 * envelopes.end(ComputeIndex::Detune);
        }
        offset
    }

    fn allocate_slot(&mut self) -> VoiceId {
        if let Some(idle) = self
            .voices
            .iter()
            .position(|v| matches!(v.state, VoiceState::Idle))
        {
            return idle;
        }
        // Steal the oldest released voice, then the oldest active one.
        let stolen = self
            .voices
            .iter()
            .enumerate()
            .filter(|(_, v)| matches!(v.state, VoiceState::Releasing))
            .min_by_key(|(_, v)| v.order)
            .or_else(|| {
                self.voices
                    .iter()
                    .enumerate()
                    .min_by_key(|(_, v)| v.order)
            })
            .map(|(i, _)| i)
            .unwrap_or(0);
        if !self.ended.contains(&stolen) {
            let _ = self.ended.try_push(stolen);
        }
        stolen
    }

    fn newest_sounding(&self) -> Option<VoiceId> {
        self.voices
            .iter()
            .enumerate()
            .filter(|(_, v)| v.sounding())
            .max_by_key(|(_, v)| v.order)
            .map(|(i, _)| i)
    }

    fn release_voice(&mut self, slot: VoiceId, fade_ticks: f64) {
        let voice = &mut self.voices[slot];
        if !matches!(voice.state, VoiceState::Active) {
            return;
        }
        voice.state = VoiceState::Releasing;
        voice.secs_since_release = 0.0;
        voice.ticks_since_release = 0.0;
        voice.release_fade_ticks = fade_ticks.max(1.0);
    }

    /// Fade ticks used when a live note is released.
    fn live_fade_ticks(&self) -> f64 {
        ticks_fade_out(self.params[base_param::FADE_OUT]).max(1.0)
    }

    fn vibrato_value(&self, voice: &VoiceBase, params: &VibratoParams) -> f64 {
        let warmup = if params.delay <= 0.0 {
            1.0
        } else {
            (voice.age_ticks / params.delay).clamp(0.0, 1.0)
        };
        let phase = std::f64::consts::TAU * voice.vibrato_phase;
        let wave = match params.kind {
            VibratoType::Normal => phase.sin(),
            VibratoType::Shaky => {
                phase.sin() * 0.5 + (phase * 1.618).sin() * 0.3 + (phase * 3.0).sin() * 0.2
            }
        };
        params.depth * warmup * wave
    }
}

#[derive(Debug)]
enum CoreUnit {
    Fm(fm::FmCore),
    Chip(chip::ChipCore),
    Harmonics(harmonics::HarmonicsCore),
}

impl CoreUnit {
    fn param_count(&self) -> usize {
        match self {
            Self::Fm(_) => fm::PARAM_COUNT,
            Self::Chip(_) => chip::PARAM_COUNT,
            Self::Harmonics(_) => harmonics::PARAM_COUNT,
        }
    }

    fn param_info(&self, index: usize) -> Option<&'static ParamInfo> {
        match self {
            Self::Fm(_) => fm::PARAMS.get(index),
            Self::Chip(_) => chip::PARAMS.get(index),
            Self::Harmonics(_) => harmonics::PARAMS.get(index),
        }
    }

    fn get_param(&self, index: usize) -> Option<f64> {
        match self {
            Self::Fm(core) => core.params.get(index).copied(),
            Self::Chip(core) => core.params.get(index).copied(),
            Self::Harmonics(core) => core.params.get(index).copied(),
        }
    }

    fn set_param(&mut self, index: usize, value: f64) {
        match self {
            Self::Fm(core) => core.params[index] = value,
            Self::Chip(core) => core.params[index] = value,
            Self::Harmonics(core) => core.set_param(index, value),
        }
    }

    fn reset_voice(&mut self, slot: VoiceId) {
        match self {
            Self::Fm(core) => core.reset_voice(slot),
            Self::Chip(core) => core.reset_voice(slot),
            Self::Harmonics(core) => core.reset_voice(slot),
        }
    }

    fn tick_voice(
        &mut self,
        slot: VoiceId,
        pitch: f64,
        envelopes: &EnvelopeComputer,
        sample_rate: f64,
    ) {
        match self {
            Self::Fm(core) => core.tick_voice(slot, pitch, envelopes, sample_rate),
            Self::Chip(core) => core.tick_voice(slot, pitch, envelopes, sample_rate),
            Self::Harmonics(core) => core.tick_voice(slot, pitch, envelopes, sample_rate),
        }
    }

    fn render_voice(&mut self, slot: VoiceId, output: &mut [f32]) {
        match self {
            Self::Fm(core) => core.render_voice(slot, output),
            Self::Chip(core) => core.render_voice(slot, output),
            Self::Harmonics(core) => core.render_voice(slot, output),
        }
    }
}

/// One synthesizer: a voice bank of a single kind plus the shared note
/// machinery. The uniform surface is `begin_note` / `end_note` /
/// `tick` / `run` / parameter access by local index.
#[derive(Debug)]
pub struct SynthUnit {
    kind: SynthKind,
    base: SynthBase,
    core: CoreUnit,
}

impl SynthUnit {
    /// Creates a synth of the given kind with default parameters.
    #[must_use]
    pub fn new(kind: SynthKind) -> Self {
        crate::wavetables::sine_wave();
        let core = match kind {
            SynthKind::Fm => CoreUnit::Fm(fm::FmCore::new()),
            SynthKind::Chip => CoreUnit::Chip(chip::ChipCore::new()),
            SynthKind::Harmonics => CoreUnit::Harmonics(harmonics::HarmonicsCore::new()),
        };
        Self {
            kind,
            base: SynthBase::new(),
            core,
        }
    }

    /// The core this synth was created with.
    #[must_use]
    pub fn kind(&self) -> SynthKind {
        self.kind
    }

    /// Sets the output sample rate.
    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.base.sample_rate = sample_rate;
        self.base.last_ctx.samples_per_tick = samples_per_tick(self.base.last_ctx.bpm, sample_rate);
    }

    /// Allocates the per-voice scratch buffer; must be called before
    /// `run` with the host's maximum block size.
    pub fn configure(&mut self, max_frames: usize) {
        self.base.scratch.resize(max_frames, 0.0);
    }

    /// Number of local parameters: the shared block plus the core's.
    #[must_use]
    pub fn param_count(&self) -> usize {
        BASE_PARAM_COUNT + self.core.param_count()
    }

    /// Descriptor of the parameter at a local index.
    #[must_use]
    pub fn param_info(&self, index: usize) -> Option<&'static ParamInfo> {
        if index < BASE_PARAM_COUNT {
            BASE_PARAMS.get(index)
        } else {
            self.core.param_info(index - BASE_PARAM_COUNT)
        }
    }

    /// Sets a parameter by local index, returning the value as stored
    /// after clamping and quantization.
    pub fn set_param(&mut self, index: usize, value: f64) -> Result<f64, SetParamError> {
        let info = self.param_info(index).ok_or(SetParamError::UnknownIndex)?;
        let clamped = info.clamp(value).ok_or(SetParamError::Invalid)?;
        if index < BASE_PARAM_COUNT {
            self.base.params[index] = clamped;
        } else {
            self.core.set_param(index - BASE_PARAM_COUNT, clamped);
        }
        Ok(clamped)
    }

    /// Current value of the parameter at a local index.
    #[must_use]
    pub fn get_param(&self, index: usize) -> Option<f64> {
        if index < BASE_PARAM_COUNT {
            self.base.params.get(index).copied()
        } else {
            self.core.get_param(index - BASE_PARAM_COUNT)
        }
    }

    /// Number of envelopes in the list.
    #[must_use]
    pub fn envelope_count(&self) -> usize {
        self.base.envelopes.len()
    }

    /// The envelope at `index`, if present.
    #[must_use]
    pub fn envelope(&self, index: usize) -> Option<Envelope> {
        self.base.envelopes.get(index).copied()
    }

    /// Appends a new envelope targeting nothing. A no-op returning
    /// `None` once the limit is reached.
    pub fn add_envelope(&mut self) -> Option<&mut Envelope> {
        if self.base.envelopes.is_full() {
            return None;
        }
        self.base.envelopes.push(Envelope::default());
        self.base.envelopes.last_mut()
    }

    /// Replaces the envelope at `index`; out-of-range indices are
    /// ignored.
    pub fn set_envelope(&mut self, index: usize, envelope: Envelope) {
        if let Some(slot) = self.base.envelopes.get_mut(index) {
            *slot = envelope;
        }
    }

    /// Removes the envelope at `index`, shifting later ones down.
    pub fn remove_envelope(&mut self, index: usize) {
        if index < self.base.envelopes.len() {
            self.base.envelopes.remove(index);
        }
    }

    /// Empties the envelope list.
    pub fn clear_envelopes(&mut self) {
        self.base.envelopes.clear();
    }

    /// Number of voices currently sounding (active or fading).
    #[must_use]
    pub fn active_voice_count(&self) -> usize {
        self.base.voices.iter().filter(|v| v.sounding()).count()
    }

    /// Voice slots that finished their fade since the last call. The
    /// caller turns these into note-end events.
    pub fn take_ended(&mut self) -> ArrayVec<VoiceId, MAX_VOICES> {
        std::mem::take(&mut self.base.ended)
    }

    /// Starts a note. `length_ticks` is `None` for live notes whose end
    /// is not known in advance.
    pub fn begin_note(&mut self, key: u16, velocity: f64, length_ticks: Option<u32>) -> VoiceId {
        let transition = self.base.transition();
        let chord = self.base.chord();

        let reuse = match (transition, chord) {
            (TransitionType::Continue | TransitionType::Slide, _)
            | (_, ChordType::CustomInterval) => self.base.newest_sounding(),
            _ => None,
        };

        let slot = if let Some(slot) = reuse {
            let voice = &mut self.base.voices[slot];
            let slide = matches!(transition, TransitionType::Slide);
            if slide {
                voice.target_key = f64::from(key);
                voice.key_delta = (voice.target_key - voice.key) / f64::from(SLIDE_TICKS);
            } else {
                voice.key = f64::from(key);
                voice.target_key = voice.key;
                voice.key_delta = 0.0;
            }
            voice.velocity = velocity;
            voice.length_ticks = length_ticks.map(f64::from);
            voice.state = VoiceState::Active;
            slot
        } else {
            if matches!(transition, TransitionType::Interrupt) {
                for slot in 0..MAX_VOICES {
                    if matches!(self.base.voices[slot].state, VoiceState::Active) {
                        self.base.release_voice(slot, 1.0);
                    }
                }
            }
            let slot = self.base.allocate_slot();
            let order = self.base.order_counter;
            self.base.order_counter += 1;
            let delay_ticks = if matches!(chord, ChordType::Strum) {
                let delay = self.base.strum_started_this_tick * f64::from(STRUM_TICK_SPACING);
                self.base.strum_started_this_tick += 1.0;
                delay
            } else {
                0.0
            };
            self.base.voices[slot] = VoiceBase {
                state: VoiceState::Active,
                key: f64::from(key),
                target_key: f64::from(key),
                velocity,
                length_ticks: length_ticks.map(f64::from),
                delay_ticks,
                order,
                ..Default::default()
            };
            self.core.reset_voice(slot);
            slot
        };

        self.prime_voice(slot);
        slot
    }

    /// Releases the note on `slot`; the voice fades over the configured
    /// fade-out and reports its end afterwards.
    pub fn end_note(&mut self, slot: VoiceId) {
        if slot >= MAX_VOICES {
            return;
        }
        let fade = self.base.live_fade_ticks();
        self.base.release_voice(slot, fade);
    }

    /// Releases every sounding voice.
    pub fn end_all_notes(&mut self) {
        for slot in 0..MAX_VOICES {
            self.end_note(slot);
        }
    }

    /// Transport jump: re-aligns the beat-synchronized state.
    pub fn begin_transport(&mut self, beat: f64, bpm: f64) {
        self.base.arp_counter = 0.0;
        self.base.last_ctx.beat = beat;
        self.base.last_ctx.bpm = bpm;
    }

    /// Advances the control clock by one tick: ages voices, finishes
    /// fades, re-evaluates envelopes and per-voice increments.
    pub fn tick(&mut self, ctx: &TickContext) {
        self.base.last_ctx = *ctx;
        self.base.strum_started_this_tick = 0.0;
        self.advance_arpeggio(ctx);

        let tick_secs = ctx.samples_per_tick / self.base.sample_rate;
        for slot in 0..MAX_VOICES {
            if !self.base.voices[slot].sounding() {
                continue;
            }
            if self.base.voices[slot].delay_ticks > 0.0 {
                self.base.voices[slot].delay_ticks -= 1.0;
                continue;
            }

            // Scheduled notes with a negative fade release early so the
            // fade completes exactly at the note end.
            let fade_setting = ticks_fade_out(self.base.params[base_param::FADE_OUT]);
            {
                let voice = &self.base.voices[slot];
                if matches!(voice.state, VoiceState::Active) {
                    if let Some(length) = voice.length_ticks {
                        let release_at = length + fade_setting.min(0.0);
                        if voice.age_ticks >= release_at {
                            self.base.release_voice(slot, fade_setting.abs().max(1.0));
                        }
                    }
                }
            }

            if matches!(self.base.voices[slot].state, VoiceState::Releasing)
                && self.base.voices[slot].ticks_since_release
                    >= self.base.voices[slot].release_fade_ticks
            {
                self.base.voices[slot].state = VoiceState::Idle;
                if !self.base.ended.contains(&slot) {
                    let _ = self.base.ended.try_push(slot);
                }
                continue;
            }

            self.tick_voice(slot, ctx, tick_secs);
        }
    }

    fn tick_voice(&mut self, slot: VoiceId, ctx: &TickContext, tick_secs: f64) {
        let base = &mut self.base;
        let envelopes = &base.envelopes;
        let voice = &mut base.voices[slot];

        // Slide glide.
        if voice.key_delta != 0.0 {
            voice.key += voice.key_delta;
            let arrived = (voice.key_delta > 0.0 && voice.key >= voice.target_key)
                || (voice.key_delta < 0.0 && voice.key <= voice.target_key);
            if arrived {
                voice.key = voice.target_key;
                voice.key_delta = 0.0;
            }
        }

        let beat_per_tick = 1.0 / f64::from(TICKS_PER_BEAT);
        let start = CurveInput {
            time_secs: voice.age_secs,
            beat: ctx.beat,
            note_size: voice.velocity,
            mod_x: ctx.mod_x,
            mod_y: ctx.mod_y,
        };
        let end = CurveInput {
            time_secs: voice.age_secs + tick_secs,
            beat: ctx.beat + beat_per_tick,
            ..start
        };
        let mut computer = std::mem::take(&mut voice.envelopes);
        computer.compute(envelopes, &start, &end);
        voice.envelopes = computer;

        // Expression: velocity, the note-volume envelope, fades, and
        // arpeggio muting.
        let fade_in_secs = secs_fade_in(base.params[base_param::FADE_IN]);
        let fade_factor = |secs: f64, rel_ticks: f64, voice: &VoiceBase| {
            let mut factor = if fade_in_secs <= 0.0 {
                1.0
            } else {
                (secs / fade_in_secs).clamp(0.0, 1.0)
            };
            if matches!(voice.state, VoiceState::Releasing) {
                factor *= (1.0 - rel_ticks / voice.release_fade_ticks).max(0.0);
            }
            factor
        };
        let mute = if voice.arp_muted { 0.0 } else { 1.0 };
        let expr_start = voice.velocity
            * voice.envelopes.start(ComputeIndex::NoteVolume)
            * fade_factor(voice.age_secs, voice.ticks_since_release, voice)
            * mute;
        let expr_end = voice.velocity
            * voice.envelopes.end(ComputeIndex::NoteVolume)
            * fade_factor(
                voice.age_secs + tick_secs,
                voice.ticks_since_release + 1.0,
                voice,
            )
            * mute;
        voice.expression = expr_start;
        voice.expression_delta = (expr_end - expr_start) / ctx.samples_per_tick;

        // Vibrato.
        let depth_env = voice.envelopes.end(ComputeIndex::VibratoDepth);
        let mut pitch = voice.key;
        if let Some(params) = base.vibrato() {
            let value = base.vibrato_value(&base.voices[slot], &params) * depth_env;
            base.voices[slot].vibrato_phase += tick_secs * params.speed / VIBRATO_PERIOD_SECS;
            pitch += value;
        }

        pitch += base.pitch_offset(&base.voices[slot].envelopes);
        let voice = &mut base.voices[slot];

        // Note filter coefficients for this tick.
        if base.params[base_param::ENABLE_NOTE_FILTER] != 0.0 {
            let all_freqs = voice.envelopes.end(ComputeIndex::NoteFilterAllFreqs);
            for i in 0..POLE_COUNT {
                let pole = {
                    let at = base_param::NOTE_FILTER_START + i * 3;
                    FilterPole {
                        kind: PoleKind::from_f64(base.params[at]).unwrap_or_default(),
                        freq: base.params[at + 1],
                        gain: base.params[at + 2],
                    }
                };
                let freq_mult = all_freqs * voice.envelopes.end(ComputeIndex::note_filter_freq(i));
                let gain_mult = voice.envelopes.end(ComputeIndex::note_filter_gain(i));
                voice.filters[i].set_coefficients(pole_coefficients(
                    &pole,
                    base.sample_rate,
                    freq_mult,
                    gain_mult,
                ));
            }
        }

        // Ages for the next tick.
        voice.age_secs += tick_secs;
        voice.age_ticks += 1.0;
        if matches!(voice.state, VoiceState::Releasing) {
            voice.secs_since_release += tick_secs;
            voice.ticks_since_release += 1.0;
        }

        let envelopes_snapshot = voice.envelopes.clone();
        self.core
            .tick_voice(slot, pitch, &envelopes_snapshot, base.sample_rate);
    }

    fn advance_arpeggio(&mut self, _ctx: &TickContext) {
        let base = &mut self.base;
        if !matches!(base.chord(), ChordType::Arpeggio) {
            for voice in &mut base.voices {
                voice.arp_muted = false;
            }
            return;
        }
        let mut held: ArrayVec<VoiceId, MAX_VOICES> = ArrayVec::new();
        for (slot, voice) in base.voices.iter().enumerate() {
            if matches!(voice.state, VoiceState::Active) {
                let _ = held.try_push(slot);
            }
        }
        if held.len() <= 1 {
            for voice in &mut base.voices {
                voice.arp_muted = false;
            }
            return;
        }
        held.sort_unstable_by_key(|&slot| base.voices[slot].order);

        let mut speed = base.params[base_param::ARPEGGIO_SPEED];
        if base.params[base_param::FAST_TWO_NOTE] != 0.0 && held.len() == 2 {
            speed *= 2.0;
        }
        base.arp_counter += speed;
        let position = (base.arp_counter / f64::from(ARP_TICKS_PER_NOTE)) as usize % held.len();
        for (i, &slot) in held.iter().enumerate() {
            base.voices[slot].arp_muted = i != position;
        }
    }

    /// Initializes expression, envelopes and core increments for a
    /// voice started between ticks, using the most recent tick context.
    fn prime_voice(&mut self, slot: VoiceId) {
        let ctx = self.base.last_ctx;
        let tick_secs = ctx.samples_per_tick / self.base.sample_rate;
        self.tick_voice(slot, &ctx, tick_secs);
        // Ages were advanced by the priming pass; the note has not
        // actually aged yet.
        let voice = &mut self.base.voices[slot];
        voice.age_secs = 0.0;
        voice.age_ticks = 0.0;
    }

    /// Renders and mixes all sounding voices into `output` (mono).
    /// `output` must not exceed the configured maximum block size.
    pub fn run(&mut self, output: &mut [f32]) {
        output.fill(0.0);
        let frames = output.len();
        let note_filter_on = self.base.params[base_param::ENABLE_NOTE_FILTER] != 0.0;
        for slot in 0..MAX_VOICES {
            if !self.base.voices[slot].sounding() || self.base.voices[slot].delay_ticks > 0.0 {
                continue;
            }
            let (scratch, voice) = {
                let base = &mut self.base;
                (&mut base.scratch[..frames], &mut base.voices[slot])
            };
            self.core.render_voice(slot, scratch);

            if note_filter_on {
                for sample in scratch.iter_mut() {
                    let mut value = f64::from(*sample);
                    for filter in &mut voice.filters {
                        value = filter.process(value);
                    }
                    *sample = value as f32;
                }
            }

            let mut expression = voice.expression;
            for sample in scratch.iter_mut() {
                *sample *= expression as f32;
                expression += voice.expression_delta;
            }
            voice.expression = expression;

            util::slice_ops::add_in_place(scratch, output);
        }
    }
}

const SLIDE_TICKS: u32 = 3;
const STRUM_TICK_SPACING: u32 = 2;
const ARP_TICKS_PER_NOTE: u32 = 12;
const VIBRATO_PERIOD_SECS: f64 = 0.14;
