//! Per-note envelope curves.
//!
//! An instrument carries an ordered list of up to [`MAX_ENVELOPES`]
//! envelopes, each pairing a modulation target with one of the preset
//! curves. The [`EnvelopeComputer`] evaluates the whole list twice per
//! tick segment (at its start and end); consumers interpolate linearly
//! between the two values across the segment's samples. Envelopes that
//! share a target multiply.

use num_derive::FromPrimitive;

/// Envelope list limit per instrument; adds beyond it are no-ops.
pub const MAX_ENVELOPES: usize = 12;

/// Modulation targets addressable by an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, Default)]
#[repr(u32)]
pub enum ComputeIndex {
    /// No target; the envelope is inert.
    #[default]
    None,
    /// Per-voice volume.
    NoteVolume,
    /// Every note-filter pole frequency at once.
    NoteFilterAllFreqs,
    /// Pulse width of pulse-based voices.
    PulseWidth,
    /// Sustain of plucked-string voices.
    StringSustain,
    /// Unison spread.
    Unison,
    /// Frequency of FM operator 1.
    OperatorFreq0,
    /// Frequency of FM operator 2.
    OperatorFreq1,
    /// Frequency of FM operator 3.
    OperatorFreq2,
    /// Frequency of FM operator 4.
    OperatorFreq3,
    /// Volume of FM operator 1.
    OperatorAmp0,
    /// Volume of FM operator 2.
    OperatorAmp1,
    /// Volume of FM operator 3.
    OperatorAmp2,
    /// Volume of FM operator 4.
    OperatorAmp3,
    /// FM feedback amount.
    FeedbackAmp,
    /// Pitch shift amount.
    PitchShift,
    /// Detune amount.
    Detune,
    /// Vibrato depth.
    VibratoDepth,
    /// Frequency of note-filter pole 1.
    NoteFilterFreq0,
    /// Frequency of note-filter pole 2.
    NoteFilterFreq1,
    /// Frequency of note-filter pole 3.
    NoteFilterFreq2,
    /// Frequency of note-filter pole 4.
    NoteFilterFreq3,
    /// Frequency of note-filter pole 5.
    NoteFilterFreq4,
    /// Frequency of note-filter pole 6.
    NoteFilterFreq5,
    /// Frequency of note-filter pole 7.
    NoteFilterFreq6,
    /// Frequency of note-filter pole 8.
    NoteFilterFreq7,
    /// Gain of note-filter pole 1.
    NoteFilterGain0,
    /// Gain of note-filter pole 2.
    NoteFilterGain1,
    /// Gain of note-filter pole 3.
    NoteFilterGain2,
    /// Gain of note-filter pole 4.
    NoteFilterGain3,
    /// Gain of note-filter pole 5.
    NoteFilterGain4,
    /// Gain of note-filter pole 6.
    NoteFilterGain5,
    /// Gain of note-filter pole 7.
    NoteFilterGain6,
    /// Gain of note-filter pole 8.
    NoteFilterGain7,
    /// Supersaw dynamism.
    SupersawDynamism,
    /// Supersaw spread.
    SupersawSpread,
    /// Supersaw saw↔pulse shape.
    SupersawShape,
}

/// Number of [`ComputeIndex`] entries.
pub const COMPUTE_INDEX_COUNT: usize = 37;

impl ComputeIndex {
    /// Frequency target of FM operator `op` (0-based).
    #[must_use]
    pub fn operator_freq(op: usize) -> Self {
        use num_traits::FromPrimitive;
        Self::from_usize(Self::OperatorFreq0 as usize + op).unwrap_or_default()
    }

    /// Volume target of FM operator `op` (0-based).
    #[must_use]
    pub fn operator_amp(op: usize) -> Self {
        use num_traits::FromPrimitive;
        Self::from_usize(Self::OperatorAmp0 as usize + op).unwrap_or_default()
    }

    /// Frequency target of note-filter pole `pole` (0-based).
    #[must_use]
    pub fn note_filter_freq(pole: usize) -> Self {
        use num_traits::FromPrimitive;
        Self::from_usize(Self::NoteFilterFreq0 as usize + pole).unwrap_or_default()
    }

    /// Gain target of note-filter pole `pole` (0-based).
    #[must_use]
    pub fn note_filter_gain(pole: usize) -> Self {
        use num_traits::FromPrimitive;
        Self::from_usize(Self::NoteFilterGain0 as usize + pole).unwrap_or_default()
    }
}

/// One entry of an instrument's envelope list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Envelope {
    /// What the envelope modulates.
    pub target: ComputeIndex,
    /// Index into [`CURVE_PRESETS`].
    pub curve_preset: u8,
}

/// Families of envelope curves; presets pair one with a speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurveKind {
    /// Constant one.
    None,
    /// Proxied from the note's velocity.
    NoteSize,
    /// Reads the modulation pad's X axis.
    ModX,
    /// Reads the modulation pad's Y axis.
    ModY,
    /// Starts near two and settles at one.
    Punch,
    /// Rises to one, then holds.
    Flare,
    /// Hyperbolic decay from one.
    Twang,
    /// Complement of twang: rises toward one.
    Swell,
    /// Full-depth beat-locked wobble.
    Tremolo,
    /// Half-depth beat-locked wobble.
    Tremolo2,
    /// Exponential decay.
    Decay,
    /// Holds one, then cuts to zero.
    Blip,
}

/// A named curve with its fixed speed.
#[derive(Debug, Clone, Copy)]
pub struct CurvePreset {
    /// Display name.
    pub name: &'static str,
    /// Curve family.
    pub kind: CurveKind,
    /// Family-specific rate; unused by the constant families.
    pub speed: f64,
}

const fn preset(name: &'static str, kind: CurveKind, speed: f64) -> CurvePreset {
    CurvePreset { name, kind, speed }
}

/// The curve catalog an envelope's `curve_preset` indexes into.
pub static CURVE_PRESETS: [CurvePreset; 26] = [
    preset("none", CurveKind::None, 0.0),
    preset("note size", CurveKind::NoteSize, 0.0),
    preset("mod x", CurveKind::ModX, 0.0),
    preset("mod y", CurveKind::ModY, 0.0),
    preset("punch", CurveKind::Punch, 0.0),
    preset("flare 1", CurveKind::Flare, 32.0),
    preset("flare 2", CurveKind::Flare, 8.0),
    preset("flare 3", CurveKind::Flare, 2.0),
    preset("twang 1", CurveKind::Twang, 32.0),
    preset("twang 2", CurveKind::Twang, 8.0),
    preset("twang 3", CurveKind::Twang, 2.0),
    preset("swell 1", CurveKind::Swell, 32.0),
    preset("swell 2", CurveKind::Swell, 8.0),
    preset("swell 3", CurveKind::Swell, 2.0),
    preset("tremolo 1", CurveKind::Tremolo, 4.0),
    preset("tremolo 2", CurveKind::Tremolo, 2.0),
    preset("tremolo 3", CurveKind::Tremolo, 1.0),
    preset("tremolo 4", CurveKind::Tremolo2, 4.0),
    preset("tremolo 5", CurveKind::Tremolo2, 2.0),
    preset("tremolo 6", CurveKind::Tremolo2, 1.0),
    preset("decay 1", CurveKind::Decay, 10.0),
    preset("decay 2", CurveKind::Decay, 7.0),
    preset("decay 3", CurveKind::Decay, 4.0),
    preset("blip 1", CurveKind::Blip, 6.0),
    preset("blip 2", CurveKind::Blip, 16.0),
    preset("blip 3", CurveKind::Blip, 32.0),
];

/// Observation point handed to the evaluator: where a voice is in time
/// at one end of a tick segment.
#[derive(Debug, Clone, Copy, Default)]
pub struct CurveInput {
    /// Seconds since the note started.
    pub time_secs: f64,
    /// Position on the beats timeline.
    pub beat: f64,
    /// Velocity-derived note size, normalized to `[0, 1]`.
    pub note_size: f64,
    /// Modulation pad X axis in `[0, 1]`.
    pub mod_x: f64,
    /// Modulation pad Y axis in `[0, 1]`.
    pub mod_y: f64,
}

/// Evaluates one curve at one observation point.
#[must_use]
pub fn evaluate_curve(curve: &CurvePreset, input: &CurveInput) -> f64 {
    let t = input.time_secs;
    match curve.kind {
        CurveKind::None => 1.0,
        CurveKind::NoteSize => note_size_to_volume_mult(input.note_size),
        CurveKind::ModX => input.mod_x,
        CurveKind::ModY => input.mod_y,
        CurveKind::Punch => (2.0 - t * 10.0).max(1.0),
        CurveKind::Flare => (t * curve.speed).min(1.0),
        CurveKind::Twang => 1.0 / (1.0 + t * curve.speed),
        CurveKind::Swell => 1.0 - 1.0 / (1.0 + t * curve.speed),
        CurveKind::Tremolo => {
            0.5 + 0.5 * (std::f64::consts::TAU * curve.speed * input.beat).cos()
        }
        CurveKind::Tremolo2 => {
            0.75 + 0.25 * (std::f64::consts::TAU * curve.speed * input.beat).cos()
        }
        CurveKind::Decay => 2.0_f64.powf(-t * curve.speed),
        CurveKind::Blip => {
            if t < 1.0 / curve.speed {
                1.0
            } else {
                0.0
            }
        }
    }
}

/// Volume multiplier for a normalized note size.
#[must_use]
pub fn note_size_to_volume_mult(size: f64) -> f64 {
    size.max(0.0).powf(1.5)
}

/// Evaluated multipliers for every target, at the start and end of the
/// current tick segment.
#[derive(Debug, Clone)]
pub struct EnvelopeComputer {
    starts: [f64; COMPUTE_INDEX_COUNT],
    ends: [f64; COMPUTE_INDEX_COUNT],
}

impl Default for EnvelopeComputer {
    fn default() -> Self {
        Self {
            starts: [1.0; COMPUTE_INDEX_COUNT],
            ends: [1.0; COMPUTE_INDEX_COUNT],
        }
    }
}

impl EnvelopeComputer {
    /// Re-evaluates the whole envelope list at the two ends of a tick
    /// segment. Envelopes sharing a target multiply.
    pub fn compute(&mut self, envelopes: &[Envelope], start: &CurveInput, end: &CurveInput) {
        self.starts.fill(1.0);
        self.ends.fill(1.0);
        for envelope in envelopes {
            let target = envelope.target as usize;
            if target == ComputeIndex::None as usize {
                continue;
            }
            let Some(curve) = CURVE_PRESETS.get(envelope.curve_preset as usize) else {
                continue;
            };
            self.starts[target] *= evaluate_curve(curve, start);
            self.ends[target] *= evaluate_curve(curve, end);
        }
    }

    /// Multiplier for `target` at the segment start.
    #[must_use]
    pub fn start(&self, target: ComputeIndex) -> f64 {
        self.starts[target as usize]
    }

    /// Multiplier for `target` at the segment end.
    #[must_use]
    pub fn end(&self, target: ComputeIndex) -> f64 {
        self.ends[target as usize]
    }
}

/// Lowest fade-out setting.
pub const FADE_OUT_MIN: f64 = -4.0;
/// Highest fade-out setting.
pub const FADE_OUT_MAX: f64 = 6.0;

// Neutral setting is at index 4.
static FADE_OUT_TICKS: [f64; 11] = [
    -24.0, -12.0, -6.0, -3.0, -1.0, 6.0, 12.0, 24.0, 48.0, 72.0, 96.0,
];

/// Seconds of fade-in for a fade-in setting in `0..=9`.
#[must_use]
pub fn secs_fade_in(setting: f64) -> f64 {
    0.0125 * (0.95 * setting + 0.05 * setting * setting)
}

/// Ticks of fade-out for a setting in `FADE_OUT_MIN..=FADE_OUT_MAX`.
/// Negative results advance the perceived note end before the
/// scheduled one. Fractional settings interpolate between table
/// entries.
#[must_use]
pub fn ticks_fade_out(setting: f64) -> f64 {
    let scaled = (setting - FADE_OUT_MIN).clamp(0.0, (FADE_OUT_TICKS.len() - 1) as f64);
    let index = (scaled as usize).min(FADE_OUT_TICKS.len() - 2);
    util::f64::lerp(
        FADE_OUT_TICKS[index],
        FADE_OUT_TICKS[index + 1],
        scaled - index as f64,
    )
}
