//! Four-operator FM core.
//!
//! The modulation topology is table-driven: [`ALGORITHMS`] lists, per
//! algorithm, which operators feed which (modulators always have a
//! higher index than the operators they modulate, so one pass from
//! operator 4 down to 1 evaluates everything), and [`FEEDBACKS`] lists
//! the self- and cross-feedback edges, which read the previous
//! sample's outputs.

use super::MAX_VOICES;
use crate::envelope::{ComputeIndex, EnvelopeComputer};
use crate::params::{choice, double, stepped, ParamInfo};
use crate::wavetables::{key_to_hz, sine_at, SINE_WAVE_LENGTH};

/// Operators per voice.
pub const OP_COUNT: usize = 4;
/// Number of FM-specific parameters.
pub const PARAM_COUNT: usize = 11;
/// Number of modulation topologies.
pub const ALGORITHM_COUNT: usize = 13;
/// Number of feedback topologies.
pub const FEEDBACK_TYPE_COUNT: usize = 18;
/// Number of frequency-ratio table entries.
pub const FREQ_RATIO_COUNT: usize = 35;

/// Local index of the algorithm selector.
pub const PARAM_ALGORITHM: usize = 0;
/// Local index of the feedback-type selector.
pub const PARAM_FEEDBACK_TYPE: usize = 9;
/// Local index of the feedback volume.
pub const PARAM_FEEDBACK_VOLUME: usize = 10;

/// Local index of operator `op`'s frequency ratio (0-based).
#[must_use]
pub const fn param_freq(op: usize) -> usize {
    1 + op * 2
}

/// Local index of operator `op`'s volume (0-based).
#[must_use]
pub const fn param_volume(op: usize) -> usize {
    2 + op * 2
}

static ALGORITHM_VALUES: [&str; ALGORITHM_COUNT] = [
    "1<-(2 3 4)",
    "1<-(2 3<-4)",
    "1<-2<-(3 4)",
    "1<-(2 3)<-4",
    "1<-2<-3<-4",
    "1<-3 2<-4",
    "1 2<-(3 4)",
    "1 2<-3<-4",
    "(1 2)<-3<-4",
    "(1 2)<-(3 4)",
    "1 2 3<-4",
    "(1 2 3)<-4",
    "1 2 3 4",
];

static FEEDBACK_VALUES: [&str; FEEDBACK_TYPE_COUNT] = [
    "1", "2", "3", "4", "1 2", "3 4", "1 2 3", "2 3 4", "1 2 3 4", "1->2", "1->3", "1->4",
    "2->3", "2->4", "3->4", "1->3 2->4", "1->4 2->3", "1->2->3->4",
];

/// Parameter descriptors for the FM core.
pub static PARAMS: [ParamInfo; PARAM_COUNT] = [
    choice(*b"fmAlgo\0\0", "Algorithm", "FM", &ALGORITHM_VALUES, 0.0),
    stepped(*b"fmFreq1\0", "Operator 1 Frequency", "FM", 34.0, 4.0),
    double(*b"fmVol1\0\0", "Operator 1 Volume", "FM", 0.0, 1.0, 1.0),
    stepped(*b"fmFreq2\0", "Operator 2 Frequency", "FM", 34.0, 4.0),
    double(*b"fmVol2\0\0", "Operator 2 Volume", "FM", 0.0, 1.0, 0.0),
    stepped(*b"fmFreq3\0", "Operator 3 Frequency", "FM", 34.0, 4.0),
    double(*b"fmVol3\0\0", "Operator 3 Volume", "FM", 0.0, 1.0, 0.0),
    stepped(*b"fmFreq4\0", "Operator 4 Frequency", "FM", 34.0, 4.0),
    double(*b"fmVol4\0\0", "Operator 4 Volume", "FM", 0.0, 1.0, 0.0),
    choice(*b"fmFbType", "Feedback Type", "FM", &FEEDBACK_VALUES, 0.0),
    double(*b"fmFbVol\0", "Feedback Volume", "FM", 0.0, 1.0, 0.0),
];

#[derive(Debug, Clone, Copy)]
struct FreqRatio {
    mult: f64,
    hz_offset: f64,
    /// Entries with a negative sign run their oscillator backwards so
    /// they beat against the matching positive entry.
    amplitude_sign: f64,
}

const fn ratio(mult: f64) -> FreqRatio {
    FreqRatio {
        mult,
        hz_offset: 0.0,
        amplitude_sign: 1.0,
    }
}

const fn detuned(mult: f64, hz_offset: f64) -> FreqRatio {
    FreqRatio {
        mult,
        hz_offset,
        amplitude_sign: -1.0,
    }
}

static FREQ_RATIOS: [FreqRatio; FREQ_RATIO_COUNT] = [
    ratio(0.125),
    ratio(0.25),
    ratio(0.5),
    ratio(0.75),
    ratio(1.0),
    detuned(1.0, 1.5),
    ratio(2.0),
    detuned(2.0, -1.3),
    ratio(3.0),
    FreqRatio {
        mult: 3.5,
        hz_offset: -0.05,
        amplitude_sign: 1.0,
    },
    ratio(4.0),
    detuned(4.0, -2.4),
    ratio(5.0),
    ratio(6.0),
    ratio(7.0),
    ratio(8.0),
    ratio(9.0),
    ratio(10.0),
    ratio(11.0),
    ratio(12.0),
    ratio(13.0),
    ratio(14.0),
    ratio(15.0),
    ratio(16.0),
    ratio(17.0),
    ratio(18.0),
    ratio(19.0),
    ratio(20.0),
    detuned(20.0, -5.0),
    ratio(25.0),
    ratio(50.0),
    ratio(75.0),
    ratio(100.0),
    ratio(128.0),
    ratio(250.0),
];

#[derive(Debug, Clone, Copy)]
struct AlgorithmInfo {
    carrier_count: usize,
    /// For each operator, the operators summed into its phase.
    modulators: [&'static [usize]; OP_COUNT],
    /// Carrier whose pitch interval each operator follows.
    associated_carriers: [usize; OP_COUNT],
}

static ALGORITHMS: [AlgorithmInfo; ALGORITHM_COUNT] = [
    // 1 <- (2 3 4)
    AlgorithmInfo {
        carrier_count: 1,
        modulators: [&[1, 2, 3], &[], &[], &[]],
        associated_carriers: [0, 0, 0, 0],
    },
    // 1 <- (2 3 <- 4)
    AlgorithmInfo {
        carrier_count: 1,
        modulators: [&[1, 2], &[], &[3], &[]],
        associated_carriers: [0, 0, 0, 0],
    },
    // 1 <- 2 <- (3 4)
    AlgorithmInfo {
        carrier_count: 1,
        modulators: [&[1], &[2, 3], &[], &[]],
        associated_carriers: [0, 0, 0, 0],
    },
    // 1 <- (2 3) <- 4
    AlgorithmInfo {
        carrier_count: 1,
        modulators: [&[1, 2], &[3], &[3], &[]],
        associated_carriers: [0, 0, 0, 0],
    },
    // 1 <- 2 <- 3 <- 4
    AlgorithmInfo {
        carrier_count: 1,
        modulators: [&[1], &[2], &[3], &[]],
        associated_carriers: [0, 0, 0, 0],
    },
    // 1 <- 3  2 <- 4
    AlgorithmInfo {
        carrier_count: 2,
        modulators: [&[2], &[3], &[], &[]],
        associated_carriers: [0, 1, 0, 1],
    },
    // 1  2 <- (3 4)
    AlgorithmInfo {
        carrier_count: 2,
        modulators: [&[], &[2, 3], &[], &[]],
        associated_carriers: [0, 1, 1, 1],
    },
    // 1  2 <- 3 <- 4
    AlgorithmInfo {
        carrier_count: 2,
        modulators: [&[], &[2], &[3], &[]],
        associated_carriers: [0, 1, 1, 1],
    },
    // (1 2) <- 3 <- 4
    AlgorithmInfo {
        carrier_count: 2,
        modulators: [&[2], &[2], &[3], &[]],
        associated_carriers: [0, 1, 1, 1],
    },
    // (1 2) <- (3 4)
    AlgorithmInfo {
        carrier_count: 2,
        modulators: [&[2, 3], &[2, 3], &[], &[]],
        associated_carriers: [0, 1, 1, 1],
    },
    // 1  2  3 <- 4
    AlgorithmInfo {
        carrier_count: 3,
        modulators: [&[], &[], &[3], &[]],
        associated_carriers: [0, 1, 2, 2],
    },
    // (1 2 3) <- 4
    AlgorithmInfo {
        carrier_count: 3,
        modulators: [&[3], &[3], &[3], &[]],
        associated_carriers: [0, 1, 2, 2],
    },
    // 1  2  3  4
    AlgorithmInfo {
        carrier_count: 4,
        modulators: [&[], &[], &[], &[]],
        associated_carriers: [0, 1, 2, 3],
    },
];

#[derive(Debug, Clone, Copy)]
struct FeedbackEdge {
    from: usize,
    to: usize,
}

static FEEDBACKS: [&[FeedbackEdge]; FEEDBACK_TYPE_COUNT] = [
    &[FeedbackEdge { from: 0, to: 0 }],
    &[FeedbackEdge { from: 1, to: 1 }],
    &[FeedbackEdge { from: 2, to: 2 }],
    &[FeedbackEdge { from: 3, to: 3 }],
    &[
        FeedbackEdge { from: 0, to: 0 },
        FeedbackEdge { from: 1, to: 1 },
    ],
    &[
        FeedbackEdge { from: 2, to: 2 },
        FeedbackEdge { from: 3, to: 3 },
    ],
    &[
        FeedbackEdge { from: 0, to: 0 },
        FeedbackEdge { from: 1, to: 1 },
        FeedbackEdge { from: 2, to: 2 },
    ],
    &[
        FeedbackEdge { from: 1, to: 1 },
        FeedbackEdge { from: 2, to: 2 },
        FeedbackEdge { from: 3, to: 3 },
    ],
    &[
        FeedbackEdge { from: 0, to: 0 },
        FeedbackEdge { from: 1, to: 1 },
        FeedbackEdge { from: 2, to: 2 },
        FeedbackEdge { from: 3, to: 3 },
    ],
    &[FeedbackEdge { from: 0, to: 1 }],
    &[FeedbackEdge { from: 0, to: 2 }],
    &[FeedbackEdge { from: 0, to: 3 }],
    &[FeedbackEdge { from: 1, to: 2 }],
    &[FeedbackEdge { from: 1, to: 3 }],
    &[FeedbackEdge { from: 2, to: 3 }],
    &[
        FeedbackEdge { from: 0, to: 2 },
        FeedbackEdge { from: 1, to: 3 },
    ],
    &[
        FeedbackEdge { from: 0, to: 3 },
        FeedbackEdge { from: 1, to: 2 },
    ],
    &[
        FeedbackEdge { from: 0, to: 1 },
        FeedbackEdge { from: 1, to: 2 },
        FeedbackEdge { from: 2, to: 3 },
    ],
];

/// Carrier pitch intervals, in semitones, spreading chord voices.
static CARRIER_INTERVALS: [f64; OP_COUNT] = [0.0, 0.04, -0.073, 0.091];

fn operator_amplitude_curve(amplitude: f64) -> f64 {
    (16.0_f64.powf(amplitude) - 1.0) / 15.0
}

#[derive(Debug, Clone, Copy, Default)]
struct OpState {
    phase: f64,
    phase_delta: f64,
    expression: f64,
    output: f64,
}

#[derive(Debug, Clone, Copy, Default)]
struct FmVoice {
    ops: [OpState; OP_COUNT],
    feedback_amp: f64,
}

#[derive(Debug)]
pub(crate) struct FmCore {
    pub(crate) params: [f64; PARAM_COUNT],
    voices: [FmVoice; MAX_VOICES],
}

impl FmCore {
    pub(crate) fn new() -> Self {
        let mut params = [0.0; PARAM_COUNT];
        for (value, info) in params.iter_mut().zip(&PARAMS) {
            *value = info.default;
        }
        Self {
            params,
            voices: Default::default(),
        }
    }

    fn algorithm_index(&self) -> usize {
        (self.params[PARAM_ALGORITHM] as usize).min(ALGORITHM_COUNT - 1)
    }

    pub(crate) fn reset_voice(&mut self, slot: usize) {
        self.voices[slot] = Default::default();
    }

    pub(crate) fn tick_voice(
        &mut self,
        slot: usize,
        pitch: f64,
        envelopes: &EnvelopeComputer,
        sample_rate: f64,
    ) {
        let sample_len = 1.0 / sample_rate;
        let table_len = SINE_WAVE_LENGTH as f64;
        let algo = &ALGORITHMS[self.algorithm_index()];
        for op in 0..OP_COUNT {
            let ratio_index = (self.params[param_freq(op)] as usize).min(FREQ_RATIO_COUNT - 1);
            let ratio = FREQ_RATIOS[ratio_index];
            let associated = algo.associated_carriers[op];
            let freq_env = envelopes.end(ComputeIndex::operator_freq(op));
            let hz =
                key_to_hz(pitch + CARRIER_INTERVALS[associated]) * freq_env + ratio.hz_offset;
            let freq_mult = ratio.mult * ratio.amplitude_sign;

            let mut expression = operator_amplitude_curve(self.params[param_volume(op)])
                * envelopes.end(ComputeIndex::operator_amp(op));
            if op >= algo.carrier_count {
                expression *= table_len * 1.5;
            }

            let state = &mut self.voices[slot].ops[op];
            state.phase = util::f64::wrap(state.phase, table_len);
            state.phase_delta = hz * freq_mult * sample_len * table_len;
            state.expression = expression;
        }
        self.voices[slot].feedback_amp = 0.3
            * table_len
            * self.params[PARAM_FEEDBACK_VOLUME]
            * envelopes.end(ComputeIndex::FeedbackAmp);
    }

    pub(crate) fn render_voice(&mut self, slot: usize, output: &mut [f32]) {
        let algo = &ALGORITHMS[self.algorithm_index()];
        let feedback_index = (self.params[PARAM_FEEDBACK_TYPE] as usize)
            .min(FEEDBACK_TYPE_COUNT - 1);
        let feedback = FEEDBACKS[feedback_index];
        let voice = &mut self.voices[slot];

        for sample in output.iter_mut() {
            let mut outputs = [0.0; OP_COUNT];
            for i in (0..OP_COUNT).rev() {
                let mut phase_mix = voice.ops[i].phase;
                for &m in algo.modulators[i] {
                    phase_mix += outputs[m];
                }
                for edge in feedback {
                    if edge.to == i {
                        phase_mix += voice.feedback_amp * voice.ops[edge.from].output;
                    }
                }
                outputs[i] = sine_at(phase_mix) * voice.ops[i].expression;
            }
            let value: f64 = outputs[..algo.carrier_count].iter().sum();
            for (op, &out) in voice.ops.iter_mut().zip(&outputs) {
                op.output = out;
                op.phase += op.phase_delta;
            }
            *sample = value as f32;
        }
    }
}

#[cfg(test)]
mod tests;
