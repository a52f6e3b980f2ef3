//! `VadEngine` — stateful, single-stream hysteretic voice-activity detector
//! (spec §4.C).
//!
//! The hysteresis state machine is the stable contract; the probability
//! source underneath it is a pluggable `SpeechProbabilityModel` (Open
//! Question 2's resolution — one VAD contract, swappable probability
//! source). `EnergyProbabilityModel` is grounded in the teacher's
//! `vad::energy::EnergyVad`; `probability` submodule also ships a stub
//! neural-shaped model mirroring the teacher's `SileroVad` surface without
//! the ONNX dependency.

pub mod probability;

pub use probability::{EnergyProbabilityModel, SpeechProbabilityModel, StubNeuralProbabilityModel};

use crate::model::{Frame, SpeechProbability, VadDecision};

/// Hysteretic VAD. One instance per audio stream; not `Send + Sync` shared
/// across streams — each stream owns its own `VadEngine`.
pub struct VadEngine {
    model: Box<dyn SpeechProbabilityModel>,
    threshold: f32,
    min_speech_frames: u32,
    min_silence_frames: u32,
    state: VadDecision,
    consecutive_speech: u32,
    consecutive_silence: u32,
}

impl VadEngine {
    pub fn new(
        model: Box<dyn SpeechProbabilityModel>,
        threshold: f32,
        min_speech_frames: u32,
        min_silence_frames: u32,
    ) -> Self {
        Self {
            model,
            threshold,
            min_speech_frames: min_speech_frames.max(1),
            min_silence_frames: min_silence_frames.max(1),
            state: VadDecision::Silence,
            consecutive_speech: 0,
            consecutive_silence: 0,
        }
    }

    pub fn state(&self) -> VadDecision {
        self.state
    }

    /// Process one frame, returning the per-frame probability and advancing
    /// the hysteresis state machine per spec §4.C's transition table.
    pub fn process(&mut self, frame: &Frame) -> SpeechProbability {
        let prob = self.model.probability(frame);
        let above = prob >= self.threshold;

        if above {
            self.consecutive_speech += 1;
            self.consecutive_silence = 0;
        } else {
            self.consecutive_silence += 1;
            self.consecutive_speech = 0;
        }

        self.state = match self.state {
            VadDecision::Silence => {
                if above {
                    VadDecision::Starting
                } else {
                    VadDecision::Silence
                }
            }
            VadDecision::Starting => {
                if !above {
                    VadDecision::Silence
                } else if self.consecutive_speech >= self.min_speech_frames {
                    VadDecision::Speech
                } else {
                    VadDecision::Starting
                }
            }
            VadDecision::Speech => {
                if above {
                    VadDecision::Speech
                } else {
                    VadDecision::Ending
                }
            }
            VadDecision::Ending => {
                if above {
                    VadDecision::Speech
                } else if self.consecutive_silence >= self.min_silence_frames {
                    VadDecision::Silence
                } else {
                    VadDecision::Ending
                }
            }
        };

        SpeechProbability::new(prob, self.state.is_speech_like())
    }

    /// Return to `Silence` and clear counters, discarding anything buffered
    /// by the probability model.
    pub fn reset(&mut self) {
        self.state = VadDecision::Silence;
        self.consecutive_speech = 0;
        self.consecutive_silence = 0;
        self.model.reset();
    }

    /// Force whatever is in progress to finalize (transition straight to
    /// `Silence`), then reset — used when capture halts mid-utterance.
    pub fn force_finalize(&mut self) -> VadDecision {
        let was = self.state;
        self.reset();
        was
    }
}


#[cfg(test)]
mod invariant_properties {
    use super::*;
    use proptest::prelude::*;
    use std::time::Instant;

    fn frame_with_prob(prob: f32) -> Frame {
        let amplitude = (prob * i16::MAX as f32) as i16;
        Frame::new(vec![amplitude; 160], 16_000, Instant::now())
    }

    struct ScriptedModel {
        probs: Vec<f32>,
        idx: usize,
    }

    impl SpeechProbabilityModel for ScriptedModel {
        fn probability(&mut self, _frame: &Frame) -> f32 {
            let p = self.probs.get(self.idx).copied().unwrap_or(0.0);
            self.idx += 1;
            p
        }
        fn reset(&mut self) {}
    }

    proptest! {
        /// Invariant §8.7: for any sequence of above/below-threshold frames,
        /// the VAD never reports `Speech` without having first seen at least
        /// `min_speech_frames` consecutive above-threshold frames, and never
        /// commits `Ending -> Silence` without at least `min_silence_frames`
        /// consecutive below-threshold frames.
        #[test]
        fn vad_latch_honors_min_frame_counts(
            above_flags in prop::collection::vec(any::<bool>(), 1..60),
            min_speech in 1u32..6,
            min_silence in 1u32..6,
        ) {
            let probs: Vec<f32> = above_flags.iter().map(|&b| if b { 0.9 } else { 0.1 }).collect();
            let model = Box::new(ScriptedModel { probs, idx: 0 });
            let mut engine = VadEngine::new(model, 0.5, min_speech, min_silence);

            let mut run_above = 0u32;
            let mut run_below = 0u32;
            let mut prev_state = VadDecision::Silence;

            for &above in &above_flags {
                let f = frame_with_prob(if above { 0.9 } else { 0.1 });
                engine.process(&f);
                let state = engine.state();

                if above {
                    run_above += 1;
                    run_below = 0;
                } else {
                    run_below += 1;
                    run_above = 0;
                }

                if state == VadDecision::Speech && prev_state == VadDecision::Starting {
                    prop_assert!(run_above >= min_speech);
                }
                if state == VadDecision::Silence && prev_state == VadDecision::Ending {
                    prop_assert!(run_below >= min_silence);
                }

                prev_state = state;
            }
        }
    }
}
