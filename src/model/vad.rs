//! VAD-related data model: per-frame probability and the hysteretic state.

use serde::{Deserialize, Serialize};

/// Per-frame speech probability and the hysteretic decision derived from it.
///
/// `is_speech` is the hysteretic decision (see `VadEngine`), **not**
/// `prob > threshold` — a single loud frame does not flip the state machine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeechProbability {
    pub prob: f32,
    pub is_speech: bool,
}

impl SpeechProbability {
    pub fn new(prob: f32, is_speech: bool) -> Self {
        debug_assert!((0.0..=1.0).contains(&prob), "prob out of [0,1]: {prob}");
        Self { prob, is_speech }
    }
}

/// The `VadEngine`'s internal state, driven by consecutive-frame counters.
///
/// Initial state is `Silence`. See `vad::VadEngine` for the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VadDecision {
    Silence,
    Starting,
    Speech,
    Ending,
}

impl VadDecision {
    pub fn is_speech_like(self) -> bool {
        matches!(self, VadDecision::Speech | VadDecision::Ending)
    }
}

impl Default for VadDecision {
    fn default() -> Self {
        VadDecision::Silence
    }
}
