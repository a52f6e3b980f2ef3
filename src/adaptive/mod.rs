//! `AdaptiveController` — observes queue depth and ASR/translation behavior,
//! outputs scheduling hints to `AsrWorker`/`TranslationWorker` and a
//! finalization-push signal to `Segmenter` (spec §4.H).
//!
//! Draft stability resolves Open Question 4 as documented in DESIGN.md:
//! "fraction of draft tokens unchanged between successive drafts for the
//! same segment_id" — a pure token-diff metric.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use uuid::Uuid;

/// Draft admission decision inputs for one candidate draft.
pub struct DraftCandidate {
    pub confidence: f32,
    pub token_count: usize,
    pub pause_duration_ms: u32,
}

pub struct AdaptiveController {
    min_draft_interval_ms: u32,
    max_draft_interval_ms: u32,
    max_queue_depth: usize,
    stability_threshold: f32,
    min_draft_length: usize,
    pause_skip_threshold_ms: u32,

    min_segment_duration_s: f64,
    nominal_max_segment_duration_s: f64,
    current_max_segment_duration_s: f64,
    finalization_pushed: bool,
    idle_since: Option<Instant>,
    idle_restore_after: Duration,

    current_draft_interval_ms: u32,
    last_draft_tokens: HashMap<Uuid, Vec<String>>,
}

impl AdaptiveController {
    pub fn new(
        min_draft_interval_ms: u32,
        max_draft_interval_ms: u32,
        max_queue_depth: usize,
        stability_threshold: f32,
        min_draft_length: usize,
        pause_skip_threshold_ms: u32,
        min_segment_duration_s: f64,
        nominal_max_segment_duration_s: f64,
    ) -> Self {
        Self {
            min_draft_interval_ms,
            max_draft_interval_ms,
            max_queue_depth,
            stability_threshold,
            min_draft_length,
            pause_skip_threshold_ms,
            min_segment_duration_s,
            nominal_max_segment_duration_s,
            current_max_segment_duration_s: nominal_max_segment_duration_s,
            finalization_pushed: false,
            idle_since: None,
            idle_restore_after: Duration::from_secs(10),
            current_draft_interval_ms: min_draft_interval_ms,
            last_draft_tokens: HashMap::new(),
        }
    }

    /// Recompute the draft interval from the deepest observed downstream
    /// queue depth, clamped to `[min, max]`.
    pub fn update_draft_interval(&mut self, asr_queue_depth: usize, translation_queue_depth: usize) -> u32 {
        let deepest = asr_queue_depth.max(translation_queue_depth);
        self.current_draft_interval_ms = if deepest > self.max_queue_depth {
            self.max_draft_interval_ms
        } else {
            self.min_draft_interval_ms
        }
        .clamp(self.min_draft_interval_ms, self.max_draft_interval_ms);
        self.current_draft_interval_ms
    }

    pub fn draft_interval_ms(&self) -> u32 {
        self.current_draft_interval_ms
    }

    /// Draft admission gate: suppress drafts below confidence/length
    /// thresholds or originating from an overlong pause.
    pub fn admit_draft(&self, candidate: &DraftCandidate) -> bool {
        if candidate.confidence < self.stability_threshold {
            return false;
        }
        if candidate.token_count < self.min_draft_length {
            return false;
        }
        if candidate.pause_duration_ms > self.pause_skip_threshold_ms {
            return false;
        }
        true
    }

    /// Fraction of draft tokens unchanged between successive drafts for the
    /// same `segment_id`; `1.0` for a segment's first draft (no prior to
    /// compare against, treated as fully "stable").
    pub fn draft_stability(&mut self, segment_id: Uuid, draft_text: &str) -> f32 {
        let tokens: Vec<String> = draft_text.split_whitespace().map(str::to_string).collect();
        let stability = match self.last_draft_tokens.get(&segment_id) {
            None => 1.0,
            Some(prev) => {
                if prev.is_empty() && tokens.is_empty() {
                    1.0
                } else {
                    let unchanged = prev.iter().zip(tokens.iter()).take_while(|(a, b)| a == b).count();
                    let denom = prev.len().max(tokens.len()).max(1);
                    unchanged as f32 / denom as f32
                }
            }
        };
        self.last_draft_tokens.insert(segment_id, tokens);
        stability
    }

    pub fn forget_segment(&mut self, segment_id: Uuid) {
        self.last_draft_tokens.remove(&segment_id);
    }

    /// Finalization push: on sustained saturation, shrink
    /// `max_segment_duration` by 25% (floored at `min_segment_duration * 2`);
    /// restore it once idle for `idle_restore_after`. Returns the duration
    /// the `Segmenter` should be set to, if it changed.
    pub fn evaluate_finalization_push(&mut self, queue_saturated: bool, now: Instant) -> Option<f64> {
        if queue_saturated {
            self.idle_since = None;
            if !self.finalization_pushed {
                let floor = self.min_segment_duration_s * 2.0;
                let pushed = (self.current_max_segment_duration_s * 0.75).max(floor);
                self.current_max_segment_duration_s = pushed;
                self.finalization_pushed = true;
                return Some(pushed);
            }
            None
        } else {
            if !self.finalization_pushed {
                return None;
            }
            let idle_start = *self.idle_since.get_or_insert(now);
            if now.saturating_duration_since(idle_start) >= self.idle_restore_after {
                self.current_max_segment_duration_s = self.nominal_max_segment_duration_s;
                self.finalization_pushed = false;
                self.idle_since = None;
                return Some(self.current_max_segment_duration_s);
            }
            None
        }
    }

    pub fn current_max_segment_duration(&self) -> f64 {
        self.current_max_segment_duration_s
    }
}
