//! Validated pipeline configuration (spec §6).
//!
//! Mirrors the teacher's `EngineConfig`/`AppSettings::normalize()` pattern: a
//! plain struct with a `Default` impl and an explicit validation pass, rather
//! than a dynamic dict. `VOICETRANSLATE_*` environment variables override
//! matching fields; unrecognized override keys are logged and discarded.

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{CoreError, Result};
use crate::model::LanguageCode;

/// Backpressure / overflow policy for stage input queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    DropOldest,
    Reject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfig {
    // -- Audio --
    pub sample_rate: u32,
    pub chunk_ms: u32,

    // -- VAD --
    pub vad_threshold: f32,
    pub min_speech_duration_ms: u32,
    pub min_silence_duration_ms: u32,

    // -- Segmentation --
    pub padding_before_s: f64,
    pub padding_after_s: f64,
    pub min_segment_duration_s: f64,
    pub max_segment_duration_s: f64,
    pub merge_gap_threshold_s: f64,

    // -- ASR --
    pub asr_backend: AsrBackendChoice,
    pub asr_compute_type: ComputePrecision,
    pub asr_draft_compute_type: ComputePrecision,
    pub asr_beam_size: u32,
    pub asr_draft_beam_size: u32,
    pub asr_draft_interval_ms: u32,

    // -- Translation --
    pub translation_tier: TranslationTier,
    pub sov_languages: HashSet<LanguageCode>,
    pub require_verbs_svo: bool,
    pub min_draft_length: usize,
    pub stability_threshold: f32,
    pub max_history_segments: usize,

    // -- Adaptive / targets --
    pub max_queue_depth: usize,
    pub pause_skip_threshold_ms: u32,
    pub target_ttft_ms: u32,
    pub target_meaning_latency_ms: u32,
    pub target_ear_voice_lag_ms: u32,

    // -- Backpressure --
    pub drop_on_overflow: bool,

    // -- Privacy --
    pub enable_audio_logging: bool,
    pub audio_retention_hours: u32,
    pub local_only: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AsrBackendChoice {
    Auto,
    OpenVino,
    CoreMl,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComputePrecision {
    Int8,
    Int8Float16,
    Float16,
    Float32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranslationTier {
    Fast,
    Balanced,
    Accurate,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let sov_languages = ["ja", "ko", "de", "tr", "hi", "fa"]
            .iter()
            .map(|s| LanguageCode::new(*s))
            .collect();

        Self {
            sample_rate: 16_000,
            chunk_ms: 20,

            vad_threshold: 0.5,
            min_speech_duration_ms: 100,
            min_silence_duration_ms: 300,

            padding_before_s: 0.3,
            padding_after_s: 0.3,
            min_segment_duration_s: 0.5,
            max_segment_duration_s: 30.0,
            merge_gap_threshold_s: 0.5,

            asr_backend: AsrBackendChoice::Auto,
            asr_compute_type: ComputePrecision::Float16,
            asr_draft_compute_type: ComputePrecision::Int8,
            asr_beam_size: 5,
            asr_draft_beam_size: 1,
            asr_draft_interval_ms: 500,

            translation_tier: TranslationTier::Balanced,
            sov_languages,
            require_verbs_svo: false,
            min_draft_length: 2,
            stability_threshold: 0.4,
            max_history_segments: 20,

            max_queue_depth: 8,
            pause_skip_threshold_ms: 2_000,
            target_ttft_ms: 2_000,
            target_meaning_latency_ms: 2_500,
            target_ear_voice_lag_ms: 500,

            drop_on_overflow: true,

            enable_audio_logging: false,
            audio_retention_hours: 0,
            local_only: true,
        }
    }
}

impl PipelineConfig {
    /// Validate this configuration, returning `ConfigInvalid` on the first
    /// out-of-range field found.
    pub fn validate(&self) -> Result<()> {
        if ![10, 20, 30].contains(&self.chunk_ms) {
            return Err(CoreError::ConfigInvalid(format!(
                "chunk_ms must be 10/20/30 for VAD, got {}",
                self.chunk_ms
            )));
        }
        if !(0.0..=1.0).contains(&self.vad_threshold) {
            return Err(CoreError::ConfigInvalid(
                "vad_threshold must be in [0,1]".into(),
            ));
        }
        if self.min_segment_duration_s <= 0.0 {
            return Err(CoreError::ConfigInvalid(
                "min_segment_duration_s must be positive".into(),
            ));
        }
        if self.max_segment_duration_s <= self.min_segment_duration_s {
            return Err(CoreError::ConfigInvalid(
                "max_segment_duration_s must exceed min_segment_duration_s".into(),
            ));
        }
        if self.merge_gap_threshold_s < 0.0 {
            return Err(CoreError::ConfigInvalid(
                "merge_gap_threshold_s cannot be negative".into(),
            ));
        }
        if self.max_queue_depth == 0 {
            return Err(CoreError::ConfigInvalid(
                "max_queue_depth must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.stability_threshold) {
            return Err(CoreError::ConfigInvalid(
                "stability_threshold must be in [0,1]".into(),
            ));
        }
        if self.sample_rate == 0 {
            return Err(CoreError::ConfigInvalid(
                "sample_rate must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn min_speech_duration(&self) -> Duration {
        Duration::from_millis(self.min_speech_duration_ms as u64)
    }

    pub fn min_silence_duration(&self) -> Duration {
        Duration::from_millis(self.min_silence_duration_ms as u64)
    }

    pub fn min_speech_frames(&self) -> u32 {
        (self.min_speech_duration_ms / self.chunk_ms).max(1)
    }

    pub fn min_silence_frames(&self) -> u32 {
        (self.min_silence_duration_ms / self.chunk_ms).max(1)
    }

    pub fn overflow_policy(&self) -> OverflowPolicy {
        if self.drop_on_overflow {
            OverflowPolicy::DropOldest
        } else {
            OverflowPolicy::Reject
        }
    }

    /// Apply `VOICETRANSLATE_*` environment variable overrides in place.
    ///
    /// Only the fields enumerated in spec §6 are recognized; anything else
    /// found under the prefix is logged and ignored.
    pub fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            let Some(field) = key.strip_prefix("VOICETRANSLATE_") else {
                continue;
            };
            self.apply_one_override(field, &value);
        }
    }

    fn apply_one_override(&mut self, field: &str, value: &str) {
        macro_rules! parse_or_warn {
            ($target:expr) => {
                match value.parse() {
                    Ok(parsed) => $target = parsed,
                    Err(_) => warn!(field, value, "could not parse env override"),
                }
            };
        }
        match field {
            "SAMPLE_RATE" => parse_or_warn!(self.sample_rate),
            "CHUNK_MS" => parse_or_warn!(self.chunk_ms),
            "VAD_THRESHOLD" => parse_or_warn!(self.vad_threshold),
            "MIN_SEGMENT_DURATION_S" => parse_or_warn!(self.min_segment_duration_s),
            "MAX_SEGMENT_DURATION_S" => parse_or_warn!(self.max_segment_duration_s),
            "MERGE_GAP_THRESHOLD_S" => parse_or_warn!(self.merge_gap_threshold_s),
            "MAX_QUEUE_DEPTH" => parse_or_warn!(self.max_queue_depth),
            "DROP_ON_OVERFLOW" => parse_or_warn!(self.drop_on_overflow),
            "TARGET_TTFT_MS" => parse_or_warn!(self.target_ttft_ms),
            "LOCAL_ONLY" => parse_or_warn!(self.local_only),
            other => {
                warn!(field = other, "unknown VOICETRANSLATE_* override, ignoring");
            }
        }
    }
}
