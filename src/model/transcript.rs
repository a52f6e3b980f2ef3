//! `Transcript` — ASR output for a `SpeechSegment`.

use super::language::LanguageCode;
use uuid::Uuid;

/// One ASR output event for a segment: a draft (`is_final = false`) or the
/// single committed final.
///
/// Invariants (enforced by `asr::AsrWorker`, not by this type): exactly one
/// `is_final = true` transcript per `segment_id`; every draft for a segment
/// arrives before its final with a strictly greater `sequence`.
#[derive(Debug, Clone)]
pub struct Transcript {
    pub segment_id: Uuid,
    pub text: String,
    pub language: LanguageCode,
    pub confidence: f32,
    pub is_final: bool,
    pub sequence: u64,
}
