//! `Translation` and the consumer-facing `EmittedResult`.

use super::language::LanguageCode;
use uuid::Uuid;

/// Output of the `TranslationWorker` for one `Transcript`.
#[derive(Debug, Clone)]
pub struct Translation {
    pub segment_id: Uuid,
    pub source_text: String,
    pub translated_text: String,
    pub src: LanguageCode,
    pub tgt: LanguageCode,
    pub confidence: f32,
    pub is_final: bool,
    pub sequence: u64,
}

/// The consumer-facing record, released by the emission gate in strictly
/// non-decreasing `sequence` order per segment.
#[derive(Debug, Clone)]
pub struct EmittedResult {
    pub timestamp: std::time::SystemTime,
    pub source_text: String,
    pub translated_text: String,
    pub src_lang: LanguageCode,
    pub tgt_lang: LanguageCode,
    pub confidence: f32,
    pub processing_time_ms: f64,
    pub is_final: bool,
}

impl EmittedResult {
    pub fn from_translation(t: &Translation, processing_time_ms: f64) -> Self {
        Self {
            timestamp: std::time::SystemTime::now(),
            source_text: t.source_text.clone(),
            translated_text: t.translated_text.clone(),
            src_lang: t.src.clone(),
            tgt_lang: t.tgt.clone(),
            confidence: t.confidence,
            processing_time_ms,
            is_final: t.is_final,
        }
    }
}
