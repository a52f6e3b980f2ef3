//! `FallbackAsrBackend` — the one concrete `AsrBackend` shipped with this
//! crate. A real speech model is an out-of-scope collaborator (spec §1); this
//! backend exists so `AsrWorker` and its probing logic have something real to
//! drive end-to-end, mirroring `vad::probability::StubNeuralProbabilityModel`.
//!
//! It estimates a rough "word count" from segment duration at an assumed
//! speaking rate and emits a single placeholder draft followed by a final —
//! enough to exercise sequencing, precision selection, and language echoing
//! without pretending to do real speech recognition.

use crate::config::ComputePrecision;
use crate::error::Result;
use crate::model::{LanguageCode, SpeechSegment, Transcript};

use super::AsrBackend;

const ASSUMED_WORDS_PER_SECOND: f64 = 2.5;

pub struct FallbackAsrBackend {
    forced_language: Option<LanguageCode>,
}

impl FallbackAsrBackend {
    pub fn new(forced_language: Option<LanguageCode>) -> Self {
        Self { forced_language }
    }
}

impl AsrBackend for FallbackAsrBackend {
    fn initialize(&mut self) -> Result<()> {
        Ok(())
    }

    fn forced_language(&self) -> Option<LanguageCode> {
        self.forced_language.clone()
    }

    fn transcribe(
        &mut self,
        segment: &SpeechSegment,
        _draft_precision: ComputePrecision,
        _final_precision: ComputePrecision,
    ) -> Result<Vec<Transcript>> {
        let word_count = ((segment.duration() * ASSUMED_WORDS_PER_SECOND).round() as usize).max(1);
        let placeholder: String = (0..word_count).map(|_| "word").collect::<Vec<_>>().join(" ");
        let language = self
            .forced_language
            .clone()
            .unwrap_or_else(|| LanguageCode::new("en"));

        let draft = Transcript {
            segment_id: segment.id,
            text: placeholder.clone(),
            language: language.clone(),
            confidence: segment.vad_confidence * 0.8,
            is_final: false,
            sequence: 0,
        };
        let finalized = Transcript {
            segment_id: segment.id,
            text: placeholder,
            language,
            confidence: segment.vad_confidence,
            is_final: true,
            sequence: 0,
        };
        Ok(vec![draft, finalized])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn segment(duration: f64) -> SpeechSegment {
        let sample_rate = 16_000;
        let n = (duration * sample_rate as f64) as usize;
        SpeechSegment {
            id: Uuid::new_v4(),
            start_ts: 0.0,
            end_ts: duration,
            pcm: vec![0; n],
            sample_rate,
            vad_confidence: 0.9,
        }
    }

    #[test]
    fn emits_one_draft_then_one_final() {
        let mut backend = FallbackAsrBackend::new(None);
        let out = backend
            .transcribe(&segment(2.0), ComputePrecision::Int8, ComputePrecision::Float16)
            .unwrap();
        assert_eq!(out.len(), 2);
        assert!(!out[0].is_final);
        assert!(out[1].is_final);
    }

    #[test]
    fn forced_language_is_echoed() {
        let mut backend = FallbackAsrBackend::new(Some(LanguageCode::new("ja")));
        let out = backend
            .transcribe(&segment(1.0), ComputePrecision::Int8, ComputePrecision::Float16)
            .unwrap();
        assert!(out.iter().all(|t| t.language == LanguageCode::new("ja")));
    }
}
