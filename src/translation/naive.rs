//! `PassthroughTranslator` — the one concrete `TranslatorBackend` shipped
//! with this crate. A real NMT/API-backed translator is an out-of-scope
//! collaborator (spec §1); this exists so `TranslationWorker` has something
//! real to drive end-to-end, mirroring `asr::FallbackAsrBackend`.

use crate::error::Result;
use crate::model::LanguageCode;

use super::TranslatorBackend;

pub struct PassthroughTranslator;

impl TranslatorBackend for PassthroughTranslator {
    fn initialize(&mut self) -> Result<()> {
        Ok(())
    }

    fn translate(&mut self, text: &str, _src: &LanguageCode, tgt: &LanguageCode) -> Result<(String, f32)> {
        Ok((format!("[{tgt}] {text}"), 0.5))
    }
}
