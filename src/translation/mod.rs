//! `TranslationWorker` — the in-pipeline translation stage plus its
//! `TranslatorBackend` collaborator contract (spec §4.G).
//!
//! SOV-language terminal-clause gating, suffix-diff draft chaining, and the
//! sequence-ordered emission gate (`gate::EmissionGate`) are implemented
//! here. Grounded in `original_source/voice_translation/src/translation/base.py`'s
//! `BaseTranslator`/`TranslationResult` shape, generalized to streaming
//! draft/final semantics that the original's batch-oriented interface didn't
//! need.

pub mod gate;
pub mod naive;

use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::Result;
use crate::model::{LanguageCode, Transcript, Translation};

pub use gate::EmissionGate;
pub use naive::PassthroughTranslator;

/// Collaborator contract for a concrete translation engine (spec §4.G, §6).
pub trait TranslatorBackend: Send {
    fn initialize(&mut self) -> Result<()>;

    /// Translate `text` from `src` to `tgt`, returning the translated text and
    /// a confidence in `[0, 1]`.
    fn translate(&mut self, text: &str, src: &LanguageCode, tgt: &LanguageCode) -> Result<(String, f32)>;
}

fn is_terminal_clause(text: &str) -> bool {
    text.trim_end()
        .ends_with(|c: char| matches!(c, '.' | '!' | '?' | '…' | '。' | '!' | '?'))
}

fn longest_common_prefix_len(a: &str, b: &str) -> usize {
    a.chars()
        .zip(b.chars())
        .take_while(|(x, y)| x == y)
        .count()
}

/// The draft surfaced to the emission layer: either the full translated text
/// or, when it's a pure suffix extension of the previous draft for the same
/// segment, just the appended diff (spec §4.G "Deduplication/chaining").
#[derive(Debug, Clone)]
pub struct DraftSurface {
    pub translation: Translation,
    pub diff_suffix: Option<String>,
}

/// In-pipeline translation stage. One instance per stream; owns the pinned
/// backend, per-segment draft-chaining state, and a bounded final history.
pub struct TranslationWorker {
    backend: Box<dyn TranslatorBackend>,
    sov_languages: HashSet<LanguageCode>,
    max_history_segments: usize,
    last_draft_text: HashMap<uuid::Uuid, String>,
    final_history: VecDeque<Translation>,
}

impl TranslationWorker {
    pub fn new(
        backend: Box<dyn TranslatorBackend>,
        sov_languages: HashSet<LanguageCode>,
        max_history_segments: usize,
    ) -> Self {
        Self {
            backend,
            sov_languages,
            max_history_segments: max_history_segments.max(1),
            last_draft_text: HashMap::new(),
            final_history: VecDeque::new(),
        }
    }

    pub fn recent_finals(&self) -> &VecDeque<Translation> {
        &self.final_history
    }

    /// Translate one ASR transcript, applying SOV terminal-clause gating and
    /// suffix-diff chaining for drafts.
    pub fn translate(
        &mut self,
        transcript: &Transcript,
        tgt: &LanguageCode,
    ) -> Result<DraftSurface> {
        let (translated_text, confidence) =
            self.backend.translate(&transcript.text, &transcript.language, tgt)?;

        let is_final = if self.sov_languages.contains(tgt) {
            transcript.is_final || is_terminal_clause(&transcript.text)
        } else {
            transcript.is_final
        };

        let translation = Translation {
            segment_id: transcript.segment_id,
            source_text: transcript.text.clone(),
            translated_text: translated_text.clone(),
            src: transcript.language.clone(),
            tgt: tgt.clone(),
            confidence,
            is_final,
            sequence: transcript.sequence,
        };

        let diff_suffix = if is_final {
            self.last_draft_text.remove(&transcript.segment_id);
            self.push_final(translation.clone());
            None
        } else {
            let diff = match self.last_draft_text.get(&transcript.segment_id) {
                Some(prev) if translated_text.starts_with(prev.as_str()) => {
                    Some(translated_text[prev.len()..].to_string())
                }
                Some(prev) => {
                    // Diverged earlier than a pure suffix extension; only a
                    // shared-prefix check to decide whether this is worth
                    // calling a "chain" at all (spec: "if it diverges
                    // earlier, the entire draft is re-emitted").
                    let _ = longest_common_prefix_len(prev, &translated_text);
                    None
                }
                None => None,
            };
            self.last_draft_text
                .insert(transcript.segment_id, translated_text);
            diff
        };

        Ok(DraftSurface {
            translation,
            diff_suffix,
        })
    }

    fn push_final(&mut self, translation: Translation) {
        self.final_history.push_back(translation);
        while self.final_history.len() > self.max_history_segments {
            self.final_history.pop_front();
        }
    }
}
