//! `AsrWorker` — the in-pipeline ASR stage plus its `AsrBackend` collaborator
//! contract (spec §4.F, §6).
//!
//! Backend selection and compute precision reuse `config::AsrBackendChoice`/
//! `config::ComputePrecision` rather than redeclaring them here. Concrete
//! OpenVino/CoreML backends are out-of-scope collaborators per spec §1;
//! `fallback::FallbackAsrBackend` is the only real implementation shipped,
//! mirroring the way `vad::probability` ships a stub neural model instead of
//! an ONNX runtime.

pub mod fallback;

use std::collections::HashMap;

use tracing::warn;
use uuid::Uuid;

use crate::config::{AsrBackendChoice, ComputePrecision};
use crate::error::{CoreError, Result};
use crate::model::{LanguageCode, SpeechSegment, Transcript};

pub use fallback::FallbackAsrBackend;

/// Collaborator contract for a concrete ASR engine (spec §4.F).
///
/// `transcribe` receives a complete `SpeechSegment` and returns zero or more
/// drafts followed by exactly one final transcript, in emission order.
/// `AsrWorker` enforces the exactly-one-final and strictly-increasing-sequence
/// invariants on top of whatever the backend returns, since backends are
/// third-party and may not uphold them perfectly.
pub trait AsrBackend: Send {
    /// One-time setup; called during backend probing. A backend that cannot
    /// initialize (missing runtime, no compatible hardware) returns `Err` so
    /// the next candidate in the probe order is tried.
    fn initialize(&mut self) -> Result<()>;

    /// Forced source language, if the backend was pinned to one; `None` means
    /// the backend performs language identification itself.
    fn forced_language(&self) -> Option<LanguageCode> {
        None
    }

    fn transcribe(
        &mut self,
        segment: &SpeechSegment,
        draft_precision: ComputePrecision,
        final_precision: ComputePrecision,
    ) -> Result<Vec<Transcript>>;
}

type BackendFactory = Box<dyn Fn() -> Box<dyn AsrBackend>>;

/// Probe backends in the documented order (`openvino, coreml, fallback`) and
/// pin the first one whose `initialize` succeeds for the pipeline's lifetime.
/// `factories` need only contain entries for backends actually compiled in;
/// a requested-but-absent backend is simply skipped.
pub fn probe_and_pin(
    choice: AsrBackendChoice,
    factories: Vec<(AsrBackendChoice, BackendFactory)>,
) -> Result<(AsrBackendChoice, Box<dyn AsrBackend>)> {
    let order: Vec<AsrBackendChoice> = if choice == AsrBackendChoice::Auto {
        vec![
            AsrBackendChoice::OpenVino,
            AsrBackendChoice::CoreMl,
            AsrBackendChoice::Fallback,
        ]
    } else {
        vec![choice]
    };

    for candidate in order {
        let Some((_, factory)) = factories.iter().find(|(c, _)| *c == candidate) else {
            continue;
        };
        let mut backend = factory();
        match backend.initialize() {
            Ok(()) => return Ok((candidate, backend)),
            Err(e) => {
                warn!(?candidate, error = %e, "ASR backend failed to initialize, trying next");
            }
        }
    }

    Err(CoreError::Stage {
        stage: "asr",
        source: anyhow::anyhow!("no ASR backend in {choice:?} probe order could be initialized"),
    })
}

#[derive(Debug, Default)]
struct SegmentAsrState {
    next_sequence: u64,
    finalized: bool,
}

/// In-pipeline ASR stage. Owns the pinned backend and enforces the
/// per-segment invariants from spec §4.F on top of whatever it returns.
pub struct AsrWorker {
    backend: Box<dyn AsrBackend>,
    backend_choice: AsrBackendChoice,
    draft_precision: ComputePrecision,
    final_precision: ComputePrecision,
    segments: HashMap<Uuid, SegmentAsrState>,
}

impl AsrWorker {
    pub fn new(
        backend_choice: AsrBackendChoice,
        backend: Box<dyn AsrBackend>,
        draft_precision: ComputePrecision,
        final_precision: ComputePrecision,
    ) -> Self {
        Self {
            backend,
            backend_choice,
            draft_precision,
            final_precision,
            segments: HashMap::new(),
        }
    }

    pub fn backend_choice(&self) -> AsrBackendChoice {
        self.backend_choice
    }

    /// Transcribe `segment`, returning transcripts with corrected, strictly
    /// increasing `sequence` numbers and exactly one `is_final = true` entry
    /// (synthesized from the last draft if the backend omitted it, logged
    /// when that happens — backends are not trusted to self-enforce this).
    pub fn transcribe(&mut self, segment: &SpeechSegment) -> Result<Vec<Transcript>> {
        let mut raw = self
            .backend
            .transcribe(segment, self.draft_precision, self.final_precision)?;

        if raw.is_empty() {
            return Err(CoreError::Stage {
                stage: "asr",
                source: anyhow::anyhow!("backend returned no transcripts for segment {}", segment.id),
            });
        }

        let state = self.segments.entry(segment.id).or_default();
        if state.finalized {
            warn!(segment_id = %segment.id, "asr backend invoked again after segment already finalized");
            return Ok(Vec::new());
        }

        let final_count = raw.iter().filter(|t| t.is_final).count();
        if final_count > 1 {
            warn!(
                segment_id = %segment.id,
                final_count,
                "backend returned more than one final transcript, keeping only the first"
            );
            let mut seen_final = false;
            raw.retain(|t| {
                if !t.is_final {
                    return true;
                }
                if seen_final {
                    false
                } else {
                    seen_final = true;
                    true
                }
            });
        } else if final_count == 0 {
            warn!(segment_id = %segment.id, "backend returned no final transcript, synthesizing one from the last draft");
            let synthesized = raw.last().cloned().map(|mut t| {
                t.is_final = true;
                t
            });
            if let Some(t) = synthesized {
                raw.push(t);
            }
        }

        for transcript in &mut raw {
            transcript.sequence = state.next_sequence;
            state.next_sequence += 1;
            if let Some(forced) = self.backend.forced_language() {
                transcript.language = forced;
            }
        }

        if raw.iter().any(|t| t.is_final) {
            state.finalized = true;
        }

        Ok(raw)
    }

    /// Forget per-segment state for segments the pipeline has fully drained,
    /// bounding the table's growth over a long session.
    pub fn forget_segment(&mut self, segment_id: Uuid) {
        self.segments.remove(&segment_id);
    }
}


#[cfg(test)]
mod invariant_properties {
    use super::*;
    use proptest::prelude::*;
    use uuid::Uuid as UuidT;

    fn segment() -> SpeechSegment {
        SpeechSegment {
            id: UuidT::new_v4(),
            start_ts: 0.0,
            end_ts: 1.0,
            pcm: vec![0; 16_000],
            sample_rate: 16_000,
            vad_confidence: 0.9,
        }
    }

    fn transcript(text: &str, is_final: bool) -> Transcript {
        Transcript {
            segment_id: UuidT::nil(),
            text: text.to_string(),
            language: LanguageCode::new("en"),
            confidence: 0.9,
            is_final,
            sequence: 0,
        }
    }

    struct ScriptedBackend {
        outputs: Vec<Transcript>,
    }

    impl AsrBackend for ScriptedBackend {
        fn initialize(&mut self) -> Result<()> {
            Ok(())
        }

        fn transcribe(
            &mut self,
            _segment: &SpeechSegment,
            _draft: ComputePrecision,
            _final: ComputePrecision,
        ) -> Result<Vec<Transcript>> {
            Ok(self.outputs.clone())
        }
    }

    proptest! {
        /// Invariants §8.2/§8.3: for any sequence of drafts (with or without a
        /// trailing final) a backend returns for one segment, `AsrWorker`
        /// produces strictly increasing `sequence` values and exactly one
        /// `is_final = true` transcript.
        #[test]
        fn sequences_are_monotonic_and_final_is_unique(
            n_drafts in 0usize..8,
            backend_includes_final in any::<bool>(),
        ) {
            let mut outputs: Vec<Transcript> = (0..n_drafts)
                .map(|i| transcript(&format!("draft-{i}"), false))
                .collect();
            if backend_includes_final {
                outputs.push(transcript("final", true));
            }
            if outputs.is_empty() {
                outputs.push(transcript("only", false));
            }

            let backend = Box::new(ScriptedBackend { outputs });
            let mut worker = AsrWorker::new(
                AsrBackendChoice::Fallback,
                backend,
                ComputePrecision::Int8,
                ComputePrecision::Float16,
            );
            let out = worker.transcribe(&segment()).unwrap();

            prop_assert!(out.windows(2).all(|w| w[1].sequence > w[0].sequence));
            prop_assert_eq!(out.iter().filter(|t| t.is_final).count(), 1);
            prop_assert!(out.last().unwrap().is_final);
        }
    }
}
