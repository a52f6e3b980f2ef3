//! Core data model shared across every pipeline stage (spec §3).

pub mod frame;
pub mod gain_profile;
pub mod language;
pub mod metrics;
pub mod segment;
pub mod transcript;
pub mod translation;
pub mod vad;

pub use frame::Frame;
pub use gain_profile::{GainMode, GainProfile, CURRENT_PROFILE_VERSION};
pub use language::LanguageCode;
pub use metrics::{MetricsSnapshot, PipelineMetrics};
pub use segment::SpeechSegment;
pub use transcript::Transcript;
pub use translation::{EmittedResult, Translation};
pub use vad::{SpeechProbability, VadDecision};
