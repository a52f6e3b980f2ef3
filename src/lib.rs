//! # vtcore
//!
//! Real-time voice translation streaming core.
//!
//! ## Architecture
//!
//! ```text
//! CaptureDevice → GainProcessor → VadEngine → Segmenter → StagePipeline
//!                                                              │
//!                                              AsrWorker ── TranslationWorker
//!                                                              │
//!                                                      AdaptiveController
//!                                                              │
//!                                                broadcast::Sender<EmittedResult>
//! ```
//!
//! `resilience` (circuit breakers, retry, graceful degradation, health
//! monitoring) wraps every stage boundary; `autotune` owns the gain feedback
//! loop and persists its findings through `profile`.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod adaptive;
pub mod asr;
pub mod autotune;
pub mod capture;
pub mod config;
pub mod engine;
pub mod error;
pub mod gain;
pub mod model;
pub mod pipeline;
pub mod profile;
pub mod resilience;
pub mod segmenter;
pub mod translation;
pub mod vad;

pub use config::PipelineConfig;
pub use engine::{Engine, EngineStatus};
pub use error::{CoreError, Result};
pub use model::{EmittedResult, Frame, GainProfile, SpeechSegment, Transcript, Translation};
