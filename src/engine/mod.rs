//! `Engine` — top-level lifecycle controller wiring capture through emission
//! (spec §4, architecture diagram in the crate root docs).
//!
//! Grounded in the teacher's `DictumEngine`
//! (`dictum-core/src/engine/mod.rs`): `new → warm_up → start/start_with_device
//! → stop`, idempotent transitions via `CoreError::AlreadyRunning`/
//! `NotRunning` rather than panics, a `Mutex`-guarded status with a private
//! `set_status` that updates state and broadcasts an event, and
//! `tokio::sync::broadcast` channels fanning results/status out to a host
//! while the hot path itself stays plain OS threads (§5). `EngineStatus`/
//! `EngineStatusEvent` mirror the teacher's `ipc::events` shapes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

use crate::adaptive::{AdaptiveController, DraftCandidate};
use crate::asr::{self, AsrBackend, AsrWorker};
use crate::capture::CaptureDevice;
use crate::config::{AsrBackendChoice, PipelineConfig};
use crate::error::{CoreError, Result};
use crate::gain::GainProcessor;
use crate::model::{EmittedResult, Frame, LanguageCode, MetricsSnapshot, SpeechSegment, Transcript, Translation};
use crate::pipeline::{FeedResult, OverflowPolicy, Stage};
use crate::resilience::{CircuitBreaker, CircuitState, GracefulDegradation, HealthMonitor, HealthStatus};
use crate::segmenter::Segmenter;
use crate::translation::{DraftSurface, EmissionGate, TranslationWorker, TranslatorBackend};
use crate::vad::{EnergyProbabilityModel, VadEngine};

const BROADCAST_CAPACITY: usize = 256;
const STAGE_WORKER_COUNT: usize = 2;
const STAGE_STOP_GRACE: Duration = Duration::from_millis(500);
const GATE_TICK_INTERVAL: Duration = Duration::from_millis(100);
const CIRCUIT_FAILURE_THRESHOLD: u32 = 5;
const CIRCUIT_RECOVERY_TIMEOUT: Duration = Duration::from_secs(30);
const CIRCUIT_HALF_OPEN_PROBES: u32 = 2;
const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(10);

/// Factory for one ASR backend candidate; `Engine::warm_up` probes these in
/// `AsrBackendChoice` order and pins the first that initializes. `Send + Sync`
/// so it can live behind `Engine`'s `Mutex` (asr's own internal
/// `BackendFactory` alias has no such bound, since `probe_and_pin` only ever
/// runs on one thread during the teacher's warm-up step).
pub type AsrBackendFactory = Box<dyn Fn() -> Box<dyn AsrBackend> + Send + Sync>;

/// Engine lifecycle phase, mirroring the teacher's `ipc::events::EngineStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineStatus {
    Idle,
    WarmingUp,
    Listening,
    Stopped,
    Error,
}

/// Broadcast payload accompanying a status change, mirroring the teacher's
/// `ipc::events::EngineStatusEvent`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatusEvent {
    pub status: EngineStatus,
    pub detail: Option<String>,
}

/// Point-in-time read-only view over both stages' metrics plus gate/health
/// state. Deliberately not `Serialize` — `HealthStatus` carries no such derive
/// and this is a diagnostics accessor, not a wire type.
#[derive(Debug, Clone)]
pub struct DiagnosticsSnapshot {
    pub asr: MetricsSnapshot,
    pub translation: MetricsSnapshot,
    pub sequence_gaps: usize,
    pub health: HealthStatus,
}

fn empty_metrics() -> MetricsSnapshot {
    MetricsSnapshot {
        segments_processed: 0,
        segments_dropped: 0,
        avg_us: 0.0,
        max_us: 0,
    }
}

fn circuit_health(state: CircuitState) -> (HealthStatus, String) {
    match state {
        CircuitState::Closed => (HealthStatus::Healthy, "closed".into()),
        CircuitState::HalfOpen => (HealthStatus::Degraded, "half-open, probing".into()),
        CircuitState::Open => (HealthStatus::Unhealthy, "open".into()),
    }
}

fn pipeline_overflow_policy(config: &PipelineConfig) -> OverflowPolicy {
    match config.overflow_policy() {
        crate::config::OverflowPolicy::DropOldest => OverflowPolicy::DropOldest,
        crate::config::OverflowPolicy::Reject => OverflowPolicy::Reject,
    }
}

fn emit_result(tx: &broadcast::Sender<EmittedResult>, translation: &Translation) {
    // Per-item wall-clock processing time isn't tracked at this layer; see
    // `Stage::metrics()` / `DiagnosticsSnapshot` for aggregate latency.
    let _ = tx.send(EmittedResult::from_translation(translation, 0.0));
}

/// Top-level lifecycle controller wiring `CaptureDevice → GainProcessor →
/// VadEngine → Segmenter → StagePipeline(AsrWorker, TranslationWorker) →
/// AdaptiveController → broadcast` (crate root architecture diagram).
///
/// `AsrWorker`/`TranslationWorker` are warmed up once and kept across
/// `start`/`stop` cycles, mirroring the teacher's model-handle reuse; the two
/// `Stage`s are rebuilt on every `start` since they own worker threads bound
/// to that session's target language.
pub struct Engine {
    config: PipelineConfig,
    capture: Mutex<Box<dyn CaptureDevice>>,
    asr_factories: Mutex<Option<Vec<(AsrBackendChoice, AsrBackendFactory)>>>,
    translator: Mutex<Option<Box<dyn TranslatorBackend>>>,

    gain: Arc<GainProcessor>,
    asr_worker: Arc<Mutex<Option<AsrWorker>>>,
    translation_worker: Arc<Mutex<Option<TranslationWorker>>>,
    adaptive: Arc<Mutex<AdaptiveController>>,
    emission_gate: Arc<Mutex<EmissionGate>>,

    running: Arc<AtomicBool>,
    status: Mutex<EngineStatus>,
    result_tx: broadcast::Sender<EmittedResult>,
    status_tx: broadcast::Sender<EngineStatusEvent>,

    asr_circuit: Arc<CircuitBreaker>,
    translation_circuit: Arc<CircuitBreaker>,
    health: Arc<HealthMonitor>,
    degradation: Arc<GracefulDegradation>,

    asr_stage: Mutex<Option<Arc<Stage<SpeechSegment>>>>,
    translation_stage: Mutex<Option<Arc<Stage<Transcript>>>>,
    gate_ticker: Mutex<Option<JoinHandle<()>>>,
}

impl Engine {
    pub fn new(
        config: PipelineConfig,
        capture: Box<dyn CaptureDevice>,
        asr_factories: Vec<(AsrBackendChoice, AsrBackendFactory)>,
        translator: Box<dyn TranslatorBackend>,
    ) -> Self {
        let (result_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        let (status_tx, _) = broadcast::channel(BROADCAST_CAPACITY);

        let asr_circuit = Arc::new(CircuitBreaker::new(
            "asr",
            CIRCUIT_FAILURE_THRESHOLD,
            CIRCUIT_RECOVERY_TIMEOUT,
            CIRCUIT_HALF_OPEN_PROBES,
        ));
        let translation_circuit = Arc::new(CircuitBreaker::new(
            "translation",
            CIRCUIT_FAILURE_THRESHOLD,
            CIRCUIT_RECOVERY_TIMEOUT,
            CIRCUIT_HALF_OPEN_PROBES,
        ));

        let health = Arc::new(HealthMonitor::new(HEALTH_CHECK_INTERVAL));
        {
            let asr_check = Arc::clone(&asr_circuit);
            health.register_check("asr_circuit", move || circuit_health(asr_check.state()));
            let translation_check = Arc::clone(&translation_circuit);
            health.register_check("translation_circuit", move || circuit_health(translation_check.state()));
        }

        let draft_interval_max = config
            .asr_draft_interval_ms
            .saturating_mul(4)
            .max(config.asr_draft_interval_ms + 1_000);
        let adaptive = Arc::new(Mutex::new(AdaptiveController::new(
            config.asr_draft_interval_ms,
            draft_interval_max,
            config.max_queue_depth,
            config.stability_threshold,
            config.min_draft_length,
            config.pause_skip_threshold_ms,
            config.min_segment_duration_s,
            config.max_segment_duration_s,
        )));
        let emission_gate = Arc::new(Mutex::new(EmissionGate::new(config.target_ttft_ms)));

        Self {
            config,
            capture: Mutex::new(capture),
            asr_factories: Mutex::new(Some(asr_factories)),
            translator: Mutex::new(Some(translator)),
            gain: Arc::new(GainProcessor::new()),
            asr_worker: Arc::new(Mutex::new(None)),
            translation_worker: Arc::new(Mutex::new(None)),
            adaptive,
            emission_gate,
            running: Arc::new(AtomicBool::new(false)),
            status: Mutex::new(EngineStatus::Idle),
            result_tx,
            status_tx,
            asr_circuit,
            translation_circuit,
            health,
            degradation: Arc::new(GracefulDegradation::new()),
            asr_stage: Mutex::new(None),
            translation_stage: Mutex::new(None),
            gate_ticker: Mutex::new(None),
        }
    }

    /// Probe and pin an ASR backend, initialize the translator, and build the
    /// long-lived `AsrWorker`/`TranslationWorker`. Consumes the factories and
    /// translator passed to `new`; calling this twice is an error.
    pub fn warm_up(&self) -> Result<()> {
        self.set_status(EngineStatus::WarmingUp, None);

        let factories = self.asr_factories.lock().take().ok_or_else(|| CoreError::Stage {
            stage: "engine",
            source: anyhow::anyhow!("warm_up already ran"),
        })?;
        let factories: Vec<(AsrBackendChoice, Box<dyn Fn() -> Box<dyn AsrBackend>>)> = factories
            .into_iter()
            .map(|(choice, factory)| (choice, factory as Box<dyn Fn() -> Box<dyn AsrBackend>>))
            .collect();
        let (picked, backend) = asr::probe_and_pin(self.config.asr_backend, factories)?;
        *self.asr_worker.lock() = Some(AsrWorker::new(
            picked,
            backend,
            self.config.asr_draft_compute_type,
            self.config.asr_compute_type,
        ));

        let mut translator = self.translator.lock().take().ok_or_else(|| CoreError::Stage {
            stage: "engine",
            source: anyhow::anyhow!("warm_up already ran"),
        })?;
        translator.initialize()?;
        *self.translation_worker.lock() = Some(TranslationWorker::new(
            translator,
            self.config.sov_languages.clone(),
            self.config.max_history_segments,
        ));

        self.health.mark_running();
        self.set_status(EngineStatus::Idle, None);
        info!(backend = ?picked, "engine warmed up");
        Ok(())
    }

    pub fn start(&self, target_language: LanguageCode) -> Result<()> {
        self.start_with_device(target_language, None)
    }

    /// Build the translation and ASR stages, wire the capture callback
    /// through gain → VAD → segmenter → ASR stage, and open the capture
    /// device. The translation stage is built first so the ASR stage's
    /// `process` closure can hold a reference to it.
    pub fn start_with_device(&self, target_language: LanguageCode, preferred_input_device: Option<String>) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            return Err(CoreError::AlreadyRunning);
        }
        if self.asr_worker.lock().is_none() || self.translation_worker.lock().is_none() {
            return Err(CoreError::Stage {
                stage: "engine",
                source: anyhow::anyhow!("start() called before warm_up()"),
            });
        }

        let overflow_policy = pipeline_overflow_policy(&self.config);
        let queue_capacity = self.config.max_queue_depth;

        let translation_stage = self.build_translation_stage(overflow_policy, queue_capacity, target_language.clone());
        let asr_stage = self.build_asr_stage(overflow_policy, queue_capacity, Arc::clone(&translation_stage));

        let callback = self.build_capture_callback(
            preferred_input_device.clone(),
            Arc::clone(&asr_stage),
            Arc::clone(&translation_stage),
        );

        if let Err(e) = self
            .capture
            .lock()
            .start_capture(preferred_input_device.as_deref(), false, callback)
        {
            Self::teardown_stages(asr_stage, translation_stage);
            let err = CoreError::from(e);
            self.set_status(EngineStatus::Error, Some(err.to_string()));
            return Err(err);
        }

        self.running.store(true, Ordering::SeqCst);
        *self.gate_ticker.lock() = Some(self.spawn_gate_ticker());
        *self.asr_stage.lock() = Some(asr_stage);
        *self.translation_stage.lock() = Some(translation_stage);

        self.set_status(EngineStatus::Listening, None);
        info!(target = %target_language, device = ?preferred_input_device, "engine started");
        Ok(())
    }

    fn build_translation_stage(
        &self,
        overflow_policy: OverflowPolicy,
        queue_capacity: usize,
        target_language: LanguageCode,
    ) -> Arc<Stage<Transcript>> {
        let translation_worker = Arc::clone(&self.translation_worker);
        let translation_circuit = Arc::clone(&self.translation_circuit);
        let emission_gate = Arc::clone(&self.emission_gate);
        let adaptive = Arc::clone(&self.adaptive);
        let result_tx = self.result_tx.clone();

        Arc::new(Stage::start(
            "translation",
            queue_capacity,
            STAGE_WORKER_COUNT,
            overflow_policy,
            move |transcript: Transcript| {
                let segment_id = transcript.segment_id;
                let outcome = translation_circuit.call(
                    || {
                        let mut guard = translation_worker.lock();
                        let worker = guard.as_mut().expect("translation worker missing after warm_up");
                        worker.translate(&transcript, &target_language)
                    },
                    None::<fn() -> DraftSurface>,
                );
                let surface = match outcome {
                    Ok(s) => s,
                    Err(e) => {
                        warn!(segment_id = %segment_id, error = %e, "translation failed");
                        return;
                    }
                };

                // Diagnostic-only: admission already happened at the ASR
                // stage, where pause/confidence context is available.
                let _ = adaptive.lock().draft_stability(segment_id, &surface.translation.translated_text);

                let released = emission_gate.lock().submit(surface.translation.clone(), Instant::now());
                for translation in &released {
                    emit_result(&result_tx, translation);
                }

                if surface.translation.is_final {
                    adaptive.lock().forget_segment(segment_id);
                }
            },
        ))
    }

    fn build_asr_stage(
        &self,
        overflow_policy: OverflowPolicy,
        queue_capacity: usize,
        translation_stage: Arc<Stage<Transcript>>,
    ) -> Arc<Stage<SpeechSegment>> {
        let asr_worker = Arc::clone(&self.asr_worker);
        let asr_circuit = Arc::clone(&self.asr_circuit);
        let adaptive = Arc::clone(&self.adaptive);
        let last_draft_at: Mutex<HashMap<Uuid, Instant>> = Mutex::new(HashMap::new());

        Arc::new(Stage::start(
            "asr",
            queue_capacity,
            STAGE_WORKER_COUNT,
            overflow_policy,
            move |segment: SpeechSegment| {
                let segment_id = segment.id;
                let outcome = asr_circuit.call(
                    || {
                        let mut guard = asr_worker.lock();
                        let worker = guard.as_mut().expect("asr worker missing after warm_up");
                        worker.transcribe(&segment)
                    },
                    None::<fn() -> Vec<Transcript>>,
                );
                let transcripts = match outcome {
                    Ok(t) => t,
                    Err(e) => {
                        warn!(segment_id = %segment_id, error = %e, "asr transcription failed");
                        return;
                    }
                };

                let mut any_final = false;
                let now = Instant::now();
                for transcript in transcripts {
                    any_final |= transcript.is_final;

                    if !transcript.is_final {
                        let pause_duration_ms = {
                            let mut activity = last_draft_at.lock();
                            let pause = activity
                                .get(&segment_id)
                                .map(|last| last.elapsed().as_millis().min(u128::from(u32::MAX)) as u32)
                                .unwrap_or(0);
                            activity.insert(segment_id, now);
                            pause
                        };
                        let candidate = DraftCandidate {
                            confidence: transcript.confidence,
                            token_count: transcript.text.split_whitespace().count(),
                            pause_duration_ms,
                        };
                        if !adaptive.lock().admit_draft(&candidate) {
                            continue;
                        }
                    }

                    if translation_stage.feed(transcript) == FeedResult::Rejected {
                        warn!(segment_id = %segment_id, "translation stage rejected transcript under backpressure");
                    }
                }

                if any_final {
                    last_draft_at.lock().remove(&segment_id);
                    if let Some(worker) = asr_worker.lock().as_mut() {
                        worker.forget_segment(segment_id);
                    }
                    adaptive.lock().forget_segment(segment_id);
                }
            },
        ))
    }

    /// Build the per-frame capture callback: gain → VAD → segmenter → ASR
    /// stage feed, plus the finalization-push feedback loop into the
    /// `Segmenter` from `AdaptiveController::evaluate_finalization_push`.
    fn build_capture_callback(
        &self,
        preferred_input_device: Option<String>,
        asr_stage: Arc<Stage<SpeechSegment>>,
        translation_stage: Arc<Stage<Transcript>>,
    ) -> Box<dyn FnMut(Frame) + Send> {
        let gain = Arc::clone(&self.gain);
        let adaptive = Arc::clone(&self.adaptive);
        let device_key = preferred_input_device.unwrap_or_else(|| "default".to_string());
        let max_queue_depth = self.config.max_queue_depth;

        let mut vad = VadEngine::new(
            Box::new(EnergyProbabilityModel::default()),
            self.config.vad_threshold,
            self.config.min_speech_frames(),
            self.config.min_silence_frames(),
        );
        let mut segmenter = Segmenter::new(
            self.config.padding_before_s,
            self.config.padding_after_s,
            self.config.min_segment_duration_s,
            self.config.max_segment_duration_s,
            self.config.merge_gap_threshold_s,
        );
        let mut stream_ts: f64 = 0.0;

        Box::new(move |frame: Frame| {
            let (gained, warnings) = gain.process(&device_key, frame);
            for w in &warnings {
                warn!(device = %device_key, ?w, "gain warning");
            }

            let frame_duration = gained.duration_secs();
            let _probability = vad.process(&gained);
            let decision = vad.state();

            if let Some(segment) = segmenter.process(gained, decision, stream_ts) {
                if asr_stage.feed(segment) == FeedResult::Rejected {
                    warn!("asr stage rejected segment under backpressure");
                }
            }
            stream_ts += frame_duration;

            let saturated =
                asr_stage.queue_depth() >= max_queue_depth || translation_stage.queue_depth() >= max_queue_depth;
            if let Some(new_max) = adaptive.lock().evaluate_finalization_push(saturated, Instant::now()) {
                segmenter.set_max_segment_duration(new_max);
            }
        })
    }

    /// Low-frequency background thread that calls `EmissionGate::poll` so a
    /// sequence gap that nothing ever fills still gets forced open (the gate
    /// only re-evaluates on `submit`, which a stalled segment never calls).
    fn spawn_gate_ticker(&self) -> JoinHandle<()> {
        let running = Arc::clone(&self.running);
        let emission_gate = Arc::clone(&self.emission_gate);
        let result_tx = self.result_tx.clone();

        std::thread::Builder::new()
            .name("emission-gate-ticker".into())
            .spawn(move || {
                while running.load(Ordering::Relaxed) {
                    std::thread::sleep(GATE_TICK_INTERVAL);
                    let released = emission_gate.lock().poll(Instant::now());
                    for translation in &released {
                        emit_result(&result_tx, translation);
                    }
                }
            })
            .expect("failed to spawn emission gate ticker thread")
    }

    fn teardown_stages(asr_stage: Arc<Stage<SpeechSegment>>, translation_stage: Arc<Stage<Transcript>>) {
        // asr_stage's workers hold the only other clone of translation_stage
        // (captured by build_asr_stage's closure); stopping it first drops
        // that clone so translation_stage can be uniquely unwrapped below.
        match Arc::try_unwrap(asr_stage) {
            Ok(stage) => stage.stop(STAGE_STOP_GRACE),
            Err(_) => warn!("asr stage still referenced during teardown; leaking worker threads"),
        }
        match Arc::try_unwrap(translation_stage) {
            Ok(stage) => stage.stop(STAGE_STOP_GRACE),
            Err(_) => warn!("translation stage still referenced during teardown; leaking worker threads"),
        }
    }

    /// Idempotent: errors with `NotRunning` rather than panicking if the
    /// engine isn't currently listening.
    pub fn stop(&self) -> Result<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Err(CoreError::NotRunning);
        }

        self.capture.lock().stop_capture();

        if let Some(handle) = self.gate_ticker.lock().take() {
            let _ = handle.join();
        }

        let asr_stage = self.asr_stage.lock().take();
        let translation_stage = self.translation_stage.lock().take();
        if let (Some(asr_stage), Some(translation_stage)) = (asr_stage, translation_stage) {
            Self::teardown_stages(asr_stage, translation_stage);
        }

        self.health.stop();
        self.set_status(EngineStatus::Stopped, None);
        info!("engine stopped");
        Ok(())
    }

    pub fn status(&self) -> EngineStatus {
        *self.status.lock()
    }

    pub fn subscribe_results(&self) -> broadcast::Receiver<EmittedResult> {
        self.result_tx.subscribe()
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<EngineStatusEvent> {
        self.status_tx.subscribe()
    }

    /// Ambient resilience hook (spec §4.I): a caller registers concrete
    /// degradation strategies (lower ASR precision, widen draft interval,
    /// final-only translation, ...) before `start`, since which knobs exist
    /// depends on the concrete backends passed to `new`.
    pub fn degradation(&self) -> &GracefulDegradation {
        &self.degradation
    }

    pub fn pipeline_diagnostics_snapshot(&self) -> DiagnosticsSnapshot {
        self.health.check_all();
        let asr = self
            .asr_stage
            .lock()
            .as_ref()
            .map(|s| s.metrics().snapshot())
            .unwrap_or_else(empty_metrics);
        let translation = self
            .translation_stage
            .lock()
            .as_ref()
            .map(|s| s.metrics().snapshot())
            .unwrap_or_else(empty_metrics);
        DiagnosticsSnapshot {
            asr,
            translation,
            sequence_gaps: self.emission_gate.lock().sequence_gaps(),
            health: self.health.overall_status(),
        }
    }

    fn set_status(&self, new_status: EngineStatus, detail: Option<String>) {
        *self.status.lock() = new_status;
        let _ = self.status_tx.send(EngineStatusEvent {
            status: new_status,
            detail,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asr::FallbackAsrBackend;
    use crate::capture::{CaptureError, DeviceInfo};
    use crate::translation::PassthroughTranslator;

    /// Synchronously feeds a fixed frame script to the callback on whatever
    /// thread calls `start_capture`, standing in for a real audio thread.
    struct FakeCaptureDevice {
        speech_frames: usize,
        silence_frames: usize,
    }

    impl FakeCaptureDevice {
        fn one_utterance() -> Self {
            Self {
                speech_frames: 20,
                silence_frames: 60,
            }
        }
    }

    impl CaptureDevice for FakeCaptureDevice {
        fn list_devices(&self) -> Vec<DeviceInfo> {
            vec![]
        }

        fn start_capture(
            &mut self,
            _device_id: Option<&str>,
            _is_loopback: bool,
            mut callback: Box<dyn FnMut(Frame) + Send>,
        ) -> std::result::Result<(), CaptureError> {
            let loud: Vec<i16> = vec![(0.3 * i16::MAX as f32) as i16; 320];
            let quiet: Vec<i16> = vec![0i16; 320];
            for _ in 0..self.speech_frames {
                callback(Frame::new(loud.clone(), 16_000, Instant::now()));
            }
            for _ in 0..self.silence_frames {
                callback(Frame::new(quiet.clone(), 16_000, Instant::now()));
            }
            Ok(())
        }

        fn stop_capture(&mut self) {}
    }

    fn test_engine() -> Engine {
        let config = PipelineConfig::default();
        let factories: Vec<(AsrBackendChoice, AsrBackendFactory)> = vec![(
            AsrBackendChoice::Fallback,
            Box::new(|| -> Box<dyn AsrBackend> { Box::new(FallbackAsrBackend::new(None)) }),
        )];
        Engine::new(
            config,
            Box::new(FakeCaptureDevice::one_utterance()),
            factories,
            Box::new(PassthroughTranslator),
        )
    }

    #[test]
    fn warm_up_resolves_idle_status() {
        let engine = test_engine();
        assert_eq!(engine.status(), EngineStatus::Idle);
        engine.warm_up().unwrap();
        assert_eq!(engine.status(), EngineStatus::Idle);
    }

    #[test]
    fn warm_up_twice_errors() {
        let engine = test_engine();
        engine.warm_up().unwrap();
        assert!(engine.warm_up().is_err());
    }

    #[test]
    fn start_before_warm_up_errors() {
        let engine = test_engine();
        assert!(engine.start(LanguageCode::new("fr")).is_err());
    }

    #[test]
    fn stop_without_start_errors() {
        let engine = test_engine();
        assert!(matches!(engine.stop(), Err(CoreError::NotRunning)));
    }

    #[test]
    fn start_twice_errors_already_running() {
        let engine = test_engine();
        engine.warm_up().unwrap();
        engine.start(LanguageCode::new("fr")).unwrap();
        assert!(matches!(engine.start(LanguageCode::new("fr")), Err(CoreError::AlreadyRunning)));
        engine.stop().unwrap();
    }

    #[test]
    fn emits_result_for_a_simple_utterance() {
        let engine = test_engine();
        engine.warm_up().unwrap();
        let mut rx = engine.subscribe_results();
        engine.start(LanguageCode::new("fr")).unwrap();
        assert_eq!(engine.status(), EngineStatus::Listening);

        let mut received = None;
        for _ in 0..200 {
            match rx.try_recv() {
                Ok(result) => {
                    received = Some(result);
                    break;
                }
                Err(_) => std::thread::sleep(Duration::from_millis(10)),
            }
        }
        engine.stop().unwrap();
        assert_eq!(engine.status(), EngineStatus::Stopped);

        let result = received.expect("expected at least one emitted result");
        assert_eq!(result.tgt_lang, LanguageCode::new("fr"));
    }

    #[test]
    fn diagnostics_snapshot_reports_zero_before_start() {
        let engine = test_engine();
        let snap = engine.pipeline_diagnostics_snapshot();
        assert_eq!(snap.asr.segments_processed, 0);
        assert_eq!(snap.translation.segments_processed, 0);
        assert_eq!(snap.sequence_gaps, 0);
    }
}
