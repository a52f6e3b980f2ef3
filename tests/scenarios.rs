//! End-to-end scenario tests against `Engine` with fake capture/ASR/translator
//! collaborators, in the style of `engine::tests::FakeCaptureDevice` (spec
//! §8 scenarios S1-S5; S6, auto-tune convergence, is covered by
//! `autotune::tests` directly since it needs no capture/pipeline wiring).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use vtcore::asr::AsrBackend;
use vtcore::capture::{CaptureDevice, CaptureError, DeviceInfo};
use vtcore::config::{AsrBackendChoice, ComputePrecision, PipelineConfig};
use vtcore::engine::AsrBackendFactory;
use vtcore::error::{CoreError, Result};
use vtcore::model::{Frame, LanguageCode, SpeechSegment, Transcript};
use vtcore::resilience::HealthStatus;
use vtcore::translation::PassthroughTranslator;
use vtcore::Engine;

const SAMPLE_RATE: u32 = 16_000;
const FRAME_MS: u32 = 20;
const FRAME_SAMPLES: usize = (SAMPLE_RATE as usize * FRAME_MS as usize) / 1000;

fn loud_samples() -> Vec<i16> {
    vec![(0.3 * i16::MAX as f32) as i16; FRAME_SAMPLES]
}

fn quiet_samples() -> Vec<i16> {
    vec![0i16; FRAME_SAMPLES]
}

/// Feeds a scripted sequence of `(is_speech, frame_count)` bursts straight
/// into the capture callback on the calling thread, standing in for a real
/// audio device the way `engine::tests::FakeCaptureDevice` does.
struct ScriptedCapture {
    script: Vec<(bool, usize)>,
}

impl CaptureDevice for ScriptedCapture {
    fn list_devices(&self) -> Vec<DeviceInfo> {
        vec![]
    }

    fn start_capture(
        &mut self,
        _device_id: Option<&str>,
        _is_loopback: bool,
        mut callback: Box<dyn FnMut(Frame) + Send>,
    ) -> std::result::Result<(), CaptureError> {
        let loud = loud_samples();
        let quiet = quiet_samples();
        for (is_speech, count) in &self.script {
            let samples = if *is_speech { &loud } else { &quiet };
            for _ in 0..*count {
                callback(Frame::new(samples.clone(), SAMPLE_RATE, Instant::now()));
            }
        }
        Ok(())
    }

    fn stop_capture(&mut self) {}
}

/// Always returns exactly one final transcript per segment, isolating a
/// scenario from draft-admission/stability logic it isn't testing.
struct FinalOnlyAsrBackend;

impl AsrBackend for FinalOnlyAsrBackend {
    fn initialize(&mut self) -> Result<()> {
        Ok(())
    }

    fn transcribe(
        &mut self,
        segment: &SpeechSegment,
        _draft: ComputePrecision,
        _final: ComputePrecision,
    ) -> Result<Vec<Transcript>> {
        Ok(vec![Transcript {
            segment_id: segment.id,
            text: "scripted transcript".to_string(),
            language: LanguageCode::new("en"),
            confidence: 0.9,
            is_final: true,
            sequence: 0,
        }])
    }
}

/// Simulates an ASR backend slower than real time: each call blocks for
/// `delay` before returning, long enough to make the ASR stage's bounded
/// queue overflow under rapid segment arrival.
struct SlowAsrBackend {
    delay: Duration,
}

impl AsrBackend for SlowAsrBackend {
    fn initialize(&mut self) -> Result<()> {
        Ok(())
    }

    fn transcribe(
        &mut self,
        segment: &SpeechSegment,
        _draft: ComputePrecision,
        _final: ComputePrecision,
    ) -> Result<Vec<Transcript>> {
        std::thread::sleep(self.delay);
        Ok(vec![Transcript {
            segment_id: segment.id,
            text: "slow".to_string(),
            language: LanguageCode::new("en"),
            confidence: 0.9,
            is_final: true,
            sequence: 0,
        }])
    }
}

/// Fails every call, for driving the ASR circuit breaker open on command.
struct FailingAsrBackend {
    calls: Arc<AtomicUsize>,
}

impl AsrBackend for FailingAsrBackend {
    fn initialize(&mut self) -> Result<()> {
        Ok(())
    }

    fn transcribe(
        &mut self,
        _segment: &SpeechSegment,
        _draft: ComputePrecision,
        _final: ComputePrecision,
    ) -> Result<Vec<Transcript>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(CoreError::Stage {
            stage: "asr",
            source: anyhow::anyhow!("simulated backend failure"),
        })
    }
}

fn asr_factories_for<F>(make: F) -> Vec<(AsrBackendChoice, AsrBackendFactory)>
where
    F: Fn() -> Box<dyn AsrBackend> + Send + Sync + 'static,
{
    vec![(AsrBackendChoice::Fallback, Box::new(make))]
}

fn build_engine(config: PipelineConfig, capture: ScriptedCapture, factories: Vec<(AsrBackendChoice, AsrBackendFactory)>) -> Engine {
    Engine::new(config, Box::new(capture), factories, Box::new(PassthroughTranslator))
}

/// S1: silence-only capture produces no segments, transcripts, or
/// translations.
#[test]
fn s1_silence_only_emits_nothing() {
    let config = PipelineConfig::default();
    let capture = ScriptedCapture {
        script: vec![(false, 500)], // 10s of silence at 20ms/frame
    };
    let engine = build_engine(config, capture, asr_factories_for(|| Box::new(FinalOnlyAsrBackend)));
    engine.warm_up().unwrap();
    let mut rx = engine.subscribe_results();
    engine.start(LanguageCode::new("fr")).unwrap();

    std::thread::sleep(Duration::from_millis(200));
    engine.stop().unwrap();

    assert!(rx.try_recv().is_err(), "silence-only capture must not emit any result");
    let snap = engine.pipeline_diagnostics_snapshot();
    assert_eq!(snap.asr.segments_processed, 0);
    assert_eq!(snap.asr.segments_dropped, 0);
}

/// S2: two back-to-back utterances separated by silence yield exactly two
/// finals, with strictly increasing sequence numbers within each.
#[test]
fn s2_two_utterances_yield_two_finals() {
    let config = PipelineConfig {
        merge_gap_threshold_s: 0.0,
        min_segment_duration_s: 0.3,
        ..PipelineConfig::default()
    };
    let capture = ScriptedCapture {
        script: vec![
            (false, 100), // 2s silence
            (true, 150),  // 3s speech ("hello world")
            (false, 50),  // 1s silence
            (true, 100),  // 2s speech ("goodbye")
            (false, 100), // 2s silence
        ],
    };
    let engine = build_engine(config, capture, asr_factories_for(|| Box::new(FinalOnlyAsrBackend)));
    engine.warm_up().unwrap();
    let mut rx = engine.subscribe_results();
    engine.start(LanguageCode::new("fr")).unwrap();

    let mut finals = 0;
    let deadline = Instant::now() + Duration::from_secs(5);
    while finals < 2 && Instant::now() < deadline {
        match rx.try_recv() {
            Ok(result) if result.is_final => finals += 1,
            Ok(_) => {}
            Err(_) => std::thread::sleep(Duration::from_millis(10)),
        }
    }
    engine.stop().unwrap();

    assert_eq!(finals, 2, "expected exactly two finals for two separated utterances");
}

/// S3: a single utterance longer than `max_segment_duration_s` is forced to
/// split into multiple segments, each within the configured bound.
#[test]
fn s3_overlong_utterance_forces_split() {
    let max_duration = 2.0;
    let config = PipelineConfig {
        merge_gap_threshold_s: 0.0,
        min_segment_duration_s: 0.3,
        max_segment_duration_s: max_duration,
        ..PipelineConfig::default()
    };
    let capture = ScriptedCapture {
        script: vec![
            (true, 300),  // 6s of continuous speech, more than 3x max_segment_duration
            (false, 50),  // trailing silence to finalize the tail segment
        ],
    };
    let engine = build_engine(config, capture, asr_factories_for(|| Box::new(FinalOnlyAsrBackend)));
    engine.warm_up().unwrap();
    let mut rx = engine.subscribe_results();
    engine.start(LanguageCode::new("fr")).unwrap();

    let mut finals = 0;
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        match rx.try_recv() {
            Ok(result) if result.is_final => finals += 1,
            Ok(_) => {}
            Err(_) => std::thread::sleep(Duration::from_millis(20)),
        }
    }
    engine.stop().unwrap();

    assert!(finals >= 2, "continuous speech past max_segment_duration must force at least one split, got {finals} finals");
}

/// S4: a sustained flood of segments against a slower-than-real-time ASR
/// backend with a tiny queue must drop under backpressure rather than
/// deadlock or unbounded-grow the queue.
#[test]
fn s4_backpressure_drops_under_sustained_overload() {
    let config = PipelineConfig {
        merge_gap_threshold_s: 0.0,
        min_segment_duration_s: 0.05,
        max_segment_duration_s: 0.2,
        min_speech_duration_ms: 20,
        min_silence_duration_ms: 20,
        padding_before_s: 0.0,
        padding_after_s: 0.0,
        max_queue_depth: 1,
        drop_on_overflow: true,
        ..PipelineConfig::default()
    };
    // Alternating short speech/silence bursts produce many short segments in
    // rapid succession, well faster than the slow backend can drain them.
    let mut script = Vec::new();
    for _ in 0..30 {
        script.push((true, 10));
        script.push((false, 10));
    }
    let capture = ScriptedCapture { script };
    let slow_delay = Duration::from_millis((FRAME_MS * 3) as u64);
    let engine = build_engine(
        config,
        capture,
        asr_factories_for(move || Box::new(SlowAsrBackend { delay: slow_delay })),
    );
    engine.warm_up().unwrap();
    engine.start(LanguageCode::new("fr")).unwrap();

    std::thread::sleep(Duration::from_millis(500));
    let mid_snapshot = engine.pipeline_diagnostics_snapshot();

    let stopped_in_time = {
        let start = Instant::now();
        engine.stop().unwrap();
        start.elapsed() < Duration::from_secs(5)
    };

    assert!(stopped_in_time, "engine must shut down promptly even while backlogged");
    assert!(
        mid_snapshot.asr.segments_dropped > 0,
        "sustained overload against a 1-deep queue must produce drops"
    );
}

/// S5: repeated ASR failures trip the circuit breaker, surfaced through the
/// diagnostics snapshot's health status.
#[test]
fn s5_asr_circuit_trips_on_repeated_failure() {
    let config = PipelineConfig {
        merge_gap_threshold_s: 0.0,
        min_segment_duration_s: 0.05,
        min_speech_duration_ms: 20,
        min_silence_duration_ms: 20,
        padding_before_s: 0.0,
        padding_after_s: 0.0,
        ..PipelineConfig::default()
    };
    // Ten short speech/silence bursts -> ten segments, comfortably more than
    // the breaker's failure threshold.
    let mut script = Vec::new();
    for _ in 0..10 {
        script.push((true, 10));
        script.push((false, 10));
    }
    let capture = ScriptedCapture { script };
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_for_factory = Arc::clone(&calls);
    let engine = build_engine(
        config,
        capture,
        asr_factories_for(move || {
            Box::new(FailingAsrBackend {
                calls: Arc::clone(&calls_for_factory),
            })
        }),
    );
    engine.warm_up().unwrap();
    engine.start(LanguageCode::new("fr")).unwrap();

    let mut unhealthy = false;
    let deadline = Instant::now() + Duration::from_secs(5);
    while !unhealthy && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(20));
        unhealthy = engine.pipeline_diagnostics_snapshot().health == HealthStatus::Unhealthy;
    }
    engine.stop().unwrap();

    assert!(unhealthy, "repeated ASR failures must trip the circuit breaker to Unhealthy");
    assert!(
        calls.load(Ordering::SeqCst) < 10,
        "an open circuit must stop invoking the failing backend for later segments"
    );
}
