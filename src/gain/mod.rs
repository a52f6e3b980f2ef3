//! `GainProcessor` — per-device digital gain + soft clipping, with hardware
//! gain coordination (spec §4.B).
//!
//! Grounded in the original's `digital_gain_processor.py`: a per-device
//! settings table, noise-floor-aware capping, and a `tanh` soft limiter when
//! post-gain peak exceeds 0.95 of full scale.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::warn;

use crate::model::{Frame, GainMode};

const MAX_GAIN_DB: f32 = 20.0;
const MIN_GAIN_DB: f32 = -20.0;
const NOISE_FLOOR_CAP_THRESHOLD_DB: f32 = -40.0;
const NOISE_FLOOR_CAPPED_GAIN_DB: f32 = 10.0;
const NOISE_AMPLIFICATION_WARN_THRESHOLD_DB: f32 = -50.0;
const SOFT_CLIP_THRESHOLD: f32 = 0.95;
const LATENCY_BUDGET: Duration = Duration::from_millis(5);
const EVICTION_AGE: Duration = Duration::from_secs(24 * 3600);

/// Per-device gain state, mirroring the original's `DigitalGainSettings`.
#[derive(Debug, Clone)]
pub struct DeviceGainState {
    pub gain_db: f32,
    pub multiplier: f32,
    pub noise_floor_db: Option<f32>,
    pub last_used: Instant,
    pub access_count: u64,
    pub mode: GainMode,
}

impl DeviceGainState {
    fn new(gain_db: f32, noise_floor_db: Option<f32>, mode: GainMode) -> Self {
        Self {
            gain_db,
            multiplier: db_to_multiplier(gain_db),
            noise_floor_db,
            last_used: Instant::now(),
            access_count: 0,
            mode,
        }
    }
}

pub fn db_to_multiplier(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}

/// A soft warning surfaced alongside `set_gain`/`process`, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum GainWarning {
    NoiseAmplification { noise_floor_db: f32, gain_db: f32 },
    LatencyBudgetExceeded { elapsed: Duration },
    GainClamped { requested_db: f32, applied_db: f32 },
}

/// Digital gain processor (spec §4.B). One instance per pipeline; internal
/// state is keyed by `device_id` and protected by a single mutex, consistent
/// with §5's "GainProcessor device table ... share a mutex during
/// apply/measure" rule.
#[derive(Default)]
pub struct GainProcessor {
    devices: Mutex<HashMap<String, DeviceGainState>>,
}

impl GainProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the target digital gain for `device_id`, returning the actual gain
    /// applied (after clamping and noise-floor capping) and any warnings.
    pub fn set_gain(
        &self,
        device_id: &str,
        target_db: f32,
        noise_floor_db: Option<f32>,
    ) -> (f32, Vec<GainWarning>) {
        let mut warnings = Vec::new();
        let mut applied = target_db.clamp(MIN_GAIN_DB, MAX_GAIN_DB);
        if (applied - target_db).abs() > f32::EPSILON {
            warnings.push(GainWarning::GainClamped {
                requested_db: target_db,
                applied_db: applied,
            });
        }

        if let Some(nf) = noise_floor_db {
            if nf > NOISE_FLOOR_CAP_THRESHOLD_DB && applied > NOISE_FLOOR_CAPPED_GAIN_DB {
                applied = NOISE_FLOOR_CAPPED_GAIN_DB;
            }
            if applied > 0.0 && nf > NOISE_AMPLIFICATION_WARN_THRESHOLD_DB {
                warnings.push(GainWarning::NoiseAmplification {
                    noise_floor_db: nf,
                    gain_db: applied,
                });
            }
        }

        let mut devices = self.devices.lock();
        match devices.get_mut(device_id) {
            Some(state) => {
                state.gain_db = applied;
                state.multiplier = db_to_multiplier(applied);
                state.noise_floor_db = noise_floor_db;
                state.last_used = Instant::now();
            }
            None => {
                devices.insert(
                    device_id.to_string(),
                    DeviceGainState::new(applied, noise_floor_db, GainMode::Digital),
                );
            }
        }

        for w in &warnings {
            warn!(device_id, ?w, "gain warning");
        }
        (applied, warnings)
    }

    /// Record that a device is using hardware gain instead of digital.
    pub fn mark_hardware_mode(&self, device_id: &str, gain_db: f32) {
        let mut devices = self.devices.lock();
        let entry = devices
            .entry(device_id.to_string())
            .or_insert_with(|| DeviceGainState::new(0.0, None, GainMode::Hardware));
        entry.mode = GainMode::Hardware;
        entry.gain_db = gain_db;
        entry.last_used = Instant::now();
    }

    pub fn multiplier(&self, device_id: &str) -> f32 {
        let mut devices = self.devices.lock();
        match devices.get_mut(device_id) {
            Some(s) => {
                s.access_count += 1;
                s.last_used = Instant::now();
                s.multiplier
            }
            None => 1.0,
        }
    }

    pub fn state(&self, device_id: &str) -> Option<DeviceGainState> {
        self.devices.lock().get(device_id).cloned()
    }

    /// Apply digital gain to a frame, soft-clipping if the post-gain peak
    /// exceeds 0.95 of full scale. Emits `LatencyBudgetExceeded` if the
    /// transform itself exceeds the 5 ms budget.
    pub fn process(&self, device_id: &str, frame: Frame) -> (Frame, Vec<GainWarning>) {
        let start = Instant::now();
        let multiplier = self.multiplier(device_id);

        let samples = if (multiplier - 1.0).abs() < f32::EPSILON {
            frame.samples
        } else {
            let as_f32: Vec<f32> = frame
                .samples
                .iter()
                .map(|s| (*s as f32 / 32768.0) * multiplier)
                .collect();
            let peak = as_f32.iter().fold(0f32, |m, s| m.max(s.abs()));
            let limited = if peak > SOFT_CLIP_THRESHOLD {
                as_f32.iter().map(|s| s.tanh()).collect::<Vec<_>>()
            } else {
                as_f32
            };
            limited
                .iter()
                .map(|s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                .collect()
        };

        let mut warnings = Vec::new();
        let elapsed = start.elapsed();
        if elapsed > LATENCY_BUDGET {
            warnings.push(GainWarning::LatencyBudgetExceeded { elapsed });
            warn!(device_id, ?elapsed, "gain processing exceeded latency budget");
        }

        (Frame::new(samples, frame.sample_rate, frame.capture_ts), warnings)
    }

    /// Evict devices unused for 24h or more (spec §4.B).
    pub fn evict_stale(&self) -> usize {
        let mut devices = self.devices.lock();
        let before = devices.len();
        devices.retain(|_, state| state.last_used.elapsed() < EVICTION_AGE);
        before - devices.len()
    }

    pub fn device_count(&self) -> usize {
        self.devices.lock().len()
    }
}

/// Soft-clip limiter exposed standalone for testing invariant §8.6 (digital
/// gain bound: `|sample| <= 1.0` regardless of requested gain).
pub fn soft_clip(samples: &[f32]) -> Vec<f32> {
    let peak = samples.iter().fold(0f32, |m, s| m.max(s.abs()));
    if peak > SOFT_CLIP_THRESHOLD {
        samples.iter().map(|s| s.tanh()).collect()
    } else {
        samples.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn frame(samples: Vec<i16>) -> Frame {
        Frame::new(samples, 16_000, Instant::now())
    }

    #[test]
    fn zero_db_is_unity_multiplier() {
        let gp = GainProcessor::new();
        let (applied, _) = gp.set_gain("d1", 0.0, None);
        assert_eq!(applied, 0.0);
        assert!((gp.multiplier("d1") - 1.0).abs() < 1e-6);
    }

    #[test]
    fn gain_idempotence_leaves_state_unchanged() {
        let gp = GainProcessor::new();
        gp.set_gain("d1", 6.0, None);
        let m1 = gp.multiplier("d1");
        gp.set_gain("d1", 6.0, None);
        let m2 = gp.multiplier("d1");
        assert!((m1 - m2).abs() < 1e-6);
    }

    #[test]
    fn high_noise_floor_caps_gain_at_10db() {
        let gp = GainProcessor::new();
        let (applied, warnings) = gp.set_gain("d1", 18.0, Some(-35.0));
        assert_eq!(applied, NOISE_FLOOR_CAPPED_GAIN_DB);
        assert!(warnings
            .iter()
            .any(|w| matches!(w, GainWarning::NoiseAmplification { .. })));
    }

    #[test]
    fn noise_amplification_warning_below_cap_threshold() {
        let gp = GainProcessor::new();
        let (applied, warnings) = gp.set_gain("d1", 5.0, Some(-48.0));
        assert_eq!(applied, 5.0);
        assert!(warnings
            .iter()
            .any(|w| matches!(w, GainWarning::NoiseAmplification { .. })));
    }

    #[test]
    fn gain_clamped_to_configured_range() {
        let gp = GainProcessor::new();
        let (applied, warnings) = gp.set_gain("d1", 100.0, None);
        assert_eq!(applied, MAX_GAIN_DB);
        assert!(warnings
            .iter()
            .any(|w| matches!(w, GainWarning::GainClamped { .. })));
    }

    #[test]
    fn digital_gain_bound_never_exceeds_full_scale() {
        let gp = GainProcessor::new();
        gp.set_gain("d1", 20.0, None);
        let loud = frame(vec![i16::MAX; 320]);
        let (out, _) = gp.process("d1", loud);
        for s in out.samples {
            assert!(s as f32 / 32768.0 <= 1.0 + 1e-3);
        }
    }

    #[test]
    fn soft_clip_is_monotonic_odd_and_saturating() {
        let samples = vec![-3.0f32, -1.0, 0.0, 1.0, 3.0];
        let out = soft_clip(&samples);
        assert!(out[2].abs() < 1e-6); // odd: f(0) == 0
        assert!(out[4] < 1.0 && out[4] > 0.9);
        assert!((out[0] + out[4]).abs() < 1e-6); // odd: f(-x) == -f(x)
    }

    #[test]
    fn eviction_removes_entries_only_when_stale() {
        let gp = GainProcessor::new();
        gp.set_gain("d1", 3.0, None);
        assert_eq!(gp.evict_stale(), 0);
        assert_eq!(gp.device_count(), 1);
    }
}
