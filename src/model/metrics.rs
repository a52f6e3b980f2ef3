//! `PipelineMetrics` — monotonic counters plus a decaying processing-time average.
//!
//! Mirrors the teacher's `engine::pipeline::PipelineDiagnostics` shape (atomics
//! snapshotted into a plain `Copy` struct) but generalized to any stage name
//! and extended with the EMA + running max that spec §3 calls for.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Per-stage metrics: monotonic counters plus an exponentially-decaying
/// moving average of processing time and a running max.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    pub segments_processed: AtomicUsize,
    pub segments_dropped: AtomicUsize,
    /// Fixed-point EMA of processing time in microseconds (`avg_us * 1000`),
    /// so we can use atomics without a lock. Smoothing factor alpha = 0.1.
    avg_us_fixed: AtomicU64,
    pub max_us: AtomicU64,
}

const FIXED_POINT_SCALE: u64 = 1000;
const ALPHA_NUM: u64 = 1;
const ALPHA_DEN: u64 = 10;

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_processed(&self, duration: std::time::Duration) {
        self.segments_processed.fetch_add(1, Ordering::Relaxed);
        self.record_duration(duration);
    }

    pub fn record_dropped(&self) {
        self.segments_dropped.fetch_add(1, Ordering::Relaxed);
    }

    fn record_duration(&self, duration: std::time::Duration) {
        let sample_us = duration.as_micros().min(u64::MAX as u128) as u64;
        self.max_us.fetch_max(sample_us, Ordering::Relaxed);

        // EMA update via compare-exchange loop: avg = 0.1*sample + 0.9*avg.
        let sample_fixed = sample_us.saturating_mul(FIXED_POINT_SCALE);
        let mut current = self.avg_us_fixed.load(Ordering::Relaxed);
        loop {
            let updated = if current == 0 {
                sample_fixed
            } else {
                (sample_fixed * ALPHA_NUM + current * (ALPHA_DEN - ALPHA_NUM)) / ALPHA_DEN
            };
            match self.avg_us_fixed.compare_exchange_weak(
                current,
                updated,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }
    }

    pub fn avg_us(&self) -> f64 {
        self.avg_us_fixed.load(Ordering::Relaxed) as f64 / FIXED_POINT_SCALE as f64
    }

    pub fn max_us(&self) -> u64 {
        self.max_us.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            segments_processed: self.segments_processed.load(Ordering::Relaxed),
            segments_dropped: self.segments_dropped.load(Ordering::Relaxed),
            avg_us: self.avg_us(),
            max_us: self.max_us(),
        }
    }

    /// Reset all counters — only ever called on an explicit request (spec §3).
    pub fn reset(&self) {
        self.segments_processed.store(0, Ordering::Relaxed);
        self.segments_dropped.store(0, Ordering::Relaxed);
        self.avg_us_fixed.store(0, Ordering::Relaxed);
        self.max_us.store(0, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricsSnapshot {
    pub segments_processed: usize,
    pub segments_dropped: usize,
    pub avg_us: f64,
    pub max_us: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn first_sample_sets_average_directly() {
        let m = PipelineMetrics::new();
        m.record_processed(Duration::from_micros(100));
        assert!((m.avg_us() - 100.0).abs() < 1e-6);
        assert_eq!(m.max_us(), 100);
    }

    #[test]
    fn ema_decays_toward_new_samples() {
        let m = PipelineMetrics::new();
        m.record_processed(Duration::from_micros(100));
        m.record_processed(Duration::from_micros(200));
        // 0.1*200 + 0.9*100 = 110
        assert!((m.avg_us() - 110.0).abs() < 1.0);
    }

    #[test]
    fn reset_clears_all_counters() {
        let m = PipelineMetrics::new();
        m.record_processed(Duration::from_micros(50));
        m.record_dropped();
        m.reset();
        let snap = m.snapshot();
        assert_eq!(snap.segments_processed, 0);
        assert_eq!(snap.segments_dropped, 0);
        assert_eq!(snap.avg_us, 0.0);
        assert_eq!(snap.max_us, 0);
    }

    #[test]
    fn accounting_identity_holds() {
        // chunks_in == chunks_processed + chunks_dropped + chunks_in_flight (§8.4)
        let m = PipelineMetrics::new();
        let chunks_in = 10usize;
        for _ in 0..7 {
            m.record_processed(Duration::from_micros(1));
        }
        for _ in 0..2 {
            m.record_dropped();
        }
        let in_flight = 1usize;
        let snap = m.snapshot();
        assert_eq!(
            chunks_in,
            snap.segments_processed + snap.segments_dropped + in_flight
        );
    }
}
