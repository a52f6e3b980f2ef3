//! `SpeechSegment` — a finalized span of PCM produced by the `Segmenter`.

use uuid::Uuid;

/// A finalized speech region, ready for transcription.
///
/// Ownership moves `Segmenter` → `AsrWorker` → discarded after ASR.
#[derive(Debug, Clone)]
pub struct SpeechSegment {
    pub id: Uuid,
    pub start_ts: f64,
    pub end_ts: f64,
    pub pcm: Vec<i16>,
    pub sample_rate: u32,
    pub vad_confidence: f32,
}

impl SpeechSegment {
    pub fn new(
        start_ts: f64,
        end_ts: f64,
        pcm: Vec<i16>,
        sample_rate: u32,
        vad_confidence: f32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            start_ts,
            end_ts,
            pcm,
            sample_rate,
            vad_confidence,
        }
    }

    pub fn duration(&self) -> f64 {
        self.end_ts - self.start_ts
    }

    /// Check the well-formedness invariants from spec §3/§8.1:
    /// `end_ts > start_ts`, duration within `[min, max]`, and `pcm.len()`
    /// matching `duration * sample_rate` within rounding.
    pub fn is_well_formed(&self, min_duration: f64, max_duration: f64) -> bool {
        if self.end_ts <= self.start_ts {
            return false;
        }
        let duration = self.duration();
        if duration < min_duration - 1e-6 || duration > max_duration + 1e-6 {
            return false;
        }
        let expected = (duration * self.sample_rate as f64).round() as i64;
        (self.pcm.len() as i64 - expected).abs() <= 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_formed_segment_passes() {
        let seg = SpeechSegment::new(0.0, 1.0, vec![0i16; 16_000], 16_000, 0.9);
        assert!(seg.is_well_formed(0.5, 30.0));
    }

    #[test]
    fn too_short_segment_fails() {
        let seg = SpeechSegment::new(0.0, 0.1, vec![0i16; 1_600], 16_000, 0.9);
        assert!(!seg.is_well_formed(0.5, 30.0));
    }

    #[test]
    fn mismatched_pcm_length_fails() {
        let seg = SpeechSegment::new(0.0, 1.0, vec![0i16; 100], 16_000, 0.9);
        assert!(!seg.is_well_formed(0.5, 30.0));
    }

    #[test]
    fn inverted_timestamps_fail() {
        let seg = SpeechSegment::new(1.0, 0.5, vec![0i16; 8_000], 16_000, 0.9);
        assert!(!seg.is_well_formed(0.1, 30.0));
    }
}
