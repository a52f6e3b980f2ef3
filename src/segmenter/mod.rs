//! `Segmenter` — builds `SpeechSegment`s from `(Frame, VadDecision)` pairs
//! (spec §4.D).
//!
//! Grounded in `original_source/audio_module/segmentation/engine.py`'s
//! `SegmentationEngine`: a pre-roll ring buffer, post-roll extension on
//! finalize, forced split at `max_segment_duration` with no padding
//! carryover, drop-too-short-after-trim, and gap-based merge of adjacent
//! emitted segments (PCM concatenation + confidence averaging via EMA on
//! extend, plain average on merge — mirroring the original's two distinct
//! blending rules for "extending" vs. "merging").

use std::collections::VecDeque;

use tracing::debug;
use uuid::Uuid;

use crate::model::{Frame, SpeechSegment, VadDecision};

struct PendingSegment {
    id: Uuid,
    start_ts: f64,
    end_ts: f64,
    pcm: Vec<i16>,
    sample_rate: u32,
    confidence: f32,
}

/// Builds well-formed `SpeechSegment`s from a stream of VAD-tagged frames.
/// One instance per audio stream.
pub struct Segmenter {
    padding_before_s: f64,
    padding_after_s: f64,
    min_segment_duration_s: f64,
    max_segment_duration_s: f64,
    merge_gap_threshold_s: f64,

    pre_roll: VecDeque<Frame>,
    pre_roll_capacity_s: f64,
    pending: Option<PendingSegment>,
    /// Most recently completed segment, held back from the caller while it's
    /// still within the merge window — released (possibly merged with
    /// whatever speech resumes next) once the window closes. Never
    /// populated when merging is disabled (`merge_gap_threshold_s <= 0.0`).
    held: Option<SpeechSegment>,
}

const EXTEND_CONFIDENCE_ALPHA: f32 = 0.1;

impl Segmenter {
    pub fn new(
        padding_before_s: f64,
        padding_after_s: f64,
        min_segment_duration_s: f64,
        max_segment_duration_s: f64,
        merge_gap_threshold_s: f64,
    ) -> Self {
        Self {
            padding_before_s,
            padding_after_s,
            min_segment_duration_s,
            max_segment_duration_s,
            merge_gap_threshold_s,
            pre_roll: VecDeque::new(),
            pre_roll_capacity_s: padding_before_s,
            pending: None,
            held: None,
        }
    }

    /// Update `max_segment_duration_s` — used by `AdaptiveController`'s
    /// finalization-push signal.
    pub fn set_max_segment_duration(&mut self, seconds: f64) {
        self.max_segment_duration_s = seconds;
    }

    pub fn max_segment_duration(&self) -> f64 {
        self.max_segment_duration_s
    }

    /// Feed one `(Frame, VadDecision)` pair. Returns a completed segment, if
    /// this frame caused one to finalize (forced split, silence after
    /// padding, or a too-short drop collapsing into nothing).
    pub fn process(&mut self, frame: Frame, decision: VadDecision, ts: f64) -> Option<SpeechSegment> {
        if decision.is_speech_like() {
            self.on_speech(frame, ts)
        } else {
            self.on_silence(frame, ts)
        }
    }

    fn on_speech(&mut self, frame: Frame, ts: f64) -> Option<SpeechSegment> {
        let frame_duration = frame.duration_secs();
        if self.pending.is_none() {
            if let Some(held) = self.held.as_ref() {
                if ts - held.end_ts <= self.merge_gap_threshold_s {
                    self.resume_held_segment(frame, ts, frame_duration);
                    return None;
                }
                let released = self.held.take();
                self.start_new_segment(frame, ts);
                return released;
            }
            self.start_new_segment(frame, ts);
            return None;
        }

        let current_duration = ts - self.pending.as_ref().unwrap().start_ts;
        if current_duration >= self.max_segment_duration_s {
            let finished = self.finalize_pending_for_forced_split();
            self.start_new_segment(frame, ts);
            return self.complete(finished);
        }

        self.extend_segment(frame, ts, frame_duration, 0.8);
        None
    }

    fn on_silence(&mut self, frame: Frame, ts: f64) -> Option<SpeechSegment> {
        self.push_pre_roll(frame);
        if let Some(pending) = &self.pending {
            let silence_duration = ts - pending.end_ts;
            if silence_duration >= self.padding_after_s {
                let finished = self.finalize_pending_normal();
                return self.complete(finished);
            }
            return None;
        }

        // No segment in progress: a held segment whose merge window has
        // expired with nothing arriving to merge into it is released here.
        if let Some(held) = &self.held {
            if ts - held.end_ts > self.merge_gap_threshold_s {
                return self.held.take();
            }
        }
        None
    }

    /// Resume a held segment as the active `pending` one, picking up where
    /// it left off, then extend it with the frame that just arrived —
    /// this is how a merge actually happens, rather than stitching two
    /// already-released segments back together under one id.
    fn resume_held_segment(&mut self, frame: Frame, ts: f64, frame_duration: f64) {
        let held = self.held.take().expect("resume called without held segment");
        self.pending = Some(PendingSegment {
            id: held.id,
            start_ts: held.start_ts,
            end_ts: held.end_ts,
            pcm: held.pcm,
            sample_rate: held.sample_rate,
            confidence: held.vad_confidence,
        });
        self.pre_roll.clear();
        self.extend_segment(frame, ts, frame_duration, 0.8);
    }

    fn start_new_segment(&mut self, frame: Frame, ts: f64) {
        let sample_rate = frame.sample_rate;
        let pre_samples: Vec<i16> = self
            .pre_roll
            .iter()
            .flat_map(|f| f.samples.iter().copied())
            .collect();
        let pre_duration = pre_samples.len() as f64 / sample_rate as f64;
        let mut pcm = pre_samples;
        pcm.extend_from_slice(&frame.samples);

        self.pending = Some(PendingSegment {
            id: Uuid::new_v4(),
            start_ts: ts - pre_duration,
            end_ts: ts + frame.duration_secs(),
            pcm,
            sample_rate,
            confidence: 0.8,
        });
        self.pre_roll.clear();
        debug!(start_ts = ts - pre_duration, "segment started");
    }

    fn extend_segment(&mut self, frame: Frame, ts: f64, frame_duration: f64, confidence: f32) {
        let pending = self.pending.as_mut().expect("extend called without pending");
        pending.pcm.extend_from_slice(&frame.samples);
        pending.end_ts = ts + frame_duration;
        pending.confidence =
            pending.confidence * (1.0 - EXTEND_CONFIDENCE_ALPHA) + confidence * EXTEND_CONFIDENCE_ALPHA;
    }

    /// Finalize with post-roll padding applied (normal end-of-speech path).
    fn finalize_pending_normal(&mut self) -> PendingSegment {
        let mut pending = self.pending.take().expect("finalize without pending");
        pending.end_ts += self.padding_after_s;
        self.pre_roll.clear();
        pending
    }

    /// Finalize due to `max_segment_duration` — no padding carryover (spec
    /// §4.D: "the Segmenter finalizes ... no padding carryover").
    fn finalize_pending_for_forced_split(&mut self) -> PendingSegment {
        self.pending.take().expect("finalize without pending")
    }

    fn push_pre_roll(&mut self, frame: Frame) {
        if self.pre_roll_capacity_s <= 0.0 {
            return;
        }
        self.pre_roll.push_back(frame);
        let mut total: f64 = self.pre_roll.iter().map(|f| f.duration_secs()).sum();
        while total > self.pre_roll_capacity_s && self.pre_roll.len() > 1 {
            if let Some(f) = self.pre_roll.pop_front() {
                total -= f.duration_secs();
            }
        }
    }

    /// Apply the drop-too-short rule, converting a finished `PendingSegment`
    /// into the caller-facing `SpeechSegment`.
    fn to_segment(&self, pending: PendingSegment) -> Option<SpeechSegment> {
        let duration = pending.end_ts - pending.start_ts;
        if duration < self.min_segment_duration_s {
            debug!(duration, "segment dropped: shorter than min_segment_duration");
            return None;
        }
        Some(SpeechSegment {
            id: pending.id,
            start_ts: pending.start_ts,
            end_ts: pending.end_ts,
            pcm: pending.pcm,
            sample_rate: pending.sample_rate,
            vad_confidence: pending.confidence,
        })
    }

    /// Apply the drop-too-short rule, then hold the result against the merge
    /// window instead of releasing it immediately: a segment that's already
    /// been handed to the caller can't un-become part of a later merge, so
    /// nothing is released here until we know whether the next bit of
    /// speech lands close enough behind it to merge (`on_speech`/
    /// `on_silence` release `held` once that's settled one way or the
    /// other). Every segment this produces keeps a single, stable id across
    /// its whole hold-then-release lifetime, so a caller never sees two
    /// distinct finals for the same `segment_id`.
    fn complete(&mut self, pending: PendingSegment) -> Option<SpeechSegment> {
        let segment = self.to_segment(pending)?;

        if self.merge_gap_threshold_s <= 0.0 {
            return Some(segment);
        }

        match self.held.take() {
            Some(held) if segment.start_ts - held.end_ts <= self.merge_gap_threshold_s => {
                self.held = Some(merge_segments(held, segment));
                None
            }
            Some(held) => {
                self.held = Some(segment);
                Some(held)
            }
            None => {
                self.held = Some(segment);
                None
            }
        }
    }

    /// Flush whatever is in flight, e.g. on stream stop. Any pending audio
    /// and any held segment are combined into at most one released result,
    /// so a caller that always drains with `force_finalize` on shutdown
    /// never has a segment stranded in `held`.
    pub fn force_finalize(&mut self) -> Option<SpeechSegment> {
        let finished = self.pending.take().map(|mut pending| {
            pending.end_ts += self.padding_after_s;
            pending
        });
        let finished_segment = finished.and_then(|p| self.to_segment(p));

        match (self.held.take(), finished_segment) {
            (Some(held), Some(finished)) => Some(merge_segments(held, finished)),
            (Some(held), None) => Some(held),
            (None, Some(finished)) => Some(finished),
            (None, None) => None,
        }
    }
}

fn merge_segments(prev: SpeechSegment, next: SpeechSegment) -> SpeechSegment {
    let mut pcm = prev.pcm;
    pcm.extend_from_slice(&next.pcm);
    SpeechSegment {
        id: prev.id,
        start_ts: prev.start_ts,
        end_ts: next.end_ts,
        pcm,
        sample_rate: prev.sample_rate,
        vad_confidence: (prev.vad_confidence + next.vad_confidence) / 2.0,
    }
}
