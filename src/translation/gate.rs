//! `EmissionGate` — releases `Translation`s in strictly non-decreasing
//! `sequence` order, forcing a release after `2 * target_ttft_ms` if a gap
//! never fills (spec §4.G).

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use tracing::warn;

use crate::model::Translation;

pub struct EmissionGate {
    next_sequence: u64,
    pending: BTreeMap<u64, Translation>,
    /// When the current gap (`next_sequence` missing from `pending`) first
    /// became visible; `None` while there is no gap to time out.
    gap_opened_at: Option<Instant>,
    gap_timeout: Duration,
    sequence_gaps: AtomicUsize,
}

impl EmissionGate {
    pub fn new(target_ttft_ms: u32) -> Self {
        Self {
            next_sequence: 0,
            pending: BTreeMap::new(),
            gap_opened_at: None,
            gap_timeout: Duration::from_millis(u64::from(target_ttft_ms) * 2),
            sequence_gaps: AtomicUsize::new(0),
        }
    }

    pub fn sequence_gaps(&self) -> usize {
        self.sequence_gaps.load(Ordering::Relaxed)
    }

    /// Submit one arrival and drain whatever becomes releasable, evaluated
    /// at `now` (explicit rather than `Instant::now()` so tests can drive
    /// the timeout deterministically).
    pub fn submit(&mut self, translation: Translation, now: Instant) -> Vec<Translation> {
        self.pending.insert(translation.sequence, translation);
        self.drain(now)
    }

    /// Re-evaluate the timeout without a new arrival — call periodically so
    /// a gap that nothing ever fills still gets forced open.
    pub fn poll(&mut self, now: Instant) -> Vec<Translation> {
        self.drain(now)
    }

    fn drain(&mut self, now: Instant) -> Vec<Translation> {
        let mut released = Vec::new();

        loop {
            match self.pending.first_key_value() {
                Some((&seq, _)) if seq == self.next_sequence => {
                    let t = self.pending.remove(&seq).expect("key just observed");
                    released.push(t);
                    self.next_sequence += 1;
                    self.gap_opened_at = None;
                }
                Some(_) => {
                    // A gap exists: the head of `pending` is ahead of
                    // `next_sequence`. Start (or continue) timing it.
                    let opened = *self.gap_opened_at.get_or_insert(now);
                    if now.saturating_duration_since(opened) >= self.gap_timeout {
                        let (&skip_to, _) = self.pending.first_key_value().expect("checked Some above");
                        let skipped = skip_to - self.next_sequence;
                        self.sequence_gaps.fetch_add(skipped as usize, Ordering::Relaxed);
                        warn!(
                            skipped,
                            next_sequence = self.next_sequence,
                            forced_to = skip_to,
                            "emission gate forced past a sequence gap"
                        );
                        self.next_sequence = skip_to;
                        self.gap_opened_at = None;
                        // loop again: the head now matches next_sequence
                    } else {
                        break;
                    }
                }
                None => break,
            }
        }

        released
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LanguageCode;

    fn translation(sequence: u64, is_final: bool) -> Translation {
        Translation {
            segment_id: uuid::Uuid::nil(),
            source_text: "s".into(),
            translated_text: "t".into(),
            src: LanguageCode::new("en"),
            tgt: LanguageCode::new("fr"),
            confidence: 0.9,
            is_final,
            sequence,
        }
    }

    #[test]
    fn releases_in_order_as_gaps_fill() {
        let mut gate = EmissionGate::new(2_000);
        let now = Instant::now();
        assert!(gate.submit(translation(1, false), now).is_empty());
        assert!(gate.submit(translation(2, false), now).is_empty());
        let released = gate.submit(translation(0, false), now);
        assert_eq!(
            released.iter().map(|t| t.sequence).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn out_of_order_arrival_waits_for_gap() {
        let mut gate = EmissionGate::new(2_000);
        let now = Instant::now();
        let released = gate.submit(translation(1, false), now);
        assert!(released.is_empty());
    }

    #[test]
    fn gap_forces_release_after_timeout_and_records_metric() {
        let mut gate = EmissionGate::new(100); // gap_timeout = 200ms
        let t0 = Instant::now();
        assert!(gate.submit(translation(1, false), t0).is_empty());
        // not yet timed out
        assert!(gate.poll(t0 + Duration::from_millis(50)).is_empty());
        let released = gate.poll(t0 + Duration::from_millis(250));
        assert_eq!(released.len(), 1);
        assert_eq!(released[0].sequence, 1);
        assert_eq!(gate.sequence_gaps(), 1);
    }
}
