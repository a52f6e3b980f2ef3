//! `StagePipeline` — bounded-queue, worker-pool-per-stage concurrency model
//! (spec §4.E).
//!
//! Built on `crossbeam-channel` (already a teacher dependency) rather than
//! `tokio::sync::mpsc`, since the collaborators (`AsrBackend`,
//! `TranslatorBackend`) are synchronous trait objects and the pipeline itself
//! is plain OS threads per §5. A bounded `crossbeam_channel::bounded` is a
//! FIFO queue whose receiver end can `try_recv` the head — exactly what
//! "pop oldest from the head" (§4.E feed discipline) needs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use tracing::{error, warn};

use crate::model::PipelineMetrics;

/// Result of `Stage::feed`, per spec §4.E.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedResult {
    Accepted,
    AcceptedWithDrop,
    Rejected,
}

/// How a full input queue is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    DropOldest,
    Reject,
}

/// Dequeue timeout for worker threads — short enough that `stop()` is
/// responsive (§5: "workers block on queue get with a short timeout <= 100ms").
const WORKER_RECV_TIMEOUT: Duration = Duration::from_millis(100);

/// A single stage: bounded input queue, a pool of worker threads running
/// `process`, and an optional output sender.
pub struct Stage<In: Send + 'static> {
    sender: Sender<In>,
    receiver: Receiver<In>,
    capacity: usize,
    overflow_policy: OverflowPolicy,
    metrics: Arc<PipelineMetrics>,
    shutdown: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
    name: &'static str,
}

impl<In: Send + 'static> Stage<In> {
    /// Construct a stage with capacity `queue_capacity` and `worker_count`
    /// worker threads, each running `process` on dequeued items.
    pub fn start<F>(
        name: &'static str,
        queue_capacity: usize,
        worker_count: usize,
        overflow_policy: OverflowPolicy,
        process: F,
    ) -> Self
    where
        F: Fn(In) + Send + Sync + 'static,
    {
        let (sender, receiver) = bounded(queue_capacity.max(1));
        let metrics = Arc::new(PipelineMetrics::new());
        let shutdown = Arc::new(AtomicBool::new(false));
        let process = Arc::new(process);

        let mut workers = Vec::with_capacity(worker_count.max(1));
        for worker_idx in 0..worker_count.max(1) {
            let receiver = receiver.clone();
            let shutdown = Arc::clone(&shutdown);
            let metrics = Arc::clone(&metrics);
            let process = Arc::clone(&process);
            let handle = std::thread::Builder::new()
                .name(format!("{name}-worker-{worker_idx}"))
                .spawn(move || {
                    worker_loop(name, receiver, shutdown, metrics, process);
                })
                .expect("failed to spawn stage worker thread");
            workers.push(handle);
        }

        Self {
            sender,
            receiver,
            capacity: queue_capacity.max(1),
            overflow_policy,
            metrics,
            shutdown,
            workers,
            name,
        }
    }

    /// Enqueue `item` per the feed discipline in spec §4.E.
    pub fn feed(&self, item: In) -> FeedResult {
        match self.sender.try_send(item) {
            Ok(()) => FeedResult::Accepted,
            Err(crossbeam_channel::TrySendError::Full(item)) => match self.overflow_policy {
                OverflowPolicy::DropOldest => {
                    match self.receiver.try_recv() {
                        Ok(_) => {
                            self.metrics.record_dropped();
                            match self.sender.try_send(item) {
                                Ok(()) => FeedResult::AcceptedWithDrop,
                                Err(_) => {
                                    // Raced with a worker draining concurrently; count this as a drop too.
                                    self.metrics.record_dropped();
                                    FeedResult::Rejected
                                }
                            }
                        }
                        Err(TryRecvError::Empty) => {
                            // A worker already drained the head; retry the send once.
                            match self.sender.try_send(item) {
                                Ok(()) => FeedResult::Accepted,
                                Err(_) => {
                                    self.metrics.record_dropped();
                                    FeedResult::Rejected
                                }
                            }
                        }
                        Err(TryRecvError::Disconnected) => {
                            self.metrics.record_dropped();
                            FeedResult::Rejected
                        }
                    }
                }
                OverflowPolicy::Reject => {
                    self.metrics.record_dropped();
                    FeedResult::Rejected
                }
            },
            Err(crossbeam_channel::TrySendError::Disconnected(_)) => {
                self.metrics.record_dropped();
                FeedResult::Rejected
            }
        }
    }

    pub fn queue_depth(&self) -> usize {
        self.sender.len()
    }

    pub fn queue_capacity(&self) -> usize {
        self.capacity
    }

    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }

    /// Signal shutdown and join all worker threads, draining but not
    /// re-processing the input queue (spec §4.E).
    pub fn stop(mut self, grace: Duration) {
        self.shutdown.store(true, Ordering::SeqCst);
        let deadline = Instant::now() + grace;
        for handle in self.workers.drain(..) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            // JoinHandle has no timed join; workers themselves observe the
            // shutdown flag within WORKER_RECV_TIMEOUT, so a plain join is
            // bounded in practice. `remaining` is kept for documentation of
            // intent and future instrumentation.
            let _ = remaining;
            if let Err(e) = handle.join() {
                error!(stage = self.name, ?e, "stage worker panicked");
            }
        }
    }
}

fn worker_loop<In: Send + 'static>(
    name: &'static str,
    receiver: Receiver<In>,
    shutdown: Arc<AtomicBool>,
    metrics: Arc<PipelineMetrics>,
    process: Arc<dyn Fn(In) + Send + Sync>,
) {
    loop {
        if shutdown.load(Ordering::Relaxed) {
            // Drain remaining items without processing them, per spec.
            while receiver.try_recv().is_ok() {}
            break;
        }
        match receiver.recv_timeout(WORKER_RECV_TIMEOUT) {
            Ok(item) => {
                let start = Instant::now();
                process(item);
                metrics.record_processed(start.elapsed());
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                warn!(stage = name, "stage input channel disconnected");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    #[test]
    fn feed_accepts_when_queue_not_full() {
        let processed = Arc::new(Mutex::new(Vec::new()));
        let processed2 = Arc::clone(&processed);
        let stage = Stage::start("test", 4, 1, OverflowPolicy::Reject, move |item: i32| {
            processed2.lock().unwrap().push(item);
        });
        assert_eq!(stage.feed(1), FeedResult::Accepted);
        std::thread::sleep(Duration::from_millis(50));
        stage.stop(Duration::from_secs(1));
        assert_eq!(*processed.lock().unwrap(), vec![1]);
    }

    #[test]
    fn reject_policy_drops_and_counts_when_full() {
        let gate = Arc::new(AtomicBool::new(false));
        let gate2 = Arc::clone(&gate);
        // worker blocks until gate flips, so queue fills up deterministically
        let stage = Stage::start("test", 1, 1, OverflowPolicy::Reject, move |_item: i32| {
            while !gate2.load(Ordering::Relaxed) {
                std::thread::sleep(Duration::from_millis(5));
            }
        });
        assert_eq!(stage.feed(1), FeedResult::Accepted); // taken by the worker
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(stage.feed(2), FeedResult::Accepted); // fills the 1-slot queue
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(stage.feed(3), FeedResult::Rejected);
        assert_eq!(stage.metrics().snapshot().segments_dropped, 1);
        gate.store(true, Ordering::Relaxed);
        stage.stop(Duration::from_secs(1));
    }

    #[test]
    fn drop_oldest_policy_evicts_head_on_overflow() {
        let counter = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(AtomicBool::new(false));
        let gate2 = Arc::clone(&gate);
        let counter2 = Arc::clone(&counter);
        let stage = Stage::start("test", 1, 1, OverflowPolicy::DropOldest, move |_item: i32| {
            counter2.fetch_add(1, Ordering::Relaxed);
            while !gate2.load(Ordering::Relaxed) {
                std::thread::sleep(Duration::from_millis(5));
            }
        });
        stage.feed(1); // taken by worker immediately
        std::thread::sleep(Duration::from_millis(20));
        stage.feed(2); // fills queue
        std::thread::sleep(Duration::from_millis(20));
        let result = stage.feed(3); // evicts 2, enqueues 3
        assert_eq!(result, FeedResult::AcceptedWithDrop);
        assert_eq!(stage.metrics().snapshot().segments_dropped, 1);
        gate.store(true, Ordering::Relaxed);
        stage.stop(Duration::from_secs(1));
    }

    #[test]
    fn metrics_track_processed_count_and_latency() {
        let stage = Stage::start("test", 8, 2, OverflowPolicy::DropOldest, |_item: i32| {
            std::thread::sleep(Duration::from_millis(1));
        });
        for i in 0..5 {
            stage.feed(i);
        }
        std::thread::sleep(Duration::from_millis(100));
        let snap = stage.metrics().snapshot();
        stage.stop(Duration::from_secs(1));
        assert_eq!(snap.segments_processed, 5);
    }
}
