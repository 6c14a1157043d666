/// Scan statistics: lock-free counters on the producer side, consistent
/// snapshots on the observer side.
///
/// Workers only ever touch [`ScanCounters`] atomics. Everything an observer
/// needs beyond the raw counts (timing, the last published snapshot, the
/// sliding-window rates) lives behind a mutex that producers never take in
/// their per-entry path.
use crate::mount::MountId;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Raw per-job counters, safe under concurrent increment.
#[derive(Debug, Default)]
pub struct ScanCounters {
    files_processed: AtomicU64,
    files_done: AtomicU64,
    files_failed: AtomicU64,
    bytes_processed: AtomicU64,
}

/// Plain copy of [`ScanCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterValues {
    pub files_processed: u64,
    pub files_done: u64,
    pub files_failed: u64,
    pub bytes_processed: u64,
}

impl ScanCounters {
    /// One entry read successfully.
    #[inline]
    pub fn record_done(&self, bytes: u64) {
        self.files_done.fetch_add(1, Ordering::Relaxed);
        self.bytes_processed.fetch_add(bytes, Ordering::Relaxed);
        self.files_processed.fetch_add(1, Ordering::Release);
    }

    /// One entry failed to read.
    #[inline]
    pub fn record_failed(&self) {
        self.files_failed.fetch_add(1, Ordering::Relaxed);
        self.files_processed.fetch_add(1, Ordering::Release);
    }

    pub fn load(&self) -> CounterValues {
        CounterValues {
            files_processed: self.files_processed.load(Ordering::Acquire),
            files_done: self.files_done.load(Ordering::Relaxed),
            files_failed: self.files_failed.load(Ordering::Relaxed),
            bytes_processed: self.bytes_processed.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.files_processed.store(0, Ordering::Relaxed);
        self.files_done.store(0, Ordering::Relaxed);
        self.files_failed.store(0, Ordering::Relaxed);
        self.bytes_processed.store(0, Ordering::Relaxed);
    }
}

/// Sliding-window rate estimator.
///
/// Samples are accumulated as `(amount, duration)` chunks. Chunks older than
/// the window are discarded, except that the newest chunk is always kept so
/// the rate never drops to zero just because sampling is sparse.
#[derive(Debug, Clone)]
pub struct RateWindow {
    window: Duration,
    chunks: VecDeque<(u64, Duration)>,
    samples: u64,
    span: Duration,
    value: f64,
}

impl RateWindow {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            chunks: VecDeque::new(),
            samples: 0,
            span: Duration::ZERO,
            value: 0.0,
        }
    }

    pub fn hit(&mut self, samples: u64, elapsed: Duration) {
        self.chunks.push_back((samples, elapsed));
        self.samples += samples;
        self.span += elapsed;

        while self.span > self.window && self.chunks.len() > 1 {
            if let Some((s, d)) = self.chunks.pop_front() {
                self.samples -= s;
                self.span -= d;
            }
        }

        self.value = if self.span.is_zero() {
            0.0
        } else {
            self.samples as f64 / self.span.as_secs_f64()
        };
    }

    /// Amount per second over the current window.
    #[inline]
    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn reset(&mut self) {
        self.chunks.clear();
        self.samples = 0;
        self.span = Duration::ZERO;
        self.value = 0.0;
    }
}

/// Point-in-time view of one scan job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSnapshot {
    pub archive: MountId,
    pub generation: u64,
    pub thread_count: usize,
    pub running: bool,
    pub files_processed: u64,
    pub files_done: u64,
    pub files_failed: u64,
    pub bytes_processed: u64,
    pub elapsed_ms: u64,
    /// Average since the job started.
    pub files_per_second: f64,
    pub bytes_per_second: f64,
    /// Over the sliding window only.
    pub recent_files_per_second: f64,
    pub recent_bytes_per_second: f64,
}

#[derive(Debug)]
struct ObserverState {
    started_at: Option<Instant>,
    finished_at: Option<Instant>,
    last: Option<ScanSnapshot>,
    last_sample_at: Option<Instant>,
    files_window: RateWindow,
    bytes_window: RateWindow,
}

/// Counters plus timing for one archive's scan jobs.
///
/// One aggregator is created per archive and reused across job generations;
/// [`begin`](Self::begin) resets it for a new generation.
#[derive(Debug)]
pub struct StatsAggregator {
    archive: MountId,
    counters: ScanCounters,
    generation: AtomicU64,
    active_workers: AtomicUsize,
    thread_count: AtomicUsize,
    min_rate_interval: Duration,
    observer: Mutex<ObserverState>,
}

impl StatsAggregator {
    pub fn new(archive: MountId, min_rate_interval: Duration, rate_window: Duration) -> Self {
        Self {
            archive,
            counters: ScanCounters::default(),
            generation: AtomicU64::new(0),
            active_workers: AtomicUsize::new(0),
            thread_count: AtomicUsize::new(0),
            min_rate_interval,
            observer: Mutex::new(ObserverState {
                started_at: None,
                finished_at: None,
                last: None,
                last_sample_at: None,
                files_window: RateWindow::new(rate_window),
                bytes_window: RateWindow::new(rate_window),
            }),
        }
    }

    #[inline]
    pub fn counters(&self) -> &ScanCounters {
        &self.counters
    }

    /// Current job generation; 0 means no job was ever started.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.active_workers.load(Ordering::Acquire) > 0
    }

    /// Reset for a new job and return its generation.
    pub fn begin(&self, thread_count: usize, now: Instant) -> u64 {
        let mut obs = self.observer.lock();
        self.counters.reset();
        self.thread_count.store(thread_count, Ordering::Relaxed);
        self.active_workers.store(thread_count, Ordering::Release);
        obs.started_at = Some(now);
        obs.finished_at = None;
        obs.last = None;
        obs.last_sample_at = Some(now);
        obs.files_window.reset();
        obs.bytes_window.reset();
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// A worker left the job. Returns `true` for the last one out, which
    /// also freezes the elapsed time.
    pub fn worker_exited(&self) -> bool {
        let previous = self
            .active_workers
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .unwrap_or(0);
        if previous == 1 {
            self.mark_finished(Instant::now());
            true
        } else {
            false
        }
    }

    /// Force the job into the finished state (used after joining workers
    /// that may have panicked without checking out).
    pub fn force_finished(&self) {
        if self.active_workers.swap(0, Ordering::AcqRel) > 0 {
            self.mark_finished(Instant::now());
        }
    }

    fn mark_finished(&self, now: Instant) {
        let mut obs = self.observer.lock();
        if obs.finished_at.is_none() {
            obs.finished_at = Some(now);
        }
    }

    /// Build a snapshot as of `now`.
    ///
    /// Within one generation the returned counters never go backwards, even
    /// if the relaxed loads race with concurrent increments.
    pub fn snapshot(&self, now: Instant) -> ScanSnapshot {
        let mut obs = self.observer.lock();
        let generation = self.generation();
        let values = self.counters.load();
        let running = self.is_running();

        let end = obs.finished_at.unwrap_or(now);
        let elapsed = obs
            .started_at
            .map(|start| end.saturating_duration_since(start))
            .unwrap_or_default();

        let (files_per_second, bytes_per_second) = if elapsed < self.min_rate_interval {
            (0.0, 0.0)
        } else {
            let secs = elapsed.as_secs_f64();
            (
                values.files_processed as f64 / secs,
                values.bytes_processed as f64 / secs,
            )
        };

        let mut snap = ScanSnapshot {
            archive: self.archive,
            generation,
            thread_count: self.thread_count.load(Ordering::Relaxed),
            running,
            files_processed: values.files_processed,
            files_done: values.files_done,
            files_failed: values.files_failed,
            bytes_processed: values.bytes_processed,
            elapsed_ms: elapsed.as_millis() as u64,
            files_per_second,
            bytes_per_second,
            recent_files_per_second: 0.0,
            recent_bytes_per_second: 0.0,
        };

        if let Some(last) = obs.last.as_ref().filter(|l| l.generation == generation) {
            snap.files_processed = snap.files_processed.max(last.files_processed);
            snap.files_done = snap.files_done.max(last.files_done);
            snap.files_failed = snap.files_failed.max(last.files_failed);
            snap.bytes_processed = snap.bytes_processed.max(last.bytes_processed);
        }

        if running {
            let (prev_files, prev_bytes) = obs
                .last
                .as_ref()
                .filter(|l| l.generation == generation)
                .map(|l| (l.files_processed, l.bytes_processed))
                .unwrap_or((0, 0));
            let since = obs
                .last_sample_at
                .map(|t| now.saturating_duration_since(t))
                .unwrap_or_default();
            if !since.is_zero() {
                obs.files_window
                    .hit(snap.files_processed - prev_files, since);
                obs.bytes_window
                    .hit(snap.bytes_processed - prev_bytes, since);
                obs.last_sample_at = Some(now);
            }
        }
        snap.recent_files_per_second = obs.files_window.value();
        snap.recent_bytes_per_second = obs.bytes_window.value();

        obs.last = Some(snap.clone());
        snap
    }
}
