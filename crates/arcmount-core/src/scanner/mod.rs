/// Scanner module — concurrent read-through of a mounted archive.
///
/// A scan job is one feeder thread plus `thread_count` worker threads per
/// archive:
///
/// - [`worker`] — the feeder/worker loops.
/// - [`stats`] — atomic counters and the snapshot aggregator.
/// - [`progress`] — lifecycle messages for frontends.
///
/// At most one job runs per archive. Each archive keeps one
/// [`StatsAggregator`] across jobs; starting a job bumps its generation and
/// zeroes its counters, so a snapshot always describes exactly one job.
pub mod progress;
pub mod stats;
pub(crate) mod worker;

pub use progress::ScanProgress;
pub use stats::{RateWindow, ScanCounters, ScanSnapshot, StatsAggregator};

use crate::archive::ArchiveEntry;
use crate::config::EngineConfig;
use crate::error::{ArcError, Result};
use crate::mount::{MountId, MountRegistry, MountStatus};
use crate::notify::Subscribers;
use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Shared cancellation flag handed to every thread of a job.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Threads and control state of one job generation.
#[derive(Debug)]
pub struct ScanJob {
    pub archive: MountId,
    pub generation: u64,
    pub thread_count: usize,
    pub started_at: Instant,
    cancel: CancelToken,
    feeder: Option<JoinHandle<()>>,
    workers: Vec<JoinHandle<()>>,
}

impl ScanJob {
    /// Signal cancellation and wait for every thread to exit.
    fn shutdown(mut self, stats: &StatsAggregator) {
        self.cancel.cancel();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                warn!("Scan {}: worker thread panicked", self.archive);
            }
        }
        if let Some(feeder) = self.feeder.take() {
            if feeder.join().is_err() {
                warn!("Scan {}: feeder thread panicked", self.archive);
            }
        }
        stats.force_finished();
    }
}

/// Per-archive scan state.
struct ScanSlot {
    stats: Arc<StatsAggregator>,
    /// Held across start and the join in stop, which serializes the two for
    /// one archive without blocking snapshot readers.
    job: Mutex<Option<ScanJob>>,
}

pub struct ScanEngine {
    registry: Arc<MountRegistry>,
    queue_capacity: usize,
    min_rate_interval: Duration,
    rate_window: Duration,
    slots: Mutex<HashMap<MountId, Arc<ScanSlot>>>,
    progress: Arc<Subscribers<ScanProgress>>,
}

impl ScanEngine {
    pub fn new(registry: Arc<MountRegistry>, config: &EngineConfig) -> Self {
        Self {
            registry,
            queue_capacity: config.queue_capacity.max(1),
            min_rate_interval: config.min_rate_interval(),
            rate_window: config.rate_window(),
            slots: Mutex::new(HashMap::new()),
            progress: Arc::new(Subscribers::new(config.notify_capacity)),
        }
    }

    /// Subscribe to job lifecycle messages.
    pub fn subscribe(&self) -> Receiver<ScanProgress> {
        self.progress.subscribe()
    }

    fn slot(&self, id: MountId) -> Arc<ScanSlot> {
        let mut slots = self.slots.lock();
        let slot = slots.entry(id).or_insert_with(|| {
            Arc::new(ScanSlot {
                stats: Arc::new(StatsAggregator::new(
                    id,
                    self.min_rate_interval,
                    self.rate_window,
                )),
                job: Mutex::new(None),
            })
        });
        Arc::clone(slot)
    }

    fn existing_slot(&self, id: MountId) -> Option<Arc<ScanSlot>> {
        self.slots.lock().get(&id).cloned()
    }

    /// Drop `slot` from the map if it is still the one registered for `id`
    /// and never ran a job.
    fn discard_slot(&self, id: MountId, slot: &Arc<ScanSlot>) {
        let mut slots = self.slots.lock();
        let unused = slots
            .get(&id)
            .is_some_and(|current| Arc::ptr_eq(current, slot) && current.stats.generation() == 0);
        if unused {
            slots.remove(&id);
        }
    }

    /// Start scanning `id` with `thread_count` workers. Returns the new job
    /// generation.
    pub fn start(&self, id: MountId, thread_count: usize) -> Result<u64> {
        if thread_count < 1 {
            return Err(ArcError::invalid("thread_count must be at least 1"));
        }
        if self.registry.status(id).is_none() {
            return Err(ArcError::NotFound(id));
        }

        let slot = self.slot(id);
        let mut job_guard = slot.job.lock();
        // Read the mount only under the job lock. An unmount moves the mount
        // out of `Mounted` before it takes this lock, so either it sees the
        // job stored here or this sees its status change.
        let Some(mount) = self.registry.get(id) else {
            drop(job_guard);
            self.discard_slot(id, &slot);
            return Err(ArcError::NotFound(id));
        };
        match mount.status {
            MountStatus::Mounted => {}
            MountStatus::Voided => return Err(ArcError::VoidedMount(id)),
            status => return Err(ArcError::NotMounted { id, status }),
        }
        let source = mount.source.ok_or(ArcError::NotMounted {
            id,
            status: mount.status,
        })?;

        if job_guard.is_some() && slot.stats.is_running() {
            return Err(ArcError::AlreadyRunning(id));
        }
        // Reap a job that finished on its own.
        if let Some(old) = job_guard.take() {
            old.shutdown(&slot.stats);
        }

        let started_at = Instant::now();
        let generation = slot.stats.begin(thread_count, started_at);
        let cancel = CancelToken::new();
        let (tx, rx) = crossbeam_channel::bounded::<ArchiveEntry>(self.queue_capacity);
        // Published before any worker can report the end of the job.
        self.progress.publish(&ScanProgress::Started {
            archive: id,
            generation,
            threads: thread_count,
        });

        let mut workers = Vec::with_capacity(thread_count);
        for index in 0..thread_count {
            let worker = worker::Worker {
                archive: id,
                index,
                generation,
                started_at,
                source: Arc::clone(&source),
                queue: rx.clone(),
                cancel: cancel.clone(),
                stats: Arc::clone(&slot.stats),
                progress: Arc::clone(&self.progress),
            };
            let spawned = thread::Builder::new()
                .name(format!("arcmount-scan-{}-{index}", id.0))
                .spawn(move || worker.run());
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(err) => {
                    let partial = ScanJob {
                        archive: id,
                        generation,
                        thread_count,
                        started_at,
                        cancel,
                        feeder: None,
                        workers,
                    };
                    drop(rx);
                    partial.shutdown(&slot.stats);
                    return Err(ArcError::Io(err));
                }
            }
        }
        drop(rx);

        let feeder_source = Arc::clone(&source);
        let feeder_cancel = cancel.clone();
        let feeder = thread::Builder::new()
            .name(format!("arcmount-feed-{}", id.0))
            .spawn(move || worker::feed(id, feeder_source, tx, feeder_cancel));
        let feeder = match feeder {
            Ok(handle) => handle,
            Err(err) => {
                let partial = ScanJob {
                    archive: id,
                    generation,
                    thread_count,
                    started_at,
                    cancel,
                    feeder: None,
                    workers,
                };
                partial.shutdown(&slot.stats);
                return Err(ArcError::Io(err));
            }
        };

        info!(
            "Scan {id} ({}) started: generation {generation}, {thread_count} threads",
            mount.label
        );
        *job_guard = Some(ScanJob {
            archive: id,
            generation,
            thread_count,
            started_at,
            cancel,
            feeder: Some(feeder),
            workers,
        });
        Ok(generation)
    }

    /// Cancel the job for `id` and wait until every worker has exited.
    ///
    /// A no-op when nothing is running. After this returns, counters for the
    /// job no longer change.
    pub fn stop(&self, id: MountId) -> Result<()> {
        let Some(slot) = self.existing_slot(id) else {
            return Ok(());
        };
        let mut job_guard = slot.job.lock();
        if let Some(job) = job_guard.take() {
            let was_running = slot.stats.is_running();
            let generation = job.generation;
            job.shutdown(&slot.stats);
            if was_running {
                info!("Scan {id} stopped (generation {generation})");
            }
        }
        Ok(())
    }

    /// Stop the job for `id` on behalf of an unmount.
    ///
    /// Unlike [`stop`](Self::stop) this always takes the archive's job lock,
    /// even when no job was ever started, so a `start` that is still between
    /// its checks finishes first. The caller must already have moved the
    /// mount out of `Mounted`; after this returns no worker of `id` runs and
    /// none can be started.
    pub fn retire(&self, id: MountId) {
        let slot = self.slot(id);
        let mut job_guard = slot.job.lock();
        if let Some(job) = job_guard.take() {
            let generation = job.generation;
            job.shutdown(&slot.stats);
            debug!("Scan {id} retired (generation {generation})");
        }
    }

    /// Signal cancellation without waiting. In-flight reads still finish and
    /// are counted; the job then stops by itself.
    pub fn request_stop(&self, id: MountId) {
        if let Some(slot) = self.existing_slot(id) {
            if let Some(job) = slot.job.lock().as_ref() {
                job.cancel.cancel();
            }
        }
    }

    /// Stop every job.
    pub fn stop_all(&self) {
        let ids: Vec<MountId> = self.slots.lock().keys().copied().collect();
        for id in ids {
            // stop() never fails; it returns Result for interface symmetry.
            let _ = self.stop(id);
        }
    }

    /// Stop and drop all scan state for `id` (used on unmount).
    pub fn forget(&self, id: MountId) {
        let _ = self.stop(id);
        self.slots.lock().remove(&id);
    }

    /// Current statistics for `id`.
    ///
    /// Fails with `NotRunning` if no job was ever started for it. After a job
    /// ends the snapshot stays available and frozen.
    pub fn snapshot(&self, id: MountId) -> Result<ScanSnapshot> {
        let slot = self.existing_slot(id).ok_or(ArcError::NotRunning(id))?;
        if slot.stats.generation() == 0 {
            return Err(ArcError::NotRunning(id));
        }
        Ok(slot.stats.snapshot(Instant::now()))
    }

    pub fn is_running(&self, id: MountId) -> bool {
        self.existing_slot(id)
            .map(|slot| slot.stats.is_running())
            .unwrap_or(false)
    }

    /// Archives with a running job.
    pub fn active_jobs(&self) -> Vec<MountId> {
        let mut ids: Vec<MountId> = self
            .slots
            .lock()
            .iter()
            .filter(|(_, slot)| slot.stats.is_running())
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids
    }
}

impl Drop for ScanEngine {
    fn drop(&mut self) {
        self.stop_all();
    }
}
