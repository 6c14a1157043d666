/// Feeder and worker loops of a scan job.
///
/// The feeder walks the archive's enumeration and pushes file entries into a
/// bounded crossbeam channel. Workers pull from that channel, which is the
/// only serialized step; the entry read itself runs with no lock held, and
/// the result lands in the shared atomics.
///
/// Cancellation is cooperative. Both loops check the token between entries,
/// never in the middle of a read. Workers poll the queue with a short timeout
/// so a cancelled job does not wait for the feeder to produce the next entry.
use super::progress::ScanProgress;
use super::stats::StatsAggregator;
use super::CancelToken;
use crate::archive::{ArchiveEntry, ArchiveSource};
use crate::error::ArcError;
use crate::mount::MountId;
use crate::notify::Subscribers;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// How often an idle worker re-checks the cancellation token.
const CANCEL_POLL: Duration = Duration::from_millis(25);

/// Enumerate `source` into `queue` until exhausted or cancelled.
pub(crate) fn feed(
    archive: MountId,
    source: Arc<dyn ArchiveSource>,
    queue: Sender<ArchiveEntry>,
    cancel: CancelToken,
) {
    let mut queued: u64 = 0;
    for entry in source.entries() {
        if cancel.is_cancelled() {
            break;
        }
        if !entry.is_file() {
            continue;
        }
        // Fails only when every worker has gone away.
        if queue.send(entry).is_err() {
            break;
        }
        queued += 1;
    }
    debug!("Scan {archive}: feeder done after {queued} entries");
}

pub(crate) struct Worker {
    pub archive: MountId,
    pub index: usize,
    pub generation: u64,
    pub started_at: Instant,
    pub source: Arc<dyn ArchiveSource>,
    pub queue: Receiver<ArchiveEntry>,
    pub cancel: CancelToken,
    pub stats: Arc<StatsAggregator>,
    pub progress: Arc<Subscribers<ScanProgress>>,
}

impl Worker {
    pub fn run(self) {
        debug!(
            "Scan {} gen {}: worker {} started",
            self.archive, self.generation, self.index
        );

        let mut superseded = false;
        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            let entry = match self.queue.recv_timeout(CANCEL_POLL) {
                Ok(entry) => entry,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            };

            let result = self.source.read(&entry);

            // A newer generation owns the counters now.
            if self.stats.generation() != self.generation {
                debug!(
                    "Scan {}: worker {} discarding result from superseded generation {}",
                    self.archive, self.index, self.generation
                );
                superseded = true;
                break;
            }

            match result {
                Ok(bytes) => self.stats.counters().record_done(bytes.len() as u64),
                Err(source) => {
                    let err = ArcError::ReadError {
                        entry: entry.path.to_string(),
                        source,
                    };
                    warn!("Scan {}: {err}", self.archive);
                    self.stats.counters().record_failed();
                }
            }
        }

        debug!(
            "Scan {} gen {}: worker {} exiting",
            self.archive, self.generation, self.index
        );

        // A superseded worker was already accounted for when its job ended.
        if superseded {
            return;
        }
        if self.stats.worker_exited() {
            let message = if self.cancel.is_cancelled() {
                ScanProgress::Stopped {
                    archive: self.archive,
                    generation: self.generation,
                }
            } else {
                let values = self.stats.counters().load();
                ScanProgress::Completed {
                    archive: self.archive,
                    generation: self.generation,
                    duration: self.started_at.elapsed(),
                    files_done: values.files_done,
                    files_failed: values.files_failed,
                }
            };
            self.progress.publish(&message);
        }
    }
}
