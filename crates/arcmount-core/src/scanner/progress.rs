/// Scan lifecycle messages published by the engine.
///
/// These carry only lifecycle transitions; live counters are read through
/// [`ScanEngine::snapshot`](super::ScanEngine::snapshot).
use crate::mount::MountId;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum ScanProgress {
    /// Workers were spawned for a new job generation.
    Started {
        archive: MountId,
        generation: u64,
        threads: usize,
    },
    /// Every entry was dequeued and the last worker exited.
    Completed {
        archive: MountId,
        generation: u64,
        duration: Duration,
        files_done: u64,
        files_failed: u64,
    },
    /// The job was cancelled (stop, unmount or voiding).
    Stopped { archive: MountId, generation: u64 },
}

impl ScanProgress {
    pub fn archive(&self) -> MountId {
        match self {
            Self::Started { archive, .. }
            | Self::Completed { archive, .. }
            | Self::Stopped { archive, .. } => *archive,
        }
    }

    /// `true` for the message that ends a job.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Started { .. })
    }
}
