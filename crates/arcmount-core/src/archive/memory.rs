/// An in-memory archive with scripted behaviour.
///
/// Besides plain entries it can mark entries as unreadable, slow every read
/// down, make `close` fail, and count reads that arrive after `close`. Tests
/// use it to check the scanner and mount lifecycle without touching disk.
use super::{ArchiveEntry, ArchiveError, ArchiveOpener, ArchiveSource};
use compact_str::CompactString;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
struct MemoryEntry {
    entry: ArchiveEntry,
    /// `None` makes every read of this entry fail.
    data: Option<Arc<[u8]>>,
}

#[derive(Debug, Default)]
pub struct MemoryArchive {
    entries: Vec<MemoryEntry>,
    read_delay: Option<Duration>,
    fail_close: bool,
    closed: AtomicBool,
    reads: AtomicU64,
    reads_after_close: AtomicU64,
    enumerations: AtomicU64,
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a readable file entry.
    pub fn with_file(mut self, path: impl Into<CompactString>, data: Vec<u8>) -> Self {
        let entry = ArchiveEntry::file(path, data.len() as u64);
        self.entries.push(MemoryEntry {
            entry,
            data: Some(data.into()),
        });
        self
    }

    /// Add a file entry of `size` bytes whose reads always fail.
    pub fn with_unreadable(mut self, path: impl Into<CompactString>, size: u64) -> Self {
        self.entries.push(MemoryEntry {
            entry: ArchiveEntry::file(path, size),
            data: None,
        });
        self
    }

    pub fn with_dir(mut self, path: impl Into<CompactString>) -> Self {
        self.entries.push(MemoryEntry {
            entry: ArchiveEntry::dir(path),
            data: Some(Arc::from(Vec::new())),
        });
        self
    }

    /// Sleep for `delay` inside every read.
    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = Some(delay);
        self
    }

    /// Make `close` report an error (the archive still stops serving reads).
    pub fn with_close_failure(mut self) -> Self {
        self.fail_close = true;
        self
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Total number of `read` calls.
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Reads that started after `close` was called.
    pub fn reads_after_close(&self) -> u64 {
        self.reads_after_close.load(Ordering::Relaxed)
    }

    /// Number of `entries()` calls.
    pub fn enumerations(&self) -> u64 {
        self.enumerations.load(Ordering::Relaxed)
    }
}

impl ArchiveSource for MemoryArchive {
    fn entries(&self) -> Box<dyn Iterator<Item = ArchiveEntry> + Send + '_> {
        self.enumerations.fetch_add(1, Ordering::Relaxed);
        Box::new(self.entries.iter().map(|e| e.entry.clone()))
    }

    fn file_count_hint(&self) -> Option<u64> {
        Some(self.entries.iter().filter(|e| e.entry.is_file()).count() as u64)
    }

    fn read(&self, entry: &ArchiveEntry) -> Result<Vec<u8>, ArchiveError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        if self.is_closed() {
            self.reads_after_close.fetch_add(1, Ordering::Relaxed);
            return Err(ArchiveError::Closed);
        }
        if let Some(delay) = self.read_delay {
            std::thread::sleep(delay);
        }
        let found = self
            .entries
            .iter()
            .find(|e| e.entry.path == entry.path)
            .ok_or_else(|| ArchiveError::UnknownEntry(entry.path.to_string()))?;
        match &found.data {
            Some(data) => Ok(data.to_vec()),
            None => Err(ArchiveError::Other(format!("corrupt entry {}", entry.path))),
        }
    }

    fn close(&self) -> Result<(), ArchiveError> {
        self.closed.store(true, Ordering::Release);
        if self.fail_close {
            return Err(ArchiveError::Other("close failed".into()));
        }
        Ok(())
    }

    fn format(&self) -> &'static str {
        "memory"
    }
}

/// Opener serving pre-built [`MemoryArchive`]s keyed by path.
///
/// Paths without a registered archive fail to open, which is how tests
/// produce `Broken` mounts.
#[derive(Default)]
pub struct MemoryOpener {
    archives: Mutex<HashMap<PathBuf, Arc<MemoryArchive>>>,
    open_delay: Option<Duration>,
}

impl MemoryOpener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every `open` call, keeping mounts in `Mounting` for a while.
    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = Some(delay);
        self
    }

    /// Register `archive` under `path`; returns the shared handle so tests
    /// can inspect it later.
    pub fn insert(&self, path: impl Into<PathBuf>, archive: MemoryArchive) -> Arc<MemoryArchive> {
        let archive = Arc::new(archive);
        self.archives.lock().insert(path.into(), Arc::clone(&archive));
        archive
    }
}

impl ArchiveOpener for MemoryOpener {
    fn open(&self, path: &Path) -> Result<Arc<dyn ArchiveSource>, ArchiveError> {
        if let Some(delay) = self.open_delay {
            std::thread::sleep(delay);
        }
        let archive = self
            .archives
            .lock()
            .get(path)
            .cloned()
            .ok_or_else(|| ArchiveError::Unsupported(path.display().to_string()))?;
        Ok(archive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unreadable_entries_fail() {
        let archive = MemoryArchive::new()
            .with_file("ok.bin", vec![0; 10])
            .with_unreadable("bad.bin", 20);

        assert_eq!(archive.read(&ArchiveEntry::file("ok.bin", 10)).unwrap().len(), 10);
        assert!(archive.read(&ArchiveEntry::file("bad.bin", 20)).is_err());
        assert_eq!(archive.read_count(), 2);
    }

    #[test]
    fn test_counts_reads_after_close() {
        let archive = MemoryArchive::new()
            .with_file("a", vec![1])
            .with_close_failure();
        assert!(archive.close().is_err());
        assert!(archive.is_closed());
        assert!(matches!(
            archive.read(&ArchiveEntry::file("a", 1)),
            Err(ArchiveError::Closed)
        ));
        assert_eq!(archive.reads_after_close(), 1);
    }

    #[test]
    fn test_opener_unknown_path() {
        let opener = MemoryOpener::new();
        opener.insert("/virtual/a.zip", MemoryArchive::new());
        assert!(opener.open(Path::new("/virtual/a.zip")).is_ok());
        assert!(opener.open(Path::new("/virtual/b.zip")).is_err());
    }
}
