/// Archive sources — the external collaborator behind every mounted archive.
///
/// The core never decodes an archive format itself. It only needs something
/// that can enumerate entries, read one entry's bytes, and close. Concrete
/// sources live in the submodules:
///
/// - [`dir`] — a plain directory treated as an archive.
/// - [`zipfile`] — a `.zip` file.
/// - [`memory`] — in-memory entries with failure injection, used by tests and
///   embedders that want a scripted source.
pub mod dir;
pub mod memory;
pub mod zipfile;

pub use dir::DirArchive;
pub use memory::MemoryArchive;
pub use zipfile::ZipArchiveSource;

use compact_str::CompactString;
use std::path::Path;
use std::sync::Arc;

/// Errors reported by an archive source.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("zip error: {0}")]
    Zip(#[from] ::zip::result::ZipError),

    /// The source was closed; no further reads are possible.
    #[error("archive is closed")]
    Closed,

    #[error("no such entry: {0}")]
    UnknownEntry(String),

    /// The opener does not recognise this location.
    #[error("unsupported archive: {0}")]
    Unsupported(String),

    /// Injected or source-specific failure.
    #[error("{0}")]
    Other(String),
}

/// Whether an entry is a file or a directory record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
}

/// One entry of an archive, as reported by enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// `/`-separated path relative to the archive root, no leading slash.
    pub path: CompactString,
    /// Uncompressed size in bytes (0 for directories).
    pub size: u64,
    pub kind: EntryKind,
}

impl ArchiveEntry {
    pub fn file(path: impl Into<CompactString>, size: u64) -> Self {
        Self {
            path: path.into(),
            size,
            kind: EntryKind::File,
        }
    }

    pub fn dir(path: impl Into<CompactString>) -> Self {
        Self {
            path: path.into(),
            size: 0,
            kind: EntryKind::Dir,
        }
    }

    #[inline]
    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }
}

/// An opened archive.
///
/// Implementations must be safe to share between scan workers: `read` is
/// called concurrently from several threads.
pub trait ArchiveSource: Send + Sync {
    /// Enumerate all entries in archive-native order.
    ///
    /// The sequence is finite and every call starts from the beginning.
    fn entries(&self) -> Box<dyn Iterator<Item = ArchiveEntry> + Send + '_>;

    /// Read one entry fully.
    fn read(&self, entry: &ArchiveEntry) -> Result<Vec<u8>, ArchiveError>;

    /// Number of file entries, when the source knows it without walking the
    /// archive (a zip central directory, an in-memory list).
    fn file_count_hint(&self) -> Option<u64> {
        None
    }

    /// Release the underlying handle. Reads after `close` fail with
    /// [`ArchiveError::Closed`].
    fn close(&self) -> Result<(), ArchiveError>;

    /// Short format name for logs ("dir", "zip", ...).
    fn format(&self) -> &'static str;
}

/// Opens archive sources from filesystem locations.
pub trait ArchiveOpener: Send + Sync {
    fn open(&self, path: &Path) -> Result<Arc<dyn ArchiveSource>, ArchiveError>;
}

/// Picks a source by looking at the location: directories become a
/// [`DirArchive`], `*.zip` files a [`ZipArchiveSource`].
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultOpener;

impl ArchiveOpener for DefaultOpener {
    fn open(&self, path: &Path) -> Result<Arc<dyn ArchiveSource>, ArchiveError> {
        let meta = std::fs::metadata(path)?;
        if meta.is_dir() {
            return Ok(Arc::new(DirArchive::open(path)?));
        }
        let is_zip = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("zip"))
            .unwrap_or(false);
        if is_zip {
            return Ok(Arc::new(ZipArchiveSource::open(path)?));
        }
        Err(ArchiveError::Unsupported(path.display().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_opener_rejects_unknown_extension() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("notes.txt");
        std::fs::write(&path, b"hello").unwrap();

        match DefaultOpener.open(&path) {
            Err(ArchiveError::Unsupported(p)) => assert!(p.ends_with("notes.txt")),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("a .txt file must not open as an archive"),
        }
    }

    #[test]
    fn test_default_opener_missing_path_is_io_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let result = DefaultOpener.open(&tmp.path().join("missing.zip"));
        assert!(matches!(result, Err(ArchiveError::Io(_))));
    }

    #[test]
    fn test_default_opener_directory() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.bin"), [0u8; 10]).unwrap();
        let source = DefaultOpener.open(tmp.path()).unwrap();
        assert_eq!(source.format(), "dir");
        assert_eq!(source.entries().filter(ArchiveEntry::is_file).count(), 1);
    }
}
