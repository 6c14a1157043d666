/// A plain directory exposed through the archive interface.
///
/// Enumeration streams a `jwalk` walk with sorted output so the
/// "archive-native order" is stable between calls: parents always precede
/// their children, siblings are in name order. Nothing is collected up front.
use super::{ArchiveEntry, ArchiveError, ArchiveSource};
use compact_str::CompactString;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

#[derive(Debug)]
pub struct DirArchive {
    root: PathBuf,
    closed: AtomicBool,
}

impl DirArchive {
    /// Open `root` as an archive. Fails if it is not a readable directory.
    pub fn open(root: &Path) -> Result<Self, ArchiveError> {
        let meta = std::fs::metadata(root)?;
        if !meta.is_dir() {
            return Err(ArchiveError::Unsupported(format!(
                "{} is not a directory",
                root.display()
            )));
        }
        Ok(Self {
            root: root.to_path_buf(),
            closed: AtomicBool::new(false),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// `root/a/b.txt` -> `a/b.txt`. Returns `None` for the root itself.
fn relative_entry_path(root: &Path, path: &Path) -> Option<CompactString> {
    let relative = path.strip_prefix(root).ok()?;
    let mut out = CompactString::default();
    for component in relative.components() {
        if let Component::Normal(part) = component {
            if !out.is_empty() {
                out.push('/');
            }
            out.push_str(&part.to_string_lossy());
        }
    }
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

impl ArchiveSource for DirArchive {
    fn entries(&self) -> Box<dyn Iterator<Item = ArchiveEntry> + Send + '_> {
        let root = self.root.clone();
        let walker = jwalk::WalkDir::new(&self.root)
            .skip_hidden(false)
            .follow_links(false)
            .sort(true);

        Box::new(walker.into_iter().filter_map(move |entry_result| {
            let entry = match entry_result {
                Ok(e) => e,
                Err(err) => {
                    debug!("DirArchive: skipping unreadable entry: {err}");
                    return None;
                }
            };
            let path = entry.path();
            let relative = relative_entry_path(&root, &path)?;
            if entry.file_type().is_dir() {
                return Some(ArchiveEntry::dir(relative));
            }
            let size = entry.metadata().map(|meta| meta.len()).unwrap_or(0);
            Some(ArchiveEntry::file(relative, size))
        }))
    }

    fn read(&self, entry: &ArchiveEntry) -> Result<Vec<u8>, ArchiveError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ArchiveError::Closed);
        }
        if entry.path.split('/').any(|part| part == ".." || part.is_empty()) {
            return Err(ArchiveError::UnknownEntry(entry.path.to_string()));
        }
        let full = self.root.join(entry.path.as_str());
        Ok(std::fs::read(full)?)
    }

    fn close(&self) -> Result<(), ArchiveError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn format(&self) -> &'static str {
        "dir"
    }
}
