/// `.zip` archives via the `zip` crate.
///
/// The central directory is read once at open time, so enumeration never
/// touches the file again. Entry reads need `&mut ZipArchive`, which is
/// guarded by the source's own mutex; that lock belongs to the codec and has
/// nothing to do with the scanner's work queue.
use super::{ArchiveEntry, ArchiveError, ArchiveSource, EntryKind};
use compact_str::CompactString;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use zip::ZipArchive;

/// Upper bound on the buffer reserved from an entry's declared size. The
/// header value is untrusted; larger entries grow the buffer as they decode.
const MAX_PREALLOC: u64 = 8 * 1024 * 1024;

pub struct ZipArchiveSource {
    /// `None` once closed.
    archive: Mutex<Option<ZipArchive<File>>>,
    entries: Vec<ArchiveEntry>,
    /// Entry path -> index in the central directory.
    index_of: HashMap<CompactString, usize>,
    file_count: u64,
}

impl ZipArchiveSource {
    pub fn open(path: &Path) -> Result<Self, ArchiveError> {
        let file = File::open(path)?;
        let mut archive = ZipArchive::new(file)?;

        let mut entries = Vec::with_capacity(archive.len());
        let mut index_of = HashMap::with_capacity(archive.len());
        for i in 0..archive.len() {
            let zf = archive.by_index(i)?;
            let name = CompactString::new(zf.name().trim_end_matches('/'));
            if name.is_empty() {
                continue;
            }
            let entry = if zf.is_dir() {
                ArchiveEntry::dir(name.clone())
            } else {
                ArchiveEntry::file(name.clone(), zf.size())
            };
            index_of.insert(name, i);
            entries.push(entry);
        }

        let file_count = entries.iter().filter(|e| e.is_file()).count() as u64;
        Ok(Self {
            archive: Mutex::new(Some(archive)),
            entries,
            index_of,
            file_count,
        })
    }
}

impl ArchiveSource for ZipArchiveSource {
    fn entries(&self) -> Box<dyn Iterator<Item = ArchiveEntry> + Send + '_> {
        Box::new(self.entries.iter().cloned())
    }

    fn read(&self, entry: &ArchiveEntry) -> Result<Vec<u8>, ArchiveError> {
        if entry.kind == EntryKind::Dir {
            return Ok(Vec::new());
        }
        let index = *self
            .index_of
            .get(&entry.path)
            .ok_or_else(|| ArchiveError::UnknownEntry(entry.path.to_string()))?;

        let mut guard = self.archive.lock();
        let archive = guard.as_mut().ok_or(ArchiveError::Closed)?;
        let mut zf = archive.by_index(index)?;
        let mut buf = Vec::with_capacity(zf.size().min(MAX_PREALLOC) as usize);
        zf.read_to_end(&mut buf)?;
        Ok(buf)
    }

    fn file_count_hint(&self) -> Option<u64> {
        Some(self.file_count)
    }

    fn close(&self) -> Result<(), ArchiveError> {
        self.archive.lock().take();
        Ok(())
    }

    fn format(&self) -> &'static str {
        "zip"
    }
}
