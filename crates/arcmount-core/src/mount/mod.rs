/// Mount points and their lifecycle.
///
/// - [`registry`] — the single source of truth for what is mounted.
/// - [`controller`] — mount / unmount orchestration on top of the registry.
///
/// # State machine
///
/// ```text
/// Idle -> Mounting -> Mounted -> Unmounting -> (removed)
///            |           |           ^   |
///            v           v           |   v
///          Broken      Voided -------+  Broken (close failed)
///            |                       ^
///            +-----------------------+
/// ```
///
/// A `Broken` mount never becomes `Mounted` again; a retry registers a new
/// mount point with a new id.
pub mod controller;
pub mod registry;

pub use controller::{MountController, MountTicket, UnmountReport};
pub use registry::{MountObserver, MountRegistry, RegistryEvent};

use crate::archive::ArchiveSource;
use chrono::{DateTime, Local};
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Stable identifier of a mount point. Never reused within a registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MountId(pub u64);

impl fmt::Display for MountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MountKind {
    Drive,
    Home,
    Archive,
}

impl MountKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Drive => "Drive",
            Self::Home => "Home",
            Self::Archive => "Archive",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MountStatus {
    Idle,
    Mounting,
    Mounted,
    Voided,
    Broken,
    Unmounting,
}

impl MountStatus {
    /// Whether the state machine allows `self -> to`.
    pub fn can_transition(self, to: MountStatus) -> bool {
        use MountStatus::*;
        matches!(
            (self, to),
            (Idle, Mounting)
                | (Mounting, Mounted)
                | (Mounting, Broken)
                | (Mounted, Voided)
                | (Mounted, Unmounting)
                | (Voided, Unmounting)
                | (Broken, Unmounting)
                | (Unmounting, Broken)
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Mounting => "Mounting",
            Self::Mounted => "Mounted",
            Self::Voided => "Voided",
            Self::Broken => "Broken",
            Self::Unmounting => "Unmounting",
        }
    }
}

impl fmt::Display for MountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One entry of the registry.
///
/// Cloning is cheap: the archive source is shared behind an `Arc`.
#[derive(Clone)]
pub struct MountPoint {
    pub id: MountId,
    pub kind: MountKind,
    pub label: CompactString,
    pub status: MountStatus,
    /// Canonical backing location: the archive file, or the filesystem root
    /// for drives and home.
    pub location: PathBuf,
    /// Open archive handle. Only set for `Archive` mounts once opened.
    pub source: Option<Arc<dyn ArchiveSource>>,
    /// Last error recorded against this mount (open or close failure).
    pub error: Option<String>,
    pub mounted_at: Option<DateTime<Local>>,
    /// File entries counted when the archive was opened.
    pub entry_count: Option<u64>,
}

impl MountPoint {
    pub(crate) fn new(id: MountId, kind: MountKind, label: CompactString, location: PathBuf) -> Self {
        Self {
            id,
            kind,
            label,
            status: MountStatus::Idle,
            location,
            source: None,
            error: None,
            mounted_at: None,
            entry_count: None,
        }
    }

    #[inline]
    pub fn is_archive(&self) -> bool {
        self.kind == MountKind::Archive
    }

    pub fn summary(&self) -> MountSummary {
        MountSummary {
            id: self.id,
            kind: self.kind,
            label: self.label.to_string(),
            status: self.status,
            location: self.location.clone(),
            format: self.source.as_ref().map(|s| s.format().to_string()),
            error: self.error.clone(),
            mounted_at: self.mounted_at,
            entry_count: self.entry_count,
        }
    }
}

impl fmt::Debug for MountPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountPoint")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("label", &self.label)
            .field("status", &self.status)
            .field("location", &self.location)
            .field("source", &self.source.as_ref().map(|s| s.format()))
            .field("error", &self.error)
            .finish()
    }
}

/// Serializable view of a mount point for frontends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MountSummary {
    pub id: MountId,
    pub kind: MountKind,
    pub label: String,
    pub status: MountStatus,
    pub location: PathBuf,
    pub format: Option<String>,
    pub error: Option<String>,
    pub mounted_at: Option<DateTime<Local>>,
    pub entry_count: Option<u64>,
}

/// Best-effort canonical identity of a location.
///
/// Falls back to the given path when it cannot be canonicalised (e.g. the
/// file does not exist yet), so that duplicate detection still works for
/// scripted sources.
pub fn canonical_location(path: &std::path::Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Display label for a location: its final component, or the whole path for
/// roots such as `/` or `C:\`.
pub fn location_label(path: &std::path::Path) -> CompactString {
    match path.file_name() {
        Some(name) => CompactString::new(name.to_string_lossy()),
        None => CompactString::new(path.to_string_lossy().trim_end_matches('\\')),
    }
}
