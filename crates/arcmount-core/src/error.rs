/// Error taxonomy shared by every component of the core.
///
/// Structural errors (`DuplicateMount`, `NotFound`, `OpenError`, ...) are
/// returned synchronously to the caller and never retried internally.
/// `ReadError` is the one per-entry error: the scanner absorbs it into the
/// `files_failed` counter instead of propagating it.
use crate::archive::ArchiveError;
use crate::mount::{MountId, MountStatus};
use crate::tree::PlayerId;
use std::path::PathBuf;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ArcError>;

#[derive(Debug, thiserror::Error)]
pub enum ArcError {
    /// The same backing location is already mounted and not `Broken`.
    #[error("{} is already mounted as {existing}", path.display())]
    DuplicateMount { path: PathBuf, existing: MountId },

    /// No mount point with this id exists.
    #[error("mount {0} not found")]
    NotFound(MountId),

    /// The operation needs the archive to be in `Mounted` state.
    #[error("mount {id} is not mounted (status: {status})")]
    NotMounted { id: MountId, status: MountStatus },

    #[error("player {0} not found")]
    PlayerNotFound(PlayerId),

    /// A scan job is already active for this archive.
    #[error("a scan is already running for mount {0}")]
    AlreadyRunning(MountId),

    /// No scan job was ever started for this archive.
    #[error("no scan has been started for mount {0}")]
    NotRunning(MountId),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A status change that the mount state machine does not allow.
    #[error("mount {id}: invalid transition {from} -> {to}")]
    InvalidTransition {
        id: MountId,
        from: MountStatus,
        to: MountStatus,
    },

    /// The archive source could not be opened.
    #[error("failed to open {}: {source}", path.display())]
    OpenError {
        path: PathBuf,
        #[source]
        source: ArchiveError,
    },

    /// A single entry could not be read. Never fatal to a scan.
    #[error("failed to read entry {entry}: {source}")]
    ReadError {
        entry: String,
        #[source]
        source: ArchiveError,
    },

    /// The archive source failed to close during unmount.
    #[error("failed to close mount {id}: {source}")]
    CloseError {
        id: MountId,
        #[source]
        source: ArchiveError,
    },

    /// The archive was invalidated externally while still registered.
    #[error("mount {0} has been voided")]
    VoidedMount(MountId),

    /// Local I/O failure (config files, thread spawning).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ArcError {
    /// Create an [`ArcError::InvalidArgument`].
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// `true` for per-entry errors that must not stop the surrounding job.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::ReadError { .. })
    }

    /// The mount id this error refers to, if any.
    pub fn mount_id(&self) -> Option<MountId> {
        match self {
            Self::DuplicateMount { existing, .. } => Some(*existing),
            Self::NotFound(id)
            | Self::AlreadyRunning(id)
            | Self::NotRunning(id)
            | Self::VoidedMount(id) => Some(*id),
            Self::NotMounted { id, .. }
            | Self::InvalidTransition { id, .. }
            | Self::CloseError { id, .. } => Some(*id),
            Self::PlayerNotFound(_)
            | Self::InvalidArgument(_)
            | Self::OpenError { .. }
            | Self::ReadError { .. }
            | Self::Io(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_error_is_recoverable() {
        let err = ArcError::ReadError {
            entry: "music/a.ogg".into(),
            source: ArchiveError::Closed,
        };
        assert!(err.is_recoverable());
        assert!(err.to_string().contains("music/a.ogg"));
        assert_eq!(err.mount_id(), None);
    }

    #[test]
    fn test_structural_errors_carry_mount_id() {
        let id = MountId(7);
        assert!(!ArcError::NotFound(id).is_recoverable());
        assert_eq!(ArcError::NotFound(id).mount_id(), Some(id));
        assert_eq!(ArcError::VoidedMount(id).mount_id(), Some(id));
        let err = ArcError::NotMounted {
            id,
            status: MountStatus::Voided,
        };
        assert_eq!(err.to_string(), "mount #7 is not mounted (status: Voided)");
    }

    #[test]
    fn test_invalid_transition_display() {
        let err = ArcError::InvalidTransition {
            id: MountId(1),
            from: MountStatus::Broken,
            to: MountStatus::Mounted,
        };
        assert_eq!(err.to_string(), "mount #1: invalid transition Broken -> Mounted");
    }
}
