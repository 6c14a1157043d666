/// Mount / unmount orchestration.
///
/// The controller validates preconditions, drives the archive source
/// lifecycle and updates the registry. Operations on the same mount id are
/// serialized through a per-id lock; different ids proceed independently.
///
/// Opening an archive runs on a background thread so `mount` returns as soon
/// as the mount point is visible in `Mounting` state. Unmounting stops and
/// joins the scan job before the source is closed.
use super::{
    canonical_location, location_label, MountId, MountKind, MountPoint, MountRegistry,
    MountStatus, MountSummary,
};
use crate::archive::{ArchiveError, ArchiveOpener, ArchiveSource};
use crate::config::EngineConfig;
use crate::error::{ArcError, Result};
use crate::platform;
use crate::scanner::ScanEngine;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// Per-id operation locks.
#[derive(Default)]
struct OpLocks(Mutex<HashMap<MountId, Arc<Mutex<()>>>>);

impl OpLocks {
    fn get(&self, id: MountId) -> Arc<Mutex<()>> {
        Arc::clone(self.0.lock().entry(id).or_default())
    }

    fn release(&self, id: MountId) {
        self.0.lock().remove(&id);
    }
}

/// Handle to an in-progress mount.
///
/// Dropping the ticket does not cancel the open; the mount still ends up
/// `Mounted` or `Broken`.
pub struct MountTicket {
    pub id: MountId,
    handle: JoinHandle<Result<()>>,
}

impl MountTicket {
    /// Wait for the open to finish. Returns the mount id on success and the
    /// `OpenError` on failure.
    pub fn wait(self) -> Result<MountId> {
        match self.handle.join() {
            Ok(result) => result.map(|()| self.id),
            Err(_) => Err(ArcError::OpenError {
                path: PathBuf::new(),
                source: ArchiveError::Other(format!("open thread for mount {} panicked", self.id)),
            }),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Outcome of [`MountController::unmount_all`].
#[derive(Debug, Default)]
pub struct UnmountReport {
    pub removed: Vec<MountId>,
    pub failed: Vec<(MountId, ArcError)>,
}

impl UnmountReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct MountController {
    registry: Arc<MountRegistry>,
    engine: Arc<ScanEngine>,
    opener: Arc<dyn ArchiveOpener>,
    locks: Arc<OpLocks>,
}

impl MountController {
    pub fn new(
        registry: Arc<MountRegistry>,
        engine: Arc<ScanEngine>,
        opener: Arc<dyn ArchiveOpener>,
    ) -> Self {
        Self {
            registry,
            engine,
            opener,
            locks: Arc::new(OpLocks::default()),
        }
    }

    pub fn registry(&self) -> &Arc<MountRegistry> {
        &self.registry
    }

    /// Mount the archive at `path`.
    ///
    /// The mount point is registered and moved to `Mounting` before this
    /// returns; the source is opened in the background. Fails immediately
    /// with `DuplicateMount` if the location is mounted and not `Broken`.
    pub fn mount(&self, path: &Path) -> Result<MountTicket> {
        let location = canonical_location(path);
        let id = self
            .registry
            .register(MountKind::Archive, location_label(&location), location.clone())?;
        self.registry.set_status(id, MountStatus::Mounting)?;
        info!("Mounting {} as {id}", location.display());

        let registry = Arc::clone(&self.registry);
        let opener = Arc::clone(&self.opener);
        let locks = Arc::clone(&self.locks);
        let open_path = location.clone();

        let spawned = thread::Builder::new()
            .name(format!("arcmount-mount-{}", id.0))
            .spawn(move || open_and_commit(id, open_path, &*opener, &registry, &locks));

        match spawned {
            Ok(handle) => Ok(MountTicket { id, handle }),
            Err(err) => {
                let message = err.to_string();
                let _ = self.registry.transition(id, MountStatus::Broken, |m| {
                    m.error = Some(message);
                });
                Err(ArcError::Io(err))
            }
        }
    }

    /// [`mount`](Self::mount) and wait for the result.
    pub fn mount_blocking(&self, path: &Path) -> Result<MountId> {
        self.mount(path)?.wait()
    }

    /// Register a drive or home root, straight to `Mounted`.
    pub fn attach_root(&self, kind: MountKind, label: &str, path: &Path) -> Result<MountId> {
        if kind == MountKind::Archive {
            return Err(ArcError::invalid("archives are mounted with mount()"));
        }
        let location = canonical_location(path);
        let id = self.registry.register(kind, label, location)?;
        self.registry.set_status(id, MountStatus::Mounting)?;
        self.registry.transition(id, MountStatus::Mounted, |m| {
            m.mounted_at = Some(chrono::Local::now());
        })?;
        debug!("Attached {} root {label} as {id}", kind.label());
        Ok(id)
    }

    /// Register the drives and home directory found on this machine.
    /// Locations that are already registered are skipped.
    pub fn discover_roots(&self, config: &EngineConfig) -> Vec<MountId> {
        let mut ids = Vec::new();
        for root in platform::discover_roots(config) {
            if self
                .registry
                .find_by_location(&canonical_location(&root.path))
                .is_some()
            {
                continue;
            }
            match self.attach_root(root.kind, &root.label, &root.path) {
                Ok(id) => ids.push(id),
                Err(e) => warn!("Skipping root {}: {e}", root.path.display()),
            }
        }
        info!("Discovered {} root location(s)", ids.len());
        ids
    }

    /// Unmount `id`: stop its scan job, close the source, remove it.
    ///
    /// Valid from `Mounted`, `Voided` and `Broken`. If closing the source
    /// fails the mount stays registered as `Broken`, still holding the
    /// source, and `CloseError` is returned.
    pub fn unmount(&self, id: MountId) -> Result<()> {
        let lock = self.locks.get(id);
        let guard = lock.lock();

        let Some(mount) = self.registry.get(id) else {
            drop(guard);
            self.locks.release(id);
            return Err(ArcError::NotFound(id));
        };
        self.registry.set_status(id, MountStatus::Unmounting)?;

        // Every worker has exited once this returns, and a racing start
        // now sees `Unmounting`.
        self.engine.retire(id);

        if let Some(source) = mount.source.as_ref() {
            if let Err(err) = source.close() {
                warn!("Closing {id} ({}) failed: {err}", mount.label);
                let message = err.to_string();
                self.registry.transition(id, MountStatus::Broken, |m| {
                    m.error = Some(message);
                })?;
                return Err(ArcError::CloseError { id, source: err });
            }
        }

        self.registry.unregister(id)?;
        self.engine.forget(id);
        drop(guard);
        self.locks.release(id);
        info!("Unmounted {id} ({})", mount.label);
        Ok(())
    }

    /// Unmount every archive. Never stops at the first failure.
    pub fn unmount_all(&self) -> UnmountReport {
        let ids: Vec<MountId> = self
            .registry
            .list()
            .iter()
            .filter(|m| m.is_archive())
            .map(|m| m.id)
            .collect();
        self.unmount_each(ids)
    }

    fn unmount_each(&self, ids: Vec<MountId>) -> UnmountReport {
        let mut report = UnmountReport::default();
        for id in ids {
            match self.unmount(id) {
                Ok(()) => report.removed.push(id),
                // Removed concurrently since the list was taken.
                Err(ArcError::NotFound(_)) => {
                    debug!("{id} already unmounted");
                    report.removed.push(id);
                }
                Err(e) => report.failed.push((id, e)),
            }
        }
        if !report.is_success() {
            warn!(
                "unmount_all: {} removed, {} failed",
                report.removed.len(),
                report.failed.len()
            );
        }
        report
    }

    /// External voiding event: the source became unusable while mounted.
    ///
    /// Forces `Mounted -> Voided` and asks any running scan to stop without
    /// waiting for it. Voiding an already voided mount is a no-op.
    pub fn void(&self, id: MountId) -> Result<()> {
        let lock = self.locks.get(id);
        let _guard = lock.lock();

        match self.registry.status(id) {
            None => return Err(ArcError::NotFound(id)),
            Some(MountStatus::Voided) => return Ok(()),
            Some(MountStatus::Mounted) => {}
            Some(status) => return Err(ArcError::NotMounted { id, status }),
        }
        self.registry.set_status(id, MountStatus::Voided)?;
        self.engine.request_stop(id);
        info!("{id} voided");
        Ok(())
    }

    pub fn get(&self, id: MountId) -> Option<MountPoint> {
        self.registry.get(id)
    }

    pub fn list_mounts(&self) -> Vec<MountSummary> {
        self.registry.list().iter().map(MountPoint::summary).collect()
    }
}

/// Body of the background open thread.
fn open_and_commit(
    id: MountId,
    path: PathBuf,
    opener: &dyn ArchiveOpener,
    registry: &MountRegistry,
    locks: &OpLocks,
) -> Result<()> {
    let opened = opener.open(&path);

    let lock = locks.get(id);
    let _guard = lock.lock();

    match opened {
        Ok(source) => {
            let handle: Arc<dyn ArchiveSource> = Arc::clone(&source);
            let files = source.file_count_hint();
            let committed = registry.transition(id, MountStatus::Mounted, |m| {
                m.source = Some(handle);
                m.mounted_at = Some(chrono::Local::now());
                m.entry_count = files;
            });
            if let Err(e) = committed {
                let _ = source.close();
                return Err(e);
            }
            info!(
                "Mounted {id}: {} ({}, {} files)",
                path.display(),
                source.format(),
                files.map_or_else(|| "unknown".to_string(), |n| n.to_string())
            );
            Ok(())
        }
        Err(source) => {
            warn!("Mounting {id} failed: {source}");
            let message = source.to_string();
            registry.transition(id, MountStatus::Broken, |m| {
                m.error = Some(message);
            })?;
            Err(ArcError::OpenError { path, source })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::memory::MemoryOpener;
    use crate::archive::MemoryArchive;

    fn controller(opener: MemoryOpener) -> MountController {
        let registry = Arc::new(MountRegistry::default());
        let engine = Arc::new(ScanEngine::new(
            Arc::clone(&registry),
            &EngineConfig::default(),
        ));
        MountController::new(registry, engine, Arc::new(opener))
    }

    #[test]
    fn test_mount_success_records_source() {
        let opener = MemoryOpener::new();
        let archive = opener.insert(
            "/virtual/a.zip",
            MemoryArchive::new()
                .with_dir("d")
                .with_file("d/x", vec![1, 2, 3]),
        );
        let ctl = controller(opener);

        let id = ctl.mount_blocking(Path::new("/virtual/a.zip")).unwrap();
        let mount = ctl.get(id).unwrap();
        assert_eq!(mount.status, MountStatus::Mounted);
        assert_eq!(mount.label, "a.zip");
        assert_eq!(mount.entry_count, Some(1));
        assert!(mount.source.is_some());
        assert_eq!(archive.enumerations(), 0, "mounting must not walk the archive");
        assert!(mount.mounted_at.is_some());
    }

    #[test]
    fn test_mount_failure_is_broken_and_retryable() {
        let opener = MemoryOpener::new();
        let ctl = controller(opener);

        let err = ctl.mount_blocking(Path::new("/virtual/missing.zip")).unwrap_err();
        assert!(matches!(err, ArcError::OpenError { .. }));

        let broken = ctl.registry().list();
        assert_eq!(broken.len(), 1);
        assert_eq!(broken[0].status, MountStatus::Broken);
        assert!(broken[0].error.is_some());

        // A retry registers a fresh mount point.
        let retry = ctl.mount(Path::new("/virtual/missing.zip")).unwrap();
        assert_ne!(retry.id, broken[0].id);
        assert!(retry.wait().is_err());
        assert_eq!(ctl.registry().len(), 1);
    }

    #[test]
    fn test_mount_twice_is_duplicate() {
        let opener = MemoryOpener::new();
        opener.insert("/virtual/a.zip", MemoryArchive::new());
        let ctl = controller(opener);

        let id = ctl.mount_blocking(Path::new("/virtual/a.zip")).unwrap();
        match ctl.mount(Path::new("/virtual/a.zip")) {
            Err(ArcError::DuplicateMount { existing, .. }) => assert_eq!(existing, id),
            Err(other) => panic!("expected DuplicateMount, got {other:?}"),
            Ok(_) => panic!("expected DuplicateMount"),
        }
    }

    #[test]
    fn test_unmount_closes_and_removes() {
        let opener = MemoryOpener::new();
        let archive = opener.insert("/virtual/a.zip", MemoryArchive::new());
        let ctl = controller(opener);

        let id = ctl.mount_blocking(Path::new("/virtual/a.zip")).unwrap();
        ctl.unmount(id).unwrap();
        assert!(archive.is_closed());
        assert!(ctl.get(id).is_none());
        assert!(matches!(ctl.unmount(id), Err(ArcError::NotFound(_))));
    }

    #[test]
    fn test_close_failure_leaves_broken_mount() {
        let opener = MemoryOpener::new();
        opener.insert("/virtual/a.zip", MemoryArchive::new().with_close_failure());
        let ctl = controller(opener);

        let id = ctl.mount_blocking(Path::new("/virtual/a.zip")).unwrap();
        assert!(matches!(ctl.unmount(id), Err(ArcError::CloseError { .. })));

        let mount = ctl.get(id).unwrap();
        assert_eq!(mount.status, MountStatus::Broken);
        assert!(mount.source.is_some());
        assert!(mount.error.is_some());
    }

    #[test]
    fn test_unmount_all_counts_vanished_mounts_as_removed() {
        let opener = MemoryOpener::new();
        opener.insert("/virtual/a.zip", MemoryArchive::new());
        opener.insert("/virtual/b.zip", MemoryArchive::new());
        let ctl = controller(opener);

        let a = ctl.mount_blocking(Path::new("/virtual/a.zip")).unwrap();
        let b = ctl.mount_blocking(Path::new("/virtual/b.zip")).unwrap();
        // `a` goes away between listing and unmounting.
        ctl.unmount(a).unwrap();

        let report = ctl.unmount_each(vec![a, b]);
        assert!(report.is_success());
        assert_eq!(report.removed, vec![a, b]);
        assert!(ctl.list_mounts().is_empty());
    }

    #[test]
    fn test_unmount_while_mounting_is_rejected() {
        let opener = MemoryOpener::new().with_open_delay(std::time::Duration::from_millis(200));
        opener.insert("/virtual/slow.zip", MemoryArchive::new());
        let ctl = controller(opener);

        let ticket = ctl.mount(Path::new("/virtual/slow.zip")).unwrap();
        assert_eq!(ctl.registry().status(ticket.id), Some(MountStatus::Mounting));
        assert!(matches!(
            ctl.unmount(ticket.id),
            Err(ArcError::InvalidTransition {
                from: MountStatus::Mounting,
                ..
            })
        ));
        let id = ticket.wait().unwrap();
        ctl.unmount(id).unwrap();
    }

    #[test]
    fn test_void_only_from_mounted() {
        let opener = MemoryOpener::new();
        opener.insert("/virtual/a.zip", MemoryArchive::new());
        let ctl = controller(opener);

        let id = ctl.mount_blocking(Path::new("/virtual/a.zip")).unwrap();
        ctl.void(id).unwrap();
        ctl.void(id).unwrap();
        assert_eq!(ctl.registry().status(id), Some(MountStatus::Voided));

        // Voided mounts can still be unmounted.
        ctl.unmount(id).unwrap();
        assert!(matches!(ctl.void(id), Err(ArcError::NotFound(_))));
    }

    #[test]
    fn test_attach_root_rejects_archive_kind() {
        let ctl = controller(MemoryOpener::new());
        assert!(matches!(
            ctl.attach_root(MountKind::Archive, "x", Path::new("/x")),
            Err(ArcError::InvalidArgument(_))
        ));

        let dir = tempfile::tempdir().unwrap();
        let id = ctl.attach_root(MountKind::Home, "Home", dir.path()).unwrap();
        assert_eq!(ctl.registry().status(id), Some(MountStatus::Mounted));
        // Roots are left alone by unmount_all.
        let report = ctl.unmount_all();
        assert!(report.removed.is_empty());
        assert!(ctl.get(id).is_some());
    }
}
