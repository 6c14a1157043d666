/// The mount registry — which locations are mounted, and in what state.
///
/// Mutations run under a single write lock. Observers (the virtual tree) are
/// called while that lock is still held, so a mount point and its tree node
/// always appear and disappear in the same logical step. Channel subscribers
/// get the same events asynchronously.
use super::{MountId, MountKind, MountPoint, MountStatus};
use crate::error::{ArcError, Result};
use crate::notify::Subscribers;
use compact_str::CompactString;
use crossbeam_channel::Receiver;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// A registry mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    Registered {
        id: MountId,
        kind: MountKind,
    },
    StatusChanged {
        id: MountId,
        kind: MountKind,
        from: MountStatus,
        to: MountStatus,
    },
    Unregistered {
        id: MountId,
        kind: MountKind,
    },
}

impl RegistryEvent {
    pub fn id(&self) -> MountId {
        match self {
            Self::Registered { id, .. }
            | Self::StatusChanged { id, .. }
            | Self::Unregistered { id, .. } => *id,
        }
    }

    pub fn kind(&self) -> MountKind {
        match self {
            Self::Registered { kind, .. }
            | Self::StatusChanged { kind, .. }
            | Self::Unregistered { kind, .. } => *kind,
        }
    }
}

/// Synchronous registry observer.
///
/// Called with the registry write lock held; implementations must not call
/// back into the registry.
pub trait MountObserver: Send + Sync {
    fn mounts_changed(&self, event: Option<&RegistryEvent>, mounts: &[MountPoint]);
}

#[derive(Default)]
struct RegistryInner {
    /// Registration order.
    mounts: Vec<MountPoint>,
    next_id: u64,
}

impl RegistryInner {
    fn position(&self, id: MountId) -> Option<usize> {
        self.mounts.iter().position(|m| m.id == id)
    }
}

pub struct MountRegistry {
    inner: RwLock<RegistryInner>,
    observers: RwLock<Vec<Arc<dyn MountObserver>>>,
    subscribers: Subscribers<RegistryEvent>,
}

impl MountRegistry {
    pub fn new(notify_capacity: usize) -> Self {
        Self {
            inner: RwLock::new(RegistryInner {
                mounts: Vec::new(),
                next_id: 1,
            }),
            observers: RwLock::new(Vec::new()),
            subscribers: Subscribers::new(notify_capacity),
        }
    }

    /// Attach a synchronous observer. It is immediately called once with
    /// the current contents so it starts in sync.
    pub fn add_observer(&self, observer: Arc<dyn MountObserver>) {
        let inner = self.inner.read();
        observer.mounts_changed(None, &inner.mounts);
        self.observers.write().push(observer);
    }

    /// Subscribe to registry events over a channel.
    pub fn subscribe(&self) -> Receiver<RegistryEvent> {
        self.subscribers.subscribe()
    }

    fn emit(&self, inner: &RegistryInner, event: RegistryEvent) {
        for observer in self.observers.read().iter() {
            observer.mounts_changed(Some(&event), &inner.mounts);
        }
        self.subscribers.publish(&event);
    }

    /// Register a new mount point in `Idle` state.
    ///
    /// Fails with `DuplicateMount` if `location` is already registered and
    /// that mount is not `Broken`. A `Broken` mount for the same location is
    /// replaced: the retry gets a fresh id.
    pub fn register(
        &self,
        kind: MountKind,
        label: impl Into<CompactString>,
        location: PathBuf,
    ) -> Result<MountId> {
        let mut inner = self.inner.write();

        if let Some(pos) = inner.mounts.iter().position(|m| m.location == location) {
            let existing = &inner.mounts[pos];
            if existing.status != MountStatus::Broken {
                return Err(ArcError::DuplicateMount {
                    path: location,
                    existing: existing.id,
                });
            }
            let stale = inner.mounts.remove(pos);
            // A broken mount keeps its source only when closing it failed.
            // Broken mounts never have a scan job, so no reader is left.
            if let Some(source) = stale.source.as_ref() {
                match source.close() {
                    Ok(()) => debug!("Closed leftover source of broken mount {}", stale.id),
                    Err(err) => warn!(
                        "Dropping broken mount {} ({}) whose source still fails to close: {err}",
                        stale.id,
                        stale.location.display()
                    ),
                }
            }
            debug!("Replacing broken mount {}", stale.id);
            self.emit(
                &inner,
                RegistryEvent::Unregistered {
                    id: stale.id,
                    kind: stale.kind,
                },
            );
        }

        let id = MountId(inner.next_id);
        inner.next_id += 1;
        inner
            .mounts
            .push(MountPoint::new(id, kind, label.into(), location));
        self.emit(&inner, RegistryEvent::Registered { id, kind });
        Ok(id)
    }

    /// Remove a mount point and return it.
    pub fn unregister(&self, id: MountId) -> Result<MountPoint> {
        let mut inner = self.inner.write();
        let pos = inner.position(id).ok_or(ArcError::NotFound(id))?;
        let removed = inner.mounts.remove(pos);
        self.emit(
            &inner,
            RegistryEvent::Unregistered {
                id,
                kind: removed.kind,
            },
        );
        Ok(removed)
    }

    /// Move `id` to `status`, validating the transition.
    pub fn set_status(&self, id: MountId, status: MountStatus) -> Result<MountStatus> {
        self.transition(id, status, |_| {})
    }

    /// Move `id` to `to` and apply `update` to the mount point in the same
    /// step. Returns the previous status.
    pub fn transition(
        &self,
        id: MountId,
        to: MountStatus,
        update: impl FnOnce(&mut MountPoint),
    ) -> Result<MountStatus> {
        let mut inner = self.inner.write();
        let pos = inner.position(id).ok_or(ArcError::NotFound(id))?;
        let mount = &mut inner.mounts[pos];
        let from = mount.status;
        if !from.can_transition(to) {
            return Err(ArcError::InvalidTransition { id, from, to });
        }
        mount.status = to;
        update(mount);
        let kind = mount.kind;
        self.emit(&inner, RegistryEvent::StatusChanged { id, kind, from, to });
        Ok(from)
    }

    pub fn get(&self, id: MountId) -> Option<MountPoint> {
        let inner = self.inner.read();
        inner.position(id).map(|pos| inner.mounts[pos].clone())
    }

    pub fn status(&self, id: MountId) -> Option<MountStatus> {
        let inner = self.inner.read();
        inner.position(id).map(|pos| inner.mounts[pos].status)
    }

    pub fn find_by_location(&self, location: &Path) -> Option<MountPoint> {
        self.inner
            .read()
            .mounts
            .iter()
            .find(|m| m.location == location)
            .cloned()
    }

    /// All mount points in registration order.
    pub fn list(&self) -> Vec<MountPoint> {
        self.inner.read().mounts.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().mounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MountRegistry {
    fn default() -> Self {
        Self::new(crate::config::EngineConfig::default().notify_capacity)
    }
}
