/// Shell state management.
///
/// Owns one core [`Session`] and the notification channels subscribed to
/// it. Commands call the mount and scan surface here; change notifications
/// are drained in [`ShellState::process_messages`], a bounded batch per
/// call, so a long backlog never stalls the caller.
use arcmount_core::archive::{ArchiveOpener, DefaultOpener, EntryKind};
use arcmount_core::config::EngineConfig;
use arcmount_core::mount::{MountId, MountStatus, MountSummary, RegistryEvent, UnmountReport};
use arcmount_core::scanner::{ScanProgress, ScanSnapshot};
use arcmount_core::session::Session;
use arcmount_core::tree::{NodeIndex, NodeKind, TreeChange};
use arcmount_core::units::format_size;
use arcmount_core::Result;
use crossbeam_channel::Receiver;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Maximum notifications drained from each channel per call.
const MAX_MESSAGES_PER_BATCH: usize = 300;

/// Counts of what one [`ShellState::process_messages`] call drained.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Drained {
    pub registry_events: usize,
    pub tree_changes: usize,
    pub progress: usize,
}

pub struct ShellState {
    pub session: Session,
    registry_rx: Receiver<RegistryEvent>,
    tree_rx: Receiver<TreeChange>,
    progress_rx: Receiver<ScanProgress>,

    /// Latest change per tree path.
    pub tree_changes: HashMap<String, TreeChange>,
    /// Last terminal progress message per archive.
    pub finished: HashMap<MountId, ScanProgress>,
    pub registry_events_seen: u64,
}

impl ShellState {
    pub fn new(config: EngineConfig, opener: Arc<dyn ArchiveOpener>) -> Self {
        let session = Session::new(config, opener);
        let registry_rx = session.registry.subscribe();
        let tree_rx = session.tree.read().subscribe();
        let progress_rx = session.engine.subscribe();
        Self {
            session,
            registry_rx,
            tree_rx,
            progress_rx,
            tree_changes: HashMap::new(),
            finished: HashMap::new(),
            registry_events_seen: 0,
        }
    }

    /// State backed by the on-disk archive formats.
    pub fn with_default_opener(config: EngineConfig) -> Self {
        Self::new(config, Arc::new(DefaultOpener))
    }

    // ── Mount surface ─────────────────────────────────────

    pub fn mount(&mut self, path: &Path) -> Result<MountId> {
        let id = self.session.controller.mount_blocking(path)?;
        self.process_messages();
        Ok(id)
    }

    pub fn unmount(&mut self, id: MountId) -> Result<()> {
        let result = self.session.controller.unmount(id);
        self.finished.remove(&id);
        self.process_messages();
        result
    }

    pub fn unmount_all(&mut self) -> UnmountReport {
        let report = self.session.controller.unmount_all();
        for id in &report.removed {
            self.finished.remove(id);
        }
        for (id, err) in &report.failed {
            warn!("Unmount of {id} failed: {err}");
        }
        self.process_messages();
        report
    }

    pub fn list_mounts(&self) -> Vec<MountSummary> {
        self.session.controller.list_mounts()
    }

    /// Register local drives and the home directory.
    pub fn discover_roots(&mut self) -> usize {
        let count = self.session.discover_roots();
        self.process_messages();
        count
    }

    // ── Scan surface ──────────────────────────────────────

    /// Start a scan; `None` uses the configured default thread count.
    pub fn start_scan(&mut self, id: MountId, threads: Option<usize>) -> Result<u64> {
        let threads = threads.unwrap_or(self.session.config.default_threads);
        self.finished.remove(&id);
        self.session.engine.start(id, threads)
    }

    pub fn stop_scan(&mut self, id: MountId) -> Result<()> {
        self.session.engine.stop(id)?;
        self.process_messages();
        Ok(())
    }

    pub fn get_scan_stats(&self, id: MountId) -> Result<ScanSnapshot> {
        self.session.engine.snapshot(id)
    }

    /// Whether the last job for `id` has finished, by whatever means.
    pub fn scan_finished(&mut self, id: MountId) -> bool {
        self.process_messages();
        self.finished.contains_key(&id) || !self.session.engine.is_running(id)
    }

    // ── Notifications ─────────────────────────────────────

    /// Drain pending notifications, at most a fixed batch per channel.
    pub fn process_messages(&mut self) -> Drained {
        let mut drained = Drained::default();

        for event in self.registry_rx.try_iter().take(MAX_MESSAGES_PER_BATCH) {
            debug!("Registry event: {event:?}");
            self.registry_events_seen += 1;
            drained.registry_events += 1;
        }

        for change in self.tree_rx.try_iter().take(MAX_MESSAGES_PER_BATCH) {
            self.tree_changes.insert(change.path.clone(), change);
            drained.tree_changes += 1;
        }

        for msg in self.progress_rx.try_iter().take(MAX_MESSAGES_PER_BATCH) {
            if msg.is_terminal() {
                self.finished.insert(msg.archive(), msg);
            }
            drained.progress += 1;
        }

        drained
    }

    // ── Tree rendering ────────────────────────────────────

    /// Expand every mounted archive in the tree. Returns the number of
    /// nodes created.
    pub fn expand_archives(&mut self) -> usize {
        let mut created = 0;
        {
            let mut tree = self.session.tree.write();
            let category = tree.category(arcmount_core::tree::Category::MountedArchives);
            let mounts: Vec<NodeIndex> = tree.children(category).to_vec();
            for idx in mounts {
                let mounted = matches!(
                    tree.node(idx).map(|n| &n.kind),
                    Some(NodeKind::Mount {
                        status: MountStatus::Mounted,
                        ..
                    })
                );
                if !mounted {
                    continue;
                }
                match tree.expand(idx) {
                    Ok(n) => created += n,
                    Err(e) => warn!("Cannot expand {}: {e}", idx.0),
                }
            }
        }
        self.process_messages();
        created
    }

    /// Render the whole tree as indented text.
    pub fn render_tree(&self) -> String {
        let tree = self.session.tree.read();
        let mut out = String::new();
        let mut stack: Vec<(NodeIndex, usize)> = vec![(tree.root(), 0)];
        while let Some((idx, depth)) = stack.pop() {
            let Some(node) = tree.node(idx) else {
                continue;
            };
            let indent = "  ".repeat(depth);
            let _ = match &node.kind {
                NodeKind::Root => writeln!(out, "/"),
                NodeKind::Category(_) => writeln!(out, "{indent}{}/", node.name),
                NodeKind::Mount { status, .. } => {
                    writeln!(out, "{indent}{} [{status}]", node.name)
                }
                NodeKind::Player { state, .. } => {
                    writeln!(out, "{indent}{} [{state:?}]", node.name)
                }
                NodeKind::Entry {
                    kind: EntryKind::Dir,
                    ..
                } => writeln!(out, "{indent}{}/", node.name),
                NodeKind::Entry { size, .. } => {
                    writeln!(out, "{indent}{} ({})", node.name, format_size(*size))
                }
            };
            for &child in node.children.iter().rev() {
                stack.push((child, depth + 1));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arcmount_core::archive::memory::MemoryOpener;
    use arcmount_core::archive::MemoryArchive;

    #[test]
    fn test_render_tree_lists_expanded_archive() {
        let opener = MemoryOpener::new();
        opener.insert(
            "/virtual/set.zip",
            MemoryArchive::new()
                .with_dir("music")
                .with_file("music/a.ogg", vec![0; 2_048]),
        );
        let mut state = ShellState::new(EngineConfig::default(), Arc::new(opener));
        state.mount(Path::new("/virtual/set.zip")).unwrap();
        assert_eq!(state.expand_archives(), 2);

        let text = state.render_tree();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "/",
                "  Drives/",
                "  Home/",
                "  Mounted archives/",
                "    set.zip [Mounted]",
                "      music/",
                "        a.ogg (2.0 KB)",
                "  Players/",
            ]
        );
        assert!(state.tree_changes.contains_key("/Mounted archives/set.zip"));
    }
}
