/// One fully wired set of core components.
///
/// Building the registry, tree, engine and controller by hand means getting
/// the observer wiring right every time; [`Session::new`] does it once.
use crate::archive::ArchiveOpener;
use crate::config::EngineConfig;
use crate::mount::{MountController, MountRegistry};
use crate::scanner::ScanEngine;
use crate::tree::{LiveTree, PlayerRegistry, VirtualTree};
use parking_lot::RwLock;
use std::sync::Arc;

pub struct Session {
    pub config: EngineConfig,
    pub registry: Arc<MountRegistry>,
    pub players: Arc<PlayerRegistry>,
    pub tree: LiveTree,
    pub engine: Arc<ScanEngine>,
    pub controller: MountController,
}

impl Session {
    pub fn new(config: EngineConfig, opener: Arc<dyn ArchiveOpener>) -> Self {
        let registry = Arc::new(MountRegistry::new(config.notify_capacity));
        let players = Arc::new(PlayerRegistry::new());
        let tree: LiveTree = Arc::new(RwLock::new(VirtualTree::new(config.notify_capacity)));
        registry.add_observer(tree.clone());
        players.add_observer(tree.clone());

        let engine = Arc::new(ScanEngine::new(Arc::clone(&registry), &config));
        let controller =
            MountController::new(Arc::clone(&registry), Arc::clone(&engine), opener);

        Self {
            config,
            registry,
            players,
            tree,
            engine,
            controller,
        }
    }

    /// Register the drives and home directory enabled in the config.
    pub fn discover_roots(&self) -> usize {
        self.controller.discover_roots(&self.config).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::memory::MemoryOpener;
    use crate::archive::MemoryArchive;
    use std::path::Path;

    #[test]
    fn test_session_wires_tree_to_registry() {
        let opener = MemoryOpener::new();
        opener.insert("/virtual/set.zip", MemoryArchive::new().with_file("a", vec![1]));
        let session = Session::new(EngineConfig::default(), Arc::new(opener));

        let id = session
            .controller
            .mount_blocking(Path::new("/virtual/set.zip"))
            .unwrap();
        assert_eq!(
            session.tree.read().resolve("/Mounted archives/set.zip/a"),
            Some((id, "a".to_string()))
        );

        session.controller.unmount(id).unwrap();
        assert!(session.tree.read().lookup("/Mounted archives/set.zip").is_none());
    }
}
