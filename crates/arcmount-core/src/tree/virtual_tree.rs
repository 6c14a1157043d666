/// The unified virtual tree over drives, home, mounted archives and players.
///
/// All nodes live in one arena. Removed slots are recycled through a free
/// list, so a `NodeIndex` is only meaningful until the next rebuild of the
/// branch it belongs to.
///
/// Registry changes rebuild the whole affected category from the registry
/// contents instead of patching it. Archive entries are materialized lazily
/// by [`VirtualTree::expand`]; a rebuild carries already materialized
/// entries over to the new node of a mount that is still `Mounted`.
use super::node::{Category, Children, NodeIndex, NodeKind, NodeSummary, VirtualNode};
use super::players::{PlayerInfo, PlayerObserver};
use crate::archive::{ArchiveSource, EntryKind};
use crate::error::{ArcError, Result};
use crate::mount::{MountId, MountKind, MountObserver, MountPoint, MountStatus, RegistryEvent};
use crate::notify::Subscribers;
use compact_str::CompactString;
use crossbeam_channel::Receiver;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// A rebuilt or expanded branch: its path and its new direct children.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeChange {
    pub path: String,
    pub nodes: Vec<NodeSummary>,
}

pub struct VirtualTree {
    nodes: Vec<Option<VirtualNode>>,
    free: Vec<NodeIndex>,
    root: NodeIndex,
    categories: [NodeIndex; 4],
    /// Open sources of `Mounted` archives, refreshed on every rebuild.
    sources: HashMap<MountId, Arc<dyn ArchiveSource>>,
    subscribers: Subscribers<TreeChange>,
}

impl VirtualTree {
    pub fn new(notify_capacity: usize) -> Self {
        let mut tree = Self {
            nodes: Vec::new(),
            free: Vec::new(),
            root: NodeIndex(0),
            categories: [NodeIndex(0); 4],
            sources: HashMap::new(),
            subscribers: Subscribers::new(notify_capacity),
        };
        tree.root = tree.alloc(VirtualNode::new("", NodeKind::Root, None));
        for category in Category::ALL {
            let idx = tree.alloc(VirtualNode::new(
                category.name(),
                NodeKind::Category(category),
                Some(tree.root),
            ));
            tree.push_child(tree.root, idx);
            tree.categories[category.slot()] = idx;
        }
        tree
    }

    pub fn subscribe(&self) -> Receiver<TreeChange> {
        self.subscribers.subscribe()
    }

    #[inline]
    pub fn root(&self) -> NodeIndex {
        self.root
    }

    #[inline]
    pub fn category(&self, category: Category) -> NodeIndex {
        self.categories[category.slot()]
    }

    pub fn node(&self, index: NodeIndex) -> Option<&VirtualNode> {
        self.nodes.get(index.idx()).and_then(Option::as_ref)
    }

    fn node_mut(&mut self, index: NodeIndex) -> Option<&mut VirtualNode> {
        self.nodes.get_mut(index.idx()).and_then(Option::as_mut)
    }

    /// Direct children in display order; empty for unknown indices.
    pub fn children(&self, index: NodeIndex) -> &[NodeIndex] {
        self.node(index).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// Number of live nodes, root included.
    pub fn len(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn alloc(&mut self, node: VirtualNode) -> NodeIndex {
        match self.free.pop() {
            Some(idx) => {
                self.nodes[idx.idx()] = Some(node);
                idx
            }
            None => {
                let idx = NodeIndex::new(self.nodes.len());
                self.nodes.push(Some(node));
                idx
            }
        }
    }

    /// Attach `child` under `parent`. Sibling names are unique: on a clash
    /// the child is released and false is returned.
    fn push_child(&mut self, parent: NodeIndex, child: NodeIndex) -> bool {
        let Some(name) = self.node(child).map(|n| n.name.clone()) else {
            return false;
        };
        let attached = self
            .node_mut(parent)
            .is_some_and(|node| node.attach(name, child));
        if !attached {
            self.release(child);
        }
        attached
    }

    fn detach_children(&mut self, parent: NodeIndex) -> Children {
        self.node_mut(parent)
            .map(VirtualNode::detach_all)
            .unwrap_or_default()
    }

    /// Free `index` and its whole subtree.
    fn release(&mut self, index: NodeIndex) {
        let mut stack = vec![index];
        while let Some(idx) = stack.pop() {
            if let Some(node) = self.nodes.get_mut(idx.idx()).and_then(Option::take) {
                stack.extend(node.children);
                self.free.push(idx);
            }
        }
    }

    /// Find a node by `/`-separated path from the root.
    pub fn lookup(&self, path: &str) -> Option<NodeIndex> {
        let mut current = self.root;
        for component in path.split('/').filter(|c| !c.is_empty()) {
            current = self.child_named(current, component)?;
        }
        Some(current)
    }

    fn child_named(&self, parent: NodeIndex, name: &str) -> Option<NodeIndex> {
        self.node(parent)?.child_named(name)
    }

    /// Full path of a node, `/` for the root.
    pub fn path_of(&self, index: NodeIndex) -> Option<String> {
        let mut segments = Vec::new();
        let mut current = Some(index);
        while let Some(idx) = current {
            let node = self.node(idx)?;
            if node.parent.is_some() {
                segments.push(node.name.as_str());
            }
            current = node.parent;
        }
        segments.reverse();
        Some(format!("/{}", segments.join("/")))
    }

    /// Map a virtual path to the mount it falls under and the remaining
    /// path inside it. Works whether or not the archive has been expanded.
    pub fn resolve(&self, path: &str) -> Option<(MountId, String)> {
        let components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
        let mut current = self.root;
        for (depth, component) in components.iter().enumerate() {
            current = self.child_named(current, component)?;
            if let Some(NodeKind::Mount { id, .. }) = self.node(current).map(|n| &n.kind) {
                return Some((*id, components[depth + 1..].join("/")));
            }
        }
        None
    }

    fn summaries(&self, parent: NodeIndex) -> Vec<NodeSummary> {
        self.children(parent)
            .iter()
            .filter_map(|&c| self.node(c))
            .map(VirtualNode::summary)
            .collect()
    }

    fn publish(&self, parent: NodeIndex) {
        if let Some(path) = self.path_of(parent) {
            self.subscribers.publish(&TreeChange {
                path,
                nodes: self.summaries(parent),
            });
        }
    }

    /// Materialize the entries of the archive mounted at `index`.
    ///
    /// Returns the number of nodes created; 0 if already expanded or if the
    /// node is not a mount (categories and entries are complete as they are).
    pub fn expand(&mut self, index: NodeIndex) -> Result<usize> {
        let node = self
            .node(index)
            .ok_or_else(|| ArcError::invalid(format!("no tree node {}", index.0)))?;
        let (id, kind, status) = match node.kind {
            NodeKind::Mount { id, kind, status } => (id, kind, status),
            NodeKind::Player { .. } => return Err(ArcError::invalid("players cannot be expanded")),
            _ => return Ok(0),
        };
        if kind != MountKind::Archive {
            return Err(ArcError::invalid(format!(
                "{} roots are browsed through the filesystem",
                kind.label()
            )));
        }
        match status {
            MountStatus::Mounted => {}
            MountStatus::Voided => return Err(ArcError::VoidedMount(id)),
            status => return Err(ArcError::NotMounted { id, status }),
        }
        if node.expanded {
            return Ok(0);
        }
        let source = self
            .sources
            .get(&id)
            .cloned()
            .ok_or(ArcError::NotMounted { id, status })?;

        let mut created = 0;
        let mut clashes = 0;
        'entries: for entry in source.entries() {
            let mut parent = index;
            let mut prefix = CompactString::default();
            let mut components = entry.path.split('/').filter(|c| !c.is_empty()).peekable();
            while let Some(component) = components.next() {
                if !prefix.is_empty() {
                    prefix.push('/');
                }
                prefix.push_str(component);
                let (kind, size) = if components.peek().is_none() {
                    (entry.kind, entry.size)
                } else {
                    (EntryKind::Dir, 0)
                };

                if let Some(existing) = self.child_named(parent, component) {
                    // Directories merge; anything else would put two
                    // siblings under one name.
                    if kind == EntryKind::Dir && self.is_dir_entry(existing) {
                        parent = existing;
                        continue;
                    }
                    warn!(
                        "Archive {id}: entry {} clashes with an existing node at {prefix}, not listed",
                        entry.path
                    );
                    clashes += 1;
                    continue 'entries;
                }
                let child = self.alloc(VirtualNode::new(
                    component,
                    NodeKind::Entry {
                        mount: id,
                        kind,
                        size,
                        entry_path: prefix.clone(),
                    },
                    Some(parent),
                ));
                if !self.push_child(parent, child) {
                    clashes += 1;
                    continue 'entries;
                }
                created += 1;
                parent = child;
            }
        }

        if let Some(node) = self.node_mut(index) {
            node.expanded = true;
        }
        debug!("Expanded {id}: {created} nodes, {clashes} clashing entries skipped");
        self.publish(index);
        Ok(created)
    }

    fn is_dir_entry(&self, index: NodeIndex) -> bool {
        matches!(
            self.node(index).map(|n| &n.kind),
            Some(NodeKind::Entry {
                kind: EntryKind::Dir,
                ..
            })
        )
    }

    /// Rebuild the categories affected by a registry change.
    pub fn apply_mounts(&mut self, event: Option<&RegistryEvent>, mounts: &[MountPoint]) {
        self.sources = mounts
            .iter()
            .filter(|m| m.status == MountStatus::Mounted)
            .filter_map(|m| m.source.as_ref().map(|s| (m.id, Arc::clone(s))))
            .collect();

        let categories: Vec<Category> = match event {
            Some(event) => vec![Category::for_mount(event.kind())],
            None => vec![Category::Drives, Category::Home, Category::MountedArchives],
        };
        for category in categories {
            self.rebuild_mounts(category, mounts);
        }
    }

    fn rebuild_mounts(&mut self, category: Category, mounts: &[MountPoint]) {
        let parent = self.category(category);
        let old = self.detach_children(parent).order;

        // Materialized entries survive for mounts that stay Mounted.
        let mut kept: HashMap<MountId, Children> = HashMap::new();
        for idx in old {
            let carry = match self.node(idx) {
                Some(VirtualNode {
                    kind:
                        NodeKind::Mount {
                            id,
                            status: MountStatus::Mounted,
                            ..
                        },
                    expanded: true,
                    ..
                }) => Some(*id),
                _ => None,
            };
            if let Some(id) = carry {
                let still_mounted = mounts
                    .iter()
                    .any(|m| m.id == id && m.status == MountStatus::Mounted);
                if still_mounted {
                    kept.insert(id, self.detach_children(idx));
                }
            }
            self.release(idx);
        }

        let members: Vec<&MountPoint> = mounts
            .iter()
            .filter(|m| Category::for_mount(m.kind) == category)
            .collect();
        let mut seen: HashSet<&str> = HashSet::new();
        let duplicated: HashSet<&str> = members
            .iter()
            .filter(|m| !seen.insert(m.label.as_str()))
            .map(|m| m.label.as_str())
            .collect();

        for mount in &members {
            let name = if duplicated.contains(mount.label.as_str()) {
                CompactString::new(format!("{} ({})", mount.label, mount.id))
            } else {
                mount.label.clone()
            };
            let idx = self.alloc(VirtualNode::new(
                name,
                NodeKind::Mount {
                    id: mount.id,
                    kind: mount.kind,
                    status: mount.status,
                },
                Some(parent),
            ));
            if let Some(children) = kept.remove(&mount.id) {
                for &child in &children.order {
                    if let Some(node) = self.node_mut(child) {
                        node.parent = Some(idx);
                    }
                }
                if let Some(node) = self.node_mut(idx) {
                    node.adopt(children);
                    node.expanded = true;
                }
            }
            if !self.push_child(parent, idx) {
                warn!("Mount {} not listed: name already taken in {}", mount.id, category.name());
            }
        }

        debug!("Rebuilt {:?}: {} mount(s)", category.name(), members.len());
        self.publish(parent);
    }

    /// Rebuild the Players category.
    pub fn apply_players(&mut self, players: &[PlayerInfo]) {
        let parent = self.category(Category::Players);
        let old = self.detach_children(parent).order;
        for idx in old {
            self.release(idx);
        }
        for player in players {
            let idx = self.alloc(VirtualNode::new(
                format!("{} ({})", player.label, player.id),
                NodeKind::Player {
                    id: player.id,
                    state: player.state,
                },
                Some(parent),
            ));
            self.push_child(parent, idx);
        }
        self.publish(parent);
    }
}

impl MountObserver for RwLock<VirtualTree> {
    fn mounts_changed(&self, event: Option<&RegistryEvent>, mounts: &[MountPoint]) {
        self.write().apply_mounts(event, mounts);
    }
}

impl PlayerObserver for RwLock<VirtualTree> {
    fn players_changed(&self, players: &[PlayerInfo]) {
        self.write().apply_players(players);
    }
}
