/// A single node in the arena-allocated virtual tree.
///
/// Nodes live in a flat arena and refer to each other by [`NodeIndex`]. A
/// parent owns its children through its `children` list; the `parent` index
/// is a plain back-reference used to rebuild paths.
use super::players::{PlayerId, PlayerState};
use crate::archive::EntryKind;
use crate::mount::{MountId, MountKind, MountStatus};
use compact_str::CompactString;
use serde::Serialize;
use std::collections::HashMap;

/// Lightweight index into the node arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIndex(pub u32);

impl NodeIndex {
    #[inline]
    pub fn new(index: usize) -> Self {
        debug_assert!(index <= u32::MAX as usize, "NodeIndex overflow");
        Self(index as u32)
    }

    #[inline]
    pub fn idx(self) -> usize {
        self.0 as usize
    }
}

/// Fixed category nodes directly under the root, in display order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Category {
    Drives,
    Home,
    MountedArchives,
    Players,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Drives,
        Category::Home,
        Category::MountedArchives,
        Category::Players,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Drives => "Drives",
            Self::Home => "Home",
            Self::MountedArchives => "Mounted archives",
            Self::Players => "Players",
        }
    }

    /// The category a mount of `kind` is listed under.
    pub fn for_mount(kind: MountKind) -> Self {
        match kind {
            MountKind::Drive => Self::Drives,
            MountKind::Home => Self::Home,
            MountKind::Archive => Self::MountedArchives,
        }
    }

    #[inline]
    pub(crate) fn slot(self) -> usize {
        match self {
            Self::Drives => 0,
            Self::Home => 1,
            Self::MountedArchives => 2,
            Self::Players => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Root,
    Category(Category),
    Mount {
        id: MountId,
        kind: MountKind,
        status: MountStatus,
    },
    Player {
        id: PlayerId,
        state: PlayerState,
    },
    /// A file or directory inside a mounted archive.
    Entry {
        mount: MountId,
        kind: EntryKind,
        size: u64,
        /// Path of the entry relative to the archive root.
        entry_path: CompactString,
    },
}

impl NodeKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Root => "root",
            Self::Category(_) => "category",
            Self::Mount { .. } => "mount",
            Self::Player { .. } => "player",
            Self::Entry {
                kind: EntryKind::Dir,
                ..
            } => "dir",
            Self::Entry { .. } => "file",
        }
    }
}

#[derive(Debug, Clone)]
pub struct VirtualNode {
    /// Display name; unique among siblings.
    pub name: CompactString,
    pub kind: NodeKind,
    /// `None` only for the root.
    pub parent: Option<NodeIndex>,
    /// Registration order for categories, archive-native order for entries.
    pub children: Vec<NodeIndex>,
    /// Archive entries have been materialized under this node.
    pub expanded: bool,
    /// Child name -> index, kept in step with `children`.
    by_name: HashMap<CompactString, NodeIndex>,
}

/// The children of one node, detached so they can move to another parent.
#[derive(Debug, Default)]
pub(crate) struct Children {
    pub order: Vec<NodeIndex>,
    by_name: HashMap<CompactString, NodeIndex>,
}

impl VirtualNode {
    pub fn new(name: impl Into<CompactString>, kind: NodeKind, parent: Option<NodeIndex>) -> Self {
        Self {
            name: name.into(),
            kind,
            parent,
            children: Vec::new(),
            expanded: false,
            by_name: HashMap::new(),
        }
    }

    /// The direct child called `name`, in constant time.
    pub fn child_named(&self, name: &str) -> Option<NodeIndex> {
        self.by_name.get(name).copied()
    }

    /// Append `child` under `name`. Returns false, leaving the node
    /// unchanged, if a child of that name already exists.
    pub(crate) fn attach(&mut self, name: CompactString, child: NodeIndex) -> bool {
        if self.by_name.contains_key(&name) {
            return false;
        }
        self.by_name.insert(name, child);
        self.children.push(child);
        true
    }

    pub(crate) fn detach_all(&mut self) -> Children {
        Children {
            order: std::mem::take(&mut self.children),
            by_name: std::mem::take(&mut self.by_name),
        }
    }

    pub(crate) fn adopt(&mut self, children: Children) {
        self.children = children.order;
        self.by_name = children.by_name;
    }

    pub fn mount_id(&self) -> Option<MountId> {
        match &self.kind {
            NodeKind::Mount { id, .. } => Some(*id),
            NodeKind::Entry { mount, .. } => Some(*mount),
            _ => None,
        }
    }

    #[inline]
    pub fn is_mount(&self) -> bool {
        matches!(self.kind, NodeKind::Mount { .. })
    }

    pub fn summary(&self) -> NodeSummary {
        let (mount, status, size) = match &self.kind {
            NodeKind::Mount { id, status, .. } => (Some(*id), Some(*status), None),
            NodeKind::Entry { mount, size, .. } => (Some(*mount), None, Some(*size)),
            _ => (None, None, None),
        };
        NodeSummary {
            name: self.name.to_string(),
            kind: self.kind.label(),
            mount,
            status,
            size,
            children: self.children.len(),
        }
    }
}

/// Flat description of a node, as carried by change notifications.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeSummary {
    pub name: String,
    pub kind: &'static str,
    pub mount: Option<MountId>,
    pub status: Option<MountStatus>,
    pub size: Option<u64>,
    pub children: usize,
}
