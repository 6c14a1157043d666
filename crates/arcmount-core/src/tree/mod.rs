/// Tree module — the unified virtual hierarchy shown to frontends.
///
/// - [`node`] — arena node types.
/// - [`virtual_tree`] — the arena itself, rebuilt from registry changes.
/// - [`players`] — the player registry behind the "Players" category.
///
/// The tree is shared as a [`LiveTree`] so frontends can read it while the
/// registry updates it.
pub mod node;
pub mod players;
pub mod virtual_tree;

pub use node::{Category, NodeIndex, NodeKind, NodeSummary, VirtualNode};
pub use players::{PlayerId, PlayerInfo, PlayerObserver, PlayerRegistry, PlayerState};
pub use virtual_tree::{TreeChange, VirtualTree};

use parking_lot::RwLock;
use std::sync::Arc;

/// Shared handle to the tree. Registered as an observer with both the mount
/// and the player registry.
pub type LiveTree = Arc<RwLock<VirtualTree>>;
