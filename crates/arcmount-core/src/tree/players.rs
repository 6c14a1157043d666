/// Player registry — the second source feeding the virtual tree.
///
/// Playback itself happens elsewhere; this only tracks which players exist
/// and what state they report, so the "Players" category can list them.
use crate::error::{ArcError, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlayerId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlayerState {
    Idle,
    Playing,
    Paused,
    Stopped,
    /// Muted or disabled by the user; only removal follows.
    Voided,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub id: PlayerId,
    pub label: String,
    /// What the player is fed from (an archive entry or a file).
    pub source: PathBuf,
    pub state: PlayerState,
}

/// Synchronous observer, called with the player lock held.
pub trait PlayerObserver: Send + Sync {
    fn players_changed(&self, players: &[PlayerInfo]);
}

struct PlayerInner {
    players: Vec<PlayerInfo>,
    next_id: u64,
}

pub struct PlayerRegistry {
    inner: RwLock<PlayerInner>,
    observers: RwLock<Vec<Arc<dyn PlayerObserver>>>,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(PlayerInner {
                players: Vec::new(),
                next_id: 1,
            }),
            observers: RwLock::new(Vec::new()),
        }
    }

    pub fn add_observer(&self, observer: Arc<dyn PlayerObserver>) {
        let inner = self.inner.read();
        observer.players_changed(&inner.players);
        self.observers.write().push(observer);
    }

    fn notify(&self, inner: &PlayerInner) {
        for observer in self.observers.read().iter() {
            observer.players_changed(&inner.players);
        }
    }

    pub fn add(&self, label: impl Into<String>, source: PathBuf) -> PlayerId {
        let mut inner = self.inner.write();
        let id = PlayerId(inner.next_id);
        inner.next_id += 1;
        inner.players.push(PlayerInfo {
            id,
            label: label.into(),
            source,
            state: PlayerState::Idle,
        });
        self.notify(&inner);
        id
    }

    pub fn remove(&self, id: PlayerId) -> Result<PlayerInfo> {
        let mut inner = self.inner.write();
        let pos = inner
            .players
            .iter()
            .position(|p| p.id == id)
            .ok_or(ArcError::PlayerNotFound(id))?;
        let removed = inner.players.remove(pos);
        self.notify(&inner);
        Ok(removed)
    }

    /// Update a player's state and return the previous one. A voided
    /// player cannot change state again.
    pub fn set_state(&self, id: PlayerId, state: PlayerState) -> Result<PlayerState> {
        let mut inner = self.inner.write();
        let player = inner
            .players
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(ArcError::PlayerNotFound(id))?;
        let previous = player.state;
        if previous == PlayerState::Voided && state != PlayerState::Voided {
            return Err(ArcError::invalid(format!("player {id} is voided")));
        }
        player.state = state;
        self.notify(&inner);
        Ok(previous)
    }

    pub fn get(&self, id: PlayerId) -> Option<PlayerInfo> {
        self.inner.read().players.iter().find(|p| p.id == id).cloned()
    }

    pub fn list(&self) -> Vec<PlayerInfo> {
        self.inner.read().players.clone()
    }
}

impl Default for PlayerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
