//! Player Manager: lifecycle of the `{"video", "artnet"}` players plus
//! any additional player ids a caller spawns, and the coordination point
//! for engine-wide snapshot/restore.
//!
//! Grounded on `playback.rs`'s `PatternPlaybackState`, whose
//! `HashMap<String, PlaybackEntry>` keyed by a caller-chosen id is the
//! same shape generalized here from pattern playback entries to
//! [`Player`] handles.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::clip::ClipRegistry;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::events::ErrorEventQueue;
use crate::plugin::PluginRegistry;
use crate::player::Player;

/// Owns every live [`Player`], keyed by caller-chosen id. The engine's
/// two conventional ids are `"video"` and `"artnet"` , but nothing
/// here special-cases those strings -- a caller may spawn as many
/// players under as many ids as it needs.
pub struct PlayerManager {
    players: Mutex<HashMap<String, Arc<Player>>>,
    registry: Arc<ClipRegistry>,
    plugins: Arc<PluginRegistry>,
    config: EngineConfig,
    events: Arc<ErrorEventQueue>,
}

impl PlayerManager {
    pub fn new(registry: Arc<ClipRegistry>, plugins: Arc<PluginRegistry>, config: EngineConfig) -> Self {
        Self {
            players: Mutex::new(HashMap::new()),
            registry,
            plugins,
            config,
            events: Arc::new(ErrorEventQueue::new()),
        }
    }

    pub fn with_events(mut self, events: Arc<ErrorEventQueue>) -> Self {
        self.events = events;
        self
    }

    pub fn events(&self) -> &Arc<ErrorEventQueue> {
        &self.events
    }

    /// Create and register a new player under `id`. Errors if `id` is
    /// already taken rather than silently replacing a live player.
    pub fn spawn(&self, id: impl Into<String>, canvas: (u32, u32)) -> Result<Arc<Player>, EngineError> {
        let id = id.into();
        let mut players = self.players.lock().expect("player manager map poisoned");
        if players.contains_key(&id) {
            return Err(EngineError::Internal {
                reason: format!("player '{}' already exists", id),
            });
        }
        let player = Arc::new(Player::new(
            id.clone(),
            canvas,
            self.registry.clone(),
            self.plugins.clone(),
            &self.config,
            self.events.clone(),
        ));
        players.insert(id, player.clone());
        Ok(player)
    }

    pub fn get(&self, id: &str) -> Option<Arc<Player>> {
        self.players.lock().expect("player manager map poisoned").get(id).cloned()
    }

    /// Stop and drop a player. The player's own `Drop` impl joins its
    /// play-loop thread .
    pub fn remove(&self, id: &str) -> Result<(), EngineError> {
        let removed = self.players.lock().expect("player manager map poisoned").remove(id);
        match removed {
            Some(player) => {
                player.stop()?;
                Ok(())
            }
            None => Err(EngineError::PlayerNotFound { id: id.to_string() }),
        }
    }

    pub fn ids(&self) -> Vec<String> {
        self.players.lock().expect("player manager map poisoned").keys().cloned().collect()
    }

    /// Stop every player in an unspecified order; used at engine
    /// teardown so no play-loop thread outlives the engine.
    pub fn stop_all(&self) {
        let players = self.players.lock().expect("player manager map poisoned");
        for player in players.values() {
            let _ = player.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> PlayerManager {
        PlayerManager::new(
            Arc::new(ClipRegistry::new()),
            Arc::new(PluginRegistry::discover(&[])),
            EngineConfig::default(),
        )
    }

    #[test]
    fn spawning_twice_under_the_same_id_fails() {
        let manager = manager();
        manager.spawn("video", (8, 8)).unwrap();
        assert!(manager.spawn("video", (8, 8)).is_err());
    }

    #[test]
    fn get_returns_none_for_an_unknown_id() {
        let manager = manager();
        assert!(manager.get("nope").is_none());
    }

    #[test]
    fn removing_an_unknown_id_is_an_error() {
        let manager = manager();
        assert!(manager.remove("nope").is_err());
    }

    #[test]
    fn conventional_video_and_artnet_ids_can_coexist() {
        let manager = manager();
        manager.spawn("video", (16, 16)).unwrap();
        manager.spawn("artnet", (16, 16)).unwrap();
        assert_eq!(manager.ids().len(), 2);
    }
}
