//! The top-level `Engine` façade: the only entry point an external
//! transport layer (CLI, RPC server, UI) talks to. It owns the plugin
//! registry, clip registry, player manager, sequence engine, and error
//! event queue, and exposes the control contract -- transport, global
//! params, content, per-chain effects, clip layer CRUD, Art-Net config,
//! introspection, and snapshot/restore.
//!
//! Grounded on `lib.rs`'s setup wiring: `PluginRegistry`, `ClipRegistry`,
//! and `PlayerManager` are constructed in the same dependency order a
//! Tauri app's managed state is wired up in, reworked from
//! `app.manage(..)` into plain constructor injection.

use std::collections::BTreeMap;
use std::sync::Arc;

use uuid::Uuid;

use crate::artnet::ChannelOrder;
use crate::clip::{BlendMode, ChainTarget, Clip, ClipRegistry};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::events::{ErrorEvent, ErrorEventQueue};
use crate::manager::PlayerManager;
use crate::player::{Player, PlayerState, PlayerStats, PlaylistItem};
use crate::plugin::{PluginMetadata, PluginRegistry};
use crate::sequence::{AudioAnalyzer, Sequence, SequenceEngine};
use crate::snapshot::EngineSnapshot;
use crate::value::ParamValue;

/// Everything a status query reports about one player .
#[derive(Debug, Clone)]
pub struct PlayerInfo {
    pub id: String,
    pub state: PlayerState,
    pub clip_id: Option<Uuid>,
    pub canvas: (u32, u32),
    pub stats: PlayerStats,
}

/// Owns every subsystem and is the sole path through which a caller may
/// observe or mutate engine state .
pub struct Engine {
    plugins: Arc<PluginRegistry>,
    clips: Arc<ClipRegistry>,
    players: Arc<PlayerManager>,
    sequences: Arc<SequenceEngine>,
    events: Arc<ErrorEventQueue>,
    config: EngineConfig,
}

impl Engine {
    /// Build the engine from a loaded config: plugins discovered first,
    /// then an empty clip registry, then the player manager (which needs
    /// both), then the sequence ticker (which needs the player manager
    /// and clip registry) -- so no subsystem ever observes a
    /// partially-built dependency.
    pub fn new(config: EngineConfig) -> Self {
        let plugins = Arc::new(PluginRegistry::discover(&config.plugins.search_paths));
        let clips = Arc::new(ClipRegistry::new());
        let events = Arc::new(ErrorEventQueue::new());
        let players = Arc::new(
            PlayerManager::new(clips.clone(), plugins.clone(), config.clone()).with_events(events.clone()),
        );
        let sequences = Arc::new(SequenceEngine::new(
            config.sequence.tick_hz,
            players.clone(),
            clips.clone(),
            Arc::new(AudioAnalyzer::new()),
        ));
        let engine = Self {
            plugins,
            clips,
            players,
            sequences,
            events,
            config,
        };
        // The two conventional players 
        // exist for the lifetime of the engine; additional ids may still
        // be spawned by a caller that needs more independent outputs.
        let canvas = (engine.config.canvas.width, engine.config.canvas.height);
        let _ = engine.players.spawn("video", canvas);
        let _ = engine.players.spawn("artnet", canvas);
        engine
    }

    fn player(&self, id: &str) -> EngineResult<Arc<Player>> {
        self.players.get(id).ok_or_else(|| EngineError::PlayerNotFound { id: id.to_string() })
    }

    // -- player lifecycle --------------------------------------------------

    pub fn spawn_player(&self, id: impl Into<String>) -> EngineResult<()> {
        let canvas = (self.config.canvas.width, self.config.canvas.height);
        self.players.spawn(id, canvas).map(|_| ())
    }

    pub fn remove_player(&self, id: &str) -> EngineResult<()> {
        self.players.remove(id)
    }

    pub fn player_ids(&self) -> Vec<String> {
        self.players.ids()
    }

    // -- transport  ------------------------------------------------------

    pub fn play(&self, player_id: &str) -> EngineResult<()> {
        self.player(player_id)?.play()
    }

    pub fn pause(&self, player_id: &str) -> EngineResult<()> {
        self.player(player_id)?.pause()
    }

    pub fn resume(&self, player_id: &str) -> EngineResult<()> {
        self.player(player_id)?.resume()
    }

    pub fn stop(&self, player_id: &str) -> EngineResult<()> {
        self.player(player_id)?.stop()
    }

    pub fn restart(&self, player_id: &str) -> EngineResult<()> {
        self.player(player_id)?.restart()
    }

    // -- global params  ---------------------------------------------------

    pub fn set_brightness(&self, player_id: &str, percent: u8) -> EngineResult<()> {
        if percent > 100 {
            return Err(EngineError::ParameterValidation {
                reason: format!("brightness {} out of range 0..=100", percent),
            });
        }
        self.player(player_id)?.set_brightness(percent);
        Ok(())
    }

    pub fn set_hue_shift(&self, player_id: &str, degrees: i32) -> EngineResult<()> {
        self.player(player_id)?.set_hue_shift(degrees);
        Ok(())
    }

    pub fn set_speed(&self, player_id: &str, speed: f32) -> EngineResult<()> {
        if !(0.1..=3.0).contains(&speed) {
            return Err(EngineError::ParameterValidation {
                reason: format!("speed {} out of range 0.1..=3.0", speed),
            });
        }
        self.player(player_id)?.set_speed(speed);
        Ok(())
    }

    pub fn set_fps(&self, player_id: &str, fps: u32) -> EngineResult<()> {
        self.player(player_id)?.set_fps(fps);
        Ok(())
    }

    pub fn set_loop(&self, player_id: &str, count: Option<u32>) -> EngineResult<()> {
        self.player(player_id)?.set_loop(count);
        Ok(())
    }

    // -- content  ---------------------------------------------------------

    pub fn load_clip(&self, player_id: &str, clip_id: Uuid) -> EngineResult<()> {
        self.player(player_id)?.load_clip(clip_id)
    }

    pub fn current_clip(&self, player_id: &str) -> EngineResult<Option<Uuid>> {
        Ok(self.player(player_id)?.current_clip())
    }

    pub fn set_playlist(&self, player_id: &str, items: Vec<PlaylistItem>) -> EngineResult<()> {
        self.player(player_id)?.set_playlist(items);
        Ok(())
    }

    pub fn seek(&self, player_id: &str, target_frame: u64) -> EngineResult<()> {
        self.player(player_id)?.seek(target_frame)
    }

    // -- per-chain effects  -------------------------------------------------

    pub fn add_chain_effect(
        &self,
        clip_id: Uuid,
        target: ChainTarget,
        plugin_id: String,
        params: BTreeMap<String, ParamValue>,
    ) -> EngineResult<usize> {
        self.clips.add_chain_effect(clip_id, target, plugin_id, params).map_err(EngineError::from)
    }

    pub fn remove_chain_effect(&self, clip_id: Uuid, target: ChainTarget, index: usize) -> EngineResult<()> {
        self.clips.remove_chain_effect(clip_id, target, index).map_err(EngineError::from)
    }

    pub fn update_chain_parameter(
        &self,
        clip_id: Uuid,
        target: ChainTarget,
        index: usize,
        name: String,
        value: ParamValue,
    ) -> EngineResult<()> {
        self.clips.update_chain_parameter(clip_id, target, index, name, value).map_err(EngineError::from)
    }

    pub fn clear_chain(&self, clip_id: Uuid, target: ChainTarget) -> EngineResult<()> {
        self.clips.clear_chain(clip_id, target).map_err(EngineError::from)
    }

    // -- clip layer CRUD  ------------------------

    pub fn add_layer(&self, clip_id: Uuid, source: crate::frame_source::FrameSourceSpec) -> EngineResult<usize> {
        self.clips.add_layer(clip_id, source).map_err(EngineError::from)
    }

    pub fn remove_layer(&self, clip_id: Uuid, index: usize) -> EngineResult<()> {
        self.clips.remove_layer(clip_id, index).map_err(EngineError::from)
    }

    pub fn reorder_layers(&self, clip_id: Uuid, new_order: &[usize]) -> EngineResult<()> {
        self.clips.reorder_layers(clip_id, new_order).map_err(EngineError::from)
    }

    pub fn update_layer_config(
        &self,
        clip_id: Uuid,
        index: usize,
        blend_mode: Option<BlendMode>,
        opacity: Option<u8>,
        enabled: Option<bool>,
    ) -> EngineResult<()> {
        self.clips.update_layer_config(clip_id, index, blend_mode, opacity, enabled).map_err(EngineError::from)
    }

    pub fn add_layer_effect(
        &self,
        clip_id: Uuid,
        layer_index: usize,
        plugin_id: String,
        params: BTreeMap<String, ParamValue>,
    ) -> EngineResult<usize> {
        self.clips.add_effect(clip_id, layer_index, plugin_id, params).map_err(EngineError::from)
    }

    pub fn remove_layer_effect(&self, clip_id: Uuid, layer_index: usize, effect_index: usize) -> EngineResult<()> {
        self.clips.remove_effect(clip_id, layer_index, effect_index).map_err(EngineError::from)
    }

    pub fn update_layer_effect_parameter(
        &self,
        clip_id: Uuid,
        layer_index: usize,
        effect_index: usize,
        name: String,
        value: ParamValue,
    ) -> EngineResult<()> {
        self.clips
            .update_effect_parameter(clip_id, layer_index, effect_index, name, value)
            .map_err(EngineError::from)
    }

    // -- art-net config  -----------------------------------------------------

    pub fn set_target_ip(&self, player_id: &str, ip: String) -> EngineResult<()> {
        self.player(player_id)?.set_target_ip(ip);
        Ok(())
    }

    pub fn set_start_universe(&self, player_id: &str, universe: u16) -> EngineResult<()> {
        self.player(player_id)?.set_start_universe(universe);
        Ok(())
    }

    pub fn set_channel_order(&self, player_id: &str, universe: u16, order: ChannelOrder) -> EngineResult<()> {
        self.player(player_id)?.set_channel_order(universe, order);
        Ok(())
    }

    pub fn set_delta(&self, player_id: &str, enabled: bool, threshold: u8, full_interval: u32) -> EngineResult<()> {
        self.player(player_id)?.set_delta(enabled, threshold, full_interval);
        Ok(())
    }

    pub fn blackout(&self, player_id: &str) -> EngineResult<()> {
        self.player(player_id)?.blackout()
    }

    pub fn test_pattern(&self, player_id: &str, color: (u8, u8, u8)) -> EngineResult<()> {
        self.player(player_id)?.test_pattern(color)
    }

    // -- clip registry  -----------------------

    pub fn register_clip(&self, source: crate::frame_source::FrameSourceSpec, total_frames: Option<u64>) -> Uuid {
        self.clips.register(source, total_frames)
    }

    pub fn unregister_clip(&self, clip_id: Uuid) -> EngineResult<()> {
        self.clips.unregister(clip_id).map_err(EngineError::from)
    }

    pub fn get_clip(&self, clip_id: Uuid) -> EngineResult<Clip> {
        self.clips.get(clip_id).map_err(EngineError::from)
    }

    pub fn list_plugins(&self, kind: crate::plugin::PluginKind) -> Vec<PluginMetadata> {
        self.plugins.list(kind)
    }

    // -- sequences  ---------------------------------------------------------

    pub fn register_sequence(&self, sequence: Sequence) -> Uuid {
        self.sequences.register(sequence)
    }

    pub fn unregister_sequence(&self, id: Uuid) -> bool {
        self.sequences.unregister(id)
    }

    pub fn set_sequence_enabled(&self, id: Uuid, enabled: bool) -> bool {
        self.sequences.set_enabled(id, enabled)
    }

    // -- introspection  ----------------------------------

    pub fn status(&self, player_id: &str) -> EngineResult<PlayerState> {
        Ok(self.player(player_id)?.state())
    }

    pub fn info(&self, player_id: &str) -> EngineResult<PlayerInfo> {
        let player = self.player(player_id)?;
        Ok(PlayerInfo {
            id: player.id().to_string(),
            state: player.state(),
            clip_id: player.current_clip(),
            canvas: player.canvas(),
            stats: player.stats(),
        })
    }

    pub fn stats(&self, player_id: &str) -> EngineResult<PlayerStats> {
        Ok(self.player(player_id)?.stats())
    }

    /// Drain every runtime error event accumulated since the last drain
    /// .
    pub fn drain_events(&self) -> Vec<ErrorEvent> {
        self.events.drain()
    }

    // -- snapshot / restore  ------------------------------------

    pub fn snapshot(&self) -> EngineSnapshot {
        let players = self.players.ids().iter().filter_map(|id| self.players.get(id)).map(|p| p.snapshot()).collect();
        EngineSnapshot {
            players,
            clips: self.clips.all(),
            sequences: self.sequences.all(),
            config: self.config.clone(),
        }
    }

    pub fn restore(&self, snapshot: EngineSnapshot) -> EngineResult<()> {
        self.clips.restore_all(snapshot.clips);
        self.sequences.restore_all(snapshot.sequences);
        for player_snapshot in &snapshot.players {
            match self.players.get(&player_snapshot.id) {
                Some(player) => player.restore(player_snapshot)?,
                None => {
                    let canvas = (self.config.canvas.width, self.config.canvas.height);
                    let player = self.players.spawn(player_snapshot.id.clone(), canvas)?;
                    player.restore(player_snapshot)?;
                }
            }
        }
        Ok(())
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.players.stop_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_source::FrameSourceSpec;

    fn engine() -> Engine {
        let mut config = EngineConfig::default();
        config.canvas = crate::config::CanvasConfig { width: 8, height: 8 };
        Engine::new(config)
    }

    #[test]
    fn conventional_players_exist_on_construction() {
        let engine = engine();
        let ids = engine.player_ids();
        assert!(ids.contains(&"video".to_string()));
        assert!(ids.contains(&"artnet".to_string()));
    }

    #[test]
    fn unknown_player_id_is_a_typed_not_found_error() {
        let engine = engine();
        assert!(matches!(engine.play("nope"), Err(EngineError::PlayerNotFound { .. })));
    }

    #[test]
    fn out_of_range_brightness_is_rejected_before_reaching_the_player() {
        let engine = engine();
        assert!(matches!(
            engine.set_brightness("video", 150),
            Err(EngineError::ParameterValidation { .. })
        ));
    }

    #[test]
    fn snapshot_restore_round_trips_loaded_clip_and_state() {
        let engine = engine();
        let clip_id = engine.register_clip(FrameSourceSpec::Null, None);
        engine.load_clip("video", clip_id).unwrap();
        engine.set_brightness("video", 42).unwrap();
        engine.play("video").unwrap();

        let snapshot = engine.snapshot();
        let restored = engine();
        restored.restore(snapshot).unwrap();

        assert_eq!(restored.current_clip("video").unwrap(), Some(clip_id));
        assert_eq!(restored.status("video").unwrap(), PlayerState::Playing);
    }
}
