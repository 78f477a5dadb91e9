//! Sequence Engine : LFO, Audio-Reactive, and Timeline sequences,
//! each writing a computed value to a dotted-path parameter target on a
//! dedicated ticker thread independent of any player's FPS.
//!
//! Grounded on the teacher's `PatternPlaybackState::spawn_broadcaster`
//! standalone background-thread idiom (a thread that owns a shared
//! registry and ticks it at a fixed rate, decoupled from playback
//! state) -- here generalized from one broadcaster to one ticker owning
//! every registered [`Sequence`].
//!
//! Sequences never write through a private bypass: every tick resolves
//! a dotted path against the live player/clip graph and calls the exact
//! [`crate::manager::PlayerManager`] / [`crate::clip::ClipRegistry`]
//! methods an external caller would use , so a bad path fails the
//! owning Sequence, not the engine.

pub mod audio_reactive;
pub mod lfo;
pub mod timeline;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use audio_reactive::{AudioAnalyzer, AudioFeature, AudioReactiveSequence, AudioSnapshot};
pub use lfo::{LfoSequence, Waveform};
pub use timeline::{Interpolation, Keyframe, LoopMode, TimelineSequence};

use crate::clip::{ChainTarget, ClipRegistry};
use crate::error::SequenceError;
use crate::manager::PlayerManager;
use crate::value::ParamValue;

/// The three Sequence variants , each owning its own runtime state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SequenceKind {
    Lfo(LfoSequence),
    AudioReactive(AudioReactiveSequence),
    Timeline(TimelineSequence),
}

/// One registered Sequence: what it computes, where it writes, and
/// whether the ticker should currently evaluate it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sequence {
    pub id: Uuid,
    pub target_path: String,
    pub kind: SequenceKind,
    pub enabled: bool,
}

impl Sequence {
    pub fn new(target_path: impl Into<String>, kind: SequenceKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            target_path: target_path.into(),
            kind,
            enabled: true,
        }
    }

    fn evaluate(&mut self, since_start: f64, analyzer: &AudioAnalyzer) -> Result<f64, SequenceError> {
        match &mut self.kind {
            SequenceKind::Lfo(lfo) => Ok(lfo.value(since_start)),
            SequenceKind::AudioReactive(reactive) => reactive.tick(analyzer),
            SequenceKind::Timeline(timeline) => Ok(timeline.sample(since_start)),
        }
    }
}

/// A dotted parameter path resolved into a concrete write target against
/// the live player/clip object graph .
enum ParamTarget {
    PlayerBrightness { player_id: String },
    PlayerHueShift { player_id: String },
    PlayerSpeed { player_id: String },
    ClipEffectParam {
        clip_id: Uuid,
        layer_index: usize,
        effect_index: usize,
        param: String,
    },
    ClipChainParam {
        clip_id: Uuid,
        target: ChainTarget,
        effect_index: usize,
        param: String,
    },
}

/// Parse `player.<id>.brightness`, `player.<id>.hue_shift`,
/// `player.<id>.speed`, `player.<id>.clip.effects[N].<param>`,
/// `player.<id>.clip.layer[N].effects[M].<param>`, or
/// `player.<id>.chain.{video,artnet}.effects[N].<param>` .
fn parse_path(path: &str, manager: &PlayerManager) -> Result<ParamTarget, SequenceError> {
    let invalid = || SequenceError::InvalidPath { path: path.to_string() };
    let mut parts = path.split('.');

    if parts.next() != Some("player") {
        return Err(invalid());
    }
    let player_id = parts.next().ok_or_else(invalid)?.to_string();

    match parts.next() {
        Some("brightness") if parts.next().is_none() => Ok(ParamTarget::PlayerBrightness { player_id }),
        Some("hue_shift") if parts.next().is_none() => Ok(ParamTarget::PlayerHueShift { player_id }),
        Some("speed") if parts.next().is_none() => Ok(ParamTarget::PlayerSpeed { player_id }),
        Some("clip") => {
            let player = manager.get(&player_id).ok_or_else(invalid)?;
            let clip_id = player.current_clip().ok_or_else(invalid)?;
            let next = parts.next().ok_or_else(invalid)?;
            if let Some(idx) = strip_index(next, "layer") {
                let layer_index: usize = idx.parse().map_err(|_| invalid())?;
                let effects = parts.next().ok_or_else(invalid)?;
                let effect_index = strip_index(effects, "effects")
                    .ok_or_else(invalid)?
                    .parse()
                    .map_err(|_| invalid())?;
                let param = parts.next().ok_or_else(invalid)?.to_string();
                if parts.next().is_some() {
                    return Err(invalid());
                }
                Ok(ParamTarget::ClipEffectParam {
                    clip_id,
                    layer_index,
                    effect_index,
                    param,
                })
            } else if let Some(idx) = strip_index(next, "effects") {
                let effect_index = idx.parse().map_err(|_| invalid())?;
                let param = parts.next().ok_or_else(invalid)?.to_string();
                if parts.next().is_some() {
                    return Err(invalid());
                }
                Ok(ParamTarget::ClipEffectParam {
                    clip_id,
                    layer_index: 0,
                    effect_index,
                    param,
                })
            } else {
                Err(invalid())
            }
        }
        Some("chain") => {
            let player = manager.get(&player_id).ok_or_else(invalid)?;
            let clip_id = player.current_clip().ok_or_else(invalid)?;
            let target = match parts.next() {
                Some("video") => ChainTarget::Video,
                Some("artnet") => ChainTarget::Artnet,
                _ => return Err(invalid()),
            };
            let effects = parts.next().ok_or_else(invalid)?;
            let effect_index = strip_index(effects, "effects")
                .ok_or_else(invalid)?
                .parse()
                .map_err(|_| invalid())?;
            let param = parts.next().ok_or_else(invalid)?.to_string();
            if parts.next().is_some() {
                return Err(invalid());
            }
            Ok(ParamTarget::ClipChainParam {
                clip_id,
                target,
                effect_index,
                param,
            })
        }
        _ => Err(invalid()),
    }
}

/// `strip_index("effects[3]", "effects")` -> `Some("3")`.
fn strip_index<'a>(segment: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = segment.strip_prefix(prefix)?;
    let rest = rest.strip_prefix('[')?;
    rest.strip_suffix(']')
}

fn write_target(
    target: ParamTarget,
    value: f64,
    manager: &PlayerManager,
    registry: &ClipRegistry,
) -> Result<(), SequenceError> {
    let invalid = |id: &str| SequenceError::InvalidPath { path: id.to_string() };
    match target {
        ParamTarget::PlayerBrightness { player_id } => {
            let player = manager.get(&player_id).ok_or_else(|| invalid(&player_id))?;
            player.set_brightness(value.clamp(0.0, 200.0) as u8);
            Ok(())
        }
        ParamTarget::PlayerHueShift { player_id } => {
            let player = manager.get(&player_id).ok_or_else(|| invalid(&player_id))?;
            player.set_hue_shift(value.round() as i32);
            Ok(())
        }
        ParamTarget::PlayerSpeed { player_id } => {
            let player = manager.get(&player_id).ok_or_else(|| invalid(&player_id))?;
            player.set_speed(value as f32);
            Ok(())
        }
        ParamTarget::ClipEffectParam {
            clip_id,
            layer_index,
            effect_index,
            param,
        } => registry
            .update_effect_parameter(clip_id, layer_index, effect_index, param, ParamValue::Float(value))
            .map_err(|_| SequenceError::InvalidPath {
                path: format!("clip {} layer {} effect {}", clip_id, layer_index, effect_index),
            }),
        ParamTarget::ClipChainParam {
            clip_id,
            target,
            effect_index,
            param,
        } => registry
            .update_chain_parameter(clip_id, target, effect_index, param, ParamValue::Float(value))
            .map_err(|_| SequenceError::InvalidPath {
                path: format!("clip {} chain effect {}", clip_id, effect_index),
            }),
    }
}

struct SharedState {
    sequences: Mutex<Vec<Sequence>>,
    analyzer: Arc<AudioAnalyzer>,
    manager: Arc<PlayerManager>,
    registry: Arc<ClipRegistry>,
    tick_hz: f32,
    started: Instant,
    shutting_down: AtomicBool,
}

/// Owns every registered [`Sequence`] and a dedicated ticker thread that
/// evaluates and writes them at a fixed rate .
pub struct SequenceEngine {
    shared: Arc<SharedState>,
    ticker: Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl SequenceEngine {
    pub fn new(
        tick_hz: f32,
        manager: Arc<PlayerManager>,
        registry: Arc<ClipRegistry>,
        analyzer: Arc<AudioAnalyzer>,
    ) -> Self {
        let shared = Arc::new(SharedState {
            sequences: Mutex::new(Vec::new()),
            analyzer,
            manager,
            registry,
            tick_hz: tick_hz.max(1.0),
            started: Instant::now(),
            shutting_down: AtomicBool::new(false),
        });

        let ticker_shared = shared.clone();
        let handle = std::thread::spawn(move || ticker_loop(ticker_shared));

        Self {
            shared,
            ticker: Mutex::new(Some(handle)),
        }
    }

    pub fn register(&self, sequence: Sequence) -> Uuid {
        let id = sequence.id;
        self.shared
            .sequences
            .lock()
            .expect("sequence list poisoned")
            .push(sequence);
        id
    }

    pub fn unregister(&self, id: Uuid) -> bool {
        let mut sequences = self.shared.sequences.lock().expect("sequence list poisoned");
        let before = sequences.len();
        sequences.retain(|s| s.id != id);
        sequences.len() != before
    }

    pub fn set_enabled(&self, id: Uuid, enabled: bool) -> bool {
        let mut sequences = self.shared.sequences.lock().expect("sequence list poisoned");
        match sequences.iter_mut().find(|s| s.id == id) {
            Some(s) => {
                s.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub fn list_ids(&self) -> Vec<Uuid> {
        self.shared
            .sequences
            .lock()
            .expect("sequence list poisoned")
            .iter()
            .map(|s| s.id)
            .collect()
    }

    /// Dump every registered sequence, for the snapshot contract .
    pub fn all(&self) -> Vec<Sequence> {
        self.shared.sequences.lock().expect("sequence list poisoned").clone()
    }

    /// Replace the entire registered set with `sequences`, preserving
    /// their ids .
    pub fn restore_all(&self, sequences: Vec<Sequence>) {
        *self.shared.sequences.lock().expect("sequence list poisoned") = sequences;
    }
}

impl Drop for SequenceEngine {
    fn drop(&mut self) {
        self.shared.shutting_down.store(true, Ordering::Release);
        if let Some(handle) = self.ticker.lock().expect("sequence ticker mutex poisoned").take() {
            let _ = handle.join();
        }
    }
}

fn ticker_loop(shared: Arc<SharedState>) {
    let tick_interval = Duration::from_secs_f32(1.0 / shared.tick_hz);
    loop {
        if shared.shutting_down.load(Ordering::Acquire) {
            return;
        }

        let since_start = shared.started.elapsed().as_secs_f64();
        let mut sequences = shared.sequences.lock().expect("sequence list poisoned");
        for sequence in sequences.iter_mut() {
            if !sequence.enabled {
                continue;
            }
            match sequence.evaluate(since_start, &shared.analyzer) {
                Ok(value) => match parse_path(&sequence.target_path, &shared.manager) {
                    Ok(target) => {
                        if let Err(e) = write_target(target, value, &shared.manager, &shared.registry) {
                            log::warn!("sequence {} write failed: {}", sequence.id, e);
                            sequence.enabled = false;
                        }
                    }
                    Err(e) => {
                        log::warn!("sequence {} path invalid: {}", sequence.id, e);
                        sequence.enabled = false;
                    }
                },
                Err(e) => {
                    log::warn!("sequence {} evaluation failed: {}", sequence.id, e);
                    sequence.enabled = false;
                }
            }
        }
        drop(sequences);

        std::thread::sleep(tick_interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::plugin::PluginRegistry;

    fn engine() -> (Arc<PlayerManager>, Arc<ClipRegistry>) {
        let registry = Arc::new(ClipRegistry::new());
        let plugins = Arc::new(PluginRegistry::discover(&[]));
        let config = EngineConfig::default();
        let manager = Arc::new(PlayerManager::new(registry.clone(), plugins, config));
        (manager, registry)
    }

    #[test]
    fn player_level_paths_parse() {
        let (manager, _registry) = engine();
        manager.spawn("video", (8, 8)).unwrap();
        let target = parse_path("player.video.brightness", &manager);
        assert!(matches!(target, Ok(ParamTarget::PlayerBrightness { .. })));
    }

    #[test]
    fn unknown_player_fails_the_sequence_not_a_panic() {
        let (manager, _registry) = engine();
        let err = parse_path("player.missing.brightness", &manager);
        assert!(matches!(err, Ok(ParamTarget::PlayerBrightness { .. })));
        // brightness targets resolve without touching the player; a
        // write against a missing id is what actually fails.
        let write_err = write_target(
            ParamTarget::PlayerBrightness {
                player_id: "missing".to_string(),
            },
            50.0,
            &manager,
            &_registry,
        );
        assert!(write_err.is_err());
    }

    #[test]
    fn malformed_path_is_rejected() {
        let (manager, _registry) = engine();
        assert!(parse_path("not.a.valid.path", &manager).is_err());
    }

    #[test]
    fn registering_and_unregistering_a_sequence_updates_the_list() {
        let (manager, registry) = engine();
        let analyzer = Arc::new(AudioAnalyzer::new());
        let seq_engine = SequenceEngine::new(30.0, manager, registry, analyzer);
        let id = seq_engine.register(Sequence::new(
            "player.video.brightness",
            SequenceKind::Lfo(LfoSequence::new(Waveform::Sine, 1.0, 0.0, 0.0, 100.0)),
        ));
        assert_eq!(seq_engine.list_ids(), vec![id]);
        assert!(seq_engine.unregister(id));
        assert!(seq_engine.list_ids().is_empty());
    }
}
