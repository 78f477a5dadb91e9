//! Player Core: the play loop, the `{Stopped, Playing, Paused}` state
//! machine, and the per-player effect-chain cache .
//!
//! Grounded on the teacher's `playback.rs` `PlaybackInner` (`Arc<Mutex<_>>`
//! inner state behind a thin handle, `mpsc` stop signal, background
//! thread, `Instant`-based timing) generalized from a single audio track
//! to the full fetch/composite/effect/sample/emit/preview pipeline.

pub mod clock;
pub mod transition;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::artnet::{ArtNetSender, ArtNetTargetConfig, ChannelOrder, DeltaConfig as ArtNetDeltaConfig, UniverseConfig};
use crate::clip::{ChainTarget, Clip, ClipRegistry, EffectEntry, LayerSpec};
use crate::compositor;
use crate::config::EngineConfig;
use crate::effect_chain::EffectChainRunner;
use crate::error::{ArtNetError, EngineError, FrameSourceError};
use crate::events::{ErrorEvent, ErrorEventQueue};
use crate::frame::Frame;
use crate::frame_source::{self, FrameSource};
use crate::plugin::PluginRegistry;
use crate::preview::PreviewStreamer;
use crate::sample::SamplePointSet;

pub use clock::FrameClock;
pub use transition::{Easing, TransitionConfig, TransitionRuntime};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerState {
    Stopped,
    Playing,
    Paused,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaylistItem {
    pub clip_id: Uuid,
    /// Per-item transition override; falls back to the player's default
    /// `transition` config when `None` .
    pub transition: Option<TransitionConfig>,
}

/// Caches one post-composite chain's instantiated plugins, keyed by the
/// clip id + version they were built against .
struct ChainCache {
    clip_id: Option<Uuid>,
    version: u64,
    runner: EffectChainRunner,
}

impl ChainCache {
    fn new() -> Self {
        Self {
            clip_id: None,
            version: 0,
            runner: EffectChainRunner::new(),
        }
    }

    fn is_fresh(&self, clip_id: Uuid, version: u64) -> bool {
        self.clip_id == Some(clip_id) && self.version == version
    }

    fn mark_fresh(&mut self, clip_id: Uuid, version: u64) {
        self.clip_id = Some(clip_id);
        self.version = version;
    }
}

/// One loaded layer's live state: its persistent `FrameSource` plus a
/// persistent per-layer `EffectChainRunner` so plugin instances survive
/// across ticks . Rebuilt only when the layer's source descriptor
/// changes, not on every parameter edit.
struct LayerRuntime {
    source: Box<dyn FrameSource>,
    source_spec: crate::frame_source::FrameSourceSpec,
    runner: EffectChainRunner,
}

/// Snapshot of mutable player configuration, guarded by one mutex. Kept
/// separate from the hot-path atomics (state flags, frame counter) so a
/// control call never contends with the play loop's per-tick reads of
/// those atomics.
struct PlayerConfig {
    clip_id: Option<Uuid>,
    layers: Vec<LayerRuntime>,
    fps: f32,
    speed: f32,
    brightness: f32,
    hue_shift: i32,
    playlist: Vec<PlaylistItem>,
    playlist_index: usize,
    autoplay: bool,
    loop_count: Option<u32>,
    loops_done: u32,
    transition_default: Option<TransitionConfig>,
    active_transition: Option<TransitionRuntime>,
    sample_points: Option<SamplePointSet>,
    artnet_universes: HashMap<u16, UniverseConfig>,
    artnet_target: ArtNetTargetConfig,
    artnet_delta: ArtNetDeltaConfig,
}

impl PlayerConfig {
    fn new(fps: f32) -> Self {
        Self {
            clip_id: None,
            layers: Vec::new(),
            fps,
            speed: 1.0,
            brightness: 1.0,
            hue_shift: 0,
            playlist: Vec::new(),
            playlist_index: 0,
            autoplay: true,
            loop_count: None,
            loops_done: 0,
            transition_default: None,
            active_transition: None,
            sample_points: None,
            artnet_universes: HashMap::new(),
            artnet_target: ArtNetTargetConfig::default(),
            artnet_delta: ArtNetDeltaConfig::default(),
        }
    }
}

/// The shared state behind a [`Player`] handle; cloned into the play
/// loop thread as an `Arc`.
struct Shared {
    id: String,
    canvas: (u32, u32),
    registry: Arc<ClipRegistry>,
    plugins: Arc<PluginRegistry>,
    preview: Arc<PreviewStreamer>,
    config: Mutex<PlayerConfig>,
    state: Mutex<PlayerState>,
    is_stopped: AtomicBool,
    is_paused: AtomicBool,
    wake_mutex: Mutex<()>,
    wake_cv: Condvar,
    frame_counter: AtomicU64,
    video_chain_cache: Mutex<ChainCache>,
    artnet_chain_cache: Mutex<ChainCache>,
    artnet_sender: Mutex<Option<Arc<ArtNetSender>>>,
    default_fps: f32,
    null_fill: (u8, u8, u8),
    events: Arc<ErrorEventQueue>,
}

impl Shared {
    fn report(&self, frame_number: u64, clip_id: Option<Uuid>, kind: &str, message: impl Into<String>) {
        self.events.push(ErrorEvent {
            player_id: self.id.clone(),
            frame_number,
            clip_id,
            kind: kind.to_string(),
            message: message.into(),
        });
    }

    fn notify(&self) {
        let _guard = self.wake_mutex.lock().expect("player wake mutex poisoned");
        self.wake_cv.notify_all();
    }

    fn set_state(&self, state: PlayerState) {
        *self.state.lock().expect("player state mutex poisoned") = state;
    }
}

/// A single player: identity, canvas, current clip/layers, FPS,
/// brightness/hue, the two post-composite chains, playlist, transition
/// config, a lazily-created Art-Net sender, run flags, and the
/// effect-chain cache .
pub struct Player {
    shared: Arc<Shared>,
    thread: Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl Player {
    pub fn new(
        id: impl Into<String>,
        canvas: (u32, u32),
        registry: Arc<ClipRegistry>,
        plugins: Arc<PluginRegistry>,
        config: &EngineConfig,
        events: Arc<ErrorEventQueue>,
    ) -> Self {
        let mut player_config = PlayerConfig::new(config.frame_source.default_fps);
        player_config.artnet_target = ArtNetTargetConfig {
            target_ip: config.artnet.target_ip.clone(),
            broadcast: config.artnet.broadcast,
            physical: 0,
        };
        player_config.artnet_delta = ArtNetDeltaConfig {
            enabled: config.delta.enabled,
            threshold: config.delta.threshold,
            full_frame_interval: config.delta.full_frame_interval,
        };
        player_config.artnet_universes.insert(
            config.artnet.start_universe,
            UniverseConfig {
                net: config.artnet.net,
                sub_universe: config.artnet.subnet,
                channel_order: ChannelOrder::default(),
            },
        );

        let shared = Arc::new(Shared {
            id: id.into(),
            canvas,
            registry,
            plugins,
            preview: PreviewStreamer::new(config.preview.clone()),
            config: Mutex::new(player_config),
            state: Mutex::new(PlayerState::Stopped),
            is_stopped: AtomicBool::new(true),
            is_paused: AtomicBool::new(false),
            wake_mutex: Mutex::new(()),
            wake_cv: Condvar::new(),
            frame_counter: AtomicU64::new(0),
            video_chain_cache: Mutex::new(ChainCache::new()),
            artnet_chain_cache: Mutex::new(ChainCache::new()),
            artnet_sender: Mutex::new(None),
            default_fps: config.frame_source.default_fps,
            null_fill: config.frame_source.null_fill_color,
            events,
        });
        Self {
            shared,
            thread: Mutex::new(None),
        }
    }

    pub fn id(&self) -> &str {
        &self.shared.id
    }

    pub fn state(&self) -> PlayerState {
        *self.shared.state.lock().expect("player state mutex poisoned")
    }

    pub fn current_frame(&self) -> u64 {
        self.shared.frame_counter.load(Ordering::Acquire)
    }

    pub fn preview(&self) -> &Arc<PreviewStreamer> {
        &self.shared.preview
    }

    pub fn canvas(&self) -> (u32, u32) {
        self.shared.canvas
    }

    // -- transport  --------------------------------------------------

    pub fn play(&self) -> Result<(), EngineError> {
        match self.state() {
            PlayerState::Playing => Ok(()),
            PlayerState::Paused => self.resume(),
            PlayerState::Stopped => {
                self.shared.is_stopped.store(false, Ordering::Release);
                self.shared.is_paused.store(false, Ordering::Release);
                let shared = self.shared.clone();
                let handle = std::thread::spawn(move || run_loop(shared));
                *self.thread.lock().expect("player thread mutex poisoned") = Some(handle);
                self.shared.set_state(PlayerState::Playing);
                log::info!("player '{}' started", self.shared.id);
                Ok(())
            }
        }
    }

    pub fn pause(&self) -> Result<(), EngineError> {
        if self.state() == PlayerState::Playing {
            self.shared.is_paused.store(true, Ordering::Release);
            self.shared.set_state(PlayerState::Paused);
            log::info!("player '{}' paused", self.shared.id);
        }
        Ok(())
    }

    pub fn resume(&self) -> Result<(), EngineError> {
        if self.state() == PlayerState::Paused {
            self.shared.is_paused.store(false, Ordering::Release);
            self.shared.set_state(PlayerState::Playing);
            self.shared.notify();
            log::info!("player '{}' resumed", self.shared.id);
        }
        Ok(())
    }

    pub fn stop(&self) -> Result<(), EngineError> {
        if self.state() == PlayerState::Stopped {
            return Ok(());
        }
        self.shared.is_stopped.store(true, Ordering::Release);
        self.shared.is_paused.store(false, Ordering::Release);
        self.shared.notify();
        if let Some(handle) = self.thread.lock().expect("player thread mutex poisoned").take() {
            let _ = handle.join();
        }
        self.shared.set_state(PlayerState::Stopped);
        log::info!("player '{}' stopped", self.shared.id);
        Ok(())
    }

    pub fn restart(&self) -> Result<(), EngineError> {
        self.stop()?;
        self.shared.frame_counter.store(0, Ordering::Release);
        {
            let mut config = self.shared.config.lock().expect("player config mutex poisoned");
            if let Some(clip_id) = config.clip_id {
                if let Ok(clip) = self.shared.registry.get(clip_id) {
                    let in_point = clip.transport.in_point;
                    for layer in config.layers.iter_mut() {
                        let _ = layer.source.seek(in_point);
                    }
                }
            }
        }
        self.play()
    }

    // -- global params  ----------------------------------------------

    pub fn set_brightness(&self, percent: u8) {
        let mut config = self.shared.config.lock().expect("player config mutex poisoned");
        config.brightness = (percent.min(100) as f32) / 100.0;
    }

    pub fn set_hue_shift(&self, degrees: i32) {
        let mut config = self.shared.config.lock().expect("player config mutex poisoned");
        config.hue_shift = degrees.clamp(-180, 180);
    }

    pub fn set_speed(&self, speed: f32) {
        let mut config = self.shared.config.lock().expect("player config mutex poisoned");
        config.speed = speed.clamp(0.1, 3.0);
    }

    pub fn set_fps(&self, fps: u32) {
        let mut config = self.shared.config.lock().expect("player config mutex poisoned");
        config.fps = (fps as f32).max(0.1);
    }

    pub fn set_loop(&self, count: Option<u32>) {
        let mut config = self.shared.config.lock().expect("player config mutex poisoned");
        config.loop_count = count;
        config.loops_done = 0;
    }

    pub fn set_autoplay(&self, autoplay: bool) {
        self.shared.config.lock().expect("player config mutex poisoned").autoplay = autoplay;
    }

    pub fn set_transition(&self, transition: Option<TransitionConfig>) {
        self.shared.config.lock().expect("player config mutex poisoned").transition_default = transition;
    }

    // -- content  ------------------------------------------------------

    /// Load a clip as the current clip, tearing down any previously
    /// loaded layer sources and building fresh ones from the clip's
    /// layer specs .
    pub fn load_clip(&self, clip_id: Uuid) -> Result<(), EngineError> {
        let clip = self.shared.registry.get(clip_id)?;
        let mut config = self.shared.config.lock().expect("player config mutex poisoned");
        cleanup_layers(&mut config.layers);
        config.layers = build_layer_runtimes(&clip, self.shared.canvas, &self.shared.plugins, self.shared.default_fps)?;
        config.clip_id = Some(clip_id);
        config.active_transition = None;
        drop(config);
        self.shared.frame_counter.store(0, Ordering::Release);
        log::info!("player '{}' loaded clip {}", self.shared.id, clip_id);
        Ok(())
    }

    pub fn current_clip(&self) -> Option<Uuid> {
        self.shared.config.lock().expect("player config mutex poisoned").clip_id
    }

    pub fn set_playlist(&self, items: Vec<PlaylistItem>) {
        let mut config = self.shared.config.lock().expect("player config mutex poisoned");
        config.playlist = items;
        config.playlist_index = 0;
    }

    pub fn seek(&self, target_frame: u64) -> Result<(), EngineError> {
        let mut config = self.shared.config.lock().expect("player config mutex poisoned");
        for layer in config.layers.iter_mut() {
            layer
                .source
                .seek(target_frame)
                .map_err(|e| EngineError::Internal { reason: e.to_string() })?;
        }
        self.shared.frame_counter.store(target_frame, Ordering::Release);
        Ok(())
    }

    // -- sampling / art-net configuration  ------------------------------

    pub fn set_sample_points(&self, points: SamplePointSet) {
        self.shared.config.lock().expect("player config mutex poisoned").sample_points = Some(points);
    }

    fn ensure_artnet_sender(&self) -> Result<Arc<ArtNetSender>, ArtNetError> {
        self.shared.ensure_sender_locked()
    }

    pub fn set_target_ip(&self, ip: String) {
        let mut config = self.shared.config.lock().expect("player config mutex poisoned");
        config.artnet_target.target_ip = ip;
        if let Some(sender) = self.shared.artnet_sender.lock().expect("artnet sender mutex poisoned").as_ref() {
            sender.set_target(config.artnet_target.clone());
        }
    }

    pub fn set_channel_order(&self, universe: u16, order: ChannelOrder) {
        let mut config = self.shared.config.lock().expect("player config mutex poisoned");
        let entry = config.artnet_universes.entry(universe).or_insert(UniverseConfig {
            net: 0,
            sub_universe: universe as u8,
            channel_order: order,
        });
        entry.channel_order = order;
        let universe_config = entry.clone();
        if let Some(sender) = self.shared.artnet_sender.lock().expect("artnet sender mutex poisoned").as_ref() {
            sender.set_universe_config(universe, universe_config);
        }
    }

    pub fn set_delta(&self, enabled: bool, threshold: u8, full_interval: u32) {
        let mut config = self.shared.config.lock().expect("player config mutex poisoned");
        config.artnet_delta = ArtNetDeltaConfig {
            enabled,
            threshold,
            full_frame_interval: full_interval,
        };
        if let Some(sender) = self.shared.artnet_sender.lock().expect("artnet sender mutex poisoned").as_ref() {
            sender.set_delta(config.artnet_delta.clone());
        }
    }

    /// Re-key the player's single default universe entry (the one
    /// `Player::new` seeds from `EngineConfig::artnet.start_universe`) to
    /// a new universe number, or seed a fresh default entry under it if
    /// the caller has already configured more than one universe.
    pub fn set_start_universe(&self, universe: u16) {
        let mut config = self.shared.config.lock().expect("player config mutex poisoned");
        let keys: Vec<u16> = config.artnet_universes.keys().copied().collect();
        if let [only] = keys[..] {
            if let Some(cfg) = config.artnet_universes.remove(&only) {
                config.artnet_universes.insert(universe, cfg);
            }
        } else {
            config.artnet_universes.entry(universe).or_insert(UniverseConfig {
                net: 0,
                sub_universe: universe as u8,
                channel_order: ChannelOrder::default(),
            });
        }
        if let Some(sender) = self.shared.artnet_sender.lock().expect("artnet sender mutex poisoned").as_ref() {
            for (&u, cfg) in config.artnet_universes.iter() {
                sender.set_universe_config(u, cfg.clone());
            }
        }
    }

    pub fn blackout(&self) -> Result<(), EngineError> {
        let sender = self.ensure_artnet_sender()?;
        sender.blackout().map_err(EngineError::from)
    }

    /// Send one solid-color frame to every configured universe, bypassing
    /// the play loop entirely -- a rigging/commissioning aid (§6 art-net
    /// `test_pattern(color)`).
    pub fn test_pattern(&self, color: (u8, u8, u8)) -> Result<(), EngineError> {
        let sender = self.ensure_artnet_sender()?;
        let config = self.shared.config.lock().expect("player config mutex poisoned");
        let frame = Frame::filled(self.shared.canvas.0, self.shared.canvas.1, color);
        let universes = match config.sample_points.as_ref() {
            Some(points) => points.extract(&frame),
            None => return Ok(()),
        };
        drop(config);
        sender.send_frame(&universes).map_err(EngineError::from)
    }

    pub fn stats(&self) -> PlayerStats {
        let sender = self.shared.artnet_sender.lock().expect("artnet sender mutex poisoned");
        PlayerStats {
            current_frame: self.current_frame(),
            state: self.state(),
            preview_subscribers: self.shared.preview.subscriber_count(),
            artnet_packets_sent: sender.as_ref().map(|s| s.sent_packets()).unwrap_or(0),
            artnet_packets_dropped: sender.as_ref().map(|s| s.dropped_packets()).unwrap_or(0),
        }
    }
}

/// Everything about a player's configuration and playback position that
/// a snapshot document round-trips . Loaded layer
/// runtimes are not part of this -- they are rebuilt from the clip
/// registry's own (separately dumped) state on `restore`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub id: String,
    pub clip_id: Option<Uuid>,
    pub playlist: Vec<PlaylistItem>,
    pub playlist_index: usize,
    pub state: PlayerState,
    pub current_frame: u64,
    pub fps: f32,
    pub speed: f32,
    pub brightness: f32,
    pub hue_shift: i32,
    pub autoplay: bool,
    pub loop_count: Option<u32>,
    pub loops_done: u32,
    pub transition_default: Option<TransitionConfig>,
    pub artnet_target: ArtNetTargetConfig,
    pub artnet_delta: ArtNetDeltaConfig,
    pub artnet_universes: HashMap<u16, UniverseConfig>,
}

impl Player {
    /// Capture everything §6 lists as persisted player state.
    pub fn snapshot(&self) -> PlayerSnapshot {
        let config = self.shared.config.lock().expect("player config mutex poisoned");
        PlayerSnapshot {
            id: self.shared.id.clone(),
            clip_id: config.clip_id,
            playlist: config.playlist.clone(),
            playlist_index: config.playlist_index,
            state: self.state(),
            current_frame: self.current_frame(),
            fps: config.fps,
            speed: config.speed,
            brightness: config.brightness,
            hue_shift: config.hue_shift,
            autoplay: config.autoplay,
            loop_count: config.loop_count,
            loops_done: config.loops_done,
            transition_default: config.transition_default.clone(),
            artnet_target: config.artnet_target.clone(),
            artnet_delta: config.artnet_delta.clone(),
            artnet_universes: config.artnet_universes.clone(),
        }
    }

    /// Reconstruct configuration and playback position from a snapshot
    /// (§6 "restore(snapshot(engine)) ≡ engine"). The player is stopped
    /// first so loading the snapshot's clip does not race the play loop.
    pub fn restore(&self, snapshot: &PlayerSnapshot) -> Result<(), EngineError> {
        self.stop()?;

        if let Some(clip_id) = snapshot.clip_id {
            self.load_clip(clip_id)?;
        }

        {
            let mut config = self.shared.config.lock().expect("player config mutex poisoned");
            config.playlist = snapshot.playlist.clone();
            config.playlist_index = snapshot.playlist_index;
            config.fps = snapshot.fps;
            config.speed = snapshot.speed;
            config.brightness = snapshot.brightness;
            config.hue_shift = snapshot.hue_shift;
            config.autoplay = snapshot.autoplay;
            config.loop_count = snapshot.loop_count;
            config.loops_done = snapshot.loops_done;
            config.transition_default = snapshot.transition_default.clone();
            config.artnet_target = snapshot.artnet_target.clone();
            config.artnet_delta = snapshot.artnet_delta.clone();
            config.artnet_universes = snapshot.artnet_universes.clone();
        }
        self.shared.frame_counter.store(snapshot.current_frame, Ordering::Release);

        if let Some(sender) = self.shared.artnet_sender.lock().expect("artnet sender mutex poisoned").as_ref() {
            sender.set_target(snapshot.artnet_target.clone());
            sender.set_delta(snapshot.artnet_delta.clone());
            for (&universe, cfg) in &snapshot.artnet_universes {
                sender.set_universe_config(universe, cfg.clone());
            }
        }

        match snapshot.state {
            PlayerState::Playing => self.play()?,
            PlayerState::Paused => {
                self.play()?;
                self.pause()?;
            }
            PlayerState::Stopped => {}
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerStats {
    pub current_frame: u64,
    pub state: PlayerState,
    pub preview_subscribers: usize,
    pub artnet_packets_sent: u64,
    pub artnet_packets_dropped: u64,
}

impl Drop for Player {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

fn cleanup_layers(layers: &mut [LayerRuntime]) {
    for layer in layers.iter_mut() {
        layer.source.cleanup();
    }
}

fn build_layer_runtimes(
    clip: &Clip,
    canvas: (u32, u32),
    plugins: &PluginRegistry,
    default_fps: f32,
) -> Result<Vec<LayerRuntime>, EngineError> {
    let mut runtimes = Vec::with_capacity(clip.layers.len());
    for spec in &clip.layers {
        let mut source = frame_source::build(&spec.source, canvas, plugins, default_fps)?;
        source.initialize().map_err(|e| EngineError::Internal { reason: e.to_string() })?;
        runtimes.push(LayerRuntime {
            source,
            source_spec: spec.source.clone(),
            runner: EffectChainRunner::new(),
        });
    }
    Ok(runtimes)
}

/// §4.4: the full per-frame play loop, run on its own thread for the
/// life of one `play()`/`stop()` cycle.
fn run_loop(shared: Arc<Shared>) {
    let mut clock = FrameClock::new(current_fps(&shared));

    loop {
        if shared.is_stopped.load(Ordering::Acquire) {
            return;
        }

        if shared.is_paused.load(Ordering::Acquire) {
            let guard = shared.wake_mutex.lock().expect("player wake mutex poisoned");
            let _ = shared
                .wake_cv
                .wait_timeout(guard, Duration::from_millis(200))
                .expect("player wake condvar poisoned");
            clock.reset();
            continue;
        }

        let target_fps = current_fps(&shared);
        if (target_fps - clock.fps()).abs() > f32::EPSILON {
            clock.set_fps(target_fps);
        }
        clock.wait_for_next_tick();

        if shared.is_stopped.load(Ordering::Acquire) {
            return;
        }

        if let Err(e) = tick(&shared) {
            log::error!("player '{}' tick failed: {}", shared.id, e);
            shared.report(shared.frame_counter.load(Ordering::Acquire), None, "internal", e.to_string());
            shared.is_stopped.store(true, Ordering::Release);
            shared.set_state(PlayerState::Stopped);
            return;
        }
    }
}

fn current_fps(shared: &Shared) -> f32 {
    let config = shared.config.lock().expect("player config mutex poisoned");
    (config.fps * config.speed).max(0.1)
}

enum BaseFrameOutcome {
    Frame(Frame),
    Stopped,
}

fn tick(shared: &Arc<Shared>) -> Result<(), EngineError> {
    let mut config = shared.config.lock().expect("player config mutex poisoned");

    let Some(clip_id) = config.clip_id else {
        return Ok(());
    };

    let base = match fetch_base_frame(shared, &mut config, clip_id)? {
        BaseFrameOutcome::Frame(f) => f,
        BaseFrameOutcome::Stopped => {
            drop(config);
            shared.is_stopped.store(true, Ordering::Release);
            shared.set_state(PlayerState::Stopped);
            return Ok(());
        }
    };

    let mut composed = base;

    // Overlay layers (1..n), auto-looping at the master's tempo .
    let overlay_specs: Vec<LayerSpec> = shared
        .registry
        .get(clip_id)
        .map(|c| c.layers.get(1..).map(|s| s.to_vec()).unwrap_or_default())
        .unwrap_or_default();

    for (offset, spec) in overlay_specs.iter().enumerate() {
        let index = offset + 1;
        if !spec.enabled {
            continue;
        }
        let Some(runtime) = config.layers.get_mut(index) else {
            continue;
        };
        let mut overlay_frame = match runtime.source.next_frame() {
            Ok((frame, _)) => frame,
            Err(FrameSourceError::Exhausted) => {
                if runtime.source.reset().is_err() {
                    continue;
                }
                match runtime.source.next_frame() {
                    Ok((frame, _)) => frame,
                    Err(_) => continue,
                }
            }
            Err(FrameSourceError::Transient { .. }) => continue,
            Err(FrameSourceError::Fatal { reason }) => {
                log::warn!("overlay layer {} on player '{}' failed fatally: {}", index, shared.id, reason);
                shared.report(
                    shared.frame_counter.load(Ordering::Acquire),
                    Some(clip_id),
                    "source_fatal",
                    format!("overlay layer {} failed fatally: {}", index, reason),
                );
                continue;
            }
            Err(_) => continue,
        };
        runtime.runner.apply(&mut overlay_frame, &spec.effects, &shared.plugins);
        compositor::composite(&mut composed, &overlay_frame, spec.blend_mode, spec.opacity);
    }

    // Brightness + hue shift .
    compositor::apply_brightness(&mut composed, config.brightness);
    compositor::apply_hue_shift(&mut composed, config.hue_shift);

    // Resolve the two post-composite chains against the live version
    // counter .
    let version = shared.registry.get_effects_version(clip_id).unwrap_or(0);
    let video_entries = shared.registry.get_chain(clip_id, ChainTarget::Video).unwrap_or_default();
    let artnet_entries = shared.registry.get_chain(clip_id, ChainTarget::Artnet).unwrap_or_default();
    drop(config);

    let (frame_video, frame_artnet) = produce_target_frames(
        shared,
        composed,
        clip_id,
        version,
        &video_entries,
        &artnet_entries,
    );

    // Sample points -> Art-Net emission .
    let config = shared.config.lock().expect("player config mutex poisoned");
    if let Some(points) = &config.sample_points {
        let universes = points.extract(&frame_artnet);
        drop(config);
        if let Ok(sender) = shared.ensure_sender_locked() {
            if let Err(e) = sender.send_frame(&universes) {
                log::warn!("player '{}' art-net send failed: {}", shared.id, e);
                shared.report(
                    shared.frame_counter.load(Ordering::Acquire),
                    Some(clip_id),
                    "network_transient",
                    e.to_string(),
                );
            }
        }
    } else {
        drop(config);
    }

    // Preview publish .
    let tick = shared.frame_counter.fetch_add(1, Ordering::AcqRel);
    shared.preview.offer_frame(&frame_video, tick);

    Ok(())
}

impl Shared {
    fn ensure_sender_locked(&self) -> Result<Arc<ArtNetSender>, ArtNetError> {
        let mut slot = self.artnet_sender.lock().expect("artnet sender mutex poisoned");
        if let Some(sender) = slot.as_ref() {
            return Ok(sender.clone());
        }
        let config = self.config.lock().expect("player config mutex poisoned");
        let sender = Arc::new(ArtNetSender::bind(config.artnet_target.clone(), config.artnet_delta.clone())?);
        for (&universe, universe_config) in &config.artnet_universes {
            sender.set_universe_config(universe, universe_config.clone());
        }
        *slot = Some(sender.clone());
        Ok(sender)
    }
}

/// Fetch and effect layer 0's base frame, handling exhaustion (playlist
/// advance / stop), transient retry-then-resync, and fatal unload
/// .
fn fetch_base_frame(
    shared: &Arc<Shared>,
    config: &mut PlayerConfig,
    clip_id: Uuid,
) -> Result<BaseFrameOutcome, EngineError> {
    let clip_effects = shared.registry.get(clip_id).ok().map(|c| c.layers.first().map(|l| l.effects.clone()).unwrap_or_default()).unwrap_or_default();

    let Some(base_runtime) = config.layers.first_mut() else {
        return Ok(BaseFrameOutcome::Stopped);
    };

    let mut result = base_runtime.source.next_frame();
    if let Err(FrameSourceError::Transient { reason }) = &result {
        log::warn!("player '{}' base layer transient error, retrying once: {}", shared.id, reason);
        result = base_runtime.source.next_frame();
        if let Err(FrameSourceError::Transient { .. }) = &result {
            let current = shared.frame_counter.load(Ordering::Acquire);
            let _ = base_runtime.source.seek(current);
            result = base_runtime.source.next_frame();
        }
    }

    match result {
        Ok((mut frame, _)) => {
            base_runtime.runner.apply(&mut frame, &clip_effects, &shared.plugins);

            if let Some(active) = handle_transition_progress(shared, config, &frame) {
                return Ok(BaseFrameOutcome::Frame(active));
            }
            Ok(BaseFrameOutcome::Frame(frame))
        }
        Err(FrameSourceError::Exhausted) => advance_playlist_or_stop(shared, config),
        Err(FrameSourceError::Fatal { reason }) => {
            log::error!("player '{}' base source failed fatally: {}", shared.id, reason);
            config.clip_id = None;
            Ok(BaseFrameOutcome::Stopped)
        }
        Err(e) => Err(EngineError::Internal { reason: e.to_string() }),
    }
}

/// If a transition is in progress, blend `incoming` against the
/// captured outgoing buffer and return the blended frame; `None` once
/// the window has elapsed or no transition is active .
fn handle_transition_progress(shared: &Arc<Shared>, config: &mut PlayerConfig, incoming: &Frame) -> Option<Frame> {
    let progress = config.active_transition.as_ref().and_then(|t| t.progress());
    let Some(progress) = progress else {
        config.active_transition = None;
        return None;
    };
    let active = config.active_transition.as_ref()?;
    let plugin_id = active.plugin_id.clone();
    let buffer = active.buffer.clone();
    match shared.plugins.instantiate_transition(&plugin_id) {
        Ok(mut transition) => {
            let params = shared.plugins.validate_params(&plugin_id, &Default::default()).unwrap_or_default();
            Some(transition.blend(&buffer, incoming, progress, &params))
        }
        Err(e) => {
            log::warn!("transition plugin '{}' unavailable: {}", plugin_id, e);
            None
        }
    }
}

/// Playlist exhaustion handling: advance to the successor clip if
/// autoplay is enabled and one exists, optionally arming a transition
/// buffer; otherwise report the player as stopped .
fn advance_playlist_or_stop(shared: &Arc<Shared>, config: &mut PlayerConfig) -> Result<BaseFrameOutcome, EngineError> {
    if !config.autoplay || config.playlist.is_empty() {
        return Ok(BaseFrameOutcome::Stopped);
    }

    let outgoing_last_frame = config
        .layers
        .first_mut()
        .and_then(|l| l.source.next_frame().ok())
        .map(|(f, _)| f);

    let next_index = config.playlist_index + 1;
    let item = if next_index < config.playlist.len() {
        config.playlist_index = next_index;
        config.playlist[next_index].clone()
    } else if config.loop_count.map(|n| config.loops_done + 1 < n).unwrap_or(true) {
        config.loops_done += 1;
        config.playlist_index = 0;
        config.playlist[0].clone()
    } else {
        return Ok(BaseFrameOutcome::Stopped);
    };

    let clip = shared.registry.get(item.clip_id)?;
    cleanup_layers(&mut config.layers);
    config.layers = build_layer_runtimes(&clip, shared.canvas, &shared.plugins, shared.default_fps)?;
    config.clip_id = Some(item.clip_id);

    let transition_config = item.transition.or_else(|| config.transition_default.clone());
    if let (Some(tc), Some(outgoing)) = (transition_config, outgoing_last_frame) {
        if tc.duration_seconds > 0.0 {
            config.active_transition = Some(TransitionRuntime::new(outgoing, item.clip_id, &tc));
        }
    }

    let Some(runtime) = config.layers.first_mut() else {
        return Ok(BaseFrameOutcome::Stopped);
    };
    match runtime.source.next_frame() {
        Ok((frame, _)) => Ok(BaseFrameOutcome::Frame(frame)),
        Err(_) => Ok(BaseFrameOutcome::Stopped),
    }
}

/// §4.4 step 8: zero-copy contract. Both targets alias the same frame
/// when zero or one chain is non-empty; only a genuine fork (both
/// non-empty and different) pays for a clone.
fn produce_target_frames(
    shared: &Arc<Shared>,
    frame: Frame,
    clip_id: Uuid,
    version: u64,
    video_entries: &[EffectEntry],
    artnet_entries: &[EffectEntry],
) -> (Frame, Frame) {
    if video_entries.is_empty() && artnet_entries.is_empty() {
        return (frame.clone(), frame);
    }

    if video_entries.is_empty() {
        let mut artnet_frame = frame;
        run_cached_chain(&shared.artnet_chain_cache, &shared.plugins, &mut artnet_frame, clip_id, version, artnet_entries);
        return (artnet_frame.clone(), artnet_frame);
    }

    if artnet_entries.is_empty() {
        let mut video_frame = frame;
        run_cached_chain(&shared.video_chain_cache, &shared.plugins, &mut video_frame, clip_id, version, video_entries);
        return (video_frame.clone(), video_frame);
    }

    let mut video_frame = frame.clone();
    let mut artnet_frame = frame;
    run_cached_chain(&shared.video_chain_cache, &shared.plugins, &mut video_frame, clip_id, version, video_entries);
    run_cached_chain(&shared.artnet_chain_cache, &shared.plugins, &mut artnet_frame, clip_id, version, artnet_entries);
    (video_frame, artnet_frame)
}

fn run_cached_chain(
    cache: &Mutex<ChainCache>,
    plugins: &PluginRegistry,
    frame: &mut Frame,
    clip_id: Uuid,
    version: u64,
    entries: &[EffectEntry],
) {
    let mut cache = cache.lock().expect("chain cache mutex poisoned");
    if !cache.is_fresh(clip_id, version) {
        cache.mark_fresh(clip_id, version);
    }
    cache.runner.apply(frame, entries, plugins);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::frame_source::FrameSourceSpec;

    fn test_player() -> (Player, Arc<ClipRegistry>) {
        let registry = Arc::new(ClipRegistry::new());
        let plugins = Arc::new(PluginRegistry::discover(&[]));
        let config = EngineConfig::default();
        let events = Arc::new(ErrorEventQueue::new());
        let player = Player::new("test", (4, 4), registry.clone(), plugins, &config, events);
        (player, registry)
    }

    #[test]
    fn fresh_player_starts_stopped() {
        let (player, _registry) = test_player();
        assert_eq!(player.state(), PlayerState::Stopped);
    }

    #[test]
    fn play_pause_resume_stop_transitions() {
        let (player, registry) = test_player();
        let clip_id = registry.register(FrameSourceSpec::Null, None);
        player.load_clip(clip_id).unwrap();

        player.play().unwrap();
        assert_eq!(player.state(), PlayerState::Playing);

        player.pause().unwrap();
        assert_eq!(player.state(), PlayerState::Paused);

        player.resume().unwrap();
        assert_eq!(player.state(), PlayerState::Playing);

        player.stop().unwrap();
        assert_eq!(player.state(), PlayerState::Stopped);
    }

    #[test]
    fn pause_halts_frame_advancement() {
        let (player, registry) = test_player();
        let clip_id = registry.register(FrameSourceSpec::Null, None);
        player.load_clip(clip_id).unwrap();
        player.set_fps(1000);
        player.play().unwrap();
        std::thread::sleep(Duration::from_millis(20));
        player.pause().unwrap();
        let frame_at_pause = player.current_frame();
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(player.current_frame(), frame_at_pause);
        player.stop().unwrap();
    }

    #[test]
    fn transport_calls_are_idempotent_in_target_state() {
        let (player, registry) = test_player();
        let clip_id = registry.register(FrameSourceSpec::Null, None);
        player.load_clip(clip_id).unwrap();
        player.stop().unwrap();
        player.stop().unwrap();
        player.play().unwrap();
        player.play().unwrap();
        player.stop().unwrap();
    }

    #[test]
    fn exhausted_playlist_autoplay_advances_to_the_next_clip_and_arms_a_transition() {
        let (player, registry) = test_player();
        let first = registry.register(FrameSourceSpec::Null, None);
        let second = registry.register(FrameSourceSpec::Null, None);
        player.load_clip(first).unwrap();

        let transition = TransitionConfig {
            plugin_id: "crossfade".to_string(),
            duration_seconds: 0.5,
            easing: Easing::Linear,
        };
        player.set_playlist(vec![
            PlaylistItem { clip_id: first, transition: None },
            PlaylistItem { clip_id: second, transition: Some(transition) },
        ]);
        player.set_autoplay(true);

        let outcome = {
            let mut config = player.shared.config.lock().expect("player config mutex poisoned");
            advance_playlist_or_stop(&player.shared, &mut config).unwrap()
        };

        assert!(matches!(outcome, BaseFrameOutcome::Frame(_)));
        let config = player.shared.config.lock().expect("player config mutex poisoned");
        assert_eq!(config.playlist_index, 1);
        assert_eq!(config.clip_id, Some(second));
        assert!(config.active_transition.is_some(), "a per-item transition should have armed");
    }

    #[test]
    fn exhausted_playlist_without_autoplay_stops_the_player() {
        let (player, registry) = test_player();
        let clip_id = registry.register(FrameSourceSpec::Null, None);
        player.load_clip(clip_id).unwrap();
        player.set_playlist(vec![PlaylistItem { clip_id, transition: None }]);
        player.set_autoplay(false);

        let outcome = {
            let mut config = player.shared.config.lock().expect("player config mutex poisoned");
            advance_playlist_or_stop(&player.shared, &mut config).unwrap()
        };

        assert!(matches!(outcome, BaseFrameOutcome::Stopped));
    }
}
