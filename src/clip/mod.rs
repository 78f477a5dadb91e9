//! The Clip Registry: authoritative per-clip state with version-counter
//! cache invalidation .

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ClipRegistryError;
use crate::frame_source::FrameSourceSpec;
use crate::value::ParamValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendMode {
    Normal,
    Multiply,
    Screen,
    Overlay,
    Add,
    Subtract,
}

/// One plugin invocation inside an effect chain .
/// The live instance handle is intentionally not part of this
/// serializable record -- it is resolved and cached separately by the
/// effect chain runner , keyed off `(plugin_id, last_used_version)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectEntry {
    pub plugin_id: String,
    pub params: BTreeMap<String, ParamValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerSpec {
    pub index: usize,
    pub source: FrameSourceSpec,
    pub effects: Vec<EffectEntry>,
    pub blend_mode: BlendMode,
    pub opacity: u8,
    pub enabled: bool,
}

impl LayerSpec {
    pub fn base(source: FrameSourceSpec) -> Self {
        Self {
            index: 0,
            source,
            effects: Vec::new(),
            blend_mode: BlendMode::Normal,
            opacity: 100,
            enabled: true,
        }
    }
}

/// The two post-composite effect chains a player resolves per tick.
/// Distinct from a [`LayerSpec`]'s own effect chain, which runs during
/// compositing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainTarget {
    Video,
    Artnet,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TransportState {
    pub in_point: u64,
    pub out_point: Option<u64>,
    pub reverse: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Clip {
    pub id: Uuid,
    pub source: FrameSourceSpec,
    pub total_frames: Option<u64>,
    pub transport: TransportState,
    pub layers: Vec<LayerSpec>,
    /// Post-composite chain applied before the video/preview target .
    pub video_chain: Vec<EffectEntry>,
    /// Post-composite chain applied before Art-Net sampling .
    pub artnet_chain: Vec<EffectEntry>,
    /// Monotonic, incremented on any mutation of layer/effect state .
    effects_version: u64,
}

impl Clip {
    pub fn new(id: Uuid, source: FrameSourceSpec, total_frames: Option<u64>) -> Self {
        Self {
            id,
            layers: vec![LayerSpec::base(source.clone())],
            source,
            total_frames,
            transport: TransportState::default(),
            video_chain: Vec::new(),
            artnet_chain: Vec::new(),
            effects_version: 0,
        }
    }

    fn chain(&self, target: ChainTarget) -> &Vec<EffectEntry> {
        match target {
            ChainTarget::Video => &self.video_chain,
            ChainTarget::Artnet => &self.artnet_chain,
        }
    }

    fn chain_mut(&mut self, target: ChainTarget) -> &mut Vec<EffectEntry> {
        match target {
            ChainTarget::Video => &mut self.video_chain,
            ChainTarget::Artnet => &mut self.artnet_chain,
        }
    }

    pub fn effects_version(&self) -> u64 {
        self.effects_version
    }

    fn bump_version(&mut self) {
        self.effects_version += 1;
    }
}

/// The authoritative per-clip map, keyed by UUID .
///
/// A short-critical-section mutex protects the map and version counters;
/// `get_effects_version` is additionally backed by a second, smaller mutex
/// over an atomic-counter mirror, so a play-loop hot-path reader only
/// contends with other version-counter traffic (`register`/`unregister`/
/// `bump_version`) and never blocks behind a `clips` reader/writer holding
/// the larger map (e.g. `all`, `restore_all`).
pub struct ClipRegistry {
    clips: Mutex<HashMap<Uuid, Clip>>,
    /// Mirrors `Clip::effects_version` without requiring the main mutex;
    /// updated under the same critical section as the mutation.
    version_atoms: Mutex<HashMap<Uuid, std::sync::Arc<AtomicU64>>>,
}

impl Default for ClipRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ClipRegistry {
    pub fn new() -> Self {
        Self {
            clips: Mutex::new(HashMap::new()),
            version_atoms: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, Clip>> {
        self.clips.lock().expect("clip registry mutex poisoned")
    }

    pub fn register(&self, source: FrameSourceSpec, total_frames: Option<u64>) -> Uuid {
        let id = Uuid::new_v4();
        let clip = Clip::new(id, source, total_frames);
        self.lock().insert(id, clip);
        self.version_atoms
            .lock()
            .expect("version atom map poisoned")
            .insert(id, std::sync::Arc::new(AtomicU64::new(0)));
        id
    }

    pub fn unregister(&self, id: Uuid) -> Result<(), ClipRegistryError> {
        self.lock()
            .remove(&id)
            .ok_or(ClipRegistryError::NotFound { id })?;
        self.version_atoms
            .lock()
            .expect("version atom map poisoned")
            .remove(&id);
        Ok(())
    }

    pub fn get(&self, id: Uuid) -> Result<Clip, ClipRegistryError> {
        self.lock()
            .get(&id)
            .cloned()
            .ok_or(ClipRegistryError::NotFound { id })
    }

    /// Reads the atomic-counter mirror under its own, smaller mutex
    /// rather than the full `clips` map -- decoupled from whatever is
    /// currently holding the `clips` lock, though the mirror's own lock
    /// can still block this call briefly behind a concurrent
    /// `register`/`unregister`/`bump_version` .
    pub fn get_effects_version(&self, id: Uuid) -> Option<u64> {
        self.version_atoms
            .lock()
            .expect("version atom map poisoned")
            .get(&id)
            .map(|a| a.load(Ordering::Acquire))
    }

    /// Dump every clip currently registered, for the snapshot contract
    /// . Order is unspecified.
    pub fn all(&self) -> Vec<Clip> {
        self.lock().values().cloned().collect()
    }

    /// Replace the entire registry contents with `clips`, preserving
    /// their ids and resetting version atoms to each clip's own counter.
    /// Used by `restore` ; any players pointed
    /// at clips no longer present will surface `ClipRegistryError::NotFound`
    /// on next use.
    pub fn restore_all(&self, clips: Vec<Clip>) {
        let mut map = self.lock();
        map.clear();
        let mut atoms = self.version_atoms.lock().expect("version atom map poisoned");
        atoms.clear();
        for clip in clips {
            atoms.insert(clip.id, std::sync::Arc::new(AtomicU64::new(clip.effects_version())));
            map.insert(clip.id, clip);
        }
    }

    fn bump(&self, clips: &mut HashMap<Uuid, Clip>, id: Uuid) {
        if let Some(clip) = clips.get_mut(&id) {
            clip.bump_version();
            if let Some(atom) = self
                .version_atoms
                .lock()
                .expect("version atom map poisoned")
                .get(&id)
            {
                atom.store(clip.effects_version(), Ordering::Release);
            }
        }
    }

    pub fn add_layer(&self, id: Uuid, source: FrameSourceSpec) -> Result<usize, ClipRegistryError> {
        let mut clips = self.lock();
        let clip = clips.get_mut(&id).ok_or(ClipRegistryError::NotFound { id })?;
        let index = clip.layers.len();
        clip.layers.push(LayerSpec {
            index,
            source,
            effects: Vec::new(),
            blend_mode: BlendMode::Normal,
            opacity: 100,
            enabled: true,
        });
        self.bump(&mut clips, id);
        Ok(index)
    }

    pub fn remove_layer(&self, id: Uuid, index: usize) -> Result<(), ClipRegistryError> {
        if index == 0 {
            return Err(ClipRegistryError::CannotRemoveBaseLayer);
        }
        let mut clips = self.lock();
        let clip = clips.get_mut(&id).ok_or(ClipRegistryError::NotFound { id })?;
        if index >= clip.layers.len() {
            return Err(ClipRegistryError::LayerOutOfRange {
                index,
                len: clip.layers.len(),
            });
        }
        clip.layers.remove(index);
        // Position-stable: shift higher indices down .
        for (i, layer) in clip.layers.iter_mut().enumerate() {
            layer.index = i;
        }
        self.bump(&mut clips, id);
        Ok(())
    }

    pub fn reorder_layers(&self, id: Uuid, new_order: &[usize]) -> Result<(), ClipRegistryError> {
        let mut clips = self.lock();
        let clip = clips.get_mut(&id).ok_or(ClipRegistryError::NotFound { id })?;
        if new_order.first() != Some(&0) {
            return Err(ClipRegistryError::CannotRemoveBaseLayer);
        }
        if new_order.len() != clip.layers.len() {
            return Err(ClipRegistryError::LayerOutOfRange {
                index: new_order.len(),
                len: clip.layers.len(),
            });
        }
        let mut reordered = Vec::with_capacity(clip.layers.len());
        for &idx in new_order {
            let layer = clip
                .layers
                .get(idx)
                .cloned()
                .ok_or(ClipRegistryError::LayerOutOfRange {
                    index: idx,
                    len: clip.layers.len(),
                })?;
            reordered.push(layer);
        }
        for (i, layer) in reordered.iter_mut().enumerate() {
            layer.index = i;
        }
        clip.layers = reordered;
        self.bump(&mut clips, id);
        Ok(())
    }

    pub fn update_layer_config(
        &self,
        id: Uuid,
        index: usize,
        blend_mode: Option<BlendMode>,
        opacity: Option<u8>,
        enabled: Option<bool>,
    ) -> Result<(), ClipRegistryError> {
        let mut clips = self.lock();
        let clip = clips.get_mut(&id).ok_or(ClipRegistryError::NotFound { id })?;
        let layer = clip
            .layers
            .get_mut(index)
            .ok_or(ClipRegistryError::LayerOutOfRange {
                index,
                len: clip.layers.len(),
            })?;
        if let Some(bm) = blend_mode {
            layer.blend_mode = bm;
        }
        if let Some(o) = opacity {
            layer.opacity = o.min(100);
        }
        if let Some(e) = enabled {
            layer.enabled = e;
        }
        self.bump(&mut clips, id);
        Ok(())
    }

    pub fn add_effect(
        &self,
        id: Uuid,
        layer_index: usize,
        plugin_id: String,
        params: BTreeMap<String, ParamValue>,
    ) -> Result<usize, ClipRegistryError> {
        let mut clips = self.lock();
        let clip = clips.get_mut(&id).ok_or(ClipRegistryError::NotFound { id })?;
        let layer = clip
            .layers
            .get_mut(layer_index)
            .ok_or(ClipRegistryError::LayerOutOfRange {
                index: layer_index,
                len: clip.layers.len(),
            })?;
        layer.effects.push(EffectEntry { plugin_id, params });
        let idx = layer.effects.len() - 1;
        self.bump(&mut clips, id);
        Ok(idx)
    }

    pub fn remove_effect(
        &self,
        id: Uuid,
        layer_index: usize,
        effect_index: usize,
    ) -> Result<(), ClipRegistryError> {
        let mut clips = self.lock();
        let clip = clips.get_mut(&id).ok_or(ClipRegistryError::NotFound { id })?;
        let layer = clip
            .layers
            .get_mut(layer_index)
            .ok_or(ClipRegistryError::LayerOutOfRange {
                index: layer_index,
                len: clip.layers.len(),
            })?;
        if effect_index >= layer.effects.len() {
            return Err(ClipRegistryError::EffectOutOfRange {
                index: effect_index,
                len: layer.effects.len(),
            });
        }
        layer.effects.remove(effect_index);
        self.bump(&mut clips, id);
        Ok(())
    }

    pub fn update_effect_parameter(
        &self,
        id: Uuid,
        layer_index: usize,
        effect_index: usize,
        name: String,
        value: ParamValue,
    ) -> Result<(), ClipRegistryError> {
        let mut clips = self.lock();
        let clip = clips.get_mut(&id).ok_or(ClipRegistryError::NotFound { id })?;
        let layer = clip
            .layers
            .get_mut(layer_index)
            .ok_or(ClipRegistryError::LayerOutOfRange {
                index: layer_index,
                len: clip.layers.len(),
            })?;
        let effect = layer
            .effects
            .get_mut(effect_index)
            .ok_or(ClipRegistryError::EffectOutOfRange {
                index: effect_index,
                len: layer.effects.len(),
            })?;
        effect.params.insert(name, value);
        self.bump(&mut clips, id);
        Ok(())
    }

    pub fn set_transport(&self, id: Uuid, transport: TransportState) -> Result<(), ClipRegistryError> {
        let mut clips = self.lock();
        let clip = clips.get_mut(&id).ok_or(ClipRegistryError::NotFound { id })?;
        clip.transport = transport;
        self.bump(&mut clips, id);
        Ok(())
    }

    /// Read a post-composite chain without touching the version counter
    /// .
    pub fn get_chain(&self, id: Uuid, target: ChainTarget) -> Result<Vec<EffectEntry>, ClipRegistryError> {
        let clips = self.lock();
        let clip = clips.get(&id).ok_or(ClipRegistryError::NotFound { id })?;
        Ok(clip.chain(target).clone())
    }

    pub fn add_chain_effect(
        &self,
        id: Uuid,
        target: ChainTarget,
        plugin_id: String,
        params: BTreeMap<String, ParamValue>,
    ) -> Result<usize, ClipRegistryError> {
        let mut clips = self.lock();
        let clip = clips.get_mut(&id).ok_or(ClipRegistryError::NotFound { id })?;
        clip.chain_mut(target).push(EffectEntry { plugin_id, params });
        let idx = clip.chain(target).len() - 1;
        self.bump(&mut clips, id);
        Ok(idx)
    }

    pub fn remove_chain_effect(&self, id: Uuid, target: ChainTarget, index: usize) -> Result<(), ClipRegistryError> {
        let mut clips = self.lock();
        let clip = clips.get_mut(&id).ok_or(ClipRegistryError::NotFound { id })?;
        let chain = clip.chain_mut(target);
        if index >= chain.len() {
            return Err(ClipRegistryError::EffectOutOfRange { index, len: chain.len() });
        }
        chain.remove(index);
        self.bump(&mut clips, id);
        Ok(())
    }

    pub fn update_chain_parameter(
        &self,
        id: Uuid,
        target: ChainTarget,
        index: usize,
        name: String,
        value: ParamValue,
    ) -> Result<(), ClipRegistryError> {
        let mut clips = self.lock();
        let clip = clips.get_mut(&id).ok_or(ClipRegistryError::NotFound { id })?;
        let chain = clip.chain_mut(target);
        let effect = chain
            .get_mut(index)
            .ok_or(ClipRegistryError::EffectOutOfRange { index, len: chain.len() })?;
        effect.params.insert(name, value);
        self.bump(&mut clips, id);
        Ok(())
    }

    pub fn clear_chain(&self, id: Uuid, target: ChainTarget) -> Result<(), ClipRegistryError> {
        let mut clips = self.lock();
        let clip = clips.get_mut(&id).ok_or(ClipRegistryError::NotFound { id })?;
        clip.chain_mut(target).clear();
        self.bump(&mut clips, id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_source::FrameSourceSpec;

    fn registry_with_clip() -> (ClipRegistry, Uuid) {
        let registry = ClipRegistry::new();
        let id = registry.register(FrameSourceSpec::Null, None);
        (registry, id)
    }

    #[test]
    fn version_increments_on_any_mutator() {
        let (registry, id) = registry_with_clip();
        let before = registry.get_effects_version(id).unwrap();
        registry
            .add_effect(id, 0, "invert".into(), BTreeMap::new())
            .unwrap();
        let after = registry.get_effects_version(id).unwrap();
        assert!(after > before, "version must strictly increase after a mutation");
    }

    #[test]
    fn layer_zero_cannot_be_removed() {
        let (registry, id) = registry_with_clip();
        let err = registry.remove_layer(id, 0).unwrap_err();
        assert!(matches!(err, ClipRegistryError::CannotRemoveBaseLayer));
    }

    #[test]
    fn removing_a_layer_shifts_higher_indices_down() {
        let (registry, id) = registry_with_clip();
        registry.add_layer(id, FrameSourceSpec::Null).unwrap();
        registry.add_layer(id, FrameSourceSpec::Null).unwrap();
        registry.remove_layer(id, 1).unwrap();

        let clip = registry.get(id).unwrap();
        assert_eq!(clip.layers.len(), 2);
        assert_eq!(clip.layers[0].index, 0);
        assert_eq!(clip.layers[1].index, 1);
    }

    #[test]
    fn unregister_removes_the_clip_entirely() {
        let (registry, id) = registry_with_clip();
        registry.unregister(id).unwrap();
        assert!(matches!(
            registry.get(id).unwrap_err(),
            ClipRegistryError::NotFound { .. }
        ));
        assert!(registry.get_effects_version(id).is_none());
    }
}
