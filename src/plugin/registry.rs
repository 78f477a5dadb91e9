use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use once_cell::sync::Lazy;
use walkdir::WalkDir;

use crate::error::PluginError;
use crate::plugin::builtin;
use crate::plugin::{Effect, Generator, PluginKind, PluginMetadata, ResolvedParams, Transition};
use crate::value::ParamValue;

/// Discovers and instantiates generator/effect/transition plugins;
/// caches serialized metadata for the life of the registry .
pub struct PluginRegistry {
    metadata: BTreeMap<String, PluginMetadata>,
    /// Cache of serialized `metadata_json`/`parameters_json`, keyed by
    /// plugin id, filled lazily and kept for the registry's lifetime.
    serialized_cache: RwLock<BTreeMap<String, (String, String)>>,
}

impl PluginRegistry {
    /// Build a registry with the built-in plugin set, then discover any
    /// additional manifests under `search_paths`. A failing manifest is
    /// logged and skipped -- it must not prevent the rest from loading.
    /// A discovered manifest is not dead metadata: it declares a
    /// `backed_by` built-in implementation id, so `instantiate_*`
    /// constructs the same trait object a built-in with that id would,
    /// under the manifest's own id, display name, description and schema.
    pub fn discover(search_paths: &[PathBuf]) -> Self {
        let mut metadata = BTreeMap::new();
        for m in builtin::builtin_metadata() {
            metadata.insert(m.id.clone(), m);
        }

        for root in search_paths {
            for kind in [PluginKind::Effect, PluginKind::Generator, PluginKind::Transition] {
                let dir = root.join(kind.dir_name());
                if !dir.exists() {
                    continue;
                }
                for entry in WalkDir::new(&dir)
                    .min_depth(1)
                    .max_depth(1)
                    .into_iter()
                    .filter_map(|e| e.ok())
                {
                    let path = entry.path();
                    if path.extension().and_then(|s| s.to_str()) != Some("json") {
                        continue;
                    }
                    match load_manifest(path, kind) {
                        Ok(m) => {
                            log::info!("discovered plugin '{}' ({:?})", m.id, m.kind);
                            metadata.insert(m.id.clone(), m);
                        }
                        Err(e) => {
                            log::warn!("skipping plugin manifest {}: {}", path.display(), e);
                        }
                    }
                }
            }
        }

        Self {
            metadata,
            serialized_cache: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn empty() -> Self {
        Self {
            metadata: BTreeMap::new(),
            serialized_cache: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn list(&self, kind: PluginKind) -> Vec<PluginMetadata> {
        self.metadata
            .values()
            .filter(|m| m.kind == kind)
            .cloned()
            .collect()
    }

    fn get_metadata(&self, id: &str) -> Result<&PluginMetadata, PluginError> {
        self.metadata
            .get(id)
            .ok_or_else(|| PluginError::NotFound { id: id.to_string() })
    }

    pub fn validate_params(
        &self,
        id: &str,
        supplied: &BTreeMap<String, ParamValue>,
    ) -> Result<ResolvedParams, PluginError> {
        let meta = self.get_metadata(id)?;
        meta.schema.validate(id, supplied)
    }

    /// Resolve `id` to the implementation id it is actually backed by: a
    /// built-in's own id, or a discovered manifest's declared `backed_by`
    /// . Directory discovery never hot-loads native code --
    /// a manifest re-skins one of the engine's built-in implementations
    /// under a new id, schema and display name.
    fn backing_id<'a>(&self, meta: &'a PluginMetadata) -> &'a str {
        meta.backed_by.as_deref().unwrap_or(&meta.id)
    }

    pub fn instantiate_effect(&self, id: &str) -> Result<Box<dyn Effect>, PluginError> {
        let meta = self.get_metadata(id)?;
        let backing = self.backing_id(meta);
        builtin::create_effect(backing).ok_or_else(|| PluginError::Instantiation {
            id: id.to_string(),
            reason: format!("no effect implementation registered for backing id '{}'", backing),
        })
    }

    pub fn instantiate_generator(&self, id: &str) -> Result<Box<dyn Generator>, PluginError> {
        let meta = self.get_metadata(id)?;
        let backing = self.backing_id(meta);
        builtin::create_generator(backing).ok_or_else(|| PluginError::Instantiation {
            id: id.to_string(),
            reason: format!("no generator implementation registered for backing id '{}'", backing),
        })
    }

    pub fn instantiate_transition(&self, id: &str) -> Result<Box<dyn Transition>, PluginError> {
        let meta = self.get_metadata(id)?;
        let backing = self.backing_id(meta);
        builtin::create_transition(backing).ok_or_else(|| PluginError::Instantiation {
            id: id.to_string(),
            reason: format!("no transition implementation registered for backing id '{}'", backing),
        })
    }

    pub fn metadata_json(&self, id: &str) -> Result<String, PluginError> {
        self.ensure_cached(id)?;
        Ok(self
            .serialized_cache
            .read()
            .expect("plugin metadata cache poisoned")
            .get(id)
            .expect("just cached")
            .0
            .clone())
    }

    pub fn parameters_json(&self, id: &str) -> Result<String, PluginError> {
        self.ensure_cached(id)?;
        Ok(self
            .serialized_cache
            .read()
            .expect("plugin metadata cache poisoned")
            .get(id)
            .expect("just cached")
            .1
            .clone())
    }

    fn ensure_cached(&self, id: &str) -> Result<(), PluginError> {
        if self
            .serialized_cache
            .read()
            .expect("plugin metadata cache poisoned")
            .contains_key(id)
        {
            return Ok(());
        }
        let meta = self.get_metadata(id)?;
        let metadata_json = serde_json::to_string(meta).unwrap_or_default();
        let parameters_json = serde_json::to_string(&meta.schema).unwrap_or_default();
        self.serialized_cache
            .write()
            .expect("plugin metadata cache poisoned")
            .insert(id.to_string(), (metadata_json, parameters_json));
        Ok(())
    }
}

static DEFAULT_SEARCH_PATHS: Lazy<Vec<PathBuf>> = Lazy::new(Vec::new);

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::discover(&DEFAULT_SEARCH_PATHS)
    }
}

/// A manifest must declare `backed_by` as one of the engine's built-in
/// implementation ids (see `builtin::create_effect`/`create_generator`/
/// `create_transition`) -- this is what lets a directory-discovered
/// plugin actually run rather than only being listed.
fn load_manifest(path: &Path, kind: PluginKind) -> Result<PluginMetadata, String> {
    let text = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    let mut meta: PluginMetadata = serde_json::from_str(&text).map_err(|e| e.to_string())?;
    meta.kind = kind;
    if meta.backed_by.is_none() {
        return Err(format!(
            "manifest '{}' is missing a 'backed_by' implementation id",
            meta.id
        ));
    }
    Ok(meta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;

    #[test]
    fn unknown_plugin_is_reported_not_found() {
        let registry = PluginRegistry::discover(&[]);
        let err = registry.instantiate_effect("does-not-exist").unwrap_err();
        assert!(matches!(err, PluginError::NotFound { .. }));
    }

    #[test]
    fn builtin_effects_are_discovered_without_any_search_path() {
        let registry = PluginRegistry::discover(&[]);
        let effects = registry.list(PluginKind::Effect);
        assert!(effects.iter().any(|m| m.id == "invert"));
    }

    #[test]
    fn a_broken_manifest_does_not_prevent_builtins_from_loading() {
        let dir = tempfile::tempdir().unwrap();
        let effects_dir = dir.path().join("effects");
        std::fs::create_dir_all(&effects_dir).unwrap();
        std::fs::write(effects_dir.join("broken.json"), "{ not json").unwrap();

        let registry = PluginRegistry::discover(&[dir.path().to_path_buf()]);
        assert!(registry.list(PluginKind::Effect).iter().any(|m| m.id == "invert"));
    }

    #[test]
    fn a_manifest_missing_backed_by_is_skipped_not_registered() {
        let dir = tempfile::tempdir().unwrap();
        let effects_dir = dir.path().join("effects");
        std::fs::create_dir_all(&effects_dir).unwrap();
        std::fs::write(
            effects_dir.join("unbacked.json"),
            r#"{"id":"unbacked","display_name":"Unbacked","kind":"effect","version":"1.0.0","description":"","schema":{"params":[]}}"#,
        )
        .unwrap();

        let registry = PluginRegistry::discover(&[dir.path().to_path_buf()]);
        assert!(registry.instantiate_effect("unbacked").is_err());
    }

    #[test]
    fn a_discovered_manifest_backed_by_a_builtin_can_be_instantiated() {
        let dir = tempfile::tempdir().unwrap();
        let effects_dir = dir.path().join("effects");
        std::fs::create_dir_all(&effects_dir).unwrap();
        std::fs::write(
            effects_dir.join("negative.json"),
            r#"{
                "id": "negative",
                "display_name": "Negative",
                "kind": "effect",
                "version": "1.0.0",
                "description": "A re-skinned invert, shipped as a directory manifest.",
                "schema": {"params": []},
                "backed_by": "invert"
            }"#,
        )
        .unwrap();

        let registry = PluginRegistry::discover(&[dir.path().to_path_buf()]);
        assert!(registry.list(PluginKind::Effect).iter().any(|m| m.id == "negative"));

        let mut frame = Frame::filled(1, 1, (10, 20, 30));
        let mut effect = registry.instantiate_effect("negative").unwrap();
        effect.process(&mut frame, &ResolvedParams::new());
        assert_eq!(frame.pixel(0, 0), (245, 235, 225));
    }
}
