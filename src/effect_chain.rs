//! Effect Chain Runner: walks an ordered [`EffectEntry`] list
//! against a frame, reusing cached plugin instances across frames and
//! only instantiating on a cache miss.
//!
//! Grounded on `node_graph/executor.rs`'s dispatch-by-id node
//! evaluation loop, generalized from a toposorted node graph to a flat
//! ordered chain, and on its panic-isolation idiom (a broken node must
//! not take down the rest of the graph) reworked here as the
//! `PluginFailure` counter-and-disable policy.

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::clip::EffectEntry;
use crate::frame::Frame;
use crate::plugin::{Effect, PluginRegistry, ResolvedParams};

/// After this many consecutive failures, a plugin is disabled for the
/// rest of the session .
const MAX_CONSECUTIVE_FAILURES: u32 = 5;

struct CachedEntry {
    plugin_id: String,
    instance: Box<dyn Effect>,
    consecutive_failures: u32,
    disabled: bool,
}

/// Applies an ordered effect chain to a frame, caching instantiated
/// plugin instances positionally across ticks.
#[derive(Default)]
pub struct EffectChainRunner {
    cache: Vec<CachedEntry>,
}

impl EffectChainRunner {
    pub fn new() -> Self {
        Self { cache: Vec::new() }
    }

    /// Apply `entries` to `frame` in order. A cache miss at position `i`
    /// (different plugin id, or chain grew) instantiates through
    /// `registry`; validation failures and process() panics are logged
    /// and that effect is skipped for this frame rather than aborting
    /// the chain .
    pub fn apply(&mut self, frame: &mut Frame, entries: &[EffectEntry], registry: &PluginRegistry) {
        self.cache.truncate(entries.len());
        while self.cache.len() < entries.len() {
            self.cache.push(CachedEntry {
                plugin_id: String::new(),
                instance: NoopEffect::boxed(),
                consecutive_failures: 0,
                disabled: false,
            });
        }

        for (i, entry) in entries.iter().enumerate() {
            let resolved = match registry.validate_params(&entry.plugin_id, &entry.params) {
                Ok(p) => p,
                Err(e) => {
                    log::warn!(
                        "effect '{}' parameter validation failed, skipping for this frame: {}",
                        entry.plugin_id,
                        e
                    );
                    continue;
                }
            };

            let slot = &mut self.cache[i];
            if slot.disabled {
                continue;
            }
            if slot.plugin_id != entry.plugin_id {
                match registry.instantiate_effect(&entry.plugin_id) {
                    Ok(instance) => {
                        slot.plugin_id = entry.plugin_id.clone();
                        slot.instance = instance;
                        slot.consecutive_failures = 0;
                    }
                    Err(e) => {
                        log::warn!("failed to instantiate effect '{}': {}", entry.plugin_id, e);
                        continue;
                    }
                }
            }

            run_effect(slot, frame, &resolved);
        }
    }
}

fn run_effect(slot: &mut CachedEntry, frame: &mut Frame, params: &ResolvedParams) {
    let instance = &mut slot.instance;
    let result = catch_unwind(AssertUnwindSafe(|| instance.process(frame, params)));
    match result {
        Ok(()) => {
            slot.consecutive_failures = 0;
        }
        Err(_) => {
            slot.consecutive_failures += 1;
            log::warn!(
                "effect '{}' failed during process() ({} consecutive)",
                slot.plugin_id,
                slot.consecutive_failures
            );
            if slot.consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
                log::error!(
                    "effect '{}' disabled after {} consecutive failures",
                    slot.plugin_id,
                    MAX_CONSECUTIVE_FAILURES
                );
                slot.disabled = true;
            }
        }
    }
}

struct NoopEffect;
impl NoopEffect {
    fn boxed() -> Box<dyn Effect> {
        Box::new(NoopEffect)
    }
}
impl Effect for NoopEffect {
    fn process(&mut self, _frame: &mut Frame, _params: &BTreeMap<String, crate::value::ParamValue>) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;
    use crate::plugin::PluginRegistry;

    #[test]
    fn unknown_plugin_is_skipped_not_fatal() {
        let registry = PluginRegistry::discover(&[]);
        let mut runner = EffectChainRunner::new();
        let mut frame = Frame::filled(2, 2, (10, 20, 30));
        let entries = vec![EffectEntry {
            plugin_id: "does-not-exist".into(),
            params: BTreeMap::new(),
        }];
        runner.apply(&mut frame, &entries, &registry);
        assert_eq!(frame.pixel(0, 0), (10, 20, 30));
    }

    #[test]
    fn known_effect_runs_and_mutates_the_frame() {
        let registry = PluginRegistry::discover(&[]);
        let mut runner = EffectChainRunner::new();
        let mut frame = Frame::filled(1, 1, (10, 20, 30));
        let entries = vec![EffectEntry {
            plugin_id: "invert".into(),
            params: BTreeMap::new(),
        }];
        runner.apply(&mut frame, &entries, &registry);
        assert_eq!(frame.pixel(0, 0), (245, 235, 225));
    }

    #[test]
    fn cache_is_reused_across_applications_with_the_same_chain_shape() {
        let registry = PluginRegistry::discover(&[]);
        let mut runner = EffectChainRunner::new();
        let entries = vec![EffectEntry {
            plugin_id: "invert".into(),
            params: BTreeMap::new(),
        }];
        let mut frame = Frame::filled(1, 1, (0, 0, 0));
        runner.apply(&mut frame, &entries, &registry);
        runner.apply(&mut frame, &entries, &registry);
        assert_eq!(frame.pixel(0, 0), (0, 0, 0));
        assert_eq!(runner.cache.len(), 1);
    }
}
