//! Plugin system: the `Effect` / `Generator` / `Transition` trait objects,
//! their metadata, and the registry that discovers and instantiates them
//! .

mod builtin;
mod registry;

pub use registry::PluginRegistry;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::frame::Frame;
use crate::value::{ParamSchema, ParamValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginKind {
    Effect,
    Generator,
    Transition,
}

impl PluginKind {
    pub fn dir_name(self) -> &'static str {
        match self {
            PluginKind::Effect => "effects",
            PluginKind::Generator => "generators",
            PluginKind::Transition => "transitions",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginMetadata {
    pub id: String,
    pub display_name: String,
    pub kind: PluginKind,
    pub version: String,
    pub description: String,
    pub schema: ParamSchema,
    /// The implementation id this metadata is instantiated through. A
    /// built-in's own id doubles as its implementation id. A
    /// directory-discovered manifest declares this explicitly in its JSON
    /// to re-skin (new display name, description, schema) one of the
    /// engine's built-in implementations under a new plugin id, rather
    /// than shipping native code of its own -- see `registry::instantiate_*`.
    #[serde(default)]
    pub backed_by: Option<String>,
}

/// A resolved, validated parameter map ready to construct a plugin
/// instance from.
pub type ResolvedParams = BTreeMap<String, ParamValue>;

/// `process(frame, params) -> frame` -- may mutate in place; must
/// preserve shape and dtype; idempotent within a frame .
pub trait Effect: Send {
    fn process(&mut self, frame: &mut Frame, params: &ResolvedParams);
}

/// `produce(frame_number, time, width, height, params) -> frame` .
pub trait Generator: Send {
    fn produce(
        &mut self,
        frame_number: u64,
        time: f64,
        width: u32,
        height: u32,
        params: &ResolvedParams,
    ) -> Frame;
}

/// `blend(frame_a, frame_b, progress, params) -> frame` .
pub trait Transition: Send {
    fn blend(&mut self, a: &Frame, b: &Frame, progress: f32, params: &ResolvedParams) -> Frame;
}

impl fmt::Debug for dyn Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<effect instance>")
    }
}

impl fmt::Debug for dyn Generator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<generator instance>")
    }
}

impl fmt::Debug for dyn Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<transition instance>")
    }
}
