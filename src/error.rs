//! Typed error taxonomy for every engine subsystem.
//!
//! Each enum here corresponds to one row-group of the error taxonomy: a
//! capability call returns one of these directly, or the aggregating
//! [`EngineError`] when the call crosses subsystem boundaries.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("plugin not found: {id}")]
    NotFound { id: String },
    #[error("parameter validation failed for {plugin_id}.{param}: {reason}")]
    ParameterValidation {
        plugin_id: String,
        param: String,
        reason: String,
    },
    #[error("failed to instantiate plugin {id}: {reason}")]
    Instantiation { id: String, reason: String },
    #[error("plugin {id} failed during process(): {reason}")]
    Failure { id: String, reason: String },
}

#[derive(Debug, Error)]
pub enum ClipRegistryError {
    #[error("clip not found: {id}")]
    NotFound { id: Uuid },
    #[error("layer index out of range: {index} (clip has {len} layers)")]
    LayerOutOfRange { index: usize, len: usize },
    #[error("effect index out of range: {index} (chain has {len} effects)")]
    EffectOutOfRange { index: usize, len: usize },
    #[error("layer 0 cannot be removed")]
    CannotRemoveBaseLayer,
    #[error("parameter validation failed: {0}")]
    ParameterValidation(#[from] PluginError),
}

#[derive(Debug, Error)]
pub enum FrameSourceError {
    #[error("transient source error: {reason}")]
    Transient { reason: String },
    #[error("fatal source error: {reason}")]
    Fatal { reason: String },
    #[error("source is exhausted")]
    Exhausted,
    #[error("seek target {target} is out of range (0..{len})")]
    SeekOutOfRange { target: u64, len: u64 },
}

#[derive(Debug, Error)]
pub enum ArtNetError {
    #[error("failed to bind Art-Net socket on {addr}: {reason}")]
    BindFailed { addr: String, reason: String },
    #[error("universe index {universe} exceeds configured universe count")]
    InvalidUniverse { universe: u16 },
    #[error("network send failed (transient, counted and dropped): {reason}")]
    NetworkTransient { reason: String },
}

#[derive(Debug, Error)]
pub enum PreviewError {
    #[error("failed to encode JPEG frame: {reason}")]
    EncodeFailed { reason: String },
    #[error("subscriber channel closed")]
    SubscriberGone,
}

#[derive(Debug, Error)]
pub enum SequenceError {
    #[error("parameter path is invalid: {path}")]
    InvalidPath { path: String },
    #[error("audio analyzer snapshot unavailable")]
    NoAudioSnapshot,
}

/// Top-level error aggregating every subsystem, returned by the engine's
/// capability surface.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("plugin error: {0}")]
    Plugin(#[from] PluginError),
    #[error("clip registry error: {0}")]
    ClipRegistry(#[from] ClipRegistryError),
    #[error("frame source error: {0}")]
    FrameSource(#[from] FrameSourceError),
    #[error("art-net error: {0}")]
    ArtNet(#[from] ArtNetError),
    #[error("preview error: {0}")]
    Preview(#[from] PreviewError),
    #[error("sequence error: {0}")]
    Sequence(#[from] SequenceError),
    #[error("player not found: {id}")]
    PlayerNotFound { id: String },
    #[error("invalid parameter: {reason}")]
    ParameterValidation { reason: String },
    #[error("internal invariant violated: {reason}")]
    Internal { reason: String },
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {reason}")]
    Read { path: String, reason: String },
    #[error("failed to parse config file {path}: {reason}")]
    Parse { path: String, reason: String },
}

pub type EngineResult<T> = Result<T, EngineError>;
