//! Real-time video-to-DMX/Art-Net rendering engine: decode or generate
//! frames, run per-layer and post-composite effect chains, composite
//! layers, and push the result out as pixel preview frames and/or
//! Art-Net universes, independently and in sync.

pub mod artnet;
pub mod clip;
pub mod compositor;
pub mod config;
pub mod effect_chain;
pub mod engine;
pub mod error;
pub mod events;
pub mod frame;
pub mod frame_source;
pub mod manager;
pub mod player;
pub mod plugin;
pub mod preview;
pub mod sample;
pub mod sequence;
pub mod snapshot;
pub mod value;

pub use engine::Engine;
pub use error::{EngineError, EngineResult};
pub use snapshot::EngineSnapshot;
