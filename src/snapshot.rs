//! The engine-wide snapshot document: per-player config and playback
//! position, the full clip registry dump, every registered sequence,
//! and Art-Net defaults. Purely an in-memory `serde`-derived value --
//! writing it to a file or database is the caller's job, not the
//! engine's.
//!
//! Grounded on `project_manager.rs`'s whole-project-state document
//! shape, generalized from its `sqlx`-backed persistence to a bare
//! `serde` value the engine only produces and consumes in memory.

use serde::{Deserialize, Serialize};

use crate::clip::Clip;
use crate::config::EngineConfig;
use crate::player::PlayerSnapshot;
use crate::sequence::Sequence;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub players: Vec<PlayerSnapshot>,
    pub clips: Vec<Clip>,
    pub sequences: Vec<Sequence>,
    pub config: EngineConfig,
}
