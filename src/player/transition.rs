//! Transition Engine : eases between the outgoing clip's last
//! composed frame and the incoming clip's frames across a configured
//! window.
//!
//! Easing curves are grounded on `node_graph/executor.rs`'s
//! `shape_curve` power-curve shaping (the same convex/concave math, here
//! fixed to the four named easings the spec lists rather than a
//! continuous curve parameter).

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::frame::Frame;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Easing {
    Linear,
    EaseIn,
    EaseOut,
    EaseInOut,
}

impl Easing {
    /// Map `t` in `[0, 1]` through this easing curve, clamped to `[0, 1]`.
    pub fn apply(self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Easing::Linear => t,
            Easing::EaseIn => t * t,
            Easing::EaseOut => 1.0 - (1.0 - t) * (1.0 - t),
            Easing::EaseInOut => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(2) / 2.0
                }
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionConfig {
    pub plugin_id: String,
    pub duration_seconds: f32,
    pub easing: Easing,
}

/// Live state of an in-progress transition: the outgoing clip's
/// captured last frame plus timing .
pub struct TransitionRuntime {
    pub buffer: Frame,
    pub incoming_clip: Uuid,
    pub started: Instant,
    pub duration: Duration,
    pub plugin_id: String,
    pub easing: Easing,
}

impl TransitionRuntime {
    pub fn new(buffer: Frame, incoming_clip: Uuid, config: &TransitionConfig) -> Self {
        Self {
            buffer,
            incoming_clip,
            started: Instant::now(),
            duration: Duration::from_secs_f32(config.duration_seconds.max(0.0)),
            plugin_id: config.plugin_id.clone(),
            easing: config.easing,
        }
    }

    /// `progress = ease(elapsed / duration)`, `None` once the window has
    /// elapsed .
    pub fn progress(&self) -> Option<f32> {
        if self.duration.is_zero() {
            return None;
        }
        let elapsed = self.started.elapsed();
        if elapsed >= self.duration {
            None
        } else {
            Some(self.easing.apply(elapsed.as_secs_f32() / self.duration.as_secs_f32()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_easing_is_identity() {
        assert_eq!(Easing::Linear.apply(0.25), 0.25);
        assert_eq!(Easing::Linear.apply(0.75), 0.75);
    }

    #[test]
    fn ease_in_out_is_symmetric_around_half() {
        let a = Easing::EaseInOut.apply(0.25);
        let b = 1.0 - Easing::EaseInOut.apply(0.75);
        assert!((a - b).abs() < 1e-5);
    }

    #[test]
    fn all_easings_stay_in_unit_range() {
        for easing in [Easing::Linear, Easing::EaseIn, Easing::EaseOut, Easing::EaseInOut] {
            for i in 0..=10 {
                let t = i as f32 / 10.0;
                let y = easing.apply(t);
                assert!((0.0..=1.0).contains(&y), "{:?} at {} produced {}", easing, t, y);
            }
        }
    }
}
