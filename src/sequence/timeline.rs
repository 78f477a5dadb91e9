//! Timeline sequences : a keyframe list sampled by time, with
//! interpolation and loop-mode handling.
//!
//! Sampling is grounded on `engine/mod.rs`'s `sample_series`: a
//! `partition_point` binary search for the surrounding keyframe pair,
//! clamped hold before the first and after the last.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interpolation {
    Linear,
    EaseIn,
    EaseOut,
    EaseInOut,
    Step,
}

impl Interpolation {
    fn shape(self, t: f64) -> f64 {
        match self {
            Interpolation::Linear => t,
            Interpolation::EaseIn => t * t,
            Interpolation::EaseOut => 1.0 - (1.0 - t) * (1.0 - t),
            Interpolation::EaseInOut => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(2) / 2.0
                }
            }
            Interpolation::Step => 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopMode {
    Once,
    Loop,
    PingPong,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Keyframe {
    pub t: f64,
    pub v: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineSequence {
    /// Kept sorted by `t`; callers are expected to construct it sorted
    /// (`new` sorts defensively).
    pub keyframes: Vec<Keyframe>,
    pub interpolation: Interpolation,
    pub loop_mode: LoopMode,
}

impl TimelineSequence {
    pub fn new(mut keyframes: Vec<Keyframe>, interpolation: Interpolation, loop_mode: LoopMode) -> Self {
        keyframes.sort_by(|a, b| a.t.total_cmp(&b.t));
        Self {
            keyframes,
            interpolation,
            loop_mode,
        }
    }

    fn duration(&self) -> f64 {
        match (self.keyframes.first(), self.keyframes.last()) {
            (Some(first), Some(last)) => (last.t - first.t).max(0.0),
            _ => 0.0,
        }
    }

    /// Fold `time_seconds` into the timeline's own local time per
    /// `loop_mode`.
    fn local_time(&self, time_seconds: f64) -> f64 {
        let start = self.keyframes.first().map(|k| k.t).unwrap_or(0.0);
        let span = self.duration();
        if span <= 1e-9 {
            return start;
        }
        let elapsed = (time_seconds - start).max(0.0);
        match self.loop_mode {
            LoopMode::Once => start + elapsed.min(span),
            LoopMode::Loop => start + elapsed.rem_euclid(span),
            LoopMode::PingPong => {
                let cycle = 2.0 * span;
                let phase = elapsed.rem_euclid(cycle);
                if phase <= span {
                    start + phase
                } else {
                    start + (cycle - phase)
                }
            }
        }
    }

    /// Sample the value at `time_seconds` (absolute, same clock the
    /// keyframe `t` values are expressed in).
    pub fn sample(&self, time_seconds: f64) -> f64 {
        if self.keyframes.is_empty() {
            return 0.0;
        }
        if self.keyframes.len() == 1 {
            return self.keyframes[0].v;
        }

        let t = self.local_time(time_seconds);
        let idx = self.keyframes.partition_point(|k| k.t < t);

        if idx == 0 {
            return self.keyframes[0].v;
        }
        if idx >= self.keyframes.len() {
            return self.keyframes[self.keyframes.len() - 1].v;
        }

        let k0 = &self.keyframes[idx - 1];
        let k1 = &self.keyframes[idx];

        if self.interpolation == Interpolation::Step {
            return k0.v;
        }

        let span = k1.t - k0.t;
        let local_t = if span > 1e-9 {
            ((t - k0.t) / span).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let shaped = self.interpolation.shape(local_t);
        k0.v + shaped * (k1.v - k0.v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timeline(loop_mode: LoopMode) -> TimelineSequence {
        TimelineSequence::new(
            vec![
                Keyframe { t: 0.0, v: 0.0 },
                Keyframe { t: 1.0, v: 10.0 },
                Keyframe { t: 2.0, v: 0.0 },
            ],
            Interpolation::Linear,
            loop_mode,
        )
    }

    #[test]
    fn linear_interpolates_between_keyframes() {
        let tl = timeline(LoopMode::Once);
        assert_eq!(tl.sample(0.5), 5.0);
    }

    #[test]
    fn once_mode_holds_the_last_value_past_the_end() {
        let tl = timeline(LoopMode::Once);
        assert_eq!(tl.sample(100.0), 0.0);
    }

    #[test]
    fn loop_mode_wraps_back_to_the_start() {
        let tl = timeline(LoopMode::Loop);
        assert_eq!(tl.sample(2.5), tl.sample(0.5));
    }

    #[test]
    fn ping_pong_reverses_direction_each_span() {
        let tl = timeline(LoopMode::PingPong);
        // One full span is 2.0s; the second span should mirror the first.
        let forward = tl.sample(0.5);
        let mirrored = tl.sample(3.5);
        assert_eq!(forward, mirrored);
    }

    #[test]
    fn step_interpolation_holds_the_left_keyframe() {
        let tl = TimelineSequence::new(
            vec![Keyframe { t: 0.0, v: 1.0 }, Keyframe { t: 1.0, v: 2.0 }],
            Interpolation::Step,
            LoopMode::Once,
        );
        assert_eq!(tl.sample(0.9), 1.0);
    }

    #[test]
    fn empty_timeline_samples_to_zero() {
        let tl = TimelineSequence::new(vec![], Interpolation::Linear, LoopMode::Once);
        assert_eq!(tl.sample(1.0), 0.0);
    }
}
