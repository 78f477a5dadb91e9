//! Frame clock: drift-corrected pacing for the play loop .
//!
//! Grounded on the teacher's `playback.rs` `Instant`-based elapsed
//! tracking (`start_instant` / `start_offset`), generalized from a
//! single play/pause offset into a per-tick target-vs-actual drift
//! correction so a player's frame cadence does not accumulate error
//! over a long-running session.

use std::time::{Duration, Instant};

/// If the computed sleep falls behind this far, resetting the clock
/// reference is cheaper (and less surprising) than trying to catch up
/// frame-by-frame, which would starve every downstream consumer.
const CATASTROPHIC_DRIFT: Duration = Duration::from_millis(100);

pub struct FrameClock {
    reference: Instant,
    frame_count: u64,
    fps: f32,
}

impl FrameClock {
    pub fn new(fps: f32) -> Self {
        Self {
            reference: Instant::now(),
            frame_count: 0,
            fps: fps.max(0.1),
        }
    }

    pub fn set_fps(&mut self, fps: f32) {
        self.fps = fps.max(0.1);
        self.reset();
    }

    pub fn fps(&self) -> f32 {
        self.fps
    }

    /// Reset the reference instant without losing the fps setting; used
    /// after a pause so paused time is never counted against drift
    /// .
    pub fn reset(&mut self) {
        self.reference = Instant::now();
        self.frame_count = 0;
    }

    /// Block until the next frame's target time, correcting for drift
    /// against `reference`. Returns `true` if a catastrophic-drift reset
    /// occurred this tick (informational, for logging).
    pub fn wait_for_next_tick(&mut self) -> bool {
        let target_delay = Duration::from_secs_f32(1.0 / self.fps);
        let target = self.reference + target_delay * self.frame_count as u32;
        let now = Instant::now();

        if target > now {
            std::thread::sleep(target - now);
            self.frame_count += 1;
            false
        } else {
            let behind = now - target;
            self.frame_count += 1;
            if behind > CATASTROPHIC_DRIFT {
                self.reset();
                true
            } else {
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_zeroes_the_frame_counter() {
        let mut clock = FrameClock::new(30.0);
        clock.frame_count = 100;
        clock.reset();
        assert_eq!(clock.frame_count, 0);
    }

    #[test]
    fn fps_is_floored_to_avoid_division_by_zero() {
        let clock = FrameClock::new(0.0);
        assert!(clock.fps > 0.0);
    }
}
