//! Audio-Reactive sequences: map a smoothed audio feature into
//! `[min, max]`.
//!
//! The smoothing stage is a one-pole low-pass with independent
//! attack/release coefficients, the same per-sample recursive-filter
//! shape as `audio::filters`'s Butterworth biquads (coefficients fixed
//! once, one `y = a*y + (1-a)*x` update per step) collapsed to first
//! order since a reactive sequence only needs a directional rise/fall
//! shape, not a steep cutoff.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::SequenceError;

/// A snapshot of the features an audio analyzer produces on each
/// analysis window.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AudioSnapshot {
    pub rms: f64,
    pub peak: f64,
    pub bass: f64,
    pub mid: f64,
    pub treble: f64,
    pub beat: bool,
    pub bpm: f64,
}

/// Lock-protected latest-snapshot holder. An upstream analysis pipeline
/// calls [`AudioAnalyzer::update`] on each window; Audio-Reactive
/// sequences read it on each Sequence Engine tick.
pub struct AudioAnalyzer {
    snapshot: Mutex<Option<AudioSnapshot>>,
}

impl AudioAnalyzer {
    pub fn new() -> Self {
        Self {
            snapshot: Mutex::new(None),
        }
    }

    pub fn update(&self, snapshot: AudioSnapshot) {
        *self.snapshot.lock().expect("audio analyzer snapshot poisoned") = Some(snapshot);
    }

    pub fn snapshot(&self) -> Result<AudioSnapshot, SequenceError> {
        self.snapshot
            .lock()
            .expect("audio analyzer snapshot poisoned")
            .ok_or(SequenceError::NoAudioSnapshot)
    }
}

impl Default for AudioAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioFeature {
    Rms,
    Peak,
    Bass,
    Mid,
    Treble,
    Beat,
    Bpm,
}

impl AudioFeature {
    fn read(self, snapshot: &AudioSnapshot) -> f64 {
        match self {
            AudioFeature::Rms => snapshot.rms,
            AudioFeature::Peak => snapshot.peak,
            AudioFeature::Bass => snapshot.bass,
            AudioFeature::Mid => snapshot.mid,
            AudioFeature::Treble => snapshot.treble,
            AudioFeature::Beat => {
                if snapshot.beat {
                    1.0
                } else {
                    0.0
                }
            }
            AudioFeature::Bpm => snapshot.bpm,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioReactiveSequence {
    pub feature: AudioFeature,
    /// One-pole coefficient applied while the raw reading is rising
    /// (closer to 0.0 tracks faster, closer to 1.0 smooths harder).
    pub attack: f64,
    /// One-pole coefficient applied while the raw reading is falling.
    pub release: f64,
    pub min: f64,
    pub max: f64,
    #[serde(skip)]
    smoothed: f64,
    #[serde(skip)]
    initialized: bool,
}

impl AudioReactiveSequence {
    pub fn new(feature: AudioFeature, attack: f64, release: f64, min: f64, max: f64) -> Self {
        Self {
            feature,
            attack: attack.clamp(0.0, 1.0),
            release: release.clamp(0.0, 1.0),
            min,
            max,
            smoothed: 0.0,
            initialized: false,
        }
    }

    /// Read the analyzer's current feature value, apply asymmetric
    /// one-pole smoothing, and map the result into `[min, max]`.
    pub fn tick(&mut self, analyzer: &AudioAnalyzer) -> Result<f64, SequenceError> {
        let snapshot = analyzer.snapshot()?;
        let raw = self.feature.read(&snapshot).clamp(0.0, 1.0);

        if !self.initialized {
            self.smoothed = raw;
            self.initialized = true;
        } else {
            let coefficient = if raw > self.smoothed {
                self.attack
            } else {
                self.release
            };
            self.smoothed = coefficient * self.smoothed + (1.0 - coefficient) * raw;
        }

        Ok(self.min + self.smoothed * (self.max - self.min))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reading_without_a_snapshot_fails_the_sequence_not_the_caller() {
        let analyzer = AudioAnalyzer::new();
        let mut seq = AudioReactiveSequence::new(AudioFeature::Rms, 0.5, 0.2, 0.0, 1.0);
        assert!(matches!(seq.tick(&analyzer), Err(SequenceError::NoAudioSnapshot)));
    }

    #[test]
    fn attack_and_release_produce_different_responses() {
        let analyzer = AudioAnalyzer::new();
        analyzer.update(AudioSnapshot {
            rms: 0.0,
            ..Default::default()
        });
        let mut seq = AudioReactiveSequence::new(AudioFeature::Rms, 0.1, 0.9, 0.0, 1.0);
        seq.tick(&analyzer).unwrap();

        analyzer.update(AudioSnapshot {
            rms: 1.0,
            ..Default::default()
        });
        let rising = seq.tick(&analyzer).unwrap();

        analyzer.update(AudioSnapshot {
            rms: 0.0,
            ..Default::default()
        });
        let falling = seq.tick(&analyzer).unwrap();

        // A fast attack (low coefficient) should have jumped closer to 1.0
        // than a slow release pulls it back down toward 0.0 in one step.
        assert!(rising > 0.5);
        assert!(falling > 0.3);
    }

    #[test]
    fn beat_maps_boolean_to_zero_or_one() {
        let analyzer = AudioAnalyzer::new();
        analyzer.update(AudioSnapshot {
            beat: true,
            ..Default::default()
        });
        let mut seq = AudioReactiveSequence::new(AudioFeature::Beat, 0.0, 0.0, 0.0, 10.0);
        let v = seq.tick(&analyzer).unwrap();
        assert_eq!(v, 10.0);
    }
}
