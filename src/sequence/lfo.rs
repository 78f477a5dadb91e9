//! LFO sequences : a periodic waveform mapped into `[min, max]`.

use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Waveform {
    Sine,
    Square,
    Triangle,
    Saw,
    RandomHold,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LfoSequence {
    pub waveform: Waveform,
    pub frequency_hz: f32,
    pub phase: f32,
    pub min: f64,
    pub max: f64,
    /// Current held value and the phase it was drawn at, for `RandomHold`
    /// (a new draw happens once per cycle, not once per tick).
    #[serde(skip)]
    held_value: f64,
    #[serde(skip)]
    held_cycle: i64,
}

impl LfoSequence {
    pub fn new(waveform: Waveform, frequency_hz: f32, phase: f32, min: f64, max: f64) -> Self {
        Self {
            waveform,
            frequency_hz,
            phase,
            min,
            max,
            held_value: min,
            held_cycle: -1,
        }
    }

    /// Evaluate the waveform at `time_seconds`, mapped into `[min, max]`.
    /// `RandomHold` draws are keyed by cycle number so repeated calls
    /// within the same cycle return the same value.
    pub fn value(&mut self, time_seconds: f64) -> f64 {
        let cycles = time_seconds * self.frequency_hz as f64 + self.phase as f64;
        let unit = match self.waveform {
            Waveform::Sine => (0.5 * (1.0 + (cycles * std::f64::consts::TAU).sin())),
            Waveform::Square => {
                if cycles.fract().abs() < 0.5 {
                    1.0
                } else {
                    0.0
                }
            }
            Waveform::Triangle => {
                let frac = cycles.rem_euclid(1.0);
                1.0 - (2.0 * frac - 1.0).abs()
            }
            Waveform::Saw => cycles.rem_euclid(1.0),
            Waveform::RandomHold => {
                let cycle = cycles.floor() as i64;
                if cycle != self.held_cycle {
                    self.held_cycle = cycle;
                    self.held_value = rand::thread_rng().gen_range(0.0..1.0);
                }
                self.held_value
            }
        };
        self.min + unit.clamp(0.0, 1.0) * (self.max - self.min)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sine_stays_within_bounds() {
        let mut lfo = LfoSequence::new(Waveform::Sine, 1.0, 0.0, 10.0, 20.0);
        for i in 0..100 {
            let v = lfo.value(i as f64 * 0.01);
            assert!((10.0..=20.0).contains(&v), "{}", v);
        }
    }

    #[test]
    fn square_is_bimodal() {
        let mut lfo = LfoSequence::new(Waveform::Square, 1.0, 0.0, 0.0, 1.0);
        let a = lfo.value(0.1);
        let b = lfo.value(0.6);
        assert_eq!(a, 1.0);
        assert_eq!(b, 0.0);
    }

    #[test]
    fn saw_ramps_linearly_within_a_cycle() {
        let mut lfo = LfoSequence::new(Waveform::Saw, 1.0, 0.0, 0.0, 1.0);
        assert!((lfo.value(0.25) - 0.25).abs() < 1e-9);
        assert!((lfo.value(0.75) - 0.75).abs() < 1e-9);
    }

    #[test]
    fn random_hold_is_stable_within_a_cycle() {
        let mut lfo = LfoSequence::new(Waveform::RandomHold, 1.0, 0.0, 0.0, 1.0);
        let a = lfo.value(0.1);
        let b = lfo.value(0.2);
        assert_eq!(a, b);
    }
}
