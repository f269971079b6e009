//! Single injected source for every probabilistic fault decision.
//!
//! All per-packet randomness (drop, burst trigger, malform, latency spike,
//! disconnect, command ignore, interval jitter) draws from one
//! `DecisionSource`, so tests can substitute a scripted sequence and assert
//! exact outcomes.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;

pub trait DecisionSource: Send {
    /// Uniform draw in `[0, 1)`.
    fn roll(&mut self) -> f64;

    /// Uniform integer draw in `[-spread_ms, spread_ms]`.
    fn jitter(&mut self, spread_ms: u64) -> i64;

    /// True with the given probability, expressed in percent `[0, 100]`.
    fn chance(&mut self, percent: f64) -> bool {
        percent > 0.0 && self.roll() * 100.0 < percent
    }
}

/// Production source backed by a seedable RNG.
pub struct RngSource {
    rng: StdRng,
}

impl RngSource {
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl DecisionSource for RngSource {
    fn roll(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    fn jitter(&mut self, spread_ms: u64) -> i64 {
        if spread_ms == 0 {
            return 0;
        }
        let spread = spread_ms as i64;
        self.rng.gen_range(-spread..=spread)
    }
}

/// Deterministic source for tests: replays queued rolls, then reports
/// "never triggers" (roll 1.0, jitter 0) once the script runs dry.
pub struct ScriptedSource {
    rolls: VecDeque<f64>,
    jitters: VecDeque<i64>,
}

impl ScriptedSource {
    pub fn new(rolls: impl IntoIterator<Item = f64>) -> Self {
        Self {
            rolls: rolls.into_iter().collect(),
            jitters: VecDeque::new(),
        }
    }

    pub fn with_jitters(mut self, jitters: impl IntoIterator<Item = i64>) -> Self {
        self.jitters = jitters.into_iter().collect();
        self
    }
}

impl DecisionSource for ScriptedSource {
    fn roll(&mut self) -> f64 {
        self.rolls.pop_front().unwrap_or(1.0)
    }

    fn jitter(&mut self, _spread_ms: u64) -> i64 {
        self.jitters.pop_front().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chance_boundaries() {
        let mut dice = ScriptedSource::new([0.0, 0.999]);
        assert!(dice.chance(100.0));
        assert!(!dice.chance(50.0));
        // Zero percent never triggers, regardless of the roll.
        let mut dice = ScriptedSource::new([0.0]);
        assert!(!dice.chance(0.0));
    }

    #[test]
    fn test_scripted_exhaustion_is_quiet() {
        let mut dice = ScriptedSource::new([]);
        assert!(!dice.chance(99.9));
        assert_eq!(dice.jitter(10), 0);
    }

    #[test]
    fn test_seeded_source_is_reproducible() {
        let mut a = RngSource::seeded(7);
        let mut b = RngSource::seeded(7);
        for _ in 0..100 {
            assert_eq!(a.roll().to_bits(), b.roll().to_bits());
        }
    }

    #[test]
    fn test_jitter_within_spread() {
        let mut dice = RngSource::seeded(42);
        for _ in 0..1000 {
            let j = dice.jitter(8);
            assert!((-8..=8).contains(&j));
        }
    }
}
