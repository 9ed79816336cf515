//! Judgment calls for the World Engine.
//!
//! The engine asks a provider once per tick how much of each raw material
//! to spawn. Validation and settlement never consult a provider.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub trait DecisionProvider: Send {
    fn name(&self) -> &'static str;

    /// Quantities for the pool spawned at `tick`, given the base table.
    fn spawn_quantities(&mut self, tick: u64, base: &BTreeMap<String, u32>) -> BTreeMap<String, u32>;
}

/// Spawns exactly the base table.
#[derive(Debug, Clone, Copy, Default)]
pub struct Steady;

impl DecisionProvider for Steady {
    fn name(&self) -> &'static str {
        "steady"
    }

    fn spawn_quantities(&mut self, _tick: u64, base: &BTreeMap<String, u32>) -> BTreeMap<String, u32> {
        base.clone()
    }
}

/// Scales each item independently by a factor in `[1 - spread, 1 + spread]`.
/// Seeded, so a given seed always produces the same sequence of pools.
#[derive(Debug, Clone)]
pub struct Jitter {
    rng: StdRng,
    spread: f64,
}

impl Jitter {
    pub fn new(seed: u64, spread: f64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            spread: spread.clamp(0.0, 1.0),
        }
    }
}

impl DecisionProvider for Jitter {
    fn name(&self) -> &'static str {
        "jitter"
    }

    fn spawn_quantities(&mut self, _tick: u64, base: &BTreeMap<String, u32>) -> BTreeMap<String, u32> {
        if self.spread <= 0.0 {
            return base.clone();
        }
        base.iter()
            .map(|(item, qty)| {
                let factor = 1.0 + self.rng.gen_range(-self.spread..=self.spread);
                let scaled = (*qty as f64 * factor).round().max(0.0) as u32;
                (item.clone(), scaled)
            })
            .collect()
    }
}

/// `Steady` when `spread` is zero, otherwise a seeded `Jitter`.
pub fn from_config(seed: u64, spread: f64) -> Box<dyn DecisionProvider> {
    if spread > 0.0 {
        Box::new(Jitter::new(seed, spread))
    } else {
        Box::new(Steady)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue;

    #[test]
    fn test_steady_is_identity() {
        let base = catalogue::spawn_table();
        assert_eq!(Steady.spawn_quantities(1, &base), base);
    }

    #[test]
    fn test_jitter_bounded_and_reproducible() {
        let base = catalogue::spawn_table();
        let mut a = Jitter::new(7, 0.2);
        let mut b = Jitter::new(7, 0.2);
        for tick in 1..50 {
            let qa = a.spawn_quantities(tick, &base);
            assert_eq!(qa, b.spawn_quantities(tick, &base));
            for (item, q) in &qa {
                let q0 = base[item] as f64;
                assert!(*q as f64 >= (q0 * 0.8).floor() && *q as f64 <= (q0 * 1.2).ceil());
            }
        }
    }

    #[test]
    fn test_from_config_picks_provider() {
        assert_eq!(from_config(1, 0.0).name(), "steady");
        assert_eq!(from_config(1, 0.3).name(), "jitter");
    }
}
