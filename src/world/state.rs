use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::catalogue;

/// Raw goods available for one tick only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnPool {
    pub spawn_id: String,
    pub tick: u64,
    pub generated: BTreeMap<String, u32>,
    pub remaining: BTreeMap<String, u32>,
}

impl SpawnPool {
    pub fn new(spawn_id: String, tick: u64, items: BTreeMap<String, u32>) -> Self {
        Self {
            spawn_id,
            tick,
            remaining: items.clone(),
            generated: items,
        }
    }

    pub fn remaining(&self, item: &str) -> u32 {
        self.remaining.get(item).copied().unwrap_or(0)
    }

    /// Take up to `want` of `item`. Returns what was actually taken.
    pub fn take(&mut self, item: &str, want: u32) -> u32 {
        match self.remaining.get_mut(item) {
            Some(left) => {
                let granted = want.min(*left);
                *left -= granted;
                granted
            }
            None => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldState {
    pub current_tick: u64,
    /// The only pool gathers may draw from; replaced on every tick
    pub active: Option<SpawnPool>,
    pub spawn_table: BTreeMap<String, u32>,
    /// Gather ids resolved against the active pool
    pub claims: BTreeSet<String>,
}

impl WorldState {
    pub fn new(spawn_table: BTreeMap<String, u32>) -> Self {
        Self {
            current_tick: 0,
            active: None,
            spawn_table,
            claims: BTreeSet::new(),
        }
    }
}

impl Default for WorldState {
    fn default() -> Self {
        Self::new(catalogue::spawn_table())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_caps_at_remaining() {
        let mut pool = SpawnPool::new("s".into(), 1, BTreeMap::from([("wood".to_string(), 8)]));
        assert_eq!(pool.take("wood", 5), 5);
        assert_eq!(pool.take("wood", 5), 3);
        assert_eq!(pool.take("wood", 5), 0);
        assert_eq!(pool.take("gold", 1), 0);
        assert_eq!(pool.generated["wood"], 8);
    }
}
