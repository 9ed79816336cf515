use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::catalogue;
use crate::protocol::MessageType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernorLimits {
    pub max_actions_per_tick: u32,
    pub heartbeat_timeout_ticks: u64,
}

impl Default for GovernorLimits {
    fn default() -> Self {
        Self {
            max_actions_per_tick: catalogue::MAX_ACTIONS_PER_TICK,
            heartbeat_timeout_ticks: catalogue::HEARTBEAT_TIMEOUT_TICKS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveCraft {
    pub recipe: String,
    pub started_tick: u64,
    pub duration: u64,
}

/// Everything the Governor knows. `actions_this_tick` is tick-scoped; the
/// rest persists for the run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernorState {
    pub current_tick: u64,
    pub actions_this_tick: BTreeMap<String, u32>,
    pub last_heartbeat: BTreeMap<String, u64>,
    pub active_crafts: BTreeMap<String, ActiveCraft>,
    /// Every envelope id judged so far, with its type
    pub seen: BTreeMap<String, MessageType>,
    pub limits: GovernorLimits,
}

impl GovernorState {
    pub fn new(limits: GovernorLimits) -> Self {
        Self {
            limits,
            ..Self::default()
        }
    }

    pub fn advance_tick(&mut self, tick: u64) {
        self.current_tick = tick;
        self.actions_this_tick.clear();
    }

    pub fn action_count(&self, agent: &str) -> u32 {
        self.actions_this_tick.get(agent).copied().unwrap_or(0)
    }

    pub fn record_action(&mut self, agent: &str) {
        *self.actions_this_tick.entry(agent.to_string()).or_insert(0) += 1;
    }

    pub fn record_heartbeat(&mut self, agent: &str) {
        self.last_heartbeat.insert(agent.to_string(), self.current_tick);
    }

    pub fn register(&mut self, agent: &str) {
        self.record_heartbeat(agent);
    }

    /// Last-seen tick, if the agent has gone silent past the timeout. Agents
    /// never seen are not considered inactive.
    pub fn inactive_since(&self, agent: &str) -> Option<u64> {
        let last = *self.last_heartbeat.get(agent)?;
        let silent = self.current_tick.saturating_sub(last);
        (silent > self.limits.heartbeat_timeout_ticks).then_some(last)
    }

    pub fn is_offer_or_bid(&self, msg_id: &str) -> bool {
        matches!(
            self.seen.get(msg_id),
            Some(MessageType::Offer) | Some(MessageType::Bid)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_reset_on_tick() {
        let mut s = GovernorState::new(GovernorLimits::default());
        s.record_action("a");
        s.record_action("a");
        assert_eq!(s.action_count("a"), 2);
        s.advance_tick(1);
        assert_eq!(s.action_count("a"), 0);
    }

    #[test]
    fn test_inactivity_threshold() {
        let mut s = GovernorState::new(GovernorLimits::default());
        assert_eq!(s.inactive_since("ghost"), None);
        s.advance_tick(3);
        s.record_heartbeat("a");
        s.advance_tick(13);
        assert_eq!(s.inactive_since("a"), None);
        s.advance_tick(14);
        assert_eq!(s.inactive_since("a"), Some(3));
    }
}
