//! Tick boundaries and first-come-first-served gather resolution.

use std::collections::BTreeMap;

use super::state::{SpawnPool, WorldState};
use crate::error::GatherError;
use crate::protocol::messages::{Gather, GatherResult};

/// Replace the pool. Whatever was left of the previous one is gone.
pub fn begin_tick(state: &mut WorldState, tick: u64, spawn_id: String, items: BTreeMap<String, u32>) -> &SpawnPool {
    state.current_tick = tick;
    state.claims.clear();
    state.active.insert(SpawnPool::new(spawn_id, tick, items))
}

/// Grant up to the requested quantity from the active pool.
pub fn try_gather(state: &mut WorldState, gather: &Gather) -> Result<u32, GatherError> {
    if gather.quantity == 0 {
        return Err(GatherError::InvalidQuantity);
    }
    let pool = state.active.as_mut().ok_or(GatherError::NoActiveSpawn)?;
    if pool.spawn_id != gather.spawn_id {
        return Err(GatherError::StaleSpawn {
            requested: gather.spawn_id.clone(),
        });
    }
    match pool.take(&gather.item, gather.quantity) {
        0 => Err(GatherError::Exhausted(gather.item.clone())),
        granted => Ok(granted),
    }
}

/// The published outcome of one claim. A partial grant still succeeds; a
/// refusal is a zero-quantity unsuccessful result.
pub fn resolve_gather(state: &mut WorldState, msg_id: &str, agent: &str, gather: &Gather) -> GatherResult {
    let outcome = try_gather(state, gather);
    let (quantity, reason) = match &outcome {
        Ok(granted) if *granted < gather.quantity => (
            *granted,
            Some(format!("Partial: only {} remaining", granted)),
        ),
        Ok(granted) => (*granted, None),
        Err(err) => (0, Some(err.to_string())),
    };
    GatherResult {
        reference_msg_id: Some(msg_id.to_string()),
        agent_id: agent.to_string(),
        spawn_id: gather.spawn_id.clone(),
        item: gather.item.clone(),
        quantity,
        success: quantity > 0,
        reason,
    }
}
