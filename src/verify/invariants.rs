//! Properties that must hold for every reachable state, checked by tests
//! and by the replay tool.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::banker::state::{Ledger, OrderEntry};
use crate::world::state::SpawnPool;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{msg}")]
pub struct InvariantViolation {
    pub msg: String,
}

fn violation(msg: String) -> InvariantViolation {
    InvariantViolation { msg }
}

/// SHA-256 over the serde_json encoding. Deterministic as long as `T` only
/// holds ordered collections.
pub fn state_digest<T: Serialize>(state: &T) -> String {
    let bytes = serde_json::to_vec(state).unwrap_or_default();
    hex::encode(Sha256::digest(&bytes))
}

pub fn assert_ledger_invariants(ledger: &Ledger) -> Result<(), InvariantViolation> {
    for (agent, account) in &ledger.accounts {
        if account.wallet < Decimal::ZERO {
            return Err(violation(format!("{} wallet negative: {}", agent, account.wallet)));
        }
        if let Some((item, _)) = account.inventory.iter().find(|(_, q)| **q == 0) {
            return Err(violation(format!("{} holds an empty {} entry", agent, item)));
        }
    }
    for order in ledger.orders.values() {
        if order.remaining == 0 {
            return Err(violation(format!("order {} kept after full fill", order.msg_id)));
        }
        if order.remaining > order.original_quantity {
            return Err(violation(format!("order {} grew past its original size", order.msg_id)));
        }
    }
    for agent in ledger.crafts.keys() {
        if !ledger.accounts.contains_key(agent) {
            return Err(violation(format!("craft job for unknown account {}", agent)));
        }
    }
    Ok(())
}

/// Remaining quantities only move down between two states of one order book.
pub fn assert_order_progress(
    before: &BTreeMap<String, OrderEntry>,
    after: &BTreeMap<String, OrderEntry>,
) -> Result<(), InvariantViolation> {
    for (id, order) in after {
        if let Some(prev) = before.get(id) {
            if order.remaining > prev.remaining {
                return Err(violation(format!(
                    "order {} remaining rose from {} to {}",
                    id, prev.remaining, order.remaining
                )));
            }
        }
    }
    Ok(())
}

pub fn assert_pool_invariants(pool: &SpawnPool) -> Result<(), InvariantViolation> {
    for (item, remaining) in &pool.remaining {
        let generated = pool.generated.get(item).copied().unwrap_or(0);
        if *remaining > generated {
            return Err(violation(format!(
                "pool {} has {} {} left of {} generated",
                pool.spawn_id, remaining, item, generated
            )));
        }
    }
    Ok(())
}
