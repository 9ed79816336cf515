//! Error taxonomy. Everything here is recovered locally by the owning
//! service; only transport loss ([`BusError`]) ends a service loop.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::protocol::messages::MessageType;

/// Envelope or payload could not be decoded.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("'{0}' must not be empty")]
    EmptyField(&'static str),

    #[error("payload for {kind} does not match schema: {detail}")]
    Schema { kind: MessageType, detail: String },
}

/// Reasons the Governor rejects a message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectReason {
    #[error("{0}")]
    Structural(String),

    #[error("unknown item '{0}'")]
    UnknownItem(String),

    #[error("unknown recipe '{0}'")]
    UnknownRecipe(String),

    #[error("agent '{agent}' exceeded {limit} actions this tick")]
    RateLimitExceeded { agent: String, limit: u32 },

    #[error("referenced message '{0}' not found")]
    ReferenceNotFound(String),

    #[error("agent '{agent}' is already crafting '{recipe}'")]
    DuplicateCraft { agent: String, recipe: String },

    #[error("inputs for '{recipe}' do not match the recipe")]
    InputsMismatch { recipe: String },

    #[error("estimated ticks for '{recipe}': expected {expected}, got {got}")]
    DurationMismatch { recipe: String, expected: u64, got: u64 },

    #[error("agent '{agent}' has no active craft for '{recipe}'")]
    NoActiveCraft { agent: String, recipe: String },

    #[error("craft '{recipe}' not ready: {remaining} tick(s) remaining")]
    CraftNotReady { recipe: String, remaining: u64 },

    #[error("agent '{agent}' is inactive (last heartbeat at tick {last_seen})")]
    AgentInactive { agent: String, last_seen: u64 },
}

impl RejectReason {
    /// Stable reason code carried in validation results.
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::Structural(_) => "structural_error",
            RejectReason::UnknownItem(_) | RejectReason::UnknownRecipe(_) => "catalogue_violation",
            RejectReason::RateLimitExceeded { .. } => "rate_limit_exceeded",
            RejectReason::ReferenceNotFound(_) | RejectReason::NoActiveCraft { .. } => {
                "reference_not_found"
            }
            RejectReason::DuplicateCraft { .. } => "duplicate_craft",
            RejectReason::InputsMismatch { .. } | RejectReason::DurationMismatch { .. } => {
                "recipe_mismatch"
            }
            RejectReason::CraftNotReady { .. } => "craft_not_ready",
            RejectReason::AgentInactive { .. } => "agent_inactive",
        }
    }
}

impl From<ProtocolError> for RejectReason {
    fn from(err: ProtocolError) -> Self {
        RejectReason::Structural(err.to_string())
    }
}

/// Banker-side precondition failures. Logged, never published.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("no account for agent '{0}'")]
    NoAccount(String),

    #[error("order '{0}' not found in book")]
    OrderNotFound(String),

    #[error("order '{order_id}' expired at tick {expires_tick}")]
    OrderExpired { order_id: String, expires_tick: u64 },

    #[error("self-trade by '{0}' not allowed")]
    SelfTrade(String),

    #[error("quantity must be positive")]
    InvalidQuantity,

    #[error("amount out of range for '{0}'")]
    Overflow(String),

    #[error("agent '{0}' was removed as bankrupt")]
    Retired(String),

    #[error("'{agent}' has insufficient funds: needs {needed}, has {available}")]
    InsufficientFunds {
        agent: String,
        needed: Decimal,
        available: Decimal,
    },

    #[error("'{agent}' has insufficient {item}: needs {needed}, has {available}")]
    InsufficientInventory {
        agent: String,
        item: String,
        needed: u32,
        available: u32,
    },

    #[error("unknown recipe '{0}'")]
    UnknownRecipe(String),

    #[error("'{agent}' is already crafting '{recipe}'")]
    AlreadyCrafting { agent: String, recipe: String },

    #[error("'{agent}' has no active craft for '{recipe}'")]
    NoActiveCraft { agent: String, recipe: String },

    #[error("'{agent}' craft '{recipe}' not ready: {remaining} tick(s) remaining")]
    CraftNotReady {
        agent: String,
        recipe: String,
        remaining: u64,
    },

    #[error("gather result from untrusted publisher '{0}'")]
    UntrustedSource(String),
}

/// Why a gather claim was granted nothing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatherError {
    #[error("no active spawn")]
    NoActiveSpawn,

    #[error("spawn '{requested}' expired or not found")]
    StaleSpawn { requested: String },

    #[error("no {0} remaining in spawn")]
    Exhausted(String),

    #[error("quantity must be positive")]
    InvalidQuantity,
}

/// Transport failures. Fatal for the consuming service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    #[error("subscriber lagged and dropped {0} message(s)")]
    Lagged(u64),

    #[error("bus closed")]
    Closed,
}
