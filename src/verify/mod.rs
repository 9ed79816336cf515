pub mod invariants;

pub use invariants::{
    assert_ledger_invariants, assert_order_progress, assert_pool_invariants, state_digest,
    InvariantViolation,
};
