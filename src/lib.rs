//! Tick-synchronized marketplace authorities.
//!
//! Three services consume one totally-ordered message log and each derive
//! their own state from it:
//!
//! ```text
//!                 ┌──────────────┐
//!   agents ──────►│  MessageBus  │──────► journal (jsonl)
//!                 │  (ordered)   │
//!                 └──────┬───────┘
//!          ┌─────────────┼──────────────┐
//!          ▼             ▼              ▼
//!   ┌────────────┐ ┌────────────┐ ┌──────────────┐
//!   │  Governor  │ │   Banker   │ │ World Engine │
//!   │ (verdicts) │ │  (ledger)  │ │ (tick/spawn) │
//!   └────────────┘ └────────────┘ └──────────────┘
//! ```
//!
//! Every service is a deterministic function of (state, next envelope); see
//! [`service::Service`].

pub mod banker;
pub mod bus;
pub mod catalogue;
pub mod config;
pub mod error;
pub mod governor;
pub mod journal;
pub mod logging;
pub mod protocol;
pub mod service;
pub mod storage;
pub mod verify;
pub mod world;
