//! Banker: the authoritative ledger projected from the message log.
//!
//! No escrow. Offers and bids are only recorded; funds and goods are checked
//! and moved together when an accept arrives. Failed preconditions are
//! logged and never published.

pub mod rules;
pub mod state;

pub use rules::{BankerConfig, TickReport};
pub use state::{Account, Ledger, OrderEntry, OrderSide};

use anyhow::Result;
use serde_json::json;

use crate::error::LedgerError;
use crate::logging::{
    flush_tick_summary, log, log_decode_error, log_digest, log_refusal, log_settlement, obj, v_str,
    Domain, Level,
};
use crate::protocol::messages::Message;
use crate::protocol::{Envelope, MessageType, Topics, BANKER_ID, WORLD_ID};
use crate::service::Service;
use crate::storage::LedgerStore;
use crate::verify::state_digest;

pub struct Banker {
    ledger: Ledger,
    cfg: BankerConfig,
    store: Option<LedgerStore>,
}

impl Banker {
    pub fn new(cfg: BankerConfig) -> Self {
        Self {
            ledger: Ledger::new(),
            cfg,
            store: None,
        }
    }

    /// Persist a snapshot every `snapshot_every_ticks` ticks.
    pub fn with_store(mut self, mut store: LedgerStore) -> Result<Self> {
        store.init()?;
        self.store = Some(store);
        Ok(self)
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn digest(&self) -> String {
        state_digest(&self.ledger)
    }

    pub fn store(&self) -> Option<&LedgerStore> {
        self.store.as_ref()
    }

    fn refuse(&self, envelope: &Envelope, err: &LedgerError) {
        log_refusal(&envelope.id, &envelope.from, &err.to_string());
    }

    /// Remove `agents` that ended up bankrupt after a mutation.
    fn check_bankruptcy(&mut self, agents: &[&str]) {
        for agent in rules::sweep_bankrupt(&mut self.ledger, agents) {
            log(
                Level::Warn,
                Domain::Banker,
                "bankrupt",
                obj(&[("agent", v_str(&agent)), ("tick", json!(self.ledger.current_tick))]),
            );
        }
    }

    fn on_tick(&mut self, tick: u64) {
        let report = rules::advance_tick(&mut self.ledger, tick, &self.cfg);
        if !report.expired_orders.is_empty() || !report.deactivated.is_empty() {
            log(
                Level::Info,
                Domain::Banker,
                "tick_housekeeping",
                obj(&[
                    ("tick", json!(tick)),
                    ("expired_orders", json!(report.expired_orders)),
                    ("deactivated", json!(report.deactivated)),
                    ("rent_collected", v_str(&report.rent_collected.to_string())),
                ]),
            );
        }
        for agent in &report.bankrupt {
            log(
                Level::Warn,
                Domain::Banker,
                "bankrupt",
                obj(&[("agent", v_str(agent)), ("tick", json!(tick))]),
            );
        }
        let every = self.cfg.snapshot_every_ticks;
        if every > 0 && tick % every == 0 {
            let digest = self.digest();
            log_digest(BANKER_ID, tick, &digest);
            if let Some(store) = self.store.as_mut() {
                if let Err(err) = store.persist_snapshot(tick, &self.ledger, &digest) {
                    log(
                        Level::Error,
                        Domain::Banker,
                        "snapshot_failed",
                        obj(&[("tick", json!(tick)), ("msg", v_str(&err.to_string()))]),
                    );
                }
            }
        }
        flush_tick_summary(tick);
    }

    fn apply(&mut self, envelope: &Envelope, message: Message) -> Vec<Envelope> {
        let agent = envelope.from.as_str();
        let outcome: Result<Option<Envelope>, LedgerError> = match message {
            Message::Tick(t) => {
                if agent == WORLD_ID {
                    self.on_tick(t.tick_number);
                }
                Ok(None)
            }
            Message::Join(_) => {
                if rules::open_account(&mut self.ledger, agent, &self.cfg) {
                    log(
                        Level::Info,
                        Domain::Banker,
                        "account_opened",
                        obj(&[("agent", v_str(agent)), ("wallet", v_str(&self.cfg.starting_wallet.to_string()))]),
                    );
                }
                Ok(None)
            }
            Message::Offer(o) => rules::record_order(
                &mut self.ledger,
                &envelope.id,
                agent,
                OrderSide::Offer,
                &o.item,
                o.quantity,
                o.price_per_unit,
                o.expires_tick,
            )
            .map(|_| None),
            Message::Bid(b) => rules::record_order(
                &mut self.ledger,
                &envelope.id,
                agent,
                OrderSide::Bid,
                &b.item,
                b.quantity,
                b.max_price_per_unit,
                None,
            )
            .map(|_| None),
            Message::Accept(a) => rules::settle(&mut self.ledger, &envelope.id, agent, &a).map(|s| {
                log_settlement(
                    &envelope.id,
                    &s.buyer,
                    &s.seller,
                    &s.item,
                    s.quantity,
                    &s.total_price.to_string(),
                );
                let (buyer, seller) = (s.buyer.clone(), s.seller.clone());
                let out = Envelope::new(
                    BANKER_ID,
                    Topics::BANK,
                    self.ledger.current_tick,
                    &Message::Settlement(s),
                );
                self.check_bankruptcy(&[&buyer, &seller]);
                Some(out)
            }),
            Message::CraftStart(c) => rules::start_craft(&mut self.ledger, agent, &c.recipe).map(|_| None),
            Message::CraftComplete(c) => rules::complete_craft(&mut self.ledger, agent, &c.recipe).map(|_| {
                self.check_bankruptcy(&[agent]);
                None
            }),
            Message::Heartbeat(_) => rules::record_heartbeat(&mut self.ledger, agent).map(|_| None),
            Message::GatherResult(g) => {
                if agent != WORLD_ID {
                    Err(LedgerError::UntrustedSource(agent.to_string()))
                } else {
                    rules::credit_gather(&mut self.ledger, &g, &self.cfg).map(|_| None)
                }
            }
            // Counters carry no settlement path.
            Message::Counter(_) => Ok(None),
            Message::Spawn(_) | Message::Gather(_) | Message::Settlement(_) | Message::ValidationResult(_) => {
                Ok(None)
            }
        };
        match outcome {
            Ok(out) => out.into_iter().collect(),
            Err(err) => {
                self.refuse(envelope, &err);
                vec![]
            }
        }
    }
}

impl Default for Banker {
    fn default() -> Self {
        Self::new(BankerConfig::default())
    }
}

impl Service for Banker {
    fn agent_id(&self) -> &str {
        BANKER_ID
    }

    fn subscriptions(&self) -> Vec<String> {
        vec![
            Topics::MARKET_WILDCARD.to_string(),
            Topics::TICK.to_string(),
            "/world/>".to_string(),
        ]
    }

    fn handle(&mut self, envelope: &Envelope) -> Vec<Envelope> {
        if envelope.from == BANKER_ID {
            return vec![];
        }
        if matches!(
            envelope.kind,
            MessageType::Spawn | MessageType::Gather | MessageType::Settlement | MessageType::ValidationResult
        ) {
            return vec![];
        }
        if !self.ledger.processed.insert(envelope.id.clone()) {
            return vec![];
        }
        match envelope.decode() {
            Ok(message) => self.apply(envelope, message),
            Err(err) => {
                log_decode_error(&envelope.id, &envelope.from, &err.to_string());
                vec![]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::messages::{Accept, Bid, Counter, GatherResult, Join, Offer, Settlement, Tick};
    use rust_decimal::Decimal;

    fn env(from: &str, topic: &str, msg: Message) -> Envelope {
        Envelope::new(from, topic, 0, &msg)
    }

    fn join(agent: &str) -> Envelope {
        env(
            agent,
            Topics::SQUARE,
            Message::Join(Join {
                agent_id: agent.into(),
                name: agent.into(),
                description: String::new(),
                api_url: None,
            }),
        )
    }

    fn gathered(agent: &str, item: &str, qty: u32) -> Envelope {
        env(
            WORLD_ID,
            Topics::NATURE,
            Message::GatherResult(GatherResult {
                reference_msg_id: None,
                agent_id: agent.into(),
                spawn_id: "s".into(),
                item: item.into(),
                quantity: qty,
                success: true,
                reason: None,
            }),
        )
    }

    #[test]
    fn test_offer_accept_publishes_settlement() {
        let mut b = Banker::default();
        b.handle(&join("farmer-01"));
        b.handle(&join("chef-01"));
        b.handle(&gathered("farmer-01", "onion", 5));
        let offer = env(
            "farmer-01",
            Topics::RAW_GOODS,
            Message::Offer(Offer {
                item: "onion".into(),
                quantity: 5,
                price_per_unit: Decimal::new(25, 1),
                expires_tick: None,
            }),
        );
        assert!(b.handle(&offer).is_empty());
        let accept = env(
            "chef-01",
            Topics::RAW_GOODS,
            Message::Accept(Accept { reference_msg_id: offer.id.clone(), quantity: 2 }),
        );
        let out = b.handle(&accept);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].topic, Topics::BANK);
        let s: Settlement = match out[0].decode().unwrap() {
            Message::Settlement(s) => s,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(s.reference_msg_id, accept.id);
        assert_eq!(s.total_price, Decimal::from(5));
        assert_eq!(b.ledger().wallet("chef-01"), Some(Decimal::from(95)));

        // redelivered accept is not applied twice
        assert!(b.handle(&accept).is_empty());
        assert_eq!(b.ledger().holding("chef-01", "onion"), 2);
    }

    #[test]
    fn test_counter_and_untrusted_gather_ignored() {
        let mut b = Banker::default();
        b.handle(&join("a"));
        let before = b.ledger().accounts.clone();
        let counter = env(
            "a",
            Topics::RAW_GOODS,
            Message::Counter(Counter {
                reference_msg_id: "x".into(),
                proposed_price: Decimal::ONE,
                quantity: 1,
            }),
        );
        assert!(b.handle(&counter).is_empty());
        let mut forged = gathered("a", "stone", 50);
        forged.from = "a".into();
        b.handle(&forged);
        assert_eq!(b.ledger().accounts, before);
    }

    #[test]
    fn test_rent_bankruptcy_removes_account_and_orders() {
        let mut b = Banker::new(BankerConfig {
            starting_wallet: Decimal::from(3),
            rent_per_tick: Some(Decimal::from(2)),
            ..BankerConfig::default()
        });
        b.handle(&join("poor"));
        b.handle(&join("rich"));
        b.handle(&gathered("rich", "wood", 1));
        let bid = env(
            "poor",
            Topics::RAW_GOODS,
            Message::Bid(Bid {
                item: "wood".into(),
                quantity: 1,
                max_price_per_unit: Decimal::ONE,
                target_agent: None,
            }),
        );
        b.handle(&bid);
        assert_eq!(b.ledger().orders.len(), 1);
        for n in 1..=2 {
            b.handle(&env(WORLD_ID, Topics::TICK, Message::Tick(Tick { tick_number: n, timestamp: 0.0 })));
        }
        assert!(!b.ledger().has_account("poor"));
        assert!(b.ledger().orders.is_empty());
        // holds wood, so survives with an empty wallet
        assert!(b.ledger().has_account("rich"));
        assert_eq!(b.ledger().wallet("rich"), Some(Decimal::ZERO));

        // the world may still grant a removed agent; nothing is credited
        assert!(b.handle(&gathered("poor", "wood", 3)).is_empty());
        assert!(!b.ledger().has_account("poor"));
        b.handle(&join("poor"));
        assert_eq!(b.ledger().wallet("poor"), Some(Decimal::from(3)));
    }

    #[test]
    fn test_out_of_range_total_refused_without_settlement() {
        let mut b = Banker::default();
        b.handle(&join("farmer-01"));
        b.handle(&join("chef-01"));
        b.handle(&gathered("farmer-01", "onion", 5));
        let offer = env(
            "farmer-01",
            Topics::RAW_GOODS,
            Message::Offer(Offer {
                item: "onion".into(),
                quantity: 5,
                price_per_unit: Decimal::from_i128_with_scale(50_000_000_000_000_000_000_000_000_000, 0),
                expires_tick: None,
            }),
        );
        b.handle(&offer);
        let before = b.ledger().accounts.clone();
        let accept = env(
            "chef-01",
            Topics::RAW_GOODS,
            Message::Accept(Accept { reference_msg_id: offer.id.clone(), quantity: 2 }),
        );
        assert!(b.handle(&accept).is_empty());
        assert_eq!(b.ledger().accounts, before);
        assert_eq!(b.ledger().orders[&offer.id].remaining, 5);
    }

    #[test]
    fn test_snapshot_written_on_schedule() {
        let mut b = Banker::new(BankerConfig {
            snapshot_every_ticks: 2,
            ..BankerConfig::default()
        })
        .with_store(LedgerStore::in_memory().unwrap())
        .unwrap();
        b.handle(&join("a"));
        for n in 1..=3 {
            b.handle(&env(WORLD_ID, Topics::TICK, Message::Tick(Tick { tick_number: n, timestamp: 0.0 })));
        }
        let store = b.store().unwrap();
        assert_eq!(store.latest_tick().unwrap(), Some(2));
        assert_eq!(store.load_accounts(2).unwrap()[0].wallet, Decimal::from(100));
    }
}
