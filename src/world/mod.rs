//! World Engine: the tick clock and the per-tick spawn pool.

pub mod decision;
pub mod rules;
pub mod state;

pub use decision::{DecisionProvider, Jitter, Steady};
pub use state::{SpawnPool, WorldState};

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::watch;

use crate::bus::{MessageBus, Subscription};
use crate::logging::{log, log_decode_error, log_gather, log_tick, obj, v_str, Domain, Level};
use crate::protocol::envelope::now_secs;
use crate::protocol::messages::{Message, Spawn, Tick};
use crate::protocol::{Envelope, Topics, WORLD_ID};
use crate::service::Service;

pub struct WorldEngine {
    state: WorldState,
    provider: Box<dyn DecisionProvider>,
}

impl WorldEngine {
    pub fn new(provider: Box<dyn DecisionProvider>) -> Self {
        Self {
            state: WorldState::default(),
            provider,
        }
    }

    pub fn state(&self) -> &WorldState {
        &self.state
    }

    /// Advance one tick: a fresh pool, then the tick and spawn broadcasts in
    /// that order.
    pub fn tick(&mut self) -> Vec<Envelope> {
        let tick = self.state.current_tick + 1;
        let items = self.provider.spawn_quantities(tick, &self.state.spawn_table);
        let spawn_id = uuid::Uuid::new_v4().to_string();
        let pool = rules::begin_tick(&mut self.state, tick, spawn_id, items).clone();

        let spawned: Vec<(&str, u32)> = pool.generated.iter().map(|(k, v)| (k.as_str(), *v)).collect();
        log_tick(tick, &pool.spawn_id, &spawned);

        let tick_msg = Message::Tick(Tick {
            tick_number: tick,
            timestamp: now_secs(),
        });
        let spawn_msg = Message::Spawn(Spawn {
            spawn_id: pool.spawn_id,
            tick,
            items: pool.generated,
        });
        vec![
            Envelope::new(WORLD_ID, Topics::TICK, tick, &tick_msg),
            Envelope::new(WORLD_ID, Topics::NATURE, tick, &spawn_msg),
        ]
    }
}

impl Default for WorldEngine {
    fn default() -> Self {
        Self::new(Box::new(Steady))
    }
}

impl Service for WorldEngine {
    fn agent_id(&self) -> &str {
        WORLD_ID
    }

    fn subscriptions(&self) -> Vec<String> {
        vec![Topics::NATURE.to_string()]
    }

    fn handle(&mut self, envelope: &Envelope) -> Vec<Envelope> {
        if envelope.from == WORLD_ID {
            return vec![];
        }
        let gather = match envelope.decode() {
            Ok(Message::Gather(g)) => g,
            Ok(_) => return vec![],
            Err(err) => {
                log_decode_error(&envelope.id, &envelope.from, &err.to_string());
                return vec![];
            }
        };
        if !self.state.claims.insert(envelope.id.clone()) {
            return vec![];
        }
        let result = rules::resolve_gather(&mut self.state, &envelope.id, &envelope.from, &gather);
        log_gather(
            &envelope.from,
            &gather.item,
            gather.quantity,
            result.quantity,
            result.reason.as_deref(),
        );
        vec![Envelope::new(
            WORLD_ID,
            Topics::NATURE,
            self.state.current_tick,
            &Message::GatherResult(result),
        )]
    }
}

/// Clock plus gather handling on one task, so pool state is never shared.
/// Stops after `max_ticks` ticks when non-zero, or on shutdown.
pub async fn run_world(
    mut engine: WorldEngine,
    bus: Arc<MessageBus>,
    mut sub: Subscription,
    mut shutdown: watch::Receiver<bool>,
    interval: Duration,
    max_ticks: u64,
) -> Result<WorldEngine> {
    log(
        Level::Info,
        Domain::World,
        "clock_start",
        obj(&[
            ("interval_ms", serde_json::json!(interval.as_millis() as u64)),
            ("provider", v_str(engine.provider.name())),
        ]),
    );
    let mut clock = tokio::time::interval(interval);
    clock.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = clock.tick() => {
                if max_ticks > 0 && engine.state.current_tick >= max_ticks {
                    break;
                }
                bus.publish_all(engine.tick())?;
            }
            next = sub.recv() => {
                let msg = next.map_err(|e| anyhow::Error::new(e).context("world lost the message log"))?;
                bus.publish_all(engine.handle(&msg.envelope))?;
            }
        }
    }
    log(
        Level::Info,
        Domain::World,
        "clock_stop",
        obj(&[("tick", serde_json::json!(engine.state.current_tick))]),
    );
    Ok(engine)
}
