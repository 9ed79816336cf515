use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::json;
use tokio::sync::watch;

use streetmarket::banker::Banker;
use streetmarket::bus::MessageBus;
use streetmarket::config::Config;
use streetmarket::governor::Governor;
use streetmarket::journal::Journal;
use streetmarket::logging::{log, log_digest, obj, v_str, Domain, Level};
use streetmarket::service::{run_service, Service};
use streetmarket::storage::LedgerStore;
use streetmarket::verify::assert_ledger_invariants;
use streetmarket::world::{decision, run_world, WorldEngine};

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env();
    log(
        Level::Info,
        Domain::System,
        "startup",
        obj(&[
            ("tick_interval_ms", json!(cfg.tick_interval_ms)),
            ("max_actions_per_tick", json!(cfg.max_actions_per_tick)),
            ("heartbeat_timeout_ticks", json!(cfg.heartbeat_timeout_ticks)),
            ("starting_wallet", json!(cfg.starting_wallet)),
            ("charge_rent", json!(cfg.charge_rent)),
            ("max_inventory", json!(cfg.max_inventory)),
            ("spawn_jitter", json!(cfg.spawn_jitter)),
            ("journal", json!(cfg.journal_path)),
            ("sqlite", json!(cfg.sqlite_path)),
            ("max_ticks", json!(cfg.max_ticks)),
        ]),
    );

    let journal = match &cfg.journal_path {
        Some(path) => Some(Journal::open(path)?),
        None => None,
    };
    let bus = Arc::new(MessageBus::new(cfg.bus_capacity, journal));

    let governor = Governor::new(cfg.governor_limits());
    let mut banker = Banker::new(cfg.banker_config());
    if let Some(path) = &cfg.sqlite_path {
        banker = banker.with_store(LedgerStore::open(path).with_context(|| format!("open {}", path))?)?;
    }
    let world = WorldEngine::new(decision::from_config(cfg.spawn_seed, cfg.spawn_jitter));

    // Subscribe everyone before the clock starts so no tick is missed.
    let gov_sub = bus.subscribe(&governor.subscriptions());
    let bank_sub = bus.subscribe(&banker.subscriptions());
    let world_sub = bus.subscribe(&world.subscriptions());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let gov_task = tokio::spawn(run_service(governor, bus.clone(), gov_sub, shutdown_rx.clone()));
    let bank_task = tokio::spawn(run_service(banker, bus.clone(), bank_sub, shutdown_rx.clone()));
    let mut world_task = tokio::spawn(run_world(
        world,
        bus.clone(),
        world_sub,
        shutdown_rx,
        Duration::from_millis(cfg.tick_interval_ms.max(1)),
        cfg.max_ticks,
    ));

    let world_result = tokio::select! {
        res = &mut world_task => Some(res),
        _ = tokio::signal::ctrl_c() => {
            log(Level::Info, Domain::System, "signal", obj(&[("msg", v_str("ctrl-c received"))]));
            None
        }
    };
    let _ = shutdown_tx.send(true);

    let world = match world_result {
        Some(res) => res,
        None => world_task.await,
    }
    .context("world task panicked")??;
    let governor = gov_task.await.context("governor task panicked")??;
    let banker = bank_task.await.context("banker task panicked")??;

    let tick = world.state().current_tick;
    log_digest("governor", tick, &governor.digest());
    log_digest("banker", tick, &banker.digest());
    if let Err(violation) = assert_ledger_invariants(banker.ledger()) {
        log(
            Level::Error,
            Domain::Audit,
            "invariant_violation",
            obj(&[("msg", v_str(&violation.msg))]),
        );
    }
    log(
        Level::Info,
        Domain::System,
        "shutdown",
        obj(&[
            ("tick", json!(tick)),
            ("accounts", json!(banker.ledger().accounts.len())),
            ("open_orders", json!(banker.ledger().orders.len())),
        ]),
    );
    Ok(())
}
