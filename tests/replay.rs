//! A live run on the bus, checked against an offline replay of its journal.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::sync::watch;

use streetmarket::banker::{Banker, BankerConfig};
use streetmarket::bus::{MessageBus, Subscription};
use streetmarket::governor::Governor;
use streetmarket::journal::Journal;
use streetmarket::protocol::messages::{Accept, Bid, Gather, Heartbeat, Join, Message};
use streetmarket::protocol::{Envelope, Topics};
use streetmarket::service::{run_service, Service};
use streetmarket::world::{run_world, WorldEngine};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn join(agent: &str, tick: u64) -> Envelope {
    Envelope::new(
        agent,
        Topics::SQUARE,
        tick,
        &Message::Join(Join {
            agent_id: agent.into(),
            name: agent.into(),
            description: "replay test".into(),
            api_url: None,
        }),
    )
}

/// Wait for the next message on `sub` that `pick` accepts.
async fn wait_for<T>(sub: &mut Subscription, mut pick: impl FnMut(Message) -> Option<T>) -> T {
    let found = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let msg = sub.recv().await.unwrap();
            if let Some(found) = msg.envelope.decode().ok().and_then(&mut pick) {
                return found;
            }
        }
    })
    .await;
    found.expect("timed out waiting on the bus")
}

// ---------------------------------------------------------------------------
// Live vs offline
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_live_run_matches_offline_replay() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("market.jsonl");
    let bus = Arc::new(MessageBus::new(1024, Some(Journal::open(&path).unwrap())));

    let governor = Governor::default();
    let banker = Banker::new(BankerConfig::default());
    let world = WorldEngine::default();
    let gov_sub = bus.subscribe(&governor.subscriptions());
    let bank_sub = bus.subscribe(&banker.subscriptions());
    let world_sub = bus.subscribe(&world.subscriptions());
    let mut observer = bus.subscribe(&[Topics::NATURE.to_string(), Topics::BANK.to_string()]);

    let (services_tx, services_rx) = watch::channel(false);
    let (world_tx, world_rx) = watch::channel(false);
    let gov_task = tokio::spawn(run_service(governor, bus.clone(), gov_sub, services_rx.clone()));
    let bank_task = tokio::spawn(run_service(banker, bus.clone(), bank_sub, services_rx));
    // Long interval: the whole script runs inside the first tick.
    let world_task = tokio::spawn(run_world(
        world,
        bus.clone(),
        world_sub,
        world_rx,
        Duration::from_millis(500),
        0,
    ));

    let (spawn_id, tick) = wait_for(&mut observer, |m| match m {
        Message::Spawn(s) => Some((s.spawn_id, s.tick)),
        _ => None,
    })
    .await;

    bus.publish(join("chef-01", tick)).unwrap();
    bus.publish(join("farmer-01", tick)).unwrap();
    let gather = Envelope::new(
        "farmer-01",
        Topics::NATURE,
        tick,
        &Message::Gather(Gather {
            spawn_id,
            item: "potato".into(),
            quantity: 12,
        }),
    );
    let gather_id = gather.id.clone();
    bus.publish(gather).unwrap();
    let granted = wait_for(&mut observer, |m| match m {
        Message::GatherResult(g) if g.reference_msg_id.as_deref() == Some(gather_id.as_str()) => Some(g.quantity),
        _ => None,
    })
    .await;
    assert_eq!(granted, 12);

    let bid = Envelope::new(
        "chef-01",
        Topics::RAW_GOODS,
        tick,
        &Message::Bid(Bid {
            item: "potato".into(),
            quantity: 10,
            max_price_per_unit: Decimal::from(3),
            target_agent: None,
        }),
    );
    let bid_id = bid.id.clone();
    bus.publish(bid).unwrap();
    bus.publish(Envelope::new(
        "farmer-01",
        Topics::RAW_GOODS,
        tick,
        &Message::Accept(Accept {
            reference_msg_id: bid_id,
            quantity: 10,
        }),
    ))
    .unwrap();
    bus.publish(Envelope::new(
        "chef-01",
        Topics::SQUARE,
        tick,
        &Message::Heartbeat(Heartbeat {
            agent_id: "chef-01".into(),
            wallet: Decimal::from(70),
            inventory_count: 10,
        }),
    ))
    .unwrap();

    let total = wait_for(&mut observer, |m| match m {
        Message::Settlement(s) => Some(s.total_price),
        _ => None,
    })
    .await;
    assert_eq!(total, Decimal::from(30));

    // Clock first, so nothing new reaches the log while services drain.
    world_tx.send(true).unwrap();
    world_task.await.unwrap().unwrap();
    services_tx.send(true).unwrap();
    let governor = gov_task.await.unwrap().unwrap();
    let banker = bank_task.await.unwrap().unwrap();

    assert_eq!(banker.ledger().holding("farmer-01", "potato"), 2);
    assert_eq!(banker.ledger().wallet("chef-01"), Some(Decimal::from(70)));

    let log = Journal::read_envelopes(&path).unwrap();
    assert!(!log.is_empty());
    let mut offline_gov = Governor::default();
    let mut offline_bank = Banker::new(BankerConfig::default());
    for env in &log {
        offline_gov.handle(env);
        offline_bank.handle(env);
    }
    assert_eq!(offline_gov.digest(), governor.digest());
    assert_eq!(offline_bank.digest(), banker.digest());
}

#[test]
fn test_replay_twice_agrees() {
    let mut log = vec![join("a1", 0), join("a2", 0)];
    let bid = Envelope::new(
        "a1",
        Topics::FOOD,
        0,
        &Message::Bid(Bid {
            item: "soup".into(),
            quantity: 1,
            max_price_per_unit: Decimal::new(95, 1),
            target_agent: Some("a2".into()),
        }),
    );
    log.push(Envelope::new(
        "a2",
        Topics::FOOD,
        0,
        &Message::Accept(Accept {
            reference_msg_id: bid.id.clone(),
            quantity: 1,
        }),
    ));
    log.insert(2, bid);

    let digests = |log: &[Envelope]| {
        let mut g = Governor::default();
        let mut b = Banker::new(BankerConfig::default());
        for env in log {
            g.handle(env);
            b.handle(env);
        }
        (g.digest(), b.digest(), b.ledger().orders.len())
    };
    let first = digests(&log);
    let second = digests(&log);
    assert_eq!(first, second);
    // a2 holds no soup, so the bid stays open.
    assert_eq!(first.2, 1);
}
