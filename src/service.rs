//! The receive loop shared by every authority.
//!
//! A service is a deterministic state machine: `handle` takes the next
//! envelope from the ordered log and returns the envelopes to publish. The
//! loop owns the service, so its state needs no locking.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;

use crate::bus::{MessageBus, Subscription};
use crate::logging::{log, obj, v_str, Domain, Level};
use crate::protocol::Envelope;

pub trait Service {
    fn agent_id(&self) -> &str;

    /// Topic filters this service consumes (wildcards allowed).
    fn subscriptions(&self) -> Vec<String>;

    /// Apply one message. Must not depend on anything but the current state
    /// and the envelope.
    fn handle(&mut self, envelope: &Envelope) -> Vec<Envelope>;
}

/// Drive `service` from `sub` until shutdown. The subscription should be
/// created before any producer starts so nothing is missed. Returns the
/// service for final inspection; a transport failure is returned as an error.
pub async fn run_service<S: Service>(
    mut service: S,
    bus: Arc<MessageBus>,
    mut sub: Subscription,
    mut shutdown: watch::Receiver<bool>,
) -> Result<S> {
    log(
        Level::Info,
        Domain::System,
        "service_start",
        obj(&[
            ("agent", v_str(service.agent_id())),
            ("subscriptions", serde_json::json!(service.subscriptions())),
        ]),
    );
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    drain(&mut service, &bus, &mut sub)?;
                    break;
                }
            }
            next = sub.recv() => {
                let msg = match next {
                    Ok(msg) => msg,
                    Err(err) => {
                        log(
                            Level::Fatal,
                            Domain::Bus,
                            "transport_lost",
                            obj(&[
                                ("agent", v_str(service.agent_id())),
                                ("msg", v_str(&err.to_string())),
                            ]),
                        );
                        return Err(anyhow::Error::new(err)
                            .context(format!("{} lost the message log", service.agent_id())));
                    }
                };
                for out in service.handle(&msg.envelope) {
                    bus.publish(out)?;
                }
            }
        }
    }
    log(
        Level::Info,
        Domain::System,
        "service_stop",
        obj(&[("agent", v_str(service.agent_id()))]),
    );
    Ok(service)
}

/// Apply whatever is already buffered so a shutdown never leaves the
/// service behind the log it was given.
fn drain<S: Service>(service: &mut S, bus: &MessageBus, sub: &mut Subscription) -> Result<()> {
    while let Some(msg) = sub.try_recv()? {
        for out in service.handle(&msg.envelope) {
            bus.publish(out)?;
        }
    }
    Ok(())
}
