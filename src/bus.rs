//! In-process message bus with a single total order.
//!
//! Every publish takes the same lock, stamps a sequence number, appends to
//! the journal and broadcasts. All subscribers therefore observe the shared
//! log in one order, each filtered to the topics it asked for.

use std::sync::Mutex;

use anyhow::{anyhow, Result};
use tokio::sync::broadcast;

use crate::error::BusError;
use crate::journal::Journal;
use crate::logging::{log, obj, v_str, Domain, Level};
use crate::protocol::topics::{subject_matches, to_subject};
use crate::protocol::Envelope;

/// An envelope with its position in the log.
#[derive(Debug, Clone)]
pub struct Sequenced {
    pub seq: u64,
    pub envelope: Envelope,
}

struct Sequencer {
    next_seq: u64,
    journal: Option<Journal>,
}

pub struct MessageBus {
    tx: broadcast::Sender<Sequenced>,
    sequencer: Mutex<Sequencer>,
}

impl MessageBus {
    pub fn new(capacity: usize, journal: Option<Journal>) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            sequencer: Mutex::new(Sequencer {
                next_seq: 1,
                journal,
            }),
        }
    }

    /// Append to the log. Returns the assigned sequence number.
    pub fn publish(&self, envelope: Envelope) -> Result<u64> {
        let mut seq_state = self
            .sequencer
            .lock()
            .map_err(|_| anyhow!("bus sequencer poisoned"))?;
        let seq = seq_state.next_seq;
        seq_state.next_seq += 1;
        if let Some(journal) = seq_state.journal.as_mut() {
            journal.append(seq, &envelope)?;
        }
        log(
            Level::Trace,
            Domain::Bus,
            "publish",
            obj(&[
                ("seq", serde_json::json!(seq)),
                ("msg_id", v_str(&envelope.id)),
                ("subject", v_str(&to_subject(&envelope.topic))),
                ("type", v_str(envelope.kind.as_str())),
            ]),
        );
        // No live receivers is fine; the journal still records the message.
        let _ = self.tx.send(Sequenced { seq, envelope });
        Ok(seq)
    }

    pub fn publish_all(&self, envelopes: Vec<Envelope>) -> Result<()> {
        for env in envelopes {
            self.publish(env)?;
        }
        Ok(())
    }

    /// Messages published after this call whose topic matches any filter.
    pub fn subscribe(&self, filters: &[String]) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
            filters: filters.iter().map(|f| to_subject(f)).collect(),
        }
    }
}

pub struct Subscription {
    rx: broadcast::Receiver<Sequenced>,
    filters: Vec<String>,
}

impl Subscription {
    fn wants(&self, topic: &str) -> bool {
        self.filters.iter().any(|f| subject_matches(f, topic))
    }

    /// Next matching message. A lag means a gap in this subscriber's view of
    /// the log and is returned as an error rather than skipped.
    pub async fn recv(&mut self) -> Result<Sequenced, BusError> {
        loop {
            match self.rx.recv().await {
                Ok(msg) if self.wants(&msg.envelope.topic) => return Ok(msg),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => return Err(BusError::Lagged(n)),
                Err(broadcast::error::RecvError::Closed) => return Err(BusError::Closed),
            }
        }
    }

    /// Next matching message already buffered, without waiting.
    pub fn try_recv(&mut self) -> Result<Option<Sequenced>, BusError> {
        loop {
            match self.rx.try_recv() {
                Ok(msg) if self.wants(&msg.envelope.topic) => return Ok(Some(msg)),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Lagged(n)) => return Err(BusError::Lagged(n)),
                Err(broadcast::error::TryRecvError::Closed) => return Err(BusError::Closed),
            }
        }
    }
}
