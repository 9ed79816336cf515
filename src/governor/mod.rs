//! Governor: one advisory verdict per agent action.

pub mod rules;
pub mod state;

pub use state::{GovernorLimits, GovernorState};

use crate::error::RejectReason;
use crate::logging::{log, log_decode_error, log_verdict, obj, v_str, Domain, Level};
use crate::protocol::messages::{Message, ValidationResult};
use crate::protocol::{Envelope, MessageType, Topics, BANKER_ID, GOVERNOR_ID, WORLD_ID};
use crate::service::Service;
use crate::verify::state_digest;

pub struct Governor {
    state: GovernorState,
}

impl Governor {
    pub fn new(limits: GovernorLimits) -> Self {
        Self {
            state: GovernorState::new(limits),
        }
    }

    pub fn state(&self) -> &GovernorState {
        &self.state
    }

    pub fn digest(&self) -> String {
        state_digest(&self.state)
    }

    fn on_tick(&mut self, envelope: &Envelope) {
        if envelope.from != WORLD_ID {
            log(
                Level::Warn,
                Domain::Governor,
                "untrusted_tick",
                obj(&[("agent", v_str(&envelope.from)), ("msg_id", v_str(&envelope.id))]),
            );
            return;
        }
        match envelope.decode() {
            Ok(Message::Tick(t)) => self.state.advance_tick(t.tick_number),
            Ok(_) => {}
            Err(err) => log_decode_error(&envelope.id, &envelope.from, &err.to_string()),
        }
    }

    fn verdict(&self, envelope: &Envelope, outcome: Result<(), RejectReason>) -> Envelope {
        let (reason, detail) = match &outcome {
            Ok(()) => (None, None),
            Err(r) => (Some(r.code().to_string()), Some(r.to_string())),
        };
        log_verdict(
            &envelope.id,
            &envelope.from,
            envelope.kind.as_str(),
            outcome.is_ok(),
            detail.as_deref(),
        );
        let result = ValidationResult {
            reference_msg_id: envelope.id.clone(),
            agent: envelope.from.clone(),
            valid: outcome.is_ok(),
            reason,
            detail,
            action: Some(envelope.kind),
        };
        Envelope::new(
            GOVERNOR_ID,
            Topics::GOVERNANCE,
            self.state.current_tick,
            &Message::ValidationResult(result),
        )
    }
}

impl Default for Governor {
    fn default() -> Self {
        Self::new(GovernorLimits::default())
    }
}

impl Service for Governor {
    fn agent_id(&self) -> &str {
        GOVERNOR_ID
    }

    fn subscriptions(&self) -> Vec<String> {
        vec![Topics::MARKET_WILDCARD.to_string(), Topics::TICK.to_string()]
    }

    fn handle(&mut self, envelope: &Envelope) -> Vec<Envelope> {
        if envelope.from == GOVERNOR_ID {
            return vec![];
        }
        if envelope.kind == MessageType::Tick {
            self.on_tick(envelope);
            return vec![];
        }
        // Authority output is not judged. Agents get a verdict for anything.
        if envelope.from == BANKER_ID || envelope.from == WORLD_ID {
            return vec![];
        }
        if self.state.seen.contains_key(&envelope.id) {
            log(
                Level::Debug,
                Domain::Governor,
                "duplicate",
                obj(&[("msg_id", v_str(&envelope.id))]),
            );
            return vec![];
        }
        self.state.seen.insert(envelope.id.clone(), envelope.kind);

        let outcome = rules::judge(&mut self.state, &envelope.from, envelope.decode());
        vec![self.verdict(envelope, outcome)]
    }
}
