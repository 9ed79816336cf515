//! Wire envelope wrapping every message on the bus.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::messages::{Message, MessageType};
use crate::error::ProtocolError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Envelope {
    /// Globally unique message id
    pub id: String,
    pub from: String,
    pub topic: String,
    /// Unix seconds at publish time
    pub timestamp: f64,
    /// Publisher's view of the current tick
    pub tick: u64,
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub payload: Value,
}

impl Envelope {
    pub fn new(from: &str, topic: &str, tick: u64, message: &Message) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            from: from.to_string(),
            topic: topic.to_string(),
            timestamp: now_secs(),
            tick,
            kind: message.kind(),
            payload: message.to_payload(),
        }
    }

    pub fn from_json(raw: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(&self) -> Result<Message, ProtocolError> {
        Message::from_envelope(self)
    }
}

pub fn now_secs() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}
