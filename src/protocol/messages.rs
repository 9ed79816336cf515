//! Message types and their payload schemas.
//!
//! Payloads reject unknown fields. [`Message`] is the closed sum type every
//! consumer matches on exhaustively.

use std::collections::BTreeMap;
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::envelope::Envelope;
use crate::error::ProtocolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Tick,
    Spawn,
    Gather,
    GatherResult,
    Offer,
    Bid,
    Accept,
    Counter,
    CraftStart,
    CraftComplete,
    Join,
    Heartbeat,
    Settlement,
    ValidationResult,
}

impl MessageType {
    pub const ALL: [MessageType; 14] = [
        MessageType::Tick,
        MessageType::Spawn,
        MessageType::Gather,
        MessageType::GatherResult,
        MessageType::Offer,
        MessageType::Bid,
        MessageType::Accept,
        MessageType::Counter,
        MessageType::CraftStart,
        MessageType::CraftComplete,
        MessageType::Join,
        MessageType::Heartbeat,
        MessageType::Settlement,
        MessageType::ValidationResult,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Tick => "tick",
            MessageType::Spawn => "spawn",
            MessageType::Gather => "gather",
            MessageType::GatherResult => "gather_result",
            MessageType::Offer => "offer",
            MessageType::Bid => "bid",
            MessageType::Accept => "accept",
            MessageType::Counter => "counter",
            MessageType::CraftStart => "craft_start",
            MessageType::CraftComplete => "craft_complete",
            MessageType::Join => "join",
            MessageType::Heartbeat => "heartbeat",
            MessageType::Settlement => "settlement",
            MessageType::ValidationResult => "validation_result",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Tick {
    pub tick_number: u64,
    pub timestamp: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Spawn {
    pub spawn_id: String,
    pub tick: u64,
    pub items: BTreeMap<String, u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Gather {
    pub spawn_id: String,
    pub item: String,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatherResult {
    #[serde(default)]
    pub reference_msg_id: Option<String>,
    pub agent_id: String,
    pub spawn_id: String,
    pub item: String,
    pub quantity: u32,
    pub success: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Offer {
    pub item: String,
    pub quantity: u32,
    pub price_per_unit: Decimal,
    /// Last tick before which the offer can be accepted; `None` never expires.
    #[serde(default)]
    pub expires_tick: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Bid {
    pub item: String,
    pub quantity: u32,
    pub max_price_per_unit: Decimal,
    #[serde(default)]
    pub target_agent: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Accept {
    pub reference_msg_id: String,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Counter {
    pub reference_msg_id: String,
    pub proposed_price: Decimal,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CraftStart {
    pub recipe: String,
    pub inputs: BTreeMap<String, u32>,
    pub estimated_ticks: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CraftComplete {
    pub recipe: String,
    pub output: BTreeMap<String, u32>,
    pub agent: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Join {
    pub agent_id: String,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub api_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Heartbeat {
    pub agent_id: String,
    pub wallet: Decimal,
    pub inventory_count: u32,
}

fn completed() -> String {
    "completed".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settlement {
    /// The accept message that triggered this settlement
    pub reference_msg_id: String,
    #[serde(default)]
    pub order_msg_id: Option<String>,
    pub buyer: String,
    pub seller: String,
    pub item: String,
    pub quantity: u32,
    pub total_price: Decimal,
    #[serde(default = "completed")]
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValidationResult {
    pub reference_msg_id: String,
    pub agent: String,
    pub valid: bool,
    /// Reason code, present on rejection
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub action: Option<MessageType>,
}

/// A decoded payload, one variant per [`MessageType`].
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Tick(Tick),
    Spawn(Spawn),
    Gather(Gather),
    GatherResult(GatherResult),
    Offer(Offer),
    Bid(Bid),
    Accept(Accept),
    Counter(Counter),
    CraftStart(CraftStart),
    CraftComplete(CraftComplete),
    Join(Join),
    Heartbeat(Heartbeat),
    Settlement(Settlement),
    ValidationResult(ValidationResult),
}

fn decode<T: for<'de> Deserialize<'de>>(kind: MessageType, payload: &Value) -> Result<T, ProtocolError> {
    serde_json::from_value(payload.clone()).map_err(|e| ProtocolError::Schema {
        kind,
        detail: e.to_string(),
    })
}

fn schema(kind: MessageType, detail: &str) -> ProtocolError {
    ProtocolError::Schema {
        kind,
        detail: detail.to_string(),
    }
}

impl Message {
    pub fn kind(&self) -> MessageType {
        match self {
            Message::Tick(_) => MessageType::Tick,
            Message::Spawn(_) => MessageType::Spawn,
            Message::Gather(_) => MessageType::Gather,
            Message::GatherResult(_) => MessageType::GatherResult,
            Message::Offer(_) => MessageType::Offer,
            Message::Bid(_) => MessageType::Bid,
            Message::Accept(_) => MessageType::Accept,
            Message::Counter(_) => MessageType::Counter,
            Message::CraftStart(_) => MessageType::CraftStart,
            Message::CraftComplete(_) => MessageType::CraftComplete,
            Message::Join(_) => MessageType::Join,
            Message::Heartbeat(_) => MessageType::Heartbeat,
            Message::Settlement(_) => MessageType::Settlement,
            Message::ValidationResult(_) => MessageType::ValidationResult,
        }
    }

    /// Structural validation: envelope fields present, payload matches the
    /// schema of the declared type, quantities and prices positive.
    pub fn from_envelope(envelope: &Envelope) -> Result<Message, ProtocolError> {
        if envelope.from.trim().is_empty() {
            return Err(ProtocolError::EmptyField("from"));
        }
        if envelope.topic.trim().is_empty() {
            return Err(ProtocolError::EmptyField("topic"));
        }
        let kind = envelope.kind;
        let payload = &envelope.payload;
        let message = match kind {
            MessageType::Tick => Message::Tick(decode(kind, payload)?),
            MessageType::Spawn => Message::Spawn(decode(kind, payload)?),
            MessageType::Gather => Message::Gather(decode(kind, payload)?),
            MessageType::GatherResult => Message::GatherResult(decode(kind, payload)?),
            MessageType::Offer => Message::Offer(decode(kind, payload)?),
            MessageType::Bid => Message::Bid(decode(kind, payload)?),
            MessageType::Accept => Message::Accept(decode(kind, payload)?),
            MessageType::Counter => Message::Counter(decode(kind, payload)?),
            MessageType::CraftStart => Message::CraftStart(decode(kind, payload)?),
            MessageType::CraftComplete => Message::CraftComplete(decode(kind, payload)?),
            MessageType::Join => Message::Join(decode(kind, payload)?),
            MessageType::Heartbeat => Message::Heartbeat(decode(kind, payload)?),
            MessageType::Settlement => Message::Settlement(decode(kind, payload)?),
            MessageType::ValidationResult => Message::ValidationResult(decode(kind, payload)?),
        };
        message.check_bounds()?;
        Ok(message)
    }

    fn check_bounds(&self) -> Result<(), ProtocolError> {
        let kind = self.kind();
        match self {
            Message::Tick(t) if t.tick_number == 0 => Err(schema(kind, "tick_number must be > 0")),
            Message::Gather(g) if g.quantity == 0 => Err(schema(kind, "quantity must be > 0")),
            Message::Offer(o) if o.quantity == 0 => Err(schema(kind, "quantity must be > 0")),
            Message::Offer(o) if o.price_per_unit <= Decimal::ZERO => {
                Err(schema(kind, "price_per_unit must be > 0"))
            }
            Message::Bid(b) if b.quantity == 0 => Err(schema(kind, "quantity must be > 0")),
            Message::Bid(b) if b.max_price_per_unit <= Decimal::ZERO => {
                Err(schema(kind, "max_price_per_unit must be > 0"))
            }
            Message::Accept(a) if a.quantity == 0 => Err(schema(kind, "quantity must be > 0")),
            Message::Accept(a) if a.reference_msg_id.is_empty() => {
                Err(schema(kind, "reference_msg_id must not be empty"))
            }
            Message::Counter(c) if c.quantity == 0 => Err(schema(kind, "quantity must be > 0")),
            Message::Counter(c) if c.proposed_price <= Decimal::ZERO => {
                Err(schema(kind, "proposed_price must be > 0"))
            }
            Message::Counter(c) if c.reference_msg_id.is_empty() => {
                Err(schema(kind, "reference_msg_id must not be empty"))
            }
            Message::CraftStart(c) if c.estimated_ticks == 0 => {
                Err(schema(kind, "estimated_ticks must be > 0"))
            }
            Message::Settlement(s) if s.quantity == 0 || s.total_price <= Decimal::ZERO => {
                Err(schema(kind, "quantity and total_price must be > 0"))
            }
            _ => Ok(()),
        }
    }

    /// Payload object for the wire.
    pub fn to_payload(&self) -> Value {
        let value = match self {
            Message::Tick(p) => serde_json::to_value(p),
            Message::Spawn(p) => serde_json::to_value(p),
            Message::Gather(p) => serde_json::to_value(p),
            Message::GatherResult(p) => serde_json::to_value(p),
            Message::Offer(p) => serde_json::to_value(p),
            Message::Bid(p) => serde_json::to_value(p),
            Message::Accept(p) => serde_json::to_value(p),
            Message::Counter(p) => serde_json::to_value(p),
            Message::CraftStart(p) => serde_json::to_value(p),
            Message::CraftComplete(p) => serde_json::to_value(p),
            Message::Join(p) => serde_json::to_value(p),
            Message::Heartbeat(p) => serde_json::to_value(p),
            Message::Settlement(p) => serde_json::to_value(p),
            Message::ValidationResult(p) => serde_json::to_value(p),
        };
        value.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(kind: MessageType, payload: Value) -> Envelope {
        Envelope {
            id: "m-1".to_string(),
            from: "farmer-01".to_string(),
            topic: "/market/raw-goods".to_string(),
            timestamp: 0.0,
            tick: 1,
            kind,
            payload,
        }
    }

    #[test]
    fn test_type_names_match_wire() {
        for kind in MessageType::ALL {
            let wire = serde_json::to_value(kind).unwrap();
            assert_eq!(wire, json!(kind.as_str()));
        }
    }

    #[test]
    fn test_offer_decodes() {
        let env = envelope(
            MessageType::Offer,
            json!({"item": "potato", "quantity": 5, "price_per_unit": 2.5, "expires_tick": 9}),
        );
        match Message::from_envelope(&env).unwrap() {
            Message::Offer(o) => {
                assert_eq!(o.quantity, 5);
                assert_eq!(o.price_per_unit, Decimal::new(25, 1));
                assert_eq!(o.expires_tick, Some(9));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unknown_field_rejected() {
        let env = envelope(
            MessageType::Accept,
            json!({"reference_msg_id": "x", "quantity": 1, "bonus": true}),
        );
        let err = Message::from_envelope(&env).unwrap_err();
        assert!(matches!(err, ProtocolError::Schema { kind: MessageType::Accept, .. }));
    }

    #[test]
    fn test_missing_field_rejected() {
        let env = envelope(MessageType::Bid, json!({"item": "potato", "quantity": 1}));
        assert!(Message::from_envelope(&env).is_err());
    }

    #[test]
    fn test_non_positive_values_rejected() {
        let env = envelope(
            MessageType::Offer,
            json!({"item": "potato", "quantity": 0, "price_per_unit": 1}),
        );
        assert!(Message::from_envelope(&env).is_err());

        let env = envelope(
            MessageType::Bid,
            json!({"item": "potato", "quantity": 1, "max_price_per_unit": 0}),
        );
        assert!(Message::from_envelope(&env).is_err());

        let env = envelope(MessageType::Accept, json!({"reference_msg_id": "x", "quantity": -3}));
        assert!(Message::from_envelope(&env).is_err());
    }

    #[test]
    fn test_empty_sender_rejected() {
        let mut env = envelope(MessageType::Accept, json!({"reference_msg_id": "x", "quantity": 1}));
        env.from = "  ".to_string();
        assert!(matches!(
            Message::from_envelope(&env),
            Err(ProtocolError::EmptyField("from"))
        ));
    }

    #[test]
    fn test_payload_reencodes_to_same_message() {
        let msg = Message::CraftStart(CraftStart {
            recipe: "soup".to_string(),
            inputs: [("potato".to_string(), 2), ("onion".to_string(), 1)].into_iter().collect(),
            estimated_ticks: 2,
        });
        let env = envelope(MessageType::CraftStart, msg.to_payload());
        assert_eq!(Message::from_envelope(&env).unwrap(), msg);
    }
}
