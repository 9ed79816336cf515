//! Validation rules. [`judge`] is the whole pipeline for one agent message.

use super::state::{ActiveCraft, GovernorState};
use crate::catalogue;
use crate::error::{ProtocolError, RejectReason};
use crate::protocol::messages::{CraftComplete, CraftStart, Message};

/// Rate limit, structure, liveness, then the per-type business rule. The
/// action is counted whatever the verdict. State changes (registration,
/// heartbeats, craft tracking) are only applied for accepted messages.
pub fn judge(
    state: &mut GovernorState,
    agent: &str,
    decoded: Result<Message, ProtocolError>,
) -> Result<(), RejectReason> {
    let over_limit = state.action_count(agent) >= state.limits.max_actions_per_tick;
    state.record_action(agent);
    if over_limit {
        return Err(RejectReason::RateLimitExceeded {
            agent: agent.to_string(),
            limit: state.limits.max_actions_per_tick,
        });
    }

    let message = decoded?;

    if !matches!(message, Message::Heartbeat(_) | Message::Join(_)) {
        if let Some(last_seen) = state.inactive_since(agent) {
            return Err(RejectReason::AgentInactive {
                agent: agent.to_string(),
                last_seen,
            });
        }
    }

    apply_business_rule(state, agent, &message)
}

fn apply_business_rule(state: &mut GovernorState, agent: &str, message: &Message) -> Result<(), RejectReason> {
    match message {
        Message::Offer(o) => check_item(&o.item),
        Message::Bid(b) => check_item(&b.item),
        Message::Accept(a) => check_reference(state, &a.reference_msg_id),
        Message::Counter(c) => check_reference(state, &c.reference_msg_id),
        Message::CraftStart(c) => start_craft(state, agent, c),
        Message::CraftComplete(c) => complete_craft(state, agent, c),
        Message::Join(_) => {
            state.register(agent);
            Ok(())
        }
        Message::Heartbeat(_) => {
            state.record_heartbeat(agent);
            Ok(())
        }
        Message::Tick(_)
        | Message::Spawn(_)
        | Message::Gather(_)
        | Message::GatherResult(_)
        | Message::Settlement(_)
        | Message::ValidationResult(_) => Err(RejectReason::Structural(format!(
            "{} is not an agent action",
            message.kind()
        ))),
    }
}

fn check_item(item: &str) -> Result<(), RejectReason> {
    if catalogue::is_valid_item(item) {
        Ok(())
    } else {
        Err(RejectReason::UnknownItem(item.to_string()))
    }
}

fn check_reference(state: &GovernorState, reference: &str) -> Result<(), RejectReason> {
    if state.is_offer_or_bid(reference) {
        Ok(())
    } else {
        Err(RejectReason::ReferenceNotFound(reference.to_string()))
    }
}

fn start_craft(state: &mut GovernorState, agent: &str, craft: &CraftStart) -> Result<(), RejectReason> {
    let recipe = catalogue::recipe(&craft.recipe)
        .ok_or_else(|| RejectReason::UnknownRecipe(craft.recipe.clone()))?;
    if let Some(active) = state.active_crafts.get(agent) {
        return Err(RejectReason::DuplicateCraft {
            agent: agent.to_string(),
            recipe: active.recipe.clone(),
        });
    }
    if craft.inputs != recipe.inputs_map() {
        return Err(RejectReason::InputsMismatch {
            recipe: recipe.name.to_string(),
        });
    }
    if craft.estimated_ticks != recipe.ticks {
        return Err(RejectReason::DurationMismatch {
            recipe: recipe.name.to_string(),
            expected: recipe.ticks,
            got: craft.estimated_ticks,
        });
    }
    state.active_crafts.insert(
        agent.to_string(),
        ActiveCraft {
            recipe: recipe.name.to_string(),
            started_tick: state.current_tick,
            duration: recipe.ticks,
        },
    );
    Ok(())
}

fn complete_craft(state: &mut GovernorState, agent: &str, craft: &CraftComplete) -> Result<(), RejectReason> {
    let active = match state.active_crafts.get(agent) {
        Some(active) if active.recipe == craft.recipe => active,
        _ => {
            return Err(RejectReason::NoActiveCraft {
                agent: agent.to_string(),
                recipe: craft.recipe.clone(),
            })
        }
    };
    let ready_at = active.started_tick + active.duration;
    if state.current_tick < ready_at {
        return Err(RejectReason::CraftNotReady {
            recipe: craft.recipe.clone(),
            remaining: ready_at - state.current_tick,
        });
    }
    state.active_crafts.remove(agent);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::governor::state::GovernorLimits;
    use crate::protocol::messages::{Accept, Heartbeat, Offer};
    use crate::protocol::MessageType;
    use rust_decimal::Decimal;
    use std::collections::BTreeMap;

    fn state() -> GovernorState {
        let mut s = GovernorState::new(GovernorLimits::default());
        s.advance_tick(1);
        s
    }

    fn offer(item: &str) -> Message {
        Message::Offer(Offer {
            item: item.to_string(),
            quantity: 1,
            price_per_unit: Decimal::ONE,
            expires_tick: None,
        })
    }

    fn craft_start(recipe: &str, inputs: &[(&str, u32)], ticks: u64) -> Message {
        Message::CraftStart(CraftStart {
            recipe: recipe.to_string(),
            inputs: inputs.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            estimated_ticks: ticks,
        })
    }

    fn craft_complete(recipe: &str, agent: &str) -> Message {
        Message::CraftComplete(CraftComplete {
            recipe: recipe.to_string(),
            output: BTreeMap::from([(recipe.to_string(), 1)]),
            agent: agent.to_string(),
        })
    }

    #[test]
    fn test_unknown_item_is_catalogue_violation() {
        let mut s = state();
        let err = judge(&mut s, "a", Ok(offer("gold"))).unwrap_err();
        assert_eq!(err.code(), "catalogue_violation");
        assert!(judge(&mut s, "a", Ok(offer("potato"))).is_ok());
    }

    #[test]
    fn test_rate_limit_counts_rejections() {
        let mut s = state();
        for _ in 0..3 {
            assert!(judge(&mut s, "a", Ok(offer("gold"))).is_err());
        }
        for _ in 0..2 {
            assert!(judge(&mut s, "a", Ok(offer("potato"))).is_ok());
        }
        let err = judge(&mut s, "a", Ok(offer("potato"))).unwrap_err();
        assert_eq!(err.code(), "rate_limit_exceeded");
        assert_eq!(s.action_count("a"), 6);
        assert!(judge(&mut s, "b", Ok(offer("potato"))).is_ok());

        s.advance_tick(2);
        assert!(judge(&mut s, "a", Ok(offer("potato"))).is_ok());
    }

    #[test]
    fn test_accept_requires_known_order() {
        let mut s = state();
        s.seen.insert("o1".to_string(), MessageType::Offer);
        s.seen.insert("h1".to_string(), MessageType::Heartbeat);
        let accept = |r: &str| {
            Ok(Message::Accept(Accept {
                reference_msg_id: r.to_string(),
                quantity: 1,
            }))
        };
        assert!(judge(&mut s, "b", accept("o1")).is_ok());
        assert_eq!(judge(&mut s, "b", accept("h1")).unwrap_err().code(), "reference_not_found");
        assert_eq!(judge(&mut s, "b", accept("zzz")).unwrap_err().code(), "reference_not_found");
    }

    #[test]
    fn test_craft_start_checks() {
        let mut s = state();
        let err = judge(&mut s, "c", Ok(craft_start("cake", &[], 1))).unwrap_err();
        assert_eq!(err.code(), "catalogue_violation");

        let err = judge(&mut s, "c", Ok(craft_start("shelf", &[("wood", 3), ("nails", 2)], 3))).unwrap_err();
        assert_eq!(err, RejectReason::InputsMismatch { recipe: "shelf".into() });

        let err = judge(&mut s, "c", Ok(craft_start("shelf", &[("wood", 3), ("nails", 5)], 2))).unwrap_err();
        assert_eq!(err.code(), "recipe_mismatch");

        assert!(judge(&mut s, "c", Ok(craft_start("shelf", &[("wood", 3), ("nails", 5)], 3))).is_ok());
        s.advance_tick(2);
        let err = judge(&mut s, "c", Ok(craft_start("soup", &[("potato", 2), ("onion", 1)], 2))).unwrap_err();
        assert_eq!(err.code(), "duplicate_craft");
    }

    #[test]
    fn test_craft_complete_waits_for_duration() {
        let mut s = state();
        assert_eq!(
            judge(&mut s, "c", Ok(craft_complete("soup", "c"))).unwrap_err().code(),
            "reference_not_found"
        );
        judge(&mut s, "c", Ok(craft_start("soup", &[("potato", 2), ("onion", 1)], 2))).unwrap();
        s.advance_tick(2);
        assert_eq!(
            judge(&mut s, "c", Ok(craft_complete("soup", "c"))).unwrap_err(),
            RejectReason::CraftNotReady { recipe: "soup".into(), remaining: 1 }
        );
        assert_eq!(
            judge(&mut s, "c", Ok(craft_complete("shelf", "c"))).unwrap_err().code(),
            "reference_not_found"
        );
        s.advance_tick(3);
        assert!(judge(&mut s, "c", Ok(craft_complete("soup", "c"))).is_ok());
        assert!(s.active_crafts.is_empty());
    }

    #[test]
    fn test_inactive_agent_only_heartbeat_passes() {
        let mut s = state();
        judge(&mut s, "a", Ok(offer("potato"))).unwrap();
        s.record_heartbeat("a");
        s.advance_tick(12);
        assert_eq!(judge(&mut s, "a", Ok(offer("potato"))).unwrap_err().code(), "agent_inactive");
        let hb = Message::Heartbeat(Heartbeat {
            agent_id: "a".into(),
            wallet: Decimal::from(10),
            inventory_count: 0,
        });
        assert!(judge(&mut s, "a", Ok(hb)).is_ok());
        assert!(judge(&mut s, "a", Ok(offer("potato"))).is_ok());
    }

    #[test]
    fn test_structural_error_passes_through() {
        let mut s = state();
        let err = judge(&mut s, "a", Err(ProtocolError::EmptyField("topic"))).unwrap_err();
        assert_eq!(err.code(), "structural_error");
        assert_eq!(s.action_count("a"), 1);
    }
}
