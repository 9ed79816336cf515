//! Topic names and subject mapping.
//!
//! Topics are slash paths (`/market/raw-goods`). On the bus they are matched
//! as dotted subjects (`market.raw-goods`) with `*` for one token and `>` for
//! the remainder.

use crate::catalogue::{self, ItemCategory};

pub struct Topics;

impl Topics {
    pub const NATURE: &'static str = "/world/nature";
    pub const SQUARE: &'static str = "/market/square";
    pub const GOVERNANCE: &'static str = "/market/governance";
    pub const BANK: &'static str = "/market/bank";
    pub const RAW_GOODS: &'static str = "/market/raw-goods";
    pub const FOOD: &'static str = "/market/food";
    pub const MATERIALS: &'static str = "/market/materials";
    pub const HOUSING: &'static str = "/market/housing";
    pub const GENERAL: &'static str = "/market/general";
    pub const TICK: &'static str = "/system/tick";

    /// Every `/market/*` topic.
    pub const MARKET_WILDCARD: &'static str = "/market/>";

    pub fn agent_inbox(agent_id: &str) -> String {
        format!("/agent/{}/inbox", agent_id)
    }

    pub fn all() -> [&'static str; 10] {
        [
            Self::NATURE,
            Self::SQUARE,
            Self::GOVERNANCE,
            Self::BANK,
            Self::RAW_GOODS,
            Self::FOOD,
            Self::MATERIALS,
            Self::HOUSING,
            Self::GENERAL,
            Self::TICK,
        ]
    }
}

pub fn to_subject(topic: &str) -> String {
    topic.trim_start_matches('/').replace('/', ".")
}

pub fn from_subject(subject: &str) -> String {
    format!("/{}", subject.replace('.', "/"))
}

/// Match a subject against a filter. Both may be given as topics or subjects.
pub fn subject_matches(filter: &str, subject: &str) -> bool {
    let filter = to_subject(filter);
    let subject = to_subject(subject);
    let mut want = filter.split('.');
    let mut have = subject.split('.');
    loop {
        match (want.next(), have.next()) {
            (Some(">"), Some(_)) => return true,
            (Some("*"), Some(_)) => continue,
            (Some(w), Some(h)) if w == h => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}

/// Market topic where an item is traded.
pub fn topic_for_item(item: &str) -> &'static str {
    match catalogue::item(item).map(|i| i.category) {
        Some(ItemCategory::Raw) => Topics::RAW_GOODS,
        Some(ItemCategory::Food) => Topics::FOOD,
        Some(ItemCategory::Material) => Topics::MATERIALS,
        Some(ItemCategory::Housing) => Topics::HOUSING,
        None => Topics::GENERAL,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_mapping() {
        assert_eq!(to_subject("/market/raw-goods"), "market.raw-goods");
        assert_eq!(from_subject("market.raw-goods"), "/market/raw-goods");
        assert_eq!(to_subject(&Topics::agent_inbox("farmer-01")), "agent.farmer-01.inbox");
        for t in Topics::all() {
            assert_eq!(from_subject(&to_subject(t)), t);
        }
    }

    #[test]
    fn test_wildcards() {
        assert!(subject_matches("/market/>", "/market/raw-goods"));
        assert!(subject_matches("market.>", "market.bank"));
        assert!(!subject_matches("/market/>", "/market"));
        assert!(!subject_matches("/market/>", "/world/nature"));
        assert!(subject_matches("/agent/*/inbox", "/agent/chef-01/inbox"));
        assert!(!subject_matches("/agent/*/inbox", "/agent/chef-01/outbox"));
        assert!(subject_matches("/system/tick", "/system/tick"));
        assert!(!subject_matches("/system/tick", "/system/tick/extra"));
    }

    #[test]
    fn test_topic_for_item() {
        assert_eq!(topic_for_item("potato"), Topics::RAW_GOODS);
        assert_eq!(topic_for_item("soup"), Topics::FOOD);
        assert_eq!(topic_for_item("wall"), Topics::MATERIALS);
        assert_eq!(topic_for_item("house"), Topics::HOUSING);
        assert_eq!(topic_for_item("gold"), Topics::GENERAL);
    }
}
