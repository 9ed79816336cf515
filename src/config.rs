use rust_decimal::Decimal;

use crate::banker::BankerConfig;
use crate::catalogue;
use crate::governor::GovernorLimits;

#[derive(Debug, Clone)]
pub struct Config {
    pub tick_interval_ms: u64,
    pub max_actions_per_tick: u32,
    pub heartbeat_timeout_ticks: u64,
    pub starting_wallet: i64,
    pub rent_per_tick: i64,
    /// Rent is settled outside the triad unless this is set
    pub charge_rent: bool,
    /// Advisory; agents are expected to self-limit
    pub max_inventory: u32,
    pub spawn_jitter: f64,
    pub spawn_seed: u64,
    pub journal_path: Option<String>,
    pub sqlite_path: Option<String>,
    pub snapshot_every_ticks: u64,
    /// 0 runs until interrupted
    pub max_ticks: u64,
    pub bus_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tick_interval_ms: 5000,
            max_actions_per_tick: catalogue::MAX_ACTIONS_PER_TICK,
            heartbeat_timeout_ticks: catalogue::HEARTBEAT_TIMEOUT_TICKS,
            starting_wallet: catalogue::STARTING_WALLET,
            rent_per_tick: catalogue::RENT_PER_TICK,
            charge_rent: false,
            max_inventory: catalogue::MAX_INVENTORY,
            spawn_jitter: 0.0,
            spawn_seed: 42,
            journal_path: None,
            sqlite_path: None,
            snapshot_every_ticks: 10,
            max_ticks: 0,
            bus_capacity: 4096,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_flag(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

fn env_path(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            tick_interval_ms: env_parse("TICK_INTERVAL_MS").unwrap_or(d.tick_interval_ms),
            max_actions_per_tick: env_parse("MAX_ACTIONS_PER_TICK").unwrap_or(d.max_actions_per_tick),
            heartbeat_timeout_ticks: env_parse("HEARTBEAT_TIMEOUT_TICKS").unwrap_or(d.heartbeat_timeout_ticks),
            starting_wallet: env_parse("STARTING_WALLET").unwrap_or(d.starting_wallet),
            rent_per_tick: env_parse("RENT_PER_TICK").unwrap_or(d.rent_per_tick),
            charge_rent: env_flag("CHARGE_RENT").unwrap_or(d.charge_rent),
            max_inventory: env_parse("MAX_INVENTORY").unwrap_or(d.max_inventory),
            spawn_jitter: env_parse::<f64>("SPAWN_JITTER")
                .map(|j| j.clamp(0.0, 1.0))
                .unwrap_or(d.spawn_jitter),
            spawn_seed: env_parse("SPAWN_SEED").unwrap_or(d.spawn_seed),
            journal_path: env_path("JOURNAL_PATH"),
            sqlite_path: env_path("SQLITE_PATH"),
            snapshot_every_ticks: env_parse("SNAPSHOT_EVERY_TICKS").unwrap_or(d.snapshot_every_ticks),
            max_ticks: env_parse("MAX_TICKS").unwrap_or(d.max_ticks),
            bus_capacity: env_parse::<usize>("BUS_CAPACITY")
                .filter(|c| *c > 0)
                .unwrap_or(d.bus_capacity),
        }
    }

    pub fn governor_limits(&self) -> GovernorLimits {
        GovernorLimits {
            max_actions_per_tick: self.max_actions_per_tick,
            heartbeat_timeout_ticks: self.heartbeat_timeout_ticks,
        }
    }

    pub fn banker_config(&self) -> BankerConfig {
        BankerConfig {
            starting_wallet: Decimal::from(self.starting_wallet),
            rent_per_tick: self.charge_rent.then(|| Decimal::from(self.rent_per_tick)),
            heartbeat_timeout_ticks: self.heartbeat_timeout_ticks,
            snapshot_every_ticks: self.snapshot_every_ticks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_catalogue() {
        let cfg = Config::default();
        assert_eq!(cfg.max_actions_per_tick, 5);
        assert_eq!(cfg.heartbeat_timeout_ticks, 10);
        assert_eq!(cfg.starting_wallet, 100);
        assert!(!cfg.charge_rent);
        assert!(cfg.journal_path.is_none());
    }

    #[test]
    fn test_rent_only_when_charged() {
        let mut cfg = Config::default();
        assert!(cfg.banker_config().rent_per_tick.is_none());
        cfg.charge_rent = true;
        assert_eq!(cfg.banker_config().rent_per_tick, Some(Decimal::from(2)));
    }

    #[test]
    fn test_limits_follow_config() {
        let cfg = Config {
            max_actions_per_tick: 3,
            heartbeat_timeout_ticks: 7,
            ..Config::default()
        };
        let limits = cfg.governor_limits();
        assert_eq!(limits.max_actions_per_tick, 3);
        assert_eq!(limits.heartbeat_timeout_ticks, 7);
    }
}
