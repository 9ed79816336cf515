//! Ledger state: accounts, the order book and active craft jobs.
//!
//! All maps are ordered so that serialization, and therefore the state
//! digest, is independent of insertion history.

use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub wallet: Decimal,
    pub inventory: BTreeMap<String, u32>,
    pub last_heartbeat_tick: Option<u64>,
    pub active: bool,
    pub opened_tick: u64,
}

impl Account {
    pub fn new(wallet: Decimal, tick: u64) -> Self {
        Self {
            wallet,
            inventory: BTreeMap::new(),
            last_heartbeat_tick: None,
            active: true,
            opened_tick: tick,
        }
    }

    pub fn holding(&self, item: &str) -> u32 {
        self.inventory.get(item).copied().unwrap_or(0)
    }

    pub fn inventory_count(&self) -> u32 {
        self.inventory.values().sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSide {
    Offer,
    Bid,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Offer => "offer",
            OrderSide::Bid => "bid",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderEntry {
    pub msg_id: String,
    pub agent: String,
    pub side: OrderSide,
    pub item: String,
    pub original_quantity: u32,
    pub remaining: u32,
    /// Offer price, or the bid's max price
    pub unit_price: Decimal,
    pub posted_tick: u64,
    pub expires_tick: Option<u64>,
}

impl OrderEntry {
    pub fn is_expired(&self, tick: u64) -> bool {
        self.expires_tick.map_or(false, |e| e <= tick)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CraftJob {
    pub recipe: String,
    pub started_tick: u64,
    pub duration: u64,
}

impl CraftJob {
    pub fn remaining(&self, tick: u64) -> u64 {
        (self.started_tick + self.duration).saturating_sub(tick)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    pub current_tick: u64,
    pub accounts: BTreeMap<String, Account>,
    pub orders: BTreeMap<String, OrderEntry>,
    pub crafts: BTreeMap<String, CraftJob>,
    /// Envelope ids already applied
    pub processed: BTreeSet<String>,
    /// Agents removed as bankrupt; only a fresh join reopens them
    #[serde(default)]
    pub retired: BTreeSet<String>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_account(&self, agent: &str) -> bool {
        self.accounts.contains_key(agent)
    }

    pub fn account(&self, agent: &str) -> Option<&Account> {
        self.accounts.get(agent)
    }

    pub fn open_account(&mut self, agent: &str, wallet: Decimal) -> bool {
        if self.has_account(agent) {
            return false;
        }
        self.accounts
            .insert(agent.to_string(), Account::new(wallet, self.current_tick));
        true
    }

    pub fn wallet(&self, agent: &str) -> Option<Decimal> {
        self.accounts.get(agent).map(|a| a.wallet)
    }

    pub fn holding(&self, agent: &str, item: &str) -> u32 {
        self.accounts.get(agent).map_or(0, |a| a.holding(item))
    }

    fn account_mut(&mut self, agent: &str) -> Result<&mut Account, LedgerError> {
        self.accounts
            .get_mut(agent)
            .ok_or_else(|| LedgerError::NoAccount(agent.to_string()))
    }

    pub fn credit_wallet(&mut self, agent: &str, amount: Decimal) -> Result<(), LedgerError> {
        let account = self.account_mut(agent)?;
        account.wallet = account
            .wallet
            .checked_add(amount)
            .ok_or_else(|| LedgerError::Overflow(agent.to_string()))?;
        Ok(())
    }

    pub fn debit_wallet(&mut self, agent: &str, amount: Decimal) -> Result<(), LedgerError> {
        let account = self.account_mut(agent)?;
        if account.wallet < amount {
            return Err(LedgerError::InsufficientFunds {
                agent: agent.to_string(),
                needed: amount,
                available: account.wallet,
            });
        }
        account.wallet -= amount;
        Ok(())
    }

    pub fn credit_inventory(&mut self, agent: &str, item: &str, qty: u32) -> Result<(), LedgerError> {
        let account = self.account_mut(agent)?;
        let held = account.inventory.entry(item.to_string()).or_insert(0);
        *held = held
            .checked_add(qty)
            .ok_or_else(|| LedgerError::Overflow(agent.to_string()))?;
        Ok(())
    }

    /// Removes the item key entirely when the holding reaches zero.
    pub fn debit_inventory(&mut self, agent: &str, item: &str, qty: u32) -> Result<(), LedgerError> {
        let account = self.account_mut(agent)?;
        let held = account.holding(item);
        if held < qty {
            return Err(LedgerError::InsufficientInventory {
                agent: agent.to_string(),
                item: item.to_string(),
                needed: qty,
                available: held,
            });
        }
        if held == qty {
            account.inventory.remove(item);
        } else {
            account.inventory.insert(item.to_string(), held - qty);
        }
        Ok(())
    }

    pub fn add_order(&mut self, order: OrderEntry) {
        self.orders.insert(order.msg_id.clone(), order);
    }

    /// Decrement remaining quantity, dropping the entry once fully filled.
    pub fn fill_order(&mut self, msg_id: &str, qty: u32) {
        let filled = match self.orders.get_mut(msg_id) {
            Some(order) => {
                order.remaining = order.remaining.saturating_sub(qty);
                order.remaining == 0
            }
            None => false,
        };
        if filled {
            self.orders.remove(msg_id);
        }
    }

    pub fn purge_expired_orders(&mut self) -> Vec<String> {
        let tick = self.current_tick;
        let expired: Vec<String> = self
            .orders
            .values()
            .filter(|o| o.is_expired(tick))
            .map(|o| o.msg_id.clone())
            .collect();
        for id in &expired {
            self.orders.remove(id);
        }
        expired
    }

    /// Wallet zero, nothing held and no job in progress.
    pub fn is_bankrupt(&self, agent: &str) -> bool {
        match self.accounts.get(agent) {
            Some(a) => {
                a.wallet <= Decimal::ZERO
                    && a.inventory.values().all(|q| *q == 0)
                    && !self.crafts.contains_key(agent)
            }
            None => false,
        }
    }

    /// Drop the account and every order it posted.
    pub fn remove_agent(&mut self, agent: &str) {
        self.accounts.remove(agent);
        self.retired.insert(agent.to_string());
        self.orders.retain(|_, o| o.agent != agent);
        self.crafts.remove(agent);
    }
}
