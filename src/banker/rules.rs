//! Ledger transitions. Each function either applies a complete mutation or
//! returns a [`LedgerError`] leaving the ledger untouched.

use rust_decimal::Decimal;

use super::state::{CraftJob, Ledger, OrderEntry, OrderSide};
use crate::catalogue;
use crate::error::LedgerError;
use crate::protocol::messages::{Accept, GatherResult, Settlement};

#[derive(Debug, Clone, PartialEq)]
pub struct BankerConfig {
    pub starting_wallet: Decimal,
    /// Periodic debit per account; `None` leaves rent to the outside world
    pub rent_per_tick: Option<Decimal>,
    pub heartbeat_timeout_ticks: u64,
    pub snapshot_every_ticks: u64,
}

impl Default for BankerConfig {
    fn default() -> Self {
        Self {
            starting_wallet: Decimal::from(catalogue::STARTING_WALLET),
            rent_per_tick: None,
            heartbeat_timeout_ticks: catalogue::HEARTBEAT_TIMEOUT_TICKS,
            snapshot_every_ticks: 10,
        }
    }
}

/// What happened at a tick boundary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub expired_orders: Vec<String>,
    pub rent_collected: Decimal,
    pub deactivated: Vec<String>,
    pub bankrupt: Vec<String>,
}

/// Open an account on join. A join also lifts a bankrupt agent's retirement.
pub fn open_account(ledger: &mut Ledger, agent: &str, cfg: &BankerConfig) -> bool {
    ledger.retired.remove(agent);
    ledger.open_account(agent, cfg.starting_wallet)
}

#[allow(clippy::too_many_arguments)]
pub fn record_order(
    ledger: &mut Ledger,
    msg_id: &str,
    agent: &str,
    side: OrderSide,
    item: &str,
    quantity: u32,
    unit_price: Decimal,
    expires_tick: Option<u64>,
) -> Result<(), LedgerError> {
    if quantity == 0 {
        return Err(LedgerError::InvalidQuantity);
    }
    let order = OrderEntry {
        msg_id: msg_id.to_string(),
        agent: agent.to_string(),
        side,
        item: item.to_string(),
        original_quantity: quantity,
        remaining: quantity,
        unit_price,
        posted_tick: ledger.current_tick,
        expires_tick,
    };
    ledger.add_order(order);
    Ok(())
}

/// Settle an accept against the order it references.
///
/// Accept quantity, order remaining and seller holdings are checked
/// independently: the fill is `min(accept, remaining)` and the seller must
/// hold all of it. Nothing is mutated unless every check passes.
pub fn settle(
    ledger: &mut Ledger,
    accept_msg_id: &str,
    accepter: &str,
    accept: &Accept,
) -> Result<Settlement, LedgerError> {
    if accept.quantity == 0 {
        return Err(LedgerError::InvalidQuantity);
    }
    let order = ledger
        .orders
        .get(&accept.reference_msg_id)
        .cloned()
        .ok_or_else(|| LedgerError::OrderNotFound(accept.reference_msg_id.clone()))?;
    if let Some(expires_tick) = order.expires_tick.filter(|_| order.is_expired(ledger.current_tick)) {
        return Err(LedgerError::OrderExpired {
            order_id: order.msg_id.clone(),
            expires_tick,
        });
    }
    if order.remaining == 0 {
        return Err(LedgerError::OrderNotFound(order.msg_id.clone()));
    }

    let (buyer, seller) = match order.side {
        OrderSide::Offer => (accepter.to_string(), order.agent.clone()),
        OrderSide::Bid => (order.agent.clone(), accepter.to_string()),
    };
    if buyer == seller {
        return Err(LedgerError::SelfTrade(buyer));
    }

    let fill = accept.quantity.min(order.remaining);
    let total = order
        .unit_price
        .checked_mul(Decimal::from(fill))
        .ok_or_else(|| LedgerError::Overflow(order.msg_id.clone()))?;

    let buyer_wallet = ledger
        .wallet(&buyer)
        .ok_or_else(|| LedgerError::NoAccount(buyer.clone()))?;
    let seller_wallet = ledger
        .wallet(&seller)
        .ok_or_else(|| LedgerError::NoAccount(seller.clone()))?;
    if seller_wallet.checked_add(total).is_none() {
        return Err(LedgerError::Overflow(seller));
    }
    if buyer_wallet < total {
        return Err(LedgerError::InsufficientFunds {
            agent: buyer,
            needed: total,
            available: buyer_wallet,
        });
    }
    let held = ledger.holding(&seller, &order.item);
    if held < fill {
        return Err(LedgerError::InsufficientInventory {
            agent: seller,
            item: order.item.clone(),
            needed: fill,
            available: held,
        });
    }
    if ledger.holding(&buyer, &order.item).checked_add(fill).is_none() {
        return Err(LedgerError::Overflow(buyer));
    }

    ledger.debit_wallet(&buyer, total)?;
    ledger.credit_wallet(&seller, total)?;
    ledger.debit_inventory(&seller, &order.item, fill)?;
    ledger.credit_inventory(&buyer, &order.item, fill)?;
    ledger.fill_order(&order.msg_id, fill);

    Ok(Settlement {
        reference_msg_id: accept_msg_id.to_string(),
        order_msg_id: Some(order.msg_id),
        buyer,
        seller,
        item: order.item,
        quantity: fill,
        total_price: total,
        status: "completed".to_string(),
    })
}

/// Debit the recipe inputs and open a job. Inputs come from the catalogue,
/// not from the message, so a misdeclared craft cannot debit the wrong items.
pub fn start_craft(ledger: &mut Ledger, agent: &str, recipe_name: &str) -> Result<(), LedgerError> {
    let recipe = catalogue::recipe(recipe_name)
        .ok_or_else(|| LedgerError::UnknownRecipe(recipe_name.to_string()))?;
    if !ledger.has_account(agent) {
        return Err(LedgerError::NoAccount(agent.to_string()));
    }
    if let Some(job) = ledger.crafts.get(agent) {
        return Err(LedgerError::AlreadyCrafting {
            agent: agent.to_string(),
            recipe: job.recipe.clone(),
        });
    }
    for (item, qty) in recipe.inputs {
        let held = ledger.holding(agent, item);
        if held < *qty {
            return Err(LedgerError::InsufficientInventory {
                agent: agent.to_string(),
                item: item.to_string(),
                needed: *qty,
                available: held,
            });
        }
    }
    for (item, qty) in recipe.inputs {
        ledger.debit_inventory(agent, item, *qty)?;
    }
    ledger.crafts.insert(
        agent.to_string(),
        CraftJob {
            recipe: recipe.name.to_string(),
            started_tick: ledger.current_tick,
            duration: recipe.ticks,
        },
    );
    Ok(())
}

/// Credit the recipe output once the job has run its full duration.
pub fn complete_craft(ledger: &mut Ledger, agent: &str, recipe_name: &str) -> Result<(String, u32), LedgerError> {
    let job = match ledger.crafts.get(agent) {
        Some(job) if job.recipe == recipe_name => job.clone(),
        _ => {
            return Err(LedgerError::NoActiveCraft {
                agent: agent.to_string(),
                recipe: recipe_name.to_string(),
            })
        }
    };
    let remaining = job.remaining(ledger.current_tick);
    if remaining > 0 {
        return Err(LedgerError::CraftNotReady {
            agent: agent.to_string(),
            recipe: job.recipe,
            remaining,
        });
    }
    let recipe = catalogue::recipe(&job.recipe)
        .ok_or_else(|| LedgerError::UnknownRecipe(job.recipe.clone()))?;
    ledger.credit_inventory(agent, recipe.output, recipe.output_quantity)?;
    ledger.crafts.remove(agent);
    Ok((recipe.output.to_string(), recipe.output_quantity))
}

/// Credit a granted gather, opening the account on first contact. Agents
/// removed as bankrupt stay out until they join again.
pub fn credit_gather(ledger: &mut Ledger, result: &GatherResult, cfg: &BankerConfig) -> Result<bool, LedgerError> {
    if !result.success || result.quantity == 0 {
        return Ok(false);
    }
    if ledger.retired.contains(&result.agent_id) {
        return Err(LedgerError::Retired(result.agent_id.clone()));
    }
    ledger.open_account(&result.agent_id, cfg.starting_wallet);
    ledger.credit_inventory(&result.agent_id, &result.item, result.quantity)?;
    Ok(true)
}

pub fn record_heartbeat(ledger: &mut Ledger, agent: &str) -> Result<(), LedgerError> {
    let tick = ledger.current_tick;
    let account = ledger
        .accounts
        .get_mut(agent)
        .ok_or_else(|| LedgerError::NoAccount(agent.to_string()))?;
    account.last_heartbeat_tick = Some(tick);
    account.active = true;
    Ok(())
}

/// Remove each listed agent that is bankrupt. Returns the removed ids.
pub fn sweep_bankrupt(ledger: &mut Ledger, agents: &[&str]) -> Vec<String> {
    let mut removed = Vec::new();
    for agent in agents {
        if ledger.is_bankrupt(agent) {
            ledger.remove_agent(agent);
            removed.push(agent.to_string());
        }
    }
    removed
}

/// Tick boundary: purge expired orders, charge rent if configured, flag
/// silent accounts inactive.
pub fn advance_tick(ledger: &mut Ledger, tick: u64, cfg: &BankerConfig) -> TickReport {
    let mut report = TickReport::default();
    ledger.current_tick = tick;
    report.expired_orders = ledger.purge_expired_orders();

    let agents: Vec<String> = ledger.accounts.keys().cloned().collect();
    if let Some(rent) = cfg.rent_per_tick {
        for agent in &agents {
            if let Some(account) = ledger.accounts.get_mut(agent) {
                let charge = rent.min(account.wallet);
                account.wallet -= charge;
                report.rent_collected = report.rent_collected.saturating_add(charge);
            }
        }
        let refs: Vec<&str> = agents.iter().map(String::as_str).collect();
        report.bankrupt = sweep_bankrupt(ledger, &refs);
    }

    for (agent, account) in ledger.accounts.iter_mut() {
        if let Some(last) = account.last_heartbeat_tick {
            if account.active && tick.saturating_sub(last) > cfg.heartbeat_timeout_ticks {
                account.active = false;
                report.deactivated.push(agent.clone());
            }
        }
    }
    report
}
