use std::collections::BTreeMap;
use std::str::FromStr;

use anyhow::Result;
use rusqlite::{params, Connection};
use rust_decimal::Decimal;

use crate::banker::state::Ledger;

/// Periodic ledger snapshots in SQLite.
pub struct LedgerStore {
    conn: Connection,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AccountRow {
    pub agent: String,
    pub wallet: Decimal,
    pub inventory: BTreeMap<String, u32>,
    pub active: bool,
}

impl LedgerStore {
    pub fn open(path: &str) -> Result<Self> {
        Ok(Self { conn: Connection::open(path)? })
    }

    pub fn in_memory() -> Result<Self> {
        Ok(Self { conn: Connection::open_in_memory()? })
    }

    pub fn init(&mut self) -> Result<()> {
        self.conn.execute_batch(
            "BEGIN;
            CREATE TABLE IF NOT EXISTS account_snapshots (
                tick INTEGER NOT NULL,
                agent TEXT NOT NULL,
                wallet TEXT NOT NULL,
                inventory TEXT NOT NULL,
                active INTEGER NOT NULL,
                state_hash TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS order_snapshots (
                tick INTEGER NOT NULL,
                msg_id TEXT NOT NULL,
                agent TEXT NOT NULL,
                side TEXT NOT NULL,
                item TEXT NOT NULL,
                remaining INTEGER NOT NULL,
                unit_price TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_account_snapshots_tick ON account_snapshots(tick);
            COMMIT;",
        )?;
        Ok(())
    }

    /// Write every account and open order at `tick` in one transaction.
    pub fn persist_snapshot(&mut self, tick: u64, ledger: &Ledger, state_hash: &str) -> Result<()> {
        let tx = self.conn.transaction()?;
        for (agent, account) in &ledger.accounts {
            tx.execute(
                "INSERT INTO account_snapshots (tick, agent, wallet, inventory, active, state_hash)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    tick as i64,
                    agent,
                    account.wallet.to_string(),
                    serde_json::to_string(&account.inventory)?,
                    account.active as i64,
                    state_hash
                ],
            )?;
        }
        for order in ledger.orders.values() {
            tx.execute(
                "INSERT INTO order_snapshots (tick, msg_id, agent, side, item, remaining, unit_price)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    tick as i64,
                    order.msg_id,
                    order.agent,
                    order.side.as_str(),
                    order.item,
                    order.remaining as i64,
                    order.unit_price.to_string()
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn latest_tick(&self) -> Result<Option<u64>> {
        let tick: Option<i64> =
            self.conn
                .query_row("SELECT MAX(tick) FROM account_snapshots", [], |row| row.get(0))?;
        Ok(tick.map(|t| t as u64))
    }

    pub fn load_accounts(&self, tick: u64) -> Result<Vec<AccountRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT agent, wallet, inventory, active FROM account_snapshots
             WHERE tick = ?1 ORDER BY agent",
        )?;
        let rows = stmt.query_map(params![tick as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (agent, wallet, inventory, active) = row?;
            out.push(AccountRow {
                agent,
                wallet: Decimal::from_str(&wallet)?,
                inventory: serde_json::from_str(&inventory)?,
                active: active != 0,
            });
        }
        Ok(out)
    }
}
