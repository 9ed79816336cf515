//! Replay a message journal through fresh Governor and Banker instances.
//!
//! Usage: `replay <journal.jsonl>` or pipe envelopes (one JSON per line) on
//! stdin. Runs the log twice and fails if the two passes disagree.

use std::io::{self, BufRead};

use anyhow::{bail, Result};
use serde_json::json;

use streetmarket::banker::Banker;
use streetmarket::config::Config;
use streetmarket::governor::Governor;
use streetmarket::journal::Journal;
use streetmarket::protocol::{Envelope, MessageType};
use streetmarket::service::Service;
use streetmarket::verify::{assert_ledger_invariants, assert_order_progress};

struct Pass {
    governor: String,
    banker: String,
    verdicts: usize,
    rejections: usize,
    settlements: usize,
    violations: Vec<String>,
}

fn run_pass(cfg: &Config, log: &[Envelope]) -> Pass {
    let mut governor = Governor::new(cfg.governor_limits());
    let mut banker = Banker::new(cfg.banker_config());
    let mut pass = Pass {
        governor: String::new(),
        banker: String::new(),
        verdicts: 0,
        rejections: 0,
        settlements: 0,
        violations: vec![],
    };
    for envelope in log {
        for out in governor.handle(envelope) {
            pass.verdicts += 1;
            if out.payload.get("valid") == Some(&json!(false)) {
                pass.rejections += 1;
            }
        }
        let before = banker.ledger().orders.clone();
        for out in banker.handle(envelope) {
            if out.kind == MessageType::Settlement {
                pass.settlements += 1;
            }
        }
        if let Err(v) = assert_order_progress(&before, &banker.ledger().orders) {
            pass.violations.push(format!("{}: {}", envelope.id, v));
        }
        if let Err(v) = assert_ledger_invariants(banker.ledger()) {
            pass.violations.push(format!("{}: {}", envelope.id, v));
        }
    }
    pass.governor = governor.digest();
    pass.banker = banker.digest();
    pass
}

fn read_stdin() -> Vec<Envelope> {
    let stdin = io::stdin();
    let mut out = Vec::new();
    for line in stdin.lock().lines().map_while(Result::ok) {
        if line.trim().is_empty() {
            continue;
        }
        match Envelope::from_json(&line) {
            Ok(env) => out.push(env),
            Err(err) => eprintln!("bad envelope json: {}", err),
        }
    }
    out
}

fn main() -> Result<()> {
    let cfg = Config::from_env();
    let log = match std::env::args().nth(1) {
        Some(path) => Journal::read_envelopes(&path)?,
        None => read_stdin(),
    };

    let first = run_pass(&cfg, &log);
    let second = run_pass(&cfg, &log);

    println!(
        "{}",
        json!({
            "messages": log.len(),
            "verdicts": first.verdicts,
            "rejections": first.rejections,
            "settlements": first.settlements,
            "governor_digest": first.governor,
            "banker_digest": first.banker,
            "violations": first.violations,
        })
    );

    if first.governor != second.governor || first.banker != second.banker {
        bail!("replay is not deterministic");
    }
    if !first.violations.is_empty() {
        bail!("{} invariant violation(s)", first.violations.len());
    }
    Ok(())
}
