//! Structured JSON logging for the market authorities.
//!
//! Every record is one JSON line carrying run id, sequence, level, domain and
//! event name. Records go to stdout and to per-run files under `LOG_DIR`:
//! `events.jsonl` (info and above), `trace.jsonl` (debug/trace) and
//! `audit.jsonl` (digests and snapshots, for replay comparison).
//!
//! Filtering: `LOG_LEVEL` (trace..fatal, default info) and `LOG_DOMAINS`
//! (comma list or `all`).

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};

// =============================================================================
// Log Levels
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
    Fatal = 5,
}

impl Level {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "trace" => Some(Level::Trace),
            "debug" => Some(Level::Debug),
            "info" => Some(Level::Info),
            "warn" => Some(Level::Warn),
            "error" => Some(Level::Error),
            "fatal" => Some(Level::Fatal),
            _ => None,
        }
    }

    pub fn from_env() -> Self {
        std::env::var("LOG_LEVEL")
            .ok()
            .and_then(|v| Level::parse(&v.to_lowercase()))
            .unwrap_or(Level::Info)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Fatal => "fatal",
        }
    }
}

// =============================================================================
// Log Domains
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Protocol, // Decode failures, malformed envelopes
    Governor, // Verdicts
    Banker,   // Ledger mutations, refusals
    World,    // Ticks, spawns, gathers
    Bus,      // Publish/subscribe plumbing
    System,   // Startup, shutdown, config
    Audit,    // Digests and snapshots
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Protocol => "protocol",
            Domain::Governor => "governor",
            Domain::Banker => "banker",
            Domain::World => "world",
            Domain::Bus => "bus",
            Domain::System => "system",
            Domain::Audit => "audit",
        }
    }

    pub fn is_enabled(&self) -> bool {
        match std::env::var("LOG_DOMAINS").as_deref() {
            Ok("all") | Err(_) => true,
            Ok(domains) => domains.split(',').any(|d| d.trim() == self.as_str()),
        }
    }
}

// =============================================================================
// Run context
// =============================================================================

static LOG_SEQ: AtomicU64 = AtomicU64::new(0);
static RUN_CONTEXT: OnceLock<RunContext> = OnceLock::new();

fn next_seq() -> u64 {
    LOG_SEQ.fetch_add(1, Ordering::SeqCst)
}

#[derive(Debug)]
struct RunContext {
    run_id: String,
    events: Option<Mutex<BufWriter<File>>>,
    trace: Option<Mutex<BufWriter<File>>>,
    audit: Option<Mutex<BufWriter<File>>>,
}

fn open_sink(path: PathBuf) -> Option<Mutex<BufWriter<File>>> {
    match File::create(&path) {
        Ok(f) => Some(Mutex::new(BufWriter::new(f))),
        Err(err) => {
            eprintln!("[log] failed to create {}: {}", path.display(), err);
            None
        }
    }
}

fn ensure_run_context() -> &'static RunContext {
    RUN_CONTEXT.get_or_init(|| {
        let run_id = std::env::var("RUN_ID")
            .unwrap_or_else(|_| format!("r-{}-{}", ts_epoch_ms(), process::id()));
        let base = std::env::var("LOG_DIR").unwrap_or_else(|_| "out/runs".to_string());
        let mut run_dir = PathBuf::from(base);
        run_dir.push(&run_id);
        if let Err(err) = create_dir_all(&run_dir) {
            eprintln!("[log] failed to create run dir: {}", err);
        }

        let _ = std::fs::write(
            run_dir.join("manifest.json"),
            json!({
                "run_id": run_id,
                "ts": ts_now(),
                "pid": process::id(),
                "log_dir": run_dir.to_string_lossy(),
            })
            .to_string(),
        );

        RunContext {
            events: open_sink(run_dir.join("events.jsonl")),
            trace: open_sink(run_dir.join("trace.jsonl")),
            audit: open_sink(run_dir.join("audit.jsonl")),
            run_id,
        }
    })
}

fn write_line(writer: &Option<Mutex<BufWriter<File>>>, line: &str) {
    if let Some(writer) = writer {
        if let Ok(mut w) = writer.lock() {
            let _ = writeln!(w, "{}", line);
            let _ = w.flush();
        }
    }
}

/// Lift correlation keys out of `data` onto the top level of the record.
fn split_fields(mut fields: Map<String, Value>) -> (Map<String, Value>, Map<String, Value>) {
    let mut top = Map::new();
    for key in ["msg_id", "agent", "tick", "msg"] {
        if let Some(value) = fields.remove(key) {
            top.insert(key.to_string(), value);
        }
    }
    (top, fields)
}

// =============================================================================
// Core logging functions
// =============================================================================

/// RFC3339 timestamp with milliseconds
pub fn ts_now() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

pub fn ts_epoch_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

/// Emit a structured log entry
pub fn log(level: Level, domain: Domain, event: &str, fields: Map<String, Value>) {
    if level < Level::from_env() || !domain.is_enabled() {
        return;
    }
    emit_record(level, domain, event, fields);
}

fn emit_record(level: Level, domain: Domain, event: &str, fields: Map<String, Value>) {
    let ctx = ensure_run_context();
    let (mut top, data) = split_fields(fields);

    let msg = top.remove("msg").unwrap_or(Value::String(String::new()));
    let mut entry = Map::new();
    entry.insert("ts".to_string(), json!(ts_now()));
    entry.insert("run_id".to_string(), json!(ctx.run_id.clone()));
    entry.insert("seq".to_string(), json!(next_seq()));
    entry.insert("lvl".to_string(), json!(level.as_str().to_uppercase()));
    entry.insert("component".to_string(), json!(domain.as_str()));
    entry.insert("event".to_string(), json!(event));
    entry.insert("msg".to_string(), msg);
    for (k, v) in top {
        entry.insert(k, v);
    }
    entry.insert("data".to_string(), Value::Object(data));

    let line = Value::Object(entry).to_string();
    if domain == Domain::Audit {
        write_line(&ctx.audit, &line);
    }
    match level {
        Level::Trace | Level::Debug => write_line(&ctx.trace, &line),
        _ => write_line(&ctx.events, &line),
    }
    println!("{}", line);
}

// =============================================================================
// Domain helpers
// =============================================================================

/// Governor verdict on one message.
pub fn log_verdict(msg_id: &str, agent: &str, action: &str, valid: bool, reason: Option<&str>) {
    let level = if valid { Level::Debug } else { Level::Info };
    log(
        level,
        Domain::Governor,
        "verdict",
        obj(&[
            ("msg_id", v_str(msg_id)),
            ("agent", v_str(agent)),
            ("action", v_str(action)),
            ("valid", json!(valid)),
            ("reason", reason.map(v_str).unwrap_or(Value::Null)),
        ]),
    );
    agg_increment(if valid { "accepted" } else { "rejected" });
}

pub fn log_settlement(
    msg_id: &str,
    buyer: &str,
    seller: &str,
    item: &str,
    quantity: u32,
    total: &str,
) {
    log(
        Level::Info,
        Domain::Banker,
        "settlement",
        obj(&[
            ("msg_id", v_str(msg_id)),
            ("buyer", v_str(buyer)),
            ("seller", v_str(seller)),
            ("item", v_str(item)),
            ("quantity", json!(quantity)),
            ("total_price", v_str(total)),
        ]),
    );
    agg_increment("settlement");
}

/// A message the Banker declined to apply.
pub fn log_refusal(msg_id: &str, agent: &str, reason: &str) {
    log(
        Level::Warn,
        Domain::Banker,
        "refused",
        obj(&[
            ("msg_id", v_str(msg_id)),
            ("agent", v_str(agent)),
            ("msg", v_str(reason)),
        ]),
    );
    agg_increment("refusal");
}

pub fn log_tick(tick: u64, spawn_id: &str, items: &[(&str, u32)]) {
    let spawned: Map<String, Value> = items
        .iter()
        .map(|(k, v)| (k.to_string(), json!(v)))
        .collect();
    log(
        Level::Info,
        Domain::World,
        "tick",
        obj(&[
            ("tick", json!(tick)),
            ("spawn_id", v_str(spawn_id)),
            ("items", Value::Object(spawned)),
        ]),
    );
}

pub fn log_gather(agent: &str, item: &str, requested: u32, granted: u32, reason: Option<&str>) {
    log(
        Level::Debug,
        Domain::World,
        "gather",
        obj(&[
            ("agent", v_str(agent)),
            ("item", v_str(item)),
            ("requested", json!(requested)),
            ("granted", json!(granted)),
            ("reason", reason.map(v_str).unwrap_or(Value::Null)),
        ]),
    );
    agg_increment("gather");
}

pub fn log_decode_error(msg_id: &str, agent: &str, err: &str) {
    log(
        Level::Warn,
        Domain::Protocol,
        "decode_error",
        obj(&[
            ("msg_id", v_str(msg_id)),
            ("agent", v_str(agent)),
            ("msg", v_str(err)),
        ]),
    );
}

/// State digest for replay comparison.
pub fn log_digest(service: &str, tick: u64, digest: &str) {
    log(
        Level::Info,
        Domain::Audit,
        "digest",
        obj(&[
            ("service", v_str(service)),
            ("tick", json!(tick)),
            ("state_hash", v_str(digest)),
        ]),
    );
}

// =============================================================================
// Field helpers
// =============================================================================

pub fn obj(pairs: &[(&str, Value)]) -> Map<String, Value> {
    let mut map = Map::new();
    for (k, v) in pairs {
        map.insert((*k).to_string(), v.clone());
    }
    map
}

pub fn v_str(s: &str) -> Value {
    Value::String(s.to_string())
}

// =============================================================================
// Per-tick activity counters
// =============================================================================

static AGGREGATOR: OnceLock<Mutex<LogAggregator>> = OnceLock::new();

fn get_aggregator() -> &'static Mutex<LogAggregator> {
    AGGREGATOR.get_or_init(|| Mutex::new(LogAggregator::default()))
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct LogAggregator {
    accepted: u64,
    rejected: u64,
    settlements: u64,
    refusals: u64,
    gathers: u64,
}

impl LogAggregator {
    fn increment(&mut self, event: &str) {
        match event {
            "accepted" => self.accepted += 1,
            "rejected" => self.rejected += 1,
            "settlement" => self.settlements += 1,
            "refusal" => self.refusals += 1,
            "gather" => self.gathers += 1,
            _ => {}
        }
    }

    fn take(&mut self) -> LogAggregator {
        std::mem::take(self)
    }
}

/// Emit and reset the activity counters. Called once per tick.
pub fn flush_tick_summary(tick: u64) {
    if let Ok(mut agg) = get_aggregator().lock() {
        let s = agg.take();
        log(
            Level::Info,
            Domain::System,
            "tick_summary",
            obj(&[
                ("tick", json!(tick)),
                ("accepted", json!(s.accepted)),
                ("rejected", json!(s.rejected)),
                ("settlements", json!(s.settlements)),
                ("refusals", json!(s.refusals)),
                ("gathers", json!(s.gathers)),
            ]),
        );
    }
}

pub fn agg_increment(event: &str) {
    if let Ok(mut agg) = get_aggregator().lock() {
        agg.increment(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(Level::Trace < Level::Debug);
        assert!(Level::Debug < Level::Info);
        assert!(Level::Info < Level::Warn);
        assert!(Level::Warn < Level::Error);
        assert!(Level::Error < Level::Fatal);
    }

    #[test]
    fn test_level_parse() {
        assert_eq!(Level::parse("warn"), Some(Level::Warn));
        assert_eq!(Level::parse("loud"), None);
    }

    #[test]
    fn test_obj_helper() {
        let m = obj(&[("key", v_str("value")), ("num", json!(42.0))]);
        assert_eq!(m["key"], "value");
        assert_eq!(m["num"], 42.0);
    }

    #[test]
    fn test_split_lifts_correlation_keys() {
        let (top, data) = split_fields(obj(&[
            ("agent", v_str("chef-01")),
            ("item", v_str("soup")),
        ]));
        assert!(top.contains_key("agent"));
        assert!(data.contains_key("item"));
        assert!(!data.contains_key("agent"));
    }

    #[test]
    fn test_aggregator_resets_on_take() {
        let mut agg = LogAggregator::default();
        agg.increment("accepted");
        agg.increment("accepted");
        agg.increment("settlement");
        agg.increment("unknown");
        let snap = agg.take();
        assert_eq!(snap.accepted, 2);
        assert_eq!(snap.settlements, 1);
        assert_eq!(agg, LogAggregator::default());
    }

    #[test]
    fn test_seq_increments() {
        let s1 = next_seq();
        let s2 = next_seq();
        assert!(s2 > s1);
    }
}
