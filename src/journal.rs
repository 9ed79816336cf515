//! Append-only message journal.
//!
//! One JSON object per line: the bus sequence number and the envelope as
//! published. Reading skips malformed lines rather than failing the replay.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::logging::{log, obj, v_str, Domain, Level};
use crate::protocol::Envelope;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub seq: u64,
    pub envelope: Envelope,
}

#[derive(Debug)]
pub struct Journal {
    file: File,
}

impl Journal {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open journal {}", path.display()))?;
        Ok(Self { file })
    }

    pub fn append(&mut self, seq: u64, envelope: &Envelope) -> Result<()> {
        let line = serde_json::to_string(&JournalEntry {
            seq,
            envelope: envelope.clone(),
        })?;
        self.file.write_all(line.as_bytes())?;
        self.file.write_all(b"\n")?;
        self.file.flush()?;
        Ok(())
    }

    /// Entries in file order. A missing file reads as empty.
    pub fn read_all(path: impl AsRef<Path>) -> Result<Vec<JournalEntry>> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(vec![]);
        }
        let reader = BufReader::new(File::open(path)?);
        let mut entries = Vec::new();
        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<JournalEntry>(&line) {
                Ok(entry) => entries.push(entry),
                Err(err) => log(
                    Level::Warn,
                    Domain::Bus,
                    "journal_skip",
                    obj(&[
                        ("line", serde_json::json!(lineno + 1)),
                        ("msg", v_str(&err.to_string())),
                    ]),
                ),
            }
        }
        Ok(entries)
    }

    /// Envelopes only, in sequence order.
    pub fn read_envelopes(path: impl AsRef<Path>) -> Result<Vec<Envelope>> {
        let mut entries = Self::read_all(path)?;
        entries.sort_by_key(|e| e.seq);
        Ok(entries.into_iter().map(|e| e.envelope).collect())
    }
}
