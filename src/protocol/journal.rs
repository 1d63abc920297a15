//! Event Journal
//!
//! SQLite log of committed protocol events so indexers can replay an epoch's
//! history after a restart.

use super::events::{EventRecord, ProtocolEvent};
use super::types::EpochId;
use anyhow::{Context, Result};
use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// One journal row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: String,
    pub seq: u64,
    pub ts: i64,
    pub kind: String,
    pub market_id: Option<String>,
    pub epoch_id: Option<String>,
    pub recorded_at: String,
    pub event: ProtocolEvent,
}

#[derive(Clone)]
pub struct EventJournal {
    conn: Arc<Mutex<Connection>>,
}

impl EventJournal {
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).context("open event journal")?;
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "synchronous", "NORMAL").ok();
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory event journal")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS protocol_events (
                id TEXT PRIMARY KEY,
                seq INTEGER NOT NULL UNIQUE,
                ts INTEGER NOT NULL,
                kind TEXT NOT NULL,
                market_id TEXT,
                epoch_id TEXT,
                payload TEXT NOT NULL,
                recorded_at TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_protocol_events_epoch ON protocol_events(epoch_id, seq ASC)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_protocol_events_kind ON protocol_events(kind, seq ASC)",
            [],
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Append a batch in one SQLite transaction.
    pub fn append(&self, records: &[EventRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO protocol_events (id, seq, ts, kind, market_id, epoch_id, payload, recorded_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            let recorded_at = Utc::now().to_rfc3339();
            for record in records {
                let payload = serde_json::to_string(&record.event).context("serialize event")?;
                stmt.execute(params![
                    Uuid::new_v4().to_string(),
                    record.seq as i64,
                    record.timestamp as i64,
                    record.event.kind(),
                    record.event.market_id().map(|m| m.to_hex()),
                    record.event.epoch_id().map(|e| e.to_hex()),
                    payload,
                    recorded_at,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Sequence number that follows the last journaled event.
    pub fn next_seq(&self) -> Result<u64> {
        let conn = self.conn.lock();
        let next: i64 = conn.query_row(
            "SELECT COALESCE(MAX(seq) + 1, 0) FROM protocol_events",
            [],
            |row| row.get(0),
        )?;
        Ok(next as u64)
    }

    pub fn count(&self) -> Result<u64> {
        let conn = self.conn.lock();
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM protocol_events", [], |row| row.get(0))?;
        Ok(n as u64)
    }

    /// Events attributed to `epoch_id`, in commit order.
    pub fn load_for_epoch(&self, epoch_id: EpochId) -> Result<Vec<JournalEntry>> {
        self.query(
            "SELECT id, seq, ts, kind, market_id, epoch_id, payload, recorded_at \
             FROM protocol_events WHERE epoch_id = ?1 ORDER BY seq ASC",
            &epoch_id.to_hex(),
        )
    }

    pub fn load_by_kind(&self, kind: &str) -> Result<Vec<JournalEntry>> {
        self.query(
            "SELECT id, seq, ts, kind, market_id, epoch_id, payload, recorded_at \
             FROM protocol_events WHERE kind = ?1 ORDER BY seq ASC",
            kind,
        )
    }

    fn query(&self, sql: &str, arg: &str) -> Result<Vec<JournalEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(sql)?;
        let rows = stmt.query_map(params![arg], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, String>(7)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (id, seq, ts, kind, market_id, epoch_id, payload, recorded_at) = row?;
            let event: ProtocolEvent = serde_json::from_str(&payload)
                .with_context(|| format!("decode journal row {}", id))?;
            out.push(JournalEntry {
                id,
                seq: seq as u64,
                ts,
                kind,
                market_id,
                epoch_id,
                recorded_at,
                event,
            });
        }
        Ok(out)
    }
}
