//! SQLite-backed append-only journal of settled outcomes.

use std::path::Path;

use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use crate::{
    config::SessionConfig,
    core::{
        history::{ResultHistory, merge_result},
        session::SessionState,
    },
    op::{JOURNAL_FORMAT_VERSION, JournalEntry, JournalEnvelope},
    types::{OpSeq, OperationKind},
};

use super::{HistorySink, PersistResult};

/// SQLite implementation of [`crate::persist::HistorySink`].
pub struct SqliteHistorySink {
    conn: Connection,
}

impl SqliteHistorySink {
    /// Opens or creates a journal at `path`.
    ///
    /// Enables WAL mode and sets `synchronous=NORMAL`.
    pub fn open(path: impl AsRef<Path>) -> PersistResult<Self> {
        let conn = Connection::open(path)?;
        Self::init_connection(conn)
    }

    /// Opens an in-memory journal.
    pub fn open_in_memory() -> PersistResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_connection(conn)
    }

    fn init_connection(conn: Connection) -> PersistResult<Self> {
        conn.execute_batch(include_str!("schema.sql"))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(Self { conn })
    }

    /// Every entry in write order.
    pub fn load_entries(&self) -> PersistResult<Vec<JournalEntry>> {
        self.query_entries("SELECT payload FROM journal ORDER BY id ASC", [])
    }

    /// Entries whose primary product is `product_id`, in write order.
    pub fn entries_for_product(&self, product_id: &str) -> PersistResult<Vec<JournalEntry>> {
        self.query_entries(
            "SELECT payload FROM journal WHERE product_id = ?1 ORDER BY id ASC",
            params![product_id],
        )
    }

    /// Rebuilds history by replaying every entry through the merge rule.
    /// Also returns the highest journaled sequence.
    pub fn load_history(&self, limit: Option<usize>) -> PersistResult<(ResultHistory, OpSeq)> {
        let mut history = ResultHistory::with_limit(limit);
        let mut last_seq = 0;
        for entry in self.load_entries()? {
            last_seq = last_seq.max(entry.seq);
            merge_result(&mut history, entry.record);
        }
        debug!(entries = history.len(), last_seq, "replayed journal");
        Ok((history, last_seq))
    }

    /// Fresh session state seeded with the journaled history.
    pub fn load_session(&self, config: &SessionConfig) -> PersistResult<SessionState> {
        let (history, last_seq) = self.load_history(config.history_limit)?;
        Ok(SessionState::with_config(config).with_history(history, last_seq))
    }

    /// Highest sequence in the journal.
    pub fn latest_seq(&self) -> PersistResult<OpSeq> {
        let seq: Option<i64> = self
            .conn
            .query_row("SELECT MAX(seq) FROM journal", [], |row| row.get(0))
            .optional()?
            .flatten();
        Ok(seq.unwrap_or(0) as OpSeq)
    }

    fn query_entries(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> PersistResult<Vec<JournalEntry>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, |row| {
            let payload: Vec<u8> = row.get(0)?;
            decode_entry_payload(&payload).map_err(|err| {
                rusqlite::Error::FromSqlConversionFailure(
                    payload.len(),
                    rusqlite::types::Type::Blob,
                    Box::new(std::io::Error::other(err)),
                )
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

impl HistorySink for SqliteHistorySink {
    fn append_entries(&mut self, entries: &[JournalEntry]) -> PersistResult<OpSeq> {
        if entries.is_empty() {
            return self.latest_seq();
        }

        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO journal(seq, ts_ms, kind, success, product_id, tag_used, payload) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for entry in entries {
                let payload = serde_json::to_vec(&JournalEnvelope::new(entry.clone()))?;
                let record = &entry.record;
                stmt.execute(params![
                    entry.seq as i64,
                    record.timestamp.timestamp_millis(),
                    kind_name(entry.kind),
                    record.success,
                    record.primary().map(|p| p.id.as_str()),
                    record.tag_used.as_deref(),
                    payload,
                ])?;
            }
        }
        tx.commit()?;

        Ok(entries.iter().map(|e| e.seq).max().unwrap_or(0))
    }

    fn flush(&mut self) -> PersistResult<()> {
        self.conn.execute_batch("PRAGMA wal_checkpoint(PASSIVE);")?;
        Ok(())
    }
}

fn kind_name(kind: OperationKind) -> &'static str {
    match kind {
        OperationKind::SearchAndTag => "search_and_tag",
        OperationKind::DeleteTag => "delete_tag",
        OperationKind::AddTag => "add_tag",
        OperationKind::Refresh => "refresh",
    }
}

fn decode_entry_payload(payload: &[u8]) -> Result<JournalEntry, String> {
    let envelope: JournalEnvelope =
        serde_json::from_slice(payload).map_err(|e| format!("journal payload decode failed: {e}"))?;
    if envelope.format_version != JOURNAL_FORMAT_VERSION {
        return Err(format!(
            "unsupported journal format version: {}",
            envelope.format_version
        ));
    }
    Ok(envelope.entry)
}

