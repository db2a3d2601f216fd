pub mod sqlite;

use crate::{op::JournalEntry, types::OpSeq};

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serde: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("{0}")]
    Message(String),
}

pub type PersistResult<T> = Result<T, PersistError>;

/// Destination for settled outcomes.
pub trait HistorySink: Send {
    /// Appends entries in order, returning the highest sequence written.
    fn append_entries(&mut self, entries: &[JournalEntry]) -> PersistResult<OpSeq>;
    fn flush(&mut self) -> PersistResult<()> {
        Ok(())
    }
}
