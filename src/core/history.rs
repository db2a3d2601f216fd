use std::collections::VecDeque;

use crate::record::ResultRecord;

/// How a record landed in history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Added as the newest entry.
    Prepended,
    /// Replaced the existing entry at `index`, which kept its position.
    Replaced {
        /// Position of the refreshed entry, newest first.
        index: usize,
    },
}

/// Settled outcomes, newest first.
#[derive(Debug, Default, Clone)]
pub struct ResultHistory {
    entries: VecDeque<ResultRecord>,
    limit: Option<usize>,
}

impl ResultHistory {
    /// Unbounded history.
    pub fn new() -> Self {
        Self::default()
    }

    /// History that drops its oldest entries past `limit`. A limit of zero
    /// still keeps the newest entry; [`SessionConfig`] refuses it outright.
    ///
    /// [`SessionConfig`]: crate::config::SessionConfig
    pub fn with_limit(limit: Option<usize>) -> Self {
        Self {
            entries: VecDeque::new(),
            limit,
        }
    }

    /// Merges `record` in; see [`merge_result`].
    pub fn merge(&mut self, record: ResultRecord) -> MergeOutcome {
        merge_result(self, record)
    }

    /// Entries, newest first.
    pub fn entries(&self) -> impl Iterator<Item = &ResultRecord> {
        self.entries.iter()
    }

    /// Entries cloned out, newest first.
    pub fn to_vec(&self) -> Vec<ResultRecord> {
        self.entries.iter().cloned().collect()
    }

    /// Entry at `index`, newest first.
    pub fn get(&self, index: usize) -> Option<&ResultRecord> {
        self.entries.get(index)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn position_of(&self, record: &ResultRecord) -> Option<usize> {
        let key = record.merge_key()?;
        self.entries
            .iter()
            .position(|entry| entry.merge_key().as_ref() == Some(&key))
    }

    fn prepend(&mut self, record: ResultRecord) {
        self.entries.push_front(record);
        if let Some(limit) = self.limit {
            self.entries.truncate(limit.max(1));
        }
    }
}

/// Folds one settled record into history.
///
/// Failures are always prepended. A success replaces, in place, the entry with
/// the same primary product and tag; otherwise it is prepended. Re-merging the
/// same successful key therefore never grows the history.
pub fn merge_result(history: &mut ResultHistory, record: ResultRecord) -> MergeOutcome {
    match history.position_of(&record) {
        Some(index) => {
            if let Some(slot) = history.entries.get_mut(index) {
                *slot = record;
            }
            MergeOutcome::Replaced { index }
        }
        None => {
            history.prepend(record);
            MergeOutcome::Prepended
        }
    }
}
