use hashbrown::HashMap;

use crate::{
    product::ProductSnapshot,
    types::{ProductId, TagStatus},
};

/// `(product, tag)` row key.
pub type TagKey = (ProductId, String);

/// Per-row and per-scan tag statuses for one session.
///
/// Row statuses are set optimistically when a delete or re-add is enqueued.
/// Scan statuses record the settled outcome of the main search-and-tag flow,
/// keyed by the scan tag alone.
#[derive(Debug, Default, Clone)]
pub struct TagStatusTable {
    rows: HashMap<TagKey, TagStatus>,
    scans: HashMap<String, TagStatus>,
}

impl TagStatusTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Row status, if one was recorded.
    pub fn get(&self, product_id: &str, tag: &str) -> Option<TagStatus> {
        self.rows
            .get(&(product_id.to_string(), tag.to_string()))
            .copied()
    }

    /// Sets a row status, returning the previous one.
    pub fn set(&mut self, product_id: &str, tag: &str, status: TagStatus) -> Option<TagStatus> {
        self.rows
            .insert((product_id.to_string(), tag.to_string()), status)
    }

    /// Restores a row to `prev`, removing it when `prev` is `None`.
    pub fn restore(&mut self, product_id: &str, tag: &str, prev: Option<TagStatus>) {
        let key = (product_id.to_string(), tag.to_string());
        match prev {
            Some(status) => {
                self.rows.insert(key, status);
            }
            None => {
                self.rows.remove(&key);
            }
        }
    }

    /// Optimistic mark for an enqueued delete.
    pub fn mark_deleted(&mut self, product_id: &str, tag: &str) -> Option<TagStatus> {
        self.set(product_id, tag, TagStatus::Deleted)
    }

    /// Optimistic mark for an enqueued re-add.
    pub fn mark_readded(&mut self, product_id: &str, tag: &str) -> Option<TagStatus> {
        self.set(product_id, tag, TagStatus::Readded)
    }

    /// Records the settled outcome of a tagging scan.
    pub fn record_scan(&mut self, tag: &str, success: bool) {
        let status = if success {
            TagStatus::Success
        } else {
            TagStatus::Failure
        };
        self.scans.insert(tag.to_string(), status);
    }

    /// Outcome of the latest tagging scan with `tag`.
    pub fn scan_status(&self, tag: &str) -> Option<TagStatus> {
        self.scans.get(tag).copied()
    }

    /// Row status for display: the recorded one, else `Existing` when the
    /// product carries the tag.
    pub fn effective_status(&self, product: &ProductSnapshot, tag: &str) -> Option<TagStatus> {
        self.get(&product.id, tag)
            .or_else(|| product.has_tag(tag).then_some(TagStatus::Existing))
    }

    /// All row statuses.
    pub fn rows(&self) -> impl Iterator<Item = (&TagKey, &TagStatus)> {
        self.rows.iter()
    }

    /// Number of recorded rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Clears rows and scans.
    pub fn reset(&mut self) {
        self.rows.clear();
        self.scans.clear();
    }
}
