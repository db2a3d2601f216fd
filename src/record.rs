//! Settled operation outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    product::ProductSnapshot,
    types::{FailureKind, OpSeq},
};

/// Error text prefix for a barcode scan with no match.
pub const NO_MATCHING_BARCODE: &str = "No Matching Barcode";

/// Outcome of one settled operation, as kept in history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    /// Sequence of the operation that produced this record.
    pub op_seq: OpSeq,
    /// True when the remote call completed as intended.
    pub success: bool,
    /// Tag the operation applied or removed.
    pub tag_used: Option<String>,
    /// Products involved, primary product first.
    pub products: Vec<ProductSnapshot>,
    /// Error message on failure.
    pub error: Option<String>,
    /// Failure bucket on failure.
    pub failure: Option<FailureKind>,
    /// Settlement time.
    pub timestamp: DateTime<Utc>,
}

/// Merge identity of a successful record: primary product id and tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MergeKey<'a> {
    /// Primary product id.
    pub product_id: &'a str,
    /// Tag used, if any.
    pub tag_used: Option<&'a str>,
}

impl ResultRecord {
    /// Successful outcome.
    pub fn success(
        op_seq: OpSeq,
        products: Vec<ProductSnapshot>,
        tag_used: Option<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            op_seq,
            success: true,
            tag_used,
            products,
            error: None,
            failure: None,
            timestamp,
        }
    }

    /// Failure for a scanned barcode nothing matched.
    pub fn not_found(
        op_seq: OpSeq,
        barcode: &str,
        tag_used: Option<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            op_seq,
            success: false,
            tag_used,
            products: vec![ProductSnapshot::unmatched_barcode(barcode)],
            error: Some(format!("{NO_MATCHING_BARCODE}: {barcode}")),
            failure: Some(FailureKind::NotFound),
            timestamp,
        }
    }

    /// Failure for a remote call that errored.
    pub fn remote_error(
        op_seq: OpSeq,
        message: impl Into<String>,
        tag_used: Option<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self::failure(op_seq, FailureKind::RemoteError, message, tag_used, timestamp)
    }

    /// Failure of the given kind with no product rows.
    pub fn failure(
        op_seq: OpSeq,
        kind: FailureKind,
        message: impl Into<String>,
        tag_used: Option<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            op_seq,
            success: false,
            tag_used,
            products: Vec::new(),
            error: Some(message.into()),
            failure: Some(kind),
            timestamp,
        }
    }

    /// Identity used to merge into history. Failures and successes without a
    /// product have none and are always added as new entries.
    pub fn merge_key(&self) -> Option<MergeKey<'_>> {
        if !self.success {
            return None;
        }
        let product = self.products.first()?;
        Some(MergeKey {
            product_id: product.id.as_str(),
            tag_used: self.tag_used.as_deref(),
        })
    }

    /// Primary product, if any.
    pub fn primary(&self) -> Option<&ProductSnapshot> {
        self.products.first()
    }
}
