//! Operation model and journal wrappers.

use serde::{Deserialize, Serialize};

use crate::{
    record::ResultRecord,
    types::{OpSeq, OperationKind, ProductId},
};

/// Version number for serialized [`JournalEnvelope`] payloads.
pub const JOURNAL_FORMAT_VERSION: u16 = 1;

/// Kind-specific payload of a queued operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpRequest {
    /// Look up a scanned barcode, tagging the match when `tag` is set.
    SearchAndTag {
        /// Scanned barcode.
        barcode: String,
        /// Tag to apply to the match, if any.
        tag: Option<String>,
    },
    /// Remove `tag` from a product.
    DeleteTag {
        /// Target product.
        product_id: ProductId,
        /// Tag to remove.
        tag: String,
    },
    /// Add `tag` back onto a product.
    AddTag {
        /// Target product.
        product_id: ProductId,
        /// Tag to add.
        tag: String,
    },
    /// Re-fetch a product.
    Refresh {
        /// Target product.
        product_id: ProductId,
    },
}

impl OpRequest {
    /// Returns the operation discriminant.
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::SearchAndTag { .. } => OperationKind::SearchAndTag,
            Self::DeleteTag { .. } => OperationKind::DeleteTag,
            Self::AddTag { .. } => OperationKind::AddTag,
            Self::Refresh { .. } => OperationKind::Refresh,
        }
    }

    /// Trims tag and barcode text; a blank scan tag becomes `None`.
    pub fn normalized(self) -> Self {
        match self {
            Self::SearchAndTag { barcode, tag } => Self::SearchAndTag {
                barcode: barcode.trim().to_string(),
                tag: tag
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty()),
            },
            Self::DeleteTag { product_id, tag } => Self::DeleteTag {
                product_id,
                tag: tag.trim().to_string(),
            },
            Self::AddTag { product_id, tag } => Self::AddTag {
                product_id,
                tag: tag.trim().to_string(),
            },
            Self::Refresh { product_id } => Self::Refresh { product_id },
        }
    }

    /// Returns the `(product, tag)` row an optimistic mark applies to.
    pub fn row_key(&self) -> Option<(&str, &str)> {
        match self {
            Self::DeleteTag { product_id, tag } | Self::AddTag { product_id, tag } => {
                Some((product_id.as_str(), tag.as_str()))
            }
            _ => None,
        }
    }

    /// Tag this request applies or removes, if any.
    pub fn tag(&self) -> Option<&str> {
        match self {
            Self::SearchAndTag { tag, .. } => tag.as_deref(),
            Self::DeleteTag { tag, .. } | Self::AddTag { tag, .. } => Some(tag.as_str()),
            Self::Refresh { .. } => None,
        }
    }

    /// Returns the top-level scan tag, if this is a tagging scan.
    pub fn scan_tag(&self) -> Option<&str> {
        match self {
            Self::SearchAndTag { tag, .. } => tag.as_deref(),
            _ => None,
        }
    }
}

/// Immutable unit of queued work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    /// Enqueue sequence; FIFO order is `seq` order.
    pub seq: OpSeq,
    /// Operation payload.
    pub request: OpRequest,
}

impl Operation {
    /// Returns the operation discriminant.
    pub fn kind(&self) -> OperationKind {
        self.request.kind()
    }
}

/// One settled operation as written to the journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Sequence of the settled operation.
    pub seq: OpSeq,
    /// Kind of the settled operation.
    pub kind: OperationKind,
    /// Outcome merged into history.
    pub record: ResultRecord,
}

/// Versioned wrapper for stable on-disk payload decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEnvelope {
    /// Payload format version.
    pub format_version: u16,
    /// Wrapped entry.
    pub entry: JournalEntry,
}

impl JournalEnvelope {
    /// Constructs an envelope using [`JOURNAL_FORMAT_VERSION`].
    pub fn new(entry: JournalEntry) -> Self {
        Self {
            format_version: JOURNAL_FORMAT_VERSION,
            entry,
        }
    }
}
