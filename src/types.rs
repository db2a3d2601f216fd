//! Shared primitive IDs and status enums.

use serde::{Deserialize, Serialize};

/// Monotonic operation sequence number, assigned at enqueue time.
pub type OpSeq = u64;
/// Remote product identifier (an opaque GID string).
pub type ProductId = String;
/// Remote variant identifier (an opaque GID string).
pub type VariantId = String;

/// Discriminant of a queued operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    /// Look a product up by barcode and optionally tag it.
    SearchAndTag,
    /// Remove one tag from a product.
    DeleteTag,
    /// Put one tag back on a product.
    AddTag,
    /// Re-fetch a product.
    Refresh,
}

/// Per-tag status shown next to a product row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TagStatus {
    /// The tag was already on the product.
    Existing,
    /// The scan flow applied the tag.
    Success,
    /// The scan flow failed to apply the tag.
    Failure,
    /// The user removed the tag.
    Deleted,
    /// The user put a removed tag back.
    Readded,
}

/// Expiration bucket of one inventory batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    /// Past its expiration date.
    Expired,
    /// Expires within the warning window.
    ExpiringSoon,
    /// Nothing to worry about yet.
    Normal,
}

/// Observable status of an execution channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelState {
    /// No request outstanding.
    Idle,
    /// One request in flight.
    Busy,
}

/// Why a settled operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    /// The remote search matched nothing.
    NotFound,
    /// The remote call errored or reported user errors.
    RemoteError,
}
