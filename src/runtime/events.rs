//! Session event stream payloads.

use crate::{
    core::history::MergeOutcome,
    types::{OpSeq, OperationKind},
};

/// Events emitted by a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// An operation was queued.
    Enqueued {
        /// Queued sequence.
        seq: OpSeq,
        /// Operation kind.
        kind: OperationKind,
    },
    /// A queued operation was withdrawn before submission.
    Cancelled {
        /// Withdrawn sequence.
        seq: OpSeq,
    },
    /// An operation was handed to the execution channel.
    Submitted {
        /// Submitted sequence.
        seq: OpSeq,
        /// Operation kind.
        kind: OperationKind,
    },
    /// An operation settled and was merged into history.
    Settled {
        /// Settled sequence.
        seq: OpSeq,
        /// Operation kind.
        kind: OperationKind,
        /// Outcome of the remote call.
        success: bool,
        /// Where the record landed in history.
        merge: MergeOutcome,
    },
    /// The queue ran dry.
    Drained,
    /// The journal holds every outcome up to this sequence.
    JournaledUpTo {
        /// Highest journaled sequence.
        seq: OpSeq,
    },
    /// Writing an outcome to the journal failed.
    JournalFailed {
        /// Sequence that was not written.
        seq: OpSeq,
        /// Sink error text.
        error: String,
    },
}
