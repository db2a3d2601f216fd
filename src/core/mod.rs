//! In-memory session state: queue, history, and tag statuses.

/// Result history and merge rule.
pub mod history;
/// Pending operation FIFO.
pub mod queue;
/// Session aggregate driving queue, history, and statuses together.
pub mod session;
/// Optimistic and settled tag statuses.
pub mod tag_status;
