//! Execution channel: the single-outstanding-request primitive the
//! dispatcher submits operations to.

use tokio::sync::watch;

use crate::{op::Operation, record::ResultRecord, types::ChannelState};

pub mod executor;
pub mod fetcher;

/// Errors from [`ExecutionChannel::submit`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    /// A submission is already outstanding.
    #[error("execution channel is busy")]
    Busy,
    /// The channel can no longer accept work.
    #[error("execution channel unavailable: {0}")]
    Unavailable(String),
}

/// A fetcher that runs at most one remote call at a time.
///
/// Contract: a successful [`submit`](Self::submit) clears the previous result
/// and leaves the channel [`Busy`](ChannelState::Busy) until the call has
/// settled, at which point the state returns to
/// [`Idle`](ChannelState::Idle) and [`last_result`](Self::last_result) holds
/// the outcome.
pub trait ExecutionChannel: Send + 'static {
    /// Starts the remote call for `op`.
    fn submit(&mut self, op: &Operation) -> Result<(), ChannelError>;

    /// Current state.
    fn state(&self) -> ChannelState;

    /// Outcome of the latest settled submission.
    fn last_result(&self) -> Option<ResultRecord>;

    /// State change notifications, for channels that can push them. Channels
    /// returning `None` are polled.
    fn subscribe_state(&self) -> Option<watch::Receiver<ChannelState>> {
        None
    }
}
