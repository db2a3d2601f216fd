//! [`ExecutionChannel`] backed by a [`Catalog`], running each submission as
//! a spawned task.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, error};

use crate::{
    catalog::Catalog,
    op::Operation,
    record::ResultRecord,
    types::ChannelState,
};

use super::{ChannelError, ExecutionChannel, executor};

/// Single-outstanding-request fetcher over a shared catalog.
pub struct FetcherChannel<C: Catalog> {
    catalog: Arc<C>,
    state_tx: Arc<watch::Sender<ChannelState>>,
    last: Arc<Mutex<Option<ResultRecord>>>,
}

impl<C: Catalog> FetcherChannel<C> {
    /// Channel over `catalog`. Must be driven from inside a tokio runtime.
    pub fn new(catalog: Arc<C>) -> Self {
        let (state_tx, _) = watch::channel(ChannelState::Idle);
        Self {
            catalog,
            state_tx: Arc::new(state_tx),
            last: Arc::new(Mutex::new(None)),
        }
    }

    /// The catalog calls go to.
    pub fn catalog(&self) -> &Arc<C> {
        &self.catalog
    }
}

impl<C: Catalog> ExecutionChannel for FetcherChannel<C> {
    fn submit(&mut self, op: &Operation) -> Result<(), ChannelError> {
        if *self.state_tx.borrow() == ChannelState::Busy {
            return Err(ChannelError::Busy);
        }
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = None;
        self.state_tx.send_replace(ChannelState::Busy);
        debug!(seq = op.seq, kind = ?op.kind(), "submitted");

        let catalog = Arc::clone(&self.catalog);
        let work_op = op.clone();
        let work = tokio::spawn(async move {
            executor::execute(&*catalog, &work_op, Utc::now()).await
        });

        let seq = op.seq;
        let tag = op.request.tag().map(str::to_string);
        let last = Arc::clone(&self.last);
        let state_tx = Arc::clone(&self.state_tx);
        tokio::spawn(async move {
            let record = match work.await {
                Ok(record) => record,
                Err(err) => {
                    error!(seq, error = %err, "execution task aborted");
                    ResultRecord::remote_error(
                        seq,
                        format!("execution aborted: {err}"),
                        tag,
                        Utc::now(),
                    )
                }
            };
            *last.lock().unwrap_or_else(PoisonError::into_inner) = Some(record);
            state_tx.send_replace(ChannelState::Idle);
        });
        Ok(())
    }

    fn state(&self) -> ChannelState {
        *self.state_tx.borrow()
    }

    fn last_result(&self) -> Option<ResultRecord> {
        self.last
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn subscribe_state(&self) -> Option<watch::Receiver<ChannelState>> {
        Some(self.state_tx.subscribe())
    }
}
