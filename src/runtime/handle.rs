use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError,
    atomic::{AtomicBool, Ordering},
};

use chrono::Utc;
use tokio::{
    sync::{Mutex as AsyncMutex, Notify, broadcast, mpsc, oneshot, watch},
    task::JoinHandle,
    time::Duration,
};
use tracing::{debug, info, instrument, warn};

use crate::{
    channel::ExecutionChannel,
    config::SessionConfig,
    core::session::{SessionError, SessionState},
    op::{JournalEntry, OpRequest, Operation},
    persist::{HistorySink, PersistError},
    product::ProductSnapshot,
    record::ResultRecord,
    types::{ChannelState, OpSeq, TagStatus},
};

use super::events::SessionEvent;

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Persist(#[from] PersistError),
    #[error("session runtime channel closed")]
    ChannelClosed,
}

/// Whether the dispatcher is working through the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    Idle,
    Draining,
}

struct Shared {
    state: Mutex<SessionState>,
    work: Notify,
    // Read and written only while `state` is locked.
    closing: AtomicBool,
    events_tx: broadcast::Sender<SessionEvent>,
    dispatcher_tx: watch::Sender<DispatcherState>,
    journal_tx: Option<mpsc::Sender<JournalMsg>>,
    config: SessionConfig,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events_tx.send(event);
    }

    fn set_dispatcher(&self, next: DispatcherState) {
        self.dispatcher_tx.send_if_modified(|cur| {
            if *cur == next {
                false
            } else {
                *cur = next;
                true
            }
        });
    }
}

/// Producer-side handle to one session. Cheap to clone.
///
/// Dropping the last clone without [`shutdown`](Self::shutdown) still drains
/// the queue and closes the journal before the dispatcher exits.
#[derive(Clone)]
pub struct SessionHandle {
    shared: Arc<Shared>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
    // Never sent on; the dispatcher sees the channel close once every
    // handle is gone.
    _alive: mpsc::Sender<()>,
}

enum JournalMsg {
    Entry(JournalEntry),
    Flush {
        resp: oneshot::Sender<Result<OpSeq, PersistError>>,
    },
    Shutdown {
        resp: oneshot::Sender<()>,
    },
}

/// Starts a session with empty state.
pub fn spawn_session<C: ExecutionChannel>(
    channel: C,
    sink: Option<Box<dyn HistorySink>>,
    config: SessionConfig,
) -> SessionHandle {
    let state = SessionState::with_config(&config);
    spawn_session_with_state(state, channel, sink, config)
}

/// Starts a session from existing state, e.g. a replayed journal.
pub fn spawn_session_with_state<C: ExecutionChannel>(
    state: SessionState,
    channel: C,
    sink: Option<Box<dyn HistorySink>>,
    config: SessionConfig,
) -> SessionHandle {
    let (events_tx, _) = broadcast::channel::<SessionEvent>(config.event_buffer.max(1));
    let (dispatcher_tx, _) = watch::channel(DispatcherState::Idle);

    let journal_tx = sink.map(|sink| {
        let (tx, rx) = mpsc::channel::<JournalMsg>(config.journal_queue_bound.max(1));
        spawn_journal_worker(sink, rx, events_tx.clone());
        tx
    });

    let shared = Arc::new(Shared {
        state: Mutex::new(state),
        work: Notify::new(),
        closing: AtomicBool::new(false),
        events_tx,
        dispatcher_tx,
        journal_tx,
        config,
    });

    let (alive_tx, alive_rx) = mpsc::channel::<()>(1);
    let task = tokio::spawn(run_dispatcher(Arc::clone(&shared), channel, alive_rx));

    SessionHandle {
        shared,
        task: Arc::new(Mutex::new(Some(task))),
        _alive: alive_tx,
    }
}

impl SessionHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events_tx.subscribe()
    }

    /// Queues `request` and applies its optimistic mark before returning.
    pub fn enqueue(&self, request: OpRequest) -> Result<OpSeq, SessionError> {
        let op = {
            let mut state = self.shared.lock();
            if self.shared.closing.load(Ordering::SeqCst) {
                return Err(SessionError::Closed);
            }
            let op = state.enqueue(request)?;
            self.shared.emit(SessionEvent::Enqueued {
                seq: op.seq,
                kind: op.kind(),
            });
            op
        };
        debug!(seq = op.seq, kind = ?op.kind(), "enqueued");
        self.shared.work.notify_one();
        Ok(op.seq)
    }

    pub fn search_and_tag(
        &self,
        barcode: impl Into<String>,
        tag: Option<&str>,
    ) -> Result<OpSeq, SessionError> {
        self.enqueue(OpRequest::SearchAndTag {
            barcode: barcode.into(),
            tag: tag.map(str::to_string),
        })
    }

    pub fn delete_tag(
        &self,
        product_id: impl Into<String>,
        tag: impl Into<String>,
    ) -> Result<OpSeq, SessionError> {
        self.enqueue(OpRequest::DeleteTag {
            product_id: product_id.into(),
            tag: tag.into(),
        })
    }

    pub fn add_tag(
        &self,
        product_id: impl Into<String>,
        tag: impl Into<String>,
    ) -> Result<OpSeq, SessionError> {
        self.enqueue(OpRequest::AddTag {
            product_id: product_id.into(),
            tag: tag.into(),
        })
    }

    pub fn refresh(&self, product_id: impl Into<String>) -> Result<OpSeq, SessionError> {
        self.enqueue(OpRequest::Refresh {
            product_id: product_id.into(),
        })
    }

    /// Withdraws a queued operation that has not been submitted yet.
    pub fn cancel(&self, seq: OpSeq) -> bool {
        let mut state = self.shared.lock();
        let removed = state.cancel(seq).is_some();
        if removed {
            self.shared.emit(SessionEvent::Cancelled { seq });
        }
        removed
    }

    /// History, newest first.
    pub fn history(&self) -> Vec<ResultRecord> {
        self.shared.lock().history().to_vec()
    }

    pub fn tag_status(&self, product_id: &str, tag: &str) -> Option<TagStatus> {
        self.shared.lock().tags().get(product_id, tag)
    }

    pub fn scan_status(&self, tag: &str) -> Option<TagStatus> {
        self.shared.lock().tags().scan_status(tag)
    }

    pub fn effective_status(&self, product: &ProductSnapshot, tag: &str) -> Option<TagStatus> {
        self.shared.lock().tags().effective_status(product, tag)
    }

    pub fn reset_tag_status(&self) {
        self.shared.lock().reset_tags();
    }

    pub fn clear_history(&self) {
        self.shared.lock().clear_history();
    }

    /// Queued operations, head first. Includes the in-flight one.
    pub fn pending(&self) -> Vec<Operation> {
        self.shared.lock().pending()
    }

    pub fn in_flight(&self) -> Option<OpSeq> {
        self.shared.lock().in_flight()
    }

    pub fn dispatcher_state(&self) -> DispatcherState {
        *self.shared.dispatcher_tx.borrow()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    pub fn admin_url(&self, product_id: &str) -> Option<String> {
        self.shared.config.admin_url(product_id)
    }

    /// Resolves once nothing is queued or in flight.
    pub async fn wait_idle(&self) {
        let mut rx = self.shared.dispatcher_tx.subscribe();
        loop {
            let dispatcher_idle = *rx.borrow_and_update() == DispatcherState::Idle;
            if dispatcher_idle && self.shared.lock().is_idle() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Waits until every journaled outcome so far is durable.
    pub async fn flush(&self) -> Result<OpSeq, RuntimeError> {
        let Some(tx) = self.shared.journal_tx.as_ref() else {
            return Ok(self.shared.lock().latest_seq());
        };
        let (resp, rx) = oneshot::channel();
        tx.send(JournalMsg::Flush { resp })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?.map_err(RuntimeError::from)
    }

    /// Stops accepting work, drains what is queued, closes the journal, and
    /// waits for the dispatcher to exit.
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        {
            let _state = self.shared.lock();
            self.shared.closing.store(true, Ordering::SeqCst);
        }
        self.shared.work.notify_one();

        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.await.map_err(|_| RuntimeError::ChannelClosed)?;
        }
        Ok(())
    }
}

#[instrument(skip_all)]
async fn run_dispatcher<C: ExecutionChannel>(
    shared: Arc<Shared>,
    mut channel: C,
    mut alive_rx: mpsc::Receiver<()>,
) {
    let poll = Duration::from_millis(shared.config.poll_interval_ms.max(1));
    let settle_timeout = shared.config.settle_timeout_ms.map(Duration::from_millis);
    let mut draining = false;
    info!("dispatcher started");

    loop {
        // Level-triggered: re-checked after every settlement.
        let (has_work, closing) = {
            let state = shared.lock();
            (!state.queue().is_empty(), shared.closing.load(Ordering::SeqCst))
        };

        if !has_work {
            if draining {
                draining = false;
                shared.set_dispatcher(DispatcherState::Idle);
                shared.emit(SessionEvent::Drained);
                debug!("queue drained");
            }
            if closing {
                break;
            }
            tokio::select! {
                () = shared.work.notified() => {}
                _ = alive_rx.recv() => {
                    {
                        let _state = shared.lock();
                        shared.closing.store(true, Ordering::SeqCst);
                    }
                    debug!("all handles dropped");
                }
            }
            continue;
        }

        if !draining {
            draining = true;
            shared.set_dispatcher(DispatcherState::Draining);
        }

        wait_until(&mut channel, poll, |c| {
            (c.state() == ChannelState::Idle).then_some(())
        })
        .await;

        let next = shared.lock().begin_next();
        let Some(op) = next else {
            continue;
        };
        run_one(&shared, &mut channel, op, poll, settle_timeout).await;
    }

    close_journal(&shared).await;
    info!("dispatcher stopped");
}

async fn run_one<C: ExecutionChannel>(
    shared: &Shared,
    channel: &mut C,
    op: Operation,
    poll: Duration,
    settle_timeout: Option<Duration>,
) {
    let seq = op.seq;
    let kind = op.kind();
    let tag = op.request.tag().map(str::to_string);
    shared.emit(SessionEvent::Submitted { seq, kind });

    let mut record = match channel.submit(&op) {
        Ok(()) => {
            let settled = wait_until(channel, poll, |c| {
                if c.state() == ChannelState::Idle {
                    c.last_result()
                } else {
                    None
                }
            });
            let outcome = match settle_timeout {
                Some(limit) => tokio::time::timeout(limit, settled).await.ok().flatten(),
                None => settled.await,
            };
            outcome.unwrap_or_else(|| {
                warn!(seq, "execution channel did not settle");
                ResultRecord::remote_error(seq, "execution channel did not settle", tag, Utc::now())
            })
        }
        Err(err) => {
            warn!(seq, error = %err, "submit rejected");
            ResultRecord::remote_error(seq, err.to_string(), tag, Utc::now())
        }
    };
    record.op_seq = seq;

    let entry = JournalEntry {
        seq,
        kind,
        record: record.clone(),
    };
    let settled = shared.lock().settle(seq, record);
    match settled {
        Ok(settlement) => {
            debug!(seq, success = settlement.success, merge = ?settlement.merge, "settled");
            shared.emit(SessionEvent::Settled {
                seq,
                kind,
                success: settlement.success,
                merge: settlement.merge,
            });
            if let Some(tx) = shared.journal_tx.as_ref() {
                if tx.send(JournalMsg::Entry(entry)).await.is_err() {
                    warn!(seq, "journal worker gone");
                }
            }
        }
        Err(err) => warn!(seq, error = %err, "settle rejected"),
    }
}

// Waits for `ready` to yield, re-checking on every channel state change, or
// every `poll` when the channel offers no subscription. Returns `None` only
// when the channel's state sender is gone.
async fn wait_until<C, T>(
    channel: &mut C,
    poll: Duration,
    mut ready: impl FnMut(&C) -> Option<T> + Send,
) -> Option<T>
where
    C: ExecutionChannel,
{
    let mut watch = channel.subscribe_state();
    loop {
        if let Some(rx) = watch.as_mut() {
            rx.borrow_and_update();
        }
        if let Some(out) = ready(&*channel) {
            return Some(out);
        }
        match watch.as_mut() {
            Some(rx) => {
                if rx.changed().await.is_err() {
                    return ready(&*channel);
                }
            }
            None => tokio::time::sleep(poll).await,
        }
    }
}

async fn close_journal(shared: &Shared) {
    let Some(tx) = shared.journal_tx.as_ref() else {
        return;
    };
    let (resp, rx) = oneshot::channel();
    if tx.send(JournalMsg::Shutdown { resp }).await.is_ok() {
        let _ = rx.await;
    }
}

fn spawn_journal_worker(
    sink: Box<dyn HistorySink>,
    mut rx: mpsc::Receiver<JournalMsg>,
    events_tx: broadcast::Sender<SessionEvent>,
) {
    let sink = Arc::new(AsyncMutex::new(sink));
    tokio::spawn(async move {
        let mut last_journaled: OpSeq = 0;

        while let Some(msg) = rx.recv().await {
            match msg {
                JournalMsg::Entry(entry) => {
                    let seq = entry.seq;
                    match append_entry(&sink, entry).await {
                        Ok(written) => {
                            last_journaled = last_journaled.max(written);
                            let _ = events_tx.send(SessionEvent::JournaledUpTo {
                                seq: last_journaled,
                            });
                        }
                        Err(err) => {
                            warn!(seq, error = %err, "journal append failed");
                            let _ = events_tx.send(SessionEvent::JournalFailed {
                                seq,
                                error: err.to_string(),
                            });
                        }
                    }
                }
                JournalMsg::Flush { resp } => {
                    let result = flush_sink(&sink).await.map(|()| last_journaled);
                    let _ = resp.send(result);
                }
                JournalMsg::Shutdown { resp } => {
                    if let Err(err) = flush_sink(&sink).await {
                        warn!(error = %err, "journal flush on shutdown failed");
                    }
                    let _ = resp.send(());
                    break;
                }
            }
        }
    });
}

async fn append_entry(
    sink: &Arc<AsyncMutex<Box<dyn HistorySink>>>,
    entry: JournalEntry,
) -> Result<OpSeq, PersistError> {
    let sink_ref = Arc::clone(sink);
    tokio::task::spawn_blocking(move || {
        let mut sink = sink_ref.blocking_lock();
        sink.append_entries(std::slice::from_ref(&entry))
    })
    .await
    .map_err(|e| PersistError::Message(format!("join error: {e}")))?
}

async fn flush_sink(sink: &Arc<AsyncMutex<Box<dyn HistorySink>>>) -> Result<(), PersistError> {
    let sink_ref = Arc::clone(sink);
    tokio::task::spawn_blocking(move || {
        let mut sink = sink_ref.blocking_lock();
        sink.flush()
    })
    .await
    .map_err(|e| PersistError::Message(format!("join error: {e}")))?
}
