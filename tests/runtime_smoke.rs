use std::{
    collections::BTreeSet,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use chrono::Utc;
use scanqueue::{
    catalog::memory::InMemoryCatalog,
    channel::{ChannelError, ExecutionChannel, fetcher::FetcherChannel},
    config::SessionConfig,
    core::{history::MergeOutcome, session::SessionError},
    op::{JournalEntry, OpRequest, Operation},
    persist::{HistorySink, PersistResult},
    product::{ProductSnapshot, VariantSnapshot},
    record::ResultRecord,
    runtime::{
        events::SessionEvent,
        handle::{DispatcherState, spawn_session},
    },
    types::{ChannelState, OpSeq, OperationKind, TagStatus},
};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Mark {
    Start(OpSeq),
    End(OpSeq),
}

#[derive(Default)]
struct Inner {
    busy: bool,
    last: Option<ResultRecord>,
    log: Vec<Mark>,
}

/// Channel without a state subscription, so the dispatcher has to poll it.
struct ScriptedChannel {
    inner: Arc<Mutex<Inner>>,
    delay: Duration,
}

impl ScriptedChannel {
    fn new(delay: Duration) -> (Self, Arc<Mutex<Inner>>) {
        let inner = Arc::new(Mutex::new(Inner::default()));
        (
            Self {
                inner: Arc::clone(&inner),
                delay,
            },
            inner,
        )
    }
}

fn scripted_outcome(op: &Operation) -> ResultRecord {
    let now = Utc::now();
    match &op.request {
        OpRequest::SearchAndTag { barcode, tag } if barcode.starts_with("bad") => {
            ResultRecord::remote_error(op.seq, "remote refused", tag.clone(), now)
        }
        OpRequest::SearchAndTag { barcode, tag } => {
            ResultRecord::success(op.seq, vec![product(barcode, barcode, &[])], tag.clone(), now)
        }
        OpRequest::DeleteTag { product_id, tag } | OpRequest::AddTag { product_id, tag } => {
            ResultRecord::success(
                op.seq,
                vec![product(product_id, "-", &[])],
                Some(tag.clone()),
                now,
            )
        }
        OpRequest::Refresh { product_id } => {
            ResultRecord::success(op.seq, vec![product(product_id, "-", &[])], None, now)
        }
    }
}

impl ExecutionChannel for ScriptedChannel {
    fn submit(&mut self, op: &Operation) -> Result<(), ChannelError> {
        {
            let mut inner = self.inner.lock().expect("lock");
            if inner.busy {
                return Err(ChannelError::Busy);
            }
            inner.busy = true;
            inner.last = None;
            inner.log.push(Mark::Start(op.seq));
        }
        let inner = Arc::clone(&self.inner);
        let delay = self.delay;
        let op = op.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let record = scripted_outcome(&op);
            let mut inner = inner.lock().expect("lock");
            inner.log.push(Mark::End(op.seq));
            inner.last = Some(record);
            inner.busy = false;
        });
        Ok(())
    }

    fn state(&self) -> ChannelState {
        if self.inner.lock().expect("lock").busy {
            ChannelState::Busy
        } else {
            ChannelState::Idle
        }
    }

    fn last_result(&self) -> Option<ResultRecord> {
        self.inner.lock().expect("lock").last.clone()
    }
}

/// Accepts one submission and never settles it.
struct StuckChannel {
    submitted: bool,
}

impl ExecutionChannel for StuckChannel {
    fn submit(&mut self, _op: &Operation) -> Result<(), ChannelError> {
        self.submitted = true;
        Ok(())
    }

    fn state(&self) -> ChannelState {
        if self.submitted {
            ChannelState::Busy
        } else {
            ChannelState::Idle
        }
    }

    fn last_result(&self) -> Option<ResultRecord> {
        None
    }
}

/// Settles every submission on the spot and flags its own drop.
struct InstantChannel {
    last: Option<ResultRecord>,
    dropped: Arc<AtomicBool>,
}

impl ExecutionChannel for InstantChannel {
    fn submit(&mut self, op: &Operation) -> Result<(), ChannelError> {
        self.last = Some(scripted_outcome(op));
        Ok(())
    }

    fn state(&self) -> ChannelState {
        ChannelState::Idle
    }

    fn last_result(&self) -> Option<ResultRecord> {
        self.last.clone()
    }
}

impl Drop for InstantChannel {
    fn drop(&mut self) {
        self.dropped.store(true, Ordering::SeqCst);
    }
}

#[derive(Clone, Default)]
struct RecordingSink {
    written: Arc<Mutex<Vec<OpSeq>>>,
    flushed: Arc<AtomicBool>,
}

impl HistorySink for RecordingSink {
    fn append_entries(&mut self, entries: &[JournalEntry]) -> PersistResult<OpSeq> {
        let mut written = self.written.lock().expect("lock");
        written.extend(entries.iter().map(|e| e.seq));
        Ok(written.last().copied().unwrap_or(0))
    }

    fn flush(&mut self) -> PersistResult<()> {
        self.flushed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

async fn wait_for(flag: &AtomicBool) -> bool {
    for _ in 0..200 {
        if flag.load(Ordering::SeqCst) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    flag.load(Ordering::SeqCst)
}

fn product(id: &str, barcode: &str, tags: &[&str]) -> ProductSnapshot {
    ProductSnapshot {
        id: id.to_string(),
        title: format!("Product {id}"),
        tags: tags.iter().map(|t| t.to_string()).collect::<BTreeSet<_>>(),
        total_inventory: 7,
        variants: vec![VariantSnapshot {
            id: format!("{id}-v1"),
            title: "Default".to_string(),
            barcode: Some(barcode.to_string()),
            sku: None,
            inventory_quantity: 7,
            expiration_batches: Vec::new(),
        }],
    }
}

fn fast_poll() -> SessionConfig {
    SessionConfig {
        poll_interval_ms: 2,
        ..SessionConfig::default()
    }
}

#[tokio::test]
async fn operations_run_one_at_a_time_in_fifo_order() {
    let (channel, inner) = ScriptedChannel::new(Duration::from_millis(5));
    let handle = spawn_session(channel, None, fast_poll());

    let mut seqs = Vec::new();
    for i in 0..5 {
        seqs.push(handle.search_and_tag(format!("code{i}"), None).expect("enqueue"));
    }
    handle.wait_idle().await;

    let expected: Vec<Mark> = seqs
        .iter()
        .flat_map(|&seq| [Mark::Start(seq), Mark::End(seq)])
        .collect();
    assert_eq!(inner.lock().expect("lock").log, expected);

    let history = handle.history();
    assert_eq!(history.len(), 5);
    let newest_first: Vec<OpSeq> = history.iter().map(|r| r.op_seq).collect();
    let mut reversed = seqs.clone();
    reversed.reverse();
    assert_eq!(newest_first, reversed);
    assert_eq!(handle.dispatcher_state(), DispatcherState::Idle);

    handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn a_failure_does_not_block_later_operations() {
    let (channel, _inner) = ScriptedChannel::new(Duration::from_millis(1));
    let handle = spawn_session(channel, None, fast_poll());

    handle.search_and_tag("a", None).expect("a");
    handle.search_and_tag("bad", Some("sale")).expect("bad");
    handle.search_and_tag("c", None).expect("c");
    handle.wait_idle().await;

    let history = handle.history();
    assert_eq!(history.len(), 3);
    assert!(history[0].success);
    assert!(!history[1].success);
    assert_eq!(history[1].error.as_deref(), Some("remote refused"));
    assert!(history[2].success);
    assert_eq!(handle.scan_status("sale"), Some(TagStatus::Failure));

    handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn repeated_scan_refreshes_single_history_entry() {
    let catalog = Arc::new(InMemoryCatalog::new(vec![product("p1", "123", &[])]));
    let handle = spawn_session(
        FetcherChannel::new(Arc::clone(&catalog)),
        None,
        SessionConfig::default(),
    );
    let mut events = handle.subscribe();

    handle.search_and_tag("123", Some("sale")).expect("first");
    handle.search_and_tag("123", Some("sale")).expect("second");
    handle.wait_idle().await;

    let history = handle.history();
    assert_eq!(history.len(), 1);
    let record = &history[0];
    assert!(record.success);
    assert_eq!(record.tag_used.as_deref(), Some("sale"));
    assert!(record.products[0].has_tag("sale"));
    assert!(catalog.product("p1").expect("p1").has_tag("sale"));

    assert_eq!(handle.tag_status("p1", "sale"), None);
    assert_eq!(handle.scan_status("sale"), Some(TagStatus::Success));
    assert_eq!(
        handle.effective_status(&record.products[0], "sale"),
        Some(TagStatus::Existing)
    );

    let mut merges = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let SessionEvent::Settled { merge, .. } = event {
            merges.push(merge);
        }
    }
    assert_eq!(
        merges,
        vec![MergeOutcome::Prepended, MergeOutcome::Replaced { index: 0 }]
    );

    handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn unmatched_barcode_yields_placeholder_failure() {
    let catalog = Arc::new(InMemoryCatalog::new(vec![product("p1", "123", &[])]));
    let handle = spawn_session(FetcherChannel::new(catalog), None, SessionConfig::default());

    handle.search_and_tag("999", Some("sale")).expect("enqueue");
    handle.wait_idle().await;

    let history = handle.history();
    assert_eq!(history.len(), 1);
    let record = &history[0];
    assert!(!record.success);
    assert!(
        record
            .error
            .as_deref()
            .is_some_and(|e| e.contains("No Matching Barcode"))
    );
    let placeholder = &record.products[0];
    assert_eq!(placeholder.title, "999");
    assert_eq!(placeholder.total_inventory, 0);
    assert_eq!(placeholder.variants[0].barcode.as_deref(), Some("999"));
    assert_eq!(handle.scan_status("sale"), Some(TagStatus::Failure));

    handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn optimistic_marks_are_visible_before_settlement() {
    let catalog = Arc::new(
        InMemoryCatalog::new(vec![product("p1", "123", &["sale"])])
            .with_latency(Duration::from_millis(20)),
    );
    let handle = spawn_session(
        FetcherChannel::new(Arc::clone(&catalog)),
        None,
        SessionConfig::default(),
    );

    handle.delete_tag("p1", "sale").expect("delete");
    assert_eq!(handle.tag_status("p1", "sale"), Some(TagStatus::Deleted));
    assert_eq!(handle.pending().len(), 1);

    handle.add_tag("p1", "sale").expect("add");
    assert_eq!(handle.tag_status("p1", "sale"), Some(TagStatus::Readded));

    handle.wait_idle().await;
    assert_eq!(handle.tag_status("p1", "sale"), Some(TagStatus::Readded));
    assert!(catalog.product("p1").expect("p1").has_tag("sale"));

    handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn catalog_never_sees_concurrent_calls() {
    let products = (0..4)
        .map(|i| product(&format!("p{i}"), &format!("{i}{i}{i}"), &[]))
        .collect();
    let catalog = Arc::new(InMemoryCatalog::new(products).with_latency(Duration::from_millis(2)));
    let handle = spawn_session(
        FetcherChannel::new(Arc::clone(&catalog)),
        None,
        SessionConfig::default(),
    );

    for i in 0..4 {
        handle
            .search_and_tag(format!("{i}{i}{i}"), Some("sale"))
            .expect("scan");
        handle.delete_tag(format!("p{i}"), "sale").expect("delete");
        handle.refresh(format!("p{i}")).expect("refresh");
    }
    handle.wait_idle().await;

    assert_eq!(catalog.max_concurrent_calls(), 1);
    for i in 0..4 {
        assert!(!catalog.product(&format!("p{i}")).expect("product").has_tag("sale"));
    }

    handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn cancel_withdraws_only_unsubmitted_operations() {
    let (channel, inner) = ScriptedChannel::new(Duration::from_millis(30));
    let handle = spawn_session(channel, None, fast_poll());
    let mut events = handle.subscribe();

    let first = handle.search_and_tag("a", None).expect("a");
    let second = handle.delete_tag("p2", "sale").expect("b");
    let third = handle.search_and_tag("c", None).expect("c");

    assert!(handle.cancel(second));
    assert_eq!(handle.tag_status("p2", "sale"), None);

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(handle.in_flight(), Some(first));
    assert!(!handle.cancel(first));

    handle.wait_idle().await;
    let settled: Vec<OpSeq> = handle.history().iter().map(|r| r.op_seq).collect();
    assert_eq!(settled, vec![third, first]);
    assert!(
        !inner
            .lock()
            .expect("lock")
            .log
            .contains(&Mark::Start(second))
    );

    let mut cancelled = false;
    while let Ok(event) = events.try_recv() {
        if event == (SessionEvent::Cancelled { seq: second }) {
            cancelled = true;
        }
    }
    assert!(cancelled);

    handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn events_follow_the_operation_lifecycle() {
    let (channel, _inner) = ScriptedChannel::new(Duration::from_millis(1));
    let handle = spawn_session(channel, None, fast_poll());
    let mut events = handle.subscribe();

    let seq = handle.refresh("p1").expect("refresh");
    let mut seen = Vec::new();
    loop {
        let event = events.recv().await.expect("event");
        let done = event == SessionEvent::Drained;
        seen.push(event);
        if done {
            break;
        }
    }

    assert_eq!(
        seen,
        vec![
            SessionEvent::Enqueued {
                seq,
                kind: OperationKind::Refresh
            },
            SessionEvent::Submitted {
                seq,
                kind: OperationKind::Refresh
            },
            SessionEvent::Settled {
                seq,
                kind: OperationKind::Refresh,
                success: true,
                merge: MergeOutcome::Prepended,
            },
            SessionEvent::Drained,
        ]
    );

    handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn shutdown_drains_queue_then_refuses_work() {
    let (channel, _inner) = ScriptedChannel::new(Duration::from_millis(2));
    let handle = spawn_session(channel, None, fast_poll());

    for code in ["a", "b", "c"] {
        handle.search_and_tag(code, None).expect("enqueue");
    }
    handle.shutdown().await.expect("shutdown");

    assert_eq!(handle.history().len(), 3);
    assert!(handle.pending().is_empty());
    assert_eq!(
        handle.search_and_tag("d", None).unwrap_err(),
        SessionError::Closed
    );
}

#[tokio::test]
async fn unsettled_submission_times_out_as_failure() {
    let config = SessionConfig {
        poll_interval_ms: 2,
        settle_timeout_ms: Some(40),
        ..SessionConfig::default()
    };
    let handle = spawn_session(StuckChannel { submitted: false }, None, config);

    handle.delete_tag("p1", "sale").expect("enqueue");
    handle.wait_idle().await;

    let history = handle.history();
    assert_eq!(history.len(), 1);
    assert!(!history[0].success);
    assert_eq!(history[0].tag_used.as_deref(), Some("sale"));
    assert!(
        history[0]
            .error
            .as_deref()
            .is_some_and(|e| e.contains("did not settle"))
    );

    handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn invalid_requests_are_rejected_at_enqueue() {
    let (channel, _inner) = ScriptedChannel::new(Duration::from_millis(1));
    let handle = spawn_session(channel, None, fast_poll());

    assert!(matches!(
        handle.search_and_tag("  ", Some("sale")),
        Err(SessionError::InvalidRequest(_))
    ));
    assert!(matches!(
        handle.delete_tag("p1", ""),
        Err(SessionError::InvalidRequest(_))
    ));
    assert!(handle.pending().is_empty());

    handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn dropping_every_handle_stops_the_dispatcher() {
    let dropped = Arc::new(AtomicBool::new(false));
    let channel = InstantChannel {
        last: None,
        dropped: Arc::clone(&dropped),
    };
    let handle = spawn_session(channel, None, fast_poll());
    let clone = handle.clone();

    drop(handle);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!dropped.load(Ordering::SeqCst));

    drop(clone);
    assert!(wait_for(&dropped).await);
}

#[tokio::test]
async fn dropped_handle_still_drains_and_flushes_journal() {
    let dropped = Arc::new(AtomicBool::new(false));
    let channel = InstantChannel {
        last: None,
        dropped: Arc::clone(&dropped),
    };
    let sink = RecordingSink::default();
    let handle = spawn_session(channel, Some(Box::new(sink.clone())), fast_poll());

    let first = handle.refresh("p1").expect("first");
    let second = handle.search_and_tag("code", Some("sale")).expect("second");
    drop(handle);

    assert!(wait_for(&dropped).await);
    assert!(wait_for(&sink.flushed).await);
    assert_eq!(*sink.written.lock().expect("lock"), vec![first, second]);
}
