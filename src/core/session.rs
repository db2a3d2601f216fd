use hashbrown::HashMap;
use tracing::debug;

use crate::{
    config::SessionConfig,
    op::{OpRequest, Operation},
    record::ResultRecord,
    types::{OpSeq, OperationKind, TagStatus},
};

use super::{
    history::{MergeOutcome, ResultHistory},
    queue::QueueStore,
    tag_status::TagStatusTable,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("operation {0} is not in flight")]
    NotInFlight(OpSeq),
    #[error("operation {0} is not at the head of the queue")]
    NotAtHead(OpSeq),
    #[error("session is closed")]
    Closed,
}

/// Row status in force before an optimistic mark, kept until settlement.
#[derive(Debug, Clone)]
struct PriorMark {
    product_id: String,
    tag: String,
    applied: TagStatus,
    prev: Option<TagStatus>,
}

/// Result of settling the in-flight operation.
#[derive(Debug, Clone)]
pub struct Settlement {
    pub op: Operation,
    pub success: bool,
    pub merge: MergeOutcome,
}

/// Queue, history, and tag statuses of one session.
///
/// All mutation goes through this type so FIFO order, single-flight, and
/// merge rules hold regardless of who drives it.
#[derive(Debug)]
pub struct SessionState {
    queue: QueueStore,
    history: ResultHistory,
    tags: TagStatusTable,
    in_flight: Option<OpSeq>,
    prior_marks: HashMap<OpSeq, PriorMark>,
    next_seq: OpSeq,
    rollback_on_failure: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self::with_config(&SessionConfig::default())
    }

    pub fn with_config(config: &SessionConfig) -> Self {
        Self {
            queue: QueueStore::new(),
            history: ResultHistory::with_limit(config.history_limit),
            tags: TagStatusTable::new(),
            in_flight: None,
            prior_marks: HashMap::new(),
            next_seq: 1,
            rollback_on_failure: config.rollback_on_failure,
        }
    }

    /// Starts from a previously journaled history.
    pub fn with_history(mut self, history: ResultHistory, last_seq: OpSeq) -> Self {
        self.history = history;
        self.next_seq = self.next_seq.max(last_seq.saturating_add(1));
        self
    }

    /// Validates and queues `request`, applying its optimistic row mark.
    pub fn enqueue(&mut self, request: OpRequest) -> Result<Operation, SessionError> {
        let request = request.normalized();
        validate(&request)?;

        let seq = self.next_seq;
        self.next_seq += 1;

        if let Some((product_id, tag)) = request.row_key() {
            let (applied, prev) = match request.kind() {
                OperationKind::DeleteTag => {
                    (TagStatus::Deleted, self.tags.mark_deleted(product_id, tag))
                }
                _ => (TagStatus::Readded, self.tags.mark_readded(product_id, tag)),
            };
            self.prior_marks.insert(
                seq,
                PriorMark {
                    product_id: product_id.to_string(),
                    tag: tag.to_string(),
                    applied,
                    prev,
                },
            );
        }

        let op = Operation { seq, request };
        self.queue.enqueue(op.clone());
        Ok(op)
    }

    /// Marks the head as in flight and returns it. Returns `None` when the
    /// queue is empty or an operation is already in flight.
    pub fn begin_next(&mut self) -> Option<Operation> {
        if self.in_flight.is_some() {
            return None;
        }
        let op = self.queue.front()?.clone();
        self.in_flight = Some(op.seq);
        Some(op)
    }

    /// Retires the in-flight operation `seq` with its outcome.
    ///
    /// The operation leaves the queue only here, after its remote call has
    /// settled.
    pub fn settle(&mut self, seq: OpSeq, record: ResultRecord) -> Result<Settlement, SessionError> {
        if self.in_flight != Some(seq) {
            return Err(SessionError::NotInFlight(seq));
        }
        if self.queue.front().map(|op| op.seq) != Some(seq) {
            return Err(SessionError::NotAtHead(seq));
        }
        let op = self.queue.dequeue().ok_or(SessionError::NotAtHead(seq))?;
        self.in_flight = None;

        let success = record.success;
        if let Some(tag) = op.request.scan_tag() {
            self.tags.record_scan(tag, success);
        }
        if let Some(mark) = self.prior_marks.remove(&seq) {
            if !success && self.rollback_on_failure {
                debug!(seq, tag = %mark.tag, "rolling back optimistic mark");
                self.unmark(seq, &mark);
            }
        }

        let merge = self.history.merge(record);
        Ok(Settlement { op, success, merge })
    }

    /// Removes a queued operation that has not been submitted yet.
    pub fn cancel(&mut self, seq: OpSeq) -> Option<Operation> {
        if self.in_flight == Some(seq) {
            return None;
        }
        let op = self.queue.remove(seq)?;
        if let Some(mark) = self.prior_marks.remove(&seq) {
            self.unmark(seq, &mark);
        }
        Some(op)
    }

    pub fn history(&self) -> &ResultHistory {
        &self.history
    }

    pub fn tags(&self) -> &TagStatusTable {
        &self.tags
    }

    pub fn queue(&self) -> &QueueStore {
        &self.queue
    }

    pub fn in_flight(&self) -> Option<OpSeq> {
        self.in_flight
    }

    /// True when nothing is queued or in flight.
    pub fn is_idle(&self) -> bool {
        self.in_flight.is_none() && self.queue.is_empty()
    }

    pub fn pending(&self) -> Vec<Operation> {
        self.queue.iter().cloned().collect()
    }

    /// Clears every status. Pending marks now undo to an empty row.
    pub fn reset_tags(&mut self) {
        self.tags.reset();
        for mark in self.prior_marks.values_mut() {
            mark.prev = None;
        }
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    pub fn latest_seq(&self) -> OpSeq {
        self.next_seq.saturating_sub(1)
    }

    // Marks on one row form a chain in seq order, each `prev` being the
    // status left by the one before. Undoing a mark with a later pending mark
    // splices it out of the chain; undoing the newest restores the row.
    fn unmark(&mut self, seq: OpSeq, mark: &PriorMark) {
        let next = self
            .prior_marks
            .iter_mut()
            .filter(|(s, m)| **s > seq && m.product_id == mark.product_id && m.tag == mark.tag)
            .min_by_key(|(s, _)| **s);
        match next {
            Some((_, later)) => {
                if later.prev == Some(mark.applied) {
                    later.prev = mark.prev;
                }
            }
            None => {
                if self.tags.get(&mark.product_id, &mark.tag) == Some(mark.applied) {
                    self.tags.restore(&mark.product_id, &mark.tag, mark.prev);
                }
            }
        }
    }
}

fn validate(request: &OpRequest) -> Result<(), SessionError> {
    match request {
        OpRequest::SearchAndTag { barcode, .. } if barcode.is_empty() => {
            Err(SessionError::InvalidRequest("empty barcode".to_string()))
        }
        OpRequest::DeleteTag { product_id, tag } | OpRequest::AddTag { product_id, tag } => {
            if product_id.is_empty() {
                Err(SessionError::InvalidRequest("empty product id".to_string()))
            } else if tag.is_empty() {
                Err(SessionError::InvalidRequest("empty tag".to_string()))
            } else {
                Ok(())
            }
        }
        OpRequest::Refresh { product_id } if product_id.is_empty() => {
            Err(SessionError::InvalidRequest("empty product id".to_string()))
        }
        _ => Ok(()),
    }
}
