use std::collections::VecDeque;

use crate::{op::Operation, types::OpSeq};

/// FIFO of pending operations. Insertion order is execution order.
#[derive(Debug, Default)]
pub struct QueueStore {
    ops: VecDeque<Operation>,
}

impl QueueStore {
    /// Empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `op` at the tail.
    pub fn enqueue(&mut self, op: Operation) {
        debug_assert!(self.ops.back().is_none_or(|last| last.seq < op.seq));
        self.ops.push_back(op);
    }

    /// Removes and returns the head.
    pub fn dequeue(&mut self) -> Option<Operation> {
        self.ops.pop_front()
    }

    /// Head of the queue, left in place.
    pub fn front(&self) -> Option<&Operation> {
        self.ops.front()
    }

    /// Removes the operation with `seq` wherever it sits.
    pub fn remove(&mut self, seq: OpSeq) -> Option<Operation> {
        let pos = self.ops.iter().position(|op| op.seq == seq)?;
        self.ops.remove(pos)
    }

    /// Number of pending operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// True when nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Pending operations, head first.
    pub fn iter(&self) -> impl Iterator<Item = &Operation> {
        self.ops.iter()
    }
}
