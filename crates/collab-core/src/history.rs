//! Per-session undo/redo history: bounded LIFO stacks of applied
//! operations and their computed inverses.
use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::identity::User;
use crate::operation::Operation;

pub const DEFAULT_HISTORY_DEPTH: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub forward: Operation,
    pub inverse: Operation,
    pub initiator: User,
    pub operation_id: Uuid,
    pub sequence: u64,
}

/// A single bounded LIFO stack with FIFO eviction at the bottom once full.
#[derive(Debug, Default)]
pub struct BoundedStack {
    entries: VecDeque<HistoryEntry>,
    depth: usize,
}

impl BoundedStack {
    pub fn new(depth: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(depth.min(1024)),
            depth,
        }
    }

    pub fn push(&mut self, entry: HistoryEntry) {
        if self.entries.len() >= self.depth {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn pop(&mut self) -> Option<HistoryEntry> {
        self.entries.pop_back()
    }

    pub fn peek(&self) -> Option<&HistoryEntry> {
        self.entries.back()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }
}

/// The undo and redo stacks owned by a session.
pub struct History {
    pub undo: BoundedStack,
    pub redo: BoundedStack,
}

impl History {
    pub fn new(depth: usize) -> Self {
        Self {
            undo: BoundedStack::new(depth),
            redo: BoundedStack::new(depth),
        }
    }

    /// Record a successful forward operation: push to undo, clear redo.
    pub fn record_forward(&mut self, entry: HistoryEntry) {
        self.undo.push(entry);
        self.redo.clear();
    }

    /// Record a successful undo: push the undone entry's pair onto redo.
    pub fn record_undo(&mut self, entry: HistoryEntry) {
        self.redo.push(entry);
    }

    /// Record a successful redo: push back onto undo.
    pub fn record_redo(&mut self, entry: HistoryEntry) {
        self.undo.push(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::Operation;

    fn entry(seq: u64) -> HistoryEntry {
        HistoryEntry {
            forward: Operation::patch(vec![]),
            inverse: Operation::patch(vec![]),
            initiator: User::new("google", "1", "a@b.com", "A"),
            operation_id: Uuid::new_v4(),
            sequence: seq,
        }
    }

    #[test]
    fn overflow_drops_oldest() {
        let mut stack = BoundedStack::new(3);
        for i in 0..4 {
            stack.push(entry(i));
        }
        assert_eq!(stack.len(), 3);
        let popped = stack.pop().unwrap();
        assert_eq!(popped.sequence, 3);
    }

    #[test]
    fn forward_clears_redo() {
        let mut history = History::new(100);
        history.redo.push(entry(1));
        assert!(!history.redo.is_empty());
        history.record_forward(entry(2));
        assert!(history.redo.is_empty());
    }

    #[test]
    fn hundred_entry_bound() {
        let mut history = History::new(DEFAULT_HISTORY_DEPTH);
        for i in 0..101 {
            history.record_forward(entry(i));
        }
        assert_eq!(history.undo.len(), 100);
        for _ in 0..100 {
            assert!(history.undo.pop().is_some());
        }
        assert!(history.undo.pop().is_none());
    }
}
