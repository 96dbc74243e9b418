//! Bounded undo/redo history over whole-text snapshots.
//!
//! ```text
//! push(C) with current = B
//!   undo: [A, B]   current: C   redo: []
//! undo()
//!   undo: [A]      current: B   redo: [C]
//! push(D)
//!   undo: [A, B]   current: D   redo: []
//! ```
//!
//! `current` is never stored in either stack. Both stacks drop their oldest
//! entry once they hold `capacity` snapshots, so deep history is lost first.

use std::collections::VecDeque;

/// Default number of snapshots kept on each stack.
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// A LIFO stack that evicts from the bottom once full.
#[derive(Debug, Clone)]
pub struct BoundedStack<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedStack<T> {
    /// `capacity` is clamped to at least 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity.min(DEFAULT_HISTORY_CAPACITY)),
            capacity,
        }
    }

    /// Push on top, evicting the oldest entry first if the stack is full.
    /// Returns the evicted entry.
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.items.len() >= self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    pub fn pop(&mut self) -> Option<T> {
        self.items.pop_back()
    }

    pub fn peek(&self) -> Option<&T> {
        self.items.back()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

#[derive(Debug, Clone)]
pub struct TextHistory {
    undo_stack: BoundedStack<String>,
    redo_stack: BoundedStack<String>,
    current: String,
}

impl TextHistory {
    pub fn new(initial: impl Into<String>) -> Self {
        Self::with_capacity(initial, DEFAULT_HISTORY_CAPACITY)
    }

    pub fn with_capacity(initial: impl Into<String>, capacity: usize) -> Self {
        Self {
            undo_stack: BoundedStack::new(capacity),
            redo_stack: BoundedStack::new(capacity),
            current: initial.into(),
        }
    }

    pub fn current(&self) -> &str {
        &self.current
    }

    /// Record `snapshot` as the new current text.
    ///
    /// No-op when it equals the current text. Otherwise the previous current
    /// moves onto the undo stack and the redo stack is cleared.
    pub fn push(&mut self, snapshot: impl Into<String>) {
        let snapshot = snapshot.into();
        if snapshot == self.current {
            tracing::trace!(target: "history", undo_depth = self.undo_stack.len(), "push_dedupe_skip");
            return;
        }

        let previous = std::mem::replace(&mut self.current, snapshot);
        if self.undo_stack.push(previous).is_some() {
            tracing::trace!(target: "history", capacity = self.undo_stack.capacity(), "undo_stack_evicted_oldest");
        }
        self.redo_stack.clear();
        tracing::trace!(target: "history", undo_depth = self.undo_stack.len(), "push");
    }

    pub fn undo(&mut self) -> Option<String> {
        let previous = self.undo_stack.pop()?;
        let undone = std::mem::replace(&mut self.current, previous);
        self.redo_stack.push(undone);
        tracing::trace!(target: "history", undo_depth = self.undo_stack.len(), redo_depth = self.redo_stack.len(), "undo");
        Some(self.current.clone())
    }

    pub fn redo(&mut self) -> Option<String> {
        let next = self.redo_stack.pop()?;
        let redone = std::mem::replace(&mut self.current, next);
        self.undo_stack.push(redone);
        tracing::trace!(target: "history", undo_depth = self.undo_stack.len(), redo_depth = self.redo_stack.len(), "redo");
        Some(self.current.clone())
    }

    pub fn has_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn has_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.redo_stack.len()
    }
}

impl Default for TextHistory {
    fn default() -> Self {
        Self::new(String::new())
    }
}
