//! Undo/redo stacks of committed transactions.
//!
//! Each entry is the full record list of one outermost transaction. Undo
//! replays the inverses of an entry newest first; redo replays it as is.

use crate::change::Change;

/// Manages undo/redo stacks with a depth limit.
#[derive(Debug)]
pub struct UndoManager {
    undo_stack: Vec<Vec<Change>>,
    redo_stack: Vec<Vec<Change>>,
    /// Maximum undo depth.
    max_depth: usize,
}

impl UndoManager {
    pub fn new(max_depth: usize) -> Self {
        Self {
            undo_stack: Vec::with_capacity(max_depth.min(64)),
            redo_stack: Vec::new(),
            max_depth,
        }
    }

    /// Push a committed transaction. Empty transactions are not undo steps.
    pub fn push(&mut self, records: Vec<Change>) {
        if records.is_empty() {
            return;
        }
        self.push_undo(records);
        // Clear redo stack on new action
        self.redo_stack.clear();
    }

    /// Push without touching the redo stack (used by redo).
    pub fn push_undo(&mut self, records: Vec<Change>) {
        self.undo_stack.push(records);
        if self.undo_stack.len() > self.max_depth {
            self.undo_stack.remove(0);
        }
    }

    pub fn pop_undo(&mut self) -> Option<Vec<Change>> {
        self.undo_stack.pop()
    }

    pub fn push_redo(&mut self, records: Vec<Change>) {
        self.redo_stack.push(records);
    }

    pub fn pop_redo(&mut self) -> Option<Vec<Change>> {
        self.redo_stack.pop()
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }
}

impl Default for UndoManager {
    fn default() -> Self {
        Self::new(100)
    }
}
