//! Nestable transaction scopes.
//!
//! Only the outermost scope produces an undo entry. An inner scope that
//! fails rolls back everything recorded so far, immediately, and poisons
//! the outer scopes: a later successful exit of the outermost scope reports
//! [`Outcome::Poisoned`] instead of committing.

use crate::change::Change;

/// What the caller must do after a scope ends.
#[derive(Debug, PartialEq)]
pub enum Outcome {
    /// An inner scope ended; nothing to do yet.
    Nested,
    /// The outermost scope committed these records.
    Commit(Vec<Change>),
    /// Undo these records now.
    Rollback(Vec<Change>),
    /// The outermost scope exited normally after an inner scope failed.
    /// Undo these records and report the failure.
    Poisoned(Vec<Change>),
}

#[derive(Debug, Default)]
pub struct TransactionLog {
    depth: usize,
    records: Vec<Change>,
    failed: bool,
}

impl TransactionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self) {
        if self.depth == 0 {
            self.records.clear();
            self.failed = false;
        }
        self.depth += 1;
    }

    pub fn is_open(&self) -> bool {
        self.depth > 0
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Append a change to the open transaction. Ignored when none is open.
    pub fn record(&mut self, change: Change) {
        if self.depth > 0 {
            self.records.push(change);
        }
    }

    pub fn records(&self) -> &[Change] {
        &self.records
    }

    /// Close the innermost scope. `None` if no scope is open.
    pub fn end(&mut self, ok: bool) -> Option<Outcome> {
        if self.depth == 0 {
            return None;
        }
        self.depth -= 1;
        let outermost = self.depth == 0;
        let outcome = match (ok, outermost) {
            (false, _) => {
                self.failed = !outermost;
                Outcome::Rollback(std::mem::take(&mut self.records))
            }
            (true, false) => Outcome::Nested,
            (true, true) if self.failed => Outcome::Poisoned(std::mem::take(&mut self.records)),
            (true, true) => Outcome::Commit(std::mem::take(&mut self.records)),
        };
        if outermost {
            self.failed = false;
        }
        Some(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use umbra_core::ElementId;

    fn change(n: usize) -> Change {
        Change::ItemCombined {
            item: ElementId::intern("ElementItem_tx"),
            old: None,
            new: Some(n.to_string()),
        }
    }

    #[test]
    fn only_the_outermost_scope_commits() {
        let mut log = TransactionLog::new();
        log.begin();
        log.record(change(1));
        log.begin();
        log.record(change(2));
        assert_eq!(log.end(true), Some(Outcome::Nested));
        assert_eq!(log.end(true), Some(Outcome::Commit(vec![change(1), change(2)])));
        assert!(!log.is_open());
        assert_eq!(log.end(true), None);
    }

    #[test]
    fn inner_failure_poisons_the_outer_scope() {
        let mut log = TransactionLog::new();
        log.begin();
        log.record(change(1));
        log.begin();
        log.record(change(2));
        assert_eq!(log.end(false), Some(Outcome::Rollback(vec![change(1), change(2)])));
        log.record(change(3));
        assert_eq!(log.end(true), Some(Outcome::Poisoned(vec![change(3)])));

        log.begin();
        assert_eq!(log.end(true), Some(Outcome::Commit(vec![])));
    }

    #[test]
    fn records_outside_a_scope_are_dropped() {
        let mut log = TransactionLog::new();
        log.record(change(1));
        assert!(log.records().is_empty());
    }
}
