//! Undo log for speculative node mutation.
//!
//! Search and propagation code opens a checkpoint, overwrites node slots
//! while recording the values they held, and later rolls back to the
//! checkpoint. Rollback restores recorded slots most-recent-first, so a slot
//! written several times ends up with the value it had when the checkpoint
//! was opened. Checkpoints nest and unwind innermost first.

use crate::error::GcError;
use crate::node::{NodeRef, Slot};

/// Address of one vector slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldAddr {
    /// The vector owning the slot.
    pub node: NodeRef,
    /// Slot index.
    pub index: usize,
}

impl FieldAddr {
    /// Address of slot `index` of `node`.
    #[must_use]
    pub const fn new(node: NodeRef, index: usize) -> Self {
        Self { node, index }
    }
}

/// One recorded overwrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrailEntry {
    /// The overwritten slot.
    pub field: FieldAddr,
    /// Its value before the overwrite.
    pub prior: Slot,
}

/// Identifies one checkpoint.
///
/// A mark stays tied to its own checkpoint: once that checkpoint is closed,
/// a newer checkpoint opened at the same depth does not answer to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TrailMark {
    depth: usize,
    serial: u64,
}

impl TrailMark {
    /// Nesting depth this mark was opened at (1 for the outermost).
    #[must_use]
    pub const fn depth(self) -> usize {
        self.depth
    }
}

#[derive(Debug, Clone, Copy)]
struct Checkpoint {
    /// Length of the entry stack when the checkpoint was taken.
    start: usize,
    serial: u64,
}

/// Stack of recorded overwrites delimited by checkpoints.
#[derive(Debug, Default)]
pub struct Trail {
    entries: Vec<TrailEntry>,
    checkpoints: Vec<Checkpoint>,
    next_serial: u64,
}

impl Trail {
    /// Create an empty trail.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
            checkpoints: Vec::new(),
            next_serial: 0,
        }
    }

    /// Open a checkpoint.
    pub fn checkpoint(&mut self) -> TrailMark {
        let serial = self.next_serial;
        self.next_serial += 1;
        self.checkpoints.push(Checkpoint {
            start: self.entries.len(),
            serial,
        });
        TrailMark {
            depth: self.checkpoints.len(),
            serial,
        }
    }

    /// Record that `field` held `prior` before being overwritten.
    ///
    /// Without an open checkpoint there is nothing to roll back to, and the
    /// record is dropped.
    pub fn record(&mut self, field: FieldAddr, prior: Slot) {
        if !self.checkpoints.is_empty() {
            self.entries.push(TrailEntry { field, prior });
        }
    }

    /// Pop every entry recorded since the innermost checkpoint, handing them
    /// to `restore` most recent first, and close that checkpoint.
    ///
    /// Returns the number of entries restored.
    ///
    /// # Errors
    ///
    /// Returns [`GcError::NoCheckpoint`] if no checkpoint is open.
    pub fn rollback(&mut self, mut restore: impl FnMut(TrailEntry)) -> Result<usize, GcError> {
        let start = self.checkpoints.pop().ok_or(GcError::NoCheckpoint)?.start;
        let restored = self.entries.len() - start;
        for entry in self.entries.drain(start..).rev() {
            restore(entry);
        }
        Ok(restored)
    }

    /// Roll back every checkpoint down to and including `mark`.
    ///
    /// # Errors
    ///
    /// Returns [`GcError::NoCheckpoint`] if `mark` is no longer open. Nothing
    /// is rolled back in that case.
    pub fn rollback_to(
        &mut self,
        mark: TrailMark,
        mut restore: impl FnMut(TrailEntry),
    ) -> Result<usize, GcError> {
        let open = mark
            .depth
            .checked_sub(1)
            .and_then(|index| self.checkpoints.get(index))
            .is_some_and(|checkpoint| checkpoint.serial == mark.serial);
        if !open {
            return Err(GcError::NoCheckpoint);
        }
        let mut restored = 0;
        while self.checkpoints.len() >= mark.depth {
            restored += self.rollback(&mut restore)?;
        }
        Ok(restored)
    }

    /// Close the innermost checkpoint, keeping its writes.
    ///
    /// The entries are merged into the enclosing checkpoint so that rolling
    /// that one back still undoes them.
    ///
    /// # Errors
    ///
    /// Returns [`GcError::NoCheckpoint`] if no checkpoint is open.
    pub fn commit(&mut self) -> Result<(), GcError> {
        self.checkpoints.pop().ok_or(GcError::NoCheckpoint)?;
        if self.checkpoints.is_empty() {
            self.entries.clear();
        }
        Ok(())
    }

    /// Number of open checkpoints.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.checkpoints.len()
    }

    /// Number of recorded entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Nodes held by recorded prior values; rollback may write them back, so
    /// they are roots.
    pub fn prior_nodes(&self) -> impl Iterator<Item = NodeRef> + '_ {
        self.entries.iter().filter_map(|entry| entry.prior.as_node())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(index: usize) -> FieldAddr {
        FieldAddr::new(NodeRef::new(0, 0), index)
    }

    #[test]
    fn rollback_restores_in_reverse_order() {
        let mut trail = Trail::new();
        trail.checkpoint();
        trail.record(field(0), Slot::Scalar(1));
        trail.record(field(0), Slot::Scalar(2));
        trail.record(field(1), Slot::Empty);

        let mut seen = Vec::new();
        let restored = trail.rollback(|entry| seen.push(entry)).unwrap();
        assert_eq!(restored, 3);
        assert_eq!(
            seen.iter().map(|e| e.prior).collect::<Vec<_>>(),
            vec![Slot::Empty, Slot::Scalar(2), Slot::Scalar(1)]
        );
        assert!(trail.is_empty());
        assert_eq!(trail.depth(), 0);
    }

    #[test]
    fn nested_checkpoints_unwind_innermost_first() {
        let mut trail = Trail::new();
        trail.checkpoint();
        trail.record(field(0), Slot::Scalar(10));
        let inner = trail.checkpoint();
        assert_eq!(inner.depth(), 2);
        trail.record(field(1), Slot::Scalar(20));

        let mut seen = Vec::new();
        assert_eq!(trail.rollback(|e| seen.push(e.field.index)).unwrap(), 1);
        assert_eq!(seen, vec![1]);
        assert_eq!(trail.len(), 1);
        assert_eq!(trail.rollback(|e| seen.push(e.field.index)).unwrap(), 1);
        assert_eq!(seen, vec![1, 0]);
    }

    #[test]
    fn record_without_checkpoint_is_dropped() {
        let mut trail = Trail::new();
        trail.record(field(0), Slot::Scalar(1));
        assert!(trail.is_empty());
        assert_eq!(trail.rollback(|_| {}), Err(GcError::NoCheckpoint));
    }

    #[test]
    fn rollback_to_unwinds_several_levels() {
        let mut trail = Trail::new();
        let outer = trail.checkpoint();
        trail.record(field(0), Slot::Scalar(1));
        trail.checkpoint();
        trail.record(field(1), Slot::Scalar(2));
        trail.checkpoint();

        assert_eq!(trail.rollback_to(outer, |_| {}).unwrap(), 2);
        assert_eq!(trail.depth(), 0);
        assert_eq!(trail.rollback_to(outer, |_| {}), Err(GcError::NoCheckpoint));
    }

    #[test]
    fn commit_merges_into_enclosing_checkpoint() {
        let mut trail = Trail::new();
        trail.checkpoint();
        trail.checkpoint();
        trail.record(field(3), Slot::Scalar(7));
        trail.commit().unwrap();
        assert_eq!(trail.len(), 1);

        let mut seen = Vec::new();
        trail.rollback(|e| seen.push(e.prior)).unwrap();
        assert_eq!(seen, vec![Slot::Scalar(7)]);
    }

    #[test]
    fn closed_mark_does_not_match_reopened_depth() {
        let mut trail = Trail::new();
        let closed = trail.checkpoint();
        trail.rollback(|_| {}).unwrap();
        let reopened = trail.checkpoint();
        assert_eq!(reopened.depth(), closed.depth());
        trail.record(field(0), Slot::Scalar(1));

        assert_eq!(trail.rollback_to(closed, |_| {}), Err(GcError::NoCheckpoint));
        assert_eq!(trail.depth(), 1);
        assert_eq!(trail.len(), 1);
        assert_eq!(trail.rollback_to(reopened, |_| {}), Ok(1));
    }
}
