//! Node accessors, trail operations and string interning on [`Collector`].
//!
//! Closures passed to `with_chunk`/`with_chunk_mut` run while the heap is
//! borrowed and must not call back into the collector.

use crate::error::GcError;
use crate::gc::Collector;
use crate::node::{Flag, NodeHeader, NodeKind, NodeRef, Object, Slot};
use crate::trail::{FieldAddr, TrailMark};

impl Collector {
    // ------------------------------------------------------------------------
    // Reading nodes
    // ------------------------------------------------------------------------

    /// Whether `node` names a resident object of this collector.
    #[must_use]
    pub fn is_live(&self, node: NodeRef) -> bool {
        self.state().heap.is_live(node)
    }

    /// Header of a resident object.
    #[must_use]
    pub fn header(&self, node: NodeRef) -> Option<NodeHeader> {
        self.state().heap.header(node)
    }

    /// Kind of a resident object.
    #[must_use]
    pub fn kind(&self, node: NodeRef) -> Option<NodeKind> {
        self.header(node).map(NodeHeader::kind)
    }

    /// Length in bytes (chunk) or slots (vector).
    #[must_use]
    pub fn len(&self, node: NodeRef) -> Option<usize> {
        self.state().heap.object(node).map(Object::len)
    }

    /// Whether the object is a vector.
    #[must_use]
    pub fn is_vector(&self, node: NodeRef) -> bool {
        matches!(self.state().heap.object(node), Some(Object::Vector(_)))
    }

    /// One slot of a vector.
    #[must_use]
    pub fn slot(&self, node: NodeRef, index: usize) -> Option<Slot> {
        match self.state().heap.object(node) {
            Some(Object::Vector(slots)) => slots.get(index).copied(),
            _ => None,
        }
    }

    /// Copy of all slots of a vector.
    #[must_use]
    pub fn slots(&self, node: NodeRef) -> Option<Vec<Slot>> {
        match self.state().heap.object(node) {
            Some(Object::Vector(slots)) => Some(slots.to_vec()),
            _ => None,
        }
    }

    /// Run `f` on the bytes of a chunk.
    pub fn with_chunk<R>(&self, node: NodeRef, f: impl FnOnce(&[u8]) -> R) -> Option<R> {
        match self.state().heap.object(node) {
            Some(Object::Chunk(bytes)) => Some(f(bytes)),
            _ => None,
        }
    }

    /// Read a header flag.
    #[must_use]
    pub fn flag(&self, node: NodeRef, flag: Flag) -> Option<bool> {
        self.header(node).map(|header| header.flag(flag))
    }

    // ------------------------------------------------------------------------
    // Writing nodes
    // ------------------------------------------------------------------------

    /// Overwrite one vector slot, returning the previous value.
    ///
    /// The write is not trailed; see [`set_slot_trailed`](Self::set_slot_trailed).
    ///
    /// # Errors
    ///
    /// Fails if `node` is stale, not a vector, or `index` is out of bounds.
    pub fn set_slot(&self, node: NodeRef, index: usize, value: Slot) -> Result<Slot, GcError> {
        let mut state = self.state_mut();
        let slot = vector_slot_mut(state.heap.object_mut(node), node, index)?;
        Ok(std::mem::replace(slot, value))
    }

    /// Overwrite one vector slot and record its previous value on the trail.
    ///
    /// # Errors
    ///
    /// Fails if `node` is stale, not a vector, or `index` is out of bounds.
    /// Nothing is recorded in that case.
    pub fn set_slot_trailed(
        &self,
        node: NodeRef,
        index: usize,
        value: Slot,
    ) -> Result<Slot, GcError> {
        let mut state = self.state_mut();
        let slot = vector_slot_mut(state.heap.object_mut(node), node, index)?;
        let prior = std::mem::replace(slot, value);
        state.trail.record(FieldAddr::new(node, index), prior);
        Ok(prior)
    }

    /// Run `f` on the mutable bytes of a chunk.
    ///
    /// # Errors
    ///
    /// Fails if `node` is stale or not a chunk.
    pub fn with_chunk_mut<R>(
        &self,
        node: NodeRef,
        f: impl FnOnce(&mut [u8]) -> R,
    ) -> Result<R, GcError> {
        let mut state = self.state_mut();
        match state.heap.object_mut(node) {
            Some(Object::Chunk(bytes)) => Ok(f(bytes)),
            Some(Object::Vector(_)) => Err(GcError::NotAChunk(node)),
            None => Err(GcError::StaleNode(node)),
        }
    }

    /// Write a header flag.
    ///
    /// # Errors
    ///
    /// Fails if `node` is stale.
    pub fn set_flag(&self, node: NodeRef, flag: Flag, value: bool) -> Result<(), GcError> {
        let mut state = self.state_mut();
        let header = state
            .heap
            .header_mut(node)
            .ok_or(GcError::StaleNode(node))?;
        header.set_flag(flag, value);
        Ok(())
    }

    /// Replace the secondary id of a node.
    ///
    /// # Errors
    ///
    /// Fails if `node` is stale.
    pub fn set_secondary(&self, node: NodeRef, secondary: u8) -> Result<(), GcError> {
        let mut state = self.state_mut();
        let header = state
            .heap
            .header_mut(node)
            .ok_or(GcError::StaleNode(node))?;
        *header = header.with_secondary(secondary);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Trail
    // ------------------------------------------------------------------------

    /// Open a trail checkpoint.
    pub fn trail_checkpoint(&self) -> TrailMark {
        self.state_mut().trail.checkpoint()
    }

    /// Record that `field` held `prior` and is about to be overwritten.
    ///
    /// Dropped when no checkpoint is open.
    pub fn trail_record(&self, field: FieldAddr, prior: Slot) {
        self.state_mut().trail.record(field, prior);
    }

    /// Undo every recorded write since the innermost checkpoint, most recent
    /// first, and close it.
    ///
    /// Fields whose vector has been reclaimed in the meantime are skipped.
    /// Returns the number of entries popped.
    ///
    /// # Errors
    ///
    /// [`GcError::NoCheckpoint`] if no checkpoint is open.
    pub fn trail_rollback(&self) -> Result<usize, GcError> {
        let mut guard = self.state_mut();
        let state = &mut *guard;
        let heap = &mut state.heap;
        state.trail.rollback(|entry| {
            let field = entry.field;
            if let Ok(slot) = vector_slot_mut(heap.object_mut(field.node), field.node, field.index)
            {
                *slot = entry.prior;
            }
        })
    }

    /// Roll back every checkpoint down to and including `mark`.
    ///
    /// # Errors
    ///
    /// [`GcError::NoCheckpoint`] if `mark` has already been closed.
    pub fn trail_rollback_to(&self, mark: TrailMark) -> Result<usize, GcError> {
        let mut guard = self.state_mut();
        let state = &mut *guard;
        let heap = &mut state.heap;
        state.trail.rollback_to(mark, |entry| {
            let field = entry.field;
            if let Ok(slot) = vector_slot_mut(heap.object_mut(field.node), field.node, field.index)
            {
                *slot = entry.prior;
            }
        })
    }

    /// Close the innermost checkpoint, keeping its writes.
    ///
    /// # Errors
    ///
    /// [`GcError::NoCheckpoint`] if no checkpoint is open.
    pub fn trail_commit(&self) -> Result<(), GcError> {
        self.state_mut().trail.commit()
    }

    /// Number of open trail checkpoints.
    #[must_use]
    pub fn trail_depth(&self) -> usize {
        self.state().trail.depth()
    }

    /// Number of recorded trail entries.
    #[must_use]
    pub fn trail_len(&self) -> usize {
        self.state().trail.len()
    }

    // ------------------------------------------------------------------------
    // Interned strings
    // ------------------------------------------------------------------------

    /// The live string node for `text`, allocating it if needed.
    ///
    /// Equal texts share one node for as long as it survives collections.
    pub fn intern(&self, text: &str) -> NodeRef {
        if let Some(&node) = self.state().interned.get(text) {
            return node;
        }
        let node = self.allocate_chunk(NodeKind::STRING, text.as_bytes());
        self.state_mut().interned.insert(text.into(), node);
        node
    }

    /// The live string node for `text`, if it has been interned.
    #[must_use]
    pub fn find_interned(&self, text: &str) -> Option<NodeRef> {
        self.state().interned.get(text).copied()
    }

    /// Text of a string node.
    #[must_use]
    pub fn string(&self, node: NodeRef) -> Option<String> {
        let state = self.state();
        if state.heap.header(node)?.kind() != NodeKind::STRING {
            return None;
        }
        match state.heap.object(node)? {
            Object::Chunk(bytes) => std::str::from_utf8(bytes).ok().map(str::to_owned),
            Object::Vector(_) => None,
        }
    }

    /// Number of live interned strings.
    #[must_use]
    pub fn interned_count(&self) -> usize {
        self.state().interned.len()
    }
}

fn vector_slot_mut(
    object: Option<&mut Object>,
    node: NodeRef,
    index: usize,
) -> Result<&mut Slot, GcError> {
    match object {
        Some(Object::Vector(slots)) => {
            let len = slots.len();
            slots
                .get_mut(index)
                .ok_or(GcError::SlotOutOfBounds { node, index, len })
        }
        Some(Object::Chunk(_)) => Err(GcError::NotAVector(node)),
        None => Err(GcError::StaleNode(node)),
    }
}
