//! Size-classed, non-moving object heap.
//!
//! The heap is an arena of slots. Each slot holds at most one object and
//! remembers the size class it was last allocated for, so a reclaimed slot is
//! handed back out only to a request of the same class. A reclaimed slot bumps
//! its generation, which invalidates every [`NodeRef`] issued for the previous
//! occupant.
//!
//! # Size classes
//!
//! Object footprints (see [`Object::memsize`]) are routed to the smallest
//! class in [`SIZE_CLASSES`] that fits them. Anything above
//! [`MAX_SMALL_OBJECT_SIZE`] is a large object and is accounted at its exact
//! footprint.

use std::collections::BTreeMap;

use crate::metrics::KindStats;
use crate::node::{NodeHeader, NodeKind, NodeRef, Object};

// ============================================================================
// Constants
// ============================================================================

/// Size classes for object allocation.
/// Objects are routed to the smallest size class that fits them.
pub const SIZE_CLASSES: [usize; 8] = [16, 32, 64, 128, 256, 512, 1024, 2048];

/// Objects larger than this are large objects.
pub const MAX_SMALL_OBJECT_SIZE: usize = 2048;

/// Free list index used for large objects.
const LARGE_CLASS_INDEX: usize = SIZE_CLASSES.len();

/// Compute the size class for a given footprint, or `None` for large objects.
#[must_use]
pub const fn compute_size_class(size: usize) -> Option<usize> {
    match compute_class_index(size) {
        LARGE_CLASS_INDEX => None,
        index => Some(SIZE_CLASSES[index]),
    }
}

/// Compute the free list index for a given footprint.
const fn compute_class_index(size: usize) -> usize {
    let mut index = 0;
    while index < SIZE_CLASSES.len() {
        if size <= SIZE_CLASSES[index] {
            return index;
        }
        index += 1;
    }
    LARGE_CLASS_INDEX
}

/// Bytes actually reserved for an object of the given footprint.
#[must_use]
pub const fn block_size_for(size: usize) -> usize {
    match compute_size_class(size) {
        Some(class) => class,
        None => size,
    }
}

// ============================================================================
// HeapSlot
// ============================================================================

/// One arena slot.
#[derive(Debug)]
struct HeapSlot {
    header: NodeHeader,
    generation: u32,
    /// Bytes reserved by the current (or last) occupant.
    block_size: usize,
    object: Option<Object>,
}

impl HeapSlot {
    fn holds(&self, node: NodeRef) -> bool {
        self.generation == node.generation() && self.object.is_some()
    }
}

// ============================================================================
// SweepOutcome
// ============================================================================

/// What a sweep reclaimed and what survived.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepOutcome {
    /// Objects freed by this sweep.
    pub objects_reclaimed: usize,
    /// Bytes returned to the free lists.
    pub bytes_reclaimed: usize,
    /// Objects still resident.
    pub objects_surviving: usize,
    /// Bytes still outstanding.
    pub bytes_surviving: usize,
    /// Breakdown by node kind.
    pub per_kind: BTreeMap<NodeKind, KindStats>,
}

// ============================================================================
// Heap
// ============================================================================

/// Exclusive owner of every heap object of one collector.
#[derive(Debug)]
pub struct Heap {
    slots: Vec<HeapSlot>,
    /// Free slot indices, one list per size class plus one for large objects.
    free_lists: [Vec<u32>; SIZE_CLASSES.len() + 1],
    /// Bytes reserved by resident objects.
    bytes_outstanding: usize,
    /// High-water mark of `bytes_outstanding`.
    max_mem: usize,
    live_objects: usize,
}

impl Heap {
    /// Create a new empty heap.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_lists: Default::default(),
            bytes_outstanding: 0,
            max_mem: 0,
            live_objects: 0,
        }
    }

    /// Place `object` in the heap and return its stable address.
    ///
    /// A free slot of the same size class is reused when one exists.
    ///
    /// # Panics
    ///
    /// Panics if the arena would exceed `u32::MAX` slots.
    pub fn allocate(&mut self, header: NodeHeader, object: Object) -> NodeRef {
        let footprint = object.memsize();
        let block_size = block_size_for(footprint);
        let class_index = compute_class_index(footprint);

        let index = if let Some(index) = self.free_lists[class_index].pop() {
            let slot = &mut self.slots[index as usize];
            debug_assert!(slot.object.is_none());
            slot.header = header;
            slot.block_size = block_size;
            slot.object = Some(object);
            index
        } else {
            let index = u32::try_from(self.slots.len()).expect("heap slot index overflow");
            self.slots.push(HeapSlot {
                header,
                generation: 0,
                block_size,
                object: Some(object),
            });
            index
        };

        self.live_objects += 1;
        self.bytes_outstanding += block_size;
        self.max_mem = self.max_mem.max(self.bytes_outstanding);

        NodeRef::new(index, self.slots[index as usize].generation)
    }

    fn slot(&self, node: NodeRef) -> Option<&HeapSlot> {
        self.slots
            .get(node.index() as usize)
            .filter(|slot| slot.holds(node))
    }

    fn slot_mut(&mut self, node: NodeRef) -> Option<&mut HeapSlot> {
        self.slots
            .get_mut(node.index() as usize)
            .filter(|slot| slot.holds(node))
    }

    /// Whether `node` still names a resident object.
    #[must_use]
    pub fn is_live(&self, node: NodeRef) -> bool {
        self.slot(node).is_some()
    }

    /// Header of a resident object.
    #[must_use]
    pub fn header(&self, node: NodeRef) -> Option<NodeHeader> {
        self.slot(node).map(|slot| slot.header)
    }

    /// Mutable header of a resident object.
    pub fn header_mut(&mut self, node: NodeRef) -> Option<&mut NodeHeader> {
        self.slot_mut(node).map(|slot| &mut slot.header)
    }

    /// Payload of a resident object.
    #[must_use]
    pub fn object(&self, node: NodeRef) -> Option<&Object> {
        self.slot(node).and_then(|slot| slot.object.as_ref())
    }

    /// Mutable payload of a resident object.
    pub fn object_mut(&mut self, node: NodeRef) -> Option<&mut Object> {
        self.slot_mut(node).and_then(|slot| slot.object.as_mut())
    }

    /// Set the mark bit of `node`.
    ///
    /// Returns `true` only if the object is resident and was not yet marked,
    /// i.e. when its children still need to be visited.
    pub fn mark(&mut self, node: NodeRef) -> bool {
        match self.slot_mut(node) {
            Some(slot) if !slot.header.is_marked() => {
                slot.header.set_mark();
                true
            }
            _ => false,
        }
    }

    /// Whether `node` is resident and marked.
    #[must_use]
    pub fn is_marked(&self, node: NodeRef) -> bool {
        self.slot(node).is_some_and(|slot| slot.header.is_marked())
    }

    /// Clear all mark bits.
    pub fn clear_marks(&mut self) {
        for slot in &mut self.slots {
            slot.header.clear_mark();
        }
    }

    /// Free every unmarked object and clear the marks of the survivors.
    pub fn sweep(&mut self) -> SweepOutcome {
        let mut outcome = SweepOutcome::default();

        for (index, slot) in self.slots.iter_mut().enumerate() {
            let Some(object) = &slot.object else {
                continue;
            };
            let kind = slot.header.kind();
            let stats = outcome.per_kind.entry(kind).or_default();

            if slot.header.is_marked() {
                slot.header.clear_mark();
                stats.surviving += 1;
                stats.bytes_surviving += slot.block_size;
                outcome.objects_surviving += 1;
                outcome.bytes_surviving += slot.block_size;
                continue;
            }

            let class_index = compute_class_index(object.memsize());
            stats.reclaimed += 1;
            stats.bytes_reclaimed += slot.block_size;
            outcome.objects_reclaimed += 1;
            outcome.bytes_reclaimed += slot.block_size;

            slot.object = None;
            slot.header = NodeHeader::new(NodeKind::FREE);
            slot.generation = slot.generation.wrapping_add(1);
            #[allow(clippy::cast_possible_truncation)]
            self.free_lists[class_index].push(index as u32);
        }

        self.bytes_outstanding -= outcome.bytes_reclaimed;
        self.live_objects -= outcome.objects_reclaimed;
        self.max_mem = self.max_mem.max(self.bytes_outstanding);
        outcome
    }

    /// Greatest number of bytes ever outstanding at once.
    #[must_use]
    pub const fn max_mem(&self) -> usize {
        self.max_mem
    }

    /// Bytes reserved by resident objects.
    #[must_use]
    pub const fn bytes_outstanding(&self) -> usize {
        self.bytes_outstanding
    }

    /// Number of resident objects.
    #[must_use]
    pub const fn live_objects(&self) -> usize {
        self.live_objects
    }

    /// Number of arena slots, resident or free.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Iterate over every resident object.
    pub fn iter(&self) -> impl Iterator<Item = (NodeRef, NodeHeader, &Object)> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            #[allow(clippy::cast_possible_truncation)]
            let node = NodeRef::new(index as u32, slot.generation);
            slot.object.as_ref().map(|object| (node, slot.header, object))
        })
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Slot;

    fn chunk(len: usize) -> Object {
        Object::Chunk(vec![0; len].into())
    }

    #[test]
    fn size_class_routing() {
        assert_eq!(compute_size_class(16), Some(16));
        assert_eq!(compute_size_class(17), Some(32));
        assert_eq!(compute_size_class(2048), Some(2048));
        assert_eq!(compute_size_class(2049), None);
        assert_eq!(block_size_for(4000), 4000);
    }

    #[test]
    fn allocation_accounts_block_size() {
        let mut heap = Heap::new();
        heap.allocate(NodeHeader::new(NodeKind::CHUNK), chunk(1));
        assert_eq!(heap.bytes_outstanding(), 32);
        heap.allocate(NodeHeader::new(NodeKind::CHUNK), chunk(3000));
        assert_eq!(heap.bytes_outstanding(), 32 + 3016);
        assert_eq!(heap.max_mem(), 32 + 3016);
        assert_eq!(heap.live_objects(), 2);
    }

    #[test]
    fn sweep_frees_unmarked_and_keeps_marked() {
        let mut heap = Heap::new();
        let a = heap.allocate(NodeHeader::new(NodeKind::CHUNK), chunk(4));
        let b = heap.allocate(NodeHeader::new(NodeKind::CHUNK), chunk(4));

        assert!(heap.mark(a));
        assert!(!heap.mark(a));
        let outcome = heap.sweep();

        assert_eq!(outcome.objects_reclaimed, 1);
        assert_eq!(outcome.objects_surviving, 1);
        assert!(heap.is_live(a));
        assert!(!heap.is_live(b));
        assert!(!heap.is_marked(a));
        assert_eq!(heap.bytes_outstanding(), 32);
        assert_eq!(heap.max_mem(), 64);
    }

    #[test]
    fn reclaimed_slot_is_reused_by_same_class_only() {
        let mut heap = Heap::new();
        let small = heap.allocate(NodeHeader::new(NodeKind::CHUNK), chunk(4));
        heap.sweep();

        let big = heap.allocate(
            NodeHeader::new(NodeKind::VECTOR),
            Object::Vector(vec![Slot::Empty; 40].into()),
        );
        assert!(!big.same_slot(small));

        let reuse = heap.allocate(NodeHeader::new(NodeKind::CHUNK), chunk(10));
        assert!(reuse.same_slot(small));
        assert_ne!(reuse, small);
        assert!(heap.object(small).is_none());
        assert_eq!(heap.object(reuse).map(Object::len), Some(10));
    }

    #[test]
    fn per_kind_statistics() {
        let mut heap = Heap::new();
        let string = NodeKind::STRING;
        let keep = heap.allocate(NodeHeader::new(string), chunk(2));
        heap.allocate(NodeHeader::new(string), chunk(2));
        heap.allocate(NodeHeader::new(NodeKind::VECTOR), Object::Vector(Box::new([])));
        heap.mark(keep);

        let outcome = heap.sweep();
        let strings = outcome.per_kind[&string];
        assert_eq!(strings.surviving, 1);
        assert_eq!(strings.reclaimed, 1);
        assert_eq!(outcome.per_kind[&NodeKind::VECTOR].reclaimed, 1);
    }
}
