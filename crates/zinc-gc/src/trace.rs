//! Trace trait and the marking tracer.
//!
//! Types that implement `Trace` can be held by a root aggregate
//! ([`Rooted`](crate::Rooted), [`ManagedStringMap`](crate::ManagedStringMap))
//! and will report the nodes they reference during the mark phase.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::hash::BuildHasher;
use std::rc::Rc;

use crate::heap::Heap;
use crate::node::{NodeRef, Object, Slot};

// ============================================================================
// Core Trait
// ============================================================================

/// A type that can report the heap nodes it references.
///
/// Implementations must hand every [`NodeRef`] they hold to the tracer.
/// Forgetting one is memory safe, but the node may be reclaimed while the
/// aggregate still holds its (then stale) reference.
///
/// Prefer using `#[derive(Trace)]` instead of manual implementation.
///
/// ```ignore
/// impl Trace for Model {
///     fn trace(&self, tracer: &mut Tracer<'_>) {
///         self.items.trace(tracer);
///         self.solve_item.trace(tracer);
///     }
/// }
/// ```
pub trait Trace {
    /// Report all nodes referenced by this value.
    fn trace(&self, tracer: &mut Tracer<'_>);
}

// ============================================================================
// Tracer
// ============================================================================

/// The marking visitor handed to [`Trace`] and [`Marker`](crate::Marker)
/// implementations during a collection.
///
/// Marking uses an explicit worklist, so arbitrarily deep node graphs do not
/// grow the native stack.
pub struct Tracer<'heap> {
    heap: &'heap mut Heap,
    worklist: Vec<NodeRef>,
    /// Objects newly marked during this collection.
    objects_marked: usize,
    /// Set when some aggregate could not be traced.
    busy: bool,
}

impl<'heap> Tracer<'heap> {
    pub(crate) const fn new(heap: &'heap mut Heap) -> Self {
        Self {
            heap,
            worklist: Vec::new(),
            objects_marked: 0,
            busy: false,
        }
    }

    /// Mark `node` and, transitively, everything its vector slots reference.
    ///
    /// Stale references are ignored.
    #[inline]
    pub fn mark(&mut self, node: NodeRef) {
        if self.heap.mark(node) {
            self.objects_marked += 1;
            self.worklist.push(node);
        }
    }

    /// Mark the node held by `slot`, if any.
    #[inline]
    pub fn mark_slot(&mut self, slot: Slot) {
        if let Slot::Node(node) = slot {
            self.mark(node);
        }
    }

    /// Whether `node` has been marked so far in this collection.
    #[must_use]
    pub fn is_marked(&self, node: NodeRef) -> bool {
        self.heap.is_marked(node)
    }

    /// Report that part of an aggregate could not be traced, for example
    /// because a cell inside it is mutably borrowed.
    ///
    /// The collection is abandoned before anything is reclaimed.
    #[inline]
    pub fn set_busy(&mut self) {
        self.busy = true;
    }

    /// Whether [`set_busy`](Self::set_busy) was called.
    #[must_use]
    pub const fn is_busy(&self) -> bool {
        self.busy
    }

    /// Number of objects marked so far.
    #[must_use]
    pub const fn objects_marked(&self) -> usize {
        self.objects_marked
    }

    /// Process the worklist until every reachable vector slot is visited.
    pub(crate) fn drain(&mut self) {
        while let Some(node) = self.worklist.pop() {
            let mut index = 0;
            loop {
                let slot = match self.heap.object(node) {
                    Some(Object::Vector(slots)) if index < slots.len() => slots[index],
                    _ => break,
                };
                self.mark_slot(slot);
                index += 1;
            }
        }
    }
}

// ============================================================================
// Trace implementations for node handles
// ============================================================================

impl Trace for NodeRef {
    #[inline]
    fn trace(&self, tracer: &mut Tracer<'_>) {
        tracer.mark(*self);
    }
}

impl Trace for Slot {
    #[inline]
    fn trace(&self, tracer: &mut Tracer<'_>) {
        tracer.mark_slot(*self);
    }
}

// ============================================================================
// Trace implementations for primitive types
// ============================================================================

macro_rules! impl_trace_for_primitives {
    ($($t:ty),* $(,)?) => {
        $(
            impl Trace for $t {
                #[inline]
                fn trace(&self, _tracer: &mut Tracer<'_>) {}
            }
        )*
    };
}

impl_trace_for_primitives! {
    i8, i16, i32, i64, i128, isize,
    u8, u16, u32, u64, u128, usize,
    f32, f64,
    bool, char, (),
    String, str,
    std::path::PathBuf,
    std::time::Duration,
}

// ============================================================================
// Trace implementations for std container types
// ============================================================================

impl<T: Trace + ?Sized> Trace for &T {
    #[inline]
    fn trace(&self, tracer: &mut Tracer<'_>) {
        T::trace(self, tracer);
    }
}

impl<T: Trace + ?Sized> Trace for Box<T> {
    #[inline]
    fn trace(&self, tracer: &mut Tracer<'_>) {
        T::trace(self, tracer);
    }
}

impl<T: Trace + ?Sized> Trace for Rc<T> {
    #[inline]
    fn trace(&self, tracer: &mut Tracer<'_>) {
        T::trace(self, tracer);
    }
}

impl<T: Trace> Trace for Option<T> {
    #[inline]
    fn trace(&self, tracer: &mut Tracer<'_>) {
        if let Some(value) = self {
            value.trace(tracer);
        }
    }
}

impl<T: Trace, E: Trace> Trace for Result<T, E> {
    #[inline]
    fn trace(&self, tracer: &mut Tracer<'_>) {
        match self {
            Ok(value) => value.trace(tracer),
            Err(err) => err.trace(tracer),
        }
    }
}

impl<T: Trace> Trace for [T] {
    #[inline]
    fn trace(&self, tracer: &mut Tracer<'_>) {
        for item in self {
            item.trace(tracer);
        }
    }
}

impl<T: Trace, const N: usize> Trace for [T; N] {
    #[inline]
    fn trace(&self, tracer: &mut Tracer<'_>) {
        self.as_slice().trace(tracer);
    }
}

impl<T: Trace> Trace for Vec<T> {
    #[inline]
    fn trace(&self, tracer: &mut Tracer<'_>) {
        self.as_slice().trace(tracer);
    }
}

impl<T: Trace> Trace for VecDeque<T> {
    #[inline]
    fn trace(&self, tracer: &mut Tracer<'_>) {
        for item in self {
            item.trace(tracer);
        }
    }
}

impl<T: Copy + Trace> Trace for Cell<T> {
    #[inline]
    fn trace(&self, tracer: &mut Tracer<'_>) {
        self.get().trace(tracer);
    }
}

/// A cell that is mutably borrowed while a collection runs marks the
/// tracer busy instead of being traced.
impl<T: Trace + ?Sized> Trace for RefCell<T> {
    #[inline]
    fn trace(&self, tracer: &mut Tracer<'_>) {
        match self.try_borrow() {
            Ok(value) => value.trace(tracer),
            Err(_) => tracer.set_busy(),
        }
    }
}

impl<K: Trace, V: Trace, S: BuildHasher> Trace for HashMap<K, V, S> {
    #[inline]
    fn trace(&self, tracer: &mut Tracer<'_>) {
        for (k, v) in self {
            k.trace(tracer);
            v.trace(tracer);
        }
    }
}

impl<T: Trace, S: BuildHasher> Trace for HashSet<T, S> {
    #[inline]
    fn trace(&self, tracer: &mut Tracer<'_>) {
        for item in self {
            item.trace(tracer);
        }
    }
}

impl<K: Trace, V: Trace> Trace for BTreeMap<K, V> {
    #[inline]
    fn trace(&self, tracer: &mut Tracer<'_>) {
        for (k, v) in self {
            k.trace(tracer);
            v.trace(tracer);
        }
    }
}

impl<T: Trace> Trace for BTreeSet<T> {
    #[inline]
    fn trace(&self, tracer: &mut Tracer<'_>) {
        for item in self {
            item.trace(tracer);
        }
    }
}

// ============================================================================
// Trace implementations for tuples
// ============================================================================

macro_rules! impl_trace_for_tuples {
    () => {};
    ($first:ident $(, $rest:ident)*) => {
        impl<$first: Trace $(, $rest: Trace)*> Trace for ($first, $($rest,)*) {
            #[inline]
            #[allow(non_snake_case)]
            fn trace(&self, tracer: &mut Tracer<'_>) {
                let ($first, $($rest,)*) = self;
                $first.trace(tracer);
                $($rest.trace(tracer);)*
            }
        }
        impl_trace_for_tuples!($($rest),*);
    };
}

impl_trace_for_tuples!(A, B, C, D, E, F, G, H);

impl<T: ?Sized> Trace for std::marker::PhantomData<T> {
    #[inline]
    fn trace(&self, _tracer: &mut Tracer<'_>) {}
}
