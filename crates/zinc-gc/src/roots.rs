//! Root set registration.
//!
//! Long-lived aggregates (a parsed model, a name-to-node cache) keep nodes
//! alive by implementing [`Marker`] and registering with the collector.
//! [`Rooted`] does both for any [`Trace`] value: constructing it registers
//! the value, dropping it deregisters.

use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use crate::gc::{Collector, RootKey};
use crate::trace::{Trace, Tracer};

// ============================================================================
// Marker
// ============================================================================

/// Capability of exposing referenced nodes to the collector.
///
/// `mark` runs during the mark phase with the heap borrowed; it must not
/// call back into the collector.
pub trait Marker {
    /// Mark every node this aggregate currently references.
    fn mark(&self, tracer: &mut Tracer<'_>);

    /// Whether the aggregate cannot be traced right now.
    ///
    /// A busy root defers automatic collections and makes an explicit
    /// collection fail. Parts of the aggregate that turn out to be busy
    /// during marking are reported through [`Tracer::set_busy`] instead.
    fn is_busy(&self) -> bool {
        false
    }
}

impl<T: Trace + ?Sized> Marker for RefCell<T> {
    fn mark(&self, tracer: &mut Tracer<'_>) {
        self.trace(tracer);
    }

    fn is_busy(&self) -> bool {
        self.try_borrow().is_err()
    }
}

// ============================================================================
// RootRegistration
// ============================================================================

/// Membership of one marker in a collector's root set.
///
/// Dropping the registration removes exactly that membership.
#[must_use = "the marker leaves the root set when the registration is dropped"]
pub struct RootRegistration {
    collector: Collector,
    key: RootKey,
}

impl RootRegistration {
    pub(crate) const fn new(collector: Collector, key: RootKey) -> Self {
        Self { collector, key }
    }

    /// The collector this registration belongs to.
    #[must_use]
    pub const fn collector(&self) -> &Collector {
        &self.collector
    }
}

impl Drop for RootRegistration {
    fn drop(&mut self) {
        self.collector.remove_root(self.key);
    }
}

impl fmt::Debug for RootRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootRegistration")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Rooted
// ============================================================================

/// A traced aggregate that is part of the root set for its whole lifetime.
///
/// Every node reachable through the value's [`Trace`] implementation
/// survives collections while the `Rooted` exists. Holding a
/// [`borrow_mut`](Self::borrow_mut) guard across an allocation defers
/// automatic collections until the guard is released.
///
/// ```
/// use zinc_gc::{Collector, NodeKind, Rooted};
///
/// let gc = Collector::new();
/// let model = Rooted::new(&gc, Vec::new());
/// let item = gc.allocate_chunk(NodeKind::CHUNK, b"constraint");
/// model.borrow_mut().push(item);
///
/// gc.trigger();
/// assert!(gc.is_live(item));
/// ```
pub struct Rooted<T: Trace + 'static> {
    value: Rc<RefCell<T>>,
    registration: RootRegistration,
}

impl<T: Trace + 'static> Rooted<T> {
    /// Move `value` into the root set of `collector`.
    pub fn new(collector: &Collector, value: T) -> Self {
        let value = Rc::new(RefCell::new(value));
        let registration = collector.add(value.clone());
        Self {
            value,
            registration,
        }
    }

    /// Immutably borrow the aggregate.
    ///
    /// # Panics
    ///
    /// Panics if it is currently mutably borrowed.
    pub fn borrow(&self) -> Ref<'_, T> {
        self.value.borrow()
    }

    /// Mutably borrow the aggregate.
    ///
    /// # Panics
    ///
    /// Panics if it is currently borrowed.
    pub fn borrow_mut(&self) -> RefMut<'_, T> {
        self.value.borrow_mut()
    }

    /// Replace the aggregate, returning the old value.
    pub fn replace(&self, value: T) -> T {
        self.value.replace(value)
    }

    /// The collector whose root set holds this aggregate.
    #[must_use]
    pub const fn collector(&self) -> &Collector {
        self.registration.collector()
    }
}

impl<T: Trace + fmt::Debug + 'static> fmt::Debug for Rooted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Rooted").field(&self.value).finish()
    }
}
