//! Keep-alive and weak reference handles.
//!
//! Both handles are registrations owned by the collector. Creating one
//! inserts an entry in O(1), dropping it removes exactly that entry. Cloning
//! creates a new, independent registration.

use std::fmt;

use crate::gc::{Collector, KeepAliveKey, WeakEntry, WeakRefKey};
use crate::node::NodeRef;

// ============================================================================
// KeepAlive
// ============================================================================

/// Owning root reference to one node.
///
/// The referenced node survives every collection while the handle exists,
/// whatever else refers to it. Two handles to the same node are two
/// independent roots.
pub struct KeepAlive {
    collector: Collector,
    key: KeepAliveKey,
    node: NodeRef,
}

impl KeepAlive {
    /// Pin `node` alive.
    pub fn new(collector: &Collector, node: NodeRef) -> Self {
        let key = collector.state_mut().keep_alive.insert(node);
        Self {
            collector: collector.clone(),
            key,
            node,
        }
    }

    /// The pinned node.
    #[must_use]
    pub const fn get(&self) -> NodeRef {
        self.node
    }

    /// Pin a different node with this handle's registration.
    pub fn set(&mut self, node: NodeRef) {
        if let Some(entry) = self.collector.state_mut().keep_alive.get_mut(self.key) {
            *entry = node;
        }
        self.node = node;
    }

    /// The collector this handle is registered with.
    #[must_use]
    pub const fn collector(&self) -> &Collector {
        &self.collector
    }
}

impl Clone for KeepAlive {
    fn clone(&self) -> Self {
        Self::new(&self.collector, self.node)
    }

    fn clone_from(&mut self, source: &Self) {
        if self.collector.ptr_eq(&source.collector) {
            self.set(source.node);
        } else {
            *self = source.clone();
        }
    }
}

impl Drop for KeepAlive {
    fn drop(&mut self) {
        self.collector.state_mut().keep_alive.remove(self.key);
    }
}

impl fmt::Debug for KeepAlive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("KeepAlive").field(&self.node).finish()
    }
}

// ============================================================================
// WeakRef
// ============================================================================

/// Non-owning observer of one node.
///
/// A weak reference never keeps its node alive. The first collection that
/// finds the node otherwise unreachable invalidates the reference for good:
/// [`get`](Self::get) then yields `None`, even if a later allocation reuses
/// the node's slot.
pub struct WeakRef {
    collector: Collector,
    key: WeakRefKey,
}

impl WeakRef {
    /// Observe `node`.
    pub fn new(collector: &Collector, node: NodeRef) -> Self {
        let valid = collector.is_live(node);
        Self::register(collector, WeakEntry { node, valid })
    }

    fn register(collector: &Collector, entry: WeakEntry) -> Self {
        let key = collector.state_mut().weak_refs.insert(entry);
        Self {
            collector: collector.clone(),
            key,
        }
    }

    fn entry(&self) -> Option<WeakEntry> {
        self.collector.state().weak_refs.get(self.key).copied()
    }

    /// The observed node, or `None` once it has been collected.
    #[must_use]
    pub fn get(&self) -> Option<NodeRef> {
        self.entry()
            .filter(|entry| entry.valid)
            .map(|entry| entry.node)
    }

    /// Whether the observed node is still alive.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.get().is_some()
    }

    /// The collector this handle is registered with.
    #[must_use]
    pub const fn collector(&self) -> &Collector {
        &self.collector
    }
}

impl Clone for WeakRef {
    /// A new registration observing the same node; a clone of an
    /// invalidated reference is invalid as well.
    fn clone(&self) -> Self {
        let entry = self.entry().unwrap_or(WeakEntry {
            node: NodeRef::new(0, 0),
            valid: false,
        });
        Self::register(&self.collector, entry)
    }
}

impl Drop for WeakRef {
    fn drop(&mut self) {
        self.collector.state_mut().weak_refs.remove(self.key);
    }
}

impl fmt::Debug for WeakRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("WeakRef").field(&self.get()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GcConfig;
    use crate::node::NodeKind;

    fn collector() -> Collector {
        Collector::with_config(GcConfig::manual())
    }

    #[test]
    fn duplicate_keep_alives_are_independent() {
        let gc = collector();
        let node = gc.allocate_chunk(NodeKind::CHUNK, b"x");
        let first = KeepAlive::new(&gc, node);
        let second = first.clone();

        drop(first);
        gc.trigger();
        assert!(gc.is_live(node));
        assert_eq!(second.get(), node);

        drop(second);
        gc.trigger();
        assert!(!gc.is_live(node));
    }

    #[test]
    fn set_moves_the_pin() {
        let gc = collector();
        let a = gc.allocate_chunk(NodeKind::CHUNK, b"a");
        let b = gc.allocate_chunk(NodeKind::CHUNK, b"b");
        let mut keep = KeepAlive::new(&gc, a);
        let _b_keep = KeepAlive::new(&gc, b);
        keep.set(b);

        gc.trigger();
        assert!(!gc.is_live(a));
        assert!(gc.is_live(b));
    }

    #[test]
    fn clone_from_reuses_own_registration() {
        let gc = collector();
        let a = gc.allocate_chunk(NodeKind::CHUNK, b"a");
        let b = gc.allocate_chunk(NodeKind::CHUNK, b"b");
        let mut target = KeepAlive::new(&gc, a);
        let source = KeepAlive::new(&gc, b);
        target.clone_from(&source);
        assert_eq!(target.get(), b);
        assert_eq!(gc.state().keep_alive.len(), 2);
    }

    #[test]
    fn clone_of_invalid_weak_is_invalid() {
        let gc = collector();
        let node = gc.allocate_chunk(NodeKind::CHUNK, b"x");
        let weak = WeakRef::new(&gc, node);
        gc.trigger();
        assert!(!weak.is_valid());

        let copy = weak.clone();
        assert_eq!(copy.get(), None);
        assert_eq!(gc.state().weak_refs.len(), 2);
    }

    #[test]
    fn weak_to_stale_node_starts_invalid() {
        let gc = collector();
        let node = gc.allocate_chunk(NodeKind::CHUNK, b"x");
        gc.trigger();
        let weak = WeakRef::new(&gc, node);
        assert_eq!(weak.get(), None);
    }
}
