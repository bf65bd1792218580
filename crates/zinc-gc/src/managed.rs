//! A rooted map keyed by interned strings.
//!
//! Compiler passes keep name tables (identifier to declaration, annotation
//! name to handler) that must outlive collections. [`ManagedStringMap`] stores
//! the interned key nodes and its values in a [`Rooted`] aggregate, so every
//! key string and every node reachable from a value stays alive for as long
//! as the map exists.

use std::cell::Ref;
use std::collections::HashMap;
use std::fmt;

use crate::gc::Collector;
use crate::node::NodeRef;
use crate::roots::Rooted;
use crate::trace::Trace;

/// Name table rooted in a collector.
///
/// ```
/// use zinc_gc::{Collector, GcConfig, ManagedStringMap, NodeKind};
///
/// let gc = Collector::with_config(GcConfig::manual());
/// let decls = ManagedStringMap::new(&gc);
/// let decl = gc.allocate_chunk(NodeKind::CHUNK, b"var int: x");
/// decls.insert("x", decl);
///
/// gc.trigger();
/// assert_eq!(decls.get("x").as_deref(), Some(&decl));
/// assert!(gc.is_live(decl));
/// ```
pub struct ManagedStringMap<V: Trace + 'static> {
    collector: Collector,
    entries: Rooted<HashMap<NodeRef, V>>,
}

impl<V: Trace + 'static> ManagedStringMap<V> {
    /// Create an empty map rooted in `collector`.
    pub fn new(collector: &Collector) -> Self {
        Self {
            collector: collector.clone(),
            entries: Rooted::new(collector, HashMap::new()),
        }
    }

    /// Map `key` to `value`, returning the previous value.
    pub fn insert(&self, key: &str, value: V) -> Option<V> {
        let node = self.collector.intern(key);
        self.entries.borrow_mut().insert(node, value)
    }

    /// The value mapped to `key`.
    ///
    /// Only borrow the value for as long as needed: a live borrow makes the
    /// map busy and defers automatic collections.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Ref<'_, V>> {
        let node = self.collector.find_interned(key)?;
        Ref::filter_map(self.entries.borrow(), |entries| entries.get(&node)).ok()
    }

    /// Whether `key` has an entry.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.collector
            .find_interned(key)
            .is_some_and(|node| self.entries.borrow().contains_key(&node))
    }

    /// Remove the entry for `key`.
    pub fn remove(&self, key: &str) -> Option<V> {
        let node = self.collector.find_interned(key)?;
        self.entries.borrow_mut().remove(&node)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Whether the map has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The keys, in no particular order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let nodes: Vec<NodeRef> = self.entries.borrow().keys().copied().collect();
        nodes
            .into_iter()
            .filter_map(|node| self.collector.string(node))
            .collect()
    }
}

impl<V: Trace + 'static> fmt::Debug for ManagedStringMap<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedStringMap")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}
