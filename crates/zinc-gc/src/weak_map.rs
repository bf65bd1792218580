//! Node-keyed maps with weak keys.

use std::fmt;

use crate::gc::{Collector, WeakMapKey};
use crate::node::NodeRef;

/// A map from nodes to nodes whose keys do not keep anything alive.
///
/// After each collection, every entry whose key was reclaimed is gone.
/// Values are not traced either: an entry whose value was reclaimed but
/// whose key survived still yields the (now stale) value, so callers that
/// need the value to live should root it separately.
///
/// ```
/// use zinc_gc::{Collector, GcConfig, KeepAlive, NodeKind, WeakNodeMap};
///
/// let gc = Collector::with_config(GcConfig::manual());
/// let key = gc.allocate_chunk(NodeKind::CHUNK, b"k");
/// let value = gc.allocate_chunk(NodeKind::CHUNK, b"v");
/// let map = WeakNodeMap::new(&gc);
/// map.insert(key, value);
///
/// let _keep = KeepAlive::new(&gc, key);
/// gc.trigger();
/// assert_eq!(map.find(key), Some(value));
/// ```
pub struct WeakNodeMap {
    collector: Collector,
    key: WeakMapKey,
}

impl WeakNodeMap {
    /// Create an empty map registered with `collector`.
    pub fn new(collector: &Collector) -> Self {
        let key = collector.state_mut().weak_maps.insert(Default::default());
        Self {
            collector: collector.clone(),
            key,
        }
    }

    /// Map `key` to `value`, returning the previous value.
    pub fn insert(&self, key: NodeRef, value: NodeRef) -> Option<NodeRef> {
        self.collector
            .state_mut()
            .weak_maps
            .get_mut(self.key)
            .and_then(|map| map.insert(key, value))
    }

    /// The value mapped to `key`.
    #[must_use]
    pub fn find(&self, key: NodeRef) -> Option<NodeRef> {
        self.collector
            .state()
            .weak_maps
            .get(self.key)
            .and_then(|map| map.get(&key).copied())
    }

    /// Remove the entry for `key`.
    pub fn remove(&self, key: NodeRef) -> Option<NodeRef> {
        self.collector
            .state_mut()
            .weak_maps
            .get_mut(self.key)
            .and_then(|map| map.remove(&key))
    }

    /// Whether `key` has an entry.
    #[must_use]
    pub fn contains(&self, key: NodeRef) -> bool {
        self.find(key).is_some()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.collector
            .state()
            .weak_maps
            .get(self.key)
            .map_or(0, std::collections::HashMap::len)
    }

    /// Whether the map has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every entry.
    pub fn clear(&self) {
        if let Some(map) = self.collector.state_mut().weak_maps.get_mut(self.key) {
            map.clear();
        }
    }

    /// Snapshot of all entries, in no particular order.
    #[must_use]
    pub fn entries(&self) -> Vec<(NodeRef, NodeRef)> {
        self.collector
            .state()
            .weak_maps
            .get(self.key)
            .map(|map| map.iter().map(|(k, v)| (*k, *v)).collect())
            .unwrap_or_default()
    }
}

impl Drop for WeakNodeMap {
    fn drop(&mut self) {
        self.collector.state_mut().weak_maps.remove(self.key);
    }
}

impl fmt::Debug for WeakNodeMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakNodeMap")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GcConfig;
    use crate::handles::KeepAlive;
    use crate::node::NodeKind;

    #[test]
    fn insert_find_remove() {
        let gc = Collector::with_config(GcConfig::manual());
        let a = gc.allocate_chunk(NodeKind::CHUNK, b"a");
        let b = gc.allocate_chunk(NodeKind::CHUNK, b"b");
        let map = WeakNodeMap::new(&gc);

        assert!(map.is_empty());
        assert_eq!(map.insert(a, b), None);
        assert_eq!(map.insert(a, a), Some(b));
        assert_eq!(map.find(a), Some(a));
        assert_eq!(map.len(), 1);
        assert_eq!(map.remove(a), Some(a));
        assert_eq!(map.find(a), None);
    }

    #[test]
    fn dead_keys_are_pruned() {
        let gc = Collector::with_config(GcConfig::manual());
        let live = gc.allocate_chunk(NodeKind::CHUNK, b"live");
        let dead = gc.allocate_chunk(NodeKind::CHUNK, b"dead");
        let map = WeakNodeMap::new(&gc);
        map.insert(live, dead);
        map.insert(dead, live);

        let _keep = KeepAlive::new(&gc, live);
        let metrics = gc.try_trigger().unwrap();

        assert_eq!(metrics.weak_entries_pruned, 1);
        assert_eq!(map.len(), 1);
        assert_eq!(map.find(live), Some(dead));
        assert!(!map.contains(dead));
    }

    #[test]
    fn drop_unregisters() {
        let gc = Collector::with_config(GcConfig::manual());
        let map = WeakNodeMap::new(&gc);
        let other = WeakNodeMap::new(&gc);
        assert_eq!(gc.state().weak_maps.len(), 2);
        drop(map);
        assert_eq!(gc.state().weak_maps.len(), 1);
        other.clear();
        assert!(other.is_empty());
    }
}
