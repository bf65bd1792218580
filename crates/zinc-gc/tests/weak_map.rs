//! Weak node map tests.

use zinc_gc::{Collector, GcConfig, KeepAlive, NodeKind, Rooted, WeakNodeMap};

#[test]
fn test_find_while_key_reachable() {
    let gc = Collector::with_config(GcConfig::manual());
    let map = WeakNodeMap::new(&gc);
    let key = gc.allocate_chunk(NodeKind::CHUNK, b"key");
    let value = gc.allocate_chunk(NodeKind::CHUNK, b"value");
    let roots = Rooted::new(&gc, vec![key, value]);

    map.insert(key, value);
    gc.trigger();
    assert_eq!(map.find(key), Some(value));

    roots.borrow_mut().clear();
    gc.trigger();
    assert_eq!(map.find(key), None);
    assert!(map.is_empty());
}

#[test]
fn test_values_are_not_kept_alive() {
    let gc = Collector::with_config(GcConfig::manual());
    let map = WeakNodeMap::new(&gc);
    let key = gc.allocate_chunk(NodeKind::CHUNK, b"key");
    let value = gc.allocate_chunk(NodeKind::CHUNK, b"value");
    let _k = KeepAlive::new(&gc, key);
    map.insert(key, value);

    gc.trigger();
    assert!(!gc.is_live(value));
    assert_eq!(map.find(key), Some(value));
}

#[test]
fn test_clear_keeps_registration() {
    let gc = Collector::with_config(GcConfig::manual());
    let map = WeakNodeMap::new(&gc);
    let key = gc.allocate_chunk(NodeKind::CHUNK, b"key");
    let _k = KeepAlive::new(&gc, key);

    map.insert(key, key);
    map.clear();
    assert!(map.is_empty());

    map.insert(key, key);
    gc.trigger();
    assert_eq!(map.entries(), vec![(key, key)]);
}

#[test]
fn test_maps_are_pruned_independently() {
    let gc = Collector::with_config(GcConfig::manual());
    let first = WeakNodeMap::new(&gc);
    let second = WeakNodeMap::new(&gc);
    let live = gc.allocate_chunk(NodeKind::CHUNK, b"live");
    let dead = gc.allocate_chunk(NodeKind::CHUNK, b"dead");
    let _k = KeepAlive::new(&gc, live);

    first.insert(live, live);
    first.insert(dead, live);
    second.insert(dead, dead);

    let metrics = gc.try_trigger().unwrap();
    assert_eq!(metrics.weak_entries_pruned, 2);
    assert_eq!(first.len(), 1);
    assert!(second.is_empty());
}
