//! String interning and managed string maps.

use zinc_gc::{Collector, GcConfig, KeepAlive, ManagedStringMap, NodeKind, NodeRef};

#[test]
fn test_equal_text_shares_a_node() {
    let gc = Collector::with_config(GcConfig::manual());
    let a = gc.intern("x_1");
    let b = gc.intern("x_1");
    let c = gc.intern("x_2");

    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(gc.kind(a), Some(NodeKind::STRING));
    assert_eq!(gc.string(a).as_deref(), Some("x_1"));
    assert_eq!(gc.find_interned("x_2"), Some(c));
    assert_eq!(gc.interned_count(), 2);
}

#[test]
fn test_intern_table_is_weak() {
    let gc = Collector::with_config(GcConfig::manual());
    let kept = gc.intern("kept");
    let dropped = gc.intern("dropped");
    let _k = KeepAlive::new(&gc, kept);

    gc.trigger();
    assert_eq!(gc.find_interned("kept"), Some(kept));
    assert_eq!(gc.find_interned("dropped"), None);

    let again = gc.intern("dropped");
    assert_ne!(again, dropped);
    assert_eq!(gc.string(again).as_deref(), Some("dropped"));
}

#[test]
fn test_string_rejects_other_kinds() {
    let gc = Collector::with_config(GcConfig::manual());
    let chunk = gc.allocate_chunk(NodeKind::CHUNK, b"not a string");
    assert_eq!(gc.string(chunk), None);
}

#[test]
fn test_managed_map_survives_collections() {
    let gc = Collector::with_config(GcConfig::manual());
    let decls: ManagedStringMap<Vec<NodeRef>> = ManagedStringMap::new(&gc);
    let body = gc.allocate_chunk(NodeKind::CHUNK, b"x > 0");
    decls.insert("constraint", vec![body]);

    for _ in 0..3 {
        gc.trigger();
    }
    assert!(gc.is_live(body));
    assert!(decls.contains_key("constraint"));
    assert_eq!(decls.get("constraint").map(|v| v.clone()), Some(vec![body]));

    drop(decls);
    gc.trigger();
    assert!(!gc.is_live(body));
    assert_eq!(gc.interned_count(), 0);
}
