//! Threshold and timeout driven collections.

use std::cell::RefCell;
use std::time::Duration;

use zinc_gc::{
    CollectionTrigger, Collector, GcConfig, GcError, GcLock, NodeHeader, NodeKind, NodeRef,
    Rooted,
};

/// Every one byte chunk reserves a 32 byte block.
const BLOCK: usize = 32;

fn small_threshold() -> Collector {
    Collector::with_config(GcConfig::new().threshold(2 * BLOCK).growth_factor(1.0))
}

#[test]
fn test_threshold_collects_and_keeps_fresh_node() {
    let gc = small_threshold();
    let first = gc.allocate_chunk(NodeKind::CHUNK, b"1");
    assert_eq!(gc.collections(), 0);

    let second = gc.allocate_chunk(NodeKind::CHUNK, b"2");
    assert_eq!(gc.collections(), 1);
    assert!(!gc.is_live(first));
    assert!(gc.is_live(second));

    let metrics = gc.last_metrics().unwrap();
    assert_eq!(metrics.trigger, CollectionTrigger::Threshold);
    assert_eq!(metrics.objects_surviving, 1);
}

#[test]
fn test_lock_defers_automatic_collection() {
    let gc = small_threshold();
    let nodes: Vec<_> = {
        let _lock = GcLock::new(&gc);
        (0..8_u8)
            .map(|i| gc.allocate_chunk(NodeKind::CHUNK, &[i]))
            .collect()
    };
    assert_eq!(gc.collections(), 0);
    assert!(nodes.iter().all(|node| gc.is_live(*node)));

    // The first allocation after unlocking pays the deferred collection.
    let _fresh = gc.allocate_chunk(NodeKind::CHUNK, b"f");
    assert_eq!(gc.collections(), 1);
    assert!(nodes.iter().all(|node| !gc.is_live(*node)));
}

#[test]
fn test_busy_root_defers_automatic_collection() {
    let gc = small_threshold();
    let model = Rooted::new(&gc, Vec::new());
    {
        let mut items = model.borrow_mut();
        for i in 0..4_u8 {
            items.push(gc.allocate_chunk(NodeKind::CHUNK, &[i]));
        }
    }
    assert_eq!(gc.collections(), 0);

    let _fresh = gc.allocate_chunk(NodeKind::CHUNK, b"f");
    assert_eq!(gc.collections(), 1);
    assert!(model.borrow().iter().all(|node| gc.is_live(*node)));
}

#[test]
fn test_borrowed_inner_cell_defers_automatic_collection() {
    let gc = small_threshold();
    let model: Rooted<Vec<RefCell<Vec<NodeRef>>>> = Rooted::new(&gc, vec![RefCell::default()]);
    {
        let outer = model.borrow();
        let mut items = outer[0].borrow_mut();
        for i in 0..4_u8 {
            items.push(gc.allocate_chunk(NodeKind::CHUNK, &[i]));
        }
        assert_eq!(gc.try_trigger().unwrap_err(), GcError::RootBusy);
    }
    assert_eq!(gc.collections(), 0);

    let _fresh = gc.allocate_chunk(NodeKind::CHUNK, b"f");
    assert_eq!(gc.collections(), 1);
    let outer = model.borrow();
    let items = outer[0].borrow();
    assert_eq!(items.len(), 4);
    assert!(items.iter().all(|node| gc.is_live(*node)));
}

#[test]
fn test_abandoned_collection_leaves_no_marks() {
    let gc = Collector::with_config(GcConfig::manual());
    let kept = gc.allocate_chunk(NodeKind::CHUNK, b"k");
    let _first = Rooted::new(&gc, vec![kept]);
    let second: Rooted<RefCell<Option<NodeRef>>> = Rooted::new(&gc, RefCell::default());

    {
        let cell = second.borrow();
        let _slot = cell.borrow_mut();
        assert_eq!(gc.try_trigger().unwrap_err(), GcError::RootBusy);
    }

    assert!(gc.is_live(kept));
    assert_eq!(gc.header(kept).map(NodeHeader::is_marked), Some(false));
    assert!(gc.try_trigger().is_ok());
}

#[test]
fn test_threshold_grows_with_survivors() {
    let gc = Collector::with_config(GcConfig::new().threshold(2 * BLOCK).growth_factor(2.0));
    let model = Rooted::new(&gc, Vec::new());

    let first = gc.allocate_chunk(NodeKind::CHUNK, b"1");
    model.borrow_mut().push(first);
    let second = gc.allocate_chunk(NodeKind::CHUNK, b"2");
    model.borrow_mut().push(second);

    assert_eq!(gc.collections(), 1);
    assert_eq!(gc.threshold(), 4 * BLOCK);
    assert!(gc.is_live(first) && gc.is_live(second));
}

#[test]
fn test_timeout_triggers_collection() {
    let gc = Collector::with_config(GcConfig::manual());
    gc.set_timeout(1);
    assert_eq!(gc.timeout(), Some(Duration::from_millis(1)));

    let garbage = gc.allocate_chunk(NodeKind::CHUNK, b"g");
    std::thread::sleep(Duration::from_millis(10));
    let _fresh = gc.allocate_chunk(NodeKind::CHUNK, b"f");

    assert!(gc.collections() >= 1);
    assert!(!gc.is_live(garbage));
    assert_eq!(
        gc.last_metrics().map(|m| m.trigger),
        Some(CollectionTrigger::Timeout)
    );
}

#[test]
fn test_zero_timeout_disables() {
    let gc = Collector::with_config(GcConfig::manual().timeout_ms(5));
    gc.set_timeout(0);
    assert_eq!(gc.timeout(), None);

    gc.allocate_chunk(NodeKind::CHUNK, b"g");
    std::thread::sleep(Duration::from_millis(10));
    gc.allocate_chunk(NodeKind::CHUNK, b"f");
    assert_eq!(gc.collections(), 0);
}

#[test]
fn test_manual_config_never_collects() {
    let gc = Collector::with_config(GcConfig::manual());
    for i in 0..10_000_u32 {
        gc.allocate_chunk(NodeKind::CHUNK, &i.to_le_bytes());
    }
    assert_eq!(gc.collections(), 0);
    assert_eq!(gc.live_objects(), 10_000);
}
