//! High-water mark and size accounting.

use zinc_gc::heap::{block_size_for, compute_size_class, MAX_SMALL_OBJECT_SIZE};
use zinc_gc::{round_up_8, Collector, GcConfig, KeepAlive, NodeKind, NODE_HEADER_BYTES};

#[test]
fn test_max_mem_is_monotone_high_water_mark() {
    let gc = Collector::with_config(GcConfig::manual());
    let mut observed_max = 0;
    let mut last = 0;

    for round in 0..5_usize {
        let keep: Vec<_> = (0..=round)
            .map(|i| {
                let node = gc.allocate_zeroed_chunk(NodeKind::CHUNK, 40 * (i + 1));
                KeepAlive::new(&gc, node)
            })
            .collect();
        observed_max = observed_max.max(gc.bytes_outstanding());
        assert_eq!(gc.max_mem(), observed_max);
        assert!(gc.max_mem() >= last);
        last = gc.max_mem();

        drop(keep);
        gc.trigger();
        assert_eq!(gc.bytes_outstanding(), 0);
        assert_eq!(gc.max_mem(), observed_max);
    }
}

#[test]
fn test_chunk_footprint_accounting() {
    let gc = Collector::with_config(GcConfig::manual());
    let len = 100;
    let footprint = round_up_8(NODE_HEADER_BYTES + len);
    assert_eq!(footprint, 120);
    assert_eq!(compute_size_class(footprint), Some(128));

    gc.allocate_zeroed_chunk(NodeKind::CHUNK, len);
    assert_eq!(gc.bytes_outstanding(), 128);
    assert_eq!(gc.max_mem(), 128);
}

#[test]
fn test_large_objects_are_accounted_exactly() {
    let gc = Collector::with_config(GcConfig::manual());
    let slots = 400;
    let footprint = round_up_8(NODE_HEADER_BYTES + 8 * slots);
    assert!(footprint > MAX_SMALL_OBJECT_SIZE);
    assert_eq!(block_size_for(footprint), footprint);

    let big = gc.allocate_empty_vector(NodeKind::VECTOR, slots);
    assert_eq!(gc.bytes_outstanding(), footprint);

    gc.trigger();
    assert!(!gc.is_live(big));
    let again = gc.allocate_empty_vector(NodeKind::VECTOR, slots);
    assert!(again.same_slot(big));
    assert_eq!(gc.max_mem(), footprint);
}
