//! Mark-sweep collection for one worker's heap.
//!
//! A [`Collector`] is the explicit context every AST allocation and every
//! handle goes through. It owns the heap, the trail, and the registries of
//! roots, keep-alive entries, weak references and weak maps. It is neither
//! `Send` nor `Sync`: each compiler worker creates its own.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::time::{Duration, Instant};

use slotmap::{new_key_type, SlotMap};

use crate::config::{default_config, timeout_from_millis, GcConfig};
use crate::error::GcError;
use crate::heap::Heap;
use crate::metrics::{global_metrics, CollectionTrigger, GcHistory, GcMetrics, PhaseTimer};
use crate::node::{NodeHeader, NodeKind, NodeRef, Object, Slot};
use crate::roots::{Marker, RootRegistration};
use crate::trace::Tracer;
use crate::trail::Trail;
use super::tracing::internal::{
    log_deferred, log_phase_end, log_phase_start, log_threshold_grown, next_gc_id,
    trace_gc_collection, trace_phase, GcPhase,
};

new_key_type! {
    /// Registry key of a root aggregate.
    pub struct RootKey;
    /// Registry key of a keep-alive entry.
    pub struct KeepAliveKey;
    /// Registry key of a weak reference entry.
    pub struct WeakRefKey;
    /// Registry key of a weak node map.
    pub struct WeakMapKey;
}

/// Registry entry of a weak reference.
#[derive(Debug, Clone, Copy)]
pub(crate) struct WeakEntry {
    pub(crate) node: NodeRef,
    pub(crate) valid: bool,
}

pub(crate) type NodeMap = HashMap<NodeRef, NodeRef>;

// ============================================================================
// Collector state
// ============================================================================

/// Everything owned by a collector except the root registry and lock count.
pub(crate) struct GcState {
    pub(crate) heap: Heap,
    pub(crate) trail: Trail,
    pub(crate) keep_alive: SlotMap<KeepAliveKey, NodeRef>,
    pub(crate) weak_refs: SlotMap<WeakRefKey, WeakEntry>,
    pub(crate) weak_maps: SlotMap<WeakMapKey, NodeMap>,
    /// Weak intern table: text to its live string chunk.
    pub(crate) interned: HashMap<Box<str>, NodeRef>,
    config: GcConfig,
    /// Current allocation threshold, grown from `config.threshold`.
    threshold: usize,
    /// Bytes allocated since the last collection.
    allocated_since_collect: usize,
    /// Start of the current timeout period.
    timeout_start: Instant,
    collections: usize,
    history: GcHistory,
}

impl GcState {
    fn new(config: GcConfig) -> Self {
        Self {
            heap: Heap::new(),
            trail: Trail::new(),
            keep_alive: SlotMap::with_key(),
            weak_refs: SlotMap::with_key(),
            weak_maps: SlotMap::with_key(),
            interned: HashMap::new(),
            config,
            threshold: config.threshold,
            allocated_since_collect: 0,
            timeout_start: Instant::now(),
            collections: 0,
            history: GcHistory::new(),
        }
    }

    /// Which automatic collection, if any, is due.
    fn collection_due(&self) -> Option<CollectionTrigger> {
        if self.allocated_since_collect >= self.threshold {
            return Some(CollectionTrigger::Threshold);
        }
        match self.config.timeout {
            Some(timeout) if self.timeout_start.elapsed() >= timeout => {
                Some(CollectionTrigger::Timeout)
            }
            _ => None,
        }
    }
}

struct Inner {
    state: RefCell<GcState>,
    roots: RefCell<SlotMap<RootKey, Rc<dyn Marker>>>,
    lock_count: Cell<u32>,
}

// ============================================================================
// Collector
// ============================================================================

/// Garbage collector of one compiler worker.
///
/// Cloning a `Collector` is cheap and yields another handle to the same
/// heap.
///
/// ```
/// use zinc_gc::{Collector, GcLock, KeepAlive, NodeKind, Slot};
///
/// let gc = Collector::new();
/// let lock = GcLock::new(&gc);
/// let leaf = gc.allocate_chunk(NodeKind::CHUNK, b"x");
/// let root = gc.allocate_vector(NodeKind::VECTOR, vec![Slot::Node(leaf)]);
/// let keep = KeepAlive::new(&gc, root);
/// drop(lock);
///
/// gc.trigger();
/// assert!(gc.is_live(keep.get()));
/// assert!(gc.is_live(leaf));
/// ```
#[derive(Clone)]
pub struct Collector {
    inner: Rc<Inner>,
}

impl Collector {
    /// Create a collector using the process-wide default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(default_config())
    }

    /// Create a collector with an explicit configuration.
    #[must_use]
    pub fn with_config(config: GcConfig) -> Self {
        Self {
            inner: Rc::new(Inner {
                state: RefCell::new(GcState::new(config)),
                roots: RefCell::new(SlotMap::with_key()),
                lock_count: Cell::new(0),
            }),
        }
    }

    /// Whether `self` and `other` are handles to the same collector.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn state(&self) -> std::cell::Ref<'_, GcState> {
        self.inner.state.borrow()
    }

    pub(crate) fn state_mut(&self) -> std::cell::RefMut<'_, GcState> {
        self.inner.state.borrow_mut()
    }

    // ------------------------------------------------------------------------
    // Allocation
    // ------------------------------------------------------------------------

    /// Allocate a heap object.
    ///
    /// This is the entry point every node type goes through. There is no
    /// matching release: objects are reclaimed only by collections. If the
    /// allocation threshold or the timeout has been reached and the
    /// collector is unlocked, a full collection runs before this returns;
    /// the new object survives it.
    pub fn allocate(&self, header: NodeHeader, object: Object) -> NodeRef {
        let (node, due) = {
            let mut state = self.state_mut();
            let before = state.heap.bytes_outstanding();
            let node = state.heap.allocate(header, object);
            let added = state.heap.bytes_outstanding() - before;
            state.allocated_since_collect = state.allocated_since_collect.saturating_add(added);
            (node, state.collection_due())
        };

        if let Some(trigger) = due {
            if self.is_locked() {
                log_deferred("locked");
            } else if let Err(err) = self.collect(trigger, Some(node)) {
                debug_assert_eq!(err, GcError::RootBusy);
                log_deferred("root aggregate borrowed");
            }
        }
        node
    }

    /// Allocate a chunk holding a copy of `bytes`.
    pub fn allocate_chunk(&self, kind: NodeKind, bytes: &[u8]) -> NodeRef {
        self.allocate(NodeHeader::new(kind), Object::Chunk(bytes.into()))
    }

    /// Allocate a zero-filled chunk of `len` bytes.
    pub fn allocate_zeroed_chunk(&self, kind: NodeKind, len: usize) -> NodeRef {
        self.allocate(NodeHeader::new(kind), Object::Chunk(vec![0; len].into()))
    }

    /// Allocate a vector with the given slots.
    pub fn allocate_vector(&self, kind: NodeKind, slots: Vec<Slot>) -> NodeRef {
        self.allocate(NodeHeader::new(kind), Object::Vector(slots.into()))
    }

    /// Allocate a vector of `len` empty slots.
    pub fn allocate_empty_vector(&self, kind: NodeKind, len: usize) -> NodeRef {
        self.allocate_vector(kind, vec![Slot::Empty; len])
    }

    // ------------------------------------------------------------------------
    // Lock
    // ------------------------------------------------------------------------

    /// Acquire the collector lock. Reentrant.
    ///
    /// While locked, automatic collections are suppressed and
    /// [`trigger`](Self::trigger) fails.
    ///
    /// # Panics
    ///
    /// Panics if the lock depth overflows `u32`.
    pub fn lock(&self) {
        let count = self.inner.lock_count.get();
        self.inner
            .lock_count
            .set(count.checked_add(1).expect("collector lock count overflow"));
    }

    /// Release the collector lock.
    ///
    /// # Panics
    ///
    /// Panics if the collector is not locked.
    pub fn unlock(&self) {
        let count = self.inner.lock_count.get();
        assert!(count > 0, "unlock() called on an unlocked collector");
        self.inner.lock_count.set(count - 1);
    }

    /// Whether the lock is held.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.inner.lock_count.get() > 0
    }

    /// Current lock depth.
    #[must_use]
    pub fn lock_count(&self) -> u32 {
        self.inner.lock_count.get()
    }

    // ------------------------------------------------------------------------
    // Collection control
    // ------------------------------------------------------------------------

    /// Run a full collection now.
    ///
    /// # Panics
    ///
    /// Panics if the collector is locked: references held only by native
    /// frames could be reclaimed. Also panics if a rooted aggregate, or a
    /// `RefCell` inside one, is mutably borrowed. A live
    /// [`Rooted::borrow_mut`](crate::Rooted::borrow_mut) guard counts as a
    /// native reference the collector cannot trace.
    pub fn trigger(&self) {
        if let Err(err) = self.try_trigger() {
            panic!("{err}");
        }
    }

    /// Run a full collection now, reporting contract violations as errors.
    ///
    /// # Errors
    ///
    /// [`GcError::Locked`] if the lock is held, [`GcError::RootBusy`] if a
    /// rooted aggregate or a cell inside it is mutably borrowed. Nothing is
    /// reclaimed in either case.
    pub fn try_trigger(&self) -> Result<GcMetrics, GcError> {
        let depth = self.inner.lock_count.get();
        if depth > 0 {
            return Err(GcError::Locked { depth });
        }
        self.collect(CollectionTrigger::Manual, None)
    }

    /// Set the collection timeout in milliseconds; 0 disables it.
    ///
    /// The timeout period restarts now.
    pub fn set_timeout(&self, millis: u64) {
        let mut state = self.state_mut();
        state.config.timeout = timeout_from_millis(millis);
        state.timeout_start = Instant::now();
    }

    /// The configured timeout.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.state().config.timeout
    }

    /// Greatest number of bytes ever outstanding at once.
    #[must_use]
    pub fn max_mem(&self) -> usize {
        self.state().heap.max_mem()
    }

    /// Bytes currently held by resident objects.
    #[must_use]
    pub fn bytes_outstanding(&self) -> usize {
        self.state().heap.bytes_outstanding()
    }

    /// Number of resident objects.
    #[must_use]
    pub fn live_objects(&self) -> usize {
        self.state().heap.live_objects()
    }

    /// The configuration this collector was created with.
    #[must_use]
    pub fn config(&self) -> GcConfig {
        self.state().config
    }

    /// Allocation volume that currently makes the next allocation collect.
    #[must_use]
    pub fn threshold(&self) -> usize {
        self.state().threshold
    }

    /// Number of collections run so far.
    #[must_use]
    pub fn collections(&self) -> usize {
        self.state().collections
    }

    /// Metrics of the most recent collection.
    #[must_use]
    pub fn last_metrics(&self) -> Option<GcMetrics> {
        self.state().history.latest().cloned()
    }

    /// Metrics of the most recent collections, oldest first.
    #[must_use]
    pub fn metrics_history(&self) -> Vec<GcMetrics> {
        self.state().history.iter().cloned().collect()
    }

    // ------------------------------------------------------------------------
    // Root set
    // ------------------------------------------------------------------------

    /// Add `marker` to the root set.
    ///
    /// It stays there until the returned registration is dropped or passed
    /// to [`remove`](Self::remove).
    pub fn add(&self, marker: Rc<dyn Marker>) -> RootRegistration {
        let key = self.inner.roots.borrow_mut().insert(marker);
        RootRegistration::new(self.clone(), key)
    }

    /// Remove a marker from the root set.
    pub fn remove(&self, registration: RootRegistration) {
        debug_assert!(registration.collector().ptr_eq(self));
        drop(registration);
    }

    pub(crate) fn remove_root(&self, key: RootKey) {
        self.inner.roots.borrow_mut().remove(key);
    }

    /// Number of registered root aggregates.
    #[must_use]
    pub fn root_count(&self) -> usize {
        self.inner.roots.borrow().len()
    }

    // ------------------------------------------------------------------------
    // Mark-Sweep Collection
    // ------------------------------------------------------------------------

    /// Run one stop-the-world collection. `pinned` is an object that only
    /// the caller knows about and that must survive.
    fn collect(
        &self,
        trigger: CollectionTrigger,
        pinned: Option<NodeRef>,
    ) -> Result<GcMetrics, GcError> {
        let roots: Vec<Rc<dyn Marker>> = self.inner.roots.borrow().values().cloned().collect();
        if roots.iter().any(|root| root.is_busy()) {
            return Err(GcError::RootBusy);
        }

        let gc_id = next_gc_id();
        let _collect_span = trace_gc_collection(trigger, gc_id);
        let start = Instant::now();
        let mut timer = PhaseTimer::new();

        let mut guard = self.state_mut();
        let state = &mut *guard;

        // Phase 1: Clear all marks
        timer.start();
        {
            let _phase = trace_phase(GcPhase::Clear);
            state.heap.clear_marks();
        }
        timer.end_clear();

        // Phase 2: Mark everything reachable from roots
        timer.start();
        let (roots_scanned, busy) = {
            let _phase = trace_phase(GcPhase::Mark);
            log_phase_start(GcPhase::Mark, state.heap.bytes_outstanding());
            let mut tracer = Tracer::new(&mut state.heap);
            for root in &roots {
                root.mark(&mut tracer);
            }
            if tracer.is_busy() {
                (0, true)
            } else {
                for node in state.keep_alive.values() {
                    tracer.mark(*node);
                }
                for node in state.trail.prior_nodes() {
                    tracer.mark(node);
                }
                if let Some(node) = pinned {
                    tracer.mark(node);
                }
                let roots_scanned = tracer.objects_marked();
                tracer.drain();
                (roots_scanned, false)
            }
        };
        timer.end_mark();

        // Nothing is reclaimed from a partial mark.
        if busy {
            state.heap.clear_marks();
            return Err(GcError::RootBusy);
        }

        // Phase 3: Sweep unmarked objects, then clear weak observers
        timer.start();
        let (outcome, weak_refs_cleared, weak_entries_pruned) = {
            let _phase = trace_phase(GcPhase::Sweep);
            let outcome = state.heap.sweep();
            log_phase_end(GcPhase::Sweep, outcome.bytes_reclaimed);

            let _weak = trace_phase(GcPhase::Weak);
            let heap = &state.heap;
            let mut cleared = 0;
            for entry in state.weak_refs.values_mut() {
                if entry.valid && !heap.is_live(entry.node) {
                    entry.valid = false;
                    cleared += 1;
                }
            }
            let mut pruned = 0;
            for map in state.weak_maps.values_mut() {
                let before = map.len();
                map.retain(|key, _| heap.is_live(*key));
                pruned += before - map.len();
            }
            state.interned.retain(|_, node| heap.is_live(*node));
            log_phase_end(GcPhase::Weak, pruned);
            (outcome, cleared, pruned)
        };
        timer.end_sweep();

        // Phase 4: Refresh statistics
        let old_threshold = state.threshold;
        state.threshold = state
            .config
            .next_threshold(old_threshold, outcome.bytes_surviving);
        if state.threshold != old_threshold {
            log_threshold_grown(old_threshold, state.threshold);
        }
        state.allocated_since_collect = 0;
        state.timeout_start = Instant::now();
        state.collections += 1;

        let metrics = GcMetrics {
            duration: start.elapsed(),
            clear_duration: timer.clear,
            mark_duration: timer.mark,
            sweep_duration: timer.sweep,
            bytes_reclaimed: outcome.bytes_reclaimed,
            bytes_surviving: outcome.bytes_surviving,
            objects_reclaimed: outcome.objects_reclaimed,
            objects_surviving: outcome.objects_surviving,
            roots_scanned,
            weak_refs_cleared,
            weak_entries_pruned,
            trigger,
            total_collections: state.collections,
            per_kind: outcome.per_kind,
        };
        global_metrics().record(&metrics);
        state.history.push(metrics.clone());
        Ok(metrics)
    }
}

impl Default for Collector {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Collector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Collector");
        debug.field("lock_count", &self.inner.lock_count.get());
        debug.field("roots", &self.inner.roots.borrow().len());
        if let Ok(state) = self.inner.state.try_borrow() {
            debug
                .field("live_objects", &state.heap.live_objects())
                .field("bytes_outstanding", &state.heap.bytes_outstanding())
                .field("max_mem", &state.heap.max_mem())
                .field("keep_alive", &state.keep_alive.len())
                .field("weak_refs", &state.weak_refs.len())
                .field("weak_maps", &state.weak_maps.len())
                .field("trail_depth", &state.trail.depth())
                .field("collections", &state.collections);
        }
        debug.finish_non_exhaustive()
    }
}
