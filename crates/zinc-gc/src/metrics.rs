//! GC metrics and statistics.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crate::node::NodeKind;

/// What caused a collection to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum CollectionTrigger {
    /// Placeholder carried by [`GcMetrics::new`] and other default built
    /// metrics. Collections never report it.
    #[default]
    None = 0,
    /// An explicit `trigger()` call.
    Manual = 1,
    /// Allocation volume since the last collection reached the threshold.
    Threshold = 2,
    /// The configured timeout elapsed since the last collection.
    Timeout = 3,
}

/// Per node kind counters for one collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KindStats {
    /// Objects of this kind that survived.
    pub surviving: usize,
    /// Objects of this kind that were reclaimed.
    pub reclaimed: usize,
    /// Bytes held by survivors.
    pub bytes_surviving: usize,
    /// Bytes reclaimed.
    pub bytes_reclaimed: usize,
}

/// Statistics from one garbage collection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GcMetrics {
    /// Duration of the collection.
    pub duration: Duration,
    /// Duration of the clear phase.
    pub clear_duration: Duration,
    /// Duration of the mark phase.
    pub mark_duration: Duration,
    /// Duration of the sweep phase, weak processing included.
    pub sweep_duration: Duration,
    /// Number of bytes reclaimed.
    pub bytes_reclaimed: usize,
    /// Number of bytes surviving.
    pub bytes_surviving: usize,
    /// Number of objects reclaimed.
    pub objects_reclaimed: usize,
    /// Number of objects surviving.
    pub objects_surviving: usize,
    /// Objects reached from the root set, keep-alives and the trail.
    pub roots_scanned: usize,
    /// Weak references invalidated by this collection.
    pub weak_refs_cleared: usize,
    /// Weak map entries pruned by this collection.
    pub weak_entries_pruned: usize,
    /// What started the collection.
    pub trigger: CollectionTrigger,
    /// Collections run by this collector so far, this one included.
    pub total_collections: usize,
    /// Breakdown by node kind.
    pub per_kind: BTreeMap<NodeKind, KindStats>,
}

impl GcMetrics {
    /// Create a new `GcMetrics` with all fields set to zero/defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// Internal helper for capturing phase durations.
#[derive(Debug, Clone, Copy, Default)]
pub struct PhaseTimer {
    /// Clear phase time.
    pub clear: Duration,
    /// Mark phase time.
    pub mark: Duration,
    /// Sweep phase time.
    pub sweep: Duration,
    current_start: Option<Instant>,
}

impl PhaseTimer {
    /// Create a new `PhaseTimer` with all durations set to zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            clear: Duration::ZERO,
            mark: Duration::ZERO,
            sweep: Duration::ZERO,
            current_start: None,
        }
    }

    /// Start timing a phase.
    pub fn start(&mut self) {
        self.current_start = Some(Instant::now());
    }

    /// End the clear phase and record its duration.
    pub fn end_clear(&mut self) {
        if let Some(start) = self.current_start.take() {
            self.clear = start.elapsed();
        }
    }

    /// End the mark phase and record its duration.
    pub fn end_mark(&mut self) {
        if let Some(start) = self.current_start.take() {
            self.mark = start.elapsed();
        }
    }

    /// End the sweep phase and record its duration.
    pub fn end_sweep(&mut self) {
        if let Some(start) = self.current_start.take() {
            self.sweep = start.elapsed();
        }
    }
}

/// Ring buffer size for per-collector history.
pub const HISTORY_SIZE: usize = 64;

/// Most recent collections of one collector, oldest first.
#[derive(Debug, Default)]
pub struct GcHistory {
    entries: VecDeque<GcMetrics>,
}

impl GcHistory {
    /// Create an empty history.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    /// Record a collection, evicting the oldest one when full.
    pub fn push(&mut self, metrics: GcMetrics) {
        if self.entries.len() == HISTORY_SIZE {
            self.entries.pop_front();
        }
        self.entries.push_back(metrics);
    }

    /// The most recent collection, if any ran.
    #[must_use]
    pub fn latest(&self) -> Option<&GcMetrics> {
        self.entries.back()
    }

    /// Iterate from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &GcMetrics> + '_ {
        self.entries.iter()
    }

    /// Number of recorded collections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no collection was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Process-level cumulative GC statistics.
///
/// Counters are shared by every collector in the process, whichever worker
/// thread owns it.
///
/// # Example
///
/// ```
/// use zinc_gc::global_metrics;
///
/// let metrics = global_metrics();
/// println!("Total collections: {}", metrics.total_collections());
/// ```
#[derive(Debug)]
pub struct GlobalMetrics {
    collections: AtomicUsize,
    manual_collections: AtomicUsize,
    bytes_reclaimed: AtomicUsize,
    objects_reclaimed: AtomicUsize,
    pause_ns: AtomicU64,
}

impl Default for GlobalMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl GlobalMetrics {
    /// Create a new `GlobalMetrics` with all counters initialized to zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            collections: AtomicUsize::new(0),
            manual_collections: AtomicUsize::new(0),
            bytes_reclaimed: AtomicUsize::new(0),
            objects_reclaimed: AtomicUsize::new(0),
            pause_ns: AtomicU64::new(0),
        }
    }

    pub(crate) fn record(&self, metrics: &GcMetrics) {
        self.collections.fetch_add(1, Ordering::Relaxed);
        if metrics.trigger == CollectionTrigger::Manual {
            self.manual_collections.fetch_add(1, Ordering::Relaxed);
        }
        self.bytes_reclaimed
            .fetch_add(metrics.bytes_reclaimed, Ordering::Relaxed);
        self.objects_reclaimed
            .fetch_add(metrics.objects_reclaimed, Ordering::Relaxed);
        let pause = u64::try_from(metrics.duration.as_nanos()).unwrap_or(u64::MAX);
        self.pause_ns.fetch_add(pause, Ordering::Relaxed);
    }

    /// Returns the total number of GC collections performed.
    #[inline]
    #[must_use]
    pub fn total_collections(&self) -> usize {
        self.collections.load(Ordering::Relaxed)
    }

    /// Returns the number of collections started by an explicit `trigger()`.
    #[inline]
    #[must_use]
    pub fn total_manual_collections(&self) -> usize {
        self.manual_collections.load(Ordering::Relaxed)
    }

    /// Returns the total number of bytes reclaimed by GC.
    #[inline]
    #[must_use]
    pub fn total_bytes_reclaimed(&self) -> usize {
        self.bytes_reclaimed.load(Ordering::Relaxed)
    }

    /// Returns the total number of objects reclaimed by GC.
    #[inline]
    #[must_use]
    pub fn total_objects_reclaimed(&self) -> usize {
        self.objects_reclaimed.load(Ordering::Relaxed)
    }

    /// Returns the total pause time in nanoseconds.
    #[inline]
    #[must_use]
    pub fn total_pause_ns(&self) -> u64 {
        self.pause_ns.load(Ordering::Relaxed)
    }
}

static GLOBAL_METRICS: GlobalMetrics = GlobalMetrics::new();

/// Get the global cumulative GC metrics.
#[must_use]
pub fn global_metrics() -> &'static GlobalMetrics {
    &GLOBAL_METRICS
}
