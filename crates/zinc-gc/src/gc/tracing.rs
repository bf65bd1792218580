//! GC tracing support.
//!
//! When the `tracing` feature is enabled, this module provides structured
//! tracing spans and events for garbage collection operations.

#[cfg(feature = "tracing")]
pub mod internal {
    use std::sync::atomic::{AtomicU64, Ordering};
    use tracing::{span, Level};

    use crate::metrics::CollectionTrigger;

    /// Phases of one collection.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum GcPhase {
        /// Reset mark bits.
        Clear,
        /// Trace live object graph.
        Mark,
        /// Reclaim unreachable objects.
        Sweep,
        /// Invalidate weak references and prune weak maps.
        Weak,
    }

    /// Stable identifier for a GC run.
    ///
    /// Monotonically increasing across every collector in the process,
    /// starting at 1.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct GcId(pub u64);

    /// Global counter for generating unique GC IDs.
    static NEXT_GC_ID: AtomicU64 = AtomicU64::new(1);

    /// Generate the next unique GC ID.
    pub fn next_gc_id() -> GcId {
        GcId(NEXT_GC_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Create a span for the entire GC collection.
    pub fn trace_gc_collection(trigger: CollectionTrigger, gc_id: GcId) -> span::EnteredSpan {
        span!(Level::DEBUG, "gc_collect", trigger = ?trigger, gc_id = gc_id.0).entered()
    }

    /// Create a span for a GC phase.
    pub fn trace_phase(phase: GcPhase) -> span::EnteredSpan {
        span!(Level::DEBUG, "gc_phase", phase = ?phase).entered()
    }

    /// Log the start of a GC phase.
    pub fn log_phase_start(phase: GcPhase, bytes_before: usize) {
        tracing::debug!(phase = ?phase, bytes_before, "phase_start");
    }

    /// Log the end of a GC phase.
    pub fn log_phase_end(phase: GcPhase, bytes_reclaimed: usize) {
        tracing::debug!(phase = ?phase, bytes_reclaimed, "phase_end");
    }

    /// Log an automatic collection that could not run.
    pub fn log_deferred(reason: &str) {
        tracing::debug!(reason, "collection_deferred");
    }

    /// Log a threshold change after a collection.
    pub fn log_threshold_grown(old: usize, new: usize) {
        tracing::debug!(old, new, "threshold_grown");
    }
}

#[cfg(not(feature = "tracing"))]
#[allow(clippy::missing_const_for_fn)]
pub mod internal {
    use crate::metrics::CollectionTrigger;

    /// Stub phase when tracing is disabled.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum GcPhase {
        /// Reset mark bits.
        Clear,
        /// Trace live object graph.
        Mark,
        /// Reclaim unreachable objects.
        Sweep,
        /// Invalidate weak references and prune weak maps.
        Weak,
    }

    /// Stub type when tracing is disabled.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct GcId(pub u64);

    /// Stub span guard when tracing is disabled.
    #[derive(Debug)]
    pub struct SpanGuard;

    /// Stub function when tracing is disabled.
    pub fn next_gc_id() -> GcId {
        GcId(0)
    }

    /// Stub span guard.
    pub fn trace_gc_collection(_trigger: CollectionTrigger, _gc_id: GcId) -> SpanGuard {
        SpanGuard
    }

    /// Stub span guard.
    pub fn trace_phase(_phase: GcPhase) -> SpanGuard {
        SpanGuard
    }

    /// Stub event.
    pub fn log_phase_start(_phase: GcPhase, _bytes_before: usize) {}

    /// Stub event.
    pub fn log_phase_end(_phase: GcPhase, _bytes_reclaimed: usize) {}

    /// Stub event.
    pub fn log_deferred(_reason: &str) {}

    /// Stub event.
    pub fn log_threshold_grown(_old: usize, _new: usize) {}
}

pub use internal::GcId;
