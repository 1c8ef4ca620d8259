//! GC tracing support.
//!
//! When the `tracing` feature is enabled, this module provides structured
//! spans and events for collections. Without it, the same entry points are
//! no-ops so call sites need no `cfg`.

#[cfg(feature = "tracing")]
pub mod internal {
    use std::sync::atomic::{AtomicU64, Ordering};
    use tracing::{span, Level};

    /// Collection phases.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum GcPhase {
        /// Reset mark bytes.
        Clear,
        /// Trace from roots and rings.
        Mark,
        /// Reclaim unmarked slots and rebuild free lists.
        Sweep,
    }

    /// Identifier correlating all events of one collection.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct GcId(pub u64);

    static NEXT_GC_ID: AtomicU64 = AtomicU64::new(1);

    /// Generate the next unique GC ID.
    pub fn next_gc_id() -> GcId {
        GcId(NEXT_GC_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Create a span for the entire collection.
    pub fn trace_gc_collection(trigger: &str, gc_id: GcId) -> span::EnteredSpan {
        span!(Level::DEBUG, "gc_collect", trigger = trigger, gc_id = gc_id.0).entered()
    }

    /// Create a span for one phase.
    pub fn trace_phase(phase: GcPhase) -> span::EnteredSpan {
        span!(Level::DEBUG, "gc_phase", phase = ?phase).entered()
    }

    /// Log the start of a phase with the slots in use at that point.
    pub fn log_phase_start(phase: GcPhase, slots_in_use: usize) {
        tracing::debug!(phase = ?phase, slots_in_use, "phase_start");
    }

    /// Log the end of the mark phase.
    pub fn log_phase_end_mark(objects_marked: usize) {
        tracing::debug!(phase = ?GcPhase::Mark, objects_marked, "phase_end");
    }

    /// Log the end of the sweep phase.
    pub fn log_phase_end(phase: GcPhase, slots_reclaimed: usize) {
        tracing::debug!(phase = ?phase, slots_reclaimed, "phase_end");
    }
}

#[cfg(not(feature = "tracing"))]
pub mod internal {
    /// Collection phases.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum GcPhase {
        /// Reset mark bytes.
        Clear,
        /// Trace from roots and rings.
        Mark,
        /// Reclaim unmarked slots and rebuild free lists.
        Sweep,
    }

    /// Stub type when tracing is disabled.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct GcId(pub u64);

    /// Stub function when tracing is disabled.
    pub const fn next_gc_id() -> GcId {
        GcId(0)
    }

    /// No-op span guard.
    pub struct NoSpan;

    /// Stub function when tracing is disabled.
    pub const fn trace_gc_collection(_trigger: &str, _gc_id: GcId) -> NoSpan {
        NoSpan
    }

    /// Stub function when tracing is disabled.
    pub const fn trace_phase(_phase: GcPhase) -> NoSpan {
        NoSpan
    }

    /// Stub function when tracing is disabled.
    pub const fn log_phase_start(_phase: GcPhase, _slots_in_use: usize) {}

    /// Stub function when tracing is disabled.
    pub const fn log_phase_end_mark(_objects_marked: usize) {}

    /// Stub function when tracing is disabled.
    pub const fn log_phase_end(_phase: GcPhase, _slots_reclaimed: usize) {}
}

pub use internal::GcId;
