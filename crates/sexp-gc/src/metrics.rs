//! GC metrics and heap statistics.

use std::time::{Duration, Instant};

/// Metrics from the most recent collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcMetrics {
    /// Duration of the last collection.
    pub duration: Duration,
    /// Duration of the clear phase.
    pub clear_duration: Duration,
    /// Duration of the mark phase.
    pub mark_duration: Duration,
    /// Duration of the sweep phase.
    pub sweep_duration: Duration,
    /// Pairs and objects marked reachable.
    pub objects_marked: usize,
    /// Pairs reclaimed by the sweep.
    pub pairs_reclaimed: usize,
    /// Objects reclaimed by the sweep.
    pub objects_reclaimed: usize,
    /// Total collections run by this heap, including this one.
    pub total_collections: usize,
    /// What started the collection.
    pub trigger: CollectTrigger,
}

impl Default for GcMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl GcMetrics {
    /// Create a new `GcMetrics` with all fields set to zero/defaults.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            duration: Duration::ZERO,
            clear_duration: Duration::ZERO,
            mark_duration: Duration::ZERO,
            sweep_duration: Duration::ZERO,
            objects_marked: 0,
            pairs_reclaimed: 0,
            objects_reclaimed: 0,
            total_collections: 0,
            trigger: CollectTrigger::None,
        }
    }

    /// Pairs and objects reclaimed together.
    #[must_use]
    pub const fn reclaimed(&self) -> usize {
        self.pairs_reclaimed + self.objects_reclaimed
    }
}

/// Why a collection ran.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum CollectTrigger {
    /// No collection has run yet.
    #[default]
    None = 0,
    /// [`Heap::collect_now`](crate::Heap::collect_now).
    Explicit = 1,
    /// The pair free list ran dry.
    PairsExhausted = 2,
    /// The object free list ran dry.
    ObjectsExhausted = 3,
    /// Requested while the collection lock was held, run on its release.
    Deferred = 4,
}

impl CollectTrigger {
    /// Short name used in tracing output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Explicit => "explicit",
            Self::PairsExhausted => "pairs_exhausted",
            Self::ObjectsExhausted => "objects_exhausted",
            Self::Deferred => "deferred",
        }
    }
}

/// Times the clear, mark and sweep phases of one collection.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PhaseTimer {
    pub(crate) clear: Duration,
    pub(crate) mark: Duration,
    pub(crate) sweep: Duration,
    current_start: Option<Instant>,
}

impl PhaseTimer {
    pub(crate) const fn new() -> Self {
        Self {
            clear: Duration::ZERO,
            mark: Duration::ZERO,
            sweep: Duration::ZERO,
            current_start: None,
        }
    }

    pub(crate) fn start(&mut self) {
        self.current_start = Some(Instant::now());
    }

    pub(crate) fn end_clear(&mut self) {
        if let Some(start) = self.current_start.take() {
            self.clear = start.elapsed();
        }
    }

    pub(crate) fn end_mark(&mut self) {
        if let Some(start) = self.current_start.take() {
            self.mark = start.elapsed();
        }
    }

    pub(crate) fn end_sweep(&mut self) {
        if let Some(start) = self.current_start.take() {
            self.sweep = start.elapsed();
        }
    }
}

/// Slot counts of one kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpaceStats {
    /// Usable slots across all Blocks.
    pub total: usize,
    /// Slots on the free list.
    pub free: usize,
    /// Blocks mapped.
    pub blocks: usize,
}

impl SpaceStats {
    /// Slots currently holding a pair or object (live or not yet swept).
    #[must_use]
    pub const fn in_use(&self) -> usize {
        self.total - self.free
    }
}

/// A snapshot of heap occupancy, taken under the heap lock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    /// Pair space.
    pub pairs: SpaceStats,
    /// Object space.
    pub objects: SpaceStats,
    /// Live [`RootHandle`](crate::RootHandle)s.
    pub roots: usize,
    /// Threads with a registered recent ring.
    pub threads: usize,
    /// Interned symbols.
    pub symbols: usize,
    /// Collections run so far.
    pub collections: usize,
    /// Current collection-lock depth.
    pub gc_lock_depth: usize,
    /// A collection was requested while locked and has not run yet.
    pub collect_pending: bool,
}
