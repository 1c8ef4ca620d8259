//! Heap tuning knobs.

/// Configuration for a [`Heap`](crate::Heap).
///
/// Built in the same style as `sys_alloc::MmapOptions`:
///
/// ```
/// use sexp_gc::{Heap, HeapConfig};
///
/// let heap = Heap::with_config(HeapConfig::new().initial_block_chunks(4).replenish_ratio(2));
/// assert_eq!(heap.config().initial_block_chunks, 4);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapConfig {
    /// Chunks in the first Block mapped for each kind.
    pub initial_block_chunks: usize,
    /// Upper bound on the chunk count of any single Block.
    pub max_block_chunks: usize,
    /// After a collection, map another Block when `free * ratio < total`.
    pub replenish_ratio: usize,
    /// Prefault Block pages when mapping them.
    pub populate: bool,
}

impl HeapConfig {
    /// Default chunk count of the first Block.
    pub const DEFAULT_INITIAL_BLOCK_CHUNKS: usize = 16;
    /// Default Block size cap, in chunks.
    pub const DEFAULT_MAX_BLOCK_CHUNKS: usize = 4096;
    /// Default replenish ratio.
    pub const DEFAULT_REPLENISH_RATIO: usize = 4;

    /// Creates the default configuration.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            initial_block_chunks: Self::DEFAULT_INITIAL_BLOCK_CHUNKS,
            max_block_chunks: Self::DEFAULT_MAX_BLOCK_CHUNKS,
            replenish_ratio: Self::DEFAULT_REPLENISH_RATIO,
            populate: false,
        }
    }

    /// Sets the chunk count of the first Block (at least 1).
    #[must_use]
    pub const fn initial_block_chunks(mut self, chunks: usize) -> Self {
        self.initial_block_chunks = if chunks == 0 { 1 } else { chunks };
        self
    }

    /// Sets the Block size cap, in chunks (at least 1).
    #[must_use]
    pub const fn max_block_chunks(mut self, chunks: usize) -> Self {
        self.max_block_chunks = if chunks == 0 { 1 } else { chunks };
        self
    }

    /// Sets the replenish ratio. `0` disables replenishing.
    #[must_use]
    pub const fn replenish_ratio(mut self, ratio: usize) -> Self {
        self.replenish_ratio = ratio;
        self
    }

    /// Sets whether Block pages are prefaulted.
    #[must_use]
    pub const fn populate(mut self, populate: bool) -> Self {
        self.populate = populate;
        self
    }

    /// Chunk count of the first Block, clamped to the cap.
    pub(crate) const fn first_block_chunks(&self) -> usize {
        if self.initial_block_chunks < self.max_block_chunks {
            self.initial_block_chunks
        } else {
            self.max_block_chunks
        }
    }

    /// Chunk count of the Block after one of `previous` chunks.
    pub(crate) const fn next_block_chunks(&self, previous: usize) -> usize {
        let doubled = previous.saturating_mul(2);
        if doubled < self.max_block_chunks {
            doubled
        } else {
            self.max_block_chunks
        }
    }
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self::new()
    }
}
