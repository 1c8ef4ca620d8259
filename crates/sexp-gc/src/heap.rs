//! The heap: allocation entry points, pair access, roots and the
//! collection lock.
//!
//! All mutable collector state lives in one [`HeapState`] behind a
//! `parking_lot::Mutex`. The symbol table has its own `RwLock` and the two
//! locks are never held together.

use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::{Arc, LazyLock};

use parking_lot::{Mutex, MutexGuard, RwLock};

use crate::block::{object_ref, pair_cells, write_object, SlotKind, Space};
use crate::config::HeapConfig;
use crate::gc::{self, no_pins, DeadObjects, Pinned};
use crate::metrics::{CollectTrigger, GcMetrics, HeapStats, SpaceStats};
use crate::object::{GcNumber, GcObject, GcString};
use crate::ring::{local_ring, RecentRing};
use crate::roots::{RootHandle, RootTable};
use crate::symbol::{self, SymbolTable};
use crate::Value;

/// Collector state guarded by the heap's state lock.
pub(crate) struct HeapState {
    pub(crate) pairs: Space,
    pub(crate) objects: Space,
    pub(crate) roots: RootTable,
    pub(crate) rings: Vec<Arc<RecentRing>>,
    pub(crate) gc_lock_depth: usize,
    pub(crate) collect_pending: bool,
    pub(crate) config: HeapConfig,
    pub(crate) last_metrics: GcMetrics,
    pub(crate) collections: usize,
}

impl HeapState {
    fn new(config: HeapConfig) -> Self {
        let mut pairs = Space::new(SlotKind::Pair, &config);
        let mut objects = Space::new(SlotKind::Object, &config);
        pairs.grow(&config);
        objects.grow(&config);
        Self {
            pairs,
            objects,
            roots: RootTable::new(),
            rings: Vec::new(),
            gc_lock_depth: 0,
            collect_pending: false,
            config,
            last_metrics: GcMetrics::new(),
            collections: 0,
        }
    }

    fn space_mut(&mut self, kind: SlotKind) -> &mut Space {
        match kind {
            SlotKind::Pair => &mut self.pairs,
            SlotKind::Object => &mut self.objects,
        }
    }

    /// Returns a free slot of `kind`, collecting and then growing as needed.
    fn alloc_slot(&mut self, kind: SlotKind, pinned: Pinned<'_>, dead: &mut DeadObjects) -> usize {
        if let Some(addr) = self.space_mut(kind).pop() {
            return addr;
        }

        let trigger = match kind {
            SlotKind::Pair => CollectTrigger::PairsExhausted,
            SlotKind::Object => CollectTrigger::ObjectsExhausted,
        };
        gc::request_collection(self, trigger, pinned, dead);

        let config = self.config;
        loop {
            let space = self.space_mut(kind);
            if let Some(addr) = space.pop() {
                return addr;
            }
            space.grow(&config);
        }
    }

    fn stats(&self) -> HeapStats {
        HeapStats {
            pairs: space_stats(&self.pairs),
            objects: space_stats(&self.objects),
            roots: self.roots.len(),
            threads: self.rings.len(),
            symbols: 0,
            collections: self.collections,
            gc_lock_depth: self.gc_lock_depth,
            collect_pending: self.collect_pending,
        }
    }
}

fn space_stats(space: &Space) -> SpaceStats {
    SpaceStats {
        total: space.total(),
        free: space.free(),
        blocks: space.block_count(),
    }
}

/// State shared by every clone of a [`Heap`].
pub(crate) struct Shared {
    state: Mutex<HeapState>,
    symbols: RwLock<SymbolTable>,
}

impl Shared {
    pub(crate) fn register_ring(&self, ring: Arc<RecentRing>) {
        let mut state = self.state.lock();
        state.rings.push(ring);
        #[cfg(feature = "tracing")]
        tracing::trace!(threads = state.rings.len(), "ring_registered");
    }

    pub(crate) fn unregister_ring(&self, ring: &Arc<RecentRing>) {
        let mut state = self.state.lock();
        state.rings.retain(|r| !Arc::ptr_eq(r, ring));
        #[cfg(feature = "tracing")]
        tracing::trace!(threads = state.rings.len(), "ring_unregistered");
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let mut dead = Vec::new();
        self.state.get_mut().objects.drain_objects(&mut dead);
        destroy_all(dead);
    }
}

fn destroy_all(dead: DeadObjects) {
    for object in dead {
        object.destroy();
    }
}

/// A garbage-collected heap of pairs and objects.
///
/// `Heap` is a cheap handle; clones share the same storage and may be sent to
/// other threads. Storage is released when the last clone (and the last
/// [`RootHandle`]) is dropped, after every remaining object is destroyed.
///
/// Values are only meaningful with the heap that produced them, and only
/// while they are reachable: from a [`RootHandle`], from a reachable pair or
/// object, or from one of the calling thread's last
/// [`RECENT_RING_SIZE`](crate::RECENT_RING_SIZE) allocations.
///
/// # Examples
///
/// ```
/// use sexp_gc::{Heap, Value};
///
/// let heap = Heap::new();
/// let list = heap.cons(Value::from_int(1), heap.cons(Value::from_int(2), Value::EMPTY));
/// let root = heap.protect(list);
///
/// heap.collect_now();
/// assert_eq!(heap.head(heap.tail(root.get())), Value::from_int(2));
/// ```
#[derive(Clone)]
pub struct Heap {
    shared: Arc<Shared>,
}

static GLOBAL: LazyLock<Heap> = LazyLock::new(Heap::new);

impl Heap {
    /// Creates a heap with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(HeapConfig::default())
    }

    /// Creates a heap with `config`. One Block per kind is mapped up front.
    #[must_use]
    pub fn with_config(config: HeapConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(HeapState::new(config)),
                symbols: RwLock::new(SymbolTable::new()),
            }),
        }
    }

    /// The process-wide heap used by the crate-level free functions.
    #[must_use]
    pub fn global() -> &'static Self {
        &GLOBAL
    }

    /// Returns `true` if both handles refer to the same heap.
    #[must_use]
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.shared, &b.shared)
    }

    fn lock_state(&self) -> MutexGuard<'_, HeapState> {
        self.shared.state.lock()
    }

    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&mut HeapState) -> R) -> R {
        f(&mut self.lock_state())
    }

    /// The configuration this heap was created with.
    #[must_use]
    pub fn config(&self) -> HeapConfig {
        self.lock_state().config
    }

    // ------------------------------------------------------------------
    // Pairs
    // ------------------------------------------------------------------

    /// Allocates a pair.
    ///
    /// `head` and `tail` are kept alive if this allocation triggers a
    /// collection. The new pair is recorded in the calling thread's recent
    /// ring before the heap lock is released.
    pub fn cons(&self, head: Value, tail: Value) -> Value {
        let ring = local_ring(&self.shared);
        let mut dead = Vec::new();
        let value = {
            let mut state = self.lock_state();
            let pins: Pinned<'_> = &|v| {
                v.visit(head);
                v.visit(tail);
            };
            let addr = state.alloc_slot(SlotKind::Pair, pins, &mut dead);
            // SAFETY: freshly popped pair slot
            let cells = unsafe { pair_cells(addr) };
            cells[0].store(head.bits(), Ordering::Release);
            cells[1].store(tail.bits(), Ordering::Release);
            let value = Value::from_pair_addr(addr);
            if let Some(ring) = &ring {
                ring.push(value);
            }
            value
        };
        destroy_all(dead);
        value
    }

    /// The first element of a pair.
    ///
    /// # Panics
    ///
    /// Panics if `pair` is not a pair.
    #[must_use]
    pub fn head(&self, pair: Value) -> Value {
        assert!(pair.is_pair(), "head of non-pair value {pair:?}");
        // SAFETY: pair-tagged values from this heap point at pair slots
        let cells = unsafe { pair_cells(pair.addr()) };
        Value::from_bits(cells[0].load(Ordering::Acquire))
    }

    /// The second element of a pair.
    ///
    /// # Panics
    ///
    /// Panics if `pair` is not a pair.
    #[must_use]
    pub fn tail(&self, pair: Value) -> Value {
        assert!(pair.is_pair(), "tail of non-pair value {pair:?}");
        // SAFETY: pair-tagged values from this heap point at pair slots
        let cells = unsafe { pair_cells(pair.addr()) };
        Value::from_bits(cells[1].load(Ordering::Acquire))
    }

    /// Replaces the first element of a pair.
    ///
    /// # Panics
    ///
    /// Panics if `pair` is not a pair.
    pub fn set_head(&self, pair: Value, value: Value) {
        assert!(pair.is_pair(), "set_head of non-pair value {pair:?}");
        let _state = self.lock_state();
        // SAFETY: pair-tagged values from this heap point at pair slots
        let cells = unsafe { pair_cells(pair.addr()) };
        cells[0].store(value.bits(), Ordering::Release);
    }

    /// Replaces the second element of a pair.
    ///
    /// # Panics
    ///
    /// Panics if `pair` is not a pair.
    pub fn set_tail(&self, pair: Value, value: Value) {
        assert!(pair.is_pair(), "set_tail of non-pair value {pair:?}");
        let _state = self.lock_state();
        // SAFETY: pair-tagged values from this heap point at pair slots
        let cells = unsafe { pair_cells(pair.addr()) };
        cells[1].store(value.bits(), Ordering::Release);
    }

    // ------------------------------------------------------------------
    // Objects
    // ------------------------------------------------------------------

    /// Moves `object` into the heap.
    ///
    /// Values reported by the object's `mark` are kept alive if this
    /// allocation triggers a collection. The new value is recorded in the
    /// calling thread's recent ring.
    pub fn make_object(&self, object: Box<dyn GcObject>) -> Value {
        let ring = local_ring(&self.shared);
        let mut dead = Vec::new();
        let value = {
            let mut state = self.lock_state();
            let addr = {
                let pins: Pinned<'_> = &|v| object.mark(v);
                state.alloc_slot(SlotKind::Object, pins, &mut dead)
            };
            // SAFETY: freshly popped object slot
            unsafe { write_object(addr, object) };
            let value = Value::from_object_addr(addr);
            if let Some(ring) = &ring {
                ring.push(value);
            }
            value
        };
        destroy_all(dead);
        value
    }

    /// Allocates a boxed string.
    pub fn make_string(&self, s: impl Into<String>) -> Value {
        self.make_object(Box::new(GcString(s.into())))
    }

    /// Allocates a boxed floating-point number.
    pub fn make_float(&self, f: f64) -> Value {
        self.make_object(Box::new(GcNumber(f)))
    }

    /// The object behind an object value, or `None` for other tags.
    ///
    /// The reference is valid while the object stays reachable.
    #[must_use]
    pub fn as_object(&self, value: Value) -> Option<&dyn GcObject> {
        if !value.is_object() {
            return None;
        }
        // SAFETY: object-tagged values from this heap point at object slots
        Some(unsafe { object_ref(value.addr()) })
    }

    // ------------------------------------------------------------------
    // Symbols
    // ------------------------------------------------------------------

    /// Returns the unique symbol named `name`.
    pub fn intern_symbol(&self, name: &str) -> Value {
        if let Some(value) = self.shared.symbols.read().lookup(name) {
            return value;
        }
        self.shared.symbols.write().intern(name)
    }

    /// The name of a symbol, or `"#<corrupt-symbol>"` for any other value.
    #[must_use]
    pub fn symbol_name(&self, value: Value) -> &str {
        // SAFETY: symbol records live as long as the table, which lives as
        // long as `self.shared`
        unsafe { symbol::name_of(value) }
    }

    // ------------------------------------------------------------------
    // Roots and the collection lock
    // ------------------------------------------------------------------

    /// Protects `value` until the returned handle is dropped.
    #[must_use = "the value is unprotected as soon as the handle is dropped"]
    pub fn protect(&self, value: Value) -> RootHandle {
        let index = self.lock_state().roots.insert(value);
        RootHandle::new(self.clone(), index, value)
    }

    /// Suspends collection until the matching [`release_gc_lock`](Self::release_gc_lock).
    ///
    /// Nests. While held, allocation maps new Blocks instead of collecting.
    pub fn acquire_gc_lock(&self) {
        self.lock_state().gc_lock_depth += 1;
    }

    /// Releases one level of the collection lock and returns `value`.
    ///
    /// `value` is recorded in the calling thread's recent ring first, so a
    /// result built while locked survives a deferred collection run here.
    ///
    /// # Panics
    ///
    /// Panics if the lock is not held.
    pub fn release_gc_lock(&self, value: Value) -> Value {
        let ring = if value.is_heap() {
            local_ring(&self.shared)
        } else {
            None
        };
        let mut dead = Vec::new();
        {
            let mut state = self.lock_state();
            assert!(
                state.gc_lock_depth > 0,
                "release_gc_lock called without a matching acquire_gc_lock"
            );
            if let Some(ring) = &ring {
                ring.push(value);
            }
            state.gc_lock_depth -= 1;
            if state.gc_lock_depth == 0 && state.collect_pending {
                let pins: Pinned<'_> = &|v| v.visit(value);
                gc::collect(&mut state, CollectTrigger::Deferred, pins, &mut dead);
            }
        }
        destroy_all(dead);
        value
    }

    /// Acquires the collection lock for the lifetime of the returned guard.
    pub fn lock_gc(&self) -> GcLockGuard<'_> {
        self.acquire_gc_lock();
        GcLockGuard { heap: self }
    }

    /// Runs a full collection now, or defers it if the collection lock is held.
    pub fn collect_now(&self) {
        let mut dead = Vec::new();
        gc::request_collection(
            &mut self.lock_state(),
            CollectTrigger::Explicit,
            &no_pins,
            &mut dead,
        );
        destroy_all(dead);
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    /// A snapshot of slot counts, roots, threads and symbols.
    #[must_use]
    pub fn stats(&self) -> HeapStats {
        let symbols = self.shared.symbols.read().len();
        let mut stats = self.lock_state().stats();
        stats.symbols = symbols;
        stats
    }

    /// Metrics of the most recent collection.
    #[must_use]
    pub fn last_gc_metrics(&self) -> GcMetrics {
        self.lock_state().last_metrics
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Heap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Heap")
            .field("ptr", &Arc::as_ptr(&self.shared))
            .finish_non_exhaustive()
    }
}

/// Holds one level of the collection lock; see [`Heap::lock_gc`].
#[must_use = "the collection lock is released as soon as the guard is dropped"]
pub struct GcLockGuard<'a> {
    heap: &'a Heap,
}

impl GcLockGuard<'_> {
    /// Releases the lock, recording `value` in the recent ring first.
    pub fn release(self, value: Value) -> Value {
        let heap = self.heap;
        std::mem::forget(self);
        heap.release_gc_lock(value)
    }
}

impl Drop for GcLockGuard<'_> {
    fn drop(&mut self) {
        self.heap.release_gc_lock(Value::EMPTY);
    }
}

impl fmt::Debug for GcLockGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GcLockGuard").finish_non_exhaustive()
    }
}
