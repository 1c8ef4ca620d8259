//! Mark-and-sweep collection.
//!
//! A collection runs to completion on the requesting thread while that
//! thread holds the heap's state lock:
//!
//! 1. Clear `MARKED` on every slot.
//! 2. Mark from the root table, every registered recent ring and the
//!    caller's pinned values, using an explicit worklist.
//! 3. Sweep both spaces, rebuilding their free lists from scratch.
//! 4. Map another Block for any space that is still nearly full.
//!
//! Reclaimed objects are handed back to the caller, which destroys them
//! after releasing the lock.

use std::sync::atomic::Ordering;
use std::time::Instant;

use crate::block::{is_slot_addr, mark_byte, object_ref, pair_cells, set_mark_byte, Space};
use crate::block::{ALLOCATED, MARKED};
use crate::heap::HeapState;
use crate::metrics::{CollectTrigger, GcMetrics, PhaseTimer};
use crate::object::GcObject;
use crate::trace::Visitor;
use crate::tracing::internal::{
    log_phase_end, log_phase_end_mark, log_phase_start, next_gc_id, trace_gc_collection,
    trace_phase, GcPhase,
};
use crate::Value;

/// Values a caller needs kept alive across a collection it triggers, such
/// as the arguments of the allocation that ran out of slots.
pub(crate) type Pinned<'a> = &'a dyn Fn(&mut dyn Visitor);

/// Pins nothing.
pub(crate) fn no_pins(_visitor: &mut dyn Visitor) {}

/// Objects reclaimed by a sweep, destroyed once the lock is released.
pub(crate) type DeadObjects = Vec<Box<dyn GcObject>>;

/// Worklist marker.
struct Marker<'a> {
    pairs: &'a Space,
    objects: &'a Space,
    worklist: Vec<Value>,
    objects_marked: usize,
}

impl<'a> Marker<'a> {
    const fn new(pairs: &'a Space, objects: &'a Space) -> Self {
        Self {
            pairs,
            objects,
            worklist: Vec::new(),
            objects_marked: 0,
        }
    }

    fn drain(&mut self) {
        while let Some(value) = self.worklist.pop() {
            let addr = value.addr();
            if !is_slot_addr(addr) {
                continue;
            }
            debug_assert!(
                if value.is_pair() {
                    self.pairs.owns(addr)
                } else {
                    self.objects.owns(addr)
                },
                "{value:?} does not belong to this heap"
            );

            // SAFETY: heap values reference slots of this heap's Blocks, and
            // the state lock is held for the whole collection
            unsafe {
                let byte = mark_byte(addr);
                if byte & ALLOCATED == 0 || byte & MARKED != 0 {
                    continue;
                }
                set_mark_byte(addr, byte | MARKED);
                self.objects_marked += 1;

                if value.is_pair() {
                    for cell in pair_cells(addr) {
                        self.visit(Value::from_bits(cell.load(Ordering::Acquire)));
                    }
                } else {
                    object_ref(addr).mark(self);
                }
            }
        }
    }
}

impl Visitor for Marker<'_> {
    #[inline]
    fn visit(&mut self, value: Value) {
        if value.is_heap() {
            self.worklist.push(value);
        }
    }
}

/// Collects now, or records a pending request if the collection lock is held.
///
/// Returns `true` if a collection ran.
pub(crate) fn request_collection(
    state: &mut HeapState,
    trigger: CollectTrigger,
    pinned: Pinned<'_>,
    dead: &mut DeadObjects,
) -> bool {
    if state.gc_lock_depth > 0 {
        state.collect_pending = true;
        #[cfg(feature = "tracing")]
        tracing::trace!(
            trigger = trigger.as_str(),
            depth = state.gc_lock_depth,
            "collection_deferred"
        );
        return false;
    }
    collect(state, trigger, pinned, dead);
    true
}

/// Runs one full collection.
pub(crate) fn collect(
    state: &mut HeapState,
    trigger: CollectTrigger,
    pinned: Pinned<'_>,
    dead: &mut DeadObjects,
) {
    let gc_id = next_gc_id();
    let _span = trace_gc_collection(trigger.as_str(), gc_id);
    let start = Instant::now();
    let mut timer = PhaseTimer::new();

    timer.start();
    {
        let _phase = trace_phase(GcPhase::Clear);
        log_phase_start(
            GcPhase::Clear,
            state.pairs.total() - state.pairs.free() + state.objects.total() - state.objects.free(),
        );
        state.pairs.clear_marks();
        state.objects.clear_marks();
    }
    timer.end_clear();

    timer.start();
    let objects_marked = {
        let _phase = trace_phase(GcPhase::Mark);
        let mut marker = Marker::new(&state.pairs, &state.objects);
        for value in state.roots.iter() {
            marker.visit(value);
        }
        for ring in &state.rings {
            ring.for_each(|value| marker.visit(value));
        }
        pinned(&mut marker);
        marker.drain();
        log_phase_end_mark(marker.objects_marked);
        marker.objects_marked
    };
    timer.end_mark();

    timer.start();
    let (pairs_reclaimed, objects_reclaimed) = {
        let _phase = trace_phase(GcPhase::Sweep);
        let before = dead.len();
        let pairs = state.pairs.sweep(dead);
        debug_assert_eq!(dead.len(), before);
        let objects = state.objects.sweep(dead);
        log_phase_end(GcPhase::Sweep, pairs + objects);
        (pairs, objects)
    };
    timer.end_sweep();

    replenish(state);

    state.collections += 1;
    state.collect_pending = false;
    state.last_metrics = GcMetrics {
        duration: start.elapsed(),
        clear_duration: timer.clear,
        mark_duration: timer.mark,
        sweep_duration: timer.sweep,
        objects_marked,
        pairs_reclaimed,
        objects_reclaimed,
        total_collections: state.collections,
        trigger,
    };

    #[cfg(feature = "tracing")]
    tracing::debug!(
        gc_id = gc_id.0,
        pairs_reclaimed,
        objects_reclaimed,
        pairs_free = state.pairs.free(),
        objects_free = state.objects.free(),
        "gc_complete"
    );
}

/// Maps one more Block for each space whose free share fell below
/// `1 / replenish_ratio`.
fn replenish(state: &mut HeapState) {
    let config = state.config;
    if config.replenish_ratio == 0 {
        return;
    }
    for space in [&mut state.pairs, &mut state.objects] {
        if space.free().saturating_mul(config.replenish_ratio) < space.total() {
            #[cfg(feature = "tracing")]
            tracing::debug!(free = space.free(), total = space.total(), "replenish");
            space.grow(&config);
        }
    }
}
