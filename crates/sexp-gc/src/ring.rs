//! Per-thread rings of recently allocated values.
//!
//! Every allocation writes its new value into the allocating thread's ring,
//! overwriting the oldest entry. The collector treats every ring entry as a
//! root, so a fresh value survives the next [`RECENT_RING_SIZE`] allocations
//! on its thread even before the caller protects it.
//!
//! Rings are created lazily, one per (thread, heap) pair, and unregistered
//! from their heap when the thread exits.

use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use crate::heap::Shared;
use crate::Value;

/// Number of entries in each thread's ring.
pub const RECENT_RING_SIZE: usize = 16;

/// A fixed-size ring of recently allocated values.
///
/// Written only by its owning thread, read by whichever thread collects.
pub struct RecentRing {
    slots: [AtomicUsize; RECENT_RING_SIZE],
    cursor: AtomicUsize,
}

impl RecentRing {
    /// Creates a ring of empty-list entries.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| AtomicUsize::new(Value::EMPTY.bits())),
            cursor: AtomicUsize::new(0),
        }
    }

    /// Overwrites the oldest entry with `value`.
    pub fn push(&self, value: Value) {
        let i = self.cursor.load(Ordering::Relaxed);
        self.slots[i % RECENT_RING_SIZE].store(value.bits(), Ordering::Release);
        self.cursor.store(i.wrapping_add(1), Ordering::Relaxed);
    }

    /// Calls `f` with every entry, oldest slot index first.
    pub fn for_each(&self, mut f: impl FnMut(Value)) {
        for slot in &self.slots {
            f(Value::from_bits(slot.load(Ordering::Acquire)));
        }
    }

    /// Copies the current entries out.
    #[must_use]
    pub fn snapshot(&self) -> [Value; RECENT_RING_SIZE] {
        let mut out = [Value::EMPTY; RECENT_RING_SIZE];
        for (dst, slot) in out.iter_mut().zip(&self.slots) {
            *dst = Value::from_bits(slot.load(Ordering::Acquire));
        }
        out
    }

    /// Returns `true` if any entry equals `value`.
    #[must_use]
    pub fn contains(&self, value: Value) -> bool {
        self.slots
            .iter()
            .any(|slot| slot.load(Ordering::Acquire) == value.bits())
    }
}

impl Default for RecentRing {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RecentRing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecentRing")
            .field("cursor", &self.cursor.load(Ordering::Relaxed))
            .field("slots", &self.snapshot())
            .finish()
    }
}

/// This thread's claim on one heap's ring. Dropping it unregisters the ring.
struct RingLease {
    owner: Weak<Shared>,
    ring: Arc<RecentRing>,
}

impl Drop for RingLease {
    fn drop(&mut self) {
        if let Some(shared) = self.owner.upgrade() {
            shared.unregister_ring(&self.ring);
        }
    }
}

thread_local! {
    static RINGS: RefCell<Vec<RingLease>> = const { RefCell::new(Vec::new()) };
}

/// Returns the calling thread's ring for `shared`, registering one on first
/// use.
///
/// Takes the heap's state lock when registering, so it must be called before
/// the caller locks the heap. Returns `None` while thread-local storage is
/// being torn down.
pub(crate) fn local_ring(shared: &Arc<Shared>) -> Option<Arc<RecentRing>> {
    RINGS
        .try_with(|rings| {
            let mut rings = rings.try_borrow_mut().ok()?;
            rings.retain(|lease| lease.owner.strong_count() > 0);

            let target = Arc::as_ptr(shared);
            if let Some(lease) = rings.iter().find(|l| l.owner.as_ptr() == target) {
                return Some(Arc::clone(&lease.ring));
            }

            let ring = Arc::new(RecentRing::new());
            shared.register_ring(Arc::clone(&ring));
            rings.push(RingLease {
                owner: Arc::downgrade(shared),
                ring: Arc::clone(&ring),
            });
            Some(ring)
        })
        .ok()
        .flatten()
}
