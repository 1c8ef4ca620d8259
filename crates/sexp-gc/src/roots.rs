//! Explicit roots.
//!
//! [`Heap::protect`](crate::Heap::protect) stores a value in the heap's root
//! table and returns a [`RootHandle`]; the value is marked by every
//! collection until the handle is dropped. The table is a slab with an
//! intrusive free list, so registration and removal are O(1).

use std::fmt;

use crate::heap::Heap;
use crate::Value;

enum RootSlot {
    Occupied(Value),
    Free { next: Option<usize> },
}

/// Slab of protected values. Guarded by the heap's state lock.
pub(crate) struct RootTable {
    slots: Vec<RootSlot>,
    free_head: Option<usize>,
    len: usize,
}

impl RootTable {
    pub(crate) const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_head: None,
            len: 0,
        }
    }

    pub(crate) const fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn insert(&mut self, value: Value) -> usize {
        self.len += 1;
        if let Some(index) = self.free_head {
            if let RootSlot::Free { next } = self.slots[index] {
                self.free_head = next;
            }
            self.slots[index] = RootSlot::Occupied(value);
            index
        } else {
            self.slots.push(RootSlot::Occupied(value));
            self.slots.len() - 1
        }
    }

    pub(crate) fn set(&mut self, index: usize, value: Value) {
        if let Some(RootSlot::Occupied(v)) = self.slots.get_mut(index) {
            *v = value;
        }
    }

    pub(crate) fn remove(&mut self, index: usize) -> Option<Value> {
        let slot = self.slots.get_mut(index)?;
        let RootSlot::Occupied(value) = *slot else {
            return None;
        };
        *slot = RootSlot::Free {
            next: self.free_head,
        };
        self.free_head = Some(index);
        self.len -= 1;
        Some(value)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = Value> + '_ {
        self.slots.iter().filter_map(|slot| match slot {
            RootSlot::Occupied(v) => Some(*v),
            RootSlot::Free { .. } => None,
        })
    }
}

/// Keeps a value alive until dropped.
///
/// The handle caches the protected value, so [`get`](Self::get) does not
/// lock. [`set`](Self::set) replaces the protected value under the lock.
///
/// ```
/// use sexp_gc::{Heap, Value};
///
/// let heap = Heap::new();
/// let pair = heap.cons(Value::from_int(1), Value::EMPTY);
/// let root = heap.protect(pair);
/// heap.collect_now();
/// assert_eq!(heap.head(root.get()), Value::from_int(1));
/// ```
pub struct RootHandle {
    heap: Heap,
    index: usize,
    value: Value,
}

impl RootHandle {
    pub(crate) fn new(heap: Heap, index: usize, value: Value) -> Self {
        Self { heap, index, value }
    }

    /// The protected value.
    #[inline]
    #[must_use]
    pub const fn get(&self) -> Value {
        self.value
    }

    /// Replaces the protected value.
    pub fn set(&mut self, value: Value) {
        self.heap.with_state(|state| state.roots.set(self.index, value));
        self.value = value;
    }

    /// The heap this handle protects a value in.
    #[must_use]
    pub const fn heap(&self) -> &Heap {
        &self.heap
    }
}

impl Drop for RootHandle {
    fn drop(&mut self) {
        self.heap.with_state(|state| {
            state.roots.remove(self.index);
        });
    }
}

impl fmt::Debug for RootHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootHandle")
            .field("index", &self.index)
            .field("value", &self.value)
            .finish_non_exhaustive()
    }
}
