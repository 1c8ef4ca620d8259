//! Proper-list helpers built on pairs.

use std::iter::FusedIterator;

use crate::heap::Heap;
use crate::Value;

impl Heap {
    /// Builds a proper list of `items`.
    ///
    /// The list is built under the collection lock, so the partial list needs
    /// no protection; the finished list is recorded in the calling thread's
    /// recent ring when the lock is released.
    pub fn list<I>(&self, items: I) -> Value
    where
        I: IntoIterator<Item = Value>,
        I::IntoIter: DoubleEndedIterator,
    {
        let guard = self.lock_gc();
        let mut list = Value::EMPTY;
        for item in items.into_iter().rev() {
            list = self.cons(item, list);
        }
        guard.release(list)
    }

    /// Iterates the elements of a list, stopping at the first non-pair tail.
    #[must_use]
    pub const fn list_iter(&self, list: Value) -> ListIter<'_> {
        ListIter {
            heap: self,
            cur: list,
        }
    }

    /// Number of pairs along the tail chain of `list`.
    #[must_use]
    pub fn list_len(&self, list: Value) -> usize {
        self.list_iter(list).count()
    }
}

/// Iterator over list elements; see [`Heap::list_iter`].
#[derive(Debug, Clone)]
pub struct ListIter<'a> {
    heap: &'a Heap,
    cur: Value,
}

impl ListIter<'_> {
    /// What remains of the list: `Value::EMPTY` once a proper list is
    /// exhausted, or the improper tail.
    #[must_use]
    pub const fn rest(&self) -> Value {
        self.cur
    }
}

impl Iterator for ListIter<'_> {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        if !self.cur.is_pair() {
            return None;
        }
        let item = self.heap.head(self.cur);
        self.cur = self.heap.tail(self.cur);
        Some(item)
    }
}

impl FusedIterator for ListIter<'_> {}

#[cfg(test)]
mod tests {
    use crate::{Heap, Value};

    #[test]
    fn test_list_roundtrip() {
        let heap = Heap::new();
        let list = heap.list((1..=3).map(Value::from_int));
        let items: Vec<_> = heap.list_iter(list).map(Value::to_int).collect();
        assert_eq!(items, vec![1, 2, 3]);
        assert_eq!(heap.list_len(list), 3);
    }

    #[test]
    fn test_empty_list() {
        let heap = Heap::new();
        assert_eq!(heap.list(Vec::new()), Value::EMPTY);
        assert_eq!(heap.list_len(Value::EMPTY), 0);
    }

    #[test]
    fn test_improper_tail() {
        let heap = Heap::new();
        let dotted = heap.cons(Value::from_int(1), Value::from_int(2));
        let mut iter = heap.list_iter(dotted);
        assert_eq!(iter.next(), Some(Value::from_int(1)));
        assert_eq!(iter.next(), None);
        assert_eq!(iter.rest(), Value::from_int(2));
    }

    #[test]
    fn test_list_leaves_lock_released() {
        let heap = Heap::new();
        let _ = heap.list([Value::EMPTY, Value::from_int(4)]);
        assert_eq!(heap.stats().gc_lock_depth, 0);
    }
}
