//! Reachability, reclamation and destroy-once tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use sexp_gc::{CollectTrigger, GcObject, Heap, HeapConfig, Trace, Value, RECENT_RING_SIZE};

/// A string-like object that counts how often it is destroyed.
#[derive(Trace)]
struct Tracked {
    #[trace(skip)]
    text: String,
    #[trace(skip)]
    destroyed: Arc<AtomicUsize>,
}

impl GcObject for Tracked {
    fn destroy(self: Box<Self>) {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
    }

    fn as_str(&self) -> Option<&str> {
        Some(&self.text)
    }
}

fn tracked(heap: &Heap, text: &str, counter: &Arc<AtomicUsize>) -> Value {
    heap.make_object(Box::new(Tracked {
        text: text.to_owned(),
        destroyed: Arc::clone(counter),
    }))
}

/// Pushes every earlier allocation out of this thread's recent ring.
fn flush_ring(heap: &Heap) {
    for _ in 0..RECENT_RING_SIZE {
        let _ = heap.cons(Value::EMPTY, Value::EMPTY);
    }
}

#[test]
fn test_protected_list_survives_and_unprotected_is_reclaimed() {
    let heap = Heap::new();
    let destroyed = Arc::new(AtomicUsize::new(0));

    let a = tracked(&heap, "a", &destroyed);
    let b = tracked(&heap, "b", &destroyed);
    let list = heap.list([a, b]);
    let root = heap.protect(list);

    flush_ring(&heap);
    heap.collect_now();
    assert_eq!(destroyed.load(Ordering::SeqCst), 0);

    let names: Vec<_> = heap
        .list_iter(root.get())
        .map(|v| heap.as_object(v).and_then(GcObject::as_str).map(str::to_owned))
        .collect();
    assert_eq!(names, vec![Some("a".to_owned()), Some("b".to_owned())]);

    drop(root);
    flush_ring(&heap);
    heap.collect_now();
    assert_eq!(destroyed.load(Ordering::SeqCst), 2);
    let metrics = heap.last_gc_metrics();
    assert_eq!(metrics.objects_reclaimed, 2);
    // The two list pairs plus the first batch of ring-flushing pairs.
    assert_eq!(metrics.pairs_reclaimed, 2 + RECENT_RING_SIZE);
}

#[test]
fn test_destroy_runs_once() {
    let heap = Heap::new();
    let destroyed = Arc::new(AtomicUsize::new(0));

    for i in 0..10 {
        let _ = tracked(&heap, &format!("s{i}"), &destroyed);
    }
    flush_ring(&heap);

    heap.collect_now();
    assert_eq!(destroyed.load(Ordering::SeqCst), 10);

    heap.collect_now();
    heap.collect_now();
    assert_eq!(destroyed.load(Ordering::SeqCst), 10);
}

#[test]
fn test_double_collection_is_idempotent() {
    let heap = Heap::new();
    let list = heap.list((0..5).map(Value::from_int));
    let _root = heap.protect(list);
    for _ in 0..50 {
        let _ = heap.cons(Value::from_int(0), Value::EMPTY);
    }

    heap.collect_now();
    let first = heap.stats();

    heap.collect_now();
    let second = heap.stats();

    assert_eq!(heap.last_gc_metrics().reclaimed(), 0);
    assert_eq!(first.pairs, second.pairs);
    assert_eq!(first.objects, second.objects);
    assert_eq!(second.collections, first.collections + 1);
}

#[test]
fn test_self_referential_pair() {
    let heap = Heap::new();
    let pair = heap.cons(Value::EMPTY, Value::EMPTY);
    heap.set_head(pair, pair);
    let root = heap.protect(pair);

    heap.collect_now();
    assert_eq!(heap.last_gc_metrics().pairs_reclaimed, 0);
    assert_eq!(heap.head(root.get()), pair);
    assert_eq!(heap.tail(root.get()), Value::EMPTY);

    drop(root);
    flush_ring(&heap);
    heap.collect_now();
    assert_eq!(heap.last_gc_metrics().pairs_reclaimed, 1);
}

#[test]
fn test_tail_cycle_survives_while_protected() {
    let heap = Heap::new();
    let pair = heap.cons(Value::from_int(1), Value::EMPTY);
    heap.set_tail(pair, pair);
    let root = heap.protect(pair);

    flush_ring(&heap);
    heap.collect_now();
    assert_eq!(heap.last_gc_metrics().pairs_reclaimed, 0);
    assert_eq!(heap.tail(root.get()), pair);
    assert_eq!(heap.head(heap.tail(root.get())), Value::from_int(1));

    drop(root);
    flush_ring(&heap);
    heap.collect_now();
    // The cycle plus the first batch of ring-flushing pairs.
    assert_eq!(heap.last_gc_metrics().pairs_reclaimed, 1 + RECENT_RING_SIZE);
}

#[test]
fn test_two_pair_cycle_is_reclaimed() {
    let heap = Heap::new();
    let a = heap.cons(Value::from_int(1), Value::EMPTY);
    let b = heap.cons(Value::from_int(2), a);
    heap.set_tail(a, b);

    heap.collect_now();
    assert_eq!(heap.last_gc_metrics().pairs_reclaimed, 0);

    flush_ring(&heap);
    heap.collect_now();
    assert_eq!(heap.last_gc_metrics().pairs_reclaimed, 2);
}

#[test]
fn test_list_survives_many_collections() {
    let heap = Heap::new();
    let list = heap.list([1, 2, 3].map(Value::from_int));
    let root = heap.protect(list);

    for i in 0..10_000 {
        let _ = heap.cons(Value::from_int(i), Value::EMPTY);
    }

    let stats = heap.stats();
    assert!(stats.collections >= 2, "expected collections, got {stats:?}");
    assert!(stats.pairs.blocks <= 2, "garbage should not grow the heap: {stats:?}");

    let items: Vec<_> = heap.list_iter(root.get()).map(Value::to_int).collect();
    assert_eq!(items, vec![1, 2, 3]);
}

#[test]
fn test_string_ages_out_of_recent_ring() {
    let heap = Heap::new();
    let destroyed = Arc::new(AtomicUsize::new(0));

    let s = tracked(&heap, "transient", &destroyed);
    for _ in 0..RECENT_RING_SIZE - 1 {
        let _ = heap.cons(Value::EMPTY, Value::EMPTY);
    }
    heap.collect_now();
    assert_eq!(destroyed.load(Ordering::SeqCst), 0);
    assert_eq!(heap.as_object(s).and_then(GcObject::as_str), Some("transient"));

    let _ = heap.cons(Value::EMPTY, Value::EMPTY);
    heap.collect_now();
    assert_eq!(destroyed.load(Ordering::SeqCst), 1);
}

#[test]
fn test_object_keeps_referenced_pairs_alive() {
    #[derive(Trace)]
    struct Holder {
        held: Value,
    }
    impl GcObject for Holder {}

    let heap = Heap::new();
    let pair = heap.cons(Value::from_int(7), Value::from_int(8));
    let holder = heap.make_object(Box::new(Holder { held: pair }));
    let _root = heap.protect(holder);

    flush_ring(&heap);
    heap.collect_now();
    assert_eq!(heap.last_gc_metrics().pairs_reclaimed, 0);
    assert_eq!(heap.head(pair), Value::from_int(7));
    assert_eq!(heap.tail(pair), Value::from_int(8));
}

#[test]
fn test_deep_list_marks_without_recursion() {
    let heap = Heap::new();
    let mut list = Value::EMPTY;
    let guard = heap.lock_gc();
    for i in 0..200_000 {
        list = heap.cons(Value::from_int(i), list);
    }
    let list = guard.release(list);
    let root = heap.protect(list);

    heap.collect_now();
    assert_eq!(heap.list_len(root.get()), 200_000);
    assert_eq!(heap.last_gc_metrics().pairs_reclaimed, 0);
}

#[test]
fn test_destroy_may_allocate() {
    struct Reentrant {
        heap: Heap,
        ran: Arc<AtomicUsize>,
    }

    // SAFETY: holds no values
    unsafe impl Trace for Reentrant {
        fn trace(&self, _visitor: &mut dyn sexp_gc::Visitor) {}
    }

    impl GcObject for Reentrant {
        fn destroy(self: Box<Self>) {
            let pair = self.heap.cons(Value::from_int(1), Value::EMPTY);
            assert!(pair.is_pair());
            self.ran.fetch_add(1, Ordering::SeqCst);
        }
    }

    let heap = Heap::new();
    let ran = Arc::new(AtomicUsize::new(0));
    let _ = heap.make_object(Box::new(Reentrant {
        heap: heap.clone(),
        ran: Arc::clone(&ran),
    }));
    flush_ring(&heap);
    heap.collect_now();
    assert_eq!(ran.load(Ordering::SeqCst), 1);
}

#[test]
fn test_dropping_heap_destroys_remaining_objects() {
    let destroyed = Arc::new(AtomicUsize::new(0));
    {
        let heap = Heap::new();
        let s = tracked(&heap, "kept", &destroyed);
        let root = heap.protect(s);
        drop(heap);
        assert_eq!(destroyed.load(Ordering::SeqCst), 0);
        assert_eq!(root.heap().as_object(root.get()).and_then(GcObject::as_str), Some("kept"));
    }
    assert_eq!(destroyed.load(Ordering::SeqCst), 1);
}

#[test]
fn test_allocation_grows_when_everything_is_live() {
    let heap = Heap::new();
    let blocks_before = heap.stats().pairs.blocks;

    let guard = heap.lock_gc();
    let mut list = Value::EMPTY;
    for i in 0..5_000 {
        list = heap.cons(Value::from_int(i), list);
    }
    let list = guard.release(list);
    let root = heap.protect(list);

    for i in 0..5_000 {
        let _ = heap.cons(Value::from_int(i), Value::EMPTY);
    }

    assert!(heap.stats().pairs.blocks > blocks_before);
    assert_eq!(heap.list_len(root.get()), 5_000);
}

#[test]
fn test_builtin_kinds() {
    let heap = Heap::new();
    let s = heap.make_string("hello");
    let f = heap.make_float(1.25);

    assert!(s.is_object());
    assert_eq!(heap.as_object(s).and_then(GcObject::as_str), Some("hello"));
    assert_eq!(heap.as_object(f).and_then(GcObject::as_number), Some(1.25));
    assert_eq!(heap.as_object(s).map(GcObject::type_name), Some("string"));
    assert!(heap.as_object(Value::from_int(1)).is_none());
    assert!(heap.as_object(Value::EMPTY).is_none());
}

/// A heap that neither grows eagerly nor replenishes after a collection.
fn tight_heap() -> Heap {
    Heap::with_config(HeapConfig::new().initial_block_chunks(1).replenish_ratio(0))
}

#[test]
fn test_cons_arguments_survive_triggered_collection() {
    let heap = tight_heap();
    let destroyed = Arc::new(AtomicUsize::new(0));
    let obj = tracked(&heap, "argument", &destroyed);

    // Exhaust the pair space; this also pushes `obj` out of the ring.
    while heap.stats().pairs.free > 0 {
        let _ = heap.cons(Value::EMPTY, Value::EMPTY);
    }
    assert_eq!(heap.stats().collections, 0);

    let pair = heap.cons(obj, Value::EMPTY);
    let metrics = heap.last_gc_metrics();
    assert_eq!(metrics.trigger, CollectTrigger::PairsExhausted);
    assert_eq!(metrics.objects_reclaimed, 0);
    assert_eq!(destroyed.load(Ordering::SeqCst), 0);
    assert_eq!(heap.head(pair), obj);
    assert_eq!(heap.as_object(obj).and_then(GcObject::as_str), Some("argument"));
}

#[test]
fn test_make_object_contents_survive_triggered_collection() {
    #[derive(Trace)]
    struct Holder {
        held: Value,
    }
    impl GcObject for Holder {}

    let heap = tight_heap();
    let pair = heap.cons(Value::from_int(1), Value::from_int(2));

    // Exhaust the object space; this also pushes `pair` out of the ring.
    while heap.stats().objects.free > 0 {
        let _ = heap.make_string("filler");
    }
    assert_eq!(heap.stats().collections, 0);

    let holder = heap.make_object(Box::new(Holder { held: pair }));
    let metrics = heap.last_gc_metrics();
    assert_eq!(metrics.trigger, CollectTrigger::ObjectsExhausted);
    assert!(metrics.objects_reclaimed > 0);
    assert_eq!(metrics.pairs_reclaimed, 0);
    assert!(heap.as_object(holder).is_some());
    assert_eq!(heap.head(pair), Value::from_int(1));
    assert_eq!(heap.tail(pair), Value::from_int(2));
}
