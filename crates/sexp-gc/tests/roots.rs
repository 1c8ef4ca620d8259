//! Root protection tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use sexp_gc::{GcObject, Heap, Trace, Value, RECENT_RING_SIZE};

#[derive(Trace)]
struct Counted {
    #[trace(skip)]
    destroyed: Arc<AtomicUsize>,
}

impl GcObject for Counted {
    fn destroy(self: Box<Self>) {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}

fn flush_ring(heap: &Heap) {
    for _ in 0..RECENT_RING_SIZE {
        let _ = heap.cons(Value::EMPTY, Value::EMPTY);
    }
}

#[test]
fn test_protect_and_drop_update_root_count() {
    let heap = Heap::new();
    let a = heap.protect(Value::from_int(1));
    let b = heap.protect(heap.intern_symbol("b"));
    assert_eq!(heap.stats().roots, 2);

    drop(a);
    assert_eq!(heap.stats().roots, 1);
    drop(b);
    assert_eq!(heap.stats().roots, 0);
}

#[test]
fn test_protecting_immediates_is_harmless() {
    let heap = Heap::new();
    let roots: Vec<_> = [Value::EMPTY, Value::from_int(-3), heap.intern_symbol("x")]
        .into_iter()
        .map(|v| heap.protect(v))
        .collect();
    heap.collect_now();
    assert_eq!(roots[1].get().to_int(), -3);
    assert_eq!(heap.symbol_name(roots[2].get()), "x");
}

#[test]
fn test_set_moves_protection() {
    let heap = Heap::new();
    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));

    let a = heap.make_object(Box::new(Counted {
        destroyed: Arc::clone(&first),
    }));
    let b = heap.make_object(Box::new(Counted {
        destroyed: Arc::clone(&second),
    }));
    let mut root = heap.protect(a);
    let _keep_b = heap.protect(b);

    root.set(b);
    assert_eq!(root.get(), b);
    assert_eq!(heap.stats().roots, 2);

    flush_ring(&heap);
    heap.collect_now();
    assert_eq!(first.load(Ordering::SeqCst), 1);
    assert_eq!(second.load(Ordering::SeqCst), 0);
}

#[test]
fn test_same_value_protected_twice() {
    let heap = Heap::new();
    let destroyed = Arc::new(AtomicUsize::new(0));
    let obj = heap.make_object(Box::new(Counted {
        destroyed: Arc::clone(&destroyed),
    }));
    let r1 = heap.protect(obj);
    let r2 = heap.protect(obj);
    flush_ring(&heap);

    drop(r1);
    heap.collect_now();
    assert_eq!(destroyed.load(Ordering::SeqCst), 0);

    drop(r2);
    heap.collect_now();
    assert_eq!(destroyed.load(Ordering::SeqCst), 1);
}

#[test]
fn test_many_protect_drop_cycles() {
    let heap = Heap::new();
    let pair = heap.cons(Value::from_int(1), Value::EMPTY);
    for _ in 0..10_000 {
        let root = heap.protect(pair);
        assert_eq!(root.get(), pair);
    }
    assert_eq!(heap.stats().roots, 0);

    let held: Vec<_> = (0..1_000).map(|i| heap.protect(Value::from_int(i))).collect();
    assert_eq!(heap.stats().roots, 1_000);
    drop(held);
    assert_eq!(heap.stats().roots, 0);
}

#[test]
fn test_root_outlives_heap_handle() {
    let root = {
        let heap = Heap::new();
        let list = heap.list([Value::from_int(1), Value::from_int(2)]);
        heap.protect(list)
    };
    let heap = root.heap();
    heap.collect_now();
    assert_eq!(heap.list_len(root.get()), 2);
    assert_eq!(heap.stats().roots, 1);
}

#[test]
fn test_root_debug() {
    let heap = Heap::new();
    let root = heap.protect(Value::from_int(5));
    let text = format!("{root:?}");
    assert!(text.starts_with("RootHandle"));
    assert!(text.contains("Number(5)"));
}
