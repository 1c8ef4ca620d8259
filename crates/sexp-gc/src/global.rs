//! Free functions on the process-wide heap.
//!
//! Each function forwards to the same method on [`Heap::global`].

use crate::metrics::{GcMetrics, HeapStats};
use crate::object::GcObject;
use crate::roots::RootHandle;
use crate::{Heap, Value};

/// Allocates a pair on the global heap.
pub fn cons(head: Value, tail: Value) -> Value {
    Heap::global().cons(head, tail)
}

/// The first element of a pair on the global heap.
#[must_use]
pub fn head(pair: Value) -> Value {
    Heap::global().head(pair)
}

/// The second element of a pair on the global heap.
#[must_use]
pub fn tail(pair: Value) -> Value {
    Heap::global().tail(pair)
}

/// Replaces the first element of a pair on the global heap.
pub fn set_head(pair: Value, value: Value) {
    Heap::global().set_head(pair, value);
}

/// Replaces the second element of a pair on the global heap.
pub fn set_tail(pair: Value, value: Value) {
    Heap::global().set_tail(pair, value);
}

/// Moves an object into the global heap.
pub fn make_object(object: Box<dyn GcObject>) -> Value {
    Heap::global().make_object(object)
}

/// Allocates a boxed string on the global heap.
pub fn make_string(s: impl Into<String>) -> Value {
    Heap::global().make_string(s)
}

/// Allocates a boxed number on the global heap.
pub fn make_float(f: f64) -> Value {
    Heap::global().make_float(f)
}

/// The object behind a global-heap object value.
#[must_use]
pub fn as_object(value: Value) -> Option<&'static dyn GcObject> {
    Heap::global().as_object(value)
}

/// Interns a symbol in the global heap.
pub fn intern_symbol(name: &str) -> Value {
    Heap::global().intern_symbol(name)
}

/// The name of a global-heap symbol.
#[must_use]
pub fn symbol_name(value: Value) -> &'static str {
    Heap::global().symbol_name(value)
}

/// Protects a global-heap value until the handle is dropped.
#[must_use = "the value is unprotected as soon as the handle is dropped"]
pub fn protect(value: Value) -> RootHandle {
    Heap::global().protect(value)
}

/// Acquires one level of the global heap's collection lock.
pub fn acquire_gc_lock() {
    Heap::global().acquire_gc_lock();
}

/// Releases one level of the global heap's collection lock.
pub fn release_gc_lock(value: Value) -> Value {
    Heap::global().release_gc_lock(value)
}

/// Collects the global heap now, unless its collection lock is held.
pub fn collect_now() {
    Heap::global().collect_now();
}

/// Occupancy of the global heap.
#[must_use]
pub fn stats() -> HeapStats {
    Heap::global().stats()
}

/// Metrics of the global heap's last collection.
#[must_use]
pub fn last_gc_metrics() -> GcMetrics {
    Heap::global().last_gc_metrics()
}
