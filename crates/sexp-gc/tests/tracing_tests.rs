//! Integration tests for the tracing feature.
//!
//! A capturing layer records span and event names emitted while the
//! collector runs.

#![cfg(feature = "tracing")]

use std::sync::{Arc, Mutex};

use sexp_gc::{Heap, HeapConfig, Value};
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::Registry;

#[derive(Default, Clone)]
struct Captured {
    spans: Arc<Mutex<Vec<String>>>,
    events: Arc<Mutex<Vec<String>>>,
}

impl Captured {
    fn spans(&self) -> Vec<String> {
        self.spans.lock().unwrap().clone()
    }

    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

struct MessageVisitor(Option<String>);

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0 = Some(format!("{value:?}"));
        }
    }
}

impl<S: Subscriber> Layer<S> for Captured {
    fn on_new_span(&self, attrs: &Attributes<'_>, _id: &Id, _ctx: Context<'_, S>) {
        self.spans
            .lock()
            .unwrap()
            .push(attrs.metadata().name().to_owned());
    }

    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor(None);
        event.record(&mut visitor);
        if let Some(message) = visitor.0 {
            self.events.lock().unwrap().push(message);
        }
    }
}

fn capture(f: impl FnOnce()) -> Captured {
    let captured = Captured::default();
    let subscriber = Registry::default().with(captured.clone());
    tracing::subscriber::with_default(subscriber, f);
    captured
}

#[test]
fn test_collection_emits_spans() {
    let captured = capture(|| {
        let heap = Heap::new();
        let _ = heap.cons(Value::from_int(1), Value::EMPTY);
        heap.collect_now();
    });

    let spans = captured.spans();
    assert_eq!(spans.iter().filter(|s| *s == "gc_collect").count(), 1);
    assert_eq!(spans.iter().filter(|s| *s == "gc_phase").count(), 3);
}

#[test]
fn test_collection_emits_phase_events() {
    let captured = capture(|| {
        let heap = Heap::new();
        heap.collect_now();
    });

    let events = captured.events();
    assert_eq!(events.iter().filter(|e| *e == "phase_start").count(), 1);
    assert_eq!(events.iter().filter(|e| *e == "phase_end").count(), 2);
    assert!(events.iter().any(|e| e == "gc_complete"));
}

#[test]
fn test_deferred_collection_is_logged() {
    let captured = capture(|| {
        let heap = Heap::new();
        heap.acquire_gc_lock();
        heap.collect_now();
        heap.release_gc_lock(Value::EMPTY);
    });

    let events = captured.events();
    let deferred = events.iter().position(|e| e == "collection_deferred");
    let complete = events.iter().position(|e| e == "gc_complete");
    assert!(deferred.is_some());
    assert!(deferred < complete);
}

#[test]
fn test_block_mapping_is_logged() {
    let captured = capture(|| {
        let heap = Heap::with_config(HeapConfig::new().initial_block_chunks(1));
        let guard = heap.lock_gc();
        let mut list = Value::EMPTY;
        for i in 0..2_000 {
            list = heap.cons(Value::from_int(i), list);
        }
        let _ = guard.release(list);
    });

    let mapped = captured
        .events()
        .iter()
        .filter(|e| *e == "block_mapped")
        .count();
    // Two initial Blocks plus at least one grown under the lock.
    assert!(mapped >= 3, "only {mapped} blocks mapped");
}

#[test]
fn test_allocation_without_collection_is_quiet() {
    let captured = capture(|| {
        let heap = Heap::new();
        for i in 0..10 {
            let _ = heap.cons(Value::from_int(i), Value::EMPTY);
        }
    });
    assert!(captured.spans().iter().all(|s| s != "gc_collect"));
}
