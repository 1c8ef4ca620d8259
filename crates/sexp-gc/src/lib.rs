//! A tagged-value heap for symbolic expressions with a mark-and-sweep
//! collector.
//!
//! `sexp-gc` represents integers, interned symbols, pairs (and so lists),
//! boxed strings and numbers, and user-defined objects as one machine word
//! each: a [`Value`]. Pairs and objects live in a [`Heap`] and are reclaimed
//! by a stop-the-world mark-and-sweep collection once nothing reaches them.
//!
//! # Features
//!
//! - **Tagged words**: integers and symbols are immediates; pairs and objects
//!   are addresses into heap Blocks. `Value` is `Copy`.
//! - **Chunked Blocks with mark bytes**: a slot's mark byte is found by
//!   address arithmetic alone.
//! - **Two kinds of roots**: explicit [`RootHandle`]s, and each thread's ring
//!   of its last [`RECENT_RING_SIZE`] allocations.
//! - **Collection lock**: [`Heap::acquire_gc_lock`] defers collection while a
//!   structure is being built.
//! - **Thread-safe**: `Heap` is `Send + Sync`; one lock serializes
//!   allocation and collection.
//!
//! # Quick Start
//!
//! ```
//! use sexp_gc::{Heap, Value};
//!
//! let heap = Heap::new();
//! let define = heap.intern_symbol("define");
//! let expr = heap.list([define, heap.intern_symbol("x"), Value::from_int(42)]);
//! let root = heap.protect(expr);
//!
//! heap.collect_now();
//!
//! assert_eq!(heap.symbol_name(heap.head(root.get())), "define");
//! assert_eq!(heap.list_len(root.get()), 3);
//! ```
//!
//! # Objects
//!
//! ```
//! use sexp_gc::{GcObject, Heap, Trace, Value};
//!
//! #[derive(Trace)]
//! struct Env {
//!     bindings: Value,
//!     #[trace(skip)]
//!     depth: u32,
//! }
//!
//! impl GcObject for Env {}
//!
//! let heap = Heap::new();
//! let bindings = heap.cons(heap.intern_symbol("x"), Value::from_int(1));
//! let env = heap.make_object(Box::new(Env { bindings, depth: 0 }));
//! let _root = heap.protect(env);
//! heap.collect_now();
//! assert!(heap.as_object(env).is_some());
//! ```

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod block;
mod config;
mod gc;
mod global;
mod heap;
mod list;
mod metrics;
mod object;
mod ring;
mod roots;
mod symbol;
mod trace;
mod tracing;
mod value;

pub use block::{CHUNK_SIZE, CHUNK_SLOTS, SLOT_SIZE};
pub use config::HeapConfig;
pub use global::{
    acquire_gc_lock, as_object, collect_now, cons, head, intern_symbol, last_gc_metrics,
    make_float, make_object, make_string, protect, release_gc_lock, set_head, set_tail, stats,
    symbol_name, tail,
};
pub use heap::{GcLockGuard, Heap};
pub use list::ListIter;
pub use metrics::{CollectTrigger, GcMetrics, HeapStats, SpaceStats};
pub use object::{GcNumber, GcObject, GcString, ValueCell};
pub use ring::{RecentRing, RECENT_RING_SIZE};
pub use roots::RootHandle;
pub use symbol::CORRUPT_SYMBOL;
pub use trace::{Trace, Visitor};
pub use crate::tracing::GcId;
pub use value::{make_number, Value, ValueKind};

// Re-export derive macro when feature is enabled
#[cfg(feature = "derive")]
pub use sexp_gc_derive::Trace;
