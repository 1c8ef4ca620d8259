//! Trace trait and Visitor pattern for reporting held values to the collector.
//!
//! Objects stored on the heap report every [`Value`] they hold through
//! [`Trace::trace`]. The collector passes in its marker as the visitor.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::hash::BuildHasher;
use std::sync::Arc;

use crate::Value;

// ============================================================================
// Core Traits
// ============================================================================

/// A type that can report the values it holds to the collector.
///
/// # Safety
///
/// Implementations **MUST** report every heap `Value` they hold (pairs and
/// objects) by calling `visitor.visit()` on each one. A value that is not
/// reported will be reclaimed while the implementor still refers to it.
///
/// Prefer using `#[derive(Trace)]` instead of manual implementation.
///
/// # Examples
///
/// ```
/// use sexp_gc::{Trace, Value, Visitor};
///
/// struct Binding {
///     name: Value,
///     value: Value,
///     hits: u64,
/// }
///
/// unsafe impl Trace for Binding {
///     fn trace(&self, visitor: &mut dyn Visitor) {
///         self.name.trace(visitor);
///         self.value.trace(visitor);
///     }
/// }
/// ```
pub unsafe trait Trace {
    /// Visit every `Value` contained within this value.
    fn trace(&self, visitor: &mut dyn Visitor);
}

/// Receives the values reported by [`Trace::trace`].
///
/// Users generally do not implement this trait. Any `FnMut(Value)` closure is
/// a visitor, which is convenient for inspecting what an object reports.
pub trait Visitor {
    /// Visit one held value. Immediates and symbols may be passed; the
    /// collector ignores them.
    fn visit(&mut self, value: Value);
}

impl<F: FnMut(Value)> Visitor for F {
    #[inline]
    fn visit(&mut self, value: Value) {
        self(value);
    }
}

// ============================================================================
// Trace implementation for Value
// ============================================================================

// SAFETY: a Value reports itself
unsafe impl Trace for Value {
    #[inline]
    fn trace(&self, visitor: &mut dyn Visitor) {
        visitor.visit(*self);
    }
}

// ============================================================================
// Trace implementations for primitive types
// ============================================================================

macro_rules! impl_trace_for_primitives {
    ($($t:ty),* $(,)?) => {
        $(
            // SAFETY: primitive types hold no values
            unsafe impl Trace for $t {
                #[inline]
                fn trace(&self, _visitor: &mut dyn Visitor) {}
            }
        )*
    };
}

impl_trace_for_primitives! {
    i8, i16, i32, i64, i128, isize,
    u8, u16, u32, u64, u128, usize,
    f32, f64,
    bool, char, (),
    String, str,
    std::time::Duration,
    std::time::Instant,
    std::path::PathBuf,
    std::sync::atomic::AtomicBool,
    std::sync::atomic::AtomicUsize,
    std::sync::atomic::AtomicU64,
}

// ============================================================================
// Trace implementations for std container types
// ============================================================================

// SAFETY: references trace their target
unsafe impl<T: Trace + ?Sized> Trace for &T {
    #[inline]
    fn trace(&self, visitor: &mut dyn Visitor) {
        T::trace(self, visitor);
    }
}

// SAFETY: Box traces its contents
unsafe impl<T: Trace + ?Sized> Trace for Box<T> {
    #[inline]
    fn trace(&self, visitor: &mut dyn Visitor) {
        T::trace(self.as_ref(), visitor);
    }
}

// SAFETY: Arc traces its contents
unsafe impl<T: Trace + ?Sized> Trace for Arc<T> {
    #[inline]
    fn trace(&self, visitor: &mut dyn Visitor) {
        T::trace(self.as_ref(), visitor);
    }
}

// SAFETY: Vec traces all elements
unsafe impl<T: Trace> Trace for Vec<T> {
    #[inline]
    fn trace(&self, visitor: &mut dyn Visitor) {
        for item in self {
            item.trace(visitor);
        }
    }
}

// SAFETY: arrays trace all elements
unsafe impl<T: Trace, const N: usize> Trace for [T; N] {
    #[inline]
    fn trace(&self, visitor: &mut dyn Visitor) {
        for item in self {
            item.trace(visitor);
        }
    }
}

// SAFETY: slices trace all elements
unsafe impl<T: Trace> Trace for [T] {
    #[inline]
    fn trace(&self, visitor: &mut dyn Visitor) {
        for item in self {
            item.trace(visitor);
        }
    }
}

// SAFETY: Option traces its contents if Some
unsafe impl<T: Trace> Trace for Option<T> {
    #[inline]
    fn trace(&self, visitor: &mut dyn Visitor) {
        if let Some(inner) = self {
            inner.trace(visitor);
        }
    }
}

// SAFETY: Result traces both variants
unsafe impl<T: Trace, E: Trace> Trace for Result<T, E> {
    #[inline]
    fn trace(&self, visitor: &mut dyn Visitor) {
        match self {
            Ok(v) => v.trace(visitor),
            Err(e) => e.trace(visitor),
        }
    }
}

// SAFETY: RefCell traces its contents when not mutably borrowed
unsafe impl<T: Trace + ?Sized> Trace for RefCell<T> {
    #[inline]
    fn trace(&self, visitor: &mut dyn Visitor) {
        if let Ok(inner) = self.try_borrow() {
            inner.trace(visitor);
        }
    }
}

// SAFETY: parking_lot mutexes trace their contents under the lock
unsafe impl<T: Trace + ?Sized> Trace for parking_lot::Mutex<T> {
    #[inline]
    fn trace(&self, visitor: &mut dyn Visitor) {
        self.lock().trace(visitor);
    }
}

// SAFETY: VecDeque traces all elements
unsafe impl<T: Trace> Trace for VecDeque<T> {
    #[inline]
    fn trace(&self, visitor: &mut dyn Visitor) {
        for item in self {
            item.trace(visitor);
        }
    }
}

// SAFETY: HashMap traces keys and values
unsafe impl<K: Trace, V: Trace, S: BuildHasher> Trace for HashMap<K, V, S> {
    #[inline]
    fn trace(&self, visitor: &mut dyn Visitor) {
        for (k, v) in self {
            k.trace(visitor);
            v.trace(visitor);
        }
    }
}

// SAFETY: BTreeMap traces keys and values
unsafe impl<K: Trace, V: Trace> Trace for BTreeMap<K, V> {
    #[inline]
    fn trace(&self, visitor: &mut dyn Visitor) {
        for (k, v) in self {
            k.trace(visitor);
            v.trace(visitor);
        }
    }
}

// ============================================================================
// Trace implementations for tuples
// ============================================================================

macro_rules! impl_trace_for_tuples {
    () => {};
    ($first:ident $(, $rest:ident)*) => {
        // SAFETY: tuples trace all their elements
        unsafe impl<$first: Trace $(, $rest: Trace)*> Trace for ($first, $($rest,)*) {
            #[inline]
            #[allow(non_snake_case)]
            fn trace(&self, visitor: &mut dyn Visitor) {
                let ($first, $($rest,)*) = self;
                $first.trace(visitor);
                $($rest.trace(visitor);)*
            }
        }
        impl_trace_for_tuples!($($rest),*);
    };
}

impl_trace_for_tuples!(A, B, C, D, E, F, G, H);

// SAFETY: PhantomData holds nothing
unsafe impl<T: ?Sized> Trace for std::marker::PhantomData<T> {
    #[inline]
    fn trace(&self, _visitor: &mut dyn Visitor) {}
}
