//! Boxed object kinds stored in object slots.
//!
//! An object slot owns one `Box<dyn GcObject>`. The collector calls
//! [`GcObject::mark`] while marking and [`GcObject::destroy`] once the object
//! has become unreachable.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::trace::{Trace, Visitor};
use crate::Value;

/// A heap object kind.
///
/// Implement [`Trace`] (usually with `#[derive(Trace)]`) to report held
/// values, then override the optional views as needed.
///
/// # Examples
///
/// ```
/// use sexp_gc::{GcObject, Heap, Trace, Value};
///
/// #[derive(Trace)]
/// struct Closure {
///     params: Value,
///     body: Value,
/// }
///
/// impl GcObject for Closure {}
///
/// let heap = Heap::new();
/// let body = heap.cons(Value::from_int(1), Value::EMPTY);
/// let obj = heap.make_object(Box::new(Closure { params: Value::EMPTY, body }));
/// assert_eq!(heap.as_object(obj).map(|o| o.type_name().ends_with("Closure")), Some(true));
/// ```
pub trait GcObject: Trace + Send + Sync + 'static {
    /// Reports every value this object holds. Defaults to [`Trace::trace`].
    fn mark(&self, visitor: &mut dyn Visitor) {
        self.trace(visitor);
    }

    /// Releases the object. Called exactly once, after the object became
    /// unreachable and outside the heap lock. Defaults to an ordinary drop.
    fn destroy(self: Box<Self>) {}

    /// A string view, if this object is string-like.
    fn as_str(&self) -> Option<&str> {
        None
    }

    /// A numeric view, if this object is number-like.
    fn as_number(&self) -> Option<f64> {
        None
    }

    /// The object's kind name, used in debug output.
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

impl fmt::Debug for dyn GcObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GcObject")
            .field("type", &self.type_name())
            .finish_non_exhaustive()
    }
}

/// Built-in boxed string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcString(pub String);

// SAFETY: holds no values
unsafe impl Trace for GcString {
    #[inline]
    fn trace(&self, _visitor: &mut dyn Visitor) {}
}

impl GcObject for GcString {
    fn as_str(&self) -> Option<&str> {
        Some(&self.0)
    }

    fn type_name(&self) -> &'static str {
        "string"
    }
}

/// Built-in boxed floating-point number.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GcNumber(pub f64);

// SAFETY: holds no values
unsafe impl Trace for GcNumber {
    #[inline]
    fn trace(&self, _visitor: &mut dyn Visitor) {}
}

impl GcObject for GcNumber {
    fn as_number(&self) -> Option<f64> {
        Some(self.0)
    }

    fn type_name(&self) -> &'static str {
        "number"
    }
}

/// A mutable `Value` slot for use inside objects.
///
/// Objects are shared between threads, so a field that changes after
/// construction needs interior mutability. `ValueCell` stores the value
/// word atomically and reports it when traced.
#[derive(Default)]
pub struct ValueCell(AtomicUsize);

impl ValueCell {
    /// Creates a cell holding `value`.
    #[must_use]
    pub const fn new(value: Value) -> Self {
        Self(AtomicUsize::new(value.bits()))
    }

    /// Reads the current value.
    #[must_use]
    pub fn get(&self) -> Value {
        Value::from_bits(self.0.load(Ordering::Acquire))
    }

    /// Replaces the current value.
    ///
    /// The old value is no longer reported by this cell; protect it first if
    /// it must outlive the next allocation.
    pub fn set(&self, value: Value) {
        self.0.store(value.bits(), Ordering::Release);
    }

    /// Replaces the current value, returning the old one.
    pub fn replace(&self, value: Value) -> Value {
        Value::from_bits(self.0.swap(value.bits(), Ordering::AcqRel))
    }
}

impl fmt::Debug for ValueCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ValueCell").field(&self.get()).finish()
    }
}

// SAFETY: reports the current value
unsafe impl Trace for ValueCell {
    #[inline]
    fn trace(&self, visitor: &mut dyn Visitor) {
        visitor.visit(self.get());
    }
}
