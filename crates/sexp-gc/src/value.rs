//! Tagged machine-word values.
//!
//! A [`Value`] is one `usize` whose two low bits select its interpretation:
//!
//! | Tag    | Payload                                                   |
//! |--------|-----------------------------------------------------------|
//! | `0b11` | signed integer, shifted left by two                       |
//! | `0b10` | address of an interned symbol record                      |
//! | `0b01` | address of a heap slot holding a boxed object             |
//! | `0b00` | `0` for the empty list, otherwise the address of a pair    |
//!
//! This module is the only place that manipulates tag bits. Every predicate
//! is total over arbitrary bit patterns and never touches memory.

use std::fmt;

const TAG_MASK: usize = 0b11;
const TAG_PAIR: usize = 0b00;
const TAG_OBJECT: usize = 0b01;
const TAG_SYMBOL: usize = 0b10;
const TAG_NUMBER: usize = 0b11;

/// Number of low bits reserved for the tag.
pub const TAG_BITS: u32 = 2;

/// A tagged value: an integer, a symbol, a pair, an object or the empty list.
///
/// `Value` is a plain `Copy` word. Copying it does not keep the referenced
/// pair or object alive; hold a [`RootHandle`](crate::RootHandle) across any
/// call that may allocate.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct Value(usize);

/// The decoded shape of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// An immediate integer.
    Number,
    /// An interned symbol.
    Symbol,
    /// A boxed object.
    Object,
    /// A pair.
    Pair,
    /// The canonical empty list.
    Empty,
}

impl Value {
    /// The canonical empty list.
    pub const EMPTY: Self = Self(0);

    /// Largest integer representable as an immediate.
    pub const MAX_INT: isize = isize::MAX >> TAG_BITS;

    /// Smallest integer representable as an immediate.
    pub const MIN_INT: isize = isize::MIN >> TAG_BITS;

    /// Encodes an immediate integer.
    ///
    /// `i` must lie in `[Value::MIN_INT, Value::MAX_INT]`. The range is only
    /// checked in debug builds; out-of-range input loses its top bits.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub const fn from_int(i: isize) -> Self {
        debug_assert!(i >= Self::MIN_INT && i <= Self::MAX_INT);
        Self((i.wrapping_shl(TAG_BITS) as usize) | TAG_NUMBER)
    }

    /// Encodes an immediate integer, or `None` if `i` is out of range.
    #[inline]
    #[must_use]
    pub const fn try_from_int(i: isize) -> Option<Self> {
        if i >= Self::MIN_INT && i <= Self::MAX_INT {
            Some(Self::from_int(i))
        } else {
            None
        }
    }

    /// Decodes an immediate integer. Meaningless unless [`is_number`](Self::is_number).
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub const fn to_int(self) -> isize {
        (self.0 as isize) >> TAG_BITS
    }

    /// Decodes an immediate integer if this value is one.
    #[inline]
    #[must_use]
    pub const fn as_int(self) -> Option<isize> {
        if self.is_number() {
            Some(self.to_int())
        } else {
            None
        }
    }

    /// Returns `true` for immediate integers.
    #[inline]
    #[must_use]
    pub const fn is_number(self) -> bool {
        self.0 & TAG_MASK == TAG_NUMBER
    }

    /// Returns `true` for interned symbols.
    #[inline]
    #[must_use]
    pub const fn is_symbol(self) -> bool {
        self.0 & TAG_MASK == TAG_SYMBOL
    }

    /// Returns `true` for boxed objects.
    #[inline]
    #[must_use]
    pub const fn is_object(self) -> bool {
        self.0 & TAG_MASK == TAG_OBJECT
    }

    /// Returns `true` for pairs (the empty list is not a pair).
    #[inline]
    #[must_use]
    pub const fn is_pair(self) -> bool {
        (self.0 & TAG_MASK == TAG_PAIR) & (self.0 != 0)
    }

    /// Returns `true` for pairs and the empty list.
    #[inline]
    #[must_use]
    pub const fn is_list(self) -> bool {
        self.0 & TAG_MASK == TAG_PAIR
    }

    /// Returns `true` for the canonical empty list.
    #[inline]
    #[must_use]
    pub const fn is_empty_list(self) -> bool {
        self.0 == 0
    }

    /// Returns `true` if the value refers to a collected heap slot.
    #[inline]
    #[must_use]
    pub const fn is_heap(self) -> bool {
        self.is_pair() | self.is_object()
    }

    /// Decodes the tag.
    #[must_use]
    pub const fn kind(self) -> ValueKind {
        match self.0 & TAG_MASK {
            TAG_NUMBER => ValueKind::Number,
            TAG_SYMBOL => ValueKind::Symbol,
            TAG_OBJECT => ValueKind::Object,
            _ if self.0 == 0 => ValueKind::Empty,
            _ => ValueKind::Pair,
        }
    }

    /// The raw machine word.
    #[inline]
    #[must_use]
    pub const fn bits(self) -> usize {
        self.0
    }

    #[inline]
    pub(crate) const fn from_bits(bits: usize) -> Self {
        Self(bits)
    }

    /// The payload address with the tag stripped.
    #[inline]
    pub(crate) const fn addr(self) -> usize {
        self.0 & !TAG_MASK
    }

    #[inline]
    pub(crate) fn from_pair_addr(addr: usize) -> Self {
        debug_assert!(addr != 0 && addr & TAG_MASK == 0);
        Self(addr | TAG_PAIR)
    }

    #[inline]
    pub(crate) fn from_object_addr(addr: usize) -> Self {
        debug_assert!(addr & TAG_MASK == 0);
        Self(addr | TAG_OBJECT)
    }

    #[inline]
    pub(crate) fn from_symbol_addr(addr: usize) -> Self {
        debug_assert!(addr & TAG_MASK == 0);
        Self(addr | TAG_SYMBOL)
    }
}

/// Encodes an immediate integer; see [`Value::from_int`].
#[inline]
#[must_use]
pub const fn make_number(i: isize) -> Value {
    Value::from_int(i)
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::from_int(i as isize)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            ValueKind::Number => write!(f, "Number({})", self.to_int()),
            ValueKind::Symbol => write!(f, "Symbol({:#x})", self.addr()),
            ValueKind::Object => write!(f, "Object({:#x})", self.addr()),
            ValueKind::Pair => write!(f, "Pair({:#x})", self.addr()),
            ValueKind::Empty => f.write_str("Empty"),
        }
    }
}
