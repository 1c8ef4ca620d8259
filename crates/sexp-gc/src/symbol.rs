//! Interned symbols.
//!
//! Every distinct name is stored once, in a boxed symbol record whose
//! address (tagged `0b10`) is the symbol's [`Value`]. Records hang off an
//! intrusive bucket chain and are never collected; they are freed when the
//! table is dropped together with its heap.

use std::ptr;

use ahash::RandomState;

use crate::Value;

/// Identifies a live symbol record.
const SYMBOL_MAGIC: u32 = 0x5359_4D42;

/// Name reported by [`Heap::symbol_name`](crate::Heap::symbol_name) for
/// values that are not symbols.
pub const CORRUPT_SYMBOL: &str = "#<corrupt-symbol>";

const INITIAL_BUCKETS: usize = 64;

// Fixed seeds keep bucket placement reproducible between runs.
const SEEDS: [u64; 4] = [
    0x243f_6a88_85a3_08d3,
    0x1319_8a2e_0370_7344,
    0xa409_3822_299f_31d0,
    0x082e_fa98_ec4e_6c89,
];

#[repr(C)]
struct Symbol {
    magic: u32,
    hash: u32,
    name: Box<str>,
    next: *mut Symbol,
}

/// The interning table of one heap.
pub(crate) struct SymbolTable {
    buckets: Vec<*mut Symbol>,
    len: usize,
    hasher: RandomState,
}

// SAFETY: records are only reachable through the table, which is guarded by
// the heap's RwLock, and are immutable after insertion.
unsafe impl Send for SymbolTable {}
unsafe impl Sync for SymbolTable {}

impl SymbolTable {
    pub(crate) fn new() -> Self {
        Self {
            buckets: vec![ptr::null_mut(); INITIAL_BUCKETS],
            len: 0,
            hasher: RandomState::with_seeds(SEEDS[0], SEEDS[1], SEEDS[2], SEEDS[3]),
        }
    }

    /// Number of interned names.
    pub(crate) const fn len(&self) -> usize {
        self.len
    }

    #[cfg(test)]
    pub(crate) fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    #[allow(clippy::cast_possible_truncation)]
    fn hash(&self, name: &str) -> u32 {
        let h = self.hasher.hash_one(name);
        (h ^ (h >> 32)) as u32
    }

    #[inline]
    fn bucket(&self, hash: u32) -> usize {
        hash as usize & (self.buckets.len() - 1)
    }

    fn find(&self, name: &str, hash: u32) -> Option<Value> {
        let mut cur = self.buckets[self.bucket(hash)];
        while !cur.is_null() {
            // SAFETY: chain links point at records owned by this table
            let sym = unsafe { &*cur };
            if sym.hash == hash && &*sym.name == name {
                return Some(Value::from_symbol_addr(cur as usize));
            }
            cur = sym.next;
        }
        None
    }

    /// Looks up an existing symbol without inserting.
    pub(crate) fn lookup(&self, name: &str) -> Option<Value> {
        self.find(name, self.hash(name))
    }

    /// Returns the symbol for `name`, creating it on first use.
    pub(crate) fn intern(&mut self, name: &str) -> Value {
        let hash = self.hash(name);
        if let Some(v) = self.find(name, hash) {
            return v;
        }

        if (self.len + 1) * 2 > self.buckets.len() * 3 {
            self.grow();
        }

        let bucket = self.bucket(hash);
        let record = Box::into_raw(Box::new(Symbol {
            magic: SYMBOL_MAGIC,
            hash,
            name: name.into(),
            next: self.buckets[bucket],
        }));
        self.buckets[bucket] = record;
        self.len += 1;
        Value::from_symbol_addr(record as usize)
    }

    /// Doubles the bucket array and relinks every record.
    fn grow(&mut self) {
        let new_len = self.buckets.len() * 2;
        let old = std::mem::replace(&mut self.buckets, vec![ptr::null_mut(); new_len]);
        for mut cur in old {
            while !cur.is_null() {
                // SAFETY: records stay owned by this table while relinking
                let sym = unsafe { &mut *cur };
                let next = sym.next;
                let bucket = self.bucket(sym.hash);
                sym.next = self.buckets[bucket];
                self.buckets[bucket] = cur;
                cur = next;
            }
        }
    }
}

impl Drop for SymbolTable {
    fn drop(&mut self) {
        for &head in &self.buckets {
            let mut cur = head;
            while !cur.is_null() {
                // SAFETY: every record was created by Box::into_raw in intern
                let sym = unsafe { Box::from_raw(cur) };
                cur = sym.next;
            }
        }
    }
}

/// Returns the name of a symbol.
///
/// Total over tags: non-symbol values yield [`CORRUPT_SYMBOL`].
///
/// # Safety
///
/// A symbol-tagged `value` must come from a table that outlives `'a`.
pub(crate) unsafe fn name_of<'a>(value: Value) -> &'a str {
    if !value.is_symbol() || value.addr() == 0 {
        return CORRUPT_SYMBOL;
    }
    let sym = unsafe { &*(value.addr() as *const Symbol) };
    if sym.magic == SYMBOL_MAGIC {
        &sym.name
    } else {
        CORRUPT_SYMBOL
    }
}
