//! Chunked Block allocator with embedded mark bytes.
//!
//! # Layout
//!
//! A Block is one anonymous mapping split into Chunks of [`CHUNK_SIZE`]
//! bytes, each aligned to its own size. A Chunk holds [`CHUNK_SLOTS`] slots
//! of [`SLOT_SIZE`] bytes. Slots `0` and `1` are not handed out: their bytes
//! are the mark bytes of the Chunk, one per slot, so the mark byte of the
//! slot at `addr` is found without any lookup:
//!
//! ```text
//! chunk = addr & !CHUNK_MASK
//! index = (addr - chunk) / SLOT_SIZE
//! mark  = chunk + index
//! ```
//!
//! A free slot stores the address of the next free slot in its first word.
//! The free list is rebuilt from scratch by every sweep.

use std::alloc::{handle_alloc_error, Layout};
use std::mem::{align_of, size_of};
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};

use sys_alloc::{Mmap, MmapOptions};

use crate::config::HeapConfig;
use crate::object::GcObject;

/// Size of one slot: two machine words.
pub const SLOT_SIZE: usize = 2 * size_of::<usize>();

/// Slots per Chunk, including the two reserved for mark bytes.
pub const CHUNK_SLOTS: usize = 2 * SLOT_SIZE;

/// Size and alignment of a Chunk.
pub const CHUNK_SIZE: usize = CHUNK_SLOTS * SLOT_SIZE;

/// Mask of the in-chunk offset bits.
pub const CHUNK_MASK: usize = CHUNK_SIZE - 1;

/// First slot index handed out by the allocator.
pub const FIRST_SLOT: usize = 2;

/// Usable slots per Chunk.
pub const USABLE_SLOTS: usize = CHUNK_SLOTS - FIRST_SLOT;

/// Mark byte flag: reached during the current mark phase.
pub const MARKED: u8 = 0b01;

/// Mark byte flag: the slot holds a live pair or object.
pub const ALLOCATED: u8 = 0b10;

const _: () = assert!(size_of::<[AtomicUsize; 2]>() <= SLOT_SIZE);
const _: () = assert!(size_of::<Box<dyn GcObject>>() <= SLOT_SIZE);
const _: () = assert!(align_of::<Box<dyn GcObject>>() <= SLOT_SIZE);
const _: () = assert!(CHUNK_SLOTS <= FIRST_SLOT * SLOT_SIZE);

/// Which kind of value a [`Space`] holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SlotKind {
    /// Two-word pairs.
    Pair,
    /// Boxed `dyn GcObject`s.
    Object,
}

/// Address of the mark byte for the slot at `addr`.
#[inline]
pub(crate) const fn mark_byte_addr(addr: usize) -> usize {
    let chunk = addr & !CHUNK_MASK;
    chunk + (addr - chunk) / SLOT_SIZE
}

/// Returns `true` if `addr` is slot-aligned and past a Chunk's mark bytes.
#[inline]
pub(crate) const fn is_slot_addr(addr: usize) -> bool {
    addr != 0 && addr % SLOT_SIZE == 0 && (addr & CHUNK_MASK) >= FIRST_SLOT * SLOT_SIZE
}

/// Reads the mark byte of the slot at `addr`.
///
/// # Safety
///
/// `addr` must be a slot address inside a live Block.
#[inline]
pub(crate) unsafe fn mark_byte(addr: usize) -> u8 {
    unsafe { ptr::read(mark_byte_addr(addr) as *const u8) }
}

/// Writes the mark byte of the slot at `addr`.
///
/// # Safety
///
/// `addr` must be a slot address inside a live Block, and the heap lock must
/// be held.
#[inline]
pub(crate) unsafe fn set_mark_byte(addr: usize, byte: u8) {
    unsafe { ptr::write(mark_byte_addr(addr) as *mut u8, byte) }
}

/// The `head` and `tail` words of the pair at `addr`.
///
/// # Safety
///
/// `addr` must be an allocated pair slot.
#[inline]
pub(crate) unsafe fn pair_cells<'a>(addr: usize) -> &'a [AtomicUsize; 2] {
    unsafe { &*(addr as *const [AtomicUsize; 2]) }
}

/// The object stored at `addr`.
///
/// # Safety
///
/// `addr` must be an allocated object slot, and the returned reference must
/// not outlive the object.
#[inline]
pub(crate) unsafe fn object_ref<'a>(addr: usize) -> &'a dyn GcObject {
    unsafe { &**(addr as *const Box<dyn GcObject>) }
}

/// Moves `object` into the slot at `addr`.
///
/// # Safety
///
/// `addr` must be a freshly popped object slot.
#[inline]
pub(crate) unsafe fn write_object(addr: usize, object: Box<dyn GcObject>) {
    unsafe { ptr::write(addr as *mut Box<dyn GcObject>, object) }
}

/// Moves the object out of the slot at `addr`.
///
/// # Safety
///
/// `addr` must be an allocated object slot; the slot must not be read as an
/// object again.
#[inline]
unsafe fn take_object(addr: usize) -> Box<dyn GcObject> {
    unsafe { ptr::read(addr as *const Box<dyn GcObject>) }
}

#[inline]
unsafe fn link_word<'a>(addr: usize) -> &'a AtomicUsize {
    unsafe { &*(addr as *const AtomicUsize) }
}

/// One anonymous mapping of contiguous Chunks.
pub(crate) struct Block {
    map: Mmap,
    chunks: usize,
}

impl Block {
    /// Maps a Block of at least `chunks` Chunks. Failure is fatal.
    fn map(chunks: usize, populate: bool) -> Self {
        let bytes = sys_alloc::round_to_pages(chunks.saturating_mul(CHUNK_SIZE));
        let result = unsafe { MmapOptions::new().len(bytes).populate(populate).map_anon() };
        let map = match result {
            Ok(map) => map,
            Err(err) => {
                #[cfg(feature = "tracing")]
                tracing::error!(bytes, error = %err, "block mapping failed");
                #[cfg(not(feature = "tracing"))]
                let _ = err;
                let layout = Layout::from_size_align(bytes.max(CHUNK_SIZE), CHUNK_SIZE)
                    .unwrap_or_else(|_| Layout::new::<[usize; 2]>());
                handle_alloc_error(layout);
            }
        };
        debug_assert!(!map.is_empty());
        debug_assert_eq!(map.ptr() as usize & CHUNK_MASK, 0);
        Self {
            chunks: map.len() / CHUNK_SIZE,
            map,
        }
    }

    #[inline]
    fn base(&self) -> usize {
        self.map.ptr() as usize
    }

    /// Number of Chunks in this Block.
    pub(crate) const fn chunks(&self) -> usize {
        self.chunks
    }

    /// Usable slot count.
    pub(crate) const fn slots(&self) -> usize {
        self.chunks * USABLE_SLOTS
    }

    pub(crate) fn contains(&self, addr: usize) -> bool {
        self.map.contains(addr)
    }

    /// Usable slot addresses in ascending order.
    fn slot_addrs(&self) -> impl DoubleEndedIterator<Item = usize> {
        let base = self.base();
        (0..self.chunks).flat_map(move |c| {
            let chunk = base + c * CHUNK_SIZE;
            (FIRST_SLOT..CHUNK_SLOTS).map(move |i| chunk + i * SLOT_SIZE)
        })
    }

    /// Clears `MARKED` on every mark byte of the Block.
    fn clear_marks(&self) {
        let base = self.base();
        for c in 0..self.chunks {
            let marks = (base + c * CHUNK_SIZE) as *mut u8;
            for i in FIRST_SLOT..CHUNK_SLOTS {
                // SAFETY: the first 2 * SLOT_SIZE bytes of each Chunk are mark bytes
                unsafe {
                    let byte = marks.add(i);
                    *byte &= !MARKED;
                }
            }
        }
    }
}

/// Per-kind slot allocator: Blocks, the free list and slot counts.
pub(crate) struct Space {
    kind: SlotKind,
    blocks: Vec<Block>,
    free_list: usize,
    total: usize,
    free: usize,
    next_block_chunks: usize,
}

impl Space {
    pub(crate) const fn new(kind: SlotKind, config: &HeapConfig) -> Self {
        Self {
            kind,
            blocks: Vec::new(),
            free_list: 0,
            total: 0,
            free: 0,
            next_block_chunks: config.first_block_chunks(),
        }
    }

    /// Total usable slots across all Blocks.
    pub(crate) const fn total(&self) -> usize {
        self.total
    }

    /// Slots currently on the free list.
    pub(crate) const fn free(&self) -> usize {
        self.free
    }

    pub(crate) fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Returns `true` if `addr` is a slot inside one of this space's Blocks.
    pub(crate) fn owns(&self, addr: usize) -> bool {
        is_slot_addr(addr) && self.blocks.iter().any(|b| b.contains(addr))
    }

    /// Pops a slot off the free list and flags it `ALLOCATED`.
    pub(crate) fn pop(&mut self) -> Option<usize> {
        if self.free_list == 0 {
            return None;
        }
        let addr = self.free_list;
        // SAFETY: free-list entries are free slots inside our Blocks
        unsafe {
            self.free_list = link_word(addr).load(Ordering::Relaxed);
            set_mark_byte(addr, ALLOCATED);
        }
        self.free -= 1;
        Some(addr)
    }

    /// Maps the next Block and threads its slots onto the free list.
    pub(crate) fn grow(&mut self, config: &HeapConfig) {
        let block = Block::map(self.next_block_chunks, config.populate);
        self.next_block_chunks = config.next_block_chunks(block.chunks());

        for addr in block.slot_addrs().rev() {
            // SAFETY: fresh, zeroed slots of the new Block
            unsafe {
                set_mark_byte(addr, 0);
                link_word(addr).store(self.free_list, Ordering::Relaxed);
            }
            self.free_list = addr;
        }
        self.total += block.slots();
        self.free += block.slots();

        #[cfg(feature = "tracing")]
        tracing::debug!(
            kind = ?self.kind,
            chunks = block.chunks(),
            total = self.total,
            "block_mapped"
        );

        self.blocks.push(block);
    }

    /// Clears `MARKED` on every slot.
    pub(crate) fn clear_marks(&self) {
        for block in &self.blocks {
            block.clear_marks();
        }
    }

    /// Reclaims every allocated, unmarked slot and rebuilds the free list.
    ///
    /// Object slots have their box moved into `dead`; the caller destroys
    /// them after releasing the heap lock. Returns the reclaimed count.
    pub(crate) fn sweep(&mut self, dead: &mut Vec<Box<dyn GcObject>>) -> usize {
        let mut free_list = 0;
        let mut free = 0;
        let mut reclaimed = 0;

        for block in self.blocks.iter().rev() {
            for addr in block.slot_addrs().rev() {
                // SAFETY: every slot address of a live Block is valid, and the
                // heap lock is held for the whole sweep
                unsafe {
                    let byte = mark_byte(addr);
                    if byte & ALLOCATED != 0 {
                        if byte & MARKED != 0 {
                            continue;
                        }
                        if self.kind == SlotKind::Object {
                            dead.push(take_object(addr));
                        }
                        reclaimed += 1;
                    }
                    set_mark_byte(addr, 0);
                    link_word(addr).store(free_list, Ordering::Relaxed);
                }
                free_list = addr;
                free += 1;
            }
        }

        self.free_list = free_list;
        self.free = free;
        reclaimed
    }

    /// Moves every allocated object out of this space. Used on heap teardown.
    pub(crate) fn drain_objects(&mut self, dead: &mut Vec<Box<dyn GcObject>>) {
        if self.kind != SlotKind::Object {
            return;
        }
        for block in &self.blocks {
            for addr in block.slot_addrs() {
                // SAFETY: slots flagged ALLOCATED hold a box written by make_object
                unsafe {
                    if mark_byte(addr) & ALLOCATED != 0 {
                        dead.push(take_object(addr));
                        set_mark_byte(addr, 0);
                    }
                }
            }
        }
        self.free_list = 0;
        self.free = 0;
    }
}
