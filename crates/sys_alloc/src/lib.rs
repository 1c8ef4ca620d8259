//! Anonymous memory mappings used as backing storage for heap blocks.
//!
//! A block is requested once and lives until the owning heap is dropped, so
//! this crate only needs three things: map a zeroed, page-aligned region,
//! report its bounds, and unmap it on drop.

use std::io;

#[cfg(unix)]
mod unix;
#[cfg(unix)]
use unix as os;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
use windows as os;

pub use os::page_size;

/// Rounds `len` up to a whole number of pages.
#[must_use]
pub fn round_to_pages(len: usize) -> usize {
    let page = page_size();
    len.div_ceil(page) * page
}

/// A handle to a memory mapped region.
///
/// The region is automatically unmapped when this handle is dropped.
pub struct Mmap {
    inner: os::MmapInner,
}

impl Mmap {
    /// Returns a pointer to the start of the memory mapping.
    ///
    /// The pointer is aligned to at least `page_size()`.
    #[must_use]
    pub fn ptr(&self) -> *mut u8 {
        self.inner.ptr()
    }

    /// Returns the length of the memory mapping in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns `true` if the mapping covers no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.len() == 0
    }

    /// Returns `true` if `addr` falls inside this mapping.
    #[must_use]
    pub fn contains(&self, addr: usize) -> bool {
        let start = self.ptr() as usize;
        addr >= start && addr < start + self.len()
    }
}

unsafe impl Send for Mmap {}
unsafe impl Sync for Mmap {}

impl std::fmt::Debug for Mmap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mmap")
            .field("ptr", &self.ptr())
            .field("len", &self.len())
            .finish()
    }
}

/// Configuration for creating a memory mapping.
#[derive(Debug, Clone)]
pub struct MmapOptions {
    len: usize,
    populate: bool,
}

impl MmapOptions {
    /// Creates a new `MmapOptions` with default settings (length 0).
    /// You must set a length before mapping.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            len: 0,
            populate: false,
        }
    }

    /// Sets the length of the mapping in bytes.
    ///
    /// The OS rounds the mapping up to whole pages; `Mmap::len` reports the
    /// length requested here.
    #[must_use]
    pub const fn len(mut self, len: usize) -> Self {
        self.len = len;
        self
    }

    /// Sets whether to pre-populate (prefault) the page tables.
    ///
    /// On Linux, this adds `MAP_POPULATE`.
    #[must_use]
    pub const fn populate(mut self, populate: bool) -> Self {
        self.populate = populate;
        self
    }

    /// Creates a zero-filled anonymous memory map.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for a zero length, or the OS error when the
    /// mapping cannot be created.
    ///
    /// # Safety
    ///
    /// The returned region is owned by `Mmap`; any raw pointer derived from
    /// `Mmap::ptr` must not be used after the `Mmap` is dropped.
    pub unsafe fn map_anon(&self) -> io::Result<Mmap> {
        if self.len == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "length must be greater than 0",
            ));
        }

        let inner = unsafe { os::MmapInner::map_anon(self.len, self.populate)? };

        Ok(Mmap { inner })
    }
}

impl Default for MmapOptions {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ptr;

    #[test]
    fn test_page_size() {
        let ps = page_size();
        assert!(ps > 0);
        assert_eq!(ps & (ps - 1), 0, "Page size should be power of 2");
    }

    #[test]
    fn test_round_to_pages() {
        let ps = page_size();
        assert_eq!(round_to_pages(1), ps);
        assert_eq!(round_to_pages(ps), ps);
        assert_eq!(round_to_pages(ps + 1), 2 * ps);
    }

    #[test]
    fn test_zero_length_rejected() {
        let err = unsafe { MmapOptions::new().map_anon() }.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_basic_map_is_zeroed_and_aligned() {
        let len = 4 * page_size();
        let mmap = unsafe {
            MmapOptions::new()
                .len(len)
                .map_anon()
                .expect("failed to map")
        };

        let ptr = mmap.ptr();
        assert!(!ptr.is_null());
        assert_eq!(ptr as usize % page_size(), 0);
        assert_eq!(mmap.len(), len);
        assert!(mmap.contains(ptr as usize));
        assert!(!mmap.contains(ptr as usize + len));

        unsafe {
            for offset in (0..len).step_by(page_size()) {
                assert_eq!(ptr::read_volatile(ptr.add(offset)), 0);
            }
            ptr::write_volatile(ptr, 42);
            assert_eq!(ptr::read_volatile(ptr), 42);
        }
    }

    #[test]
    fn test_populated_map() {
        let mmap = unsafe {
            MmapOptions::new()
                .len(page_size())
                .populate(true)
                .map_anon()
                .expect("failed to map")
        };
        unsafe {
            ptr::write_volatile(mmap.ptr().add(mmap.len() - 1), 7);
            assert_eq!(ptr::read_volatile(mmap.ptr().add(mmap.len() - 1)), 7);
        }
    }
}
