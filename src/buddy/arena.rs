//! Buddy arena over a single driver region
//!
//! An arena owns one contiguous `2^L` byte region of device or pinned host
//! memory plus the buddy tree that tracks which sub-ranges are live. Arenas
//! hand out raw pointers; they never touch the region's contents.

use std::ffi::c_void;
use std::ptr::NonNull;
use std::sync::{PoisonError, RwLock};

use crate::backend::driver;
use crate::backend::{Location, RegionMemory};
use crate::buddy::tree::{self, BuddyTree};
use crate::error::{BuddyError, BuddyResult};

/// A `2^L` byte region managed by a buddy tree.
///
/// Allocation and free take the arena's lock exclusively; `contains` is
/// lock-free (base and length are immutable after construction) and
/// `is_empty` takes a shared view.
///
/// # Example
///
/// ```rust,ignore
/// use hipbuddy::{Arena, Location};
///
/// let arena = Arena::new(20, Location::Host)?; // 1 MiB of pinned memory
/// let ptr = arena.alloc(4096).expect("arena is empty");
/// assert!(arena.contains(ptr.as_ptr()));
/// assert!(arena.free(ptr.as_ptr()));
/// assert!(arena.is_empty());
/// # Ok::<(), hipbuddy::BuddyError>(())
/// ```
#[derive(Debug)]
pub struct Arena {
    level_max: u8,
    region: RegionMemory,
    state: RwLock<BuddyTree>,
}

impl Arena {
    /// Create an arena of `2^level_max` bytes at the given location.
    ///
    /// # Errors
    ///
    /// - [`BuddyError::LevelOutOfRange`] if `level_max` is not in `1..=32`
    /// - [`BuddyError::DriverOom`] if the driver cannot back the region
    pub fn new(level_max: u8, location: Location) -> BuddyResult<Self> {
        if !(tree::MIN_LEVEL..=tree::MAX_LEVEL).contains(&level_max) {
            return Err(BuddyError::LevelOutOfRange(level_max));
        }
        let state = RwLock::new(BuddyTree::new(level_max));
        let region = RegionMemory::allocate(location, 1usize << level_max)?;
        Ok(Arena {
            level_max,
            region,
            state,
        })
    }

    /// Allocate `size` bytes with no alignment constraint.
    pub fn alloc(&self, size: usize) -> Option<NonNull<c_void>> {
        self.alloc_aligned(size, 1)
    }

    /// Allocate `size` bytes at an address divisible by `alignment`.
    ///
    /// The request is rounded up to the next power of two (inflated by
    /// `alignment - 1` first when `alignment > 1`), and the lowest-address
    /// free block of that size is claimed. Returns `None` when no block
    /// fits.
    pub fn alloc_aligned(&self, size: usize, alignment: usize) -> Option<NonNull<c_void>> {
        let offset = self
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .allocate(size, alignment, self.region.addr())?;
        NonNull::new(unsafe { (self.region.as_ptr() as *mut u8).add(offset) } as *mut c_void)
    }

    /// Release a pointer previously returned by this arena's alloc.
    ///
    /// A null pointer is accepted silently. Returns `false` for pointers
    /// outside the arena (the caller may be probing several arenas), for
    /// pointers that are not live, and for addresses that don't match the
    /// block the caller was handed.
    pub fn free(&self, ptr: *mut c_void) -> bool {
        if ptr.is_null() {
            return true;
        }
        if !self.contains(ptr) {
            return false;
        }
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .release(ptr as usize - self.region.addr())
    }

    /// Whether `ptr` lies inside this arena's byte range.
    pub fn contains(&self, ptr: *const c_void) -> bool {
        let addr = ptr as usize;
        addr >= self.region.addr() && addr < self.region.addr() + self.capacity()
    }

    /// Whether no block is currently live.
    pub fn is_empty(&self) -> bool {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    /// Bytes currently claimed, at block (power-of-two) granularity.
    pub fn used_bytes(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .used_bytes()
    }

    /// Total arena capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.region.len()
    }

    pub fn level_max(&self) -> u8 {
        self.level_max
    }

    pub fn location(&self) -> Location {
        self.region.location()
    }

    /// Wait for the calling thread's device stream to drain, so kernels
    /// still using this arena's memory complete before the region is
    /// reused or released. No-op for host arenas.
    pub fn sync(&self) {
        if let Location::Device(_) = self.region.location() {
            if let Err(reason) = driver::sync_stream() {
                tracing::error!("stream synchronize failed: {}", reason);
                std::process::abort();
            }
        }
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        // Outstanding kernels may still touch the region; the stream must
        // drain before the driver reclaims it.
        self.sync();
    }
}
