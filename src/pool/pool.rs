//! Per-caller allocation front-end

use std::ffi::c_void;
use std::ptr::NonNull;
use std::sync::{Arc, PoisonError, RwLock};

use crate::backend::Location;
use crate::buddy::Arena;
use crate::error::{BuddyError, BuddyResult};
use crate::pool::reservoir::Reservoir;
use crate::pool::{ARENA_LEVEL, MAX_DEVICES};

/// A pool owns a private list of arenas for one location and serves
/// allocations from them, growing from the reservoir on shortfall.
///
/// Pools are cheap to create and are typically short-lived (one per worker
/// or per phase); dropping a pool returns its empty arenas to the
/// reservoir so the next pool skips the driver entirely.
///
/// # Example
///
/// ```rust,ignore
/// use hipbuddy::Pool;
///
/// Pool::set_host_pool_size(30); // 1 GiB host budget
/// let pool = Pool::new(-1)?;    // negative index selects host memory
/// let ptr = pool.alloc(1 << 20).expect("budget allows one arena");
/// assert!(pool.free(ptr.as_ptr()));
/// # Ok::<(), hipbuddy::BuddyError>(())
/// ```
#[derive(Debug)]
pub struct Pool {
    target: Location,
    local: RwLock<Vec<Arena>>,
    reservoir: Arc<Reservoir>,
}

fn location_for(gpu: i32) -> BuddyResult<Location> {
    if gpu < 0 {
        Ok(Location::Host)
    } else if (gpu as usize) < MAX_DEVICES {
        Ok(Location::Device(gpu))
    } else {
        Err(BuddyError::InvalidDevice(gpu))
    }
}

impl Pool {
    /// Create a pool bound to the process-wide reservoir. A negative
    /// `gpu` selects pinned host memory; `0..MAX_DEVICES` selects that
    /// device's memory.
    ///
    /// # Errors
    ///
    /// [`BuddyError::InvalidDevice`] if `gpu >= MAX_DEVICES`.
    pub fn new(gpu: i32) -> BuddyResult<Self> {
        Pool::with_reservoir(gpu, Reservoir::global())
    }

    /// Create a pool drawing arenas from a caller-supplied reservoir
    /// instead of the process-wide one.
    pub fn with_reservoir(gpu: i32, reservoir: Arc<Reservoir>) -> BuddyResult<Self> {
        Ok(Pool {
            target: location_for(gpu)?,
            local: RwLock::new(Vec::new()),
            reservoir,
        })
    }

    /// Allocate `size` bytes with no alignment constraint.
    pub fn alloc(&self, size: usize) -> Option<NonNull<c_void>> {
        self.alloc_aligned(size, 1)
    }

    /// Allocate `size` bytes at an address divisible by `alignment`.
    ///
    /// Scans the local arenas first; on a miss, pulls another arena from
    /// the reservoir and rescans. Returns `None` when the request exceeds
    /// a single arena, the location's budget is unconfigured or
    /// exhausted, or the driver is out of memory.
    pub fn alloc_aligned(&self, size: usize, alignment: usize) -> Option<NonNull<c_void>> {
        if size > 1usize << ARENA_LEVEL {
            tracing::warn!("allocation of {} bytes exceeds a single arena", size);
            return None;
        }
        if self.reservoir.level_max(self.target) == 0 {
            tracing::warn!("{} pool size not configured, rejecting allocation", self.target);
            return None;
        }

        loop {
            // Scan under the shared lock so sibling threads allocate
            // concurrently; the reservoir call below must not hold it.
            let seen = {
                let local = self.local.read().unwrap_or_else(PoisonError::into_inner);
                for arena in local.iter() {
                    if let Some(ptr) = arena.alloc_aligned(size, alignment) {
                        return Some(ptr);
                    }
                }
                local.len()
            };

            match self.reservoir.get_block(self.target) {
                Some(arena) => {
                    let mut local = self.local.write().unwrap_or_else(PoisonError::into_inner);
                    local.push(arena);
                }
                None => {
                    let local = self.local.read().unwrap_or_else(PoisonError::into_inner);
                    if local.len() <= seen {
                        return None;
                    }
                    // Another thread attached an arena while we were at
                    // the reservoir; rescan.
                }
            }
        }
    }

    /// Release a pointer previously returned by this pool's alloc.
    /// Returns whether some local arena accepted it.
    pub fn free(&self, ptr: *mut c_void) -> bool {
        let local = self.local.read().unwrap_or_else(PoisonError::into_inner);
        local.iter().any(|arena| arena.free(ptr))
    }

    /// Whether every local arena is empty.
    pub fn is_empty(&self) -> bool {
        let local = self.local.read().unwrap_or_else(PoisonError::into_inner);
        local.iter().all(Arena::is_empty)
    }

    /// Number of arenas currently attached to this pool.
    pub fn arena_count(&self) -> usize {
        self.local.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn target(&self) -> Location {
        self.target
    }

    /// Configure the process-wide device budget: `2^level` bytes per
    /// device index, never less than one arena.
    pub fn set_device_pool_size(level: u8) {
        Reservoir::global().set_device_level_max(level);
    }

    /// Configure the process-wide host budget: `2^level` bytes.
    pub fn set_host_pool_size(level: u8) {
        Reservoir::global().set_host_level_max(level);
    }

    /// Destroy the process-wide reservoir's cached arenas for a location.
    ///
    /// # Errors
    ///
    /// [`BuddyError::InvalidDevice`] if `gpu >= MAX_DEVICES`.
    pub fn release_global_pool(gpu: i32) -> BuddyResult<()> {
        Reservoir::global().clear(location_for(gpu)?);
        Ok(())
    }

    /// Drain on drop: empty arenas go back to the reservoir for reuse.
    /// Arenas that still hold live allocations are leaked (they stay
    /// charged against the location's cap) rather than freed out from
    /// under their users.
    fn release(&self) {
        let mut local = self.local.write().unwrap_or_else(PoisonError::into_inner);
        if local.is_empty() {
            return;
        }
        // One synchronize covers every arena; the per-thread stream is
        // shared across them.
        local[0].sync();

        let mut leaked = 0usize;
        for arena in local.drain(..) {
            if arena.is_empty() {
                self.reservoir.return_block(arena);
            } else {
                leaked += 1;
                std::mem::forget(arena);
            }
        }
        if leaked > 0 {
            tracing::warn!(
                "dropping {} pool with {} non-empty arenas, leaking their memory",
                self.target,
                leaked
            );
        }
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        self.release();
    }
}
