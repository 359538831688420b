//! RAII wrapper for one driver allocation

use std::ffi::c_void;

use crate::backend::driver::{self, Location};
use crate::error::BuddyResult;

// SAFETY: RegionMemory is Send+Sync because it only carries a raw pointer
// to a region it exclusively owns; all access to the region's contents is
// synchronized by the arena that holds it.
unsafe impl Send for RegionMemory {}
unsafe impl Sync for RegionMemory {}

/// A single contiguous region obtained from the driver, released through
/// the matching driver free on drop.
#[derive(Debug)]
pub(crate) struct RegionMemory {
    ptr: *mut c_void,
    len: usize,
    location: Location,
}

impl RegionMemory {
    pub(crate) fn allocate(location: Location, len: usize) -> BuddyResult<Self> {
        let ptr = match location {
            Location::Host => driver::alloc_host_pinned(len)?,
            Location::Device(_) => driver::alloc_device(len)?,
        };
        tracing::debug!("allocated {} byte {} region at {:?}", len, location, ptr);
        Ok(RegionMemory { ptr, len, location })
    }

    pub(crate) fn as_ptr(&self) -> *mut c_void {
        self.ptr
    }

    /// Base address as an integer, for offset and alignment arithmetic.
    pub(crate) fn addr(&self) -> usize {
        self.ptr as usize
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn location(&self) -> Location {
        self.location
    }
}

impl Drop for RegionMemory {
    fn drop(&mut self) {
        if self.ptr.is_null() {
            return;
        }
        let result = match self.location {
            Location::Host => driver::free_host_pinned(self.ptr, self.len),
            Location::Device(_) => driver::free_device(self.ptr, self.len),
        };
        if let Err(reason) = result {
            // Driver contract: a failed release leaves the process in an
            // undefined state.
            tracing::error!("releasing {} region failed: {}", self.location, reason);
            std::process::abort();
        }
    }
}
