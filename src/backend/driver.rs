//! Driver entry points for device and pinned host memory
//!
//! With the `rocm` feature these wrap the HIP runtime: `hipMalloc` /
//! `hipHostMalloc` on the allocation side, the matching frees, and a
//! per-thread stream synchronize. Without the feature they serve anonymous
//! mmap regions so the allocator and its tests run on machines without a
//! GPU. The bookkeeping above this layer is identical in both
//! configurations.

use std::fmt;

/// Placement of an arena's backing region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    /// Page-locked host memory.
    Host,
    /// Memory on the device with this index. The index selects the
    /// reservoir partition; the region itself is allocated on the calling
    /// thread's current device.
    Device(i32),
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Host => write!(f, "host"),
            Location::Device(gpu) => write!(f, "device {}", gpu),
        }
    }
}

#[cfg(feature = "rocm")]
mod hip {
    use std::ffi::{c_void, CStr};

    use crate::backend::ffi;
    use crate::error::{BuddyError, BuddyResult};

    /// Get the HIP error string for a status code
    fn error_string(code: i32) -> String {
        unsafe {
            let msg = ffi::hipGetErrorString(code);
            if msg.is_null() {
                format!("unknown error {}", code)
            } else {
                CStr::from_ptr(msg).to_string_lossy().into_owned()
            }
        }
    }

    pub fn alloc_device(len: usize) -> BuddyResult<*mut c_void> {
        let mut ptr: *mut c_void = std::ptr::null_mut();
        let code = unsafe { ffi::hipMalloc(&mut ptr, len) };
        if code != ffi::HIP_SUCCESS {
            return Err(BuddyError::DriverOom {
                size: len,
                reason: format!("hipMalloc: {}", error_string(code)),
            });
        }
        if ptr.is_null() {
            return Err(BuddyError::DriverOom {
                size: len,
                reason: "hipMalloc returned null pointer".to_string(),
            });
        }
        Ok(ptr)
    }

    pub fn alloc_host_pinned(len: usize) -> BuddyResult<*mut c_void> {
        let mut ptr: *mut c_void = std::ptr::null_mut();
        let code = unsafe { ffi::hipHostMalloc(&mut ptr, len, ffi::HIP_HOST_MALLOC_DEFAULT) };
        if code != ffi::HIP_SUCCESS {
            return Err(BuddyError::DriverOom {
                size: len,
                reason: format!("hipHostMalloc: {}", error_string(code)),
            });
        }
        if ptr.is_null() {
            return Err(BuddyError::DriverOom {
                size: len,
                reason: "hipHostMalloc returned null pointer".to_string(),
            });
        }
        Ok(ptr)
    }

    /// Free device memory. A driver that is already unloading reports
    /// success so teardown during process exit stays quiet.
    pub fn free_device(ptr: *mut c_void, _len: usize) -> Result<(), String> {
        let code = unsafe { ffi::hipFree(ptr) };
        if code == ffi::HIP_SUCCESS || code == ffi::HIP_ERROR_DEINITIALIZED {
            Ok(())
        } else {
            Err(format!("hipFree: {}", error_string(code)))
        }
    }

    pub fn free_host_pinned(ptr: *mut c_void, _len: usize) -> Result<(), String> {
        let code = unsafe { ffi::hipHostFree(ptr) };
        if code == ffi::HIP_SUCCESS || code == ffi::HIP_ERROR_DEINITIALIZED {
            Ok(())
        } else {
            Err(format!("hipHostFree: {}", error_string(code)))
        }
    }

    /// Synchronize the calling thread's implicit stream. Skipped when the
    /// runtime was never initialized on this thread or is tearing down.
    pub fn sync_stream() -> Result<(), String> {
        let code = unsafe { ffi::hipStreamSynchronize(ffi::stream_per_thread()) };
        match code {
            ffi::HIP_SUCCESS | ffi::HIP_ERROR_NOT_INITIALIZED | ffi::HIP_ERROR_DEINITIALIZED => {
                Ok(())
            }
            _ => Err(format!("hipStreamSynchronize: {}", error_string(code))),
        }
    }
}

#[cfg(feature = "rocm")]
pub(crate) use hip::{alloc_device, alloc_host_pinned, free_device, free_host_pinned, sync_stream};

#[cfg(not(feature = "rocm"))]
mod portable {
    use std::ffi::c_void;

    use crate::error::{BuddyError, BuddyResult};

    // MAP_ANONYMOUS zero-initializes the region and commits pages lazily,
    // which keeps unused arena capacity virtual.
    fn map_anonymous(len: usize) -> BuddyResult<*mut c_void> {
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(BuddyError::DriverOom {
                size: len,
                reason: format!("mmap: {}", std::io::Error::last_os_error()),
            });
        }
        Ok(ptr)
    }

    fn unmap(ptr: *mut c_void, len: usize) -> Result<(), String> {
        let rc = unsafe { libc::munmap(ptr, len) };
        if rc != 0 {
            Err(format!("munmap: {}", std::io::Error::last_os_error()))
        } else {
            Ok(())
        }
    }

    pub fn alloc_device(len: usize) -> BuddyResult<*mut c_void> {
        map_anonymous(len)
    }

    pub fn alloc_host_pinned(len: usize) -> BuddyResult<*mut c_void> {
        map_anonymous(len)
    }

    pub fn free_device(ptr: *mut c_void, len: usize) -> Result<(), String> {
        unmap(ptr, len)
    }

    pub fn free_host_pinned(ptr: *mut c_void, len: usize) -> Result<(), String> {
        unmap(ptr, len)
    }

    pub fn sync_stream() -> Result<(), String> {
        Ok(())
    }
}

#[cfg(not(feature = "rocm"))]
pub(crate) use portable::{
    alloc_device, alloc_host_pinned, free_device, free_host_pinned, sync_stream,
};
