//! HIP FFI bindings
//!
//! FFI declarations below are bound to the ROCm HIP runtime API. All
//! functions are actively used through the wrappers in `backend::driver`.
//! The dead_code allowance is needed because FFI symbols appear unused to
//! the compiler (they're only called through unsafe blocks).

use std::ffi::{c_char, c_void};

#[link(name = "amdhip64")]
#[allow(dead_code)]
extern "C" {
    pub fn hipMalloc(ptr: *mut *mut c_void, size: usize) -> i32;
    pub fn hipFree(ptr: *mut c_void) -> i32;
    pub fn hipHostMalloc(ptr: *mut *mut c_void, size: usize, flags: u32) -> i32;
    pub fn hipHostFree(ptr: *mut c_void) -> i32;
    pub fn hipStreamSynchronize(stream: *mut c_void) -> i32;
    pub fn hipGetErrorString(error: i32) -> *const c_char;
}

/// HIP success code
pub const HIP_SUCCESS: i32 = 0;

/// The HIP runtime has not been initialized on this thread
pub const HIP_ERROR_NOT_INITIALIZED: i32 = 3;

/// The HIP runtime is shutting down (driver unloading)
pub const HIP_ERROR_DEINITIALIZED: i32 = 4;

/// Default flags for `hipHostMalloc` (portable pinned memory)
pub const HIP_HOST_MALLOC_DEFAULT: u32 = 0;

/// Handle selecting the calling thread's implicit stream
/// (`hipStreamPerThread` in the HIP headers).
pub fn stream_per_thread() -> *mut c_void {
    2usize as *mut c_void
}
