//! Memory driver backend
//!
//! The driver is an opaque set of entry points: allocate/free for device
//! memory and for page-locked host memory, plus a per-thread stream
//! synchronize. The `rocm` feature binds them to the HIP runtime.

#[cfg(feature = "rocm")]
pub mod ffi;

pub mod driver;
pub(crate) mod memory;

pub use driver::Location;
pub(crate) use memory::RegionMemory;
