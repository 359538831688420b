//! Error types for the buddy allocator

use thiserror::Error;

/// Errors reported by arena and pool construction.
///
/// Allocation shortfalls are not errors: `alloc` returns `None` when a
/// request cannot be satisfied (arena full, pool cap reached, driver out of
/// memory) and the cause is logged at the point of failure.
#[derive(Error, Debug, Clone)]
pub enum BuddyError {
    #[error("arena level {0} outside supported range 1..=32")]
    LevelOutOfRange(u8),
    #[error("invalid device index {0}")]
    InvalidDevice(i32),
    #[error("driver allocation of {size} bytes failed: {reason}")]
    DriverOom { size: usize, reason: String },
}

/// Result type for fallible allocator operations.
pub type BuddyResult<T> = Result<T, BuddyError>;
