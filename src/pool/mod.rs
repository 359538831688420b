//! Arena pooling: per-caller pools over a per-location reservoir

pub mod pool;
pub mod reservoir;

pub use pool::Pool;
pub use reservoir::Reservoir;

/// Size exponent of every pooled arena: `2^28` = 256 MiB.
pub const ARENA_LEVEL: u8 = 28;

/// Number of addressable device indices.
pub const MAX_DEVICES: usize = 256;
