//! hipbuddy - two-tier memory allocator for HIP workloads
//!
//! Callers that repeatedly acquire and release short-lived blocks of device
//! or pinned host memory get predictable, low-latency allocation without
//! round-tripping through the driver: a classical binary buddy allocator
//! manages each 256 MiB arena, and a pool tier multiplexes arenas per
//! location, reusing freed ones across pool instances under a configurable
//! per-location budget.
//!
//! ```rust,ignore
//! use hipbuddy::Pool;
//!
//! hipbuddy::logging::init_logging_default();
//! Pool::set_device_pool_size(33); // 8 GiB per device
//!
//! let pool = Pool::new(0)?; // device 0
//! let ptr = pool.alloc_aligned(3 * 1024 * 1024, 256).expect("within budget");
//! // ... launch kernels using ptr ...
//! assert!(pool.free(ptr.as_ptr()));
//! # Ok::<(), hipbuddy::BuddyError>(())
//! ```
//!
//! Built with the `rocm` feature the crate links against the HIP runtime;
//! without it, arenas are backed by anonymous mappings so everything above
//! the driver runs unchanged on machines without a GPU.

pub mod backend;
pub mod buddy;
pub mod error;
pub mod logging;
pub mod pool;

pub use backend::Location;
pub use buddy::Arena;
pub use error::{BuddyError, BuddyResult};
pub use pool::{Pool, Reservoir, ARENA_LEVEL, MAX_DEVICES};
