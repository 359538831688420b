//! Pool and reservoir behavior, including the concurrent paths.
//!
//! Each test that needs configured state builds its own `Reservoir` so the
//! tests can run in parallel without sharing the process-wide one; the
//! global configuration API gets a single dedicated smoke test.

use std::ffi::c_void;
use std::sync::Arc;

use hipbuddy::{BuddyError, Location, Pool, Reservoir, ARENA_LEVEL};

/// One full arena's worth of bytes.
const ARENA_BYTES: usize = 1 << ARENA_LEVEL;

fn host_reservoir(level: u8) -> Arc<Reservoir> {
    let reservoir = Arc::new(Reservoir::new());
    reservoir.set_host_level_max(level);
    reservoir
}

#[test]
fn unconfigured_pool_rejects_allocation() {
    let pool = Pool::with_reservoir(-1, Arc::new(Reservoir::new())).unwrap();
    assert!(pool.alloc(64).is_none());
    assert_eq!(pool.arena_count(), 0);
    assert!(pool.is_empty());
}

#[test]
fn oversized_request_is_rejected() {
    let pool = Pool::with_reservoir(-1, host_reservoir(ARENA_LEVEL + 2)).unwrap();
    assert!(pool.alloc(ARENA_BYTES + 1).is_none());
    assert_eq!(pool.arena_count(), 0);
}

#[test]
fn invalid_device_index_is_rejected() {
    assert!(matches!(Pool::new(256), Err(BuddyError::InvalidDevice(256))));
    assert!(matches!(
        Pool::with_reservoir(1000, Arc::new(Reservoir::new())),
        Err(BuddyError::InvalidDevice(1000))
    ));
    assert!(Pool::release_global_pool(256).is_err());
}

#[test]
fn aligned_allocations_round_trip() {
    let pool = Pool::with_reservoir(-1, host_reservoir(ARENA_LEVEL)).unwrap();
    let alignment = 3;

    let mut ptrs = Vec::new();
    for size in [4usize, 2, 1, 1] {
        let ptr = pool.alloc_aligned(size, alignment).unwrap();
        assert_eq!(ptr.as_ptr() as usize % alignment, 0);
        ptrs.push(ptr);
    }
    assert_eq!(pool.arena_count(), 1);

    for ptr in ptrs {
        assert!(pool.free(ptr.as_ptr()));
    }
    assert!(pool.is_empty());
}

#[test]
fn concurrent_alloc_free_leaves_pool_empty() {
    let pool = Arc::new(Pool::with_reservoir(-1, host_reservoir(ARENA_LEVEL + 1)).unwrap());

    let mut threads = Vec::new();
    for _ in 0..2 {
        let pool = Arc::clone(&pool);
        threads.push(std::thread::spawn(move || {
            let mut addresses: Vec<usize> = Vec::new();
            for size in [4usize, 2, 1, 1] {
                let ptr = pool.alloc(size).expect("pool has budget");
                addresses.push(ptr.as_ptr() as usize);
            }
            for addr in &addresses {
                assert!(pool.free(*addr as *mut c_void));
            }
            addresses
        }));
    }

    let results: Vec<Vec<usize>> = threads.into_iter().map(|t| t.join().unwrap()).collect();
    assert!(pool.is_empty());

    // Per-thread addresses are distinct while live; the two threads freed
    // before exiting, so overlap across threads is legal. Within a thread
    // every address must be unique.
    for addresses in &results {
        let mut sorted = addresses.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), addresses.len());
    }
}

#[test]
fn live_blocks_from_concurrent_threads_never_overlap() {
    let pool = Arc::new(Pool::with_reservoir(-1, host_reservoir(ARENA_LEVEL + 1)).unwrap());

    let mut threads = Vec::new();
    for _ in 0..4 {
        let pool = Arc::clone(&pool);
        threads.push(std::thread::spawn(move || {
            let mut blocks = Vec::new();
            for size in [64usize, 33, 128, 1] {
                let ptr = pool.alloc(size).expect("pool has budget");
                blocks.push((ptr.as_ptr() as usize, size.next_power_of_two()));
            }
            blocks
        }));
    }

    let all: Vec<(usize, usize)> = threads
        .into_iter()
        .flat_map(|t| t.join().unwrap())
        .collect();
    for (i, &(addr_a, len_a)) in all.iter().enumerate() {
        for &(addr_b, len_b) in &all[i + 1..] {
            assert!(
                addr_a + len_a <= addr_b || addr_b + len_b <= addr_a,
                "live blocks overlap: {:#x}+{} vs {:#x}+{}",
                addr_a,
                len_a,
                addr_b,
                len_b
            );
        }
    }

    for (addr, _) in all {
        assert!(pool.free(addr as *mut c_void));
    }
    assert!(pool.is_empty());
}

#[test]
fn cap_bounds_outstanding_arenas() {
    // Budget of 2^(ARENA_LEVEL + 1) bytes means at most two arenas.
    let reservoir = host_reservoir(ARENA_LEVEL + 1);
    let pool = Pool::with_reservoir(-1, Arc::clone(&reservoir)).unwrap();

    let first = pool.alloc(ARENA_BYTES).unwrap();
    let second = pool.alloc(ARENA_BYTES).unwrap();
    assert_eq!(pool.arena_count(), 2);
    assert_eq!(reservoir.outstanding(Location::Host), 2);

    assert!(pool.alloc(1).is_none());
    assert_eq!(reservoir.outstanding(Location::Host), 2);

    assert!(pool.free(first.as_ptr()));
    assert!(pool.free(second.as_ptr()));
    assert!(pool.is_empty());

    // Freeing restored capacity without new arenas.
    let again = pool.alloc(ARENA_BYTES).unwrap();
    assert_eq!(reservoir.outstanding(Location::Host), 2);
    assert!(pool.free(again.as_ptr()));
}

#[test]
fn dropped_pool_caches_arenas_for_reuse() {
    let reservoir = host_reservoir(ARENA_LEVEL);

    {
        let pool = Pool::with_reservoir(-1, Arc::clone(&reservoir)).unwrap();
        let ptr = pool.alloc(4096).unwrap();
        assert!(pool.free(ptr.as_ptr()));
    }
    assert_eq!(reservoir.cached(Location::Host), 1);
    assert_eq!(reservoir.outstanding(Location::Host), 1);

    // The next pool is served from the cache, not the driver.
    let pool = Pool::with_reservoir(-1, Arc::clone(&reservoir)).unwrap();
    let ptr = pool.alloc(4096).unwrap();
    assert_eq!(reservoir.cached(Location::Host), 0);
    assert_eq!(reservoir.outstanding(Location::Host), 1);
    assert!(pool.free(ptr.as_ptr()));
}

#[test]
fn cached_arenas_stay_charged_until_cleared() {
    let reservoir = host_reservoir(ARENA_LEVEL);

    {
        let pool = Pool::with_reservoir(-1, Arc::clone(&reservoir)).unwrap();
        let ptr = pool.alloc(1).unwrap();
        assert!(pool.free(ptr.as_ptr()));
    }
    assert_eq!(reservoir.cached(Location::Host), 1);
    assert_eq!(reservoir.outstanding(Location::Host), 1);

    assert_eq!(reservoir.clear(Location::Host), 1);
    assert_eq!(reservoir.cached(Location::Host), 0);
    assert_eq!(reservoir.outstanding(Location::Host), 0);
}

#[test]
fn pool_drop_with_live_allocations_leaks_the_arena() {
    // Budget of one arena; leaking it exhausts the location.
    let reservoir = host_reservoir(ARENA_LEVEL);

    {
        let pool = Pool::with_reservoir(-1, Arc::clone(&reservoir)).unwrap();
        let _live = pool.alloc(64).unwrap();
        // Dropped with a live allocation.
    }
    assert_eq!(reservoir.cached(Location::Host), 0);
    assert_eq!(reservoir.outstanding(Location::Host), 1);

    let pool = Pool::with_reservoir(-1, Arc::clone(&reservoir)).unwrap();
    assert!(pool.alloc(64).is_none());
}

#[test]
fn free_of_foreign_pointer_returns_false() {
    let pool = Pool::with_reservoir(-1, host_reservoir(ARENA_LEVEL)).unwrap();
    let ptr = pool.alloc(16).unwrap();

    let mut elsewhere = 0u8;
    assert!(!pool.free(&mut elsewhere as *mut u8 as *mut c_void));

    // Null is a silent success once an arena is attached.
    assert!(pool.free(std::ptr::null_mut()));
    assert!(pool.free(ptr.as_ptr()));
}

#[test]
fn device_pool_round_trip() {
    let reservoir = Arc::new(Reservoir::new());
    reservoir.set_device_level_max(ARENA_LEVEL + 1);

    let pool = Pool::with_reservoir(3, Arc::clone(&reservoir)).unwrap();
    assert_eq!(pool.target(), Location::Device(3));

    let ptr = pool.alloc_aligned(1 << 20, 256).unwrap();
    assert_eq!(ptr.as_ptr() as usize % 256, 0);
    assert_eq!(reservoir.outstanding(Location::Device(3)), 1);
    assert_eq!(reservoir.outstanding(Location::Device(0)), 0);

    assert!(pool.free(ptr.as_ptr()));
    drop(pool);
    assert_eq!(reservoir.cached(Location::Device(3)), 1);
    assert_eq!(reservoir.clear(Location::Device(3)), 1);
}

#[test]
fn global_configuration_api_smoke() {
    Pool::set_host_pool_size(ARENA_LEVEL);

    let pool = Pool::new(-1).unwrap();
    let ptr = pool.alloc(4096).unwrap();
    assert!(pool.free(ptr.as_ptr()));
    assert!(pool.is_empty());
    drop(pool);

    Pool::release_global_pool(-1).unwrap();
    assert_eq!(Reservoir::global().cached(Location::Host), 0);
}
