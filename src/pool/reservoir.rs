//! Process-wide cache of empty arenas
//!
//! The reservoir hands whole arenas to pools and takes empty ones back,
//! partitioned by location (one slot per device index plus one for host).
//! Each location is capped: with a configured budget exponent `M`, at most
//! `2^(M - ARENA_LEVEL)` arenas may be outstanding, and an arena stays
//! charged against the cap while it sits in the cache. Only [`clear`]
//! releases the charge by destroying cached arenas.
//!
//! [`clear`]: Reservoir::clear

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use once_cell::sync::Lazy;

use crate::backend::Location;
use crate::buddy::Arena;
use crate::pool::{ARENA_LEVEL, MAX_DEVICES};

static GLOBAL: Lazy<Arc<Reservoir>> = Lazy::new(|| Arc::new(Reservoir::new()));

#[derive(Debug, Default)]
struct LocationState {
    /// FIFO of empty arenas ready for reuse.
    free_arenas: VecDeque<Arena>,
    /// Arenas charged to this location: held by pools or cached above.
    /// Decremented only when a cached arena is destroyed.
    allocated_count: usize,
}

/// Per-location arena cache with cap enforcement.
///
/// Most callers go through the process-wide instance that [`Pool`] binds to
/// by default; tests and embedders that want isolated state can construct
/// their own and hand it to [`Pool::with_reservoir`].
///
/// [`Pool`]: crate::pool::Pool
/// [`Pool::with_reservoir`]: crate::pool::Pool::with_reservoir
#[derive(Debug)]
pub struct Reservoir {
    host: Mutex<LocationState>,
    devices: Vec<Mutex<LocationState>>,
    host_level_max: AtomicU8,
    device_level_max: AtomicU8,
}

impl Reservoir {
    /// Create an empty reservoir with allocation disabled (both budget
    /// exponents zero).
    pub fn new() -> Self {
        Reservoir {
            host: Mutex::new(LocationState::default()),
            devices: (0..MAX_DEVICES)
                .map(|_| Mutex::new(LocationState::default()))
                .collect(),
            host_level_max: AtomicU8::new(0),
            device_level_max: AtomicU8::new(0),
        }
    }

    /// The process-wide reservoir.
    pub fn global() -> Arc<Reservoir> {
        Arc::clone(&GLOBAL)
    }

    /// Publish the host budget exponent; the effective value never drops
    /// below [`ARENA_LEVEL`]. Shrinking only affects future `get_block`
    /// decisions.
    pub fn set_host_level_max(&self, level: u8) {
        self.host_level_max
            .store(ARENA_LEVEL.max(level), Ordering::SeqCst);
    }

    /// Publish the device budget exponent, shared by all device indices.
    pub fn set_device_level_max(&self, level: u8) {
        self.device_level_max
            .store(ARENA_LEVEL.max(level), Ordering::SeqCst);
    }

    /// Current budget exponent for a location; 0 means unconfigured.
    pub fn level_max(&self, location: Location) -> u8 {
        match location {
            Location::Host => self.host_level_max.load(Ordering::SeqCst),
            Location::Device(_) => self.device_level_max.load(Ordering::SeqCst),
        }
    }

    /// Arenas currently charged to a location (in pools or cached).
    pub fn outstanding(&self, location: Location) -> usize {
        self.state(location).map_or(0, |state| {
            state
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .allocated_count
        })
    }

    /// Empty arenas currently cached for a location.
    pub fn cached(&self, location: Location) -> usize {
        self.state(location).map_or(0, |state| {
            state
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .free_arenas
                .len()
        })
    }

    /// Take an arena for a pool: reuse a cached one, or construct a fresh
    /// arena at [`ARENA_LEVEL`] if the location's cap allows. Returns
    /// `None` when the cap is reached or the driver cannot back a new
    /// region; both cases are logged.
    pub(crate) fn get_block(&self, location: Location) -> Option<Arena> {
        let state = self.state(location)?;
        let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(arena) = state.free_arenas.pop_front() {
            return Some(arena);
        }

        let level = self.level_max(location);
        let max_blocks = if level >= ARENA_LEVEL {
            1usize << (level - ARENA_LEVEL)
        } else {
            0
        };
        if state.allocated_count >= max_blocks {
            tracing::warn!(
                "no {} arena available, allocated {} of {}, consider increasing the {} pool size",
                location,
                state.allocated_count,
                max_blocks,
                location
            );
            return None;
        }

        match Arena::new(ARENA_LEVEL, location) {
            Ok(arena) => {
                state.allocated_count += 1;
                Some(arena)
            }
            Err(err) => {
                tracing::warn!("creating {} arena failed: {}", location, err);
                None
            }
        }
    }

    /// Cache an empty arena for reuse. The arena stays charged against its
    /// location's cap.
    pub(crate) fn return_block(&self, arena: Arena) {
        debug_assert!(arena.is_empty());
        if let Some(state) = self.state(arena.location()) {
            state
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .free_arenas
                .push_back(arena);
        }
    }

    /// Destroy all cached arenas for a location, releasing their driver
    /// memory and their cap charge. Arenas still held by pools are
    /// unaffected. Returns the number destroyed.
    pub fn clear(&self, location: Location) -> usize {
        let Some(state) = self.state(location) else {
            return 0;
        };
        let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
        let destroyed = state.free_arenas.len();
        state.free_arenas.clear();
        state.allocated_count -= destroyed;
        if destroyed > 0 {
            tracing::debug!("destroyed {} cached {} arenas", destroyed, location);
        }
        destroyed
    }

    fn state(&self, location: Location) -> Option<&Mutex<LocationState>> {
        match location {
            Location::Host => Some(&self.host),
            Location::Device(gpu) => {
                let slot = usize::try_from(gpu)
                    .ok()
                    .and_then(|index| self.devices.get(index));
                if slot.is_none() {
                    tracing::error!("invalid device index {}", gpu);
                }
                slot
            }
        }
    }
}

impl Default for Reservoir {
    fn default() -> Self {
        Reservoir::new()
    }
}
