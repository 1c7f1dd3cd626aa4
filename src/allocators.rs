//! Allocator types.
//!
//! ## [`Allocator`](struct.Allocator.html)
//!
//! An `Allocator` owns one arena and the [`RegionList`] describing it. It is a
//! plain single-threaded value: create as many as you like, each with its own
//! arena.
//!
//! ## [`SharedAllocator`](struct.SharedAllocator.html)
//!
//! A `SharedAllocator` wraps an `Allocator` in a spin lock and can be built in
//! a `const` context, so a single process-wide instance can live in a
//! `static`.
//!
//! ## [`Handle`](struct.Handle.html)
//!
//! The opaque token returned by `alloc` and taken by `free`.

use core::ptr::NonNull;
use core::slice;

use log::{debug, warn};
use spin::Mutex;

use crate::arena::{ArenaSource, SystemArena};
use crate::error::AllocError;
use crate::region::{align_up, RegionKind, RegionList, Stats, Validity};
use crate::strategy::Strategy;

/// Default upper bound on live regions.
pub const DEFAULT_MAX_REGIONS: usize = 10_000;

/// Identifies one allocation made by an [`Allocator`].
///
/// A handle carries the offset of its region and a stamp unique to that
/// allocation. `free` ignores a handle whose stamp no longer matches its
/// region.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    offset: usize,
    stamp: u32,
}

impl Handle {
    /// The null handle. Freeing it is a no-op.
    pub const NULL: Handle = Handle {
        offset: 0,
        stamp: 0,
    };

    pub fn is_null(&self) -> bool {
        self.stamp == 0
    }

    /// Offset of the allocation from the arena base. Always a multiple of 4.
    pub fn offset(&self) -> usize {
        self.offset
    }
}

/// Settings applied by [`Allocator::init_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub strategy: Strategy,
    /// Upper bound on live regions. A split that would exceed it fails with
    /// [`AllocError::RegionLimit`].
    pub max_regions: usize,
}

impl Config {
    pub fn new(strategy: Strategy) -> Self {
        Config {
            strategy,
            ..Config::default()
        }
    }

    pub fn max_regions(mut self, max_regions: usize) -> Self {
        self.max_regions = max_regions;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            strategy: Strategy::default(),
            max_regions: DEFAULT_MAX_REGIONS,
        }
    }
}

// The block acquired from an ArenaSource.
struct Arena {
    base: NonNull<u8>,
    len: usize,
}

// An Arena is only ever reachable through the Allocator that owns it, so
// moving it to another thread along with that Allocator is fine.
unsafe impl Send for Arena {}

/// A single-threaded arena allocator with a choice of placement strategy.
///
/// An `Allocator` starts out uninitialized; [`init`](Allocator::init) acquires
/// the arena from `S`, and [`destroy`](Allocator::destroy) (or dropping the
/// allocator) gives it back.
pub struct Allocator<S: ArenaSource = SystemArena> {
    source: S,
    arena: Option<Arena>,
    regions: RegionList,
    config: Config,
    // Start of the most recent allocation, for next-fit
    last_alloc: Option<usize>,
    next_stamp: u32,
}

impl<S: ArenaSource + Default> Default for Allocator<S> {
    fn default() -> Self {
        Allocator::new(S::default())
    }
}

impl<S: ArenaSource> Drop for Allocator<S> {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl<S: ArenaSource> Allocator<S> {
    /// Create a new, uninitialized `Allocator` that will take its arena from
    /// `source`.
    pub fn new(source: S) -> Self {
        Allocator {
            source,
            arena: None,
            regions: RegionList::new(),
            config: Config::default(),
            last_alloc: None,
            next_stamp: 1,
        }
    }

    /// Acquire an arena of `total_size` bytes (rounded up to a multiple of 4)
    /// and place allocations in it with `strategy`.
    pub fn init(&mut self, total_size: usize, strategy: Strategy) -> Result<(), AllocError> {
        self.init_with(total_size, Config::new(strategy))
    }

    /// Like [`init`](Allocator::init), with every setting given explicitly.
    ///
    /// If the allocator already holds an arena, it is destroyed first. On an
    /// invalid size nothing changes; on a failure to acquire memory, the
    /// allocator is left uninitialized.
    pub fn init_with(&mut self, total_size: usize, config: Config) -> Result<(), AllocError> {
        if total_size == 0 {
            return Err(AllocError::InvalidSize);
        }
        let len = align_up(total_size).ok_or(AllocError::InvalidSize)?;

        if self.arena.is_some() {
            debug!("Re-initializing; destroying the previous arena first");
            self.destroy();
        }

        let base = match unsafe { self.source.acquire(len) } {
            Ok(base) => base,
            Err(err) => {
                warn!("Failed to acquire a {} byte arena: {:?}", len, err);
                return Err(AllocError::BackingAllocationFailure);
            }
        };

        self.arena = Some(Arena { base, len });
        self.regions.reset(len);
        self.config = config;
        self.last_alloc = None;
        debug!(
            "Initialized a {} byte arena at {:?} using {}",
            len, base, config.strategy
        );

        Ok(())
    }

    /// Release the arena. All handles become invalid.
    ///
    /// Does nothing if the allocator is not initialized.
    pub fn destroy(&mut self) {
        let arena = match self.arena.take() {
            None => return,
            Some(arena) => arena,
        };

        unsafe { self.source.release(arena.base, arena.len) };
        self.regions.clear();
        self.last_alloc = None;
        debug!("Destroyed the {} byte arena at {:?}", arena.len, arena.base);
    }

    /// Allocate `size` bytes, rounded up to a multiple of 4.
    ///
    /// On failure the region list is unchanged.
    pub fn alloc(&mut self, size: usize) -> Result<Handle, AllocError> {
        if size == 0 {
            return Err(AllocError::InvalidSize);
        }
        if self.arena.is_none() {
            return Err(AllocError::Uninitialized);
        }
        let needed = align_up(size).ok_or(AllocError::InvalidSize)?;

        let index = match self
            .config
            .strategy
            .select(&self.regions, needed, self.last_alloc)
        {
            Some(index) => index,
            None => {
                debug!("No hole fits {} bytes in {}", needed, self.regions);
                return Err(AllocError::AllocationExhausted { requested: needed });
            }
        };

        let stamp = self.next_stamp;
        let offset = self
            .regions
            .split(index, needed, stamp, self.config.max_regions)?;

        // Zero is reserved for the null handle
        self.next_stamp = self.next_stamp.checked_add(1).unwrap_or(1);
        self.last_alloc = Some(offset);
        debug!("Allocated {} bytes at offset {}", needed, offset);

        Ok(Handle { offset, stamp })
    }

    /// Free the allocation identified by `handle`.
    ///
    /// Null, stale and unknown handles are ignored.
    pub fn free(&mut self, handle: Handle) {
        if handle.is_null() {
            return;
        }

        let index = match self.find(handle) {
            Some(index) => index,
            None => {
                debug!("Ignoring free of unknown handle {:?}", handle);
                return;
            }
        };

        // release() only fails on an out-of-range index, which find() rules
        // out; the error has already been logged either way.
        if let Ok(merged) = self.regions.release(index) {
            debug!(
                "Freed offset {}; {} regions left after {} merges",
                handle.offset,
                self.regions.len(),
                merged
            );
        }
    }

    /// Number of live regions, holes and allocations alike. 0 if the allocator
    /// is not initialized.
    pub fn size(&self) -> usize {
        self.regions.len()
    }

    pub fn is_initialized(&self) -> bool {
        self.arena.is_some()
    }

    /// Size of the arena in bytes, after rounding. 0 if the allocator is not
    /// initialized.
    pub fn capacity(&self) -> usize {
        self.arena.as_ref().map_or(0, |arena| arena.len)
    }

    pub fn strategy(&self) -> Strategy {
        self.config.strategy
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// A read-only view of the current regions.
    pub fn regions(&self) -> &RegionList {
        &self.regions
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Get statistics on this allocator, and verify validity of the
    /// RegionList.
    pub fn stats(&self) -> (Validity, Stats) {
        self.regions.stats(self.capacity())
    }

    /// The address of a live allocation.
    pub fn resolve(&self, handle: Handle) -> Option<NonNull<u8>> {
        let arena = self.arena.as_ref()?;
        self.find(handle)?;
        // The region lies within the arena, so this stays in bounds
        unsafe { Some(NonNull::new_unchecked(arena.base.as_ptr().add(handle.offset))) }
    }

    /// The bytes of a live allocation.
    pub fn bytes_mut(&mut self, handle: Handle) -> Option<&mut [u8]> {
        let arena = self.arena.as_ref()?;
        let index = self.find(handle)?;
        let region = self.regions.get(index)?;

        // The region is within the arena, which ArenaSource guarantees is
        // initialized, and &mut self keeps the slice unique.
        unsafe {
            Some(slice::from_raw_parts_mut(
                arena.base.as_ptr().add(region.start()),
                region.size(),
            ))
        }
    }

    // Index of the allocated region owned by `handle`.
    fn find(&self, handle: Handle) -> Option<usize> {
        if handle.is_null() {
            return None;
        }
        let index = self.regions.position(handle.offset)?;
        match self.regions.get(index)?.kind() {
            RegionKind::Allocated(stamp) if stamp == handle.stamp => Some(index),
            _ => None,
        }
    }
}

/// A spin-locked `Allocator` that can be created in a `static`.
///
/// Every method takes `&self`, mirroring a process-wide allocator with
/// `init`/`alloc`/`free`/`destroy`/`size` entry points.
pub struct SharedAllocator<S: ArenaSource = SystemArena> {
    inner: Mutex<Option<Allocator<S>>>,
}

impl<S: ArenaSource> SharedAllocator<S> {
    pub const fn new() -> Self {
        SharedAllocator {
            inner: Mutex::new(None),
        }
    }

    pub fn alloc(&self, size: usize) -> Result<Handle, AllocError> {
        match self.inner.lock().as_mut() {
            Some(allocator) => allocator.alloc(size),
            None => Err(AllocError::Uninitialized),
        }
    }

    pub fn free(&self, handle: Handle) {
        if let Some(allocator) = self.inner.lock().as_mut() {
            allocator.free(handle);
        }
    }

    pub fn destroy(&self) {
        if let Some(allocator) = self.inner.lock().as_mut() {
            allocator.destroy();
        }
    }

    pub fn size(&self) -> usize {
        self.inner.lock().as_ref().map_or(0, Allocator::size)
    }

    pub fn stats(&self) -> Option<(Validity, Stats)> {
        self.inner.lock().as_ref().map(Allocator::stats)
    }
}

impl<S: ArenaSource + Default> SharedAllocator<S> {
    pub fn init(&self, total_size: usize, strategy: Strategy) -> Result<(), AllocError> {
        self.init_with(total_size, Config::new(strategy))
    }

    pub fn init_with(&self, total_size: usize, config: Config) -> Result<(), AllocError> {
        self.inner
            .lock()
            .get_or_insert_with(Allocator::default)
            .init_with(total_size, config)
    }
}

impl<S: ArenaSource + Default> Default for SharedAllocator<S> {
    fn default() -> Self {
        Self::new()
    }
}
