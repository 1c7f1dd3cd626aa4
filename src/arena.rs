//! Sources of backing memory for an allocator's arena.
//!
//! ## [`ArenaSource`](trait.ArenaSource.html)
//!
//! `ArenaSource` is a simple trait interface meant to abstract over where the
//! single arena block comes from, and where it goes back to.
//!
//! ## [`SystemArena`](struct.SystemArena.html)
//!
//! Takes the arena from Rust's global allocator. This is the default.
//!
//! ## [`MmapArena`](struct.MmapArena.html)
//!
//! Maps the arena directly from the OS with `mmap`. Only available with the
//! `use_libc` feature.
//!
//! ## [`ToyHeap`](struct.ToyHeap.html)
//!
//! `ToyHeap` is a fixed-size buffer that can pretend to be a memory source, and
//! refuses requests larger than itself. It is mainly useful for testing.

use alloc::alloc::{alloc_zeroed, dealloc, Layout};
use alloc::boxed::Box;
use alloc::vec;
use core::ptr::NonNull;

#[cfg(feature = "use_libc")]
use errno::Errno;

/// Alignment of the arena base address. Every region offset is a multiple of
/// 4, so this keeps handed-out addresses 4-byte aligned as well.
pub const ARENA_ALIGN: usize = 16;

// Round up value to the nearest multiple of increment
fn round_up(value: usize, increment: usize) -> usize {
    if value == 0 {
        return 0;
    }
    increment * ((value - 1) / increment + 1)
}

pub trait ArenaSource {
    type Err: core::fmt::Debug;

    /// Acquire a block of exactly `size` usable bytes.
    ///
    /// # Safety
    ///
    /// For this to function properly with [`Allocator`](crate::Allocator):
    ///
    /// - The returned memory must be zero-initialized, aligned to at least 4
    ///   bytes, and untracked by any other rust code until it is released.
    /// - `size` is never 0.
    unsafe fn acquire(&mut self, size: usize) -> Result<NonNull<u8>, Self::Err>;

    /// Give back a block previously returned by `acquire`.
    ///
    /// # Safety
    ///
    /// `ptr` and `size` must be exactly what was passed to and returned by a
    /// single earlier `acquire` call, and nothing may use the block afterwards.
    unsafe fn release(&mut self, ptr: NonNull<u8>, size: usize);
}

/// Takes the arena from the global allocator.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemArena;

/// The global allocator refused the arena, or its size was unrepresentable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemArenaError {
    pub size: usize,
}

impl SystemArena {
    fn layout(size: usize) -> Result<Layout, SystemArenaError> {
        Layout::from_size_align(size, ARENA_ALIGN).map_err(|_| SystemArenaError { size })
    }
}

impl ArenaSource for SystemArena {
    type Err = SystemArenaError;

    unsafe fn acquire(&mut self, size: usize) -> Result<NonNull<u8>, SystemArenaError> {
        let layout = SystemArena::layout(size)?;
        NonNull::new(alloc_zeroed(layout)).ok_or(SystemArenaError { size })
    }

    unsafe fn release(&mut self, ptr: NonNull<u8>, size: usize) {
        // acquire() already proved this layout is valid
        if let Ok(layout) = SystemArena::layout(size) {
            dealloc(ptr.as_ptr(), layout);
        }
    }
}

/// MmapArena uses virtual memory pages for the arena.
#[cfg(feature = "use_libc")]
#[derive(Debug, Default)]
pub struct MmapArena {
    // Just for tracking, not really needed
    pages: usize,
    mappings: usize,
}

#[cfg(feature = "use_libc")]
impl MmapArena {
    /// Number of pages currently mapped.
    pub fn pages(&self) -> usize {
        self.pages
    }

    /// Number of `mmap` calls that have succeeded so far.
    pub fn mappings(&self) -> usize {
        self.mappings
    }
}

#[cfg(feature = "use_libc")]
impl ArenaSource for MmapArena {
    type Err = Errno;

    unsafe fn acquire(&mut self, size: usize) -> Result<NonNull<u8>, Errno> {
        let pagesize = sysconf::page::pagesize();
        let to_map = round_up(size, pagesize);

        let ptr = libc::mmap(
            // Address we want the memory at. We don't care, so null it is.
            core::ptr::null_mut(),
            to_map,
            libc::PROT_WRITE | libc::PROT_READ,
            // MAP_ANON: no file behind it, and the pages come zeroed.
            //
            // MAP_PRIVATE: We're not sharing this with any other process.
            libc::MAP_ANON | libc::MAP_PRIVATE,
            -1,
            0,
        );

        if ptr == libc::MAP_FAILED {
            return Err(errno::errno());
        }

        self.pages += to_map / pagesize;
        self.mappings += 1;

        NonNull::new(ptr as *mut u8).ok_or_else(errno::errno)
    }

    unsafe fn release(&mut self, ptr: NonNull<u8>, size: usize) {
        let pagesize = sysconf::page::pagesize();
        let to_unmap = round_up(size, pagesize);
        if libc::munmap(ptr.as_ptr() as *mut libc::c_void, to_unmap) == 0 {
            self.pages -= to_unmap / pagesize;
        } else {
            log::warn!("munmap of {} bytes failed: {:?}", to_unmap, errno::errno());
        }
    }
}

/// A boxed, fixed-capacity buffer standing in for system memory.
///
/// It hands out its whole buffer to at most one arena at a time.
pub struct ToyHeap {
    // Words rather than bytes, so the base address is 4-byte aligned.
    heap: Box<[u32]>,
    pub acquired: bool,
    pub acquisitions: usize,
}

impl ToyHeap {
    /// A heap of `capacity` bytes, rounded up to a multiple of 4.
    pub fn new(capacity: usize) -> Self {
        let words = round_up(capacity, 4) / 4;
        ToyHeap {
            heap: vec![0; words].into_boxed_slice(),
            acquired: false,
            acquisitions: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.heap.len() * 4
    }
}

impl Default for ToyHeap {
    fn default() -> Self {
        ToyHeap::new(4 * 1024)
    }
}

/// The requested arena is larger than the toy heap, or the toy heap is
/// already lent out.
#[derive(Debug)]
pub struct ToyHeapOverflowError();

impl ArenaSource for ToyHeap {
    type Err = ToyHeapOverflowError;

    unsafe fn acquire(&mut self, size: usize) -> Result<NonNull<u8>, Self::Err> {
        if self.acquired || size > self.capacity() {
            return Err(ToyHeapOverflowError());
        }

        self.acquired = true;
        self.acquisitions += 1;
        Ok(NonNull::from(&mut self.heap[..]).cast())
    }

    unsafe fn release(&mut self, _ptr: NonNull<u8>, _size: usize) {
        // The next arena expects zeroed memory
        self.heap.iter_mut().for_each(|w| *w = 0);
        self.acquired = false;
    }
}
