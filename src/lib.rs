#![cfg_attr(not(test), no_std)]

//! A simulated heap allocator, placing allocations in a single arena.
//!
//! An [`Allocator`] acquires one contiguous block of memory up front, then
//! hands out and takes back pieces of it. Which free piece (a "hole") serves a
//! request depends on the [`Strategy`]:
//!
//! - [`Strategy::FirstFit`] takes the lowest-addressed hole that fits.
//! - [`Strategy::NextFit`] continues searching after the previous allocation.
//! - [`Strategy::BestFit`] takes the hole leaving the least space over.
//! - [`Strategy::WorstFit`] takes the hole leaving the most space over.
//!
//! Every size is rounded up to a multiple of 4, and freed regions are merged
//! with neighbouring holes straight away.
//!
//! ```
//! use fit_allocator::{Allocator, Strategy};
//!
//! let mut allocator: Allocator = Allocator::default();
//! allocator.init(1024, Strategy::FirstFit).unwrap();
//!
//! let handle = allocator.alloc(100).unwrap();
//! assert_eq!(allocator.size(), 2);
//!
//! allocator.free(handle);
//! assert_eq!(allocator.size(), 1);
//! ```
//!
//! See [`allocators`] for the allocator types and [`arena`] for where the
//! memory comes from.

extern crate alloc;

pub mod allocators;
pub mod arena;
pub mod error;
pub mod region;
pub mod strategy;

pub use allocators::{Allocator, Config, Handle, SharedAllocator};
#[cfg(feature = "use_libc")]
pub use arena::MmapArena;
pub use arena::{ArenaSource, SystemArena, ToyHeap};
pub use error::AllocError;
pub use region::{Region, RegionKind, RegionList, Stats, Validity};
pub use strategy::Strategy;
