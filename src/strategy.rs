//! The placement strategies used to pick a hole for each allocation.

use core::cmp::Reverse;
use core::fmt;
use core::str::FromStr;

use log::trace;

use crate::region::{Region, RegionList};

/// How [`Allocator::alloc`](crate::Allocator::alloc) chooses among the holes
/// large enough for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Strategy {
    /// The lowest-addressed hole that fits.
    #[default]
    FirstFit,
    /// The first hole that fits after the region of the previous allocation,
    /// wrapping around to the start of the arena.
    NextFit,
    /// The hole that leaves the least space over. Ties go to the lowest address.
    BestFit,
    /// The hole that leaves the most space over. Ties go to the lowest address.
    WorstFit,
}

impl Strategy {
    pub const ALL: [Strategy; 4] = [
        Strategy::FirstFit,
        Strategy::NextFit,
        Strategy::BestFit,
        Strategy::WorstFit,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Strategy::FirstFit => "first-fit",
            Strategy::NextFit => "next-fit",
            Strategy::BestFit => "best-fit",
            Strategy::WorstFit => "worst-fit",
        }
    }

    /// Find the index of the hole to allocate `size` bytes from, or `None` if
    /// no hole is large enough.
    ///
    /// `cursor` is the start of the most recent allocation, and is only used
    /// by [`Strategy::NextFit`].
    pub fn select(
        self,
        regions: &RegionList,
        size: usize,
        cursor: Option<usize>,
    ) -> Option<usize> {
        let found = match self {
            Strategy::FirstFit => first_fit(regions.as_slice(), size),
            Strategy::NextFit => {
                let after = cursor.and_then(|c| regions.position(c));
                next_fit(regions.as_slice(), size, after)
            }
            Strategy::BestFit => best_fit(regions.as_slice(), size),
            Strategy::WorstFit => worst_fit(regions.as_slice(), size),
        };
        trace!("{} for {} bytes chose {:?}", self, size, found);
        found
    }
}

fn first_fit(regions: &[Region], size: usize) -> Option<usize> {
    regions.iter().position(|r| r.fits(size))
}

// `after` is the index of the previous allocation's region. When it has been
// freed and merged away, this is a plain first-fit scan.
fn next_fit(regions: &[Region], size: usize, after: Option<usize>) -> Option<usize> {
    let after = match after {
        None => return first_fit(regions, size),
        Some(i) => i,
    };

    ((after + 1)..regions.len())
        .chain(0..=after)
        .find(|&i| regions[i].fits(size))
}

fn best_fit(regions: &[Region], size: usize) -> Option<usize> {
    // min_by_key keeps the first of several equal minimums
    regions
        .iter()
        .enumerate()
        .filter(|(_, r)| r.fits(size))
        .min_by_key(|(_, r)| r.size() - size)
        .map(|(i, _)| i)
}

fn worst_fit(regions: &[Region], size: usize) -> Option<usize> {
    // max_by_key keeps the last of several equal maximums, hence the index key
    regions
        .iter()
        .enumerate()
        .filter(|(_, r)| r.fits(size))
        .max_by_key(|&(i, r)| (r.size() - size, Reverse(i)))
        .map(|(i, _)| i)
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Returned when a string does not name a [`Strategy`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseStrategyError;

impl fmt::Display for ParseStrategyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown strategy, expected one of first-fit, next-fit, best-fit, worst-fit"
        )
    }
}

impl core::error::Error for ParseStrategyError {}

impl FromStr for Strategy {
    type Err = ParseStrategyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Strategy::ALL
            .iter()
            .copied()
            .find(|strategy| {
                let name = strategy.name();
                s.eq_ignore_ascii_case(name)
                    || name
                        .strip_suffix("-fit")
                        .map_or(false, |short| s.eq_ignore_ascii_case(short))
            })
            .ok_or(ParseStrategyError)
    }
}
