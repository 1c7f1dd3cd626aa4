use alloc::vec::Vec;
use core::fmt;
use core::ops::Range;
use core::slice;

use log::{debug, error};
use static_assertions::const_assert;

use crate::error::AllocError;

/// All region starts and sizes are multiples of this.
pub const ALIGNMENT: usize = 4;
const_assert!(ALIGNMENT.is_power_of_two());

/// Round `value` up to the next multiple of [`ALIGNMENT`].
///
/// Returns `None` if that would overflow.
pub fn align_up(value: usize) -> Option<usize> {
    value
        .checked_add(ALIGNMENT - 1)
        .map(|v| v & !(ALIGNMENT - 1))
}

/// Whether a region is free or handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    Hole,
    /// Owned by the handle carrying this stamp.
    Allocated(u32),
}

/// An enum for easy comparison of regions and their order
pub enum Relation {
    Before,
    AdjacentBefore,
    Overlapping,
    AdjacentAfter,
    After,
}

/// A contiguous span of the arena, tracked as a single entry of a
/// [`RegionList`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    start: usize,
    size: usize,
    kind: RegionKind,
}

impl Region {
    pub(crate) fn hole(start: usize, size: usize) -> Region {
        Region {
            start,
            size,
            kind: RegionKind::Hole,
        }
    }

    #[cfg(test)]
    pub(crate) fn allocated(start: usize, size: usize, stamp: u32) -> Region {
        Region {
            start,
            size,
            kind: RegionKind::Allocated(stamp),
        }
    }

    /// Offset of the first byte of this region from the arena base.
    pub fn start(&self) -> usize {
        self.start
    }

    /// The size of the region, in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn kind(&self) -> RegionKind {
        self.kind
    }

    pub fn is_hole(&self) -> bool {
        self.kind == RegionKind::Hole
    }

    /// Whether this region is a hole with room for `size` bytes.
    pub fn fits(&self, size: usize) -> bool {
        self.is_hole() && self.size >= size
    }

    /// The offsets covered by this region.
    pub fn as_range(&self) -> Range<usize> {
        self.start..(self.start + self.size)
    }

    /// Compare two regions to see how they are ordered.
    pub fn relation(&self, other: &Self) -> Relation {
        let self_range = self.as_range();
        let other_range = other.as_range();

        if self_range.end < other_range.start {
            Relation::Before
        } else if self_range.end == other_range.start {
            Relation::AdjacentBefore
        } else if self_range.start < other_range.end {
            Relation::Overlapping
        } else if self_range.start == other_range.end {
            Relation::AdjacentAfter
        } else {
            Relation::After
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            RegionKind::Hole => write!(f, "Hole({}, {})", self.start, self.size),
            RegionKind::Allocated(_) => write!(f, "Allocated({}, {})", self.start, self.size),
        }
    }
}

/// A `RegionList` is the ordered sequence of regions covering an arena.
///
/// Entries are kept sorted by `start`, and are updated in place on every
/// allocation and free rather than re-sorted.
///
/// It maintains a few invariants:
///
/// - The regions partition the arena: each one starts where the previous one
///   ends, and the first one starts at offset 0.
/// - No two holes are adjacent; those are merged when a region is released.
/// - Every start and size is a multiple of [`ALIGNMENT`].
#[derive(Default)]
pub struct RegionList {
    regions: Vec<Region>,
}

/// Validity contains a representation of all invalid states found in a
/// RegionList.
#[derive(Default, Debug)]
pub struct Validity {
    /// Number of regions that leave unaccounted space before the next one.
    pub gaps: usize,
    /// Number of regions overlapping the one after them.
    ///
    /// This likely indicates corruption.
    pub overlaps: usize,
    /// Number of regions that do not start after the one before them.
    pub out_of_orders: usize,
    /// Number of hole pairs that are directly adjacent and not merged.
    pub adjacent_holes: usize,
    /// Number of regions whose start or size is not a multiple of
    /// [`ALIGNMENT`], or whose size is zero.
    pub misaligned: usize,
    /// Whether the regions fail to cover exactly `0..total`.
    pub size_mismatch: bool,
}

impl Validity {
    /// Returns a boolean - a simple check if all cases are 0
    pub fn is_valid(&self) -> bool {
        self.gaps == 0
            && self.overlaps == 0
            && self.out_of_orders == 0
            && self.adjacent_holes == 0
            && self.misaligned == 0
            && !self.size_mismatch
    }
}

impl From<Validity> for bool {
    fn from(v: Validity) -> bool {
        v.is_valid()
    }
}

#[derive(Default, Debug)]
pub struct Stats {
    pub regions: usize,
    pub holes: usize,
    pub allocations: usize,
    pub free_bytes: usize,
    pub allocated_bytes: usize,
    pub largest_hole: usize,
}

fn violation(what: &'static str) -> AllocError {
    error!("Rejecting region list operation: {}", what);
    AllocError::InvariantViolation(what)
}

impl RegionList {
    pub fn new() -> Self {
        RegionList::default()
    }

    #[cfg(test)]
    pub(crate) fn from_regions(regions: Vec<Region>) -> Self {
        RegionList { regions }
    }

    /// Replace the contents with a single hole covering `0..total`.
    pub(crate) fn reset(&mut self, total: usize) {
        self.regions.clear();
        self.regions.push(Region::hole(0, total));
    }

    pub(crate) fn clear(&mut self) {
        self.regions.clear();
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Region> {
        self.regions.get(index)
    }

    pub fn iter(&self) -> slice::Iter<'_, Region> {
        self.regions.iter()
    }

    pub fn as_slice(&self) -> &[Region] {
        &self.regions
    }

    /// The index of the region starting at `start`, if there is one.
    pub fn position(&self, start: usize) -> Option<usize> {
        self.regions
            .binary_search_by_key(&start, Region::start)
            .ok()
    }

    /// Carve `size` bytes off the front of the hole at `index`, returning the
    /// start of the new allocated region.
    ///
    /// If the hole is exactly `size` bytes it is converted in place; otherwise
    /// a new entry is inserted before it, and the hole shrinks to what is left.
    ///
    /// On error, the list is unchanged.
    pub(crate) fn split(
        &mut self,
        index: usize,
        size: usize,
        stamp: u32,
        max_regions: usize,
    ) -> Result<usize, AllocError> {
        let hole = match self.regions.get(index) {
            Some(region) => *region,
            None => return Err(violation("split index outside the live range")),
        };
        if !hole.is_hole() {
            return Err(violation("split target is not a hole"));
        }
        if size == 0 || size % ALIGNMENT != 0 || size > hole.size {
            return Err(violation("split size does not fit the hole"));
        }

        if size == hole.size {
            debug!("Converting hole {} to an allocation", hole);
            self.regions[index].kind = RegionKind::Allocated(stamp);
            return Ok(hole.start);
        }

        if self.regions.len() >= max_regions {
            debug!(
                "Can't split {} bytes off {}: already at {} regions",
                size, hole, max_regions
            );
            return Err(AllocError::RegionLimit { max_regions });
        }

        debug!("Splitting {} bytes off {}", size, hole);
        let remainder = &mut self.regions[index];
        remainder.start += size;
        remainder.size -= size;
        self.regions.insert(
            index,
            Region {
                start: hole.start,
                size,
                kind: RegionKind::Allocated(stamp),
            },
        );

        Ok(hole.start)
    }

    /// Turn the region at `index` back into a hole, and merge it with any
    /// neighbouring holes. Returns the number of entries removed by merging.
    ///
    /// On error, the list is unchanged.
    pub(crate) fn release(&mut self, index: usize) -> Result<usize, AllocError> {
        match self.regions.get_mut(index) {
            Some(region) => region.kind = RegionKind::Hole,
            None => return Err(violation("release index outside the live range")),
        }
        self.coalesce(index)
    }

    /// Collapse every run of adjacent holes into a single hole, in one pass
    /// from the front of the list. `index` is the hole that was just freed.
    pub(crate) fn coalesce(&mut self, index: usize) -> Result<usize, AllocError> {
        match self.regions.get(index) {
            Some(region) if region.is_hole() => {}
            Some(_) => return Err(violation("coalesce target is not a hole")),
            None => return Err(violation("coalesce index outside the live range")),
        }

        let before = self.regions.len();
        // dedup_by passes (current, last kept); runs fold into their first hole.
        self.regions.dedup_by(|next, previous| {
            if previous.is_hole() && next.is_hole() {
                previous.size += next.size;
                true
            } else {
                false
            }
        });

        let merged = before - self.regions.len();
        if merged > 0 {
            debug!("Coalesced {} holes around region {}", merged, index);
        }
        Ok(merged)
    }

    /// Check current usage of the list, and whether it validly partitions an
    /// arena of `total` bytes.
    pub fn stats(&self, total: usize) -> (Validity, Stats) {
        let mut validity: Validity = Default::default();
        let mut stats: Stats = Default::default();

        let mut previous: Option<&Region> = None;
        let mut covered: usize = 0;
        for region in self.iter() {
            match previous.map(|p| p.relation(region)) {
                Some(Relation::Before) => {
                    // Right order, but there is space nobody tracks.
                    validity.gaps += 1;
                }
                Some(Relation::AdjacentBefore) => {
                    // This is valid; just check the holes were merged.
                    if previous.map_or(false, Region::is_hole) && region.is_hole() {
                        validity.adjacent_holes += 1;
                    }
                }
                Some(Relation::Overlapping) => {
                    validity.overlaps += 1;
                }
                Some(Relation::AdjacentAfter) | Some(Relation::After) => {
                    validity.out_of_orders += 1;
                }
                None => {
                    if region.start != 0 {
                        validity.gaps += 1;
                    }
                }
            }

            if region.size == 0 || region.start % ALIGNMENT != 0 || region.size % ALIGNMENT != 0
            {
                validity.misaligned += 1;
            }

            stats.regions += 1;
            if region.is_hole() {
                stats.holes += 1;
                stats.free_bytes += region.size;
                stats.largest_hole = stats.largest_hole.max(region.size);
            } else {
                stats.allocations += 1;
                stats.allocated_bytes += region.size;
            }
            covered += region.size;
            previous = Some(region);
        }

        validity.size_mismatch = covered != total;

        (validity, stats)
    }
}

impl<'list> IntoIterator for &'list RegionList {
    type Item = &'list Region;
    type IntoIter = slice::Iter<'list, Region>;

    fn into_iter(self) -> Self::IntoIter {
        self.regions.iter()
    }
}

impl fmt::Display for RegionList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RegionList(")?;
        let mut start = true;
        for region in self {
            if !start {
                write!(f, ", ")?;
            } else {
                start = false;
            }
            write!(f, "{}", region)?;
        }

        write!(f, ")")
    }
}
