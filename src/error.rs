use core::fmt;

/// Errors returned by [`Allocator`](crate::Allocator) operations.
///
/// All of these are expected outcomes that leave the allocator in a
/// consistent state; none of them mutate the region list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// A size of zero (or one too large to round up) was passed to `init` or
    /// `alloc`.
    InvalidSize,
    /// The arena source could not provide the backing block.
    BackingAllocationFailure,
    /// No hole is large enough for the request.
    AllocationExhausted {
        /// The aligned size that was asked for.
        requested: usize,
    },
    /// `alloc` was called before `init`, or after `destroy`.
    Uninitialized,
    /// Splitting a hole would need more regions than the configured maximum.
    RegionLimit {
        /// The configured maximum number of regions.
        max_regions: usize,
    },
    /// An internal index or size was out of range. This indicates a bug; the
    /// operation was aborted before touching the region list.
    InvariantViolation(&'static str),
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocError::InvalidSize => write!(f, "invalid size"),
            AllocError::BackingAllocationFailure => {
                write!(f, "failed to acquire backing memory for the arena")
            }
            AllocError::AllocationExhausted { requested } => {
                write!(f, "no hole can fit {} bytes", requested)
            }
            AllocError::Uninitialized => write!(f, "allocator is not initialized"),
            AllocError::RegionLimit { max_regions } => {
                write!(f, "region list is full ({} regions)", max_regions)
            }
            AllocError::InvariantViolation(what) => {
                write!(f, "region list invariant violated: {}", what)
            }
        }
    }
}

impl core::error::Error for AllocError {}
