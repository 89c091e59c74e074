//! Frame-depth tables
//!
//! Each compiled block carries a sorted table of `(offset, depth)` pairs.
//! The interpreter stack depth at an address is the depth of the last entry
//! at or before the address's offset inside the block.

use crate::error::{CodemapError, CodemapResult};
use crate::index::AddressRange;

/// Sorted `(offset, depth)` table with floor lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameDepthMap {
    offsets: Box<[usize]>,
    depths: Box<[i64]>,
}

impl FrameDepthMap {
    /// Build a table from parallel `offsets` and `depths`.
    ///
    /// Offsets must be strictly increasing and the table must not be empty.
    pub fn new(offsets: Vec<usize>, depths: Vec<i64>) -> CodemapResult<Self> {
        if offsets.len() != depths.len() {
            return Err(CodemapError::LengthMismatch {
                offsets: offsets.len(),
                depths: depths.len(),
            });
        }
        if offsets.is_empty() {
            return Err(CodemapError::EmptyFrameDepthMap);
        }
        if let Some(index) = offsets.windows(2).position(|w| w[0] >= w[1]) {
            return Err(CodemapError::OffsetsNotIncreasing { index: index + 1 });
        }
        Ok(Self {
            offsets: offsets.into_boxed_slice(),
            depths: depths.into_boxed_slice(),
        })
    }

    /// Depth in effect at `relative_offset`, or `None` if the offset lies
    /// before the first entry.
    pub fn lookup(&self, relative_offset: usize) -> Option<i64> {
        let idx = self.offsets.partition_point(|&o| o <= relative_offset);
        idx.checked_sub(1).map(|i| self.depths[i])
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    /// Always false for a validated table
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Largest offset in the table
    pub fn last_offset(&self) -> usize {
        self.offsets.last().copied().unwrap_or(0)
    }
}

/// A frame-depth table attached to the address range `[start, stop)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameDepthBlock {
    start: usize,
    stop: usize,
    map: FrameDepthMap,
}

impl FrameDepthBlock {
    /// Validate and build a block.
    pub fn new(
        start: usize,
        stop: usize,
        offsets: Vec<usize>,
        depths: Vec<i64>,
    ) -> CodemapResult<Self> {
        if stop <= start {
            return Err(CodemapError::EmptyRange { start, stop });
        }
        let map = FrameDepthMap::new(offsets, depths)?;
        let span = stop - start;
        if map.last_offset() >= span {
            return Err(CodemapError::OffsetOutOfRange {
                offset: map.last_offset(),
                span,
            });
        }
        Ok(Self { start, stop, map })
    }

    /// Absolute start address
    pub fn start(&self) -> usize {
        self.start
    }

    /// Absolute end address (exclusive)
    pub fn stop(&self) -> usize {
        self.stop
    }

    /// Depth at absolute `address`, or `None` if the address is outside the
    /// block or before its first entry.
    pub fn depth_at(&self, address: usize) -> Option<i64> {
        if !self.contains(address) {
            return None;
        }
        self.map.lookup(address - self.start)
    }
}

impl AddressRange for FrameDepthBlock {
    fn start(&self) -> usize {
        self.start
    }

    fn stop(&self) -> usize {
        self.stop
    }
}
