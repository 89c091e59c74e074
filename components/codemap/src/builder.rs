//! Incremental merge-point log encoder
//!
//! The code generator feeds one event per merge point while it lays out a
//! block, then finalizes the log into a [`CodemapBlock`] that can be moved
//! into storage.

use crate::payload::{CodemapBlock, EncodedPayload, LocationId};
use crate::varint;

/// Records merge points for the block currently being generated.
///
/// # Example
///
/// ```
/// use codemap::CodemapBuilder;
///
/// let mut builder = CodemapBuilder::new();
/// builder.debug_merge_point(0, 102, 0);
/// builder.debug_merge_point(1, 104, 15);
/// let block = builder.get_final_bytecode(100, 40);
///
/// assert_eq!(block.start(), 100);
/// assert_eq!(block.payload().events().count(), 2);
/// assert!(builder.is_empty());
/// ```
#[derive(Debug, Default)]
pub struct CodemapBuilder {
    buffer: Vec<u8>,
    last_offset: usize,
    event_count: usize,
}

impl CodemapBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that, from `offset` on, frame `depth` of the call chain is
    /// `location` and every deeper frame is gone.
    ///
    /// Offsets must be non-decreasing across calls for one block. This is
    /// not checked.
    pub fn debug_merge_point(&mut self, depth: usize, location: LocationId, offset: usize) {
        let delta = offset.wrapping_sub(self.last_offset);
        varint::encode_u64(&mut self.buffer, depth as u64);
        varint::encode_i64(&mut self.buffer, location);
        varint::encode_u64(&mut self.buffer, delta as u64);
        self.last_offset = offset;
        self.event_count += 1;
    }

    /// Number of events recorded since the last finalization
    pub fn event_count(&self) -> usize {
        self.event_count
    }

    /// True if no event has been recorded since the last finalization
    pub fn is_empty(&self) -> bool {
        self.event_count == 0
    }

    /// Finish the current block, covering `[start, start + length)`.
    ///
    /// The builder is reset and can record the next block.
    pub fn get_final_bytecode(&mut self, start: usize, length: usize) -> CodemapBlock {
        let bytes = std::mem::take(&mut self.buffer).into_boxed_slice();
        self.last_offset = 0;
        self.event_count = 0;
        CodemapBlock::new(start, length, EncodedPayload::from_bytes(bytes))
    }
}
