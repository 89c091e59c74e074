//! Error types for codemap registration
//!
//! Lookups never fail: a missing block is reported through each query's own
//! not-found value. Errors only describe caller-contract violations on the
//! registration path, and a rejected registration leaves the index untouched.

use thiserror::Error;

/// A caller-contract violation detected while registering a block.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodemapError {
    /// The storage has not been set up, or has been torn down.
    #[error("codemap storage is not set up")]
    NotSetUp,

    /// The new block overlaps a block that is still live.
    #[error(
        "block [{start:#x}, {stop:#x}) overlaps live block [{existing_start:#x}, {existing_stop:#x})"
    )]
    Overlap {
        /// Start of the rejected block
        start: usize,
        /// End (exclusive) of the rejected block
        stop: usize,
        /// Start of the live block it collides with
        existing_start: usize,
        /// End (exclusive) of the live block it collides with
        existing_stop: usize,
    },

    /// The block covers no addresses, or its end wraps around.
    #[error("block [{start:#x}, {stop:#x}) is empty or inverted")]
    EmptyRange {
        /// Requested start
        start: usize,
        /// Requested end (exclusive)
        stop: usize,
    },

    /// `offsets` and `depths` have different lengths.
    #[error("frame depth map has {offsets} offsets but {depths} depths")]
    LengthMismatch {
        /// Number of offsets supplied
        offsets: usize,
        /// Number of depths supplied
        depths: usize,
    },

    /// A frame depth map needs at least one entry.
    #[error("frame depth map is empty")]
    EmptyFrameDepthMap,

    /// `offsets[index]` is not greater than `offsets[index - 1]`.
    #[error("frame depth offsets are not strictly increasing at index {index}")]
    OffsetsNotIncreasing {
        /// First index that breaks the ordering
        index: usize,
    },

    /// A frame depth offset lies outside the block it describes.
    #[error("frame depth offset {offset} is outside a block spanning {span} bytes")]
    OffsetOutOfRange {
        /// The offending relative offset
        offset: usize,
        /// Byte length of the block
        span: usize,
    },
}

/// Result type for codemap registration
pub type CodemapResult<T> = Result<T, CodemapError>;
