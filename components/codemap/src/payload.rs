//! Encoded merge-point logs and the codemap blocks that carry them
//!
//! Each event is stored as three varints: the inlining depth, the zigzag
//! encoded location id, and the offset delta from the previous event. The
//! delta uses wrapping arithmetic so any sequence round-trips exactly.

use crate::index::AddressRange;
use crate::varint;

/// Opaque identifier of a source-level (bytecode) position.
pub type LocationId = i64;

/// One recorded transition of the active call chain.
///
/// As of `offset` (relative to the block start), the chain is truncated to
/// `depth + 1` entries and entry `depth` becomes `location`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergePoint {
    /// Index of the frame this event sets (0 = outermost)
    pub depth: usize,
    /// Location id active at that depth
    pub location: LocationId,
    /// Byte offset from the start of the block
    pub offset: usize,
}

/// Immutable, self-contained encoding of one block's merge-point log.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EncodedPayload {
    bytes: Box<[u8]>,
}

impl EncodedPayload {
    pub(crate) fn from_bytes(bytes: Box<[u8]>) -> Self {
        Self { bytes }
    }

    /// Raw encoded bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Encoded size in bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True if the payload holds no events
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Iterate over the stored events in recording order.
    ///
    /// Does not allocate. A truncated or corrupt tail ends the iteration.
    pub fn events(&self) -> MergePoints<'_> {
        MergePoints {
            bytes: &self.bytes,
            offset: 0,
        }
    }
}

/// Iterator over the events of an [`EncodedPayload`].
#[derive(Debug, Clone)]
pub struct MergePoints<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> MergePoints<'a> {
    fn read(&mut self) -> Option<MergePoint> {
        let bytes: &'a [u8] = self.bytes;
        let (depth, used) = varint::decode_u64(bytes)?;
        let rest = &bytes[used..];
        let (location, used_loc) = varint::decode_i64(rest)?;
        let rest = &rest[used_loc..];
        let (delta, used_delta) = varint::decode_u64(rest)?;
        let rest = &rest[used_delta..];

        let depth = usize::try_from(depth).ok()?;
        let offset = self.offset.wrapping_add(delta as usize);
        self.bytes = rest;
        self.offset = offset;
        Some(MergePoint {
            depth,
            location,
            offset,
        })
    }
}

impl Iterator for MergePoints<'_> {
    type Item = MergePoint;

    fn next(&mut self) -> Option<MergePoint> {
        if self.bytes.is_empty() {
            return None;
        }
        let event = self.read();
        if event.is_none() {
            self.bytes = &[];
        }
        event
    }
}

/// A contiguous span of generated machine code together with its encoded
/// merge-point log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodemapBlock {
    start: usize,
    length: usize,
    payload: EncodedPayload,
}

impl CodemapBlock {
    /// Build a block from its parts.
    pub fn new(start: usize, length: usize, payload: EncodedPayload) -> Self {
        Self {
            start,
            length,
            payload,
        }
    }

    /// Absolute address of the first byte
    pub fn start(&self) -> usize {
        self.start
    }

    /// Length in bytes
    pub fn length(&self) -> usize {
        self.length
    }

    /// Absolute address one past the last byte
    pub fn stop(&self) -> usize {
        self.start.wrapping_add(self.length)
    }

    /// The block's encoded merge-point log
    pub fn payload(&self) -> &EncodedPayload {
        &self.payload
    }
}

impl AddressRange for CodemapBlock {
    fn start(&self) -> usize {
        self.start
    }

    fn stop(&self) -> usize {
        CodemapBlock::stop(self)
    }
}
