//! Traceback reconstruction from a merge-point log
//!
//! Replays the events of a block up to a given offset. Every event truncates
//! the call chain to `depth + 1` frames and overwrites frame `depth`, which
//! covers pushing an inlined frame, replacing the current one, and popping
//! back to an outer one.

use crate::config::CodemapConfig;
use crate::payload::{EncodedPayload, LocationId};

/// Location stored in chain slots that no event has set. Only appears when a
/// log jumps more than one level deeper in a single event.
///
/// The value is reserved: code generators must not record it as a real
/// location.
pub const UNKNOWN_LOCATION: LocationId = LocationId::MIN;

/// Replay `payload` up to `relative_offset` (inclusive), calling `set` for
/// every processed event with the current chain length and the event.
/// Returns the final chain length.
#[inline]
fn replay(
    payload: &EncodedPayload,
    relative_offset: usize,
    mut set: impl FnMut(usize, usize, LocationId),
) -> usize {
    let mut len = 0;
    for event in payload.events() {
        if event.offset > relative_offset {
            break;
        }
        set(len, event.depth, event.location);
        len = event.depth.saturating_add(1);
    }
    len
}

/// Reconstruct the call chain active at `relative_offset`, outermost first.
///
/// Returns an empty vector when no event is at or before `relative_offset`.
/// At most the default `max_traceback_depth` outermost frames are kept.
pub fn reconstruct(payload: &EncodedPayload, relative_offset: usize) -> Vec<LocationId> {
    reconstruct_capped(
        payload,
        relative_offset,
        CodemapConfig::DEFAULT.max_traceback_depth,
    )
}

/// Like [`reconstruct`], keeping at most the `cap` outermost frames.
pub fn reconstruct_capped(
    payload: &EncodedPayload,
    relative_offset: usize,
    cap: usize,
) -> Vec<LocationId> {
    let mut stack: Vec<LocationId> = Vec::new();
    replay(payload, relative_offset, |_, depth, location| {
        if depth >= cap {
            stack.resize(cap, UNKNOWN_LOCATION);
            return;
        }
        stack.resize(depth + 1, UNKNOWN_LOCATION);
        stack[depth] = location;
    });
    stack
}

/// Reconstruct the call chain into `out` without allocating.
///
/// Returns the true length of the chain. When the chain is deeper than
/// `out`, only the outermost `out.len()` frames are written.
pub fn reconstruct_into(
    payload: &EncodedPayload,
    relative_offset: usize,
    out: &mut [LocationId],
) -> usize {
    replay(payload, relative_offset, |len, depth, location| {
        let fill_end = depth.min(out.len());
        if len < fill_end {
            out[len..fill_end].fill(UNKNOWN_LOCATION);
        }
        if let Some(slot) = out.get_mut(depth) {
            *slot = location;
        }
    })
}
