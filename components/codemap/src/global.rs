//! Process-wide codemap storage
//!
//! Fault handlers and profilers cannot be handed a reference, so the runtime
//! keeps one [`CodemapStorage`] in a static. Call [`setup`] once at start-up
//! and [`teardown`] once at shutdown; between the two the free functions here
//! behave exactly like the methods they forward to.

use crate::error::CodemapResult;
use crate::payload::{CodemapBlock, LocationId};
use crate::storage::{CodemapStorage, FreedBlocks, StorageStats};

static STORAGE: CodemapStorage = CodemapStorage::new();

/// The process-wide storage
pub fn storage() -> &'static CodemapStorage {
    &STORAGE
}

/// Install empty registries. See [`CodemapStorage::setup`].
pub fn setup() {
    STORAGE.setup();
}

/// Release all registries. See [`CodemapStorage::teardown`].
pub fn teardown() {
    STORAGE.teardown();
}

/// See [`CodemapStorage::register_codemap_block`].
pub fn register_codemap_block(block: CodemapBlock) -> CodemapResult<()> {
    STORAGE.register_codemap_block(block)
}

/// See [`CodemapStorage::register_frame_depth_block`].
pub fn register_frame_depth_block(
    start: usize,
    stop: usize,
    offsets: Vec<usize>,
    depths: Vec<i64>,
) -> CodemapResult<()> {
    STORAGE.register_frame_depth_block(start, stop, offsets, depths)
}

/// See [`CodemapStorage::free_block_range`].
pub fn free_block_range(start: usize, stop: usize) -> FreedBlocks {
    STORAGE.free_block_range(start, stop)
}

/// See [`CodemapStorage::unpack_traceback`].
pub fn unpack_traceback(address: usize) -> Vec<LocationId> {
    STORAGE.unpack_traceback(address)
}

/// See [`CodemapStorage::unpack_traceback_into`].
pub fn unpack_traceback_into(address: usize, out: &mut [LocationId]) -> usize {
    STORAGE.unpack_traceback_into(address, out)
}

/// See [`CodemapStorage::stack_depth_at_loc`].
pub fn stack_depth_at_loc(address: usize) -> i64 {
    STORAGE.stack_depth_at_loc(address)
}

/// See [`CodemapStorage::codemap_block_start`].
pub fn codemap_block_start(address: usize) -> Option<usize> {
    STORAGE.codemap_block_start(address)
}

/// See [`CodemapStorage::stats`].
pub fn stats() -> StorageStats {
    STORAGE.stats()
}
