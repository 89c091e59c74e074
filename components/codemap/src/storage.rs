//! Codemap storage
//!
//! Owns one [`BlockIndex`] per namespace: codemap blocks (merge-point logs)
//! and frame-depth blocks. The two namespaces are independent, so a codemap
//! block and a frame-depth block may cover the same range.
//!
//! # Read path
//!
//! [`unpack_traceback_into`](CodemapStorage::unpack_traceback_into),
//! [`stack_depth_at_loc`](CodemapStorage::stack_depth_at_loc) and
//! [`codemap_block_start`](CodemapStorage::codemap_block_start) never lock,
//! never log, never allocate and never free. Their running time depends only
//! on the number of live blocks (binary search) and on the size of the one
//! block's log. Snapshots they might still be reading are freed later by a
//! writer. They can be called from a fault handler that interrupted a writer.
//!
//! # Not-found policies
//!
//! A missing codemap block yields an empty traceback; a missing frame-depth
//! block yields [`NO_STACK_DEPTH`]. Neither collides with decoded content.

use crate::config::{CodemapConfig, ViolationPolicy};
use crate::error::{CodemapError, CodemapResult};
use crate::frame_depth::FrameDepthBlock;
use crate::index::{BlockIndex, FreeOutcome};
use crate::payload::{CodemapBlock, LocationId};
use crate::traceback;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

/// Returned by [`CodemapStorage::stack_depth_at_loc`] when no frame-depth
/// block covers the address.
pub const NO_STACK_DEPTH: i64 = -1;

/// Per-namespace result of [`CodemapStorage::free_block_range`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreedBlocks {
    /// Outcome in the codemap namespace
    pub codemap: FreeOutcome,
    /// Outcome in the frame-depth namespace
    pub frame_depth: FreeOutcome,
}

impl FreedBlocks {
    /// True if either namespace had a partial match
    pub fn has_mismatch(&self) -> bool {
        self.codemap == FreeOutcome::Mismatched || self.frame_depth == FreeOutcome::Mismatched
    }
}

/// Point-in-time counters for a storage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageStats {
    /// Live codemap blocks
    pub codemap_blocks: usize,
    /// Live frame-depth blocks
    pub frame_depth_blocks: usize,
    /// Lowest start and highest stop over live codemap blocks
    pub codemap_bounds: Option<(usize, usize)>,
    /// Successful registrations since construction (both namespaces)
    pub registrations: u64,
    /// Blocks removed since construction (both namespaces)
    pub removals: u64,
    /// Rejected registrations and partial frees since construction
    pub violations: u64,
    /// Replaced snapshots not yet freed because a reader was in flight
    pub retired_snapshots: usize,
}

/// Registry of compiled-code debug metadata.
///
/// # Example
///
/// ```
/// use codemap::{CodemapBuilder, CodemapStorage, NO_STACK_DEPTH};
///
/// let storage = CodemapStorage::new();
/// storage.setup();
///
/// let mut builder = CodemapBuilder::new();
/// builder.debug_merge_point(0, 102, 0);
/// builder.debug_merge_point(1, 104, 15);
/// storage.register_codemap_block(builder.get_final_bytecode(100, 40)).unwrap();
/// storage
///     .register_frame_depth_block(100, 140, vec![0, 20], vec![3, 4])
///     .unwrap();
///
/// assert_eq!(storage.unpack_traceback(117), vec![102, 104]);
/// assert_eq!(storage.stack_depth_at_loc(125), 4);
/// assert_eq!(storage.stack_depth_at_loc(140), NO_STACK_DEPTH);
///
/// storage.free_block_range(100, 140);
/// assert!(storage.unpack_traceback(117).is_empty());
/// storage.teardown();
/// ```
#[derive(Debug)]
pub struct CodemapStorage {
    config: CodemapConfig,
    codemaps: BlockIndex<CodemapBlock>,
    frame_depths: BlockIndex<FrameDepthBlock>,
    registrations: AtomicU64,
    removals: AtomicU64,
    violations: AtomicU64,
}

impl CodemapStorage {
    /// Create a storage with the default configuration. It must be
    /// [`setup`](Self::setup) before blocks can be registered.
    pub const fn new() -> Self {
        Self::with_config(CodemapConfig::DEFAULT)
    }

    /// Create a storage with a custom configuration.
    pub const fn with_config(config: CodemapConfig) -> Self {
        Self {
            config,
            codemaps: BlockIndex::new("codemap"),
            frame_depths: BlockIndex::new("frame_depth"),
            registrations: AtomicU64::new(0),
            removals: AtomicU64::new(0),
            violations: AtomicU64::new(0),
        }
    }

    /// The active configuration
    pub fn config(&self) -> &CodemapConfig {
        &self.config
    }

    /// Install empty registries, discarding anything registered before.
    pub fn setup(&self) {
        self.codemaps.reset();
        self.frame_depths.reset();
        info!(target: "codemap::storage", "codemap_setup");
    }

    /// Release all registries. Later queries report not-found and
    /// registrations fail with [`CodemapError::NotSetUp`].
    pub fn teardown(&self) {
        let codemaps = self.codemaps.len();
        let frame_depths = self.frame_depths.len();
        self.codemaps.clear();
        self.frame_depths.clear();
        info!(
            target: "codemap::storage",
            codemaps,
            frame_depths,
            "codemap_teardown"
        );
    }

    /// True between [`setup`](Self::setup) and [`teardown`](Self::teardown)
    pub fn is_set_up(&self) -> bool {
        self.codemaps.is_set_up()
    }

    /// Register the block just finalized by a
    /// [`CodemapBuilder`](crate::CodemapBuilder).
    pub fn register_codemap_block(&self, block: CodemapBlock) -> CodemapResult<()> {
        let result = self.codemaps.insert(block);
        self.account_registration(&result);
        result
    }

    /// Register the frame-depth table of the block `[start, stop)`.
    ///
    /// `offsets` are relative to `start`, strictly increasing, and below
    /// `stop - start`; `depths` is parallel to them.
    pub fn register_frame_depth_block(
        &self,
        start: usize,
        stop: usize,
        offsets: Vec<usize>,
        depths: Vec<i64>,
    ) -> CodemapResult<()> {
        let result = FrameDepthBlock::new(start, stop, offsets, depths)
            .and_then(|block| self.frame_depths.insert(block));
        self.account_registration(&result);
        result
    }

    /// Remove, from each namespace, the block registered with exactly
    /// `[start, stop)`.
    ///
    /// Readers still looking at a removed block keep a valid view until they
    /// finish; the memory is reclaimed afterwards.
    pub fn free_block_range(&self, start: usize, stop: usize) -> FreedBlocks {
        let freed = FreedBlocks {
            codemap: self.codemaps.remove_exact(start, stop),
            frame_depth: self.frame_depths.remove_exact(start, stop),
        };
        let removed = [freed.codemap, freed.frame_depth]
            .iter()
            .filter(|o| **o == FreeOutcome::Removed)
            .count() as u64;
        self.removals.fetch_add(removed, Ordering::Relaxed);

        if freed.has_mismatch() {
            self.violations.fetch_add(1, Ordering::Relaxed);
            warn!(
                target: "codemap::storage",
                start,
                stop,
                codemap = ?freed.codemap,
                frame_depth = ?freed.frame_depth,
                "free_range_mismatch"
            );
            if self.config.violation_policy == ViolationPolicy::Panic {
                panic!("free_block_range({start:#x}, {stop:#x}) does not match a registered block");
            }
        }
        freed
    }

    /// Run `f` on the live codemap block covering `address`.
    ///
    /// The block cannot be freed while `f` runs. Returns `None` if no block
    /// covers `address`.
    pub fn find_codemap_block<R>(
        &self,
        address: usize,
        f: impl FnOnce(&CodemapBlock) -> R,
    ) -> Option<R> {
        self.codemaps.read().find(address).map(f)
    }

    /// Start address of the codemap block covering `address`.
    pub fn codemap_block_start(&self, address: usize) -> Option<usize> {
        self.find_codemap_block(address, CodemapBlock::start)
    }

    /// Call chain active at `address`, outermost first.
    ///
    /// Empty if no codemap block covers `address`. At most
    /// `max_traceback_depth` frames are returned.
    pub fn unpack_traceback(&self, address: usize) -> Vec<LocationId> {
        self.find_codemap_block(address, |block| {
            traceback::reconstruct_capped(
                block.payload(),
                address - block.start(),
                self.config.max_traceback_depth,
            )
        })
        .unwrap_or_default()
    }

    /// Allocation-free form of [`unpack_traceback`](Self::unpack_traceback).
    ///
    /// Writes the outermost frames into `out` and returns the full chain
    /// length, which is 0 if no codemap block covers `address`.
    pub fn unpack_traceback_into(&self, address: usize, out: &mut [LocationId]) -> usize {
        self.find_codemap_block(address, |block| {
            traceback::reconstruct_into(block.payload(), address - block.start(), out)
        })
        .unwrap_or(0)
    }

    /// Interpreter stack depth at `address`, or [`NO_STACK_DEPTH`].
    pub fn stack_depth_at_loc(&self, address: usize) -> i64 {
        let reader = self.frame_depths.read();
        reader
            .find(address)
            .and_then(|block| block.depth_at(address))
            .unwrap_or(NO_STACK_DEPTH)
    }

    /// Free snapshots retired while readers were in flight, if none is in
    /// flight now. Returns how many are still waiting.
    ///
    /// Every registration and free does this too; call it when the code
    /// generator goes idle after a burst of concurrent queries.
    pub fn reclaim_retired(&self) -> usize {
        let pending = self.codemaps.reclaim() + self.frame_depths.reclaim();
        debug!(target: "codemap::storage", pending, "reclaim_retired");
        pending
    }

    /// Snapshot of block counts and counters
    pub fn stats(&self) -> StorageStats {
        StorageStats {
            codemap_blocks: self.codemaps.len(),
            frame_depth_blocks: self.frame_depths.len(),
            codemap_bounds: self.codemaps.bounds(),
            registrations: self.registrations.load(Ordering::Relaxed),
            removals: self.removals.load(Ordering::Relaxed),
            violations: self.violations.load(Ordering::Relaxed),
            retired_snapshots: self.codemaps.retired_len() + self.frame_depths.retired_len(),
        }
    }

    fn account_registration(&self, result: &CodemapResult<()>) {
        match result {
            Ok(()) => {
                self.registrations.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                self.violations.fetch_add(1, Ordering::Relaxed);
                warn!(target: "codemap::storage", error = %err, "registration_rejected");
                if self.config.violation_policy == ViolationPolicy::Panic {
                    panic!("codemap registration rejected: {err}");
                }
            }
        }
    }
}

impl Default for CodemapStorage {
    fn default() -> Self {
        Self::new()
    }
}
