//! Address-range index with lock-free readers
//!
//! The live blocks of one kind are kept in an immutable snapshot sorted by
//! start address. Writers serialize on a mutex, build a new snapshot with the
//! change applied and publish it with a single atomic swap. Readers announce
//! themselves on an in-flight counter, load the snapshot and binary-search
//! it: no lock, no allocation, no deallocation, `O(log n)` steps.
//!
//! A replaced snapshot goes on a retire list owned by the writers. It is
//! freed by the first writer that sees no reader in flight, so memory is only
//! ever released on a writer's thread.
//!
//! A null snapshot pointer means "not set up"; every lookup on it misses.

use crate::error::{CodemapError, CodemapResult};
use crossbeam::utils::CachePadded;
use parking_lot::Mutex;
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Half-open address range `[start, stop)` covered by a block.
pub trait AddressRange {
    /// First covered address
    fn start(&self) -> usize;
    /// One past the last covered address
    fn stop(&self) -> usize;

    /// True if `address` is covered
    fn contains(&self, address: usize) -> bool {
        self.start() <= address && address < self.stop()
    }
}

/// Result of removing a range from one index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreeOutcome {
    /// A block with exactly these bounds was removed
    Removed,
    /// No live block intersects the range
    Absent,
    /// A live block intersects the range but its bounds differ; nothing was
    /// removed
    Mismatched,
}

struct Snapshot<B> {
    blocks: Box<[Arc<B>]>,
}

impl<B: AddressRange> Snapshot<B> {
    fn empty() -> Self {
        Self {
            blocks: Box::new([]),
        }
    }

    fn find(&self, address: usize) -> Option<&B> {
        let idx = self.blocks.partition_point(|b| b.start() <= address);
        let candidate = self.blocks.get(idx.checked_sub(1)?)?;
        candidate.contains(address).then(|| &**candidate)
    }

    /// First live block intersecting `[start, stop)`, if any.
    fn first_overlap(&self, start: usize, stop: usize) -> Option<&B> {
        let idx = self.blocks.partition_point(|b| b.stop() <= start);
        self.blocks
            .get(idx)
            .map(|b| &**b)
            .filter(|b| b.start() < stop)
    }
}

/// Snapshots swapped out but possibly still seen by a reader.
type RetireList<B> = Vec<Box<Snapshot<B>>>;

/// Sorted, snapshot-published registry of non-overlapping blocks.
pub struct BlockIndex<B> {
    current: AtomicPtr<Snapshot<B>>,
    readers: CachePadded<AtomicUsize>,
    retired: Mutex<RetireList<B>>,
    name: &'static str,
}

/// Read access to the snapshot that was current when it was created.
///
/// Nothing the reader can reach is freed while it is alive. Creating and
/// dropping a reader takes no lock and does not touch the heap, so it can
/// be done from a signal handler.
pub struct IndexReader<'a, B> {
    readers: &'a AtomicUsize,
    snapshot: Option<&'a Snapshot<B>>,
}

impl<B: AddressRange> IndexReader<'_, B> {
    /// The live block covering `address`
    pub fn find(&self, address: usize) -> Option<&B> {
        self.snapshot?.find(address)
    }

    /// False if the index was not set up when the reader was created
    pub fn is_set_up(&self) -> bool {
        self.snapshot.is_some()
    }

    /// Number of live blocks
    pub fn len(&self) -> usize {
        self.snapshot.map_or(0, |s| s.blocks.len())
    }

    /// True if no block is live
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lowest start and highest stop over all live blocks
    pub fn bounds(&self) -> Option<(usize, usize)> {
        let blocks = &self.snapshot?.blocks;
        Some((blocks.first()?.start(), blocks.last()?.stop()))
    }
}

impl<B> Drop for IndexReader<'_, B> {
    fn drop(&mut self) {
        self.readers.fetch_sub(1, Ordering::SeqCst);
    }
}

impl<B> BlockIndex<B> {
    /// Create an index that is not yet set up. `name` labels log records.
    pub const fn new(name: &'static str) -> Self {
        Self {
            current: AtomicPtr::new(ptr::null_mut()),
            readers: CachePadded::new(AtomicUsize::new(0)),
            retired: parking_lot::const_mutex(Vec::new()),
            name,
        }
    }
}

impl<B: AddressRange + Send + Sync> BlockIndex<B> {
    /// Start reading the current snapshot.
    pub fn read(&self) -> IndexReader<'_, B> {
        self.readers.fetch_add(1, Ordering::SeqCst);
        let current = self.current.load(Ordering::SeqCst);
        // SAFETY: a snapshot is freed only by a writer that swapped it out
        // and afterwards saw the in-flight count at zero. The increment above
        // is ordered before this load, so either that writer sees it, or the
        // swap came first and this load returned the newer pointer.
        let snapshot = unsafe { current.as_ref() };
        IndexReader {
            readers: &self.readers,
            snapshot,
        }
    }

    /// Replace the contents with an empty snapshot.
    pub fn reset(&self) {
        let mut retired = self.retired.lock();
        self.publish(&mut retired, Some(Snapshot::empty()));
        debug!(target: "codemap::index", index = self.name, "index_reset");
    }

    /// Drop the snapshot; the index behaves as not set up afterwards.
    pub fn clear(&self) {
        let mut retired = self.retired.lock();
        self.publish(&mut retired, None);
        debug!(target: "codemap::index", index = self.name, "index_cleared");
    }

    /// True between [`reset`](Self::reset) and [`clear`](Self::clear)
    pub fn is_set_up(&self) -> bool {
        self.read().is_set_up()
    }

    /// Insert `block`, rejecting empty ranges and overlaps with live blocks.
    pub fn insert(&self, block: B) -> CodemapResult<()> {
        let (start, stop) = (block.start(), block.stop());
        if stop <= start {
            return Err(CodemapError::EmptyRange { start, stop });
        }

        let mut retired = self.retired.lock();
        let snapshot = self.writer_view(&retired).ok_or(CodemapError::NotSetUp)?;

        if let Some(existing) = snapshot.first_overlap(start, stop) {
            return Err(CodemapError::Overlap {
                start,
                stop,
                existing_start: existing.start(),
                existing_stop: existing.stop(),
            });
        }

        let pos = snapshot.blocks.partition_point(|b| b.start() < start);
        let mut blocks = Vec::with_capacity(snapshot.blocks.len() + 1);
        blocks.extend_from_slice(&snapshot.blocks[..pos]);
        blocks.push(Arc::new(block));
        blocks.extend_from_slice(&snapshot.blocks[pos..]);

        let live = blocks.len();
        self.publish(
            &mut retired,
            Some(Snapshot {
                blocks: blocks.into_boxed_slice(),
            }),
        );
        debug!(
            target: "codemap::index",
            index = self.name,
            start,
            stop,
            live,
            "block_inserted"
        );
        Ok(())
    }

    /// Remove the block registered with exactly `[start, stop)`.
    pub fn remove_exact(&self, start: usize, stop: usize) -> FreeOutcome {
        let mut retired = self.retired.lock();
        let Some(snapshot) = self.writer_view(&retired) else {
            return FreeOutcome::Absent;
        };

        let pos = snapshot.blocks.partition_point(|b| b.start() < start);
        let exact = snapshot
            .blocks
            .get(pos)
            .is_some_and(|b| b.start() == start && b.stop() == stop);
        if !exact {
            return if stop > start && snapshot.first_overlap(start, stop).is_some() {
                FreeOutcome::Mismatched
            } else {
                FreeOutcome::Absent
            };
        }

        let mut blocks = Vec::with_capacity(snapshot.blocks.len() - 1);
        blocks.extend_from_slice(&snapshot.blocks[..pos]);
        blocks.extend_from_slice(&snapshot.blocks[pos + 1..]);

        let live = blocks.len();
        self.publish(
            &mut retired,
            Some(Snapshot {
                blocks: blocks.into_boxed_slice(),
            }),
        );
        debug!(
            target: "codemap::index",
            index = self.name,
            start,
            stop,
            live,
            "block_removed"
        );
        FreeOutcome::Removed
    }

    /// Number of live blocks
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// True if no block is live
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lowest start and highest stop over all live blocks.
    pub fn bounds(&self) -> Option<(usize, usize)> {
        self.read().bounds()
    }

    /// Snapshots waiting for their last reader to finish
    pub fn retired_len(&self) -> usize {
        self.retired.lock().len()
    }

    /// Free retired snapshots if no reader is in flight. Returns how many
    /// are still waiting.
    pub fn reclaim(&self) -> usize {
        let mut retired = self.retired.lock();
        self.reclaim_locked(&mut retired);
        retired.len()
    }

    /// The current snapshot as seen by a writer holding the lock.
    fn writer_view<'w>(&self, _retired: &'w RetireList<B>) -> Option<&'w Snapshot<B>> {
        // SAFETY: snapshots are only freed by lock holders, and the current
        // one is never on the retire list.
        unsafe { self.current.load(Ordering::Acquire).as_ref() }
    }

    /// Swap in a new snapshot and retire the old one.
    fn publish(&self, retired: &mut RetireList<B>, next: Option<Snapshot<B>>) {
        let next = next.map_or(ptr::null_mut(), |s| Box::into_raw(Box::new(s)));
        let old = self.current.swap(next, Ordering::SeqCst);
        if !old.is_null() {
            // SAFETY: every non-null `current` comes from `Box::into_raw`
            // above, and the swap made `old` unreachable for new readers.
            retired.push(unsafe { Box::from_raw(old) });
        }
        self.reclaim_locked(retired);
    }

    fn reclaim_locked(&self, retired: &mut RetireList<B>) {
        if retired.is_empty() || self.readers.load(Ordering::SeqCst) != 0 {
            return;
        }
        let freed = retired.len();
        retired.clear();
        debug!(target: "codemap::index", index = self.name, freed, "snapshots_reclaimed");
    }
}

impl<B> Drop for BlockIndex<B> {
    fn drop(&mut self) {
        let current = *self.current.get_mut();
        if !current.is_null() {
            // SAFETY: `&mut self` guarantees no reader or writer is active,
            // and `current` came from `Box::into_raw`.
            drop(unsafe { Box::from_raw(current) });
        }
    }
}

impl<B> std::fmt::Debug for BlockIndex<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockIndex")
            .field("name", &self.name)
            .field("readers", &self.readers.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
