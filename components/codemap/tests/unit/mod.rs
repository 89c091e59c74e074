//! Unit tests for codemap components

use codemap::traceback::{reconstruct, reconstruct_into};
use codemap::{
    CodemapBuilder, CodemapStorage, FreeOutcome, LocationId, MergePoint, NO_STACK_DEPTH,
    UNKNOWN_LOCATION,
};
use proptest::prelude::*;

fn set_up() -> CodemapStorage {
    let storage = CodemapStorage::new();
    storage.setup();
    storage
}

fn build(start: usize, length: usize, events: &[(usize, LocationId, usize)]) -> codemap::CodemapBlock {
    let mut builder = CodemapBuilder::new();
    for &(depth, location, offset) in events {
        builder.debug_merge_point(depth, location, offset);
    }
    builder.get_final_bytecode(start, length)
}

/// Straightforward stack simulation used as the reference for replay.
fn simulate(events: &[(usize, LocationId, usize)], relative_offset: usize) -> Vec<LocationId> {
    let mut stack = Vec::new();
    for &(depth, location, offset) in events {
        if offset > relative_offset {
            break;
        }
        while stack.len() > depth + 1 {
            stack.pop();
        }
        while stack.len() < depth + 1 {
            stack.push(UNKNOWN_LOCATION);
        }
        stack[depth] = location;
    }
    stack
}

// ============================================================================
// Codemap registration
// ============================================================================

#[test]
fn test_register_codemap() {
    let storage = set_up();
    storage.register_codemap_block(build(100, 20, &[(0, 13, 0)])).unwrap();
    storage.register_codemap_block(build(300, 30, &[(0, 16, 0)])).unwrap();
    storage.register_codemap_block(build(200, 100, &[(0, 19, 0)])).unwrap();

    let raw100 = storage.codemap_block_start(100);
    assert_eq!(raw100, Some(100));
    assert_eq!(storage.codemap_block_start(119), raw100);
    assert_eq!(storage.codemap_block_start(120), None);

    let raw200 = storage.codemap_block_start(200);
    assert_ne!(raw200, raw100);
    assert_eq!(storage.codemap_block_start(299), raw200);

    let raw300 = storage.codemap_block_start(329);
    assert!(raw300 != raw100 && raw300 != raw200);
    assert_eq!(storage.codemap_block_start(300), raw300);

    storage.teardown();
}

#[test]
fn test_traceback_at_block_start() {
    let storage = set_up();
    storage.register_codemap_block(build(4096, 64, &[(0, 77, 0), (1, 78, 10)])).unwrap();
    assert_eq!(storage.unpack_traceback(4096), vec![77]);
}

// ============================================================================
// Frame depth
// ============================================================================

#[test]
fn test_find_jit_frame_depth() {
    let storage = set_up();
    storage.register_frame_depth_block(11, 26, vec![0, 5, 10], vec![1, 2, 3]).unwrap();
    storage.register_frame_depth_block(30, 41, vec![0, 5, 10], vec![4, 5, 6]).unwrap();
    storage.register_frame_depth_block(0, 11, vec![0, 5, 10], vec![7, 8, 9]).unwrap();

    let minus_three = 0usize.wrapping_sub(3);
    assert_eq!(storage.stack_depth_at_loc(13), 1);
    assert_eq!(storage.stack_depth_at_loc(minus_three), NO_STACK_DEPTH);
    assert_eq!(storage.stack_depth_at_loc(40), 6);
    assert_eq!(storage.stack_depth_at_loc(41), NO_STACK_DEPTH);
    assert_eq!(storage.stack_depth_at_loc(5), 8);
    assert_eq!(storage.stack_depth_at_loc(17), 2);
    assert_eq!(storage.stack_depth_at_loc(38), 5);
    assert_eq!(storage.stack_depth_at_loc(25), 3);
    assert_eq!(storage.stack_depth_at_loc(26), NO_STACK_DEPTH);
    assert_eq!(storage.stack_depth_at_loc(11), 1);
    assert_eq!(storage.stack_depth_at_loc(10), 9);

    assert_eq!(storage.free_block_range(11, 26).frame_depth, FreeOutcome::Removed);
    assert_eq!(storage.stack_depth_at_loc(11), NO_STACK_DEPTH);
    assert_eq!(storage.stack_depth_at_loc(13), NO_STACK_DEPTH);
    assert_eq!(storage.stack_depth_at_loc(minus_three), NO_STACK_DEPTH);
    assert_eq!(storage.stack_depth_at_loc(40), 6);
    assert_eq!(storage.stack_depth_at_loc(41), NO_STACK_DEPTH);
    assert_eq!(storage.stack_depth_at_loc(5), 8);
    assert_eq!(storage.stack_depth_at_loc(38), 5);
    assert_eq!(storage.stack_depth_at_loc(10), 9);

    storage.teardown();
}

// ============================================================================
// Tracebacks
// ============================================================================

#[test]
fn test_codemaps() {
    let storage = set_up();
    storage
        .register_codemap_block(build(
            100,
            40,
            &[
                (0, 102, 0),
                (0, 102, 13),
                (1, 104, 15),
                (1, 104, 16),
                (2, 106, 20),
                (2, 106, 25),
                (1, 104, 30),
                (0, 102, 35),
            ],
        ))
        .unwrap();
    storage
        .register_codemap_block(build(
            200,
            100,
            &[
                (0, 202, 0),
                (0, 202, 10),
                (1, 204, 20),
                (1, 204, 30),
                (2, 206, 40),
                (2, 206, 50),
                (1, 204, 60),
                (0, 202, 70),
            ],
        ))
        .unwrap();

    assert_eq!(storage.unpack_traceback(110), vec![102]);
    assert_eq!(storage.unpack_traceback(117), vec![102, 104]);
    assert_eq!(storage.unpack_traceback(121), vec![102, 104, 106]);
    assert_eq!(storage.unpack_traceback(131), vec![102, 104]);
    assert_eq!(storage.unpack_traceback(137), vec![102]);
    assert_eq!(storage.unpack_traceback(205), vec![202]);
    assert_eq!(storage.unpack_traceback(225), vec![202, 204]);
    assert_eq!(storage.unpack_traceback(245), vec![202, 204, 206]);
    assert_eq!(storage.unpack_traceback(265), vec![202, 204]);
    assert_eq!(storage.unpack_traceback(275), vec![202]);

    storage.free_block_range(200, 300);
    assert_eq!(storage.unpack_traceback(225), Vec::<LocationId>::new());
    assert_eq!(storage.unpack_traceback(110), vec![102]);
    storage.teardown();
}

#[test]
fn test_traceback_into_fixed_buffer() {
    let storage = set_up();
    storage
        .register_codemap_block(build(0, 40, &[(0, 1, 0), (1, 2, 10), (2, 3, 20)]))
        .unwrap();

    let mut frames = [0 as LocationId; 16];
    let len = storage.unpack_traceback_into(25, &mut frames);
    assert_eq!(&frames[..len], &[1, 2, 3]);
    assert_eq!(storage.unpack_traceback_into(40, &mut frames), 0);
}

#[test]
fn test_payload_events_iterate_in_order() {
    let block = build(0, 100, &[(0, 1, 0), (1, 2, 40), (0, 1, 90)]);
    let offsets: Vec<_> = block.payload().events().map(|e: MergePoint| e.offset).collect();
    assert_eq!(offsets, vec![0, 40, 90]);
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn test_setup_after_teardown_is_empty() {
    let storage = set_up();
    storage.register_codemap_block(build(0, 8, &[(0, 1, 0)])).unwrap();
    storage.register_frame_depth_block(0, 8, vec![0], vec![2]).unwrap();
    storage.teardown();
    storage.setup();

    assert!(storage.unpack_traceback(0).is_empty());
    assert_eq!(storage.stack_depth_at_loc(0), NO_STACK_DEPTH);
    assert_eq!(storage.stats().codemap_blocks, 0);
    assert_eq!(storage.stats().frame_depth_blocks, 0);
}

// ============================================================================
// Properties
// ============================================================================

fn event_log() -> impl Strategy<Value = Vec<(usize, LocationId, usize)>> {
    prop::collection::vec((0usize..6, any::<LocationId>(), 0usize..50), 0..40).prop_map(
        |raw| {
            let mut offset = 0;
            raw.into_iter()
                .map(|(depth, location, gap)| {
                    offset += gap;
                    (depth, location, offset)
                })
                .collect()
        },
    )
}

proptest! {
    #[test]
    fn prop_replay_matches_stack_simulation(events in event_log()) {
        let block = build(0, usize::MAX, &events);
        let decoded: Vec<_> = block
            .payload()
            .events()
            .map(|e| (e.depth, e.location, e.offset))
            .collect();
        prop_assert_eq!(&decoded, &events);

        let mut buf = [0 as LocationId; 8];
        for &(_, _, offset) in &events {
            let expected = simulate(&events, offset);
            prop_assert_eq!(reconstruct(block.payload(), offset), expected.clone());
            let len = reconstruct_into(block.payload(), offset, &mut buf);
            prop_assert_eq!(&buf[..len], expected.as_slice());
        }
    }

    #[test]
    fn prop_lookup_matches_linear_scan(
        lengths in prop::collection::vec((1usize..64, 0usize..32), 1..20),
        order_seed in any::<u64>(),
        probes in prop::collection::vec(0usize..3000, 1..64),
    ) {
        // lay blocks out left to right with gaps, then register in shuffled order
        let mut ranges = Vec::new();
        let mut cursor = 0;
        for (len, gap) in lengths {
            cursor += gap;
            ranges.push((cursor, len));
            cursor += len;
        }
        let mut order: Vec<usize> = (0..ranges.len()).collect();
        let mut seed = order_seed;
        for i in (1..order.len()).rev() {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            order.swap(i, (seed >> 33) as usize % (i + 1));
        }

        let storage = set_up();
        for &i in &order {
            let (start, len) = ranges[i];
            storage.register_codemap_block(build(start, len, &[])).unwrap();
        }

        for address in probes {
            let expected = ranges
                .iter()
                .find(|&&(start, len)| start <= address && address < start + len)
                .map(|&(start, _)| start);
            prop_assert_eq!(storage.codemap_block_start(address), expected);
        }
    }
}
