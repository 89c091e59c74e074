//! Address-to-source-location index for JIT-compiled code
//!
//! For every block of generated machine code this crate records:
//! - the nested call chain of bytecode locations active at each address
//!   (a compact merge-point log, see [`CodemapBuilder`])
//! - the interpreter stack depth active at each address
//!   (a sorted frame-depth table, see [`FrameDepthMap`])
//!
//! Both are kept in a [`CodemapStorage`] that the code generator mutates and
//! that fault handlers, the deoptimizer and the profiler query by absolute
//! address. Queries take no locks and neither allocate nor free memory.
//!
//! # Example
//!
//! ```
//! use codemap::{CodemapBuilder, CodemapStorage};
//!
//! let storage = CodemapStorage::new();
//! storage.setup();
//!
//! let mut builder = CodemapBuilder::new();
//! builder.debug_merge_point(0, 102, 0);
//! builder.debug_merge_point(1, 104, 15);
//! builder.debug_merge_point(2, 106, 20);
//! builder.debug_merge_point(1, 104, 30);
//! builder.debug_merge_point(0, 102, 35);
//! storage
//!     .register_codemap_block(builder.get_final_bytecode(100, 40))
//!     .unwrap();
//!
//! assert_eq!(storage.unpack_traceback(121), vec![102, 104, 106]);
//! assert_eq!(storage.unpack_traceback(137), vec![102]);
//! assert!(storage.unpack_traceback(140).is_empty());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod builder;
pub mod config;
pub mod error;
pub mod frame_depth;
pub mod global;
pub mod index;
pub mod payload;
pub mod storage;
pub mod traceback;
pub mod varint;

// Re-export main types at crate root
pub use builder::CodemapBuilder;
pub use config::{CodemapConfig, ViolationPolicy};
pub use error::{CodemapError, CodemapResult};
pub use frame_depth::{FrameDepthBlock, FrameDepthMap};
pub use index::{AddressRange, BlockIndex, FreeOutcome, IndexReader};
pub use payload::{CodemapBlock, EncodedPayload, LocationId, MergePoint, MergePoints};
pub use storage::{CodemapStorage, FreedBlocks, StorageStats, NO_STACK_DEPTH};
pub use traceback::UNKNOWN_LOCATION;
