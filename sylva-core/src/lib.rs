//! # Sylva Core
//!
//! Core engine for sylva: approximate nearest-neighbor search over a forest
//! of random-projection trees, with a fixed-stride on-disk image that is
//! memory-mapped instead of parsed, and a merge that combines two indexes
//! while keeping every point's identity.
//!
//! ## Crate Features
//!
//! - `async` - Enables [`AsyncIndex`] for tokio-compatible async operations
//!
//! ## Core Types
//!
//! ### Index
//!
//! - [`AnnIndex`] - Build, query, save, load and unload an index
//! - [`SharedIndex`] - Lock-guarded handle for concurrent readers
//! - [`AsyncIndex`] - Async wrapper for tokio compatibility (requires `async` feature)
//! - [`IndexConfig`] - Dimension, metric, seed and tuning knobs
//!
//! ### Building blocks
//!
//! - [`VectorStore`] - Append-only vector storage with dense IDs
//! - [`Kiss64Random`] - Seedable generator behind every random choice
//! - [`Forest`] / [`BuildPlan`] - Tree construction, optionally multi-threaded
//! - [`search()`] - Best-first traversal across all trees
//! - [`DiskImage`] / [`ImageWriter`] - The memory-mapped image format
//! - [`merge()`] - Combine two indexes into a new image
//!
//! ### Filtering
//!
//! - [`TagIndex`] - Roaring bitmap index from tag values to point IDs
//! - [`Filter`] - Tag and ID expressions resolved into an allow-list
//!
//! ## Logging
//!
//! Progress is reported through [`tracing`]. Build, save, load and merge emit
//! events at `debug` level, or `info` when the index is verbose. No events
//! are emitted on the query path.

/// Emits a progress event at info level when `$verbose`, debug otherwise.
macro_rules! progress {
    ($verbose:expr, $($arg:tt)+) => {
        if $verbose {
            ::tracing::info!($($arg)+)
        } else {
            ::tracing::debug!($($arg)+)
        }
    };
}

pub mod config;
pub mod distance;
pub mod error;
pub mod filter;
pub mod forest;
pub mod index;
pub mod merge;
pub mod random;
pub mod search;
pub mod shared;
pub mod storage;
pub mod store;

// Re-exports for convenient access
pub use config::{IndexConfig, MergeOptions};
pub use distance::DistanceMetric;
pub use error::{Error, Result};
pub use filter::{Filter, FilterCondition, TagIndex, TagValue};
pub use forest::{BuildPlan, Forest, ForestView, Node, NodeRef, NodeView, Tree};
pub use index::{AnnIndex, IndexView};
pub use merge::{merge, merge_files, IdRemap, MergeOutcome, Source, Strategy};
pub use random::{Kiss64Random, DEFAULT_SEED};
pub use search::{exact_search, search, Neighbors, SearchParams, SearchResult};
#[cfg(feature = "async")]
pub use shared::AsyncIndex;
pub use shared::SharedIndex;
pub use storage::{DiskImage, ImageInfo, ImageWriter};
pub use store::{PointId, VectorStore, Vectors};

/// Allow-lists produced by [`Filter::resolve`] and consumed by [`SearchParams`].
pub use roaring::RoaringBitmap;

/// Re-export commonly used types for convenience.
///
/// # Example
///
/// ```rust
/// use sylva_core::prelude::*;
///
/// let mut index = AnnIndex::new(3).unwrap();
/// index.add_item(0, &[1.0, 2.0, 3.0]).unwrap();
/// index.build(1, 1).unwrap();
/// assert_eq!(index.get_n_trees(), 1);
/// ```
pub mod prelude {
    pub use crate::{
        AnnIndex, DistanceMetric, Error, Filter, IndexConfig, MergeOptions, Neighbors, PointId,
        Result, RoaringBitmap, SearchParams, SearchResult, SharedIndex, TagIndex, TagValue,
    };
}
