//! Error types for sylva operations.

use thiserror::Error;

use crate::distance::DistanceMetric;
use crate::store::PointId;

/// Result type alias using sylva's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during sylva operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Vector dimension mismatch between index and input.
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// Two indexes (or an index and an image) use different metrics.
    #[error("metric mismatch: expected {expected:?}, got {got:?}")]
    MetricMismatch {
        expected: DistanceMetric,
        got: DistanceMetric,
    },

    /// Point ID outside `[0, n_items)`.
    #[error("point {id} out of range (n_items = {n_items})")]
    OutOfRange { id: PointId, n_items: usize },

    /// Attempted to add an item under an ID that is already taken.
    #[error("duplicate point id: {0}")]
    DuplicateId(PointId),

    /// The vector store was sealed by a build.
    #[error("vector store is finalized; unbuild before adding items")]
    Finalized,

    /// The operation needs a built forest.
    #[error("index is not built")]
    NotBuilt,

    /// Build was requested while trees already exist.
    #[error("index is already built; unbuild first")]
    AlreadyBuilt,

    /// The index is backed by a read-only image.
    #[error("index is read-only")]
    ReadOnly,

    /// Build was requested on an empty store.
    #[error("cannot build an index without items")]
    EmptyStore,

    /// Forest construction failed.
    #[error("build failed: {0}")]
    BuildFailed(String),

    /// IO error during storage operations.
    #[error("io error: {0}")]
    IoError(String),

    /// On-disk header is incompatible with this index.
    #[error("format mismatch: {0}")]
    FormatMismatch(String),

    /// Invalid configuration value.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// A blocking task panicked or was cancelled.
    #[error("task failed: {0}")]
    TaskFailed(String),
}
