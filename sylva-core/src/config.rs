//! Index and merge configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::distance::DistanceMetric;
use crate::error::{Error, Result};
use crate::random::DEFAULT_SEED;
use crate::storage::format::max_leaf_capacity;

/// Default ratio between the larger and smaller input of a merge below which
/// the existing trees are reused.
pub const DEFAULT_MERGE_TOLERANCE: f64 = 2.0;

/// Configuration for an [`AnnIndex`](crate::AnnIndex).
///
/// # Example
///
/// ```
/// use sylva_core::{DistanceMetric, IndexConfig};
///
/// let config = IndexConfig::new(128)
///     .with_metric(DistanceMetric::Euclidean)
///     .with_seed(7);
/// assert_eq!(config.leaf_capacity(), 131);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Vector dimension.
    pub dimension: usize,
    /// Distance metric.
    pub metric: DistanceMetric,
    /// Seed for tree construction.
    pub seed: u64,
    /// Log progress at info level instead of debug.
    pub verbose: bool,
    /// Maximum points per leaf; `None` uses the largest a node slot can hold.
    pub leaf_size: Option<usize>,
    /// Largest size ratio between merge inputs for which trees are reused.
    pub merge_balance_tolerance: f64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dimension: 0,
            metric: DistanceMetric::default(),
            seed: DEFAULT_SEED,
            verbose: false,
            leaf_size: None,
            merge_balance_tolerance: DEFAULT_MERGE_TOLERANCE,
        }
    }
}

impl IndexConfig {
    /// Creates a configuration with defaults for `dimension`-sized vectors.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            ..Self::default()
        }
    }

    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = metric;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_leaf_size(mut self, leaf_size: usize) -> Self {
        self.leaf_size = Some(leaf_size);
        self
    }

    pub fn with_merge_tolerance(mut self, tolerance: f64) -> Self {
        self.merge_balance_tolerance = tolerance;
        self
    }

    /// Leaf capacity used when building.
    pub fn leaf_capacity(&self) -> usize {
        let max = max_leaf_capacity(self.dimension);
        self.leaf_size.map_or(max, |size| size.min(max))
    }

    /// Checks that every value is usable.
    pub fn validate(&self) -> Result<()> {
        if self.dimension == 0 {
            return Err(Error::InvalidConfig("dimension must be positive".into()));
        }
        if self.leaf_size == Some(0) {
            return Err(Error::InvalidConfig("leaf_size must be positive".into()));
        }
        if !(self.merge_balance_tolerance >= 1.0) {
            return Err(Error::InvalidConfig(format!(
                "merge_balance_tolerance must be >= 1.0, got {}",
                self.merge_balance_tolerance
            )));
        }
        Ok(())
    }

    /// Parses and validates a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::InvalidConfig(format!("config parse failed: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON configuration file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::IoError(format!("failed to read config: {}", e)))?;
        Self::from_json_str(&json)
    }

    /// Serializes the configuration as pretty JSON.
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Error::InvalidConfig(format!("config serialization failed: {}", e)))
    }
}

/// Options for merging two indexes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeOptions {
    /// Worker threads for any tree construction; 0 uses every hardware thread.
    pub num_threads: usize,
    /// Overrides the first input's `merge_balance_tolerance`.
    pub tolerance: Option<f64>,
    /// Always rebuild the forest instead of reusing trees.
    pub force_rebuild: bool,
}

impl MergeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = Some(tolerance);
        self
    }

    pub fn with_force_rebuild(mut self, force_rebuild: bool) -> Self {
        self.force_rebuild = force_rebuild;
        self
    }
}
