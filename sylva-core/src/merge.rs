//! Combining two built indexes into a new image.
//!
//! The merged image holds A's points under their original IDs followed by
//! B's points shifted up by `n_items(A)`. When both forests have the same
//! number of trees and the inputs are of comparable size, every tree of both
//! inputs is kept and extended with the other side's points; otherwise a
//! fresh forest is built over the union.

use std::ops::Range;
use std::path::Path;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::MergeOptions;
use crate::error::{Error, Result};
use crate::forest::{extend_tree, BuildPlan, ForestView, Tree};
use crate::index::AnnIndex;
use crate::random::Kiss64Random;
use crate::storage::ImageWriter;
use crate::store::PointId;

/// How the merged forest was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Strategy {
    /// Both inputs' trees were kept and extended.
    Reused,
    /// A new forest was built over the union.
    Rebuilt,
}

/// Which input a merged point came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Source {
    A,
    B,
}

/// Mapping between input IDs and merged IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdRemap {
    pub n_a: u32,
    pub n_b: u32,
}

impl IdRemap {
    /// Merged ID of A's point `id`.
    pub fn from_a(&self, id: PointId) -> Option<PointId> {
        (id < self.n_a).then_some(id)
    }

    /// Merged ID of B's point `id`.
    pub fn from_b(&self, id: PointId) -> Option<PointId> {
        (id < self.n_b).then(|| id + self.n_a)
    }

    /// Input and original ID of merged point `id`.
    pub fn origin(&self, id: PointId) -> Option<(Source, PointId)> {
        if id < self.n_a {
            Some((Source::A, id))
        } else if id - self.n_a < self.n_b {
            Some((Source::B, id - self.n_a))
        } else {
            None
        }
    }

    /// Merged IDs holding A's points.
    pub fn a_range(&self) -> Range<PointId> {
        0..self.n_a
    }

    /// Merged IDs holding B's points.
    pub fn b_range(&self) -> Range<PointId> {
        self.n_a..self.n_a + self.n_b
    }
}

/// Result of a merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeOutcome {
    /// Points in the merged image, always `n_items(A) + n_items(B)`.
    pub n_items: usize,
    pub n_trees: usize,
    pub strategy: Strategy,
    pub remap: IdRemap,
}

/// Merges two built indexes into a new image at `output`.
///
/// Neither input is modified. The output is published atomically; on any
/// error no file appears at `output`.
pub fn merge<P: AsRef<Path>>(
    a: &AnnIndex,
    b: &AnnIndex,
    output: P,
    options: &MergeOptions,
) -> Result<MergeOutcome> {
    if a.dimension() != b.dimension() {
        return Err(Error::DimensionMismatch {
            expected: a.dimension(),
            got: b.dimension(),
        });
    }
    if a.metric() != b.metric() {
        return Err(Error::MetricMismatch {
            expected: a.metric(),
            got: b.metric(),
        });
    }
    let view_a = a.forest().ok_or(Error::NotBuilt)?;
    let view_b = b.forest().ok_or(Error::NotBuilt)?;

    let tolerance = options
        .tolerance
        .unwrap_or(a.config().merge_balance_tolerance);
    let (n_a, n_b) = (view_a.n_items(), view_b.n_items());
    let (q_a, q_b) = (view_a.n_trees(), view_b.n_trees());
    let strategy = if !options.force_rebuild && can_reuse(n_a, n_b, q_a, q_b, tolerance) {
        Strategy::Reused
    } else {
        Strategy::Rebuilt
    };

    let metric = a.metric();
    let seed = a.config().seed;
    let verbose = a.config().verbose;
    let leaf_capacity = view_a.leaf_capacity().max(view_b.leaf_capacity());
    progress!(
        verbose,
        n_a,
        n_b,
        q_a,
        q_b,
        strategy = ?strategy,
        "merging indexes"
    );

    let mut writer = ImageWriter::create(output, a.dimension(), metric, leaf_capacity, seed)?;
    writer.write_vector_parts(&[view_a.vectors(), view_b.vectors()])?;
    let mapped = writer.map_vectors()?;
    let union = mapped.vectors();

    let n_trees = match strategy {
        Strategy::Reused => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(options.num_threads)
                .build()
                .map_err(|e| Error::BuildFailed(format!("thread pool: {}", e)))?;
            let batch = pool.current_num_threads().max(1);
            let ids_a: Vec<PointId> = (0..n_a as PointId).collect();
            let ids_b: Vec<PointId> = (n_a as PointId..(n_a + n_b) as PointId).collect();

            let extend = |t: usize| -> Tree {
                let rng = Kiss64Random::for_tree(seed, t);
                if t < q_a {
                    let mut tree = Tree::copy_from(&view_a, t);
                    extend_tree(&mut tree, union, &ids_b, metric, leaf_capacity, rng);
                    tree
                } else {
                    let mut tree = Tree::copy_from(&view_b, t - q_a);
                    tree.offset_ids(n_a as PointId);
                    extend_tree(&mut tree, union, &ids_a, metric, leaf_capacity, rng);
                    tree
                }
            };

            let total = q_a + q_b;
            let mut start = 0;
            while start < total {
                let end = (start + batch).min(total);
                let trees: Vec<Tree> =
                    pool.install(|| (start..end).into_par_iter().map(&extend).collect());
                for tree in &trees {
                    writer.append_tree(tree)?;
                }
                progress!(verbose, trees = end, of = total, "extended trees");
                start = end;
            }
            total
        }
        Strategy::Rebuilt => {
            let plan = BuildPlan {
                num_trees: q_a.max(q_b),
                num_threads: options.num_threads,
                seed,
                leaf_capacity,
                metric,
                verbose,
            };
            plan.run(union, |_, tree| writer.append_tree(&tree))?
        }
    };

    writer.finish()?;
    drop(mapped);

    let outcome = MergeOutcome {
        n_items: n_a + n_b,
        n_trees,
        strategy,
        remap: IdRemap {
            n_a: n_a as u32,
            n_b: n_b as u32,
        },
    };
    progress!(
        verbose,
        n_items = outcome.n_items,
        n_trees = outcome.n_trees,
        "merge finished"
    );
    Ok(outcome)
}

/// Opens two images and merges them into `output`.
pub fn merge_files<P, Q, R>(a: P, b: Q, output: R, options: &MergeOptions) -> Result<MergeOutcome>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
    R: AsRef<Path>,
{
    let a = AnnIndex::open(a, false)?;
    let b = AnnIndex::open(b, false)?;
    merge(&a, &b, output, options)
}

/// Trees are reused only for equal, non-zero tree counts and sizes within
/// `tolerance` of each other.
fn can_reuse(n_a: usize, n_b: usize, q_a: usize, q_b: usize, tolerance: f64) -> bool {
    if q_a != q_b || q_a == 0 || n_a == 0 || n_b == 0 {
        return false;
    }
    let (lo, hi) = if n_a < n_b { (n_a, n_b) } else { (n_b, n_a) };
    hi as f64 / lo as f64 <= tolerance
}
