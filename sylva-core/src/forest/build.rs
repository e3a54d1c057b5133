//! Tree and forest construction.

use rayon::prelude::*;

use super::split::{create_split, Hyperplane};
use super::{Node, NodeRef, Tree};
use crate::distance::DistanceMetric;
use crate::error::{Error, Result};
use crate::random::Kiss64Random;
use crate::store::{PointId, Vectors};

/// Hard cap on the number of trees when the caller leaves the count open.
pub const MAX_AUTO_TREES: usize = 128;

/// Attempts at finding a balanced hyperplane before falling back.
const MAX_SPLIT_ATTEMPTS: usize = 3;

/// A split sending more than this fraction of points to one side is rejected.
const MAX_IMBALANCE: f64 = 0.95;

/// Recursive builder for a single tree.
///
/// Nodes are appended to the arena children-first, so the root of any subtree
/// is the last node pushed while building it.
pub struct TreeBuilder<'a> {
    vectors: Vectors<'a>,
    metric: DistanceMetric,
    leaf_capacity: usize,
    rng: Kiss64Random,
    nodes: Vec<Node>,
}

impl<'a> TreeBuilder<'a> {
    /// Creates a builder with an empty arena.
    pub fn new(
        vectors: Vectors<'a>,
        metric: DistanceMetric,
        leaf_capacity: usize,
        rng: Kiss64Random,
    ) -> Self {
        Self::with_arena(Vec::new(), vectors, metric, leaf_capacity, rng)
    }

    /// Creates a builder that appends to an existing arena.
    pub(crate) fn with_arena(
        nodes: Vec<Node>,
        vectors: Vectors<'a>,
        metric: DistanceMetric,
        leaf_capacity: usize,
        rng: Kiss64Random,
    ) -> Self {
        debug_assert!(leaf_capacity >= 1);
        Self {
            vectors,
            metric,
            leaf_capacity,
            rng,
            nodes,
        }
    }

    /// Builds a tree over `ids`.
    pub fn build(mut self, ids: Vec<PointId>) -> Tree {
        let root = self.make_node(ids);
        Tree::from_parts(self.nodes, root)
    }

    /// Replaces node `slot` with a subtree built over `ids`.
    ///
    /// Parents keep pointing at `slot`; the subtree's own nodes are appended.
    pub(crate) fn rebuild_at(&mut self, slot: NodeRef, ids: Vec<PointId>) {
        let root = self.make_node(ids) as usize;
        debug_assert_eq!(root, self.nodes.len() - 1);
        debug_assert!((slot as usize) < root);
        self.nodes.swap(slot as usize, root);
        self.nodes.pop();
    }

    /// Hands back the arena.
    pub(crate) fn into_nodes(self) -> Vec<Node> {
        self.nodes
    }

    fn push(&mut self, node: Node) -> NodeRef {
        self.nodes.push(node);
        (self.nodes.len() - 1) as NodeRef
    }

    fn make_node(&mut self, ids: Vec<PointId>) -> NodeRef {
        if ids.len() <= self.leaf_capacity {
            return self.push(Node::Leaf { ids });
        }

        let n_descendants = ids.len() as u32;
        let (plane, left_ids, right_ids) = self.partition(ids);

        let left = self.make_node(left_ids);
        let right = self.make_node(right_ids);

        self.push(Node::Split {
            normal: plane.normal.into_boxed_slice(),
            offset: plane.offset,
            left,
            right,
            n_descendants,
        })
    }

    fn partition(&mut self, ids: Vec<PointId>) -> (Hyperplane, Vec<PointId>, Vec<PointId>) {
        for _ in 0..MAX_SPLIT_ATTEMPTS {
            let plane = create_split(self.vectors, &ids, self.metric, &mut self.rng);
            let mut left = Vec::with_capacity(ids.len() / 2);
            let mut right = Vec::with_capacity(ids.len() / 2);
            for &id in &ids {
                if plane.side(self.vectors.get(id), &mut self.rng) {
                    right.push(id);
                } else {
                    left.push(id);
                }
            }
            if imbalance(left.len(), right.len()) < MAX_IMBALANCE {
                return (plane, left, right);
            }
        }

        // No usable hyperplane (duplicates, or points on a line through the
        // origin): split by alternating assignment so recursion terminates.
        let left = ids.iter().copied().step_by(2).collect();
        let right = ids.iter().copied().skip(1).step_by(2).collect();
        (Hyperplane::degenerate(self.vectors.dimension()), left, right)
    }
}

/// Fraction of points on the larger side.
#[inline]
fn imbalance(left: usize, right: usize) -> f64 {
    let ls = left as f64;
    let rs = right as f64;
    let f = ls / (ls + rs + 1e-9);
    f.max(1.0 - f)
}

/// Parameters of a forest build.
#[derive(Debug, Clone)]
pub struct BuildPlan {
    /// Number of trees; 0 keeps adding trees until the forest has at least
    /// as many nodes as there are items, up to [`MAX_AUTO_TREES`].
    pub num_trees: usize,
    /// Worker threads; 0 uses every available hardware thread.
    pub num_threads: usize,
    pub seed: u64,
    pub leaf_capacity: usize,
    pub metric: DistanceMetric,
    pub verbose: bool,
}

impl BuildPlan {
    /// Builds the forest over `vectors`, handing each finished tree to `commit`
    /// in tree-index order. Returns the number of trees committed.
    ///
    /// Trees are built in batches of `num_threads`, so at most that many
    /// uncommitted trees are held in memory at once.
    pub fn run<F>(&self, vectors: Vectors<'_>, mut commit: F) -> Result<usize>
    where
        F: FnMut(usize, Tree) -> Result<()>,
    {
        let n_items = vectors.len();
        if n_items == 0 {
            return Err(Error::EmptyStore);
        }
        if self.leaf_capacity == 0 {
            return Err(Error::BuildFailed("leaf capacity must be positive".into()));
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.num_threads)
            .build()
            .map_err(|e| Error::BuildFailed(format!("thread pool: {}", e)))?;
        let batch = pool.current_num_threads().max(1);

        let auto = self.num_trees == 0;
        let target = if auto { MAX_AUTO_TREES } else { self.num_trees };
        let mut built = 0usize;
        let mut nodes = 0usize;

        progress!(
            self.verbose,
            n_items,
            num_trees = self.num_trees,
            threads = batch,
            "building forest"
        );

        'outer: while built < target {
            if auto && nodes >= n_items {
                break;
            }
            let end = (built + batch).min(target);
            let trees: Vec<Tree> = pool.install(|| {
                (built..end)
                    .into_par_iter()
                    .map(|t| self.build_tree(vectors, t))
                    .collect()
            });

            for tree in trees {
                if auto && nodes >= n_items {
                    break 'outer;
                }
                nodes += tree.len();
                progress!(self.verbose, tree = built, nodes = tree.len(), "built tree");
                commit(built, tree)?;
                built += 1;
            }
        }

        progress!(self.verbose, trees = built, nodes, "forest built");
        Ok(built)
    }

    /// Builds tree number `tree` over every point.
    pub fn build_tree(&self, vectors: Vectors<'_>, tree: usize) -> Tree {
        let ids: Vec<PointId> = (0..vectors.len() as PointId).collect();
        TreeBuilder::new(
            vectors,
            self.metric,
            self.leaf_capacity,
            Kiss64Random::for_tree(self.seed, tree),
        )
        .build(ids)
    }
}
