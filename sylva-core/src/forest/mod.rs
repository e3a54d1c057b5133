//! Random-projection forest.
//!
//! A forest is an ordered set of independently built binary trees over the same
//! vectors. Each tree is an arena: nodes live in a `Vec` and refer to their
//! children by position ([`NodeRef`]), which is also exactly how they are laid
//! out on disk.
//!
//! # Node kinds
//!
//! - **Split**: a hyperplane `(normal, offset)`. A point `v` goes right when
//!   `dot(normal, v) - offset > 0`, left when it is negative.
//! - **Leaf**: at most `leaf_capacity` point IDs.
//!
//! Every point reachable from a root appears in exactly one leaf of that tree.

mod build;
mod extend;
mod split;

pub use build::{BuildPlan, TreeBuilder, MAX_AUTO_TREES};
pub use extend::extend_tree;

use crate::distance::DistanceMetric;
use crate::store::{PointId, Vectors};

/// Position of a node inside its tree's arena.
pub type NodeRef = u32;

/// Owned tree node.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Internal node partitioning points by a hyperplane.
    Split {
        normal: Box<[f32]>,
        offset: f32,
        left: NodeRef,
        right: NodeRef,
        /// Number of points below this node.
        n_descendants: u32,
    },
    /// Terminal node holding point IDs.
    Leaf { ids: Vec<PointId> },
}

impl Node {
    fn view(&self) -> NodeView<'_> {
        match self {
            Node::Split {
                normal,
                offset,
                left,
                right,
                ..
            } => NodeView::Split {
                normal,
                offset: *offset,
                left: *left,
                right: *right,
            },
            Node::Leaf { ids } => NodeView::Leaf { ids },
        }
    }
}

/// Borrowed node, independent of where the tree is stored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeView<'a> {
    Split {
        normal: &'a [f32],
        offset: f32,
        left: NodeRef,
        right: NodeRef,
    },
    Leaf {
        ids: &'a [PointId],
    },
}

/// A single tree stored as a node arena.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tree {
    pub(crate) nodes: Vec<Node>,
    pub(crate) root: NodeRef,
}

impl Tree {
    /// Builds a tree from an arena and its root.
    pub fn from_parts(nodes: Vec<Node>, root: NodeRef) -> Self {
        debug_assert!((root as usize) < nodes.len());
        Self { nodes, root }
    }

    /// Root node reference.
    #[inline]
    pub fn root(&self) -> NodeRef {
        self.root
    }

    /// All nodes, in arena order.
    #[inline]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Number of nodes in the arena.
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the tree has no nodes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Borrowed view of node `node`.
    #[inline]
    pub fn node(&self, node: NodeRef) -> NodeView<'_> {
        self.nodes[node as usize].view()
    }

    /// Copies a tree out of any forest.
    pub fn copy_from<F: ForestView + ?Sized>(forest: &F, tree: usize) -> Self {
        let nodes = (0..forest.tree_len(tree) as NodeRef)
            .map(|r| match forest.node(tree, r) {
                NodeView::Split {
                    normal,
                    offset,
                    left,
                    right,
                } => Node::Split {
                    normal: normal.into(),
                    offset,
                    left,
                    right,
                    n_descendants: 0,
                },
                NodeView::Leaf { ids } => Node::Leaf { ids: ids.to_vec() },
            })
            .collect();
        let mut tree = Self::from_parts(nodes, forest.root(tree));
        tree.recount();
        tree
    }

    /// Recomputes `n_descendants` of every split from the leaves up.
    pub(crate) fn recount(&mut self) {
        fn walk(nodes: &mut [Node], at: NodeRef) -> u32 {
            let (left, right) = match &nodes[at as usize] {
                Node::Leaf { ids } => return ids.len() as u32,
                Node::Split { left, right, .. } => (*left, *right),
            };
            let total = walk(nodes, left) + walk(nodes, right);
            if let Node::Split { n_descendants, .. } = &mut nodes[at as usize] {
                *n_descendants = total;
            }
            total
        }
        if !self.nodes.is_empty() {
            walk(&mut self.nodes, self.root);
        }
    }

    /// Shifts every point ID in the tree's leaves up by `offset`.
    pub(crate) fn offset_ids(&mut self, offset: PointId) {
        for node in &mut self.nodes {
            if let Node::Leaf { ids } = node {
                for id in ids.iter_mut() {
                    *id += offset;
                }
            }
        }
    }

    /// Collects every point ID in the tree's leaves.
    pub fn point_ids(&self) -> Vec<PointId> {
        let mut ids = Vec::new();
        let mut stack = vec![self.root];
        while let Some(at) = stack.pop() {
            match self.node(at) {
                NodeView::Leaf { ids: leaf } => ids.extend_from_slice(leaf),
                NodeView::Split { left, right, .. } => {
                    stack.push(right);
                    stack.push(left);
                }
            }
        }
        ids
    }
}

/// Read access to a built forest and the vectors it indexes.
///
/// Implemented by the in-memory [`Forest`] paired with its store and by
/// memory-mapped images, so search and merge run over either.
pub trait ForestView: Sync {
    /// Distance metric the trees were built for.
    fn metric(&self) -> DistanceMetric;

    /// The indexed vectors.
    fn vectors(&self) -> Vectors<'_>;

    /// Number of trees.
    fn n_trees(&self) -> usize;

    /// Maximum number of IDs a leaf may hold.
    fn leaf_capacity(&self) -> usize;

    /// Root of tree `tree`.
    fn root(&self, tree: usize) -> NodeRef;

    /// Number of nodes in tree `tree`.
    fn tree_len(&self, tree: usize) -> usize;

    /// Node `node` of tree `tree`.
    fn node(&self, tree: usize, node: NodeRef) -> NodeView<'_>;

    /// Vector dimension.
    fn dimension(&self) -> usize {
        self.vectors().dimension()
    }

    /// Number of indexed points.
    fn n_items(&self) -> usize {
        self.vectors().len()
    }
}

/// In-memory forest.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Forest {
    trees: Vec<Tree>,
    leaf_capacity: usize,
}

impl Forest {
    /// Creates an empty forest whose leaves hold at most `leaf_capacity` IDs.
    pub fn new(leaf_capacity: usize) -> Self {
        Self {
            trees: Vec::new(),
            leaf_capacity,
        }
    }

    /// Creates a forest from finished trees.
    pub fn from_trees(trees: Vec<Tree>, leaf_capacity: usize) -> Self {
        Self {
            trees,
            leaf_capacity,
        }
    }

    /// Appends a tree.
    pub fn push(&mut self, tree: Tree) {
        self.trees.push(tree);
    }

    /// The trees, in build order.
    #[inline]
    pub fn trees(&self) -> &[Tree] {
        &self.trees
    }

    /// Number of trees.
    #[inline]
    pub fn len(&self) -> usize {
        self.trees.len()
    }

    /// Returns true if the forest has no trees.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }

    /// Leaf capacity the forest was built with.
    #[inline]
    pub fn leaf_capacity(&self) -> usize {
        self.leaf_capacity
    }

    /// Total node count across all trees.
    pub fn node_count(&self) -> usize {
        self.trees.iter().map(Tree::len).sum()
    }

    /// Pairs the forest with its vectors for searching.
    pub fn with_vectors<'a>(
        &'a self,
        vectors: Vectors<'a>,
        metric: DistanceMetric,
    ) -> MemoryForest<'a> {
        MemoryForest {
            forest: self,
            vectors,
            metric,
        }
    }
}

/// An in-memory [`Forest`] borrowed together with its vectors.
#[derive(Debug, Clone, Copy)]
pub struct MemoryForest<'a> {
    forest: &'a Forest,
    vectors: Vectors<'a>,
    metric: DistanceMetric,
}

impl ForestView for MemoryForest<'_> {
    fn metric(&self) -> DistanceMetric {
        self.metric
    }

    fn vectors(&self) -> Vectors<'_> {
        self.vectors
    }

    fn n_trees(&self) -> usize {
        self.forest.len()
    }

    fn leaf_capacity(&self) -> usize {
        self.forest.leaf_capacity
    }

    fn root(&self, tree: usize) -> NodeRef {
        self.forest.trees[tree].root
    }

    fn tree_len(&self, tree: usize) -> usize {
        self.forest.trees[tree].len()
    }

    fn node(&self, tree: usize, node: NodeRef) -> NodeView<'_> {
        self.forest.trees[tree].node(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> Tree {
        // root split over two leaves
        Tree::from_parts(
            vec![
                Node::Leaf { ids: vec![0, 2] },
                Node::Leaf { ids: vec![1] },
                Node::Split {
                    normal: vec![1.0, 0.0].into(),
                    offset: 0.0,
                    left: 0,
                    right: 1,
                    n_descendants: 0,
                },
            ],
            2,
        )
    }

    #[test]
    fn test_recount() {
        let mut tree = sample_tree();
        tree.recount();
        match &tree.nodes()[2] {
            Node::Split { n_descendants, .. } => assert_eq!(*n_descendants, 3),
            other => panic!("unexpected node {:?}", other),
        }
    }

    #[test]
    fn test_point_ids() {
        let tree = sample_tree();
        let mut ids = tree.point_ids();
        ids.sort_unstable();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn test_offset_ids() {
        let mut tree = sample_tree();
        tree.offset_ids(10);
        let mut ids = tree.point_ids();
        ids.sort_unstable();
        assert_eq!(ids, vec![10, 11, 12]);
    }

    #[test]
    fn test_copy_from_memory_forest() {
        let data = [1.0, 0.0, 0.0, 1.0, 1.0, 0.1];
        let forest = Forest::from_trees(vec![sample_tree()], 4);
        let view = forest.with_vectors(Vectors::new(2, &data), DistanceMetric::Angular);

        assert_eq!(view.n_trees(), 1);
        assert_eq!(view.n_items(), 3);
        assert_eq!(view.dimension(), 2);

        let copy = Tree::copy_from(&view, 0);
        assert_eq!(copy.root(), 2);
        assert_eq!(copy.len(), 3);
        assert_eq!(copy.node(0), NodeView::Leaf { ids: &[0, 2] });
    }
}
