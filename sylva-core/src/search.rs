//! Forest-wide approximate nearest-neighbor search.
//!
//! All trees are explored together through one priority queue keyed by the
//! smallest margin seen on the way down, so the most promising unexplored
//! branch of any tree is always expanded next. Traversal stops once
//! `search_k` candidates (counted with repeats across trees) have been
//! collected or every branch is exhausted.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use roaring::RoaringBitmap;

use crate::distance::{self, DistanceMetric};
use crate::error::{Error, Result};
use crate::forest::{ForestView, NodeRef, NodeView};
use crate::store::{PointId, Vectors};

/// Query parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchParams<'f> {
    /// Number of neighbors wanted.
    pub n_results: usize,
    /// Candidate budget; `None` or `Some(0)` uses `n_results * n_trees`.
    pub search_k: Option<usize>,
    /// Only points in this set may be returned.
    pub filter: Option<&'f RoaringBitmap>,
}

impl<'f> SearchParams<'f> {
    /// Parameters asking for `n_results` neighbors with the default budget.
    pub fn new(n_results: usize) -> Self {
        Self {
            n_results,
            search_k: None,
            filter: None,
        }
    }

    /// Sets the candidate budget.
    pub fn with_search_k(mut self, search_k: usize) -> Self {
        self.search_k = Some(search_k);
        self
    }

    /// Restricts results to the points in `allow`.
    pub fn with_filter(mut self, allow: &'f RoaringBitmap) -> Self {
        self.filter = Some(allow);
        self
    }

    /// Budget actually used for a forest of `n_trees` trees.
    pub fn effective_search_k(&self, n_trees: usize) -> usize {
        match self.search_k {
            Some(k) if k > 0 => k,
            _ => self.n_results.saturating_mul(n_trees),
        }
    }
}

/// A single neighbor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchResult {
    /// The neighbor's point ID.
    pub id: PointId,
    /// Distance from the query (lower = more similar).
    pub distance: f32,
}

impl SearchResult {
    /// Creates a new search result.
    pub fn new(id: PointId, distance: f32) -> Self {
        Self { id, distance }
    }
}

/// Neighbors as parallel ID and distance lists, ordered nearest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Neighbors {
    pub ids: Vec<PointId>,
    pub distances: Vec<f32>,
}

impl Neighbors {
    /// Number of neighbors.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns true if no neighbor was found.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl From<Vec<SearchResult>> for Neighbors {
    fn from(results: Vec<SearchResult>) -> Self {
        let (ids, distances) = results.into_iter().map(|r| (r.id, r.distance)).unzip();
        Self { ids, distances }
    }
}

/// Pending branch in the traversal queue. The heap is a max-heap on
/// `priority`, so the branch furthest on the query's side comes out first.
#[derive(Debug, Clone, Copy)]
struct Branch {
    priority: f32,
    tree: usize,
    node: NodeRef,
}

impl PartialEq for Branch {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Branch {}

impl PartialOrd for Branch {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Branch {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .total_cmp(&other.priority)
            .then_with(|| other.tree.cmp(&self.tree))
            .then_with(|| other.node.cmp(&self.node))
    }
}

/// Searches `forest` for the neighbors of `query`.
///
/// `exclude` drops one point from the results (used for by-item queries).
/// Fewer than `n_results` neighbors come back when the index or the filter
/// leaves fewer candidates. Results are ordered by distance, then ID.
pub fn search<F: ForestView + ?Sized>(
    forest: &F,
    query: &[f32],
    params: &SearchParams<'_>,
    exclude: Option<PointId>,
) -> Result<Vec<SearchResult>> {
    if forest.n_trees() == 0 {
        return Err(Error::NotBuilt);
    }
    if query.len() != forest.dimension() {
        return Err(Error::DimensionMismatch {
            expected: forest.dimension(),
            got: query.len(),
        });
    }
    if params.n_results == 0 {
        return Ok(Vec::new());
    }

    let search_k = params.effective_search_k(forest.n_trees());
    let mut candidates = collect_candidates(forest, query, search_k);

    candidates.sort_unstable();
    candidates.dedup();
    if let Some(allow) = params.filter {
        candidates.retain(|&id| allow.contains(id));
    }
    if let Some(skip) = exclude {
        candidates.retain(|&id| id != skip);
    }

    Ok(rank(
        forest.vectors(),
        forest.metric(),
        query,
        candidates,
        params.n_results,
    ))
}

/// Walks the trees best-first until `search_k` candidates are collected.
fn collect_candidates<F: ForestView + ?Sized>(
    forest: &F,
    query: &[f32],
    search_k: usize,
) -> Vec<PointId> {
    let mut heap = BinaryHeap::with_capacity(forest.n_trees() * 2);
    for tree in 0..forest.n_trees() {
        if forest.tree_len(tree) > 0 {
            heap.push(Branch {
                priority: f32::INFINITY,
                tree,
                node: forest.root(tree),
            });
        }
    }

    let mut candidates = Vec::with_capacity(search_k);
    while candidates.len() < search_k {
        let Some(Branch {
            priority,
            tree,
            node,
        }) = heap.pop()
        else {
            break;
        };
        match forest.node(tree, node) {
            NodeView::Leaf { ids } => candidates.extend_from_slice(ids),
            NodeView::Split {
                normal,
                offset,
                left,
                right,
            } => {
                let m = distance::margin(normal, offset, query);
                heap.push(Branch {
                    priority: priority.min(m),
                    tree,
                    node: right,
                });
                heap.push(Branch {
                    priority: priority.min(-m),
                    tree,
                    node: left,
                });
            }
        }
    }
    candidates
}

/// Computes distances for `candidates` and keeps the `n` nearest, sorted.
fn rank(
    vectors: Vectors<'_>,
    metric: DistanceMetric,
    query: &[f32],
    candidates: Vec<PointId>,
    n: usize,
) -> Vec<SearchResult> {
    let mut scored: Vec<SearchResult> = candidates
        .into_iter()
        .map(|id| SearchResult::new(id, metric.raw_distance(query, vectors.get(id))))
        .collect();

    if scored.len() > n {
        scored.select_nth_unstable_by(n - 1, by_distance_then_id);
        scored.truncate(n);
    }
    scored.sort_unstable_by(by_distance_then_id);

    for r in &mut scored {
        r.distance = metric.normalize_distance(r.distance);
    }
    scored
}

fn by_distance_then_id(a: &SearchResult, b: &SearchResult) -> Ordering {
    a.distance
        .total_cmp(&b.distance)
        .then_with(|| a.id.cmp(&b.id))
}

/// Exact search by scanning every vector.
///
/// Used as ground truth when measuring recall.
pub fn exact_search(
    vectors: Vectors<'_>,
    metric: DistanceMetric,
    query: &[f32],
    n_results: usize,
    exclude: Option<PointId>,
) -> Result<Vec<SearchResult>> {
    if query.len() != vectors.dimension() {
        return Err(Error::DimensionMismatch {
            expected: vectors.dimension(),
            got: query.len(),
        });
    }
    if n_results == 0 {
        return Ok(Vec::new());
    }
    let ids = (0..vectors.len() as PointId)
        .filter(|&id| Some(id) != exclude)
        .collect();
    Ok(rank(vectors, metric, query, ids, n_results))
}
