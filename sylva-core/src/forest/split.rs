//! Hyperplane selection.
//!
//! A split is seeded by two distinct random points and refined with a short
//! stochastic two-means pass; the hyperplane is the perpendicular bisector of
//! the two centroids.

use crate::distance::{self, DistanceMetric};
use crate::random::Kiss64Random;
use crate::store::{PointId, Vectors};

/// Number of random reassignment steps in the two-means refinement.
const ITERATION_STEPS: usize = 200;

/// A candidate partition boundary.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Hyperplane {
    pub normal: Vec<f32>,
    pub offset: f32,
}

impl Hyperplane {
    /// The hyperplane through the origin with a zero normal: every point has
    /// margin zero.
    pub fn degenerate(dimension: usize) -> Self {
        Self {
            normal: vec![0.0; dimension],
            offset: 0.0,
        }
    }

    /// Signed margin of `v`.
    #[inline]
    pub fn margin(&self, v: &[f32]) -> f32 {
        distance::margin(&self.normal, self.offset, v)
    }

    /// `true` for the right child. Points exactly on the plane go to a random side.
    #[inline]
    pub fn side(&self, v: &[f32], rng: &mut Kiss64Random) -> bool {
        let m = self.margin(v);
        if m != 0.0 {
            m > 0.0
        } else {
            rng.flip()
        }
    }
}

/// Picks a hyperplane separating `ids`, which must hold at least two points.
pub(crate) fn create_split(
    vectors: Vectors<'_>,
    ids: &[PointId],
    metric: DistanceMetric,
    rng: &mut Kiss64Random,
) -> Hyperplane {
    let (p, q) = two_means(vectors, ids, metric, rng);

    let mut normal: Vec<f32> = p.iter().zip(q.iter()).map(|(a, b)| a - b).collect();
    distance::normalize(&mut normal);

    let offset = match metric {
        DistanceMetric::Angular => 0.0,
        DistanceMetric::Euclidean => normal
            .iter()
            .zip(p.iter().zip(q.iter()))
            .map(|(n, (a, b))| n * (a + b) * 0.5)
            .sum(),
    };

    Hyperplane { normal, offset }
}

/// Stochastic two-means over `ids`, returning the two centroids.
fn two_means(
    vectors: Vectors<'_>,
    ids: &[PointId],
    metric: DistanceMetric,
    rng: &mut Kiss64Random,
) -> (Vec<f32>, Vec<f32>) {
    let count = ids.len();
    debug_assert!(count >= 2);

    let i = rng.index(count);
    let mut j = rng.index(count - 1);
    if j >= i {
        j += 1;
    }

    let mut p = vectors.get(ids[i]).to_vec();
    let mut q = vectors.get(ids[j]).to_vec();

    let normalized = metric.normalizes_centroids();
    if normalized {
        distance::normalize(&mut p);
        distance::normalize(&mut q);
    }

    let mut ic = 1.0f32;
    let mut jc = 1.0f32;
    for _ in 0..ITERATION_STEPS {
        let x = vectors.get(ids[rng.index(count)]);
        let di = ic * metric.raw_distance(&p, x);
        let dj = jc * metric.raw_distance(&q, x);
        let norm = if normalized { distance::norm(x) } else { 1.0 };
        if !(norm > 0.0) {
            continue;
        }
        if di < dj {
            absorb(&mut p, &mut ic, x, norm);
        } else if dj < di {
            absorb(&mut q, &mut jc, x, norm);
        }
    }

    (p, q)
}

/// Moves a running centroid towards `x / norm`.
#[inline]
fn absorb(centroid: &mut [f32], count: &mut f32, x: &[f32], norm: f32) {
    for (c, v) in centroid.iter_mut().zip(x.iter()) {
        *c = (*c * *count + v / norm) / (*count + 1.0);
    }
    *count += 1.0;
}
