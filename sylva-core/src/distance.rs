//! Distance metrics for vector similarity computations.
//!
//! Every metric has two forms: a *raw* distance that is cheap to compute and
//! monotone in the true distance (used for ranking), and a *normalized*
//! distance that is reported to callers.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Supported distance metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DistanceMetric {
    /// Angular distance: the Euclidean distance between the two vectors
    /// after normalizing them to unit length, `sqrt(2 - 2 cos)`.
    /// Range: [0, 2].
    #[default]
    Angular,
    /// Euclidean distance (L2 norm).
    Euclidean,
}

impl DistanceMetric {
    /// Stable identifier written into on-disk headers.
    #[inline]
    pub fn tag(&self) -> u32 {
        match self {
            DistanceMetric::Angular => 1,
            DistanceMetric::Euclidean => 2,
        }
    }

    /// Decodes a header tag.
    pub fn from_tag(tag: u32) -> Result<Self> {
        match tag {
            1 => Ok(Self::Angular),
            2 => Ok(Self::Euclidean),
            _ => Err(Error::FormatMismatch(format!("unknown metric tag {}", tag))),
        }
    }

    /// Computes the raw (ranking) distance between two vectors.
    ///
    /// Angular returns `2 - 2 cos`, or `2` when either norm is zero or not
    /// representable as an `f32`.
    /// Euclidean returns the squared distance.
    #[inline]
    pub fn raw_distance(&self, a: &[f32], b: &[f32]) -> f32 {
        debug_assert_eq!(a.len(), b.len(), "Vector dimensions must match");

        match self {
            DistanceMetric::Angular => {
                let pp = dot_product(a, a);
                let qq = dot_product(b, b);
                let pq = dot_product(a, b);
                // product of the norms, not sqrt(pp * qq), which overflows first
                let norms = pp.sqrt() * qq.sqrt();
                if norms > 0.0 && norms.is_finite() {
                    2.0 - 2.0 * pq / norms
                } else {
                    2.0
                }
            }
            DistanceMetric::Euclidean => euclidean_distance_squared(a, b),
        }
    }

    /// Converts a raw distance into the reported distance.
    #[inline]
    pub fn normalize_distance(&self, raw: f32) -> f32 {
        raw.max(0.0).sqrt()
    }

    /// Computes the reported distance between two vectors.
    #[inline]
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        self.normalize_distance(self.raw_distance(a, b))
    }

    /// Returns true if split centroids should be computed on normalized vectors.
    #[inline]
    pub(crate) fn normalizes_centroids(&self) -> bool {
        matches!(self, DistanceMetric::Angular)
    }
}

/// Computes squared Euclidean distance.
#[inline]
pub fn euclidean_distance_squared(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let diff = x - y;
            diff * diff
        })
        .sum()
}

/// Computes Euclidean (L2) distance between two vectors.
#[inline]
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    euclidean_distance_squared(a, b).sqrt()
}

/// Computes dot product (inner product) between two vectors.
#[inline]
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// L2 norm of a vector.
#[inline]
pub fn norm(v: &[f32]) -> f32 {
    dot_product(v, v).sqrt()
}

/// Scales `v` to unit length in place. Zero vectors are left untouched.
#[inline]
pub fn normalize(v: &mut [f32]) {
    let n = norm(v);
    if n > 0.0 {
        for x in v.iter_mut() {
            *x /= n;
        }
    }
}

/// Signed distance of `v` from the hyperplane `{x : dot(x, normal) = offset}`.
#[inline]
pub fn margin(normal: &[f32], offset: f32, v: &[f32]) -> f32 {
    dot_product(normal, v) - offset
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_euclidean_distance() {
        let a = [0.0, 0.0];
        let b = [3.0, 4.0];
        assert!((euclidean_distance(&a, &b) - 5.0).abs() < 1e-6);
        assert!((DistanceMetric::Euclidean.distance(&a, &b) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_angular_identical_direction() {
        let a = [1.0, 0.0];
        let b = [2.0, 0.0];
        assert!(DistanceMetric::Angular.distance(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_angular_orthogonal() {
        let a = [1.0, 0.0];
        let b = [0.0, 1.0];
        let expected = 2.0f32.sqrt();
        assert!((DistanceMetric::Angular.distance(&a, &b) - expected).abs() < 1e-6);
    }

    #[test]
    fn test_angular_opposite() {
        let a = [1.0, 0.0];
        let b = [-1.0, 0.0];
        assert!((DistanceMetric::Angular.distance(&a, &b) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_angular_zero_vector() {
        let a = [0.0, 0.0];
        let b = [1.0, 0.0];
        assert_eq!(DistanceMetric::Angular.raw_distance(&a, &b), 2.0);
    }

    #[test]
    fn test_angular_large_norms() {
        // |a|^2 * |b|^2 overflows f32 here, the norms alone do not
        let a = [1e12, 0.0];
        let b = [2e12, 0.0];
        let c = [0.0, 3e12];
        assert!(DistanceMetric::Angular.distance(&a, &b) < 1e-3);
        let orthogonal = DistanceMetric::Angular.distance(&a, &c);
        assert!((orthogonal - 2.0f32.sqrt()).abs() < 1e-3);
        assert!(!DistanceMetric::Angular.raw_distance(&a, &b).is_nan());
    }

    #[test]
    fn test_angular_overflowing_norm_is_max_distance() {
        let a = [1e20, 1e20];
        let b = [1.0, 0.0];
        assert_eq!(DistanceMetric::Angular.raw_distance(&a, &b), 2.0);
    }

    #[test]
    fn test_default_metric_is_angular() {
        assert_eq!(DistanceMetric::default(), DistanceMetric::Angular);
    }

    #[test]
    fn test_angular_self_distance_is_zero() {
        let a = [0.3, -1.7, 2.5, 0.01];
        assert!(DistanceMetric::Angular.distance(&a, &a) < 1e-3);
    }

    #[test]
    fn test_dot_product() {
        let a = [1.0, 2.0, 3.0];
        let b = [4.0, 5.0, 6.0];
        assert!((dot_product(&a, &b) - 32.0).abs() < 1e-6);
    }

    #[test]
    fn test_normalize() {
        let mut v = [3.0, 4.0];
        normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        let mut zero = [0.0, 0.0];
        normalize(&mut zero);
        assert_eq!(zero, [0.0, 0.0]);
    }

    #[test]
    fn test_margin_sign() {
        let normal = [1.0, 0.0];
        assert!(margin(&normal, 0.5, &[1.0, 3.0]) > 0.0);
        assert!(margin(&normal, 0.5, &[0.0, 3.0]) < 0.0);
    }

    #[test]
    fn test_metric_tag_roundtrip() {
        for metric in [DistanceMetric::Angular, DistanceMetric::Euclidean] {
            assert_eq!(DistanceMetric::from_tag(metric.tag()).unwrap(), metric);
        }
        assert!(matches!(
            DistanceMetric::from_tag(99),
            Err(Error::FormatMismatch(_))
        ));
    }
}
