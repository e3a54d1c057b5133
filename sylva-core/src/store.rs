//! Append-only storage for fixed-dimension vectors.
//!
//! Points are addressed by a dense `u32` ID: the n-th vector added gets ID `n`.
//! IDs are never reused or reordered within a store's lifetime.

use crate::error::{Error, Result};

/// Dense, zero-based identifier of a point.
pub type PointId = u32;

/// Largest number of items an index can hold. The top bit of a node header
/// is reserved for the leaf flag.
pub const MAX_ITEMS: usize = (u32::MAX >> 1) as usize;

/// Read-only view of contiguous vectors laid out with a fixed stride.
///
/// Both the in-memory store and memory-mapped images hand out this view, so
/// tree construction and search never care where the vectors live.
#[derive(Debug, Clone, Copy)]
pub struct Vectors<'a> {
    dimension: usize,
    data: &'a [f32],
}

impl<'a> Vectors<'a> {
    /// Wraps `data`, which must hold a whole number of `dimension`-sized vectors.
    pub fn new(dimension: usize, data: &'a [f32]) -> Self {
        debug_assert!(dimension > 0);
        debug_assert_eq!(data.len() % dimension, 0);
        Self { dimension, data }
    }

    /// Vector dimension.
    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of vectors.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len() / self.dimension
    }

    /// Returns true if there are no vectors.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the vector for `id`. Panics if out of range.
    #[inline]
    pub fn get(&self, id: PointId) -> &'a [f32] {
        let start = id as usize * self.dimension;
        &self.data[start..start + self.dimension]
    }

    /// Returns the vector for `id`, or `OutOfRange`.
    pub fn try_get(&self, id: PointId) -> Result<&'a [f32]> {
        if (id as usize) < self.len() {
            Ok(self.get(id))
        } else {
            Err(Error::OutOfRange {
                id,
                n_items: self.len(),
            })
        }
    }

    /// All vector data, row-major.
    #[inline]
    pub fn as_flat(&self) -> &'a [f32] {
        self.data
    }

    /// Iterates over `(id, vector)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (PointId, &'a [f32])> + 'a {
        self.data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(i, v)| (i as PointId, v))
    }
}

/// Owned, growable vector storage.
///
/// # Example
///
/// ```
/// use sylva_core::VectorStore;
///
/// let mut store = VectorStore::new(3);
/// let id = store.add(&[1.0, 2.0, 3.0]).unwrap();
/// assert_eq!(id, 0);
/// assert_eq!(store.get(id).unwrap(), &[1.0, 2.0, 3.0]);
/// ```
#[derive(Debug, Clone)]
pub struct VectorStore {
    dimension: usize,
    data: Vec<f32>,
    sealed: bool,
}

impl VectorStore {
    /// Creates an empty store for `dimension`-sized vectors.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            data: Vec::new(),
            sealed: false,
        }
    }

    /// Creates a store holding a copy of `vectors`.
    pub fn from_vectors(vectors: Vectors<'_>) -> Self {
        Self {
            dimension: vectors.dimension(),
            data: vectors.as_flat().to_vec(),
            sealed: false,
        }
    }

    /// Vector dimension.
    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of stored vectors.
    #[inline]
    pub fn count(&self) -> usize {
        self.data.len() / self.dimension.max(1)
    }

    /// Returns true if the store holds no vectors.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Appends a vector and returns its ID.
    pub fn add(&mut self, vector: &[f32]) -> Result<PointId> {
        if self.sealed {
            return Err(Error::Finalized);
        }
        if vector.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                got: vector.len(),
            });
        }
        let id = self.count();
        if id >= MAX_ITEMS {
            return Err(Error::OutOfRange {
                id: id as PointId,
                n_items: MAX_ITEMS,
            });
        }
        self.data.extend_from_slice(vector);
        Ok(id as PointId)
    }

    /// Stores `vector` under `id`, padding any gap with zero vectors.
    ///
    /// Fails with `DuplicateId` when `id` is already taken.
    pub fn add_at(&mut self, id: PointId, vector: &[f32]) -> Result<PointId> {
        if self.sealed {
            return Err(Error::Finalized);
        }
        if vector.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                got: vector.len(),
            });
        }
        let count = self.count();
        if (id as usize) < count {
            return Err(Error::DuplicateId(id));
        }
        if id as usize >= MAX_ITEMS {
            return Err(Error::OutOfRange {
                id,
                n_items: MAX_ITEMS,
            });
        }
        self.data.resize(id as usize * self.dimension, 0.0);
        self.add(vector)
    }

    /// Returns the vector for `id`.
    pub fn get(&self, id: PointId) -> Result<&[f32]> {
        self.vectors().try_get(id)
    }

    /// Borrowed view of every vector.
    #[inline]
    pub fn vectors(&self) -> Vectors<'_> {
        Vectors::new(self.dimension, &self.data)
    }

    /// Rejects further additions until `unseal`.
    pub(crate) fn seal(&mut self) {
        self.sealed = true;
    }

    /// Returns the store to append-only mode.
    pub(crate) fn unseal(&mut self) {
        self.sealed = false;
    }

    /// Returns true after a build sealed the store.
    #[inline]
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }
}
