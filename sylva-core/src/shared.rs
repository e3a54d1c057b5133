//! Lock-guarded handles for sharing one index between threads and tasks.
//!
//! [`AnnIndex`] itself leaves the single-writer, many-reader discipline to
//! the caller. `SharedIndex` enforces it with a reader-writer lock: queries
//! take the read side and run concurrently, while build, save, load and
//! unload take the write side and wait for in-flight queries to drain.

use std::path::Path;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::config::IndexConfig;
use crate::error::Result;
use crate::index::AnnIndex;
use crate::search::{Neighbors, SearchParams, SearchResult};
use crate::store::PointId;

/// Cloneable, thread-safe handle to an [`AnnIndex`].
///
/// # Example
///
/// ```
/// use sylva_core::SharedIndex;
///
/// let index = SharedIndex::new(2).unwrap();
/// index.add_item(0, &[1.0, 0.0]).unwrap();
/// index.add_item(1, &[0.0, 1.0]).unwrap();
/// index.build(2, 1).unwrap();
///
/// let reader = index.clone();
/// let nns = std::thread::spawn(move || reader.get_nns_by_item(0, 1, None))
///     .join()
///     .unwrap()
///     .unwrap();
/// assert_eq!(nns.ids, vec![1]);
/// ```
#[derive(Clone)]
pub struct SharedIndex {
    inner: Arc<RwLock<AnnIndex>>,
}

impl SharedIndex {
    /// Creates an empty shared index for `dimension`-sized vectors.
    pub fn new(dimension: usize) -> Result<Self> {
        AnnIndex::new(dimension).map(Self::from_index)
    }

    /// Creates an empty shared index from a configuration.
    pub fn with_config(config: IndexConfig) -> Result<Self> {
        AnnIndex::with_config(config).map(Self::from_index)
    }

    /// Opens a saved image.
    pub fn open<P: AsRef<Path>>(path: P, prefault: bool) -> Result<Self> {
        AnnIndex::open(path, prefault).map(Self::from_index)
    }

    /// Wraps an existing index.
    pub fn from_index(index: AnnIndex) -> Self {
        Self {
            inner: Arc::new(RwLock::new(index)),
        }
    }

    /// Shared access for several calls under one lock.
    pub fn read(&self) -> RwLockReadGuard<'_, AnnIndex> {
        self.inner.read()
    }

    /// Exclusive access for several calls under one lock.
    pub fn write(&self) -> RwLockWriteGuard<'_, AnnIndex> {
        self.inner.write()
    }

    /// Returns the index if this is the last handle.
    pub fn try_into_inner(self) -> std::result::Result<AnnIndex, Self> {
        Arc::try_unwrap(self.inner)
            .map(RwLock::into_inner)
            .map_err(|inner| Self { inner })
    }

    pub fn add_item(&self, id_hint: PointId, vector: &[f32]) -> Result<()> {
        self.inner.write().add_item(id_hint, vector)
    }

    pub fn build(&self, num_trees: usize, num_threads: usize) -> Result<()> {
        self.inner.write().build(num_trees, num_threads)
    }

    pub fn unbuild(&self) -> Result<()> {
        self.inner.write().unbuild()
    }

    pub fn on_disk_build<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.inner.write().on_disk_build(path)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P, prefault: bool) -> Result<()> {
        self.inner.write().save(path, prefault)
    }

    pub fn load<P: AsRef<Path>>(&self, path: P, prefault: bool) -> Result<()> {
        self.inner.write().load(path, prefault)
    }

    pub fn unload(&self) {
        self.inner.write().unload()
    }

    pub fn verbose(&self, verbose: bool) {
        self.inner.write().verbose(verbose)
    }

    pub fn set_seed(&self, seed: u64) {
        self.inner.write().set_seed(seed)
    }

    pub fn get_nns_by_item(
        &self,
        item: PointId,
        n: usize,
        search_k: Option<usize>,
    ) -> Result<Neighbors> {
        self.inner.read().get_nns_by_item(item, n, search_k)
    }

    pub fn get_nns_by_vector(
        &self,
        vector: &[f32],
        n: usize,
        search_k: Option<usize>,
    ) -> Result<Neighbors> {
        self.inner.read().get_nns_by_vector(vector, n, search_k)
    }

    pub fn search(&self, query: &[f32], params: &SearchParams<'_>) -> Result<Vec<SearchResult>> {
        self.inner.read().search(query, params)
    }

    pub fn get_distance(&self, i: PointId, j: PointId) -> Result<f32> {
        self.inner.read().get_distance(i, j)
    }

    pub fn get_item(&self, item: PointId) -> Result<Vec<f32>> {
        self.inner.read().get_item(item)
    }

    pub fn get_n_items(&self) -> usize {
        self.inner.read().get_n_items()
    }

    pub fn get_n_trees(&self) -> usize {
        self.inner.read().get_n_trees()
    }
}

impl std::fmt::Debug for SharedIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SharedIndex").field(&*self.inner.read()).finish()
    }
}

// Async API when tokio feature is enabled
#[cfg(feature = "async")]
mod async_api {
    use super::*;
    use crate::error::Error;
    use roaring::RoaringBitmap;
    use std::path::PathBuf;

    fn join_error(e: tokio::task::JoinError) -> Error {
        Error::TaskFailed(format!("spawn_blocking failed: {}", e))
    }

    /// Async wrapper for [`SharedIndex`].
    ///
    /// Every call runs on tokio's blocking pool via `spawn_blocking`, so a
    /// long build or a cold mapped query never stalls the async executor.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use sylva_core::AsyncIndex;
    ///
    /// #[tokio::main]
    /// async fn main() {
    ///     let index = AsyncIndex::new(3).unwrap();
    ///     index.add_item(0, vec![1.0, 0.0, 0.0]).await.unwrap();
    ///     index.build(4, 0).await.unwrap();
    ///     let nns = index.get_nns_by_vector(vec![1.0, 0.0, 0.0], 1, None).await.unwrap();
    /// }
    /// ```
    #[derive(Clone, Debug)]
    pub struct AsyncIndex {
        inner: SharedIndex,
    }

    impl AsyncIndex {
        /// Creates an empty index for `dimension`-sized vectors.
        pub fn new(dimension: usize) -> Result<Self> {
            SharedIndex::new(dimension).map(Self::from_shared)
        }

        /// Opens a saved image asynchronously.
        pub async fn open<P: Into<PathBuf>>(path: P, prefault: bool) -> Result<Self> {
            let path = path.into();
            let shared = tokio::task::spawn_blocking(move || SharedIndex::open(path, prefault))
                .await
                .map_err(join_error)??;
            Ok(Self::from_shared(shared))
        }

        /// Wraps an existing shared handle.
        pub fn from_shared(inner: SharedIndex) -> Self {
            Self { inner }
        }

        /// Adds an item asynchronously.
        pub async fn add_item(&self, id_hint: PointId, vector: Vec<f32>) -> Result<()> {
            let inner = self.inner.clone();
            tokio::task::spawn_blocking(move || inner.add_item(id_hint, &vector))
                .await
                .map_err(join_error)?
        }

        /// Builds the forest asynchronously.
        pub async fn build(&self, num_trees: usize, num_threads: usize) -> Result<()> {
            let inner = self.inner.clone();
            tokio::task::spawn_blocking(move || inner.build(num_trees, num_threads))
                .await
                .map_err(join_error)?
        }

        /// Saves the index asynchronously.
        pub async fn save<P: Into<PathBuf>>(&self, path: P, prefault: bool) -> Result<()> {
            let inner = self.inner.clone();
            let path = path.into();
            tokio::task::spawn_blocking(move || inner.save(path, prefault))
                .await
                .map_err(join_error)?
        }

        /// Loads an image asynchronously.
        pub async fn load<P: Into<PathBuf>>(&self, path: P, prefault: bool) -> Result<()> {
            let inner = self.inner.clone();
            let path = path.into();
            tokio::task::spawn_blocking(move || inner.load(path, prefault))
                .await
                .map_err(join_error)?
        }

        /// Searches by vector asynchronously.
        pub async fn get_nns_by_vector(
            &self,
            vector: Vec<f32>,
            n: usize,
            search_k: Option<usize>,
        ) -> Result<Neighbors> {
            let inner = self.inner.clone();
            tokio::task::spawn_blocking(move || inner.get_nns_by_vector(&vector, n, search_k))
                .await
                .map_err(join_error)?
        }

        /// Searches by item asynchronously.
        pub async fn get_nns_by_item(
            &self,
            item: PointId,
            n: usize,
            search_k: Option<usize>,
        ) -> Result<Neighbors> {
            let inner = self.inner.clone();
            tokio::task::spawn_blocking(move || inner.get_nns_by_item(item, n, search_k))
                .await
                .map_err(join_error)?
        }

        /// Searches by vector, keeping only points in `allow`.
        pub async fn search_filtered(
            &self,
            vector: Vec<f32>,
            n: usize,
            search_k: Option<usize>,
            allow: RoaringBitmap,
        ) -> Result<Vec<SearchResult>> {
            let inner = self.inner.clone();
            tokio::task::spawn_blocking(move || {
                let params = SearchParams {
                    n_results: n,
                    search_k,
                    filter: Some(&allow),
                };
                inner.search(&vector, &params)
            })
            .await
            .map_err(join_error)?
        }

        /// Returns the number of items.
        pub fn get_n_items(&self) -> usize {
            self.inner.get_n_items()
        }

        /// Returns the synchronous handle.
        pub fn shared(&self) -> &SharedIndex {
            &self.inner
        }
    }
}

#[cfg(feature = "async")]
pub use async_api::AsyncIndex;
