//! The user-facing index handle.
//!
//! An [`AnnIndex`] moves through these states:
//!
//! - **building**: an append-only vector store, no trees;
//! - **streaming**: like building, but items go straight into the vector
//!   section of an image file (see [`AnnIndex::on_disk_build`]);
//! - **built**: the store is sealed and an in-memory forest answers queries;
//! - **mapped**: vectors and trees are read in place from a saved image and
//!   the index is read-only.
//!
//! Queries never mutate the index, so a built or mapped index can be shared
//! across threads behind `&`. Mutating calls take `&mut self`; see
//! [`SharedIndex`](crate::SharedIndex) for a lock-guarded handle.

use std::path::Path;

use crate::config::IndexConfig;
use crate::distance::DistanceMetric;
use crate::error::{Error, Result};
use crate::forest::{BuildPlan, Forest, ForestView, MemoryForest, NodeRef, NodeView};
use crate::search::{self, Neighbors, SearchParams, SearchResult};
use crate::storage::{DiskImage, ImageInfo, ImageWriter, MappedVectors, VectorSink};
use crate::store::{PointId, VectorStore, Vectors};

enum State {
    Building { store: VectorStore },
    Streaming { sink: VectorSink },
    Built { store: VectorStore, forest: Forest },
    Mapped { image: DiskImage },
}

/// Approximate nearest-neighbor index over a random-projection forest.
///
/// # Example
///
/// ```
/// use sylva_core::AnnIndex;
///
/// let mut index = AnnIndex::new(3).unwrap();
/// index.add_item(0, &[1.0, 0.0, 0.0]).unwrap();
/// index.add_item(1, &[0.0, 1.0, 0.0]).unwrap();
/// index.add_item(2, &[0.9, 0.1, 0.0]).unwrap();
/// index.build(4, 1).unwrap();
///
/// let nns = index.get_nns_by_vector(&[1.0, 0.0, 0.0], 2, None).unwrap();
/// assert_eq!(nns.ids, vec![0, 2]);
/// ```
pub struct AnnIndex {
    config: IndexConfig,
    state: State,
}

impl AnnIndex {
    /// Creates an empty angular index for `dimension`-sized vectors.
    #[doc(alias = "create")]
    pub fn new(dimension: usize) -> Result<Self> {
        Self::with_config(IndexConfig::new(dimension))
    }

    /// Creates an empty index from a configuration.
    pub fn with_config(config: IndexConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            state: State::Building {
                store: VectorStore::new(config.dimension),
            },
            config,
        })
    }

    /// Opens a saved image as a read-only index, taking dimension, metric and
    /// seed from its header.
    pub fn open<P: AsRef<Path>>(path: P, prefault: bool) -> Result<Self> {
        let image = DiskImage::open(path, prefault)?;
        let header = *image.header();
        let mut config = IndexConfig::new(header.dimension as usize)
            .with_metric(header.metric)
            .with_seed(header.seed);
        if header.n_trees > 0 {
            config.leaf_size = Some(header.leaf_capacity as usize);
        }
        progress!(
            config.verbose,
            path = %image.path().display(),
            n_items = header.n_items,
            n_trees = header.n_trees,
            "opened image"
        );
        Ok(Self {
            config,
            state: State::Mapped { image },
        })
    }

    /// The configuration.
    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Vector dimension.
    pub fn dimension(&self) -> usize {
        self.config.dimension
    }

    /// Distance metric.
    pub fn metric(&self) -> DistanceMetric {
        self.config.metric
    }

    /// Turns progress logging at info level on or off.
    pub fn verbose(&mut self, verbose: bool) {
        self.config.verbose = verbose;
    }

    /// Sets the seed used by the next build.
    pub fn set_seed(&mut self, seed: u64) {
        self.config.seed = seed;
    }

    /// Returns true if queries can be answered.
    pub fn is_built(&self) -> bool {
        self.get_n_trees() > 0
    }

    /// Returns true if the index is backed by a read-only image.
    pub fn is_mapped(&self) -> bool {
        matches!(self.state, State::Mapped { .. })
    }

    /// Summary of the backing image, when mapped.
    pub fn image_info(&self) -> Option<ImageInfo> {
        match &self.state {
            State::Mapped { image } => Some(image.info()),
            _ => None,
        }
    }

    /// Stored vectors, in any state.
    pub fn vectors(&self) -> Vectors<'_> {
        match &self.state {
            State::Building { store } | State::Built { store, .. } => store.vectors(),
            State::Streaming { sink } => sink.vectors(),
            State::Mapped { image } => image.vectors(),
        }
    }

    /// Read access to the forest, when one exists.
    pub fn forest(&self) -> Option<IndexView<'_>> {
        match &self.state {
            State::Building { .. } | State::Streaming { .. } => None,
            State::Built { store, forest } => Some(IndexView::Memory(
                forest.with_vectors(store.vectors(), self.config.metric),
            )),
            State::Mapped { image } if image.n_trees() > 0 => Some(IndexView::Disk(image)),
            State::Mapped { .. } => None,
        }
    }

    /// Stores `vector` under `id_hint`.
    ///
    /// `id_hint` equal to the current item count appends; a larger hint pads
    /// the gap with zero vectors; a smaller one fails with `DuplicateId`.
    pub fn add_item(&mut self, id_hint: PointId, vector: &[f32]) -> Result<()> {
        match &mut self.state {
            State::Building { store } | State::Built { store, .. } => {
                store.add_at(id_hint, vector).map(|_| ())
            }
            State::Streaming { sink } => sink.add_at(id_hint, vector).map(|_| ()),
            State::Mapped { .. } => Err(Error::ReadOnly),
        }
    }

    /// Appends `vector` and returns its ID.
    pub fn add(&mut self, vector: &[f32]) -> Result<PointId> {
        match &mut self.state {
            State::Building { store } | State::Built { store, .. } => store.add(vector),
            State::Streaming { sink } => sink.add(vector),
            State::Mapped { .. } => Err(Error::ReadOnly),
        }
    }

    /// Streams items into an image at `path` and builds the trees there.
    ///
    /// Items added so far move into the image's vector section, and later
    /// ones are written through a growing file mapping instead of the heap.
    /// The next [`build`](Self::build) appends the trees, publishes the
    /// image at `path` and leaves the index mapped and read-only. Calling
    /// this again moves the items to a new path.
    pub fn on_disk_build<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        match &self.state {
            State::Mapped { .. } => return Err(Error::ReadOnly),
            State::Built { .. } => return Err(Error::AlreadyBuilt),
            State::Building { .. } | State::Streaming { .. } => {}
        }

        let writer = ImageWriter::create(
            path.as_ref(),
            self.config.dimension,
            self.config.metric,
            self.config.leaf_capacity(),
            self.config.seed,
        )?;
        let mut sink = writer.into_sink()?;
        for (_, v) in self.vectors().iter() {
            sink.add(v)?;
        }
        progress!(
            self.config.verbose,
            path = %path.as_ref().display(),
            n_items = sink.len(),
            "streaming items to image"
        );
        self.state = State::Streaming { sink };
        Ok(())
    }

    fn plan(&self, num_trees: usize, num_threads: usize) -> BuildPlan {
        BuildPlan {
            num_trees,
            num_threads,
            seed: self.config.seed,
            leaf_capacity: self.config.leaf_capacity(),
            metric: self.config.metric,
            verbose: self.config.verbose,
        }
    }

    /// Builds `num_trees` trees on up to `num_threads` threads.
    ///
    /// `num_trees == 0` keeps adding trees until the forest has about as many
    /// nodes as there are items; `num_threads == 0` uses every hardware
    /// thread. On failure the index stays in the building state.
    pub fn build(&mut self, num_trees: usize, num_threads: usize) -> Result<()> {
        let plan = self.plan(num_trees, num_threads);
        let store = match &mut self.state {
            State::Mapped { .. } => return Err(Error::ReadOnly),
            State::Built { .. } => return Err(Error::AlreadyBuilt),
            State::Streaming { sink } => {
                if sink.is_empty() {
                    return Err(Error::EmptyStore);
                }
                let mapped = sink.seal()?;
                return self.build_on_disk(&plan, mapped);
            }
            State::Building { store } => store,
        };
        if store.is_empty() {
            return Err(Error::EmptyStore);
        }

        let mut forest = Forest::new(plan.leaf_capacity);
        plan.run(store.vectors(), |_, tree| {
            forest.push(tree);
            Ok(())
        })?;

        let State::Building { mut store } = self.take_state() else {
            return Err(Error::BuildFailed("index changed state during build".into()));
        };
        store.seal();
        self.state = State::Built { store, forest };
        Ok(())
    }

    /// Builds over the sealed vector section of a streaming index. On failure
    /// the items come back into memory and the index is building again.
    fn build_on_disk(&mut self, plan: &BuildPlan, mapped: MappedVectors) -> Result<()> {
        let State::Streaming { sink } = self.take_state() else {
            return Err(Error::BuildFailed("index changed state during build".into()));
        };
        let path = sink.target().to_path_buf();
        let mut writer = sink.into_writer();
        writer.set_seed(plan.seed);

        let built = plan
            .run(mapped.vectors(), |_, tree| writer.append_tree(&tree))
            .and_then(|_| writer.finish())
            .and_then(|published| DiskImage::open(published, false));

        match built {
            Ok(image) => {
                progress!(plan.verbose, path = %path.display(), "on-disk build published");
                self.state = State::Mapped { image };
                Ok(())
            }
            Err(e) => {
                self.state = State::Building {
                    store: VectorStore::from_vectors(mapped.vectors()),
                };
                Err(e)
            }
        }
    }

    fn take_state(&mut self) -> State {
        std::mem::replace(
            &mut self.state,
            State::Building {
                store: VectorStore::new(self.config.dimension),
            },
        )
    }

    /// Discards the trees and returns to the append-only state.
    pub fn unbuild(&mut self) -> Result<()> {
        match self.take_state() {
            building @ (State::Building { .. } | State::Streaming { .. }) => {
                self.state = building;
                Ok(())
            }
            State::Built { mut store, .. } => {
                store.unseal();
                self.state = State::Building { store };
                Ok(())
            }
            mapped @ State::Mapped { .. } => {
                self.state = mapped;
                Err(Error::ReadOnly)
            }
        }
    }

    /// Writes the index to `path` and reopens it from there.
    ///
    /// The image is written to a temporary file and renamed into place. An
    /// unbuilt index saves its items only. Afterwards the index is mapped and
    /// read-only; `prefault` reads every page in up front.
    pub fn save<P: AsRef<Path>>(&mut self, path: P, prefault: bool) -> Result<()> {
        let path = path.as_ref();
        let (leaf_capacity, seed) = match &self.state {
            State::Mapped { image } => (
                image.header().leaf_capacity.max(1) as usize,
                image.seed(),
            ),
            _ => (self.config.leaf_capacity(), self.config.seed),
        };

        let mut writer = ImageWriter::create(
            path,
            self.config.dimension,
            self.config.metric,
            leaf_capacity,
            seed,
        )?;
        writer.write_vectors(self.vectors())?;
        match &self.state {
            State::Building { .. } | State::Streaming { .. } => {}
            State::Built { forest, .. } => {
                for tree in forest.trees() {
                    writer.append_tree(tree)?;
                }
            }
            State::Mapped { image } => {
                for t in 0..image.n_trees() {
                    writer.append_tree(&crate::forest::Tree::copy_from(image, t))?;
                }
            }
        }
        let published = writer.finish()?;

        let image = DiskImage::open(&published, prefault)?;
        progress!(
            self.config.verbose,
            path = %published.display(),
            n_items = image.n_items(),
            n_trees = image.n_trees(),
            "saved index"
        );
        self.state = State::Mapped { image };
        Ok(())
    }

    /// Replaces the index contents with the image at `path`.
    ///
    /// Fails with `FormatMismatch` when the image's dimension or metric
    /// differs from this index's configuration.
    pub fn load<P: AsRef<Path>>(&mut self, path: P, prefault: bool) -> Result<()> {
        let image = DiskImage::open(path, prefault)?;
        let header = image.header();
        if header.dimension as usize != self.config.dimension {
            return Err(Error::FormatMismatch(format!(
                "image dimension {} does not match index dimension {}",
                header.dimension, self.config.dimension
            )));
        }
        if header.metric != self.config.metric {
            return Err(Error::FormatMismatch(format!(
                "image metric {:?} does not match index metric {:?}",
                header.metric, self.config.metric
            )));
        }
        progress!(
            self.config.verbose,
            path = %image.path().display(),
            n_items = header.n_items,
            n_trees = header.n_trees,
            "loaded index"
        );
        self.state = State::Mapped { image };
        Ok(())
    }

    /// Releases all items, trees and mappings. The index becomes empty and
    /// writable again.
    pub fn unload(&mut self) {
        drop(self.take_state());
        progress!(self.config.verbose, "unloaded index");
    }

    /// Number of stored items.
    pub fn get_n_items(&self) -> usize {
        self.vectors().len()
    }

    /// Number of trees.
    pub fn get_n_trees(&self) -> usize {
        match &self.state {
            State::Building { .. } | State::Streaming { .. } => 0,
            State::Built { forest, .. } => forest.len(),
            State::Mapped { image } => image.n_trees(),
        }
    }

    /// Copy of the vector stored under `item`.
    pub fn get_item(&self, item: PointId) -> Result<Vec<f32>> {
        Ok(self.vectors().try_get(item)?.to_vec())
    }

    /// Distance between two stored items.
    pub fn get_distance(&self, i: PointId, j: PointId) -> Result<f32> {
        let vectors = self.vectors();
        let a = vectors.try_get(i)?;
        let b = vectors.try_get(j)?;
        Ok(self.config.metric.distance(a, b))
    }

    /// Searches with full control over the parameters.
    pub fn search(&self, query: &[f32], params: &SearchParams<'_>) -> Result<Vec<SearchResult>> {
        let view = self.forest().ok_or(Error::NotBuilt)?;
        search::search(&view, query, params, None)
    }

    /// Searches around a stored item, leaving the item itself out.
    pub fn search_by_item(
        &self,
        item: PointId,
        params: &SearchParams<'_>,
    ) -> Result<Vec<SearchResult>> {
        let view = self.forest().ok_or(Error::NotBuilt)?;
        let query = view.vectors().try_get(item)?;
        search::search(&view, query, params, Some(item))
    }

    /// The `n` nearest neighbors of `vector`.
    pub fn get_nns_by_vector(
        &self,
        vector: &[f32],
        n: usize,
        search_k: Option<usize>,
    ) -> Result<Neighbors> {
        let params = SearchParams {
            n_results: n,
            search_k,
            filter: None,
        };
        self.search(vector, &params).map(Neighbors::from)
    }

    /// The `n` nearest neighbors of stored item `item`, excluding itself.
    pub fn get_nns_by_item(
        &self,
        item: PointId,
        n: usize,
        search_k: Option<usize>,
    ) -> Result<Neighbors> {
        let params = SearchParams {
            n_results: n,
            search_k,
            filter: None,
        };
        self.search_by_item(item, &params).map(Neighbors::from)
    }
}

impl std::fmt::Debug for AnnIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.state {
            State::Building { .. } => "building",
            State::Streaming { .. } => "streaming",
            State::Built { .. } => "built",
            State::Mapped { .. } => "mapped",
        };
        f.debug_struct("AnnIndex")
            .field("dimension", &self.config.dimension)
            .field("metric", &self.config.metric)
            .field("state", &state)
            .field("n_items", &self.get_n_items())
            .field("n_trees", &self.get_n_trees())
            .finish()
    }
}

/// A built forest, in memory or mapped from disk.
#[derive(Debug, Clone, Copy)]
pub enum IndexView<'a> {
    Memory(MemoryForest<'a>),
    Disk(&'a DiskImage),
}

impl ForestView for IndexView<'_> {
    fn metric(&self) -> DistanceMetric {
        match self {
            IndexView::Memory(f) => f.metric(),
            IndexView::Disk(d) => d.metric(),
        }
    }

    fn vectors(&self) -> Vectors<'_> {
        match self {
            IndexView::Memory(f) => f.vectors(),
            IndexView::Disk(d) => d.vectors(),
        }
    }

    fn n_trees(&self) -> usize {
        match self {
            IndexView::Memory(f) => f.n_trees(),
            IndexView::Disk(d) => d.n_trees(),
        }
    }

    fn leaf_capacity(&self) -> usize {
        match self {
            IndexView::Memory(f) => f.leaf_capacity(),
            IndexView::Disk(d) => d.leaf_capacity(),
        }
    }

    fn root(&self, tree: usize) -> NodeRef {
        match self {
            IndexView::Memory(f) => f.root(tree),
            IndexView::Disk(d) => d.root(tree),
        }
    }

    fn tree_len(&self, tree: usize) -> usize {
        match self {
            IndexView::Memory(f) => f.tree_len(tree),
            IndexView::Disk(d) => d.tree_len(tree),
        }
    }

    fn node(&self, tree: usize, node: NodeRef) -> NodeView<'_> {
        match self {
            IndexView::Memory(f) => f.node(tree, node),
            IndexView::Disk(d) => d.node(tree, node),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU64, Ordering};

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_path() -> PathBuf {
        let n = COUNTER.fetch_add(1, Ordering::SeqCst);
        std::env::temp_dir().join(format!("sylva_index_test_{}_{}.idx", std::process::id(), n))
    }

    fn filled(n: usize, dim: usize) -> AnnIndex {
        let mut index = AnnIndex::new(dim).unwrap();
        for i in 0..n {
            let v: Vec<f32> = (0..dim)
                .map(|d| (((i * 31 + d * 17) % 23) as f32) - 11.0)
                .collect();
            index.add_item(i as PointId, &v).unwrap();
        }
        index
    }

    #[test]
    fn test_lifecycle_errors() {
        let mut index = filled(20, 4);
        assert!(matches!(
            index.get_nns_by_item(0, 3, None),
            Err(Error::NotBuilt)
        ));

        index.build(3, 1).unwrap();
        assert!(index.is_built());
        assert!(matches!(index.build(3, 1), Err(Error::AlreadyBuilt)));
        assert!(matches!(
            index.add_item(20, &[0.0; 4]),
            Err(Error::Finalized)
        ));

        index.unbuild().unwrap();
        assert!(!index.is_built());
        index.add_item(20, &[1.0; 4]).unwrap();
        assert_eq!(index.get_n_items(), 21);
    }

    #[test]
    fn test_build_empty_store() {
        let mut index = AnnIndex::new(3).unwrap();
        assert!(matches!(index.build(2, 1), Err(Error::EmptyStore)));
    }

    #[test]
    fn test_rebuild_is_deterministic() {
        let mut index = filled(150, 5);
        index.build(4, 2).unwrap();
        let before = index.get_nns_by_item(7, 10, None).unwrap();

        index.unbuild().unwrap();
        index.build(4, 1).unwrap();
        assert_eq!(index.get_nns_by_item(7, 10, None).unwrap(), before);
    }

    #[test]
    fn test_id_hint_semantics() {
        let mut index = AnnIndex::new(2).unwrap();
        index.add_item(0, &[1.0, 0.0]).unwrap();
        index.add_item(3, &[0.0, 1.0]).unwrap();
        assert_eq!(index.get_n_items(), 4);
        assert_eq!(index.get_item(2).unwrap(), vec![0.0, 0.0]);
        assert!(matches!(
            index.add_item(1, &[1.0, 1.0]),
            Err(Error::DuplicateId(1))
        ));
        assert_eq!(index.add(&[2.0, 2.0]).unwrap(), 4);
    }

    #[test]
    fn test_wrong_length_leaves_count() {
        let mut index = filled(3, 4);
        assert!(matches!(
            index.add_item(3, &[1.0]),
            Err(Error::DimensionMismatch {
                expected: 4,
                got: 1
            })
        ));
        assert_eq!(index.get_n_items(), 3);
    }

    #[test]
    fn test_distance_and_item_bounds() {
        let index = filled(4, 3);
        assert_eq!(index.get_distance(1, 1).unwrap(), 0.0);
        assert_eq!(
            index.get_distance(0, 2).unwrap(),
            index.get_distance(2, 0).unwrap()
        );
        assert!(matches!(
            index.get_distance(0, 9),
            Err(Error::OutOfRange { id: 9, n_items: 4 })
        ));
        assert!(matches!(index.get_item(4), Err(Error::OutOfRange { .. })));
    }

    #[test]
    fn test_save_makes_read_only() {
        let path = temp_path();
        let mut index = filled(60, 4);
        index.build(3, 1).unwrap();
        let before = index.get_nns_by_item(5, 8, None).unwrap();

        index.save(&path, false).unwrap();
        assert!(index.is_mapped());
        assert_eq!(index.get_nns_by_item(5, 8, None).unwrap(), before);
        assert!(matches!(index.add_item(60, &[0.0; 4]), Err(Error::ReadOnly)));
        assert!(matches!(index.build(1, 1), Err(Error::ReadOnly)));
        assert!(matches!(index.unbuild(), Err(Error::ReadOnly)));
        assert!(index.is_mapped());

        index.unload();
        assert_eq!(index.get_n_items(), 0);
        assert!(!index.is_built());
        index.add_item(0, &[1.0; 4]).unwrap();

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_save_unbuilt_items_only() {
        let path = temp_path();
        let mut index = filled(10, 3);
        index.save(&path, false).unwrap();

        let reopened = AnnIndex::open(&path, false).unwrap();
        assert_eq!(reopened.get_n_items(), 10);
        assert_eq!(reopened.get_n_trees(), 0);
        assert!(matches!(
            reopened.get_nns_by_vector(&[0.0; 3], 2, None),
            Err(Error::NotBuilt)
        ));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_load_checks_header() {
        let path = temp_path();
        let mut index = filled(10, 3);
        index.build(2, 1).unwrap();
        index.save(&path, false).unwrap();

        let mut other = AnnIndex::new(4).unwrap();
        assert!(matches!(
            other.load(&path, false),
            Err(Error::FormatMismatch(_))
        ));

        let mut euclid =
            AnnIndex::with_config(IndexConfig::new(3).with_metric(DistanceMetric::Euclidean))
                .unwrap();
        assert!(matches!(
            euclid.load(&path, false),
            Err(Error::FormatMismatch(_))
        ));

        let mut same = AnnIndex::new(3).unwrap();
        same.load(&path, true).unwrap();
        assert_eq!(same.get_n_items(), 10);
        assert_eq!(same.get_n_trees(), 2);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_on_disk_build() {
        let path = temp_path();
        let mut memory = filled(120, 6);
        memory.build(4, 1).unwrap();

        let mut disk = filled(120, 6);
        disk.on_disk_build(&path).unwrap();
        disk.build(4, 2).unwrap();
        assert!(disk.is_mapped());
        assert_eq!(disk.get_n_trees(), 4);

        for item in [0, 33, 119] {
            assert_eq!(
                disk.get_nns_by_item(item, 6, None).unwrap(),
                memory.get_nns_by_item(item, 6, None).unwrap()
            );
        }
        assert!(matches!(disk.add_item(120, &[0.0; 6]), Err(Error::ReadOnly)));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_on_disk_build_bad_path_keeps_items() {
        let dir = temp_path();
        let missing = dir.join("missing").join("index.idx");
        let mut index = filled(15, 3);
        assert!(matches!(
            index.on_disk_build(&missing),
            Err(Error::IoError(_))
        ));
        assert_eq!(index.get_n_items(), 15);
        index.build(2, 1).unwrap();
        assert!(!index.is_mapped());
    }

    #[test]
    fn test_on_disk_build_streams_items() {
        let path = temp_path();
        let mut index = AnnIndex::new(4).unwrap();
        index.on_disk_build(&path).unwrap();
        assert!(format!("{:?}", index).contains("streaming"));

        for i in 0..40u32 {
            index.add(&[i as f32, 1.0, -1.0, 0.5]).unwrap();
        }
        index.add_item(45, &[2.0; 4]).unwrap();
        assert_eq!(index.get_n_items(), 46);
        assert_eq!(index.get_item(42).unwrap(), vec![0.0; 4]);
        assert_eq!(index.get_item(45).unwrap(), vec![2.0; 4]);
        assert!(matches!(
            index.add_item(3, &[0.0; 4]),
            Err(Error::DuplicateId(3))
        ));
        assert!(!index.is_built());
        assert!(!path.exists());

        index.set_seed(11);
        index.build(3, 1).unwrap();
        assert!(index.is_mapped());
        assert_eq!(index.get_n_items(), 46);

        let reopened = AnnIndex::open(&path, false).unwrap();
        assert_eq!(reopened.config().seed, 11);
        assert_eq!(reopened.get_item(10).unwrap(), vec![10.0, 1.0, -1.0, 0.5]);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_on_disk_build_can_move_or_be_dropped() {
        let first = temp_path();
        let second = temp_path();
        let mut index = filled(30, 3);
        index.on_disk_build(&first).unwrap();
        index.add(&[1.0, 2.0, 3.0]).unwrap();
        index.on_disk_build(&second).unwrap();
        assert_eq!(index.get_n_items(), 31);

        index.build(2, 1).unwrap();
        assert!(!first.exists());
        assert_eq!(AnnIndex::open(&second, false).unwrap().get_n_items(), 31);
        std::fs::remove_file(&second).ok();

        let mut empty = AnnIndex::new(3).unwrap();
        empty.on_disk_build(&first).unwrap();
        assert!(matches!(empty.build(2, 1), Err(Error::EmptyStore)));
        empty.unload();
        assert!(!empty.is_mapped());
        assert!(!first.exists());
    }

    #[test]
    fn test_open_reads_config_from_header() {
        let path = temp_path();
        let mut index = AnnIndex::with_config(
            IndexConfig::new(5)
                .with_metric(DistanceMetric::Euclidean)
                .with_seed(99),
        )
        .unwrap();
        for i in 0..30u32 {
            index.add(&[i as f32, 1.0, 2.0, 3.0, 4.0]).unwrap();
        }
        index.build(2, 1).unwrap();
        index.save(&path, false).unwrap();

        let opened = AnnIndex::open(&path, false).unwrap();
        assert_eq!(opened.dimension(), 5);
        assert_eq!(opened.metric(), DistanceMetric::Euclidean);
        assert_eq!(opened.config().seed, 99);
        let info = opened.image_info().unwrap();
        assert_eq!(info.n_items, 30);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_debug_output() {
        let index = filled(2, 2);
        let dbg = format!("{:?}", index);
        assert!(dbg.contains("building"));
        assert!(dbg.contains("n_items: 2"));
    }
}
