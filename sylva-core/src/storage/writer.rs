//! Streaming, atomically published image writer.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use memmap2::{Mmap, MmapMut, MmapOptions};

use super::format::{encode_node, max_leaf_capacity, Header, Layout, TreeEntry, HEADER_SIZE};
use super::{cast_f32, io_error};
use crate::distance::DistanceMetric;
use crate::error::{Error, Result};
use crate::forest::Tree;
use crate::store::{PointId, Vectors, MAX_ITEMS};

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Items a [`VectorSink`] makes room for on its first growth.
const MIN_SINK_CAPACITY: usize = 1024;

/// Writes an image section by section into a temporary file next to the
/// target, then renames it into place.
///
/// Sections must come in order: [`write_vectors`](Self::write_vectors) once,
/// then any number of [`append_tree`](Self::append_tree) calls, then
/// [`finish`](Self::finish). A writer dropped before `finish` deletes its
/// temporary file and leaves the target untouched.
pub struct ImageWriter {
    target: PathBuf,
    temp: PathBuf,
    file: BufWriter<File>,
    dimension: usize,
    metric: DistanceMetric,
    leaf_capacity: usize,
    seed: u64,
    n_items: Option<usize>,
    n_nodes: u64,
    trees: Vec<TreeEntry>,
    slot: Vec<u8>,
    finished: bool,
}

impl ImageWriter {
    /// Starts an image for `path`.
    pub fn create<P: AsRef<Path>>(
        path: P,
        dimension: usize,
        metric: DistanceMetric,
        leaf_capacity: usize,
        seed: u64,
    ) -> Result<Self> {
        if dimension == 0 {
            return Err(Error::InvalidConfig("dimension must be positive".into()));
        }
        if leaf_capacity == 0 || leaf_capacity > max_leaf_capacity(dimension) {
            return Err(Error::InvalidConfig(format!(
                "leaf capacity {} outside 1..={}",
                leaf_capacity,
                max_leaf_capacity(dimension)
            )));
        }

        let target = path.as_ref().to_path_buf();
        let temp = temp_path_for(&target);
        let file = OpenOptions::new()
            .create_new(true)
            .read(true)
            .write(true)
            .open(&temp)
            .map_err(|e| io_error("create temp image", e))?;

        let mut writer = Self {
            target,
            temp,
            file: BufWriter::new(file),
            dimension,
            metric,
            leaf_capacity,
            seed,
            n_items: None,
            n_nodes: 0,
            trees: Vec::new(),
            slot: Vec::with_capacity(16 + 4 * dimension),
            finished: false,
        };
        // placeholder, rewritten by finish
        writer
            .file
            .write_all(&[0u8; HEADER_SIZE])
            .map_err(|e| io_error("write header", e))?;
        Ok(writer)
    }

    /// Path the image will be published at.
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Seed recorded in the header.
    pub fn set_seed(&mut self, seed: u64) {
        self.seed = seed;
    }

    /// Switches to receiving vectors one at a time through a [`VectorSink`].
    pub fn into_sink(mut self) -> Result<VectorSink> {
        if self.n_items.is_some() {
            return Err(Error::IoError("vectors already written".into()));
        }
        self.file
            .flush()
            .map_err(|e| io_error("write header", e))?;
        Ok(VectorSink {
            writer: self,
            mmap: None,
            capacity: 0,
            len: 0,
        })
    }

    fn layout(&self) -> Layout {
        Layout {
            dimension: self.dimension,
            n_items: self.n_items.unwrap_or(0),
            n_nodes: self.n_nodes as usize,
            n_trees: self.trees.len(),
        }
    }

    /// Writes the vector section.
    pub fn write_vectors(&mut self, vectors: Vectors<'_>) -> Result<()> {
        self.write_vector_parts(&[vectors])
    }

    /// Writes the vector section as the concatenation of `parts`, so the
    /// points of part `k` follow those of parts `0..k`.
    pub fn write_vector_parts(&mut self, parts: &[Vectors<'_>]) -> Result<()> {
        if self.n_items.is_some() {
            return Err(Error::IoError("vectors already written".into()));
        }
        for part in parts {
            if part.dimension() != self.dimension {
                return Err(Error::DimensionMismatch {
                    expected: self.dimension,
                    got: part.dimension(),
                });
            }
        }
        let total: usize = parts.iter().map(|p| p.len()).sum();
        if total > MAX_ITEMS {
            return Err(Error::OutOfRange {
                id: MAX_ITEMS as u32,
                n_items: total,
            });
        }

        let mut chunk = Vec::with_capacity(self.dimension * 4);
        for (_, v) in parts.iter().flat_map(|p| p.iter()) {
            chunk.clear();
            for x in v {
                chunk.extend_from_slice(&x.to_le_bytes());
            }
            self.file
                .write_all(&chunk)
                .map_err(|e| io_error("write vectors", e))?;
        }
        self.n_items = Some(total);
        Ok(())
    }

    /// Maps the vector section back in read-only, so trees can be built from
    /// the file instead of from memory.
    pub fn map_vectors(&mut self) -> Result<MappedVectors> {
        let layout = self.layout();
        if self.n_items.is_none() {
            return Err(Error::IoError("vectors not written yet".into()));
        }
        if layout.vectors_len() == 0 {
            return Err(Error::EmptyStore);
        }
        self.file
            .flush()
            .map_err(|e| io_error("flush vectors", e))?;

        // SAFETY: the mapped range is never written again by this writer and
        // the temp file is private to it until published.
        let mmap = unsafe {
            MmapOptions::new()
                .offset(layout.vectors_offset() as u64)
                .len(layout.vectors_len())
                .map(self.file.get_ref())
        }
        .map_err(|e| io_error("map vectors", e))?;
        if mmap.as_ptr().align_offset(std::mem::align_of::<f32>()) != 0 {
            return Err(Error::IoError("mapping is not 4-byte aligned".into()));
        }

        Ok(MappedVectors {
            mmap,
            dimension: self.dimension,
        })
    }

    /// Appends one tree's nodes and records it in the tree table.
    pub fn append_tree(&mut self, tree: &Tree) -> Result<()> {
        if self.n_items.is_none() {
            return Err(Error::IoError("vectors must be written before trees".into()));
        }
        if tree.is_empty() {
            return Err(Error::BuildFailed("empty tree".into()));
        }
        let layout = self.layout();
        for node in tree.nodes() {
            self.slot.clear();
            encode_node(node, &layout, &mut self.slot)?;
            self.file
                .write_all(&self.slot)
                .map_err(|e| io_error("write nodes", e))?;
        }
        self.trees.push(TreeEntry {
            node_base: self.n_nodes,
            node_count: tree.len() as u32,
            root: tree.root(),
        });
        self.n_nodes += tree.len() as u64;
        Ok(())
    }

    /// Number of trees appended so far.
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Writes the tree table and header, syncs, and publishes the image.
    pub fn finish(mut self) -> Result<PathBuf> {
        let n_items = self
            .n_items
            .ok_or_else(|| Error::IoError("vectors not written".into()))?;

        for entry in &self.trees {
            self.file
                .write_all(&entry.encode())
                .map_err(|e| io_error("write tree table", e))?;
        }

        let header = Header {
            dimension: self.dimension as u32,
            metric: self.metric,
            n_items: n_items as u32,
            n_trees: self.trees.len() as u32,
            leaf_capacity: self.leaf_capacity as u32,
            n_nodes: self.n_nodes,
            seed: self.seed,
        };
        self.file
            .seek(SeekFrom::Start(0))
            .map_err(|e| io_error("seek header", e))?;
        self.file
            .write_all(&header.encode())
            .map_err(|e| io_error("write header", e))?;
        self.file.flush().map_err(|e| io_error("flush image", e))?;
        // drop any room a sink reserved past the last vector
        self.file
            .get_ref()
            .set_len(self.layout().file_len() as u64)
            .map_err(|e| io_error("trim image", e))?;
        self.file
            .get_ref()
            .sync_all()
            .map_err(|e| io_error("sync image", e))?;

        std::fs::rename(&self.temp, &self.target).map_err(|e| io_error("publish image", e))?;
        self.finished = true;
        Ok(self.target.clone())
    }
}

impl Drop for ImageWriter {
    fn drop(&mut self) {
        if !self.finished {
            let _ = std::fs::remove_file(&self.temp);
        }
    }
}

/// The vector section of an image under construction, filled one item at a
/// time.
///
/// Vectors are written in place through a writable mapping of the temporary
/// file, which doubles in size whenever it runs out of room, so items never
/// pile up on the heap. [`seal`](Self::seal) ends the section.
pub struct VectorSink {
    writer: ImageWriter,
    mmap: Option<MmapMut>,
    capacity: usize,
    len: usize,
}

impl VectorSink {
    /// Vector dimension.
    pub fn dimension(&self) -> usize {
        self.writer.dimension
    }

    /// Number of items written.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if no item has been written.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Path the image will be published at.
    pub fn target(&self) -> &Path {
        self.writer.target()
    }

    fn row_bytes(&self) -> usize {
        self.writer.dimension * 4
    }

    /// The vectors written so far.
    pub fn vectors(&self) -> Vectors<'_> {
        match &self.mmap {
            Some(mmap) => Vectors::new(
                self.writer.dimension,
                cast_f32(&mmap[..self.len * self.row_bytes()]),
            ),
            None => Vectors::new(self.writer.dimension, &[]),
        }
    }

    /// Appends `vector` and returns its ID.
    pub fn add(&mut self, vector: &[f32]) -> Result<PointId> {
        self.add_at(self.len as PointId, vector)
    }

    /// Writes `vector` under `id`, zero-filling any gap. Fails with
    /// `DuplicateId` when `id` is already taken.
    pub fn add_at(&mut self, id: PointId, vector: &[f32]) -> Result<PointId> {
        if vector.len() != self.writer.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.writer.dimension,
                got: vector.len(),
            });
        }
        if (id as usize) < self.len {
            return Err(Error::DuplicateId(id));
        }
        if id as usize >= MAX_ITEMS {
            return Err(Error::OutOfRange {
                id,
                n_items: MAX_ITEMS,
            });
        }

        self.reserve(id as usize + 1)?;
        let row = self.row_bytes();
        let (gap, start) = (self.len * row, id as usize * row);
        let mmap = self
            .mmap
            .as_mut()
            .ok_or_else(|| Error::IoError("vector section is not mapped".into()))?;
        mmap[gap..start].fill(0);
        for (bytes, x) in mmap[start..start + row].chunks_exact_mut(4).zip(vector) {
            bytes.copy_from_slice(&x.to_le_bytes());
        }
        self.len = id as usize + 1;
        Ok(id)
    }

    /// Grows the file and its mapping to hold at least `items` vectors. The
    /// current mapping stays in place until the larger one exists.
    fn reserve(&mut self, items: usize) -> Result<()> {
        if items <= self.capacity {
            return Ok(());
        }
        let capacity = items
            .max(self.capacity.saturating_mul(2))
            .max(MIN_SINK_CAPACITY)
            .min(MAX_ITEMS);
        let bytes = capacity
            .checked_mul(self.row_bytes())
            .and_then(|b| b.checked_add(HEADER_SIZE))
            .ok_or_else(|| Error::IoError("vector section too large".into()))?;

        let file = self.writer.file.get_ref();
        file.set_len(bytes as u64)
            .map_err(|e| io_error("grow vector section", e))?;
        // SAFETY: the temp file is private to this writer and nothing else
        // touches the vector section until the sink is sealed.
        let mmap = unsafe {
            MmapOptions::new()
                .offset(HEADER_SIZE as u64)
                .len(bytes - HEADER_SIZE)
                .map_mut(file)
        }
        .map_err(|e| io_error("map vector section", e))?;
        if mmap.as_ptr().align_offset(std::mem::align_of::<f32>()) != 0 {
            return Err(Error::IoError("mapping is not 4-byte aligned".into()));
        }

        self.mmap = Some(mmap);
        self.capacity = capacity;
        Ok(())
    }

    /// Ends the vector section and maps it back read-only for tree building.
    /// On error the sink is unchanged and can keep accepting items.
    pub fn seal(&mut self) -> Result<MappedVectors> {
        if let Some(mmap) = &self.mmap {
            mmap.flush().map_err(|e| io_error("flush vector section", e))?;
        }
        let end = HEADER_SIZE + self.len * self.row_bytes();
        self.writer
            .file
            .seek(SeekFrom::Start(end as u64))
            .map_err(|e| io_error("seek past vectors", e))?;
        self.writer.n_items = Some(self.len);
        let mapped = self.writer.map_vectors();
        if mapped.is_err() {
            self.writer.n_items = None;
        }
        mapped
    }

    /// The writer behind a sealed sink, ready for
    /// [`append_tree`](ImageWriter::append_tree).
    pub fn into_writer(self) -> ImageWriter {
        self.writer
    }
}

/// Vectors read back from an image under construction.
#[derive(Debug)]
pub struct MappedVectors {
    mmap: Mmap,
    dimension: usize,
}

impl MappedVectors {
    /// Borrowed view of the mapped vectors.
    pub fn vectors(&self) -> Vectors<'_> {
        Vectors::new(self.dimension, cast_f32(&self.mmap))
    }
}

fn temp_path_for(target: &Path) -> PathBuf {
    let n = TEMP_COUNTER.fetch_add(1, Ordering::SeqCst);
    let name = target
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "index".to_string());
    target.with_file_name(format!(".{}.tmp.{}.{}", name, std::process::id(), n))
}
