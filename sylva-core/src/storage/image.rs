//! Memory-mapped, read-only index images.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use memmap2::{Mmap, MmapOptions};
use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};

use super::format::{Header, Layout, TreeEntry, HEADER_SIZE, LEAF_BIT, TREE_ENTRY_SIZE};
use super::{cast_f32, cast_u32, io_error};
use crate::distance::DistanceMetric;
use crate::error::{Error, Result};
use crate::forest::{ForestView, NodeRef, NodeView};
use crate::store::Vectors;

/// A saved index, mapped into memory.
///
/// Vectors and nodes are read in place. Opening an image validates the
/// header, the file length and the tree table, then walks every tree once so
/// that queries can trust each child reference and leaf ID they follow.
#[derive(Debug)]
pub struct DiskImage {
    path: PathBuf,
    mmap: Mmap,
    header: Header,
    layout: Layout,
    trees: Vec<TreeEntry>,
}

impl DiskImage {
    /// Maps the image at `path`. With `prefault`, every page is read in
    /// up front instead of on first access.
    pub fn open<P: AsRef<Path>>(path: P, prefault: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| io_error("open image", e))?;
        let file_len = file
            .metadata()
            .map_err(|e| io_error("image metadata", e))?
            .len() as usize;
        if file_len < HEADER_SIZE {
            return Err(Error::FormatMismatch(format!(
                "file too short for header: {} bytes",
                file_len
            )));
        }

        let mut options = MmapOptions::new();
        if prefault {
            options.populate();
        }
        // SAFETY: the image is opened read-only and images are published by
        // rename, never rewritten in place. Truncation by another process
        // would still fault, as with any mapped file.
        let mmap = unsafe { options.map(&file) }.map_err(|e| io_error("map image", e))?;
        if mmap.as_ptr().align_offset(std::mem::align_of::<f32>()) != 0 {
            return Err(Error::IoError("mapping is not 4-byte aligned".into()));
        }

        let header = Header::decode(&mmap[..HEADER_SIZE])?;
        let layout = header.layout();
        if layout.file_len() != file_len {
            return Err(Error::FormatMismatch(format!(
                "file is {} bytes, header describes {}",
                file_len,
                layout.file_len()
            )));
        }

        let table = &mmap[layout.tree_table_offset()..];
        let trees: Vec<TreeEntry> = table
            .chunks_exact(TREE_ENTRY_SIZE)
            .map(TreeEntry::decode)
            .collect();
        for (t, entry) in trees.iter().enumerate() {
            let end = entry.node_base.checked_add(entry.node_count as u64);
            if entry.node_count == 0
                || end.map_or(true, |end| end > header.n_nodes)
                || entry.root >= entry.node_count
            {
                return Err(Error::FormatMismatch(format!(
                    "tree {} has an invalid table entry",
                    t
                )));
            }
        }

        let image = Self {
            path,
            mmap,
            header,
            layout,
            trees,
        };
        for t in 0..image.trees.len() {
            image.verify_tree(t)?;
        }
        Ok(image)
    }

    /// Checks every node of tree `tree`: leaves must fit their slot and hold
    /// IDs below the item count, children must lie inside the tree, and no
    /// node may be reachable from the root twice.
    fn verify_tree(&self, tree: usize) -> Result<()> {
        let entry = self.trees[tree];
        let n_items = self.layout.n_items;
        let corrupt = |node: NodeRef, what: &str| {
            Error::FormatMismatch(format!("tree {} node {}: {}", tree, node, what))
        };

        for node in 0..entry.node_count {
            let words = cast_u32(self.slot(tree, node));
            let head = words[0];
            if head & LEAF_BIT != 0 {
                let count = (head & !LEAF_BIT) as usize;
                if count >= words.len() {
                    return Err(corrupt(node, "leaf overflows its slot"));
                }
                if words[1..=count].iter().any(|&id| id as usize >= n_items) {
                    return Err(corrupt(node, "leaf id out of range"));
                }
            } else if words[1] >= entry.node_count || words[2] >= entry.node_count {
                return Err(corrupt(node, "child outside tree"));
            }
        }

        let mut seen = RoaringBitmap::new();
        seen.insert(entry.root);
        let mut stack = vec![entry.root];
        while let Some(node) = stack.pop() {
            if let NodeView::Split { left, right, .. } = self.node(tree, node) {
                for child in [left, right] {
                    if !seen.insert(child) {
                        return Err(corrupt(node, "child reached twice"));
                    }
                    stack.push(child);
                }
            }
        }
        Ok(())
    }

    /// Reads only the header of the image at `path`.
    pub fn read_header<P: AsRef<Path>>(path: P) -> Result<Header> {
        let mut file = File::open(path.as_ref()).map_err(|e| io_error("open image", e))?;
        let mut buf = [0u8; HEADER_SIZE];
        file.read_exact(&mut buf)
            .map_err(|e| io_error("read image header", e))?;
        Header::decode(&buf)
    }

    /// Path the image was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parsed header.
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Seed the forest was built with.
    pub fn seed(&self) -> u64 {
        self.header.seed
    }

    /// Summary of the image.
    pub fn info(&self) -> ImageInfo {
        ImageInfo::new(&self.path, &self.header)
    }

    /// Global slot bytes of node `node` in tree `tree`.
    #[inline]
    fn slot(&self, tree: usize, node: NodeRef) -> &[u8] {
        let entry = &self.trees[tree];
        assert!(node < entry.node_count, "node {} outside tree {}", node, tree);
        let start = self.layout.slot_offset(entry.node_base as usize + node as usize);
        &self.mmap[start..start + self.layout.slot_size()]
    }
}

impl ForestView for DiskImage {
    fn metric(&self) -> DistanceMetric {
        self.header.metric
    }

    fn vectors(&self) -> Vectors<'_> {
        let start = self.layout.vectors_offset();
        let bytes = &self.mmap[start..start + self.layout.vectors_len()];
        Vectors::new(self.layout.dimension, cast_f32(bytes))
    }

    fn n_trees(&self) -> usize {
        self.trees.len()
    }

    fn leaf_capacity(&self) -> usize {
        self.header.leaf_capacity as usize
    }

    fn root(&self, tree: usize) -> NodeRef {
        self.trees[tree].root
    }

    fn tree_len(&self, tree: usize) -> usize {
        self.trees[tree].node_count as usize
    }

    fn node(&self, tree: usize, node: NodeRef) -> NodeView<'_> {
        let slot = self.slot(tree, node);
        let words = cast_u32(slot);
        let head = words[0];
        if head & LEAF_BIT != 0 {
            let count = ((head & !LEAF_BIT) as usize).min(words.len() - 1);
            NodeView::Leaf {
                ids: &words[1..1 + count],
            }
        } else {
            NodeView::Split {
                normal: cast_f32(&slot[16..]),
                offset: f32::from_bits(words[3]),
                left: words[1],
                right: words[2],
            }
        }
    }

    fn dimension(&self) -> usize {
        self.layout.dimension
    }

    fn n_items(&self) -> usize {
        self.layout.n_items
    }
}

/// Serializable summary of a saved image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub path: PathBuf,
    pub dimension: usize,
    pub metric: DistanceMetric,
    pub n_items: usize,
    pub n_trees: usize,
    pub n_nodes: u64,
    pub leaf_capacity: usize,
    pub seed: u64,
    pub file_len: u64,
}

impl ImageInfo {
    fn new(path: &Path, header: &Header) -> Self {
        Self {
            path: path.to_path_buf(),
            dimension: header.dimension as usize,
            metric: header.metric,
            n_items: header.n_items as usize,
            n_trees: header.n_trees as usize,
            n_nodes: header.n_nodes,
            leaf_capacity: header.leaf_capacity as usize,
            seed: header.seed,
            file_len: header.layout().file_len() as u64,
        }
    }

    /// Reads the summary from the header of the image at `path`.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let header = DiskImage::read_header(path.as_ref())?;
        Ok(Self::new(path.as_ref(), &header))
    }
}
