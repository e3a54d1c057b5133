//! Binary image layout.
//!
//! # Format
//!
//! All integers and floats are little-endian. With `D` the dimension:
//!
//! ```text
//! [header: 64 bytes]
//! [vectors: n_items * D * f32]
//! [node slots: n_nodes * (16 + 4D) bytes]
//! [tree table: n_trees * 16 bytes]
//! ```
//!
//! Header:
//! ```text
//! 0  magic "SYLV"      4  version u32     8  dimension u32   12 metric tag u32
//! 16 n_items u32       20 n_trees u32     24 leaf_cap u32    28 reserved
//! 32 n_nodes u64       40 seed u64        48 reserved        60 crc32 of [0, 60)
//! ```
//!
//! Every node occupies one fixed-size slot, so node `r` of a tree starting at
//! slot `base` lives at `nodes_offset + (base + r) * slot_size`. A slot's
//! first word tells the two kinds apart:
//!
//! ```text
//! split: [n_descendants u32][left u32][right u32][offset f32][normal f32 * D]
//! leaf:  [LEAF_BIT | count u32][id u32 * count][zero padding]
//! ```
//!
//! Tree table entry: `[node_base u64][node_count u32][root u32]`.

use crate::distance::DistanceMetric;
use crate::error::{Error, Result};
use crate::forest::{Node, NodeRef};
use crate::store::MAX_ITEMS;

/// File magic.
pub const MAGIC: [u8; 4] = *b"SYLV";

/// Current format version.
pub const FORMAT_VERSION: u32 = 1;

/// Size of the fixed header.
pub const HEADER_SIZE: usize = 64;

/// Size of one tree table entry.
pub const TREE_ENTRY_SIZE: usize = 16;

/// Flag in a slot's first word marking a leaf.
pub const LEAF_BIT: u32 = 1 << 31;

const CRC_OFFSET: usize = 60;

/// Largest leaf a slot can hold for `dimension`.
#[inline]
pub fn max_leaf_capacity(dimension: usize) -> usize {
    dimension + 3
}

/// Image header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub dimension: u32,
    pub metric: DistanceMetric,
    pub n_items: u32,
    pub n_trees: u32,
    pub leaf_capacity: u32,
    pub n_nodes: u64,
    pub seed: u64,
}

impl Header {
    /// Serializes the header, checksum included.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&MAGIC);
        buf[4..8].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
        buf[8..12].copy_from_slice(&self.dimension.to_le_bytes());
        buf[12..16].copy_from_slice(&self.metric.tag().to_le_bytes());
        buf[16..20].copy_from_slice(&self.n_items.to_le_bytes());
        buf[20..24].copy_from_slice(&self.n_trees.to_le_bytes());
        buf[24..28].copy_from_slice(&self.leaf_capacity.to_le_bytes());
        buf[32..40].copy_from_slice(&self.n_nodes.to_le_bytes());
        buf[40..48].copy_from_slice(&self.seed.to_le_bytes());
        let crc = crc32fast::hash(&buf[..CRC_OFFSET]);
        buf[CRC_OFFSET..].copy_from_slice(&crc.to_le_bytes());
        buf
    }

    /// Parses and validates a header.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(Error::FormatMismatch(format!(
                "file too short for header: {} bytes",
                bytes.len()
            )));
        }
        if bytes[0..4] != MAGIC {
            return Err(Error::FormatMismatch("bad magic".into()));
        }
        let version = read_u32(bytes, 4);
        if version != FORMAT_VERSION {
            return Err(Error::FormatMismatch(format!(
                "unsupported version {} (expected {})",
                version, FORMAT_VERSION
            )));
        }
        let stored_crc = read_u32(bytes, CRC_OFFSET);
        let crc = crc32fast::hash(&bytes[..CRC_OFFSET]);
        if stored_crc != crc {
            return Err(Error::FormatMismatch(format!(
                "header checksum mismatch: stored {:08x}, computed {:08x}",
                stored_crc, crc
            )));
        }

        let header = Self {
            dimension: read_u32(bytes, 8),
            metric: DistanceMetric::from_tag(read_u32(bytes, 12))?,
            n_items: read_u32(bytes, 16),
            n_trees: read_u32(bytes, 20),
            leaf_capacity: read_u32(bytes, 24),
            n_nodes: read_u64(bytes, 32),
            seed: read_u64(bytes, 40),
        };
        header.validate()?;
        Ok(header)
    }

    fn validate(&self) -> Result<()> {
        if self.dimension == 0 {
            return Err(Error::FormatMismatch("dimension is zero".into()));
        }
        if self.n_items as usize > MAX_ITEMS {
            return Err(Error::FormatMismatch(format!(
                "item count {} exceeds {}",
                self.n_items, MAX_ITEMS
            )));
        }
        let cap = self.leaf_capacity as usize;
        if self.n_trees > 0 && (cap == 0 || cap > max_leaf_capacity(self.dimension as usize)) {
            return Err(Error::FormatMismatch(format!(
                "leaf capacity {} invalid for dimension {}",
                cap, self.dimension
            )));
        }
        if self.n_trees == 0 && self.n_nodes != 0 {
            return Err(Error::FormatMismatch("nodes without trees".into()));
        }
        if self.checked_file_len().is_none() {
            return Err(Error::FormatMismatch(format!(
                "{} nodes of dimension {} do not fit an addressable image",
                self.n_nodes, self.dimension
            )));
        }
        Ok(())
    }

    /// Image length described by the header, or `None` if it overflows or
    /// exceeds `isize::MAX`. Once this succeeds every [`Layout`] offset is
    /// in range.
    pub fn checked_file_len(&self) -> Option<usize> {
        let dimension = self.dimension as usize;
        let slot_size = dimension.checked_add(4)?.checked_mul(4)?;
        let vectors = (self.n_items as usize)
            .checked_mul(dimension)?
            .checked_mul(4)?;
        let nodes = usize::try_from(self.n_nodes).ok()?.checked_mul(slot_size)?;
        let table = (self.n_trees as usize).checked_mul(TREE_ENTRY_SIZE)?;
        let total = HEADER_SIZE
            .checked_add(vectors)?
            .checked_add(nodes)?
            .checked_add(table)?;
        (total <= isize::MAX as usize).then_some(total)
    }

    /// Section offsets implied by the header.
    pub fn layout(&self) -> Layout {
        Layout {
            dimension: self.dimension as usize,
            n_items: self.n_items as usize,
            n_nodes: self.n_nodes as usize,
            n_trees: self.n_trees as usize,
        }
    }
}

/// Byte offsets of every section of an image.
///
/// Offsets are computed without overflow checks; layouts of decoded headers
/// are already bounded by [`Header::checked_file_len`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub dimension: usize,
    pub n_items: usize,
    pub n_nodes: usize,
    pub n_trees: usize,
}

impl Layout {
    /// Words in one node slot.
    #[inline]
    pub fn slot_words(&self) -> usize {
        4 + self.dimension
    }

    /// Bytes in one node slot.
    #[inline]
    pub fn slot_size(&self) -> usize {
        self.slot_words() * 4
    }

    #[inline]
    pub fn vectors_offset(&self) -> usize {
        HEADER_SIZE
    }

    #[inline]
    pub fn vectors_len(&self) -> usize {
        self.n_items * self.dimension * 4
    }

    #[inline]
    pub fn nodes_offset(&self) -> usize {
        self.vectors_offset() + self.vectors_len()
    }

    /// Byte offset of global slot `slot`.
    #[inline]
    pub fn slot_offset(&self, slot: usize) -> usize {
        self.nodes_offset() + slot * self.slot_size()
    }

    #[inline]
    pub fn tree_table_offset(&self) -> usize {
        self.slot_offset(self.n_nodes)
    }

    /// Exact length of a well-formed image.
    #[inline]
    pub fn file_len(&self) -> usize {
        self.tree_table_offset() + self.n_trees * TREE_ENTRY_SIZE
    }
}

/// Location of one tree inside the node section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeEntry {
    /// Global slot of the tree's node 0.
    pub node_base: u64,
    pub node_count: u32,
    pub root: NodeRef,
}

impl TreeEntry {
    pub fn encode(&self) -> [u8; TREE_ENTRY_SIZE] {
        let mut buf = [0u8; TREE_ENTRY_SIZE];
        buf[0..8].copy_from_slice(&self.node_base.to_le_bytes());
        buf[8..12].copy_from_slice(&self.node_count.to_le_bytes());
        buf[12..16].copy_from_slice(&self.root.to_le_bytes());
        buf
    }

    pub fn decode(bytes: &[u8]) -> Self {
        Self {
            node_base: read_u64(bytes, 0),
            node_count: read_u32(bytes, 8),
            root: read_u32(bytes, 12),
        }
    }
}

/// Appends the slot for `node` to `buf`.
pub fn encode_node(node: &Node, layout: &Layout, buf: &mut Vec<u8>) -> Result<()> {
    let start = buf.len();
    match node {
        Node::Split {
            normal,
            offset,
            left,
            right,
            n_descendants,
        } => {
            if normal.len() != layout.dimension {
                return Err(Error::DimensionMismatch {
                    expected: layout.dimension,
                    got: normal.len(),
                });
            }
            buf.extend_from_slice(&n_descendants.to_le_bytes());
            buf.extend_from_slice(&left.to_le_bytes());
            buf.extend_from_slice(&right.to_le_bytes());
            buf.extend_from_slice(&offset.to_le_bytes());
            for x in normal.iter() {
                buf.extend_from_slice(&x.to_le_bytes());
            }
        }
        Node::Leaf { ids } => {
            if ids.len() >= layout.slot_words() {
                return Err(Error::BuildFailed(format!(
                    "leaf of {} ids does not fit a slot of {} words",
                    ids.len(),
                    layout.slot_words()
                )));
            }
            buf.extend_from_slice(&(LEAF_BIT | ids.len() as u32).to_le_bytes());
            for id in ids {
                buf.extend_from_slice(&id.to_le_bytes());
            }
        }
    }
    buf.resize(start + layout.slot_size(), 0);
    Ok(())
}

#[inline]
fn read_u32(bytes: &[u8], at: usize) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&bytes[at..at + 4]);
    u32::from_le_bytes(word)
}

#[inline]
fn read_u64(bytes: &[u8], at: usize) -> u64 {
    let mut word = [0u8; 8];
    word.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(word)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> Header {
        Header {
            dimension: 8,
            metric: DistanceMetric::Angular,
            n_items: 100,
            n_trees: 3,
            leaf_capacity: 11,
            n_nodes: 60,
            seed: 42,
        }
    }

    #[test]
    fn test_header_roundtrip() {
        let h = header();
        let bytes = h.encode();
        assert_eq!(&bytes[0..4], b"SYLV");
        assert_eq!(Header::decode(&bytes).unwrap(), h);
    }

    #[test]
    fn test_header_checksum_detects_corruption() {
        let mut bytes = header().encode();
        bytes[17] ^= 0xff;
        assert!(matches!(Header::decode(&bytes), Err(Error::FormatMismatch(_))));
    }

    #[test]
    fn test_header_rejects_bad_magic_and_version() {
        let mut bytes = header().encode();
        bytes[0] = b'X';
        assert!(matches!(Header::decode(&bytes), Err(Error::FormatMismatch(_))));

        let mut bytes = header().encode();
        bytes[4] = 9;
        let err = Header::decode(&bytes).unwrap_err();
        assert!(err.to_string().contains("version"));
    }

    #[test]
    fn test_header_rejects_oversized_leaf() {
        let mut h = header();
        h.leaf_capacity = 12;
        assert!(Header::decode(&h.encode()).is_err());
    }

    #[test]
    fn test_header_rejects_overflowing_layout() {
        let mut h = header();
        h.dimension = 4;
        h.n_items = 1;
        h.n_trees = 1;
        h.leaf_capacity = 2;
        h.n_nodes = 1 << 62;
        assert!(h.checked_file_len().is_none());
        assert!(matches!(Header::decode(&h.encode()), Err(Error::FormatMismatch(_))));

        h.n_nodes = u64::MAX;
        assert!(matches!(Header::decode(&h.encode()), Err(Error::FormatMismatch(_))));
    }

    #[test]
    fn test_checked_file_len_matches_layout() {
        let h = header();
        assert_eq!(h.checked_file_len(), Some(h.layout().file_len()));
    }

    #[test]
    fn test_header_too_short() {
        assert!(matches!(Header::decode(&[0u8; 10]), Err(Error::FormatMismatch(_))));
    }

    #[test]
    fn test_layout_offsets() {
        let layout = header().layout();
        assert_eq!(layout.slot_size(), 48);
        assert_eq!(layout.nodes_offset(), 64 + 100 * 8 * 4);
        assert_eq!(layout.tree_table_offset(), layout.nodes_offset() + 60 * 48);
        assert_eq!(layout.file_len(), layout.tree_table_offset() + 3 * 16);
    }

    #[test]
    fn test_encode_nodes_fill_one_slot() {
        let layout = Layout {
            dimension: 2,
            n_items: 0,
            n_nodes: 0,
            n_trees: 0,
        };
        let mut buf = Vec::new();
        encode_node(&Node::Leaf { ids: vec![4, 5] }, &layout, &mut buf).unwrap();
        assert_eq!(buf.len(), 24);
        assert_eq!(read_u32(&buf, 0), LEAF_BIT | 2);
        assert_eq!(read_u32(&buf, 8), 5);

        let split = Node::Split {
            normal: vec![0.5, -0.5].into(),
            offset: 1.5,
            left: 0,
            right: 1,
            n_descendants: 9,
        };
        encode_node(&split, &layout, &mut buf).unwrap();
        assert_eq!(buf.len(), 48);
        assert_eq!(read_u32(&buf, 24), 9);
        assert_eq!(f32::from_bits(read_u32(&buf, 36)), 1.5);
    }

    #[test]
    fn test_encode_rejects_overfull_leaf() {
        let layout = Layout {
            dimension: 1,
            n_items: 0,
            n_nodes: 0,
            n_trees: 0,
        };
        let mut buf = Vec::new();
        let leaf = Node::Leaf {
            ids: vec![0, 1, 2, 3, 4],
        };
        assert!(encode_node(&leaf, &layout, &mut buf).is_err());
    }

    #[test]
    fn test_tree_entry_roundtrip() {
        let entry = TreeEntry {
            node_base: 1 << 40,
            node_count: 17,
            root: 16,
        };
        assert_eq!(TreeEntry::decode(&entry.encode()), entry);
    }
}
