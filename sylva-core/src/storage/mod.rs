//! Storage module for persistent index images.
//!
//! This module provides:
//! - The fixed-stride binary layout shared by writers and readers
//! - Memory-mapped, read-only images usable without a parse pass
//! - An atomic writer that streams vectors and trees into a temp file and
//!   publishes it with a rename

#[cfg(target_endian = "big")]
compile_error!("sylva images are little-endian and mapped in place; big-endian targets are not supported");

pub mod format;
pub mod image;
pub mod writer;

pub use format::{Header, Layout, TreeEntry, FORMAT_VERSION, HEADER_SIZE, MAGIC};
pub use image::{DiskImage, ImageInfo};
pub use writer::{ImageWriter, MappedVectors, VectorSink};

use crate::error::Error;

/// Wraps an I/O error with a short context message.
pub(crate) fn io_error(context: &str, err: std::io::Error) -> Error {
    Error::IoError(format!("{}: {}", context, err))
}

/// Reinterprets 4-byte aligned little-endian bytes as `f32`s.
///
/// Panics if `bytes` is misaligned or not a multiple of 4 long. Images are
/// checked for alignment when opened, so every slot offset inside them is
/// 4-byte aligned.
#[inline]
pub(crate) fn cast_f32(bytes: &[u8]) -> &[f32] {
    assert_eq!(bytes.as_ptr().align_offset(std::mem::align_of::<f32>()), 0);
    assert_eq!(bytes.len() % 4, 0);
    // SAFETY: alignment and length are asserted above, every bit pattern is
    // a valid f32, and the returned slice borrows `bytes`.
    unsafe { std::slice::from_raw_parts(bytes.as_ptr() as *const f32, bytes.len() / 4) }
}

/// Reinterprets 4-byte aligned little-endian bytes as `u32`s.
#[inline]
pub(crate) fn cast_u32(bytes: &[u8]) -> &[u32] {
    assert_eq!(bytes.as_ptr().align_offset(std::mem::align_of::<u32>()), 0);
    assert_eq!(bytes.len() % 4, 0);
    // SAFETY: same as `cast_f32`.
    unsafe { std::slice::from_raw_parts(bytes.as_ptr() as *const u32, bytes.len() / 4) }
}
