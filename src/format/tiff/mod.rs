//! TIFF structure parsing for whole slide images.
//!
//! - **Byte order**: declared by the first two header bytes (II / MM); every
//!   multi-byte value in the file follows it.
//! - **Classic vs BigTIFF**: 32-bit vs 64-bit offsets and counts; both are
//!   handled by the same code paths via [`TiffHeader`] widths.
//! - **IFDs**: one per stored image. Only some of them are pyramid levels.

mod header;
mod ifd;
mod pyramid;

#[cfg(test)]
pub(crate) mod testing;

pub use header::{ByteOrder, TiffHeader, BIGTIFF_HEADER_SIZE, TIFF_HEADER_SIZE};
pub use ifd::{tags, FieldType, Ifd, IfdEntry, COMPRESSION_JPEG};
pub use pyramid::{PyramidLevel, TiffPyramid};
