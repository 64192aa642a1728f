//! Image source adapter.
//!
//! ```text
//! TileService ──► SlideRegistry ──► SlideSource ──► RangeReader
//!                 (pool, LRU)       (id → file)     (positional reads)
//!                      │
//!                      ▼
//!                 SlideHandle ──► TiffPyramid + BlockCache
//!                 (level geometry, read_region)
//! ```
//!
//! A [`SlideHandle`] answers the questions tile serving needs: level count,
//! level dimensions and downsamples, and RGBA pixels for a region of a level.

mod handle;
mod registry;
mod source;

pub use handle::{PyramidDescriptor, SlideHandle};
pub use registry::{SlideRegistry, DEFAULT_BLOCK_CACHE_CAPACITY, DEFAULT_SLIDE_CACHE_CAPACITY};
pub use source::{is_plain_file_name, LocalSlideSource, SlideSource};
