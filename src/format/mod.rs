//! Slide file parsing.
//!
//! Slides are pyramidal TIFFs (Aperio SVS and generic tiled TIFF, classic or
//! BigTIFF) whose tiles are JPEG-compressed. [`tiff`] locates the pyramid and
//! its tile tables; [`jpeg`] turns raw tile bytes into decodable streams.

pub mod jpeg;
pub mod tiff;

pub use tiff::{PyramidLevel, TiffPyramid};
