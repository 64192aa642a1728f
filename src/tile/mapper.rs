//! Viewer tile addresses to native pyramid regions.
//!
//! Viewers count zoom upward from the coarsest level (zoom 0 = smallest
//! image); the pyramid counts levels downward from full resolution (level 0 =
//! largest). Every zoom maps one-to-one onto a native level, no resampling:
//!
//! ```text
//! native_level = level_count - 1 - zoom
//! origin       = floor(tile * 256 * downsample)     (level 0 pixels)
//! size         = min(256, level_extent - tile * 256) (level pixels)
//! ```

use crate::error::TileError;
use crate::slide::PyramidDescriptor;

/// Edge length of served tiles in pixels.
pub const TILE_SIZE: u32 = 256;

/// A tile as requested by a viewer. Also the identity of a cached tile.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TileAddress {
    pub slide_id: String,
    pub zoom: u32,
    pub x: u32,
    pub y: u32,
}

impl TileAddress {
    pub fn new(slide_id: impl Into<String>, zoom: u32, x: u32, y: u32) -> Self {
        Self {
            slide_id: slide_id.into(),
            zoom,
            x,
            y,
        }
    }
}

/// The native pixels a tile covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRegion {
    /// Native pyramid level
    pub level: usize,
    /// Top-left corner in level 0 pixel coordinates
    pub origin: (u64, u64),
    /// Width and height in level pixels, at most [`TILE_SIZE`]
    pub size: (u32, u32),
}

/// Number of tiles needed to cover `extent` pixels.
pub fn tile_count(extent: u32) -> u32 {
    extent.div_ceil(TILE_SIZE)
}

/// Map `address` onto the native pyramid described by `pyramid`.
///
/// Fails with `InvalidZoom` when the zoom has no native level and with
/// `OutOfBounds` when the tile lies outside the level's grid.
pub fn map_tile(address: &TileAddress, pyramid: &PyramidDescriptor) -> Result<TileRegion, TileError> {
    let level_count = pyramid.level_count();
    let level = (level_count as u64)
        .checked_sub(1 + address.zoom as u64)
        .ok_or(TileError::InvalidZoom {
            zoom: address.zoom,
            level_count,
        })? as usize;

    let (width, height) = pyramid.level_dimensions[level];
    let downsample = pyramid.level_downsamples[level];

    let tiles_x = tile_count(width);
    let tiles_y = tile_count(height);
    if address.x >= tiles_x || address.y >= tiles_y {
        return Err(TileError::OutOfBounds {
            zoom: address.zoom,
            x: address.x,
            y: address.y,
            tiles_x,
            tiles_y,
        });
    }

    let level_x = address.x as u64 * TILE_SIZE as u64;
    let level_y = address.y as u64 * TILE_SIZE as u64;

    Ok(TileRegion {
        level,
        origin: (
            (level_x as f64 * downsample).floor() as u64,
            (level_y as f64 * downsample).floor() as u64,
        ),
        size: (
            (width as u64 - level_x).min(TILE_SIZE as u64) as u32,
            (height as u64 - level_y).min(TILE_SIZE as u64) as u32,
        ),
    })
}
