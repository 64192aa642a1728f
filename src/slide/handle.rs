use std::sync::Arc;

use image::{imageops, ImageFormat, RgbaImage};
use tracing::trace;

use crate::error::SlideError;
use crate::format::{PyramidLevel, TiffPyramid};
use crate::io::{BlockCache, RangeReader};

/// Pyramid geometry of an opened slide, as needed for tile addressing.
#[derive(Debug, Clone, PartialEq)]
pub struct PyramidDescriptor {
    /// `(width, height)` per native level, level 0 first
    pub level_dimensions: Vec<(u32, u32)>,
    /// Downsample per native level relative to level 0
    pub level_downsamples: Vec<f64>,
}

impl PyramidDescriptor {
    pub fn level_count(&self) -> usize {
        self.level_dimensions.len()
    }

    /// Level 0 dimensions, `(0, 0)` for an empty pyramid.
    pub fn dimensions(&self) -> (u32, u32) {
        self.level_dimensions.first().copied().unwrap_or((0, 0))
    }
}

/// An opened slide: parsed pyramid plus a block-cached reader.
///
/// Handles are immutable once opened and shared between requests through
/// `Arc`; decoding never takes a lock.
pub struct SlideHandle<R: RangeReader + 'static> {
    reader: Arc<BlockCache<R>>,
    pyramid: TiffPyramid,
}

impl<R: RangeReader + 'static> SlideHandle<R> {
    /// Parse the pyramid behind `reader`.
    pub async fn open(reader: BlockCache<R>) -> Result<Self, SlideError> {
        let pyramid = TiffPyramid::open(&reader).await?;
        if pyramid.level_count() == 0 {
            return Err(SlideError::NoPyramidLevels);
        }
        Ok(Self {
            reader: Arc::new(reader),
            pyramid,
        })
    }

    pub fn identifier(&self) -> &str {
        self.reader.identifier()
    }

    pub fn level_count(&self) -> usize {
        self.pyramid.level_count()
    }

    /// Level 0 dimensions.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.level_dimensions(0)
    }

    pub fn level_dimensions(&self, level: usize) -> Option<(u32, u32)> {
        self.pyramid.level(level).map(|l| (l.width, l.height))
    }

    pub fn level_downsample(&self, level: usize) -> Option<f64> {
        self.pyramid.level(level).map(|l| l.downsample)
    }

    pub fn descriptor(&self) -> PyramidDescriptor {
        let levels = self.pyramid.levels();
        PyramidDescriptor {
            level_dimensions: levels.iter().map(|l| (l.width, l.height)).collect(),
            level_downsamples: levels.iter().map(|l| l.downsample).collect(),
        }
    }

    /// Read `size` pixels of `level` starting at `origin`, given in level 0
    /// pixel coordinates.
    ///
    /// The origin is mapped into level space with `ceil(origin / downsample)`,
    /// the inverse of addressing a tile at `floor(tile * size * downsample)`.
    /// Pixels outside the level, or inside sparse tiles, are transparent.
    pub async fn read_region(
        &self,
        level: usize,
        origin: (u64, u64),
        size: (u32, u32),
    ) -> Result<RgbaImage, SlideError> {
        let lvl = self
            .pyramid
            .level(level)
            .ok_or(SlideError::LevelOutOfRange {
                level,
                level_count: self.level_count(),
            })?;

        let (width, height) = size;
        let mut canvas = RgbaImage::new(width, height);
        if width == 0 || height == 0 {
            return Ok(canvas);
        }

        let x0 = to_level_space(origin.0, lvl.downsample);
        let y0 = to_level_space(origin.1, lvl.downsample);
        let Some((tx_range, ty_range)) = intersecting_tiles(lvl, (x0, y0), size) else {
            return Ok(canvas);
        };

        for ty in ty_range {
            for tx in tx_range.clone() {
                let Some(jpeg) = lvl.read_tile_jpeg(self.reader.as_ref(), tx, ty).await? else {
                    trace!(level, tx, ty, "sparse tile");
                    continue;
                };
                let tile = image::load_from_memory_with_format(&jpeg, ImageFormat::Jpeg)
                    .map_err(|e| SlideError::TileDecode {
                        level,
                        x: tx,
                        y: ty,
                        message: e.to_string(),
                    })?
                    .to_rgba8();

                let dx = tx as i64 * lvl.tile_width as i64 - x0 as i64;
                let dy = ty as i64 * lvl.tile_height as i64 - y0 as i64;
                imageops::replace(&mut canvas, &tile, dx, dy);
            }
        }

        // Decoded edge tiles are padded to the full tile size; clear whatever
        // landed beyond the level's right and bottom edges.
        clear_outside(&mut canvas, (x0, y0), (lvl.width, lvl.height));
        Ok(canvas)
    }
}

/// Level-space coordinate of a level 0 coordinate.
fn to_level_space(coord: u64, downsample: f64) -> u64 {
    if downsample <= 1.0 {
        return coord;
    }
    // Snap values a rounding error away from an integer before taking ceil.
    let scaled = coord as f64 / downsample;
    let nearest = scaled.round();
    if (scaled - nearest).abs() < 1e-6 {
        nearest as u64
    } else {
        scaled.ceil() as u64
    }
}

type TileRange = std::ops::Range<u32>;

/// Native tiles overlapping the level-space rectangle, clipped to the grid.
fn intersecting_tiles(
    level: &PyramidLevel,
    (x0, y0): (u64, u64),
    (width, height): (u32, u32),
) -> Option<(TileRange, TileRange)> {
    if x0 >= level.width as u64 || y0 >= level.height as u64 {
        return None;
    }
    let x1 = (x0 + width as u64).min(level.width as u64);
    let y1 = (y0 + height as u64).min(level.height as u64);

    let tw = level.tile_width as u64;
    let th = level.tile_height as u64;
    let tx = (x0 / tw) as u32..x1.div_ceil(tw) as u32;
    let ty = (y0 / th) as u32..y1.div_ceil(th) as u32;
    Some((tx, ty))
}

fn clear_outside(canvas: &mut RgbaImage, (x0, y0): (u64, u64), (lw, lh): (u32, u32)) {
    let valid_w = (lw as u64).saturating_sub(x0).min(canvas.width() as u64) as u32;
    let valid_h = (lh as u64).saturating_sub(y0).min(canvas.height() as u64) as u32;
    if valid_w == canvas.width() && valid_h == canvas.height() {
        return;
    }
    for (x, y, pixel) in canvas.enumerate_pixels_mut() {
        if x >= valid_w || y >= valid_h {
            *pixel = image::Rgba([0, 0, 0, 0]);
        }
    }
}
