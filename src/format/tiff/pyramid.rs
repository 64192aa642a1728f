//! Pyramid level identification.
//!
//! A slide file holds more images than the pyramid: SVS adds a stripped
//! thumbnail, a label and a macro photo. Levels are recognised as the tiled
//! IFDs, ordered by area, that keep level 0's aspect ratio and shrink
//! monotonically. Everything else is ignored.

use std::collections::HashSet;

use bytes::Bytes;

use super::header::{TiffHeader, BIGTIFF_HEADER_SIZE};
use super::ifd::{compression_name, tags, Ifd, COMPRESSION_JPEG, PHOTOMETRIC_RGB};
use crate::error::SlideError;
use crate::format::jpeg::prepare_tile_jpeg;
use crate::io::RangeReader;

/// Maximum number of IFDs walked before giving up.
const MAX_IFDS: usize = 256;

/// Allowed relative difference between horizontal and vertical downsample.
const ASPECT_TOLERANCE: f64 = 0.1;

/// One resolution level of the pyramid, with its tile tables loaded.
#[derive(Debug, Clone)]
pub struct PyramidLevel {
    pub width: u32,
    pub height: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub tiles_x: u32,
    pub tiles_y: u32,
    /// Downsample relative to level 0 (1.0 for level 0)
    pub downsample: f64,
    /// Components stored as RGB rather than YCbCr
    pub rgb: bool,
    tile_offsets: Vec<u64>,
    tile_byte_counts: Vec<u64>,
    jpeg_tables: Option<Bytes>,
}

impl PyramidLevel {
    /// File location `(offset, length)` of native tile `(tx, ty)`.
    pub fn tile_location(&self, tx: u32, ty: u32) -> Option<(u64, u64)> {
        if tx >= self.tiles_x || ty >= self.tiles_y {
            return None;
        }
        let index = ty as usize * self.tiles_x as usize + tx as usize;
        Some((
            *self.tile_offsets.get(index)?,
            *self.tile_byte_counts.get(index)?,
        ))
    }

    /// Read native tile `(tx, ty)` as a self-contained JPEG stream.
    ///
    /// Returns `None` for sparse tiles (zero byte count), which some writers
    /// emit for empty background.
    pub async fn read_tile_jpeg<R: RangeReader + ?Sized>(
        &self,
        reader: &R,
        tx: u32,
        ty: u32,
    ) -> Result<Option<Bytes>, SlideError> {
        let (offset, length) = self
            .tile_location(tx, ty)
            .ok_or_else(|| SlideError::InvalidTagValue {
                tag: "TileOffsets",
                message: format!("no entry for tile ({}, {})", tx, ty),
            })?;
        if length == 0 {
            return Ok(None);
        }
        let raw = reader.read_exact_at(offset, length as usize).await?;
        Ok(Some(prepare_tile_jpeg(
            self.jpeg_tables.as_deref(),
            &raw,
            self.rgb,
        )))
    }
}

/// Tiled IFD that passed the first filter, before tables are loaded.
struct Candidate {
    ifd: Ifd,
    width: u32,
    height: u32,
    tile_width: u32,
    tile_height: u32,
}

impl Candidate {
    fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// The parsed pyramid of a TIFF/SVS file.
#[derive(Debug, Clone)]
pub struct TiffPyramid {
    pub header: TiffHeader,
    levels: Vec<PyramidLevel>,
}

impl TiffPyramid {
    /// Parse the header, walk the IFD chain and load every pyramid level.
    pub async fn open<R: RangeReader + ?Sized>(reader: &R) -> Result<Self, SlideError> {
        let size = reader.size();
        let head_len = size.min(BIGTIFF_HEADER_SIZE as u64) as usize;
        let head = reader.read_exact_at(0, head_len).await?;
        let header = TiffHeader::parse(&head, size)?;

        let ifds = read_ifd_chain(reader, &header).await?;
        let saw_strips = ifds.iter().any(|ifd| ifd.is_stripped() && !ifd.is_tiled());

        let mut candidates = Vec::new();
        for ifd in ifds.into_iter().filter(Ifd::is_tiled) {
            let width = ifd.required_u32(tags::IMAGE_WIDTH, &header)?;
            let height = ifd.required_u32(tags::IMAGE_LENGTH, &header)?;
            let tile_width = ifd.required_u32(tags::TILE_WIDTH, &header)?;
            let tile_height = ifd.required_u32(tags::TILE_LENGTH, &header)?;
            if width == 0 || height == 0 || tile_width == 0 || tile_height == 0 {
                continue;
            }
            candidates.push(Candidate {
                ifd,
                width,
                height,
                tile_width,
                tile_height,
            });
        }

        if candidates.is_empty() {
            return Err(if saw_strips {
                SlideError::StripOrganization
            } else {
                SlideError::NoPyramidLevels
            });
        }

        // Stable sort keeps file order between equal areas.
        candidates.sort_by(|a, b| b.area().cmp(&a.area()));
        let (base_width, base_height) = (candidates[0].width, candidates[0].height);

        let mut levels: Vec<PyramidLevel> = Vec::new();
        let mut last_area = u64::MAX;
        for candidate in candidates {
            let dx = base_width as f64 / candidate.width as f64;
            let dy = base_height as f64 / candidate.height as f64;
            if (dx - dy).abs() / dx.max(dy) > ASPECT_TOLERANCE || candidate.area() >= last_area {
                continue;
            }
            last_area = candidate.area();
            let downsample = if levels.is_empty() { 1.0 } else { (dx + dy) / 2.0 };
            levels.push(load_level(reader, &header, candidate, downsample).await?);
        }

        Ok(Self { header, levels })
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub fn level(&self, index: usize) -> Option<&PyramidLevel> {
        self.levels.get(index)
    }

    pub fn levels(&self) -> &[PyramidLevel] {
        &self.levels
    }
}

async fn read_ifd_chain<R: RangeReader + ?Sized>(
    reader: &R,
    header: &TiffHeader,
) -> Result<Vec<Ifd>, SlideError> {
    let mut ifds = Vec::new();
    let mut seen = HashSet::new();
    let mut offset = header.first_ifd_offset;

    while offset != 0 && ifds.len() < MAX_IFDS {
        if !seen.insert(offset) {
            return Err(SlideError::InvalidIfdOffset(offset));
        }
        let ifd = Ifd::read(reader, header, offset).await?;
        offset = ifd.next_offset;
        ifds.push(ifd);
    }
    Ok(ifds)
}

async fn load_level<R: RangeReader + ?Sized>(
    reader: &R,
    header: &TiffHeader,
    candidate: Candidate,
    downsample: f64,
) -> Result<PyramidLevel, SlideError> {
    let Candidate {
        ifd,
        width,
        height,
        tile_width,
        tile_height,
    } = candidate;

    let compression = ifd.scalar(tags::COMPRESSION, header).unwrap_or(1) as u16;
    if compression != COMPRESSION_JPEG {
        return Err(SlideError::UnsupportedCompression(compression_name(compression)));
    }
    let rgb = ifd.scalar(tags::PHOTOMETRIC_INTERPRETATION, header)
        == Some(PHOTOMETRIC_RGB as u64);

    let tiles_x = width.div_ceil(tile_width);
    let tiles_y = height.div_ceil(tile_height);
    let tile_count = tiles_x as usize * tiles_y as usize;

    let tile_offsets = required_array(reader, header, &ifd, tags::TILE_OFFSETS, tile_count).await?;
    let tile_byte_counts =
        required_array(reader, header, &ifd, tags::TILE_BYTE_COUNTS, tile_count).await?;

    let jpeg_tables = match ifd.entry(tags::JPEG_TABLES) {
        Some(entry) => Some(entry.read_bytes(reader, header).await?),
        None => None,
    };

    Ok(PyramidLevel {
        width,
        height,
        tile_width,
        tile_height,
        tiles_x,
        tiles_y,
        downsample,
        rgb,
        tile_offsets,
        tile_byte_counts,
        jpeg_tables,
    })
}

async fn required_array<R: RangeReader + ?Sized>(
    reader: &R,
    header: &TiffHeader,
    ifd: &Ifd,
    tag: u16,
    expected: usize,
) -> Result<Vec<u64>, SlideError> {
    let entry = ifd
        .entry(tag)
        .ok_or(SlideError::MissingTag(super::ifd::tag_name(tag)))?;
    let values = entry.read_u64s(reader, header).await?;
    if values.len() < expected {
        return Err(SlideError::InvalidTagValue {
            tag: super::ifd::tag_name(tag),
            message: format!("expected {} entries, found {}", expected, values.len()),
        });
    }
    Ok(values)
}
