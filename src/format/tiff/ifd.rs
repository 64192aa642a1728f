//! Image File Directories: entries, field types and value access.
//!
//! An IFD is a counted list of `(tag, type, count, value-or-offset)` entries
//! followed by the offset of the next IFD. Values that fit in the entry's
//! value field (4 bytes classic, 8 bytes BigTIFF) are stored inline; larger
//! ones live elsewhere in the file and are fetched on demand.

use bytes::Bytes;

use super::header::{ByteOrder, TiffHeader};
use crate::error::SlideError;
use crate::io::RangeReader;

/// Upper bound on entries per IFD; real slides carry a few dozen.
const MAX_IFD_ENTRIES: u64 = 4096;

/// Tag numbers used by the pyramid reader.
pub mod tags {
    pub const NEW_SUBFILE_TYPE: u16 = 254;
    pub const IMAGE_WIDTH: u16 = 256;
    pub const IMAGE_LENGTH: u16 = 257;
    pub const COMPRESSION: u16 = 259;
    pub const PHOTOMETRIC_INTERPRETATION: u16 = 262;
    pub const STRIP_OFFSETS: u16 = 273;
    pub const TILE_WIDTH: u16 = 322;
    pub const TILE_LENGTH: u16 = 323;
    pub const TILE_OFFSETS: u16 = 324;
    pub const TILE_BYTE_COUNTS: u16 = 325;
    pub const JPEG_TABLES: u16 = 347;
}

/// Compression value for "new-style" JPEG (TIFF 6.0 / Technote 2).
pub const COMPRESSION_JPEG: u16 = 7;

/// Photometric interpretation value for RGB.
pub const PHOTOMETRIC_RGB: u16 = 2;

/// Human-readable name for a compression code, for error messages.
pub fn compression_name(code: u16) -> String {
    match code {
        1 => "none".to_string(),
        5 => "LZW".to_string(),
        6 => "old-style JPEG".to_string(),
        7 => "JPEG".to_string(),
        8 | 32946 => "Deflate".to_string(),
        33003 | 33005 => "JPEG 2000".to_string(),
        other => format!("code {}", other),
    }
}

/// Field types that the reader can interpret numerically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Byte,
    Ascii,
    Short,
    Long,
    Undefined,
    Long8,
    Ifd,
    Ifd8,
}

impl FieldType {
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            1 => Some(FieldType::Byte),
            2 => Some(FieldType::Ascii),
            3 => Some(FieldType::Short),
            4 => Some(FieldType::Long),
            7 => Some(FieldType::Undefined),
            13 => Some(FieldType::Ifd),
            16 => Some(FieldType::Long8),
            18 => Some(FieldType::Ifd8),
            _ => None,
        }
    }

    /// Size of one value in bytes.
    pub const fn size(self) -> usize {
        match self {
            FieldType::Byte | FieldType::Ascii | FieldType::Undefined => 1,
            FieldType::Short => 2,
            FieldType::Long | FieldType::Ifd => 4,
            FieldType::Long8 | FieldType::Ifd8 => 8,
        }
    }

    fn read(self, order: ByteOrder, bytes: &[u8]) -> u64 {
        match self {
            FieldType::Byte | FieldType::Ascii | FieldType::Undefined => bytes[0] as u64,
            FieldType::Short => order.read_u16(bytes) as u64,
            FieldType::Long | FieldType::Ifd => order.read_u32(bytes) as u64,
            FieldType::Long8 | FieldType::Ifd8 => order.read_u64(bytes),
        }
    }
}

/// One IFD entry. The raw value field is kept so inline values can be
/// decoded without another read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfdEntry {
    pub tag: u16,
    pub type_code: u16,
    pub count: u64,
    value: [u8; 8],
}

impl IfdEntry {
    pub fn field_type(&self) -> Option<FieldType> {
        FieldType::from_code(self.type_code)
    }

    /// Total payload size in bytes, if the type is known and does not overflow.
    pub fn byte_len(&self) -> Option<u64> {
        let size = self.field_type()?.size() as u64;
        self.count.checked_mul(size)
    }

    fn is_inline(&self, header: &TiffHeader) -> bool {
        self.byte_len()
            .is_some_and(|len| len <= header.offset_size() as u64)
    }

    /// First value of a numeric entry stored inline.
    pub fn scalar(&self, header: &TiffHeader) -> Option<u64> {
        if self.count == 0 || !self.is_inline(header) {
            return None;
        }
        Some(self.field_type()?.read(header.byte_order, &self.value))
    }

    /// All values as u64, reading from the file when not inline.
    pub async fn read_u64s<R: RangeReader + ?Sized>(
        &self,
        reader: &R,
        header: &TiffHeader,
    ) -> Result<Vec<u64>, SlideError> {
        let field_type = self.field_type().ok_or(SlideError::InvalidTagValue {
            tag: tag_name(self.tag),
            message: format!("unsupported field type {}", self.type_code),
        })?;
        let bytes = self.read_bytes(reader, header).await?;
        Ok(bytes
            .chunks_exact(field_type.size())
            .map(|chunk| field_type.read(header.byte_order, chunk))
            .collect())
    }

    /// Raw payload bytes, reading from the file when not inline.
    pub async fn read_bytes<R: RangeReader + ?Sized>(
        &self,
        reader: &R,
        header: &TiffHeader,
    ) -> Result<Bytes, SlideError> {
        let len = self.byte_len().ok_or(SlideError::InvalidTagValue {
            tag: tag_name(self.tag),
            message: format!(
                "unsupported field type {} or count {}",
                self.type_code, self.count
            ),
        })?;
        if self.is_inline(header) {
            return Ok(Bytes::copy_from_slice(&self.value[..len as usize]));
        }
        if len > reader.size() {
            return Err(SlideError::InvalidTagValue {
                tag: tag_name(self.tag),
                message: format!("{} bytes exceed file size", len),
            });
        }
        let offset = header.read_offset(&self.value);
        Ok(reader.read_exact_at(offset, len as usize).await?)
    }
}

/// A parsed directory.
#[derive(Debug, Clone)]
pub struct Ifd {
    pub offset: u64,
    pub entries: Vec<IfdEntry>,
    pub next_offset: u64,
}

impl Ifd {
    /// Read the IFD located at `offset`.
    pub async fn read<R: RangeReader + ?Sized>(
        reader: &R,
        header: &TiffHeader,
        offset: u64,
    ) -> Result<Self, SlideError> {
        let order = header.byte_order;
        let count_size = header.count_size();
        if offset.saturating_add(count_size as u64) > reader.size() {
            return Err(SlideError::InvalidIfdOffset(offset));
        }

        let count_bytes = reader.read_exact_at(offset, count_size).await?;
        let entry_count = if header.is_bigtiff {
            order.read_u64(&count_bytes)
        } else {
            order.read_u16(&count_bytes) as u64
        };
        if entry_count == 0 || entry_count > MAX_IFD_ENTRIES {
            return Err(SlideError::InvalidIfdOffset(offset));
        }

        let entry_size = header.entry_size();
        let body_len = entry_count as usize * entry_size + header.offset_size();
        let body_start = offset + count_size as u64;
        if body_start + body_len as u64 > reader.size() {
            return Err(SlideError::InvalidIfdOffset(offset));
        }
        let body = reader.read_exact_at(body_start, body_len).await?;

        let entries = body
            .chunks_exact(entry_size)
            .take(entry_count as usize)
            .map(|raw| parse_entry(header, raw))
            .collect();
        let next_offset = header.read_offset(&body[entry_count as usize * entry_size..]);

        Ok(Self {
            offset,
            entries,
            next_offset,
        })
    }

    pub fn entry(&self, tag: u16) -> Option<&IfdEntry> {
        self.entries.iter().find(|e| e.tag == tag)
    }

    /// Inline numeric value of `tag`.
    pub fn scalar(&self, tag: u16, header: &TiffHeader) -> Option<u64> {
        self.entry(tag)?.scalar(header)
    }

    /// Inline numeric value of a tag that must be present and fit in u32.
    pub fn required_u32(&self, tag: u16, header: &TiffHeader) -> Result<u32, SlideError> {
        let value = self
            .scalar(tag, header)
            .ok_or(SlideError::MissingTag(tag_name(tag)))?;
        u32::try_from(value).map_err(|_| SlideError::InvalidTagValue {
            tag: tag_name(tag),
            message: format!("{} does not fit in 32 bits", value),
        })
    }

    pub fn is_tiled(&self) -> bool {
        [
            tags::TILE_WIDTH,
            tags::TILE_LENGTH,
            tags::TILE_OFFSETS,
            tags::TILE_BYTE_COUNTS,
        ]
        .iter()
        .all(|tag| self.entry(*tag).is_some())
    }

    pub fn is_stripped(&self) -> bool {
        self.entry(tags::STRIP_OFFSETS).is_some()
    }
}

fn parse_entry(header: &TiffHeader, raw: &[u8]) -> IfdEntry {
    let order = header.byte_order;
    let (count, value_field) = if header.is_bigtiff {
        (order.read_u64(&raw[4..12]), &raw[12..20])
    } else {
        (order.read_u32(&raw[4..8]) as u64, &raw[8..12])
    };
    let mut value = [0u8; 8];
    value[..value_field.len()].copy_from_slice(value_field);

    IfdEntry {
        tag: order.read_u16(&raw[0..2]),
        type_code: order.read_u16(&raw[2..4]),
        count,
        value,
    }
}

/// Name of a known tag, for error messages.
pub fn tag_name(tag: u16) -> &'static str {
    match tag {
        tags::NEW_SUBFILE_TYPE => "NewSubfileType",
        tags::IMAGE_WIDTH => "ImageWidth",
        tags::IMAGE_LENGTH => "ImageLength",
        tags::COMPRESSION => "Compression",
        tags::PHOTOMETRIC_INTERPRETATION => "PhotometricInterpretation",
        tags::STRIP_OFFSETS => "StripOffsets",
        tags::TILE_WIDTH => "TileWidth",
        tags::TILE_LENGTH => "TileLength",
        tags::TILE_OFFSETS => "TileOffsets",
        tags::TILE_BYTE_COUNTS => "TileByteCounts",
        tags::JPEG_TABLES => "JPEGTables",
        _ => "unknown",
    }
}
