//! In-memory readers and synthetic pyramidal TIFFs for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};

use crate::error::IoError;
use crate::io::{check_range, RangeReader};
use crate::slide::SlideSource;

/// RangeReader over a byte vector.
pub struct MemoryReader {
    data: Bytes,
    delay_ms: Arc<AtomicU64>,
}

impl MemoryReader {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data: Bytes::from(data),
            delay_ms: Arc::new(AtomicU64::new(0)),
        }
    }
}

#[async_trait]
impl RangeReader for MemoryReader {
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        check_range(offset, len, self.size())?;
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        Ok(self.data.slice(offset as usize..offset as usize + len))
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn identifier(&self) -> &str {
        "memory://slide"
    }
}

/// In-memory slide source that counts reader creations.
pub struct MemorySource {
    slides: HashMap<String, Vec<u8>>,
    opens: AtomicUsize,
    read_delay_ms: Arc<AtomicU64>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self {
            slides: HashMap::new(),
            opens: AtomicUsize::new(0),
            read_delay_ms: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Latency of every read from now on, including readers already handed out.
    pub fn set_read_delay(&self, delay: Duration) {
        self.read_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn with_slide(mut self, id: &str, data: Vec<u8>) -> Self {
        self.slides.insert(id.to_string(), data);
        self
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SlideSource for MemorySource {
    type Reader = MemoryReader;

    async fn create_reader(&self, slide_id: &str) -> Result<MemoryReader, IoError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10)).await;
        self.slides
            .get(slide_id)
            .map(|data| MemoryReader {
                data: Bytes::from(data.clone()),
                delay_ms: Arc::clone(&self.read_delay_ms),
            })
            .ok_or_else(|| IoError::NotFound(slide_id.to_string()))
    }
}

/// Solid colour of native tile `(tx, ty)` of IFD `ifd_index` in built files.
pub fn tile_color(ifd_index: usize, tx: u32, ty: u32) -> [u8; 3] {
    [
        (40 + 60 * (tx % 4)) as u8,
        (40 + 60 * (ty % 4)) as u8,
        (40 + 50 * (ifd_index % 4)) as u8,
    ]
}

struct ImageSpec {
    width: u32,
    height: u32,
    tile: u32,
    compression: u16,
    tiled: bool,
}

/// Builds classic TIFFs whose tiled IFDs hold solid-colour JPEG tiles.
pub struct TiffBuilder {
    images: Vec<ImageSpec>,
    big_endian: bool,
    abbreviated: bool,
}

impl TiffBuilder {
    pub fn new() -> Self {
        Self {
            images: Vec::new(),
            big_endian: false,
            abbreviated: false,
        }
    }

    pub fn big_endian(mut self) -> Self {
        self.big_endian = true;
        self
    }

    /// Store tiles as abbreviated streams with a shared JPEGTables tag.
    pub fn abbreviated(mut self) -> Self {
        self.abbreviated = true;
        self
    }

    /// Add a tiled JPEG image.
    pub fn level(mut self, width: u32, height: u32, tile: u32) -> Self {
        self.images.push(ImageSpec {
            width,
            height,
            tile,
            compression: 7,
            tiled: true,
        });
        self
    }

    /// Add an uncompressed stripped image (thumbnail-like).
    pub fn stripped(mut self, width: u32, height: u32) -> Self {
        self.images.push(ImageSpec {
            width,
            height,
            tile: 0,
            compression: 1,
            tiled: false,
        });
        self
    }

    /// Override the compression tag of the last image.
    pub fn compression(mut self, code: u16) -> Self {
        if let Some(last) = self.images.last_mut() {
            last.compression = code;
        }
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut out = Writer {
            buf: Vec::new(),
            big_endian: self.big_endian,
        };
        out.buf
            .extend_from_slice(if self.big_endian { b"MM" } else { b"II" });
        out.u16(42);
        let mut next_pointer = out.buf.len();
        out.u32(0);

        for (index, img) in self.images.iter().enumerate() {
            let mut entries: Vec<(u16, u16, u32, u32)> = vec![
                (256, 4, 1, img.width),
                (257, 4, 1, img.height),
                (259, 3, 1, img.compression as u32),
                (262, 3, 1, if img.tiled { 6 } else { 2 }),
                (277, 3, 1, 3),
            ];

            if img.tiled {
                let tiles_x = img.width.div_ceil(img.tile);
                let tiles_y = img.height.div_ceil(img.tile);
                let mut offsets = Vec::new();
                let mut counts = Vec::new();
                let mut tables = None;
                for ty in 0..tiles_y {
                    for tx in 0..tiles_x {
                        let jpeg = encode_tile(img.tile, tile_color(index, tx, ty));
                        let body = if self.abbreviated {
                            let (t, body) = split_tables(&jpeg);
                            tables = Some(t);
                            body
                        } else {
                            jpeg
                        };
                        offsets.push(out.blob(&body));
                        counts.push(body.len() as u32);
                    }
                }
                entries.push((322, 4, 1, img.tile));
                entries.push((323, 4, 1, img.tile));
                entries.push(out.long_array(324, &offsets));
                entries.push(out.long_array(325, &counts));
                if let Some(tables) = tables {
                    let at = out.blob(&tables);
                    entries.push((347, 7, tables.len() as u32, at));
                }
            } else {
                let at = out.blob(&[0u8; 16]);
                entries.push((273, 4, 1, at));
                entries.push((278, 4, 1, img.height));
                entries.push((279, 4, 1, 16));
            }

            entries.sort_by_key(|e| e.0);
            let ifd_at = out.align();
            out.patch_u32(next_pointer, ifd_at);
            out.u16(entries.len() as u16);
            for (tag, ty, count, value) in entries {
                out.u16(tag);
                out.u16(ty);
                out.u32(count);
                if ty == 3 && count == 1 {
                    out.u16(value as u16);
                    out.u16(0);
                } else {
                    out.u32(value);
                }
            }
            next_pointer = out.buf.len();
            out.u32(0);
        }

        out.buf
    }
}

impl Default for TiffBuilder {
    fn default() -> Self {
        Self::new()
    }
}

struct Writer {
    buf: Vec<u8>,
    big_endian: bool,
}

impl Writer {
    fn u16(&mut self, v: u16) {
        let bytes = if self.big_endian {
            v.to_be_bytes()
        } else {
            v.to_le_bytes()
        };
        self.buf.extend_from_slice(&bytes);
    }

    fn u32(&mut self, v: u32) {
        let bytes = if self.big_endian {
            v.to_be_bytes()
        } else {
            v.to_le_bytes()
        };
        self.buf.extend_from_slice(&bytes);
    }

    fn patch_u32(&mut self, at: usize, v: u32) {
        let bytes = if self.big_endian {
            v.to_be_bytes()
        } else {
            v.to_le_bytes()
        };
        self.buf[at..at + 4].copy_from_slice(&bytes);
    }

    fn align(&mut self) -> u32 {
        if self.buf.len() % 2 == 1 {
            self.buf.push(0);
        }
        self.buf.len() as u32
    }

    fn blob(&mut self, data: &[u8]) -> u32 {
        let at = self.align();
        self.buf.extend_from_slice(data);
        at
    }

    /// LONG array entry, inline when it holds a single value.
    fn long_array(&mut self, tag: u16, values: &[u32]) -> (u16, u16, u32, u32) {
        if values.len() == 1 {
            return (tag, 4, 1, values[0]);
        }
        let at = self.align();
        for v in values {
            self.u32(*v);
        }
        (tag, 4, values.len() as u32, at)
    }
}

fn encode_tile(size: u32, color: [u8; 3]) -> Vec<u8> {
    let img = RgbImage::from_pixel(size, size, Rgb(color));
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, 95)
        .encode_image(&img)
        .unwrap();
    out
}

/// Split a complete JPEG into (JPEGTables, abbreviated stream).
fn split_tables(jpeg: &[u8]) -> (Vec<u8>, Vec<u8>) {
    let mut tables = vec![0xFF, 0xD8];
    let mut body = vec![0xFF, 0xD8];
    let mut pos = 2;
    while pos + 4 <= jpeg.len() {
        let marker = jpeg[pos + 1];
        if marker == 0xDA {
            break;
        }
        let len = u16::from_be_bytes([jpeg[pos + 2], jpeg[pos + 3]]) as usize;
        let segment = &jpeg[pos..pos + 2 + len];
        if marker == 0xDB || marker == 0xC4 {
            tables.extend_from_slice(segment);
        } else {
            body.extend_from_slice(segment);
        }
        pos += 2 + len;
    }
    body.extend_from_slice(&jpeg[pos..]);
    tables.extend_from_slice(&[0xFF, 0xD9]);
    (tables, body)
}
