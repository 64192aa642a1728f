//! JPEG stream preparation for TIFF tiles.
//!
//! Tiles in Aperio SVS and many pyramidal TIFFs are "abbreviated" JPEG
//! streams: the quantization and Huffman tables live once in the IFD's
//! `JPEGTables` tag instead of in every tile. Before a generic decoder can
//! read such a tile the two must be spliced together:
//!
//! ```text
//! tables: SOI DQT.. DHT.. EOI
//! tile:   SOI SOF SOS <scan> EOI
//! merged: SOI DQT.. DHT.. SOF SOS <scan> EOI
//! ```
//!
//! Some writers also store raw RGB components (photometric RGB) rather than
//! YCbCr. Decoders assume YCbCr for 3-component streams unless an Adobe APP14
//! segment says otherwise, so such tiles get one inserted.

use bytes::{BufMut, Bytes, BytesMut};

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];
const DQT: u8 = 0xDB;
const SOS: u8 = 0xDA;
const APP14: u8 = 0xEE;

/// Adobe APP14 segment with transform = 0 (components are stored untransformed).
const ADOBE_RGB_SEGMENT: [u8; 16] = [
    0xFF, APP14, 0x00, 0x0E, b'A', b'd', b'o', b'b', b'e', 0x00, 0x64, 0x00, 0x00, 0x00, 0x00,
    0x00,
];

/// Markers seen in the header of a JPEG stream, up to the first SOS.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct HeaderMarkers {
    has_quant_tables: bool,
    has_adobe: bool,
}

fn scan_header(data: &[u8]) -> Option<HeaderMarkers> {
    if data.len() < 4 || data[..2] != SOI {
        return None;
    }

    let mut markers = HeaderMarkers::default();
    let mut pos = 2;
    while pos + 4 <= data.len() {
        if data[pos] != 0xFF {
            return Some(markers);
        }
        let marker = data[pos + 1];
        match marker {
            // Fill bytes
            0xFF => {
                pos += 1;
                continue;
            }
            SOS => return Some(markers),
            DQT => markers.has_quant_tables = true,
            APP14 => markers.has_adobe = true,
            _ => {}
        }
        let length = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
        pos += 2 + length;
    }
    Some(markers)
}

/// Whether `data` is a JPEG stream carrying its own quantization tables.
pub fn is_complete_stream(data: &[u8]) -> bool {
    scan_header(data).is_some_and(|m| m.has_quant_tables)
}

/// Splice shared `JPEGTables` into an abbreviated tile stream.
pub fn merge_jpeg_tables(tables: &[u8], tile: &[u8]) -> Bytes {
    if tables.is_empty() {
        return Bytes::copy_from_slice(tile);
    }
    if tile.is_empty() {
        return Bytes::new();
    }

    let tables = tables.strip_suffix(&EOI).unwrap_or(tables);
    let tile = tile.strip_prefix(&SOI).unwrap_or(tile);

    let mut merged = BytesMut::with_capacity(tables.len() + tile.len());
    merged.put_slice(tables);
    merged.put_slice(tile);
    merged.freeze()
}

/// Insert an Adobe APP14 segment right after SOI unless one is present.
pub fn mark_rgb_components(data: &[u8]) -> Bytes {
    match scan_header(data) {
        Some(markers) if !markers.has_adobe => {
            let mut marked = BytesMut::with_capacity(data.len() + ADOBE_RGB_SEGMENT.len());
            marked.put_slice(&SOI);
            marked.put_slice(&ADOBE_RGB_SEGMENT);
            marked.put_slice(&data[2..]);
            marked.freeze()
        }
        _ => Bytes::copy_from_slice(data),
    }
}

/// Turn raw tile bytes into a self-contained JPEG stream.
///
/// `tables` is the level's `JPEGTables`, `rgb` whether the IFD declares
/// photometric RGB.
pub fn prepare_tile_jpeg(tables: Option<&[u8]>, tile: &[u8], rgb: bool) -> Bytes {
    let complete = match tables {
        Some(tables) if !is_complete_stream(tile) => merge_jpeg_tables(tables, tile),
        _ => Bytes::copy_from_slice(tile),
    };
    if rgb {
        mark_rgb_components(&complete)
    } else {
        complete
    }
}
