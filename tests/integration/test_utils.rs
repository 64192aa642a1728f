//! Test harness for integration tests.
//!
//! [`TestApp`] wires the production components (local slide directory, disk
//! tile cache, SQLite catalog) into a router inside a temporary directory.
//! [`PyramidTiff`] writes small pyramidal TIFFs whose native tiles are solid
//! colour JPEGs.

use std::path::{Path, PathBuf};

use axum::body::Body;
use axum::http::{header, Request, Response, StatusCode};
use axum::Router;
use bytes::Bytes;
use http_body_util::BodyExt;
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use slidescope::server::{create_router, AppState, RouterConfig};
use slidescope::slide::{LocalSlideSource, SlideRegistry};
use slidescope::store::MetadataStore;
use slidescope::tile::{TileCache, TileService};

// =============================================================================
// Application harness
// =============================================================================

pub struct TestApp {
    pub router: Router,
    pub slide_dir: PathBuf,
    pub tile_dir: PathBuf,
    _root: TempDir,
}

impl TestApp {
    /// App with an unbounded tile cache.
    pub async fn new() -> Self {
        Self::with_tile_budget(None).await
    }

    pub async fn with_tile_budget(max_bytes: Option<u64>) -> Self {
        Self::build(max_bytes, RouterConfig::new().with_tracing(false)).await
    }

    pub async fn with_config(config: RouterConfig) -> Self {
        Self::build(None, config.with_tracing(false)).await
    }

    async fn build(max_bytes: Option<u64>, config: RouterConfig) -> Self {
        let root = tempfile::tempdir().unwrap();
        let slide_dir = root.path().join("slides");
        let tile_dir = root.path().join("tiles");
        std::fs::create_dir_all(&slide_dir).unwrap();

        let store = MetadataStore::open(root.path().join("db.sqlite")).unwrap();
        let cache = TileCache::open(&tile_dir, max_bytes).await.unwrap();
        let registry = SlideRegistry::new(LocalSlideSource::new(&slide_dir));
        let service = TileService::new(registry, cache);

        let state = AppState::new(service, store, slide_dir.clone());
        Self {
            router: create_router(state, config),
            slide_dir,
            tile_dir,
            _root: root,
        }
    }

    /// Place a slide file directly in the slide directory.
    pub fn add_slide(&self, name: &str, data: &[u8]) {
        std::fs::write(self.slide_dir.join(name), data).unwrap();
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    pub async fn send_json(&self, method: &str, uri: &str, body: Value) -> Response<Body> {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    pub async fn upload(&self, form: Multipart) -> Response<Body> {
        let (content_type, body) = form.finish();
        let request = Request::post("/upload")
            .header(header::CONTENT_TYPE, content_type)
            .body(Body::from(body))
            .unwrap();
        self.send(request).await
    }

    /// Path of a cached tile under the tile directory.
    pub fn tile_path(&self, slide_id: &str, zoom: u32, x: u32, y: u32) -> PathBuf {
        self.tile_dir
            .join(slide_id)
            .join(zoom.to_string())
            .join(format!("{}_{}.jpeg", x, y))
    }
}

pub async fn body_bytes(response: Response<Body>) -> Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// Assert `status` and the `{error, message, status}` error body.
pub async fn assert_error(response: Response<Body>, status: StatusCode, kind: &str) {
    assert_eq!(response.status(), status);
    let json = body_json(response).await;
    assert_eq!(json["error"], kind, "body: {}", json);
    assert_eq!(json["status"], status.as_u16());
    assert!(json["message"].is_string());
}

/// Count files below `dir`, recursively.
pub fn count_files(dir: &Path) -> usize {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    entries
        .map(|e| e.unwrap().path())
        .map(|p| if p.is_dir() { count_files(&p) } else { 1 })
        .sum()
}

// =============================================================================
// Multipart bodies
// =============================================================================

const BOUNDARY: &str = "slidescope-test-boundary";

/// Minimal multipart/form-data writer.
#[derive(Default)]
pub struct Multipart {
    body: Vec<u8>,
}

impl Multipart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, filename: &str, data: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                 Content-Type: application/octet-stream\r\n\r\n",
                BOUNDARY, name, filename
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(data);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    /// Content type header value and the encoded body.
    pub fn finish(mut self) -> (String, Vec<u8>) {
        self.body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        (
            format!("multipart/form-data; boundary={}", BOUNDARY),
            self.body,
        )
    }
}

// =============================================================================
// Synthetic slides
// =============================================================================

const NATIVE_TILE: u32 = 256;

/// Little-endian classic TIFF with one tiled JPEG IFD per pyramid level.
pub struct PyramidTiff {
    levels: Vec<(u32, u32)>,
    color: [u8; 3],
}

impl PyramidTiff {
    pub fn new() -> Self {
        Self {
            levels: Vec::new(),
            color: [200, 80, 40],
        }
    }

    pub fn level(mut self, width: u32, height: u32) -> Self {
        self.levels.push((width, height));
        self
    }

    /// Fill colour of every native tile.
    pub fn color(mut self, color: [u8; 3]) -> Self {
        self.color = color;
        self
    }

    pub fn build(self) -> Vec<u8> {
        let tile = solid_jpeg(NATIVE_TILE, self.color);

        let mut buf: Vec<u8> = b"II".to_vec();
        buf.extend_from_slice(&42u16.to_le_bytes());
        let mut next_pointer = buf.len();
        buf.extend_from_slice(&0u32.to_le_bytes());

        for &(width, height) in &self.levels {
            let tiles = (width.div_ceil(NATIVE_TILE) * height.div_ceil(NATIVE_TILE)) as usize;

            let mut offsets = Vec::with_capacity(tiles);
            for _ in 0..tiles {
                pad_even(&mut buf);
                offsets.push(buf.len() as u32);
                buf.extend_from_slice(&tile);
            }
            let counts = vec![tile.len() as u32; tiles];

            let offsets_entry = long_entry(&mut buf, 324, &offsets);
            let counts_entry = long_entry(&mut buf, 325, &counts);

            // (tag, type, count, value), sorted by tag
            let entries = [
                (256u16, 4u16, 1u32, width),
                (257, 4, 1, height),
                (259, 3, 1, 7),
                (262, 3, 1, 6),
                (277, 3, 1, 3),
                (322, 4, 1, NATIVE_TILE),
                (323, 4, 1, NATIVE_TILE),
                offsets_entry,
                counts_entry,
            ];

            pad_even(&mut buf);
            let ifd_at = buf.len() as u32;
            buf[next_pointer..next_pointer + 4].copy_from_slice(&ifd_at.to_le_bytes());
            buf.extend_from_slice(&(entries.len() as u16).to_le_bytes());
            for (tag, ty, count, value) in entries {
                buf.extend_from_slice(&tag.to_le_bytes());
                buf.extend_from_slice(&ty.to_le_bytes());
                buf.extend_from_slice(&count.to_le_bytes());
                if ty == 3 {
                    buf.extend_from_slice(&(value as u16).to_le_bytes());
                    buf.extend_from_slice(&[0, 0]);
                } else {
                    buf.extend_from_slice(&value.to_le_bytes());
                }
            }
            next_pointer = buf.len();
            buf.extend_from_slice(&0u32.to_le_bytes());
        }
        buf
    }
}

/// 600x400 slide with 300x200 and 150x100 reductions.
pub fn three_level_slide() -> Vec<u8> {
    PyramidTiff::new()
        .level(600, 400)
        .level(300, 200)
        .level(150, 100)
        .build()
}

fn pad_even(buf: &mut Vec<u8>) {
    if buf.len() % 2 == 1 {
        buf.push(0);
    }
}

/// LONG entry, inline for a single value, otherwise written out of line.
fn long_entry(buf: &mut Vec<u8>, tag: u16, values: &[u32]) -> (u16, u16, u32, u32) {
    if let [single] = values {
        return (tag, 4, 1, *single);
    }
    pad_even(buf);
    let at = buf.len() as u32;
    for v in values {
        buf.extend_from_slice(&v.to_le_bytes());
    }
    (tag, 4, values.len() as u32, at)
}

fn solid_jpeg(size: u32, color: [u8; 3]) -> Vec<u8> {
    let img = RgbImage::from_pixel(size, size, Rgb(color));
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, 95)
        .encode_image(&img)
        .unwrap();
    out
}

/// Decode a served tile, asserting it is a baseline RGB JPEG.
pub fn decode_tile(data: &[u8]) -> RgbImage {
    assert_eq!(&data[..2], &[0xFF, 0xD8], "not a JPEG stream");
    image::load_from_memory_with_format(data, image::ImageFormat::Jpeg)
        .unwrap()
        .to_rgb8()
}
