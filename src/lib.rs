//! # Slidescope
//!
//! A tile server for pyramidal whole slide images (WSI) kept in a local
//! directory.
//!
//! Viewers request 256x256 JPEG tiles by `(slide, zoom, x, y)`. Each zoom
//! maps onto a native pyramid level, the matching region is decoded straight
//! from the slide's JPEG tiles, and the encoded result is cached on disk so
//! every tile is rendered once. A small SQLite catalog tracks folders,
//! uploaded slides and per-slide reports.
//!
//! ## Architecture
//!
//! - [`io`] - Positional file reads with block caching
//! - [`mod@format`] - TIFF/BigTIFF pyramid parsing and JPEG stream handling
//! - [`slide`] - Opened slides, region reads and the slide pool
//! - [`tile`] - Zoom-to-level mapping, disk tile cache, encoding, tile service
//! - [`store`] - SQLite catalog of folders, slides and reports
//! - [`server`] - Axum router and handlers
//! - [`config`] - CLI and environment configuration
//!
//! ## Example
//!
//! ```rust,no_run
//! use slidescope::{
//!     create_router, AppState, LocalSlideSource, MetadataStore, RouterConfig, SlideRegistry,
//!     TileCache, TileService,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = SlideRegistry::new(LocalSlideSource::new("slides"));
//!     let tiles = TileCache::open("tiles", None).await?;
//!     let service = TileService::new(registry, tiles);
//!     let store = MetadataStore::open("db.sqlite")?;
//!
//!     let state = AppState::new(service, store, "slides".into());
//!     let router = create_router(state, RouterConfig::default());
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await?;
//!     axum::serve(listener, router).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod format;
pub mod io;
pub mod server;
pub mod singleflight;
pub mod slide;
pub mod store;
pub mod tile;

// Re-export commonly used types
pub use config::Config;
pub use error::{IoError, SlideError, StoreError, TileError};
pub use format::{PyramidLevel, TiffPyramid};
pub use io::{BlockCache, LocalFileReader, RangeReader};
pub use server::{create_router, ApiError, AppState, ErrorResponse, RouterConfig};
pub use singleflight::Singleflight;
pub use slide::{LocalSlideSource, PyramidDescriptor, SlideHandle, SlideRegistry, SlideSource};
pub use store::{Folder, MetadataStore, Report, ReportInput, Slide};
pub use tile::{
    map_tile, JpegTileEncoder, SlideInfo, TileAddress, TileCache, TileRegion, TileResponse,
    TileService, DEFAULT_JPEG_QUALITY, TILE_SIZE,
};
