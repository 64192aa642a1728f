//! Tile service layer.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              HTTP Handlers              │
//! └────────────────────┬────────────────────┘
//!                      │ TileAddress
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │              TileService                │
//! │  ┌──────────┐ ┌───────────┐ ┌─────────┐ │
//! │  │  mapper  │ │ TileCache │ │ encoder │ │
//! │  │ (zoom -> │ │  (disk)   │ │ (JPEG)  │ │
//! │  │  level)  │ │           │ │         │ │
//! │  └──────────┘ └───────────┘ └─────────┘ │
//! └────────────────────┬────────────────────┘
//!                      │ read_region
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │             SlideRegistry               │
//! └─────────────────────────────────────────┘
//! ```

mod cache;
mod encoder;
mod mapper;
mod service;

pub use cache::{TileCache, TileKey};
pub use encoder::{
    clamp_quality, is_valid_quality, JpegTileEncoder, DEFAULT_JPEG_QUALITY, MAX_JPEG_QUALITY,
    MIN_JPEG_QUALITY,
};
pub use mapper::{map_tile, tile_count, TileAddress, TileRegion, TILE_SIZE};
pub use service::{SlideInfo, TileResponse, TileService};
