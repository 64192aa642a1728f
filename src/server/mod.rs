//! HTTP server layer.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                           HTTP Layer                            │
//! │                                                                 │
//! │  ┌─────────────┐  ┌─────────────┐  ┌──────────┐  ┌──────────┐   │
//! │  │  handlers   │  │  metadata   │  │  upload  │  │  routes  │   │
//! │  │ (tiles,info)│  │ (catalog)   │  │(multipart│  │ (router, │   │
//! │  │             │  │             │  │  spool)  │  │  CORS)   │   │
//! │  └──────┬──────┘  └──────┬──────┘  └────┬─────┘  └──────────┘   │
//! └─────────┼────────────────┼──────────────┼───────────────────────┘
//!           ▼                ▼              ▼
//!      TileService     MetadataStore   slide dir + both
//! ```

pub mod handlers;
pub mod metadata;
pub mod routes;
pub mod upload;

pub use handlers::{
    health_handler, info_handler, parse_tile_file, tile_handler, ApiError, AppState,
    ErrorResponse, HealthResponse, X_TILE_CACHE_HIT,
};
pub use metadata::{FolderInput, SlidesQueryParams};
pub use routes::{create_router, RouterConfig, DEFAULT_MAX_UPLOAD_BYTES};
pub use upload::{secure_filename, upload_handler, UploadResponse};
