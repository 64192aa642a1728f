//! Shared state, error mapping and the slide-serving handlers.
//!
//! # Endpoints
//!
//! - `GET /` - Liveness and version
//! - `GET /info/{slide_id}` - Slide dimensions and level geometry
//! - `GET /tiles/{slide_id}/{z}/{x}_{y}.jpeg` - Serve a tile

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::error::{StoreError, TileError};
use crate::slide::SlideSource;
use crate::store::MetadataStore;
use crate::tile::{SlideInfo, TileAddress, TileService};

/// Response header telling whether a tile came from the tile cache.
pub const X_TILE_CACHE_HIT: HeaderName = HeaderName::from_static("x-tile-cache-hit");

// =============================================================================
// Application State
// =============================================================================

/// Shared application state, passed to all handlers via Axum's State extractor.
pub struct AppState<S: SlideSource> {
    pub tile_service: Arc<TileService<S>>,

    pub store: MetadataStore,

    /// Directory uploads are written to; slide ids are file names inside it
    pub slide_dir: PathBuf,

    /// Cache-Control max-age for tiles, in seconds
    pub cache_max_age: u32,
}

impl<S: SlideSource> AppState<S> {
    pub fn new(tile_service: TileService<S>, store: MetadataStore, slide_dir: PathBuf) -> Self {
        Self {
            tile_service: Arc::new(tile_service),
            store,
            slide_dir,
            cache_max_age: 86400,
        }
    }

    pub fn with_cache_max_age(mut self, seconds: u32) -> Self {
        self.cache_max_age = seconds;
        self
    }
}

impl<S: SlideSource> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            tile_service: Arc::clone(&self.tile_service),
            store: self.store.clone(),
            slide_dir: self.slide_dir.clone(),
            cache_max_age: self.cache_max_age,
        }
    }
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON error response returned for all error conditions.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error kind (e.g., "not_found", "invalid_input")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    pub status: u16,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

// =============================================================================
// Error Mapping
// =============================================================================

/// Any failure a handler can report.
#[derive(Debug)]
pub enum ApiError {
    Tile(TileError),
    Store(StoreError),
    /// Malformed request: bad JSON, missing fields, bad query values
    InvalidInput(String),
    /// Route matched but names nothing (e.g., malformed tile file name)
    NotFound(String),
    /// Request body exceeds the configured limit
    PayloadTooLarge(String),
    /// Server-side failure outside the tile and store layers
    Internal(String),
}

impl From<TileError> for ApiError {
    fn from(err: TileError) -> Self {
        ApiError::Tile(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Store(err)
    }
}

impl ApiError {
    fn classify(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Tile(err) => match err {
                TileError::SlideNotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
                TileError::InvalidZoom { .. } => (StatusCode::NOT_FOUND, "invalid_zoom"),
                TileError::OutOfBounds { .. } => (StatusCode::NOT_FOUND, "out_of_bounds"),
                TileError::Slide(_) => (StatusCode::INTERNAL_SERVER_ERROR, "decode_error"),
                TileError::Encode { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "encode_error"),
            },
            ApiError::Store(err) => match err {
                StoreError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
                StoreError::MissingReference { .. } => (StatusCode::NOT_FOUND, "missing_reference"),
                StoreError::Sqlite(_) | StoreError::Task(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "database_error")
                }
            },
            ApiError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "invalid_input"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::PayloadTooLarge(_) => (StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Tile(err) => err.to_string(),
            ApiError::Store(err) => err.to_string(),
            ApiError::InvalidInput(msg)
            | ApiError::NotFound(msg)
            | ApiError::PayloadTooLarge(msg)
            | ApiError::Internal(msg) => msg.clone(),
        }
    }
}

/// Logs by severity: 5xx at ERROR, 404 at DEBUG, other 4xx at WARN.
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type) = self.classify();
        let message = self.message();

        if status.is_server_error() {
            error!(
                error_type = error_type,
                status = status.as_u16(),
                "Server error: {}",
                message
            );
        } else if status == StatusCode::NOT_FOUND {
            debug!(
                error_type = error_type,
                status = status.as_u16(),
                "Resource not found: {}",
                message
            );
        } else {
            warn!(
                error_type = error_type,
                status = status.as_u16(),
                "Client error: {}",
                message
            );
        }

        let body = ErrorResponse {
            error: error_type.to_string(),
            message,
            status: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// `GET /`
///
/// ```json
/// { "status": "live", "version": "0.1.0" }
/// ```
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "live".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// `GET /info/{slide_id}`
///
/// ```json
/// {
///   "width": 100000, "height": 80000, "tile_size": 256, "levels": 3,
///   "level_dimensions": [[100000, 80000], [25000, 20000], [6250, 5000]]
/// }
/// ```
pub async fn info_handler<S: SlideSource>(
    State(state): State<AppState<S>>,
    Path(slide_id): Path<String>,
) -> Result<Json<SlideInfo>, ApiError> {
    Ok(Json(state.tile_service.slide_info(&slide_id).await?))
}

/// `GET /tiles/{slide_id}/{z}/{x}_{y}.jpeg`
///
/// # Response
///
/// - `200 OK`: JPEG with `Cache-Control` and `X-Tile-Cache-Hit` headers
/// - `404 Not Found`: unknown slide, zoom without a native level, tile
///   outside the grid, or a malformed zoom / tile name
/// - `500 Internal Server Error`: the slide could not be decoded
pub async fn tile_handler<S: SlideSource>(
    State(state): State<AppState<S>>,
    Path((slide_id, zoom, tile)): Path<(String, String, String)>,
) -> Result<Response, ApiError> {
    let zoom: u32 = zoom
        .parse()
        .map_err(|_| ApiError::NotFound(format!("Invalid zoom: {}", zoom)))?;
    let (x, y) = parse_tile_file(&tile)
        .ok_or_else(|| ApiError::NotFound(format!("Invalid tile name: {}", tile)))?;

    let address = TileAddress::new(slide_id, zoom, x, y);
    let tile = state.tile_service.get_tile(&address).await?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "image/jpeg".to_string()),
            (
                header::CACHE_CONTROL,
                format!("public, max-age={}", state.cache_max_age),
            ),
            (X_TILE_CACHE_HIT, tile.cache_hit.to_string()),
        ],
        tile.data,
    )
        .into_response())
}

/// Parse `{x}_{y}.jpeg`.
pub fn parse_tile_file(name: &str) -> Option<(u32, u32)> {
    let (x, y) = name.strip_suffix(".jpeg")?.split_once('_')?;
    if !is_decimal(x) || !is_decimal(y) {
        return None;
    }
    Some((x.parse().ok()?, y.parse().ok()?))
}

fn is_decimal(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}
