//! Router configuration.
//!
//! # Route Structure
//!
//! ```text
//! /                                  GET   liveness and version
//! /folders                           GET   list folders
//!                                    POST  create folder
//! /folders/{id}                      PUT   rename folder
//! /slides?folder_id=                 GET   list uploaded slides
//! /upload                            POST  multipart slide upload
//! /info/{slide_id}                   GET   slide dimensions and levels
//! /tiles/{slide_id}/{z}/{x}_{y}.jpeg GET   tile
//! /report/{slide_id}                 GET   list reports
//!                                    POST  create or update report
//! ```

use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::{
    routing::{get, post, put},
    Router,
};
use http::header::CONTENT_TYPE;
use http::Method;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{health_handler, info_handler, tile_handler, AppState};
use super::metadata::{
    create_folder_handler, list_folders_handler, list_reports_handler, list_slides_handler,
    rename_folder_handler, save_report_handler,
};
use super::upload::upload_handler;
use crate::slide::SlideSource;

/// Default request body limit for uploads: 20 GiB, or the address space on
/// targets where that does not fit in `usize`.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = {
    const LIMIT: u64 = 20 * 1024 * 1024 * 1024;
    if LIMIT > usize::MAX as u64 {
        usize::MAX
    } else {
        LIMIT as usize
    }
};

// =============================================================================
// Router Configuration
// =============================================================================

/// Configuration for the HTTP router.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Allowed CORS origins (None = allow any origin)
    pub cors_origins: Option<Vec<String>>,

    /// Tile Cache-Control max-age in seconds
    pub cache_max_age: u32,

    /// Whether to enable request tracing
    pub enable_tracing: bool,

    /// Body limit of `POST /upload`
    pub max_upload_bytes: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            cors_origins: None,
            cache_max_age: 86400,
            enable_tracing: true,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl RouterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pass an empty vec to disallow all cross-origin requests.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    pub fn with_cors_any_origin(mut self) -> Self {
        self.cors_origins = None;
        self
    }

    pub fn with_cache_max_age(mut self, seconds: u32) -> Self {
        self.cache_max_age = seconds;
        self
    }

    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }

    pub fn with_max_upload_bytes(mut self, bytes: usize) -> Self {
        self.max_upload_bytes = bytes;
        self
    }
}

// =============================================================================
// Router Builder
// =============================================================================

/// Create the application router.
///
/// `state.cache_max_age` is overridden by `config.cache_max_age`.
pub fn create_router<S>(state: AppState<S>, config: RouterConfig) -> Router
where
    S: SlideSource + 'static,
{
    let state = state.with_cache_max_age(config.cache_max_age);
    let cors = build_cors_layer(&config);

    let upload_routes = Router::new()
        .route("/upload", post(upload_handler::<S>))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes));

    let router = Router::new()
        .route("/", get(health_handler))
        .route(
            "/folders",
            get(list_folders_handler::<S>).post(create_folder_handler::<S>),
        )
        .route("/folders/{id}", put(rename_folder_handler::<S>))
        .route("/slides", get(list_slides_handler::<S>))
        .route("/info/{slide_id}", get(info_handler::<S>))
        .route("/tiles/{slide_id}/{z}/{tile}", get(tile_handler::<S>))
        .route(
            "/report/{slide_id}",
            get(list_reports_handler::<S>).post(save_report_handler::<S>),
        )
        .merge(upload_routes)
        .with_state(state)
        .layer(cors);

    if config.enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

/// Build the CORS layer based on configuration.
fn build_cors_layer(config: &RouterConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::HEAD,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(86400));

    match &config.cors_origins {
        None => cors.allow_origin(Any),
        Some(origins) if origins.is_empty() => cors,
        Some(origins) => {
            let parsed_origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            cors.allow_origin(parsed_origins)
        }
    }
}
