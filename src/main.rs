//! Slidescope - a tile server for pyramidal whole slide images.
//!
//! This binary starts the HTTP server and wires all components together.

use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use slidescope::{
    config::Config,
    server::{create_router, AppState, RouterConfig},
    slide::{LocalSlideSource, SlideRegistry},
    store::MetadataStore,
    tile::{JpegTileEncoder, TileCache, TileService},
};

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();

    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    print_banner();

    info!("Configuration:");
    info!("  Slide directory: {}", config.slide_dir.display());
    info!("  Tile cache: {}", config.tile_dir.display());
    info!("  Database: {}", config.database.display());
    info!(
        "  Cache: {} slides, {} blocks/slide of {}KB",
        config.cache_slides,
        config.cache_blocks,
        config.block_size / 1024
    );
    match config.tile_cache_max_bytes {
        Some(bytes) => info!("  Tile cache budget: {}MB", bytes / (1024 * 1024)),
        None => info!("  Tile cache budget: unbounded"),
    }
    info!("  JPEG quality: {}", config.jpeg_quality);

    if let Err(e) = std::fs::create_dir_all(&config.slide_dir) {
        error!(
            "Failed to create slide directory {}: {}",
            config.slide_dir.display(),
            e
        );
        return ExitCode::FAILURE;
    }
    match count_slide_files(&config.slide_dir) {
        Ok(count) => info!("  Found {} file(s) in slide directory", count),
        Err(e) => warn!("  Could not list slide directory: {}", e),
    }

    let store = match MetadataStore::open(&config.database) {
        Ok(store) => store,
        Err(e) => {
            error!(
                "Failed to open database {}: {}",
                config.database.display(),
                e
            );
            return ExitCode::FAILURE;
        }
    };

    let tile_cache = match TileCache::open(&config.tile_dir, config.tile_cache_max_bytes).await {
        Ok(cache) => cache,
        Err(e) => {
            error!(
                "Failed to open tile cache {}: {}",
                config.tile_dir.display(),
                e
            );
            return ExitCode::FAILURE;
        }
    };

    let registry = SlideRegistry::with_capacity(
        LocalSlideSource::new(&config.slide_dir),
        config.cache_slides,
        config.block_size,
        config.cache_blocks,
    );
    let tile_service = TileService::new(registry, tile_cache)
        .with_encoder(JpegTileEncoder::new(config.jpeg_quality));

    let state = AppState::new(tile_service, store, config.slide_dir.clone());
    let router = create_router(state, build_router_config(&config));

    let addr = config.bind_address();

    info!("");
    info!("────────────────────────────────────────────────────────────────");
    info!("  Server listening on: http://{}", addr);
    info!("");
    info!("  Try these endpoints:");
    info!("    curl http://{}/", addr);
    info!("    curl http://{}/slides", addr);
    info!("    curl http://{}/info/<slide_id>", addr);
    info!("    curl http://{}/tiles/<slide_id>/0/0_0.jpeg -o tile.jpeg", addr);
    info!("────────────────────────────────────────────────────────────────");
    info!("");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    info!("Server stopped");
    ExitCode::SUCCESS
}

fn print_banner() {
    info!("");
    info!("════════════════════════════════════════════════════════════════");
    info!("  SLIDESCOPE v{}", env!("CARGO_PKG_VERSION"));
    info!("  whole slide image tile server");
    info!("════════════════════════════════════════════════════════════════");
    info!("");
}

/// Number of regular files directly inside `dir`.
fn count_slide_files(dir: &Path) -> std::io::Result<usize> {
    let mut count = 0;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if entry.file_type()?.is_file() && !hidden {
            count += 1;
        }
    }
    Ok(count)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "slidescope=debug,tower_http=debug"
    } else {
        "slidescope=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn build_router_config(config: &Config) -> RouterConfig {
    let mut router_config = RouterConfig::new()
        .with_cache_max_age(config.cache_max_age)
        .with_tracing(!config.no_tracing)
        .with_max_upload_bytes(config.max_upload_bytes);

    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    router_config
}
