//! Command-line and environment configuration.
//!
//! Every option can also be set through a `SLIDESCOPE_` environment variable:
//!
//! - `SLIDESCOPE_HOST` - Server bind address (default: 0.0.0.0)
//! - `SLIDESCOPE_PORT` - Server port (default: 8000)
//! - `SLIDESCOPE_SLIDE_DIR` - Directory holding slide files (default: slides)
//! - `SLIDESCOPE_TILE_DIR` - Root of the on-disk tile cache (default: tiles)
//! - `SLIDESCOPE_DATABASE` - SQLite catalog file (default: db.sqlite)
//! - `SLIDESCOPE_CACHE_SLIDES` - Opened slides kept in memory (default: 64)
//! - `SLIDESCOPE_CACHE_BLOCKS` - Cached blocks per slide (default: 64)
//! - `SLIDESCOPE_BLOCK_SIZE` - Block size in bytes (default: 262144)
//! - `SLIDESCOPE_TILE_CACHE_MAX_BYTES` - Tile cache budget (default: unbounded)
//! - `SLIDESCOPE_JPEG_QUALITY` - Tile JPEG quality (default: 85)
//! - `SLIDESCOPE_CACHE_MAX_AGE` - Tile Cache-Control max-age (default: 86400)
//! - `SLIDESCOPE_CORS_ORIGINS` - Allowed origins, comma separated (default: any)
//! - `SLIDESCOPE_MAX_UPLOAD_BYTES` - Upload body limit (default: 20 GiB)

use std::path::PathBuf;

use clap::Parser;

use crate::io::DEFAULT_BLOCK_SIZE;
use crate::server::DEFAULT_MAX_UPLOAD_BYTES;
use crate::slide::{DEFAULT_BLOCK_CACHE_CAPACITY, DEFAULT_SLIDE_CACHE_CAPACITY};
use crate::tile::DEFAULT_JPEG_QUALITY;

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 8000;

/// Default tile Cache-Control max-age in seconds (1 day).
pub const DEFAULT_CACHE_MAX_AGE: u32 = 86400;

/// Slidescope - a tile server for pyramidal whole slide images.
///
/// Serves viewer tiles from slide files in a local directory, caches them on
/// disk, and keeps a small SQLite catalog of folders, uploads and reports.
#[derive(Parser, Debug, Clone)]
#[command(name = "slidescope")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    // =========================================================================
    // Server
    // =========================================================================
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "SLIDESCOPE_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "SLIDESCOPE_PORT")]
    pub port: u16,

    // =========================================================================
    // Storage
    // =========================================================================
    /// Directory holding slide files. Slide ids are file names inside it.
    #[arg(long, default_value = "slides", env = "SLIDESCOPE_SLIDE_DIR")]
    pub slide_dir: PathBuf,

    /// Root directory of the on-disk tile cache.
    #[arg(long, default_value = "tiles", env = "SLIDESCOPE_TILE_DIR")]
    pub tile_dir: PathBuf,

    /// SQLite database file for folders, slides and reports.
    #[arg(long, default_value = "db.sqlite", env = "SLIDESCOPE_DATABASE")]
    pub database: PathBuf,

    // =========================================================================
    // Caches
    // =========================================================================
    /// Maximum number of opened slides kept in memory.
    #[arg(long, default_value_t = DEFAULT_SLIDE_CACHE_CAPACITY, env = "SLIDESCOPE_CACHE_SLIDES")]
    pub cache_slides: usize,

    /// Maximum number of blocks cached per slide.
    #[arg(long, default_value_t = DEFAULT_BLOCK_CACHE_CAPACITY, env = "SLIDESCOPE_CACHE_BLOCKS")]
    pub cache_blocks: usize,

    /// Block size in bytes for the block cache.
    #[arg(long, default_value_t = DEFAULT_BLOCK_SIZE, env = "SLIDESCOPE_BLOCK_SIZE")]
    pub block_size: usize,

    /// Byte budget of the tile cache; least recently used tiles are deleted
    /// beyond it. Unbounded when unset.
    #[arg(long, env = "SLIDESCOPE_TILE_CACHE_MAX_BYTES")]
    pub tile_cache_max_bytes: Option<u64>,

    // =========================================================================
    // Tiles
    // =========================================================================
    /// JPEG quality for rendered tiles (1-100).
    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY, env = "SLIDESCOPE_JPEG_QUALITY")]
    pub jpeg_quality: u8,

    /// Tile Cache-Control max-age in seconds.
    #[arg(long, default_value_t = DEFAULT_CACHE_MAX_AGE, env = "SLIDESCOPE_CACHE_MAX_AGE")]
    pub cache_max_age: u32,

    // =========================================================================
    // HTTP
    // =========================================================================
    /// Allowed CORS origins (comma-separated). Any origin when unset.
    #[arg(long, env = "SLIDESCOPE_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    /// Maximum request body size of uploads, in bytes.
    #[arg(long, default_value_t = DEFAULT_MAX_UPLOAD_BYTES, env = "SLIDESCOPE_MAX_UPLOAD_BYTES")]
    pub max_upload_bytes: usize,

    // =========================================================================
    // Logging
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl Config {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.cache_slides == 0 {
            return Err("cache_slides must be greater than 0".to_string());
        }
        if self.cache_blocks == 0 {
            return Err("cache_blocks must be greater than 0".to_string());
        }
        if self.tile_cache_max_bytes == Some(0) {
            return Err(
                "tile_cache_max_bytes must be greater than 0 (leave unset for no limit)"
                    .to_string(),
            );
        }

        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            return Err("jpeg_quality must be between 1 and 100".to_string());
        }

        if self.block_size < 1024 || self.block_size > 16 * 1024 * 1024 {
            return Err("block_size must be between 1KB and 16MB".to_string());
        }

        if self.max_upload_bytes == 0 {
            return Err("max_upload_bytes must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
