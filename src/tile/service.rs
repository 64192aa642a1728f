//! Tile Service: from viewer tile address to cached JPEG bytes.
//!
//! ```text
//!   get_tile(address)
//!     1. open slide         (registry, pooled)
//!     2. map tile           (zoom -> native level, bounds check)
//!     3. cache lookup       (hit: return stored bytes)
//!     4. render             (read_region -> RGB -> JPEG), once per key
//!     5. cache store        (atomic publish)
//! ```
//!
//! Mapping runs before the cache lookup, so zoom and bounds errors do not
//! depend on what happens to be cached.
//!
//! Each slide id carries a generation that [`TileService::invalidate_slide`]
//! bumps. A render only publishes its tile if the generation it started under
//! is still current, so a render racing with an upload never leaves tiles of
//! the replaced file behind.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::TileError;
use crate::slide::{SlideHandle, SlideRegistry, SlideSource};
use crate::singleflight::Singleflight;

use super::cache::{TileCache, TileKey};
use super::encoder::JpegTileEncoder;
use super::mapper::{map_tile, TileAddress, TileRegion, TILE_SIZE};

/// Response from the tile service.
#[derive(Debug, Clone)]
pub struct TileResponse {
    /// The encoded JPEG tile data
    pub data: Bytes,

    /// Whether the bytes came from the tile cache
    pub cache_hit: bool,
}

/// Slide dimensions and pyramid geometry as reported to viewers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlideInfo {
    pub width: u32,
    pub height: u32,
    pub tile_size: u32,
    pub levels: usize,
    /// `[width, height]` per native level, full resolution first
    pub level_dimensions: Vec<(u32, u32)>,
}

/// Service for rendering and caching tiles.
///
/// # Type Parameters
///
/// * `S` - The slide source type (e.g., local slide directory)
pub struct TileService<S: SlideSource> {
    registry: Arc<SlideRegistry<S>>,
    cache: TileCache,
    encoder: JpegTileEncoder,
    renders: Singleflight<(TileKey, u64), Result<Bytes, TileError>>,
    /// Invalidation count per slide id; absent means 0
    generations: RwLock<HashMap<String, u64>>,
}

impl<S: SlideSource> TileService<S> {
    /// Service with the default encoder (quality 85).
    pub fn new(registry: SlideRegistry<S>, cache: TileCache) -> Self {
        Self {
            registry: Arc::new(registry),
            cache,
            encoder: JpegTileEncoder::default(),
            renders: Singleflight::new(),
            generations: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_encoder(mut self, encoder: JpegTileEncoder) -> Self {
        self.encoder = encoder;
        self
    }

    /// Get a tile, rendering and caching it on a miss.
    ///
    /// # Errors
    ///
    /// - `SlideNotFound` if the slide file does not exist
    /// - `InvalidZoom` / `OutOfBounds` if the address has no native pixels
    /// - `Slide` / `Encode` if the slide cannot be decoded or the tile encoded
    pub async fn get_tile(&self, address: &TileAddress) -> Result<TileResponse, TileError> {
        let generation = self.generation(&address.slide_id).await;
        let slide = self.open(&address.slide_id).await?;
        let region = map_tile(address, &slide.descriptor())?;

        if let Some(data) = self.cache.lookup(address).await {
            debug!(
                slide_id = %address.slide_id,
                zoom = address.zoom,
                x = address.x,
                y = address.y,
                "Tile cache hit"
            );
            return Ok(TileResponse {
                data,
                cache_hit: true,
            });
        }

        let data = self
            .renders
            .run(&(address.clone(), generation), || {
                self.render_and_store(&slide, address, region, generation)
            })
            .await?;

        Ok(TileResponse {
            data,
            cache_hit: false,
        })
    }

    async fn render_and_store(
        &self,
        slide: &SlideHandle<S::Reader>,
        address: &TileAddress,
        region: TileRegion,
        generation: u64,
    ) -> Result<Bytes, TileError> {
        debug!(
            slide_id = %address.slide_id,
            zoom = address.zoom,
            x = address.x,
            y = address.y,
            level = region.level,
            "Tile cache miss, rendering"
        );

        let pixels = slide
            .read_region(region.level, region.origin, region.size)
            .await?;
        let data = self.encoder.encode(&pixels)?;

        // Held across the store so an invalidation cannot slip in between.
        let generations = self.generations.read().await;
        let current = generations.get(&address.slide_id).copied().unwrap_or(0);
        if current != generation {
            debug!(
                slide_id = %address.slide_id,
                "Slide invalidated during render, tile not cached"
            );
            return Ok(data);
        }
        if let Err(e) = self.cache.store(address, &data).await {
            warn!(
                path = %self.cache.path_for(address).display(),
                error = %e,
                "Failed to store tile in cache"
            );
        }
        Ok(data)
    }

    /// Dimensions and level geometry of a slide.
    pub async fn slide_info(&self, slide_id: &str) -> Result<SlideInfo, TileError> {
        let descriptor = self.open(slide_id).await?.descriptor();
        let (width, height) = descriptor.dimensions();
        Ok(SlideInfo {
            width,
            height,
            tile_size: TILE_SIZE,
            levels: descriptor.level_count(),
            level_dimensions: descriptor.level_dimensions,
        })
    }

    /// Forget everything derived from a slide file: the pooled handle and the
    /// cached tiles. Must be called whenever the file is replaced.
    pub async fn invalidate_slide(&self, slide_id: &str) {
        *self
            .generations
            .write()
            .await
            .entry(slide_id.to_string())
            .or_insert(0) += 1;
        self.registry.invalidate(slide_id).await;
        if let Err(e) = self.cache.remove_slide(slide_id).await {
            warn!(slide_id, error = %e, "Failed to remove cached tiles");
        }
    }

    pub fn registry(&self) -> &Arc<SlideRegistry<S>> {
        &self.registry
    }

    pub fn cache(&self) -> &TileCache {
        &self.cache
    }

    async fn generation(&self, slide_id: &str) -> u64 {
        self.generations
            .read()
            .await
            .get(slide_id)
            .copied()
            .unwrap_or(0)
    }

    async fn open(&self, slide_id: &str) -> Result<Arc<SlideHandle<S::Reader>>, TileError> {
        self.registry.get_slide(slide_id).await.map_err(|e| {
            if e.is_not_found() {
                TileError::SlideNotFound {
                    slide_id: slide_id.to_string(),
                }
            } else {
                TileError::Slide(e)
            }
        })
    }
}
