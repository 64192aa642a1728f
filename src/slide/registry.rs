//! Pool of opened slides.
//!
//! Opening a slide means walking its IFD chain and loading every level's
//! tile tables, which is worth doing once per slide rather than once per
//! tile. The registry keeps a bounded LRU of opened handles and collapses
//! concurrent opens of the same slide into one.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use tokio::sync::Mutex;
use tracing::debug;

use super::handle::SlideHandle;
use super::source::SlideSource;
use crate::error::SlideError;
use crate::io::{BlockCache, RangeReader, DEFAULT_BLOCK_SIZE};
use crate::singleflight::Singleflight;

/// Default number of opened slides kept in the pool.
pub const DEFAULT_SLIDE_CACHE_CAPACITY: usize = 64;

/// Default number of cached blocks per slide.
pub const DEFAULT_BLOCK_CACHE_CAPACITY: usize = 64;

type OpenResult<R> = Result<Arc<SlideHandle<R>>, SlideError>;

struct Pool<R: RangeReader + 'static> {
    handles: LruCache<String, Arc<SlideHandle<R>>>,
    /// Bumped by every invalidation of a slide id
    generations: HashMap<String, u64>,
}

impl<R: RangeReader + 'static> Pool<R> {
    fn generation(&self, slide_id: &str) -> u64 {
        self.generations.get(slide_id).copied().unwrap_or(0)
    }
}

/// Registry of opened slides with LRU eviction.
pub struct SlideRegistry<S: SlideSource> {
    source: S,
    pool: Mutex<Pool<S::Reader>>,
    opens: Singleflight<(String, u64), OpenResult<S::Reader>>,
    block_size: usize,
    block_cache_capacity: usize,
}

impl<S: SlideSource> SlideRegistry<S> {
    /// Registry with default pool, block size and block cache capacity.
    pub fn new(source: S) -> Self {
        Self::with_capacity(
            source,
            DEFAULT_SLIDE_CACHE_CAPACITY,
            DEFAULT_BLOCK_SIZE,
            DEFAULT_BLOCK_CACHE_CAPACITY,
        )
    }

    /// # Arguments
    /// * `slide_cache_capacity` - Maximum number of opened slides kept
    /// * `block_size` - Block size of each slide's block cache (bytes)
    /// * `block_cache_capacity` - Number of blocks cached per slide
    pub fn with_capacity(
        source: S,
        slide_cache_capacity: usize,
        block_size: usize,
        block_cache_capacity: usize,
    ) -> Self {
        Self {
            source,
            pool: Mutex::new(Pool {
                handles: LruCache::new(
                    NonZeroUsize::new(slide_cache_capacity).unwrap_or(NonZeroUsize::MIN),
                ),
                generations: HashMap::new(),
            }),
            opens: Singleflight::new(),
            block_size,
            block_cache_capacity,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Get an opened slide, opening it on first access.
    pub async fn get_slide(&self, slide_id: &str) -> OpenResult<S::Reader> {
        let generation = {
            let mut pool = self.pool.lock().await;
            if let Some(slide) = pool.handles.get(slide_id) {
                return Ok(Arc::clone(slide));
            }
            pool.generation(slide_id)
        };

        let key = (slide_id.to_string(), generation);
        self.opens
            .run(&key, || async {
                if let Some(slide) = self.pool.lock().await.handles.get(slide_id) {
                    return Ok(Arc::clone(slide));
                }
                let slide = Arc::new(self.open_slide(slide_id).await?);
                let mut pool = self.pool.lock().await;
                // Invalidated while opening: serve the handle, do not pool it.
                if pool.generation(slide_id) == generation {
                    pool.handles.put(slide_id.to_string(), Arc::clone(&slide));
                }
                Ok::<_, SlideError>(slide)
            })
            .await
    }

    async fn open_slide(&self, slide_id: &str) -> Result<SlideHandle<S::Reader>, SlideError> {
        let reader = self.source.create_reader(slide_id).await?;
        let cached = BlockCache::with_capacity(reader, self.block_size, self.block_cache_capacity);
        let slide = SlideHandle::open(cached).await?;
        debug!(
            slide_id = slide_id,
            levels = slide.level_count(),
            dimensions = ?slide.dimensions(),
            "Opened slide"
        );
        Ok(slide)
    }

    /// Drop a pooled slide so the next access reopens it.
    ///
    /// Requests already holding the old handle keep using it, and opens in
    /// progress are not pooled.
    pub async fn invalidate(&self, slide_id: &str) {
        let mut pool = self.pool.lock().await;
        *pool.generations.entry(slide_id.to_string()).or_insert(0) += 1;
        if pool.handles.pop(slide_id).is_some() {
            debug!(slide_id = slide_id, "Evicted slide from pool");
        }
    }

    /// Number of slides currently pooled.
    pub async fn cached_count(&self) -> usize {
        self.pool.lock().await.handles.len()
    }
}
