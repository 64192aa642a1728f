//! On-disk cache of encoded tiles.
//!
//! Tiles live at `{root}/{slide_id}/{zoom}/{x}_{y}.jpeg`. Files are written
//! to a unique temporary sibling and renamed into place, so a reader sees
//! either nothing or a complete JPEG.
//!
//! The cache is unbounded unless opened with a byte budget. With a budget, an
//! in-memory LRU index of tile sizes is seeded from the files already on disk
//! (oldest modification time first) and the least recently used tiles are
//! deleted whenever the budget is exceeded.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use bytes::Bytes;
use lru::LruCache;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::mapper::TileAddress;
use crate::slide::is_plain_file_name;

/// Cached tiles are addressed exactly like requested tiles.
pub type TileKey = TileAddress;

const TILE_EXTENSION: &str = "jpeg";

struct SizeIndex {
    entries: LruCache<TileKey, u64>,
    total_bytes: u64,
    max_bytes: u64,
}

impl SizeIndex {
    fn new(max_bytes: u64) -> Self {
        Self {
            entries: LruCache::unbounded(),
            total_bytes: 0,
            max_bytes,
        }
    }

    fn insert(&mut self, key: TileKey, size: u64) {
        if let Some(old) = self.entries.put(key, size) {
            self.total_bytes -= old;
        }
        self.total_bytes += size;
    }

    fn remove(&mut self, key: &TileKey) {
        if let Some(size) = self.entries.pop(key) {
            self.total_bytes -= size;
        }
    }

    /// Pop least recently used entries until the total fits the budget.
    fn evict(&mut self) -> Vec<TileKey> {
        let mut victims = Vec::new();
        while self.total_bytes > self.max_bytes {
            match self.entries.pop_lru() {
                Some((key, size)) => {
                    self.total_bytes -= size;
                    victims.push(key);
                }
                None => break,
            }
        }
        victims
    }
}

/// Content-addressed tile store on the local filesystem.
pub struct TileCache {
    root: PathBuf,
    index: Option<Mutex<SizeIndex>>,
    temp_counter: AtomicU64,
}

impl TileCache {
    /// Unbounded cache rooted at `root`. Directories are created on first store.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            index: None,
            temp_counter: AtomicU64::new(0),
        }
    }

    /// Open the cache at `root`, creating the directory.
    ///
    /// With `max_bytes` set, the existing tree is scanned to seed the
    /// eviction index, and tiles beyond the budget are removed right away.
    pub async fn open(root: impl Into<PathBuf>, max_bytes: Option<u64>) -> io::Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;

        let Some(max_bytes) = max_bytes else {
            return Ok(Self::new(root));
        };

        let scan_root = root.clone();
        let existing = tokio::task::spawn_blocking(move || scan_tiles(&scan_root))
            .await
            .map_err(io::Error::other)??;

        let mut index = SizeIndex::new(max_bytes);
        let count = existing.len();
        for (key, size) in existing {
            index.insert(key, size);
        }
        info!(
            dir = %root.display(),
            tiles = count,
            bytes = index.total_bytes,
            max_bytes,
            "Tile cache index seeded"
        );

        let victims = index.evict();
        let cache = Self {
            root,
            index: Some(Mutex::new(index)),
            temp_counter: AtomicU64::new(0),
        };
        cache.delete_tiles(victims).await;
        Ok(cache)
    }

    /// Number of tile files published so far.
    #[cfg(test)]
    pub(crate) fn writes(&self) -> u64 {
        self.temp_counter.load(Ordering::Relaxed)
    }

    /// Bytes currently tracked by the eviction index, `None` when unbounded.
    pub async fn tracked_bytes(&self) -> Option<u64> {
        match &self.index {
            Some(index) => Some(index.lock().await.total_bytes),
            None => None,
        }
    }

    /// File path of a cached tile.
    pub fn path_for(&self, key: &TileKey) -> PathBuf {
        self.root
            .join(&key.slide_id)
            .join(key.zoom.to_string())
            .join(format!("{}_{}.{}", key.x, key.y, TILE_EXTENSION))
    }

    /// Cached bytes for `key`, if present.
    ///
    /// Read failures other than a missing file are logged and reported as a
    /// miss.
    pub async fn lookup(&self, key: &TileKey) -> Option<Bytes> {
        let path = self.path_for(key);
        match tokio::fs::read(&path).await {
            Ok(data) => {
                if let Some(index) = &self.index {
                    let mut index = index.lock().await;
                    if index.entries.get(key).is_none() {
                        index.insert(key.clone(), data.len() as u64);
                    }
                }
                Some(Bytes::from(data))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                if let Some(index) = &self.index {
                    index.lock().await.remove(key);
                }
                None
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Tile cache read failed");
                None
            }
        }
    }

    /// Publish `data` for `key`, replacing any previous file.
    pub async fn store(&self, key: &TileKey, data: &[u8]) -> io::Result<()> {
        let path = self.path_for(key);
        let dir = path
            .parent()
            .ok_or_else(|| io::Error::other("tile path has no parent"))?;
        tokio::fs::create_dir_all(dir).await?;

        let temp = dir.join(format!(
            ".{}_{}.{}.{}.tmp",
            key.x,
            key.y,
            std::process::id(),
            self.temp_counter.fetch_add(1, Ordering::Relaxed)
        ));
        let written = match tokio::fs::write(&temp, data).await {
            Ok(()) => tokio::fs::rename(&temp, &path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e);
        }

        if let Some(index) = &self.index {
            let victims = {
                let mut index = index.lock().await;
                index.insert(key.clone(), data.len() as u64);
                index.evict()
            };
            self.delete_tiles(victims).await;
        }
        Ok(())
    }

    /// Delete every cached tile of `slide_id`.
    pub async fn remove_slide(&self, slide_id: &str) -> io::Result<()> {
        if !is_plain_file_name(slide_id) {
            return Ok(());
        }

        if let Some(index) = &self.index {
            let mut index = index.lock().await;
            let keys: Vec<TileKey> = index
                .entries
                .iter()
                .filter(|(key, _)| key.slide_id == slide_id)
                .map(|(key, _)| key.clone())
                .collect();
            for key in &keys {
                index.remove(key);
            }
        }

        match tokio::fs::remove_dir_all(self.root.join(slide_id)).await {
            Ok(()) => {
                debug!(slide_id, "Removed cached tiles");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn delete_tiles(&self, keys: Vec<TileKey>) {
        for key in keys {
            let path = self.path_for(&key);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => debug!(path = %path.display(), "Evicted cached tile"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to evict cached tile"),
            }
        }
    }
}

/// Walk `{root}/{slide}/{zoom}/{x}_{y}.jpeg`, oldest modification first.
///
/// Leftover temporary files from interrupted writes are deleted.
fn scan_tiles(root: &Path) -> io::Result<Vec<(TileKey, u64)>> {
    let mut found: Vec<(SystemTime, TileKey, u64)> = Vec::new();

    for slide in std::fs::read_dir(root)? {
        let slide = slide?;
        if !slide.file_type()?.is_dir() {
            continue;
        }
        let slide_id = slide.file_name().to_string_lossy().into_owned();

        for zoom_dir in std::fs::read_dir(slide.path())? {
            let zoom_dir = zoom_dir?;
            let Some(zoom) = zoom_dir
                .file_name()
                .to_str()
                .and_then(|name| name.parse::<u32>().ok())
            else {
                continue;
            };

            for tile in std::fs::read_dir(zoom_dir.path())? {
                let tile = tile?;
                let name = tile.file_name().to_string_lossy().into_owned();
                if name.starts_with('.') && name.ends_with(".tmp") {
                    let _ = std::fs::remove_file(tile.path());
                    continue;
                }
                let Some((x, y)) = parse_tile_name(&name) else {
                    continue;
                };
                let meta = tile.metadata()?;
                let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
                found.push((
                    modified,
                    TileKey::new(slide_id.clone(), zoom, x, y),
                    meta.len(),
                ));
            }
        }
    }

    found.sort_by_key(|(modified, _, _)| *modified);
    Ok(found.into_iter().map(|(_, key, size)| (key, size)).collect())
}

fn parse_tile_name(name: &str) -> Option<(u32, u32)> {
    let stem = name.strip_suffix(TILE_EXTENSION)?.strip_suffix('.')?;
    let (x, y) = stem.split_once('_')?;
    Some((x.parse().ok()?, y.parse().ok()?))
}
