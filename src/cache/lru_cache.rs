//! LRU cache for decoded tile images.
//!
//! # Size-Based Eviction
//!
//! The cache tracks the total byte count of cached tiles and evicts
//! least-recently-used entries when the capacity is exceeded. Evicted images
//! are dropped, not recycled: a tile manager may still be displaying them.

use std::num::NonZeroUsize;
use std::sync::{Mutex, PoisonError};

use lru::LruCache;

use crate::decoder::TileImageRef;
use crate::source::ImageInfo;

use super::TileImageCache;

/// Default cache capacity: 256MB
pub const DEFAULT_TILE_IMAGE_CACHE_CAPACITY: usize = 256 * 1024 * 1024;

/// Default maximum number of entries (to bound LRU overhead)
const DEFAULT_MAX_ENTRIES: usize = 4096;

struct Inner {
    cache: LruCache<String, TileImageRef>,
    current_size: usize,
}

/// LRU [`TileImageCache`] with a byte-size capacity.
///
/// # Thread Safety
///
/// The cache is thread-safe and can be shared across images via `Arc`.
pub struct LruTileImageCache {
    inner: Mutex<Inner>,
    max_size: usize,
}

impl LruTileImageCache {
    /// Create a new cache with default capacity (256MB).
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TILE_IMAGE_CACHE_CAPACITY)
    }

    /// Create a new cache with the specified capacity in bytes.
    pub fn with_capacity(max_size: usize) -> Self {
        Self::with_capacity_and_entries(max_size, DEFAULT_MAX_ENTRIES)
    }

    /// Create a new cache with specified capacity and maximum entries.
    ///
    /// A `max_entries` of zero is treated as one.
    pub fn with_capacity_and_entries(max_size: usize, max_entries: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                cache: LruCache::new(NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN)),
                current_size: 0,
            }),
            max_size,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Check if a tile is cached without updating LRU order.
    pub fn contains(&self, key: &str) -> bool {
        self.lock().cache.contains(key)
    }

    pub fn remove(&self, key: &str) -> Option<TileImageRef> {
        let mut inner = self.lock();
        let image = inner.cache.pop(key)?;
        inner.current_size = inner.current_size.saturating_sub(image.byte_count());
        Some(image)
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.cache.clear();
        inner.current_size = 0;
    }

    pub fn len(&self) -> usize {
        self.lock().cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().cache.is_empty()
    }

    /// Current total byte count of cached tiles.
    pub fn size(&self) -> usize {
        self.lock().current_size
    }

    /// Maximum capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.max_size
    }
}

impl Default for LruTileImageCache {
    fn default() -> Self {
        Self::new()
    }
}

impl TileImageCache for LruTileImageCache {
    fn get(&self, key: &str) -> Option<TileImageRef> {
        let mut inner = self.lock();
        let image = inner.cache.get(key)?.clone();
        if image.is_recycled() {
            // Recycled behind our back; treat as a miss.
            inner.cache.pop(key);
            inner.current_size = inner.current_size.saturating_sub(image.byte_count());
            return None;
        }
        Some(image)
    }

    fn put(
        &self,
        key: &str,
        tile_image: TileImageRef,
        _image_url: &str,
        _image_info: &ImageInfo,
    ) -> Option<TileImageRef> {
        let image_size = tile_image.byte_count();
        if image_size > self.max_size {
            return None;
        }

        let mut inner = self.lock();

        // Replacing an existing entry: subtract its size first
        if let Some(old) = inner.cache.peek(key) {
            let old_size = old.byte_count();
            inner.current_size = inner.current_size.saturating_sub(old_size);
        }

        // An entry pushed out by the entry-count bound still needs accounting
        if let Some((evicted_key, evicted)) = inner.cache.push(key.to_string(), tile_image.clone())
        {
            if evicted_key != key {
                inner.current_size = inner.current_size.saturating_sub(evicted.byte_count());
            }
        }
        inner.current_size += image_size;

        while inner.current_size > self.max_size {
            match inner.cache.pop_lru() {
                Some((_, evicted)) => {
                    inner.current_size = inner.current_size.saturating_sub(evicted.byte_count());
                }
                None => break,
            }
        }

        Some(tile_image)
    }
}

// =============================================================================
// Tests
// =============================================================================
