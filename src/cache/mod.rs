//! Tile image caching.
//!
//! The tiling core never owns a cache. It talks to whatever
//! [`TileImageCache`] the host installs (often shared by every image on
//! screen) through a [`TileImageCacheHelper`], which applies the "cache
//! disabled" policy in one place.
//!
//! # Cache Key
//!
//! Tiles are cached by a string key built from:
//! - Image key (source identity)
//! - Source rect in full-resolution image pixels
//! - Sample size
//!
//! See [`crate::tile::tile_cache_key`].
//!
//! # Components
//!
//! - [`TileImageCache`]: Capability trait, get/put by key
//! - [`LruTileImageCache`]: In-memory LRU implementation with byte-size eviction
//! - [`TileImageCacheHelper`]: Disable-aware facade used by the tile manager

mod helper;
mod lru_cache;

pub use helper::TileImageCacheHelper;
pub use lru_cache::{LruTileImageCache, DEFAULT_TILE_IMAGE_CACHE_CAPACITY};

use crate::decoder::TileImageRef;
use crate::source::ImageInfo;

/// A key/value memory cache for decoded tiles.
///
/// May be shared by several images; `get` and `put` are independent point
/// operations.
pub trait TileImageCache: Send + Sync {
    fn get(&self, key: &str) -> Option<TileImageRef>;

    /// Store `tile_image`. Returns the handle callers should use from now
    /// on, or `None` if the cache declined to keep it.
    ///
    /// `image_url` and `image_info` describe the source image.
    fn put(
        &self,
        key: &str,
        tile_image: TileImageRef,
        image_url: &str,
        image_info: &ImageInfo,
    ) -> Option<TileImageRef>;
}
