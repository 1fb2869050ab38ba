use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::decoder::TileImageRef;
use crate::source::ImageInfo;

use super::TileImageCache;

/// Disable-aware front of the installed [`TileImageCache`].
///
/// Both the cache and the disabled flag can be swapped at any time; the
/// change applies to the next tile request.
#[derive(Default)]
pub struct TileImageCacheHelper {
    cache: RwLock<Option<Arc<dyn TileImageCache>>>,
    disabled: AtomicBool,
}

impl TileImageCacheHelper {
    pub fn new(cache: Option<Arc<dyn TileImageCache>>) -> Self {
        Self {
            cache: RwLock::new(cache),
            disabled: AtomicBool::new(false),
        }
    }

    pub fn tile_image_cache(&self) -> Option<Arc<dyn TileImageCache>> {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_tile_image_cache(&self, cache: Option<Arc<dyn TileImageCache>>) {
        *self.cache.write().unwrap_or_else(PoisonError::into_inner) = cache;
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::Acquire)
    }

    pub fn set_disabled(&self, disabled: bool) {
        self.disabled.store(disabled, Ordering::Release);
    }

    /// The cache to use right now, or `None` when disabled or absent.
    fn active(&self) -> Option<Arc<dyn TileImageCache>> {
        if self.is_disabled() {
            None
        } else {
            self.tile_image_cache()
        }
    }

    pub fn get(&self, key: &str) -> Option<TileImageRef> {
        self.active()?.get(key)
    }

    pub fn put(
        &self,
        key: &str,
        tile_image: TileImageRef,
        image_url: &str,
        image_info: &ImageInfo,
    ) -> Option<TileImageRef> {
        self.active()?.put(key, tile_image, image_url, image_info)
    }
}

impl std::fmt::Debug for TileImageCacheHelper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileImageCacheHelper")
            .field("has_cache", &self.tile_image_cache().is_some())
            .field("disabled", &self.is_disabled())
            .finish()
    }
}
