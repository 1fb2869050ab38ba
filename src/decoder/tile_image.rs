use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use image::RgbaImage;

/// Decoded pixels of one tile.
///
/// Handles are shared as [`TileImageRef`]. Once [`TileImage::recycle`] is
/// called the pixels are gone and the handle only keeps its dimensions.
pub trait TileImage: Send + Sync + fmt::Debug {
    fn width(&self) -> i32;

    fn height(&self) -> i32;

    /// Memory held by the pixels, used for cache accounting.
    fn byte_count(&self) -> usize;

    fn is_recycled(&self) -> bool;

    /// Release the pixels. Idempotent.
    fn recycle(&self);
}

pub type TileImageRef = Arc<dyn TileImage>;

/// A [`TileImage`] backed by an 8-bit RGBA buffer.
pub struct RgbaTileImage {
    width: i32,
    height: i32,
    byte_count: usize,
    pixels: Mutex<Option<RgbaImage>>,
}

impl RgbaTileImage {
    pub fn new(pixels: RgbaImage) -> Self {
        Self {
            width: pixels.width() as i32,
            height: pixels.height() as i32,
            byte_count: pixels.as_raw().len(),
            pixels: Mutex::new(Some(pixels)),
        }
    }

    /// Run `f` against the pixels, or return `None` if they were recycled.
    pub fn with_pixels<R>(&self, f: impl FnOnce(&RgbaImage) -> R) -> Option<R> {
        let pixels = self.pixels.lock().unwrap_or_else(PoisonError::into_inner);
        pixels.as_ref().map(f)
    }
}

impl TileImage for RgbaTileImage {
    fn width(&self) -> i32 {
        self.width
    }

    fn height(&self) -> i32 {
        self.height
    }

    fn byte_count(&self) -> usize {
        self.byte_count
    }

    fn is_recycled(&self) -> bool {
        self.pixels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    fn recycle(&self) {
        self.pixels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

impl fmt::Debug for RgbaTileImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RgbaTileImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("byte_count", &self.byte_count)
            .field("recycled", &self.is_recycled())
            .finish()
    }
}
