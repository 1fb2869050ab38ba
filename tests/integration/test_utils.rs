//! Test utilities for integration tests.
//!
//! This module provides counting region decoders, a counting tile cache,
//! generated PNG fixtures, and helpers for driving a `SubsamplingCore`.

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};

use subsampling::cache::{LruTileImageCache, TileImageCache};
use subsampling::decoder::{
    ImageRegionDecoderFactory, RegionDecoder, RegionDecoderFactory, RgbaTileImage, TileImageRef,
};
use subsampling::engine::{InputSenders, SubsamplingCore, SubsamplingInputs};
use subsampling::error::DecodeError;
use subsampling::geometry::{IntRect, IntSize, Offset, ScaleFactor, Transform};
use subsampling::source::{BytesImageSource, ImageInfo, SubsamplingImage};

// =============================================================================
// PNG Fixtures
// =============================================================================

/// Encode a `width` x `height` PNG with a position-dependent gradient.
pub fn create_png(width: u32, height: u32) -> Bytes {
    let image = RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8, 255])
    });
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(image)
        .write_to(&mut out, ImageFormat::Png)
        .expect("PNG encoding should not fail");
    Bytes::from(out.into_inner())
}

/// An in-memory PNG image keyed `key`.
pub fn png_image(key: &str, width: u32, height: u32) -> SubsamplingImage {
    SubsamplingImage::new(Arc::new(BytesImageSource::new(key, create_png(width, height))))
}

/// An in-memory image whose bytes are never decoded for real.
pub fn virtual_image(key: &str) -> SubsamplingImage {
    SubsamplingImage::new(Arc::new(BytesImageSource::new(key, vec![0u8; 8])))
}

// =============================================================================
// Counting Region Decoders
// =============================================================================

/// Call counters shared by a factory and every decoder it creates.
#[derive(Debug, Default)]
pub struct DecoderCounters {
    created: AtomicUsize,
    decodes: AtomicUsize,
    closed: AtomicUsize,
}

impl DecoderCounters {
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn decodes(&self) -> usize {
        self.decodes.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Wraps a decoder and counts decodes and closes.
struct CountingDecoder {
    inner: Box<dyn RegionDecoder>,
    counters: Arc<DecoderCounters>,
    closed: bool,
}

impl RegionDecoder for CountingDecoder {
    fn image_info(&self) -> Option<ImageInfo> {
        self.inner.image_info()
    }

    fn prepare(&mut self) -> Result<(), DecodeError> {
        self.inner.prepare()
    }

    fn decode_region(
        &mut self,
        key: &str,
        src_rect: IntRect,
        sample_size: u32,
    ) -> Result<TileImageRef, DecodeError> {
        self.counters.decodes.fetch_add(1, Ordering::SeqCst);
        self.inner.decode_region(key, src_rect, sample_size)
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.counters.closed.fetch_add(1, Ordering::SeqCst);
        }
        self.inner.close();
    }
}

/// The default `image`-crate decoder, with call counting.
#[derive(Debug, Default)]
pub struct CountingImageDecoderFactory {
    pub counters: Arc<DecoderCounters>,
}

impl RegionDecoderFactory for CountingImageDecoderFactory {
    fn accept(&self, image: &SubsamplingImage) -> bool {
        ImageRegionDecoderFactory::new().accept(image)
    }

    fn check_support(&self, mime_type: &str) -> Option<bool> {
        ImageRegionDecoderFactory::new().check_support(mime_type)
    }

    fn create(
        &self,
        image: &SubsamplingImage,
        data: Bytes,
    ) -> Result<Box<dyn RegionDecoder>, DecodeError> {
        self.counters.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(CountingDecoder {
            inner: ImageRegionDecoderFactory::new().create(image, data)?,
            counters: Arc::clone(&self.counters),
            closed: false,
        }))
    }
}

/// Pretends every image has a fixed size and decodes blank tiles.
struct BlankDecoder {
    image_info: ImageInfo,
}

impl RegionDecoder for BlankDecoder {
    fn image_info(&self) -> Option<ImageInfo> {
        Some(self.image_info.clone())
    }

    fn prepare(&mut self) -> Result<(), DecodeError> {
        Ok(())
    }

    fn decode_region(
        &mut self,
        _key: &str,
        src_rect: IntRect,
        sample_size: u32,
    ) -> Result<TileImageRef, DecodeError> {
        let width = (src_rect.width() as u32).div_ceil(sample_size);
        let height = (src_rect.height() as u32).div_ceil(sample_size);
        Ok(Arc::new(RgbaTileImage::new(RgbaImage::new(width, height))))
    }

    fn close(&mut self) {}
}

/// Factory for very large virtual images that never touch real pixels.
#[derive(Debug)]
pub struct VirtualDecoderFactory {
    pub image_info: ImageInfo,
    pub counters: Arc<DecoderCounters>,
}

impl VirtualDecoderFactory {
    pub fn new(image_size: IntSize) -> Self {
        Self {
            image_info: ImageInfo::new(image_size, "image/jpeg"),
            counters: Arc::new(DecoderCounters::default()),
        }
    }
}

impl RegionDecoderFactory for VirtualDecoderFactory {
    fn accept(&self, _image: &SubsamplingImage) -> bool {
        true
    }

    fn check_support(&self, _mime_type: &str) -> Option<bool> {
        Some(true)
    }

    fn create(
        &self,
        _image: &SubsamplingImage,
        _data: Bytes,
    ) -> Result<Box<dyn RegionDecoder>, DecodeError> {
        self.counters.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(CountingDecoder {
            inner: Box::new(BlankDecoder {
                image_info: self.image_info.clone(),
            }),
            counters: Arc::clone(&self.counters),
            closed: false,
        }))
    }
}

// =============================================================================
// Counting Cache
// =============================================================================

/// An LRU tile cache that counts lookups, hits and stores.
pub struct CountingCache {
    inner: LruTileImageCache,
    gets: AtomicUsize,
    hits: AtomicUsize,
    puts: AtomicUsize,
}

impl CountingCache {
    pub fn new() -> Self {
        Self {
            inner: LruTileImageCache::new(),
            gets: AtomicUsize::new(0),
            hits: AtomicUsize::new(0),
            puts: AtomicUsize::new(0),
        }
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

impl TileImageCache for CountingCache {
    fn get(&self, key: &str) -> Option<TileImageRef> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        let hit = self.inner.get(key);
        if hit.is_some() {
            self.hits.fetch_add(1, Ordering::SeqCst);
        }
        hit
    }

    fn put(
        &self,
        key: &str,
        tile_image: TileImageRef,
        image_url: &str,
        image_info: &ImageInfo,
    ) -> Option<TileImageRef> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.inner.put(key, tile_image, image_url, image_info)
    }
}

// =============================================================================
// Driving Helpers
// =============================================================================

/// Attach `core` to fresh inputs and return their senders.
pub fn attach(core: &mut SubsamplingCore, container: IntSize, content: IntSize) -> InputSenders {
    let (senders, inputs) = SubsamplingInputs::channel(container, content);
    core.on_attached(inputs);
    senders
}

/// Tick `core` until `done` holds, failing the test after five seconds.
pub async fn until(core: &mut SubsamplingCore, done: impl FnMut(&SubsamplingCore) -> bool) {
    tokio::time::timeout(Duration::from_secs(5), core.run_until(done))
        .await
        .expect("condition not reached in time");
}

/// Tick until the foreground tiles exist and none is still loading.
pub async fn until_settled(core: &mut SubsamplingCore) {
    until(core, |core| core.tiles_state().is_settled()).await;
}

/// A pure zoom around the content origin.
pub fn zoom(scale: f32) -> Transform {
    Transform::new(ScaleFactor::uniform(scale), Offset::ZERO, 0)
}

/// A zoom panned by `(x, y)` container pixels.
pub fn zoom_at(scale: f32, x: f32, y: f32) -> Transform {
    Transform::new(ScaleFactor::uniform(scale), Offset::new(x, y), 0)
}
