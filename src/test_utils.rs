//! Mocks shared by unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;

use crate::decoder::{RegionDecoder, RegionDecoderFactory, RgbaTileImage, TileImageRef};
use crate::error::DecodeError;
use crate::geometry::{IntRect, IntSize};
use crate::source::{BytesImageSource, ImageInfo, SubsamplingImage};

/// Counters shared between a [`MockFactory`] and the decoders it creates.
#[derive(Debug, Default)]
pub(crate) struct MockStats {
    pub created: AtomicUsize,
    pub decodes: AtomicUsize,
    pub closed: AtomicUsize,
    pub failing_rects: Mutex<Vec<IntRect>>,
}

impl MockStats {
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn decodes(&self) -> usize {
        self.decodes.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn fail_rect(&self, rect: IntRect) {
        self.failing_rects.lock().unwrap().push(rect);
    }
}

pub(crate) struct MockDecoder {
    image_info: ImageInfo,
    stats: Arc<MockStats>,
    closed: AtomicBool,
}

impl MockDecoder {
    pub fn new(image_info: ImageInfo, stats: Arc<MockStats>) -> Self {
        Self {
            image_info,
            stats,
            closed: AtomicBool::new(false),
        }
    }
}

impl RegionDecoder for MockDecoder {
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
        self.stats.decodes.fetch_add(1, Ordering::SeqCst);
        if self.stats.failing_rects.lock().unwrap().contains(&src_rect) {
            return Err(DecodeError::Decode {
                message: format!("corrupt region {}", src_rect),
            });
        }
        let width = (src_rect.width() as u32).div_ceil(sample_size);
        let height = (src_rect.height() as u32).div_ceil(sample_size);
        Ok(Arc::new(RgbaTileImage::new(image::RgbaImage::new(
            width, height,
        ))))
    }

    fn close(&mut self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.stats.closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Factory reporting a fixed image size for every image.
pub(crate) struct MockFactory {
    pub image_info: ImageInfo,
    pub stats: Arc<MockStats>,
}

impl MockFactory {
    pub fn new(image_size: IntSize) -> Self {
        Self {
            image_info: ImageInfo::new(image_size, "image/jpeg"),
            stats: Arc::new(MockStats::default()),
        }
    }
}

impl RegionDecoderFactory for MockFactory {
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
        self.stats.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockDecoder::new(
            self.image_info.clone(),
            Arc::clone(&self.stats),
        )))
    }
}

pub(crate) fn mock_image(key: &str) -> SubsamplingImage {
    SubsamplingImage::new(Arc::new(BytesImageSource::new(key, vec![0u8; 16])))
}
