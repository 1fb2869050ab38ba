//! Region decoder built on the `image` crate.
//!
//! The format is sniffed from the file signature in `prepare()`, which only
//! reads the header. The first region decode loads the full image once and
//! later decodes crop from it. A large image is therefore fully decoded and
//! held in memory for the decoder's lifetime: a 12000x12000 RGBA image
//! costs about 550 MiB until the decoder is closed.
//!
//! Decoding runs with the factory's [`Limits`], none by default. `image`'s
//! own default caps allocations at 512 MiB.
//!
//! Platform decoders that can decode regions natively plug in through
//! [`RegionDecoderFactory`].

use std::io::Cursor;
use std::sync::Arc;

use bytes::Bytes;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader, Limits};
use tracing::debug;

use crate::error::DecodeError;
use crate::geometry::{IntRect, IntSize};
use crate::source::{ImageInfo, SubsamplingImage};

use super::{RegionDecoder, RegionDecoderFactory, RgbaTileImage, TileImageRef};

/// Factory for [`ImageRegionDecoder`]. Accepts every image.
#[derive(Debug, Clone)]
pub struct ImageRegionDecoderFactory {
    limits: Limits,
}

impl ImageRegionDecoderFactory {
    /// A factory whose decoders run without allocation or dimension limits.
    pub fn new() -> Self {
        Self::with_limits(Limits::no_limits())
    }

    pub fn with_limits(limits: Limits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }
}

impl Default for ImageRegionDecoderFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl RegionDecoderFactory for ImageRegionDecoderFactory {
    fn accept(&self, _image: &SubsamplingImage) -> bool {
        true
    }

    fn check_support(&self, mime_type: &str) -> Option<bool> {
        ImageFormat::from_mime_type(mime_type).map(|format| format.reading_enabled())
    }

    fn create(
        &self,
        image: &SubsamplingImage,
        data: Bytes,
    ) -> Result<Box<dyn RegionDecoder>, DecodeError> {
        Ok(Box::new(ImageRegionDecoder::with_limits(
            image.key(),
            data,
            self.limits.clone(),
        )))
    }
}

/// Region decoder over in-memory encoded data.
pub struct ImageRegionDecoder {
    key: String,
    data: Option<Bytes>,
    limits: Limits,
    format: Option<ImageFormat>,
    image_info: Option<ImageInfo>,
    decoded: Option<DynamicImage>,
}

impl ImageRegionDecoder {
    pub fn new(key: impl Into<String>, data: Bytes) -> Self {
        Self::with_limits(key, data, Limits::no_limits())
    }

    /// Decode the full image under `limits`.
    pub fn with_limits(key: impl Into<String>, data: Bytes, limits: Limits) -> Self {
        Self {
            key: key.into(),
            data: Some(data),
            limits,
            format: None,
            image_info: None,
            decoded: None,
        }
    }

    fn load_full_image(&mut self) -> Result<&DynamicImage, DecodeError> {
        if self.decoded.is_none() {
            let data = self.data.as_ref().ok_or(DecodeError::Closed)?;
            let format = self.format.ok_or_else(|| DecodeError::Decode {
                message: "decoder not prepared".to_string(),
            })?;
            debug!(key = %self.key, ?format, "Loading full image for region decoding");
            let mut reader = ImageReader::with_format(Cursor::new(data.as_ref()), format);
            reader.limits(self.limits.clone());
            self.decoded = Some(reader.decode()?);
        }
        self.decoded.as_ref().ok_or(DecodeError::Closed)
    }
}

impl RegionDecoder for ImageRegionDecoder {
    fn image_info(&self) -> Option<ImageInfo> {
        self.image_info.clone()
    }

    fn prepare(&mut self) -> Result<(), DecodeError> {
        let data = self.data.as_ref().ok_or(DecodeError::Closed)?;
        let reader = ImageReader::new(Cursor::new(data.as_ref()))
            .with_guessed_format()
            .map_err(|e| DecodeError::Decode {
                message: e.to_string(),
            })?;
        let format = reader
            .format()
            .ok_or_else(|| DecodeError::UnsupportedFormat {
                reason: format!("unrecognized file signature for {}", self.key),
            })?;
        let (width, height) = reader.into_dimensions()?;

        self.format = Some(format);
        self.image_info = Some(ImageInfo::new(
            IntSize::new(width as i32, height as i32),
            format.to_mime_type(),
        ));
        Ok(())
    }

    fn decode_region(
        &mut self,
        key: &str,
        src_rect: IntRect,
        sample_size: u32,
    ) -> Result<TileImageRef, DecodeError> {
        let full = self.load_full_image()?;
        let bounds = IntRect::new(0, 0, full.width() as i32, full.height() as i32);
        if src_rect.is_empty() || !bounds.contains(&src_rect) {
            return Err(DecodeError::Decode {
                message: format!("{} region {} outside image bounds {}", key, src_rect, bounds),
            });
        }

        let region = full.crop_imm(
            src_rect.left as u32,
            src_rect.top as u32,
            src_rect.width() as u32,
            src_rect.height() as u32,
        );
        let sample_size = sample_size.max(1);
        let region = if sample_size > 1 {
            let width = (src_rect.width() as u32).div_ceil(sample_size).max(1);
            let height = (src_rect.height() as u32).div_ceil(sample_size).max(1);
            region.resize_exact(width, height, FilterType::Triangle)
        } else {
            region
        };

        Ok(Arc::new(RgbaTileImage::new(region.to_rgba8())))
    }

    fn close(&mut self) {
        self.decoded = None;
        self.data = None;
    }
}
