use bytes::Bytes;

use crate::error::DecodeError;
use crate::geometry::IntRect;
use crate::source::{ImageInfo, SubsamplingImage};

use super::TileImageRef;

/// Decodes rectangular regions of one opened image.
///
/// Implementations hold native or in-memory resources that are only
/// released by [`RegionDecoder::close`]. All methods are blocking and are
/// called from the I/O context, never concurrently.
pub trait RegionDecoder: Send {
    /// Size and mime type of the image. `None` until [`RegionDecoder::prepare`]
    /// succeeded.
    fn image_info(&self) -> Option<ImageInfo>;

    /// Read the image header. Called once, before any decode.
    fn prepare(&mut self) -> Result<(), DecodeError>;

    /// Decode `src_rect` (full-resolution image pixels) downsampled by
    /// `sample_size`.
    ///
    /// `key` is the tile cache key, useful for logging.
    fn decode_region(
        &mut self,
        key: &str,
        src_rect: IntRect,
        sample_size: u32,
    ) -> Result<TileImageRef, DecodeError>;

    /// Release every resource. Decodes after close fail with
    /// [`DecodeError::Closed`].
    fn close(&mut self);
}

/// Creates [`RegionDecoder`]s for the images it accepts.
pub trait RegionDecoderFactory: Send + Sync {
    /// Whether this factory handles `image`. Checked in order; the first
    /// accepting factory wins.
    fn accept(&self, image: &SubsamplingImage) -> bool;

    /// Whether `mime_type` can be region-decoded. `None` when unknown.
    fn check_support(&self, mime_type: &str) -> Option<bool>;

    /// Build an unprepared decoder over the opened image data.
    fn create(
        &self,
        image: &SubsamplingImage,
        data: Bytes,
    ) -> Result<Box<dyn RegionDecoder>, DecodeError>;
}
