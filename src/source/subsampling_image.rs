use std::fmt;
use std::sync::Arc;

use crate::geometry::IntSize;

use super::ImageSourceFactory;

/// The real, full-resolution size and format of a source image.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageInfo {
    pub size: IntSize,
    pub mime_type: String,
}

impl ImageInfo {
    pub fn new(size: IntSize, mime_type: impl Into<String>) -> Self {
        Self {
            size,
            mime_type: mime_type.into(),
        }
    }

    pub fn width(&self) -> i32 {
        self.size.width
    }

    pub fn height(&self) -> i32 {
        self.size.height
    }
}

impl fmt::Display for ImageInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ImageInfo({}, '{}')", self.size, self.mime_type)
    }
}

/// What to subsample: a source plus an optional externally known
/// [`ImageInfo`].
///
/// Two images are equal when their source keys and info hints are equal.
#[derive(Clone)]
pub struct SubsamplingImage {
    pub source: Arc<dyn ImageSourceFactory>,
    pub image_info: Option<ImageInfo>,
}

impl SubsamplingImage {
    pub fn new(source: Arc<dyn ImageSourceFactory>) -> Self {
        Self {
            source,
            image_info: None,
        }
    }

    pub fn with_image_info(source: Arc<dyn ImageSourceFactory>, image_info: ImageInfo) -> Self {
        Self {
            source,
            image_info: Some(image_info),
        }
    }

    pub fn key(&self) -> &str {
        self.source.key()
    }
}

impl PartialEq for SubsamplingImage {
    fn eq(&self, other: &Self) -> bool {
        self.source.key() == other.source.key() && self.image_info == other.image_info
    }
}

impl Eq for SubsamplingImage {}

impl fmt::Debug for SubsamplingImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubsamplingImage")
            .field("key", &self.source.key())
            .field("image_info", &self.image_info)
            .finish()
    }
}
