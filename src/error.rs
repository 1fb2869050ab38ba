use thiserror::Error;

use crate::geometry::IntSize;

/// I/O errors that can occur when opening an image source
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// Source does not exist
    #[error("Image source not found: {0}")]
    NotFound(String),

    /// Reading the source failed
    #[error("Failed to read image source {key}: {message}")]
    Read { key: String, message: String },
}

/// Reasons an image cannot be subsampled.
///
/// These are raised by the eligibility check before and after a region
/// decoder is opened. None of them are retried automatically.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EligibilityError {
    /// The full-resolution image size is empty
    #[error("Invalid image: image size {image_size} is empty")]
    InvalidImage { image_size: IntSize },

    /// The content size is empty or not smaller than the image
    #[error("Invalid content: content size {content_size} must be non-empty and smaller than image size {image_size}")]
    InvalidContent {
        content_size: IntSize,
        image_size: IntSize,
    },

    /// The content is not a thumbnail of the image
    #[error("Aspect ratio mismatch: content size {content_size} is not a thumbnail of image size {image_size}")]
    AspectRatioMismatch {
        content_size: IntSize,
        image_size: IntSize,
    },

    /// The region decoder cannot handle this mime type
    #[error("Unsupported format: {mime_type}")]
    UnsupportedFormat { mime_type: String },
}

/// Errors raised by region decoders and tile decodes
#[derive(Debug, Clone, Error)]
pub enum DecodeError {
    /// I/O error while opening the source
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// The decoder could not read the image data
    #[error("Decode error: {message}")]
    Decode { message: String },

    /// The image data is in a format no decoder understands
    #[error("Unsupported image format: {reason}")]
    UnsupportedFormat { reason: String },

    /// The decoder was already closed
    #[error("Region decoder is closed")]
    Closed,

    /// The decode was cancelled before it completed
    #[error("Decode cancelled")]
    Cancelled,
}

impl DecodeError {
    /// Whether this error represents cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DecodeError::Cancelled)
    }
}

impl From<image::ImageError> for DecodeError {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::Unsupported(e) => DecodeError::UnsupportedFormat {
                reason: e.to_string(),
            },
            other => DecodeError::Decode {
                message: other.to_string(),
            },
        }
    }
}

impl From<tokio::task::JoinError> for DecodeError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            DecodeError::Cancelled
        } else {
            DecodeError::Decode {
                message: format!("decode task panicked: {}", err),
            }
        }
    }
}

/// Errors from building a [`crate::decoder::TileDecoder`]
#[derive(Debug, Clone, Error)]
pub enum CreateTileDecoderError {
    /// The image failed the subsampling eligibility check
    #[error(transparent)]
    Eligibility(#[from] EligibilityError),

    /// Opening or preparing the region decoder failed
    #[error("Failed to open region decoder: {0}")]
    Decode(DecodeError),

    /// The build was superseded before it finished
    #[error("Tile decoder build cancelled")]
    Cancelled,
}

impl CreateTileDecoderError {
    /// Whether this error represents cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CreateTileDecoderError::Cancelled)
    }
}

impl From<DecodeError> for CreateTileDecoderError {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::Cancelled => CreateTileDecoderError::Cancelled,
            other => CreateTileDecoderError::Decode(other),
        }
    }
}
