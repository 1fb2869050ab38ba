//! Image sources.
//!
//! An [`ImageSource`] opens the raw bytes of an image; an
//! [`ImageSourceFactory`] creates sources on demand and identifies the image
//! by key. The key is what tile cache keys and [`SubsamplingImage`] equality
//! are built from.
//!
//! ```text
//! ┌───────────────────────┐   create()   ┌─────────────────┐  open_source()  ┌───────┐
//! │  ImageSourceFactory   │ ───────────▶ │   ImageSource   │ ──────────────▶ │ Bytes │
//! └───────────────────────┘              └─────────────────┘                 └───────┘
//! ```
//!
//! Two implementations ship with the crate, each acting as its own factory:
//! [`FileImageSource`] for local files and [`BytesImageSource`] for data that
//! is already in memory. Image loader integrations supply their own.

mod file;
mod memory;
mod subsampling_image;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::IoError;

pub use file::FileImageSource;
pub use memory::BytesImageSource;
pub use subsampling_image::{ImageInfo, SubsamplingImage};

/// Opens the bytes of one image.
#[async_trait]
pub trait ImageSource: Send + Sync {
    /// Identity of the image, stable across opens.
    fn key(&self) -> &str;

    /// Read the complete encoded image.
    ///
    /// May involve disk or network I/O.
    async fn open_source(&self) -> Result<Bytes, IoError>;
}

/// Creates [`ImageSource`]s for one image.
#[async_trait]
pub trait ImageSourceFactory: Send + Sync {
    /// Identity of the image, equal to the key of every source it creates.
    fn key(&self) -> &str;

    async fn create(&self) -> Result<Arc<dyn ImageSource>, IoError>;
}
