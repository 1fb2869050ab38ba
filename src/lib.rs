//! # Subsampling
//!
//! Large-image subsampling for zoomable image viewers.
//!
//! A viewer first shows a downscaled thumbnail (the *content*). As the user
//! zooms in, this crate decides which resolution level of the original image
//! is needed, splits the visible part of the image into tiles and decodes
//! only those tiles, on a background runtime, at the matching power-of-two
//! sample size. Full-resolution pixels are never decoded all at once.
//!
//! ## Features
//!
//! - **Region decoding**: Pluggable [`decoder::RegionDecoder`]s, with a
//!   default built on the `image` crate (JPEG, PNG)
//! - **Tile pyramid**: One tile grid per sample size, with the previous level
//!   kept as a background while the next one loads
//! - **Tile cache**: Optional shared LRU cache of decoded tiles
//! - **Gesture aware**: Tile loading pauses during flings and gestures
//! - **Headless**: Inputs and outputs are `tokio::sync::watch` channels, so
//!   any UI (or none) can drive it
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`geometry`] - Integer and float sizes, offsets, rects, and the display transform
//! - [`source`] - Image sources and the [`SubsamplingImage`] handle
//! - [`decoder`] - Region decoder capability and the per-image [`TileDecoder`]
//! - [`cache`] - Tile image cache capability and LRU implementation
//! - [`tile`] - Tiling math, eligibility checks, and the [`TileManager`]
//! - [`engine`] - [`SubsamplingCore`] orchestration and input wiring
//! - [`config`] - CLI configuration for the probe binary
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use subsampling::{FileImageSource, IntSize, SubsamplingCore, SubsamplingImage, SubsamplingInputs};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let mut core = SubsamplingCore::new();
//!     let (_senders, inputs) =
//!         SubsamplingInputs::channel(IntSize::new(1080, 1920), IntSize::new(1080, 810));
//!     core.on_attached(inputs);
//!
//!     let image = SubsamplingImage::new(Arc::new(FileImageSource::new("photo.jpg")));
//!     core.set_image(Some(image));
//!     core.run_until(|core| core.is_ready()).await;
//!
//!     for tile in core.foreground_tiles() {
//!         println!("{} {:?}", tile.src_rect, tile.state);
//!     }
//! }
//! ```

pub mod cache;
pub mod config;
pub mod decoder;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod source;
pub mod tile;

#[cfg(test)]
mod test_utils;

// Re-export commonly used types
pub use cache::{LruTileImageCache, TileImageCache, TileImageCacheHelper};
pub use config::{OutputFormat, ProbeConfig};
pub use decoder::{
    create_tile_decoder, ImageRegionDecoder, ImageRegionDecoderFactory, RegionDecoder,
    RegionDecoderFactory, RgbaTileImage, TileDecoder, TileImage, TileImageRef,
};
pub use engine::{
    InputSenders, LifecycleState, MainThread, ReadyState, SubsamplingCore, SubsamplingInputs,
    TilesState,
};
pub use error::{CreateTileDecoderError, DecodeError, EligibilityError, IoError};
pub use geometry::{content_visible_rect, IntOffset, IntRect, IntSize, Transform};
pub use source::{
    BytesImageSource, FileImageSource, ImageInfo, ImageSource, ImageSourceFactory,
    SubsamplingImage,
};
pub use tile::{
    ContinuousTransformType, TileAnimationSpec, TileManager, TileSnapshot, TileState,
};
