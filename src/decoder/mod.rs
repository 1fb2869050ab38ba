//! Region decoding.
//!
//! This module defines the decoding capability the tiling core consumes and
//! the [`TileDecoder`] that owns one opened decoder per image.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │           create_tile_decoder           │
//! │  select factory → check → open → check  │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │               TileDecoder               │
//! │  (serializes decodes, closes once)      │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │          RegionDecoder Trait            │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//!          ┌───────────────────────┐
//!          │  ImageRegionDecoder   │
//!          │ (`image` crate, JPEG, │
//!          │  PNG)                 │
//!          └───────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`RegionDecoderFactory`]: Accepts an image and creates decoders for it
//! - [`RegionDecoder`]: Decodes a rectangle at a power-of-two sample size
//! - [`TileImage`]: Opaque decoded pixels with explicit recycling
//! - [`TileDecoder`]: Owns one region decoder, runs decodes off the main thread
//! - [`create_tile_decoder`]: Builds a ready [`TileDecoder`]

mod image_decoder;
mod region;
mod tile_decoder;
mod tile_image;

pub use image_decoder::{ImageRegionDecoder, ImageRegionDecoderFactory};
pub use region::{RegionDecoder, RegionDecoderFactory};
pub use tile_decoder::{create_tile_decoder, select_region_decoder_factory, TileDecoder};
pub use tile_image::{RgbaTileImage, TileImage, TileImageRef};
