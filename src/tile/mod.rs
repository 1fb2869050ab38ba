//! Tiling: the tile model, the tiling math and the per-image tile manager.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                 TileManager                  │
//! │  refresh_tiles(scale, visible rect, ...)     │
//! │  on_tile_decoded(result)                     │
//! │  ┌────────────────┐   ┌───────────────────┐  │
//! │  │ SamplingTiles  │   │ TileSnapshot      │  │
//! │  │ (one grid per  │──►│ foreground /      │  │
//! │  │  sample size)  │   │ background lists  │  │
//! │  └────────────────┘   └───────────────────┘  │
//! └──────────┬──────────────────────┬────────────┘
//!            │ cache hit            │ cache miss
//!            ▼                      ▼
//! ┌──────────────────────┐  ┌──────────────────────┐
//! │ TileImageCacheHelper │  │ TileDecoder (I/O)    │
//! └──────────────────────┘  └──────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`TileManager`]: Tile state machine for one image
//! - [`Tile`] / [`SamplingTiles`] / [`TileSnapshot`]: Tile model
//! - [`check_image_info`]: Gate deciding whether an image can be subsampled
//! - [`calculate_preferred_tile_size`] / [`check_new_preferred_tile_size`]:
//!   Tile size from the container, with hysteresis
//! - [`calculate_sample_size`] / [`calculate_tile_grid_map`]: Level selection
//!
//! # Example
//!
//! ```
//! use subsampling::geometry::IntSize;
//! use subsampling::tile::{calculate_preferred_tile_size, calculate_tile_grid_map};
//!
//! let tile_size = calculate_preferred_tile_size(IntSize::new(1000, 750));
//! let grid_map = calculate_tile_grid_map(IntSize::new(8000, 6000), tile_size);
//!
//! // Sample sizes 1, 2, 4 and 8
//! assert_eq!(grid_map.len(), 4);
//! assert_eq!(grid_map[&1].x, 16);
//! ```

mod calculate;
mod manager;
mod model;

pub use calculate::{
    calculate_preferred_tile_size, calculate_sample_size, calculate_tile_grid_map,
    check_image_info, check_new_preferred_tile_size, create_sampling_tiles,
    is_thumbnail_with_size, sample_size_beats_content, tile_cache_key, TileSizeHysteresis,
    THUMBNAIL_EPSILON_PIXELS,
};
pub use manager::{
    TileChanges, TileDecodeListener, TileDecodeResult, TileManager, DEFAULT_PREFETCH_TILES,
};
pub use model::{
    ContinuousTransformType, SamplingTiles, Tile, TileAnimationSpec, TileSnapshot, TileState,
};
