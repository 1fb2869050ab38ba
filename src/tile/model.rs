use std::time::{Duration, Instant};

use bitflags::bitflags;
use tokio::task::AbortHandle;

use crate::decoder::TileImageRef;
use crate::geometry::{IntOffset, IntRect};

// =============================================================================
// Continuous Transform Types
// =============================================================================

bitflags! {
    /// Kinds of transform that change continuously, frame after frame.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ContinuousTransformType: u32 {
        /// Animated scale change (double tap zoom, programmatic scale)
        const SCALE   = 0b0000_0001;
        /// Animated offset change
        const OFFSET  = 0b0000_0010;
        /// Animated move to a content point
        const LOCATE  = 0b0000_0100;
        /// A drag or pinch is in progress
        const GESTURE = 0b0000_1000;
        /// Inertial scrolling after a gesture
        const FLING   = 0b0001_0000;
    }
}

impl ContinuousTransformType {
    /// Types during which tile refreshes are skipped unless configured otherwise.
    pub const DEFAULT_PAUSED: ContinuousTransformType =
        ContinuousTransformType::GESTURE.union(ContinuousTransformType::FLING);
}

// =============================================================================
// Tile Animation
// =============================================================================

/// Fade-in of freshly decoded tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileAnimationSpec {
    pub duration: Duration,
    /// How often a renderer should repaint while a tile fades in.
    pub interval: Duration,
}

impl TileAnimationSpec {
    pub const DEFAULT: TileAnimationSpec = TileAnimationSpec {
        duration: Duration::from_millis(200),
        interval: Duration::from_millis(8),
    };

    /// No animation; tiles appear fully opaque.
    pub const NONE: TileAnimationSpec = TileAnimationSpec {
        duration: Duration::ZERO,
        interval: Duration::ZERO,
    };

    pub fn is_none(&self) -> bool {
        self.duration.is_zero()
    }

    /// Alpha in `0.0..=1.0` for a tile loaded `elapsed` ago.
    pub fn alpha(&self, elapsed: Duration) -> f32 {
        if self.duration.is_zero() {
            return 1.0;
        }
        (elapsed.as_secs_f32() / self.duration.as_secs_f32()).clamp(0.0, 1.0)
    }
}

impl Default for TileAnimationSpec {
    fn default() -> Self {
        Self::DEFAULT
    }
}

// =============================================================================
// Tile
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TileState {
    Waiting,
    Loading,
    Loaded,
    Error,
}

impl TileState {
    /// Loaded or failed; nothing more will happen without an eviction.
    pub fn is_settled(self) -> bool {
        matches!(self, TileState::Loaded | TileState::Error)
    }
}

/// One region of the image at one sample size.
///
/// Only the owning [`super::TileManager`] mutates a tile; the UI sees
/// [`TileSnapshot`]s.
#[derive(Debug)]
pub struct Tile {
    pub coordinate: IntOffset,
    pub src_rect: IntRect,
    pub sample_size: u32,
    state: TileState,
    tile_image: Option<TileImageRef>,
    /// The image is also held by the tile image cache and must not be recycled here.
    cached: bool,
    loaded_at: Option<Instant>,
    load_job: Option<AbortHandle>,
}

impl Tile {
    pub fn new(coordinate: IntOffset, src_rect: IntRect, sample_size: u32) -> Self {
        Self {
            coordinate,
            src_rect,
            sample_size,
            state: TileState::Waiting,
            tile_image: None,
            cached: false,
            loaded_at: None,
            load_job: None,
        }
    }

    pub fn state(&self) -> TileState {
        self.state
    }

    pub fn tile_image(&self) -> Option<&TileImageRef> {
        self.tile_image.as_ref()
    }

    /// Instant the decoded image arrived; `None` for cache hits.
    pub fn loaded_at(&self) -> Option<Instant> {
        self.loaded_at
    }

    pub(crate) fn set_loading(&mut self, load_job: AbortHandle) {
        self.state = TileState::Loading;
        self.load_job = Some(load_job);
    }

    pub(crate) fn set_loaded(&mut self, tile_image: TileImageRef, cached: bool, animate: bool) {
        self.load_job = None;
        self.tile_image = Some(tile_image);
        self.cached = cached;
        self.loaded_at = animate.then(Instant::now);
        self.state = TileState::Loaded;
    }

    pub(crate) fn set_error(&mut self) {
        self.load_job = None;
        self.state = TileState::Error;
    }

    /// Cancel any in-flight decode, release the image and go back to waiting.
    pub(crate) fn reset(&mut self) {
        if let Some(job) = self.load_job.take() {
            job.abort();
        }
        if let Some(image) = self.tile_image.take() {
            if !self.cached {
                image.recycle();
            }
        }
        self.cached = false;
        self.loaded_at = None;
        self.state = TileState::Waiting;
    }

    pub fn snapshot(&self) -> TileSnapshot {
        TileSnapshot {
            coordinate: self.coordinate,
            src_rect: self.src_rect,
            sample_size: self.sample_size,
            state: self.state,
            tile_image: self.tile_image.clone(),
            loaded_at: self.loaded_at,
        }
    }
}

impl Drop for Tile {
    fn drop(&mut self) {
        if let Some(job) = self.load_job.take() {
            job.abort();
        }
    }
}

/// An immutable view of a [`Tile`] for rendering.
#[derive(Debug, Clone)]
pub struct TileSnapshot {
    pub coordinate: IntOffset,
    pub src_rect: IntRect,
    pub sample_size: u32,
    pub state: TileState,
    pub tile_image: Option<TileImageRef>,
    pub loaded_at: Option<Instant>,
}

impl TileSnapshot {
    /// Fade-in alpha at `now` under `spec`.
    pub fn alpha(&self, spec: &TileAnimationSpec, now: Instant) -> f32 {
        match self.loaded_at {
            Some(loaded_at) => spec.alpha(now.saturating_duration_since(loaded_at)),
            None => 1.0,
        }
    }
}

// =============================================================================
// SamplingTiles
// =============================================================================

/// The full tile grid at one sample size, in row-major order.
#[derive(Debug)]
pub struct SamplingTiles {
    pub sample_size: u32,
    pub tiles: Vec<Tile>,
}

impl SamplingTiles {
    /// Grid extents `(columns, rows)`, from the last tile's coordinate.
    pub fn grid_size(&self) -> IntOffset {
        self.tiles
            .last()
            .map(|tile| IntOffset::new(tile.coordinate.x + 1, tile.coordinate.y + 1))
            .unwrap_or_default()
    }

    pub fn has_loaded_tile(&self) -> bool {
        self.tiles.iter().any(|tile| tile.state == TileState::Loaded)
    }

    pub(crate) fn reset_all(&mut self) {
        for tile in &mut self.tiles {
            tile.reset();
        }
    }

    /// Cancel decodes still running but keep loaded images.
    pub(crate) fn cancel_loading(&mut self) {
        for tile in &mut self.tiles {
            if tile.state == TileState::Loading {
                tile.reset();
            }
        }
    }
}
