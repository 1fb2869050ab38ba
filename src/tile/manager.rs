//! Tile state machine of one image.
//!
//! # Generations
//!
//! The tiles of the current sample size are the foreground. When the sample
//! size changes, the old foreground level is kept underneath as the
//! background (if it shows anything) until every new foreground tile has
//! settled, so a resolution change never blanks the screen.
//!
//! ```text
//!  Waiting ──cache hit──────────────────────► Loaded
//!     │                                          ▲
//!     └──cache miss──► Loading ──decoded─────────┘
//!                         │
//!                         └──failed──► Error
//!
//!  any state ──left the load rect / clean──► Waiting
//! ```
//!
//! Decodes run as tasks on the decoder's runtime. Their results come back
//! through the [`TileDecodeListener`] and are applied with
//! [`TileManager::on_tile_decoded`] on the main thread.

use std::collections::BTreeMap;
use std::ops::{BitOr, BitOrAssign};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::cache::TileImageCacheHelper;
use crate::decoder::{TileDecoder, TileImageRef};
use crate::engine::MainThread;
use crate::error::DecodeError;
use crate::geometry::{normalize_rotation, IntOffset, IntRect, IntSize, ScaleFactor};
use crate::source::ImageInfo;

use super::calculate::{
    calculate_sample_size, calculate_tile_grid_map, create_sampling_tiles,
    sample_size_beats_content, tile_cache_key,
};
use super::model::{
    ContinuousTransformType, SamplingTiles, Tile, TileAnimationSpec, TileSnapshot, TileState,
};

/// Tiles loaded beyond the visible area in each direction.
pub const DEFAULT_PREFETCH_TILES: i32 = 1;

static NEXT_MANAGER_ID: AtomicU64 = AtomicU64::new(1);

// =============================================================================
// Decode Results
// =============================================================================

/// Outcome of one tile decode, addressed to the manager that started it.
#[derive(Debug)]
pub struct TileDecodeResult {
    pub manager_id: u64,
    pub sample_size: u32,
    pub coordinate: IntOffset,
    pub key: String,
    pub result: Result<TileImageRef, DecodeError>,
}

/// Receives decode results off the main thread.
pub type TileDecodeListener = Arc<dyn Fn(TileDecodeResult) + Send + Sync>;

/// What a manager operation changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TileChanges {
    pub tiles: bool,
    pub sample_size: bool,
    pub image_load_rect: bool,
}

impl TileChanges {
    pub const NONE: TileChanges = TileChanges {
        tiles: false,
        sample_size: false,
        image_load_rect: false,
    };

    pub fn any(&self) -> bool {
        self.tiles || self.sample_size || self.image_load_rect
    }
}

impl BitOr for TileChanges {
    type Output = TileChanges;

    fn bitor(self, rhs: TileChanges) -> TileChanges {
        TileChanges {
            tiles: self.tiles || rhs.tiles,
            sample_size: self.sample_size || rhs.sample_size,
            image_load_rect: self.image_load_rect || rhs.image_load_rect,
        }
    }
}

impl BitOrAssign for TileChanges {
    fn bitor_assign(&mut self, rhs: TileChanges) {
        *self = *self | rhs;
    }
}

// =============================================================================
// TileManager
// =============================================================================

/// Decides which tiles to load, keep and evict for one image.
pub struct TileManager {
    id: u64,
    main_thread: MainThread,
    caller: String,
    tile_decoder: Arc<TileDecoder>,
    cache_helper: Arc<TileImageCacheHelper>,
    listener: TileDecodeListener,
    image_key: String,
    image_info: ImageInfo,
    content_size: IntSize,
    preferred_tile_size: IntSize,
    tile_grid_size_map: BTreeMap<u32, IntOffset>,
    /// Levels are built on first use.
    sampling_tiles: BTreeMap<u32, SamplingTiles>,
    /// Zero until the first refresh picks a level.
    sample_size: u32,
    background_sample_size: Option<u32>,
    image_load_rect: IntRect,
    foreground_tiles: Vec<TileSnapshot>,
    background_tiles: Vec<TileSnapshot>,
    paused_continuous_transform_types: ContinuousTransformType,
    disabled_background_tiles: bool,
    tile_animation_spec: TileAnimationSpec,
    prefetch_tiles: i32,
}

impl TileManager {
    /// # Panics
    ///
    /// Panics if `content_size` or `preferred_tile_size` is empty.
    pub fn new(
        caller: impl Into<String>,
        tile_decoder: Arc<TileDecoder>,
        content_size: IntSize,
        preferred_tile_size: IntSize,
        cache_helper: Arc<TileImageCacheHelper>,
        listener: TileDecodeListener,
    ) -> Self {
        assert!(
            !content_size.is_empty(),
            "InvalidArgument: content size {} is empty",
            content_size
        );
        let image_info = tile_decoder.image_info().clone();
        let image_key = tile_decoder.subsampling_image().key().to_string();
        let tile_grid_size_map = calculate_tile_grid_map(image_info.size, preferred_tile_size);

        let manager = Self {
            id: NEXT_MANAGER_ID.fetch_add(1, Ordering::Relaxed),
            main_thread: MainThread::current(),
            caller: caller.into(),
            tile_decoder,
            cache_helper,
            listener,
            image_key,
            image_info,
            content_size,
            preferred_tile_size,
            tile_grid_size_map,
            sampling_tiles: BTreeMap::new(),
            sample_size: 0,
            background_sample_size: None,
            image_load_rect: IntRect::ZERO,
            foreground_tiles: Vec::new(),
            background_tiles: Vec::new(),
            paused_continuous_transform_types: ContinuousTransformType::DEFAULT_PAUSED,
            disabled_background_tiles: false,
            tile_animation_spec: TileAnimationSpec::DEFAULT,
            prefetch_tiles: DEFAULT_PREFETCH_TILES,
        };
        debug!(
            caller = %manager.caller,
            key = %manager.image_key,
            image_size = %manager.image_info.size,
            content_size = %content_size,
            preferred_tile_size = %preferred_tile_size,
            levels = ?manager.tile_grid_size_map,
            "Tile manager created"
        );
        manager
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn tile_decoder(&self) -> &Arc<TileDecoder> {
        &self.tile_decoder
    }

    pub fn image_info(&self) -> &ImageInfo {
        &self.image_info
    }

    pub fn content_size(&self) -> IntSize {
        self.content_size
    }

    pub fn preferred_tile_size(&self) -> IntSize {
        self.preferred_tile_size
    }

    /// Sample size → grid extents `(columns, rows)` of every level.
    pub fn tile_grid_size_map(&self) -> &BTreeMap<u32, IntOffset> {
        &self.tile_grid_size_map
    }

    /// Current foreground sample size, zero while no level is active.
    pub fn sample_size(&self) -> u32 {
        self.sample_size
    }

    pub fn background_sample_size(&self) -> Option<u32> {
        self.background_sample_size
    }

    /// Region of the image, in full-resolution pixels, tiles are loaded for.
    pub fn image_load_rect(&self) -> IntRect {
        self.image_load_rect
    }

    pub fn foreground_tiles(&self) -> &[TileSnapshot] {
        &self.foreground_tiles
    }

    pub fn background_tiles(&self) -> &[TileSnapshot] {
        &self.background_tiles
    }

    pub fn sampling_tiles(&self, sample_size: u32) -> Option<&SamplingTiles> {
        self.sampling_tiles.get(&sample_size)
    }

    pub fn paused_continuous_transform_types(&self) -> ContinuousTransformType {
        self.paused_continuous_transform_types
    }

    pub fn set_paused_continuous_transform_types(&mut self, types: ContinuousTransformType) {
        self.main_thread
            .check("TileManager::set_paused_continuous_transform_types");
        self.paused_continuous_transform_types = types;
    }

    pub fn disabled_background_tiles(&self) -> bool {
        self.disabled_background_tiles
    }

    /// Turning background tiles off drops the current background at once.
    pub fn set_disabled_background_tiles(&mut self, disabled: bool) -> TileChanges {
        self.main_thread
            .check("TileManager::set_disabled_background_tiles");
        self.disabled_background_tiles = disabled;
        if disabled && self.background_sample_size.is_some() {
            self.discard_background();
            self.refresh_snapshots();
            return TileChanges {
                tiles: true,
                ..TileChanges::NONE
            };
        }
        TileChanges::NONE
    }

    pub fn tile_animation_spec(&self) -> TileAnimationSpec {
        self.tile_animation_spec
    }

    pub fn set_tile_animation_spec(&mut self, spec: TileAnimationSpec) {
        self.main_thread.check("TileManager::set_tile_animation_spec");
        self.tile_animation_spec = spec;
    }

    pub fn set_prefetch_tiles(&mut self, tiles: i32) {
        self.main_thread.check("TileManager::set_prefetch_tiles");
        self.prefetch_tiles = tiles.max(0);
    }

    fn has_tiles(&self) -> bool {
        !self.foreground_tiles.is_empty() || !self.background_tiles.is_empty()
    }

    // =========================================================================
    // Refresh
    // =========================================================================

    /// Retarget tiles to a new display state.
    ///
    /// `scale` is the content's display scale, `content_visible_rect` the
    /// visible part of the content in content coordinates.
    ///
    /// # Panics
    ///
    /// Panics off the main thread or if `rotation` is not a multiple of 90.
    pub fn refresh_tiles(
        &mut self,
        scale: f32,
        content_visible_rect: IntRect,
        rotation: i32,
        continuous_transform_type: ContinuousTransformType,
        caller: &str,
    ) -> TileChanges {
        self.main_thread.check("TileManager::refresh_tiles");
        let rotation = normalize_rotation(rotation);

        if self
            .paused_continuous_transform_types
            .intersects(continuous_transform_type)
            && self.has_tiles()
        {
            debug!(
                caller,
                key = %self.image_key,
                ?continuous_transform_type,
                "refresh_tiles. interrupted, continuous transform in progress"
            );
            return TileChanges::NONE;
        }

        if content_visible_rect.is_empty() || !(scale > 0.0) {
            debug!(
                caller,
                key = %self.image_key,
                scale,
                %content_visible_rect,
                "refresh_tiles. nothing visible, cleaning"
            );
            return self.clean_tiles();
        }

        let Some(sample_size) = self.target_sample_size(scale) else {
            debug!(
                caller,
                key = %self.image_key,
                scale,
                "refresh_tiles. content is sharp enough, no tiles needed"
            );
            return self.clean_tiles();
        };

        let mut changes = TileChanges::NONE;
        if sample_size != self.sample_size {
            changes |= self.switch_sample_size(sample_size);
        }

        let image_load_rect = self.calculate_image_load_rect(content_visible_rect);
        if image_load_rect != self.image_load_rect {
            self.image_load_rect = image_load_rect;
            changes.image_load_rect = true;
        }

        changes |= self.load_and_evict();
        changes |= self.discard_background_if_ready();
        if changes.any() {
            self.refresh_snapshots();
        }

        debug!(
            caller,
            key = %self.image_key,
            scale,
            rotation,
            sample_size,
            %content_visible_rect,
            image_load_rect = %self.image_load_rect,
            foreground = self.foreground_tiles.len(),
            background = self.background_tiles.len(),
            "refresh_tiles"
        );
        changes
    }

    /// The level to display at `scale`, or `None` if the content itself is
    /// already as sharp as any tile level.
    fn target_sample_size(&self, scale: f32) -> Option<u32> {
        let image_size = self.image_info.size;
        let wanted = calculate_sample_size(image_size, self.content_size, scale);
        let coarsest = self.tile_grid_size_map.keys().next_back().copied()?;
        let sample_size = wanted.min(coarsest);
        sample_size_beats_content(image_size, self.content_size, sample_size).then_some(sample_size)
    }

    fn switch_sample_size(&mut self, sample_size: u32) -> TileChanges {
        let previous = self.sample_size;
        if previous != 0 {
            let keep_as_background = !self.disabled_background_tiles
                && self
                    .sampling_tiles
                    .get(&previous)
                    .is_some_and(SamplingTiles::has_loaded_tile);

            if keep_as_background {
                if let Some(level) = self.sampling_tiles.get_mut(&previous) {
                    level.cancel_loading();
                }
                if let Some(old_background) = self.background_sample_size.replace(previous) {
                    if old_background != sample_size && old_background != previous {
                        self.reset_level(old_background);
                    }
                }
            } else {
                self.reset_level(previous);
            }
        }

        // Zooming back to the background level reuses its tiles
        if self.background_sample_size == Some(sample_size) {
            self.background_sample_size = None;
        }

        if !self.sampling_tiles.contains_key(&sample_size) {
            let grid_size = self
                .tile_grid_size_map
                .get(&sample_size)
                .copied()
                .unwrap_or_default();
            self.sampling_tiles.insert(
                sample_size,
                create_sampling_tiles(
                    self.image_info.size,
                    self.preferred_tile_size,
                    sample_size,
                    grid_size,
                ),
            );
        }

        debug!(
            caller = %self.caller,
            key = %self.image_key,
            from = previous,
            to = sample_size,
            background = ?self.background_sample_size,
            "Sample size changed"
        );
        self.sample_size = sample_size;
        TileChanges {
            tiles: true,
            sample_size: true,
            image_load_rect: false,
        }
    }

    fn calculate_image_load_rect(&self, content_visible_rect: IntRect) -> IntRect {
        let image_size = self.image_info.size;
        let content_to_image = ScaleFactor::new(
            image_size.width as f32 / self.content_size.width as f32,
            image_size.height as f32 / self.content_size.height as f32,
        );
        let cell = self.preferred_tile_size * self.sample_size as i32;
        content_visible_rect
            .times(content_to_image)
            .inflate(cell.width * self.prefetch_tiles, cell.height * self.prefetch_tiles)
            .limit_to(image_size)
    }

    fn load_and_evict(&mut self) -> TileChanges {
        let sample_size = self.sample_size;
        let load_rect = self.image_load_rect;
        let mut changes = TileChanges::NONE;
        let mut to_load = Vec::new();

        if let Some(level) = self.sampling_tiles.get_mut(&sample_size) {
            for (index, tile) in level.tiles.iter_mut().enumerate() {
                if tile.src_rect.overlaps(&load_rect) {
                    if tile.state() == TileState::Waiting {
                        to_load.push(index);
                    }
                } else if tile.state() != TileState::Waiting {
                    tile.reset();
                    changes.tiles = true;
                }
            }
        }

        for index in to_load {
            self.load_tile(sample_size, index);
            changes.tiles = true;
        }
        changes
    }

    fn load_tile(&mut self, sample_size: u32, index: usize) {
        let Some(tile) = self
            .sampling_tiles
            .get(&sample_size)
            .and_then(|level| level.tiles.get(index))
        else {
            return;
        };
        let src_rect = tile.src_rect;
        let coordinate = tile.coordinate;
        let key = tile_cache_key(&self.image_key, src_rect, sample_size);

        if let Some(tile_image) = self.cache_helper.get(&key) {
            if let Some(tile) = self.tile_mut(sample_size, index) {
                tile.set_loaded(tile_image, true, false);
            }
            debug!(caller = %self.caller, %key, "Tile loaded from cache");
            return;
        }

        let decoder = Arc::clone(&self.tile_decoder);
        let listener = Arc::clone(&self.listener);
        let manager_id = self.id;
        let job = self.tile_decoder.io_handle().spawn(async move {
            let result = decoder.decode(key.clone(), src_rect, sample_size).await;
            listener(TileDecodeResult {
                manager_id,
                sample_size,
                coordinate,
                key,
                result,
            });
        });
        if let Some(tile) = self.tile_mut(sample_size, index) {
            tile.set_loading(job.abort_handle());
        }
    }

    fn tile_mut(&mut self, sample_size: u32, index: usize) -> Option<&mut Tile> {
        self.sampling_tiles
            .get_mut(&sample_size)
            .and_then(|level| level.tiles.get_mut(index))
    }

    // =========================================================================
    // Decode Results
    // =========================================================================

    /// Apply a decode result. Results for other managers or for tiles that
    /// are no longer loading are dropped.
    pub fn on_tile_decoded(&mut self, decoded: TileDecodeResult) -> TileChanges {
        self.main_thread.check("TileManager::on_tile_decoded");
        let TileDecodeResult {
            manager_id,
            sample_size,
            coordinate,
            key,
            result,
        } = decoded;

        let index = self.tile_index(sample_size, coordinate);
        let loading = manager_id == self.id
            && index
                .and_then(|index| self.sampling_tiles.get(&sample_size)?.tiles.get(index))
                .is_some_and(|tile| tile.state() == TileState::Loading);
        let (true, Some(index)) = (loading, index) else {
            debug!(caller = %self.caller, %key, "Dropping stale tile result");
            if let Ok(tile_image) = result {
                tile_image.recycle();
            }
            return TileChanges::NONE;
        };

        match result {
            Ok(tile_image) => {
                let (tile_image, cached) = match self.cache_helper.put(
                    &key,
                    Arc::clone(&tile_image),
                    &self.image_key,
                    &self.image_info,
                ) {
                    Some(cached_image) => (cached_image, true),
                    None => (tile_image, false),
                };
                let animate = !self.tile_animation_spec.is_none();
                if let Some(tile) = self.tile_mut(sample_size, index) {
                    tile.set_loaded(tile_image, cached, animate);
                }
                debug!(caller = %self.caller, %key, "Tile decoded");
            }
            Err(e) if e.is_cancelled() => {
                if let Some(tile) = self.tile_mut(sample_size, index) {
                    tile.reset();
                }
                debug!(caller = %self.caller, %key, "Tile decode cancelled");
            }
            Err(e) => {
                if let Some(tile) = self.tile_mut(sample_size, index) {
                    tile.set_error();
                }
                warn!(caller = %self.caller, %key, error = %e, "Tile decode failed");
            }
        }

        let changes = TileChanges {
            tiles: true,
            ..TileChanges::NONE
        } | self.discard_background_if_ready();
        self.refresh_snapshots();
        changes
    }

    fn tile_index(&self, sample_size: u32, coordinate: IntOffset) -> Option<usize> {
        let grid_size = self.sampling_tiles.get(&sample_size)?.grid_size();
        if coordinate.x < 0
            || coordinate.y < 0
            || coordinate.x >= grid_size.x
            || coordinate.y >= grid_size.y
        {
            return None;
        }
        Some((coordinate.y * grid_size.x + coordinate.x) as usize)
    }

    // =========================================================================
    // Background and Cleanup
    // =========================================================================

    fn discard_background_if_ready(&mut self) -> TileChanges {
        if self.background_sample_size.is_none() {
            return TileChanges::NONE;
        }
        let load_rect = self.image_load_rect;
        let foreground_settled = self
            .sampling_tiles
            .get(&self.sample_size)
            .map(|level| {
                level
                    .tiles
                    .iter()
                    .filter(|tile| tile.src_rect.overlaps(&load_rect))
                    .all(|tile| tile.state().is_settled())
            })
            .unwrap_or(true);
        if !foreground_settled {
            return TileChanges::NONE;
        }
        self.discard_background();
        TileChanges {
            tiles: true,
            ..TileChanges::NONE
        }
    }

    fn discard_background(&mut self) {
        if let Some(background) = self.background_sample_size.take() {
            self.reset_level(background);
            debug!(
                caller = %self.caller,
                key = %self.image_key,
                sample_size = background,
                "Background tiles released"
            );
        }
    }

    fn reset_level(&mut self, sample_size: u32) {
        if let Some(level) = self.sampling_tiles.get_mut(&sample_size) {
            level.reset_all();
        }
    }

    /// Cancel every decode and release every tile image. The grid itself is kept.
    pub fn clean(&mut self, reason: &str) -> TileChanges {
        self.main_thread.check("TileManager::clean");
        debug!(caller = %self.caller, key = %self.image_key, reason, "Cleaning tiles");
        self.clean_tiles()
    }

    fn clean_tiles(&mut self) -> TileChanges {
        let changes = TileChanges {
            tiles: self.has_tiles(),
            sample_size: self.sample_size != 0,
            image_load_rect: self.image_load_rect != IntRect::ZERO,
        };
        for level in self.sampling_tiles.values_mut() {
            level.reset_all();
        }
        self.sample_size = 0;
        self.background_sample_size = None;
        self.image_load_rect = IntRect::ZERO;
        self.foreground_tiles.clear();
        self.background_tiles.clear();
        changes
    }

    fn refresh_snapshots(&mut self) {
        let load_rect = self.image_load_rect;
        self.foreground_tiles = self
            .sampling_tiles
            .get(&self.sample_size)
            .map(|level| {
                level
                    .tiles
                    .iter()
                    .filter(|tile| tile.src_rect.overlaps(&load_rect))
                    .map(|tile| tile.snapshot())
                    .collect()
            })
            .unwrap_or_default();
        self.background_tiles = self
            .background_sample_size
            .and_then(|background| self.sampling_tiles.get(&background))
            .map(|level| {
                level
                    .tiles
                    .iter()
                    .filter(|tile| tile.state() == TileState::Loaded)
                    .map(|tile| tile.snapshot())
                    .collect()
            })
            .unwrap_or_default();
    }
}

impl std::fmt::Debug for TileManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileManager")
            .field("id", &self.id)
            .field("image_key", &self.image_key)
            .field("image_info", &self.image_info)
            .field("content_size", &self.content_size)
            .field("preferred_tile_size", &self.preferred_tile_size)
            .field("sample_size", &self.sample_size)
            .field("background_sample_size", &self.background_sample_size)
            .field("image_load_rect", &self.image_load_rect)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
