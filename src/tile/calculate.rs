//! Pure tiling math and the subsampling eligibility gate.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::decoder::RegionDecoderFactory;
use crate::error::EligibilityError;
use crate::geometry::{IntOffset, IntRect, IntSize};
use crate::source::ImageInfo;

use super::model::{SamplingTiles, Tile};

/// Pixel tolerance when matching content size against image size.
pub const THUMBNAIL_EPSILON_PIXELS: f32 = 2.0;

// =============================================================================
// Eligibility
// =============================================================================

/// Check that `image_info` can be subsampled behind content of `content_size`.
///
/// Checks run in order: image size, content size, aspect ratio, mime type.
/// The mime type only fails when the factory positively reports it
/// unsupported.
pub fn check_image_info(
    image_info: &ImageInfo,
    factory: &dyn RegionDecoderFactory,
    content_size: IntSize,
) -> Result<(), EligibilityError> {
    let image_size = image_info.size;
    if image_size.is_empty() {
        return Err(EligibilityError::InvalidImage { image_size });
    }

    if content_size.is_empty()
        || content_size.width >= image_size.width
        || content_size.height >= image_size.height
    {
        return Err(EligibilityError::InvalidContent {
            content_size,
            image_size,
        });
    }

    if !is_thumbnail_with_size(image_size, content_size, THUMBNAIL_EPSILON_PIXELS) {
        return Err(EligibilityError::AspectRatioMismatch {
            content_size,
            image_size,
        });
    }

    if factory.check_support(&image_info.mime_type) == Some(false) {
        return Err(EligibilityError::UnsupportedFormat {
            mime_type: image_info.mime_type.clone(),
        });
    }

    Ok(())
}

/// Whether one size is a downscaled copy of the other.
///
/// Symmetric. The larger size is the origin; its scale to the smaller one is
/// derived from the widths and from the heights in turn, and either
/// prediction of the remaining dimension landing within `epsilon_pixels`
/// accepts.
pub fn is_thumbnail_with_size(size: IntSize, other_size: IntSize, epsilon_pixels: f32) -> bool {
    if size.is_empty() || other_size.is_empty() {
        return false;
    }

    let orientation = |s: IntSize| s.width.cmp(&s.height);
    match (orientation(size), orientation(other_size)) {
        (Ordering::Greater, Ordering::Less) | (Ordering::Less, Ordering::Greater) => return false,
        _ => {}
    }

    let area = |s: IntSize| s.width as i64 * s.height as i64;
    let (origin, thumbnail) = if area(size) >= area(other_size) {
        (size, other_size)
    } else {
        (other_size, size)
    };

    let width_scale = origin.width as f32 / thumbnail.width as f32;
    let height_scale = origin.height as f32 / thumbnail.height as f32;

    let by_width = width_scale >= 1.0
        && (origin.height as f32 / width_scale - thumbnail.height as f32).abs() <= epsilon_pixels;
    let by_height = height_scale >= 1.0
        && (origin.width as f32 / height_scale - thumbnail.width as f32).abs() <= epsilon_pixels;
    by_width || by_height
}

// =============================================================================
// Tile Size
// =============================================================================

/// Half the container in each dimension.
pub fn calculate_preferred_tile_size(container_size: IntSize) -> IntSize {
    container_size / 2
}

/// Relative change of a preferred tile size needed to rebuild the grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileSizeHysteresis {
    /// Fraction of the old value a dimension must grow by.
    pub grow: f32,
    /// Fraction of the old value a dimension must shrink by.
    pub shrink: f32,
}

impl TileSizeHysteresis {
    pub const DEFAULT: TileSizeHysteresis = TileSizeHysteresis {
        grow: 1.0,
        shrink: 0.5,
    };

    /// Whether moving from `old` to `new` warrants a new tile grid.
    pub fn check(&self, old: IntSize, new: IntSize) -> bool {
        if new.is_empty() {
            return false;
        }
        if old.is_empty() {
            return true;
        }
        self.dimension_changed(old.width, new.width) || self.dimension_changed(old.height, new.height)
    }

    fn dimension_changed(&self, old: i32, new: i32) -> bool {
        let fraction = if new > old { self.grow } else { self.shrink };
        let diff = (new - old).abs() as f32;
        diff >= old as f32 * fraction
    }
}

impl Default for TileSizeHysteresis {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// [`TileSizeHysteresis::check`] with the default thresholds.
pub fn check_new_preferred_tile_size(old: IntSize, new: IntSize) -> bool {
    TileSizeHysteresis::DEFAULT.check(old, new)
}

// =============================================================================
// Sample Size
// =============================================================================

/// Largest power of two that does not undershoot the displayed resolution.
///
/// The content is drawn at `scale`, so each displayed pixel covers
/// `image / (content * scale)` image pixels. Never less than 1.
pub fn calculate_sample_size(image_size: IntSize, content_size: IntSize, scale: f32) -> u32 {
    if image_size.is_empty() || content_size.is_empty() || !(scale > 0.0) {
        return 1;
    }
    let by_width = image_size.width as f32 / (content_size.width as f32 * scale);
    let by_height = image_size.height as f32 / (content_size.height as f32 * scale);
    let factor = by_width.min(by_height);

    let mut sample_size: u32 = 1;
    while sample_size < (1 << 30) && (sample_size * 2) as f32 <= factor {
        sample_size *= 2;
    }
    sample_size
}

/// Whether tiles at `sample_size` are sharper than the content thumbnail.
pub fn sample_size_beats_content(image_size: IntSize, content_size: IntSize, sample_size: u32) -> bool {
    let sample_size = sample_size.max(1) as i32;
    image_size.width / sample_size > content_size.width
        || image_size.height / sample_size > content_size.height
}

// =============================================================================
// Grid
// =============================================================================

fn grid_size_at(image_size: IntSize, preferred_tile_size: IntSize, sample_size: u32) -> IntOffset {
    let cell = preferred_tile_size * sample_size as i32;
    IntOffset::new(
        (image_size.width + cell.width - 1) / cell.width,
        (image_size.height + cell.height - 1) / cell.height,
    )
}

/// Grid extents `(columns, rows)` for every sample size level.
///
/// Levels are powers of two starting at 1, up to the last level whose image
/// at that sample size is still larger than one tile.
///
/// # Panics
///
/// Panics if `preferred_tile_size` is empty.
pub fn calculate_tile_grid_map(
    image_size: IntSize,
    preferred_tile_size: IntSize,
) -> BTreeMap<u32, IntOffset> {
    assert!(
        !preferred_tile_size.is_empty(),
        "InvalidArgument: preferred tile size {} is empty",
        preferred_tile_size
    );

    let mut grid_map = BTreeMap::new();
    let mut sample_size: u32 = 1;
    loop {
        grid_map.insert(sample_size, grid_size_at(image_size, preferred_tile_size, sample_size));

        let next = grid_size_at(image_size, preferred_tile_size, sample_size * 2);
        if next.x * next.y <= 1 || sample_size >= (1 << 30) {
            break;
        }
        sample_size *= 2;
    }
    grid_map
}

/// Build the row-major tile grid of one level. Edge tiles are clipped to the image.
pub fn create_sampling_tiles(
    image_size: IntSize,
    preferred_tile_size: IntSize,
    sample_size: u32,
    grid_size: IntOffset,
) -> SamplingTiles {
    let cell = preferred_tile_size * sample_size as i32;
    let mut tiles = Vec::with_capacity((grid_size.x * grid_size.y).max(0) as usize);
    for y in 0..grid_size.y {
        for x in 0..grid_size.x {
            let left = x * cell.width;
            let top = y * cell.height;
            let src_rect = IntRect::new(
                left,
                top,
                (left + cell.width).min(image_size.width),
                (top + cell.height).min(image_size.height),
            );
            tiles.push(Tile::new(IntOffset::new(x, y), src_rect, sample_size));
        }
    }
    SamplingTiles { sample_size, tiles }
}

/// Cache key of one tile of one image.
pub fn tile_cache_key(image_key: &str, src_rect: IntRect, sample_size: u32) -> String {
    format!(
        "{}_tile_{}_{}",
        image_key,
        src_rect.to_short_string(),
        sample_size
    )
}

// =============================================================================
// Tests
// =============================================================================
