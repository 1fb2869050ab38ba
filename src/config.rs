//! Configuration for the `subsampling-probe` binary.
//!
//! Every option can be given on the command line or through an environment
//! variable with the `SUBSAMPLING_` prefix. Library knobs (hysteresis,
//! debounce, animation) are typed values on the components themselves; this
//! module only covers what the probe exposes.
//!
//! # Example
//!
//! ```ignore
//! use clap::Parser;
//! use subsampling::config::ProbeConfig;
//!
//! let config = ProbeConfig::parse();
//! config.validate()?;
//! println!("Probing {} in a {} container", config.path.display(), config.container);
//! ```
//!
//! # Environment Variables
//!
//! - `SUBSAMPLING_CONTAINER` - Viewport size as `WxH` (default: 1080x1920)
//! - `SUBSAMPLING_CONTENT` - Content size as `WxH` (default: image fitted to the container)
//! - `SUBSAMPLING_SCALE` - Zoom scale applied to the content (default: 1.0)
//! - `SUBSAMPLING_ROTATION` - Rotation in degrees, a multiple of 90 (default: 0)
//! - `SUBSAMPLING_CACHE_BYTES` - Tile image cache capacity in bytes (default: 256 MiB)
//! - `SUBSAMPLING_DISABLE_CACHE` - Bypass the tile image cache
//! - `SUBSAMPLING_TIMEOUT` - Seconds to wait for tiles to settle (default: 30)

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::cache::DEFAULT_TILE_IMAGE_CACHE_CAPACITY;
use crate::geometry::{IntSize, Offset, ScaleFactor, Transform};

// =============================================================================
// Default Values
// =============================================================================

/// Default container, a portrait phone screen.
pub const DEFAULT_CONTAINER: &str = "1080x1920";

/// Default time to wait for foreground tiles.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

// =============================================================================
// CLI Arguments
// =============================================================================

/// How the probe prints its report.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// subsampling-probe - Inspect how an image would be subsampled and tiled.
///
/// Opens a local image, drives a subsampling core headlessly with the given
/// viewport and zoom, and reports the chosen sample size, tile grid and the
/// state of every foreground tile.
#[derive(Parser, Debug, Clone)]
#[command(name = "subsampling-probe")]
#[command(author, version, about, long_about = None)]
pub struct ProbeConfig {
    /// Image file to probe (JPEG or PNG).
    pub path: PathBuf,

    // =========================================================================
    // Display Configuration
    // =========================================================================
    /// Container (viewport) size as WxH.
    #[arg(long, default_value = DEFAULT_CONTAINER, value_parser = parse_size, env = "SUBSAMPLING_CONTAINER")]
    pub container: IntSize,

    /// Content (thumbnail) size as WxH.
    ///
    /// If not specified, the image is scaled to fit the container.
    #[arg(long, value_parser = parse_size, env = "SUBSAMPLING_CONTENT")]
    pub content: Option<IntSize>,

    /// Zoom scale applied to the content.
    #[arg(long, default_value_t = 1.0, env = "SUBSAMPLING_SCALE")]
    pub scale: f32,

    /// Rotation in degrees, a multiple of 90.
    #[arg(long, default_value_t = 0, allow_negative_numbers = true, env = "SUBSAMPLING_ROTATION")]
    pub rotation: i32,

    // =========================================================================
    // Cache Configuration
    // =========================================================================
    /// Tile image cache capacity in bytes.
    #[arg(long, default_value_t = DEFAULT_TILE_IMAGE_CACHE_CAPACITY, env = "SUBSAMPLING_CACHE_BYTES")]
    pub cache_bytes: usize,

    /// Bypass the tile image cache entirely.
    #[arg(long, default_value_t = false, env = "SUBSAMPLING_DISABLE_CACHE")]
    pub disable_cache: bool,

    // =========================================================================
    // Output Configuration
    // =========================================================================
    /// Seconds to wait for foreground tiles to finish loading.
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS, env = "SUBSAMPLING_TIMEOUT")]
    pub timeout: u64,

    /// Report format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl ProbeConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.container.is_empty() {
            return Err("container must have a positive width and height".to_string());
        }
        if let Some(content) = self.content {
            if content.is_empty() {
                return Err("content must have a positive width and height".to_string());
            }
        }

        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(format!("scale must be a positive number, got {}", self.scale));
        }
        if self.rotation % 90 != 0 {
            return Err(format!(
                "rotation must be a multiple of 90, got {}",
                self.rotation
            ));
        }

        if self.cache_bytes == 0 {
            return Err(
                "cache_bytes must be greater than 0. Use --disable-cache to bypass the cache"
                    .to_string(),
            );
        }
        if self.timeout == 0 {
            return Err("timeout must be greater than 0".to_string());
        }

        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// The zoom transform to apply, anchored at the content origin.
    pub fn transform(&self) -> Transform {
        Transform::new(ScaleFactor::uniform(self.scale), Offset::ZERO, self.rotation)
    }

    /// The configured content size, or `image_size` fitted inside the container.
    pub fn content_size_for(&self, image_size: IntSize) -> IntSize {
        if let Some(content) = self.content {
            return content;
        }
        fit_inside(image_size, self.container)
    }
}

/// Scale `size` uniformly so it fits inside `bounds`, keeping at least 1px.
fn fit_inside(size: IntSize, bounds: IntSize) -> IntSize {
    if size.is_empty() || bounds.is_empty() {
        return IntSize::ZERO;
    }
    let factor = (bounds.width as f64 / size.width as f64)
        .min(bounds.height as f64 / size.height as f64);
    IntSize::new(
        ((size.width as f64 * factor).round() as i32).max(1),
        ((size.height as f64 * factor).round() as i32).max(1),
    )
}

/// Parse a size given as `WxH`, e.g. `1080x1920`.
pub fn parse_size(value: &str) -> Result<IntSize, String> {
    let (width, height) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("invalid size '{}', expected WxH", value))?;
    let width = width
        .trim()
        .parse::<i32>()
        .map_err(|e| format!("invalid width in '{}': {}", value, e))?;
    let height = height
        .trim()
        .parse::<i32>()
        .map_err(|e| format!("invalid height in '{}': {}", value, e))?;
    Ok(IntSize::new(width, height))
}

// =============================================================================
// Tests
// =============================================================================
