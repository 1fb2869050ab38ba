//! subsampling-probe - Inspect how an image would be subsampled and tiled.
//!
//! This binary drives a [`SubsamplingCore`] headlessly against a local image
//! and prints what a viewer would load for the given viewport and zoom.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use serde::Serialize;
use tracing::{debug, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use subsampling::{
    cache::LruTileImageCache,
    config::{OutputFormat, ProbeConfig},
    decoder::{ImageRegionDecoderFactory, RegionDecoderFactory},
    engine::{SubsamplingCore, SubsamplingInputs},
    error::DecodeError,
    geometry::{IntRect, IntSize},
    source::{FileImageSource, ImageInfo, SubsamplingImage},
    tile::{TileAnimationSpec, TileSnapshot, TileState},
};

#[tokio::main]
async fn main() -> ExitCode {
    let config = ProbeConfig::parse();
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let report = match run_probe(&config).await {
        Ok(report) => report,
        Err(e) => {
            error!("Probe failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match config.format {
        OutputFormat::Text => print_text(&report),
        OutputFormat::Json => match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                error!("Failed to serialize report: {}", e);
                return ExitCode::FAILURE;
            }
        },
    }

    if report.failed_tiles > 0 {
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "subsampling=debug,subsampling_probe=debug"
    } else {
        "subsampling=warn,subsampling_probe=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

// =============================================================================
// Report
// =============================================================================

#[derive(Debug, Serialize)]
struct ProbeReport {
    path: String,
    image: ImageReport,
    container: SizeReport,
    content: SizeReport,
    scale: f32,
    rotation: i32,
    sample_size: u32,
    image_load_rect: RectReport,
    tile_grid: Vec<GridLevelReport>,
    foreground_tiles: Vec<TileReport>,
    background_tiles: usize,
    loaded_tiles: usize,
    failed_tiles: usize,
    elapsed_ms: u128,
}

#[derive(Debug, Serialize)]
struct ImageReport {
    width: i32,
    height: i32,
    mime_type: String,
}

#[derive(Debug, Serialize)]
struct SizeReport {
    width: i32,
    height: i32,
}

#[derive(Debug, Serialize)]
struct RectReport {
    left: i32,
    top: i32,
    right: i32,
    bottom: i32,
}

#[derive(Debug, Serialize)]
struct GridLevelReport {
    sample_size: u32,
    columns: i32,
    rows: i32,
}

#[derive(Debug, Serialize)]
struct TileReport {
    column: i32,
    row: i32,
    src_rect: RectReport,
    state: &'static str,
}

impl From<IntSize> for SizeReport {
    fn from(size: IntSize) -> Self {
        Self {
            width: size.width,
            height: size.height,
        }
    }
}

impl From<IntRect> for RectReport {
    fn from(rect: IntRect) -> Self {
        Self {
            left: rect.left,
            top: rect.top,
            right: rect.right,
            bottom: rect.bottom,
        }
    }
}

impl From<&TileSnapshot> for TileReport {
    fn from(tile: &TileSnapshot) -> Self {
        Self {
            column: tile.coordinate.x,
            row: tile.coordinate.y,
            src_rect: tile.src_rect.into(),
            state: state_name(tile.state),
        }
    }
}

fn state_name(state: TileState) -> &'static str {
    match state {
        TileState::Waiting => "waiting",
        TileState::Loading => "loading",
        TileState::Loaded => "loaded",
        TileState::Error => "error",
    }
}

// =============================================================================
// Probe
// =============================================================================

async fn run_probe(config: &ProbeConfig) -> Result<ProbeReport, String> {
    let started = Instant::now();
    let source = Arc::new(FileImageSource::new(&config.path));
    let image_info = read_image_info(&config.path, SubsamplingImage::new(source.clone()))
        .await
        .map_err(|e| format!("cannot read {}: {}", config.path.display(), e))?;
    info!("Image: {}", image_info);

    let content_size = config.content_size_for(image_info.size);
    let transform = config.transform();
    info!(
        "Container {}, content {}, scale {}, rotation {}",
        config.container, content_size, config.scale, config.rotation
    );

    let mut core = SubsamplingCore::new();
    core.set_tile_animation_spec(TileAnimationSpec::NONE);
    if config.disable_cache {
        core.set_disabled_tile_image_cache(true);
    } else {
        core.set_tile_image_cache(Some(Arc::new(LruTileImageCache::with_capacity(
            config.cache_bytes,
        ))));
    }

    let (senders, inputs) = SubsamplingInputs::channel(config.container, content_size);
    senders.transform.send_replace(transform);
    core.on_attached(inputs);
    core.set_image(Some(SubsamplingImage::with_image_info(
        source,
        image_info.clone(),
    )));

    let settled = tokio::time::timeout(
        config.timeout(),
        core.run_until(|core| {
            !core.is_building()
                && (!core.is_ready()
                    || core.foreground_tiles().is_empty()
                    || core.tiles_state().is_settled())
        }),
    )
    .await;
    if settled.is_err() {
        core.on_detached();
        return Err(format!(
            "tiles did not settle within {}s",
            config.timeout().as_secs()
        ));
    }
    if !core.is_ready() {
        core.on_detached();
        return Err("the image cannot be subsampled at this content size".to_string());
    }

    let tiles = core.tiles_state();
    let report = ProbeReport {
        path: config.path.display().to_string(),
        image: ImageReport {
            width: image_info.size.width,
            height: image_info.size.height,
            mime_type: image_info.mime_type.clone(),
        },
        container: config.container.into(),
        content: content_size.into(),
        scale: config.scale,
        rotation: config.rotation,
        sample_size: tiles.sample_size,
        image_load_rect: tiles.image_load_rect.into(),
        tile_grid: core
            .tile_grid_size_map()
            .into_iter()
            .map(|(sample_size, grid)| GridLevelReport {
                sample_size,
                columns: grid.x,
                rows: grid.y,
            })
            .collect(),
        foreground_tiles: tiles.foreground_tiles.iter().map(TileReport::from).collect(),
        background_tiles: tiles.background_tiles.len(),
        loaded_tiles: count_state(&tiles.foreground_tiles, TileState::Loaded),
        failed_tiles: count_state(&tiles.foreground_tiles, TileState::Error),
        elapsed_ms: started.elapsed().as_millis(),
    };

    core.on_detached();
    core.wait_for_cleanup().await;
    debug!("Probe finished in {}ms", report.elapsed_ms);
    Ok(report)
}

/// Open the image once with the default decoder to learn its size.
async fn read_image_info(path: &Path, image: SubsamplingImage) -> Result<ImageInfo, DecodeError> {
    let source = image.source.create().await?;
    let data = source.open_source().await?;
    debug!("Read {} bytes from {}", data.len(), path.display());

    tokio::task::spawn_blocking(move || {
        let mut decoder = ImageRegionDecoderFactory::new().create(&image, data)?;
        let prepared = decoder.prepare();
        let image_info = decoder.image_info();
        decoder.close();
        prepared?;
        image_info.ok_or_else(|| DecodeError::Decode {
            message: "decoder reported no image info".to_string(),
        })
    })
    .await
    .map_err(DecodeError::from)?
}

fn count_state(tiles: &[TileSnapshot], state: TileState) -> usize {
    tiles.iter().filter(|tile| tile.state == state).count()
}

// =============================================================================
// Text Output
// =============================================================================

fn print_text(report: &ProbeReport) {
    println!("Subsampling Probe");
    println!("═════════════════════════════════");
    println!("Image:      {}", report.path);
    println!(
        "            {}x{} ({})",
        report.image.width, report.image.height, report.image.mime_type
    );
    println!(
        "Container:  {}x{}",
        report.container.width, report.container.height
    );
    println!(
        "Content:    {}x{}",
        report.content.width, report.content.height
    );
    println!("Transform:  scale {}, rotation {}", report.scale, report.rotation);
    println!();

    println!("Tile grid:");
    println!("─────────────────");
    for level in &report.tile_grid {
        let marker = if level.sample_size == report.sample_size {
            "  ◄"
        } else {
            ""
        };
        println!(
            "  sample {:>3}: {}x{} tiles{}",
            level.sample_size, level.columns, level.rows, marker
        );
    }
    println!();

    if report.foreground_tiles.is_empty() {
        println!("No tiles needed: the content is sharp enough at this scale.");
    } else {
        let rect = &report.image_load_rect;
        println!("Sample size: {}", report.sample_size);
        println!(
            "Load rect:   [{},{},{},{}]",
            rect.left, rect.top, rect.right, rect.bottom
        );
        println!();
        println!("Foreground tiles:");
        println!("─────────────────");
        for tile in &report.foreground_tiles {
            let src = &tile.src_rect;
            println!(
                "  ({:>2},{:>2}) [{},{},{},{}] {}",
                tile.column, tile.row, src.left, src.top, src.right, src.bottom, tile.state
            );
        }
        println!();
        println!(
            "Total: {} loaded, {} failed, {} background",
            report.loaded_tiles, report.failed_tiles, report.background_tiles
        );
    }

    println!("═════════════════════════════════");
    println!("Done in {}ms", report.elapsed_ms);
}
