//! Subsampling core integration tests.
//!
//! Tests verify:
//! - A real PNG goes from `set_image` to fully loaded full-resolution tiles
//! - Panning moves the loaded tiles with the viewport
//! - Gestures pause tile loading until they end
//! - Swapping or disabling the image releases the previous decoder
//! - Published watch state mirrors the core

use std::sync::Arc;

use subsampling::decoder::RegionDecoderFactory;
use subsampling::engine::SubsamplingCore;
use subsampling::geometry::{IntOffset, IntSize};
use subsampling::tile::{ContinuousTransformType, TileState};

use super::test_utils::{
    attach, png_image, until, until_settled, virtual_image, zoom, zoom_at,
    CountingImageDecoderFactory, VirtualDecoderFactory,
};

const PNG_SIZE: (u32, u32) = (1600, 1200);
const PNG_VIEW: IntSize = IntSize::new(400, 300);

fn png_core() -> (SubsamplingCore, Arc<CountingImageDecoderFactory>) {
    let factory = Arc::new(CountingImageDecoderFactory::default());
    let mut core = SubsamplingCore::new();
    let factories: Vec<Arc<dyn RegionDecoderFactory>> = vec![factory.clone()];
    core.set_region_decoders(factories);
    (core, factory)
}

// =============================================================================
// Real PNG
// =============================================================================

#[tokio::test]
async fn test_png_zoom_loads_full_resolution_tiles() {
    let (mut core, factory) = png_core();
    let senders = attach(&mut core, PNG_VIEW, PNG_VIEW);
    core.set_image(Some(png_image("mem://big.png", PNG_SIZE.0, PNG_SIZE.1)));
    until(&mut core, |c| c.is_ready()).await;

    let ready = core.ready_state();
    let image_info = ready.image_info.unwrap();
    assert_eq!(image_info.size, IntSize::new(1600, 1200));
    assert_eq!(image_info.mime_type, "image/png");
    // 200x150 tiles: 8x8, 4x4 and 2x2 grids
    assert_eq!(
        ready.tile_grid_size_map.keys().copied().collect::<Vec<_>>(),
        vec![1, 2, 4]
    );

    senders.transform.send(zoom(4.0)).unwrap();
    until_settled(&mut core).await;

    let tiles = core.tiles_state();
    assert_eq!(tiles.sample_size, 1);
    assert!(tiles.foreground_tiles.len() >= 4);
    for tile in &tiles.foreground_tiles {
        assert_eq!(tile.state, TileState::Loaded);
        let image = tile.tile_image.as_ref().unwrap();
        assert_eq!(image.width(), tile.src_rect.width());
        assert_eq!(image.height(), tile.src_rect.height());
    }
    assert_eq!(factory.counters.decodes(), tiles.foreground_tiles.len());
}

#[tokio::test]
async fn test_pan_moves_loaded_tiles() {
    let (mut core, _factory) = png_core();
    let senders = attach(&mut core, PNG_VIEW, PNG_VIEW);
    core.set_image(Some(png_image("mem://big.png", PNG_SIZE.0, PNG_SIZE.1)));
    until(&mut core, |c| c.is_ready()).await;

    senders.transform.send(zoom(4.0)).unwrap();
    until_settled(&mut core).await;
    let coordinates = |core: &SubsamplingCore| {
        core.foreground_tiles()
            .iter()
            .map(|tile| tile.coordinate)
            .collect::<Vec<_>>()
    };
    assert!(coordinates(&core).contains(&IntOffset::new(0, 0)));

    // Pan to the bottom-right corner of the content
    senders
        .transform
        .send(zoom_at(4.0, -1200.0, -900.0))
        .unwrap();
    until(&mut core, |c| c.transform() == zoom_at(4.0, -1200.0, -900.0)).await;
    until_settled(&mut core).await;

    let moved = coordinates(&core);
    assert!(moved.contains(&IntOffset::new(7, 7)));
    assert!(!moved.contains(&IntOffset::new(0, 0)));
    let load_rect = core.image_load_rect();
    assert_eq!(load_rect.right, 1600);
    assert_eq!(load_rect.bottom, 1200);
}

#[tokio::test]
async fn test_image_swap_releases_previous_decoder() {
    let (mut core, factory) = png_core();
    let _senders = attach(&mut core, PNG_VIEW, PNG_VIEW);
    core.set_image(Some(png_image("mem://first.png", PNG_SIZE.0, PNG_SIZE.1)));
    until(&mut core, |c| c.is_ready()).await;

    assert!(core.set_image(Some(png_image("mem://second.png", 800, 600))));
    assert!(!core.is_ready());
    until(&mut core, |c| c.is_ready()).await;
    assert_eq!(
        core.tile_decoder().unwrap().subsampling_image().key(),
        "mem://second.png"
    );
    assert_eq!(core.image_info().unwrap().size, IntSize::new(800, 600));

    core.wait_for_cleanup().await;
    assert_eq!(factory.counters.created(), 2);
    assert_eq!(factory.counters.closed(), 1);
}

#[tokio::test]
async fn test_disable_and_restore_png() {
    let (mut core, factory) = png_core();
    let senders = attach(&mut core, PNG_VIEW, PNG_VIEW);
    core.set_image(Some(png_image("mem://big.png", PNG_SIZE.0, PNG_SIZE.1)));
    until(&mut core, |c| c.is_ready()).await;
    senders.transform.send(zoom(2.0)).unwrap();
    until_settled(&mut core).await;

    core.set_disabled(true);
    assert!(!core.is_ready());
    assert!(core.tiles_state().foreground_tiles.is_empty());

    core.set_disabled(false);
    assert_eq!(core.subsampling_image().unwrap().key(), "mem://big.png");
    until(&mut core, |c| c.is_ready()).await;
    until_settled(&mut core).await;
    assert_eq!(core.sample_size(), 2);
    assert_eq!(factory.counters.created(), 2);
}

// =============================================================================
// Virtual Images
// =============================================================================

#[tokio::test]
async fn test_gesture_pauses_tile_loading() {
    let factory = Arc::new(VirtualDecoderFactory::new(IntSize::new(8000, 6000)));
    let mut core = SubsamplingCore::new();
    core.set_region_decoders(vec![factory.clone() as Arc<dyn RegionDecoderFactory>]);
    let view = IntSize::new(1000, 750);
    let senders = attach(&mut core, view, view);
    core.set_image(Some(virtual_image("mem://huge.jpg")));
    until(&mut core, |c| c.is_ready()).await;

    senders.transform.send(zoom(2.0)).unwrap();
    until_settled(&mut core).await;
    assert_eq!(core.sample_size(), 4);
    let decodes = factory.counters.decodes();

    senders
        .continuous_transform_type
        .send(ContinuousTransformType::GESTURE)
        .unwrap();
    until(&mut core, |c| {
        c.continuous_transform_type() == ContinuousTransformType::GESTURE
    })
    .await;
    senders.transform.send(zoom(4.0)).unwrap();
    until(&mut core, |c| c.transform() == zoom(4.0)).await;
    assert_eq!(core.sample_size(), 4);
    assert_eq!(factory.counters.decodes(), decodes);

    // Scale changes are not paused by default
    senders
        .continuous_transform_type
        .send(ContinuousTransformType::SCALE)
        .unwrap();
    until(&mut core, |c| c.sample_size() == 2).await;
    until_settled(&mut core).await;
    assert!(factory.counters.decodes() > decodes);
}

#[tokio::test]
async fn test_published_state_mirrors_core() {
    let factory = Arc::new(VirtualDecoderFactory::new(IntSize::new(8000, 6000)));
    let mut core = SubsamplingCore::new();
    core.set_region_decoders(vec![factory as Arc<dyn RegionDecoderFactory>]);
    let ready_rx = core.subscribe_ready();
    let tiles_rx = core.subscribe_tiles();

    let view = IntSize::new(1000, 750);
    let senders = attach(&mut core, view, view);
    core.set_image(Some(virtual_image("mem://huge.jpg")));
    until(&mut core, |c| c.is_ready()).await;
    assert!(ready_rx.borrow().ready);
    assert_eq!(ready_rx.borrow().tile_grid_size_map, core.tile_grid_size_map());

    senders.transform.send(zoom(2.0)).unwrap();
    until_settled(&mut core).await;
    {
        let tiles = tiles_rx.borrow();
        assert_eq!(tiles.sample_size, core.sample_size());
        assert_eq!(tiles.image_load_rect, core.image_load_rect());
        assert_eq!(tiles.foreground_tiles.len(), core.foreground_tiles().len());
        assert!(tiles.is_settled());
    }

    core.on_detached();
    assert!(!ready_rx.borrow().ready);
    assert!(tiles_rx.borrow().foreground_tiles.is_empty());
}
