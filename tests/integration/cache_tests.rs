//! Tile image cache integration tests.
//!
//! Tests verify:
//! - A cache shared by two cores serves the second one without decoding
//! - Disabling the cache bypasses it entirely
//! - Tiles evicted by panning come back from the cache

use std::sync::Arc;

use subsampling::cache::TileImageCache;
use subsampling::decoder::RegionDecoderFactory;
use subsampling::engine::{InputSenders, SubsamplingCore};
use subsampling::geometry::IntSize;

use super::test_utils::{
    attach, until, until_settled, virtual_image, zoom, zoom_at, CountingCache,
    VirtualDecoderFactory,
};

const IMAGE: IntSize = IntSize::new(8000, 6000);
const VIEW: IntSize = IntSize::new(1000, 750);

/// A ready core over the shared virtual image, using `cache`.
async fn cached_core(
    cache: &Arc<CountingCache>,
) -> (SubsamplingCore, InputSenders, Arc<VirtualDecoderFactory>) {
    let factory = Arc::new(VirtualDecoderFactory::new(IMAGE));
    let mut core = SubsamplingCore::new();
    core.set_region_decoders(vec![factory.clone() as Arc<dyn RegionDecoderFactory>]);
    core.set_tile_image_cache(Some(cache.clone() as Arc<dyn TileImageCache>));
    let senders = attach(&mut core, VIEW, VIEW);
    core.set_image(Some(virtual_image("mem://shared.jpg")));
    until(&mut core, |c| c.is_ready()).await;
    (core, senders, factory)
}

#[tokio::test]
async fn test_shared_cache_serves_second_core() {
    let cache = Arc::new(CountingCache::new());

    let (mut first, first_senders, first_factory) = cached_core(&cache).await;
    first_senders.transform.send(zoom(2.0)).unwrap();
    until_settled(&mut first).await;
    let loaded = first.foreground_tiles().len();
    assert_eq!(first_factory.counters.decodes(), loaded);
    assert_eq!(cache.puts(), loaded);
    assert_eq!(cache.len(), loaded);

    let (mut second, second_senders, second_factory) = cached_core(&cache).await;
    second_senders.transform.send(zoom(2.0)).unwrap();
    until_settled(&mut second).await;
    assert_eq!(second.foreground_tiles().len(), loaded);
    assert_eq!(second_factory.counters.decodes(), 0);
    assert_eq!(cache.hits(), loaded);

    // Cached tiles are shared, not copied
    let first_tile = first.foreground_tiles()[0].tile_image.clone().unwrap();
    let second_tile = second.foreground_tiles()[0].tile_image.clone().unwrap();
    assert_eq!(
        Arc::as_ptr(&first_tile) as *const (),
        Arc::as_ptr(&second_tile) as *const ()
    );
}

#[tokio::test]
async fn test_disabled_cache_is_bypassed() {
    let cache = Arc::new(CountingCache::new());
    let (mut warm, warm_senders, _) = cached_core(&cache).await;
    warm_senders.transform.send(zoom(2.0)).unwrap();
    until_settled(&mut warm).await;
    let (gets, puts) = (cache.gets(), cache.puts());

    let (mut core, senders, factory) = cached_core(&cache).await;
    core.set_disabled_tile_image_cache(true);
    assert!(core.is_disabled_tile_image_cache());
    senders.transform.send(zoom(2.0)).unwrap();
    until_settled(&mut core).await;

    assert_eq!(factory.counters.decodes(), core.foreground_tiles().len());
    assert_eq!(cache.gets(), gets);
    assert_eq!(cache.puts(), puts);
}

#[tokio::test]
async fn test_evicted_tiles_return_from_cache() {
    let cache = Arc::new(CountingCache::new());
    let (mut core, senders, factory) = cached_core(&cache).await;

    senders.transform.send(zoom(2.0)).unwrap();
    until_settled(&mut core).await;

    // Bottom-right quarter of the image
    let panned = zoom_at(2.0, -1000.0, -750.0);
    senders.transform.send(panned).unwrap();
    until(&mut core, |c| c.transform() == panned).await;
    until_settled(&mut core).await;

    let decodes = factory.counters.decodes();
    let hits = cache.hits();
    senders.transform.send(zoom(2.0)).unwrap();
    until(&mut core, |c| c.transform() == zoom(2.0)).await;
    until_settled(&mut core).await;

    assert_eq!(factory.counters.decodes(), decodes);
    assert!(cache.hits() > hits);
    assert!(core
        .foreground_tiles()
        .iter()
        .all(|tile| tile.tile_image.as_ref().is_some_and(|image| !image.is_recycled())));
}
