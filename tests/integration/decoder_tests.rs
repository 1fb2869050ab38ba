//! Tile decoder integration tests.
//!
//! Tests verify:
//! - A real PNG opens, reports its info and decodes regions at a sample size
//! - Eligibility is checked against the hint before opening, and against the
//!   decoded info after opening
//! - Rejected and closed decoders release their region decoder

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::runtime::Handle;

use subsampling::decoder::{create_tile_decoder, RegionDecoderFactory};
use subsampling::error::{CreateTileDecoderError, DecodeError, EligibilityError, IoError};
use subsampling::geometry::{IntRect, IntSize};
use subsampling::source::{BytesImageSource, FileImageSource, ImageInfo, SubsamplingImage};

use super::test_utils::{create_png, png_image, CountingImageDecoderFactory, DecoderCounters};

async fn wait_for_closed(counters: &DecoderCounters, expected: usize) {
    for _ in 0..200 {
        if counters.closed() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!(
        "expected {} closed decoders, found {}",
        expected,
        counters.closed()
    );
}

// =============================================================================
// Real PNG Decoding
// =============================================================================

#[tokio::test]
async fn test_png_tile_decoder_end_to_end() {
    let factory = Arc::new(CountingImageDecoderFactory::default());
    let factories: Vec<Arc<dyn RegionDecoderFactory>> = vec![factory.clone()];
    let image = png_image("mem://gradient.png", 1200, 900);

    let decoder = create_tile_decoder(
        "test",
        image,
        IntSize::new(300, 225),
        &factories,
        Handle::current(),
    )
    .await
    .expect("PNG should be eligible");

    assert_eq!(
        decoder.image_info(),
        &ImageInfo::new(IntSize::new(1200, 900), "image/png")
    );
    assert_eq!(decoder.image_size(), IntSize::new(1200, 900));

    let tile = decoder
        .decode("k".to_string(), IntRect::new(0, 0, 600, 450), 2)
        .await
        .unwrap();
    assert_eq!((tile.width(), tile.height()), (300, 225));

    let tile = decoder
        .decode("k".to_string(), IntRect::new(600, 450, 1200, 900), 1)
        .await
        .unwrap();
    assert_eq!((tile.width(), tile.height()), (600, 450));
    assert!(!tile.is_recycled());
    assert_eq!(factory.counters.decodes(), 2);

    let decoder = Arc::new(decoder);
    let closing = Arc::clone(&decoder);
    tokio::task::spawn_blocking(move || {
        closing.close();
        closing.close();
    })
    .await
    .unwrap();
    assert!(decoder.is_closed());
    assert_eq!(factory.counters.closed(), 1);

    let err = decoder
        .decode("k".to_string(), IntRect::new(0, 0, 10, 10), 1)
        .await
        .unwrap_err();
    assert!(matches!(err, DecodeError::Closed));
}

#[tokio::test]
async fn test_region_outside_image_fails() {
    let decoder = create_tile_decoder(
        "test",
        png_image("mem://small.png", 400, 300),
        IntSize::new(100, 75),
        &[],
        Handle::current(),
    )
    .await
    .unwrap();

    let err = decoder
        .decode("k".to_string(), IntRect::new(300, 200, 500, 400), 1)
        .await
        .unwrap_err();
    assert!(matches!(err, DecodeError::Decode { .. }));
}

#[tokio::test]
async fn test_file_source_end_to_end() {
    let path = std::env::temp_dir().join(format!(
        "subsampling-decoder-test-{}.png",
        std::process::id()
    ));
    tokio::fs::write(&path, create_png(640, 480)).await.unwrap();

    let image = SubsamplingImage::new(Arc::new(FileImageSource::new(&path)));
    let result = create_tile_decoder(
        "test",
        image,
        IntSize::new(320, 240),
        &[],
        Handle::current(),
    )
    .await;
    tokio::fs::remove_file(&path).await.unwrap();

    let decoder = result.unwrap();
    assert_eq!(decoder.image_size(), IntSize::new(640, 480));
    assert!(decoder.subsampling_image().key().starts_with("file://"));
}

// =============================================================================
// Eligibility and Failures
// =============================================================================

#[tokio::test]
async fn test_hint_rejected_before_opening() {
    let factory = Arc::new(CountingImageDecoderFactory::default());
    let factories: Vec<Arc<dyn RegionDecoderFactory>> = vec![factory.clone()];
    let image = SubsamplingImage::with_image_info(
        Arc::new(BytesImageSource::new("mem://hinted", create_png(120, 90))),
        ImageInfo::new(IntSize::new(1200, 900), "image/png"),
    );

    let err = create_tile_decoder("test", image, IntSize::new(400, 400), &factories, Handle::current())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CreateTileDecoderError::Eligibility(EligibilityError::AspectRatioMismatch { .. })
    ));
    assert_eq!(factory.counters.created(), 0);
}

#[tokio::test]
async fn test_decoded_info_rejected_after_opening() {
    let factory = Arc::new(CountingImageDecoderFactory::default());
    let factories: Vec<Arc<dyn RegionDecoderFactory>> = vec![factory.clone()];

    // Content as large as the image leaves nothing to subsample
    let err = create_tile_decoder(
        "test",
        png_image("mem://full.png", 200, 150),
        IntSize::new(200, 150),
        &factories,
        Handle::current(),
    )
    .await
    .unwrap_err();
    assert!(matches!(
        err,
        CreateTileDecoderError::Eligibility(EligibilityError::InvalidContent { .. })
    ));
    assert_eq!(factory.counters.created(), 1);
    wait_for_closed(&factory.counters, 1).await;
}

#[tokio::test]
async fn test_unrecognized_data_fails_to_open() {
    let factory = Arc::new(CountingImageDecoderFactory::default());
    let factories: Vec<Arc<dyn RegionDecoderFactory>> = vec![factory.clone()];
    let image = SubsamplingImage::new(Arc::new(BytesImageSource::new(
        "mem://garbage",
        Bytes::from_static(b"definitely not an image"),
    )));

    let err = create_tile_decoder("test", image, IntSize::new(10, 10), &factories, Handle::current())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CreateTileDecoderError::Decode(DecodeError::UnsupportedFormat { .. })
    ));
    assert!(!err.is_cancelled());
    wait_for_closed(&factory.counters, 1).await;
}

#[tokio::test]
async fn test_missing_file_fails_with_not_found() {
    let path = std::env::temp_dir().join("subsampling-does-not-exist.png");
    let image = SubsamplingImage::new(Arc::new(FileImageSource::new(path)));

    let err = create_tile_decoder("test", image, IntSize::new(10, 10), &[], Handle::current())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CreateTileDecoderError::Decode(DecodeError::Io(IoError::NotFound(_)))
    ));
}
