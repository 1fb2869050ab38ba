//! Tile decoder lifecycle.
//!
//! A [`TileDecoder`] wraps exactly one prepared [`RegionDecoder`]. Decodes
//! run on the I/O runtime's blocking pool and are serialized by a mutex, so
//! [`TileDecoder::close`] waits for an in-flight decode instead of tearing
//! the decoder down underneath it.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::error::{CreateTileDecoderError, DecodeError};
use crate::geometry::{IntRect, IntSize};
use crate::source::{ImageInfo, SubsamplingImage};
use crate::tile::check_image_info;

use super::{ImageRegionDecoderFactory, RegionDecoder, RegionDecoderFactory, TileImageRef};

// =============================================================================
// TileDecoder
// =============================================================================

/// Owns the opened region decoder of one image.
pub struct TileDecoder {
    subsampling_image: SubsamplingImage,
    image_info: ImageInfo,
    decoder: Arc<Mutex<Option<Box<dyn RegionDecoder>>>>,
    io: Handle,
}

impl TileDecoder {
    /// Wrap an already prepared decoder.
    pub fn new(
        subsampling_image: SubsamplingImage,
        image_info: ImageInfo,
        decoder: Box<dyn RegionDecoder>,
        io: Handle,
    ) -> Self {
        Self {
            subsampling_image,
            image_info,
            decoder: Arc::new(Mutex::new(Some(decoder))),
            io,
        }
    }

    pub fn subsampling_image(&self) -> &SubsamplingImage {
        &self.subsampling_image
    }

    /// The size and format reported by the opened decoder.
    pub fn image_info(&self) -> &ImageInfo {
        &self.image_info
    }

    pub fn image_size(&self) -> IntSize {
        self.image_info.size
    }

    /// Handle of the runtime decodes run on.
    pub fn io_handle(&self) -> &Handle {
        &self.io
    }

    /// Decode one region on the blocking pool.
    pub async fn decode(
        &self,
        key: String,
        src_rect: IntRect,
        sample_size: u32,
    ) -> Result<TileImageRef, DecodeError> {
        let decoder = Arc::clone(&self.decoder);
        self.io
            .spawn_blocking(move || {
                let mut guard = decoder.lock().unwrap_or_else(PoisonError::into_inner);
                match guard.as_mut() {
                    Some(decoder) => decoder.decode_region(&key, src_rect, sample_size),
                    None => Err(DecodeError::Closed),
                }
            })
            .await?
    }

    pub fn is_closed(&self) -> bool {
        self.decoder
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Close the region decoder. Blocks until an in-flight decode finishes;
    /// call it from the blocking pool. Idempotent.
    pub fn close(&self) {
        let decoder = self
            .decoder
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(mut decoder) = decoder {
            decoder.close();
            debug!(key = %self.subsampling_image.key(), "Tile decoder closed");
        }
    }
}

impl std::fmt::Debug for TileDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileDecoder")
            .field("image", &self.subsampling_image)
            .field("image_info", &self.image_info)
            .field("closed", &self.is_closed())
            .finish()
    }
}

// =============================================================================
// Creation
// =============================================================================

/// Closes a region decoder unless it is handed off.
///
/// Keeps a half-built decoder from leaking when preparation fails or the
/// build task is cancelled.
struct CloseOnDrop(Option<Box<dyn RegionDecoder>>);

impl CloseOnDrop {
    fn get_mut(&mut self) -> Result<&mut Box<dyn RegionDecoder>, DecodeError> {
        self.0.as_mut().ok_or(DecodeError::Closed)
    }

    fn into_inner(mut self) -> Option<Box<dyn RegionDecoder>> {
        self.0.take()
    }
}

impl Drop for CloseOnDrop {
    fn drop(&mut self) {
        if let Some(mut decoder) = self.0.take() {
            decoder.close();
        }
    }
}

/// Pick the first factory accepting `image`, falling back to the built-in
/// [`ImageRegionDecoderFactory`].
///
/// # Panics
///
/// Panics if no factory accepts the image, which cannot happen while the
/// default factory accepts everything.
pub fn select_region_decoder_factory(
    image: &SubsamplingImage,
    region_decoders: &[Arc<dyn RegionDecoderFactory>],
) -> Arc<dyn RegionDecoderFactory> {
    let default: Arc<dyn RegionDecoderFactory> = Arc::new(ImageRegionDecoderFactory::new());
    region_decoders
        .iter()
        .cloned()
        .chain(std::iter::once(default))
        .find(|factory| factory.accept(image))
        .unwrap_or_else(|| panic!("NoDecoderFound: no region decoder accepts {}", image.key()))
}

/// Open and validate a [`TileDecoder`] for `image` displayed at `content_size`.
///
/// 1. Selects the region decoder factory.
/// 2. Validates the external [`ImageInfo`] hint, if any, before any I/O.
/// 3. Opens the source and prepares the decoder on the I/O runtime.
/// 4. Re-validates with the decoder's own [`ImageInfo`] when it differs.
///
/// A decoder that fails any step after creation is closed before the error
/// is returned.
pub async fn create_tile_decoder(
    caller: &str,
    image: SubsamplingImage,
    content_size: IntSize,
    region_decoders: &[Arc<dyn RegionDecoderFactory>],
    io: Handle,
) -> Result<TileDecoder, CreateTileDecoderError> {
    let factory = select_region_decoder_factory(&image, region_decoders);

    if let Some(ref hint) = image.image_info {
        check_image_info(hint, factory.as_ref(), content_size)?;
    }

    let source = image.source.create().await.map_err(DecodeError::from)?;
    let data = source.open_source().await.map_err(DecodeError::from)?;

    let open_image = image.clone();
    let open_factory = Arc::clone(&factory);
    let (decoder, image_info) = io
        .spawn_blocking(move || -> Result<_, DecodeError> {
            let mut guard = CloseOnDrop(Some(open_factory.create(&open_image, data)?));
            guard.get_mut()?.prepare()?;
            let image_info = guard.get_mut()?.image_info().ok_or_else(|| {
                DecodeError::Decode {
                    message: "decoder reported no image info after prepare".to_string(),
                }
            })?;
            Ok((guard, image_info))
        })
        .await
        .map_err(DecodeError::from)??;

    if image.image_info.as_ref() != Some(&image_info) {
        if let Err(e) = check_image_info(&image_info, factory.as_ref(), content_size) {
            warn!(
                caller,
                key = %image.key(),
                %image_info,
                "Decoded image info failed the subsampling check"
            );
            // Dropping the guard closes the decoder; do it off the caller.
            io.spawn_blocking(move || drop(decoder));
            return Err(e.into());
        }
    }

    let decoder = decoder.into_inner().ok_or(DecodeError::Closed)?;
    debug!(caller, key = %image.key(), %image_info, "Tile decoder ready");
    Ok(TileDecoder::new(image, image_info, decoder, io))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::RgbaTileImage;
    use crate::error::EligibilityError;
    use crate::source::BytesImageSource;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Mock decoder reporting a fixed image info
    struct MockDecoder {
        image_info: ImageInfo,
        fail_prepare: bool,
        closed: Arc<AtomicBool>,
        decodes: Arc<AtomicUsize>,
    }

    impl RegionDecoder for MockDecoder {
        fn image_info(&self) -> Option<ImageInfo> {
            Some(self.image_info.clone())
        }

        fn prepare(&mut self) -> Result<(), DecodeError> {
            if self.fail_prepare {
                Err(DecodeError::Decode {
                    message: "prepare failed".to_string(),
                })
            } else {
                Ok(())
            }
        }

        fn decode_region(
            &mut self,
            _key: &str,
            src_rect: IntRect,
            sample_size: u32,
        ) -> Result<TileImageRef, DecodeError> {
            self.decodes.fetch_add(1, Ordering::SeqCst);
            let width = (src_rect.width() as u32).div_ceil(sample_size);
            let height = (src_rect.height() as u32).div_ceil(sample_size);
            Ok(Arc::new(RgbaTileImage::new(image::RgbaImage::new(
                width, height,
            ))))
        }

        fn close(&mut self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    struct MockFactory {
        image_info: ImageInfo,
        fail_prepare: bool,
        supported: Option<bool>,
        closed: Arc<AtomicBool>,
        decodes: Arc<AtomicUsize>,
    }

    impl MockFactory {
        fn new(size: IntSize) -> Self {
            Self {
                image_info: ImageInfo::new(size, "image/jpeg"),
                fail_prepare: false,
                supported: Some(true),
                closed: Arc::new(AtomicBool::new(false)),
                decodes: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl RegionDecoderFactory for MockFactory {
        fn accept(&self, _image: &SubsamplingImage) -> bool {
            true
        }

        fn check_support(&self, _mime_type: &str) -> Option<bool> {
            self.supported
        }

        fn create(
            &self,
            _image: &SubsamplingImage,
            _data: Bytes,
        ) -> Result<Box<dyn RegionDecoder>, DecodeError> {
            Ok(Box::new(MockDecoder {
                image_info: self.image_info.clone(),
                fail_prepare: self.fail_prepare,
                closed: Arc::clone(&self.closed),
                decodes: Arc::clone(&self.decodes),
            }))
        }
    }

    fn test_image() -> SubsamplingImage {
        SubsamplingImage::new(Arc::new(BytesImageSource::new("mock://image", vec![0u8; 8])))
    }

    #[test]
    fn test_select_prefers_custom_factory() {
        let custom: Arc<dyn RegionDecoderFactory> = Arc::new(MockFactory::new(IntSize::new(10, 10)));
        let selected = select_region_decoder_factory(&test_image(), &[Arc::clone(&custom)]);
        assert!(Arc::ptr_eq(&selected, &custom));
    }

    #[test]
    fn test_select_falls_back_to_default() {
        let selected = select_region_decoder_factory(&test_image(), &[]);
        assert_eq!(selected.check_support("image/png"), Some(true));
    }

    #[tokio::test]
    async fn test_create_and_decode() {
        let factory = Arc::new(MockFactory::new(IntSize::new(4000, 3000)));
        let decodes = Arc::clone(&factory.decodes);
        let factories: Vec<Arc<dyn RegionDecoderFactory>> = vec![factory];

        let decoder = create_tile_decoder(
            "test",
            test_image(),
            IntSize::new(400, 300),
            &factories,
            Handle::current(),
        )
        .await
        .unwrap();
        assert_eq!(decoder.image_size(), IntSize::new(4000, 3000));

        let tile = decoder
            .decode("k".to_string(), IntRect::new(0, 0, 1000, 1000), 4)
            .await
            .unwrap();
        assert_eq!((tile.width(), tile.height()), (250, 250));
        assert_eq!(decodes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_close_rejects_later_decodes() {
        let factory = Arc::new(MockFactory::new(IntSize::new(4000, 3000)));
        let closed = Arc::clone(&factory.closed);
        let factories: Vec<Arc<dyn RegionDecoderFactory>> = vec![factory];

        let decoder = create_tile_decoder(
            "test",
            test_image(),
            IntSize::new(400, 300),
            &factories,
            Handle::current(),
        )
        .await
        .unwrap();

        decoder.close();
        decoder.close();
        assert!(closed.load(Ordering::SeqCst));
        assert!(decoder.is_closed());

        let err = decoder
            .decode("k".to_string(), IntRect::new(0, 0, 10, 10), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, DecodeError::Closed));
    }

    #[tokio::test]
    async fn test_failed_prepare_closes_decoder() {
        let mut factory = MockFactory::new(IntSize::new(4000, 3000));
        factory.fail_prepare = true;
        let closed = Arc::clone(&factory.closed);
        let factories: Vec<Arc<dyn RegionDecoderFactory>> = vec![Arc::new(factory)];

        let err = create_tile_decoder(
            "test",
            test_image(),
            IntSize::new(400, 300),
            &factories,
            Handle::current(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CreateTileDecoderError::Decode(_)));
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_bad_hint_fails_before_opening() {
        let factory = Arc::new(MockFactory::new(IntSize::new(4000, 3000)));
        let decodes = Arc::clone(&factory.decodes);
        let factories: Vec<Arc<dyn RegionDecoderFactory>> = vec![factory];

        // Hint says the content is as large as the image
        let image = SubsamplingImage::with_image_info(
            test_image().source,
            ImageInfo::new(IntSize::new(400, 300), "image/jpeg"),
        );
        let err = create_tile_decoder(
            "test",
            image,
            IntSize::new(400, 300),
            &factories,
            Handle::current(),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            CreateTileDecoderError::Eligibility(EligibilityError::InvalidContent { .. })
        ));
        assert_eq!(decodes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_decoded_info_is_rechecked() {
        // Decoder reports an image whose aspect ratio does not match the content
        let factory = Arc::new(MockFactory::new(IntSize::new(4000, 1000)));
        let closed = Arc::clone(&factory.closed);
        let factories: Vec<Arc<dyn RegionDecoderFactory>> = vec![factory];

        let err = create_tile_decoder(
            "test",
            test_image(),
            IntSize::new(400, 300),
            &factories,
            Handle::current(),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            CreateTileDecoderError::Eligibility(EligibilityError::AspectRatioMismatch { .. })
        ));

        // The rejected decoder is closed off the caller; give the pool a moment
        for _ in 0..100 {
            if closed.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_unsupported_mime_type() {
        let mut factory = MockFactory::new(IntSize::new(4000, 3000));
        factory.supported = Some(false);
        let factories: Vec<Arc<dyn RegionDecoderFactory>> = vec![Arc::new(factory)];

        let err = create_tile_decoder(
            "test",
            test_image(),
            IntSize::new(400, 300),
            &factories,
            Handle::current(),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            CreateTileDecoderError::Eligibility(EligibilityError::UnsupportedFormat { .. })
        ));
    }
}
