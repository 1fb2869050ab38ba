//! Orchestration of one subsampled image.
//!
//! # States
//!
//! ```text
//! Detached ──on_attached──► NoImage ──set_image──► DecoderPending ──built──► Ready
//!    ▲                         ▲                        │                      │
//!    │                         └──set_image(None)───────┴──────────────────────┤
//!    └────────────────────────────── on_detached ─────────────────────────────┘
//! ```
//!
//! All state lives on the main thread. Decoder builds and tile decodes run
//! on the I/O runtime and report back as [`CoreEvent`]s, which the owner
//! applies by driving [`SubsamplingCore::tick`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::cache::{TileImageCache, TileImageCacheHelper};
use crate::decoder::{create_tile_decoder, RegionDecoderFactory, TileDecoder};
use crate::error::CreateTileDecoderError;
use crate::geometry::{content_visible_rect, IntOffset, IntRect, IntSize, Transform};
use crate::source::{ImageInfo, SubsamplingImage};
use crate::tile::{
    calculate_preferred_tile_size, ContinuousTransformType, TileAnimationSpec,
    TileDecodeListener, TileDecodeResult, TileManager, TileSizeHysteresis, TileSnapshot,
};

use super::inputs::{
    spawn_input_forwarders, spawn_lifecycle_forwarder, InputEvent, LifecycleState,
    SubsamplingInputs, CONTAINER_SIZE_DEBOUNCE,
};
use super::MainThread;

/// Label used in logs and handed to the tile manager.
const CALLER: &str = "SubsamplingCore";

// =============================================================================
// Events and Published State
// =============================================================================

/// Everything that reaches the core from other tasks.
#[derive(Debug)]
pub(crate) enum CoreEvent {
    /// From the input forwarders spawned under `subscription`.
    Input {
        subscription: u64,
        event: InputEvent,
    },
    TileDecoderCreated {
        request_id: u64,
        result: Result<TileDecoder, CreateTileDecoderError>,
    },
    TileDecoded(TileDecodeResult),
}

/// Readiness and image metadata, republished after every state change.
#[derive(Debug, Clone, Default)]
pub struct ReadyState {
    pub ready: bool,
    pub image_info: Option<ImageInfo>,
    pub tile_grid_size_map: BTreeMap<u32, IntOffset>,
}

/// What the renderer needs to draw tiles.
#[derive(Debug, Clone, Default)]
pub struct TilesState {
    pub foreground_tiles: Vec<TileSnapshot>,
    pub background_tiles: Vec<TileSnapshot>,
    pub sample_size: u32,
    pub image_load_rect: IntRect,
}

impl TilesState {
    /// There are foreground tiles and none of them is still waiting or loading.
    pub fn is_settled(&self) -> bool {
        !self.foreground_tiles.is_empty()
            && self
                .foreground_tiles
                .iter()
                .all(|tile| tile.state.is_settled())
    }
}

struct Attachment {
    io: Handle,
    subscription: u64,
    forwarders: Vec<JoinHandle<()>>,
}

// =============================================================================
// SubsamplingCore
// =============================================================================

/// Owns the tile decoder and tile manager of one displayed image and keeps
/// them in step with the display inputs.
pub struct SubsamplingCore {
    main_thread: MainThread,
    io: Option<Handle>,
    events_tx: UnboundedSender<CoreEvent>,
    events_rx: UnboundedReceiver<CoreEvent>,
    attachment: Option<Attachment>,
    lifecycle: Option<watch::Receiver<LifecycleState>>,
    lifecycle_forwarder: Option<JoinHandle<()>>,
    lifecycle_subscription: u64,
    last_subscription: u64,

    // Settings
    subsampling_image: Option<SubsamplingImage>,
    image_before_disabled: Option<SubsamplingImage>,
    disabled: bool,
    stopped: bool,
    stopped_by_lifecycle: bool,
    disabled_auto_stop_with_lifecycle: bool,
    region_decoders: Vec<Arc<dyn RegionDecoderFactory>>,
    cache_helper: Arc<TileImageCacheHelper>,
    tile_animation_spec: TileAnimationSpec,
    paused_continuous_transform_types: ContinuousTransformType,
    disabled_background_tiles: bool,
    tile_size_hysteresis: TileSizeHysteresis,
    container_size_debounce: Duration,

    // Inputs
    container_size: IntSize,
    content_size: IntSize,
    transform: Transform,
    continuous_transform_type: ContinuousTransformType,
    preferred_tile_size: IntSize,

    // Derived
    image_info: Option<ImageInfo>,
    tile_decoder: Option<Arc<TileDecoder>>,
    tile_manager: Option<TileManager>,
    build_request_id: u64,
    build_task: Option<AbortHandle>,
    cleanup: JoinSet<()>,

    ready_tx: watch::Sender<ReadyState>,
    tiles_tx: watch::Sender<TilesState>,
}

impl SubsamplingCore {
    /// Create a detached core bound to the current thread.
    ///
    /// Decoding runs on the runtime current at [`SubsamplingCore::on_attached`]
    /// unless one is set with [`SubsamplingCore::with_io_handle`].
    pub fn new() -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            main_thread: MainThread::current(),
            io: None,
            events_tx,
            events_rx,
            attachment: None,
            lifecycle: None,
            lifecycle_forwarder: None,
            lifecycle_subscription: 0,
            last_subscription: 0,
            subsampling_image: None,
            image_before_disabled: None,
            disabled: false,
            stopped: false,
            stopped_by_lifecycle: false,
            disabled_auto_stop_with_lifecycle: false,
            region_decoders: Vec::new(),
            cache_helper: Arc::new(TileImageCacheHelper::default()),
            tile_animation_spec: TileAnimationSpec::DEFAULT,
            paused_continuous_transform_types: ContinuousTransformType::DEFAULT_PAUSED,
            disabled_background_tiles: false,
            tile_size_hysteresis: TileSizeHysteresis::DEFAULT,
            container_size_debounce: CONTAINER_SIZE_DEBOUNCE,
            container_size: IntSize::ZERO,
            content_size: IntSize::ZERO,
            transform: Transform::IDENTITY,
            continuous_transform_type: ContinuousTransformType::empty(),
            preferred_tile_size: IntSize::ZERO,
            image_info: None,
            tile_decoder: None,
            tile_manager: None,
            build_request_id: 0,
            build_task: None,
            cleanup: JoinSet::new(),
            ready_tx: watch::Sender::new(ReadyState::default()),
            tiles_tx: watch::Sender::new(TilesState::default()),
        }
    }

    /// Run decoder work on `io` instead of the attaching runtime.
    pub fn with_io_handle(mut self, io: Handle) -> Self {
        self.io = Some(io);
        self
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn is_attached(&self) -> bool {
        self.attachment.is_some()
    }

    pub fn is_ready(&self) -> bool {
        self.ready_tx.borrow().ready
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// A tile decoder build is in flight.
    pub fn is_building(&self) -> bool {
        self.build_task.is_some()
    }

    pub fn subsampling_image(&self) -> Option<&SubsamplingImage> {
        self.subsampling_image.as_ref()
    }

    pub fn image_info(&self) -> Option<&ImageInfo> {
        self.image_info.as_ref()
    }

    pub fn tile_decoder(&self) -> Option<&Arc<TileDecoder>> {
        self.tile_decoder.as_ref()
    }

    pub fn tile_manager(&self) -> Option<&TileManager> {
        self.tile_manager.as_ref()
    }

    pub fn container_size(&self) -> IntSize {
        self.container_size
    }

    pub fn content_size(&self) -> IntSize {
        self.content_size
    }

    pub fn transform(&self) -> Transform {
        self.transform
    }

    pub fn continuous_transform_type(&self) -> ContinuousTransformType {
        self.continuous_transform_type
    }

    pub fn preferred_tile_size(&self) -> IntSize {
        self.preferred_tile_size
    }

    pub fn sample_size(&self) -> u32 {
        self.tile_manager
            .as_ref()
            .map_or(0, TileManager::sample_size)
    }

    pub fn image_load_rect(&self) -> IntRect {
        self.tile_manager
            .as_ref()
            .map_or(IntRect::ZERO, TileManager::image_load_rect)
    }

    pub fn foreground_tiles(&self) -> &[TileSnapshot] {
        self.tile_manager
            .as_ref()
            .map_or(&[][..], TileManager::foreground_tiles)
    }

    pub fn background_tiles(&self) -> &[TileSnapshot] {
        self.tile_manager
            .as_ref()
            .map_or(&[][..], TileManager::background_tiles)
    }

    pub fn tile_grid_size_map(&self) -> BTreeMap<u32, IntOffset> {
        self.tile_manager
            .as_ref()
            .map(|manager| manager.tile_grid_size_map().clone())
            .unwrap_or_default()
    }

    pub fn region_decoders(&self) -> &[Arc<dyn RegionDecoderFactory>] {
        &self.region_decoders
    }

    pub fn tile_image_cache(&self) -> Option<Arc<dyn TileImageCache>> {
        self.cache_helper.tile_image_cache()
    }

    pub fn is_disabled_tile_image_cache(&self) -> bool {
        self.cache_helper.is_disabled()
    }

    pub fn tile_animation_spec(&self) -> TileAnimationSpec {
        self.tile_animation_spec
    }

    pub fn paused_continuous_transform_types(&self) -> ContinuousTransformType {
        self.paused_continuous_transform_types
    }

    pub fn is_disabled_background_tiles(&self) -> bool {
        self.disabled_background_tiles
    }

    pub fn is_disabled_auto_stop_with_lifecycle(&self) -> bool {
        self.disabled_auto_stop_with_lifecycle
    }

    pub fn ready_state(&self) -> ReadyState {
        self.ready_tx.borrow().clone()
    }

    pub fn tiles_state(&self) -> TilesState {
        self.tiles_tx.borrow().clone()
    }

    /// Notified after every state-affecting operation, even when the value
    /// is unchanged.
    pub fn subscribe_ready(&self) -> watch::Receiver<ReadyState> {
        self.ready_tx.subscribe()
    }

    /// Notified whenever tiles, sample size or load rect change.
    pub fn subscribe_tiles(&self) -> watch::Receiver<TilesState> {
        self.tiles_tx.subscribe()
    }

    // =========================================================================
    // Settings
    // =========================================================================

    /// Replace the image. Returns `false` if nothing changed or the core is
    /// disabled.
    pub fn set_image(&mut self, image: Option<SubsamplingImage>) -> bool {
        self.main_thread.check("set_image");
        if self.disabled {
            debug!(caller = CALLER, "set_image. ignored, disabled");
            return false;
        }
        if self.subsampling_image == image {
            return false;
        }

        info!(
            caller = CALLER,
            from = ?self.subsampling_image.as_ref().map(SubsamplingImage::key),
            to = ?image.as_ref().map(SubsamplingImage::key),
            "set_image"
        );
        self.clean_tile_manager("set_image");
        self.clean_tile_decoder("set_image");
        self.subsampling_image = image;
        self.reset_tile_decoder("set_image");
        self.refresh_ready_state("set_image");
        true
    }

    /// Disabling tears the image down but remembers it; enabling restores it.
    pub fn set_disabled(&mut self, disabled: bool) {
        self.main_thread.check("set_disabled");
        if self.disabled == disabled {
            return;
        }
        if disabled {
            let image = self.subsampling_image.clone();
            self.set_image(None);
            self.image_before_disabled = image;
            self.disabled = true;
        } else {
            self.disabled = false;
            let image = self.image_before_disabled.take();
            self.set_image(image);
        }
        debug!(caller = CALLER, disabled, "set_disabled");
    }

    pub fn set_tile_image_cache(&mut self, cache: Option<Arc<dyn TileImageCache>>) {
        self.main_thread.check("set_tile_image_cache");
        self.cache_helper.set_tile_image_cache(cache);
    }

    pub fn set_disabled_tile_image_cache(&mut self, disabled: bool) {
        self.main_thread.check("set_disabled_tile_image_cache");
        self.cache_helper.set_disabled(disabled);
    }

    pub fn set_tile_animation_spec(&mut self, spec: TileAnimationSpec) {
        self.main_thread.check("set_tile_animation_spec");
        self.tile_animation_spec = spec;
        if let Some(manager) = self.tile_manager.as_mut() {
            manager.set_tile_animation_spec(spec);
        }
    }

    pub fn set_paused_continuous_transform_types(&mut self, types: ContinuousTransformType) {
        self.main_thread
            .check("set_paused_continuous_transform_types");
        if self.paused_continuous_transform_types == types {
            return;
        }
        self.paused_continuous_transform_types = types;
        if let Some(manager) = self.tile_manager.as_mut() {
            manager.set_paused_continuous_transform_types(types);
        }
        self.refresh_tiles("set_paused_continuous_transform_types");
    }

    pub fn set_disabled_background_tiles(&mut self, disabled: bool) {
        self.main_thread.check("set_disabled_background_tiles");
        self.disabled_background_tiles = disabled;
        if let Some(manager) = self.tile_manager.as_mut() {
            if manager.set_disabled_background_tiles(disabled).any() {
                self.publish_tiles();
            }
        }
    }

    /// Stopping releases every tile but keeps the decoder open.
    pub fn set_stopped(&mut self, stopped: bool) {
        self.main_thread.check("set_stopped");
        self.stopped_by_lifecycle = false;
        self.update_stopped(stopped);
    }

    fn update_stopped(&mut self, stopped: bool) {
        if self.stopped == stopped {
            return;
        }
        self.stopped = stopped;
        debug!(caller = CALLER, stopped, "set_stopped");
        if stopped {
            if let Some(manager) = self.tile_manager.as_mut() {
                manager.clean("stopped");
            }
        } else {
            self.refresh_tiles("resumed");
        }
        self.refresh_ready_state("set_stopped");
    }

    /// Follow a host lifecycle: stopped below `Started`, running otherwise.
    ///
    /// A stop caused by the previous lifecycle is lifted when it is replaced
    /// or removed. A stop requested through [`SubsamplingCore::set_stopped`]
    /// is kept.
    pub fn set_lifecycle(&mut self, lifecycle: Option<watch::Receiver<LifecycleState>>) {
        self.main_thread.check("set_lifecycle");
        self.unsubscribe_lifecycle();
        self.lifecycle = lifecycle;
        self.release_lifecycle_stop();
        if self.attachment.is_some() {
            self.subscribe_lifecycle();
        }
    }

    pub fn set_disabled_auto_stop_with_lifecycle(&mut self, disabled: bool) {
        self.main_thread
            .check("set_disabled_auto_stop_with_lifecycle");
        if self.disabled_auto_stop_with_lifecycle == disabled {
            return;
        }
        self.disabled_auto_stop_with_lifecycle = disabled;
        let Some(lifecycle) = self.lifecycle.as_ref() else {
            return;
        };
        if disabled {
            self.release_lifecycle_stop();
        } else {
            let state = *lifecycle.borrow();
            self.apply_lifecycle(state);
        }
    }

    /// Factories tried before the built-in decoder. Changing them rebuilds
    /// the tile decoder.
    pub fn set_region_decoders(&mut self, region_decoders: Vec<Arc<dyn RegionDecoderFactory>>) {
        self.main_thread.check("set_region_decoders");
        let unchanged = self.region_decoders.len() == region_decoders.len()
            && self
                .region_decoders
                .iter()
                .zip(&region_decoders)
                .all(|(a, b)| Arc::ptr_eq(a, b));
        if unchanged {
            return;
        }
        self.region_decoders = region_decoders;
        if self.subsampling_image.is_some() {
            self.reset_tile_decoder("set_region_decoders");
            self.refresh_ready_state("set_region_decoders");
        }
    }

    pub fn set_tile_size_hysteresis(&mut self, hysteresis: TileSizeHysteresis) {
        self.main_thread.check("set_tile_size_hysteresis");
        self.tile_size_hysteresis = hysteresis;
    }

    /// Applies from the next attach.
    pub fn set_container_size_debounce(&mut self, debounce: Duration) {
        self.main_thread.check("set_container_size_debounce");
        self.container_size_debounce = debounce;
    }

    // =========================================================================
    // Attach / Detach
    // =========================================================================

    /// Subscribe to `inputs` and start building the decoder.
    ///
    /// Must be called within a tokio runtime. Does nothing if already attached.
    pub fn on_attached(&mut self, mut inputs: SubsamplingInputs) {
        self.main_thread.check("on_attached");
        if self.attachment.is_some() {
            return;
        }
        let io = self.io.clone().unwrap_or_else(Handle::current);

        self.container_size = *inputs.container_size.borrow_and_update();
        self.preferred_tile_size = calculate_preferred_tile_size(self.container_size);
        self.content_size = *inputs.content_size.borrow_and_update();
        self.transform = *inputs.transform.borrow_and_update();
        self.continuous_transform_type = *inputs.continuous_transform_type.borrow_and_update();

        let subscription = self.next_subscription();
        let forwarders = spawn_input_forwarders(
            inputs,
            subscription,
            &self.events_tx,
            self.container_size_debounce,
        );
        self.attachment = Some(Attachment {
            io,
            subscription,
            forwarders,
        });
        info!(
            caller = CALLER,
            container_size = %self.container_size,
            content_size = %self.content_size,
            "Attached"
        );

        self.subscribe_lifecycle();
        self.reset_tile_decoder("on_attached");
        self.refresh_ready_state("on_attached");
    }

    /// Unsubscribe, cancel all work and release the decoder. Idempotent.
    pub fn on_detached(&mut self) {
        self.main_thread.check("on_detached");
        let Some(attachment) = self.attachment.take() else {
            return;
        };
        for forwarder in attachment.forwarders {
            forwarder.abort();
        }
        self.unsubscribe_lifecycle();

        self.clean_tile_manager("on_detached");
        self.clean_tile_decoder("on_detached");
        while let Ok(event) = self.events_rx.try_recv() {
            self.discard_event(event);
        }
        info!(caller = CALLER, "Detached");
        self.refresh_ready_state("on_detached");
    }

    fn next_subscription(&mut self) -> u64 {
        self.last_subscription += 1;
        self.last_subscription
    }

    fn subscribe_lifecycle(&mut self) {
        let subscription = self.next_subscription();
        let Some(lifecycle) = self.lifecycle.as_mut() else {
            return;
        };
        let state = *lifecycle.borrow_and_update();
        self.lifecycle_forwarder = Some(spawn_lifecycle_forwarder(
            lifecycle.clone(),
            subscription,
            &self.events_tx,
        ));
        self.lifecycle_subscription = subscription;
        self.apply_lifecycle(state);
    }

    fn unsubscribe_lifecycle(&mut self) {
        if let Some(forwarder) = self.lifecycle_forwarder.take() {
            forwarder.abort();
        }
        self.lifecycle_subscription = 0;
    }

    fn apply_lifecycle(&mut self, state: LifecycleState) {
        if self.disabled_auto_stop_with_lifecycle {
            return;
        }
        debug!(caller = CALLER, ?state, "Lifecycle changed");
        let stopped = !state.is_started();
        self.stopped_by_lifecycle = stopped;
        self.update_stopped(stopped);
    }

    fn release_lifecycle_stop(&mut self) {
        if self.stopped_by_lifecycle {
            self.stopped_by_lifecycle = false;
            self.update_stopped(false);
        }
    }

    // =========================================================================
    // Event Loop
    // =========================================================================

    /// Wait for the next event and apply it.
    pub async fn tick(&mut self) {
        self.main_thread.check("tick");
        // The core owns a sender, so the channel never closes.
        if let Some(event) = self.events_rx.recv().await {
            self.handle_event(event);
        }
    }

    /// Apply every event already queued. Returns how many were applied.
    pub fn drain_events(&mut self) -> usize {
        self.main_thread.check("drain_events");
        let mut count = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event);
            count += 1;
        }
        count
    }

    /// Tick until `done` holds.
    pub async fn run_until(&mut self, mut done: impl FnMut(&Self) -> bool) {
        while !done(self) {
            self.tick().await;
        }
    }

    /// Wait for every decoder close started so far.
    pub async fn wait_for_cleanup(&mut self) {
        while let Some(result) = self.cleanup.join_next().await {
            if let Err(e) = result {
                warn!(caller = CALLER, error = %e, "Tile decoder close task failed");
            }
        }
    }

    fn handle_event(&mut self, event: CoreEvent) {
        if self.attachment.is_none() {
            self.discard_event(event);
            return;
        }
        match event {
            CoreEvent::Input {
                subscription,
                event,
            } => self.on_input(subscription, event),
            CoreEvent::TileDecoderCreated { request_id, result } => {
                self.on_tile_decoder_created(request_id, result)
            }
            CoreEvent::TileDecoded(result) => self.on_tile_decoded(result),
        }
    }

    fn on_input(&mut self, subscription: u64, event: InputEvent) {
        let current = match event {
            InputEvent::Lifecycle(_) => self.lifecycle_subscription,
            _ => self
                .attachment
                .as_ref()
                .map_or(0, |attachment| attachment.subscription),
        };
        if subscription != current {
            debug!(caller = CALLER, subscription, current, ?event, "Dropping stale input");
            return;
        }
        match event {
            InputEvent::ContainerSize(size) => self.on_container_size_changed(size),
            InputEvent::ContentSize(size) => self.on_content_size_changed(size),
            InputEvent::Transform(transform) => {
                self.transform = transform;
                self.refresh_tiles("transform_changed");
            }
            InputEvent::ContinuousTransformType(continuous_transform_type) => {
                self.continuous_transform_type = continuous_transform_type;
                self.refresh_tiles("continuous_transform_type_changed");
            }
            InputEvent::Lifecycle(state) => self.apply_lifecycle(state),
        }
    }

    /// Release whatever an event carries without applying it.
    fn discard_event(&mut self, event: CoreEvent) {
        match event {
            CoreEvent::TileDecoderCreated {
                result: Ok(decoder),
                ..
            } => self.close_tile_decoder(Arc::new(decoder)),
            CoreEvent::TileDecoded(TileDecodeResult {
                result: Ok(tile_image),
                ..
            }) => tile_image.recycle(),
            _ => {}
        }
    }

    fn on_container_size_changed(&mut self, container_size: IntSize) {
        self.container_size = container_size;
        let preferred_tile_size = calculate_preferred_tile_size(container_size);
        if self
            .tile_size_hysteresis
            .check(self.preferred_tile_size, preferred_tile_size)
        {
            debug!(
                caller = CALLER,
                %container_size,
                from = %self.preferred_tile_size,
                to = %preferred_tile_size,
                "Preferred tile size changed"
            );
            self.preferred_tile_size = preferred_tile_size;
            self.reset_tile_manager("container_size_changed");
            self.refresh_ready_state("container_size_changed");
        } else {
            self.refresh_tiles("container_size_changed");
        }
    }

    fn on_content_size_changed(&mut self, content_size: IntSize) {
        if self.content_size == content_size {
            return;
        }
        debug!(caller = CALLER, from = %self.content_size, to = %content_size, "Content size changed");
        self.content_size = content_size;
        self.reset_tile_decoder("content_size_changed");
        self.refresh_ready_state("content_size_changed");
    }

    fn on_tile_decoder_created(
        &mut self,
        request_id: u64,
        result: Result<TileDecoder, CreateTileDecoderError>,
    ) {
        if request_id != self.build_request_id {
            debug!(caller = CALLER, request_id, "Dropping superseded tile decoder build");
            self.discard_event(CoreEvent::TileDecoderCreated { request_id, result });
            return;
        }
        self.build_task = None;

        let key = self
            .subsampling_image
            .as_ref()
            .map(|image| image.key().to_string())
            .unwrap_or_default();
        match result {
            Ok(decoder) => {
                info!(caller = CALLER, %key, image_info = %decoder.image_info(), "Tile decoder ready");
                self.image_info = Some(decoder.image_info().clone());
                self.tile_decoder = Some(Arc::new(decoder));
                self.reset_tile_manager("tile_decoder_created");
            }
            Err(e) if e.is_cancelled() => {
                debug!(caller = CALLER, %key, "Tile decoder build cancelled");
            }
            Err(e) => {
                error!(caller = CALLER, %key, error = %e, "Failed to create tile decoder");
            }
        }
        self.refresh_ready_state("tile_decoder_created");
    }

    fn on_tile_decoded(&mut self, result: TileDecodeResult) {
        let Some(manager) = self.tile_manager.as_mut() else {
            self.discard_event(CoreEvent::TileDecoded(result));
            return;
        };
        if manager.on_tile_decoded(result).any() {
            self.publish_tiles();
        }
    }

    // =========================================================================
    // Decoder and Manager Lifecycle
    // =========================================================================

    /// Start building a decoder for the current image, if everything it
    /// needs is known.
    fn reset_tile_decoder(&mut self, caller: &str) {
        self.clean_tile_manager(caller);
        self.clean_tile_decoder(caller);

        let Some(attachment) = self.attachment.as_ref() else {
            return;
        };
        let Some(image) = self.subsampling_image.clone() else {
            return;
        };
        if self.content_size.is_empty() {
            debug!(caller, key = %image.key(), "reset_tile_decoder. content size unknown");
            return;
        }

        self.build_request_id += 1;
        let request_id = self.build_request_id;
        let io = attachment.io.clone();
        let events = self.events_tx.clone();
        let region_decoders = self.region_decoders.clone();
        let content_size = self.content_size;
        let label = caller.to_string();
        debug!(caller, key = %image.key(), request_id, "Building tile decoder");
        let task = attachment.io.spawn(async move {
            let result = create_tile_decoder(&label, image, content_size, &region_decoders, io).await;
            let _ = events.send(CoreEvent::TileDecoderCreated { request_id, result });
        });
        self.build_task = Some(task.abort_handle());
    }

    fn clean_tile_decoder(&mut self, caller: &str) {
        if let Some(task) = self.build_task.take() {
            task.abort();
            debug!(caller, "Cancelled tile decoder build");
        }
        // Any build result still in flight is now stale
        self.build_request_id += 1;
        if let Some(decoder) = self.tile_decoder.take() {
            self.close_tile_decoder(decoder);
        }
        self.image_info = None;
    }

    /// Close `decoder` on its blocking pool without waiting.
    fn close_tile_decoder(&mut self, decoder: Arc<TileDecoder>) {
        while self.cleanup.try_join_next().is_some() {}
        let io = decoder.io_handle().clone();
        self.cleanup.spawn_blocking_on(move || decoder.close(), &io);
    }

    fn reset_tile_manager(&mut self, caller: &str) {
        self.clean_tile_manager(caller);

        let Some(tile_decoder) = self.tile_decoder.clone() else {
            return;
        };
        if self.preferred_tile_size.is_empty() || self.content_size.is_empty() {
            debug!(
                caller,
                preferred_tile_size = %self.preferred_tile_size,
                content_size = %self.content_size,
                "reset_tile_manager. sizes unknown"
            );
            return;
        }

        let events = self.events_tx.clone();
        let listener: TileDecodeListener = Arc::new(move |result| {
            let _ = events.send(CoreEvent::TileDecoded(result));
        });
        let mut manager = TileManager::new(
            CALLER,
            tile_decoder,
            self.content_size,
            self.preferred_tile_size,
            Arc::clone(&self.cache_helper),
            listener,
        );
        manager.set_paused_continuous_transform_types(self.paused_continuous_transform_types);
        manager.set_disabled_background_tiles(self.disabled_background_tiles);
        manager.set_tile_animation_spec(self.tile_animation_spec);
        self.tile_manager = Some(manager);
        self.refresh_tiles(caller);
    }

    fn clean_tile_manager(&mut self, caller: &str) {
        if let Some(mut manager) = self.tile_manager.take() {
            manager.clean(caller);
            self.publish_tiles();
        }
    }

    fn refresh_tiles(&mut self, caller: &str) {
        if self.stopped {
            return;
        }
        let visible = content_visible_rect(self.container_size, self.content_size, &self.transform);
        let scale = self.transform.scale_x();
        let rotation = self.transform.rotation;
        let continuous_transform_type = self.continuous_transform_type;
        let Some(manager) = self.tile_manager.as_mut() else {
            return;
        };
        if manager
            .refresh_tiles(scale, visible, rotation, continuous_transform_type, caller)
            .any()
        {
            self.publish_tiles();
        }
    }

    // =========================================================================
    // Publishing
    // =========================================================================

    fn refresh_ready_state(&mut self, caller: &str) {
        let ready = self.image_info.is_some()
            && self.tile_manager.is_some()
            && self.tile_decoder.is_some()
            && !self.stopped;
        debug!(caller, ready, "refresh_ready_state");
        self.ready_tx.send_replace(ReadyState {
            ready,
            image_info: self.image_info.clone(),
            tile_grid_size_map: self.tile_grid_size_map(),
        });
        self.publish_tiles();
    }

    fn publish_tiles(&mut self) {
        let state = match self.tile_manager.as_ref() {
            Some(manager) => TilesState {
                foreground_tiles: manager.foreground_tiles().to_vec(),
                background_tiles: manager.background_tiles().to_vec(),
                sample_size: manager.sample_size(),
                image_load_rect: manager.image_load_rect(),
            },
            None => TilesState::default(),
        };
        self.tiles_tx.send_replace(state);
    }
}

impl Default for SubsamplingCore {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SubsamplingCore {
    fn drop(&mut self) {
        if let Some(attachment) = self.attachment.take() {
            for forwarder in attachment.forwarders {
                forwarder.abort();
            }
        }
        if let Some(forwarder) = self.lifecycle_forwarder.take() {
            forwarder.abort();
        }
        if let Some(task) = self.build_task.take() {
            task.abort();
        }
        self.tile_manager = None;
        if let Some(decoder) = self.tile_decoder.take() {
            let io = decoder.io_handle().clone();
            io.spawn_blocking(move || decoder.close());
        }
        // Let pending closes finish on their own
        self.cleanup.detach_all();
    }
}

impl std::fmt::Debug for SubsamplingCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubsamplingCore")
            .field("image", &self.subsampling_image)
            .field("attached", &self.is_attached())
            .field("ready", &self.is_ready())
            .field("disabled", &self.disabled)
            .field("stopped", &self.stopped)
            .field("container_size", &self.container_size)
            .field("content_size", &self.content_size)
            .field("sample_size", &self.sample_size())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
