//! External signal streams and their forwarders.

use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::geometry::{IntSize, Transform};
use crate::tile::ContinuousTransformType;

use super::subsampling_core::CoreEvent;

/// Quiet period before a container size change is applied.
pub const CONTAINER_SIZE_DEBOUNCE: Duration = Duration::from_millis(80);

// =============================================================================
// Lifecycle
// =============================================================================

/// Host UI lifecycle, ordered from dead to fully active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LifecycleState {
    Destroyed,
    Initialized,
    Created,
    Started,
    Resumed,
}

impl LifecycleState {
    pub fn is_at_least(self, state: LifecycleState) -> bool {
        self >= state
    }

    /// Visible on screen; tiles should load.
    pub fn is_started(self) -> bool {
        self.is_at_least(LifecycleState::Started)
    }
}

// =============================================================================
// Inputs
// =============================================================================

/// The four signal streams a zoom engine feeds into the core.
#[derive(Debug, Clone)]
pub struct SubsamplingInputs {
    pub container_size: watch::Receiver<IntSize>,
    pub content_size: watch::Receiver<IntSize>,
    pub transform: watch::Receiver<Transform>,
    pub continuous_transform_type: watch::Receiver<ContinuousTransformType>,
}

/// Sending halves matching a [`SubsamplingInputs`].
#[derive(Debug)]
pub struct InputSenders {
    pub container_size: watch::Sender<IntSize>,
    pub content_size: watch::Sender<IntSize>,
    pub transform: watch::Sender<Transform>,
    pub continuous_transform_type: watch::Sender<ContinuousTransformType>,
}

impl SubsamplingInputs {
    /// Create connected inputs starting from the given sizes, an identity
    /// transform and no continuous transform.
    pub fn channel(container_size: IntSize, content_size: IntSize) -> (InputSenders, Self) {
        let (container_tx, container_rx) = watch::channel(container_size);
        let (content_tx, content_rx) = watch::channel(content_size);
        let (transform_tx, transform_rx) = watch::channel(Transform::IDENTITY);
        let (continuous_tx, continuous_rx) = watch::channel(ContinuousTransformType::empty());
        (
            InputSenders {
                container_size: container_tx,
                content_size: content_tx,
                transform: transform_tx,
                continuous_transform_type: continuous_tx,
            },
            SubsamplingInputs {
                container_size: container_rx,
                content_size: content_rx,
                transform: transform_rx,
                continuous_transform_type: continuous_rx,
            },
        )
    }
}

// =============================================================================
// Forwarders
// =============================================================================

/// One change on an input stream.
#[derive(Debug, Clone, Copy)]
pub(crate) enum InputEvent {
    ContainerSize(IntSize),
    ContentSize(IntSize),
    Transform(Transform),
    ContinuousTransformType(ContinuousTransformType),
    Lifecycle(LifecycleState),
}

/// Tags what a forwarder sends with the subscription that spawned it.
#[derive(Clone)]
struct InputSink {
    subscription: u64,
    events: UnboundedSender<CoreEvent>,
}

impl InputSink {
    fn send(&self, event: InputEvent) -> bool {
        self.events
            .send(CoreEvent::Input {
                subscription: self.subscription,
                event,
            })
            .is_ok()
    }
}

/// Spawn one forwarder per stream, subscribing in order: container size,
/// content size, transform, continuous transform type. Every event carries
/// `subscription`.
///
/// Must be called within a tokio runtime.
pub(crate) fn spawn_input_forwarders(
    inputs: SubsamplingInputs,
    subscription: u64,
    events: &UnboundedSender<CoreEvent>,
    container_size_debounce: Duration,
) -> Vec<JoinHandle<()>> {
    let sink = InputSink {
        subscription,
        events: events.clone(),
    };
    let SubsamplingInputs {
        container_size,
        content_size,
        transform,
        continuous_transform_type,
    } = inputs;
    vec![
        tokio::spawn(forward_debounced(
            container_size,
            sink.clone(),
            container_size_debounce,
            InputEvent::ContainerSize,
        )),
        tokio::spawn(forward(content_size, sink.clone(), InputEvent::ContentSize)),
        tokio::spawn(forward(transform, sink.clone(), InputEvent::Transform)),
        tokio::spawn(forward(
            continuous_transform_type,
            sink,
            InputEvent::ContinuousTransformType,
        )),
    ]
}

pub(crate) fn spawn_lifecycle_forwarder(
    lifecycle: watch::Receiver<LifecycleState>,
    subscription: u64,
    events: &UnboundedSender<CoreEvent>,
) -> JoinHandle<()> {
    let sink = InputSink {
        subscription,
        events: events.clone(),
    };
    tokio::spawn(forward(lifecycle, sink, InputEvent::Lifecycle))
}

/// Forward every change the receiver has not seen yet.
async fn forward<T>(
    mut rx: watch::Receiver<T>,
    sink: InputSink,
    wrap: fn(T) -> InputEvent,
) where
    T: Clone + Send + Sync,
{
    while rx.changed().await.is_ok() {
        let value = rx.borrow_and_update().clone();
        if !sink.send(wrap(value)) {
            break;
        }
    }
}

/// Forward the latest value once the stream has been quiet for `debounce`.
async fn forward_debounced<T>(
    mut rx: watch::Receiver<T>,
    sink: InputSink,
    debounce: Duration,
    wrap: fn(T) -> InputEvent,
) where
    T: Clone + Send + Sync,
{
    while rx.changed().await.is_ok() {
        let mut closed = false;
        loop {
            match tokio::time::timeout(debounce, rx.changed()).await {
                Ok(Ok(())) => continue,
                Ok(Err(_)) => {
                    closed = true;
                    break;
                }
                Err(_) => break,
            }
        }

        let value = rx.borrow_and_update().clone();
        if !sink.send(wrap(value)) || closed {
            break;
        }
    }
}
