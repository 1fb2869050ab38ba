//! The subsampling engine: ties one image, its decoder and its tiles to the
//! display inputs of a zoomable view.
//!
//! # Architecture
//!
//! ```text
//!  container size ─┐ (debounced)
//!  content size ───┤
//!  transform ──────┼──► forwarders ──► CoreEvent channel ◄── decoder build
//!  continuous type ┤                         │          ◄── tile decodes
//!  lifecycle ──────┘                         ▼
//!                              ┌───────────────────────────┐
//!                              │      SubsamplingCore      │
//!                              │   (main thread, &mut)     │
//!                              │ TileDecoder + TileManager │
//!                              └─────────────┬─────────────┘
//!                                            │ send_replace
//!                                            ▼
//!                              ReadyState / TilesState watches
//! ```
//!
//! # Components
//!
//! - [`SubsamplingCore`]: Owns the decoder and tile manager for one image
//! - [`SubsamplingInputs`] / [`InputSenders`]: The watched display inputs
//! - [`LifecycleState`]: Host lifecycle driving auto-stop
//! - [`MainThread`]: Guard rejecting mutation from other threads
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use subsampling::engine::{SubsamplingCore, SubsamplingInputs};
//! use subsampling::geometry::{IntSize, Offset, ScaleFactor, Transform};
//! use subsampling::source::{FileImageSource, SubsamplingImage};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let mut core = SubsamplingCore::new();
//!     let image = SubsamplingImage::new(Arc::new(FileImageSource::new("photo.jpg")));
//!     core.set_image(Some(image));
//!
//!     let (senders, inputs) =
//!         SubsamplingInputs::channel(IntSize::new(1080, 1920), IntSize::new(1080, 810));
//!     core.on_attached(inputs);
//!     core.run_until(|core| core.is_ready()).await;
//!
//!     // Zooming in is just another input value
//!     let zoom = Transform::new(ScaleFactor::uniform(3.0), Offset::ZERO, 0);
//!     let _ = senders.transform.send(zoom);
//!     core.tick().await;
//!     println!("sample size {}", core.sample_size());
//! }
//! ```

mod inputs;
mod main_thread;
mod subsampling_core;

pub use inputs::{InputSenders, LifecycleState, SubsamplingInputs, CONTAINER_SIZE_DEBOUNCE};
pub use main_thread::MainThread;
pub use subsampling_core::{ReadyState, SubsamplingCore, TilesState};
