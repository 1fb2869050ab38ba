//! Geometry value types and transform math.
//!
//! Everything the tiling logic decides is expressed in these small `Copy`
//! types: integer sizes, offsets and rects in image or content pixels, their
//! float counterparts for display-space math, and [`ScaleFactor`].
//!
//! # Rotation in space
//!
//! A rect can be rotated by a multiple of 90° *within* a bounding space. The
//! result lives in the rotated space (width and height swapped for 90° and
//! 270°). [`IntRect::reverse_rotate_in_space`] undoes the rotation given the
//! original, unrotated space size:
//!
//! ```
//! use subsampling::geometry::{IntRect, IntSize};
//!
//! let space = IntSize::new(400, 300);
//! let rect = IntRect::new(10, 20, 110, 70);
//! let rotated = rect.rotate_in_space(space, 90);
//! assert_eq!(rotated, IntRect::new(230, 10, 280, 110));
//! assert_eq!(rotated.reverse_rotate_in_space(space, 90), rect);
//! ```
//!
//! Rotations that are not a multiple of 90° are a contract violation and
//! panic.

mod float;
mod int;
mod transform;

pub use float::{Offset, Rect, ScaleFactor, Size};
pub use int::{IntOffset, IntRect, IntSize};
pub use transform::{content_visible_rect, Transform};

/// Normalize a rotation to `0`, `90`, `180` or `270`.
///
/// # Panics
///
/// Panics if `rotation` is not a multiple of 90.
pub fn normalize_rotation(rotation: i32) -> i32 {
    assert!(
        rotation % 90 == 0,
        "InvalidArgument: rotation must be a multiple of 90, got {}",
        rotation
    );
    rotation.rem_euclid(360)
}
