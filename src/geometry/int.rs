use std::fmt;
use std::ops::{Add, Div, Mul, Sub};

use super::{normalize_rotation, Rect, ScaleFactor, Size};

// =============================================================================
// IntSize
// =============================================================================

/// Integer width and height in pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct IntSize {
    pub width: i32,
    pub height: i32,
}

impl IntSize {
    pub const ZERO: IntSize = IntSize {
        width: 0,
        height: 0,
    };

    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    /// A size is empty when either dimension is not positive.
    pub const fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub const fn is_not_empty(&self) -> bool {
        !self.is_empty()
    }

    /// Swap width and height for 90° and 270° rotations.
    pub fn rotate(self, rotation: i32) -> IntSize {
        match normalize_rotation(rotation) {
            90 | 270 => IntSize::new(self.height, self.width),
            _ => self,
        }
    }

    pub fn to_size(self) -> Size {
        Size::new(self.width as f32, self.height as f32)
    }

    /// Scale and round to the nearest pixel.
    pub fn times(self, scale: ScaleFactor) -> IntSize {
        IntSize::new(
            (self.width as f32 * scale.scale_x).round() as i32,
            (self.height as f32 * scale.scale_y).round() as i32,
        )
    }

    pub fn div(self, scale: ScaleFactor) -> IntSize {
        IntSize::new(
            (self.width as f32 / scale.scale_x).round() as i32,
            (self.height as f32 / scale.scale_y).round() as i32,
        )
    }
}

impl Mul<i32> for IntSize {
    type Output = IntSize;

    fn mul(self, rhs: i32) -> IntSize {
        IntSize::new(self.width * rhs, self.height * rhs)
    }
}

impl Div<i32> for IntSize {
    type Output = IntSize;

    fn div(self, rhs: i32) -> IntSize {
        IntSize::new(self.width / rhs, self.height / rhs)
    }
}

impl fmt::Display for IntSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

// =============================================================================
// IntOffset
// =============================================================================

/// Integer position, also used as a tile grid coordinate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IntOffset {
    pub x: i32,
    pub y: i32,
}

impl IntOffset {
    pub const ZERO: IntOffset = IntOffset { x: 0, y: 0 };

    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl Add for IntOffset {
    type Output = IntOffset;

    fn add(self, rhs: IntOffset) -> IntOffset {
        IntOffset::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for IntOffset {
    type Output = IntOffset;

    fn sub(self, rhs: IntOffset) -> IntOffset {
        IntOffset::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl fmt::Display for IntOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.x, self.y)
    }
}

// =============================================================================
// IntRect
// =============================================================================

/// Integer rectangle with exclusive `right` and `bottom` edges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct IntRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl IntRect {
    pub const ZERO: IntRect = IntRect {
        left: 0,
        top: 0,
        right: 0,
        bottom: 0,
    };

    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub const fn from_size(size: IntSize) -> Self {
        Self::new(0, 0, size.width, size.height)
    }

    pub const fn width(&self) -> i32 {
        self.right - self.left
    }

    pub const fn height(&self) -> i32 {
        self.bottom - self.top
    }

    pub const fn size(&self) -> IntSize {
        IntSize::new(self.width(), self.height())
    }

    pub const fn top_left(&self) -> IntOffset {
        IntOffset::new(self.left, self.top)
    }

    pub const fn is_empty(&self) -> bool {
        self.left >= self.right || self.top >= self.bottom
    }

    /// Whether the two rects share any area. Touching edges do not count.
    pub const fn overlaps(&self, other: &IntRect) -> bool {
        self.left < other.right
            && other.left < self.right
            && self.top < other.bottom
            && other.top < self.bottom
    }

    /// The shared area of both rects, or [`IntRect::ZERO`] if they do not overlap.
    pub fn intersect(&self, other: &IntRect) -> IntRect {
        if !self.overlaps(other) {
            return IntRect::ZERO;
        }
        IntRect::new(
            self.left.max(other.left),
            self.top.max(other.top),
            self.right.min(other.right),
            self.bottom.min(other.bottom),
        )
    }

    pub fn contains(&self, other: &IntRect) -> bool {
        other.left >= self.left
            && other.top >= self.top
            && other.right <= self.right
            && other.bottom <= self.bottom
    }

    /// Clamp every edge into `0..=size`.
    pub fn limit_to(&self, size: IntSize) -> IntRect {
        IntRect::new(
            self.left.clamp(0, size.width),
            self.top.clamp(0, size.height),
            self.right.clamp(0, size.width),
            self.bottom.clamp(0, size.height),
        )
    }

    pub fn inflate(&self, dx: i32, dy: i32) -> IntRect {
        IntRect::new(
            self.left - dx,
            self.top - dy,
            self.right + dx,
            self.bottom + dy,
        )
    }

    pub fn translate(&self, offset: IntOffset) -> IntRect {
        IntRect::new(
            self.left + offset.x,
            self.top + offset.y,
            self.right + offset.x,
            self.bottom + offset.y,
        )
    }

    pub fn to_rect(&self) -> Rect {
        Rect::new(
            self.left as f32,
            self.top as f32,
            self.right as f32,
            self.bottom as f32,
        )
    }

    /// Scale every edge and round to the nearest pixel.
    pub fn times(&self, scale: ScaleFactor) -> IntRect {
        self.to_rect().times(scale).round()
    }

    pub fn div(&self, scale: ScaleFactor) -> IntRect {
        self.to_rect().div(scale).round()
    }

    /// Rotate this rect by `rotation` degrees within a space of `space_size`.
    ///
    /// # Panics
    ///
    /// Panics if `rotation` is not a multiple of 90.
    pub fn rotate_in_space(&self, space_size: IntSize, rotation: i32) -> IntRect {
        let (w, h) = (space_size.width, space_size.height);
        match normalize_rotation(rotation) {
            90 => IntRect::new(h - self.bottom, self.left, h - self.top, self.right),
            180 => IntRect::new(w - self.right, h - self.bottom, w - self.left, h - self.top),
            270 => IntRect::new(self.top, w - self.right, self.bottom, w - self.left),
            _ => *self,
        }
    }

    /// Undo [`IntRect::rotate_in_space`]. `space_size` is the unrotated space.
    pub fn reverse_rotate_in_space(&self, space_size: IntSize, rotation: i32) -> IntRect {
        let rotation = normalize_rotation(rotation);
        let rotated_space = space_size.rotate(rotation);
        self.rotate_in_space(rotated_space, 360 - rotation)
    }

    /// Compact `left,top,right,bottom` form, used in tile cache keys.
    pub fn to_short_string(&self) -> String {
        format!("{},{},{},{}", self.left, self.top, self.right, self.bottom)
    }
}

impl fmt::Display for IntRect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.to_short_string())
    }
}
