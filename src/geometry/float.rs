use std::fmt;
use std::ops::{Add, Neg, Sub};

use super::{normalize_rotation, IntRect, IntSize};

/// Per-axis scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleFactor {
    pub scale_x: f32,
    pub scale_y: f32,
}

impl ScaleFactor {
    pub const ONE: ScaleFactor = ScaleFactor {
        scale_x: 1.0,
        scale_y: 1.0,
    };

    pub const fn new(scale_x: f32, scale_y: f32) -> Self {
        Self { scale_x, scale_y }
    }

    pub const fn uniform(scale: f32) -> Self {
        Self::new(scale, scale)
    }
}

impl Default for ScaleFactor {
    fn default() -> Self {
        Self::ONE
    }
}

/// Float width and height.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub const ZERO: Size = Size {
        width: 0.0,
        height: 0.0,
    };

    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    pub fn rotate(self, rotation: i32) -> Size {
        match normalize_rotation(rotation) {
            90 | 270 => Size::new(self.height, self.width),
            _ => self,
        }
    }

    pub fn round(self) -> IntSize {
        IntSize::new(self.width.round() as i32, self.height.round() as i32)
    }
}

/// Float position.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Offset {
    pub x: f32,
    pub y: f32,
}

impl Offset {
    pub const ZERO: Offset = Offset { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

impl Add for Offset {
    type Output = Offset;

    fn add(self, rhs: Offset) -> Offset {
        Offset::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Offset {
    type Output = Offset;

    fn sub(self, rhs: Offset) -> Offset {
        Offset::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Neg for Offset {
    type Output = Offset;

    fn neg(self) -> Offset {
        Offset::new(-self.x, -self.y)
    }
}

/// Float rectangle.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Rect {
    pub const ZERO: Rect = Rect {
        left: 0.0,
        top: 0.0,
        right: 0.0,
        bottom: 0.0,
    };

    pub const fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn from_size(size: Size) -> Self {
        Self::new(0.0, 0.0, size.width, size.height)
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    pub fn is_empty(&self) -> bool {
        self.left >= self.right || self.top >= self.bottom
    }

    pub fn translate(&self, offset: Offset) -> Rect {
        Rect::new(
            self.left + offset.x,
            self.top + offset.y,
            self.right + offset.x,
            self.bottom + offset.y,
        )
    }

    pub fn times(&self, scale: ScaleFactor) -> Rect {
        Rect::new(
            self.left * scale.scale_x,
            self.top * scale.scale_y,
            self.right * scale.scale_x,
            self.bottom * scale.scale_y,
        )
    }

    pub fn div(&self, scale: ScaleFactor) -> Rect {
        Rect::new(
            self.left / scale.scale_x,
            self.top / scale.scale_y,
            self.right / scale.scale_x,
            self.bottom / scale.scale_y,
        )
    }

    /// Shared area, or [`Rect::ZERO`] when the rects do not overlap.
    pub fn intersect(&self, other: &Rect) -> Rect {
        let rect = Rect::new(
            self.left.max(other.left),
            self.top.max(other.top),
            self.right.min(other.right),
            self.bottom.min(other.bottom),
        );
        if rect.is_empty() {
            Rect::ZERO
        } else {
            rect
        }
    }

    pub fn round(&self) -> IntRect {
        IntRect::new(
            self.left.round() as i32,
            self.top.round() as i32,
            self.right.round() as i32,
            self.bottom.round() as i32,
        )
    }

    /// Float counterpart of [`IntRect::rotate_in_space`].
    pub fn rotate_in_space(&self, space_size: Size, rotation: i32) -> Rect {
        let (w, h) = (space_size.width, space_size.height);
        match normalize_rotation(rotation) {
            90 => Rect::new(h - self.bottom, self.left, h - self.top, self.right),
            180 => Rect::new(w - self.right, h - self.bottom, w - self.left, h - self.top),
            270 => Rect::new(self.top, w - self.right, self.bottom, w - self.left),
            _ => *self,
        }
    }

    pub fn reverse_rotate_in_space(&self, space_size: Size, rotation: i32) -> Rect {
        let rotation = normalize_rotation(rotation);
        let rotated_space = space_size.rotate(rotation);
        self.rotate_in_space(rotated_space, 360 - rotation)
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:.1},{:.1},{:.1},{:.1}]",
            self.left, self.top, self.right, self.bottom
        )
    }
}
