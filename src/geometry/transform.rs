use super::{IntRect, IntSize, Offset, Rect, ScaleFactor};

/// The display transform delivered by the zoom engine.
///
/// Content is first rotated within its own bounds, then scaled, then
/// translated by `offset` in container pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub scale: ScaleFactor,
    pub offset: Offset,
    pub rotation: i32,
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        scale: ScaleFactor::ONE,
        offset: Offset::ZERO,
        rotation: 0,
    };

    pub const fn new(scale: ScaleFactor, offset: Offset, rotation: i32) -> Self {
        Self {
            scale,
            offset,
            rotation,
        }
    }

    pub fn scale_x(&self) -> f32 {
        self.scale.scale_x
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// The part of the content visible in the container, in unrotated content
/// pixels. Returns [`IntRect::ZERO`] when nothing is visible.
pub fn content_visible_rect(
    container_size: IntSize,
    content_size: IntSize,
    transform: &Transform,
) -> IntRect {
    if container_size.is_empty() || content_size.is_empty() {
        return IntRect::ZERO;
    }
    if transform.scale.scale_x <= 0.0 || transform.scale.scale_y <= 0.0 {
        return IntRect::ZERO;
    }

    let rotated_content = content_size.to_size().rotate(transform.rotation);
    let visible_in_rotated = Rect::from_size(container_size.to_size())
        .translate(-transform.offset)
        .div(transform.scale)
        .intersect(&Rect::from_size(rotated_content));
    if visible_in_rotated.is_empty() {
        return IntRect::ZERO;
    }

    visible_in_rotated
        .reverse_rotate_in_space(content_size.to_size(), transform.rotation)
        .round()
        .limit_to(content_size)
}
