//! Pointer state fed by the capture engine.

use super::shape::PointerShape;

/// Latest pointer position, visibility and shape.
///
/// Only the capture engine mutates this; the cursor compositor reads it and
/// consumes the dirty flag when it rebuilds the sprite.
#[derive(Debug, Clone, Default)]
pub struct CursorState {
    visible: bool,
    position: (i32, i32),
    hot_spot: (i32, i32),
    shape: Option<PointerShape>,
    dirty: bool,
}

impl CursorState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a pointer position report.
    pub fn update_position(&mut self, x: i32, y: i32, visible: bool) {
        self.position = (x, y);
        self.visible = visible;
    }

    /// Replace the shape. `None` means the encoding was not decodable and
    /// the cursor is not drawn until a decodable shape arrives.
    pub fn set_shape(&mut self, shape: Option<PointerShape>, hot_spot: (i32, i32)) {
        self.shape = shape;
        self.hot_spot = hot_spot;
        self.dirty = true;
    }

    /// Return and clear the shape-changed flag.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn visible(&self) -> bool {
        self.visible
    }

    pub fn position(&self) -> (i32, i32) {
        self.position
    }

    pub fn hot_spot(&self) -> (i32, i32) {
        self.hot_spot
    }

    pub fn shape(&self) -> Option<&PointerShape> {
        self.shape.as_ref()
    }

    /// Top-left corner of the sprite on screen.
    pub fn draw_origin(&self) -> (i32, i32) {
        (
            self.position.0 - self.hot_spot.0,
            self.position.1 - self.hot_spot.1,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::shape::ShapeBuffer;

    fn shape() -> PointerShape {
        PointerShape::Color(ShapeBuffer {
            width: 1,
            height: 1,
            pitch: 4,
            data: vec![0, 0, 0, 255],
        })
    }

    #[test]
    fn test_starts_hidden_and_clean() {
        let state = CursorState::new();
        assert!(!state.visible());
        assert!(!state.is_dirty());
        assert!(state.shape().is_none());
    }

    #[test]
    fn test_set_shape_marks_dirty_once() {
        let mut state = CursorState::new();
        state.set_shape(Some(shape()), (0, 0));
        assert!(state.take_dirty());
        assert!(!state.take_dirty());
    }

    #[test]
    fn test_position_update_keeps_shape_clean() {
        let mut state = CursorState::new();
        state.set_shape(Some(shape()), (0, 0));
        state.take_dirty();
        state.update_position(100, 50, true);
        assert!(!state.is_dirty());
        assert!(state.visible());
    }

    #[test]
    fn test_draw_origin_subtracts_hot_spot() {
        let mut state = CursorState::new();
        state.update_position(100, 50, true);
        state.set_shape(Some(shape()), (4, 7));
        assert_eq!(state.draw_origin(), (96, 43));
    }

    #[test]
    fn test_undecodable_shape_clears_sprite_source() {
        let mut state = CursorState::new();
        state.set_shape(Some(shape()), (1, 1));
        state.set_shape(None, (0, 0));
        assert!(state.shape().is_none());
        assert!(state.is_dirty());
    }
}
