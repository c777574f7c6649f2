//! Hardware pointer compositing.
//!
//! - `shape`: DXGI pointer encodings and their RGBA decoders
//! - `state`: position, visibility, hot spot and the current shape
//! - `compositor`: wgpu overlay that draws the sprite onto captured frames

pub mod compositor;
pub mod shape;
pub mod state;

pub use compositor::CursorCompositor;
pub use shape::{CursorSprite, PointerShape, ShapeBuffer};
pub use state::CursorState;
