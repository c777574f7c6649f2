//! GPU compositing with wgpu.
//!
//! ## Components
//! - `context`: device/queue ownership shared across the session
//! - `texture`: sized textures tagged with how they are used
//! - `readback`: staging-buffer copies back to host memory
//! - `compositor`: watermark-over-video blend pass

pub mod compositor;
pub mod context;
pub mod readback;
pub mod texture;

pub use compositor::{GpuCompositor, COMPOSITE_FORMAT};
pub use context::GpuContext;
pub use readback::{padded_bytes_per_row, TextureReadback};
pub use texture::{GpuTexture, TextureRole};
