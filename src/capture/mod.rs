//! Desktop capture.
//!
//! The recording loop talks to a [`DesktopSource`]; on Windows that is the
//! DXGI output duplication engine in [`duplication`], which copies each new
//! desktop image into a GPU texture and draws the hardware cursor onto it.

#[cfg(windows)]
pub mod duplication;

#[cfg(windows)]
pub use duplication::DesktopDuplication;

use std::sync::Arc;

use crate::cursor::shape::{PointerShape, ShapeBuffer, DXGI_SHAPE_MONOCHROME};
use crate::error::{SnapMarkError, SnapMarkResult};
use crate::rendering::GpuContext;

/// Bounded wait for the next duplicated frame.
pub const ACQUIRE_TIMEOUT_MS: u32 = 100;

/// Result of one capture attempt that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// A new desktop image was composited into the capture texture.
    NewFrame,
    /// The wait timed out; the previous composited image is still current.
    Unchanged,
}

/// A live desktop producing composited (image + cursor) frames.
pub trait DesktopSource {
    /// Desktop size in pixels.
    fn dimensions(&self) -> (u32, u32);

    /// Wait up to [`ACQUIRE_TIMEOUT_MS`] for a new frame. A timeout is
    /// `Ok(CaptureOutcome::Unchanged)`, never an error.
    fn capture_frame(&mut self) -> SnapMarkResult<CaptureOutcome>;

    /// Copy the latest composited frame into `dst` as tight RGBA.
    fn read_composited_rgba(&mut self, dst: &mut Vec<u8>) -> SnapMarkResult<()>;

    /// Device the source renders on, so blending can share it.
    fn gpu_context(&self) -> Option<Arc<GpuContext>> {
        None
    }
}

/// Build a [`PointerShape`] from a duplication shape report.
///
/// Monochrome reports give the stacked AND+XOR height, so it is halved here.
/// Unknown encodings return `None` and the cursor is not drawn.
pub fn pointer_shape_from_report(
    shape_type: u32,
    width: u32,
    reported_height: u32,
    pitch: u32,
    data: Vec<u8>,
) -> Option<PointerShape> {
    let height = if shape_type == DXGI_SHAPE_MONOCHROME {
        reported_height / 2
    } else {
        reported_height
    };
    PointerShape::from_dxgi(
        shape_type,
        ShapeBuffer {
            width,
            height,
            pitch,
            data,
        },
    )
}

/// Reject a duplicated surface whose size differs from the mode capture
/// started in. Mode changes end the session; there is no re-init.
pub fn check_surface_size(started: (u32, u32), surface: (u32, u32)) -> SnapMarkResult<()> {
    if surface != started {
        return Err(SnapMarkError::CaptureModeChanged(format!(
            "desktop surface is {}x{}, duplication started at {}x{}",
            surface.0, surface.1, started.0, started.1
        )));
    }
    Ok(())
}
