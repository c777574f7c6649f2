//! Watermark layers.
//!
//! Produces the straight-alpha RGBA buffer the compositor blends over each
//! frame, either from a PNG fitted to the frame or from tiled text.

pub mod png;
pub mod text;

pub use png::load_png;
pub use text::render_text;

use log::info;

use crate::config::WatermarkSource;
use crate::error::{SnapMarkError, SnapMarkResult};

/// Full-frame RGBA watermark, tight rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Watermark {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl Watermark {
    pub fn from_rgba(width: u32, height: u32, rgba: Vec<u8>) -> SnapMarkResult<Self> {
        let expected = width as usize * height as usize * 4;
        if width == 0 || height == 0 || rgba.len() != expected {
            return Err(SnapMarkError::InvalidFrame(format!(
                "watermark {}x{} needs {} RGBA bytes, got {}",
                width,
                height,
                expected,
                rgba.len()
            )));
        }
        Ok(Self {
            width,
            height,
            rgba,
        })
    }

    /// Alpha 0 everywhere.
    pub fn transparent(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            rgba: vec![0; width as usize * height as usize * 4],
        }
    }

    pub fn is_fully_transparent(&self) -> bool {
        self.rgba.chunks_exact(4).all(|px| px[3] == 0)
    }

    /// Rasterize `source` at the frame size. `WatermarkSource::None` gives
    /// `Ok(None)`.
    pub fn from_source(source: &WatermarkSource, width: u32, height: u32) -> SnapMarkResult<Option<Self>> {
        let watermark = match source {
            WatermarkSource::None => return Ok(None),
            WatermarkSource::Png(path) => load_png(path, width, height)?,
            WatermarkSource::Text(text) => render_text(text, width, height)?,
        };
        info!("Watermark ready: {:?} at {}x{}", source, width, height);
        Ok(Some(watermark))
    }
}
