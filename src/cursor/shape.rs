//! Hardware pointer shapes and their decoders.
//!
//! Desktop duplication delivers the pointer bitmap in one of three
//! encodings. Each is decoded by a pure function into a straight-alpha RGBA
//! sprite. Mask bits are read MSB first: bit 7 of each byte is the leftmost
//! pixel of its group of eight.

use crate::error::{SnapMarkError, SnapMarkResult};
use crate::frame::convert::bgra_to_rgba;

/// `DXGI_OUTDUPL_POINTER_SHAPE_TYPE_MONOCHROME`
pub const DXGI_SHAPE_MONOCHROME: u32 = 1;
/// `DXGI_OUTDUPL_POINTER_SHAPE_TYPE_COLOR`
pub const DXGI_SHAPE_COLOR: u32 = 2;
/// `DXGI_OUTDUPL_POINTER_SHAPE_TYPE_MASKED_COLOR`
pub const DXGI_SHAPE_MASKED_COLOR: u32 = 4;

/// Raw shape bytes as delivered by the capture engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeBuffer {
    /// Sprite width in pixels.
    pub width: u32,
    /// Sprite height in pixels (not the stacked mask height).
    pub height: u32,
    /// Bytes per row, shared by color rows and mask rows.
    pub pitch: u32,
    pub data: Vec<u8>,
}

/// Pointer bitmap tagged with its encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PointerShape {
    /// AND mask followed by XOR mask, 1 bit per pixel each.
    Monochrome(ShapeBuffer),
    /// Straight BGRA.
    Color(ShapeBuffer),
    /// BGRA image followed by a 1-bit opacity mask.
    MaskedColor(ShapeBuffer),
}

/// Decoded cursor bitmap, tight RGBA with straight alpha.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorSprite {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl CursorSprite {
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = ((y * self.width + x) * 4) as usize;
        [self.rgba[i], self.rgba[i + 1], self.rgba[i + 2], self.rgba[i + 3]]
    }
}

impl PointerShape {
    /// Tag a buffer with a DXGI shape type; None for encodings we cannot
    /// decode.
    pub fn from_dxgi(shape_type: u32, buffer: ShapeBuffer) -> Option<Self> {
        match shape_type {
            DXGI_SHAPE_MONOCHROME => Some(PointerShape::Monochrome(buffer)),
            DXGI_SHAPE_COLOR => Some(PointerShape::Color(buffer)),
            DXGI_SHAPE_MASKED_COLOR => Some(PointerShape::MaskedColor(buffer)),
            _ => None,
        }
    }

    pub fn buffer(&self) -> &ShapeBuffer {
        match self {
            PointerShape::Monochrome(b) | PointerShape::Color(b) | PointerShape::MaskedColor(b) => b,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            PointerShape::Monochrome(_) => "monochrome",
            PointerShape::Color(_) => "color",
            PointerShape::MaskedColor(_) => "masked-color",
        }
    }

    pub fn decode(&self) -> SnapMarkResult<CursorSprite> {
        match self {
            PointerShape::Monochrome(b) => decode_monochrome(b),
            PointerShape::Color(b) => decode_color(b),
            PointerShape::MaskedColor(b) => decode_masked_color(b),
        }
    }
}

fn mask_bit(data: &[u8], offset: usize, pitch: usize, x: usize, y: usize) -> bool {
    let byte = data[offset + y * pitch + x / 8];
    (byte >> (7 - (x % 8))) & 1 == 1
}

fn check_len(shape: &ShapeBuffer, needed: usize, what: &str) -> SnapMarkResult<()> {
    if shape.width == 0 || shape.height == 0 {
        return Err(SnapMarkError::CursorError(format!(
            "{} shape of {}x{}",
            what, shape.width, shape.height
        )));
    }
    if shape.data.len() < needed {
        return Err(SnapMarkError::CursorError(format!(
            "{} shape {}x{} pitch {} needs {} bytes, got {}",
            what,
            shape.width,
            shape.height,
            shape.pitch,
            needed,
            shape.data.len()
        )));
    }
    Ok(())
}

/// AND/XOR truth table per pixel:
/// 1/0 transparent, 1/1 white, 0/0 black, 0/1 white.
pub fn decode_monochrome(shape: &ShapeBuffer) -> SnapMarkResult<CursorSprite> {
    let (w, h, pitch) = (shape.width as usize, shape.height as usize, shape.pitch as usize);
    if pitch < w.div_ceil(8) {
        return Err(SnapMarkError::CursorError(format!(
            "monochrome pitch {} too small for width {}",
            pitch, w
        )));
    }
    check_len(shape, 2 * h * pitch, "monochrome")?;

    let xor_offset = h * pitch;
    let mut rgba = Vec::with_capacity(w * h * 4);
    for y in 0..h {
        for x in 0..w {
            let and = mask_bit(&shape.data, 0, pitch, x, y);
            let xor = mask_bit(&shape.data, xor_offset, pitch, x, y);
            let px = match (and, xor) {
                (true, false) => [0, 0, 0, 0],
                (false, false) => [0, 0, 0, 255],
                (_, true) => [255, 255, 255, 255],
            };
            rgba.extend_from_slice(&px);
        }
    }

    Ok(CursorSprite {
        width: shape.width,
        height: shape.height,
        rgba,
    })
}

/// BGRA rows at `pitch`, alpha kept as delivered.
pub fn decode_color(shape: &ShapeBuffer) -> SnapMarkResult<CursorSprite> {
    let (w, h, pitch) = (shape.width as usize, shape.height as usize, shape.pitch as usize);
    check_len(shape, pitch * (h.saturating_sub(1)) + w * 4, "color")?;

    let mut rgba = Vec::new();
    bgra_to_rgba(&shape.data, shape.width, shape.height, pitch, &mut rgba)
        .map_err(|e| SnapMarkError::CursorError(e.to_string()))?;

    Ok(CursorSprite {
        width: shape.width,
        height: shape.height,
        rgba,
    })
}

/// BGRA rows followed, at `height * pitch`, by mask rows at the same pitch.
/// A set bit shows the pixel opaque, a clear bit hides it.
pub fn decode_masked_color(shape: &ShapeBuffer) -> SnapMarkResult<CursorSprite> {
    let (w, h, pitch) = (shape.width as usize, shape.height as usize, shape.pitch as usize);
    if pitch < w * 4 {
        return Err(SnapMarkError::CursorError(format!(
            "masked-color pitch {} too small for width {}",
            pitch, w
        )));
    }
    let mask_offset = h * pitch;
    check_len(
        shape,
        mask_offset + pitch * h.saturating_sub(1) + w.div_ceil(8),
        "masked-color",
    )?;

    let mut rgba = Vec::with_capacity(w * h * 4);
    for y in 0..h {
        let row = &shape.data[y * pitch..y * pitch + w * 4];
        for (x, bgra) in row.chunks_exact(4).enumerate() {
            if mask_bit(&shape.data, mask_offset, pitch, x, y) {
                rgba.extend_from_slice(&[bgra[2], bgra[1], bgra[0], 255]);
            } else {
                rgba.extend_from_slice(&[0, 0, 0, 0]);
            }
        }
    }

    Ok(CursorSprite {
        width: shape.width,
        height: shape.height,
        rgba,
    })
}
