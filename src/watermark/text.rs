//! Tiled text watermark rendered through resvg.
//!
//! White text at 30% opacity, repeated on a 280x120 grid starting above and
//! left of the frame so the tiling reaches every edge, each copy rotated
//! -45 degrees about its anchor.

use std::fmt::Write;

use resvg::tiny_skia::{Pixmap, Transform};
use resvg::usvg;

use super::Watermark;
use crate::error::{SnapMarkError, SnapMarkResult};

const X_STEP: i64 = 280;
const Y_STEP: i64 = 120;
const X_START: i64 = -100;
const Y_START: i64 = -50;
const FONT_SIZE: u32 = 35;
const TEXT_OPACITY: f32 = 0.3;
const ANGLE_DEG: i32 = -45;

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

/// Anchor points of the tile grid covering a `width`x`height` frame.
fn tile_origins(width: u32, height: u32) -> Vec<(i64, i64)> {
    let mut origins = Vec::new();
    let mut y = Y_START;
    while y < i64::from(height) + 50 {
        let mut x = X_START;
        while x < i64::from(width) + 100 {
            origins.push((x, y));
            x += X_STEP;
        }
        y += Y_STEP;
    }
    origins
}

fn build_svg(text: &str, width: u32, height: u32) -> String {
    let escaped = escape_xml(text);
    let mut svg = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
        w = width,
        h = height
    );
    let _ = write!(
        svg,
        r#"<g fill="white" fill-opacity="{}" font-family="Arial, Helvetica, sans-serif" font-size="{}">"#,
        TEXT_OPACITY, FONT_SIZE
    );
    for (x, y) in tile_origins(width, height) {
        // Baseline sits one font size below the tile's top-left
        let baseline = y + i64::from(FONT_SIZE);
        let _ = write!(
            svg,
            r#"<text x="{x}" y="{b}" transform="rotate({a} {x} {b})">{t}</text>"#,
            x = x,
            b = baseline,
            a = ANGLE_DEG,
            t = escaped
        );
    }
    svg.push_str("</g></svg>");
    svg
}

/// Render `text` as a tiled watermark covering `width`x`height`.
pub fn render_text(text: &str, width: u32, height: u32) -> SnapMarkResult<Watermark> {
    if text.is_empty() {
        return Ok(Watermark::transparent(width, height));
    }

    let mut options = usvg::Options::default();
    options.fontdb_mut().load_system_fonts();
    if options.fontdb.len() == 0 {
        log::warn!("No system fonts found; text watermark will be empty");
    }

    let svg = build_svg(text, width, height);
    let tree = usvg::Tree::from_str(&svg, &options)
        .map_err(|e| SnapMarkError::ImageError(format!("text watermark SVG: {}", e)))?;

    let mut pixmap = Pixmap::new(width, height).ok_or_else(|| {
        SnapMarkError::InvalidFrame(format!("watermark target {}x{}", width, height))
    })?;
    resvg::render(&tree, Transform::default(), &mut pixmap.as_mut());

    // tiny-skia stores premultiplied pixels; the blend expects straight alpha
    let mut rgba = Vec::with_capacity(width as usize * height as usize * 4);
    for pixel in pixmap.pixels() {
        let c = pixel.demultiply();
        rgba.extend_from_slice(&[c.red(), c.green(), c.blue(), c.alpha()]);
    }
    Watermark::from_rgba(width, height, rgba)
}
