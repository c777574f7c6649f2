//! PNG watermark: aspect-preserving fit, centered on a transparent canvas.

use std::path::Path;

use image::imageops::{self, FilterType};
use image::RgbaImage;

use super::Watermark;
use crate::error::{SnapMarkError, SnapMarkResult};

/// Largest size with the source's aspect ratio that fits in the target.
fn fit_size(src_w: u32, src_h: u32, dst_w: u32, dst_h: u32) -> (u32, u32) {
    let scale = (dst_w as f64 / src_w as f64).min(dst_h as f64 / src_h as f64);
    let w = ((src_w as f64 * scale) as u32).clamp(1, dst_w);
    let h = ((src_h as f64 * scale) as u32).clamp(1, dst_h);
    (w, h)
}

pub fn load_png(path: &Path, width: u32, height: u32) -> SnapMarkResult<Watermark> {
    if width == 0 || height == 0 {
        return Err(SnapMarkError::InvalidFrame(format!(
            "watermark target {}x{}",
            width, height
        )));
    }

    let source = image::open(path)
        .map_err(|e| SnapMarkError::ImageError(format!("{}: {}", path.display(), e)))?
        .to_rgba8();
    let (fit_w, fit_h) = fit_size(source.width(), source.height(), width, height);
    log::debug!(
        "Fitting {} ({}x{}) to {}x{}",
        path.display(),
        source.width(),
        source.height(),
        fit_w,
        fit_h
    );

    let scaled = imageops::resize(&source, fit_w, fit_h, FilterType::Lanczos3);
    let mut canvas = RgbaImage::new(width, height);
    let x = i64::from((width - fit_w) / 2);
    let y = i64::from((height - fit_h) / 2);
    imageops::replace(&mut canvas, &scaled, x, y);

    Watermark::from_rgba(width, height, canvas.into_raw())
}
