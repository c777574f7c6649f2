//! Stride-aware pixel repacking.
//!
//! Every conversion indexes source rows by stride and writes into a
//! caller-owned destination so the frame loop reuses one allocation.

use super::required_len;
use crate::error::{SnapMarkError, SnapMarkResult};

fn check_source(src: &[u8], row_bytes: usize, height: usize, stride: usize) -> SnapMarkResult<()> {
    if stride < row_bytes {
        return Err(SnapMarkError::InvalidFrame(format!(
            "stride {} shorter than row of {} bytes",
            stride, row_bytes
        )));
    }
    let needed = required_len(row_bytes, stride, height);
    if src.len() < needed {
        return Err(SnapMarkError::InvalidFrame(format!(
            "source holds {} bytes, {} rows at stride {} need {}",
            src.len(),
            height,
            stride,
            needed
        )));
    }
    Ok(())
}

fn rows(src: &[u8], row_bytes: usize, height: usize, stride: usize) -> impl Iterator<Item = &[u8]> {
    (0..height).map(move |y| &src[y * stride..y * stride + row_bytes])
}

/// Copy `height` rows of `row_bytes` out of a padded buffer into `dst`,
/// dropping the padding.
///
/// Panics if `src` holds fewer than `height` rows at `src_stride`.
pub fn pack_rows(src: &[u8], row_bytes: usize, height: usize, src_stride: usize, dst: &mut Vec<u8>) {
    dst.clear();
    dst.reserve(row_bytes * height);
    if src_stride == row_bytes {
        dst.extend_from_slice(&src[..row_bytes * height]);
        return;
    }
    for row in rows(src, row_bytes, height, src_stride) {
        dst.extend_from_slice(row);
    }
}

/// Copy tightly packed rows into a padded destination such as a codec plane.
pub fn unpack_rows(
    src: &[u8],
    row_bytes: usize,
    height: usize,
    dst: &mut [u8],
    dst_stride: usize,
) -> SnapMarkResult<()> {
    check_source(src, row_bytes, height, row_bytes)?;
    if dst.len() < required_len(row_bytes, dst_stride, height) || dst_stride < row_bytes {
        return Err(SnapMarkError::InvalidFrame(format!(
            "destination of {} bytes at stride {} cannot hold {} rows of {}",
            dst.len(),
            dst_stride,
            height,
            row_bytes
        )));
    }
    for (y, row) in src.chunks_exact(row_bytes).take(height).enumerate() {
        let start = y * dst_stride;
        dst[start..start + row_bytes].copy_from_slice(row);
    }
    Ok(())
}

/// Expand a 3- or 4-channel packed image to tight RGBA; 3-channel input
/// gets opaque alpha.
pub fn expand_to_rgba(
    src: &[u8],
    width: u32,
    height: u32,
    src_stride: usize,
    channels: usize,
    dst: &mut Vec<u8>,
) -> SnapMarkResult<()> {
    let (w, h) = (width as usize, height as usize);
    match channels {
        4 => {
            check_source(src, w * 4, h, src_stride)?;
            pack_rows(src, w * 4, h, src_stride, dst);
        }
        3 => {
            check_source(src, w * 3, h, src_stride)?;
            dst.clear();
            dst.reserve(w * h * 4);
            for row in rows(src, w * 3, h, src_stride) {
                for px in row.chunks_exact(3) {
                    dst.extend_from_slice(&[px[0], px[1], px[2], 255]);
                }
            }
        }
        n => {
            return Err(SnapMarkError::InvalidFrame(format!(
                "unsupported channel count {} (expected 3 or 4)",
                n
            )))
        }
    }
    Ok(())
}

/// Drop alpha from padded RGBA rows into tight RGB.
pub fn rgba_to_rgb(
    src: &[u8],
    width: u32,
    height: u32,
    src_stride: usize,
    dst: &mut Vec<u8>,
) -> SnapMarkResult<()> {
    let (w, h) = (width as usize, height as usize);
    check_source(src, w * 4, h, src_stride)?;
    dst.clear();
    dst.reserve(w * h * 3);
    for row in rows(src, w * 4, h, src_stride) {
        for px in row.chunks_exact(4) {
            dst.extend_from_slice(&px[..3]);
        }
    }
    Ok(())
}

/// Swap padded BGRA rows into tight RGBA.
pub fn bgra_to_rgba(
    src: &[u8],
    width: u32,
    height: u32,
    src_stride: usize,
    dst: &mut Vec<u8>,
) -> SnapMarkResult<()> {
    let (w, h) = (width as usize, height as usize);
    check_source(src, w * 4, h, src_stride)?;
    dst.clear();
    dst.reserve(w * h * 4);
    for row in rows(src, w * 4, h, src_stride) {
        for px in row.chunks_exact(4) {
            dst.extend_from_slice(&[px[2], px[1], px[0], px[3]]);
        }
    }
    Ok(())
}

/// CPU rendition of the GPU blend:
/// `out = video * (1 - a * opacity) + watermark * (a * opacity)`.
///
/// `video_rgb` is tight RGB, `watermark_rgba` tight RGBA of the same pixel
/// count; `dst` receives tight RGB.
pub fn cpu_blend(
    video_rgb: &[u8],
    watermark_rgba: &[u8],
    opacity: f32,
    dst: &mut Vec<u8>,
) -> SnapMarkResult<()> {
    if video_rgb.len() % 3 != 0 || watermark_rgba.len() / 4 != video_rgb.len() / 3 {
        return Err(SnapMarkError::InvalidFrame(format!(
            "blend inputs disagree: {} RGB bytes vs {} RGBA bytes",
            video_rgb.len(),
            watermark_rgba.len()
        )));
    }
    let opacity = opacity.clamp(0.0, 1.0);
    dst.clear();
    dst.reserve(video_rgb.len());
    for (v, w) in video_rgb.chunks_exact(3).zip(watermark_rgba.chunks_exact(4)) {
        let a = (w[3] as f32 / 255.0) * opacity;
        for c in 0..3 {
            let out = v[c] as f32 * (1.0 - a) + w[c] as f32 * a;
            dst.push(out.round().clamp(0.0, 255.0) as u8);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_rows_drops_padding() {
        let src = [1, 2, 0, 0, 3, 4, 0, 0];
        let mut dst = Vec::new();
        pack_rows(&src, 2, 2, 4, &mut dst);
        assert_eq!(dst, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_unpack_rows_writes_by_stride() {
        let mut dst = vec![9u8; 8];
        unpack_rows(&[1, 2, 3, 4], 2, 2, &mut dst, 4).unwrap();
        assert_eq!(dst, vec![1, 2, 9, 9, 3, 4, 9, 9]);
    }

    #[test]
    fn test_unpack_rows_rejects_small_destination() {
        let mut dst = vec![0u8; 5];
        assert!(unpack_rows(&[1, 2, 3, 4], 2, 2, &mut dst, 4).is_err());
    }

    #[test]
    fn test_expand_rgb_sets_opaque_alpha() {
        let mut dst = Vec::new();
        expand_to_rgba(&[10, 20, 30, 40, 50, 60], 2, 1, 6, 3, &mut dst).unwrap();
        assert_eq!(dst, vec![10, 20, 30, 255, 40, 50, 60, 255]);
    }

    #[test]
    fn test_expand_rgba_keeps_alpha() {
        let mut dst = Vec::new();
        expand_to_rgba(&[1, 2, 3, 4, 0, 0, 0, 0], 1, 2, 4, 4, &mut dst).unwrap();
        assert_eq!(dst, vec![1, 2, 3, 4, 0, 0, 0, 0]);
    }

    #[test]
    fn test_expand_rejects_bad_channels() {
        let mut dst = Vec::new();
        assert!(expand_to_rgba(&[0; 8], 2, 2, 4, 2, &mut dst).is_err());
    }

    #[test]
    fn test_rgba_to_rgb_respects_stride() {
        // 1 pixel wide, row stride 8 (4 bytes padding)
        let src = [1, 2, 3, 255, 0xAA, 0xAA, 0xAA, 0xAA, 4, 5, 6, 128];
        let mut dst = Vec::new();
        rgba_to_rgb(&src, 1, 2, 8, &mut dst).unwrap();
        assert_eq!(dst, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_rgba_to_rgb_rejects_short_source() {
        let mut dst = Vec::new();
        assert!(rgba_to_rgb(&[0; 7], 1, 2, 4, &mut dst).is_err());
    }

    #[test]
    fn test_bgra_to_rgba_swaps_channels() {
        let src = [30, 20, 10, 200, 0, 0];
        let mut dst = Vec::new();
        bgra_to_rgba(&src, 1, 1, 6, &mut dst).unwrap();
        assert_eq!(dst, vec![10, 20, 30, 200]);
    }

    #[test]
    fn test_destination_is_reused() {
        let mut dst = Vec::with_capacity(64);
        dst.extend_from_slice(&[7; 10]);
        rgba_to_rgb(&[1, 2, 3, 4], 1, 1, 4, &mut dst).unwrap();
        assert_eq!(dst, vec![1, 2, 3]);
        assert!(dst.capacity() >= 64);
    }

    #[test]
    fn test_cpu_blend_zero_opacity_is_video() {
        let video = [200, 100, 50, 0, 0, 0];
        let wm = [0, 0, 255, 255, 255, 255, 255, 255];
        let mut dst = Vec::new();
        cpu_blend(&video, &wm, 0.0, &mut dst).unwrap();
        assert_eq!(dst, video.to_vec());
    }

    #[test]
    fn test_cpu_blend_full_opacity_opaque_is_watermark() {
        let video = [200, 100, 50];
        let wm = [1, 2, 3, 255];
        let mut dst = Vec::new();
        cpu_blend(&video, &wm, 1.0, &mut dst).unwrap();
        assert_eq!(dst, vec![1, 2, 3]);
    }

    #[test]
    fn test_cpu_blend_red_blue_half() {
        let video = [255, 0, 0];
        let wm = [0, 0, 255, 255];
        let mut dst = Vec::new();
        cpu_blend(&video, &wm, 0.5, &mut dst).unwrap();
        assert!((127..=128).contains(&dst[0]));
        assert_eq!(dst[1], 0);
        assert!((127..=128).contains(&dst[2]));
    }

    #[test]
    fn test_cpu_blend_transparent_watermark_is_video() {
        let video = [12, 34, 56];
        let wm = [255, 255, 255, 0];
        let mut dst = Vec::new();
        cpu_blend(&video, &wm, 1.0, &mut dst).unwrap();
        assert_eq!(dst, vec![12, 34, 56]);
    }

    #[test]
    fn test_cpu_blend_rejects_mismatch() {
        let mut dst = Vec::new();
        assert!(cpu_blend(&[0; 6], &[0; 4], 0.5, &mut dst).is_err());
    }
}
