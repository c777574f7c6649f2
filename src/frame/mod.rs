//! Host-memory pixel repacking.
//!
//! Packed RGB/RGBA/BGRA images whose row stride may exceed
//! `width * bytes_per_pixel`. Planar YUV 4:2:0 frames live in codec frames
//! owned by [`crate::media::FrameConverter`].

pub mod convert;

pub use convert::{bgra_to_rgba, cpu_blend, expand_to_rgba, pack_rows, rgba_to_rgb, unpack_rows};

/// Bytes a strided image occupies; the last row needs no padding.
pub(crate) fn required_len(row_bytes: usize, stride: usize, height: usize) -> usize {
    if height == 0 {
        0
    } else {
        stride * (height - 1) + row_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_len_skips_last_row_padding() {
        // 2 rows of 12 meaningful bytes at stride 16: 16 + 12
        assert_eq!(required_len(12, 16, 2), 28);
        assert_eq!(required_len(12, 12, 3), 36);
        assert_eq!(required_len(12, 16, 0), 0);
    }
}
