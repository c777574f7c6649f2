//! Cached swscale contexts between codec pixel formats and RGB24.
//!
//! Both directions use BT.709 coefficients. The YUV side's range comes from
//! the source frame's tag so the re-encoded frames can carry the same tag.

use ffmpeg_next::format::Pixel;
use ffmpeg_next::software::scaling::{self, Flags};
use ffmpeg_next::{color, ffi, frame};
use log::debug;

use crate::error::{SnapMarkError, SnapMarkResult};
use crate::frame::{pack_rows, unpack_rows};

struct CachedContext {
    scaler: scaling::Context,
    source: Pixel,
    full_range: bool,
}

/// Per-session pixel format conversion, created lazily on first use.
pub struct FrameConverter {
    width: u32,
    height: u32,
    to_rgb: Option<CachedContext>,
    to_yuv: Option<CachedContext>,
    rgb_frame: frame::Video,
}

fn is_full_range(range: color::Range) -> bool {
    range == color::Range::JPEG
}

/// Apply BT.709 coefficients with the given YUV range to a context.
fn set_bt709(scaler: &mut scaling::Context, yuv_is_source: bool, full_range: bool) {
    let yuv_range = i32::from(full_range);
    // RGB side is always full range
    let (src_range, dst_range) = if yuv_is_source {
        (yuv_range, 1)
    } else {
        (1, yuv_range)
    };
    unsafe {
        let coefficients = ffi::sws_getCoefficients(ffi::SWS_CS_ITU709 as i32);
        ffi::sws_setColorspaceDetails(
            scaler.as_mut_ptr(),
            coefficients,
            src_range,
            coefficients,
            dst_range,
            0,
            1 << 16,
            1 << 16,
        );
    }
}

impl FrameConverter {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            to_rgb: None,
            to_yuv: None,
            rgb_frame: frame::Video::new(Pixel::RGB24, width, height),
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn check_size(&self, width: u32, height: u32) -> SnapMarkResult<()> {
        if (width, height) != (self.width, self.height) {
            return Err(SnapMarkError::InvalidFrame(format!(
                "converter sized {}x{} given a {}x{} frame",
                self.width, self.height, width, height
            )));
        }
        Ok(())
    }

    /// Convert a decoded frame into tight RGB24 in `dst`.
    pub fn to_rgb(&mut self, src: &frame::Video, dst: &mut Vec<u8>) -> SnapMarkResult<()> {
        self.check_size(src.width(), src.height())?;

        let full_range = is_full_range(src.color_range());
        if self.to_rgb.is_none() {
            let mut scaler = scaling::Context::get(
                src.format(),
                self.width,
                self.height,
                Pixel::RGB24,
                self.width,
                self.height,
                Flags::BILINEAR,
            )?;
            set_bt709(&mut scaler, true, full_range);
            debug!(
                "Created {:?} -> RGB24 scaler ({} range)",
                src.format(),
                if full_range { "full" } else { "limited" }
            );
            self.to_rgb = Some(CachedContext {
                scaler,
                source: src.format(),
                full_range,
            });
        }

        let Some(cached) = self.to_rgb.as_mut() else {
            return Ok(());
        };
        if cached.source != src.format() {
            return Err(SnapMarkError::InvalidFrame(format!(
                "decoder switched from {:?} to {:?} mid-stream",
                cached.source,
                src.format()
            )));
        }
        cached.scaler.run(src, &mut self.rgb_frame)?;

        let stride = self.rgb_frame.stride(0);
        pack_rows(
            self.rgb_frame.data(0),
            self.width as usize * 3,
            self.height as usize,
            stride,
            dst,
        );
        Ok(())
    }

    /// Convert tight RGB24 into the YUV420P frame `dst`, using `range` for
    /// the YUV side.
    pub fn rgb_to_yuv(
        &mut self,
        rgb: &[u8],
        range: color::Range,
        dst: &mut frame::Video,
    ) -> SnapMarkResult<()> {
        self.check_size(dst.width(), dst.height())?;

        let full_range = is_full_range(range);
        if self.to_yuv.is_none() {
            let mut scaler = scaling::Context::get(
                Pixel::RGB24,
                self.width,
                self.height,
                dst.format(),
                self.width,
                self.height,
                Flags::BILINEAR,
            )?;
            set_bt709(&mut scaler, false, full_range);
            debug!("Created RGB24 -> {:?} scaler", dst.format());
            self.to_yuv = Some(CachedContext {
                scaler,
                source: Pixel::RGB24,
                full_range,
            });
        }

        let stride = self.rgb_frame.stride(0);
        unpack_rows(
            rgb,
            self.width as usize * 3,
            self.height as usize,
            self.rgb_frame.data_mut(0),
            stride,
        )?;

        let Some(cached) = self.to_yuv.as_mut() else {
            return Ok(());
        };
        if cached.full_range != full_range {
            log::warn!("YUV range changed mid-stream; keeping the first range");
        }
        cached.scaler.run(&self.rgb_frame, dst)?;
        Ok(())
    }
}
