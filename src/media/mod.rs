//! Demux, decode, scale and encode through ffmpeg-next.
//!
//! - `decoder`: best-video-stream demux + decode of an input file
//! - `encoder`: H.264 encode + mux into a container picked by extension
//! - `scaler`: cached swscale contexts between codec formats and RGB24

pub mod decoder;
pub mod encoder;
pub mod scaler;

pub use decoder::VideoInput;
pub use encoder::H264Output;
pub use scaler::FrameConverter;

use ffmpeg_next::color;
use ffmpeg_next::frame::Video as VideoFrame;

use crate::error::SnapMarkResult;

/// Initialize the FFmpeg libraries. Safe to call more than once.
pub fn init() -> SnapMarkResult<()> {
    ffmpeg_next::init()?;
    Ok(())
}

/// Encoder seam for the recording loop.
pub trait FrameSink {
    /// Encode one tight RGB24 frame with presentation timestamp `pts`.
    fn write_rgb(&mut self, rgb: &[u8], pts: i64) -> SnapMarkResult<()>;

    /// Flush buffered packets and finalize the output.
    fn finish(&mut self) -> SnapMarkResult<()>;
}

/// "Would block" and "end of stream" from send/receive calls.
pub(crate) fn is_transient(err: &ffmpeg_next::Error) -> bool {
    matches!(
        err,
        ffmpeg_next::Error::Eof
            | ffmpeg_next::Error::Other {
                errno: ffmpeg_next::error::EAGAIN
            }
    )
}

/// Color description carried from a decoded frame onto its re-encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorTags {
    pub range: color::Range,
    pub primaries: color::Primaries,
    pub transfer: color::TransferCharacteristic,
    pub space: color::Space,
}

impl ColorTags {
    /// Tags for sources with no color metadata (desktop capture).
    pub fn unspecified() -> Self {
        Self {
            range: color::Range::Unspecified,
            primaries: color::Primaries::Unspecified,
            transfer: color::TransferCharacteristic::Unspecified,
            space: color::Space::Unspecified,
        }
    }

    pub fn from_frame(frame: &VideoFrame) -> Self {
        Self {
            range: frame.color_range(),
            primaries: frame.color_primaries(),
            transfer: frame.color_transfer_characteristic(),
            space: frame.color_space(),
        }
    }

    pub fn apply_to(&self, frame: &mut VideoFrame) {
        frame.set_color_range(self.range);
        frame.set_color_primaries(self.primaries);
        frame.set_color_transfer_characteristic(self.transfer);
        frame.set_color_space(self.space);
    }

    /// Full-range (JPEG) YUV as opposed to limited (MPEG) or unknown.
    pub fn is_full_range(&self) -> bool {
        self.range == color::Range::JPEG
    }
}

impl Default for ColorTags {
    fn default() -> Self {
        Self::unspecified()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ffmpeg_next::format::Pixel;

    #[test]
    fn test_transient_errors() {
        assert!(is_transient(&ffmpeg_next::Error::Eof));
        assert!(is_transient(&ffmpeg_next::Error::Other {
            errno: ffmpeg_next::error::EAGAIN
        }));
        assert!(!is_transient(&ffmpeg_next::Error::InvalidData));
    }

    #[test]
    fn test_color_tags_round_trip_through_frame() {
        let tags = ColorTags {
            range: color::Range::JPEG,
            primaries: color::Primaries::BT709,
            transfer: color::TransferCharacteristic::BT709,
            space: color::Space::BT709,
        };
        let mut frame = VideoFrame::new(Pixel::YUV420P, 16, 16);
        tags.apply_to(&mut frame);

        assert_eq!(ColorTags::from_frame(&frame), tags);
        assert!(tags.is_full_range());
        assert!(!ColorTags::unspecified().is_full_range());
    }
}
