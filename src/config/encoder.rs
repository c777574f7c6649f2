//! H.264 encoder parameters shared by both driving modes.

use serde::{Deserialize, Serialize};

/// Output bitrate used for both file and desktop sources.
pub const DEFAULT_BITRATE: usize = 4_000_000;

/// Keyframe interval for file transcodes.
pub const TRANSCODE_GOP: u32 = 12;

/// B-frame window.
pub const DEFAULT_MAX_B_FRAMES: usize = 2;

/// Encoder settings handed to the muxer/encoder at open time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncoderSettings {
    /// Target bitrate in bits per second.
    pub bitrate: usize,

    /// Frames between keyframes.
    pub gop: u32,

    /// Maximum consecutive B-frames.
    pub max_b_frames: usize,

    /// x264 `preset` option.
    pub preset: String,

    /// x264 `tune` option.
    pub tune: Option<String>,

    /// x264 `crf` option.
    pub crf: Option<u32>,

    /// Frame rate as (numerator, denominator). None inherits from the input.
    pub frame_rate: Option<(i32, i32)>,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self::for_transcode()
    }
}

impl EncoderSettings {
    /// Settings for re-encoding a decoded file; timing comes from the input.
    pub fn for_transcode() -> Self {
        Self {
            bitrate: DEFAULT_BITRATE,
            gop: TRANSCODE_GOP,
            max_b_frames: DEFAULT_MAX_B_FRAMES,
            preset: "medium".to_string(),
            tune: None,
            crf: Some(23),
            frame_rate: None,
        }
    }

    /// Settings for live desktop capture at `fps`: one keyframe per second,
    /// tuned for low latency.
    pub fn for_recording(fps: u32) -> Self {
        let fps = fps.max(1);
        Self {
            bitrate: DEFAULT_BITRATE,
            gop: fps,
            max_b_frames: DEFAULT_MAX_B_FRAMES,
            preset: "fast".to_string(),
            tune: Some("zerolatency".to_string()),
            crf: None,
            frame_rate: Some((fps as i32, 1)),
        }
    }

    /// x264 private options as key/value pairs.
    pub fn codec_options(&self) -> Vec<(&'static str, String)> {
        let mut opts = vec![("preset", self.preset.clone())];
        if let Some(tune) = &self.tune {
            opts.push(("tune", tune.clone()));
        }
        if let Some(crf) = self.crf {
            opts.push(("crf", crf.to_string()));
        }
        opts
    }
}
