//! Run configuration.
//!
//! Typed settings for the two driving modes plus the encoder parameters they
//! share. Every config derives serde so a run can be described in a JSON file
//! and adjusted from the command line.
//!
//! ## Architecture
//!
//! - `EncoderSettings`: H.264 bitrate, GOP, B-frames, x264 preset/tune
//! - `TranscodeConfig`: file input, output path, watermark, opacity
//! - `RecordingConfig`: output path, duration, fps, watermark, opacity

pub mod encoder;
pub mod recording;
pub mod transcode;

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{SnapMarkError, SnapMarkResult};

pub use encoder::EncoderSettings;
pub use recording::RecordingConfig;
pub use transcode::TranscodeConfig;

/// Default global watermark opacity.
pub const DEFAULT_OPACITY: f32 = 0.3;

/// PNG used when no watermark is given explicitly.
pub const DEFAULT_WATERMARK_PNG: &str = "watermark_1.png";

/// Where the watermark layer comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "value")]
pub enum WatermarkSource {
    /// No watermark; frames pass through unblended.
    None,
    /// PNG decoded and fitted to the frame size.
    Png(PathBuf),
    /// Literal text, tiled and rotated across the frame.
    Text(String),
}

impl Default for WatermarkSource {
    fn default() -> Self {
        WatermarkSource::Png(PathBuf::from(DEFAULT_WATERMARK_PNG))
    }
}

impl WatermarkSource {
    /// Text wins over PNG when both are given.
    pub fn from_options(text: Option<String>, png: Option<PathBuf>) -> Self {
        match (text, png) {
            (Some(text), _) if !text.is_empty() => WatermarkSource::Text(text),
            (_, Some(png)) => WatermarkSource::Png(png),
            _ => WatermarkSource::default(),
        }
    }
}

/// Compositing backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProcessingMethod {
    /// Custom GPU blend pipeline.
    #[default]
    Gpu,
    /// Media-library filter graph.
    FilterGraph,
}

impl std::str::FromStr for ProcessingMethod {
    type Err = SnapMarkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gpu" | "dx" => Ok(ProcessingMethod::Gpu),
            "filter" | "ffmpeg" => Ok(ProcessingMethod::FilterGraph),
            other => Err(SnapMarkError::InvalidConfig(format!(
                "unknown processing method '{}'",
                other
            ))),
        }
    }
}

/// Clamp an opacity into [0, 1]; NaN becomes 0.
pub fn clamp_opacity(opacity: f32) -> f32 {
    if opacity.is_nan() {
        0.0
    } else {
        opacity.clamp(0.0, 1.0)
    }
}

/// Read a config from a JSON file.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> SnapMarkResult<T> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn require_path(path: &Path, what: &str) -> SnapMarkResult<()> {
    if path.as_os_str().is_empty() {
        return Err(SnapMarkError::InvalidConfig(format!("{} path is empty", what)));
    }
    Ok(())
}
