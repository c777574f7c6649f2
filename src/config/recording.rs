//! Live desktop recording configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::{clamp_opacity, require_path, EncoderSettings, WatermarkSource, DEFAULT_OPACITY};
use crate::error::{SnapMarkError, SnapMarkResult};

/// Settings for one recording run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecordingConfig {
    /// Output container path; the extension picks the muxer.
    pub output: PathBuf,

    /// Recording length in seconds.
    pub duration_secs: u32,

    /// Target frames per second (1-240).
    pub fps: u32,

    /// Global watermark opacity (0.0-1.0).
    pub opacity: f32,

    /// Watermark layer. `None` records the desktop unblended.
    pub watermark: WatermarkSource,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            output: PathBuf::from("recording.mp4"),
            duration_secs: 10,
            fps: 30,
            opacity: DEFAULT_OPACITY,
            watermark: WatermarkSource::default(),
        }
    }
}

impl RecordingConfig {
    /// Clamp soft settings into range and reject unusable ones.
    pub fn validate(&mut self) -> SnapMarkResult<()> {
        require_path(&self.output, "output")?;
        if self.duration_secs == 0 {
            return Err(SnapMarkError::InvalidConfig(
                "recording duration must be at least one second".to_string(),
            ));
        }
        self.fps = self.fps.clamp(1, 240);
        self.opacity = clamp_opacity(self.opacity);
        Ok(())
    }

    /// Total frames the run will encode.
    pub fn total_frames(&self) -> u64 {
        u64::from(self.duration_secs) * u64::from(self.fps)
    }

    /// Encoder settings derived from the frame rate.
    pub fn encoder_settings(&self) -> EncoderSettings {
        EncoderSettings::for_recording(self.fps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RecordingConfig::default();
        assert_eq!(config.fps, 30);
        assert_eq!(config.opacity, 0.3);
        assert_eq!(config.total_frames(), 300);
    }

    #[test]
    fn test_validate_clamps() {
        let mut config = RecordingConfig {
            fps: 1000,
            opacity: 1.7,
            ..Default::default()
        };
        config.validate().unwrap();
        assert_eq!(config.fps, 240);
        assert_eq!(config.opacity, 1.0);
    }

    #[test]
    fn test_validate_rejects_zero_duration() {
        let mut config = RecordingConfig {
            duration_secs: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SnapMarkError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_validate_rejects_empty_output() {
        let mut config = RecordingConfig {
            output: PathBuf::new(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_encoder_settings_follow_fps() {
        let config = RecordingConfig {
            fps: 25,
            ..Default::default()
        };
        assert_eq!(config.encoder_settings().gop, 25);
    }
}
