//! File transcode configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{
    clamp_opacity, require_path, EncoderSettings, ProcessingMethod, WatermarkSource,
    DEFAULT_OPACITY,
};
use crate::error::{SnapMarkError, SnapMarkResult};

/// Settings for one file transcode.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TranscodeConfig {
    /// Source container.
    pub input: PathBuf,

    /// Destination container. Empty derives `<stem>_watermarked<ext>`.
    pub output: PathBuf,

    /// Global watermark opacity (0.0-1.0).
    pub opacity: f32,

    /// Compositing backend.
    pub method: ProcessingMethod,

    /// Watermark layer.
    pub watermark: WatermarkSource,

    /// Encoder parameters.
    pub encoder: EncoderSettings,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::new(),
            output: PathBuf::new(),
            opacity: DEFAULT_OPACITY,
            method: ProcessingMethod::Gpu,
            watermark: WatermarkSource::default(),
            encoder: EncoderSettings::for_transcode(),
        }
    }
}

impl TranscodeConfig {
    /// Config for `input` with every other field at its default.
    pub fn for_input(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            ..Default::default()
        }
    }

    /// `<dir>/<stem>_watermarked<ext>` next to the input.
    pub fn default_output_path(input: &Path) -> PathBuf {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());
        let file_name = match input.extension() {
            Some(ext) => format!("{}_watermarked.{}", stem, ext.to_string_lossy()),
            None => format!("{}_watermarked", stem),
        };
        input.with_file_name(file_name)
    }

    /// Clamp soft settings into range, fill the output path and reject
    /// unusable configurations.
    pub fn validate(&mut self) -> SnapMarkResult<()> {
        require_path(&self.input, "input")?;
        if self.method == ProcessingMethod::FilterGraph {
            return Err(SnapMarkError::InvalidConfig(
                "the filter-graph method is not available in this build; use 'gpu'".to_string(),
            ));
        }
        if self.output.as_os_str().is_empty() {
            self.output = Self::default_output_path(&self.input);
        }
        if self.output == self.input {
            return Err(SnapMarkError::InvalidConfig(
                "output path must differ from the input".to_string(),
            ));
        }
        self.opacity = clamp_opacity(self.opacity);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_output_path() {
        let out = TranscodeConfig::default_output_path(Path::new("/videos/clip.mp4"));
        assert_eq!(out, PathBuf::from("/videos/clip_watermarked.mp4"));

        let out = TranscodeConfig::default_output_path(Path::new("movie"));
        assert_eq!(out, PathBuf::from("movie_watermarked"));
    }

    #[test]
    fn test_validate_fills_output() {
        let mut config = TranscodeConfig::for_input("in/talk.mkv");
        config.validate().unwrap();
        assert_eq!(config.output, PathBuf::from("in/talk_watermarked.mkv"));
    }

    #[test]
    fn test_validate_rejects_filter_graph() {
        let mut config = TranscodeConfig {
            method: ProcessingMethod::FilterGraph,
            ..TranscodeConfig::for_input("a.mp4")
        };
        assert!(matches!(
            config.validate(),
            Err(SnapMarkError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_validate_rejects_in_place() {
        let mut config = TranscodeConfig {
            output: "a.mp4".into(),
            ..TranscodeConfig::for_input("a.mp4")
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_missing_input() {
        let mut config = TranscodeConfig::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_clamps_opacity() {
        let mut config = TranscodeConfig {
            opacity: -1.0,
            ..TranscodeConfig::for_input("a.mp4")
        };
        config.validate().unwrap();
        assert_eq!(config.opacity, 0.0);
    }
}
