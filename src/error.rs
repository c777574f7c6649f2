//! Central error types for SnapMark.
//!
//! Typed errors shared by the compositor, capture engine and frame pipeline.
//! All errors implement `Serialize` so run reports can be emitted as JSON.

use serde::Serialize;
use thiserror::Error;

/// Main error type for SnapMark operations.
#[derive(Error, Debug)]
pub enum SnapMarkError {
    /// GPU device or resource creation failed (wgpu)
    #[error("GPU error: {0}")]
    GpuError(String),

    /// GPU device lost mid-session
    #[error("GPU device lost: {0}")]
    GpuDeviceLost(String),

    /// Desktop frame acquisition failed for one call
    #[error("Capture failed: {0}")]
    CaptureError(String),

    /// Duplication interface invalidated (mode change, secure desktop, session lock)
    #[error("Desktop duplication access lost")]
    CaptureAccessLost,

    /// Desktop resolution no longer matches the one duplication started at
    #[error("Desktop mode changed: {0}")]
    CaptureModeChanged(String),

    /// DXGI / Direct3D 11 object creation failed
    #[error("DXGI capture error: {0}")]
    DxgiError(String),

    /// Cursor sprite creation or upload failed
    #[error("Cursor error: {0}")]
    CursorError(String),

    /// Demux or decode failed
    #[error("Decoder error: {0}")]
    DecoderError(String),

    /// Encode or mux failed
    #[error("Encoder error: {0}")]
    EncoderError(String),

    /// Raw FFmpeg error
    #[error("FFmpeg error: {0}")]
    FfmpegError(#[from] ffmpeg_next::Error),

    /// Image decoding failed
    #[error("Image error: {0}")]
    ImageError(String),

    /// File system operation failed
    #[error("Storage error: {0}")]
    StorageError(#[from] std::io::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Configuration rejected by validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Frame buffer dimensions or layout do not match the session
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl SnapMarkError {
    /// Per-frame failures the pipeline logs and skips.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SnapMarkError::CaptureError(_)
                | SnapMarkError::CursorError(_)
                | SnapMarkError::DecoderError(_)
                | SnapMarkError::EncoderError(_)
        )
    }

    /// Everything that is not a per-frame failure aborts the session.
    pub fn is_fatal(&self) -> bool {
        !self.is_recoverable()
    }
}

impl Serialize for SnapMarkError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl From<image::ImageError> for SnapMarkError {
    fn from(err: image::ImageError) -> Self {
        SnapMarkError::ImageError(err.to_string())
    }
}

impl From<String> for SnapMarkError {
    fn from(msg: String) -> Self {
        SnapMarkError::Other(msg)
    }
}

impl From<&str> for SnapMarkError {
    fn from(msg: &str) -> Self {
        SnapMarkError::Other(msg.to_string())
    }
}

#[cfg(windows)]
impl From<windows::core::Error> for SnapMarkError {
    fn from(err: windows::core::Error) -> Self {
        SnapMarkError::DxgiError(format!("{} (HRESULT {:#010x})", err.message(), err.code().0))
    }
}

/// Type alias for Results using SnapMarkError.
pub type SnapMarkResult<T> = Result<T, SnapMarkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SnapMarkError::CaptureError("acquire failed".to_string());
        assert_eq!(err.to_string(), "Capture failed: acquire failed");
    }

    #[test]
    fn test_error_serialization() {
        let err = SnapMarkError::CaptureAccessLost;
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("access lost"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: SnapMarkError = io_err.into();
        assert!(matches!(err, SnapMarkError::StorageError(_)));
    }

    #[test]
    fn test_from_ffmpeg_error() {
        let err: SnapMarkError = ffmpeg_next::Error::Eof.into();
        assert!(matches!(err, SnapMarkError::FfmpegError(_)));
        assert!(err.to_string().starts_with("FFmpeg error"));
    }

    #[test]
    fn test_from_string() {
        let err: SnapMarkError = "test error".into();
        assert!(matches!(err, SnapMarkError::Other(_)));
    }

    #[test]
    fn test_fatal_classification() {
        assert!(SnapMarkError::GpuError("no adapter".into()).is_fatal());
        assert!(SnapMarkError::DxgiError("DuplicateOutput".into()).is_fatal());
        assert!(SnapMarkError::CaptureAccessLost.is_fatal());
        assert!(SnapMarkError::InvalidFrame("8x8 into 16x16".into()).is_fatal());
        assert!(!SnapMarkError::CaptureError("busy".into()).is_fatal());
        assert!(!SnapMarkError::DecoderError("corrupt packet".into()).is_fatal());
        assert!(SnapMarkError::CaptureModeChanged("1920x1080 -> 1280x720".into()).is_fatal());
        assert!(SnapMarkError::FfmpegError(ffmpeg_next::Error::Eof).is_fatal());
        assert!(SnapMarkError::Other("misc".into()).is_fatal());
    }

    #[test]
    fn test_recoverable_classification() {
        assert!(SnapMarkError::CaptureError("busy".into()).is_recoverable());
        assert!(SnapMarkError::EncoderError("send_frame".into()).is_recoverable());
        assert!(SnapMarkError::DecoderError("send_packet".into()).is_recoverable());
        assert!(!SnapMarkError::GpuError("device".into()).is_recoverable());
        assert!(!SnapMarkError::Other("misc".into()).is_recoverable());
    }

    #[test]
    fn test_pipeline_errors() {
        let dxgi = SnapMarkError::DxgiError("desktop duplication failed".to_string());
        assert!(dxgi.to_string().contains("DXGI"));

        let encoder = SnapMarkError::EncoderError("frame encoding failed".to_string());
        assert!(encoder.to_string().contains("Encoder"));

        let gpu_lost = SnapMarkError::GpuDeviceLost("device removed".to_string());
        assert!(gpu_lost.to_string().contains("GPU device lost"));
    }
}
