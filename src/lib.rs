//! SnapMark: GPU-composited watermarking for video files and live desktop
//! recordings.
//!
//! - [`pipeline::run_transcode`] decodes a file, blends a watermark onto
//!   every frame with [`rendering::GpuCompositor`] and re-encodes H.264.
//! - [`pipeline::run_recording`] drives a [`capture::DesktopSource`] at a
//!   fixed rate; on Windows the source is DXGI output duplication with the
//!   hardware cursor composited by [`cursor::CursorCompositor`].

pub mod capture;
pub mod config;
pub mod cursor;
pub mod error;
pub mod frame;
pub mod media;
pub mod pipeline;
pub mod rendering;
pub mod watermark;

pub use error::{SnapMarkError, SnapMarkResult};
pub use pipeline::{run_recording, run_transcode, RecordStats, TranscodeStats};
