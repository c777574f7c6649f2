//! Frame pipelines.
//!
//! Both pipelines funnel frames through a [`PipelineSession`]: the file
//! transcode feeds it decoded video, the recorder feeds it captured desktop
//! images, and each composited RGB frame goes to the H.264 encoder.

pub mod pacing;
pub mod record;
pub mod session;
pub mod transcode;

pub use pacing::FramePacer;
#[cfg(windows)]
pub use record::record_desktop;
pub use record::{run_recording, RecordStats};
pub use session::PipelineSession;
pub use transcode::{run_transcode, TranscodeStats};
