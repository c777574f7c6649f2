//! Live desktop recording: capture, watermark, encode at a fixed rate.

use std::time::Instant;

use log::{debug, error, info, warn};
use serde::Serialize;

use super::pacing::FramePacer;
use super::session::PipelineSession;
use crate::capture::{CaptureOutcome, DesktopSource};
use crate::config::RecordingConfig;
use crate::error::SnapMarkResult;
use crate::media::FrameSink;
use crate::watermark::Watermark;

/// Counters reported when a recording finishes.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordStats {
    pub width: u32,
    pub height: u32,
    /// Iterations that acquired a new desktop image.
    pub frames_captured: u64,
    /// Iterations that re-encoded the previous image.
    pub frames_repeated: u64,
    pub frames_encoded: u64,
    /// Iterations with nothing to encode.
    pub frames_skipped: u64,
    pub elapsed_secs: f64,
}

/// Record `config.duration_secs * config.fps` iterations from `source` into
/// `sink`.
///
/// A timed-out acquire repeats the last composited frame; iterations before
/// the first frame, or with a recoverable capture failure, are skipped.
/// Fatal errors, including a desktop mode change, end the run.
/// Timestamps count the frames handed to `sink`.
pub fn run_recording<S, K>(
    source: &mut S,
    sink: &mut K,
    config: &RecordingConfig,
) -> SnapMarkResult<RecordStats>
where
    S: DesktopSource + ?Sized,
    K: FrameSink + ?Sized,
{
    let mut config = config.clone();
    config.validate()?;
    let started = Instant::now();

    let (width, height) = source.dimensions();
    let watermark = Watermark::from_source(&config.watermark, width, height)?;
    let mut session = PipelineSession::new(
        width,
        height,
        watermark.as_ref(),
        config.opacity,
        source.gpu_context(),
    )?;
    let pacer = FramePacer::new(config.fps, config.duration_secs);

    info!(
        "Recording {}x{} at {} fps for {}s ({} frames) -> {}",
        width,
        height,
        pacer.fps(),
        config.duration_secs,
        pacer.total_frames(),
        config.output.display()
    );

    let mut stats = RecordStats {
        width,
        height,
        ..Default::default()
    };
    let mut have_frame = false;

    for iteration in 0..pacer.total_frames() {
        let frame_start = Instant::now();

        let captured = source.capture_frame().and_then(|outcome| match outcome {
            CaptureOutcome::NewFrame => {
                source.read_composited_rgba(session.input_mut())?;
                session.composite_input(4)?;
                Ok(CaptureOutcome::NewFrame)
            }
            CaptureOutcome::Unchanged => Ok(CaptureOutcome::Unchanged),
        });

        let encode = match captured {
            Ok(CaptureOutcome::NewFrame) => {
                have_frame = true;
                stats.frames_captured += 1;
                true
            }
            Ok(CaptureOutcome::Unchanged) => {
                if have_frame {
                    stats.frames_repeated += 1;
                }
                have_frame
            }
            Err(e) if e.is_fatal() => {
                error!("Recording aborted on iteration {}: {}", iteration, e);
                return Err(e);
            }
            Err(e) => {
                warn!("Capture failed on iteration {}: {}", iteration, e);
                false
            }
        };

        if encode {
            let pts = session.next_pts();
            match sink.write_rgb(session.output(), pts) {
                Ok(()) => stats.frames_encoded += 1,
                Err(e) if e.is_fatal() => {
                    error!("Recording aborted at frame {}: {}", pts, e);
                    return Err(e);
                }
                Err(e) => {
                    warn!("Dropping frame {}: {}", pts, e);
                    stats.frames_skipped += 1;
                }
            }
        } else {
            stats.frames_skipped += 1;
        }

        if (iteration + 1) % u64::from(pacer.fps()) == 0 {
            debug!(
                "Recording progress: {}/{} iterations, {} encoded",
                iteration + 1,
                pacer.total_frames(),
                stats.frames_encoded
            );
        }

        pacer.wait(frame_start);
    }

    session.flush()?;
    sink.finish()?;

    stats.elapsed_secs = started.elapsed().as_secs_f64();
    info!(
        "Recording complete: {} encoded ({} captured, {} repeated, {} skipped) in {:.2}s",
        stats.frames_encoded,
        stats.frames_captured,
        stats.frames_repeated,
        stats.frames_skipped,
        stats.elapsed_secs
    );
    Ok(stats)
}

/// Record the primary desktop to `config.output` with the DXGI engine.
#[cfg(windows)]
pub fn record_desktop(config: &RecordingConfig) -> SnapMarkResult<RecordStats> {
    use ffmpeg_next::Rational;

    use crate::capture::DesktopDuplication;
    use crate::media::H264Output;
    use crate::rendering::GpuContext;

    let mut config = config.clone();
    config.validate()?;

    let ctx = GpuContext::new()?;
    let mut source = DesktopDuplication::new(ctx)?;
    let (width, height) = source.dimensions();
    let fps = config.fps as i32;
    let mut sink = H264Output::create(
        &config.output,
        width,
        height,
        Rational::new(1, fps),
        Some(Rational::new(fps, 1)),
        &config.encoder_settings(),
    )?;
    run_recording(&mut source, &mut sink, &config)
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;

    use super::*;
    use crate::config::WatermarkSource;
    use crate::error::SnapMarkError;
    use crate::rendering::context::test_support::gpu_or_skip;
    use crate::rendering::GpuContext;

    /// Scripted desktop: each capture pops the next outcome and new frames
    /// are filled with the frame's index as the red channel.
    struct ScriptedDesktop {
        width: u32,
        height: u32,
        script: VecDeque<SnapMarkResult<CaptureOutcome>>,
        frames_served: u8,
        gpu: Option<Arc<GpuContext>>,
    }

    impl ScriptedDesktop {
        fn new(width: u32, height: u32, script: Vec<SnapMarkResult<CaptureOutcome>>) -> Self {
            Self {
                width,
                height,
                script: script.into(),
                frames_served: 0,
                gpu: None,
            }
        }
    }

    impl DesktopSource for ScriptedDesktop {
        fn dimensions(&self) -> (u32, u32) {
            (self.width, self.height)
        }

        fn capture_frame(&mut self) -> SnapMarkResult<CaptureOutcome> {
            let outcome = self.script.pop_front().unwrap_or(Ok(CaptureOutcome::Unchanged));
            if matches!(outcome, Ok(CaptureOutcome::NewFrame)) {
                self.frames_served += 1;
            }
            outcome
        }

        fn read_composited_rgba(&mut self, dst: &mut Vec<u8>) -> SnapMarkResult<()> {
            dst.clear();
            dst.extend_from_slice(
                &[self.frames_served, 0, 0, 255].repeat((self.width * self.height) as usize),
            );
            Ok(())
        }

        fn gpu_context(&self) -> Option<Arc<GpuContext>> {
            self.gpu.clone()
        }
    }

    #[derive(Default)]
    struct CollectingSink {
        frames: Vec<(i64, Vec<u8>)>,
        finished: bool,
    }

    impl FrameSink for CollectingSink {
        fn write_rgb(&mut self, rgb: &[u8], pts: i64) -> SnapMarkResult<()> {
            self.frames.push((pts, rgb.to_vec()));
            Ok(())
        }

        fn finish(&mut self) -> SnapMarkResult<()> {
            self.finished = true;
            Ok(())
        }
    }

    fn short_config(fps: u32) -> RecordingConfig {
        RecordingConfig {
            duration_secs: 1,
            fps,
            watermark: WatermarkSource::None,
            ..Default::default()
        }
    }

    #[test]
    fn test_repeats_and_skips() {
        let mut source = ScriptedDesktop::new(
            4,
            2,
            vec![
                Ok(CaptureOutcome::Unchanged),
                Err(SnapMarkError::CaptureError("busy".into())),
                Ok(CaptureOutcome::NewFrame),
                Ok(CaptureOutcome::Unchanged),
                Ok(CaptureOutcome::NewFrame),
                Err(SnapMarkError::CaptureError("busy".into())),
            ],
        );
        let mut sink = CollectingSink::default();
        let stats = run_recording(&mut source, &mut sink, &short_config(10)).unwrap();

        assert_eq!(stats.frames_captured, 2);
        assert_eq!(stats.frames_skipped, 3);
        // Iterations 3, then the 4 trailing unscripted ones
        assert_eq!(stats.frames_repeated, 5);
        assert_eq!(stats.frames_encoded, 7);
        assert!(sink.finished);

        let pts: Vec<i64> = sink.frames.iter().map(|(p, _)| *p).collect();
        assert_eq!(pts, (0..7).collect::<Vec<_>>());

        let reds: Vec<u8> = sink.frames.iter().map(|(_, rgb)| rgb[0]).collect();
        assert_eq!(reds, vec![1, 1, 2, 2, 2, 2, 2]);
        assert!(sink.frames.iter().all(|(_, rgb)| rgb.len() == 4 * 2 * 3));
    }

    #[test]
    fn test_fatal_capture_error_aborts() {
        let mut source = ScriptedDesktop::new(
            2,
            2,
            vec![Ok(CaptureOutcome::NewFrame), Err(SnapMarkError::CaptureAccessLost)],
        );
        let mut sink = CollectingSink::default();
        let result = run_recording(&mut source, &mut sink, &short_config(10));
        assert!(matches!(result, Err(SnapMarkError::CaptureAccessLost)));
        assert_eq!(sink.frames.len(), 1);
        assert!(!sink.finished);
    }

    #[test]
    fn test_mode_change_aborts_run() {
        let mut source = ScriptedDesktop::new(
            4,
            4,
            vec![
                Ok(CaptureOutcome::NewFrame),
                Ok(CaptureOutcome::Unchanged),
                Err(SnapMarkError::CaptureModeChanged("4x4 -> 8x8".into())),
                Ok(CaptureOutcome::NewFrame),
            ],
        );
        let mut sink = CollectingSink::default();
        let result = run_recording(&mut source, &mut sink, &short_config(10));
        assert!(matches!(result, Err(SnapMarkError::CaptureModeChanged(_))));
        // Frames before the change were delivered, nothing after it
        assert_eq!(sink.frames.len(), 2);
        assert_eq!(source.script.len(), 1);
        assert!(!sink.finished);
    }

    #[test]
    fn test_no_frames_encodes_nothing() {
        let mut source = ScriptedDesktop::new(2, 2, Vec::new());
        let mut sink = CollectingSink::default();
        let stats = run_recording(&mut source, &mut sink, &short_config(5)).unwrap();
        assert_eq!(stats.frames_encoded, 0);
        assert_eq!(stats.frames_skipped, 5);
        assert!(sink.finished);
    }

    #[test]
    fn test_zero_duration_rejected() {
        let mut source = ScriptedDesktop::new(2, 2, Vec::new());
        let mut sink = CollectingSink::default();
        let mut config = short_config(5);
        config.duration_secs = 0;
        assert!(matches!(
            run_recording(&mut source, &mut sink, &config),
            Err(SnapMarkError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_watermark_blended_on_shared_device() {
        let Some(ctx) = gpu_or_skip() else { return };
        let dir = tempfile::tempdir().unwrap();
        let png = dir.path().join("white.png");
        image::RgbaImage::from_pixel(8, 8, image::Rgba([255, 255, 255, 255]))
            .save(&png)
            .unwrap();

        let mut source = ScriptedDesktop::new(8, 8, vec![Ok(CaptureOutcome::NewFrame)]);
        source.gpu = Some(ctx);
        let mut sink = CollectingSink::default();
        let mut config = short_config(2);
        config.watermark = WatermarkSource::Png(png);
        config.opacity = 1.0;

        let stats = run_recording(&mut source, &mut sink, &config).unwrap();
        assert_eq!(stats.frames_encoded, 2);
        for (_, rgb) in &sink.frames {
            assert!(rgb.iter().all(|&v| v >= 250));
        }
    }
}
