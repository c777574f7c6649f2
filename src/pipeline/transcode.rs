//! File transcode: decode, watermark, re-encode.

use std::time::Instant;

use ffmpeg_next::{frame, Rational, Rescale};
use log::{debug, error, info, warn};
use serde::Serialize;

use super::session::PipelineSession;
use crate::config::TranscodeConfig;
use crate::error::SnapMarkResult;
use crate::media::{ColorTags, H264Output, VideoInput};
use crate::watermark::Watermark;

/// Counters reported when a transcode finishes.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscodeStats {
    pub width: u32,
    pub height: u32,
    pub frames_decoded: u64,
    pub frames_encoded: u64,
    pub frames_skipped: u64,
    pub packets_read: u64,
    pub packets_skipped: u64,
    pub elapsed_secs: f64,
}

/// Presentation time of a decoded frame in `source_time_base`.
///
/// The frame's own pts wins, then the decoder's best-effort timestamp.
/// Frames with neither are placed `index` frame intervals from zero.
fn source_pts(
    pts: Option<i64>,
    best_effort: Option<i64>,
    index: i64,
    frame_rate: Rational,
    source_time_base: Rational,
) -> i64 {
    pts.or(best_effort).unwrap_or_else(|| {
        if frame_rate.numerator() > 0 && frame_rate.denominator() > 0 {
            index.rescale(frame_rate.invert(), source_time_base)
        } else {
            index
        }
    })
}

/// Decode `config.input`, blend the watermark onto every frame and write an
/// H.264 stream to `config.output` with the source timing.
///
/// Per-frame decode or encode failures are logged and skipped; anything
/// fatal (device, resolution change) aborts.
pub fn run_transcode(config: &TranscodeConfig) -> SnapMarkResult<TranscodeStats> {
    let mut config = config.clone();
    config.validate()?;
    let started = Instant::now();

    let mut input = VideoInput::open(&config.input)?;
    let (width, height) = (input.width(), input.height());
    let watermark = Watermark::from_source(&config.watermark, width, height)?;
    let mut session = PipelineSession::new(width, height, watermark.as_ref(), config.opacity, None)?;

    let source_time_base = input.time_base();
    let frame_rate = input.frame_rate();
    let mut output = H264Output::create(
        &config.output,
        width,
        height,
        source_time_base,
        Some(frame_rate),
        &config.encoder,
    )?;
    let target_time_base = output.time_base();

    info!(
        "Transcoding {} -> {} ({}x{}, opacity {:.2})",
        config.input.display(),
        config.output.display(),
        width,
        height,
        config.opacity
    );

    let progress_every = if frame_rate.denominator() > 0 && frame_rate.numerator() > 0 {
        (f64::from(frame_rate).round() as u64).max(1)
    } else {
        30
    };

    let mut stats = TranscodeStats {
        width,
        height,
        ..Default::default()
    };
    let mut decoded = frame::Video::empty();

    while input.next_frame(&mut decoded)? {
        stats.frames_decoded += 1;
        let index = session.next_pts();
        let pts = source_pts(
            decoded.pts(),
            decoded.timestamp(),
            index,
            frame_rate,
            source_time_base,
        )
        .rescale(source_time_base, target_time_base);
        let tags = ColorTags::from_frame(&decoded);

        let result = session
            .load_decoded(&decoded)
            .and_then(|_| session.composite_input(3).map(|_| ()))
            .and_then(|_| output.write_rgb_tagged(session.output(), pts, &tags));

        match result {
            Ok(()) => {}
            Err(e) if e.is_fatal() => {
                error!("Transcode aborted at frame {}: {}", stats.frames_decoded, e);
                return Err(e);
            }
            Err(e) => warn!("Skipping frame {}: {}", stats.frames_decoded, e),
        }

        if stats.frames_decoded % progress_every == 0 {
            debug!(
                "Transcode progress: {} frames decoded, {} encoded",
                stats.frames_decoded,
                output.frames_sent()
            );
        }
    }

    session.flush()?;
    output.finalize()?;

    // The encoder counts its own rejections; everything else was skipped here.
    stats.frames_encoded = output.frames_sent();
    stats.frames_skipped = stats.frames_decoded.saturating_sub(stats.frames_encoded);
    stats.packets_read = input.packets_read();
    stats.packets_skipped = input.packets_skipped();
    stats.elapsed_secs = started.elapsed().as_secs_f64();
    info!(
        "Transcode complete: {} frames encoded, {} skipped, {}/{} packets skipped in {:.2}s",
        stats.frames_encoded,
        stats.frames_skipped,
        stats.packets_skipped,
        stats.packets_read,
        stats.elapsed_secs
    );
    Ok(stats)
}
