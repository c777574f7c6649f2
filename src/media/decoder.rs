//! Video demux + decode.

use std::path::{Path, PathBuf};

use ffmpeg_next::format::{self, Pixel};
use ffmpeg_next::{codec, decoder, frame, media, Packet, Rational};
use log::{debug, info, warn};

use super::is_transient;
use crate::error::{SnapMarkError, SnapMarkResult};

/// Best video stream of an input file, decoded frame by frame.
pub struct VideoInput {
    path: PathBuf,
    ictx: format::context::Input,
    decoder: decoder::Video,
    stream_index: usize,
    time_base: Rational,
    frame_rate: Rational,
    eof_sent: bool,
    packets_read: u64,
    packets_skipped: u64,
}

fn open_decoder(ictx: &format::context::Input) -> SnapMarkResult<(usize, Rational, Rational, decoder::Video)> {
    let stream = ictx
        .streams()
        .best(media::Type::Video)
        .ok_or_else(|| SnapMarkError::DecoderError("No video stream found".to_string()))?;

    let time_base = stream.time_base();
    let avg = stream.avg_frame_rate();
    let frame_rate = if avg.numerator() > 0 && avg.denominator() > 0 {
        avg
    } else {
        stream.rate()
    };

    let decoder = codec::context::Context::from_parameters(stream.parameters())
        .and_then(|ctx| ctx.decoder().video())
        .map_err(|e| SnapMarkError::DecoderError(format!("Failed to open video decoder: {}", e)))?;

    Ok((stream.index(), time_base, frame_rate, decoder))
}

impl VideoInput {
    pub fn open(path: &Path) -> SnapMarkResult<Self> {
        super::init()?;
        let ictx = format::input(&path)
            .map_err(|e| SnapMarkError::DecoderError(format!("Failed to open {}: {}", path.display(), e)))?;
        let (stream_index, time_base, frame_rate, decoder) = open_decoder(&ictx)?;

        info!(
            "Video input opened: {} {}x{} {:?} @ {}/{} fps (time base {}/{})",
            path.display(),
            decoder.width(),
            decoder.height(),
            decoder.format(),
            frame_rate.numerator(),
            frame_rate.denominator(),
            time_base.numerator(),
            time_base.denominator()
        );

        Ok(Self {
            path: path.to_path_buf(),
            ictx,
            decoder,
            stream_index,
            time_base,
            frame_rate,
            eof_sent: false,
            packets_read: 0,
            packets_skipped: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn width(&self) -> u32 {
        self.decoder.width()
    }

    pub fn height(&self) -> u32 {
        self.decoder.height()
    }

    /// Decoder-native pixel format.
    pub fn format(&self) -> Pixel {
        self.decoder.format()
    }

    /// Stream time base; decoded frame timestamps are in this unit.
    pub fn time_base(&self) -> Rational {
        self.time_base
    }

    pub fn frame_rate(&self) -> Rational {
        self.frame_rate
    }

    /// Video packets fed to the decoder so far.
    pub fn packets_read(&self) -> u64 {
        self.packets_read
    }

    /// Packets the decoder rejected and that were dropped.
    pub fn packets_skipped(&self) -> u64 {
        self.packets_skipped
    }

    fn next_video_packet(&mut self) -> Option<Packet> {
        let index = self.stream_index;
        self.ictx
            .packets()
            .find(|(stream, _)| stream.index() == index)
            .map(|(_, packet)| packet)
    }

    /// Decode the next frame into `frame`. Returns `false` once the input
    /// is exhausted and the decoder has been drained.
    ///
    /// Corrupt packets are logged and skipped.
    pub fn next_frame(&mut self, frame: &mut frame::Video) -> SnapMarkResult<bool> {
        loop {
            match self.decoder.receive_frame(frame) {
                Ok(()) => return Ok(true),
                Err(ffmpeg_next::Error::Eof) => return Ok(false),
                Err(e) if is_transient(&e) => {}
                Err(e) => warn!("Dropping undecodable frame: {}", e),
            }

            if self.eof_sent {
                return Ok(false);
            }

            match self.next_video_packet() {
                Some(packet) => {
                    self.packets_read += 1;
                    if let Err(e) = self.decoder.send_packet(&packet) {
                        if !is_transient(&e) {
                            self.packets_skipped += 1;
                            warn!("Skipping packet {}: {}", self.packets_read, e);
                        }
                    }
                }
                None => {
                    debug!("End of input, flushing decoder");
                    self.decoder.send_eof()?;
                    self.eof_sent = true;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.mp4");
        assert!(matches!(
            VideoInput::open(&missing),
            Err(SnapMarkError::DecoderError(_))
        ));
    }

    #[test]
    fn test_open_non_media_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.mp4");
        std::fs::write(&path, b"definitely not a container").unwrap();
        assert!(VideoInput::open(&path).is_err());
    }
}
