//! H.264 encode + mux.

use std::path::{Path, PathBuf};

use ffmpeg_next::format::{self, Pixel};
use ffmpeg_next::{codec, encoder, frame, Dictionary, Packet, Rational};
use log::{debug, info, warn};

use super::scaler::FrameConverter;
use super::{is_transient, ColorTags, FrameSink};
use crate::config::EncoderSettings;
use crate::error::{SnapMarkError, SnapMarkResult};

/// True when an H.264 encoder is compiled into the linked FFmpeg.
pub fn h264_available() -> bool {
    super::init().is_ok() && encoder::find(codec::Id::H264).is_some()
}

/// H.264 video written to a container chosen from the output extension.
pub struct H264Output {
    path: PathBuf,
    octx: format::context::Output,
    encoder: encoder::video::Encoder,
    stream_index: usize,
    encoder_time_base: Rational,
    stream_time_base: Rational,
    converter: FrameConverter,
    yuv: frame::Video,
    packet: Packet,
    frames_sent: u64,
    frames_skipped: u64,
    packets_written: u64,
    finished: bool,
}

impl H264Output {
    /// Open `path`, configure the encoder and write the container header.
    ///
    /// `time_base` is the unit of the pts values passed to the encode calls.
    /// `frame_rate` is used when the settings do not fix one.
    pub fn create(
        path: &Path,
        width: u32,
        height: u32,
        time_base: Rational,
        frame_rate: Option<Rational>,
        settings: &EncoderSettings,
    ) -> SnapMarkResult<Self> {
        super::init()?;
        if width == 0 || height == 0 || width % 2 != 0 || height % 2 != 0 {
            return Err(SnapMarkError::InvalidFrame(format!(
                "H.264 YUV420P needs even non-zero dimensions, got {}x{}",
                width, height
            )));
        }

        let mut octx = format::output(&path)
            .map_err(|e| SnapMarkError::EncoderError(format!("Failed to create {}: {}", path.display(), e)))?;
        let global_header = octx.format().flags().contains(format::Flags::GLOBAL_HEADER);

        let codec = encoder::find(codec::Id::H264)
            .ok_or_else(|| SnapMarkError::EncoderError("No H.264 encoder available".to_string()))?;

        let mut ost = octx.add_stream(codec)?;
        let stream_index = ost.index();

        let mut video = codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()?;
        let frame_rate = settings
            .frame_rate
            .map(Rational::from)
            .or(frame_rate)
            .filter(|r| r.numerator() > 0 && r.denominator() > 0);

        video.set_width(width);
        video.set_height(height);
        video.set_format(Pixel::YUV420P);
        video.set_time_base(time_base);
        video.set_frame_rate(frame_rate);
        video.set_bit_rate(settings.bitrate);
        video.set_gop(settings.gop);
        video.set_max_b_frames(settings.max_b_frames);
        if global_header {
            video.set_flags(codec::Flags::GLOBAL_HEADER);
        }

        let mut options = Dictionary::new();
        for (key, value) in settings.codec_options() {
            options.set(key, &value);
        }
        let encoder = video
            .open_with(options)
            .map_err(|e| SnapMarkError::EncoderError(format!("Failed to open H.264 encoder: {}", e)))?;
        ost.set_parameters(&encoder);

        octx.write_header()
            .map_err(|e| SnapMarkError::EncoderError(format!("Failed to write header: {}", e)))?;
        let stream_time_base = octx
            .stream(stream_index)
            .map(|s| s.time_base())
            .ok_or_else(|| SnapMarkError::EncoderError("Output stream vanished".to_string()))?;

        info!(
            "H.264 output opened: {} {}x{} bitrate={} gop={} b-frames={} {:?}",
            path.display(),
            width,
            height,
            settings.bitrate,
            settings.gop,
            settings.max_b_frames,
            settings.codec_options()
        );

        Ok(Self {
            path: path.to_path_buf(),
            octx,
            encoder,
            stream_index,
            encoder_time_base: time_base,
            stream_time_base,
            converter: FrameConverter::new(width, height),
            yuv: frame::Video::new(Pixel::YUV420P, width, height),
            packet: Packet::empty(),
            frames_sent: 0,
            frames_skipped: 0,
            packets_written: 0,
            finished: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.encoder.width(), self.encoder.height())
    }

    /// Time base the encode calls' pts values are in.
    pub fn time_base(&self) -> Rational {
        self.encoder_time_base
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    pub fn frames_skipped(&self) -> u64 {
        self.frames_skipped
    }

    pub fn packets_written(&self) -> u64 {
        self.packets_written
    }

    /// Encode one YUV420P frame whose pts is in [`Self::time_base`].
    ///
    /// A full encoder input queue is drained and the frame resent once. A
    /// frame the encoder still rejects is logged and counted as skipped.
    pub fn encode(&mut self, frame: &frame::Video) -> SnapMarkResult<()> {
        if self.finished {
            return Err(SnapMarkError::EncoderError("encode after finish".to_string()));
        }
        let mut sent = self.encoder.send_frame(frame);
        if matches!(&sent, Err(e) if is_transient(e)) {
            debug!("Encoder busy at pts {:?}, draining before resend", frame.pts());
            self.drain_packets()?;
            sent = self.encoder.send_frame(frame);
        }
        match sent {
            Ok(()) => self.frames_sent += 1,
            Err(e) => {
                self.frames_skipped += 1;
                warn!("Skipping frame pts {:?}: {}", frame.pts(), e);
            }
        }
        self.drain_packets()
    }

    /// Convert tight RGB24 to YUV420P, tag it and encode it at `pts`.
    pub fn write_rgb_tagged(&mut self, rgb: &[u8], pts: i64, tags: &ColorTags) -> SnapMarkResult<()> {
        if self.finished {
            return Err(SnapMarkError::EncoderError("encode after finish".to_string()));
        }
        let mut yuv = std::mem::replace(&mut self.yuv, frame::Video::empty());
        let result = self
            .converter
            .rgb_to_yuv(rgb, tags.range, &mut yuv)
            .and_then(|()| {
                tags.apply_to(&mut yuv);
                yuv.set_pts(Some(pts));
                self.encode(&yuv)
            });
        self.yuv = yuv;
        result
    }

    fn drain_packets(&mut self) -> SnapMarkResult<()> {
        loop {
            match self.encoder.receive_packet(&mut self.packet) {
                Ok(()) => {
                    self.packet.set_stream(self.stream_index);
                    self.packet
                        .rescale_ts(self.encoder_time_base, self.stream_time_base);
                    self.packet.write_interleaved(&mut self.octx)?;
                    self.packets_written += 1;
                }
                Err(e) if is_transient(&e) => return Ok(()),
                Err(e) => {
                    warn!("Dropping undeliverable packet: {}", e);
                    return Ok(());
                }
            }
        }
    }

    /// Flush the encoder and write the container trailer. Idempotent.
    pub fn finalize(&mut self) -> SnapMarkResult<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;

        self.encoder.send_eof()?;
        self.drain_packets()?;
        self.octx
            .write_trailer()
            .map_err(|e| SnapMarkError::EncoderError(format!("Failed to write trailer: {}", e)))?;

        info!(
            "H.264 output finished: {} ({} frames, {} packets, {} skipped)",
            self.path.display(),
            self.frames_sent,
            self.packets_written,
            self.frames_skipped
        );
        Ok(())
    }
}

impl FrameSink for H264Output {
    fn write_rgb(&mut self, rgb: &[u8], pts: i64) -> SnapMarkResult<()> {
        self.write_rgb_tagged(rgb, pts, &ColorTags::unspecified())
    }

    fn finish(&mut self) -> SnapMarkResult<()> {
        self.finalize()
    }
}
