//! Per-run pipeline state.

use std::sync::Arc;

use ffmpeg_next::frame;
use log::info;

use crate::error::{SnapMarkError, SnapMarkResult};
use crate::frame::rgba_to_rgb;
use crate::media::FrameConverter;
use crate::rendering::{GpuCompositor, GpuContext, GpuTexture};
use crate::watermark::Watermark;

/// GPU half of a session; only built when a watermark is blended.
struct BlendStage {
    // Textures drop before the compositor that created them.
    watermark: GpuTexture,
    video: Option<GpuTexture>,
    compositor: GpuCompositor,
    opacity: f32,
}

/// State owned by one transcode or recording run: target size, the
/// timestamp counter, cached converters, scratch buffers and the compositor.
///
/// Dropping the session releases its GPU textures before the compositor,
/// which holds the last reference to a device it created itself.
pub struct PipelineSession {
    width: u32,
    height: u32,
    frame_counter: u64,
    blend: Option<BlendStage>,
    converter: FrameConverter,
    input: Vec<u8>,
    output: Vec<u8>,
}

impl PipelineSession {
    /// Create a session for `width`x`height` frames. With a watermark, the
    /// compositor is built on `gpu` (or a fresh context) and the watermark
    /// is uploaded once.
    pub fn new(
        width: u32,
        height: u32,
        watermark: Option<&Watermark>,
        opacity: f32,
        gpu: Option<Arc<GpuContext>>,
    ) -> SnapMarkResult<Self> {
        let blend = match watermark {
            Some(wm) => {
                if (wm.width, wm.height) != (width, height) {
                    return Err(SnapMarkError::InvalidFrame(format!(
                        "watermark is {}x{}, frames are {}x{}",
                        wm.width, wm.height, width, height
                    )));
                }
                let ctx = match gpu {
                    Some(ctx) => ctx,
                    None => GpuContext::new()?,
                };
                let adapter = ctx.adapter_info().name.clone();
                let mut compositor = GpuCompositor::new(ctx, width, height)?;
                let watermark = compositor.create_texture_from_packed(&wm.rgba, width, height, 4)?;
                info!("GPU blend enabled on {} at opacity {:.2}", adapter, opacity);
                Some(BlendStage {
                    watermark,
                    video: None,
                    compositor,
                    opacity,
                })
            }
            None => {
                info!("No watermark; frames pass through unblended");
                None
            }
        };

        let pixels = width as usize * height as usize;
        Ok(Self {
            width,
            height,
            frame_counter: 0,
            blend,
            converter: FrameConverter::new(width, height),
            input: Vec::with_capacity(pixels * 4),
            output: Vec::with_capacity(pixels * 3),
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn blends(&self) -> bool {
        self.blend.is_some()
    }

    /// Next value of the monotonic frame counter.
    pub fn next_pts(&mut self) -> i64 {
        let pts = self.frame_counter as i64;
        self.frame_counter += 1;
        pts
    }

    /// Frames counted so far.
    pub fn frame_count(&self) -> u64 {
        self.frame_counter
    }

    /// Scratch buffer for the next packed input frame.
    pub fn input_mut(&mut self) -> &mut Vec<u8> {
        &mut self.input
    }

    /// Convert a decoded frame into the input buffer as tight RGB.
    pub fn load_decoded(&mut self, decoded: &frame::Video) -> SnapMarkResult<()> {
        self.converter.to_rgb(decoded, &mut self.input)
    }

    /// Composite the input buffer (`channels` = 3 or 4) and return the
    /// result as tight RGB. Without a watermark the input is only repacked.
    pub fn composite_input(&mut self, channels: usize) -> SnapMarkResult<&[u8]> {
        let expected = self.width as usize * self.height as usize * channels;
        if self.input.len() != expected {
            return Err(SnapMarkError::InvalidFrame(format!(
                "{}-channel {}x{} input needs {} bytes, got {}",
                channels,
                self.width,
                self.height,
                expected,
                self.input.len()
            )));
        }

        let (w, h) = (self.width, self.height);
        match self.blend.as_mut() {
            Some(stage) => {
                match &stage.video {
                    Some(video) => stage
                        .compositor
                        .update_texture(video, &self.input, w, h, channels)?,
                    None => {
                        let video = stage
                            .compositor
                            .create_texture_from_packed(&self.input, w, h, channels)?;
                        stage.video = Some(video);
                    }
                }
                let Some(video) = stage.video.as_ref() else {
                    return Err(SnapMarkError::GpuError("video texture missing".to_string()));
                };
                stage
                    .compositor
                    .blend_into(video, &stage.watermark, stage.opacity, &mut self.output)?;
            }
            None if channels == 4 => {
                rgba_to_rgb(&self.input, w, h, w as usize * 4, &mut self.output)?;
            }
            None => {
                self.output.clear();
                self.output.extend_from_slice(&self.input);
            }
        }
        Ok(&self.output)
    }

    /// Last composited frame, tight RGB.
    pub fn output(&self) -> &[u8] {
        &self.output
    }

    /// Wait for any queued GPU work.
    pub fn flush(&self) -> SnapMarkResult<()> {
        match &self.blend {
            Some(stage) => stage.compositor.context().wait_idle(),
            None => Ok(()),
        }
    }
}
