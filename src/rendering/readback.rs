//! Texture readback through a persistent staging buffer.
//!
//! The staging buffer is allocated once per source size. Each read appends
//! the texture copy to the caller's command encoder, submits, and blocks on
//! `device.poll(Wait)` before mapping, so every queued draw that wrote the
//! texture has completed when the callback sees the bytes.

use super::context::GpuContext;
use super::texture::GpuTexture;
use crate::error::{SnapMarkError, SnapMarkResult};

/// CPU-readable mirror of one texture size.
pub struct TextureReadback {
    buffer: wgpu::Buffer,
    width: u32,
    height: u32,
    bytes_per_pixel: u32,
    padded_bytes_per_row: u32,
}

/// Round a row up to wgpu's copy alignment.
pub fn padded_bytes_per_row(unpadded: u32) -> u32 {
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

impl TextureReadback {
    pub fn new(ctx: &GpuContext, width: u32, height: u32, bytes_per_pixel: u32) -> Self {
        let padded_bytes_per_row = padded_bytes_per_row(width * bytes_per_pixel);
        let buffer = ctx.device().create_buffer(&wgpu::BufferDescriptor {
            label: Some("Staging Readback Buffer"),
            size: u64::from(padded_bytes_per_row) * u64::from(height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        Self {
            buffer,
            width,
            height,
            bytes_per_pixel,
            padded_bytes_per_row,
        }
    }

    /// Row stride of the mapped bytes.
    pub fn stride(&self) -> usize {
        self.padded_bytes_per_row as usize
    }

    pub fn matches(&self, texture: &GpuTexture) -> bool {
        texture.width() == self.width
            && texture.height() == self.height
            && texture.bytes_per_pixel() == self.bytes_per_pixel
    }

    /// Copy `texture` into staging after the work already recorded in
    /// `encoder`, wait for the GPU, then hand the mapped rows and their
    /// stride to `read`.
    pub fn read_with<R>(
        &self,
        ctx: &GpuContext,
        mut encoder: wgpu::CommandEncoder,
        texture: &GpuTexture,
        read: impl FnOnce(&[u8], usize) -> R,
    ) -> SnapMarkResult<R> {
        if !self.matches(texture) {
            return Err(SnapMarkError::InvalidFrame(format!(
                "readback sized {}x{} cannot read a {}x{} texture",
                self.width,
                self.height,
                texture.width(),
                texture.height()
            )));
        }

        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: texture.texture(),
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &self.buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(self.padded_bytes_per_row),
                    rows_per_image: Some(self.height),
                },
            },
            texture.extent(),
        );
        ctx.queue().submit(Some(encoder.finish()));

        let slice = self.buffer.slice(..);
        let (tx, rx) = crossbeam_channel::bounded(1);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        ctx.wait_idle()?;
        ctx.ensure_alive()?;

        rx.recv()
            .map_err(|_| SnapMarkError::GpuError("staging map callback dropped".to_string()))?
            .map_err(|e| SnapMarkError::GpuError(format!("Failed to map staging buffer: {}", e)))?;

        let result = {
            let data = slice.get_mapped_range();
            read(&data, self.stride())
        };
        self.buffer.unmap();
        Ok(result)
    }

    /// Standalone read of `texture` with no preceding work.
    pub fn read<R>(
        &self,
        ctx: &GpuContext,
        texture: &GpuTexture,
        read: impl FnOnce(&[u8], usize) -> R,
    ) -> SnapMarkResult<R> {
        let encoder = ctx
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Texture Read Encoder"),
            });
        self.read_with(ctx, encoder, texture, read)
    }
}
