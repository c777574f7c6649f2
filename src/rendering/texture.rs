//! Device textures tagged with their size, format and role.

use std::sync::atomic::{AtomicU64, Ordering};

use super::context::GpuContext;
use crate::error::{SnapMarkError, SnapMarkResult};

static NEXT_TEXTURE_ID: AtomicU64 = AtomicU64::new(1);

/// What a texture is used for; decides its usage flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureRole {
    /// Blend output, copied to staging every frame.
    RenderTarget,
    /// Video frame or watermark sampled by the blend shader.
    ShaderInput,
    /// Desktop image the cursor is drawn onto; read back by the recorder.
    Capture,
    /// Decoded cursor bitmap.
    Sprite,
}

impl TextureRole {
    fn usage(self) -> wgpu::TextureUsages {
        use wgpu::TextureUsages as U;
        match self {
            TextureRole::RenderTarget => U::RENDER_ATTACHMENT | U::COPY_SRC,
            TextureRole::ShaderInput | TextureRole::Sprite => U::TEXTURE_BINDING | U::COPY_DST,
            TextureRole::Capture => {
                U::RENDER_ATTACHMENT | U::TEXTURE_BINDING | U::COPY_DST | U::COPY_SRC
            }
        }
    }
}

/// A 2D texture plus its default view.
pub struct GpuTexture {
    id: u64,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
    format: wgpu::TextureFormat,
    role: TextureRole,
}

impl GpuTexture {
    pub fn new(
        ctx: &GpuContext,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        role: TextureRole,
        label: &str,
    ) -> SnapMarkResult<Self> {
        if width == 0 || height == 0 {
            return Err(SnapMarkError::InvalidFrame(format!(
                "{} texture of {}x{}",
                label, width, height
            )));
        }
        let max = ctx.max_texture_dimension();
        if width > max || height > max {
            return Err(SnapMarkError::GpuError(format!(
                "{} texture {}x{} exceeds device limit {}",
                label, width, height, max
            )));
        }

        let texture = ctx.device().create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: role.usage(),
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Ok(Self {
            id: NEXT_TEXTURE_ID.fetch_add(1, Ordering::Relaxed),
            texture,
            view,
            width,
            height,
            format,
            role,
        })
    }

    /// Rewrite every texel from host rows `bytes_per_row` apart.
    pub fn write(&self, ctx: &GpuContext, data: &[u8], bytes_per_row: u32) -> SnapMarkResult<()> {
        let row_bytes = self.width * self.bytes_per_pixel();
        let needed = bytes_per_row as usize * (self.height as usize - 1) + row_bytes as usize;
        if bytes_per_row < row_bytes || data.len() < needed {
            return Err(SnapMarkError::InvalidFrame(format!(
                "{} bytes at stride {} cannot fill a {}x{} texture",
                data.len(),
                bytes_per_row,
                self.width,
                self.height
            )));
        }

        ctx.queue().write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_row),
                rows_per_image: Some(self.height),
            },
            self.extent(),
        );
        Ok(())
    }

    /// Process-unique identity, stable for the texture's lifetime.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    pub fn role(&self) -> TextureRole {
        self.role
    }

    pub fn bytes_per_pixel(&self) -> u32 {
        self.format.block_copy_size(None).unwrap_or(4)
    }

    pub fn extent(&self) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width: self.width,
            height: self.height,
            depth_or_array_layers: 1,
        }
    }
}
