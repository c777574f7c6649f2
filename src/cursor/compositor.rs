//! Cursor overlay drawn onto the capture texture.
//!
//! Owns a small quad pipeline separate from the watermark blend. The sprite
//! texture is rebuilt only when the shape's dimensions change and rewritten
//! in place otherwise; decoding runs only when [`CursorState`] is dirty.

use std::sync::Arc;

use wgpu::util::DeviceExt;

use super::state::CursorState;
use crate::error::{SnapMarkError, SnapMarkResult};
use crate::rendering::{GpuContext, GpuTexture, TextureRole};

const CURSOR_SHADER: &str = include_str!("cursor.wgsl");

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct CursorUniforms {
    origin: [f32; 2],
    screen_size: [f32; 2],
    sprite_size: [f32; 2],
    _pad: [f32; 2],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct SpriteVertex {
    position: [f32; 2],
    uv: [f32; 2],
}

/// Unit quad; scaled to sprite size in the vertex shader.
const SPRITE_VERTICES: [SpriteVertex; 4] = [
    SpriteVertex {
        position: [0.0, 0.0],
        uv: [0.0, 0.0],
    },
    SpriteVertex {
        position: [1.0, 0.0],
        uv: [1.0, 0.0],
    },
    SpriteVertex {
        position: [1.0, 1.0],
        uv: [1.0, 1.0],
    },
    SpriteVertex {
        position: [0.0, 1.0],
        uv: [0.0, 1.0],
    },
];

const SPRITE_INDICES: [u16; 6] = [0, 1, 2, 0, 2, 3];

struct Sprite {
    texture: GpuTexture,
    bind_group: wgpu::BindGroup,
}

pub struct CursorCompositor {
    ctx: Arc<GpuContext>,
    target_format: wgpu::TextureFormat,
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    uniform_buffer: wgpu::Buffer,
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    sprite: Option<Sprite>,
    state: CursorState,
}

impl CursorCompositor {
    /// Build the overlay pipeline for targets of `target_format`.
    pub fn new(ctx: Arc<GpuContext>, target_format: wgpu::TextureFormat) -> Self {
        let device = ctx.device();
        let shader = ctx.create_shader(CURSOR_SHADER, "Cursor Shader");

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Cursor Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Cursor Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Cursor Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<SpriteVertex>() as wgpu::BufferAddress,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2],
                }],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: target_format,
                    blend: Some(wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: Default::default(),
            multiview: None,
            cache: None,
        });

        // Sprites are drawn 1:1, so nearest keeps mask edges crisp
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Cursor Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Cursor Uniform Buffer"),
            size: std::mem::size_of::<CursorUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Cursor Quad Vertices"),
            contents: bytemuck::cast_slice(&SPRITE_VERTICES),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Cursor Quad Indices"),
            contents: bytemuck::cast_slice(&SPRITE_INDICES),
            usage: wgpu::BufferUsages::INDEX,
        });

        Self {
            ctx,
            target_format,
            pipeline,
            bind_group_layout,
            sampler,
            uniform_buffer,
            vertex_buffer,
            index_buffer,
            sprite: None,
            state: CursorState::new(),
        }
    }

    pub fn state(&self) -> &CursorState {
        &self.state
    }

    /// Mutable state for the capture engine's pointer updates.
    pub fn state_mut(&mut self) -> &mut CursorState {
        &mut self.state
    }

    pub fn has_sprite(&self) -> bool {
        self.sprite.is_some()
    }

    /// Current sprite dimensions, if one exists.
    pub fn sprite_size(&self) -> Option<(u32, u32)> {
        self.sprite
            .as_ref()
            .map(|s| (s.texture.width(), s.texture.height()))
    }

    /// Decode the shape into the sprite texture if the shape changed.
    fn refresh_sprite(&mut self) -> SnapMarkResult<()> {
        if !self.state.take_dirty() {
            return Ok(());
        }

        let Some(shape) = self.state.shape() else {
            self.sprite = None;
            return Ok(());
        };

        let decoded = match shape.decode() {
            Ok(decoded) => decoded,
            Err(e) => {
                log::warn!("Skipping undecodable {} cursor: {}", shape.kind_name(), e);
                self.sprite = None;
                return Ok(());
            }
        };
        log::debug!(
            "Cursor shape changed: {} {}x{}",
            shape.kind_name(),
            decoded.width,
            decoded.height
        );

        let reuse = matches!(
            &self.sprite,
            Some(s) if s.texture.width() == decoded.width && s.texture.height() == decoded.height
        );
        if !reuse {
            let texture = GpuTexture::new(
                &self.ctx,
                decoded.width,
                decoded.height,
                wgpu::TextureFormat::Rgba8Unorm,
                TextureRole::Sprite,
                "Cursor Sprite",
            )
            .map_err(|e| SnapMarkError::CursorError(e.to_string()))?;
            let bind_group = self.ctx.device().create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Cursor Bind Group"),
                layout: &self.bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: self.uniform_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(texture.view()),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::Sampler(&self.sampler),
                    },
                ],
            });
            self.sprite = Some(Sprite {
                texture,
                bind_group,
            });
        }

        if let Some(sprite) = &self.sprite {
            sprite
                .texture
                .write(&self.ctx, &decoded.rgba, decoded.width * 4)?;
        }
        Ok(())
    }

    /// Draw the pointer onto `target` at its hot-spot-adjusted position.
    /// Does nothing while the pointer is hidden or no sprite exists.
    pub fn draw(&mut self, target: &GpuTexture) -> SnapMarkResult<()> {
        if target.format() != self.target_format {
            return Err(SnapMarkError::InvalidFrame(format!(
                "cursor pipeline built for {:?}, target is {:?}",
                self.target_format,
                target.format()
            )));
        }

        self.refresh_sprite()?;
        if !self.state.visible() {
            return Ok(());
        }
        let Some(sprite) = &self.sprite else {
            return Ok(());
        };

        let (x, y) = self.state.draw_origin();
        let uniforms = CursorUniforms {
            origin: [x as f32, y as f32],
            screen_size: [target.width() as f32, target.height() as f32],
            sprite_size: [sprite.texture.width() as f32, sprite.texture.height() as f32],
            _pad: [0.0; 2],
        };
        self.ctx
            .queue()
            .write_buffer(&self.uniform_buffer, 0, bytemuck::cast_slice(&[uniforms]));

        let mut encoder = self
            .ctx
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Cursor Encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Cursor Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target.view(),
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_viewport(
                0.0,
                0.0,
                target.width() as f32,
                target.height() as f32,
                0.0,
                1.0,
            );
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &sprite.bind_group, &[]);
            pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
            pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint16);
            pass.draw_indexed(0..SPRITE_INDICES.len() as u32, 0, 0..1);
        }
        self.ctx.queue().submit(Some(encoder.finish()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::shape::{PointerShape, ShapeBuffer};
    use crate::frame::bgra_to_rgba;
    use crate::rendering::context::test_support::gpu_or_skip;
    use crate::rendering::TextureReadback;

    const CAPTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Bgra8Unorm;

    fn capture_texture(ctx: &GpuContext, w: u32, h: u32, bgra: [u8; 4]) -> GpuTexture {
        let tex = GpuTexture::new(ctx, w, h, CAPTURE_FORMAT, TextureRole::Capture, "capture").unwrap();
        tex.write(ctx, &bgra.repeat((w * h) as usize), w * 4).unwrap();
        tex
    }

    fn read_rgba(ctx: &GpuContext, tex: &GpuTexture) -> Vec<u8> {
        let readback = TextureReadback::new(ctx, tex.width(), tex.height(), 4);
        let mut out = Vec::new();
        readback
            .read(ctx, tex, |data, stride| {
                bgra_to_rgba(data, tex.width(), tex.height(), stride, &mut out)
            })
            .unwrap()
            .unwrap();
        out
    }

    fn rgba_at(buf: &[u8], width: u32, x: u32, y: u32) -> [u8; 4] {
        let i = ((y * width + x) * 4) as usize;
        [buf[i], buf[i + 1], buf[i + 2], buf[i + 3]]
    }

    /// 8x2 monochrome: row 0 opaque black, row 1 transparent.
    fn mono_shape() -> PointerShape {
        PointerShape::Monochrome(ShapeBuffer {
            width: 8,
            height: 2,
            pitch: 1,
            data: vec![0x00, 0xFF, 0x00, 0x00],
        })
    }

    #[test]
    fn test_uniform_layout() {
        assert_eq!(std::mem::size_of::<CursorUniforms>(), 32);
    }

    #[test]
    fn test_draws_sprite_at_hot_spot_adjusted_origin() {
        let Some(ctx) = gpu_or_skip() else { return };
        let target = capture_texture(&ctx, 32, 16, [255, 255, 255, 255]);
        let mut cursor = CursorCompositor::new(ctx.clone(), CAPTURE_FORMAT);

        cursor.state_mut().update_position(12, 6, true);
        cursor.state_mut().set_shape(Some(mono_shape()), (2, 1));
        cursor.draw(&target).unwrap();

        let out = read_rgba(&ctx, &target);
        // Origin (10, 5): row 5 black from x=10..18, row 6 transparent
        assert_eq!(rgba_at(&out, 32, 10, 5), [0, 0, 0, 255]);
        assert_eq!(rgba_at(&out, 32, 17, 5), [0, 0, 0, 255]);
        assert_eq!(rgba_at(&out, 32, 18, 5), [255, 255, 255, 255]);
        assert_eq!(rgba_at(&out, 32, 9, 5), [255, 255, 255, 255]);
        assert_eq!(rgba_at(&out, 32, 10, 6), [255, 255, 255, 255]);
        assert_eq!(rgba_at(&out, 32, 10, 4), [255, 255, 255, 255]);
    }

    #[test]
    fn test_hidden_cursor_draws_nothing() {
        let Some(ctx) = gpu_or_skip() else { return };
        let target = capture_texture(&ctx, 16, 16, [255, 255, 255, 255]);
        let mut cursor = CursorCompositor::new(ctx.clone(), CAPTURE_FORMAT);

        cursor.state_mut().update_position(0, 0, false);
        cursor.state_mut().set_shape(Some(mono_shape()), (0, 0));
        cursor.draw(&target).unwrap();

        assert!(cursor.has_sprite());
        assert!(read_rgba(&ctx, &target).iter().all(|&b| b == 255));
    }

    #[test]
    fn test_no_sprite_draws_nothing() {
        let Some(ctx) = gpu_or_skip() else { return };
        let target = capture_texture(&ctx, 16, 16, [0, 128, 0, 255]);
        let mut cursor = CursorCompositor::new(ctx.clone(), CAPTURE_FORMAT);

        cursor.state_mut().update_position(4, 4, true);
        cursor.draw(&target).unwrap();

        assert!(!cursor.has_sprite());
        assert_eq!(rgba_at(&read_rgba(&ctx, &target), 16, 4, 4), [0, 128, 0, 255]);
    }

    #[test]
    fn test_sprite_recreated_only_on_size_change() {
        let Some(ctx) = gpu_or_skip() else { return };
        let target = capture_texture(&ctx, 16, 16, [0, 0, 0, 255]);
        let mut cursor = CursorCompositor::new(ctx, CAPTURE_FORMAT);
        cursor.state_mut().update_position(0, 0, true);

        cursor.state_mut().set_shape(Some(mono_shape()), (0, 0));
        cursor.draw(&target).unwrap();
        let first_id = cursor.sprite.as_ref().map(|s| s.texture.id());

        cursor.state_mut().set_shape(Some(mono_shape()), (0, 0));
        cursor.draw(&target).unwrap();
        assert_eq!(cursor.sprite.as_ref().map(|s| s.texture.id()), first_id);

        let bigger = PointerShape::Color(ShapeBuffer {
            width: 4,
            height: 4,
            pitch: 16,
            data: vec![255; 64],
        });
        cursor.state_mut().set_shape(Some(bigger), (0, 0));
        cursor.draw(&target).unwrap();
        assert_ne!(cursor.sprite.as_ref().map(|s| s.texture.id()), first_id);
        assert_eq!(cursor.sprite_size(), Some((4, 4)));
    }

    #[test]
    fn test_clearing_shape_drops_sprite() {
        let Some(ctx) = gpu_or_skip() else { return };
        let target = capture_texture(&ctx, 16, 16, [0, 0, 0, 255]);
        let mut cursor = CursorCompositor::new(ctx, CAPTURE_FORMAT);
        cursor.state_mut().update_position(0, 0, true);
        cursor.state_mut().set_shape(Some(mono_shape()), (0, 0));
        cursor.draw(&target).unwrap();
        assert!(cursor.has_sprite());

        cursor.state_mut().set_shape(None, (0, 0));
        cursor.draw(&target).unwrap();
        assert!(!cursor.has_sprite());
    }

    #[test]
    fn test_partially_offscreen_sprite_is_clipped() {
        let Some(ctx) = gpu_or_skip() else { return };
        let target = capture_texture(&ctx, 16, 16, [255, 255, 255, 255]);
        let mut cursor = CursorCompositor::new(ctx.clone(), CAPTURE_FORMAT);
        cursor.state_mut().update_position(-4, 0, true);
        cursor.state_mut().set_shape(Some(mono_shape()), (0, 0));
        cursor.draw(&target).unwrap();

        let out = read_rgba(&ctx, &target);
        assert_eq!(rgba_at(&out, 16, 0, 0), [0, 0, 0, 255]);
        assert_eq!(rgba_at(&out, 16, 3, 0), [0, 0, 0, 255]);
        assert_eq!(rgba_at(&out, 16, 4, 0), [255, 255, 255, 255]);
    }

    #[test]
    fn test_rejects_wrong_target_format() {
        let Some(ctx) = gpu_or_skip() else { return };
        let target = GpuTexture::new(
            &ctx,
            8,
            8,
            wgpu::TextureFormat::Rgba8Unorm,
            TextureRole::Capture,
            "rgba",
        )
        .unwrap();
        let mut cursor = CursorCompositor::new(ctx, CAPTURE_FORMAT);
        assert!(matches!(
            cursor.draw(&target),
            Err(SnapMarkError::InvalidFrame(_))
        ));
    }
}
