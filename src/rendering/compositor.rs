//! Watermark compositor using wgpu shaders.
//!
//! Blends a watermark over a video frame with a global opacity:
//! `out.rgb = video.rgb * (1 - a) + watermark.rgb * a` where
//! `a = watermark.a * opacity`. The render target and its staging mirror are
//! allocated once at the session's output size and reused every frame.

use std::sync::Arc;

use wgpu::util::DeviceExt;

use super::context::GpuContext;
use super::readback::TextureReadback;
use super::texture::{GpuTexture, TextureRole};
use crate::error::{SnapMarkError, SnapMarkResult};
use crate::frame::{expand_to_rgba, rgba_to_rgb};

/// Format of the render target and every shader input.
pub const COMPOSITE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// WGSL shader for the two-texture watermark blend.
const BLEND_SHADER: &str = r#"
struct BlendParams {
    opacity: f32,
    _pad0: f32,
    _pad1: f32,
    _pad2: f32,
}

@group(0) @binding(0) var<uniform> params: BlendParams;
@group(0) @binding(1) var video_texture: texture_2d<f32>;
@group(0) @binding(2) var watermark_texture: texture_2d<f32>;
@group(0) @binding(3) var frame_sampler: sampler;

struct VertexInput {
    @location(0) position: vec2<f32>,
    @location(1) uv: vec2<f32>,
}

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@vertex
fn vs_main(input: VertexInput) -> VertexOutput {
    var output: VertexOutput;
    output.position = vec4<f32>(input.position, 0.0, 1.0);
    output.uv = input.uv;
    return output;
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let video = textureSample(video_texture, frame_sampler, input.uv);
    let mark = textureSample(watermark_texture, frame_sampler, input.uv);
    let a = mark.a * params.opacity;
    return vec4<f32>(video.rgb * (1.0 - a) + mark.rgb * a, 1.0);
}
"#;

/// Per-draw constant block. 16 bytes to satisfy uniform alignment.
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct BlendUniforms {
    opacity: f32,
    _pad: [f32; 3],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct QuadVertex {
    position: [f32; 2],
    uv: [f32; 2],
}

/// Full-screen quad, top-left texel at uv (0, 0).
const QUAD_VERTICES: [QuadVertex; 4] = [
    QuadVertex {
        position: [-1.0, 1.0],
        uv: [0.0, 0.0],
    },
    QuadVertex {
        position: [1.0, 1.0],
        uv: [1.0, 0.0],
    },
    QuadVertex {
        position: [1.0, -1.0],
        uv: [1.0, 1.0],
    },
    QuadVertex {
        position: [-1.0, -1.0],
        uv: [0.0, 1.0],
    },
];

const QUAD_INDICES: [u16; 6] = [0, 1, 2, 0, 2, 3];

/// Blend pipeline plus the persistent output resources of one session.
pub struct GpuCompositor {
    ctx: Arc<GpuContext>,
    width: u32,
    height: u32,
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    uniform_buffer: wgpu::Buffer,
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    render_target: GpuTexture,
    readback: TextureReadback,
    /// Bind group for the last (video, watermark) pair.
    cached_bind_group: Option<((u64, u64), wgpu::BindGroup)>,
    /// Reused RGBA expansion buffer for uploads.
    upload_scratch: Vec<u8>,
}

impl GpuCompositor {
    /// Build the pipeline and allocate the `width`x`height` render target and
    /// staging mirror.
    pub fn new(ctx: Arc<GpuContext>, width: u32, height: u32) -> SnapMarkResult<Self> {
        let device = ctx.device();

        let render_target = GpuTexture::new(
            &ctx,
            width,
            height,
            COMPOSITE_FORMAT,
            TextureRole::RenderTarget,
            "Blend Render Target",
        )?;
        let readback = TextureReadback::new(&ctx, width, height, render_target.bytes_per_pixel());

        let shader = ctx.create_shader(BLEND_SHADER, "Watermark Blend Shader");

        let texture_entry = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Blend Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                texture_entry(1),
                texture_entry(2),
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Blend Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Blend Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<QuadVertex>() as wgpu::BufferAddress,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2],
                }],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: COMPOSITE_FORMAT,
                    blend: None,
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

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Blend Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Blend Uniform Buffer"),
            size: std::mem::size_of::<BlendUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Blend Quad Vertices"),
            contents: bytemuck::cast_slice(&QUAD_VERTICES),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Blend Quad Indices"),
            contents: bytemuck::cast_slice(&QUAD_INDICES),
            usage: wgpu::BufferUsages::INDEX,
        });

        log::info!("GPU compositor ready at {}x{}", width, height);

        Ok(Self {
            ctx,
            width,
            height,
            pipeline,
            bind_group_layout,
            sampler,
            uniform_buffer,
            vertex_buffer,
            index_buffer,
            render_target,
            readback,
            cached_bind_group: None,
            upload_scratch: Vec::new(),
        })
    }

    pub fn context(&self) -> &Arc<GpuContext> {
        &self.ctx
    }

    /// Output (render target) dimensions.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Upload a packed 3- or 4-channel host image as a new shader input.
    pub fn create_texture_from_packed(
        &mut self,
        bytes: &[u8],
        width: u32,
        height: u32,
        channels: usize,
    ) -> SnapMarkResult<GpuTexture> {
        let texture = GpuTexture::new(
            &self.ctx,
            width,
            height,
            COMPOSITE_FORMAT,
            TextureRole::ShaderInput,
            "Blend Input Texture",
        )?;
        self.upload(&texture, bytes, channels)?;
        Ok(texture)
    }

    /// Rewrite an existing input texture in place.
    pub fn update_texture(
        &mut self,
        texture: &GpuTexture,
        bytes: &[u8],
        width: u32,
        height: u32,
        channels: usize,
    ) -> SnapMarkResult<()> {
        if texture.width() != width || texture.height() != height {
            return Err(SnapMarkError::InvalidFrame(format!(
                "cannot update a {}x{} texture with a {}x{} image",
                texture.width(),
                texture.height(),
                width,
                height
            )));
        }
        self.upload(texture, bytes, channels)
    }

    fn upload(&mut self, texture: &GpuTexture, bytes: &[u8], channels: usize) -> SnapMarkResult<()> {
        let (w, h) = (texture.width(), texture.height());
        expand_to_rgba(bytes, w, h, w as usize * channels, channels, &mut self.upload_scratch)?;
        texture.write(&self.ctx, &self.upload_scratch, w * 4)
    }

    /// Blend and return the result as tight RGB.
    pub fn blend(
        &mut self,
        video: &GpuTexture,
        watermark: &GpuTexture,
        opacity: f32,
    ) -> SnapMarkResult<Vec<u8>> {
        let mut out = Vec::with_capacity(self.width as usize * self.height as usize * 3);
        self.blend_into(video, watermark, opacity, &mut out)?;
        Ok(out)
    }

    /// Blend into a reused tight RGB buffer.
    pub fn blend_into(
        &mut self,
        video: &GpuTexture,
        watermark: &GpuTexture,
        opacity: f32,
        out: &mut Vec<u8>,
    ) -> SnapMarkResult<()> {
        self.ctx.ensure_alive()?;

        let uniforms = BlendUniforms {
            opacity: opacity.clamp(0.0, 1.0),
            _pad: [0.0; 3],
        };
        self.ctx
            .queue()
            .write_buffer(&self.uniform_buffer, 0, bytemuck::cast_slice(&[uniforms]));

        let key = (video.id(), watermark.id());
        if self.cached_bind_group.as_ref().map(|(k, _)| *k) != Some(key) {
            let bind_group = self.ctx.device().create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Blend Bind Group"),
                layout: &self.bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: self.uniform_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(video.view()),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::TextureView(watermark.view()),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: wgpu::BindingResource::Sampler(&self.sampler),
                    },
                ],
            });
            self.cached_bind_group = Some((key, bind_group));
        }
        let Some((_, bind_group)) = self.cached_bind_group.as_ref() else {
            return Err(SnapMarkError::GpuError("blend bind group missing".to_string()));
        };

        let mut encoder = self
            .ctx
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Blend Encoder"),
            });

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Blend Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: self.render_target.view(),
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, bind_group, &[]);
            pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
            pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint16);
            pass.draw_indexed(0..QUAD_INDICES.len() as u32, 0, 0..1);
        }

        let (width, height) = (self.width, self.height);
        self.readback
            .read_with(&self.ctx, encoder, &self.render_target, |data, stride| {
                rgba_to_rgb(data, width, height, stride, out)
            })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::cpu_blend;
    use crate::rendering::context::test_support::gpu_or_skip;

    fn solid_rgb(w: u32, h: u32, px: [u8; 3]) -> Vec<u8> {
        px.repeat((w * h) as usize)
    }

    fn solid_rgba(w: u32, h: u32, px: [u8; 4]) -> Vec<u8> {
        px.repeat((w * h) as usize)
    }

    fn assert_close(actual: &[u8], expected: &[u8], tolerance: u8) {
        assert_eq!(actual.len(), expected.len());
        for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
            assert!(
                a.abs_diff(*e) <= tolerance,
                "byte {} differs: got {}, expected {}",
                i,
                a,
                e
            );
        }
    }

    #[test]
    fn test_uniform_layout() {
        assert_eq!(std::mem::size_of::<BlendUniforms>(), 16);
        assert_eq!(std::mem::size_of::<QuadVertex>(), 16);
    }

    #[test]
    fn test_red_blue_half_opacity() {
        let Some(ctx) = gpu_or_skip() else { return };
        let mut compositor = GpuCompositor::new(ctx, 64, 64).unwrap();
        let video = compositor
            .create_texture_from_packed(&solid_rgb(64, 64, [255, 0, 0]), 64, 64, 3)
            .unwrap();
        let mark = compositor
            .create_texture_from_packed(&solid_rgba(64, 64, [0, 0, 255, 255]), 64, 64, 4)
            .unwrap();

        let out = compositor.blend(&video, &mark, 0.5).unwrap();
        assert_eq!(out.len(), 64 * 64 * 3);
        for px in out.chunks_exact(3) {
            assert!((126..=129).contains(&px[0]), "red {}", px[0]);
            assert_eq!(px[1], 0);
            assert!((126..=129).contains(&px[2]), "blue {}", px[2]);
        }
    }

    #[test]
    fn test_zero_opacity_returns_video() {
        let Some(ctx) = gpu_or_skip() else { return };
        // 70 px wide so render target rows are padded in staging
        let (w, h) = (70, 9);
        let mut compositor = GpuCompositor::new(ctx, w, h).unwrap();
        let video_px: Vec<u8> = (0..w * h * 3).map(|i| (i % 251) as u8).collect();
        let video = compositor.create_texture_from_packed(&video_px, w, h, 3).unwrap();
        let mark = compositor
            .create_texture_from_packed(&solid_rgba(w, h, [9, 200, 40, 255]), w, h, 4)
            .unwrap();

        let out = compositor.blend(&video, &mark, 0.0).unwrap();
        assert_close(&out, &video_px, 1);
    }

    #[test]
    fn test_full_opacity_opaque_returns_watermark() {
        let Some(ctx) = gpu_or_skip() else { return };
        let mut compositor = GpuCompositor::new(ctx, 16, 16).unwrap();
        let video = compositor
            .create_texture_from_packed(&solid_rgb(16, 16, [10, 20, 30]), 16, 16, 3)
            .unwrap();
        let mark = compositor
            .create_texture_from_packed(&solid_rgba(16, 16, [200, 150, 100, 255]), 16, 16, 4)
            .unwrap();

        let out = compositor.blend(&video, &mark, 1.0).unwrap();
        assert_close(&out, &solid_rgb(16, 16, [200, 150, 100]), 1);
    }

    #[test]
    fn test_matches_cpu_reference() {
        let Some(ctx) = gpu_or_skip() else { return };
        let (w, h) = (32, 8);
        let mut compositor = GpuCompositor::new(ctx, w, h).unwrap();
        let video_px: Vec<u8> = (0..w * h * 3).map(|i| (i * 7 % 256) as u8).collect();
        let mark_px: Vec<u8> = (0..w * h * 4).map(|i| (i * 13 % 256) as u8).collect();
        let video = compositor.create_texture_from_packed(&video_px, w, h, 3).unwrap();
        let mark = compositor.create_texture_from_packed(&mark_px, w, h, 4).unwrap();

        let out = compositor.blend(&video, &mark, 0.3).unwrap();
        let mut expected = Vec::new();
        cpu_blend(&video_px, &mark_px, 0.3, &mut expected).unwrap();
        assert_close(&out, &expected, 1);
    }

    #[test]
    fn test_repeated_update_is_idempotent() {
        let Some(ctx) = gpu_or_skip() else { return };
        let mut compositor = GpuCompositor::new(ctx, 24, 24).unwrap();
        let frame = solid_rgb(24, 24, [90, 60, 30]);
        let video = compositor.create_texture_from_packed(&frame, 24, 24, 3).unwrap();
        let mark = compositor
            .create_texture_from_packed(&solid_rgba(24, 24, [255, 255, 255, 128]), 24, 24, 4)
            .unwrap();

        let first = compositor.blend(&video, &mark, 0.4).unwrap();
        let mut out = Vec::new();
        for _ in 0..5 {
            compositor.update_texture(&video, &frame, 24, 24, 3).unwrap();
            compositor.blend_into(&video, &mark, 0.4, &mut out).unwrap();
            assert_eq!(out, first);
        }
    }

    #[test]
    fn test_clear_does_not_leak_previous_frame() {
        let Some(ctx) = gpu_or_skip() else { return };
        let mut compositor = GpuCompositor::new(ctx, 8, 8).unwrap();
        let white = compositor
            .create_texture_from_packed(&solid_rgb(8, 8, [255, 255, 255]), 8, 8, 3)
            .unwrap();
        let black = compositor
            .create_texture_from_packed(&solid_rgb(8, 8, [0, 0, 0]), 8, 8, 3)
            .unwrap();
        let clear_mark = compositor
            .create_texture_from_packed(&solid_rgba(8, 8, [0, 0, 0, 0]), 8, 8, 4)
            .unwrap();

        compositor.blend(&white, &clear_mark, 1.0).unwrap();
        let out = compositor.blend(&black, &clear_mark, 1.0).unwrap();
        assert!(out.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_update_rejects_size_change() {
        let Some(ctx) = gpu_or_skip() else { return };
        let mut compositor = GpuCompositor::new(ctx, 8, 8).unwrap();
        let video = compositor
            .create_texture_from_packed(&solid_rgb(8, 8, [1, 2, 3]), 8, 8, 3)
            .unwrap();
        let result = compositor.update_texture(&video, &solid_rgb(4, 4, [0, 0, 0]), 4, 4, 3);
        assert!(matches!(result, Err(SnapMarkError::InvalidFrame(_))));
    }
}
