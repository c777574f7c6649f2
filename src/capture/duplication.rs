//! DXGI output duplication of the primary output.
//!
//! A dedicated D3D11 device owns the duplication interface and one staging
//! texture sized to the desktop. Each acquired frame is copied to staging,
//! mapped, and uploaded into a wgpu capture texture that the cursor
//! compositor then draws onto.

use std::sync::Arc;

use windows::core::Interface;
use windows::Win32::Graphics::Direct3D::{
    D3D_DRIVER_TYPE_HARDWARE, D3D_FEATURE_LEVEL, D3D_FEATURE_LEVEL_10_0, D3D_FEATURE_LEVEL_11_0,
};
use windows::Win32::Graphics::Direct3D11::{
    D3D11CreateDevice, ID3D11Device, ID3D11DeviceContext, ID3D11Texture2D,
    D3D11_CPU_ACCESS_READ, D3D11_CREATE_DEVICE_BGRA_SUPPORT, D3D11_MAPPED_SUBRESOURCE,
    D3D11_MAP_READ, D3D11_SDK_VERSION, D3D11_TEXTURE2D_DESC, D3D11_USAGE_STAGING,
};
use windows::Win32::Graphics::Dxgi::Common::{DXGI_FORMAT_B8G8R8A8_UNORM, DXGI_SAMPLE_DESC};
use windows::Win32::Graphics::Dxgi::{
    IDXGIDevice, IDXGIOutput1, IDXGIOutputDuplication, IDXGIResource, DXGI_ERROR_ACCESS_LOST,
    DXGI_ERROR_WAIT_TIMEOUT, DXGI_OUTDUPL_DESC, DXGI_OUTDUPL_FRAME_INFO,
    DXGI_OUTDUPL_POINTER_SHAPE_INFO,
};

use super::{
    check_surface_size, pointer_shape_from_report, CaptureOutcome, DesktopSource,
    ACQUIRE_TIMEOUT_MS,
};
use crate::cursor::CursorCompositor;
use crate::error::{SnapMarkError, SnapMarkResult};
use crate::frame::bgra_to_rgba;
use crate::rendering::{GpuContext, GpuTexture, TextureReadback, TextureRole};

/// Format of the capture texture the cursor is drawn onto.
pub const CAPTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Bgra8Unorm;

/// Releases the acquired duplication frame on every exit path.
struct AcquiredFrame(IDXGIOutputDuplication);

impl Drop for AcquiredFrame {
    fn drop(&mut self) {
        if let Err(e) = unsafe { self.0.ReleaseFrame() } {
            log::warn!("ReleaseFrame failed: {}", e);
        }
    }
}

pub struct DesktopDuplication {
    ctx: Arc<GpuContext>,
    // Field order is drop order: duplication objects go before the device.
    duplication: IDXGIOutputDuplication,
    staging: ID3D11Texture2D,
    context: ID3D11DeviceContext,
    _device: ID3D11Device,
    width: u32,
    height: u32,
    capture_texture: Option<GpuTexture>,
    readback: Option<TextureReadback>,
    cursor: CursorCompositor,
    shape_buffer: Vec<u8>,
}

fn create_device() -> SnapMarkResult<(ID3D11Device, ID3D11DeviceContext)> {
    let feature_levels: [D3D_FEATURE_LEVEL; 2] = [D3D_FEATURE_LEVEL_11_0, D3D_FEATURE_LEVEL_10_0];
    let mut device: Option<ID3D11Device> = None;
    let mut context: Option<ID3D11DeviceContext> = None;

    unsafe {
        D3D11CreateDevice(
            None,
            D3D_DRIVER_TYPE_HARDWARE,
            None,
            D3D11_CREATE_DEVICE_BGRA_SUPPORT,
            Some(&feature_levels),
            D3D11_SDK_VERSION,
            Some(&mut device),
            None,
            Some(&mut context),
        )?;
    }

    match (device, context) {
        (Some(device), Some(context)) => Ok((device, context)),
        _ => Err(SnapMarkError::DxgiError(
            "D3D11CreateDevice returned no device".to_string(),
        )),
    }
}

fn create_staging(device: &ID3D11Device, width: u32, height: u32) -> SnapMarkResult<ID3D11Texture2D> {
    let desc = D3D11_TEXTURE2D_DESC {
        Width: width,
        Height: height,
        MipLevels: 1,
        ArraySize: 1,
        Format: DXGI_FORMAT_B8G8R8A8_UNORM,
        SampleDesc: DXGI_SAMPLE_DESC {
            Count: 1,
            Quality: 0,
        },
        Usage: D3D11_USAGE_STAGING,
        BindFlags: Default::default(),
        CPUAccessFlags: D3D11_CPU_ACCESS_READ.0 as u32,
        MiscFlags: Default::default(),
    };

    let mut texture: Option<ID3D11Texture2D> = None;
    unsafe { device.CreateTexture2D(&desc, None, Some(&mut texture))? };
    texture.ok_or_else(|| SnapMarkError::DxgiError("CreateTexture2D returned no texture".to_string()))
}

impl DesktopDuplication {
    /// Start duplicating output 0 of the default adapter.
    pub fn new(ctx: Arc<GpuContext>) -> SnapMarkResult<Self> {
        let (device, context) = create_device()?;

        let (duplication, width, height) = unsafe {
            let dxgi_device: IDXGIDevice = device.cast()?;
            let adapter = dxgi_device.GetAdapter()?;
            let output = adapter.EnumOutputs(0)?;
            let output1: IDXGIOutput1 = output.cast()?;
            let duplication = output1.DuplicateOutput(&device)?;

            let mut desc = DXGI_OUTDUPL_DESC::default();
            duplication.GetDesc(&mut desc);
            (duplication, desc.ModeDesc.Width, desc.ModeDesc.Height)
        };

        if width == 0 || height == 0 {
            return Err(SnapMarkError::DxgiError(format!(
                "duplicated output reports {}x{}",
                width, height
            )));
        }
        let staging = create_staging(&device, width, height)?;
        log::info!("Desktop duplication started: {}x{}", width, height);

        let cursor = CursorCompositor::new(Arc::clone(&ctx), CAPTURE_FORMAT);

        Ok(Self {
            ctx,
            duplication,
            staging,
            context,
            _device: device,
            width,
            height,
            capture_texture: None,
            readback: None,
            cursor,
            shape_buffer: Vec::new(),
        })
    }

    fn update_cursor(&mut self, info: &DXGI_OUTDUPL_FRAME_INFO) {
        let pos = info.PointerPosition;
        self.cursor
            .state_mut()
            .update_position(pos.Position.x, pos.Position.y, pos.Visible.as_bool());

        if info.PointerShapeBufferSize == 0 {
            return;
        }

        self.shape_buffer.resize(info.PointerShapeBufferSize as usize, 0);
        let mut required = 0u32;
        let mut shape_info = DXGI_OUTDUPL_POINTER_SHAPE_INFO::default();
        let fetched = unsafe {
            self.duplication.GetFramePointerShape(
                self.shape_buffer.len() as u32,
                self.shape_buffer.as_mut_ptr() as *mut _,
                &mut required,
                &mut shape_info,
            )
        };
        if let Err(e) = fetched {
            log::warn!("GetFramePointerShape failed, keeping previous cursor: {}", e);
            return;
        }

        let data = self.shape_buffer[..(required as usize).min(self.shape_buffer.len())].to_vec();
        let shape = pointer_shape_from_report(
            shape_info.Type,
            shape_info.Width,
            shape_info.Height,
            shape_info.Pitch,
            data,
        );
        if shape.is_none() {
            log::debug!("Unsupported pointer shape type {}", shape_info.Type);
        }
        self.cursor
            .state_mut()
            .set_shape(shape, (shape_info.HotSpot.x, shape_info.HotSpot.y));
    }

    /// Copy the duplicated surface through staging into the capture texture.
    fn upload_frame(&mut self, resource: IDXGIResource) -> SnapMarkResult<()> {
        let surface: ID3D11Texture2D = resource.cast()?;

        let mut desc = D3D11_TEXTURE2D_DESC::default();
        unsafe { surface.GetDesc(&mut desc) };
        check_surface_size((self.width, self.height), (desc.Width, desc.Height))?;

        if self.capture_texture.is_none() {
            self.capture_texture = Some(GpuTexture::new(
                &self.ctx,
                desc.Width,
                desc.Height,
                CAPTURE_FORMAT,
                TextureRole::Capture,
                "Desktop Capture Texture",
            )?);
        }
        let Some(target) = &self.capture_texture else {
            return Ok(());
        };

        let mut mapped = D3D11_MAPPED_SUBRESOURCE::default();
        unsafe {
            self.context.CopyResource(&self.staging, &surface);
            self.context
                .Map(&self.staging, 0, D3D11_MAP_READ, 0, Some(&mut mapped))?;
        }

        let row_pitch = mapped.RowPitch;
        let written = if mapped.pData.is_null() {
            Err(SnapMarkError::CaptureError("mapped staging texture has no data".to_string()))
        } else {
            let len = row_pitch as usize * self.height as usize;
            let bytes = unsafe { std::slice::from_raw_parts(mapped.pData as *const u8, len) };
            target.write(&self.ctx, bytes, row_pitch)
        };
        unsafe { self.context.Unmap(&self.staging, 0) };
        written
    }
}

impl DesktopSource for DesktopDuplication {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn capture_frame(&mut self) -> SnapMarkResult<CaptureOutcome> {
        let mut info = DXGI_OUTDUPL_FRAME_INFO::default();
        let mut resource: Option<IDXGIResource> = None;

        let acquired =
            unsafe { self.duplication.AcquireNextFrame(ACQUIRE_TIMEOUT_MS, &mut info, &mut resource) };
        if let Err(e) = acquired {
            if e.code() == DXGI_ERROR_WAIT_TIMEOUT {
                log::debug!("No desktop update within {}ms", ACQUIRE_TIMEOUT_MS);
                return Ok(CaptureOutcome::Unchanged);
            }
            if e.code() == DXGI_ERROR_ACCESS_LOST {
                return Err(SnapMarkError::CaptureAccessLost);
            }
            return Err(SnapMarkError::CaptureError(format!("AcquireNextFrame failed: {}", e)));
        }
        let _frame = AcquiredFrame(self.duplication.clone());

        if info.LastMouseUpdateTime > 0 {
            self.update_cursor(&info);
        }

        let Some(resource) = resource else {
            return Err(SnapMarkError::CaptureError(
                "AcquireNextFrame returned no surface".to_string(),
            ));
        };
        self.upload_frame(resource)?;

        if let Some(target) = &self.capture_texture {
            self.cursor.draw(target)?;
        }
        Ok(CaptureOutcome::NewFrame)
    }

    fn read_composited_rgba(&mut self, dst: &mut Vec<u8>) -> SnapMarkResult<()> {
        let Some(texture) = &self.capture_texture else {
            return Err(SnapMarkError::CaptureError("no desktop frame captured yet".to_string()));
        };

        if !self.readback.as_ref().is_some_and(|r| r.matches(texture)) {
            self.readback = Some(TextureReadback::new(
                &self.ctx,
                texture.width(),
                texture.height(),
                texture.bytes_per_pixel(),
            ));
        }
        let Some(readback) = &self.readback else {
            return Ok(());
        };

        let (w, h) = (texture.width(), texture.height());
        readback.read(&self.ctx, texture, |data, stride| bgra_to_rgba(data, w, h, stride, dst))?
    }

    fn gpu_context(&self) -> Option<Arc<GpuContext>> {
        Some(Arc::clone(&self.ctx))
    }
}
