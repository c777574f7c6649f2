//! wgpu device setup and management.
//!
//! One `GpuContext` per pipeline instance. The compositor, the cursor
//! compositor and the capture engine share it through `Arc`; every texture
//! and pipeline they create is only valid while it lives.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use wgpu::{AdapterInfo, Device, Queue};

use crate::error::{SnapMarkError, SnapMarkResult};

/// GPU device context: adapter info, device and submission queue.
pub struct GpuContext {
    device: Device,
    queue: Queue,
    adapter_info: AdapterInfo,
    lost: Arc<AtomicBool>,
}

impl GpuContext {
    /// Create a context, blocking until the adapter and device are ready.
    pub fn new() -> SnapMarkResult<Arc<Self>> {
        pollster::block_on(Self::new_async()).map(Arc::new)
    }

    /// Create a context on a high-performance adapter.
    pub async fn new_async() -> SnapMarkResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| SnapMarkError::GpuError(format!("Failed to find GPU adapter: {}", e)))?;

        let adapter_info = adapter.get_info();
        log::info!(
            "Using GPU adapter: {} ({:?})",
            adapter_info.name,
            adapter_info.backend
        );

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("SnapMark Compositor"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::downlevel_defaults()
                    .using_resolution(adapter.limits()),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .map_err(|e| SnapMarkError::GpuError(format!("Failed to create GPU device: {}", e)))?;

        let lost = Arc::new(AtomicBool::new(false));
        let lost_flag = Arc::clone(&lost);
        device.set_device_lost_callback(move |reason, message| {
            log::error!("GPU device lost ({:?}): {}", reason, message);
            lost_flag.store(true, Ordering::SeqCst);
        });

        Ok(Self {
            device,
            queue,
            adapter_info,
            lost,
        })
    }

    /// Get the wgpu device.
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Get the wgpu queue.
    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    pub fn adapter_info(&self) -> &AdapterInfo {
        &self.adapter_info
    }

    /// Largest texture edge the device accepts.
    pub fn max_texture_dimension(&self) -> u32 {
        self.device.limits().max_texture_dimension_2d
    }

    /// Fails once the device-lost callback has fired.
    pub fn ensure_alive(&self) -> SnapMarkResult<()> {
        if self.lost.load(Ordering::SeqCst) {
            return Err(SnapMarkError::GpuDeviceLost(self.adapter_info.name.clone()));
        }
        Ok(())
    }

    /// Block until every submitted command buffer has finished executing.
    pub fn wait_idle(&self) -> SnapMarkResult<()> {
        self.device
            .poll(wgpu::PollType::Wait)
            .map(|_| ())
            .map_err(|e| SnapMarkError::GpuError(format!("GPU wait failed: {}", e)))
    }

    /// Compile a WGSL shader module.
    pub fn create_shader(&self, source: &str, label: &str) -> wgpu::ShaderModule {
        self.device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            })
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Shared context for GPU tests, or None on machines without an adapter.
    pub fn gpu_or_skip() -> Option<Arc<GpuContext>> {
        match GpuContext::new() {
            Ok(ctx) => Some(ctx),
            Err(e) => {
                eprintln!("skipping GPU test: {}", e);
                None
            }
        }
    }
}
