//! GPU resources.
//!
//! - [`GpuContext`]: device and queue shared by everything below
//! - [`GpuBackend`]: device-resident particle buffers and the compute transform
//! - [`LineRenderer`]: instanced trail segments drawn from those buffers

mod lines;
mod transform;

pub use lines::{FrameUniforms, LineRenderer, LineUniforms};
pub use transform::GpuBackend;

use crate::error::GpuError;

/// Device and queue, shared via `Arc` by the backend and the renderer.
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl GpuContext {
    /// Pick an adapter (compatible with `surface` if given) and open a device.
    pub async fn request(
        instance: &wgpu::Instance,
        surface: Option<&wgpu::Surface<'_>>,
    ) -> Result<(Self, wgpu::Adapter), GpuError> {
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: surface,
                force_fallback_adapter: false,
            })
            .await?;

        let info = adapter.get_info();
        log::info!("using adapter '{}' ({:?})", info.name, info.backend);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Driftlines Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: Default::default(),
                trace: Default::default(),
                experimental_features: Default::default(),
            })
            .await?;

        Ok((Self { device, queue }, adapter))
    }

    /// Open a device with no presentation surface.
    pub async fn headless() -> Result<Self, GpuError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });
        let (ctx, _) = Self::request(&instance, None).await?;
        Ok(ctx)
    }

    /// Largest width or height a field raster may have.
    pub fn max_texture_dimension(&self) -> u32 {
        self.device.limits().max_texture_dimension_2d
    }
}
