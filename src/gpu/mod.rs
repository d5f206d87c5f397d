//! Device-side plumbing: context creation, cloth buffers, the solver
//! kernels and the renderer.

mod cloth_buffers;
mod renderer;
mod solver;

#[cfg(feature = "egui")]
pub mod egui_integration;

use std::sync::{mpsc, Arc};

use winit::window::Window;

use crate::error::GpuError;

pub use cloth_buffers::{
    BufferOwner, ClothLayouts, DeviceCloth, GridBuffers, SimulationLease, StepUniforms, MAX_PLANES, NO_GRAB,
};
pub use renderer::{
    marker_shader_source, mesh_shader_source, FrameUniforms, MeshDraw, Renderer, CHECKERBOARD_WGSL, MARKER_WGSL, MESH_WGSL,
};
pub use solver::{GpuSolver, CLOTH_KERNELS_WGSL};

pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Limits the cloth kernels need: the topology and simulation groups
/// together bind thirteen storage buffers.
pub fn required_limits() -> wgpu::Limits {
    wgpu::Limits {
        max_storage_buffers_per_shader_stage: 16,
        ..wgpu::Limits::default()
    }
}

async fn request_device(adapter: &wgpu::Adapter) -> Result<(Arc<wgpu::Device>, Arc<wgpu::Queue>), GpuError> {
    let (device, queue) = adapter
        .request_device(
            &wgpu::DeviceDescriptor {
                label: Some("Cloth Device"),
                required_features: wgpu::Features::empty(),
                required_limits: required_limits(),
                memory_hints: Default::default(),
            },
            None,
        )
        .await?;
    device.on_uncaptured_error(Box::new(|e| log::error!("Uncaptured GPU error: {}", e)));
    Ok((Arc::new(device), Arc::new(queue)))
}

/// Window surface, device and depth target.
pub struct GpuContext {
    pub device: Arc<wgpu::Device>,
    pub queue: Arc<wgpu::Queue>,
    pub surface: wgpu::Surface<'static>,
    pub config: wgpu::SurfaceConfiguration,
    pub depth_view: wgpu::TextureView,
}

impl GpuContext {
    pub async fn new(window: Arc<Window>) -> Result<Self, GpuError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let size = window.inner_size();
        let surface = instance.create_surface(window)?;
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or(GpuError::NoAdapter)?;
        log::info!("Using adapter {:?}", adapter.get_info().name);

        let (device, queue) = request_device(&adapter).await?;

        let surface_caps = surface.get_capabilities(&adapter);
        let format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first())
            .copied()
            .ok_or(GpuError::NoAdapter)?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: wgpu::CompositeAlphaMode::Auto,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);
        let depth_view = create_depth_view(&device, config.width, config.height);

        Ok(Self { device, queue, surface, config, depth_view })
    }

    /// Device without a surface, for offscreen solving.
    pub async fn headless() -> Result<(Arc<wgpu::Device>, Arc<wgpu::Queue>), GpuError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions::default())
            .await
            .ok_or(GpuError::NoAdapter)?;
        request_device(&adapter).await
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.config.width = width.max(1);
        self.config.height = height.max(1);
        self.surface.configure(&self.device, &self.config);
        self.depth_view = create_depth_view(&self.device, self.config.width, self.config.height);
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.config.format
    }
}

fn create_depth_view(device: &wgpu::Device, width: u32, height: u32) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Depth Texture"),
        size: wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

/// Run `build` inside a validation error scope and report the first error.
pub(crate) fn capture_validation<T>(
    device: &wgpu::Device,
    label: &str,
    build: impl FnOnce() -> T,
) -> Result<T, GpuError> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = build();
    match pollster::block_on(device.pop_error_scope()) {
        None => Ok(value),
        Some(e) => Err(GpuError::PipelineBuild { label: label.to_string(), message: e.to_string() }),
    }
}

/// Like [`capture_validation`] for buffer uploads and command submission,
/// which can also run out of device memory.
pub(crate) fn capture_device_errors<T>(
    device: &wgpu::Device,
    label: &str,
    work: impl FnOnce() -> T,
) -> Result<T, GpuError> {
    device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = work();
    let validation = pollster::block_on(device.pop_error_scope());
    let out_of_memory = pollster::block_on(device.pop_error_scope());
    match validation.or(out_of_memory) {
        None => Ok(value),
        Some(e) => Err(GpuError::Validation { label: label.to_string(), message: e.to_string() }),
    }
}

/// Wait for a `map_async` callback sent through `rx`.
pub(crate) fn await_buffer_map(
    rx: mpsc::Receiver<Result<(), wgpu::BufferAsyncError>>,
) -> Result<(), GpuError> {
    match rx.recv() {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(GpuError::BufferMapping(e.to_string())),
        Err(_) => Err(GpuError::DeviceLost),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_limits_cover_cloth_bindings() {
        let needed = ClothLayouts::TOPOLOGY_BINDINGS + ClothLayouts::SIMULATION_BINDINGS;
        assert!(required_limits().max_storage_buffers_per_shader_stage >= needed);
    }

    #[test]
    fn test_await_buffer_map_disconnected() {
        let (tx, rx) = mpsc::channel::<Result<(), wgpu::BufferAsyncError>>();
        drop(tx);
        assert!(matches!(await_buffer_map(rx), Err(GpuError::DeviceLost)));
    }

    #[test]
    fn test_await_buffer_map_ok() {
        let (tx, rx) = mpsc::channel();
        tx.send(Ok(())).unwrap();
        assert!(await_buffer_map(rx).is_ok());
    }
}
