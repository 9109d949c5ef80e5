use std::sync::Arc;

use anyhow::{Context as AnyhowContext, Result};
use scene::CaptureLimits;
use winit::dpi::PhysicalSize;
use winit::window::Window;

use crate::types::AdapterProfile;

pub(crate) struct SurfaceState {
    pub surface: wgpu::Surface<'static>,
    pub config: wgpu::SurfaceConfiguration,
}

/// Device, queue and (for the preview) the window surface.
pub(crate) struct GpuContext {
    pub _instance: wgpu::Instance,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub adapter_profile: AdapterProfile,
    pub limits: wgpu::Limits,
    pub surface: Option<SurfaceState>,
}

impl GpuContext {
    pub(crate) fn windowed(window: Arc<Window>, initial_size: PhysicalSize<u32>) -> Result<Self> {
        let instance = new_instance();
        let surface = instance
            .create_surface(window)
            .context("failed to create rendering surface")?;
        let (adapter, device, queue, limits) = open_device(&instance, Some(&surface))?;

        let width = initial_size.width.max(1);
        let height = initial_size.height.max(1);
        let max_dimension = limits.max_texture_dimension_2d;
        if width > max_dimension || height > max_dimension {
            anyhow::bail!(
                "GPU max texture dimension is {max_dimension}, requested surface is {width}x{height}"
            );
        }

        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|format| !format.is_srgb())
            .or_else(|| caps.formats.first().copied())
            .context("surface reports no supported formats")?;
        let present_mode = caps
            .present_modes
            .iter()
            .copied()
            .find(|mode| *mode == wgpu::PresentMode::Fifo)
            .or_else(|| caps.present_modes.first().copied())
            .unwrap_or(wgpu::PresentMode::Fifo);
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);
        tracing::debug!(?format, ?present_mode, "configuring preview surface");

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width,
            height,
            present_mode,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        Ok(Self {
            adapter_profile: AdapterProfile::from_wgpu(&adapter.get_info(), &limits),
            _instance: instance,
            device,
            queue,
            limits,
            surface: Some(SurfaceState { surface, config }),
        })
    }

    /// A device without any presentation surface, for unattended exports.
    pub(crate) fn headless() -> Result<Self> {
        let instance = new_instance();
        let (adapter, device, queue, limits) = open_device(&instance, None)?;
        Ok(Self {
            adapter_profile: AdapterProfile::from_wgpu(&adapter.get_info(), &limits),
            _instance: instance,
            device,
            queue,
            limits,
            surface: None,
        })
    }

    pub(crate) fn surface_format(&self) -> Option<wgpu::TextureFormat> {
        self.surface.as_ref().map(|state| state.config.format)
    }

    /// Reconfigures the surface; zero-sized requests (minimised windows) are ignored.
    pub(crate) fn resize_surface(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        if let Some(state) = self.surface.as_mut() {
            if state.config.width == width && state.config.height == height {
                return;
            }
            state.config.width = width;
            state.config.height = height;
            state.surface.configure(&self.device, &state.config);
        }
    }

    /// Re-applies the current configuration after the surface was lost.
    pub(crate) fn reconfigure(&mut self) {
        if let Some(state) = self.surface.as_ref() {
            state.surface.configure(&self.device, &state.config);
        }
    }

    pub(crate) fn capture_limits(&self) -> CaptureLimits {
        CaptureLimits {
            max_dimension: self.limits.max_texture_dimension_2d,
            max_buffer_bytes: self.limits.max_buffer_size,
        }
    }
}

fn new_instance() -> wgpu::Instance {
    wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        flags: wgpu::InstanceFlags::default(),
        memory_budget_thresholds: wgpu::MemoryBudgetThresholds::default(),
        backend_options: wgpu::BackendOptions::default(),
    })
}

fn open_device(
    instance: &wgpu::Instance,
    surface: Option<&wgpu::Surface<'static>>,
) -> Result<(wgpu::Adapter, wgpu::Device, wgpu::Queue, wgpu::Limits)> {
    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::HighPerformance,
        compatible_surface: surface,
        force_fallback_adapter: false,
    }))
    .context("failed to find a suitable GPU adapter")?;

    let limits = adapter.limits();
    let profile = AdapterProfile::from_wgpu(&adapter.get_info(), &limits);
    tracing::debug!(
        name = %profile.name,
        backend = ?profile.backend,
        device_type = ?profile.device_type,
        is_software = profile.is_software(),
        max_texture_dimension = limits.max_texture_dimension_2d,
        "selected GPU adapter"
    );
    if profile.is_software() {
        tracing::warn!("software rasterizer detected; high-resolution exports will be slow");
    }

    let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
        label: Some("warpshade device"),
        required_features: wgpu::Features::empty(),
        required_limits: limits.clone(),
        memory_hints: wgpu::MemoryHints::MemoryUsage,
        trace: wgpu::Trace::default(),
    }))
    .context("failed to create GPU device")?;

    Ok((adapter, device, queue, limits))
}
