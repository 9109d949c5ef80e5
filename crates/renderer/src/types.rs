use std::path::PathBuf;

use sceneconfig::SceneConfig;

/// Everything the preview window and the headless exporter need to start.
#[derive(Debug, Clone)]
pub struct RendererConfig {
    pub scene: SceneConfig,
    /// Live viewport size in physical pixels.
    pub surface_size: (u32, u32),
    pub export_dir: PathBuf,
    /// Seeds the initial ramp colors and the export randomisation.
    pub seed: u64,
}

impl RendererConfig {
    pub fn new(scene: SceneConfig, surface_size: (u32, u32), export_dir: PathBuf, seed: u64) -> Self {
        Self {
            scene,
            surface_size: (surface_size.0.max(1), surface_size.1.max(1)),
            export_dir,
            seed,
        }
    }
}

/// Summary of the adapter wgpu picked, kept for logging.
#[derive(Debug, Clone)]
pub struct AdapterProfile {
    pub name: String,
    pub backend: wgpu::Backend,
    pub device_type: wgpu::DeviceType,
    pub max_texture_dimension: u32,
}

impl AdapterProfile {
    pub(crate) fn from_wgpu(info: &wgpu::AdapterInfo, limits: &wgpu::Limits) -> Self {
        Self {
            name: info.name.clone(),
            backend: info.backend,
            device_type: info.device_type,
            max_texture_dimension: limits.max_texture_dimension_2d,
        }
    }

    /// llvmpipe and friends report as CPU devices.
    pub fn is_software(&self) -> bool {
        matches!(self.device_type, wgpu::DeviceType::Cpu)
            || self.name.to_ascii_lowercase().contains("llvmpipe")
    }
}
