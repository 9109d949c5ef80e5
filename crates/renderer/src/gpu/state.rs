use std::collections::HashMap;
use std::sync::mpsc;

use anyhow::Result;
use scene::{
    CaptureError, CaptureLimits, MaterialBinding, MaterialRole, Readback, RenderBackend,
    RenderOwner, RowOrder, SceneBindings, TargetHandle, UniformSet,
};

use super::context::GpuContext;
use super::pipeline::MaterialPipelines;
use super::uniforms::MaterialUniforms;
use crate::types::AdapterProfile;

/// Format of the off-screen capture targets; matches the RGBA8 readback.
pub(crate) const CAPTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

const CLEAR_COLOR: wgpu::Color = wgpu::Color::BLACK;

/// Placement of each material as (x, y, width, height) fractions of the
/// frame, origin top-left. Draw order follows `MaterialRole::ALL`.
pub(crate) fn layout_rect(role: MaterialRole) -> [f32; 4] {
    match role {
        MaterialRole::Background => [0.0, 0.0, 1.0, 1.0],
        MaterialRole::ModelA => [0.08, 0.14, 0.48, 0.72],
        MaterialRole::ModelB => [0.48, 0.22, 0.42, 0.56],
    }
}

fn viewport_in_pixels(role: MaterialRole, width: u32, height: u32) -> [f32; 4] {
    let [x, y, w, h] = layout_rect(role);
    let (width, height) = (width as f32, height as f32);
    [x * width, y * height, (w * width).max(1.0), (h * height).max(1.0)]
}

/// One material's uniform buffer; writes are staged and uploaded on the next draw.
pub(crate) struct GpuMaterial {
    role: MaterialRole,
    uniforms: MaterialUniforms,
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    dirty: bool,
}

impl GpuMaterial {
    fn new(device: &wgpu::Device, layout: &wgpu::BindGroupLayout, role: MaterialRole) -> Self {
        let uniforms = MaterialUniforms::new(role);
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(role.name()),
            size: std::mem::size_of::<MaterialUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(role.name()),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
        });
        Self {
            role,
            uniforms,
            buffer,
            bind_group,
            dirty: true,
        }
    }

    fn upload(&mut self, queue: &wgpu::Queue) {
        if self.dirty {
            queue.write_buffer(&self.buffer, 0, bytemuck::bytes_of(&self.uniforms));
            self.dirty = false;
        }
    }
}

impl MaterialBinding for GpuMaterial {
    fn role(&self) -> MaterialRole {
        self.role
    }

    fn write_uniforms(&mut self, uniforms: &UniformSet) {
        self.uniforms = MaterialUniforms::from_set(uniforms, self.role);
        self.dirty = true;
    }

    fn opacity(&self) -> Option<f32> {
        Some(self.uniforms.opacity())
    }

    fn set_opacity(&mut self, opacity: f32) {
        self.uniforms.set_opacity(opacity);
        self.dirty = true;
    }
}

struct OffscreenTarget {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
}

/// The three-material scene on the GPU.
///
/// Implements the capture collaborator traits: render targets are either the
/// window surface (`active == None`) or one of the off-screen textures created
/// for a capture.
pub(crate) struct GpuScene {
    context: GpuContext,
    pipelines: MaterialPipelines,
    materials: [Option<GpuMaterial>; 3],
    camera_position: [f32; 3],
    viewport: (u32, u32),
    output_size: (u32, u32),
    targets: HashMap<TargetHandle, OffscreenTarget>,
    active: Option<TargetHandle>,
    next_target: u64,
    owner: RenderOwner,
}

impl GpuScene {
    pub fn new(context: GpuContext, viewport: (u32, u32), camera_position: [f32; 3]) -> Result<Self> {
        let mut pipelines = MaterialPipelines::new(&context.device)?;
        pipelines.prepare(&context.device, CAPTURE_FORMAT);
        if let Some(format) = context.surface_format() {
            pipelines.prepare(&context.device, format);
        }
        let viewport = (viewport.0.max(1), viewport.1.max(1));
        Ok(Self {
            context,
            pipelines,
            materials: [None, None, None],
            camera_position,
            viewport,
            output_size: viewport,
            targets: HashMap::new(),
            active: None,
            next_target: 1,
            owner: RenderOwner::Live,
        })
    }

    pub fn adapter(&self) -> &AdapterProfile {
        &self.context.adapter_profile
    }

    pub fn materials_attached(&self) -> bool {
        self.materials.iter().all(Option::is_some)
    }

    /// Creates the material buffers. Until this runs the synchroniser has
    /// nothing to write to and frames render as the clear color.
    pub fn attach_materials(&mut self) {
        let layout = self.pipelines.uniform_layout();
        for role in MaterialRole::ALL {
            let slot = &mut self.materials[role.index()];
            if slot.is_none() {
                *slot = Some(GpuMaterial::new(&self.context.device, layout, role));
                tracing::debug!(%role, "attached material");
            }
        }
    }

    pub fn set_camera_position(&mut self, position: [f32; 3]) {
        self.camera_position = position;
    }

    /// Live viewport change. Callers must not resize while a capture owns the renderer.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.viewport = (width, height);
        if self.active.is_none() {
            self.output_size = (width, height);
            self.context.resize_surface(width, height);
        }
    }

    pub fn reconfigure_surface(&mut self) {
        self.context.reconfigure();
    }

    /// Draws one frame to the window surface and presents it.
    pub fn render_frame(&mut self) -> Result<(), wgpu::SurfaceError> {
        let Some(surface) = self.context.surface.as_ref() else {
            return Ok(());
        };
        let frame = surface.surface.get_current_texture()?;
        let format = surface.config.format;
        let size = (surface.config.width, surface.config.height);
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        self.draw(&view, format, size);
        frame.present();
        Ok(())
    }

    fn draw(&mut self, view: &wgpu::TextureView, format: wgpu::TextureFormat, size: (u32, u32)) {
        for material in self.materials.iter_mut().flatten() {
            material.upload(&self.context.queue);
        }
        self.pipelines.prepare(&self.context.device, format);

        let mut encoder = self
            .context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("material encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("material pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(CLEAR_COLOR),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            if let Some(pipeline) = self.pipelines.get(format) {
                pass.set_pipeline(pipeline);
                for material in self.materials.iter().flatten() {
                    let [x, y, w, h] = viewport_in_pixels(material.role, size.0, size.1);
                    pass.set_viewport(x, y, w, h, 0.0, 1.0);
                    pass.set_bind_group(0, &material.bind_group, &[]);
                    pass.draw(0..3, 0..1);
                }
            }
        }
        self.context.queue.submit(Some(encoder.finish()));
    }
}

impl SceneBindings for GpuScene {
    fn attached(&self, role: MaterialRole) -> bool {
        self.materials[role.index()].is_some()
    }

    fn binding_mut(&mut self, role: MaterialRole) -> Option<&mut dyn MaterialBinding> {
        self.materials[role.index()]
            .as_mut()
            .map(|material| material as &mut dyn MaterialBinding)
    }

    fn viewport_size(&self) -> (u32, u32) {
        self.viewport
    }

    fn camera_position(&self) -> [f32; 3] {
        self.camera_position
    }
}

impl RenderBackend for GpuScene {
    fn output_size(&self) -> (u32, u32) {
        self.output_size
    }

    fn set_output_size(&mut self, width: u32, height: u32) {
        self.output_size = (width, height);
        if self.active.is_none() {
            self.context.resize_surface(width, height);
        }
    }

    fn create_target(&mut self, width: u32, height: u32) -> Result<TargetHandle, CaptureError> {
        let max = self.context.limits.max_texture_dimension_2d;
        if width == 0 || height == 0 || width > max || height > max {
            return Err(CaptureError::TargetAllocation {
                width,
                height,
                reason: format!("outside the device texture limit of {max}"),
            });
        }

        let device = &self.context.device;
        device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("capture target"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: CAPTURE_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let validation = pollster::block_on(device.pop_error_scope());
        let out_of_memory = pollster::block_on(device.pop_error_scope());
        if let Some(err) = validation.or(out_of_memory) {
            texture.destroy();
            return Err(CaptureError::TargetAllocation {
                width,
                height,
                reason: err.to_string(),
            });
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let handle = TargetHandle(self.next_target);
        self.next_target += 1;
        self.targets.insert(
            handle,
            OffscreenTarget {
                texture,
                view,
                width,
                height,
            },
        );
        tracing::debug!(width, height, handle = handle.0, "created capture target");
        Ok(handle)
    }

    fn active_target(&self) -> Option<TargetHandle> {
        self.active
    }

    fn set_render_target(&mut self, target: Option<TargetHandle>) {
        self.active = target;
    }

    fn render_once(&mut self) -> Result<(), CaptureError> {
        let Some(handle) = self.active else {
            if self.context.surface.is_none() {
                return Err(CaptureError::Render("no presentation surface".to_string()));
            }
            return self
                .render_frame()
                .map_err(|err| CaptureError::Render(err.to_string()));
        };
        let target = self
            .targets
            .remove(&handle)
            .ok_or_else(|| CaptureError::Render(format!("unknown render target {}", handle.0)))?;
        let size = (
            self.output_size.0.min(target.width),
            self.output_size.1.min(target.height),
        );
        self.draw(&target.view, CAPTURE_FORMAT, size);
        self.targets.insert(handle, target);
        Ok(())
    }

    fn read_pixels(&mut self, target: TargetHandle) -> Result<Readback, CaptureError> {
        let target = self
            .targets
            .get(&target)
            .ok_or_else(|| CaptureError::Readback(format!("unknown render target {}", target.0)))?;
        read_texture(&self.context.device, &self.context.queue, target)
    }

    fn release_target(&mut self, target: TargetHandle) {
        if let Some(target) = self.targets.remove(&target) {
            target.texture.destroy();
        }
    }

    fn ownership(&self) -> RenderOwner {
        self.owner
    }

    fn set_ownership(&mut self, owner: RenderOwner) {
        self.owner = owner;
    }

    fn limits(&self) -> CaptureLimits {
        self.context.capture_limits()
    }
}

fn read_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    target: &OffscreenTarget,
) -> Result<Readback, CaptureError> {
    let (width, height) = (target.width, target.height);
    let unpadded_bytes_per_row = width * 4;
    let padded_bytes_per_row = unpadded_bytes_per_row.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
        * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("capture readback"),
        size: u64::from(padded_bytes_per_row) * u64::from(height),
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("capture readback encoder"),
    });
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture: &target.texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &buffer,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded_bytes_per_row),
                rows_per_image: Some(height),
            },
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
    queue.submit(Some(encoder.finish()));

    let slice = buffer.slice(..);
    let (sender, receiver) = mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });
    device
        .poll(wgpu::PollType::Wait)
        .map_err(|err| CaptureError::Readback(err.to_string()))?;
    receiver
        .recv()
        .map_err(|err| CaptureError::Readback(err.to_string()))?
        .map_err(|err| CaptureError::Readback(err.to_string()))?;

    let bytes = {
        let mapped = slice.get_mapped_range();
        copy_tight_rows(&mapped, unpadded_bytes_per_row, padded_bytes_per_row, height)
    };
    buffer.unmap();

    Ok(Readback {
        width,
        height,
        rows: RowOrder::TopDown,
        bytes,
    })
}

/// Strips the per-row padding the copy alignment forces on the buffer.
fn copy_tight_rows(mapped: &[u8], unpadded: u32, padded: u32, rows: u32) -> Vec<u8> {
    let (unpadded, padded) = (unpadded as usize, padded as usize);
    let mut tight = Vec::with_capacity(unpadded * rows as usize);
    for row in mapped.chunks(padded).take(rows as usize) {
        tight.extend_from_slice(&row[..unpadded.min(row.len())]);
    }
    tight
}
