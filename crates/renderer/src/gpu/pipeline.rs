use std::collections::HashMap;

use anyhow::{Context, Result};

use crate::compile::{compile_material_shader, compile_vertex_shader};

/// Shared shader modules plus one render pipeline per output format.
///
/// The live surface and the capture targets usually differ in format
/// (BGRA vs RGBA), so pipelines are built lazily the first time a format is
/// drawn to.
pub(crate) struct MaterialPipelines {
    uniform_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    vertex_module: wgpu::ShaderModule,
    fragment_module: wgpu::ShaderModule,
    by_format: HashMap<wgpu::TextureFormat, wgpu::RenderPipeline>,
}

impl MaterialPipelines {
    pub fn new(device: &wgpu::Device) -> Result<Self> {
        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("material uniform layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("material pipeline layout"),
            bind_group_layouts: &[&uniform_layout],
            push_constant_ranges: &[],
        });

        let vertex_module = compile_vertex_shader(device)?;
        let fragment_module =
            compile_material_shader(device).context("failed to build material shader")?;

        Ok(Self {
            uniform_layout,
            pipeline_layout,
            vertex_module,
            fragment_module,
            by_format: HashMap::new(),
        })
    }

    pub fn uniform_layout(&self) -> &wgpu::BindGroupLayout {
        &self.uniform_layout
    }

    /// Builds the pipeline for `format` if it does not exist yet.
    pub fn prepare(&mut self, device: &wgpu::Device, format: wgpu::TextureFormat) {
        let Self {
            pipeline_layout,
            vertex_module,
            fragment_module,
            by_format,
            ..
        } = self;
        by_format.entry(format).or_insert_with(|| {
            tracing::debug!(?format, "building material pipeline");
            build_pipeline(device, pipeline_layout, vertex_module, fragment_module, format)
        });
    }

    pub fn get(&self, format: wgpu::TextureFormat) -> Option<&wgpu::RenderPipeline> {
        self.by_format.get(&format)
    }
}

fn build_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    vertex_module: &wgpu::ShaderModule,
    fragment_module: &wgpu::ShaderModule,
    format: wgpu::TextureFormat,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("material pipeline"),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: vertex_module,
            entry_point: Some("main"),
            buffers: &[],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState {
            count: 1,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        fragment: Some(wgpu::FragmentState {
            module: fragment_module,
            entry_point: Some("main"),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        multiview: None,
        cache: None,
    })
}
