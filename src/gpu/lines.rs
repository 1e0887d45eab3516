//! Instanced line drawing for particle trails.
//!
//! Every record is one instance: a screen-space quad from `source[i]` to
//! `target[i]`. The host supplies the projection from `(lng, lat)` to clip
//! space.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2};

use crate::palette::{ColorScheme, MAX_GPU_STOPS};
use crate::shader::LINE_SOURCE;

use super::GpuBackend;

/// Host-provided per-frame values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameUniforms {
    /// Maps `(lng, lat, 0, 1)` to clip space.
    pub view_proj: Mat4,
    /// Render target size in pixels.
    pub viewport_size: Vec2,
}

/// Uniform block of `lines.wgsl`.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct LineUniforms {
    pub view_proj: [[f32; 4]; 4],
    pub viewport_size: [f32; 2],
    pub width: f32,
    /// Zero keeps the per-record RGB.
    pub palette_len: u32,
    pub palette: [[f32; 4]; MAX_GPU_STOPS],
}

impl LineUniforms {
    pub fn new(frame: &FrameUniforms, width: f32, palette: Option<&ColorScheme>) -> Self {
        let (palette, palette_len) = palette
            .map(ColorScheme::gpu_stops)
            .unwrap_or(([[0.0; 4]; MAX_GPU_STOPS], 0));
        Self {
            view_proj: frame.view_proj.to_cols_array_2d(),
            viewport_size: frame.viewport_size.to_array(),
            width,
            palette_len,
            palette,
        }
    }
}

/// Pipeline and uniforms for drawing trails.
pub struct LineRenderer {
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    uniform_buffer: wgpu::Buffer,
    /// Indexed by `source_is_b`.
    bind_groups: Option<[wgpu::BindGroup; 2]>,
    generation: u64,
}

impl LineRenderer {
    /// Build the pipeline for a color target, optionally depth-tested
    /// against an existing depth buffer without writing to it.
    pub fn new(
        device: &wgpu::Device,
        format: wgpu::TextureFormat,
        depth_format: Option<wgpu::TextureFormat>,
    ) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Particle Line Shader"),
            source: wgpu::ShaderSource::Wgsl(LINE_SOURCE.into()),
        });

        let records = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::VERTEX,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only: true },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Particle Line Bind Group Layout"),
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
                // Line starts, ends, colors
                records(1),
                records(2),
                records(3),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Particle Line Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Particle Line Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: depth_format.map(|format| wgpu::DepthStencilState {
                format,
                depth_write_enabled: false,
                depth_compare: wgpu::CompareFunction::Always,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Particle Line Uniforms"),
            size: std::mem::size_of::<LineUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            pipeline,
            bind_group_layout,
            uniform_buffer,
            bind_groups: None,
            generation: 0,
        }
    }

    /// Rebuild per-role bind groups if the backend reallocated.
    pub fn sync(&mut self, backend: &GpuBackend) {
        if self.bind_groups.is_some() && self.generation == backend.generation() {
            return;
        }
        let Some((a, b, colors)) = backend.raw_buffers() else {
            self.bind_groups = None;
            return;
        };

        let device = &backend.context().device;
        let make = |starts: &wgpu::Buffer, ends: &wgpu::Buffer, label| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(label),
                layout: &self.bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: self.uniform_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: starts.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: ends.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: colors.as_entire_binding(),
                    },
                ],
            })
        };

        // Lines run from the source to the target of the current role.
        self.bind_groups = Some([
            make(a, b, "Particle Line Bind Group (A -> B)"),
            make(b, a, "Particle Line Bind Group (B -> A)"),
        ]);
        self.generation = backend.generation();
    }

    /// Drop bind groups that reference released buffers.
    pub fn reset(&mut self) {
        self.bind_groups = None;
    }

    pub fn write_uniforms(&self, queue: &wgpu::Queue, uniforms: &LineUniforms) {
        queue.write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(uniforms));
    }

    /// Bind the buffer set for the backend's current role and draw one quad
    /// per record.
    pub fn draw(&self, pass: &mut wgpu::RenderPass<'_>, backend: &GpuBackend) {
        let (Some(bind_groups), Some(layout)) = (&self.bind_groups, backend.layout()) else {
            return;
        };
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &bind_groups[backend.source_is_b() as usize], &[]);
        pass.draw(0..6, 0..layout.len() as u32);
    }
}
