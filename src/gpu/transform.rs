//! Device-resident particle buffers and the advection compute pass.

use std::sync::Arc;

use glam::Vec4;
use wgpu::util::DeviceExt;

use crate::advect::TransformParams;
use crate::backend::ParticleBackend;
use crate::error::{GpuError, Result};
use crate::field::FieldImage;
use crate::particles::CohortLayout;
use crate::shader::{transform_workgroups, TRANSFORM_SOURCE};

use super::GpuContext;

/// Bytes per record on the device (`vec4<f32>`, w unused).
pub(crate) const RECORD_STRIDE: u64 = std::mem::size_of::<[f32; 4]>() as u64;

/// Destination offset and size, in bytes, of the cohort-shift copy.
/// `None` when there is only one cohort.
pub(crate) fn shift_copy_region(layout: CohortLayout) -> Option<(u64, u64)> {
    let size = layout.shifted_len() as u64 * RECORD_STRIDE;
    if size == 0 {
        return None;
    }
    Some((layout.num_particles as u64 * RECORD_STRIDE, size))
}

/// Check that one record buffer for `layout` fits both the buffer size and
/// the storage binding size of `limits`.
pub(crate) fn check_record_buffer_size(
    layout: CohortLayout,
    limits: &wgpu::Limits,
) -> std::result::Result<(), GpuError> {
    let bytes = layout.len() as u64 * RECORD_STRIDE;
    let limit = limits
        .max_buffer_size
        .min(u64::from(limits.max_storage_buffer_binding_size));
    if bytes > limit {
        return Err(GpuError::BufferTooLarge {
            records: layout.len(),
            bytes,
            limit,
        });
    }
    Ok(())
}

struct RecordBuffers {
    layout: CohortLayout,
    a: wgpu::Buffer,
    b: wgpu::Buffer,
    colors: wgpu::Buffer,
    /// Which buffer is currently the source (false = A, true = B)
    source_is_b: bool,
}

impl RecordBuffers {
    fn new(device: &wgpu::Device, layout: CohortLayout, colors: &[Vec4]) -> Self {
        let size = layout.len() as u64 * RECORD_STRIDE;
        // Freshly created buffers are zeroed, which is the dropped sentinel.
        let records = |label| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size,
                usage: wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::VERTEX
                    | wgpu::BufferUsages::COPY_SRC
                    | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        };

        let colors = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Particle Color Buffer"),
            contents: bytemuck::cast_slice(colors),
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::VERTEX,
        });

        Self {
            layout,
            a: records("Particle Buffer A"),
            b: records("Particle Buffer B"),
            colors,
            source_is_b: false,
        }
    }

    fn source(&self) -> &wgpu::Buffer {
        if self.source_is_b {
            &self.b
        } else {
            &self.a
        }
    }

    fn target(&self) -> &wgpu::Buffer {
        if self.source_is_b {
            &self.a
        } else {
            &self.b
        }
    }
}

struct FieldTextures {
    current: wgpu::TextureView,
    next: wgpu::TextureView,
}

/// [`ParticleBackend`] running the transform as a compute pass.
///
/// `advect` and `shift_cohorts` record into one command encoder which is
/// submitted on `swap`, so the copy always reads the pre-transform source
/// and lands before the next draw.
pub struct GpuBackend {
    ctx: Arc<GpuContext>,
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    params_buffer: wgpu::Buffer,
    records: Option<RecordBuffers>,
    fields: Option<FieldTextures>,
    /// Indexed by `source_is_b`.
    bind_groups: Option<[wgpu::BindGroup; 2]>,
    encoder: Option<wgpu::CommandEncoder>,
    generation: u64,
    mutations: u64,
}

impl GpuBackend {
    pub fn new(ctx: Arc<GpuContext>) -> Self {
        let device = &ctx.device;

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Particle Transform Shader"),
            source: wgpu::ShaderSource::Wgsl(TRANSFORM_SOURCE.into()),
        });

        let storage = |binding, read_only| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };
        let field = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: false },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Particle Transform Bind Group Layout"),
            entries: &[
                // Source records
                storage(0, true),
                // Target records
                storage(1, false),
                // Params
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                field(3),
                field(4),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Particle Transform Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Particle Transform Pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        });

        let params_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Particle Transform Params"),
            size: std::mem::size_of::<TransformParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            ctx,
            pipeline,
            bind_group_layout,
            params_buffer,
            records: None,
            fields: None,
            bind_groups: None,
            encoder: None,
            generation: 0,
            mutations: 0,
        }
    }

    pub fn context(&self) -> &Arc<GpuContext> {
        &self.ctx
    }

    /// Bumped on every allocation; renderers rebuild their bind groups when
    /// it changes.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn layout(&self) -> Option<CohortLayout> {
        self.records.as_ref().map(|r| r.layout)
    }

    /// `(a, b, colors)` in fixed order, for building per-role bind groups.
    pub fn raw_buffers(&self) -> Option<(&wgpu::Buffer, &wgpu::Buffer, &wgpu::Buffer)> {
        self.records.as_ref().map(|r| (&r.a, &r.b, &r.colors))
    }

    /// Whether buffer B is currently the source.
    pub fn source_is_b(&self) -> bool {
        self.records.as_ref().is_some_and(|r| r.source_is_b)
    }

    fn upload_field(&self, image: &FieldImage, label: &str) -> wgpu::Texture {
        self.ctx.device.create_texture_with_data(
            &self.ctx.queue,
            &wgpu::TextureDescriptor {
                label: Some(label),
                size: wgpu::Extent3d {
                    width: image.width(),
                    height: image.height(),
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba32Float,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            image.as_bytes(),
        )
    }

    fn check_size(&self, image: &FieldImage) -> std::result::Result<(), GpuError> {
        let limit = self.ctx.max_texture_dimension();
        if image.width() > limit || image.height() > limit {
            return Err(GpuError::TextureTooLarge {
                width: image.width(),
                height: image.height(),
                limit,
            });
        }
        Ok(())
    }

    fn rebuild_bind_groups(&mut self) {
        let (Some(records), Some(fields)) = (&self.records, &self.fields) else {
            self.bind_groups = None;
            return;
        };

        let make = |source: &wgpu::Buffer, target: &wgpu::Buffer, label| {
            self.ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(label),
                layout: &self.bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: source.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: target.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: self.params_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: wgpu::BindingResource::TextureView(&fields.current),
                    },
                    wgpu::BindGroupEntry {
                        binding: 4,
                        resource: wgpu::BindingResource::TextureView(&fields.next),
                    },
                ],
            })
        };

        self.bind_groups = Some([
            make(&records.a, &records.b, "Particle Transform Bind Group (A -> B)"),
            make(&records.b, &records.a, "Particle Transform Bind Group (B -> A)"),
        ]);
    }

    fn take_encoder(&mut self) -> wgpu::CommandEncoder {
        self.encoder.take().unwrap_or_else(|| {
            self.ctx
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Particle Tick Encoder"),
                })
        })
    }

    fn submit(&mut self) {
        if let Some(encoder) = self.encoder.take() {
            self.ctx.queue.submit(std::iter::once(encoder.finish()));
        }
    }
}

impl ParticleBackend for GpuBackend {
    fn allocate(&mut self, layout: CohortLayout, colors: &[Vec4]) -> Result<()> {
        check_record_buffer_size(layout, &self.ctx.device.limits())?;
        self.encoder = None;
        self.records = Some(RecordBuffers::new(&self.ctx.device, layout, colors));
        self.rebuild_bind_groups();
        self.generation += 1;
        self.mutations += 1;
        Ok(())
    }

    fn set_fields(&mut self, current: &Arc<FieldImage>, next: &Arc<FieldImage>) -> Result<()> {
        self.check_size(current)?;
        self.check_size(next)?;

        let current_texture = self.upload_field(current, "Field Texture (current)");
        let next_texture = if Arc::ptr_eq(current, next) {
            None
        } else {
            Some(self.upload_field(next, "Field Texture (next)"))
        };
        let current_view = current_texture.create_view(&wgpu::TextureViewDescriptor::default());
        let next_view = next_texture
            .as_ref()
            .unwrap_or(&current_texture)
            .create_view(&wgpu::TextureViewDescriptor::default());
        log::debug!(
            "uploaded field textures {}x{} / {}x{}",
            current.width(),
            current.height(),
            next.width(),
            next.height()
        );

        self.fields = Some(FieldTextures {
            current: current_view,
            next: next_view,
        });
        self.rebuild_bind_groups();
        Ok(())
    }

    fn advect(&mut self, params: &TransformParams) {
        let mut encoder = self.take_encoder();
        let (Some(records), Some(bind_groups)) = (&self.records, &self.bind_groups) else {
            self.encoder = Some(encoder);
            return;
        };
        let workgroups = transform_workgroups(params.num_particles.min(records.layout.num_particles));

        self.ctx
            .queue
            .write_buffer(&self.params_buffer, 0, bytemuck::bytes_of(params));
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Particle Transform Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &bind_groups[records.source_is_b as usize], &[]);
            pass.dispatch_workgroups(workgroups, 1, 1);
        }
        self.encoder = Some(encoder);
        self.mutations += 1;
    }

    fn shift_cohorts(&mut self) {
        let mut encoder = self.take_encoder();
        if let Some(records) = &self.records {
            if let Some((offset, size)) = shift_copy_region(records.layout) {
                encoder.copy_buffer_to_buffer(records.source(), 0, records.target(), offset, size);
                self.mutations += 1;
            }
        }
        self.encoder = Some(encoder);
    }

    fn swap(&mut self) {
        self.submit();
        if let Some(records) = &mut self.records {
            records.source_is_b = !records.source_is_b;
        }
    }

    fn clear(&mut self) {
        let mut encoder = self.take_encoder();
        if let Some(records) = &self.records {
            encoder.clear_buffer(&records.a, 0, None);
            encoder.clear_buffer(&records.b, 0, None);
            self.mutations += 1;
        }
        self.encoder = Some(encoder);
        self.submit();
    }

    fn release(&mut self) {
        self.encoder = None;
        self.bind_groups = None;
        self.fields = None;
        if let Some(records) = self.records.take() {
            records.a.destroy();
            records.b.destroy();
            records.colors.destroy();
        }
    }

    fn is_allocated(&self) -> bool {
        self.records.is_some()
    }

    fn mutations(&self) -> u64 {
        self.mutations
    }
}
