//! Progressive render pipeline: per-frame kernel dispatch, running-average
//! accumulation into the converged image, and presentation.
//!
//! The frame sequence is upload -> dispatch -> accumulate -> present inside a
//! single command submission; the accumulation counter only advances after
//! the submission, so a failed frame leaves it untouched.

use wgpu::include_wgsl;
use wgpu::util::DeviceExt;

use crate::error::{Error, Result};
use crate::frame::{AccumulationState, FrameUniform};
use crate::scene::{GpuSphere, Scene};
use crate::texture::Texture;
use crate::util::math::ceil_div;

/// Kernel thread-group tile size; must match `@workgroup_size` in the WGSL.
const WORKGROUP_SIZE: u32 = 8;

/// Raw per-sample image: storage texture the kernel writes into.
const RAW_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;
/// Accumulated image: render target of the blend pass, blendable in core wgpu.
const CONVERGED_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

/// Storage buffer holding the packed sphere records, written once per scene
/// generation and read-only for the kernel afterwards.
pub struct SphereBuffer {
    buffer: wgpu::Buffer,
    count: u32,
}

impl SphereBuffer {
    pub fn init_immediate(
        device: &wgpu::Device,
        spheres: &[GpuSphere],
        label: Option<&str>,
    ) -> Self {
        let init_descriptor = wgpu::util::BufferInitDescriptor {
            label,
            contents: bytemuck::cast_slice(spheres),
            usage: wgpu::BufferUsages::STORAGE,
        };
        let buffer = device.create_buffer_init(&init_descriptor);
        Self {
            buffer,
            count: spheres.len() as u32,
        }
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    pub fn count(&self) -> u32 {
        self.count
    }
}

/// Uniform buffer sized for a single Pod value.
pub struct UniformBuffer(wgpu::Buffer);

impl UniformBuffer {
    pub fn init<T: bytemuck::Pod>(device: &wgpu::Device, label: Option<&str>) -> Self {
        let wgt_descriptor = wgpu::BufferDescriptor {
            label,
            size: std::mem::size_of::<T>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        };
        let buffer = device.create_buffer(&wgt_descriptor);
        Self(buffer)
    }

    pub fn write<T: bytemuck::Pod>(&self, queue: &wgpu::Queue, value: &T) {
        queue.write_buffer(&self.0, 0, bytemuck::bytes_of(value));
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.0
    }
}

/// Accumulate-pass parameters: the weight of the incoming sample.
#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct BlendUniform {
    sample_weight: f32,
    _pad: [f32; 3],
}

/// The two accumulation images. Always reallocated together when the
/// viewport changes; the previous pair is dropped first.
struct RenderTargets {
    _raw: wgpu::Texture,
    raw_view: wgpu::TextureView,
    _converged: wgpu::Texture,
    converged_view: wgpu::TextureView,
    width: u32,
    height: u32,
}

impl RenderTargets {
    fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let raw = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Raw Frame"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: RAW_FORMAT,
            usage: wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let converged = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Converged Frame"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: CONVERGED_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });

        let raw_view = raw.create_view(&wgpu::TextureViewDescriptor::default());
        let converged_view = converged.create_view(&wgpu::TextureViewDescriptor::default());

        Self {
            _raw: raw,
            raw_view,
            _converged: converged,
            converged_view,
            width,
            height,
        }
    }
}

pub struct ProgressiveRenderer {
    kernel_pipeline: wgpu::ComputePipeline,
    kernel_layout: wgpu::BindGroupLayout,
    kernel_bind_group: Option<wgpu::BindGroup>,

    accumulate_pipeline: wgpu::RenderPipeline,
    accumulate_layout: wgpu::BindGroupLayout,
    accumulate_bind_group: Option<wgpu::BindGroup>,

    present_pipeline: wgpu::RenderPipeline,
    present_layout: wgpu::BindGroupLayout,
    present_bind_group: Option<wgpu::BindGroup>,
    present_sampler: wgpu::Sampler,

    frame_buffer: UniformBuffer,
    blend_buffer: UniformBuffer,
    sphere_buffer: Option<SphereBuffer>,
    skybox: Texture,

    targets: Option<RenderTargets>,
    accumulation: AccumulationState,
}

impl ProgressiveRenderer {
    pub fn new(
        device: &wgpu::Device,
        surface_format: wgpu::TextureFormat,
        skybox: Texture,
    ) -> Self {
        let kernel_shader =
            device.create_shader_module(include_wgsl!("asset/shader/ray_trace.wgsl"));
        let accumulate_shader =
            device.create_shader_module(include_wgsl!("asset/shader/accumulate.wgsl"));
        let present_shader =
            device.create_shader_module(include_wgsl!("asset/shader/present.wgsl"));

        let kernel_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 4,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::StorageTexture {
                        access: wgpu::StorageTextureAccess::WriteOnly,
                        format: RAW_FORMAT,
                        view_dimension: wgpu::TextureViewDimension::D2,
                    },
                    count: None,
                },
            ],
            label: Some("kernel_bind_group_layout"),
        });

        let kernel_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Kernel Pipeline Layout"),
                bind_group_layouts: &[&kernel_layout],
                push_constant_ranges: &[],
            });

        let kernel_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Kernel Pipeline"),
            layout: Some(&kernel_pipeline_layout),
            module: &kernel_shader,
            entry_point: "main",
        });

        let accumulate_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            multisampled: false,
                            view_dimension: wgpu::TextureViewDimension::D2,
                            sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                ],
                label: Some("accumulate_bind_group_layout"),
            });

        let accumulate_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Accumulate Pipeline Layout"),
                bind_group_layouts: &[&accumulate_layout],
                push_constant_ranges: &[],
            });

        // Running average through fixed-function blending: the new sample
        // lands with alpha 1/(n+1) against 1 - 1/(n+1) of history.
        let accumulate_pipeline =
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("Accumulate Pipeline"),
                layout: Some(&accumulate_pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &accumulate_shader,
                    entry_point: "vs_main",
                    buffers: &[],
                },
                fragment: Some(wgpu::FragmentState {
                    module: &accumulate_shader,
                    entry_point: "fs_main",
                    targets: &[Some(wgpu::ColorTargetState {
                        format: CONVERGED_FORMAT,
                        blend: Some(wgpu::BlendState {
                            color: wgpu::BlendComponent {
                                src_factor: wgpu::BlendFactor::SrcAlpha,
                                dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
                                operation: wgpu::BlendOperation::Add,
                            },
                            alpha: wgpu::BlendComponent {
                                src_factor: wgpu::BlendFactor::One,
                                dst_factor: wgpu::BlendFactor::Zero,
                                operation: wgpu::BlendOperation::Add,
                            },
                        }),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState::default(),
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
            });

        let present_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
            label: Some("present_bind_group_layout"),
        });

        let present_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Present Pipeline Layout"),
                bind_group_layouts: &[&present_layout],
                push_constant_ranges: &[],
            });

        let present_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Present Pipeline"),
            layout: Some(&present_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &present_shader,
                entry_point: "vs_main",
                buffers: &[],
            },
            fragment: Some(wgpu::FragmentState {
                module: &present_shader,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format: surface_format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
        });

        let present_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Present Sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let frame_buffer = UniformBuffer::init::<FrameUniform>(device, Some("Frame Uniform"));
        let blend_buffer = UniformBuffer::init::<BlendUniform>(device, Some("Blend Uniform"));

        Self {
            kernel_pipeline,
            kernel_layout,
            kernel_bind_group: None,
            accumulate_pipeline,
            accumulate_layout,
            accumulate_bind_group: None,
            present_pipeline,
            present_layout,
            present_bind_group: None,
            present_sampler,
            frame_buffer,
            blend_buffer,
            sphere_buffer: None,
            skybox,
            targets: None,
            accumulation: AccumulationState::new(),
        }
    }

    /// Upload a freshly generated scene. The previous sphere buffer is
    /// dropped and all accumulated samples are discarded: the converged
    /// image is scene-specific.
    pub fn upload_scene(&mut self, device: &wgpu::Device, scene: &Scene) {
        let spheres = scene.gpu_spheres();
        self.sphere_buffer = Some(SphereBuffer::init_immediate(
            device,
            &spheres,
            Some("Sphere Buffer"),
        ));
        self.accumulation.reset();
        self.rebuild_bind_groups(device);
        tracing::debug!(
            count = spheres.len(),
            seed = scene.seed,
            "uploaded sphere buffer"
        );
    }

    /// Discard accumulated samples; the next frame starts convergence over.
    pub fn reset_accumulation(&mut self) {
        self.accumulation.reset();
    }

    pub fn sample_count(&self) -> u32 {
        self.accumulation.sample_count()
    }

    /// (Re)allocate the raw and converged images when the viewport changed
    /// or none exist yet. Resizing discards accumulation.
    fn ensure_targets(&mut self, device: &wgpu::Device, width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(Error::ResourceAllocation(format!(
                "viewport is {width}x{height}"
            )));
        }
        let current = self.targets.as_ref().map(|t| (t.width, t.height));
        if !needs_reallocation(current, width, height) {
            return Ok(());
        }

        // Release the old pair before allocating replacements.
        self.targets = None;
        self.targets = Some(RenderTargets::new(device, width, height));
        self.accumulation.reset();
        self.rebuild_bind_groups(device);
        tracing::debug!(width, height, "allocated render targets");
        Ok(())
    }

    /// Rebuild every bind group that references the sphere buffer or the
    /// target images. Groups stay `None` until their inputs exist.
    fn rebuild_bind_groups(&mut self, device: &wgpu::Device) {
        let Some(targets) = &self.targets else {
            self.kernel_bind_group = None;
            self.accumulate_bind_group = None;
            self.present_bind_group = None;
            return;
        };

        self.kernel_bind_group = self.sphere_buffer.as_ref().map(|spheres| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                layout: &self.kernel_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: self.frame_buffer.buffer().as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: spheres.buffer().as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::TextureView(&self.skybox.view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: wgpu::BindingResource::Sampler(&self.skybox.sampler),
                    },
                    wgpu::BindGroupEntry {
                        binding: 4,
                        resource: wgpu::BindingResource::TextureView(&targets.raw_view),
                    },
                ],
                label: Some("kernel_bind_group"),
            })
        });

        self.accumulate_bind_group = Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &self.accumulate_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&targets.raw_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: self.blend_buffer.buffer().as_entire_binding(),
                },
            ],
            label: Some("accumulate_bind_group"),
        }));

        self.present_bind_group = Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &self.present_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&targets.converged_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.present_sampler),
                },
            ],
            label: Some("present_bind_group"),
        }));
    }

    /// Run one frame: upload parameters, dispatch the kernel over 8x8 tiles,
    /// blend the raw sample into the converged image, and present it to
    /// `destination`.
    ///
    /// Any error leaves the accumulation counter exactly as it was, so the
    /// next frame retries with the same weights.
    pub fn render_frame(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        params: &FrameUniform,
        width: u32,
        height: u32,
        destination: &wgpu::TextureView,
    ) -> Result<()> {
        self.ensure_targets(device, width, height)?;

        let Some(targets) = &self.targets else {
            return Err(Error::ResourceAllocation("render targets missing".into()));
        };
        let Some(kernel_bind_group) = &self.kernel_bind_group else {
            return Err(Error::KernelDispatch("no scene uploaded".into()));
        };
        let (Some(accumulate_bind_group), Some(present_bind_group)) =
            (&self.accumulate_bind_group, &self.present_bind_group)
        else {
            return Err(Error::ResourceAllocation("bind groups missing".into()));
        };

        self.frame_buffer.write(queue, params);
        self.blend_buffer.write(
            queue,
            &BlendUniform {
                sample_weight: self.accumulation.blend_factor(),
                _pad: [0.0; 3],
            },
        );

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Frame Encoder"),
        });

        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Ray Trace Pass"),
            });
            pass.set_pipeline(&self.kernel_pipeline);
            pass.set_bind_group(0, kernel_bind_group, &[]);
            pass.dispatch_workgroups(
                ceil_div(targets.width, WORKGROUP_SIZE),
                ceil_div(targets.height, WORKGROUP_SIZE),
                1,
            );
        }

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Accumulate Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &targets.converged_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: true,
                    },
                })],
                depth_stencil_attachment: None,
            });
            pass.set_pipeline(&self.accumulate_pipeline);
            pass.set_bind_group(0, accumulate_bind_group, &[]);
            pass.draw(0..3, 0..1);
        }

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Present Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: destination,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: true,
                    },
                })],
                depth_stencil_attachment: None,
            });
            pass.set_pipeline(&self.present_pipeline);
            pass.set_bind_group(0, present_bind_group, &[]);
            pass.draw(0..3, 0..1);
        }

        queue.submit(std::iter::once(encoder.finish()));
        self.accumulation.advance();
        Ok(())
    }
}

/// Whether the target image pair must be reallocated for the given viewport.
fn needs_reallocation(current: Option<(u32, u32)>, width: u32, height: u32) -> bool {
    match current {
        Some((w, h)) => w != width || h != height,
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reallocates_when_unallocated_or_resized() {
        assert!(needs_reallocation(None, 1280, 720));
        assert!(needs_reallocation(Some((1280, 720)), 1280, 800));
        assert!(needs_reallocation(Some((1280, 720)), 640, 720));
    }

    #[test]
    fn test_same_viewport_keeps_targets() {
        assert!(!needs_reallocation(Some((1280, 720)), 1280, 720));
    }

    #[test]
    fn test_blend_uniform_is_one_vec4() {
        assert_eq!(std::mem::size_of::<BlendUniform>(), 16);
    }
}
