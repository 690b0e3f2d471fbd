//! Model pass: one pipeline, per-frame uniforms, one indexed draw.

use std::num::NonZeroU64;
use std::ops::Range;

use asset::TextureData;
use bytemuck::{Pod, Zeroable};
use corelib::camera::Camera;
use glam::{Mat4, Vec3};
use wgpu::{
    BindGroup, BindGroupLayout, BindGroupLayoutDescriptor, BindGroupLayoutEntry, BindingType,
    BlendState, Buffer, BufferBindingType, BufferUsages, ColorTargetState, ColorWrites,
    DepthBiasState, DepthStencilState, Device, FragmentState, IndexFormat, PipelineLayoutDescriptor,
    Queue, RenderPass, RenderPipeline, RenderPipelineDescriptor, SamplerBindingType,
    ShaderModuleDescriptor, ShaderSource, ShaderStages, TextureFormat, TextureSampleType,
    TextureViewDimension, VertexState,
};

use crate::render_data::{BoundTexture, INDEX_FORMAT, RenderData, VERTEX_LAYOUT, upload_rgba8};
use crate::DEPTH_FORMAT;

/// Uniform block shared by both stages (16-byte aligned).
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct ModelUniform {
    projection: [[f32; 4]; 4],
    view: [[f32; 4]; 4],
    model: [[f32; 4]; 4],
    light_dir: [f32; 4],
    light_color: [f32; 4],
}

/// Projection and view supplied by the camera for one frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraMatrices {
    pub projection: Mat4,
    pub view: Mat4,
}

impl CameraMatrices {
    pub fn from_camera(camera: &Camera, width: u32, height: u32) -> Self {
        Self {
            projection: camera.proj(width, height),
            view: camera.view(),
        }
    }
}

/// Shape of the draw recorded by [`ModelRenderer::encode`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DrawIndexed {
    pub indices: Range<u32>,
    pub format: IndexFormat,
    /// Whether the model's own texture was bound (otherwise the white fallback).
    pub textured: bool,
}

/// Directional-light textured renderer. Construction compiles the pipeline,
/// so an existing value is always ready to draw.
pub struct ModelRenderer {
    pipeline: RenderPipeline,
    uniform_buf: Buffer,
    uniform_bg: BindGroup,
    texture_bgl: BindGroupLayout,
    fallback: BoundTexture,
    light_dir: Vec3,
    light_color: Vec3,
}

impl ModelRenderer {
    pub fn new(device: &Device, queue: &Queue, color_format: TextureFormat) -> Self {
        let shader = device.create_shader_module(ShaderModuleDescriptor {
            label: Some("Model WGSL"),
            source: ShaderSource::Wgsl(include_str!("shaders/model.wgsl").into()),
        });

        let uniform_bgl = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("Model Uniform BGL"),
            entries: &[BindGroupLayoutEntry {
                binding: 0,
                visibility: ShaderStages::VERTEX | ShaderStages::FRAGMENT,
                ty: BindingType::Buffer {
                    ty: BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: NonZeroU64::new(std::mem::size_of::<ModelUniform>() as u64),
                },
                count: None,
            }],
        });

        let texture_bgl = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("Model Texture BGL"),
            entries: &[
                BindGroupLayoutEntry {
                    binding: 0,
                    visibility: ShaderStages::FRAGMENT,
                    ty: BindingType::Texture {
                        sample_type: TextureSampleType::Float { filterable: true },
                        view_dimension: TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                BindGroupLayoutEntry {
                    binding: 1,
                    visibility: ShaderStages::FRAGMENT,
                    ty: BindingType::Sampler(SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let uniform_buf = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Model UBO"),
            size: std::mem::size_of::<ModelUniform>() as u64,
            usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let uniform_bg = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Model Uniform BG"),
            layout: &uniform_bgl,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buf.as_entire_binding(),
            }],
        });

        let pipeline_layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
            label: Some("Model PipelineLayout"),
            bind_group_layouts: &[&uniform_bgl, &texture_bgl],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_render_pipeline(&RenderPipelineDescriptor {
            label: Some("Model Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[VERTEX_LAYOUT],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(ColorTargetState {
                    format: color_format,
                    blend: Some(BlendState::ALPHA_BLENDING),
                    write_mask: ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: Some(wgpu::Face::Back),
                ..Default::default()
            },
            depth_stencil: Some(DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let white = upload_rgba8(device, queue, &TextureData::solid([255; 4]), false);
        let fallback = BoundTexture::new(device, &texture_bgl, white);

        log::info!("Model pipeline ready (target {:?})", color_format);

        Self {
            pipeline,
            uniform_buf,
            uniform_bg,
            texture_bgl,
            fallback,
            light_dir: Vec3::ONE,
            light_color: Vec3::ONE,
        }
    }

    /// Layout that model textures must be bound with.
    pub fn texture_layout(&self) -> &BindGroupLayout {
        &self.texture_bgl
    }

    pub fn light_dir(&self) -> Vec3 {
        self.light_dir
    }

    pub fn light_color(&self) -> Vec3 {
        self.light_color
    }

    /// Direction the light shines from; normalized in the shader.
    pub fn set_light_dir(&mut self, dir: Vec3) {
        self.light_dir = dir;
    }

    pub fn set_light_color(&mut self, color: Vec3) {
        self.light_color = color;
    }

    /// Write uniforms and record the model draw into `rpass`.
    /// Returns `None` (and records nothing) when no mesh is loaded.
    pub fn encode(
        &self,
        queue: &Queue,
        rpass: &mut RenderPass<'_>,
        rdata: &RenderData,
        camera: &CameraMatrices,
        model: Mat4,
    ) -> Option<DrawIndexed> {
        let mesh = rdata.mesh()?;

        let uniform = ModelUniform {
            projection: camera.projection.to_cols_array_2d(),
            view: camera.view.to_cols_array_2d(),
            model: model.to_cols_array_2d(),
            light_dir: self.light_dir.extend(0.0).to_array(),
            light_color: self.light_color.extend(1.0).to_array(),
        };
        queue.write_buffer(&self.uniform_buf, 0, bytemuck::bytes_of(&uniform));

        let texture = rdata.texture();
        let texture_bg = texture.map_or(&self.fallback.bind_group, |t| &t.bind_group);

        let draw = DrawIndexed {
            indices: 0..mesh.index_count,
            format: INDEX_FORMAT,
            textured: texture.is_some(),
        };

        rpass.set_pipeline(&self.pipeline);
        rpass.set_bind_group(0, &self.uniform_bg, &[]);
        rpass.set_bind_group(1, texture_bg, &[]);
        rpass.set_vertex_buffer(0, mesh.vertex_buf.slice(..));
        rpass.set_index_buffer(mesh.index_buf.slice(..), draw.format);
        rpass.draw_indexed(draw.indices.clone(), 0, 0..1);

        Some(draw)
    }
}
