use std::collections::HashMap;

use anyhow::{anyhow, Context, Result};
use glam::{Mat3, Mat4, UVec2, Vec4};
use wgpu::util::DeviceExt;

use crate::draw::{ModelId, ShaderKind};
use crate::mesh::{ModelData, ModelVertex};

use super::frame_plan::{MeshSelection, ModelDraw};
use super::targets::GpuImage;
use super::uniform_slab::UniformSlab;
use super::DEPTH_FORMAT;

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct ModelUniforms {
    view_proj: [[f32; 4]; 4],
    model: [[f32; 4]; 4],
    normal: [[f32; 4]; 4],
    base_color: [f32; 4],
    params: [f32; 4],
}

/// Fragment programs a mesh can be shaded with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelProgram {
    Unlit,
    Dither,
}

impl ModelProgram {
    /// The outline shader is a post process; meshes assigned to it fall back to unlit.
    pub fn for_shader(kind: ShaderKind) -> Self {
        match kind {
            ShaderKind::Dither => ModelProgram::Dither,
            ShaderKind::Default | ShaderKind::Outline => ModelProgram::Unlit,
        }
    }

    fn entry_point(self) -> &'static str {
        match self {
            ModelProgram::Unlit => "fs_default",
            ModelProgram::Dither => "fs_dither",
        }
    }
}

struct GpuMesh {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
    material_slot: usize,
}

struct GpuMaterial {
    base_color: Vec4,
    bind_group: wgpu::BindGroup,
}

struct GpuModel {
    meshes: Vec<GpuMesh>,
    materials: Vec<GpuMaterial>,
    _textures: Vec<GpuImage>,
}

/// One mesh draw with its uniform block already staged.
#[derive(Debug, Clone, Copy)]
pub struct MeshDraw {
    model: ModelId,
    mesh: usize,
    material: usize,
    program: ModelProgram,
    uniform_offset: u32,
}

pub struct ModelPass {
    shader: Option<wgpu::ShaderModule>,
    uniform_bgl: Option<wgpu::BindGroupLayout>,
    material_bgl: Option<wgpu::BindGroupLayout>,
    pipeline_layout: Option<wgpu::PipelineLayout>,
    sampler: Option<wgpu::Sampler>,
    white: Option<GpuImage>,
    pipelines: HashMap<(ModelProgram, wgpu::TextureFormat), wgpu::RenderPipeline>,
    uniforms: UniformSlab,
    models: Vec<GpuModel>,
}

impl Default for ModelPass {
    fn default() -> Self {
        Self {
            shader: None,
            uniform_bgl: None,
            material_bgl: None,
            pipeline_layout: None,
            sampler: None,
            white: None,
            pipelines: HashMap::new(),
            uniforms: UniformSlab::new::<ModelUniforms>("Model Uniforms"),
            models: Vec::new(),
        }
    }
}

impl ModelPass {
    pub fn init(&mut self, device: &wgpu::Device, queue: &wgpu::Queue) -> Result<()> {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Model Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../../assets/shaders/model.wgsl").into()),
        });
        let uniform_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Model Uniform BGL"),
            entries: &[UniformSlab::layout_entry()],
        });
        let material_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Model Material BGL"),
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
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Model Pipeline Layout"),
            bind_group_layouts: &[&uniform_bgl, &material_bgl],
            push_constant_ranges: &[],
        });
        // Pixel-art textures stay crisp at every distance.
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Model Sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        let white = GpuImage::from_rgba(device, queue, "Model White Texture", UVec2::ONE, &[255; 4])?;

        self.shader = Some(shader);
        self.uniform_bgl = Some(uniform_bgl);
        self.material_bgl = Some(material_bgl);
        self.pipeline_layout = Some(pipeline_layout);
        self.sampler = Some(sampler);
        self.white = Some(white);
        self.pipelines.clear();
        Ok(())
    }

    pub fn upload(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        label: &str,
        data: &ModelData,
    ) -> Result<ModelId> {
        let layout = self.material_bgl.as_ref().context("Model material layout missing")?;
        let sampler = self.sampler.as_ref().context("Model sampler missing")?;
        let white = self.white.as_ref().context("Model white texture missing")?;

        let textures = data
            .textures
            .iter()
            .enumerate()
            .map(|(index, texture)| {
                let size = UVec2::new(texture.width, texture.height);
                GpuImage::from_rgba(device, queue, &format!("{label} texture {index}"), size, &texture.rgba)
            })
            .collect::<Result<Vec<_>>>()?;

        let materials = data
            .materials
            .iter()
            .map(|material| {
                let view = match material.texture {
                    Some(index) => {
                        let texture = textures.get(index).ok_or_else(|| {
                            anyhow!("material '{}' references missing texture {index}", material.label)
                        })?;
                        &texture.view
                    }
                    None => &white.view,
                };
                let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some(&material.label),
                    layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: wgpu::BindingResource::TextureView(view),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: wgpu::BindingResource::Sampler(sampler),
                        },
                    ],
                });
                Ok(GpuMaterial { base_color: Vec4::from_array(material.base_color), bind_group })
            })
            .collect::<Result<Vec<_>>>()?;
        if materials.is_empty() {
            return Err(anyhow!("model '{label}' has no materials"));
        }

        let meshes = data
            .meshes
            .iter()
            .map(|mesh| GpuMesh {
                vertex_buffer: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(&format!("{label} VB")),
                    contents: bytemuck::cast_slice(&mesh.vertices),
                    usage: wgpu::BufferUsages::VERTEX,
                }),
                index_buffer: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(&format!("{label} IB")),
                    contents: bytemuck::cast_slice(&mesh.indices),
                    usage: wgpu::BufferUsages::INDEX,
                }),
                index_count: mesh.indices.len() as u32,
                material_slot: mesh.material_slot,
            })
            .collect();

        let id = ModelId(self.models.len() as u32);
        self.models.push(GpuModel { meshes, materials, _textures: textures });
        Ok(id)
    }

    pub fn begin_frame(&mut self) {
        self.uniforms.clear();
    }

    /// Stages uniforms for every mesh `draw` touches and makes sure their pipelines exist.
    pub fn prepare(
        &mut self,
        device: &wgpu::Device,
        format: wgpu::TextureFormat,
        draw: &ModelDraw,
    ) -> Result<Vec<MeshDraw>> {
        let model = self
            .models
            .get(draw.model.0 as usize)
            .ok_or_else(|| anyhow!("model {} was never uploaded", draw.model.0))?;
        let picks: Vec<(usize, usize, ShaderKind)> = match &draw.selection {
            MeshSelection::All(shaders) => model
                .meshes
                .iter()
                .enumerate()
                .map(|(index, mesh)| (index, mesh.material_slot, shaders.shader_for(mesh.material_slot)))
                .collect(),
            MeshSelection::One { mesh, material_slot, shader } => {
                if *mesh >= model.meshes.len() {
                    return Err(anyhow!("model {} has no mesh {mesh}", draw.model.0));
                }
                vec![(*mesh, *material_slot, *shader)]
            }
        };

        let transform = draw.transform;
        let normal = Mat4::from_mat3(Mat3::from_mat4(transform).inverse().transpose());
        let tint = Vec4::from_array(draw.tint.to_array());
        let mut draws = Vec::with_capacity(picks.len());
        for (mesh, slot, shader) in picks {
            let material = if slot < model.materials.len() { slot } else { 0 };
            let uniforms = ModelUniforms {
                view_proj: draw.view_proj.to_cols_array_2d(),
                model: transform.to_cols_array_2d(),
                normal: normal.to_cols_array_2d(),
                base_color: (model.materials[material].base_color * tint).to_array(),
                params: [draw.uniforms.time, 0.0, 0.0, 0.0],
            };
            let program = ModelProgram::for_shader(shader);
            draws.push(MeshDraw {
                model: draw.model,
                mesh,
                material,
                program,
                uniform_offset: self.uniforms.push(&uniforms),
            });
        }
        for mesh_draw in &draws {
            self.ensure_pipeline(device, mesh_draw.program, format)?;
        }
        Ok(draws)
    }

    pub fn upload_uniforms(&mut self, device: &wgpu::Device, queue: &wgpu::Queue) -> Result<()> {
        let layout = self.uniform_bgl.as_ref().context("Model uniform layout missing")?;
        self.uniforms.upload(device, queue, layout)
    }

    pub fn encode(
        &self,
        pass: &mut wgpu::RenderPass<'_>,
        format: wgpu::TextureFormat,
        draws: &[MeshDraw],
    ) -> Result<()> {
        let uniforms = self.uniforms.bind_group()?;
        for draw in draws {
            let pipeline =
                self.pipelines.get(&(draw.program, format)).context("Model pipeline missing")?;
            let model = self.models.get(draw.model.0 as usize).context("Model missing")?;
            let mesh = model.meshes.get(draw.mesh).context("Mesh missing")?;
            let material = model.materials.get(draw.material).context("Material missing")?;
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, uniforms, &[draw.uniform_offset]);
            pass.set_bind_group(1, &material.bind_group, &[]);
            pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
            pass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
            pass.draw_indexed(0..mesh.index_count, 0, 0..1);
        }
        Ok(())
    }

    pub fn model_count(&self) -> usize {
        self.models.len()
    }

    fn ensure_pipeline(
        &mut self,
        device: &wgpu::Device,
        program: ModelProgram,
        format: wgpu::TextureFormat,
    ) -> Result<()> {
        if self.pipelines.contains_key(&(program, format)) {
            return Ok(());
        }
        let shader = self.shader.as_ref().context("Model shader missing")?;
        let layout = self.pipeline_layout.as_ref().context("Model pipeline layout missing")?;
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Model Pipeline"),
            layout: Some(layout),
            vertex: wgpu::VertexState {
                module: shader,
                entry_point: Some("vs_main"),
                buffers: &[ModelVertex::layout()],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: shader,
                entry_point: Some(program.entry_point()),
                // Alpha carries the UV key, so it is written unblended.
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });
        self.pipelines.insert((program, format), pipeline);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outline_assignments_shade_unlit() {
        assert_eq!(ModelProgram::for_shader(ShaderKind::Dither), ModelProgram::Dither);
        assert_eq!(ModelProgram::for_shader(ShaderKind::Default), ModelProgram::Unlit);
        assert_eq!(ModelProgram::for_shader(ShaderKind::Outline), ModelProgram::Unlit);
    }

    #[test]
    fn uniform_block_fits_one_dynamic_slot() {
        assert!(std::mem::size_of::<ModelUniforms>() as u64 <= super::super::uniform_slab::UNIFORM_STRIDE);
    }
}
