use std::collections::HashMap;

use anyhow::{anyhow, Context, Result};
use glam::UVec2;

use crate::draw::{RenderTargetId, TextureId, TextureSource};

use super::frame_plan::{OverlayBatch, OverlayProgram, OverlayTexture, OverlayVertex};
use super::targets::{GpuImage, TexturePool};
use super::uniform_slab::UniformSlab;
use super::DEPTH_FORMAT;

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct OverlayUniforms {
    view_proj: [[f32; 4]; 4],
    params: [f32; 4],
    resolution: [f32; 4],
}

impl OverlayUniforms {
    fn from_batch(batch: &OverlayBatch) -> Self {
        let u = &batch.uniforms;
        Self {
            view_proj: batch.view_proj.to_cols_array_2d(),
            params: [u.depth_outline, u.uv_outline, if batch.opaque { 1.0 } else { 0.0 }, 0.0],
            resolution: [u.resolution[0], u.resolution[1], 0.0, 0.0],
        }
    }
}

/// A batch whose uniform block is staged and whose bind group exists.
#[derive(Debug, Clone)]
pub struct PreparedBatch {
    texture: OverlayTexture,
    program: OverlayProgram,
    blend: bool,
    vertices: std::ops::Range<u32>,
    uniform_offset: u32,
}

type PipelineKey = (OverlayProgram, wgpu::TextureFormat, bool);

pub struct OverlayPass {
    plain_shader: Option<wgpu::ShaderModule>,
    outline_shader: Option<wgpu::ShaderModule>,
    uniform_bgl: Option<wgpu::BindGroupLayout>,
    plain_bgl: Option<wgpu::BindGroupLayout>,
    outline_bgl: Option<wgpu::BindGroupLayout>,
    plain_layout: Option<wgpu::PipelineLayout>,
    outline_layout: Option<wgpu::PipelineLayout>,
    sampler: Option<wgpu::Sampler>,
    white: Option<GpuImage>,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
    bind_groups: HashMap<(OverlayTexture, OverlayProgram), wgpu::BindGroup>,
    uniforms: UniformSlab,
    vertex_buffer: Option<wgpu::Buffer>,
    vertex_capacity: usize,
}

impl Default for OverlayPass {
    fn default() -> Self {
        Self {
            plain_shader: None,
            outline_shader: None,
            uniform_bgl: None,
            plain_bgl: None,
            outline_bgl: None,
            plain_layout: None,
            outline_layout: None,
            sampler: None,
            white: None,
            pipelines: HashMap::new(),
            bind_groups: HashMap::new(),
            uniforms: UniformSlab::new::<OverlayUniforms>("Overlay Uniforms"),
            vertex_buffer: None,
            vertex_capacity: 0,
        }
    }
}

fn texture_entry(binding: u32, sample_type: wgpu::TextureSampleType) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            multisampled: false,
            view_dimension: wgpu::TextureViewDimension::D2,
            sample_type,
        },
        count: None,
    }
}

impl OverlayPass {
    pub fn init(&mut self, device: &wgpu::Device, queue: &wgpu::Queue) -> Result<()> {
        let plain_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Overlay Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../../assets/shaders/overlay.wgsl").into()),
        });
        let outline_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Outline Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../../assets/shaders/outline.wgsl").into()),
        });
        let uniform_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Overlay Uniform BGL"),
            entries: &[UniformSlab::layout_entry()],
        });
        let plain_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Overlay Texture BGL"),
            entries: &[
                texture_entry(0, wgpu::TextureSampleType::Float { filterable: true }),
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });
        let outline_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Outline Source BGL"),
            entries: &[
                texture_entry(0, wgpu::TextureSampleType::Float { filterable: false }),
                texture_entry(1, wgpu::TextureSampleType::Depth),
            ],
        });
        let plain_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Overlay Pipeline Layout"),
            bind_group_layouts: &[&uniform_bgl, &plain_bgl],
            push_constant_ranges: &[],
        });
        let outline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Outline Pipeline Layout"),
            bind_group_layouts: &[&uniform_bgl, &outline_bgl],
            push_constant_ranges: &[],
        });
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Overlay Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        let white = GpuImage::from_rgba(device, queue, "Overlay White Texture", UVec2::ONE, &[255; 4])?;

        self.plain_shader = Some(plain_shader);
        self.outline_shader = Some(outline_shader);
        self.uniform_bgl = Some(uniform_bgl);
        self.plain_bgl = Some(plain_bgl);
        self.outline_bgl = Some(outline_bgl);
        self.plain_layout = Some(plain_layout);
        self.outline_layout = Some(outline_layout);
        self.sampler = Some(sampler);
        self.white = Some(white);
        self.pipelines.clear();
        self.bind_groups.clear();
        Ok(())
    }

    pub fn begin_frame(&mut self) {
        self.uniforms.clear();
    }

    /// Drops cached bind groups that still reference a destroyed target.
    pub fn forget_target(&mut self, id: RenderTargetId) {
        let source = OverlayTexture::Source(TextureSource::Target(id));
        self.bind_groups.retain(|(texture, _), _| *texture != source);
    }

    pub fn prepare(
        &mut self,
        device: &wgpu::Device,
        format: wgpu::TextureFormat,
        batch: &OverlayBatch,
        pool: &TexturePool,
        font: Option<TextureId>,
    ) -> Result<PreparedBatch> {
        self.ensure_bind_group(device, batch.texture, batch.program, pool, font)?;
        self.ensure_pipeline(device, (batch.program, format, batch.blend))?;
        Ok(PreparedBatch {
            texture: batch.texture,
            program: batch.program,
            blend: batch.blend,
            vertices: batch.vertices.clone(),
            uniform_offset: self.uniforms.push(&OverlayUniforms::from_batch(batch)),
        })
    }

    pub fn upload(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        vertices: &[OverlayVertex],
    ) -> Result<()> {
        let layout = self.uniform_bgl.as_ref().context("Overlay uniform layout missing")?;
        self.uniforms.upload(device, queue, layout)?;
        self.ensure_vertex_capacity(device, vertices.len());
        if !vertices.is_empty() {
            let buffer = self.vertex_buffer.as_ref().context("Overlay vertex buffer missing")?;
            queue.write_buffer(buffer, 0, bytemuck::cast_slice(vertices));
        }
        Ok(())
    }

    pub fn encode(
        &self,
        pass: &mut wgpu::RenderPass<'_>,
        format: wgpu::TextureFormat,
        batches: &[PreparedBatch],
    ) -> Result<()> {
        if batches.is_empty() {
            return Ok(());
        }
        let uniforms = self.uniforms.bind_group()?;
        let vertex_buffer = self.vertex_buffer.as_ref().context("Overlay vertex buffer missing")?;
        pass.set_vertex_buffer(0, vertex_buffer.slice(..));
        for batch in batches {
            let pipeline = self
                .pipelines
                .get(&(batch.program, format, batch.blend))
                .context("Overlay pipeline missing")?;
            let bind_group =
                self.bind_groups.get(&(batch.texture, batch.program)).context("Overlay bind group missing")?;
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, uniforms, &[batch.uniform_offset]);
            pass.set_bind_group(1, bind_group, &[]);
            pass.draw(batch.vertices.clone(), 0..1);
        }
        Ok(())
    }

    fn ensure_bind_group(
        &mut self,
        device: &wgpu::Device,
        texture: OverlayTexture,
        program: OverlayProgram,
        pool: &TexturePool,
        font: Option<TextureId>,
    ) -> Result<()> {
        if self.bind_groups.contains_key(&(texture, program)) {
            return Ok(());
        }
        let bind_group = match program {
            OverlayProgram::Plain => {
                let view = match texture {
                    OverlayTexture::White => {
                        &self.white.as_ref().context("Overlay white texture missing")?.view
                    }
                    OverlayTexture::Font => {
                        let id = font.context("Font texture not uploaded")?;
                        &pool.image(id).context("Font texture missing")?.view
                    }
                    OverlayTexture::Source(TextureSource::Image(id)) => {
                        &pool.image(id).ok_or_else(|| anyhow!("texture {} missing", id.0))?.view
                    }
                    OverlayTexture::Source(TextureSource::Target(id)) => {
                        &pool.target(id).ok_or_else(|| anyhow!("render target {} missing", id.0))?.color_view
                    }
                };
                device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("Overlay Texture BG"),
                    layout: self.plain_bgl.as_ref().context("Overlay texture layout missing")?,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: wgpu::BindingResource::TextureView(view),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: wgpu::BindingResource::Sampler(
                                self.sampler.as_ref().context("Overlay sampler missing")?,
                            ),
                        },
                    ],
                })
            }
            OverlayProgram::Outline => {
                let OverlayTexture::Source(TextureSource::Target(id)) = texture else {
                    return Err(anyhow!("outline program needs a render target source, got {texture:?}"));
                };
                let target = pool.target(id).ok_or_else(|| anyhow!("render target {} missing", id.0))?;
                device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("Outline Source BG"),
                    layout: self.outline_bgl.as_ref().context("Outline source layout missing")?,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: wgpu::BindingResource::TextureView(&target.color_view),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: wgpu::BindingResource::TextureView(&target.depth_view),
                        },
                    ],
                })
            }
        };
        self.bind_groups.insert((texture, program), bind_group);
        Ok(())
    }

    fn ensure_pipeline(&mut self, device: &wgpu::Device, key: PipelineKey) -> Result<()> {
        if self.pipelines.contains_key(&key) {
            return Ok(());
        }
        let (program, format, blend) = key;
        let (shader, layout) = match program {
            OverlayProgram::Plain => (&self.plain_shader, &self.plain_layout),
            OverlayProgram::Outline => (&self.outline_shader, &self.outline_layout),
        };
        let shader = shader.as_ref().context("Overlay shader missing")?;
        let layout = layout.as_ref().context("Overlay pipeline layout missing")?;
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Overlay Pipeline"),
            layout: Some(layout),
            vertex: wgpu::VertexState {
                module: shader,
                entry_point: Some("vs_main"),
                buffers: &[OverlayVertex::layout()],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: blend.then_some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: None,
                ..Default::default()
            },
            // Every pass carries a depth attachment; 2D draws ignore it.
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: false,
                depth_compare: wgpu::CompareFunction::Always,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });
        self.pipelines.insert(key, pipeline);
        Ok(())
    }

    fn ensure_vertex_capacity(&mut self, device: &wgpu::Device, count: usize) {
        let required = count.max(1);
        if self.vertex_capacity >= required && self.vertex_buffer.is_some() {
            return;
        }
        let mut capacity = self.vertex_capacity.max(1024);
        while capacity < required {
            capacity *= 2;
        }
        self.vertex_buffer = Some(device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Overlay Vertex Buffer"),
            size: (capacity * std::mem::size_of::<OverlayVertex>()) as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        }));
        self.vertex_capacity = capacity;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::frame_plan::UniformState;
    use glam::Mat4;

    #[test]
    fn uniforms_mirror_batch_state() {
        let batch = OverlayBatch {
            texture: OverlayTexture::Source(TextureSource::Target(RenderTargetId(1))),
            program: OverlayProgram::Outline,
            blend: false,
            opaque: true,
            uniforms: UniformState {
                time: 3.0,
                depth_outline: 1.0,
                uv_outline: 0.0,
                resolution: [400.0, 225.0],
            },
            view_proj: Mat4::IDENTITY,
            vertices: 0..6,
        };
        let uniforms = OverlayUniforms::from_batch(&batch);
        assert_eq!(uniforms.params, [1.0, 0.0, 1.0, 0.0]);
        assert_eq!(uniforms.resolution, [400.0, 225.0, 0.0, 0.0]);
    }
}
