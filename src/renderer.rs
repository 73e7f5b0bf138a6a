//! wgpu backend: replays a [`DrawList`] onto the window surface and off-screen targets.

mod frame_plan;
mod model_pass;
mod overlay_pass;
mod targets;
mod uniform_slab;
mod window_surface;

use std::collections::HashMap;

use anyhow::{Context, Result};
use glam::UVec2;
use image::RgbaImage;
use tracing::{info, warn};
use winit::dpi::PhysicalSize;
use winit::event_loop::ActiveEventLoop;
use winit::window::Window;

use crate::config::WindowConfig;
use crate::draw::{Color, DrawList, ModelId, RenderTargetId, TextureId, TextureSource};
use crate::font::FontAtlas;
use crate::mesh::ModelData;
use crate::render_pipeline::TargetAllocator;
use crate::tutorial::RenderHost;

pub use frame_plan::{
    overlay_projection, plan_frame, FramePlan, MeshSelection, ModelDraw, OverlayBatch, OverlayProgram,
    OverlayTexture, OverlayVertex, PassDestination, PassOp, PlanContext, PlannedPass, UniformState,
};
pub use window_surface::{SurfaceFrame, WindowSurface};

use model_pass::{MeshDraw, ModelPass};
use overlay_pass::{OverlayPass, PreparedBatch};
use targets::{GpuImage, TexturePool};

pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
/// Off-screen colour format. Alpha holds the UV key, so it must be a plain 8-bit channel.
pub const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

enum PreparedOp {
    Meshes(Vec<MeshDraw>),
    Overlay(PreparedBatch),
}

pub struct GpuRenderer {
    surface: WindowSurface,
    pool: TexturePool,
    models: ModelPass,
    overlay: OverlayPass,
    font: Option<(FontAtlas, TextureId)>,
}

impl GpuRenderer {
    pub fn new(window_cfg: &WindowConfig) -> Self {
        Self {
            surface: WindowSurface::new(window_cfg),
            pool: TexturePool::default(),
            models: ModelPass::default(),
            overlay: OverlayPass::default(),
            font: None,
        }
    }

    /// Creates the window and device on first call, then builds the pipelines' shared state.
    pub fn ensure_window(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        if self.surface.window().is_some() {
            return Ok(());
        }
        self.surface.ensure_window(event_loop)?;
        let device = self.surface.device()?;
        let queue = self.surface.queue()?;
        self.models.init(device, queue)?;
        self.overlay.init(device, queue)?;
        Ok(())
    }

    pub fn window(&self) -> Option<&Window> {
        self.surface.window()
    }

    pub fn size(&self) -> PhysicalSize<u32> {
        self.surface.size()
    }

    pub fn resize(&mut self, size: PhysicalSize<u32>) {
        self.surface.resize(size);
    }

    pub fn upload_texture(&mut self, label: &str, image: &RgbaImage) -> Result<TextureId> {
        let device = self.surface.device()?;
        let queue = self.surface.queue()?;
        let size = UVec2::from(image.dimensions());
        let gpu = GpuImage::from_rgba(device, queue, label, size, image.as_raw())?;
        Ok(self.pool.insert_image(gpu))
    }

    fn source_sizes(&self) -> HashMap<TextureSource, UVec2> {
        let targets = self.pool.targets().map(|(id, target)| (TextureSource::Target(id), target.size));
        let images = self.pool.images().map(|(id, image)| (TextureSource::Image(id), image.size));
        targets.chain(images).collect()
    }

    /// Draws one frame. Surface hiccups skip the frame instead of failing it.
    pub fn render(&mut self, list: &DrawList) -> Result<()> {
        let size = self.surface.size();
        if size.width == 0 || size.height == 0 {
            return Ok(());
        }
        let frame = match self.surface.acquire_surface_frame() {
            Ok(frame) => frame,
            Err(err) => {
                warn!(error = %err, "frame_skipped");
                return Ok(());
            }
        };

        let sources = self.source_sizes();
        let ctx = PlanContext {
            screen: UVec2::new(size.width, size.height),
            font: self.font.as_ref().map(|(font, _)| font),
            sources: &sources,
        };
        let plan = plan_frame(list, &ctx);
        let font_id = self.font.as_ref().map(|(_, id)| *id);

        let surface_format = self.surface.surface_format()?;
        let device = self.surface.device()?;
        let queue = self.surface.queue()?;
        self.models.begin_frame();
        self.overlay.begin_frame();

        let mut prepared = Vec::with_capacity(plan.passes.len());
        for pass in &plan.passes {
            let format = pass_format(pass.destination, surface_format);
            let mut ops = Vec::with_capacity(pass.ops.len());
            for op in &pass.ops {
                match op {
                    PassOp::Model(draw) => match self.models.prepare(device, format, draw) {
                        Ok(meshes) => ops.push(PreparedOp::Meshes(meshes)),
                        Err(err) => warn!(model = draw.model.0, error = %err, "model_draw_skipped"),
                    },
                    PassOp::Overlay(batch) => {
                        match self.overlay.prepare(device, format, batch, &self.pool, font_id) {
                            Ok(prepared) => ops.push(PreparedOp::Overlay(prepared)),
                            Err(err) => {
                                warn!(texture = ?batch.texture, error = %err, "overlay_batch_skipped")
                            }
                        }
                    }
                }
            }
            prepared.push(ops);
        }
        self.models.upload_uniforms(device, queue)?;
        self.overlay.upload(device, queue, &plan.vertices)?;

        let mut encoder =
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("Frame Encoder") });
        for (pass, ops) in plan.passes.iter().zip(&prepared) {
            let format = pass_format(pass.destination, surface_format);
            let (color_view, depth_view) = match pass.destination {
                PassDestination::Screen => (frame.view(), self.surface.depth_view()?),
                PassDestination::Target(id) => {
                    let target = self.pool.target(id).context("Render target vanished mid-frame")?;
                    (&target.color_view, &target.depth_view)
                }
            };
            let (load, depth_load) = match pass.clear {
                Some(color) => (wgpu::LoadOp::Clear(clear_color(color)), wgpu::LoadOp::Clear(1.0)),
                None => (wgpu::LoadOp::Load, wgpu::LoadOp::Load),
            };
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Frame Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: color_view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations { load, store: wgpu::StoreOp::Store },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: depth_view,
                    depth_ops: Some(wgpu::Operations { load: depth_load, store: wgpu::StoreOp::Store }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            for op in ops {
                match op {
                    PreparedOp::Meshes(meshes) => self.models.encode(&mut render_pass, format, meshes)?,
                    PreparedOp::Overlay(batch) => {
                        self.overlay.encode(&mut render_pass, format, std::slice::from_ref(batch))?
                    }
                }
            }
        }
        queue.submit(Some(encoder.finish()));
        frame.present();
        Ok(())
    }
}

fn pass_format(destination: PassDestination, surface_format: wgpu::TextureFormat) -> wgpu::TextureFormat {
    match destination {
        PassDestination::Screen => surface_format,
        PassDestination::Target(_) => TARGET_FORMAT,
    }
}

fn clear_color(color: Color) -> wgpu::Color {
    let [r, g, b, a] = color.to_array();
    wgpu::Color { r: r as f64, g: g as f64, b: b as f64, a: a as f64 }
}

impl TargetAllocator for GpuRenderer {
    fn create_target(&mut self, width: u32, height: u32) -> Result<RenderTargetId> {
        let device = self.surface.device()?;
        self.pool.create_target(device, UVec2::new(width, height))
    }

    fn destroy_target(&mut self, id: RenderTargetId) {
        if self.pool.destroy_target(id) {
            self.overlay.forget_target(id);
        } else {
            warn!(target_id = id.0, "destroy_unknown_target");
        }
    }
}

impl RenderHost for GpuRenderer {
    fn upload_model(&mut self, label: &str, model: &ModelData) -> Result<ModelId> {
        let device = self.surface.device()?;
        let queue = self.surface.queue()?;
        let id = self.models.upload(device, queue, label, model)?;
        info!(label, model = id.0, resident = self.models.model_count(), "model_uploaded");
        Ok(id)
    }

    fn upload_font(&mut self, font: &FontAtlas) -> Result<()> {
        let id = self.upload_texture("Font Atlas", font.image())?;
        self.font = Some((font.clone(), id));
        Ok(())
    }
}
