//! CPU half of the renderer: replays a [`DrawList`] into render passes and overlay vertex batches.
//!
//! Off-screen targets are drawn with a vertically flipped projection so their rows are stored
//! bottom-up; blits that read them back with a negative source height come out upright.

use std::collections::HashMap;
use std::ops::Range;

use glam::{Mat4, UVec2, Vec2, Vec3};
use tracing::warn;

use crate::draw::{
    uniforms, Color, DrawCommand, DrawList, MaterialShaders, ModelId, Rect, RenderTargetId, ShaderKind,
    TextureSource, UniformValue,
};
use crate::font::FontAtlas;
use crate::text::layout_in_rect;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct OverlayVertex {
    pub position: [f32; 2],
    pub uv: [f32; 2],
    pub color: [f32; 4],
}

impl OverlayVertex {
    pub fn layout<'a>() -> wgpu::VertexBufferLayout<'a> {
        use wgpu::VertexFormat::{Float32x2, Float32x4};
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<OverlayVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute { offset: 0, shader_location: 0, format: Float32x2 },
                wgpu::VertexAttribute { offset: 8, shader_location: 1, format: Float32x2 },
                wgpu::VertexAttribute { offset: 16, shader_location: 2, format: Float32x4 },
            ],
        }
    }
}

/// Latest value of every shader uniform, captured per draw.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct UniformState {
    pub time: f32,
    pub depth_outline: f32,
    pub uv_outline: f32,
    pub resolution: [f32; 2],
}

impl UniformState {
    fn apply(&mut self, shader: ShaderKind, name: &str, value: UniformValue) {
        match (shader, name, value) {
            (ShaderKind::Dither, uniforms::TIME, UniformValue::Float(v)) => self.time = v,
            (ShaderKind::Outline, uniforms::DEPTH_OUTLINE_ENABLED, UniformValue::Float(v)) => {
                self.depth_outline = v
            }
            (ShaderKind::Outline, uniforms::UV_OUTLINE_ENABLED, UniformValue::Float(v)) => {
                self.uv_outline = v
            }
            (ShaderKind::Outline, uniforms::RESOLUTION, UniformValue::Vec2(v)) => self.resolution = v,
            _ => warn!(shader = shader.label(), name, ?value, "uniform_type_mismatch"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassDestination {
    Screen,
    Target(RenderTargetId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OverlayTexture {
    /// 1x1 white texel for untextured shapes.
    White,
    Font,
    Source(TextureSource),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OverlayProgram {
    Plain,
    /// Depth and UV edge detection over an off-screen target.
    Outline,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OverlayBatch {
    pub texture: OverlayTexture,
    pub program: OverlayProgram,
    pub blend: bool,
    /// Alpha is forced to 1; off-screen targets keep a UV key in alpha.
    pub opaque: bool,
    pub uniforms: UniformState,
    pub view_proj: Mat4,
    pub vertices: Range<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MeshSelection {
    All(MaterialShaders),
    One { mesh: usize, material_slot: usize, shader: ShaderKind },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelDraw {
    pub model: ModelId,
    pub selection: MeshSelection,
    pub transform: Mat4,
    pub tint: Color,
    pub view_proj: Mat4,
    pub uniforms: UniformState,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PassOp {
    Model(ModelDraw),
    Overlay(OverlayBatch),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedPass {
    pub destination: PassDestination,
    pub size: UVec2,
    /// `None` keeps what an earlier pass drew this frame.
    pub clear: Option<Color>,
    pub ops: Vec<PassOp>,
}

#[derive(Debug, Default)]
pub struct FramePlan {
    pub passes: Vec<PlannedPass>,
    pub vertices: Vec<OverlayVertex>,
}

/// Sizes of everything a frame may draw into or sample from.
pub struct PlanContext<'a> {
    pub screen: UVec2,
    pub font: Option<&'a FontAtlas>,
    pub sources: &'a HashMap<TextureSource, UVec2>,
}

impl PlanContext<'_> {
    fn source_size(&self, source: TextureSource) -> Option<UVec2> {
        self.sources.get(&source).copied()
    }
}

/// Maps pixel coordinates with a top-left origin to clip space; targets are flipped vertically.
pub fn overlay_projection(size: UVec2, flip: bool) -> Mat4 {
    let (w, h) = (size.x.max(1) as f32, size.y.max(1) as f32);
    let ortho = Mat4::orthographic_rh(0.0, w, h, 0.0, -1.0, 1.0);
    if flip {
        Mat4::from_scale(Vec3::new(1.0, -1.0, 1.0)) * ortho
    } else {
        ortho
    }
}

struct Planner<'a, 'b> {
    ctx: &'b PlanContext<'a>,
    plan: FramePlan,
    uniforms: UniformState,
    blend: bool,
    shader: Option<ShaderKind>,
    camera_view_proj: Option<Mat4>,
    /// Commands inside a target that could not be resolved are dropped until `EndTarget`.
    skipping: bool,
    screen_cleared: bool,
}

pub fn plan_frame(list: &DrawList, ctx: &PlanContext<'_>) -> FramePlan {
    let mut planner = Planner {
        ctx,
        plan: FramePlan::default(),
        uniforms: UniformState::default(),
        blend: true,
        shader: None,
        camera_view_proj: None,
        skipping: false,
        screen_cleared: false,
    };
    planner.open_screen_pass();
    for command in list.commands() {
        planner.record(command);
    }
    planner.plan.passes.retain(|pass| pass.clear.is_some() || !pass.ops.is_empty());
    planner.plan
}

impl Planner<'_, '_> {
    fn current_pass(&mut self) -> &mut PlannedPass {
        let last = self.plan.passes.len() - 1;
        &mut self.plan.passes[last]
    }

    fn open_screen_pass(&mut self) {
        let clear = if self.screen_cleared { None } else { Some(Color::WHITE) };
        self.screen_cleared = true;
        self.plan.passes.push(PlannedPass {
            destination: PassDestination::Screen,
            size: self.ctx.screen,
            clear,
            ops: Vec::new(),
        });
    }

    fn record(&mut self, command: &DrawCommand) {
        match command {
            DrawCommand::BeginTarget { target, clear } => {
                match self.ctx.source_size(TextureSource::Target(*target)) {
                    Some(size) => self.plan.passes.push(PlannedPass {
                        destination: PassDestination::Target(*target),
                        size,
                        clear: Some(*clear),
                        ops: Vec::new(),
                    }),
                    None => {
                        warn!(target_id = target.0, "unknown_render_target_skipped");
                        self.skipping = true;
                    }
                }
            }
            DrawCommand::EndTarget => {
                self.skipping = false;
                self.open_screen_pass();
            }
            _ if self.skipping => {}
            DrawCommand::BeginMode3D { camera } => {
                let pass = self.current_pass();
                let (size, flip) = (pass.size, pass.destination != PassDestination::Screen);
                let view_proj = camera.view_projection(size.x, size.y);
                self.camera_view_proj = Some(if flip {
                    Mat4::from_scale(Vec3::new(1.0, -1.0, 1.0)) * view_proj
                } else {
                    view_proj
                });
            }
            DrawCommand::EndMode3D => self.camera_view_proj = None,
            DrawCommand::BeginShader(shader) => self.shader = Some(*shader),
            DrawCommand::EndShader => self.shader = None,
            DrawCommand::SetBlend(enabled) => self.blend = *enabled,
            DrawCommand::SetUniform { shader, name, value } => self.uniforms.apply(*shader, name, *value),
            DrawCommand::Model { model, shaders, transform, tint } => {
                self.push_model(*model, MeshSelection::All(shaders.clone()), *transform, *tint)
            }
            DrawCommand::Mesh { model, mesh, material_slot, shader, transform } => {
                let selection =
                    MeshSelection::One { mesh: *mesh, material_slot: *material_slot, shader: *shader };
                self.push_model(*model, selection, *transform, Color::WHITE);
            }
            DrawCommand::TexturePro { source, src, dst, tint } => {
                self.push_texture(*source, *src, *dst, *tint)
            }
            DrawCommand::Rect { rect, color } => {
                let quad = quad(*rect, Rect::new(0.0, 0.0, 1.0, 1.0), *color);
                self.push_overlay(OverlayTexture::White, &quad);
            }
            DrawCommand::RectLines { rect, thickness, color } => {
                let mut vertices = Vec::with_capacity(24);
                for edge in rect_edges(*rect, *thickness) {
                    vertices.extend(quad(edge, Rect::new(0.0, 0.0, 1.0, 1.0), *color));
                }
                self.push_overlay(OverlayTexture::White, &vertices);
            }
            DrawCommand::Line { from, to, thickness, color } => {
                if let Some(vertices) = line_quad(*from, *to, *thickness, *color) {
                    self.push_overlay(OverlayTexture::White, &vertices);
                }
            }
            DrawCommand::Text { text, bounds, align, style, color } => {
                let Some(font) = self.ctx.font else {
                    return;
                };
                let atlas = UVec2::from(font.image().dimensions()).as_vec2();
                let scale = style.scale;
                let layout = layout_in_rect(font, text, *bounds, *align, style);
                let mut vertices = Vec::with_capacity(layout.glyphs.len() * 6);
                for placed in &layout.glyphs {
                    let Some(glyph) = font.glyph(placed.ch) else {
                        continue;
                    };
                    let r = glyph.rect;
                    let dst = Rect::new(placed.offset.x, placed.offset.y, r.width * scale, r.height * scale);
                    let uv = Rect::new(r.x / atlas.x, r.y / atlas.y, r.width / atlas.x, r.height / atlas.y);
                    vertices.extend(quad(dst, uv, *color));
                }
                self.push_overlay(OverlayTexture::Font, &vertices);
            }
        }
    }

    fn push_model(&mut self, model: ModelId, selection: MeshSelection, transform: Mat4, tint: Color) {
        let Some(view_proj) = self.camera_view_proj else {
            warn!(model = model.0, "model_draw_outside_3d_mode");
            return;
        };
        let uniforms = self.uniforms;
        self.current_pass().ops.push(PassOp::Model(ModelDraw {
            model,
            selection,
            transform,
            tint,
            view_proj,
            uniforms,
        }));
    }

    fn push_texture(&mut self, source: TextureSource, src: Rect, dst: Rect, tint: Color) {
        let Some(size) = self.ctx.source_size(source) else {
            warn!(?source, "unknown_texture_source_skipped");
            return;
        };
        let size = size.as_vec2();
        let (w, h) = (src.width.abs(), src.height.abs());
        let (mut u0, mut u1) = (src.x / size.x, (src.x + w) / size.x);
        let (mut v0, mut v1) = (src.y / size.y, (src.y + h) / size.y);
        if src.width < 0.0 {
            std::mem::swap(&mut u0, &mut u1);
        }
        if src.height < 0.0 {
            std::mem::swap(&mut v0, &mut v1);
        }
        let vertices = quad_uv(dst, [u0, v0, u1, v1], tint);
        self.push_overlay(OverlayTexture::Source(source), &vertices);
    }

    fn push_overlay(&mut self, texture: OverlayTexture, vertices: &[OverlayVertex]) {
        if vertices.is_empty() {
            return;
        }
        let reads_target = matches!(texture, OverlayTexture::Source(TextureSource::Target(_)));
        let program = match self.shader {
            Some(ShaderKind::Outline) if reads_target => OverlayProgram::Outline,
            _ => OverlayProgram::Plain,
        };
        let pass = self.current_pass();
        let view_proj = overlay_projection(pass.size, pass.destination != PassDestination::Screen);
        let start = self.plan.vertices.len() as u32;
        self.plan.vertices.extend_from_slice(vertices);
        let end = self.plan.vertices.len() as u32;

        let batch = OverlayBatch {
            texture,
            program,
            blend: self.blend,
            opaque: reads_target,
            uniforms: self.uniforms,
            view_proj,
            vertices: start..end,
        };
        let pass = self.current_pass();
        if let Some(PassOp::Overlay(last)) = pass.ops.last_mut() {
            let same_state = last.texture == batch.texture
                && last.program == batch.program
                && last.blend == batch.blend
                && last.uniforms == batch.uniforms
                && last.vertices.end == start;
            if same_state {
                last.vertices.end = end;
                return;
            }
        }
        pass.ops.push(PassOp::Overlay(batch));
    }
}

fn quad(dst: Rect, uv: Rect, color: Color) -> [OverlayVertex; 6] {
    quad_uv(dst, [uv.x, uv.y, uv.x + uv.width, uv.y + uv.height], color)
}

fn quad_uv(dst: Rect, [u0, v0, u1, v1]: [f32; 4], color: Color) -> [OverlayVertex; 6] {
    let color = color.to_array();
    let vertex = |x: f32, y: f32, u: f32, v: f32| OverlayVertex { position: [x, y], uv: [u, v], color };
    let (x0, y0, x1, y1) = (dst.x, dst.y, dst.x + dst.width, dst.y + dst.height);
    [
        vertex(x0, y0, u0, v0),
        vertex(x1, y0, u1, v0),
        vertex(x1, y1, u1, v1),
        vertex(x0, y0, u0, v0),
        vertex(x1, y1, u1, v1),
        vertex(x0, y1, u0, v1),
    ]
}

/// Top, bottom, left and right bars of a frame drawn inside `rect`.
fn rect_edges(rect: Rect, thickness: f32) -> [Rect; 4] {
    let t = thickness.min(rect.width / 2.0).min(rect.height / 2.0).max(0.0);
    [
        Rect::new(rect.x, rect.y, rect.width, t),
        Rect::new(rect.x, rect.y + rect.height - t, rect.width, t),
        Rect::new(rect.x, rect.y + t, t, rect.height - 2.0 * t),
        Rect::new(rect.x + rect.width - t, rect.y + t, t, rect.height - 2.0 * t),
    ]
}

fn line_quad(from: Vec2, to: Vec2, thickness: f32, color: Color) -> Option<[OverlayVertex; 6]> {
    let dir = (to - from).try_normalize()?;
    let n = dir.perp() * (thickness / 2.0);
    let color = color.to_array();
    let vertex = |p: Vec2| OverlayVertex { position: p.to_array(), uv: [0.5, 0.5], color };
    let (a, b, c, d) = (from + n, to + n, to - n, from - n);
    Some([vertex(a), vertex(b), vertex(c), vertex(a), vertex(c), vertex(d)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera3d::Camera3D;
    use crate::draw::TextStyle;

    fn context(sources: &HashMap<TextureSource, UVec2>) -> PlanContext<'_> {
        PlanContext { screen: UVec2::new(800, 450), font: None, sources }
    }

    fn sources() -> HashMap<TextureSource, UVec2> {
        HashMap::from([(TextureSource::Target(RenderTargetId(1)), UVec2::new(400, 225))])
    }

    #[test]
    fn target_scope_splits_screen_passes() {
        let sources = sources();
        let mut list = DrawList::new();
        list.begin_target(RenderTargetId(1), Color::WHITE);
        list.end_target();
        list.draw_rect(Rect::new(0.0, 0.0, 10.0, 10.0), Color::BLACK);
        let plan = plan_frame(&list, &context(&sources));

        let destinations: Vec<_> = plan.passes.iter().map(|pass| (pass.destination, pass.clear)).collect();
        assert_eq!(
            destinations,
            vec![
                (PassDestination::Screen, Some(Color::WHITE)),
                (PassDestination::Target(RenderTargetId(1)), Some(Color::WHITE)),
                (PassDestination::Screen, None),
            ]
        );
        assert_eq!(plan.passes[1].size, UVec2::new(400, 225));
    }

    #[test]
    fn flipped_blit_swaps_v_and_reads_target_opaquely() {
        let sources = sources();
        let mut list = DrawList::new();
        list.begin_shader(ShaderKind::Outline);
        list.draw_texture_pro(
            TextureSource::Target(RenderTargetId(1)),
            Rect::new(0.0, 0.0, 400.0, -225.0),
            Rect::new(0.0, 0.0, 800.0, 450.0),
            Color::WHITE,
        );
        list.end_shader();
        let plan = plan_frame(&list, &context(&sources));

        let PassOp::Overlay(batch) = &plan.passes[0].ops[0] else { panic!("overlay batch expected") };
        assert_eq!(batch.program, OverlayProgram::Outline);
        assert!(batch.opaque);
        let top_left = plan.vertices[batch.vertices.start as usize];
        assert_eq!(top_left.position, [0.0, 0.0]);
        assert_eq!(top_left.uv, [0.0, 1.0]);
    }

    #[test]
    fn consecutive_shapes_share_a_batch_until_state_changes() {
        let sources = sources();
        let mut list = DrawList::new();
        list.draw_rect(Rect::new(0.0, 0.0, 10.0, 10.0), Color::WHITE);
        list.draw_rect_lines(Rect::new(0.0, 0.0, 10.0, 10.0), 2.0, Color::BLACK);
        list.set_blend(false);
        list.draw_rect(Rect::new(0.0, 0.0, 10.0, 10.0), Color::WHITE);
        let plan = plan_frame(&list, &context(&sources));

        let ops = &plan.passes[0].ops;
        assert_eq!(ops.len(), 2);
        let PassOp::Overlay(first) = &ops[0] else { panic!("overlay batch expected") };
        assert_eq!(first.vertices, 0..30);
        assert_eq!(plan.vertices.len(), 36);
    }

    #[test]
    fn models_capture_uniforms_and_need_3d_mode() {
        let sources = sources();
        let camera = Camera3D::new(Vec3::new(0.0, 1.0, 4.0), Vec3::ZERO, 0.8, 0.01, 100.0);
        let mut list = DrawList::new();
        let dithered = MaterialShaders::uniform(ShaderKind::Dither);
        list.draw_model(ModelId(0), dithered.clone(), Mat4::IDENTITY, Color::WHITE);
        list.begin_target(RenderTargetId(1), Color::WHITE);
        list.begin_mode_3d(camera);
        list.set_uniform(ShaderKind::Dither, uniforms::TIME, UniformValue::Float(2.5));
        list.draw_model(ModelId(0), dithered, Mat4::IDENTITY, Color::WHITE);
        list.end_mode_3d();
        list.end_target();
        let plan = plan_frame(&list, &context(&sources));

        let models: Vec<&ModelDraw> = plan
            .passes
            .iter()
            .flat_map(|pass| &pass.ops)
            .filter_map(|op| match op {
                PassOp::Model(draw) => Some(draw),
                _ => None,
            })
            .collect();
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].uniforms.time, 2.5);
        let flipped = Mat4::from_scale(Vec3::new(1.0, -1.0, 1.0)) * camera.view_projection(400, 225);
        assert_eq!(models[0].view_proj, flipped);
    }

    #[test]
    fn text_without_font_is_dropped_and_rect_lines_stay_inside() {
        let sources = sources();
        let mut list = DrawList::new();
        list.draw_text("hi", Rect::new(0.0, 0.0, 100.0, 20.0), Vec2::ZERO, TextStyle::BODY, Color::WHITE);
        let plan = plan_frame(&list, &context(&sources));
        assert!(plan.vertices.is_empty());

        let edges = rect_edges(Rect::new(10.0, 10.0, 40.0, 40.0), 2.0);
        assert_eq!(edges[1], Rect::new(10.0, 48.0, 40.0, 2.0));
        assert_eq!(edges[3], Rect::new(48.0, 12.0, 2.0, 36.0));
    }
}
