//! Immediate-mode drawing API.
//!
//! Everything the tutorial wants on screen is recorded into a [`DrawList`] as a flat sequence of
//! [`DrawCommand`]s. The GPU renderer replays the list once per frame; tests inspect it directly.

use glam::{Mat4, Vec2};
use smallvec::SmallVec;
use tracing::warn;

use crate::camera3d::Camera3D;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// Half-open hit test: the right and bottom edges are outside.
    pub fn contains(&self, point: Vec2) -> bool {
        point.x >= self.x
            && point.y >= self.y
            && point.x < self.x + self.width
            && point.y < self.y + self.height
    }

    /// Shrinks the rectangle by `amount` on every side.
    pub fn inset(&self, amount: f32) -> Self {
        Self::new(self.x + amount, self.y + amount, self.width - 2.0 * amount, self.height - 2.0 * amount)
    }

    pub fn top_left(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    pub fn top_right(&self) -> Vec2 {
        Vec2::new(self.x + self.width, self.y)
    }

    pub fn bottom_left(&self) -> Vec2 {
        Vec2::new(self.x, self.y + self.height)
    }

    pub fn bottom_right(&self) -> Vec2 {
        Vec2::new(self.x + self.width, self.y + self.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const WHITE: Color = Color::rgba(255, 255, 255, 255);
    pub const BLACK: Color = Color::rgba(0, 0, 0, 255);

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.r as f32 / 255.0, self.g as f32 / 255.0, self.b as f32 / 255.0, self.a as f32 / 255.0]
    }
}

/// The closed set of shader programs the renderer knows how to bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderKind {
    /// Unlit texture * material colour.
    Default,
    /// Lit, ordered-dither quantisation; animated by the `time` uniform.
    Dither,
    /// Full-screen post process drawing depth and UV discontinuity outlines.
    Outline,
}

impl ShaderKind {
    pub fn label(self) -> &'static str {
        match self {
            ShaderKind::Default => "default",
            ShaderKind::Dither => "dither",
            ShaderKind::Outline => "outline",
        }
    }

    /// Uniform names the shader exposes to [`DrawList::set_uniform`].
    pub fn uniform_names(self) -> &'static [&'static str] {
        match self {
            ShaderKind::Default => &[],
            ShaderKind::Dither => &[uniforms::TIME],
            ShaderKind::Outline => {
                &[uniforms::DEPTH_OUTLINE_ENABLED, uniforms::UV_OUTLINE_ENABLED, uniforms::RESOLUTION]
            }
        }
    }

    pub fn has_uniform(self, name: &str) -> bool {
        self.uniform_names().iter().any(|candidate| *candidate == name)
    }
}

pub mod uniforms {
    pub const TIME: &str = "time";
    pub const DEPTH_OUTLINE_ENABLED: &str = "depthOutlineEnabled";
    pub const UV_OUTLINE_ENABLED: &str = "uvOutlineEnabled";
    pub const RESOLUTION: &str = "resolution";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RenderTargetId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u32);

/// Where a textured draw samples from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureSource {
    /// Colour attachment of an off-screen target (depth is bound alongside for the outline shader).
    Target(RenderTargetId),
    Image(TextureId),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Vec2([f32; 2]),
}

/// Shader assignment per material slot of a model.
///
/// Slot 0 is the model's implicit default material; glTF material `i` lives in slot `i + 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialShaders {
    slots: SmallVec<[ShaderKind; 4]>,
    fallback: ShaderKind,
}

impl MaterialShaders {
    pub fn uniform(kind: ShaderKind) -> Self {
        Self { slots: SmallVec::new(), fallback: kind }
    }

    pub fn with_slot(mut self, slot: usize, kind: ShaderKind) -> Self {
        if self.slots.len() <= slot {
            self.slots.resize(slot + 1, self.fallback);
        }
        self.slots[slot] = kind;
        self
    }

    pub fn shader_for(&self, slot: usize) -> ShaderKind {
        self.slots.get(slot).copied().unwrap_or(self.fallback)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextStyle {
    /// Glyph height as a multiple of the font's base size.
    pub scale: f32,
    /// Extra horizontal pixels between glyphs (may be negative).
    pub spacing: f32,
    /// Extra vertical pixels between lines (may be negative).
    pub line_spacing: f32,
}

impl TextStyle {
    pub const BODY: TextStyle = TextStyle { scale: 2.0, spacing: -2.0, line_spacing: -6.0 };
}

impl Default for TextStyle {
    fn default() -> Self {
        Self::BODY
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    BeginTarget { target: RenderTargetId, clear: Color },
    EndTarget,
    BeginMode3D { camera: Camera3D },
    EndMode3D,
    BeginShader(ShaderKind),
    EndShader,
    SetBlend(bool),
    SetUniform { shader: ShaderKind, name: &'static str, value: UniformValue },
    Model { model: ModelId, shaders: MaterialShaders, transform: Mat4, tint: Color },
    Mesh { model: ModelId, mesh: usize, material_slot: usize, shader: ShaderKind, transform: Mat4 },
    /// Raylib-style textured blit: `src` is in texels, a negative width/height flips that axis.
    TexturePro { source: TextureSource, src: Rect, dst: Rect, tint: Color },
    Rect { rect: Rect, color: Color },
    RectLines { rect: Rect, thickness: f32, color: Color },
    Line { from: Vec2, to: Vec2, thickness: f32, color: Color },
    /// Text laid out inside `bounds`; a non-positive bounds width disables wrapping.
    Text { text: String, bounds: Rect, align: Vec2, style: TextStyle, color: Color },
}

#[derive(Debug, Default)]
pub struct DrawList {
    commands: Vec<DrawCommand>,
    target: Option<RenderTargetId>,
    shader: Option<ShaderKind>,
    mode_3d: bool,
}

impl DrawList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        if self.target.is_some() || self.shader.is_some() || self.mode_3d {
            warn!(
                target_open = self.target.is_some(),
                shader_open = self.shader.is_some(),
                mode_3d = self.mode_3d,
                "draw_list_cleared_with_open_scope"
            );
        }
        self.commands.clear();
        self.target = None;
        self.shader = None;
        self.mode_3d = false;
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn current_target(&self) -> Option<RenderTargetId> {
        self.target
    }

    pub fn current_shader(&self) -> Option<ShaderKind> {
        self.shader
    }

    pub fn begin_target(&mut self, target: RenderTargetId, clear: Color) {
        if let Some(open) = self.target {
            warn!(open = open.0, requested = target.0, "nested_render_target_ignored");
            return;
        }
        self.target = Some(target);
        self.commands.push(DrawCommand::BeginTarget { target, clear });
    }

    pub fn end_target(&mut self) {
        if self.target.take().is_none() {
            warn!("end_target_without_begin");
            return;
        }
        self.commands.push(DrawCommand::EndTarget);
    }

    pub fn begin_mode_3d(&mut self, camera: Camera3D) {
        self.mode_3d = true;
        self.commands.push(DrawCommand::BeginMode3D { camera });
    }

    pub fn end_mode_3d(&mut self) {
        if !self.mode_3d {
            warn!("end_mode_3d_without_begin");
            return;
        }
        self.mode_3d = false;
        self.commands.push(DrawCommand::EndMode3D);
    }

    pub fn begin_shader(&mut self, shader: ShaderKind) {
        self.shader = Some(shader);
        self.commands.push(DrawCommand::BeginShader(shader));
    }

    pub fn end_shader(&mut self) {
        if self.shader.take().is_none() {
            warn!("end_shader_without_begin");
            return;
        }
        self.commands.push(DrawCommand::EndShader);
    }

    pub fn set_blend(&mut self, enabled: bool) {
        self.commands.push(DrawCommand::SetBlend(enabled));
    }

    pub fn set_uniform(&mut self, shader: ShaderKind, name: &'static str, value: UniformValue) {
        if !shader.has_uniform(name) {
            warn!(shader = shader.label(), name, "unknown_uniform_ignored");
            return;
        }
        self.commands.push(DrawCommand::SetUniform { shader, name, value });
    }

    pub fn draw_model(&mut self, model: ModelId, shaders: MaterialShaders, transform: Mat4, tint: Color) {
        self.commands.push(DrawCommand::Model { model, shaders, transform, tint });
    }

    pub fn draw_mesh(
        &mut self,
        model: ModelId,
        mesh: usize,
        material_slot: usize,
        shader: ShaderKind,
        transform: Mat4,
    ) {
        self.commands.push(DrawCommand::Mesh { model, mesh, material_slot, shader, transform });
    }

    pub fn draw_texture_pro(&mut self, source: TextureSource, src: Rect, dst: Rect, tint: Color) {
        self.commands.push(DrawCommand::TexturePro { source, src, dst, tint });
    }

    pub fn draw_rect(&mut self, rect: Rect, color: Color) {
        self.commands.push(DrawCommand::Rect { rect, color });
    }

    pub fn draw_rect_lines(&mut self, rect: Rect, thickness: f32, color: Color) {
        self.commands.push(DrawCommand::RectLines { rect, thickness, color });
    }

    pub fn draw_line(&mut self, from: Vec2, to: Vec2, thickness: f32, color: Color) {
        self.commands.push(DrawCommand::Line { from, to, thickness, color });
    }

    pub fn draw_text(
        &mut self,
        text: impl Into<String>,
        bounds: Rect,
        align: Vec2,
        style: TextStyle,
        color: Color,
    ) {
        self.commands.push(DrawCommand::Text { text: text.into(), bounds, align, style, color });
    }
}
