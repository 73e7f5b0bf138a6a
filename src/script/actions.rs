use std::borrow::Cow;
use std::mem::size_of_val;

use glam::{Mat4, Vec2};
use tracing::{debug, info};

use super::StepCursor;
use crate::camera3d::Camera3D;
use crate::draw::{Color, DrawList, ModelId, Rect, ShaderKind, TextStyle, TextureSource};
use crate::input::InputSnapshot;
use crate::render_pipeline::RenderTarget;
use crate::scene::SceneBinding;

pub const NAV_BUTTON_SIZE: f32 = 40.0;
/// Distance of the "next" button's top-left corner from the bottom-right window corner.
pub const NAV_BUTTON_MARGIN: f32 = 64.0;
pub const NAV_BUTTON_GAP: f32 = 4.0;

/// Everything an action may read or mutate while it runs.
pub struct ActionContext<'a> {
    pub draw: &'a mut DrawList,
    pub input: &'a InputSnapshot,
    pub screen: Vec2,
    pub scene: &'a mut SceneBinding,
    pub target: Option<RenderTarget>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextBoxData {
    pub title: Cow<'static, str>,
    pub body: Cow<'static, str>,
    pub rect: Rect,
}

impl TextBoxData {
    pub fn new(title: impl Into<Cow<'static, str>>, body: impl Into<Cow<'static, str>>, rect: Rect) -> Self {
        Self { title: title.into(), body: body.into(), rect }
    }
}

/// Magnified inset of part of the off-screen target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MagnifierData {
    /// Source region as fractions of the target size, top-left origin.
    pub src: Rect,
    pub dst: Rect,
    pub shader: ShaderKind,
}

impl MagnifierData {
    /// `src` is given in target pixels for a target of `target_size`.
    pub fn new(src: Rect, target_size: Vec2, dst: Rect, shader: ShaderKind) -> Self {
        let src = Rect::new(
            src.x / target_size.x,
            src.y / target_size.y,
            src.width / target_size.x,
            src.height / target_size.y,
        );
        Self { src, dst, shader }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavigateData {
    pub prev: i32,
    pub next: i32,
    /// Offsets are added to the current step instead of being used as absolute steps.
    pub relative: bool,
}

impl NavigateData {
    fn resolve(&self, current: i32, value: i32) -> i32 {
        if self.relative {
            current + value
        } else {
            value
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawMeshData {
    pub model: ModelId,
    pub mesh: usize,
    pub material_slot: usize,
    pub shader: ShaderKind,
    pub transform: Mat4,
    pub camera: Camera3D,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawTextureData {
    pub texture: TextureSource,
    pub src: Rect,
    pub dst: Rect,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActionKind {
    DrawTextBox(TextBoxData),
    DrawMagnifier(MagnifierData),
    SetSceneBinding(SceneBinding),
    Navigate(NavigateData),
    DrawMesh(DrawMeshData),
    DrawTexture(DrawTextureData),
}

impl ActionKind {
    pub fn label(&self) -> &'static str {
        match self {
            ActionKind::DrawTextBox(_) => "draw_text_box",
            ActionKind::DrawMagnifier(_) => "draw_magnifier",
            ActionKind::SetSceneBinding(_) => "set_scene_binding",
            ActionKind::Navigate(_) => "navigate",
            ActionKind::DrawMesh(_) => "draw_mesh",
            ActionKind::DrawTexture(_) => "draw_texture",
        }
    }

    /// Inline size of the payload, before arena alignment.
    pub fn footprint(&self) -> usize {
        match self {
            ActionKind::DrawTextBox(data) => size_of_val(data),
            ActionKind::DrawMagnifier(data) => size_of_val(data),
            ActionKind::SetSceneBinding(data) => size_of_val(data),
            ActionKind::Navigate(data) => size_of_val(data),
            ActionKind::DrawMesh(data) => size_of_val(data),
            ActionKind::DrawTexture(data) => size_of_val(data),
        }
    }

    pub fn run(&self, cursor: &mut StepCursor, ctx: &mut ActionContext<'_>) {
        match self {
            ActionKind::DrawTextBox(data) => draw_text_box(ctx.draw, data),
            ActionKind::DrawMagnifier(data) => {
                if let Some(target) = ctx.target {
                    draw_magnifier(ctx.draw, data, target, ctx.screen);
                }
            }
            ActionKind::SetSceneBinding(binding) => {
                if *ctx.scene != *binding {
                    debug!(from = ctx.scene.label(), to = binding.label(), "scene_binding_changed");
                }
                *ctx.scene = *binding;
            }
            ActionKind::Navigate(data) => navigate(cursor, ctx, data),
            ActionKind::DrawMesh(data) => {
                ctx.draw.begin_mode_3d(data.camera);
                ctx.draw.begin_shader(data.shader);
                ctx.draw.draw_mesh(data.model, data.mesh, data.material_slot, data.shader, data.transform);
                ctx.draw.end_shader();
                ctx.draw.end_mode_3d();
            }
            ActionKind::DrawTexture(data) => {
                ctx.draw.draw_texture_pro(data.texture, data.src, data.dst, Color::WHITE);
            }
        }
    }
}

fn draw_text_box(draw: &mut DrawList, data: &TextBoxData) {
    let rect = data.rect;
    draw.draw_rect(rect, Color::WHITE);
    draw.draw_rect_lines(rect, 1.0, Color::BLACK);
    draw.draw_rect_lines(rect.inset(1.0), 1.0, Color::BLACK);
    let title_bounds = Rect::new(rect.x + 6.0, rect.y + 6.0, rect.width - 12.0, rect.height - 12.0);
    draw.draw_text(data.title.as_ref(), title_bounds, Vec2::new(0.5, 0.0), TextStyle::BODY, Color::WHITE);
    let body_bounds = Rect::new(rect.x + 6.0, rect.y + 32.0, rect.width - 12.0, rect.height - 36.0);
    draw.draw_text(data.body.as_ref(), body_bounds, Vec2::ZERO, TextStyle::BODY, Color::WHITE);
}

/// White 4 px frame under a black 2 px frame, both around `rect`.
fn draw_framed(draw: &mut DrawList, rect: Rect) {
    let outer = Rect::new(rect.x - 1.0, rect.y - 1.0, rect.width + 2.0, rect.height + 2.0);
    draw.draw_rect_lines(outer, 4.0, Color::WHITE);
    draw.draw_rect_lines(rect, 2.0, Color::BLACK);
}

fn draw_magnifier(draw: &mut DrawList, data: &MagnifierData, target: RenderTarget, screen: Vec2) {
    let size = target.size();
    // Targets are stored bottom-up: address the region from the bottom and flip it.
    let src_texels = Rect::new(
        data.src.x * size.x,
        (1.0 - data.src.y - data.src.height) * size.y,
        data.src.width * size.x,
        -data.src.height * size.y,
    );
    let src_screen = Rect::new(
        data.src.x * screen.x,
        data.src.y * screen.y,
        data.src.width * screen.x,
        data.src.height * screen.y,
    );
    let dst = data.dst;

    draw_framed(draw, src_screen);
    let connectors = [
        (src_screen.top_left(), dst.top_left()),
        (src_screen.top_right(), dst.top_right()),
        (src_screen.bottom_left(), dst.bottom_left()),
        (src_screen.bottom_right(), dst.bottom_right()),
    ];
    for (thickness, color) in [(4.0, Color::WHITE), (2.0, Color::BLACK)] {
        for (from, to) in connectors {
            draw.draw_line(from, to, thickness, color);
        }
    }

    draw.set_blend(false);
    draw.begin_shader(data.shader);
    draw.draw_texture_pro(TextureSource::Target(target.id), src_texels, dst, Color::WHITE);
    draw.end_shader();
    draw.set_blend(true);

    draw_framed(draw, dst);
}

fn draw_nav_button(draw: &mut DrawList, rect: Rect, glyph: &'static str) {
    draw.draw_rect(rect, Color::WHITE);
    draw.draw_rect_lines(rect, 2.0, Color::BLACK);
    let anchor = Rect::new(rect.x + rect.width / 2.0 - 4.0, rect.y + 6.0, 0.0, 0.0);
    draw.draw_text(glyph, anchor, Vec2::ZERO, TextStyle::BODY, Color::WHITE);
}

fn navigate(cursor: &mut StepCursor, ctx: &mut ActionContext<'_>, data: &NavigateData) {
    let input = ctx.input;
    let screen = ctx.screen.floor();
    let next_box = Rect::new(
        screen.x - NAV_BUTTON_MARGIN,
        screen.y - NAV_BUTTON_MARGIN,
        NAV_BUTTON_SIZE,
        NAV_BUTTON_SIZE,
    );
    let prev_box = Rect::new(
        next_box.x - NAV_BUTTON_SIZE - NAV_BUTTON_GAP,
        next_box.y,
        NAV_BUTTON_SIZE,
        NAV_BUTTON_SIZE,
    );
    let clicked = |rect: Rect| input.left_released && rect.contains(input.cursor);

    draw_nav_button(ctx.draw, next_box, ">");
    if clicked(next_box) || input.next_released {
        let step = data.resolve(cursor.current(), data.next);
        info!(step, "next_step");
        cursor.jump_to(step);
    }

    draw_nav_button(ctx.draw, prev_box, "<");
    if clicked(prev_box) || input.prev_released {
        let step = data.resolve(cursor.current(), data.prev);
        info!(step, "prev_step");
        cursor.jump_to(step);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draw::{DrawCommand, RenderTargetId};

    struct Harness {
        draw: DrawList,
        scene: SceneBinding,
        input: InputSnapshot,
        target: Option<RenderTarget>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                draw: DrawList::new(),
                scene: SceneBinding::Simple { model: ModelId(0) },
                input: InputSnapshot::default(),
                target: Some(RenderTarget { id: RenderTargetId(1), width: 400, height: 200 }),
            }
        }

        fn run(&mut self, action: &ActionKind, step: i32) -> StepCursor {
            let mut cursor = StepCursor::new(step);
            let mut ctx = ActionContext {
                draw: &mut self.draw,
                input: &self.input,
                screen: Vec2::new(800.0, 450.0),
                scene: &mut self.scene,
                target: self.target,
            };
            action.run(&mut cursor, &mut ctx);
            cursor
        }
    }

    fn relative_nav() -> ActionKind {
        ActionKind::Navigate(NavigateData { prev: -1, next: 1, relative: true })
    }

    #[test]
    fn text_box_frames_and_aligns_title() {
        let mut harness = Harness::new();
        let rect = Rect::new(10.0, 10.0, 200.0, 100.0);
        harness.run(&ActionKind::DrawTextBox(TextBoxData::new("Title", "Body", rect)), 0);
        let commands = harness.draw.commands();
        assert_eq!(commands[0], DrawCommand::Rect { rect, color: Color::WHITE });
        assert!(matches!(
            &commands[3],
            DrawCommand::Text { text, bounds, align, .. }
                if text == "Title" && *bounds == Rect::new(16.0, 16.0, 188.0, 88.0) && align.x == 0.5
        ));
        assert!(matches!(
            &commands[4],
            DrawCommand::Text { text, bounds, .. }
                if text == "Body" && *bounds == Rect::new(16.0, 42.0, 188.0, 64.0)
        ));
    }

    #[test]
    fn next_button_click_advances_relative() {
        let mut harness = Harness::new();
        harness.input.left_released = true;
        harness.input.cursor = Vec2::new(800.0 - 64.0 + 5.0, 450.0 - 64.0 + 5.0);
        let cursor = harness.run(&relative_nav(), 4);
        assert_eq!((cursor.current(), cursor.next()), (4, 5));
    }

    #[test]
    fn prev_button_sits_left_of_next() {
        let mut harness = Harness::new();
        harness.input.left_released = true;
        harness.input.cursor = Vec2::new(800.0 - 64.0 - 44.0 + 1.0, 450.0 - 64.0 + 1.0);
        let cursor = harness.run(&relative_nav(), 4);
        assert_eq!(cursor.next(), 3);
    }

    #[test]
    fn click_outside_buttons_and_held_button_do_nothing() {
        let mut harness = Harness::new();
        harness.input.left_released = true;
        harness.input.cursor = Vec2::new(20.0, 20.0);
        assert_eq!(harness.run(&relative_nav(), 2).next(), 2);

        harness.input.left_released = false;
        harness.input.left_held = true;
        harness.input.cursor = Vec2::new(800.0 - 60.0, 450.0 - 60.0);
        assert_eq!(harness.run(&relative_nav(), 2).next(), 2);
    }

    #[test]
    fn absolute_navigation_ignores_current_step() {
        let mut harness = Harness::new();
        harness.input.prev_released = true;
        let action = ActionKind::Navigate(NavigateData { prev: 0, next: 9, relative: false });
        assert_eq!(harness.run(&action, 6).next(), 0);
    }

    #[test]
    fn set_scene_binding_replaces_scene() {
        let mut harness = Harness::new();
        let binding = SceneBinding::Dithered { model: ModelId(4) };
        harness.run(&ActionKind::SetSceneBinding(binding), 0);
        assert_eq!(harness.scene, binding);
        assert!(harness.draw.is_empty());
    }

    #[test]
    fn magnifier_samples_flipped_sub_rect_without_blending() {
        let mut harness = Harness::new();
        let data = MagnifierData::new(
            Rect::new(100.0, 50.0, 50.0, 50.0),
            Vec2::new(400.0, 200.0),
            Rect::new(500.0, 20.0, 200.0, 200.0),
            ShaderKind::Outline,
        );
        harness.run(&ActionKind::DrawMagnifier(data), 2);
        let commands = harness.draw.commands();
        let blit = commands
            .iter()
            .position(|c| matches!(c, DrawCommand::TexturePro { .. }))
            .expect("magnified blit");
        assert_eq!(commands[blit - 2], DrawCommand::SetBlend(false));
        assert_eq!(commands[blit - 1], DrawCommand::BeginShader(ShaderKind::Outline));
        assert_eq!(commands[blit + 2], DrawCommand::SetBlend(true));
        let DrawCommand::TexturePro { src, dst, .. } = &commands[blit] else { unreachable!() };
        assert_eq!(*src, Rect::new(100.0, 100.0, 50.0, -50.0));
        assert_eq!(*dst, Rect::new(500.0, 20.0, 200.0, 200.0));
        let lines = commands.iter().filter(|c| matches!(c, DrawCommand::Line { .. })).count();
        assert_eq!(lines, 8);
    }

    #[test]
    fn magnifier_without_target_draws_nothing() {
        let mut harness = Harness::new();
        harness.target = None;
        let data = MagnifierData::new(
            Rect::new(0.0, 0.0, 10.0, 10.0),
            Vec2::new(400.0, 225.0),
            Rect::new(0.0, 0.0, 50.0, 50.0),
            ShaderKind::Outline,
        );
        harness.run(&ActionKind::DrawMagnifier(data), 0);
        assert!(harness.draw.is_empty());
    }

    #[test]
    fn draw_mesh_scopes_its_own_shader_and_3d_mode() {
        let mut harness = Harness::new();
        let camera = Camera3D::new(glam::Vec3::new(0.0, 0.0, 3.0), glam::Vec3::ZERO, 0.8, 0.01, 100.0);
        let action = ActionKind::DrawMesh(DrawMeshData {
            model: ModelId(2),
            mesh: 0,
            material_slot: 1,
            shader: ShaderKind::Dither,
            transform: Mat4::IDENTITY,
            camera,
        });
        harness.run(&action, 0);
        let commands = harness.draw.commands();
        assert_eq!(commands.len(), 5);
        assert_eq!(commands[0], DrawCommand::BeginMode3D { camera });
        assert_eq!(commands[4], DrawCommand::EndMode3D);
        assert!(harness.draw.current_shader().is_none());
    }
}
