//! Two-pass frame protocol: scene into an off-screen target, then a full-window composite.
//!
//! The pipeline only records into a [`DrawList`]; GPU resources for targets are provided by a
//! [`TargetAllocator`], which the wgpu renderer implements and tests fake.

use anyhow::Result;
use glam::Vec2;
use tracing::{debug, info};

use crate::camera3d::Camera3D;
use crate::draw::{uniforms, Color, DrawList, Rect, RenderTargetId, ShaderKind, TextureSource, UniformValue};
use crate::scene::SceneBinding;

pub const DEFAULT_TARGET_DIVISOR: u32 = 2;

/// Off-screen colour + depth target. Stored bottom-up, so blits flip it vertically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTarget {
    pub id: RenderTargetId,
    pub width: u32,
    pub height: u32,
}

impl RenderTarget {
    pub fn size(&self) -> Vec2 {
        Vec2::new(self.width as f32, self.height as f32)
    }
}

pub trait TargetAllocator {
    fn create_target(&mut self, width: u32, height: u32) -> Result<RenderTargetId>;
    fn destroy_target(&mut self, id: RenderTargetId);
}

#[derive(Debug)]
pub struct RenderPipeline {
    divisor: u32,
    target: Option<RenderTarget>,
    selection: Option<ShaderKind>,
    bypass: bool,
}

impl RenderPipeline {
    pub fn new(divisor: u32) -> Self {
        Self { divisor: divisor.max(1), target: None, selection: None, bypass: false }
    }

    pub fn target_size_for(&self, window_width: u32, window_height: u32) -> (u32, u32) {
        (window_width / self.divisor, window_height / self.divisor)
    }

    /// Recreates the target when the window-derived size changed since the last frame.
    ///
    /// Returns `None` while the window is too small to hold a target (e.g. minimised).
    pub fn ensure_target(
        &mut self,
        allocator: &mut dyn TargetAllocator,
        window_width: u32,
        window_height: u32,
    ) -> Result<Option<RenderTarget>> {
        let (width, height) = self.target_size_for(window_width, window_height);
        if width == 0 || height == 0 {
            return Ok(None);
        }
        if let Some(target) = self.target {
            if target.width == width && target.height == height {
                return Ok(Some(target));
            }
        }
        if let Some(old) = self.target.take() {
            allocator.destroy_target(old.id);
        }
        let id = allocator.create_target(width, height)?;
        info!(width, height, "render_target_recreated");
        let target = RenderTarget { id, width, height };
        self.target = Some(target);
        Ok(Some(target))
    }

    /// Records the scene pass and stores the post-process shader the scene asked for.
    pub fn draw_scene(
        &mut self,
        draw: &mut DrawList,
        target: RenderTarget,
        camera: Camera3D,
        scene: &SceneBinding,
        elapsed_seconds: f32,
    ) {
        draw.begin_target(target.id, Color::WHITE);
        // Alpha carries the UV key the outline pass reads, so it must not be blended away.
        draw.set_blend(false);
        draw.begin_mode_3d(camera);
        self.selection = scene.draw(draw, elapsed_seconds);
        draw.end_mode_3d();
        draw.end_target();
        draw.set_blend(true);
    }

    /// Blits the whole target over the window, through the selected shader unless bypassed.
    pub fn composite(&self, draw: &mut DrawList, target: RenderTarget, screen: Vec2) {
        let size = target.size();
        draw.set_uniform(ShaderKind::Outline, uniforms::RESOLUTION, UniformValue::Vec2(size.to_array()));
        let shader = self.active_post_process();
        if let Some(shader) = shader {
            draw.begin_shader(shader);
        }
        draw.draw_texture_pro(
            TextureSource::Target(target.id),
            Rect::new(0.0, 0.0, size.x, -size.y),
            Rect::new(0.0, 0.0, screen.x, screen.y),
            Color::WHITE,
        );
        if shader.is_some() {
            draw.end_shader();
        }
    }

    pub fn target(&self) -> Option<RenderTarget> {
        self.target
    }

    /// Shader chosen by the scene that ran most recently.
    pub fn selection(&self) -> Option<ShaderKind> {
        self.selection
    }

    pub fn active_post_process(&self) -> Option<ShaderKind> {
        if self.bypass {
            None
        } else {
            self.selection
        }
    }

    pub fn toggle_bypass(&mut self) {
        self.bypass = !self.bypass;
        debug!(bypass = self.bypass, "post_process_bypass_toggled");
    }

    pub fn is_bypassed(&self) -> bool {
        self.bypass
    }

    pub fn release(&mut self, allocator: &mut dyn TargetAllocator) {
        if let Some(target) = self.target.take() {
            allocator.destroy_target(target.id);
        }
    }
}

impl Default for RenderPipeline {
    fn default() -> Self {
        Self::new(DEFAULT_TARGET_DIVISOR)
    }
}
