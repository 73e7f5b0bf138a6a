//! What the off-screen pass draws, and which post process the composite uses afterwards.

use glam::Mat4;

use crate::draw::{uniforms, Color, DrawList, MaterialShaders, ModelId, ShaderKind, UniformValue};

/// How one outline axis (depth or UV) behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutlineMode {
    #[default]
    Off,
    /// On for the second half of every second.
    Blinking,
    On,
}

impl OutlineMode {
    /// `0` and below is off, `1` blinks, anything larger is always on.
    pub fn from_level(level: i32) -> Self {
        match level {
            i32::MIN..=0 => OutlineMode::Off,
            1 => OutlineMode::Blinking,
            _ => OutlineMode::On,
        }
    }

    pub fn enabled(self, blink: bool) -> bool {
        match self {
            OutlineMode::Off => false,
            OutlineMode::Blinking => blink,
            OutlineMode::On => true,
        }
    }
}

pub fn blink_phase(elapsed_seconds: f32) -> bool {
    elapsed_seconds.rem_euclid(1.0) > 0.5
}

fn flag(enabled: bool) -> UniformValue {
    UniformValue::Float(if enabled { 1.0 } else { 0.0 })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutlineSceneConfig {
    pub model: ModelId,
    pub depth: OutlineMode,
    pub uv: OutlineMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneBinding {
    /// Every material dithered, both outline axes forced on.
    Dithered { model: ModelId },
    /// Material slot 1 dithered, outline axes driven by their modes.
    Outlined(OutlineSceneConfig),
    /// Material slot 1 with the default shader and no post process.
    Simple { model: ModelId },
}

impl SceneBinding {
    pub fn model(&self) -> ModelId {
        match self {
            SceneBinding::Dithered { model } | SceneBinding::Simple { model } => *model,
            SceneBinding::Outlined(config) => config.model,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SceneBinding::Dithered { .. } => "dithered",
            SceneBinding::Outlined(_) => "outlined",
            SceneBinding::Simple { .. } => "simple",
        }
    }

    /// Records this frame's scene into `draw` and returns the post-process shader for the composite.
    pub fn draw(&self, draw: &mut DrawList, elapsed_seconds: f32) -> Option<ShaderKind> {
        match *self {
            SceneBinding::Dithered { model } => {
                draw.set_uniform(ShaderKind::Dither, uniforms::TIME, UniformValue::Float(elapsed_seconds));
                draw.set_uniform(ShaderKind::Outline, uniforms::DEPTH_OUTLINE_ENABLED, flag(true));
                draw.set_uniform(ShaderKind::Outline, uniforms::UV_OUTLINE_ENABLED, flag(true));
                let shaders = MaterialShaders::uniform(ShaderKind::Dither);
                draw.draw_model(model, shaders, Mat4::IDENTITY, Color::WHITE);
                Some(ShaderKind::Outline)
            }
            SceneBinding::Outlined(config) => {
                let blink = blink_phase(elapsed_seconds);
                let (depth, uv) = (config.depth.enabled(blink), config.uv.enabled(blink));
                draw.set_uniform(ShaderKind::Outline, uniforms::DEPTH_OUTLINE_ENABLED, flag(depth));
                draw.set_uniform(ShaderKind::Outline, uniforms::UV_OUTLINE_ENABLED, flag(uv));
                let shaders = MaterialShaders::uniform(ShaderKind::Default).with_slot(1, ShaderKind::Dither);
                draw.draw_model(config.model, shaders, Mat4::IDENTITY, Color::WHITE);
                Some(ShaderKind::Outline)
            }
            SceneBinding::Simple { model } => {
                let shaders = MaterialShaders::uniform(ShaderKind::Default);
                draw.draw_model(model, shaders, Mat4::IDENTITY, Color::WHITE);
                None
            }
        }
    }
}
