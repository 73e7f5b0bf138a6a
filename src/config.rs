use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::camera3d::OrbitConfig;

pub const DEFAULT_CONFIG_PATH: &str = "config/app.json";

#[derive(Debug, Clone, Deserialize)]
pub struct WindowConfig {
    #[serde(default = "WindowConfig::default_title")]
    pub title: String,
    #[serde(default = "WindowConfig::default_width")]
    pub width: u32,
    #[serde(default = "WindowConfig::default_height")]
    pub height: u32,
    #[serde(default = "WindowConfig::default_vsync")]
    pub vsync: bool,
    #[serde(default)]
    pub fullscreen: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TutorialConfig {
    /// Step the sequencer starts on.
    #[serde(default)]
    pub start_step: i32,
    /// Off-screen target is `window / target_divisor` on each axis.
    #[serde(default = "TutorialConfig::default_target_divisor")]
    pub target_divisor: u32,
    #[serde(default = "TutorialConfig::default_max_actions")]
    pub max_actions: usize,
    /// Byte budget of the action payload arena.
    #[serde(default = "TutorialConfig::default_arena_capacity")]
    pub arena_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssetPaths {
    #[serde(default = "AssetPaths::default_intro_model")]
    pub intro_model: PathBuf,
    #[serde(default = "AssetPaths::default_sample_objects")]
    pub sample_objects: PathBuf,
    #[serde(default = "AssetPaths::default_flat_vector_scene")]
    pub flat_vector_scene: PathBuf,
    #[serde(default = "AssetPaths::default_flat_vector_scene_outlines")]
    pub flat_vector_scene_outlines: PathBuf,
    #[serde(default = "AssetPaths::default_font")]
    pub font: PathBuf,
}

/// Layout of the key-colour separated bitmap font.
#[derive(Debug, Clone, Deserialize)]
pub struct FontConfig {
    /// Codepoint of the first glyph in the atlas.
    #[serde(default = "FontConfig::default_first_char")]
    pub first_char: u32,
    /// RGBA colour separating glyphs in the atlas image.
    #[serde(default = "FontConfig::default_key_color")]
    pub key_color: [u8; 4],
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub tutorial: TutorialConfig,
    #[serde(default)]
    pub camera: OrbitConfig,
    #[serde(default)]
    pub assets: AssetPaths,
    #[serde(default)]
    pub font: FontConfig,
}

#[derive(Debug, Clone, Default)]
pub struct AppConfigOverrides {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub vsync: Option<bool>,
    pub start_step: Option<i32>,
}

impl WindowConfig {
    fn default_title() -> String {
        "Dithering & Outlining howto".to_string()
    }

    const fn default_width() -> u32 {
        800
    }

    const fn default_height() -> u32 {
        450
    }

    const fn default_vsync() -> bool {
        true
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: Self::default_title(),
            width: Self::default_width(),
            height: Self::default_height(),
            vsync: Self::default_vsync(),
            fullscreen: false,
        }
    }
}

impl TutorialConfig {
    const fn default_target_divisor() -> u32 {
        2
    }

    const fn default_max_actions() -> usize {
        128
    }

    const fn default_arena_capacity() -> usize {
        2048
    }
}

impl Default for TutorialConfig {
    fn default() -> Self {
        Self {
            start_step: 0,
            target_divisor: Self::default_target_divisor(),
            max_actions: Self::default_max_actions(),
            arena_capacity: Self::default_arena_capacity(),
        }
    }
}

impl AssetPaths {
    fn default_intro_model() -> PathBuf {
        PathBuf::from("resources/polyobjects.glb")
    }

    fn default_sample_objects() -> PathBuf {
        PathBuf::from("resources/sampleObjects.glb")
    }

    fn default_flat_vector_scene() -> PathBuf {
        PathBuf::from("resources/flat-vector-scene.glb")
    }

    fn default_flat_vector_scene_outlines() -> PathBuf {
        PathBuf::from("resources/flat-vector-scene-outlines.glb")
    }

    fn default_font() -> PathBuf {
        PathBuf::from("resources/fnt_medium.png")
    }
}

impl Default for AssetPaths {
    fn default() -> Self {
        Self {
            intro_model: Self::default_intro_model(),
            sample_objects: Self::default_sample_objects(),
            flat_vector_scene: Self::default_flat_vector_scene(),
            flat_vector_scene_outlines: Self::default_flat_vector_scene_outlines(),
            font: Self::default_font(),
        }
    }
}

impl FontConfig {
    const fn default_first_char() -> u32 {
        32
    }

    const fn default_key_color() -> [u8; 4] {
        [255, 0, 255, 255]
    }
}

impl Default for FontConfig {
    fn default() -> Self {
        Self { first_char: Self::default_first_char(), key_color: Self::default_key_color() }
    }
}

impl AppConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes =
            fs::read(path).with_context(|| format!("Failed to read config file {}", path.display()))?;
        let cfg = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(cfg)
    }

    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                warn!(path = %path.display(), error = ?err, "config_fallback_to_defaults");
                Self::default()
            }
        }
    }

    pub fn apply_overrides(&mut self, overrides: &AppConfigOverrides) {
        if let Some(width) = overrides.width {
            self.window.width = width;
        }
        if let Some(height) = overrides.height {
            self.window.height = height;
        }
        if let Some(vsync) = overrides.vsync {
            self.window.vsync = vsync;
        }
        if let Some(step) = overrides.start_step {
            self.tutorial.start_step = step;
        }
    }
}

impl AppConfigOverrides {
    pub fn is_empty(&self) -> bool {
        self.width.is_none() && self.height.is_none() && self.vsync.is_none() && self.start_step.is_none()
    }

    pub fn applied_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.width.is_some() {
            fields.push("width");
        }
        if self.height.is_some() {
            fields.push("height");
        }
        if self.vsync.is_some() {
            fields.push("vsync");
        }
        if self.start_step.is_some() {
            fields.push("step");
        }
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_object_yields_defaults() {
        let cfg: AppConfig = serde_json::from_str("{}").expect("parse");
        assert_eq!(cfg.window.width, 800);
        assert_eq!(cfg.window.height, 450);
        assert_eq!(cfg.tutorial.target_divisor, 2);
        assert_eq!(cfg.tutorial.max_actions, 128);
        assert_eq!(cfg.tutorial.arena_capacity, 2048);
        assert_eq!(cfg.camera.min_distance, 2.5);
        assert_eq!(cfg.font.first_char, 32);
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let cfg: AppConfig =
            serde_json::from_str(r#"{ "window": { "width": 1024 }, "camera": { "max_distance": 12.0 } }"#)
                .expect("parse");
        assert_eq!(cfg.window.width, 1024);
        assert_eq!(cfg.window.height, 450);
        assert_eq!(cfg.camera.max_distance, 12.0);
        assert_eq!(cfg.camera.min_distance, 2.5);
    }

    #[test]
    fn invalid_file_falls_back_to_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, "{{ not json").expect("write");
        let cfg = AppConfig::load_or_default(file.path());
        assert_eq!(cfg.window.title, "Dithering & Outlining howto");
    }

    #[test]
    fn overrides_apply_on_top() {
        let mut cfg = AppConfig::default();
        let overrides = AppConfigOverrides {
            width: Some(1600),
            vsync: Some(false),
            start_step: Some(7),
            ..Default::default()
        };
        cfg.apply_overrides(&overrides);
        assert_eq!(cfg.window.width, 1600);
        assert!(!cfg.window.vsync);
        assert_eq!(cfg.tutorial.start_step, 7);
        assert_eq!(overrides.applied_fields(), vec!["width", "vsync", "step"]);
    }
}
