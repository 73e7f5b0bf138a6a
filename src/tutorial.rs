//! The dithering and outlining walkthrough.
//!
//! [`Tutorial`] owns every piece of mutable state the frame touches: the step sequencer, the
//! render pipeline, the orbit camera and the active scene binding. A host calls [`Tutorial::init`]
//! once, [`Tutorial::update`] every frame and [`Tutorial::deinit`] on shutdown.

mod lessons;

use std::path::Path;

use anyhow::Result;
use glam::Vec2;
use tracing::info;

use crate::camera3d::{OrbitController, OrbitInput};
use crate::config::AppConfig;
use crate::draw::{DrawList, ModelId};
use crate::font::FontAtlas;
use crate::input::InputSnapshot;
use crate::mesh::{ModelData, ResourceLoadError};
use crate::render_pipeline::{RenderPipeline, TargetAllocator};
use crate::scene::SceneBinding;
use crate::script::{ActionContext, StepSequencer};

pub use lessons::{register_lessons, LessonModels};

/// GPU side of the tutorial: render targets plus model and font uploads.
pub trait RenderHost: TargetAllocator {
    fn upload_model(&mut self, label: &str, model: &ModelData) -> Result<ModelId>;
    fn upload_font(&mut self, font: &FontAtlas) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FrameInput {
    pub window_width: u32,
    pub window_height: u32,
    pub dt: f32,
    pub elapsed: f32,
    pub input: InputSnapshot,
}

#[derive(Debug)]
pub struct Tutorial {
    sequencer: StepSequencer,
    pipeline: RenderPipeline,
    orbit: OrbitController,
    scene: SceneBinding,
    models: LessonModels,
    end_step: i32,
}

impl Tutorial {
    /// Loads the lesson models and font through `host` and registers the walkthrough.
    pub fn init(config: &AppConfig, host: &mut dyn RenderHost) -> Result<Self> {
        let assets = &config.assets;
        let models = LessonModels {
            intro: load_model(host, "intro", &assets.intro_model)?,
            sample_objects: load_model(host, "sample_objects", &assets.sample_objects)?,
            flat_vector_scene: load_model(host, "flat_vector_scene", &assets.flat_vector_scene)?,
            flat_vector_scene_outlines: load_model(
                host,
                "flat_vector_scene_outlines",
                &assets.flat_vector_scene_outlines,
            )?,
        };

        let image = image::open(&assets.font)
            .map_err(|source| ResourceLoadError::Image { path: assets.font.clone(), source })?
            .to_rgba8();
        let font = FontAtlas::from_image(image, config.font.first_char, config.font.key_color)?;
        host.upload_font(&font)?;
        info!(path = %assets.font.display(), glyphs = font.glyphs().len(), "font_loaded");

        Ok(Self::with_models(config, models))
    }

    /// Builds the walkthrough around models that are already resident.
    pub fn with_models(config: &AppConfig, models: LessonModels) -> Self {
        let settings = &config.tutorial;
        let mut sequencer = StepSequencer::new(settings.max_actions, settings.arena_capacity);
        let pipeline = RenderPipeline::new(settings.target_divisor);
        let (width, height) = pipeline.target_size_for(config.window.width, config.window.height);
        let target_size = Vec2::new(width.max(1) as f32, height.max(1) as f32);
        let end_step = register_lessons(&mut sequencer, &models, target_size);
        sequencer.set_current_step(settings.start_step);
        info!(
            actions = sequencer.len(),
            arena_used = sequencer.arena().used(),
            arena_capacity = sequencer.arena().capacity(),
            start_step = settings.start_step,
            end_step,
            "tutorial_initialised"
        );
        Self {
            sequencer,
            pipeline,
            orbit: OrbitController::new(&config.camera),
            scene: SceneBinding::Dithered { model: models.intro },
            models,
            end_step,
        }
    }

    /// Records one full frame into `draw`: scene pass, composite, then the scripted overlay.
    pub fn update(
        &mut self,
        frame: &FrameInput,
        allocator: &mut dyn TargetAllocator,
        draw: &mut DrawList,
    ) -> Result<()> {
        let input = &frame.input;
        if input.toggle_post_process {
            self.pipeline.toggle_bypass();
        }
        self.orbit.update(
            frame.dt,
            OrbitInput { drag_held: input.left_held, mouse_delta: input.mouse_delta, wheel: input.wheel },
        );

        let Some(target) = self.pipeline.ensure_target(allocator, frame.window_width, frame.window_height)?
        else {
            // No target while minimised: navigation is not evaluated, so releases here are dropped.
            return Ok(());
        };
        let screen = Vec2::new(frame.window_width as f32, frame.window_height as f32);
        self.pipeline.draw_scene(draw, target, self.orbit.camera(), &self.scene, frame.elapsed);
        self.pipeline.composite(draw, target, screen);

        let mut ctx = ActionContext { draw, input, screen, scene: &mut self.scene, target: Some(target) };
        self.sequencer.evaluate(&mut ctx);
        Ok(())
    }

    pub fn deinit(mut self, allocator: &mut dyn TargetAllocator) {
        self.pipeline.release(allocator);
        info!(step = self.sequencer.current_step(), "tutorial_deinit");
    }

    pub fn current_step(&self) -> i32 {
        self.sequencer.current_step()
    }

    /// Last step covered by the navigation buttons, one past the final page.
    pub fn end_step(&self) -> i32 {
        self.end_step
    }

    pub fn scene(&self) -> &SceneBinding {
        &self.scene
    }

    pub fn models(&self) -> &LessonModels {
        &self.models
    }

    pub fn sequencer(&self) -> &StepSequencer {
        &self.sequencer
    }

    pub fn pipeline(&self) -> &RenderPipeline {
        &self.pipeline
    }

    pub fn orbit(&self) -> &OrbitController {
        &self.orbit
    }
}

fn load_model(host: &mut dyn RenderHost, label: &str, path: &Path) -> Result<ModelId> {
    let model = ModelData::load_gltf(path)?;
    let id = host.upload_model(label, &model)?;
    info!(
        label,
        path = %path.display(),
        meshes = model.meshes.len(),
        triangles = model.triangle_count(),
        "model_loaded"
    );
    Ok(id)
}
