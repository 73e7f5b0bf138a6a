use anyhow::Result;
use dither_howto::config::AppConfig;
use dither_howto::draw::{uniforms, DrawCommand, DrawList, ModelId, RenderTargetId, ShaderKind, UniformValue};
use dither_howto::input::InputSnapshot;
use dither_howto::render_pipeline::TargetAllocator;
use dither_howto::scene::{OutlineMode, SceneBinding};
use dither_howto::script::{NAV_BUTTON_MARGIN, NAV_BUTTON_SIZE};
use dither_howto::tutorial::{FrameInput, LessonModels, Tutorial};
use glam::Vec2;

#[derive(Default)]
struct FakeTargets {
    next: u32,
    live: Vec<(RenderTargetId, u32, u32)>,
    created: usize,
}

impl TargetAllocator for FakeTargets {
    fn create_target(&mut self, width: u32, height: u32) -> Result<RenderTargetId> {
        self.next += 1;
        self.created += 1;
        let id = RenderTargetId(self.next);
        self.live.push((id, width, height));
        Ok(id)
    }

    fn destroy_target(&mut self, id: RenderTargetId) {
        self.live.retain(|(live, _, _)| *live != id);
    }
}

fn models() -> LessonModels {
    LessonModels {
        intro: ModelId(10),
        sample_objects: ModelId(11),
        flat_vector_scene: ModelId(12),
        flat_vector_scene_outlines: ModelId(13),
    }
}

fn tutorial_at(step: i32) -> Tutorial {
    let mut config = AppConfig::default();
    config.tutorial.start_step = step;
    Tutorial::with_models(&config, models())
}

fn frame(width: u32, height: u32, elapsed: f32, input: InputSnapshot) -> FrameInput {
    FrameInput { window_width: width, window_height: height, dt: 1.0 / 60.0, elapsed, input }
}

fn run_frame(tutorial: &mut Tutorial, targets: &mut FakeTargets, input: &FrameInput) -> DrawList {
    let mut draw = DrawList::new();
    tutorial.update(input, targets, &mut draw).expect("frame records");
    draw
}

fn depth_flag(draw: &DrawList) -> Option<f32> {
    draw.commands().iter().find_map(|command| match command {
        DrawCommand::SetUniform {
            shader: ShaderKind::Outline,
            name,
            value: UniformValue::Float(value),
        } if *name == uniforms::DEPTH_OUTLINE_ENABLED => Some(*value),
        _ => None,
    })
}

#[test]
fn target_is_half_the_window_and_follows_resizes() {
    let mut tutorial = tutorial_at(0);
    let mut targets = FakeTargets::default();

    run_frame(&mut tutorial, &mut targets, &frame(800, 450, 0.0, InputSnapshot::default()));
    run_frame(&mut tutorial, &mut targets, &frame(800, 450, 0.1, InputSnapshot::default()));
    assert_eq!(targets.created, 1, "same size reuses the target");
    assert_eq!(targets.live.len(), 1);
    assert_eq!((targets.live[0].1, targets.live[0].2), (400, 225));

    run_frame(&mut tutorial, &mut targets, &frame(1001, 601, 0.2, InputSnapshot::default()));
    assert_eq!(targets.created, 2);
    assert_eq!(targets.live.len(), 1, "old target released before the new one is used");
    assert_eq!((targets.live[0].1, targets.live[0].2), (500, 300));

    tutorial.deinit(&mut targets);
    assert!(targets.live.is_empty());
}

#[test]
fn minimised_window_records_nothing() {
    let mut tutorial = tutorial_at(0);
    let mut targets = FakeTargets::default();
    let draw = run_frame(&mut tutorial, &mut targets, &frame(0, 0, 0.0, InputSnapshot::default()));
    assert!(draw.is_empty());
    assert_eq!(targets.created, 0);

    let draw = run_frame(&mut tutorial, &mut targets, &frame(1, 1, 0.0, InputSnapshot::default()));
    assert!(draw.is_empty(), "a window smaller than the divisor has no target either");
}

#[test]
fn navigation_while_minimised_is_dropped() {
    let mut tutorial = tutorial_at(3);
    let mut targets = FakeTargets::default();
    let next = InputSnapshot { next_released: true, ..InputSnapshot::default() };
    let draw = run_frame(&mut tutorial, &mut targets, &frame(0, 0, 0.0, next));
    assert!(draw.is_empty());
    assert_eq!(tutorial.current_step(), 3);

    let draw = run_frame(&mut tutorial, &mut targets, &frame(800, 450, 0.1, InputSnapshot::default()));
    assert!(!draw.is_empty());
    assert_eq!(tutorial.current_step(), 3);
    assert_eq!(targets.created, 1);
}

#[test]
fn clicking_the_next_button_advances_one_step() {
    let mut tutorial = tutorial_at(0);
    let mut targets = FakeTargets::default();
    let next_center =
        Vec2::new(800.0, 450.0) - Vec2::splat(NAV_BUTTON_MARGIN) + Vec2::splat(NAV_BUTTON_SIZE / 2.0);
    let click = InputSnapshot { cursor: next_center, left_released: true, ..InputSnapshot::default() };

    run_frame(&mut tutorial, &mut targets, &frame(800, 450, 0.0, click));
    assert_eq!(tutorial.current_step(), 1);

    let miss = InputSnapshot { cursor: Vec2::new(5.0, 5.0), left_released: true, ..InputSnapshot::default() };
    run_frame(&mut tutorial, &mut targets, &frame(800, 450, 0.1, miss));
    assert_eq!(tutorial.current_step(), 1);

    let arrow = InputSnapshot { prev_released: true, ..InputSnapshot::default() };
    run_frame(&mut tutorial, &mut targets, &frame(800, 450, 0.2, arrow));
    assert_eq!(tutorial.current_step(), 0);
}

#[test]
fn walking_the_lessons_switches_scene_bindings() {
    let mut tutorial = tutorial_at(0);
    let mut targets = FakeTargets::default();
    let next = InputSnapshot { next_released: true, ..InputSnapshot::default() };

    for _ in 0..5 {
        run_frame(&mut tutorial, &mut targets, &frame(800, 450, 0.0, next));
    }
    assert_eq!(tutorial.current_step(), 5);
    assert!(matches!(tutorial.scene(), SceneBinding::Dithered { .. }), "binding lags one frame");

    run_frame(&mut tutorial, &mut targets, &frame(800, 450, 0.0, InputSnapshot::default()));
    assert_eq!(*tutorial.scene(), SceneBinding::Simple { model: ModelId(11) });

    while tutorial.current_step() < 15 {
        run_frame(&mut tutorial, &mut targets, &frame(800, 450, 0.0, next));
    }
    run_frame(&mut tutorial, &mut targets, &frame(800, 450, 0.0, InputSnapshot::default()));
    let SceneBinding::Outlined(config) = *tutorial.scene() else {
        panic!("last lesson uses the outline scene");
    };
    assert_eq!(config.model, ModelId(13));
    assert_eq!((config.depth, config.uv), (OutlineMode::On, OutlineMode::On));
}

#[test]
fn blinking_outline_is_enabled_about_half_the_time() {
    let mut targets = FakeTargets::default();
    // Step 11 blinks the depth outline, step 10 has it off and step 12 forces it on.
    for (step, expected) in [(10, 0.0), (11, 0.5), (12, 1.0)] {
        let mut tutorial = tutorial_at(step);
        // The first frame applies the step's binding.
        run_frame(&mut tutorial, &mut targets, &frame(800, 450, 0.0, InputSnapshot::default()));
        let samples = 400;
        let mut enabled = 0;
        for i in 0..samples {
            let elapsed = 2.0 * i as f32 / samples as f32 + 0.001;
            let input = frame(800, 450, elapsed, InputSnapshot::default());
            let draw = run_frame(&mut tutorial, &mut targets, &input);
            if depth_flag(&draw) == Some(1.0) {
                enabled += 1;
            }
        }
        let fraction = enabled as f32 / samples as f32;
        assert!((fraction - expected).abs() < 0.05, "step {step}: enabled {fraction}, expected {expected}");
        tutorial.deinit(&mut targets);
    }
}

#[test]
fn overlay_is_recorded_after_the_composite_and_outside_shaders() {
    let mut tutorial = tutorial_at(0);
    let mut targets = FakeTargets::default();
    let draw = run_frame(&mut tutorial, &mut targets, &frame(800, 450, 0.0, InputSnapshot::default()));
    let commands = draw.commands();

    let end_target = commands
        .iter()
        .position(|command| matches!(command, DrawCommand::EndTarget))
        .expect("scene pass closes its target");
    let composite = commands
        .iter()
        .position(|command| matches!(command, DrawCommand::TexturePro { .. }))
        .expect("composite blit");
    assert!(composite > end_target);
    assert!(matches!(commands[composite - 1], DrawCommand::BeginShader(ShaderKind::Outline)));
    assert!(matches!(commands[composite + 1], DrawCommand::EndShader));

    let first_text = commands
        .iter()
        .position(|command| matches!(command, DrawCommand::Text { .. }))
        .expect("intro page text");
    assert!(first_text > composite + 1);

    let mut shader_depth = 0;
    for command in &commands[composite + 2..] {
        match command {
            DrawCommand::BeginShader(_) => shader_depth += 1,
            DrawCommand::EndShader => shader_depth -= 1,
            DrawCommand::Text { .. } | DrawCommand::Rect { .. } => {
                assert_eq!(shader_depth, 0, "overlay drawn under a shader")
            }
            _ => {}
        }
    }
}

#[test]
fn bypass_toggle_composites_without_a_shader() {
    let mut tutorial = tutorial_at(0);
    let mut targets = FakeTargets::default();
    let toggle = InputSnapshot { toggle_post_process: true, ..InputSnapshot::default() };
    let draw = run_frame(&mut tutorial, &mut targets, &frame(800, 450, 0.0, toggle));
    assert!(tutorial.pipeline().is_bypassed());

    let composite = draw
        .commands()
        .iter()
        .position(|command| matches!(command, DrawCommand::TexturePro { .. }))
        .expect("composite blit");
    assert!(!matches!(draw.commands()[composite - 1], DrawCommand::BeginShader(_)));

    run_frame(&mut tutorial, &mut targets, &frame(800, 450, 0.1, toggle));
    assert!(!tutorial.pipeline().is_bypassed());
}
