use glam::Vec2;

use crate::draw::{ModelId, Rect, ShaderKind};
use crate::scene::{OutlineMode, OutlineSceneConfig, SceneBinding};
use crate::script::{ActionKind, MagnifierData, NavigateData, StepRange, StepSequencer, TextBoxData};

/// GPU handles of the four scenes the walkthrough switches between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LessonModels {
    pub intro: ModelId,
    pub sample_objects: ModelId,
    pub flat_vector_scene: ModelId,
    pub flat_vector_scene_outlines: ModelId,
}

struct Page {
    title: &'static str,
    body: &'static str,
    width: f32,
    height: f32,
}

const fn page(title: &'static str, body: &'static str, width: f32, height: f32) -> Page {
    Page { title, body, width, height }
}

const INTRO: &str = "Dithering & Outlining howto";
const DITHERING: &str = "Dithering";
const PIXEL_ART: &str = "Pixel art textures";
const FLAT: &str = "Flat colored meshes";
const OUTLINES: &str = "Outlines";

/// One page per step, in step order.
const PAGES: [Page; 16] = [
    page(
        INTRO,
        "This is a tutorial on how dithering and outline rendering can be implemented.\n\
         The goal is to show how the principles work - not to provide a production ready efficient \
         implementation.\n",
        280.0,
        200.0,
    ),
    page(
        INTRO,
        "Furthermore, this tutorial describes only ONE way to do this.\n\
         There are countless other approaches.\n",
        280.0,
        200.0,
    ),
    page(
        DITHERING,
        "Dithering refers to using a few colors and coloring pixels in a way to emulate more colors.\n",
        200.0,
        200.0,
    ),
    page(
        DITHERING,
        "Adapted from print media, it was used when computers were only able to draw images using a \
         limited amount of colors.",
        200.0,
        200.0,
    ),
    page(
        DITHERING,
        "In this case, the reproduction of this style was aimed to work with fairly simple tricks.",
        200.0,
        200.0,
    ),
    page(
        PIXEL_ART,
        "Let's start with a simple 3d scene, using regular textures.\n\
         When using a perspective camera, texture scales will vary a lot.",
        200.0,
        220.0,
    ),
    page(
        PIXEL_ART,
        "This is causing a lot of aliasing when the object is far away, and big pixels when the object \
         is closer than it was designed for.",
        200.0,
        200.0,
    ),
    page(
        PIXEL_ART,
        "This could be tackled using an orthographic camera and carefully choosing the right texture \
         sizes, but this limits the freedom of the camera.",
        200.0,
        220.0,
    ),
    page(
        FLAT,
        "Another approach is to use flat colored meshes.\n\
         Each triangle is colored with a single color, producing a style that resembles a vector draw \
         style.",
        200.0,
        220.0,
    ),
    page(
        FLAT,
        "This approach is more complex to model.\nIt scales nicely, but there's still aliasing.",
        200.0,
        220.0,
    ),
    page(
        OUTLINES,
        "We need proper outlines that are 1-2 pixel wide.\nFor that, we need post processing.",
        200.0,
        220.0,
    ),
    page(
        OUTLINES,
        "In a first step, we create outlines by depth:\n\
         When a pixel is sufficiently far distanced from the surrounding pixels, we draw an outline.",
        200.0,
        220.0,
    ),
    page(
        OUTLINES,
        "The object boundaries are now clear. The far distant objects don't have an outline because our \
         depth buffer range runs out - but at that point, we don't want too many outlines anyway.",
        200.0,
        290.0,
    ),
    page(
        OUTLINES,
        "However, we want more outlines. We can use the UV coordinates as outline indicators as well!",
        200.0,
        290.0,
    ),
    page(
        OUTLINES,
        "Other outline indicators could be used as well, such as normals or other vertex attributes.\n\
         The overall result still doesn't look great.",
        200.0,
        220.0,
    ),
    page(
        OUTLINES,
        "Using the UV coordinates to outline the objects is simple and the result is looking much more \
         like pixel art than using pixel art textures directly.",
        200.0,
        220.0,
    ),
];

const PAGE_ORIGIN: Vec2 = Vec2::new(20.0, 20.0);

/// Magnified patch of the intro scene, in target pixels of the startup-sized target.
const MAGNIFIER_SRC: Rect = Rect::new(180.0, 140.0, 16.0, 16.0);
const MAGNIFIER_DST: Rect = Rect::new(20.0, 240.0, 200.0, 200.0);

fn outlined(model: ModelId, depth: i32, uv: i32) -> SceneBinding {
    SceneBinding::Outlined(OutlineSceneConfig {
        model,
        depth: OutlineMode::from_level(depth),
        uv: OutlineMode::from_level(uv),
    })
}

/// Registers the whole walkthrough and returns the step after the last page.
///
/// Navigation spans `[0, end]`, so stepping past the final page shows a frame with only the
/// navigation buttons and the last scene.
pub fn register_lessons(sequencer: &mut StepSequencer, models: &LessonModels, target_size: Vec2) -> i32 {
    for (step, page) in PAGES.iter().enumerate() {
        let rect = Rect::new(PAGE_ORIGIN.x, PAGE_ORIGIN.y, page.width, page.height);
        sequencer.register_or_warn(
            StepRange::single(step as i32),
            ActionKind::DrawTextBox(TextBoxData::new(page.title, page.body, rect)),
        );
    }

    sequencer.register_or_warn(
        StepRange::new(2, 3),
        ActionKind::DrawMagnifier(MagnifierData::new(
            MAGNIFIER_SRC,
            target_size,
            MAGNIFIER_DST,
            ShaderKind::Outline,
        )),
    );

    let flat = models.flat_vector_scene;
    let bindings = [
        (StepRange::new(0, 4), SceneBinding::Dithered { model: models.intro }),
        (StepRange::new(5, 7), SceneBinding::Simple { model: models.sample_objects }),
        (StepRange::new(8, 9), SceneBinding::Simple { model: flat }),
        (StepRange::single(10), outlined(flat, 0, 0)),
        (StepRange::single(11), outlined(flat, 1, 0)),
        (StepRange::single(12), outlined(flat, 2, 0)),
        (StepRange::single(13), outlined(flat, 2, 1)),
        (StepRange::single(14), outlined(flat, 2, 2)),
        (StepRange::single(15), outlined(models.flat_vector_scene_outlines, 2, 2)),
    ];
    for (range, binding) in bindings {
        sequencer.register_or_warn(range, ActionKind::SetSceneBinding(binding));
    }

    let end = PAGES.len() as i32;
    sequencer.register_or_warn(
        StepRange::new(0, end),
        ActionKind::Navigate(NavigateData { prev: -1, next: 1, relative: true }),
    );
    end
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TutorialConfig;

    fn models() -> LessonModels {
        LessonModels {
            intro: ModelId(0),
            sample_objects: ModelId(1),
            flat_vector_scene: ModelId(2),
            flat_vector_scene_outlines: ModelId(3),
        }
    }

    fn registered() -> StepSequencer {
        let config = TutorialConfig::default();
        let mut sequencer = StepSequencer::new(config.max_actions, config.arena_capacity);
        register_lessons(&mut sequencer, &models(), Vec2::new(400.0, 225.0));
        sequencer
    }

    #[test]
    fn default_budgets_hold_the_whole_walkthrough() {
        let sequencer = registered();
        assert_eq!(sequencer.len(), PAGES.len() + 1 + 9 + 1);
        assert!(sequencer.arena().used() <= sequencer.arena().capacity());
        assert_eq!(sequencer.last_step(), Some(16));
    }

    #[test]
    fn every_page_step_has_exactly_one_text_box_and_one_scene() {
        let mut sequencer = registered();
        for step in 0..PAGES.len() as i32 {
            sequencer.set_current_step(step);
            let kinds: Vec<&ActionKind> = sequencer
                .active_actions()
                .filter_map(|action| sequencer.payload(action.payload))
                .collect();
            let boxes = kinds.iter().filter(|kind| matches!(kind, ActionKind::DrawTextBox(_))).count();
            let scenes = kinds.iter().filter(|kind| matches!(kind, ActionKind::SetSceneBinding(_))).count();
            assert_eq!((boxes, scenes), (1, 1), "step {step}");
        }
    }

    #[test]
    fn magnifier_source_is_normalised_to_target() {
        let sequencer = registered();
        let magnifier = sequencer
            .actions()
            .iter()
            .filter_map(|action| sequencer.payload(action.payload))
            .find_map(|kind| match kind {
                ActionKind::DrawMagnifier(data) => Some(*data),
                _ => None,
            })
            .expect("magnifier registered");
        assert_eq!(magnifier.src.x, 180.0 / 400.0);
        assert_eq!(magnifier.src.width, 16.0 / 400.0);
        assert_eq!(magnifier.dst, MAGNIFIER_DST);
    }
}
