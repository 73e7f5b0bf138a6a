//! Step-sequenced scripted actions.
//!
//! Actions are registered once against an inclusive step range and re-run every frame while the
//! current step lies inside that range. Navigation writes a pending step that only takes effect
//! after the whole pass, so every action in a pass sees the same step.

mod actions;
mod arena;
mod sequencer;

use thiserror::Error;

pub use actions::{
    ActionContext, ActionKind, DrawMeshData, DrawTextureData, MagnifierData, NavigateData, TextBoxData,
    NAV_BUTTON_GAP, NAV_BUTTON_MARGIN, NAV_BUTTON_SIZE,
};
pub use arena::{align_up, ActionArena, PayloadHandle, PAYLOAD_ALIGN};
pub use sequencer::{ScriptAction, StepCursor, StepRange, StepSequencer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ScriptError {
    #[error("script action list is full ({capacity} actions)")]
    TooManyActions { capacity: usize },
    #[error("action arena exhausted: {requested} bytes requested, {available} available")]
    CapacityExceeded { requested: usize, available: usize },
}
