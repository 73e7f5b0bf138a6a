pub mod app;
pub mod camera3d;
pub mod cli;
pub mod config;
pub mod draw;
pub mod font;
pub mod input;
pub mod mesh;
pub mod render_pipeline;
pub mod renderer;
pub mod scene;
pub mod script;
pub mod text;
pub mod time;
pub mod tutorial;

pub use app::{run, run_with_overrides, App};
