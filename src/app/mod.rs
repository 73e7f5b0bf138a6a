use anyhow::{Context, Result};
use tracing::{error, info};
use winit::application::ApplicationHandler;
use winit::event::{DeviceEvent, ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::{Key, NamedKey};

use crate::config::{AppConfig, AppConfigOverrides, DEFAULT_CONFIG_PATH};
use crate::draw::DrawList;
use crate::input::{Input, InputEvent, DEFAULT_INPUT_CONFIG_PATH};
use crate::renderer::GpuRenderer;
use crate::time::Time;
use crate::tutorial::{FrameInput, Tutorial};

pub fn run() -> Result<()> {
    run_with_overrides(AppConfigOverrides::default())
}

pub fn run_with_overrides(overrides: AppConfigOverrides) -> Result<()> {
    let mut config = AppConfig::load_or_default(DEFAULT_CONFIG_PATH);
    if !overrides.is_empty() {
        info!(fields = ?overrides.applied_fields(), "cli_overrides_applied");
    }
    config.apply_overrides(&overrides);
    let event_loop = EventLoop::new().context("Failed to create winit event loop")?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app).context("Event loop execution failed")?;
    match app.exit_error.take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Window host: owns the renderer and feeds one [`FrameInput`] per redraw into the tutorial.
pub struct App {
    config: AppConfig,
    renderer: GpuRenderer,
    tutorial: Option<Tutorial>,
    input: Input,
    time: Time,
    draw: DrawList,
    should_close: bool,
    exit_error: Option<anyhow::Error>,
}

impl App {
    pub fn new(config: AppConfig) -> Self {
        Self {
            renderer: GpuRenderer::new(&config.window),
            config,
            tutorial: None,
            input: Input::from_config(DEFAULT_INPUT_CONFIG_PATH),
            time: Time::new(),
            draw: DrawList::new(),
            should_close: false,
            exit_error: None,
        }
    }

    fn fail(&mut self, err: anyhow::Error) {
        error!(error = ?err, "fatal_error");
        self.exit_error = Some(err);
        self.should_close = true;
    }

    fn redraw(&mut self) -> Result<()> {
        self.time.tick();
        let Some(tutorial) = self.tutorial.as_mut() else {
            return Ok(());
        };
        let size = self.renderer.size();
        let frame = FrameInput {
            window_width: size.width,
            window_height: size.height,
            dt: self.time.delta_seconds(),
            elapsed: self.time.elapsed_seconds(),
            input: self.input.snapshot(),
        };
        self.draw.clear();
        tutorial.update(&frame, &mut self.renderer, &mut self.draw)?;
        self.renderer.render(&self.draw)?;
        self.input.clear_frame();
        Ok(())
    }

    fn shutdown(&mut self) {
        if let Some(tutorial) = self.tutorial.take() {
            tutorial.deinit(&mut self.renderer);
            info!(frames = self.time.frame(), elapsed = self.time.elapsed_seconds(), "app_shutdown");
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if let Err(err) = self.renderer.ensure_window(event_loop) {
            self.fail(err.context("Renderer initialization failed"));
            return;
        }
        if self.tutorial.is_none() {
            match Tutorial::init(&self.config, &mut self.renderer) {
                Ok(tutorial) => self.tutorial = Some(tutorial),
                Err(err) => {
                    self.fail(err.context("Tutorial initialization failed"));
                    return;
                }
            }
            self.time = Time::new();
        }
        if let Some(window) = self.renderer.window() {
            window.request_redraw();
        }
    }

    fn window_event(&mut self, _el: &ActiveEventLoop, _id: winit::window::WindowId, event: WindowEvent) {
        self.input.push(InputEvent::from_window_event(&event));
        match &event {
            WindowEvent::CloseRequested => self.should_close = true,
            WindowEvent::Resized(size) => self.renderer.resize(*size),
            WindowEvent::RedrawRequested => {
                if let Err(err) = self.redraw() {
                    self.fail(err);
                }
            }
            WindowEvent::KeyboardInput { event: KeyEvent { logical_key, state, .. }, .. } => {
                if let Key::Named(NamedKey::Escape) = logical_key {
                    if *state == ElementState::Pressed {
                        self.should_close = true;
                    }
                }
            }
            _ => {}
        }
    }

    fn device_event(&mut self, _e: &ActiveEventLoop, _dev: winit::event::DeviceId, ev: DeviceEvent) {
        self.input.push(InputEvent::from_device_event(&ev));
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.should_close {
            self.shutdown();
            event_loop.exit();
            return;
        }
        if let Some(window) = self.renderer.window() {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.shutdown();
    }
}
