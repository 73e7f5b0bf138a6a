use glam::Vec2;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::warn;
use winit::event::{DeviceEvent, ElementState, MouseButton, MouseScrollDelta, WindowEvent};
use winit::keyboard::{Key, NamedKey};

pub const DEFAULT_INPUT_CONFIG_PATH: &str = "config/input.json";

/// Per-frame view of the input state handed to the tutorial.
///
/// `*_released` flags are edge-triggered: they are set for exactly one frame after the key or button
/// goes up.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InputSnapshot {
    pub cursor: Vec2,
    pub mouse_delta: Vec2,
    pub wheel: f32,
    pub left_held: bool,
    pub left_released: bool,
    pub next_released: bool,
    pub prev_released: bool,
    pub toggle_post_process: bool,
}

pub struct Input {
    bindings: InputBindings,
    mouse_delta: Vec2,
    wheel: f32,
    cursor_pos: Vec2,
    last_cursor_pos: Option<Vec2>,
    raw_motion_seen: bool,
    left_pressed: bool,
    left_released: bool,
    next_released: bool,
    prev_released: bool,
    toggle_post_process: bool,
}

impl Input {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(path: impl AsRef<Path>) -> Self {
        let bindings = InputBindings::load_or_default(path);
        Self::with_bindings(bindings)
    }

    fn with_bindings(bindings: InputBindings) -> Self {
        Self {
            bindings,
            mouse_delta: Vec2::ZERO,
            wheel: 0.0,
            cursor_pos: Vec2::ZERO,
            last_cursor_pos: None,
            raw_motion_seen: false,
            left_pressed: false,
            left_released: false,
            next_released: false,
            prev_released: false,
            toggle_post_process: false,
        }
    }

    pub fn push(&mut self, ev: InputEvent) {
        match ev {
            InputEvent::Key { key, pressed } => self.apply_key_binding(&key, pressed),
            InputEvent::MouseMove { dx, dy } => {
                self.raw_motion_seen = true;
                self.mouse_delta += Vec2::new(dx, dy);
            }
            InputEvent::Wheel { delta } => self.wheel += delta,
            InputEvent::MouseButton { button: MouseButton::Left, pressed } => {
                if !pressed && self.left_pressed {
                    self.left_released = true;
                }
                self.left_pressed = pressed;
            }
            InputEvent::MouseButton { .. } => {}
            InputEvent::CursorPos { x, y } => {
                let pos = Vec2::new(x, y);
                // Platforms without raw device motion fall back to cursor deltas.
                if !self.raw_motion_seen {
                    if let Some(last) = self.last_cursor_pos {
                        self.mouse_delta += pos - last;
                    }
                }
                self.last_cursor_pos = Some(pos);
                self.cursor_pos = pos;
            }
            InputEvent::Other => {}
        }
    }

    pub fn snapshot(&self) -> InputSnapshot {
        InputSnapshot {
            cursor: self.cursor_pos,
            mouse_delta: self.mouse_delta,
            wheel: self.wheel,
            left_held: self.left_pressed,
            left_released: self.left_released,
            next_released: self.next_released,
            prev_released: self.prev_released,
            toggle_post_process: self.toggle_post_process,
        }
    }

    pub fn clear_frame(&mut self) {
        self.mouse_delta = Vec2::ZERO;
        self.wheel = 0.0;
        self.left_released = false;
        self.next_released = false;
        self.prev_released = false;
        self.toggle_post_process = false;
    }

    fn apply_key_binding(&mut self, key: &Key, pressed: bool) {
        if let Some(binding) = InputKeyBinding::from_event_key(key) {
            let actions: Vec<InputAction> = self.bindings.actions_for_key(&binding).collect();
            for action in actions {
                self.update_action_state(action, pressed);
            }
        }
    }

    fn update_action_state(&mut self, action: InputAction, pressed: bool) {
        if pressed {
            return;
        }
        match action {
            InputAction::NextStep => self.next_released = true,
            InputAction::PrevStep => self.prev_released = true,
            InputAction::TogglePostProcess => self.toggle_post_process = true,
        }
    }
}

impl Default for Input {
    fn default() -> Self {
        Self::with_bindings(InputBindings::default())
    }
}

#[derive(Debug, Clone)]
struct InputBindings {
    key_to_actions: HashMap<InputKeyBinding, Vec<InputAction>>,
}

impl InputBindings {
    fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<InputConfigFile>(&contents) {
                Ok(config) => Self::from_config(config, &path.display().to_string()),
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "input_bindings_parse_failed");
                    Self::default()
                }
            },
            Err(err) => {
                warn!(path = %path.display(), error = %err, "input_bindings_read_failed");
                Self::default()
            }
        }
    }

    fn from_config(config: InputConfigFile, origin: &str) -> Self {
        let overrides = config.into_overrides(origin);
        Self::with_overrides(overrides)
    }

    fn with_overrides(overrides: HashMap<InputAction, Vec<InputKeyBinding>>) -> Self {
        let mut action_map = Self::default_action_map();
        for (action, keys) in overrides {
            if keys.is_empty() {
                continue;
            }
            action_map.insert(action, keys);
        }
        Self::from_action_map(action_map)
    }

    fn default_action_map() -> HashMap<InputAction, Vec<InputKeyBinding>> {
        use InputAction::*;
        let mut map = HashMap::new();
        map.insert(NextStep, vec![InputKeyBinding::named(NamedKeyCode::ArrowRight)]);
        map.insert(PrevStep, vec![InputKeyBinding::named(NamedKeyCode::ArrowLeft)]);
        map.insert(TogglePostProcess, vec![InputKeyBinding::character("p")]);
        map
    }

    fn from_action_map(action_map: HashMap<InputAction, Vec<InputKeyBinding>>) -> Self {
        let mut key_to_actions: HashMap<InputKeyBinding, Vec<InputAction>> = HashMap::new();
        for (action, keys) in action_map {
            for key in keys {
                key_to_actions.entry(key).or_default().push(action);
            }
        }
        Self { key_to_actions }
    }

    fn actions_for_key(&self, key: &InputKeyBinding) -> impl Iterator<Item = InputAction> + '_ {
        self.key_to_actions.get(key).into_iter().flatten().copied()
    }
}

impl Default for InputBindings {
    fn default() -> Self {
        Self::from_action_map(Self::default_action_map())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum InputKeyBinding {
    Character(String),
    Named(NamedKeyCode),
}

impl InputKeyBinding {
    fn character(ch: &str) -> Self {
        Self::Character(ch.to_lowercase())
    }

    fn named(named: NamedKeyCode) -> Self {
        Self::Named(named)
    }

    fn from_event_key(key: &Key) -> Option<Self> {
        match key {
            Key::Character(ch) => {
                let s = ch.to_string();
                if s.is_empty() {
                    None
                } else {
                    Some(Self::Character(s.to_lowercase()))
                }
            }
            Key::Named(named) => NamedKeyCode::from_named_key(named).map(Self::Named),
            _ => None,
        }
    }

    fn from_config_value(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_lowercase();
        if normalized.is_empty() {
            return None;
        }
        if let Some(named) = NamedKeyCode::from_str(&normalized) {
            return Some(Self::Named(named));
        }
        if normalized.chars().count() == 1 {
            return Some(Self::Character(normalized));
        }
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum NamedKeyCode {
    ArrowLeft,
    ArrowRight,
    ArrowUp,
    ArrowDown,
    Space,
    Enter,
    Backspace,
    PageUp,
    PageDown,
}

impl NamedKeyCode {
    fn from_named_key(key: &NamedKey) -> Option<Self> {
        match key {
            NamedKey::ArrowLeft => Some(Self::ArrowLeft),
            NamedKey::ArrowRight => Some(Self::ArrowRight),
            NamedKey::ArrowUp => Some(Self::ArrowUp),
            NamedKey::ArrowDown => Some(Self::ArrowDown),
            NamedKey::Space => Some(Self::Space),
            NamedKey::Enter => Some(Self::Enter),
            NamedKey::Backspace => Some(Self::Backspace),
            NamedKey::PageUp => Some(Self::PageUp),
            NamedKey::PageDown => Some(Self::PageDown),
            _ => None,
        }
    }

    fn from_str(value: &str) -> Option<Self> {
        match value {
            "left" | "arrow_left" => Some(Self::ArrowLeft),
            "right" | "arrow_right" => Some(Self::ArrowRight),
            "up" | "arrow_up" => Some(Self::ArrowUp),
            "down" | "arrow_down" => Some(Self::ArrowDown),
            "space" => Some(Self::Space),
            "enter" | "return" => Some(Self::Enter),
            "backspace" => Some(Self::Backspace),
            "page_up" | "pageup" => Some(Self::PageUp),
            "page_down" | "pagedown" => Some(Self::PageDown),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum InputAction {
    NextStep,
    PrevStep,
    TogglePostProcess,
}

impl InputAction {
    fn from_str(value: &str) -> Option<Self> {
        match value {
            "next_step" => Some(Self::NextStep),
            "prev_step" | "previous_step" => Some(Self::PrevStep),
            "toggle_post_process" => Some(Self::TogglePostProcess),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct InputConfigFile {
    #[serde(default)]
    bindings: HashMap<String, Vec<String>>,
}

impl InputConfigFile {
    fn into_overrides(self, origin: &str) -> HashMap<InputAction, Vec<InputKeyBinding>> {
        let mut overrides = HashMap::new();
        for (action_name, keys) in self.bindings {
            let action_key = action_name.trim().to_lowercase();
            let Some(action) = InputAction::from_str(&action_key) else {
                warn!(origin, action = %action_name, "unknown_input_action_ignored");
                continue;
            };
            let mut parsed = Vec::new();
            for key in keys {
                match InputKeyBinding::from_config_value(&key) {
                    Some(binding) => parsed.push(binding),
                    None => warn!(origin, action = %action_name, key = %key, "unknown_input_key_ignored"),
                }
            }
            if parsed.is_empty() {
                warn!(origin, action = %action_name, "input_action_without_valid_keys_keeps_defaults");
                continue;
            }
            overrides.insert(action, parsed);
        }
        overrides
    }
}

#[derive(Debug, Clone)]
pub enum InputEvent {
    Key { key: Key, pressed: bool },
    MouseMove { dx: f32, dy: f32 },
    Wheel { delta: f32 },
    MouseButton { button: MouseButton, pressed: bool },
    CursorPos { x: f32, y: f32 },
    Other,
}

/// Pixels of trackpad scroll that count as one wheel notch.
const PIXELS_PER_WHEEL_LINE: f32 = 40.0;

impl InputEvent {
    pub fn from_window_event(ev: &WindowEvent) -> Self {
        match ev {
            WindowEvent::MouseWheel { delta, .. } => {
                let d = match delta {
                    MouseScrollDelta::LineDelta(_, y) => *y,
                    MouseScrollDelta::PixelDelta(p) => p.y as f32 / PIXELS_PER_WHEEL_LINE,
                };
                InputEvent::Wheel { delta: d }
            }
            WindowEvent::CursorMoved { position, .. } => {
                InputEvent::CursorPos { x: position.x as f32, y: position.y as f32 }
            }
            WindowEvent::MouseInput { state, button, .. } => {
                InputEvent::MouseButton { button: *button, pressed: *state == ElementState::Pressed }
            }
            WindowEvent::KeyboardInput { event, .. } if !event.repeat => InputEvent::Key {
                key: event.logical_key.clone(),
                pressed: event.state == ElementState::Pressed,
            },
            _ => InputEvent::Other,
        }
    }

    pub fn from_device_event(ev: &DeviceEvent) -> Self {
        match ev {
            DeviceEvent::MouseMotion { delta: (dx, dy) } => {
                InputEvent::MouseMove { dx: *dx as f32, dy: *dy as f32 }
            }
            _ => InputEvent::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(named: NamedKey, pressed: bool) -> InputEvent {
        InputEvent::Key { key: Key::Named(named), pressed }
    }

    #[test]
    fn arrow_release_sets_navigation_flags_once() {
        let mut input = Input::new();
        input.push(key(NamedKey::ArrowRight, true));
        assert!(!input.snapshot().next_released, "press alone does not navigate");
        input.push(key(NamedKey::ArrowRight, false));
        assert!(input.snapshot().next_released);
        input.clear_frame();
        assert!(!input.snapshot().next_released);
    }

    #[test]
    fn left_release_is_edge_triggered() {
        let mut input = Input::new();
        input.push(InputEvent::MouseButton { button: MouseButton::Left, pressed: false });
        assert!(!input.snapshot().left_released, "release without press is ignored");
        input.push(InputEvent::MouseButton { button: MouseButton::Left, pressed: true });
        assert!(input.snapshot().left_held);
        input.push(InputEvent::MouseButton { button: MouseButton::Left, pressed: false });
        let snapshot = input.snapshot();
        assert!(snapshot.left_released && !snapshot.left_held);
    }

    #[test]
    fn cursor_deltas_are_used_until_raw_motion_arrives() {
        let mut input = Input::new();
        input.push(InputEvent::CursorPos { x: 10.0, y: 10.0 });
        input.push(InputEvent::CursorPos { x: 14.0, y: 7.0 });
        assert_eq!(input.snapshot().mouse_delta, Vec2::new(4.0, -3.0));
        input.clear_frame();
        input.push(InputEvent::MouseMove { dx: 1.0, dy: 2.0 });
        input.push(InputEvent::CursorPos { x: 30.0, y: 30.0 });
        assert_eq!(input.snapshot().mouse_delta, Vec2::new(1.0, 2.0));
        assert_eq!(input.snapshot().cursor, Vec2::new(30.0, 30.0));
    }

    #[test]
    fn config_keys_parse_named_and_character_values() {
        assert_eq!(
            InputKeyBinding::from_config_value(" Right "),
            Some(InputKeyBinding::Named(NamedKeyCode::ArrowRight))
        );
        assert_eq!(InputKeyBinding::from_config_value("D"), Some(InputKeyBinding::Character("d".into())));
        assert_eq!(InputKeyBinding::from_config_value("hyper"), None);
    }
}
