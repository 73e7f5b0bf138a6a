use glam::{Mat4, Vec2, Vec3};
use serde::Deserialize;

const DEFAULT_UP: Vec3 = Vec3::Y;

/// Perspective camera used for the off-screen scene pass and scripted mesh draws.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera3D {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub fov_y_radians: f32,
    pub near: f32,
    pub far: f32,
}

impl Camera3D {
    pub fn new(position: Vec3, target: Vec3, fov_y_radians: f32, near: f32, far: f32) -> Self {
        Self { position, target, up: DEFAULT_UP, fov_y_radians, near, far }
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(self.fov_y_radians, aspect.max(0.0001), self.near, self.far)
    }

    pub fn view_projection(&self, width: u32, height: u32) -> Mat4 {
        let aspect = if height > 0 { width as f32 / height as f32 } else { 1.0 };
        self.projection_matrix(aspect) * self.view_matrix()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrbitConfig {
    #[serde(default = "OrbitConfig::default_min_distance")]
    pub min_distance: f32,
    #[serde(default = "OrbitConfig::default_max_distance")]
    pub max_distance: f32,
    #[serde(default = "OrbitConfig::default_initial_distance")]
    pub initial_distance: f32,
    /// `[pitch, yaw]` in radians.
    #[serde(default = "OrbitConfig::default_initial_rotation")]
    pub initial_rotation: [f32; 2],
    #[serde(default = "OrbitConfig::default_target")]
    pub target: [f32; 3],
    #[serde(default = "OrbitConfig::default_fov_degrees")]
    pub fov_degrees: f32,
}

impl OrbitConfig {
    const fn default_min_distance() -> f32 {
        2.5
    }

    const fn default_max_distance() -> f32 {
        10.0
    }

    const fn default_initial_distance() -> f32 {
        5.0
    }

    const fn default_initial_rotation() -> [f32; 2] {
        [1.0, -2.5]
    }

    const fn default_target() -> [f32; 3] {
        [0.0, 0.25, 0.0]
    }

    const fn default_fov_degrees() -> f32 {
        45.0
    }
}

impl Default for OrbitConfig {
    fn default() -> Self {
        Self {
            min_distance: Self::default_min_distance(),
            max_distance: Self::default_max_distance(),
            initial_distance: Self::default_initial_distance(),
            initial_rotation: Self::default_initial_rotation(),
            target: Self::default_target(),
            fov_degrees: Self::default_fov_degrees(),
        }
    }
}

/// Input consumed by [`OrbitController::update`] for one frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrbitInput {
    pub drag_held: bool,
    pub mouse_delta: Vec2,
    pub wheel: f32,
}

const PITCH_COMFORT_MIN: f32 = 0.8;
const PITCH_COMFORT_MAX: f32 = 1.6;
const PITCH_MIN: f32 = 0.4;
const PITCH_MAX: f32 = 1.7;
const PITCH_SPRING: f32 = 20.1;
const DRAG_SENSITIVITY: f32 = 0.015;
const WHEEL_SENSITIVITY: f32 = 0.1;
const NEAR_PLANE: f32 = 0.01;
const FAR_PLANE: f32 = 1000.0;

/// Damped orbit around a fixed target.
///
/// Drag and scroll add impulses to rotational and zoom velocity; springs pull pitch and distance
/// back into a comfortable band, and every velocity decays by `1 - dt * distance` per frame.
#[derive(Debug, Clone)]
pub struct OrbitController {
    /// `x` = pitch, `y` = yaw.
    pub rotation: Vec2,
    pub rotate_velocity: Vec2,
    pub distance: f32,
    pub distance_velocity: f32,
    min_distance: f32,
    max_distance: f32,
    target: Vec3,
    fov_y_radians: f32,
    was_dragging: bool,
}

impl OrbitController {
    pub fn new(config: &OrbitConfig) -> Self {
        let min_distance = config.min_distance.max(0.01);
        let max_distance = config.max_distance.max(min_distance);
        Self {
            rotation: Vec2::from_array(config.initial_rotation),
            rotate_velocity: Vec2::ZERO,
            distance: config.initial_distance.clamp(min_distance, max_distance),
            distance_velocity: 0.0,
            min_distance,
            max_distance,
            target: Vec3::from_array(config.target),
            fov_y_radians: config.fov_degrees.to_radians(),
            was_dragging: false,
        }
    }

    pub fn min_distance(&self) -> f32 {
        self.min_distance
    }

    pub fn max_distance(&self) -> f32 {
        self.max_distance
    }

    /// Integrates one frame and applies this frame's input impulses for the next one.
    pub fn update(&mut self, dt: f32, input: OrbitInput) {
        if self.rotation.x > PITCH_COMFORT_MAX {
            self.rotate_velocity.x -= PITCH_SPRING * dt;
        }
        if self.rotation.x < PITCH_COMFORT_MIN {
            self.rotate_velocity.x += PITCH_SPRING * dt;
        }
        if self.distance < self.min_distance + 1.0 {
            self.distance_velocity += (self.min_distance - self.distance + 1.0) * dt;
        }
        if self.distance > self.max_distance - 1.0 {
            self.distance_velocity -= (self.distance - self.max_distance + 1.0) * dt;
        }

        self.distance += self.distance_velocity;
        self.rotation += self.rotate_velocity * dt;

        if self.rotation.x > PITCH_MAX {
            self.rotation.x = PITCH_MAX;
            self.rotate_velocity.x = 0.0;
        }
        if self.rotation.x < PITCH_MIN {
            self.rotation.x = PITCH_MIN;
            self.rotate_velocity.x = 0.0;
        }
        if self.distance < self.min_distance {
            self.distance = self.min_distance;
            self.distance_velocity = 0.0;
        }
        if self.distance > self.max_distance {
            self.distance = self.max_distance;
            self.distance_velocity = 0.0;
        }

        let decay = (1.0 - dt * self.distance).max(0.0);
        self.rotate_velocity *= decay;
        self.distance_velocity *= decay;

        if input.drag_held {
            if self.was_dragging {
                self.rotate_velocity.x -= input.mouse_delta.y * DRAG_SENSITIVITY;
                self.rotate_velocity.y -= input.mouse_delta.x * DRAG_SENSITIVITY;
            }
            self.was_dragging = true;
        } else {
            self.was_dragging = false;
        }
        self.distance_velocity -= input.wheel * WHEEL_SENSITIVITY;
    }

    pub fn camera_position(&self) -> Vec3 {
        let (pitch, yaw) = (self.rotation.x, self.rotation.y);
        let radius = pitch.sin() * self.distance;
        Vec3::new(yaw.sin() * radius, pitch.cos() * self.distance, yaw.cos() * radius)
    }

    pub fn camera(&self) -> Camera3D {
        Camera3D::new(self.camera_position(), self.target, self.fov_y_radians, NEAR_PLANE, FAR_PLANE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 1.0 / 60.0;

    #[test]
    fn camera3d_view_projection_is_finite() {
        let camera = Camera3D::new(Vec3::new(0.0, 1.0, 5.0), Vec3::ZERO, 60.0_f32.to_radians(), 0.1, 1000.0);
        let vp = camera.view_projection(1280, 720);
        assert!(!vp.to_cols_array().iter().any(|v| v.is_nan() || v.is_infinite()));
    }

    #[test]
    fn idle_orbit_stays_in_range_and_never_gains_speed() {
        let mut orbit = OrbitController::new(&OrbitConfig::default());
        let mut last_speed = orbit.distance_velocity.abs() + orbit.rotate_velocity.length();
        for _ in 0..60 {
            orbit.update(DT, OrbitInput::default());
            assert!(orbit.distance >= orbit.min_distance() && orbit.distance <= orbit.max_distance());
            let speed = orbit.distance_velocity.abs() + orbit.rotate_velocity.length();
            assert!(speed <= last_speed + 1e-6, "speed grew from {last_speed} to {speed}");
            last_speed = speed;
        }
        assert!((orbit.distance - 5.0).abs() < 1e-5);
    }

    #[test]
    fn drag_needs_two_consecutive_held_frames() {
        let mut orbit = OrbitController::new(&OrbitConfig::default());
        let drag = OrbitInput { drag_held: true, mouse_delta: Vec2::new(10.0, 0.0), wheel: 0.0 };
        orbit.update(DT, drag);
        assert_eq!(orbit.rotate_velocity.y, 0.0, "first held frame only arms the drag");
        orbit.update(DT, drag);
        assert!(orbit.rotate_velocity.y < 0.0);
    }

    #[test]
    fn scroll_zooms_in_and_distance_is_clamped() {
        let mut orbit = OrbitController::new(&OrbitConfig::default());
        orbit.update(DT, OrbitInput { wheel: 50.0, ..Default::default() });
        orbit.update(DT, OrbitInput::default());
        assert_eq!(orbit.distance, orbit.min_distance());
        assert_eq!(orbit.distance_velocity, 0.0);

        // The distance spring then eases the camera back out of the near band.
        let mut last = orbit.distance;
        for _ in 0..10 {
            orbit.update(DT, OrbitInput::default());
            assert!(orbit.distance > last);
            assert!(orbit.distance <= orbit.min_distance() + 1.0);
            last = orbit.distance;
        }
    }

    #[test]
    fn pitch_above_comfort_band_springs_back_and_decays() {
        let mut orbit = OrbitController::new(&OrbitConfig::default());
        orbit.rotation.x = 1.65;
        orbit.update(DT, OrbitInput::default());
        // -20.1 * dt, then scaled by 1 - dt * 5.
        assert!((orbit.rotate_velocity.x - -0.30708).abs() < 1e-4, "{}", orbit.rotate_velocity.x);
    }

    #[test]
    fn pitch_below_comfort_band_gains_upward_velocity() {
        let mut orbit = OrbitController::new(&OrbitConfig::default());
        orbit.rotation.x = 0.7;
        orbit.update(DT, OrbitInput::default());
        assert!(orbit.rotate_velocity.x > 0.0);
    }

    #[test]
    fn velocity_decays_by_distance_times_dt() {
        let mut orbit = OrbitController::new(&OrbitConfig::default());
        orbit.rotate_velocity.y = 1.0;
        orbit.update(0.1, OrbitInput::default());
        assert_eq!(orbit.distance, 5.0);
        assert!((orbit.rotate_velocity.y - 0.5).abs() < 1e-5, "{}", orbit.rotate_velocity.y);
    }

    #[test]
    fn distance_near_max_is_pulled_inward() {
        let mut orbit = OrbitController::new(&OrbitConfig::default());
        orbit.distance = orbit.max_distance() - 0.5;
        orbit.update(DT, OrbitInput::default());
        assert!(orbit.distance_velocity < 0.0);
        assert!(orbit.distance < orbit.max_distance() - 0.5);
    }

    #[test]
    fn pitch_is_clamped_and_velocity_zeroed() {
        let mut orbit = OrbitController::new(&OrbitConfig::default());
        orbit.rotate_velocity.x = 500.0;
        orbit.update(DT, OrbitInput::default());
        assert_eq!(orbit.rotation.x, PITCH_MAX);
        assert_eq!(orbit.rotate_velocity.x, 0.0);
    }

    #[test]
    fn camera_orbits_at_distance() {
        let orbit = OrbitController::new(&OrbitConfig::default());
        assert!((orbit.camera_position().length() - orbit.distance).abs() < 1e-4);
    }
}
