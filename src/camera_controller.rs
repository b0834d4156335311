use bevy::input::mouse::{MouseButton, MouseMotion, MouseScrollUnit, MouseWheel};
use bevy::prelude::*;

use crate::camera::CameraView;
use crate::constants::{ORBIT_DISTANCE, ORBIT_FAR, ORBIT_FOV_DEGREES, ORBIT_NEAR, ORBIT_PITCH, ORBIT_YAW};

const ROTATE_SENSITIVITY: f32 = 0.005;
const PAN_SENSITIVITY: f32 = 0.002;
const ZOOM_STEP: f32 = 0.1;
const PIXELS_PER_LINE: f32 = 40.0;
const MIN_DISTANCE: f32 = 10.0;
const MAX_DISTANCE: f32 = 900.0;
const PITCH_LIMIT: f32 = std::f32::consts::FRAC_PI_2 - 0.01;

/// Arc-ball style camera for the world view. Right drag orbits, middle drag
/// pans the focus, the wheel zooms.
#[derive(Resource, Clone, Copy, Debug, PartialEq)]
pub struct OrbitCamera {
    pub focus: Vec3,
    /// Rotation about the world Y axis, radians.
    pub yaw: f32,
    /// Elevation above the XZ plane, radians.
    pub pitch: f32,
    pub distance: f32,
    pub fov_y: f32,
}

impl Default for OrbitCamera {
    fn default() -> Self {
        Self {
            focus: Vec3::ZERO,
            yaw: ORBIT_YAW,
            pitch: ORBIT_PITCH,
            distance: ORBIT_DISTANCE,
            fov_y: ORBIT_FOV_DEGREES.to_radians(),
        }
    }
}

impl OrbitCamera {
    pub fn eye(&self) -> Vec3 {
        let offset = Vec3::new(
            self.pitch.cos() * self.yaw.sin(),
            self.pitch.sin(),
            self.pitch.cos() * self.yaw.cos(),
        );
        self.focus + offset * self.distance
    }

    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye(), self.focus, Vec3::Y)
    }

    pub fn projection(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh_gl(self.fov_y, aspect.max(f32::EPSILON), ORBIT_NEAR, ORBIT_FAR)
    }

    pub fn to_camera_view(&self, aspect: f32) -> CameraView {
        CameraView::new(self.view(), self.projection(aspect))
    }

    /// Applies a mouse drag in pixels.
    pub fn rotate(&mut self, delta: Vec2) {
        self.yaw -= delta.x * ROTATE_SENSITIVITY;
        self.pitch = (self.pitch + delta.y * ROTATE_SENSITIVITY).clamp(-PITCH_LIMIT, PITCH_LIMIT);
    }

    /// Moves the focus in the view plane, scaled by distance so the drag
    /// tracks the cursor at any zoom.
    pub fn pan(&mut self, delta: Vec2) {
        let forward = (self.focus - self.eye()).normalize_or_zero();
        let right = forward.cross(Vec3::Y).normalize_or_zero();
        let up = right.cross(forward);
        let scale = self.distance * PAN_SENSITIVITY;
        self.focus += (-right * delta.x + up * delta.y) * scale;
    }

    /// Positive `lines` moves the eye closer.
    pub fn zoom(&mut self, lines: f32) {
        self.distance = (self.distance * (1.0 - lines * ZOOM_STEP)).clamp(MIN_DISTANCE, MAX_DISTANCE);
    }
}

pub fn orbit_camera_system(
    mut camera: ResMut<OrbitCamera>,
    mouse_buttons: Res<ButtonInput<MouseButton>>,
    mut mouse_motion_events: EventReader<MouseMotion>,
    mut mouse_wheel_events: EventReader<MouseWheel>,
) {
    let drag: Vec2 = mouse_motion_events.read().map(|event| event.delta).sum();

    if drag != Vec2::ZERO {
        if mouse_buttons.pressed(MouseButton::Right) {
            camera.rotate(drag);
        } else if mouse_buttons.pressed(MouseButton::Middle) {
            camera.pan(drag);
        }
    }

    for event in mouse_wheel_events.read() {
        let lines = match event.unit {
            MouseScrollUnit::Line => event.y,
            MouseScrollUnit::Pixel => event.y / PIXELS_PER_LINE,
        };
        camera.zoom(lines);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_eye_sits_at_orbit_distance() {
        let camera = OrbitCamera::default();
        assert!((camera.eye().length() - ORBIT_DISTANCE).abs() < 1e-3);
        assert!(camera.eye().y > 0.0);
        let position = camera.to_camera_view(16.0 / 9.0).position().unwrap();
        assert!((position - camera.eye()).length() < 1e-2);
    }

    #[test]
    fn pitch_never_flips_over_the_pole() {
        let mut camera = OrbitCamera::default();
        camera.rotate(Vec2::new(0.0, 1.0e6));
        assert!(camera.pitch < std::f32::consts::FRAC_PI_2);
        camera.rotate(Vec2::new(0.0, -2.0e6));
        assert!(camera.pitch > -std::f32::consts::FRAC_PI_2);
    }

    #[test]
    fn zoom_is_bounded() {
        let mut camera = OrbitCamera::default();
        camera.zoom(100.0);
        assert_eq!(camera.distance, MIN_DISTANCE);
        for _ in 0..200 {
            camera.zoom(-1.0);
        }
        assert_eq!(camera.distance, MAX_DISTANCE);
    }

    #[test]
    fn projection_maps_near_plane_to_gl_depth() {
        let camera = OrbitCamera::default();
        let p = camera.projection(1.0) * Vec4::new(0.0, 0.0, -ORBIT_NEAR, 1.0);
        assert!((p.z / p.w + 1.0).abs() < 1e-4);
    }

    #[test]
    fn panning_keeps_the_orbit_shape() {
        let mut camera = OrbitCamera::default();
        let before = camera.eye() - camera.focus;
        camera.pan(Vec2::new(30.0, -12.0));
        assert_ne!(camera.focus, Vec3::ZERO);
        assert!(((camera.eye() - camera.focus) - before).length() < 1e-3);
    }
}
