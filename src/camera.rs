use bevy::math::{Mat4, Vec3};

use crate::constants::{TOP_CAMERA_FAR, TOP_CAMERA_HALF_EXTENT, TOP_CAMERA_NEAR};
use crate::math::{self, reflection_about_height};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CameraMode {
    /// Free orbit camera driven by the host.
    #[default]
    World,
    /// Fixed orthographic view looking straight down.
    Top,
    /// Rides along the track; the host supplies the view.
    Train,
}

impl CameraMode {
    pub fn next(self) -> Self {
        match self {
            CameraMode::World => CameraMode::Top,
            CameraMode::Top => CameraMode::Train,
            CameraMode::Train => CameraMode::World,
        }
    }
}

/// View and projection for one pass, in GL clip conventions (right-handed,
/// depth in [-1, 1]). Backends adapt the projection to their own clip space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraView {
    pub view: Mat4,
    pub projection: Mat4,
}

impl Default for CameraView {
    fn default() -> Self {
        Self {
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
        }
    }
}

impl CameraView {
    pub fn new(view: Mat4, projection: Mat4) -> Self {
        Self { view, projection }
    }

    /// Orthographic top-down camera. The longer window axis spans
    /// `2 * TOP_CAMERA_HALF_EXTENT` world units.
    pub fn top_down(aspect: f32) -> Self {
        let (half_w, half_h) = if aspect >= 1.0 {
            (TOP_CAMERA_HALF_EXTENT, TOP_CAMERA_HALF_EXTENT / aspect)
        } else {
            (TOP_CAMERA_HALF_EXTENT * aspect, TOP_CAMERA_HALF_EXTENT)
        };
        let projection = Mat4::orthographic_rh_gl(
            -half_w,
            half_w,
            -half_h,
            half_h,
            TOP_CAMERA_NEAR,
            TOP_CAMERA_FAR,
        );
        let view = Mat4::from_rotation_x(-90f32.to_radians());
        Self { view, projection }
    }

    /// Projection for the active mode. World and Train use the host camera.
    pub fn for_mode(mode: CameraMode, host: &CameraView, aspect: f32) -> Self {
        match mode {
            CameraMode::Top => Self::top_down(aspect),
            CameraMode::World | CameraMode::Train => *host,
        }
    }

    /// The same camera seen in a mirror lying on the plane `y = height`.
    pub fn mirrored(&self, height: f32) -> Self {
        Self {
            view: self.view * reflection_about_height(height),
            projection: self.projection,
        }
    }

    pub fn position(&self) -> Option<Vec3> {
        math::camera_position(&self.view)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn top_camera_fits_longer_axis() {
        let wide = CameraView::top_down(2.0);
        let corner = wide.projection * wide.view * bevy::math::Vec4::new(110.0, 0.0, 55.0, 1.0);
        assert!((corner.x / corner.w - 1.0).abs() < 1e-5);
        assert!((corner.y / corner.w - 1.0).abs() < 1e-5);

        let tall = CameraView::top_down(0.5);
        let corner = tall.projection * tall.view * bevy::math::Vec4::new(55.0, 0.0, 110.0, 1.0);
        assert!((corner.x / corner.w - 1.0).abs() < 1e-5);
        assert!((corner.y / corner.w - 1.0).abs() < 1e-5);
    }

    #[test]
    fn top_camera_sees_higher_points_first() {
        let top = CameraView::top_down(1.0);
        let clip = |y: f32| {
            let p = top.projection * top.view * bevy::math::Vec4::new(0.0, y, 0.0, 1.0);
            p.z / p.w
        };
        assert!(clip(100.0) < clip(0.0));
    }

    #[test]
    fn host_camera_is_used_outside_top_mode() {
        let host = CameraView::new(Mat4::from_translation(Vec3::X), Mat4::IDENTITY);
        assert_eq!(CameraView::for_mode(CameraMode::World, &host, 1.5), host);
        assert_eq!(CameraView::for_mode(CameraMode::Train, &host, 1.5), host);
        assert_ne!(CameraView::for_mode(CameraMode::Top, &host, 1.5), host);
    }

    #[test]
    fn mirrored_camera_sits_below_the_water() {
        let eye = Vec3::new(0.0, 100.0, 80.0);
        let cam = CameraView::new(Mat4::look_at_rh(eye, Vec3::ZERO, Vec3::Y), Mat4::IDENTITY);
        let mirrored = cam.mirrored(60.0).position().unwrap();
        assert!((mirrored - Vec3::new(0.0, 20.0, 80.0)).length() < 1e-3);
    }

    #[test]
    fn modes_cycle() {
        assert_eq!(CameraMode::World.next().next().next(), CameraMode::World);
    }
}
