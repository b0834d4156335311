//! Collaborators the scene pass calls into: lights, world objects and the
//! audio listener.

use bevy::math::{Mat4, Vec3, Vec4};

use crate::backend::RenderBackend;
use crate::camera::{CameraMode, CameraView};
use crate::error::RenderResult;
use crate::math::ClipPlane;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Light {
    /// Direction towards the light.
    pub direction: Vec3,
    pub diffuse: Vec3,
    pub ambient: Vec3,
    pub enabled: bool,
}

impl Light {
    /// Lambert term for a surface with normal `normal`, zero when disabled.
    pub fn shade(&self, normal: Vec3) -> Vec3 {
        if !self.enabled {
            return Vec3::ZERO;
        }
        let n_dot_l = normal.normalize_or_zero().dot(self.direction.normalize_or_zero()).max(0.0);
        self.ambient + self.diffuse * n_dot_l
    }
}

/// Three directional lights. The key light is always on; the two fill
/// lights are switched off in the top-down view.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LightRig {
    pub lights: [Light; 3],
}

impl LightRig {
    pub fn for_mode(mode: CameraMode) -> Self {
        let fill = mode != CameraMode::Top;
        Self {
            lights: [
                Light {
                    direction: Vec3::new(0.0, 1.0, 1.0),
                    diffuse: Vec3::ONE,
                    ambient: Vec3::splat(0.3),
                    enabled: true,
                },
                Light {
                    direction: Vec3::X,
                    diffuse: Vec3::new(0.5, 0.5, 0.1),
                    ambient: Vec3::ZERO,
                    enabled: fill,
                },
                Light {
                    direction: Vec3::NEG_Y,
                    diffuse: Vec3::new(0.1, 0.1, 0.3),
                    ambient: Vec3::ZERO,
                    enabled: fill,
                },
            ],
        }
    }

    pub fn enabled_count(&self) -> usize {
        self.lights.iter().filter(|l| l.enabled).count()
    }

    /// Sum of all enabled lights on `base`, clamped to [0, 1].
    pub fn shade(&self, base: Vec3, normal: Vec3) -> Vec3 {
        let light: Vec3 = self.lights.iter().map(|l| l.shade(normal)).sum();
        (base * light).clamp(Vec3::ZERO, Vec3::ONE)
    }
}

/// Flattens geometry onto the plane `y = height` along `toward_light`.
/// `None` when the light does not shine down onto the plane.
pub fn planar_shadow(toward_light: Vec3, height: f32) -> Option<Mat4> {
    if toward_light.y <= f32::EPSILON {
        return None;
    }
    let sx = toward_light.x / toward_light.y;
    let sz = toward_light.z / toward_light.y;
    Some(Mat4::from_cols(
        Vec4::X,
        Vec4::new(-sx, 0.0, -sz, 0.0),
        Vec4::Z,
        Vec4::new(sx * height, height, sz * height, 1.0),
    ))
}

/// What world objects get to know about the pass they are drawn in.
#[derive(Clone, Copy, Debug)]
pub struct ObjectPass {
    pub camera: CameraView,
    pub lights: LightRig,
    pub plane: ClipPlane,
    /// Second draw that projects the objects onto the floor. Objects do not
    /// pick their own colors in this draw.
    pub shadows: bool,
    pub reflection: bool,
}

/// World content owned by the host (track control points and the like).
pub trait SceneObjects {
    fn draw(&mut self, backend: &mut dyn RenderBackend, pass: &ObjectPass) -> RenderResult<()>;
}

pub trait AudioListener {
    fn set_listener_position(&mut self, position: Vec3);
}

/// Optional collaborators for one frame.
#[derive(Default)]
pub struct SceneHooks<'a> {
    pub objects: Option<&'a mut dyn SceneObjects>,
    pub listener: Option<&'a mut dyn AudioListener>,
}
