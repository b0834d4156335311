//! Cursor rays and the geometric queries the host uses to pick and drag
//! track control points.

use bevy::math::{Mat4, Vec2, Vec3};

use crate::camera::CameraView;
use crate::math::inverse;

const PARALLEL_EPS: f32 = 1e-6;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    /// Unit length.
    pub direction: Vec3,
}

impl Ray {
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }
}

/// World-space ray under `cursor` (top-left origin, in the same pixels as
/// `viewport`). Starts on the near plane. `None` for an empty viewport or a
/// camera whose view-projection cannot be inverted.
pub fn cursor_ray(camera: &CameraView, cursor: Vec2, viewport: Vec2) -> Option<Ray> {
    if viewport.x <= 0.0 || viewport.y <= 0.0 {
        return None;
    }
    let ndc = Vec2::new(
        2.0 * cursor.x / viewport.x - 1.0,
        1.0 - 2.0 * cursor.y / viewport.y,
    );
    let clip_to_world = Mat4::from_cols_array(&inverse(&(camera.projection * camera.view).to_cols_array())?);

    let near = clip_to_world.project_point3(ndc.extend(-1.0));
    let far = clip_to_world.project_point3(ndc.extend(1.0));
    let direction = (far - near).try_normalize()?;
    Some(Ray { origin: near, direction })
}

/// Slab test against an axis-aligned box. Returns the distance to the first
/// surface in front of the origin.
pub fn ray_box_hit(ray: &Ray, center: Vec3, half_size: f32) -> Option<f32> {
    let min = center - Vec3::splat(half_size);
    let max = center + Vec3::splat(half_size);
    let mut t_near = f32::NEG_INFINITY;
    let mut t_far = f32::INFINITY;

    for axis in 0..3 {
        let (o, d) = (ray.origin[axis], ray.direction[axis]);
        if d.abs() < PARALLEL_EPS {
            if o < min[axis] || o > max[axis] {
                return None;
            }
            continue;
        }
        let (mut t0, mut t1) = ((min[axis] - o) / d, (max[axis] - o) / d);
        if t0 > t1 {
            std::mem::swap(&mut t0, &mut t1);
        }
        t_near = t_near.max(t0);
        t_far = t_far.min(t1);
        if t_near > t_far {
            return None;
        }
    }

    if t_far < 0.0 {
        return None;
    }
    Some(if t_near >= 0.0 { t_near } else { t_far })
}

/// Index of the nearest cube hit by `ray`.
pub fn pick_nearest_cube(ray: &Ray, centers: &[Vec3], half_size: f32) -> Option<usize> {
    centers
        .iter()
        .enumerate()
        .filter_map(|(i, c)| ray_box_hit(ray, *c, half_size).map(|t| (i, t)))
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(i, _)| i)
}

/// Where a point dragged along `ray` ends up. Without `vertical` it slides
/// in the horizontal plane through `anchor`; with it, it moves along the
/// vertical pole through `anchor` to the spot closest to the ray.
pub fn drag_point(ray: &Ray, anchor: Vec3, vertical: bool) -> Option<Vec3> {
    if vertical {
        let w0 = ray.origin - anchor;
        let b = ray.direction.y;
        let denom = ray.direction.length_squared() - b * b;
        if denom < PARALLEL_EPS {
            return None;
        }
        let s = (ray.direction.length_squared() * w0.y - b * ray.direction.dot(w0)) / denom;
        Some(Vec3::new(anchor.x, anchor.y + s, anchor.z))
    } else {
        if ray.direction.y.abs() < PARALLEL_EPS {
            return None;
        }
        let t = (anchor.y - ray.origin.y) / ray.direction.y;
        if t < 0.0 {
            return None;
        }
        let hit = ray.at(t);
        Some(Vec3::new(hit.x, anchor.y, hit.z))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VIEWPORT: Vec2 = Vec2::new(800.0, 600.0);

    fn front_camera() -> CameraView {
        let view = Mat4::look_at_rh(Vec3::new(0.0, 0.0, 100.0), Vec3::ZERO, Vec3::Y);
        let projection = Mat4::perspective_rh_gl(40f32.to_radians(), VIEWPORT.x / VIEWPORT.y, 1.0, 1000.0);
        CameraView::new(view, projection)
    }

    fn screen_position(camera: &CameraView, point: Vec3) -> Vec2 {
        let clip = camera.projection * camera.view * point.extend(1.0);
        let ndc = Vec2::new(clip.x, clip.y) / clip.w;
        Vec2::new((ndc.x + 1.0) * 0.5 * VIEWPORT.x, (1.0 - ndc.y) * 0.5 * VIEWPORT.y)
    }

    #[test]
    fn center_ray_looks_down_the_view_axis() {
        let ray = cursor_ray(&front_camera(), VIEWPORT / 2.0, VIEWPORT).unwrap();
        assert!((ray.origin - Vec3::new(0.0, 0.0, 99.0)).length() < 1e-2);
        assert!((ray.direction - Vec3::NEG_Z).length() < 1e-4);
    }

    #[test]
    fn no_ray_without_a_viewport_or_inverse() {
        assert!(cursor_ray(&front_camera(), Vec2::ZERO, Vec2::ZERO).is_none());
        let singular = CameraView::new(Mat4::ZERO, Mat4::IDENTITY);
        assert!(cursor_ray(&singular, Vec2::ZERO, VIEWPORT).is_none());
    }

    #[test]
    fn clicking_a_cube_selects_it() {
        let camera = front_camera();
        let points = [Vec3::new(-20.0, 0.0, 0.0), Vec3::new(20.0, 10.0, 0.0), Vec3::new(0.0, -15.0, 0.0)];

        for (i, point) in points.iter().enumerate() {
            let ray = cursor_ray(&camera, screen_position(&camera, *point), VIEWPORT).unwrap();
            assert_eq!(pick_nearest_cube(&ray, &points, 2.5), Some(i));
        }
    }

    #[test]
    fn clicking_empty_space_selects_nothing() {
        let camera = front_camera();
        let points = [Vec3::new(-20.0, 0.0, 0.0), Vec3::new(20.0, 10.0, 0.0)];
        let ray = cursor_ray(&camera, Vec2::new(5.0, 5.0), VIEWPORT).unwrap();
        assert_eq!(pick_nearest_cube(&ray, &points, 2.5), None);

        // Behind the camera.
        let behind = [Vec3::new(0.0, 0.0, 150.0)];
        let ray = cursor_ray(&camera, VIEWPORT / 2.0, VIEWPORT).unwrap();
        assert_eq!(pick_nearest_cube(&ray, &behind, 2.5), None);
    }

    #[test]
    fn nearest_of_overlapping_cubes_wins() {
        let ray = cursor_ray(&front_camera(), VIEWPORT / 2.0, VIEWPORT).unwrap();
        let points = [Vec3::new(0.0, 0.0, -40.0), Vec3::new(0.0, 0.0, 30.0), Vec3::ZERO];
        assert_eq!(pick_nearest_cube(&ray, &points, 2.5), Some(1));
    }

    #[test]
    fn top_camera_picks_straight_down() {
        let camera = CameraView::top_down(VIEWPORT.x / VIEWPORT.y);
        let point = Vec3::new(30.0, 5.0, -20.0);
        let ray = cursor_ray(&camera, screen_position(&camera, point), VIEWPORT).unwrap();
        assert!(ray.direction.y.abs() > 0.999);
        assert_eq!(pick_nearest_cube(&ray, &[point], 2.5), Some(0));
    }

    #[test]
    fn horizontal_drag_keeps_the_height() {
        let ray = Ray {
            origin: Vec3::new(10.0, 100.0, 20.0),
            direction: Vec3::NEG_Y,
        };
        assert_eq!(drag_point(&ray, Vec3::new(0.0, 5.0, 0.0), false), Some(Vec3::new(10.0, 5.0, 20.0)));

        let level = Ray {
            origin: Vec3::new(0.0, 10.0, 0.0),
            direction: Vec3::X,
        };
        assert_eq!(drag_point(&level, Vec3::new(0.0, 5.0, 0.0), false), None);
    }

    #[test]
    fn vertical_drag_stays_on_the_pole() {
        let ray = Ray {
            origin: Vec3::new(50.0, 30.0, 0.0),
            direction: Vec3::NEG_X,
        };
        let moved = drag_point(&ray, Vec3::new(0.0, 5.0, 0.0), true).unwrap();
        assert!((moved - Vec3::new(0.0, 30.0, 0.0)).length() < 1e-4);

        let down = Ray {
            origin: Vec3::new(0.0, 50.0, 0.0),
            direction: Vec3::NEG_Y,
        };
        assert_eq!(drag_point(&down, Vec3::ZERO, true), None);
    }

    #[test]
    fn projected_point_round_trips_through_the_ray() {
        let camera = front_camera();
        let point = Vec3::new(12.0, -7.0, -30.0);
        let ray = cursor_ray(&camera, screen_position(&camera, point), VIEWPORT).unwrap();
        let to_point = point - ray.origin;
        let off_axis = to_point - ray.direction * to_point.dot(ray.direction);
        assert!(off_axis.length() < 1e-2, "{off_axis:?}");
    }
}
