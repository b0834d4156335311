use bevy::math::{Mat3, Mat4, Vec3, Vec4};

/// Inverts a 4x4 matrix stored as 16 floats using the closed-form adjugate.
///
/// The layout only has to be consistent with the caller: the inverse of the
/// transpose is the transpose of the inverse, so column-major and row-major
/// inputs both come back in their own layout. Returns `None` when the
/// determinant is exactly zero or the result would not be finite.
pub fn inverse(m: &[f32; 16]) -> Option<[f32; 16]> {
    let mut inv = [0.0f32; 16];

    inv[0] = m[5] * m[10] * m[15] - m[5] * m[11] * m[14] - m[9] * m[6] * m[15]
        + m[9] * m[7] * m[14]
        + m[13] * m[6] * m[11]
        - m[13] * m[7] * m[10];
    inv[4] = -m[4] * m[10] * m[15] + m[4] * m[11] * m[14] + m[8] * m[6] * m[15]
        - m[8] * m[7] * m[14]
        - m[12] * m[6] * m[11]
        + m[12] * m[7] * m[10];
    inv[8] = m[4] * m[9] * m[15] - m[4] * m[11] * m[13] - m[8] * m[5] * m[15]
        + m[8] * m[7] * m[13]
        + m[12] * m[5] * m[11]
        - m[12] * m[7] * m[9];
    inv[12] = -m[4] * m[9] * m[14] + m[4] * m[10] * m[13] + m[8] * m[5] * m[14]
        - m[8] * m[6] * m[13]
        - m[12] * m[5] * m[10]
        + m[12] * m[6] * m[9];
    inv[1] = -m[1] * m[10] * m[15] + m[1] * m[11] * m[14] + m[9] * m[2] * m[15]
        - m[9] * m[3] * m[14]
        - m[13] * m[2] * m[11]
        + m[13] * m[3] * m[10];
    inv[5] = m[0] * m[10] * m[15] - m[0] * m[11] * m[14] - m[8] * m[2] * m[15]
        + m[8] * m[3] * m[14]
        + m[12] * m[2] * m[11]
        - m[12] * m[3] * m[10];
    inv[9] = -m[0] * m[9] * m[15] + m[0] * m[11] * m[13] + m[8] * m[1] * m[15]
        - m[8] * m[3] * m[13]
        - m[12] * m[1] * m[11]
        + m[12] * m[3] * m[9];
    inv[13] = m[0] * m[9] * m[14] - m[0] * m[10] * m[13] - m[8] * m[1] * m[14]
        + m[8] * m[2] * m[13]
        + m[12] * m[1] * m[10]
        - m[12] * m[2] * m[9];
    inv[2] = m[1] * m[6] * m[15] - m[1] * m[7] * m[14] - m[5] * m[2] * m[15]
        + m[5] * m[3] * m[14]
        + m[13] * m[2] * m[7]
        - m[13] * m[3] * m[6];
    inv[6] = -m[0] * m[6] * m[15] + m[0] * m[7] * m[14] + m[4] * m[2] * m[15]
        - m[4] * m[3] * m[14]
        - m[12] * m[2] * m[7]
        + m[12] * m[3] * m[6];
    inv[10] = m[0] * m[5] * m[15] - m[0] * m[7] * m[13] - m[4] * m[1] * m[15]
        + m[4] * m[3] * m[13]
        + m[12] * m[1] * m[7]
        - m[12] * m[3] * m[5];
    inv[14] = -m[0] * m[5] * m[14] + m[0] * m[6] * m[13] + m[4] * m[1] * m[14]
        - m[4] * m[2] * m[13]
        - m[12] * m[1] * m[6]
        + m[12] * m[2] * m[5];
    inv[3] = -m[1] * m[6] * m[11] + m[1] * m[7] * m[10] + m[5] * m[2] * m[11]
        - m[5] * m[3] * m[10]
        - m[9] * m[2] * m[7]
        + m[9] * m[3] * m[6];
    inv[7] = m[0] * m[6] * m[11] - m[0] * m[7] * m[10] - m[4] * m[2] * m[11]
        + m[4] * m[3] * m[10]
        + m[8] * m[2] * m[7]
        - m[8] * m[3] * m[6];
    inv[11] = -m[0] * m[5] * m[11] + m[0] * m[7] * m[9] + m[4] * m[1] * m[11]
        - m[4] * m[3] * m[9]
        - m[8] * m[1] * m[7]
        + m[8] * m[3] * m[5];
    inv[15] = m[0] * m[5] * m[10] - m[0] * m[6] * m[9] - m[4] * m[1] * m[10]
        + m[4] * m[2] * m[9]
        + m[8] * m[1] * m[6]
        - m[8] * m[2] * m[5];

    let det = m[0] * inv[0] + m[1] * inv[4] + m[2] * inv[8] + m[3] * inv[12];
    if det == 0.0 {
        return None;
    }

    let inv_det = 1.0 / det;
    for value in inv.iter_mut() {
        *value *= inv_det;
    }

    if inv.iter().all(|v| v.is_finite()) {
        Some(inv)
    } else {
        None
    }
}

/// Camera world position recovered from a view matrix: the translation column
/// of its inverse. `None` means "unknown this frame".
pub fn camera_position(view: &Mat4) -> Option<Vec3> {
    let inv = inverse(&view.to_cols_array())?;
    Some(Vec3::new(inv[12], inv[13], inv[14]))
}

/// Keeps only the rotational part of a view matrix, for geometry that should
/// appear infinitely far away.
pub fn strip_translation(view: &Mat4) -> Mat4 {
    Mat4::from_mat3(Mat3::from_mat4(*view))
}

/// Mirror transform across the horizontal plane `y = height`.
pub fn reflection_about_height(height: f32) -> Mat4 {
    Mat4::from_cols(
        Vec4::new(1.0, 0.0, 0.0, 0.0),
        Vec4::new(0.0, -1.0, 0.0, 0.0),
        Vec4::new(0.0, 0.0, 1.0, 0.0),
        Vec4::new(0.0, 2.0 * height, 0.0, 1.0),
    )
}

/// Plane equation `a*x + b*y + c*z + d`; points with a negative value are
/// clipped while clipping is enabled.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClipPlane(pub Vec4);

impl ClipPlane {
    /// Keeps everything above `height` (reflection pass).
    pub fn above(height: f32) -> Self {
        Self(Vec4::new(0.0, 1.0, 0.0, -height))
    }

    /// Keeps everything below `height` (refraction pass).
    pub fn below(height: f32) -> Self {
        Self(Vec4::new(0.0, -1.0, 0.0, height))
    }

    pub fn distance(&self, point: Vec3) -> f32 {
        self.0.truncate().dot(point) + self.0.w
    }

    pub fn to_array(self) -> [f32; 4] {
        self.0.to_array()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy::math::Quat;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn assert_identity(m: &Mat4) {
        let identity = Mat4::IDENTITY.to_cols_array();
        for (got, want) in m.to_cols_array().iter().zip(identity.iter()) {
            assert!((got - want).abs() < 1e-4, "{m:?} is not identity");
        }
    }

    #[test]
    fn identity_inverts_to_identity() {
        let inv = inverse(&Mat4::IDENTITY.to_cols_array()).unwrap();
        assert_eq!(inv, Mat4::IDENTITY.to_cols_array());
    }

    #[test]
    fn all_zero_matrix_is_singular() {
        assert!(inverse(&[0.0; 16]).is_none());
    }

    #[test]
    fn rank_deficient_matrix_is_singular() {
        let m = Mat4::from_scale(Vec3::new(1.0, 0.0, 1.0));
        assert!(inverse(&m.to_cols_array()).is_none());
    }

    #[test]
    fn random_affine_transforms_invert() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for _ in 0..64 {
            let rotation = Quat::from_euler(
                bevy::math::EulerRot::XYZ,
                rng.gen_range(-3.0..3.0),
                rng.gen_range(-3.0..3.0),
                rng.gen_range(-3.0..3.0),
            );
            let scale = Vec3::new(
                rng.gen_range(0.5..2.0),
                rng.gen_range(0.5..2.0),
                rng.gen_range(0.5..2.0),
            );
            let translation = Vec3::new(
                rng.gen_range(-20.0..20.0),
                rng.gen_range(-20.0..20.0),
                rng.gen_range(-20.0..20.0),
            );
            let m = Mat4::from_scale_rotation_translation(scale, rotation, translation);
            let inv = Mat4::from_cols_array(&inverse(&m.to_cols_array()).unwrap());
            assert_identity(&(inv * m));
        }
    }

    #[test]
    fn camera_position_comes_from_look_at_eye() {
        let eye = Vec3::new(12.0, 40.0, -7.5);
        let view = Mat4::look_at_rh(eye, Vec3::ZERO, Vec3::Y);
        let pos = camera_position(&view).unwrap();
        assert!((pos - eye).length() < 1e-3);
    }

    #[test]
    fn stripped_view_keeps_rotation_only() {
        let view = Mat4::look_at_rh(Vec3::new(3.0, 4.0, 5.0), Vec3::ZERO, Vec3::Y);
        let stripped = strip_translation(&view);
        assert_eq!(stripped.w_axis, Vec4::W);
        assert_eq!(stripped.x_axis.truncate(), view.x_axis.truncate());
    }

    #[test]
    fn reflection_mirrors_points_across_water() {
        let mirror = reflection_about_height(60.0);
        let p = mirror.transform_point3(Vec3::new(1.0, 80.0, -2.0));
        assert!((p - Vec3::new(1.0, 40.0, -2.0)).length() < 1e-5);
    }

    #[test]
    fn clip_planes_keep_opposite_halves() {
        let above = ClipPlane::above(60.0);
        let below = ClipPlane::below(60.0);
        let high = Vec3::new(0.0, 70.0, 0.0);
        let low = Vec3::new(0.0, 50.0, 0.0);
        assert!(above.distance(high) > 0.0 && above.distance(low) < 0.0);
        assert!(below.distance(low) > 0.0 && below.distance(high) < 0.0);
        assert_eq!(above.to_array(), [0.0, 1.0, 0.0, -60.0]);
        assert_eq!(below.to_array(), [0.0, -1.0, 0.0, 60.0]);
    }
}
