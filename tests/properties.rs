use bevy::math::{Mat4, Quat, Vec2, Vec3};
use proptest::prelude::*;

use water_view::drops::{decode_pick, DropList};
use water_view::geometry::{wave_grid, GridSpec};
use water_view::math::inverse;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn wave_grid_counts_follow_cell_size(cell_size in 0.05f32..1.0, half_extent in 0.1f32..2.0) {
        let spec = GridSpec { cell_size, half_extent, height: 0.6 };
        let side = (2.0 * half_extent / cell_size).floor() as usize;
        let grid = wave_grid(&spec);

        prop_assert_eq!(spec.cells_per_side() as usize, side);
        prop_assert_eq!(grid.vertex_count(), side * side * 4);
        prop_assert_eq!(grid.index_count(), side * side * 6);
        prop_assert!(grid.indices.iter().all(|&i| (i as usize) < side * side * 4));
    }

    #[test]
    fn inverse_undoes_affine_transforms(
        translation in prop::array::uniform3(-100.0f32..100.0),
        axis in prop::array::uniform3(-1.0f32..1.0),
        angle in -3.0f32..3.0,
        scale in prop::array::uniform3(0.2f32..5.0),
    ) {
        let axis = Vec3::from(axis).try_normalize().unwrap_or(Vec3::Y);
        let m = Mat4::from_scale_rotation_translation(
            Vec3::from(scale),
            Quat::from_axis_angle(axis, angle),
            Vec3::from(translation),
        );
        let inv = Mat4::from_cols_array(&inverse(&m.to_cols_array()).unwrap());
        let product = inv * m;
        for (got, want) in product.to_cols_array().iter().zip(Mat4::IDENTITY.to_cols_array()) {
            prop_assert!((got - want).abs() < 1e-3, "{} vs {}", got, want);
        }
    }

    #[test]
    fn drop_is_active_exactly_through_its_keep_time(
        t0 in 0.0f32..100.0,
        keep in 0.01f32..10.0,
        fraction in 0.0f32..0.999,
        overshoot in 0.01f32..5.0,
    ) {
        let mut drops = DropList::new();
        drops.push(Vec2::splat(0.5), t0, 0.05, keep);

        prop_assert_eq!(drops.active_at(t0).count(), 1);
        prop_assert_eq!(drops.active_at(t0 + keep * fraction).count(), 1);
        prop_assert_eq!(drops.active_at(t0 + keep).count(), 1);
        prop_assert_eq!(drops.expire(t0 + keep), 0);
        prop_assert_eq!(drops.active_at(t0 + keep + overshoot).count(), 0);

        prop_assert_eq!(drops.expire(t0 + keep + overshoot), 1);
        prop_assert!(drops.is_empty());
    }

    #[test]
    fn pick_decoding_only_misses_on_the_sentinel(r in 0.0f32..1.0, g in 0.0f32..1.0, b in 0.0f32..0.999) {
        prop_assert_eq!(decode_pick([r, g, b, 1.0]), Some(Vec2::new(r, g)));
        prop_assert_eq!(decode_pick([r, g, 1.0, 1.0]), None);
    }
}

#[test]
fn singular_matrices_have_no_inverse() {
    assert!(inverse(&[0.0; 16]).is_none());
    let mut flat = Mat4::IDENTITY.to_cols_array();
    flat[5] = 0.0;
    assert!(inverse(&flat).is_none());
}
