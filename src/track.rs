//! Track control points: selection by cursor pick or keyboard, and dragging.

use bevy::log::info;
use bevy::math::Vec3;

use crate::constants::CONTROL_POINT_HALF_SIZE;
use crate::picking::{drag_point, pick_nearest_cube, Ray};

#[derive(Clone, Debug, PartialEq)]
pub struct ControlPoints {
    points: Vec<Vec3>,
    selected: Option<usize>,
}

impl Default for ControlPoints {
    fn default() -> Self {
        Self::new(vec![
            Vec3::new(50.0, 5.0, 0.0),
            Vec3::new(0.0, 5.0, 50.0),
            Vec3::new(-50.0, 5.0, 0.0),
            Vec3::new(0.0, 5.0, -50.0),
        ])
    }
}

impl ControlPoints {
    pub fn new(points: Vec<Vec3>) -> Self {
        Self { points, selected: None }
    }

    pub fn points(&self) -> &[Vec3] {
        &self.points
    }

    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    pub fn selected_point(&self) -> Option<Vec3> {
        self.selected.and_then(|i| self.points.get(i).copied())
    }

    /// Selects the cube under `ray`, or clears the selection on a miss.
    pub fn pick(&mut self, ray: &Ray) -> Option<usize> {
        self.selected = pick_nearest_cube(ray, &self.points, CONTROL_POINT_HALF_SIZE);
        match self.selected {
            Some(i) => info!("Selected cube {}", i),
            None => info!("Selected cube none"),
        }
        self.selected
    }

    /// Moves the selected point to follow `ray`. Returns whether it moved.
    pub fn drag_selected(&mut self, ray: &Ray, vertical: bool) -> bool {
        let Some(i) = self.selected else {
            return false;
        };
        let Some(point) = self.points.get_mut(i) else {
            return false;
        };
        match drag_point(ray, *point, vertical) {
            Some(moved) if moved != *point => {
                *point = moved;
                true
            }
            _ => false,
        }
    }

    pub fn select_next(&mut self) {
        if self.points.is_empty() {
            return;
        }
        self.selected = Some(match self.selected {
            Some(i) => (i + 1) % self.points.len(),
            None => 0,
        });
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }
}
