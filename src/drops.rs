//! Ripple bookkeeping: drops created from pick readbacks and expired by age.

use bevy::math::Vec2;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DropId(pub u64);

/// A ripple origin on the water surface.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Drop {
    pub id: DropId,
    /// Surface coordinate in `[0, 1]^2`.
    pub origin: Vec2,
    /// Simulation time at creation.
    pub time: f32,
    pub radius: f32,
    pub keep_time: f32,
}

impl Drop {
    pub fn deadline(&self) -> f32 {
        self.time + self.keep_time
    }

    /// Alive from `time` through `time + keep_time` inclusive.
    pub fn is_alive(&self, now: f32) -> bool {
        now <= self.deadline()
    }
}

/// Drops in creation order.
#[derive(Clone, Debug, Default)]
pub struct DropList {
    drops: Vec<Drop>,
    next_id: u64,
}

impl DropList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, origin: Vec2, time: f32, radius: f32, keep_time: f32) -> DropId {
        let id = DropId(self.next_id);
        self.next_id += 1;
        self.drops.push(Drop {
            id,
            origin,
            time,
            radius,
            keep_time,
        });
        id
    }

    /// Drops every ripple older than its keep time, preserving the order of
    /// the rest. Returns how many were removed.
    pub fn expire(&mut self, now: f32) -> usize {
        let before = self.drops.len();
        self.drops.retain(|drop| drop.is_alive(now));
        before - self.drops.len()
    }

    /// Ripples alive at `now`, without mutating the list.
    pub fn active_at(&self, now: f32) -> impl Iterator<Item = &Drop> {
        self.drops.iter().filter(move |drop| drop.is_alive(now))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Drop> {
        self.drops.iter()
    }

    pub fn len(&self) -> usize {
        self.drops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drops.is_empty()
    }
}

/// Decodes a pick-target texel. Blue == 1.0 is the "no surface" sentinel;
/// anything else carries the surface coordinate in red/green.
pub fn decode_pick(texel: [f32; 4]) -> Option<Vec2> {
    if texel[2] == 1.0 {
        None
    } else {
        Some(Vec2::new(texel[0], texel[1]))
    }
}

/// Converts a top-left-origin cursor position to the bottom-left-origin pixel
/// the render targets use. Row 0 of the cursor is row `height - 1` of the
/// target.
pub fn flip_cursor_y(cursor: Vec2, window_height: f32) -> (u32, u32) {
    let x = cursor.x.max(0.0) as u32;
    let row = cursor.y.max(0.0).floor();
    let y = (window_height - 1.0 - row).max(0.0) as u32;
    (x, y)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drop_lives_through_its_keep_time() {
        let mut drops = DropList::new();
        drops.push(Vec2::new(0.25, 0.75), 2.0, 0.1, 1.5);

        for now in [2.0, 2.5, 3.0, 3.5] {
            assert_eq!(drops.active_at(now).count(), 1, "missing at {now}");
        }
        assert_eq!(drops.active_at(3.51).count(), 0);

        assert_eq!(drops.expire(3.5), 0);
        assert_eq!(drops.expire(3.6), 1);
        assert!(drops.is_empty());
    }

    #[test]
    fn drop_is_alive_at_its_exact_deadline() {
        for i in 1..200 {
            for j in 1..200 {
                let (t0, keep) = (i as f32 * 0.1, j as f32 * 0.1);
                let mut drops = DropList::new();
                drops.push(Vec2::ZERO, t0, 0.1, keep);
                assert_eq!(drops.active_at(t0 + keep).count(), 1, "t0 = {t0}, keep = {keep}");
                assert_eq!(drops.expire(t0 + keep), 0, "t0 = {t0}, keep = {keep}");
            }
        }
    }

    #[test]
    fn expiry_keeps_survivors_in_creation_order() {
        let mut drops = DropList::new();
        let a = drops.push(Vec2::ZERO, 0.0, 0.1, 10.0);
        drops.push(Vec2::ZERO, 0.0, 0.1, 1.0);
        drops.push(Vec2::ZERO, 0.5, 0.1, 0.2);
        let d = drops.push(Vec2::ZERO, 1.0, 0.1, 5.0);

        assert_eq!(drops.expire(2.0), 2);
        let ids: Vec<DropId> = drops.iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![a, d]);
    }

    #[test]
    fn ids_are_never_reused() {
        let mut drops = DropList::new();
        let first = drops.push(Vec2::ZERO, 0.0, 0.1, 0.0);
        drops.expire(1.0);
        let second = drops.push(Vec2::ZERO, 1.0, 0.1, 0.0);
        assert_ne!(first, second);
    }

    #[test]
    fn sentinel_blue_is_a_miss() {
        assert_eq!(decode_pick([0.3, 0.4, 1.0, 1.0]), None);
        assert_eq!(decode_pick([0.3, 0.4, 0.0, 1.0]), Some(Vec2::new(0.3, 0.4)));
        assert_eq!(decode_pick([0.0, 0.0, 0.3, 0.0]), Some(Vec2::ZERO));
    }

    #[test]
    fn cursor_row_is_flipped() {
        assert_eq!(flip_cursor_y(Vec2::new(10.0, 0.0), 720.0), (10, 719));
        assert_eq!(flip_cursor_y(Vec2::new(10.0, 719.0), 720.0), (10, 0));
        assert_eq!(flip_cursor_y(Vec2::new(10.0, 700.6), 720.0), (10, 19));
        assert_eq!(flip_cursor_y(Vec2::new(-4.0, 800.0), 720.0), (0, 0));
    }
}
