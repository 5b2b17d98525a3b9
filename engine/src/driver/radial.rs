//! Concentric ring layout in the local X–Z plane.
//!
//! Ring 0 is the single center slot. Ring `n` has radius `n * row_distance`
//! and holds `round(2π·n·row_distance / item_spacing)` items, at least one.
//! When everything fits on ring 1 the items spread evenly around it instead
//! of packing from angle zero. Hidden children are skipped.

use std::any::Any;
use std::f32::consts::{FRAC_PI_2, PI, TAU};

use super::{Layout, ProjectileDriver};
use crate::math::Vec3;
use crate::node::Node;

pub const DEFAULT_ITEM_SPACING: f32 = 15.0;
pub const DEFAULT_ROW_DISTANCE: f32 = 15.0;

#[derive(Debug, Clone)]
pub struct RadialLayout {
    pub item_spacing: f32,
    pub row_distance: f32,
}

impl Default for RadialLayout {
    fn default() -> Self {
        Self {
            item_spacing: DEFAULT_ITEM_SPACING,
            row_distance: DEFAULT_ROW_DISTANCE,
        }
    }
}

impl RadialLayout {
    pub fn ring_capacity(&self, ring: usize) -> usize {
        if ring == 0 {
            return 1;
        }
        let circumference = TAU * ring as f32 * self.row_distance;
        ((circumference / self.item_spacing).round() as usize).max(1)
    }

    /// Two outer items sit left and right; more start from the top.
    fn start_angle(outer: usize) -> f32 {
        if outer == 2 {
            PI
        } else {
            FRAC_PI_2
        }
    }

    /// Local position of the `index`-th visible item out of `total`.
    pub fn position(&self, index: usize, total: usize) -> Vec3 {
        if total <= 1 || index == 0 {
            return Vec3::ZERO;
        }

        if total <= self.ring_capacity(1) + 1 {
            let outer = total - 1;
            let angle = Self::start_angle(outer) - ((index - 1) as f32 / outer as f32) * TAU;
            return on_ring(self.row_distance, angle);
        }

        let mut first = 1;
        let mut ring = 1;
        loop {
            let capacity = self.ring_capacity(ring);
            if index < first + capacity {
                let slot = index - first;
                let angle = (slot as f32 / capacity as f32) * TAU;
                return on_ring(ring as f32 * self.row_distance, angle);
            }
            first += capacity;
            ring += 1;
        }
    }
}

fn on_ring(radius: f32, angle: f32) -> Vec3 {
    Vec3::new(radius * angle.cos(), 0.0, radius * angle.sin())
}

impl Layout for RadialLayout {
    fn update_layout(&mut self, _driver: &ProjectileDriver, children: &[Node], _dt: f32) {
        let visible: Vec<&Node> = children.iter().filter(|c| c.is_visible()).collect();
        let total = visible.len();
        for (index, child) in visible.into_iter().enumerate() {
            child.set_local_position(self.position(index, total));
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
