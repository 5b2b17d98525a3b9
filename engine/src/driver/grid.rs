//! Vertical stack layout.

use std::any::Any;

use super::{Layout, ProjectileDriver};
use crate::math::Vec3;
use crate::node::Node;

pub const DEFAULT_ROW_SPACING: f32 = 30.0;

/// Child `i` sits at local `(0, 0, -i * row_spacing)`.
#[derive(Debug, Clone)]
pub struct GridLayout {
    pub row_spacing: f32,
}

impl Default for GridLayout {
    fn default() -> Self {
        Self {
            row_spacing: DEFAULT_ROW_SPACING,
        }
    }
}

impl Layout for GridLayout {
    fn update_layout(&mut self, _driver: &ProjectileDriver, children: &[Node], _dt: f32) {
        for (i, child) in children.iter().enumerate() {
            child.set_local_position(Vec3::new(0.0, 0.0, -(i as f32) * self.row_spacing));
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
