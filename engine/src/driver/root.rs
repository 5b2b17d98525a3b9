//! Root container layout: children keep their own local positions.

use std::any::Any;

use super::{Layout, ProjectileDriver};
use crate::node::Node;

#[derive(Debug, Default)]
pub struct RootLayout;

impl Layout for RootLayout {
    fn update_layout(&mut self, _driver: &ProjectileDriver, _children: &[Node], _dt: f32) {}

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::driver::ProjectileDriver;
    use crate::math::Vec3;
    use crate::projectile::ControlledProjectile;
    use crate::sim::Simulation;

    #[test]
    fn test_root_keeps_manual_positions() {
        let sim = Simulation::new(2);
        let root = ProjectileDriver::root(&sim.engine);
        let p = ControlledProjectile::new(&sim.engine);
        p.base().set_local_position(Vec3::new(0.0, 0.0, -10.0));
        root.add_child(Arc::clone(&p));
        root.set_visible(true);
        sim.frame(0.016);
        assert_eq!(p.base().local_position(), Vec3::new(0.0, 0.0, -10.0));
    }
}
