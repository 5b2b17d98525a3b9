//! Arc layout with slide-to-scroll.
//!
//! Items sit on a circle of `radius` in the local X–Z plane, `item_offset`
//! of arc length apart. The arc is shifted so the point facing `forward`
//! lands on the driver origin. Grabbing any non-anchor item slides the arc
//! by the angle the hand sweeps around the center.

use std::any::Any;
use std::f32::consts::{PI, TAU};

use tracing::trace;

use super::{Layout, ProjectileDriver};
use crate::host::NodeRef;
use crate::math::Vec3;
use crate::node::{InputEvent, InputEventType, Node};

pub const DEFAULT_RADIUS: f32 = 60.0;
pub const DEFAULT_VISIBLE_ITEM_RANGE: f32 = 0.35;
pub const DEFAULT_ITEM_OFFSET: f32 = 15.0;

struct SlideGrab {
    hand: NodeRef,
    start_angle: f32,
    start_offset: f32,
}

pub struct CurvedRowLayout {
    radius: f32,
    visible_item_range: f32,
    item_offset: f32,
    forward: Vec3,
    base_angle: f32,
    base_angle_initialized: bool,
    slide: Option<SlideGrab>,
}

impl Default for CurvedRowLayout {
    fn default() -> Self {
        Self {
            radius: DEFAULT_RADIUS,
            visible_item_range: DEFAULT_VISIBLE_ITEM_RANGE,
            item_offset: DEFAULT_ITEM_OFFSET,
            forward: Vec3::FORWARD,
            base_angle: 0.0,
            base_angle_initialized: false,
            slide: None,
        }
    }
}

impl CurvedRowLayout {
    pub fn radius(&self) -> f32 {
        self.radius
    }

    pub fn set_radius(&mut self, radius: f32) {
        self.radius = radius;
    }

    /// Fraction of a half turn on each side of forward that stays reachable.
    pub fn set_visible_item_range(&mut self, range: f32) {
        self.visible_item_range = range.clamp(0.0, 1.0);
    }

    pub fn visible_item_range(&self) -> f32 {
        self.visible_item_range
    }

    pub fn set_item_offset(&mut self, offset: f32) {
        self.item_offset = offset;
    }

    pub fn item_offset(&self) -> f32 {
        self.item_offset
    }

    /// Ignored when `direction` is near zero.
    pub fn set_forward_direction(&mut self, direction: Vec3) {
        if direction.length() > 0.001 {
            self.forward = direction.normalize();
        }
    }

    pub fn forward_direction(&self) -> Vec3 {
        self.forward
    }

    pub fn base_angle(&self) -> f32 {
        self.base_angle
    }

    pub fn is_slide_grabbing(&self) -> bool {
        self.slide.is_some()
    }

    fn angle_per_item(&self) -> f32 {
        self.item_offset / self.radius
    }

    /// Angle of `world` around the driver in its local X–Z plane.
    fn angle_of(driver: &ProjectileDriver, world: Vec3) -> f32 {
        let rotation = driver.world_rotation();
        let to = world - driver.world_position();
        to.dot(rotation.column(2)).atan2(to.dot(rotation.column(0)))
    }

    fn forward_angle(&self, driver: &ProjectileDriver) -> f32 {
        let rotation = driver.world_rotation();
        let x = self.forward.dot(rotation.column(0));
        let z = self.forward.dot(rotation.column(2));
        if x.abs() < 0.001 && z.abs() < 0.001 {
            return 0.0;
        }
        z.atan2(x)
    }

    /// `[min, max]` for the base angle that keeps one item in the window.
    fn offset_bounds(&self, forward: f32, count: usize) -> (f32, f32) {
        let half_arc = self.visible_item_range * PI;
        let max = forward + half_arc;
        let min = forward - half_arc - (count as f32 - 1.0) * self.angle_per_item();
        (min, max)
    }
}

fn normalize_angle(mut angle: f32) -> f32 {
    while angle > PI {
        angle -= TAU;
    }
    while angle < -PI {
        angle += TAU;
    }
    angle
}

impl Layout for CurvedRowLayout {
    fn update_layout(&mut self, driver: &ProjectileDriver, children: &[Node], _dt: f32) {
        if self.radius < 0.001 {
            return;
        }
        let visible: Vec<&Node> = children.iter().filter(|c| c.is_visible()).collect();
        let count = visible.len();
        let per_item = self.angle_per_item();
        let forward = self.forward_angle(driver);

        if !self.base_angle_initialized && count > 0 {
            let span = (count - 1) as f32 * per_item;
            self.base_angle = forward - span / 2.0;
            self.base_angle_initialized = true;
            trace!(
                "[curved-row '{}'] base angle {:.3} (forward {:.3}, {} items)",
                driver.base().id(),
                self.base_angle,
                forward,
                count
            );
        }

        if let Some(slide) = &self.slide {
            let current = Self::angle_of(driver, slide.hand.world_transform().position);
            let mut offset = slide.start_offset + normalize_angle(current - slide.start_angle);
            if count > 0 {
                let (min, max) = self.offset_bounds(forward, count);
                if min < max {
                    offset = offset.clamp(min, max);
                }
            }
            self.base_angle = offset;
        }

        let shift = Vec3::new(-self.radius * forward.cos(), 0.0, -self.radius * forward.sin());
        for (i, child) in visible.into_iter().enumerate() {
            let angle = self.base_angle + i as f32 * per_item;
            let on_arc = Vec3::new(self.radius * angle.cos(), 0.0, self.radius * angle.sin());
            child.set_local_position(on_arc + shift);
        }
    }

    fn on_event(&mut self, driver: &ProjectileDriver, event: &mut InputEvent, _children: &[Node]) -> bool {
        match event.kind {
            InputEventType::GrabStart => {
                if event.source_projectile().is_some_and(|p| p.is_anchor_handle()) {
                    return false;
                }
                let Some(hand) = event.hand_node.clone() else {
                    return false;
                };
                let start_angle = Self::angle_of(driver, hand.world_transform().position);
                trace!(
                    "[curved-row '{}'] slide grab at angle {:.3}, base {:.3}",
                    driver.base().id(),
                    start_angle,
                    self.base_angle
                );
                self.slide = Some(SlideGrab {
                    hand,
                    start_angle,
                    start_offset: self.base_angle,
                });
                true
            }
            InputEventType::GrabEnd => self.slide.take().is_some(),
            _ => false,
        }
    }

    fn on_clear(&mut self) {
        self.base_angle = 0.0;
        self.base_angle_initialized = false;
        self.slide = None;
    }

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

    use super::*;
    use crate::projectile::ControlledProjectile;
    use crate::sim::Simulation;

    fn curved_row_with(sim: &Simulation, n: usize) -> (Arc<ProjectileDriver>, Vec<Arc<ControlledProjectile>>) {
        let driver = ProjectileDriver::curved_row(&sim.engine);
        driver.layout_mut::<CurvedRowLayout, _>(|l| l.set_forward_direction(Vec3::new(0.0, 0.0, -1.0)));
        let items: Vec<_> = (0..n).map(|_| ControlledProjectile::new(&sim.engine)).collect();
        for p in &items {
            driver.add_child(Arc::clone(p));
        }
        (driver, items)
    }

    #[test]
    fn test_single_item_sits_at_origin() {
        let sim = Simulation::new(4);
        let (driver, items) = curved_row_with(&sim, 1);
        driver.update(0.016);
        assert!(items[0].base().local_position().length() < 1e-3);
    }

    #[test]
    fn test_items_are_centered_on_forward() {
        let sim = Simulation::new(4);
        let (driver, items) = curved_row_with(&sim, 3);
        driver.update(0.016);
        let middle = items[1].base().local_position();
        assert!(middle.length() < 1e-3);
        let left = items[0].base().local_position();
        let right = items[2].base().local_position();
        assert!((left.x + right.x).abs() < 1e-3);
        assert!((left.z - right.z).abs() < 1e-3);
    }

    #[test]
    fn test_slide_grab_is_clamped() {
        let sim = Simulation::new(4);
        let (driver, items) = curved_row_with(&sim, 3);
        driver.update(0.016);
        let before = driver.layout::<CurvedRowLayout, _>(|l| l.base_angle()).unwrap_or_default();

        sim.host.set_hand_position(true, Vec3::new(60.0, 0.0, 0.0));
        let hand = sim.engine.host().hand_node(true);
        let mut grab = InputEvent::new(
            InputEventType::GrabStart,
            Some(Node::Projectile(Arc::clone(&items[0]))),
            hand,
            true,
        );
        assert!(driver.on_event(&mut grab));

        // Sweep the hand half a turn around the center.
        sim.host.set_hand_position(true, Vec3::new(-60.0, 0.0, 1.0));
        driver.update(0.016);
        let after = driver.layout::<CurvedRowLayout, _>(|l| l.base_angle()).unwrap_or_default();
        let max = -std::f32::consts::FRAC_PI_2 + 0.35 * PI;
        assert!(after > before);
        assert!(after <= max + 1e-4);

        let mut release = InputEvent::new(InputEventType::GrabEnd, None, None, true);
        assert!(driver.on_event(&mut release));
        assert!(!driver.layout::<CurvedRowLayout, _>(|l| l.is_slide_grabbing()).unwrap_or(true));
    }

    #[test]
    fn test_clear_resets_base_angle() {
        let sim = Simulation::new(4);
        let (driver, _items) = curved_row_with(&sim, 2);
        driver.update(0.016);
        driver.clear();
        let initialized = driver.layout::<CurvedRowLayout, _>(|l| l.base_angle_initialized);
        assert_eq!(initialized, Some(false));
    }
}
