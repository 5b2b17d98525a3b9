//! Semicircular nested rings with angular scrolling.
//!
//! Item 0 sits at the center. The rest fill half rings spanning `[0, π]`.
//! While everything fits in `max_rings` rings the items are placed
//! statically, with a partly filled ring centered. Past that capacity the
//! wheel scrolls: items are assigned by a racing fill, where the next item
//! goes to whichever ring has the lowest leading angle (inner ring on ties),
//! so every ring advances at a comparable rate. Only items whose base angle
//! lies in `[offset, offset + π]` are shown.

use std::any::Any;
use std::f32::consts::{FRAC_PI_2, PI};

use tracing::{info, trace};

use super::scroll::{clamp_offset, snap_offset, ScrollTracker};
use super::{set_child_shown, Layout, ProjectileDriver};
use crate::math::Vec3;
use crate::node::{InputEvent, InputEventType, Node};

pub const DEFAULT_ITEM_SPACING: f32 = 15.0;
pub const DEFAULT_ROW_DISTANCE: f32 = 15.0;
pub const DEFAULT_MAX_RINGS: usize = 2;
/// Radians of scroll per unit of hand travel.
pub const DEFAULT_SCROLL_SENSITIVITY: f32 = 0.045;

const SNAP_RADIANS: f32 = 12.0 * PI / 180.0;
/// Sideways hand travel below this sets no scroll direction.
const DIRECTION_THRESHOLD: f32 = 0.01;

pub struct HalfWheelLayout {
    pub item_spacing: f32,
    pub row_distance: f32,
    /// Center to ring 1; defaults to `row_distance`.
    pub first_ring_spacing: Option<f32>,
    /// Zero means unlimited rings and no scrolling.
    pub max_rings: usize,
    pub scroll_sensitivity: f32,
    scroll_offset: f32,
    scroll: ScrollTracker,
    count: usize,
}

impl Default for HalfWheelLayout {
    fn default() -> Self {
        Self {
            item_spacing: DEFAULT_ITEM_SPACING,
            row_distance: DEFAULT_ROW_DISTANCE,
            first_ring_spacing: None,
            max_rings: DEFAULT_MAX_RINGS,
            scroll_sensitivity: DEFAULT_SCROLL_SENSITIVITY,
            scroll_offset: 0.0,
            scroll: ScrollTracker::default(),
            count: 0,
        }
    }
}

impl HalfWheelLayout {
    pub fn ring_radius(&self, ring: usize) -> f32 {
        if ring == 0 {
            return 0.0;
        }
        let first = self.first_ring_spacing.unwrap_or(self.row_distance);
        first + (ring - 1) as f32 * self.row_distance
    }

    pub fn half_ring_capacity(&self, ring: usize) -> usize {
        if ring == 0 {
            return 1;
        }
        let arc = PI * self.ring_radius(ring);
        ((arc / self.item_spacing).round() as usize).max(1)
    }

    /// Items shown without scrolling, center included.
    pub fn max_visible_items(&self) -> usize {
        if self.max_rings == 0 {
            return usize::MAX;
        }
        1 + (1..=self.max_rings).map(|r| self.half_ring_capacity(r)).sum::<usize>()
    }

    pub fn can_scroll(&self) -> bool {
        self.max_rings > 0 && self.count > self.max_visible_items()
    }

    pub fn is_scrolling(&self) -> bool {
        self.scroll.is_active()
    }

    pub fn scroll_offset(&self) -> f32 {
        self.scroll_offset
    }

    pub fn set_scroll_offset(&mut self, offset: f32) {
        self.scroll_offset = clamp_offset(offset, self.max_scroll_offset());
    }

    /// `(ring, base angle)` of each item from 1 to `count - 1` under the
    /// racing fill.
    pub fn racing_positions(&self, count: usize) -> Vec<(usize, f32)> {
        let rings = self.max_rings.max(1);
        let steps: Vec<f32> = (1..=rings)
            .map(|r| {
                let capacity = self.half_ring_capacity(r);
                if capacity > 1 {
                    PI / (capacity - 1) as f32
                } else {
                    PI
                }
            })
            .collect();
        let mut leading = vec![0.0f32; rings];
        let mut out = Vec::with_capacity(count.saturating_sub(1));
        for _ in 1..count {
            let mut behind = 0;
            for r in 1..rings {
                if leading[r] < leading[behind] {
                    behind = r;
                }
            }
            out.push((behind + 1, leading[behind]));
            leading[behind] += steps[behind];
        }
        out
    }

    /// `(ring, angle)` of item `index` when the wheel does not scroll.
    pub fn static_position(&self, index: usize, total: usize) -> (usize, f32) {
        if index == 0 {
            return (0, FRAC_PI_2);
        }
        let mut ring_start = 1;
        let mut ring = 1;
        while index >= ring_start + self.half_ring_capacity(ring) {
            ring_start += self.half_ring_capacity(ring);
            ring += 1;
        }
        let capacity = self.half_ring_capacity(ring);
        let slot = index - ring_start;
        let in_ring = if total <= ring_start + capacity {
            total - ring_start
        } else {
            capacity
        };

        let angle = if in_ring == 1 {
            FRAC_PI_2
        } else {
            let step = PI / (capacity - 1) as f32;
            if in_ring == capacity {
                slot as f32 * step
            } else {
                let span = step * (in_ring - 1) as f32;
                (PI - span) / 2.0 + slot as f32 * step
            }
        };
        (ring, angle)
    }

    pub fn max_scroll_offset(&self) -> f32 {
        if !self.can_scroll() || self.count <= 1 {
            return 0.0;
        }
        let max_angle = self
            .racing_positions(self.count)
            .into_iter()
            .map(|(_, angle)| angle)
            .fold(0.0f32, f32::max);
        (max_angle - PI).max(0.0)
    }

    fn position(&self, ring: usize, angle: f32) -> Vec3 {
        if ring == 0 {
            return Vec3::ZERO;
        }
        let radius = self.ring_radius(ring);
        Vec3::new(radius * angle.cos(), 0.0, radius * angle.sin())
    }

    fn end_scrolling(&mut self, driver: &ProjectileDriver) {
        if !self.scroll.end() {
            return;
        }
        let max = self.max_scroll_offset();
        let stops: Vec<f32> = self
            .racing_positions(self.count)
            .into_iter()
            .map(|(_, angle)| angle)
            .filter(|&angle| angle > 0.0 && angle < max)
            .collect();
        if let Some(snapped) = snap_offset(self.scroll_offset, max, stops, SNAP_RADIANS) {
            trace!(
                "[half-wheel '{}'] snap {:.3} -> {:.3} rad",
                driver.base().id(),
                self.scroll_offset,
                snapped
            );
            self.scroll_offset = snapped;
        }
        info!(
            "[half-wheel '{}'] ended scrolling at {:.1} degrees",
            driver.base().id(),
            self.scroll_offset.to_degrees()
        );
    }
}

impl Layout for HalfWheelLayout {
    fn before_update(&mut self, driver: &ProjectileDriver, _children: &[Node]) {
        let Some(delta) = self.scroll.take_delta(driver) else {
            return;
        };
        let direction = if delta.x < -DIRECTION_THRESHOLD {
            -1.0
        } else if delta.x > DIRECTION_THRESHOLD {
            1.0
        } else {
            0.0
        };
        let next = self.scroll_offset + direction * delta.length() * self.scroll_sensitivity;
        self.scroll_offset = clamp_offset(next, self.max_scroll_offset());
    }

    fn update_layout(&mut self, _driver: &ProjectileDriver, children: &[Node], _dt: f32) {
        let total = children.len();
        if total == 0 {
            return;
        }
        let scrolling = self.max_rings > 0 && total > self.max_visible_items();
        let racing = if scrolling { self.racing_positions(total) } else { Vec::new() };

        for (i, child) in children.iter().enumerate() {
            let (shown, position) = if i == 0 {
                (true, Vec3::ZERO)
            } else if scrolling {
                let (ring, base) = racing[i - 1];
                let shown = base >= self.scroll_offset && base <= self.scroll_offset + PI;
                (shown, self.position(ring, base - self.scroll_offset))
            } else {
                let (ring, angle) = self.static_position(i, total);
                (true, self.position(ring, angle))
            };
            set_child_shown(child, shown);
            child.set_local_position(position);
        }
    }

    fn on_event(&mut self, driver: &ProjectileDriver, event: &mut InputEvent, _children: &[Node]) -> bool {
        match event.kind {
            InputEventType::GrabStart => {
                let non_anchor = event.source_projectile().is_some_and(|p| !p.is_anchor_handle());
                if non_anchor && self.can_scroll() {
                    self.scroll.start(driver, event.is_left_hand);
                    info!(
                        "[half-wheel '{}'] started scrolling ({} hand)",
                        driver.base().id(),
                        if event.is_left_hand { "left" } else { "right" }
                    );
                    return true;
                }
                false
            }
            InputEventType::GrabEnd if self.scroll.is_active() => {
                self.end_scrolling(driver);
                true
            }
            _ => false,
        }
    }

    fn on_show(&mut self) {
        self.scroll_offset = clamp_offset(self.scroll_offset, self.max_scroll_offset());
    }

    fn on_children_changed(&mut self, count: usize) {
        self.count = count;
    }

    fn on_clear(&mut self) {
        self.scroll_offset = 0.0;
        self.scroll = ScrollTracker::default();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
