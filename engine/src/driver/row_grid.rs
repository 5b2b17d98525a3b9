//! Row-major grid with vertical scrolling.
//!
//! Items fill `num_columns` across, then wrap to the next row. Fill
//! direction (which way rows and columns grow) is independent of origin
//! (which content edge sits at local zero). When the rows overflow
//! `visible_height`, dragging a non-anchor item up or down scrolls them.
//!
//! Axes: +X right, +Y forward, +Z up. Columns run along X, rows along Z.
//! The menu faces the viewer, so left-to-right fill grows toward -X.

use std::any::Any;

use tracing::{info, trace};

use super::scroll::{clamp_offset, horizontal_origin_shift, snap_offset, vertical_origin_shift, ScrollTracker};
use super::{set_child_shown, HorizontalFill, HorizontalOrigin, Layout, ProjectileDriver, VerticalFill, VerticalOrigin};
use crate::math::Vec3;
use crate::node::{InputEvent, InputEventType, Node};

pub const DEFAULT_COLUMN_SPACING: f32 = 15.0;
pub const DEFAULT_ROW_SPACING: f32 = 12.0;
pub const DEFAULT_VISIBLE_HEIGHT: f32 = 50.0;
/// Game units.
const SNAP_THRESHOLD: f32 = 3.0;

pub struct RowGridLayout {
    pub column_spacing: f32,
    pub row_spacing: f32,
    num_columns: usize,
    pub visible_height: f32,
    pub scroll_sensitivity: f32,
    pub vertical_fill: VerticalFill,
    pub horizontal_fill: HorizontalFill,
    pub vertical_origin: VerticalOrigin,
    pub horizontal_origin: HorizontalOrigin,
    scroll_offset: f32,
    scroll: ScrollTracker,
    count: usize,
}

impl Default for RowGridLayout {
    fn default() -> Self {
        Self {
            column_spacing: DEFAULT_COLUMN_SPACING,
            row_spacing: DEFAULT_ROW_SPACING,
            num_columns: 1,
            visible_height: DEFAULT_VISIBLE_HEIGHT,
            scroll_sensitivity: 1.0,
            vertical_fill: VerticalFill::default(),
            horizontal_fill: HorizontalFill::default(),
            vertical_origin: VerticalOrigin::default(),
            horizontal_origin: HorizontalOrigin::default(),
            scroll_offset: 0.0,
            scroll: ScrollTracker::default(),
            count: 0,
        }
    }
}

impl RowGridLayout {
    pub fn num_columns(&self) -> usize {
        self.num_columns
    }

    pub fn set_num_columns(&mut self, columns: usize) {
        self.num_columns = columns.max(1);
    }

    pub fn set_fill_direction(&mut self, vertical: VerticalFill, horizontal: HorizontalFill) {
        self.vertical_fill = vertical;
        self.horizontal_fill = horizontal;
    }

    pub fn set_origin(&mut self, vertical: VerticalOrigin, horizontal: HorizontalOrigin) {
        self.vertical_origin = vertical;
        self.horizontal_origin = horizontal;
    }

    fn total_rows(&self) -> usize {
        self.count.div_ceil(self.num_columns)
    }

    pub fn total_height(&self) -> f32 {
        match self.total_rows() {
            0 => 0.0,
            rows => (rows - 1) as f32 * self.row_spacing,
        }
    }

    /// Rows that fit in the window, counting a partly cut one.
    pub fn visible_rows(&self) -> usize {
        if self.row_spacing <= 0.0 {
            return 1;
        }
        (self.visible_height / self.row_spacing) as usize + 1
    }

    pub fn can_scroll(&self) -> bool {
        self.total_height() > self.visible_height
    }

    pub fn max_scroll_offset(&self) -> f32 {
        if !self.can_scroll() {
            return 0.0;
        }
        (self.total_height() - self.visible_height).max(0.0)
    }

    pub fn scroll_offset(&self) -> f32 {
        self.scroll_offset
    }

    pub fn set_scroll_offset(&mut self, offset: f32) {
        self.scroll_offset = clamp_offset(offset, self.max_scroll_offset());
    }

    pub fn is_scrolling(&self) -> bool {
        self.scroll.is_active()
    }

    fn column_x(&self, column: usize) -> f32 {
        let x = column as f32 * self.column_spacing;
        match self.horizontal_fill {
            HorizontalFill::LeftToRight => -x,
            HorizontalFill::RightToLeft => x,
        }
    }

    fn row_z(&self, row: usize) -> f32 {
        let z = row as f32 * self.row_spacing;
        match self.vertical_fill {
            VerticalFill::TopToBottom => -z,
            VerticalFill::BottomToTop => z,
        }
    }

    fn is_z_visible(&self, z: f32) -> bool {
        let h = self.visible_height;
        match self.vertical_origin {
            VerticalOrigin::Bottom => (0.0..=h).contains(&z),
            VerticalOrigin::Center => (-h / 2.0..=h / 2.0).contains(&z),
            VerticalOrigin::Top => (-h..=0.0).contains(&z),
        }
    }

    /// Z shift that puts the origin edge at zero, plus the scroll shift.
    fn z_shift(&self) -> f32 {
        let origin = vertical_origin_shift(self.vertical_fill, self.vertical_origin, self.total_height());
        let scroll = if self.can_scroll() { self.scroll_offset } else { 0.0 };
        // Scrolling moves content against its fill direction.
        match self.vertical_fill {
            VerticalFill::TopToBottom => origin + scroll,
            VerticalFill::BottomToTop => origin - scroll,
        }
    }

    /// X shift from the width of the columns actually used.
    fn x_shift(&self) -> f32 {
        let used = self.count.min(self.num_columns);
        let width = used.saturating_sub(1) as f32 * self.column_spacing;
        horizontal_origin_shift(self.horizontal_fill, self.horizontal_origin, width)
    }

    fn end_scrolling(&mut self, driver: &ProjectileDriver) {
        if !self.scroll.end() {
            return;
        }
        let max = self.max_scroll_offset();
        let stops = (0..self.total_rows()).map(|row| row as f32 * self.row_spacing);
        if let Some(snapped) = snap_offset(self.scroll_offset, max, stops, SNAP_THRESHOLD) {
            trace!("[row-grid '{}'] snap {:.3} -> {:.3}", driver.base().id(), self.scroll_offset, snapped);
            self.scroll_offset = snapped;
        }
        info!("[row-grid '{}'] ended scrolling at offset {:.3}", driver.base().id(), self.scroll_offset);
    }
}

impl Layout for RowGridLayout {
    fn before_update(&mut self, driver: &ProjectileDriver, _children: &[Node]) {
        if let Some(delta) = self.scroll.take_delta(driver) {
            // Lowering the hand advances toward later rows.
            let next = self.scroll_offset - delta.z * self.scroll_sensitivity;
            self.scroll_offset = clamp_offset(next, self.max_scroll_offset());
        }
    }

    fn update_layout(&mut self, _driver: &ProjectileDriver, children: &[Node], _dt: f32) {
        let z_shift = self.z_shift();
        let x_shift = self.x_shift();
        for (i, child) in children.iter().enumerate() {
            let (row, column) = (i / self.num_columns, i % self.num_columns);
            let z = self.row_z(row) + z_shift;
            let x = self.column_x(column) + x_shift;
            set_child_shown(child, self.is_z_visible(z));
            child.set_local_position(Vec3::new(x, 0.0, z));
        }
    }

    fn on_event(&mut self, driver: &ProjectileDriver, event: &mut InputEvent, _children: &[Node]) -> bool {
        match event.kind {
            InputEventType::GrabStart => {
                let non_anchor = event.source_projectile().is_some_and(|p| !p.is_anchor_handle());
                if non_anchor && self.can_scroll() {
                    self.scroll.start(driver, event.is_left_hand);
                    info!(
                        "[row-grid '{}'] started scrolling ({} hand)",
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
        let max = self.max_scroll_offset();
        if self.scroll_offset > max {
            info!("row grid: scroll offset {:.3} exceeds max {:.3}, clamping", self.scroll_offset, max);
        }
        self.scroll_offset = clamp_offset(self.scroll_offset, max);
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

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::projectile::ControlledProjectile;
    use crate::sim::Simulation;

    fn grid_with(sim: &Simulation, n: usize) -> (Arc<ProjectileDriver>, Vec<Arc<ControlledProjectile>>) {
        let grid = ProjectileDriver::row_grid(&sim.engine);
        let items: Vec<_> = (0..n).map(|_| ControlledProjectile::new(&sim.engine)).collect();
        for p in &items {
            grid.add_child(Arc::clone(p));
        }
        (grid, items)
    }

    #[test]
    fn test_default_top_left_single_column() {
        let sim = Simulation::new(4);
        let (grid, items) = grid_with(&sim, 3);
        grid.update(0.016);
        assert_eq!(items[0].base().local_position(), Vec3::ZERO);
        assert_eq!(items[2].base().local_position(), Vec3::new(0.0, 0.0, -24.0));
        assert!(items.iter().all(|p| p.is_visible()));
    }

    #[test]
    fn test_columns_wrap_and_center() {
        let sim = Simulation::new(8);
        let (grid, items) = grid_with(&sim, 5);
        grid.layout_mut::<RowGridLayout, _>(|g| {
            g.set_num_columns(2);
            g.set_origin(VerticalOrigin::Top, HorizontalOrigin::Center);
        });
        grid.update(0.016);
        // Two used columns 15 apart, centered: x = +7.5 and -7.5.
        assert_eq!(items[0].base().local_position(), Vec3::new(7.5, 0.0, 0.0));
        assert_eq!(items[1].base().local_position(), Vec3::new(-7.5, 0.0, 0.0));
        assert_eq!(items[2].base().local_position(), Vec3::new(7.5, 0.0, -12.0));
    }

    #[test]
    fn test_bottom_to_top_fill_with_bottom_origin() {
        let sim = Simulation::new(4);
        let (grid, items) = grid_with(&sim, 2);
        grid.layout_mut::<RowGridLayout, _>(|g| {
            g.set_fill_direction(VerticalFill::BottomToTop, HorizontalFill::LeftToRight);
            g.set_origin(VerticalOrigin::Bottom, HorizontalOrigin::Left);
        });
        grid.update(0.016);
        assert_eq!(items[1].base().local_position(), Vec3::new(0.0, 0.0, 12.0));
    }

    #[test]
    fn test_overflow_hides_rows_outside_window() {
        let sim = Simulation::new(8);
        let (grid, items) = grid_with(&sim, 6);
        grid.update(0.016);
        // Total height 60 with a 50 unit window: the sixth row at -60 is out.
        assert!(items[4].is_visible());
        assert!(!items[5].is_visible());
        assert_eq!(grid.layout::<RowGridLayout, _>(|g| g.max_scroll_offset()), Some(10.0));

        grid.layout_mut::<RowGridLayout, _>(|g| g.set_scroll_offset(10.0));
        grid.update(0.016);
        assert!(!items[0].is_visible());
        assert!(items[5].is_visible());
    }

    #[test]
    fn test_drag_scroll_and_snap() {
        let sim = Simulation::new(16);
        let (grid, items) = grid_with(&sim, 10);
        sim.host.set_hand_position(false, Vec3::new(0.0, 0.0, 0.0));
        let mut grab = InputEvent::new(
            InputEventType::GrabStart,
            Some(Node::Projectile(Arc::clone(&items[3]))),
            None,
            false,
        );
        assert!(grid.on_event(&mut grab));

        sim.host.set_hand_position(false, Vec3::new(0.0, 0.0, -13.0));
        grid.update(0.016);
        assert_eq!(grid.layout::<RowGridLayout, _>(|g| g.scroll_offset()), Some(13.0));

        let mut release = InputEvent::new(InputEventType::GrabEnd, None, None, false);
        assert!(grid.on_event(&mut release));
        assert_eq!(grid.layout::<RowGridLayout, _>(|g| g.scroll_offset()), Some(12.0));
    }

    #[test]
    fn test_anchor_grab_does_not_scroll() {
        let sim = Simulation::new(16);
        let (grid, items) = grid_with(&sim, 10);
        items[0].set_is_anchor_handle(true);
        let mut grab = InputEvent::new(
            InputEventType::GrabStart,
            Some(Node::Projectile(Arc::clone(&items[0]))),
            None,
            true,
        );
        grid.on_event(&mut grab);
        assert_eq!(grid.layout::<RowGridLayout, _>(|g| g.is_scrolling()), Some(false));
    }

    #[test]
    fn test_show_clamps_offset_to_new_max() {
        let sim = Simulation::new(8);
        let (grid, items) = grid_with(&sim, 4);
        grid.layout_mut::<RowGridLayout, _>(|g| g.visible_height = 10.0);
        grid.layout_mut::<RowGridLayout, _>(|g| g.set_scroll_offset(26.0));
        assert_eq!(grid.layout::<RowGridLayout, _>(|g| g.scroll_offset()), Some(26.0));

        grid.set_visible(false);
        grid.remove_child(&Node::Projectile(Arc::clone(&items[3])));
        grid.remove_child(&Node::Projectile(Arc::clone(&items[2])));
        grid.set_visible(true);
        assert_eq!(grid.layout::<RowGridLayout, _>(|g| g.scroll_offset()), Some(2.0));
    }
}
