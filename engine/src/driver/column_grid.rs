//! Column-major grid with horizontal scrolling.
//!
//! The row grid turned sideways: items fill `num_rows` down, then wrap to
//! the next column, and the columns scroll along X once they overflow
//! `visible_width`.

use std::any::Any;

use tracing::{info, trace};

use super::scroll::{clamp_offset, horizontal_origin_shift, snap_offset, vertical_origin_shift, ScrollTracker};
use super::{set_child_shown, HorizontalFill, HorizontalOrigin, Layout, ProjectileDriver, VerticalFill, VerticalOrigin};
use crate::math::Vec3;
use crate::node::{InputEvent, InputEventType, Node};

pub const DEFAULT_COLUMN_SPACING: f32 = 15.0;
pub const DEFAULT_ROW_SPACING: f32 = 12.0;
pub const DEFAULT_VISIBLE_WIDTH: f32 = 50.0;
const SNAP_THRESHOLD: f32 = 3.0;

pub struct ColumnGridLayout {
    pub column_spacing: f32,
    pub row_spacing: f32,
    num_rows: usize,
    pub visible_width: f32,
    pub scroll_sensitivity: f32,
    pub vertical_fill: VerticalFill,
    pub horizontal_fill: HorizontalFill,
    pub vertical_origin: VerticalOrigin,
    pub horizontal_origin: HorizontalOrigin,
    scroll_offset: f32,
    scroll: ScrollTracker,
    count: usize,
}

impl Default for ColumnGridLayout {
    fn default() -> Self {
        Self {
            column_spacing: DEFAULT_COLUMN_SPACING,
            row_spacing: DEFAULT_ROW_SPACING,
            num_rows: 1,
            visible_width: DEFAULT_VISIBLE_WIDTH,
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

impl ColumnGridLayout {
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn set_num_rows(&mut self, rows: usize) {
        self.num_rows = rows.max(1);
    }

    pub fn set_fill_direction(&mut self, vertical: VerticalFill, horizontal: HorizontalFill) {
        self.vertical_fill = vertical;
        self.horizontal_fill = horizontal;
    }

    pub fn set_origin(&mut self, vertical: VerticalOrigin, horizontal: HorizontalOrigin) {
        self.vertical_origin = vertical;
        self.horizontal_origin = horizontal;
    }

    fn total_columns(&self) -> usize {
        self.count.div_ceil(self.num_rows)
    }

    pub fn total_width(&self) -> f32 {
        match self.total_columns() {
            0 => 0.0,
            columns => (columns - 1) as f32 * self.column_spacing,
        }
    }

    pub fn visible_columns(&self) -> usize {
        if self.column_spacing <= 0.0 {
            return 1;
        }
        (self.visible_width / self.column_spacing) as usize + 1
    }

    pub fn can_scroll(&self) -> bool {
        self.total_width() > self.visible_width
    }

    pub fn max_scroll_offset(&self) -> f32 {
        if !self.can_scroll() {
            return 0.0;
        }
        (self.total_width() - self.visible_width).max(0.0)
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

    /// The window opens from the origin edge toward the content.
    fn is_x_visible(&self, x: f32) -> bool {
        let w = self.visible_width;
        match self.horizontal_origin {
            HorizontalOrigin::Left => (-w..=0.0).contains(&x),
            HorizontalOrigin::Center => (-w / 2.0..=w / 2.0).contains(&x),
            HorizontalOrigin::Right => (0.0..=w).contains(&x),
        }
    }

    fn x_shift(&self) -> f32 {
        let origin = horizontal_origin_shift(self.horizontal_fill, self.horizontal_origin, self.total_width());
        let scroll = if self.can_scroll() { self.scroll_offset } else { 0.0 };
        match self.horizontal_fill {
            HorizontalFill::LeftToRight => origin + scroll,
            HorizontalFill::RightToLeft => origin - scroll,
        }
    }

    /// Column height is fixed by `num_rows`, filled or not.
    fn z_shift(&self) -> f32 {
        let height = (self.num_rows - 1) as f32 * self.row_spacing;
        vertical_origin_shift(self.vertical_fill, self.vertical_origin, height)
    }

    fn end_scrolling(&mut self, driver: &ProjectileDriver) {
        if !self.scroll.end() {
            return;
        }
        let max = self.max_scroll_offset();
        let stops = (0..self.total_columns()).map(|column| column as f32 * self.column_spacing);
        if let Some(snapped) = snap_offset(self.scroll_offset, max, stops, SNAP_THRESHOLD) {
            trace!("[column-grid '{}'] snap {:.3} -> {:.3}", driver.base().id(), self.scroll_offset, snapped);
            self.scroll_offset = snapped;
        }
        info!("[column-grid '{}'] ended scrolling at offset {:.3}", driver.base().id(), self.scroll_offset);
    }
}

impl Layout for ColumnGridLayout {
    fn before_update(&mut self, driver: &ProjectileDriver, _children: &[Node]) {
        if let Some(delta) = self.scroll.take_delta(driver) {
            let next = self.scroll_offset - delta.x * self.scroll_sensitivity;
            self.scroll_offset = clamp_offset(next, self.max_scroll_offset());
        }
    }

    fn update_layout(&mut self, _driver: &ProjectileDriver, children: &[Node], _dt: f32) {
        let x_shift = self.x_shift();
        let z_shift = self.z_shift();
        for (i, child) in children.iter().enumerate() {
            let (column, row) = (i / self.num_rows, i % self.num_rows);
            let x = self.column_x(column) + x_shift;
            let z = self.row_z(row) + z_shift;
            set_child_shown(child, self.is_x_visible(x));
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
                        "[column-grid '{}'] started scrolling ({} hand)",
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
