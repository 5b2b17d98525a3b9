//! Shared pieces of the scrolling layouts: fill and origin enums, hand
//! tracking in a frame frozen at grab start, and offset clamp and snap.

use super::ProjectileDriver;
use crate::math::{Mat3, Vec3};

/// Which way successive rows stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VerticalFill {
    #[default]
    TopToBottom,
    BottomToTop,
}

/// Which way successive columns grow, from the viewer's side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HorizontalFill {
    #[default]
    LeftToRight,
    RightToLeft,
}

/// Which edge of the content sits at local Z = 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VerticalOrigin {
    #[default]
    Top,
    Center,
    Bottom,
}

/// Which edge of the content sits at local X = 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HorizontalOrigin {
    #[default]
    Left,
    Center,
    Right,
}

/// Hand tracking for a drag-to-scroll gesture.
///
/// Positions are taken relative to the driver in the rotation it had when
/// the grab started, so turning the driver mid-drag never flips direction.
#[derive(Debug, Clone, Copy)]
pub struct ScrollTracker {
    active: bool,
    left: bool,
    previous_local: Vec3,
    start_rotation: Mat3,
}

impl Default for ScrollTracker {
    fn default() -> Self {
        Self {
            active: false,
            left: false,
            previous_local: Vec3::ZERO,
            start_rotation: Mat3::IDENTITY,
        }
    }
}

impl ScrollTracker {
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_left(&self) -> bool {
        self.left
    }

    pub fn start(&mut self, driver: &ProjectileDriver, left: bool) {
        self.active = true;
        self.left = left;
        self.start_rotation = driver.world_rotation();
        if let Some(hand) = driver.hand_position(left) {
            self.previous_local = self.to_fixed_frame(driver, hand);
        }
    }

    /// Hand movement since the last call, in the frozen frame.
    pub fn take_delta(&mut self, driver: &ProjectileDriver) -> Option<Vec3> {
        if !self.active {
            return None;
        }
        let hand = driver.hand_position(self.left)?;
        let local = self.to_fixed_frame(driver, hand);
        let delta = local - self.previous_local;
        if !delta.is_finite() {
            return None;
        }
        self.previous_local = local;
        Some(delta)
    }

    /// Returns whether a scroll was in progress.
    pub fn end(&mut self) -> bool {
        std::mem::replace(&mut self.active, false)
    }

    fn to_fixed_frame(&self, driver: &ProjectileDriver, world: Vec3) -> Vec3 {
        self.start_rotation.inverse().rotate(world - driver.world_position())
    }
}

/// X shift that brings the `origin` edge of content `width` wide to zero.
///
/// Left-to-right content spans `[-width, 0]` and right-to-left content
/// spans `[0, width]`; the viewer's left is +X.
pub fn horizontal_origin_shift(fill: HorizontalFill, origin: HorizontalOrigin, width: f32) -> f32 {
    match (fill, origin) {
        (HorizontalFill::LeftToRight, HorizontalOrigin::Left) => 0.0,
        (HorizontalFill::LeftToRight, HorizontalOrigin::Center) => width / 2.0,
        (HorizontalFill::LeftToRight, HorizontalOrigin::Right) => width,
        (HorizontalFill::RightToLeft, HorizontalOrigin::Left) => -width,
        (HorizontalFill::RightToLeft, HorizontalOrigin::Center) => -width / 2.0,
        (HorizontalFill::RightToLeft, HorizontalOrigin::Right) => 0.0,
    }
}

/// Z shift that brings the `origin` edge of content `height` tall to zero.
pub fn vertical_origin_shift(fill: VerticalFill, origin: VerticalOrigin, height: f32) -> f32 {
    match (fill, origin) {
        (VerticalFill::TopToBottom, VerticalOrigin::Top) => 0.0,
        (VerticalFill::TopToBottom, VerticalOrigin::Center) => height / 2.0,
        (VerticalFill::TopToBottom, VerticalOrigin::Bottom) => height,
        (VerticalFill::BottomToTop, VerticalOrigin::Top) => -height,
        (VerticalFill::BottomToTop, VerticalOrigin::Center) => -height / 2.0,
        (VerticalFill::BottomToTop, VerticalOrigin::Bottom) => 0.0,
    }
}

/// Clamp into `[0, max]`; non-finite offsets reset to zero.
pub fn clamp_offset(offset: f32, max: f32) -> f32 {
    if !offset.is_finite() {
        return 0.0;
    }
    offset.clamp(0.0, max.max(0.0))
}

/// Nearest of `0`, `max` and `stops` when within `threshold` of `offset`.
pub fn snap_offset(offset: f32, max: f32, stops: impl IntoIterator<Item = f32>, threshold: f32) -> Option<f32> {
    let mut nearest = 0.0;
    let mut best = offset.abs();
    if (offset - max).abs() < best {
        best = (offset - max).abs();
        nearest = max;
    }
    for stop in stops {
        if stop < 0.0 || stop > max {
            continue;
        }
        let distance = (offset - stop).abs();
        if distance < best {
            best = distance;
            nearest = stop;
        }
    }
    (best <= threshold).then_some(nearest)
}
