//! Facing strategies for root drivers.

use crate::math::{facing_rotation, yaw_facing_rotation, Mat3, Vec3};

/// Computes a driver's world rotation from its center toward an anchor.
pub trait FacingStrategy: Send + Sync {
    fn compute_rotation(&self, center: Vec3, anchor: Vec3) -> Mat3;
}

/// Full 3D look-at.
#[derive(Debug, Clone, Copy, Default)]
pub struct FullFacing;

impl FacingStrategy for FullFacing {
    fn compute_rotation(&self, center: Vec3, anchor: Vec3) -> Mat3 {
        facing_rotation(center, anchor)
    }
}

/// Yaw about +Z only; the driver stays upright.
#[derive(Debug, Clone, Copy, Default)]
pub struct YawOnlyFacing;

impl FacingStrategy for YawOnlyFacing {
    fn compute_rotation(&self, center: Vec3, anchor: Vec3) -> Mat3 {
        yaw_facing_rotation(center, anchor)
    }
}
