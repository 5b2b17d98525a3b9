//! Exponential easing toward a target transform.
//!
//! Position and scale chase the target with `1 - exp(-speed * dt)`;
//! rotation snaps because billboards rewrite it every frame anyway.

use crate::math::Transform;

/// Largest delta accepted per update, in seconds.
const MAX_DELTA: f32 = 0.1;

/// Default easing speed for projectiles.
pub const DEFAULT_PROJECTILE_SPEED: f32 = 13.0;
/// Default easing speed handed down by drivers.
pub const DEFAULT_DRIVER_SPEED: f32 = 12.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransitionMode {
    /// Jump straight to the target.
    Instant,
    /// Ease toward the target each update.
    #[default]
    Lerp,
}

impl TransitionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Instant => "instant",
            Self::Lerp => "lerp",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransformSmoother {
    current: Transform,
    target: Transform,
    mode: TransitionMode,
    speed: f32,
    transitioning: bool,
}

impl Default for TransformSmoother {
    fn default() -> Self {
        Self::new(DEFAULT_PROJECTILE_SPEED)
    }
}

impl TransformSmoother {
    pub fn new(speed: f32) -> Self {
        Self {
            current: Transform::IDENTITY,
            target: Transform::IDENTITY,
            mode: TransitionMode::Lerp,
            speed,
            transitioning: false,
        }
    }

    pub fn set_target(&mut self, target: Transform) {
        self.target = target;
        match self.mode {
            TransitionMode::Lerp => self.transitioning = true,
            TransitionMode::Instant => {
                self.current = target;
                self.transitioning = false;
            }
        }
    }

    pub fn set_current(&mut self, current: Transform) {
        self.current = current;
    }

    /// Advance one frame. Returns false when idle or when `dt` is unusable.
    pub fn update(&mut self, dt: f32) -> bool {
        if !self.transitioning || !dt.is_finite() || dt <= 0.0 {
            return false;
        }
        let dt = dt.min(MAX_DELTA);
        let factor = (1.0 - (-self.speed * dt).exp()).clamp(0.0, 1.0);

        self.current.position = self.current.position.lerp(self.target.position, factor);
        self.current.rotation = self.target.rotation;
        self.current.scale += (self.target.scale - self.current.scale) * factor;
        true
    }

    pub fn reset(&mut self) {
        self.transitioning = false;
        self.current = Transform::IDENTITY;
        self.target = Transform::IDENTITY;
    }

    pub fn current(&self) -> Transform {
        self.current
    }

    pub fn target(&self) -> Transform {
        self.target
    }

    pub fn mode(&self) -> TransitionMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: TransitionMode) {
        self.mode = mode;
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn set_speed(&mut self, speed: f32) {
        self.speed = speed;
    }

    pub fn is_transitioning(&self) -> bool {
        self.transitioning
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{Mat3, Vec3};

    fn target() -> Transform {
        Transform {
            position: Vec3::new(10.0, 0.0, 0.0),
            rotation: Mat3::from_euler(Vec3::new(0.0, 0.0, 1.0)),
            scale: 2.0,
        }
    }

    #[test]
    fn test_instant_snaps() {
        let mut s = TransformSmoother::default();
        s.set_mode(TransitionMode::Instant);
        s.set_target(target());
        assert_eq!(s.current(), target());
        assert!(!s.is_transitioning());
        assert!(!s.update(0.016));
    }

    #[test]
    fn test_lerp_moves_partially() {
        let mut s = TransformSmoother::new(13.0);
        s.set_target(target());
        assert!(s.update(0.016));
        let factor = 1.0 - (-13.0f32 * 0.016).exp();
        assert!((s.current().position.x - 10.0 * factor).abs() < 1e-4);
        assert!((s.current().scale - (1.0 + factor)).abs() < 1e-4);
        assert_eq!(s.current().rotation, target().rotation);
    }

    #[test]
    fn test_bad_delta_rejected() {
        let mut s = TransformSmoother::default();
        s.set_target(target());
        assert!(!s.update(f32::NAN));
        assert!(!s.update(0.0));
        assert!(!s.update(-1.0));
        assert!(!s.update(f32::INFINITY));
        assert_eq!(s.current(), Transform::IDENTITY);
    }

    #[test]
    fn test_huge_delta_capped() {
        let mut a = TransformSmoother::new(5.0);
        let mut b = TransformSmoother::new(5.0);
        a.set_target(target());
        b.set_target(target());
        a.update(100.0);
        b.update(0.1);
        assert!((a.current().position.x - b.current().position.x).abs() < 1e-6);
        assert!(a.current().position.x < 10.0);
    }

    #[test]
    fn test_converges() {
        let mut s = TransformSmoother::new(13.0);
        s.set_target(target());
        for _ in 0..200 {
            s.update(0.016);
        }
        assert!((s.current().position.x - 10.0).abs() < 1e-3);
    }

    #[test]
    fn test_reset() {
        let mut s = TransformSmoother::default();
        s.set_target(target());
        s.reset();
        assert!(!s.is_transitioning());
        assert_eq!(s.target(), Transform::IDENTITY);
    }
}
