//! Transform primitives for the projectile scene graph.
//!
//! Host coordinates are +X right, +Y forward, +Z up. Rotations are 3x3
//! row-major matrices (`m[row][col]`) and are the single source of truth;
//! Euler angles are derived. Euler triples are `(pitch, roll, yaw)` in the
//! ZYX convention: `R = Rz(yaw) * Ry(pitch) * Rx(roll)`.

use std::f32::consts::PI;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

// ── Vec3 ─────────────────────────────────────────────────────

/// 3D vector.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };
    pub const UP: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 1.0,
    };
    pub const FORWARD: Self = Self {
        x: 0.0,
        y: 1.0,
        z: 0.0,
    };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn lerp(self, other: Self, t: f32) -> Self {
        Self {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
            z: self.z + (other.z - self.z) * t,
        }
    }

    pub fn dot(self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(self, other: Self) -> Self {
        Self {
            x: self.y * other.z - self.z * other.y,
            y: self.z * other.x - self.x * other.z,
            z: self.x * other.y - self.y * other.x,
        }
    }

    pub fn length(self) -> f32 {
        self.dot(self).sqrt()
    }

    pub fn distance(self, other: Self) -> f32 {
        (self - other).length()
    }

    pub fn normalize(self) -> Self {
        let len = self.length();
        if len < 1e-10 {
            return Self::ZERO;
        }
        self * (1.0 / len)
    }

    pub fn scale(self, s: f32) -> Self {
        self * s
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl Add for Vec3 {
    type Output = Self;
    fn add(self, o: Self) -> Self {
        Self::new(self.x + o.x, self.y + o.y, self.z + o.z)
    }
}

impl AddAssign for Vec3 {
    fn add_assign(&mut self, o: Self) {
        *self = *self + o;
    }
}

impl Sub for Vec3 {
    type Output = Self;
    fn sub(self, o: Self) -> Self {
        Self::new(self.x - o.x, self.y - o.y, self.z - o.z)
    }
}

impl SubAssign for Vec3 {
    fn sub_assign(&mut self, o: Self) {
        *self = *self - o;
    }
}

impl Mul<f32> for Vec3 {
    type Output = Self;
    fn mul(self, s: f32) -> Self {
        Self::new(self.x * s, self.y * s, self.z * s)
    }
}

impl Neg for Vec3 {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

// ── Mat3 ─────────────────────────────────────────────────────

/// 3x3 rotation matrix, row-major.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mat3 {
    pub m: [[f32; 3]; 3],
}

impl Default for Mat3 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mat3 {
    pub const IDENTITY: Self = Self {
        m: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
    };

    /// Build from three column vectors.
    pub fn from_columns(c0: Vec3, c1: Vec3, c2: Vec3) -> Self {
        Self {
            m: [[c0.x, c1.x, c2.x], [c0.y, c1.y, c2.y], [c0.z, c1.z, c2.z]],
        }
    }

    pub fn column(&self, i: usize) -> Vec3 {
        Vec3::new(self.m[0][i], self.m[1][i], self.m[2][i])
    }

    /// `self * other`.
    pub fn mul(&self, other: &Self) -> Self {
        let mut out = [[0.0f32; 3]; 3];
        for (r, row) in out.iter_mut().enumerate() {
            for (c, cell) in row.iter_mut().enumerate() {
                *cell = (0..3).map(|k| self.m[r][k] * other.m[k][c]).sum();
            }
        }
        Self { m: out }
    }

    /// `self * p`.
    pub fn rotate(&self, p: Vec3) -> Vec3 {
        let m = &self.m;
        Vec3::new(
            m[0][0] * p.x + m[0][1] * p.y + m[0][2] * p.z,
            m[1][0] * p.x + m[1][1] * p.y + m[1][2] * p.z,
            m[2][0] * p.x + m[2][1] * p.y + m[2][2] * p.z,
        )
    }

    pub fn transpose(&self) -> Self {
        let m = &self.m;
        Self {
            m: [
                [m[0][0], m[1][0], m[2][0]],
                [m[0][1], m[1][1], m[2][1]],
                [m[0][2], m[1][2], m[2][2]],
            ],
        }
    }

    /// Inverse of an orthonormal rotation.
    pub fn inverse(&self) -> Self {
        self.transpose()
    }

    /// Build from `(pitch, roll, yaw)` radians.
    pub fn from_euler(euler: Vec3) -> Self {
        let (sp, cp) = euler.x.sin_cos();
        let (sr, cr) = euler.y.sin_cos();
        let (sy, cy) = euler.z.sin_cos();
        Self {
            m: [
                [cy * cp, cy * sp * sr - sy * cr, cy * sp * cr + sy * sr],
                [sy * cp, sy * sp * sr + cy * cr, sy * sp * cr - cy * sr],
                [-sp, cp * sr, cp * cr],
            ],
        }
    }

    /// Build from `(pitch, roll, yaw)` degrees.
    pub fn from_euler_degrees(euler: Vec3) -> Self {
        let k = PI / 180.0;
        Self::from_euler(euler * k)
    }

    /// Decompose into `(pitch, roll, yaw)` radians.
    pub fn to_euler(&self) -> Vec3 {
        let m = &self.m;
        let yaw = m[1][0].atan2(m[0][0]);
        let pitch = (-m[2][0]).atan2((m[0][0] * m[0][0] + m[1][0] * m[1][0]).sqrt());
        let (sy, cy) = yaw.sin_cos();
        let roll = (sy * m[0][2] - cy * m[1][2]).atan2(cy * m[1][1] - sy * m[0][1]);
        Vec3::new(pitch, roll, yaw)
    }

    /// Columns are unit length and mutually perpendicular.
    pub fn is_orthonormal(&self, tolerance: f32) -> bool {
        let (a, b, c) = (self.column(0), self.column(1), self.column(2));
        (a.length() - 1.0).abs() < tolerance
            && (b.length() - 1.0).abs() < tolerance
            && (c.length() - 1.0).abs() < tolerance
            && a.dot(b).abs() < tolerance
            && a.dot(c).abs() < tolerance
            && b.dot(c).abs() < tolerance
    }

    pub fn approx_eq(&self, other: &Self, tolerance: f32) -> bool {
        (0..3).all(|r| (0..3).all(|c| (self.m[r][c] - other.m[r][c]).abs() < tolerance))
    }
}

// ── Facing construction ──────────────────────────────────────

/// Rotation whose local +Y points from `from` toward `to`, columns
/// `[right | forward | up]`. Identity when the points coincide.
pub fn facing_rotation(from: Vec3, to: Vec3) -> Mat3 {
    let delta = to - from;
    let length = delta.length();
    if length < 0.001 {
        return Mat3::IDENTITY;
    }
    let forward = delta * (1.0 / length);
    let up = if forward.dot(Vec3::UP).abs() > 0.999 {
        Vec3::FORWARD
    } else {
        Vec3::UP
    };
    let right = forward.cross(up).normalize();
    let up = right.cross(forward);
    Mat3::from_columns(right, forward, up)
}

/// Like `facing_rotation` but only yaws about +Z.
pub fn yaw_facing_rotation(from: Vec3, to: Vec3) -> Mat3 {
    let mut delta = to - from;
    delta.z = 0.0;
    let length = (delta.x * delta.x + delta.y * delta.y).sqrt();
    if length < 0.001 {
        return Mat3::IDENTITY;
    }
    let forward = Vec3::new(delta.x / length, delta.y / length, 0.0);
    let right = Vec3::new(forward.y, -forward.x, 0.0);
    Mat3::from_columns(right, forward, Vec3::UP)
}

// ── Transform ────────────────────────────────────────────────

/// Position, rotation and uniform scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Mat3,
    pub scale: f32,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: Mat3::IDENTITY,
        scale: 1.0,
    };

    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            ..Self::IDENTITY
        }
    }

    /// Map a point from this transform's local space into its parent space.
    pub fn apply(&self, local: Vec3) -> Vec3 {
        self.position + self.rotation.rotate(local * self.scale)
    }

    /// Euler view of the rotation, `(pitch, roll, yaw)` radians.
    pub fn euler(&self) -> Vec3 {
        self.rotation.to_euler()
    }
}
