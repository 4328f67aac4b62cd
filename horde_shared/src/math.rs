//! Math types.
//!
//! Positions on the feed are `f64` triples. This module stays small and
//! deterministic: no SIMD, no unsafe.

use serde::{Deserialize, Serialize};

/// 3D vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const ZERO: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn dot(self, rhs: Self) -> f64 {
        self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
    }

    pub fn len_sq(self) -> f64 {
        self.dot(self)
    }

    pub fn len(self) -> f64 {
        self.len_sq().sqrt()
    }

    pub fn distance_sq(self, other: Self) -> f64 {
        (other - self).len_sq()
    }

    pub fn distance(self, other: Self) -> f64 {
        self.distance_sq(other).sqrt()
    }

    /// Returns a copy with `y` replaced, used to flatten a look target onto
    /// the viewer's plane.
    pub fn with_y(self, y: f64) -> Self {
        Self::new(self.x, y, self.z)
    }

    /// Scales `self` to length `len`; zero vectors stay zero.
    pub fn clamp_len(self, len: f64) -> Self {
        let cur = self.len();
        if cur <= len || cur == 0.0 {
            self
        } else {
            self * (len / cur)
        }
    }

    pub fn lerp(self, to: Self, t: f64) -> Self {
        let t = t.clamp(0.0, 1.0);
        Self::new(
            self.x + (to.x - self.x) * t,
            self.y + (to.y - self.y) * t,
            self.z + (to.z - self.z) * t,
        )
    }
}

impl std::ops::Add for Vec3 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl std::ops::Sub for Vec3 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl std::ops::Mul<f64> for Vec3 {
    type Output = Self;

    fn mul(self, rhs: f64) -> Self {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl std::fmt::Display for Vec3 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.2}, {:.2}, {:.2})", self.x, self.y, self.z)
    }
}

/// Hermite smoothstep: `t² (3 − 2t)` with `t` clamped to `[0, 1]`.
///
/// Zero slope at both ends, so a motion built on it starts and stops
/// without a velocity jump.
pub fn smoothstep(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Yaw (radians, around +Y) that turns a node at `from` to look at `to`.
///
/// Zero yaw faces -Z.
pub fn yaw_towards(from: Vec3, to: Vec3) -> Option<f64> {
    let d = to - from;
    if d.x == 0.0 && d.z == 0.0 {
        return None;
    }
    Some((-d.x).atan2(-d.z))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec3_lerp_midpoint() {
        let a = Vec3::new(0.0, 0.0, 0.0);
        let b = Vec3::new(2.0, 4.0, 6.0);
        let mid = a.lerp(b, 0.5);
        assert_eq!(mid, Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn smoothstep_endpoints_and_midpoint() {
        assert_eq!(smoothstep(0.0), 0.0);
        assert_eq!(smoothstep(0.5), 0.5);
        assert_eq!(smoothstep(1.0), 1.0);
        assert_eq!(smoothstep(2.0), 1.0);
        assert_eq!(smoothstep(-1.0), 0.0);
    }

    #[test]
    fn clamp_len_shortens_only_long_vectors() {
        let v = Vec3::new(3.0, 0.0, 4.0);
        assert_eq!(v.clamp_len(10.0), v);
        let short = v.clamp_len(2.5);
        assert!((short.len() - 2.5).abs() < 1e-12);
        assert_eq!(Vec3::ZERO.clamp_len(0.0), Vec3::ZERO);
    }

    #[test]
    fn yaw_faces_negative_z_at_zero() {
        let yaw = yaw_towards(Vec3::ZERO, Vec3::new(0.0, 0.0, -5.0)).unwrap();
        assert!(yaw.abs() < 1e-12);
        assert!(yaw_towards(Vec3::ZERO, Vec3::new(0.0, 3.0, 0.0)).is_none());
    }
}
