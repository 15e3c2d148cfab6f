//! Math types.
//!
//! This module intentionally stays small and deterministic.
//! It avoids SIMD/unsafe and focuses on stable semantics: every operation is
//! plain single-precision arithmetic in a fixed order, so the same inputs give
//! the same bits on the server and on a predicting client.

use std::ops::{Add, AddAssign, Index, IndexMut, Mul, MulAssign, Neg, Sub, SubAssign};

use serde::{Deserialize, Serialize};

/// 3D vector. `z` is up.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
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

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn dot(self, rhs: Self) -> f32 {
        self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
    }

    pub fn cross(self, rhs: Self) -> Self {
        Self::new(
            self.y * rhs.z - self.z * rhs.y,
            self.z * rhs.x - self.x * rhs.z,
            self.x * rhs.y - self.y * rhs.x,
        )
    }

    pub fn len_sq(self) -> f32 {
        self.dot(self)
    }

    pub fn length(self) -> f32 {
        self.len_sq().sqrt()
    }

    /// Length of the x/y part only.
    pub fn length_2d(self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    /// Returns the unit vector and the original length.
    ///
    /// Vectors no longer than `epsilon` come back as `(ZERO, 0.0)`.
    pub fn normalize_or_zero(self, epsilon: f32) -> (Self, f32) {
        let len = self.length();
        if len > epsilon {
            (self * (1.0 / len), len)
        } else {
            (Self::ZERO, 0.0)
        }
    }

    /// Same vector with `z` zeroed.
    pub fn flat(self) -> Self {
        Self::new(self.x, self.y, 0.0)
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    pub fn lerp(self, to: Self, t: f32) -> Self {
        let t = t.clamp(0.0, 1.0);
        Self::new(
            self.x + (to.x - self.x) * t,
            self.y + (to.y - self.y) * t,
            self.z + (to.z - self.z) * t,
        )
    }
}

impl Add for Vec3 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl AddAssign for Vec3 {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for Vec3 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl SubAssign for Vec3 {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl Mul<f32> for Vec3 {
    type Output = Self;

    fn mul(self, s: f32) -> Self {
        Self::new(self.x * s, self.y * s, self.z * s)
    }
}

impl MulAssign<f32> for Vec3 {
    fn mul_assign(&mut self, s: f32) {
        *self = *self * s;
    }
}

impl Neg for Vec3 {
    type Output = Self;

    fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

impl Index<usize> for Vec3 {
    type Output = f32;

    fn index(&self, i: usize) -> &f32 {
        match i {
            0 => &self.x,
            1 => &self.y,
            2 => &self.z,
            _ => panic!("Vec3 index out of range: {i}"),
        }
    }
}

impl IndexMut<usize> for Vec3 {
    fn index_mut(&mut self, i: usize) -> &mut f32 {
        match i {
            0 => &mut self.x,
            1 => &mut self.y,
            2 => &mut self.z,
            _ => panic!("Vec3 index out of range: {i}"),
        }
    }
}

/// Basis vectors derived from view angles.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Basis {
    pub forward: Vec3,
    pub right: Vec3,
    pub up: Vec3,
}

/// Converts `(pitch, yaw, roll)` in degrees to forward/right/up vectors.
///
/// Positive pitch looks down; yaw 0 faces +x and yaw 90 faces +y, so `right`
/// at zero angles is -y.
pub fn angle_vectors(angles: Vec3) -> Basis {
    let (sp, cp) = angles.x.to_radians().sin_cos();
    let (sy, cy) = angles.y.to_radians().sin_cos();
    let (sr, cr) = angles.z.to_radians().sin_cos();

    Basis {
        forward: Vec3::new(cp * cy, cp * sy, -sp),
        right: Vec3::new(
            -sr * sp * cy + cr * sy,
            -sr * sp * sy - cr * cy,
            -sr * cp,
        ),
        up: Vec3::new(cr * sp * cy + sr * sy, cr * sp * sy - sr * cy, cr * cp),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < 1e-5
    }

    #[test]
    fn vec3_lerp_midpoint() {
        let a = Vec3::new(0.0, 0.0, 0.0);
        let b = Vec3::new(2.0, 4.0, 6.0);
        let mid = a.lerp(b, 0.5);
        assert_eq!(mid, Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn angle_vectors_identity() {
        let basis = angle_vectors(Vec3::ZERO);
        assert!(close(basis.forward, Vec3::new(1.0, 0.0, 0.0)));
        assert!(close(basis.right, Vec3::new(0.0, -1.0, 0.0)));
        assert!(close(basis.up, Vec3::new(0.0, 0.0, 1.0)));
    }

    #[test]
    fn angle_vectors_yaw_and_pitch() {
        let basis = angle_vectors(Vec3::new(0.0, 90.0, 0.0));
        assert!(close(basis.forward, Vec3::new(0.0, 1.0, 0.0)));
        assert!(close(basis.right, Vec3::new(1.0, 0.0, 0.0)));

        // Looking straight down.
        let basis = angle_vectors(Vec3::new(90.0, 0.0, 0.0));
        assert!(close(basis.forward, Vec3::new(0.0, 0.0, -1.0)));
    }

    #[test]
    fn normalize_or_zero_guards_tiny_vectors() {
        let (dir, len) = Vec3::new(0.0, 0.05, 0.0).normalize_or_zero(0.1);
        assert_eq!(dir, Vec3::ZERO);
        assert_eq!(len, 0.0);

        let (dir, len) = Vec3::new(3.0, 4.0, 0.0).normalize_or_zero(0.1);
        assert!(close(dir, Vec3::new(0.6, 0.8, 0.0)));
        assert_eq!(len, 5.0);
    }
}
