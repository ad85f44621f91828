//! Quaternion utilities for 3D rotations.
//!
//! Convention: q = [w; x; y; z] where w is scalar, (x,y,z) is vector part.

use crate::{Mat3, Vec3};

/// A quaternion representing a 3D rotation (unit length when normalized).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quat {
    /// Scalar part (w).
    pub w: f64,
    /// Vector part (x, y, z).
    pub v: Vec3,
}

impl Quat {
    /// Create a new quaternion from scalar and vector parts.
    pub fn new(w: f64, x: f64, y: f64, z: f64) -> Self {
        Self {
            w,
            v: Vec3::new(x, y, z),
        }
    }

    /// Identity quaternion (no rotation).
    pub fn identity() -> Self {
        Self {
            w: 1.0,
            v: Vec3::zeros(),
        }
    }

    /// Create quaternion from axis-angle representation.
    /// axis should be a unit vector, angle in radians.
    pub fn from_axis_angle(axis: &Vec3, angle: f64) -> Self {
        let half_angle = angle * 0.5;
        let (s, c) = half_angle.sin_cos();
        Self { w: c, v: *axis * s }
    }

    /// Squared norm w² + |v|².
    #[inline]
    pub fn norm_squared(&self) -> f64 {
        self.w * self.w + self.v.norm_squared()
    }

    /// Normalize this quaternion to unit length.
    pub fn normalize(&self) -> Self {
        let norm = self.norm_squared().sqrt();
        if norm < 1e-12 {
            return Self::identity();
        }
        Self {
            w: self.w / norm,
            v: self.v / norm,
        }
    }

    /// Quaternion multiplication: self * other.
    pub fn mul(&self, other: &Quat) -> Quat {
        Quat {
            w: self.w * other.w - self.v.dot(&other.v),
            v: self.v.cross(&other.v) + other.v * self.w + self.v * other.w,
        }
    }

    /// Time derivative for a body-frame angular velocity `omega`.
    ///
    /// Returns ½ q ⊗ (0, ω) plus the Baumgarte term `k_stab · q · (1 − |q|²)`,
    /// which pulls a drifting quaternion back onto the unit sphere.
    pub fn derivative(&self, omega: &Vec3, k_stab: f64) -> Quat {
        let gain = k_stab * (1.0 - self.norm_squared());
        let half = self.mul(&Quat { w: 0.0, v: *omega });
        Quat {
            w: 0.5 * half.w + gain * self.w,
            v: half.v * 0.5 + self.v * gain,
        }
    }

    /// Convert quaternion to 3x3 rotation matrix.
    pub fn to_matrix(&self) -> Mat3 {
        let w = self.w;
        let x = self.v.x;
        let y = self.v.y;
        let z = self.v.z;

        let x2 = x * x;
        let y2 = y * y;
        let z2 = z * z;
        let xy = x * y;
        let xz = x * z;
        let yz = y * z;
        let wx = w * x;
        let wy = w * y;
        let wz = w * z;

        Mat3::new(
            1.0 - 2.0 * (y2 + z2),
            2.0 * (xy - wz),
            2.0 * (xz + wy),
            2.0 * (xy + wz),
            1.0 - 2.0 * (x2 + z2),
            2.0 * (yz - wx),
            2.0 * (xz - wy),
            2.0 * (yz + wx),
            1.0 - 2.0 * (x2 + y2),
        )
    }
}
