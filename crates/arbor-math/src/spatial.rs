//! 6D spatial algebra following Featherstone's "Rigid Body Dynamics Algorithms".
//!
//! Convention: spatial vectors are [angular; linear] (Featherstone order).
//! A spatial motion vector (twist): [ω; v]
//! A spatial force vector (wrench): [τ; f]

use crate::{DMat, DVec, Mat3, Mat4, Mat6, Vec3, Vec6, mat6_to_dmat, skew};
use nalgebra as na;
use serde::{Deserialize, Serialize};

/// 6D spatial vector: a motion vector (twist) or a force vector (wrench).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpatialVec {
    /// The underlying 6D vector [angular(3); linear(3)].
    pub data: Vec6,
}

impl SpatialVec {
    /// Create from angular and linear parts.
    #[inline]
    pub fn new(angular: Vec3, linear: Vec3) -> Self {
        Self {
            data: Vec6::new(
                angular.x, angular.y, angular.z, linear.x, linear.y, linear.z,
            ),
        }
    }

    /// Zero spatial vector.
    #[inline]
    pub fn zero() -> Self {
        Self {
            data: Vec6::zeros(),
        }
    }

    /// Angular (top 3) component.
    #[inline]
    pub fn angular(&self) -> Vec3 {
        Vec3::new(self.data[0], self.data[1], self.data[2])
    }

    /// Linear (bottom 3) component.
    #[inline]
    pub fn linear(&self) -> Vec3 {
        Vec3::new(self.data[3], self.data[4], self.data[5])
    }

    /// Spatial cross product for motion vectors: v ×ₘ w
    /// Used in velocity propagation.
    pub fn cross_motion(&self, other: &SpatialVec) -> SpatialVec {
        let w = self.angular();
        let v = self.linear();
        let w2 = other.angular();
        let v2 = other.linear();
        SpatialVec::new(w.cross(&w2), w.cross(&v2) + v.cross(&w2))
    }

    /// Spatial cross product for force vectors: v ×f f
    /// Used in bias force computation.
    pub fn cross_force(&self, other: &SpatialVec) -> SpatialVec {
        let w = self.angular();
        let v = self.linear();
        let t = other.angular();
        let f = other.linear();
        SpatialVec::new(w.cross(&t) + v.cross(&f), w.cross(&f))
    }

    /// Dot product of two spatial vectors.
    #[inline]
    pub fn dot(&self, other: &SpatialVec) -> f64 {
        self.data.dot(&other.data)
    }

    /// Copy into a length-6 dynamic vector.
    #[inline]
    pub fn to_dvec(&self) -> DVec {
        DVec::from_column_slice(self.data.as_slice())
    }

    /// Build from six values, e.g. a column of a 6 × k motion subspace.
    #[inline]
    pub fn from_iterator<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        Self {
            data: Vec6::from_iterator(iter),
        }
    }
}

impl std::ops::Add for SpatialVec {
    type Output = SpatialVec;
    #[inline]
    fn add(self, rhs: SpatialVec) -> SpatialVec {
        SpatialVec {
            data: self.data + rhs.data,
        }
    }
}

impl std::ops::Sub for SpatialVec {
    type Output = SpatialVec;
    #[inline]
    fn sub(self, rhs: SpatialVec) -> SpatialVec {
        SpatialVec {
            data: self.data - rhs.data,
        }
    }
}

impl std::ops::Mul<f64> for SpatialVec {
    type Output = SpatialVec;
    #[inline]
    fn mul(self, rhs: f64) -> SpatialVec {
        SpatialVec {
            data: self.data * rhs,
        }
    }
}

impl std::ops::Neg for SpatialVec {
    type Output = SpatialVec;
    #[inline]
    fn neg(self) -> SpatialVec {
        SpatialVec { data: -self.data }
    }
}

/// 6x6 spatial matrix (inertia, transforms acting on spatial vectors).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpatialMat {
    pub data: Mat6,
}

impl SpatialMat {
    /// Create from a 6x6 nalgebra matrix.
    #[inline]
    pub fn from_mat6(data: Mat6) -> Self {
        Self { data }
    }

    /// Zero matrix.
    #[inline]
    pub fn zero() -> Self {
        Self {
            data: Mat6::zeros(),
        }
    }

    /// Multiply by a spatial vector.
    #[inline]
    pub fn mul_vec(&self, v: &SpatialVec) -> SpatialVec {
        SpatialVec {
            data: self.data * v.data,
        }
    }

    /// Transpose.
    #[inline]
    pub fn transpose(&self) -> SpatialMat {
        SpatialMat {
            data: self.data.transpose(),
        }
    }

    /// Congruence transform Xᵀ · self · X with the motion matrix of `xform`.
    ///
    /// Carries an inertia expressed in the child frame of `xform` into its parent frame.
    pub fn transform_to_parent(&self, xform: &SpatialTransform) -> SpatialMat {
        let x = xform.to_motion_matrix();
        SpatialMat {
            data: x.transpose() * self.data * x,
        }
    }

    /// Copy into a 6x6 dynamic matrix.
    #[inline]
    pub fn to_dmat(&self) -> DMat {
        mat6_to_dmat(&self.data)
    }
}

impl std::ops::Add for SpatialMat {
    type Output = SpatialMat;
    #[inline]
    fn add(self, rhs: SpatialMat) -> SpatialMat {
        SpatialMat {
            data: self.data + rhs.data,
        }
    }
}

impl std::ops::Sub for SpatialMat {
    type Output = SpatialMat;
    #[inline]
    fn sub(self, rhs: SpatialMat) -> SpatialMat {
        SpatialMat {
            data: self.data - rhs.data,
        }
    }
}

/// Plücker transform: rigid body transformation acting on spatial vectors.
///
/// Represents a coordinate transform from frame A to frame B.
/// Stored as rotation R and translation p (position of B's origin in A's frame).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpatialTransform {
    /// Rotation from frame A to frame B.
    pub rot: Mat3,
    /// Position of frame B's origin expressed in frame A.
    pub pos: Vec3,
}

impl Default for SpatialTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl SpatialTransform {
    /// Create from rotation matrix and translation.
    pub fn new(rot: Mat3, pos: Vec3) -> Self {
        Self { rot, pos }
    }

    /// Identity transform.
    pub fn identity() -> Self {
        Self {
            rot: Mat3::identity(),
            pos: Vec3::zeros(),
        }
    }

    /// Pure rotation about the X axis.
    pub fn rot_x(angle: f64) -> Self {
        let (s, c) = angle.sin_cos();
        Self {
            rot: Mat3::new(1.0, 0.0, 0.0, 0.0, c, s, 0.0, -s, c),
            pos: Vec3::zeros(),
        }
    }

    /// Pure rotation about the Y axis.
    pub fn rot_y(angle: f64) -> Self {
        let (s, c) = angle.sin_cos();
        Self {
            rot: Mat3::new(c, 0.0, -s, 0.0, 1.0, 0.0, s, 0.0, c),
            pos: Vec3::zeros(),
        }
    }

    /// Pure rotation about the Z axis.
    pub fn rot_z(angle: f64) -> Self {
        let (s, c) = angle.sin_cos();
        Self {
            rot: Mat3::new(c, s, 0.0, -s, c, 0.0, 0.0, 0.0, 1.0),
            pos: Vec3::zeros(),
        }
    }

    /// Pure translation.
    pub fn translation(pos: Vec3) -> Self {
        Self {
            rot: Mat3::identity(),
            pos,
        }
    }

    /// Coordinate rotation of a frame turned by `angle` about an arbitrary unit axis.
    ///
    /// The stored matrix is the transpose of the active rotation, so that
    /// `rot_axis(x, a)` equals `rot_x(a)`.
    pub fn rot_axis(axis: &na::Unit<Vec3>, angle: f64) -> Self {
        let rot = na::Rotation3::from_axis_angle(axis, angle);
        Self {
            rot: rot.matrix().transpose(),
            pos: Vec3::zeros(),
        }
    }

    /// Transform of a child frame given by its pose in the parent frame.
    ///
    /// `rotation` maps child coordinates to parent coordinates and
    /// `translation` is the child origin in the parent frame.
    pub fn from_pose(rotation: &Mat3, translation: &Vec3) -> Self {
        Self {
            rot: rotation.transpose(),
            pos: *translation,
        }
    }

    /// Pose of frame B in frame A as a 4x4 homogeneous matrix.
    pub fn to_homogeneous(&self) -> Mat4 {
        let mut m = Mat4::identity();
        m.fixed_view_mut::<3, 3>(0, 0).copy_from(&self.rot.transpose());
        m.fixed_view_mut::<3, 1>(0, 3).copy_from(&self.pos);
        m
    }

    /// Get the 6x6 Plücker transform matrix for motion vectors.
    ///
    /// X = | R    0 |
    ///     | -R[p]× R |
    ///
    /// This transforms spatial motion vectors from frame A to frame B.
    pub fn to_motion_matrix(&self) -> Mat6 {
        let r = self.rot;
        let px = skew(&self.pos);
        let neg_rpx = -r * px;

        let mut m = Mat6::zeros();
        m.fixed_view_mut::<3, 3>(0, 0).copy_from(&r);
        m.fixed_view_mut::<3, 3>(3, 0).copy_from(&neg_rpx);
        m.fixed_view_mut::<3, 3>(3, 3).copy_from(&r);
        m
    }

    /// Transform a spatial motion vector from frame A to frame B.
    pub fn apply_motion(&self, v: &SpatialVec) -> SpatialVec {
        let w = v.angular();
        let vel = v.linear();
        let new_w = self.rot * w;
        let new_v = self.rot * (vel - self.pos.cross(&w));
        SpatialVec::new(new_w, new_v)
    }

    /// Transform a spatial force vector from frame A to frame B.
    pub fn apply_force(&self, f: &SpatialVec) -> SpatialVec {
        let tau = f.angular();
        let force = f.linear();
        let new_f = self.rot * force;
        let new_tau = self.rot * (tau - self.pos.cross(&force));
        SpatialVec::new(new_tau, new_f)
    }

    /// Inverse transform a spatial motion vector (from B to A).
    pub fn inv_apply_motion(&self, v: &SpatialVec) -> SpatialVec {
        let rt = self.rot.transpose();
        let w = v.angular();
        let vel = v.linear();
        let new_w = rt * w;
        let new_v = rt * vel + self.pos.cross(&(rt * w));
        SpatialVec::new(new_w, new_v)
    }

    /// Inverse transform a spatial force vector (from B to A).
    pub fn inv_apply_force(&self, f: &SpatialVec) -> SpatialVec {
        let rt = self.rot.transpose();
        let tau = f.angular();
        let force = f.linear();
        let new_f = rt * force;
        let new_tau = rt * tau + self.pos.cross(&(rt * force));
        SpatialVec::new(new_tau, new_f)
    }

    /// Map a point given in frame B coordinates into frame A coordinates.
    #[inline]
    pub fn point_to_parent(&self, p: &Vec3) -> Vec3 {
        self.rot.transpose() * p + self.pos
    }

    /// Map a point given in frame A coordinates into frame B coordinates.
    #[inline]
    pub fn point_from_parent(&self, p: &Vec3) -> Vec3 {
        self.rot * (p - self.pos)
    }

    /// Compose two transforms: self ∘ other.
    pub fn compose(&self, other: &SpatialTransform) -> SpatialTransform {
        SpatialTransform {
            rot: self.rot * other.rot,
            pos: other.pos + other.rot.transpose() * self.pos,
        }
    }

    /// Inverse of this transform.
    pub fn inverse(&self) -> SpatialTransform {
        let rt = self.rot.transpose();
        SpatialTransform {
            rot: rt,
            pos: -(self.rot * self.pos),
        }
    }
}

/// Spatial inertia of a rigid body about its center of mass.
///
/// Stored as mass, center of mass offset, and rotational inertia.
/// Can be converted to a 6x6 spatial inertia matrix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpatialInertia {
    /// Mass of the body.
    pub mass: f64,
    /// Center of mass position in body frame.
    pub com: Vec3,
    /// Rotational inertia about the center of mass (3x3 symmetric).
    pub inertia: Mat3,
}

impl SpatialInertia {
    /// Create a spatial inertia with the given mass, CoM offset, and inertia matrix.
    pub fn new(mass: f64, com: Vec3, inertia: Mat3) -> Self {
        Self { mass, com, inertia }
    }

    /// Massless body.
    pub fn zero() -> Self {
        Self {
            mass: 0.0,
            com: Vec3::zeros(),
            inertia: Mat3::zeros(),
        }
    }

    /// Create spatial inertia for a uniform sphere.
    pub fn sphere(mass: f64, radius: f64) -> Self {
        let i = 2.0 / 5.0 * mass * radius * radius;
        Self {
            mass,
            com: Vec3::zeros(),
            inertia: Mat3::from_diagonal(&Vec3::new(i, i, i)),
        }
    }

    /// Convert to 6x6 spatial inertia matrix (about the body frame origin).
    ///
    /// I_spatial = | I + m[c]×[c]×ᵀ   m[c]× |
    ///             | m[c]×ᵀ             mE    |
    pub fn to_matrix(&self) -> SpatialMat {
        let cx = skew(&self.com);
        let m = self.mass;
        let i3 = Mat3::identity() * m;

        let mut mat = Mat6::zeros();
        let top_left = self.inertia + cx * cx.transpose() * m;
        mat.fixed_view_mut::<3, 3>(0, 0).copy_from(&top_left);
        let mcx = cx * m;
        mat.fixed_view_mut::<3, 3>(0, 3).copy_from(&mcx);
        mat.fixed_view_mut::<3, 3>(3, 0).copy_from(&mcx.transpose());
        mat.fixed_view_mut::<3, 3>(3, 3).copy_from(&i3);

        SpatialMat::from_mat6(mat)
    }

    /// Recover mass, center of mass and rotational inertia from a 6x6 spatial inertia.
    ///
    /// Inverse of [`SpatialInertia::to_matrix`]; a massless matrix yields a zero CoM.
    pub fn from_matrix(m: &SpatialMat) -> SpatialInertia {
        let mass = m.data[(3, 3)];
        let com = if mass.abs() > 1e-12 {
            // top-right block is m[c]×
            Vec3::new(m.data[(2, 4)], m.data[(0, 5)], m.data[(1, 3)]) / mass
        } else {
            Vec3::zeros()
        };
        let cx = skew(&com);
        let top_left: Mat3 = m.data.fixed_view::<3, 3>(0, 0).into_owned();
        SpatialInertia {
            mass,
            com,
            inertia: top_left - cx * cx.transpose() * mass,
        }
    }
}
