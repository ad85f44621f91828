//! Joint types carried by the movable bodies of a kinematic tree.
//!
//! Every segment DoF becomes its own joint: one prismatic joint per
//! translation, one revolute joint per Euler rotation, or one spherical
//! joint for a quaternion-parameterized rotation.

use arbor_math::{DMat, Mat3, Quat, SpatialTransform, SpatialVec, Vec3};
use nalgebra as na;

/// Joint type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JointType {
    /// Single translational DOF along an axis.
    Prismatic,
    /// Single rotational DOF about an axis.
    Revolute,
    /// 3 DOF rotation parameterized by a quaternion.
    Spherical,
}

/// A joint connecting a body to its parent.
#[derive(Debug, Clone, PartialEq)]
pub struct Joint {
    /// Joint type.
    pub joint_type: JointType,
    /// Transform from parent body frame to joint frame (constant).
    pub parent_to_joint: SpatialTransform,
    /// Joint axis in the joint frame (unused for spherical joints).
    pub axis: Vec3,
}

impl Joint {
    /// Create a prismatic joint translating along `axis`.
    pub fn prismatic(parent_to_joint: SpatialTransform, axis: Vec3) -> Self {
        Self {
            joint_type: JointType::Prismatic,
            parent_to_joint,
            axis,
        }
    }

    /// Create a revolute joint rotating about `axis`.
    pub fn revolute(parent_to_joint: SpatialTransform, axis: Vec3) -> Self {
        Self {
            joint_type: JointType::Revolute,
            parent_to_joint,
            axis,
        }
    }

    /// Create a quaternion-parameterized spherical joint.
    pub fn spherical(parent_to_joint: SpatialTransform) -> Self {
        Self {
            joint_type: JointType::Spherical,
            parent_to_joint,
            axis: Vec3::zeros(),
        }
    }

    /// Number of velocity degrees of freedom.
    pub fn ndof(&self) -> usize {
        match self.joint_type {
            JointType::Prismatic | JointType::Revolute => 1,
            JointType::Spherical => 3,
        }
    }

    /// Compute the joint transform for the given joint position(s).
    ///
    /// `q` holds the `ndof()` position slots of the joint. `quat_w` is the
    /// scalar part of the quaternion for spherical joints and ignored otherwise.
    pub fn joint_transform(&self, q: &[f64], quat_w: f64) -> SpatialTransform {
        match self.joint_type {
            JointType::Prismatic => SpatialTransform::translation(self.axis * q[0]),
            JointType::Revolute => {
                SpatialTransform::rot_axis(&na::Unit::new_normalize(self.axis), q[0])
            }
            JointType::Spherical => {
                let quat = Quat::new(quat_w, q[0], q[1], q[2]);
                SpatialTransform::new(quat.to_matrix().transpose(), Vec3::zeros())
            }
        }
    }

    /// Motion subspace matrix S for this joint, 6 × ndof.
    pub fn motion_subspace_matrix(&self) -> DMat {
        match self.joint_type {
            JointType::Prismatic => {
                let s = SpatialVec::new(Vec3::zeros(), self.axis);
                DMat::from_column_slice(6, 1, s.data.as_slice())
            }
            JointType::Revolute => {
                let s = SpatialVec::new(self.axis, Vec3::zeros());
                DMat::from_column_slice(6, 1, s.data.as_slice())
            }
            JointType::Spherical => {
                // angular velocity in body frame: S = [I; 0]
                let mut s = DMat::zeros(6, 3);
                s.fixed_view_mut::<3, 3>(0, 0).copy_from(&Mat3::identity());
                s
            }
        }
    }

    /// Joint velocity S · qd for the joint's velocity slots.
    pub fn joint_velocity(&self, qd: &[f64]) -> SpatialVec {
        match self.joint_type {
            JointType::Prismatic => SpatialVec::new(Vec3::zeros(), self.axis * qd[0]),
            JointType::Revolute => SpatialVec::new(self.axis * qd[0], Vec3::zeros()),
            JointType::Spherical => {
                SpatialVec::new(Vec3::new(qd[0], qd[1], qd[2]), Vec3::zeros())
            }
        }
    }
}
