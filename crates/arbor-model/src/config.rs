//! Model-wide tunables.

use arbor_math::{GRAVITY, Vec3};
use serde::{Deserialize, Serialize};

/// Configuration applied when a [`crate::KinematicTree`] is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Gravity vector in world frame.
    pub gravity: Vec3,
    /// Default gain of the quaternion norm stabilization term.
    pub quaternion_stabilization: f64,
    /// Relative singularity threshold: a pivot of an articulated inertia at or
    /// below this fraction of that inertia's norm is treated as singular.
    pub pivot_tolerance: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            gravity: Vec3::new(0.0, 0.0, -GRAVITY),
            quaternion_stabilization: 1.0,
            pivot_tolerance: 1e-12,
        }
    }
}
