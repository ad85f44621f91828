//! arbor: articulated multibody dynamics.
//!
//! This is the umbrella crate: it re-exports the math primitives, the
//! kinematic tree description and the rigid body algorithms, with
//! [`Model`] as the main entry point.

pub use arbor_math::{self, DMat, DVec, Mat3, Mat4, Quat, SpatialTransform, SpatialVec, Vec3};
pub use arbor_model::{
    self, ArborError, Axis, BodyRef, DofRanges, DofSequence, KinematicTree, ModelConfig, Range,
    Result, Segment, SegmentCharacteristics,
};
pub use arbor_rigid::{
    self, ContactConstraintSet, ExternalForceSet, ExternalForces, KinematicState, Marker, Model,
    PointContacts, RemovedAxes,
};
