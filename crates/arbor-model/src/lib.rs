//! Kinematic tree description for the arbor dynamics engine.
//!
//! `KinematicTree` is the static description of an articulated system:
//! named segments, their DoF sequences, mass properties and the movable
//! bodies they expand into. Evaluation against generalized coordinates
//! lives in `arbor-rigid`.

#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

pub mod config;
pub mod error;
pub mod joint;
pub mod segment;
pub mod tree;

pub use config::ModelConfig;
pub use error::{ArborError, Result, check_dimension};
pub use joint::{Joint, JointType};
pub use segment::{
    Axis, BodyRef, DofRanges, DofSequence, Range, Rotations, Segment, SegmentCharacteristics,
};
pub use tree::{Body, FixedBody, KinematicTree};
