//! Rigid body kinematics and dynamics on arbor kinematic trees.
//!
//! Algorithms take a [`KinematicTree`](arbor_model::KinematicTree) and a
//! [`KinematicState`] computed by [`update_kinematics`]:
//! - RNEA: inverse dynamics (q, v, a → τ)
//! - CRBA: mass matrix, and its inverse by an articulated-body recursion
//! - ABA: forward dynamics (q, v, τ → a)
//! - Constrained and impulsive dynamics through [`ContactConstraintSet`]
//! - Center of mass, momentum and energy
//!
//! [`Model`] wraps a tree with its cached state and exposes every query
//! directly on generalized coordinates.

#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

pub mod aba;
pub mod com;
pub mod constrained;
pub mod crba;
pub mod energy;
pub mod external;
pub mod floating_base;
pub mod jacobian;
pub mod kinematics;
pub mod markers;
pub mod minv;
pub mod model;
pub mod qdot;
pub mod rnea;
pub mod state;

pub use aba::aba;
pub use constrained::{
    ContactConstraintSet, PointContact, PointContacts, compute_constraint_impulses_direct,
    contact_forces, forward_dynamics_constraints_direct,
};
pub use crba::mass_matrix;
pub use external::{ExternalForceSet, ExternalForces, body_forces};
pub use floating_base::{forward_dynamics_free_floating_base, root_dofs};
pub use kinematics::update_kinematics;
pub use markers::{Marker, RemovedAxes};
pub use minv::mass_matrix_inverse;
pub use model::Model;
pub use qdot::compute_qdot;
pub use rnea::{non_linear_effects, rnea};
pub use state::KinematicState;
