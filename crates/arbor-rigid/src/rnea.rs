//! Recursive Newton-Euler Algorithm (RNEA): inverse dynamics.
//!
//! Given the velocities held by the kinematic state and desired
//! accelerations `qddot`, compute the generalized forces that produce them.

use crate::state::KinematicState;
use arbor_math::{DVec, SpatialVec, Vec3};
use arbor_model::{KinematicTree, Result, check_dimension};

/// Run RNEA: compute inverse dynamics torques.
///
/// `state` must hold kinematics computed with the Qdot of interest.
/// `f_ext` holds one body-frame spatial force per movable body.
pub fn rnea(
    tree: &KinematicTree,
    state: &KinematicState,
    qddot: &DVec,
    f_ext: Option<&[SpatialVec]>,
) -> Result<DVec> {
    state.require(tree)?;
    check_dimension("Qddot", qddot.len(), tree.nb_qddot())?;
    if let Some(ext) = f_ext {
        check_dimension("external forces", ext.len(), tree.nb_bodies())?;
    }

    let nb = tree.nb_bodies();
    let mut tau = DVec::zeros(tree.nb_generalized_torque());
    let mut acc = vec![SpatialVec::zero(); nb];
    let mut forces = vec![SpatialVec::zero(); nb];

    // gravity as a base acceleration
    let a0 = SpatialVec::new(Vec3::zeros(), -tree.gravity());

    // ── Forward pass: accelerations and body forces ──
    for (i, body) in tree.bodies().iter().enumerate() {
        let ndof = body.joint.ndof();
        let a_joint = body
            .joint
            .joint_velocity(&qddot.as_slice()[body.q_index..body.q_index + ndof]);
        let a_parent = body.parent.map_or(a0, |p| acc[p]);
        acc[i] = state.x_lambda[i].apply_motion(&a_parent) + state.c[i] + a_joint;

        let ia = &body.inertia;
        let vel = &state.v[i];
        forces[i] = ia.mul_vec(&acc[i]) + vel.cross_force(&ia.mul_vec(vel));
        if let Some(ext) = f_ext {
            forces[i] = forces[i] - ext[i];
        }
    }

    // ── Backward pass: project onto joints and carry to parents ──
    for i in (0..nb).rev() {
        let body = &tree.bodies()[i];
        let s_mat = body.joint.motion_subspace_matrix(); // 6 x ndof
        let projected = s_mat.transpose() * forces[i].to_dvec();
        tau.rows_mut(body.q_index, projected.len()).copy_from(&projected);

        if let Some(p) = body.parent {
            forces[p] = forces[p] + state.x_lambda[i].inv_apply_force(&forces[i]);
        }
    }

    Ok(tau)
}

/// Generalized forces needed to hold the current velocities at zero acceleration.
pub fn non_linear_effects(
    tree: &KinematicTree,
    state: &KinematicState,
    f_ext: Option<&[SpatialVec]>,
) -> Result<DVec> {
    rnea(tree, state, &DVec::zeros(tree.nb_qddot()), f_ext)
}
