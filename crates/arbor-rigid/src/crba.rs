//! Composite Rigid Body Algorithm (CRBA): joint-space mass matrix.

use crate::state::KinematicState;
use arbor_math::{DMat, SpatialMat, mat6_to_dmat};
use arbor_model::{KinematicTree, Result};

/// Composite inertias: each body's inertia plus everything it carries, in body frame.
pub(crate) fn composite_inertias(tree: &KinematicTree, state: &KinematicState) -> Vec<SpatialMat> {
    let mut i_c: Vec<SpatialMat> = tree.bodies().iter().map(|b| b.inertia).collect();
    for i in (0..tree.nb_bodies()).rev() {
        if let Some(p) = tree.bodies()[i].parent {
            i_c[p] = i_c[p] + i_c[i].transform_to_parent(&state.x_lambda[i]);
        }
    }
    i_c
}

/// Compute the joint-space mass matrix M(q), nb_qdot × nb_qdot and symmetric.
///
/// `state` must hold the kinematics of the requested configuration.
pub fn mass_matrix(tree: &KinematicTree, state: &KinematicState) -> Result<DMat> {
    state.require(tree)?;
    let nv = tree.nb_qdot();
    let mut mass_matrix = DMat::zeros(nv, nv);
    let i_c = composite_inertias(tree, state);

    for (i, body) in tree.bodies().iter().enumerate() {
        let s_i = body.joint.motion_subspace_matrix(); // 6 x k_i
        let v_i = body.q_index;
        let ndof_i = s_i.ncols();

        // F_i = I_c * S_i
        let mut f = i_c[i].to_dmat() * &s_i;
        let diag = s_i.transpose() * &f;
        mass_matrix.view_mut((v_i, v_i), (ndof_i, ndof_i)).copy_from(&diag);

        // Off-diagonal blocks: carry F up to each ancestor
        let mut j = i;
        while let Some(p) = tree.bodies()[j].parent {
            let x_mot = mat6_to_dmat(&state.x_lambda[j].to_motion_matrix());
            f = x_mot.transpose() * f;

            let parent = &tree.bodies()[p];
            let block = parent.joint.motion_subspace_matrix().transpose() * &f; // k_p x k_i
            let v_p = parent.q_index;
            mass_matrix
                .view_mut((v_p, v_i), (block.nrows(), ndof_i))
                .copy_from(&block);
            mass_matrix
                .view_mut((v_i, v_p), (ndof_i, block.nrows()))
                .copy_from(&block.transpose());
            j = p;
        }
    }

    Ok(mass_matrix)
}
