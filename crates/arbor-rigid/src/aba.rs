//! Articulated Body Algorithm (ABA) -- O(n) forward dynamics.
//!
//! Given the velocities held by the kinematic state and generalized
//! forces `tau`, compute qdd. Three passes over the kinematic tree:
//! 1. Forward pass: rigid-body inertias and bias forces
//! 2. Backward pass: articulated inertias and bias forces
//! 3. Forward pass: accelerations
//!
//! Single-DoF and spherical joints share the k×k pivot path.

use crate::state::KinematicState;
use arbor_math::{DMat, DVec, SpatialVec, Vec3, mat6_to_dmat};
use arbor_model::{ArborError, KinematicTree, Result, check_dimension};
use tracing::warn;

/// Invert an articulated pivot `D = Sᵀ IA S`.
///
/// Fails when `D` is not positive definite or one of its diagonal entries
/// is at most `tolerance` times the norm of the articulated inertia `ia`,
/// so the test does not depend on the model's units.
pub(crate) fn invert_pivot(d: &DMat, ia: &DMat, tolerance: f64, body: &str) -> Result<DMat> {
    let threshold = tolerance * ia.norm();
    let singular = d.diagonal().iter().any(|x| x.abs() <= threshold);
    let inverse = if singular {
        None
    } else {
        d.clone().cholesky().map(|c| c.inverse())
    };
    inverse.ok_or_else(|| {
        warn!(body, "singular articulated inertia pivot");
        ArborError::numeric(format!("articulated inertia of body '{body}' is singular"))
    })
}

fn to_spatial(v: &DVec) -> SpatialVec {
    SpatialVec::from_iterator(v.iter().copied())
}

/// Run the Articulated Body Algorithm.
///
/// Returns generalized accelerations of dimension `nb_qddot`. `f_ext`
/// holds one body-frame spatial force per movable body.
pub fn aba(
    tree: &KinematicTree,
    state: &KinematicState,
    tau: &DVec,
    f_ext: Option<&[SpatialVec]>,
) -> Result<DVec> {
    state.require(tree)?;
    check_dimension("Tau", tau.len(), tree.nb_generalized_torque())?;
    if let Some(ext) = f_ext {
        check_dimension("external forces", ext.len(), tree.nb_bodies())?;
    }

    let nb = tree.nb_bodies();
    let tolerance = tree.config().pivot_tolerance;
    let mut qdd = DVec::zeros(tree.nb_qddot());

    // -- Pass 1: rigid-body inertias and bias forces --
    let mut i_a: Vec<DMat> = Vec::with_capacity(nb);
    let mut p_a: Vec<SpatialVec> = Vec::with_capacity(nb);
    for (i, body) in tree.bodies().iter().enumerate() {
        let vel = &state.v[i];
        // gyroscopic bias v ×* (I v)
        let mut bias = vel.cross_force(&body.inertia.mul_vec(vel));
        if let Some(ext) = f_ext {
            bias = bias - ext[i];
        }
        i_a.push(body.inertia.to_dmat());
        p_a.push(bias);
    }

    // -- Pass 2: backward, articulated inertias and forces --
    let mut s: Vec<DMat> = Vec::with_capacity(nb);
    let mut u_mat: Vec<DMat> = vec![DMat::zeros(6, 0); nb];
    let mut d_inv: Vec<DMat> = vec![DMat::zeros(0, 0); nb];
    let mut u_vec: Vec<DVec> = vec![DVec::zeros(0); nb];
    for body in tree.bodies() {
        s.push(body.joint.motion_subspace_matrix());
    }

    for i in (0..nb).rev() {
        let body = &tree.bodies()[i];
        let ndof = s[i].ncols();

        // U = I_a * S, D = Sᵀ U, u = tau - Sᵀ p_a
        u_mat[i] = &i_a[i] * &s[i];
        let d_mat = s[i].transpose() * &u_mat[i];
        d_inv[i] = invert_pivot(&d_mat, &i_a[i], tolerance, &body.name)?;
        u_vec[i] = tau.rows(body.q_index, ndof) - s[i].transpose() * p_a[i].to_dvec();

        if let Some(p) = body.parent {
            // I_a^A = I_a - U D⁻¹ Uᵀ
            let u_dinv = &u_mat[i] * &d_inv[i];
            let ia_new = &i_a[i] - &u_dinv * u_mat[i].transpose();

            // p_a^A = p_a + I_a^A c + U D⁻¹ u
            let p_new = p_a[i].to_dvec() + &ia_new * state.c[i].to_dvec() + &u_dinv * &u_vec[i];

            let x_mot = mat6_to_dmat(&state.x_lambda[i].to_motion_matrix());
            let ia_parent = x_mot.transpose() * ia_new * &x_mot;
            let p_parent = state.x_lambda[i].inv_apply_force(&to_spatial(&p_new));

            i_a[p] += ia_parent;
            p_a[p] = p_a[p] + p_parent;
        }
    }

    // -- Pass 3: forward, accelerations --
    let a0 = SpatialVec::new(Vec3::zeros(), -tree.gravity());
    let mut acc = vec![SpatialVec::zero(); nb];
    for (i, body) in tree.bodies().iter().enumerate() {
        let a_parent = body.parent.map_or(a0, |p| acc[p]);
        let a_total = state.x_lambda[i].apply_motion(&a_parent) + state.c[i];

        let qdd_i = &d_inv[i] * (&u_vec[i] - u_mat[i].transpose() * a_total.to_dvec());
        qdd.rows_mut(body.q_index, qdd_i.len()).copy_from(&qdd_i);

        // a_i = a_parent + c + S * qdd
        acc[i] = a_total + to_spatial(&(&s[i] * &qdd_i));
    }

    Ok(qdd)
}
