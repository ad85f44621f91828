//! Map generalized velocities to the time derivative of Q.
//!
//! Q has one more slot than Qdot per quaternion joint: the three vector
//! components sit in the joint's DoF slots and the scalar parts are
//! appended after all DoFs, in quaternion order.

use arbor_math::{DVec, Quat, Vec3};
use arbor_model::{KinematicTree, Result, check_dimension};

/// dQ/dt for the velocities `qdot`.
///
/// Translation and Euler slots pass through. Each quaternion's slots
/// receive its derivative under the body-frame angular velocity held in
/// Qdot, with norm stabilization gain `k_stab`.
pub fn compute_qdot(tree: &KinematicTree, q: &DVec, qdot: &DVec, k_stab: f64) -> Result<DVec> {
    check_dimension("Q", q.len(), tree.nb_q())?;
    check_dimension("Qdot", qdot.len(), tree.nb_qdot())?;

    let mut out = DVec::zeros(tree.nb_q());
    out.rows_mut(0, qdot.len()).copy_from(qdot);

    for segment in tree.segments() {
        let Some(ordinal) = segment.quat_ordinal() else {
            continue;
        };
        let rot = segment.first_dof() + segment.nb_dof_trans();
        let w_slot = tree.quat_w_index(ordinal);
        let quat = Quat::new(q[w_slot], q[rot], q[rot + 1], q[rot + 2]);
        let omega = Vec3::new(qdot[rot], qdot[rot + 1], qdot[rot + 2]);

        let dq = quat.derivative(&omega, k_stab);
        out[rot] = dq.v.x;
        out[rot + 1] = dq.v.y;
        out[rot + 2] = dq.v.z;
        out[w_slot] = dq.w;
    }
    Ok(out)
}
