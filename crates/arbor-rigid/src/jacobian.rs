//! Point and segment Jacobians, velocities and accelerations.
//!
//! Every Jacobian has `nb_qdot` columns. Columns of DoFs that are not
//! ancestors of the segment are zero.

use crate::kinematics::{segment_anchor, segment_transform};
use crate::state::KinematicState;
use arbor_math::{DMat, SpatialVec, Vec3};
use arbor_model::{KinematicTree, Result};

/// Movable bodies from `body` up to its root, `body` first.
pub(crate) fn ancestors(tree: &KinematicTree, body: usize) -> impl Iterator<Item = usize> + '_ {
    std::iter::successors(Some(body), move |&b| tree.bodies()[b].parent)
}

/// World-frame spatial motion produced by a unit rate on each DoF of `body`,
/// about the world origin.
fn dof_world_motions(
    tree: &KinematicTree,
    state: &KinematicState,
    body: usize,
) -> Vec<(usize, SpatialVec)> {
    let b = &tree.bodies()[body];
    let s = b.joint.motion_subspace_matrix();
    (0..b.joint.ndof())
        .map(|k| {
            let column = SpatialVec::from_iterator(s.column(k).iter().copied());
            (b.q_index + k, state.x_base[body].inv_apply_motion(&column))
        })
        .collect()
}

/// World position of a point given in segment coordinates.
pub fn point_position(
    tree: &KinematicTree,
    state: &KinematicState,
    segment: usize,
    local: &Vec3,
) -> Result<Vec3> {
    Ok(segment_transform(tree, state, segment)?.point_to_parent(local))
}

/// 3 × nb_qdot Jacobian of the world position of a segment point.
pub fn point_jacobian(
    tree: &KinematicTree,
    state: &KinematicState,
    segment: usize,
    local: &Vec3,
) -> Result<DMat> {
    let p = point_position(tree, state, segment, local)?;
    let mut jac = DMat::zeros(3, tree.nb_qdot());
    if let (Some(body), _) = segment_anchor(tree, segment)? {
        for b in ancestors(tree, body) {
            for (col, sw) in dof_world_motions(tree, state, b) {
                let v = sw.linear() + sw.angular().cross(&p);
                jac.fixed_view_mut::<3, 1>(0, col).copy_from(&v);
            }
        }
    }
    Ok(jac)
}

/// 9 × nb_qdot Jacobian of the segment orientation.
///
/// Rows `3k..3k + 3` hold the derivative of the k-th column of the
/// segment-to-world rotation matrix.
pub fn rotation_jacobian(
    tree: &KinematicTree,
    state: &KinematicState,
    segment: usize,
) -> Result<DMat> {
    let rotation = segment_transform(tree, state, segment)?.rot.transpose();
    let mut jac = DMat::zeros(9, tree.nb_qdot());
    if let (Some(body), _) = segment_anchor(tree, segment)? {
        for b in ancestors(tree, body) {
            for (col, sw) in dof_world_motions(tree, state, b) {
                let w = sw.angular();
                for axis in 0..3 {
                    let d = w.cross(&rotation.column(axis).into_owned());
                    jac.fixed_view_mut::<3, 1>(3 * axis, col).copy_from(&d);
                }
            }
        }
    }
    Ok(jac)
}

/// World-frame velocity of a segment point.
pub fn point_velocity(
    tree: &KinematicTree,
    state: &KinematicState,
    segment: usize,
    local: &Vec3,
) -> Result<Vec3> {
    state.require(tree)?;
    let (anchor, offset) = segment_anchor(tree, segment)?;
    let Some(b) = anchor else {
        return Ok(Vec3::zeros());
    };
    let p = offset.point_to_parent(local);
    let v = &state.v[b];
    let body_velocity = v.linear() + v.angular().cross(&p);
    Ok(state.x_base[b].rot.transpose() * body_velocity)
}

/// World-frame acceleration of a segment point, gravity excluded.
///
/// Uses the accelerations held by `state`: when it was computed without
/// Qddot this is the velocity-product acceleration.
pub fn point_acceleration(
    tree: &KinematicTree,
    state: &KinematicState,
    segment: usize,
    local: &Vec3,
) -> Result<Vec3> {
    state.require(tree)?;
    point_acceleration_with(tree, state, &state.a, segment, local)
}

/// Body accelerations at zero Qddot: a_i = X_λ a_parent + c_i.
pub fn bias_accelerations(tree: &KinematicTree, state: &KinematicState) -> Result<Vec<SpatialVec>> {
    state.require(tree)?;
    let mut acc = vec![SpatialVec::zero(); tree.nb_bodies()];
    for (i, body) in tree.bodies().iter().enumerate() {
        acc[i] = match body.parent {
            Some(p) => state.x_lambda[i].apply_motion(&acc[p]) + state.c[i],
            None => state.c[i],
        };
    }
    Ok(acc)
}

/// World-frame acceleration of a segment point when Qddot is zero.
pub fn point_bias_acceleration(
    tree: &KinematicTree,
    state: &KinematicState,
    segment: usize,
    local: &Vec3,
) -> Result<Vec3> {
    let acc = bias_accelerations(tree, state)?;
    point_acceleration_with(tree, state, &acc, segment, local)
}

fn point_acceleration_with(
    tree: &KinematicTree,
    state: &KinematicState,
    acc: &[SpatialVec],
    segment: usize,
    local: &Vec3,
) -> Result<Vec3> {
    let (anchor, offset) = segment_anchor(tree, segment)?;
    let Some(b) = anchor else {
        return Ok(Vec3::zeros());
    };
    let p = offset.point_to_parent(local);
    let w = state.v[b].angular();
    let v_point = state.v[b].linear() + w.cross(&p);
    // spatial to classical: add ω × v of the point
    let a = acc[b].linear() + acc[b].angular().cross(&p) + w.cross(&v_point);
    Ok(state.x_base[b].rot.transpose() * a)
}

/// World-frame angular velocity of a segment.
pub fn segment_angular_velocity(
    tree: &KinematicTree,
    state: &KinematicState,
    segment: usize,
) -> Result<Vec3> {
    state.require(tree)?;
    Ok(match segment_anchor(tree, segment)?.0 {
        Some(b) => state.x_base[b].rot.transpose() * state.v[b].angular(),
        None => Vec3::zeros(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinematics::update_kinematics;
    use approx::assert_relative_eq;
    use arbor_math::{DVec, Mat3, SpatialTransform};
    use arbor_model::{DofRanges, DofSequence, SegmentCharacteristics};

    fn branched() -> KinematicTree {
        let mut tree = KinematicTree::new();
        let unit = SegmentCharacteristics::new(1.0, Vec3::new(0.0, 0.0, -0.3), Mat3::identity() * 0.05);
        tree.add_segment(
            "pelvis",
            "",
            DofSequence::new("xz", "q").unwrap(),
            DofRanges::default(),
            unit.clone(),
            SpatialTransform::identity(),
        )
        .unwrap();
        tree.add_segment(
            "thigh",
            "pelvis",
            DofSequence::new("", "xy").unwrap(),
            DofRanges::default(),
            unit.clone(),
            SpatialTransform::translation(Vec3::new(0.1, 0.0, -0.2)),
        )
        .unwrap();
        tree.add_segment(
            "shank",
            "thigh",
            DofSequence::new("y", "z").unwrap(),
            DofRanges::default(),
            unit,
            SpatialTransform::new(SpatialTransform::rot_x(0.3).rot, Vec3::new(0.0, 0.05, -0.4)),
        )
        .unwrap();
        tree
    }

    fn sample_q() -> DVec {
        // pelvis: TransX TransZ QuatX QuatY QuatZ | thigh: 2 | shank: 2 | QuatW
        let quat = arbor_math::Quat::from_axis_angle(&Vec3::new(0.2, 1.0, -0.4).normalize(), 0.8);
        DVec::from_vec(vec![
            0.1, -0.2, quat.v.x, quat.v.y, quat.v.z, 0.4, -0.7, 0.05, 1.1, quat.w,
        ])
    }

    fn sample_qdot() -> DVec {
        DVec::from_vec(vec![0.3, -0.1, 0.5, -0.2, 0.7, 1.2, -0.4, 0.25, 0.9])
    }

    #[test]
    fn jacobian_times_qdot_is_point_velocity() {
        let tree = branched();
        let mut state = KinematicState::new();
        let (q, qdot) = (sample_q(), sample_qdot());
        update_kinematics(&tree, &mut state, &q, Some(&qdot), None).unwrap();

        let local = Vec3::new(0.02, -0.1, 0.3);
        let jac = point_jacobian(&tree, &state, 2, &local).unwrap();
        let expected = point_velocity(&tree, &state, 2, &local).unwrap();
        let v = &jac * &qdot;
        assert_relative_eq!(Vec3::new(v[0], v[1], v[2]), expected, epsilon = 1e-10);
    }

    #[test]
    fn rotation_jacobian_matches_angular_velocity() {
        let tree = branched();
        let mut state = KinematicState::new();
        let (q, qdot) = (sample_q(), sample_qdot());
        update_kinematics(&tree, &mut state, &q, Some(&qdot), None).unwrap();

        let jac = rotation_jacobian(&tree, &state, 1).unwrap();
        let rdot = &jac * &qdot;
        let rotation = segment_transform(&tree, &state, 1).unwrap().rot.transpose();
        let omega = segment_angular_velocity(&tree, &state, 1).unwrap();
        for axis in 0..3 {
            let expected = omega.cross(&rotation.column(axis).into_owned());
            let got = Vec3::new(rdot[3 * axis], rdot[3 * axis + 1], rdot[3 * axis + 2]);
            assert_relative_eq!(got, expected, epsilon = 1e-10);
        }
    }

    #[test]
    fn jacobian_matches_finite_difference() {
        let tree = branched();
        let mut state = KinematicState::new();
        let q = sample_q();
        let local = Vec3::new(0.0, 0.1, -0.2);
        update_kinematics(&tree, &mut state, &q, None, None).unwrap();
        let jac = point_jacobian(&tree, &state, 2, &local).unwrap();

        // shank DoFs are plain Euler/translation slots
        let h = 1e-7;
        for col in 5..9 {
            let mut qp = q.clone();
            qp[col] += h;
            update_kinematics(&tree, &mut state, &qp, None, None).unwrap();
            let plus = point_position(&tree, &state, 2, &local).unwrap();
            let mut qm = q.clone();
            qm[col] -= h;
            update_kinematics(&tree, &mut state, &qm, None, None).unwrap();
            let minus = point_position(&tree, &state, 2, &local).unwrap();
            let fd = (plus - minus) / (2.0 * h);
            for r in 0..3 {
                assert_relative_eq!(jac[(r, col)], fd[r], epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn bias_acceleration_matches_state_without_qddot() {
        let tree = branched();
        let mut state = KinematicState::new();
        let (q, qdot) = (sample_q(), sample_qdot());
        update_kinematics(&tree, &mut state, &q, Some(&qdot), None).unwrap();
        let local = Vec3::new(0.1, 0.0, 0.0);
        let from_state = point_acceleration(&tree, &state, 2, &local).unwrap();
        let bias = point_bias_acceleration(&tree, &state, 2, &local).unwrap();
        assert_relative_eq!(from_state, bias, epsilon = 1e-12);

        // a non-zero Qddot changes the full acceleration but not the bias
        let qddot = DVec::from_element(9, 0.5);
        update_kinematics(&tree, &mut state, &q, Some(&qdot), Some(&qddot)).unwrap();
        let bias_again = point_bias_acceleration(&tree, &state, 2, &local).unwrap();
        assert_relative_eq!(bias, bias_again, epsilon = 1e-12);
        let jac = point_jacobian(&tree, &state, 2, &local).unwrap();
        let jqdd = &jac * &qddot;
        let full = point_acceleration(&tree, &state, 2, &local).unwrap();
        assert_relative_eq!(full, bias + Vec3::new(jqdd[0], jqdd[1], jqdd[2]), epsilon = 1e-10);
    }

    #[test]
    fn non_ancestor_columns_are_zero() {
        let mut tree = branched();
        tree.add_segment(
            "arm",
            "pelvis",
            DofSequence::new("", "z").unwrap(),
            DofRanges::default(),
            SegmentCharacteristics::massless(),
            SpatialTransform::identity(),
        )
        .unwrap();
        let mut q = sample_q().as_slice().to_vec();
        q.insert(9, 0.3);
        let q = DVec::from_vec(q);
        let mut state = KinematicState::new();
        update_kinematics(&tree, &mut state, &q, None, None).unwrap();
        let jac = point_jacobian(&tree, &state, 3, &Vec3::new(1.0, 0.0, 0.0)).unwrap();
        for col in 5..9 {
            assert_eq!(jac.column(col).norm(), 0.0);
        }
        assert!(jac.column(9).norm() > 0.0);
    }
}
