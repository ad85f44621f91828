//! Inverse of the joint-space mass matrix by articulated-body recursion.
//!
//! O(n²) with no factorization of M: a backward sweep builds the
//! articulated inertias and the subtree columns of M⁻¹, a forward sweep
//! fills the remaining upper-triangle entries, and the result is mirrored.

use crate::aba::invert_pivot;
use crate::state::KinematicState;
use arbor_math::{DMat, DVec, mat6_to_dmat};
use arbor_model::{KinematicTree, Result};

/// Compute M(q)⁻¹ without forming M.
///
/// A body whose articulated pivot `Sᵀ IA S` is singular (e.g. a massless
/// leaf) makes the inverse undefined and yields a numeric failure.
pub fn mass_matrix_inverse(tree: &KinematicTree, state: &KinematicState) -> Result<DMat> {
    state.require(tree)?;
    let nb = tree.nb_bodies();
    let nv = tree.nb_qdot();
    let tolerance = tree.config().pivot_tolerance;
    let subtrees = tree.body_subtrees();

    let mut minv = DMat::zeros(nv, nv);
    let mut ia: Vec<DMat> = tree.bodies().iter().map(|b| b.inertia.to_dmat()).collect();
    let mut f: Vec<DMat> = vec![DMat::zeros(6, nv); nb];
    let x: Vec<DMat> = state
        .x_lambda
        .iter()
        .map(|x| mat6_to_dmat(&x.to_motion_matrix()))
        .collect();
    let s: Vec<DMat> = tree
        .bodies()
        .iter()
        .map(|b| b.joint.motion_subspace_matrix())
        .collect();
    let mut u: Vec<DMat> = vec![DMat::zeros(6, 0); nb];
    let mut d_inv: Vec<DMat> = vec![DMat::zeros(0, 0); nb];

    // Backward pass
    for i in (0..nb).rev() {
        let body = &tree.bodies()[i];
        let qi = body.q_index;
        let k = s[i].ncols();

        u[i] = &ia[i] * &s[i];
        let d = s[i].transpose() * &u[i];
        d_inv[i] = invert_pivot(&d, &ia[i], tolerance, &body.name)?;

        minv.view_mut((qi, qi), (k, k)).copy_from(&d_inv[i]);
        let dinv_st = &d_inv[i] * s[i].transpose(); // k x 6
        for &c in &subtrees[i] {
            let col = &dinv_st * f[i].column(c);
            for r in 0..k {
                minv[(qi + r, c)] -= col[r];
            }
        }

        if let Some(p) = body.parent {
            for &c in &subtrees[i] {
                let m_col = DVec::from_iterator(k, (0..k).map(|r| minv[(qi + r, c)]));
                let fi_col = f[i].column(c) + &u[i] * &m_col;
                let fp_col = x[i].transpose() * fi_col;
                for r in 0..6 {
                    f[p][(r, c)] += fp_col[r];
                }
            }
            let ia_a = &ia[i] - &u[i] * &d_inv[i] * u[i].transpose();
            let ia_parent = x[i].transpose() * ia_a * &x[i];
            ia[p] += ia_parent;
        }
    }

    // Forward pass: f now holds the motion-side quantities S M⁻¹ propagated down
    for col in f.iter_mut() {
        col.fill(0.0);
    }
    for i in 0..nb {
        let body = &tree.bodies()[i];
        let qi = body.q_index;
        let k = s[i].ncols();
        let width = nv - qi;

        if let Some(p) = body.parent {
            let xp = &x[i] * f[p].columns(qi, width); // 6 x width
            let delta = &d_inv[i] * u[i].transpose() * &xp; // k x width
            for r in 0..k {
                for c in 0..width {
                    minv[(qi + r, qi + c)] -= delta[(r, c)];
                }
            }
            let own = &s[i] * minv.view((qi, qi), (k, width)) + xp;
            f[i].columns_mut(qi, width).copy_from(&own);
        } else {
            let own = &s[i] * minv.view((qi, qi), (k, width));
            f[i].columns_mut(qi, width).copy_from(&own);
        }
    }

    // mirror the upper triangle
    for r in 0..nv {
        for c in 0..r {
            minv[(r, c)] = minv[(c, r)];
        }
    }
    Ok(minv)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crba::mass_matrix;
    use crate::kinematics::update_kinematics;
    use arbor_math::{Mat3, Quat, SpatialTransform, Vec3};
    use arbor_model::{ArborError, DofRanges, DofSequence, SegmentCharacteristics};

    fn assert_identity(m: &DMat, eps: f64) {
        for r in 0..m.nrows() {
            for c in 0..m.ncols() {
                let expected = if r == c { 1.0 } else { 0.0 };
                assert!(
                    (m[(r, c)] - expected).abs() < eps,
                    "M*Minv[{r},{c}] = {}",
                    m[(r, c)]
                );
            }
        }
    }

    fn humanoid() -> KinematicTree {
        let seg = |m: f64| {
            SegmentCharacteristics::new(
                m,
                Vec3::new(0.02, -0.01, -0.2),
                Mat3::new(0.08, 0.001, 0.002, 0.001, 0.07, 0.003, 0.002, 0.003, 0.02),
            )
        };
        let mut tree = KinematicTree::new();
        let mut add = |name: &str, parent: &str, t: &str, r: &str, m: f64, offset: Vec3| {
            tree.add_segment(
                name,
                parent,
                DofSequence::new(t, r).unwrap(),
                DofRanges::default(),
                seg(m),
                SpatialTransform::new(SpatialTransform::rot_y(0.2).rot, offset),
            )
            .unwrap();
        };
        add("pelvis", "", "xyz", "q", 10.0, Vec3::zeros());
        add("thigh_r", "pelvis", "", "xy", 5.0, Vec3::new(0.1, 0.0, -0.1));
        add("shank_r", "thigh_r", "", "x", 3.0, Vec3::new(0.0, 0.0, -0.4));
        add("thigh_l", "pelvis", "", "zyx", 5.0, Vec3::new(-0.1, 0.0, -0.1));
        add("trunk", "pelvis", "", "q", 20.0, Vec3::new(0.0, 0.0, 0.2));
        add("head", "trunk", "", "xz", 4.0, Vec3::new(0.0, 0.0, 0.5));
        tree
    }

    fn humanoid_q(tree: &KinematicTree) -> DVec {
        let mut q = DVec::from_fn(tree.nb_q(), |i, _| 0.1 * (i as f64 + 1.0).sin());
        let quats = [
            Quat::from_axis_angle(&Vec3::new(1.0, 0.3, -0.2).normalize(), 0.7),
            Quat::from_axis_angle(&Vec3::new(-0.1, 0.8, 0.4).normalize(), -0.4),
        ];
        for (k, name) in ["pelvis", "trunk"].iter().enumerate() {
            let seg = tree.segment_by_name(name).unwrap();
            let start = seg.first_dof() + seg.nb_dof_trans();
            q[start] = quats[k].v.x;
            q[start + 1] = quats[k].v.y;
            q[start + 2] = quats[k].v.z;
            q[tree.quat_w_index(seg.quat_ordinal().unwrap())] = quats[k].w;
        }
        q
    }

    #[test]
    fn inverse_of_branched_tree_with_quaternions() {
        let tree = humanoid();
        let q = humanoid_q(&tree);
        let mut state = KinematicState::new();
        update_kinematics(&tree, &mut state, &q, None, None).unwrap();

        let m = mass_matrix(&tree, &state).unwrap();
        let minv = mass_matrix_inverse(&tree, &state).unwrap();
        assert_identity(&(&m * &minv), 1e-9);
        assert_identity(&(&minv * &m), 1e-9);
    }

    #[test]
    fn massless_leaf_is_numeric_failure() {
        let mut tree = KinematicTree::new();
        tree.add_segment(
            "ghost",
            "",
            DofSequence::new("", "x").unwrap(),
            DofRanges::default(),
            SegmentCharacteristics::massless(),
            SpatialTransform::identity(),
        )
        .unwrap();
        let mut state = KinematicState::new();
        update_kinematics(&tree, &mut state, &DVec::zeros(1), None, None).unwrap();
        assert!(matches!(
            mass_matrix_inverse(&tree, &state),
            Err(ArborError::NumericFailure { .. })
        ));
    }

    #[test]
    fn empty_tree_gives_empty_inverse() {
        let tree = KinematicTree::new();
        let mut state = KinematicState::new();
        update_kinematics(&tree, &mut state, &DVec::zeros(0), None, None).unwrap();
        assert_eq!(mass_matrix_inverse(&tree, &state).unwrap().shape(), (0, 0));
    }
}
