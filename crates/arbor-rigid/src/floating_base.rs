//! Root accelerations of a free-floating base given the joint accelerations.

use crate::crba::mass_matrix;
use crate::rnea::rnea;
use crate::state::KinematicState;
use arbor_math::{DMat, DVec};
use arbor_model::{ArborError, KinematicTree, Result, check_dimension};
use tracing::warn;

/// Qdot indices of the DoFs carried by segments attached to the world.
pub fn root_dofs(tree: &KinematicTree) -> Vec<usize> {
    tree.segments()
        .iter()
        .filter(|s| s.parent().is_none())
        .flat_map(|s| s.first_dof()..s.first_dof() + s.nb_dof())
        .collect()
}

/// Solve the unactuated root rows of the equations of motion.
///
/// With the joint accelerations imposed and zero generalized force on
/// the root DoFs, returns the root accelerations (`nb_root` entries).
pub fn forward_dynamics_free_floating_base(
    tree: &KinematicTree,
    state: &KinematicState,
    qjoints_ddot: &DVec,
) -> Result<DVec> {
    let nr = tree.nb_root();
    check_dimension("QJointsDdot", qjoints_ddot.len(), tree.nb_qddot() - nr)?;
    if nr == 0 {
        return Err(ArborError::configuration(
            "free-floating base dynamics need at least one root DoF",
        ));
    }

    let roots = root_dofs(tree);
    let mut is_root = vec![false; tree.nb_qddot()];
    for &r in &roots {
        is_root[r] = true;
    }
    let joints: Vec<usize> = (0..tree.nb_qddot()).filter(|&i| !is_root[i]).collect();

    let mut qddot = DVec::zeros(tree.nb_qddot());
    for (k, &j) in joints.iter().enumerate() {
        qddot[j] = qjoints_ddot[k];
    }
    let tau_bias = rnea(tree, state, &qddot, None)?;

    let h = mass_matrix(tree, state)?;
    let h_rr = DMat::from_fn(nr, nr, |r, c| h[(roots[r], roots[c])]);
    let rhs = DVec::from_fn(nr, |r, _| -tau_bias[roots[r]]);
    let chol = h_rr.cholesky().ok_or_else(|| {
        warn!(nb_root = nr, "root mass block is not positive definite");
        ArborError::numeric("root block of the mass matrix is not positive definite")
    })?;
    Ok(chol.solve(&rhs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aba::aba;
    use crate::kinematics::update_kinematics;
    use approx::assert_relative_eq;
    use arbor_math::{GRAVITY, Mat3, SpatialTransform, Vec3};
    use arbor_model::{DofRanges, DofSequence, SegmentCharacteristics};

    fn floating(with_arm: bool) -> KinematicTree {
        let mut tree = KinematicTree::new();
        tree.add_segment(
            "trunk",
            "",
            DofSequence::new("xyz", "xyz").unwrap(),
            DofRanges::default(),
            SegmentCharacteristics::new(10.0, Vec3::new(0.0, 0.0, 0.3), Mat3::identity() * 0.4),
            SpatialTransform::identity(),
        )
        .unwrap();
        if with_arm {
            tree.add_segment(
                "arm",
                "trunk",
                DofSequence::new("", "y").unwrap(),
                DofRanges::default(),
                SegmentCharacteristics::new(2.0, Vec3::new(0.3, 0.0, 0.0), Mat3::identity() * 0.02),
                SpatialTransform::translation(Vec3::new(0.2, 0.0, 0.5)),
            )
            .unwrap();
        }
        tree
    }

    #[test]
    fn free_fall_of_a_single_root() {
        let tree = floating(false);
        let mut state = KinematicState::new();
        let q = DVec::from_vec(vec![0.3, -0.1, 1.0, 0.2, -0.4, 0.7]);
        update_kinematics(&tree, &mut state, &q, Some(&DVec::zeros(6)), None).unwrap();
        let root = forward_dynamics_free_floating_base(&tree, &state, &DVec::zeros(0)).unwrap();
        assert_relative_eq!(root.rows(0, 3).into_owned(), DVec::from_vec(vec![0.0, 0.0, -GRAVITY]), epsilon = 1e-9);
        assert_relative_eq!(root.rows(3, 3).into_owned(), DVec::zeros(3), epsilon = 1e-9);
    }

    #[test]
    fn matches_forward_dynamics_on_unactuated_roots() {
        let tree = floating(true);
        let mut state = KinematicState::new();
        let q = DVec::from_vec(vec![0.0, 0.1, 0.2, 0.3, -0.2, 0.1, 0.8]);
        let qdot = DVec::from_vec(vec![0.1, 0.0, -0.3, 0.5, 0.2, -0.1, 1.0]);
        update_kinematics(&tree, &mut state, &q, Some(&qdot), None).unwrap();

        let mut tau = DVec::zeros(7);
        tau[6] = 1.5;
        let qdd = aba(&tree, &state, &tau, None).unwrap();
        let root = forward_dynamics_free_floating_base(&tree, &state, &DVec::from_vec(vec![qdd[6]]))
            .unwrap();
        assert_relative_eq!(root, qdd.rows(0, 6).into_owned(), epsilon = 1e-9);
    }

    #[test]
    fn rejects_bad_sizes_and_fixed_base() {
        let tree = floating(true);
        let mut state = KinematicState::new();
        update_kinematics(&tree, &mut state, &DVec::zeros(7), Some(&DVec::zeros(7)), None).unwrap();
        assert!(matches!(
            forward_dynamics_free_floating_base(&tree, &state, &DVec::zeros(2)),
            Err(ArborError::Dimension { .. })
        ));

        let empty = KinematicTree::new();
        let mut state = KinematicState::new();
        update_kinematics(&empty, &mut state, &DVec::zeros(0), None, None).unwrap();
        assert!(matches!(
            forward_dynamics_free_floating_base(&empty, &state, &DVec::zeros(0)),
            Err(ArborError::Configuration { .. })
        ));
    }
}
