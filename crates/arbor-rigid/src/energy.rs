//! Mechanical energy of the tree.

use crate::com::com_by_segment;
use crate::state::KinematicState;
use arbor_model::{KinematicTree, Result};

/// Kinetic energy Σ ½ vᵢ · Iᵢ vᵢ.
pub fn kinetic_energy(tree: &KinematicTree, state: &KinematicState) -> Result<f64> {
    state.require(tree)?;
    Ok(tree
        .bodies()
        .iter()
        .zip(&state.v)
        .map(|(b, v)| 0.5 * v.dot(&b.inertia.mul_vec(v)))
        .sum())
}

/// Gravitational potential energy, zero at the world origin.
pub fn potential_energy(tree: &KinematicTree, state: &KinematicState) -> Result<f64> {
    let gravity = tree.gravity();
    let coms = com_by_segment(tree, state)?;
    Ok(tree
        .segments()
        .iter()
        .zip(&coms)
        .map(|(s, p)| -s.characteristics().mass * gravity.dot(p))
        .sum())
}

/// Kinetic minus potential energy.
pub fn lagrangian(tree: &KinematicTree, state: &KinematicState) -> Result<f64> {
    Ok(kinetic_energy(tree, state)? - potential_energy(tree, state)?)
}

/// Kinetic plus potential energy.
pub fn total_energy(tree: &KinematicTree, state: &KinematicState) -> Result<f64> {
    Ok(kinetic_energy(tree, state)? + potential_energy(tree, state)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crba::mass_matrix;
    use crate::kinematics::update_kinematics;
    use approx::assert_relative_eq;
    use arbor_math::{DVec, GRAVITY, Mat3, SpatialTransform, Vec3};
    use arbor_model::{DofRanges, DofSequence, SegmentCharacteristics};

    fn lifted_pendulum() -> KinematicTree {
        let mut tree = KinematicTree::new();
        tree.add_segment(
            "slider",
            "",
            DofSequence::new("z", "").unwrap(),
            DofRanges::default(),
            SegmentCharacteristics::new(1.0, Vec3::zeros(), Mat3::zeros()),
            SpatialTransform::identity(),
        )
        .unwrap();
        tree.add_segment(
            "rod",
            "slider",
            DofSequence::new("", "x").unwrap(),
            DofRanges::default(),
            SegmentCharacteristics::new(2.0, Vec3::new(0.0, 0.0, -0.5), Mat3::identity() * 0.1),
            SpatialTransform::translation(Vec3::new(0.0, 0.0, 1.0)),
        )
        .unwrap();
        tree
    }

    #[test]
    fn kinetic_energy_is_quadratic_form_of_mass_matrix() {
        let tree = lifted_pendulum();
        let mut state = KinematicState::new();
        let q = DVec::from_vec(vec![0.3, 0.8]);
        let qdot = DVec::from_vec(vec![-1.0, 2.5]);
        update_kinematics(&tree, &mut state, &q, Some(&qdot), None).unwrap();
        let m = mass_matrix(&tree, &state).unwrap();
        let expected = 0.5 * qdot.dot(&(&m * &qdot));
        assert_relative_eq!(kinetic_energy(&tree, &state).unwrap(), expected, epsilon = 1e-12);
    }

    #[test]
    fn potential_energy_tracks_height() {
        let tree = lifted_pendulum();
        let mut state = KinematicState::new();
        update_kinematics(&tree, &mut state, &DVec::from_vec(vec![0.3, 0.0]), None, None).unwrap();
        // slider at 0.3, rod CoM at 0.3 + 1.0 - 0.5
        let v = potential_energy(&tree, &state).unwrap();
        assert_relative_eq!(v, GRAVITY * (0.3 + 2.0 * 0.8), epsilon = 1e-12);
        assert_relative_eq!(kinetic_energy(&tree, &state).unwrap(), 0.0);
        assert_relative_eq!(lagrangian(&tree, &state).unwrap(), -v, epsilon = 1e-12);
        assert_relative_eq!(total_energy(&tree, &state).unwrap(), v, epsilon = 1e-12);
    }
}
