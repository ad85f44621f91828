//! Center of mass, momentum and whole-body inertia.
//!
//! Queries that divide by the total mass fail with a configuration error
//! when the tree carries no mass.

use crate::crba::composite_inertias;
use crate::jacobian::{point_acceleration, point_jacobian, point_position, point_velocity};
use crate::kinematics::{segment_anchor, segment_transform};
use crate::state::KinematicState;
use arbor_math::{DMat, Mat3, SpatialInertia, SpatialMat, SpatialVec, Vec3};
use arbor_model::{ArborError, KinematicTree, Result};
use tracing::warn;

fn total_mass(tree: &KinematicTree) -> Result<f64> {
    let mass = tree.mass();
    if mass <= 0.0 {
        return Err(ArborError::configuration(
            "center of mass is undefined for a model without mass",
        ));
    }
    Ok(mass)
}

/// Mass-weighted sum of a per-segment quantity, divided by the total mass.
fn weighted<F>(tree: &KinematicTree, mut per_segment: F) -> Result<Vec3>
where
    F: FnMut(usize) -> Result<Vec3>,
{
    let mass = total_mass(tree)?;
    let mut sum = Vec3::zeros();
    for (i, segment) in tree.segments().iter().enumerate() {
        let m = segment.characteristics().mass;
        if m != 0.0 {
            sum += per_segment(i)? * m;
        }
    }
    Ok(sum / mass)
}

/// World position of one segment's center of mass.
pub fn com_by_segment_of(tree: &KinematicTree, state: &KinematicState, segment: usize) -> Result<Vec3> {
    let com = tree.segment(segment)?.characteristics().com;
    point_position(tree, state, segment, &com)
}

/// World positions of every segment's center of mass.
pub fn com_by_segment(tree: &KinematicTree, state: &KinematicState) -> Result<Vec<Vec3>> {
    (0..tree.nb_segment())
        .map(|s| com_by_segment_of(tree, state, s))
        .collect()
}

/// Segment centers of mass as the columns of a 3 × nb_segment matrix.
pub fn com_by_segment_matrix(tree: &KinematicTree, state: &KinematicState) -> Result<DMat> {
    let coms = com_by_segment(tree, state)?;
    let mut out = DMat::zeros(3, coms.len());
    for (j, c) in coms.iter().enumerate() {
        out.fixed_view_mut::<3, 1>(0, j).copy_from(c);
    }
    Ok(out)
}

/// World position of the whole-body center of mass.
pub fn center_of_mass(tree: &KinematicTree, state: &KinematicState) -> Result<Vec3> {
    weighted(tree, |s| com_by_segment_of(tree, state, s))
}

/// Jacobian of one segment's center of mass, 3 × nb_qdot.
pub fn com_by_segment_jacobian(tree: &KinematicTree, state: &KinematicState, segment: usize) -> Result<DMat> {
    let com = tree.segment(segment)?.characteristics().com;
    point_jacobian(tree, state, segment, &com)
}

/// Jacobian of the whole-body center of mass, 3 × nb_qdot.
pub fn com_jacobian(tree: &KinematicTree, state: &KinematicState) -> Result<DMat> {
    let mass = total_mass(tree)?;
    let mut jac = DMat::zeros(3, tree.nb_qdot());
    for (i, segment) in tree.segments().iter().enumerate() {
        let m = segment.characteristics().mass;
        if m != 0.0 {
            jac += com_by_segment_jacobian(tree, state, i)? * m;
        }
    }
    Ok(jac / mass)
}

/// World velocity of one segment's center of mass.
pub fn com_by_segment_velocity(tree: &KinematicTree, state: &KinematicState, segment: usize) -> Result<Vec3> {
    let com = tree.segment(segment)?.characteristics().com;
    point_velocity(tree, state, segment, &com)
}

/// World acceleration of one segment's center of mass, gravity excluded.
pub fn com_by_segment_acceleration(
    tree: &KinematicTree,
    state: &KinematicState,
    segment: usize,
) -> Result<Vec3> {
    let com = tree.segment(segment)?.characteristics().com;
    point_acceleration(tree, state, segment, &com)
}

/// Velocity of the whole-body center of mass.
pub fn com_velocity(tree: &KinematicTree, state: &KinematicState) -> Result<Vec3> {
    weighted(tree, |s| com_by_segment_velocity(tree, state, s))
}

/// Acceleration of the whole-body center of mass, gravity excluded.
pub fn com_acceleration(tree: &KinematicTree, state: &KinematicState) -> Result<Vec3> {
    weighted(tree, |s| com_by_segment_acceleration(tree, state, s))
}

/// Spatial momentum of the whole tree about the world origin, `[moment; linear]`.
fn world_momentum(tree: &KinematicTree, state: &KinematicState) -> Result<SpatialVec> {
    state.require(tree)?;
    let mut h: Vec<SpatialVec> = tree
        .bodies()
        .iter()
        .zip(&state.v)
        .map(|(b, v)| b.inertia.mul_vec(v))
        .collect();
    let mut total = SpatialVec::zero();
    for i in (0..tree.nb_bodies()).rev() {
        let carried = state.x_lambda[i].inv_apply_force(&h[i]);
        match tree.bodies()[i].parent {
            Some(p) => h[p] = h[p] + carried,
            None => total = total + carried,
        }
    }
    Ok(total)
}

/// Angular momentum about the center of mass, world frame.
pub fn angular_momentum(tree: &KinematicTree, state: &KinematicState) -> Result<Vec3> {
    let com = center_of_mass(tree, state)?;
    let h = world_momentum(tree, state)?;
    Ok(h.angular() - com.cross(&h.linear()))
}

/// Each segment's own angular momentum about the whole-body center of mass.
///
/// The entries sum to [`angular_momentum`].
pub fn segments_angular_momentum(tree: &KinematicTree, state: &KinematicState) -> Result<Vec<Vec3>> {
    let com = center_of_mass(tree, state)?;
    tree.segments()
        .iter()
        .enumerate()
        .map(|(i, segment)| {
            let (anchor, offset) = segment_anchor(tree, i)?;
            let Some(b) = anchor else {
                return Ok(Vec3::zeros());
            };
            let v = offset.apply_motion(&state.v[b]);
            let h_local = segment.characteristics().spatial_inertia().to_matrix().mul_vec(&v);
            let h = segment_transform(tree, state, i)?.inv_apply_force(&h_local);
            Ok(h.angular() - com.cross(&h.linear()))
        })
        .collect()
}

/// Whole-body spatial inertia about the world origin, in world axes.
fn world_inertia(tree: &KinematicTree, state: &KinematicState) -> Result<SpatialMat> {
    state.require(tree)?;
    let i_c = composite_inertias(tree, state);
    Ok(tree
        .bodies()
        .iter()
        .enumerate()
        .filter(|(_, b)| b.parent.is_none())
        .fold(SpatialMat::zero(), |acc, (i, _)| {
            acc + i_c[i].transform_to_parent(&state.x_lambda[i])
        }))
}

/// Rotational inertia of the whole body about its center of mass, world axes.
pub fn body_inertia(tree: &KinematicTree, state: &KinematicState) -> Result<Mat3> {
    total_mass(tree)?;
    Ok(SpatialInertia::from_matrix(&world_inertia(tree, state)?).inertia)
}

/// Average angular velocity: solves `body_inertia · ω = angular_momentum`.
pub fn body_angular_velocity(tree: &KinematicTree, state: &KinematicState) -> Result<Vec3> {
    let inertia = body_inertia(tree, state)?;
    let momentum = angular_momentum(tree, state)?;
    let singular = || {
        warn!("whole-body inertia is singular");
        ArborError::numeric("whole-body inertia is singular")
    };
    if inertia.determinant().abs() <= tree.config().pivot_tolerance * inertia.norm().powi(3) {
        return Err(singular());
    }
    inertia.col_piv_qr().solve(&momentum).ok_or_else(singular)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinematics::update_kinematics;
    use approx::assert_relative_eq;
    use arbor_math::{DVec, Mat3, SpatialTransform};
    use arbor_model::{DofRanges, DofSequence, SegmentCharacteristics};

    fn two_links() -> KinematicTree {
        let mut tree = KinematicTree::new();
        tree.add_segment(
            "base",
            "",
            DofSequence::new("xy", "z").unwrap(),
            DofRanges::default(),
            SegmentCharacteristics::new(2.0, Vec3::new(0.5, 0.0, 0.0), Mat3::from_diagonal(&Vec3::new(0.01, 0.2, 0.2))),
            SpatialTransform::identity(),
        )
        .unwrap();
        tree.add_segment(
            "tip",
            "base",
            DofSequence::new("", "x").unwrap(),
            DofRanges::default(),
            SegmentCharacteristics::new(1.0, Vec3::new(0.0, 0.3, 0.1), Mat3::identity() * 0.05),
            SpatialTransform::translation(Vec3::new(1.0, 0.0, 0.0)),
        )
        .unwrap();
        tree.add_segment(
            "weight",
            "tip",
            DofSequence::fixed(),
            DofRanges::default(),
            SegmentCharacteristics::new(0.5, Vec3::zeros(), Mat3::identity() * 0.001),
            SpatialTransform::translation(Vec3::new(0.0, 0.5, 0.0)),
        )
        .unwrap();
        tree
    }

    fn evaluated(tree: &KinematicTree) -> KinematicState {
        let mut state = KinematicState::new();
        let q = DVec::from_vec(vec![0.2, -0.3, 0.6, 0.9]);
        let qdot = DVec::from_vec(vec![0.4, 0.1, -1.2, 2.0]);
        update_kinematics(tree, &mut state, &q, Some(&qdot), None).unwrap();
        state
    }

    #[test]
    fn center_of_mass_is_mass_weighted_average() {
        let tree = two_links();
        let state = evaluated(&tree);
        let coms = com_by_segment(&tree, &state).unwrap();
        let expected = (coms[0] * 2.0 + coms[1] * 1.0 + coms[2] * 0.5) / 3.5;
        assert_relative_eq!(center_of_mass(&tree, &state).unwrap(), expected, epsilon = 1e-12);

        let m = com_by_segment_matrix(&tree, &state).unwrap();
        assert_eq!(m.shape(), (3, 3));
        assert_relative_eq!(m[(1, 2)], coms[2].y, epsilon = 1e-12);
    }

    #[test]
    fn com_velocity_matches_jacobian() {
        let tree = two_links();
        let state = evaluated(&tree);
        let qdot = state.qdot().unwrap().clone();
        let v = com_jacobian(&tree, &state).unwrap() * qdot;
        assert_relative_eq!(
            com_velocity(&tree, &state).unwrap(),
            Vec3::new(v[0], v[1], v[2]),
            epsilon = 1e-12
        );
    }

    #[test]
    fn segment_momenta_sum_to_total() {
        let tree = two_links();
        let state = evaluated(&tree);
        let total = angular_momentum(&tree, &state).unwrap();
        let sum: Vec3 = segments_angular_momentum(&tree, &state).unwrap().iter().sum();
        assert_relative_eq!(sum, total, epsilon = 1e-12);
    }

    #[test]
    fn rigid_spin_recovers_angular_velocity() {
        // a single spinning segment: average angular velocity is its own
        let mut tree = KinematicTree::new();
        tree.add_segment(
            "top",
            "",
            DofSequence::new("", "z").unwrap(),
            DofRanges::default(),
            SegmentCharacteristics::new(1.0, Vec3::new(0.1, 0.0, 0.0), Mat3::from_diagonal(&Vec3::new(0.1, 0.2, 0.3))),
            SpatialTransform::identity(),
        )
        .unwrap();
        let mut state = KinematicState::new();
        let q = DVec::from_vec(vec![0.4]);
        update_kinematics(&tree, &mut state, &q, Some(&DVec::from_vec(vec![3.0])), None).unwrap();
        let w = body_angular_velocity(&tree, &state).unwrap();
        assert_relative_eq!(w, Vec3::new(0.0, 0.0, 3.0), epsilon = 1e-10);
        assert_relative_eq!(body_inertia(&tree, &state).unwrap()[(2, 2)], 0.3, epsilon = 1e-12);
    }

    #[test]
    fn massless_model_is_configuration_error() {
        let mut tree = KinematicTree::new();
        tree.add_segment(
            "virtual",
            "",
            DofSequence::new("x", "").unwrap(),
            DofRanges::default(),
            SegmentCharacteristics::massless(),
            SpatialTransform::identity(),
        )
        .unwrap();
        let mut state = KinematicState::new();
        update_kinematics(&tree, &mut state, &DVec::zeros(1), None, None).unwrap();
        assert!(matches!(center_of_mass(&tree, &state), Err(ArborError::Configuration { .. })));
        assert!(com_jacobian(&tree, &state).is_err());
        assert_eq!(com_by_segment(&tree, &state).unwrap().len(), 1);
    }
}
