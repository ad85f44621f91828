//! External spatial forces applied to segments.
//!
//! Callers describe forces per segment in the world frame, about the world
//! origin. They are mapped onto the movable body carrying each segment and
//! expressed in that body's frame before entering RNEA or ABA.

use crate::kinematics::segment_anchor;
use crate::state::KinematicState;
use arbor_math::{SpatialVec, Vec3};
use arbor_model::{ArborError, KinematicTree, Result, check_dimension};

/// Source of external forces, evaluated at the current kinematic state.
pub trait ExternalForceSet {
    /// One world-frame spatial force `[moment about origin; force]` per segment.
    fn segment_forces(&self, tree: &KinematicTree, state: &KinematicState)
    -> Result<Vec<SpatialVec>>;
}

/// Map per-segment world forces onto movable bodies, in body frame.
///
/// Forces on segments welded to the world are absorbed by the world.
pub fn body_forces(
    tree: &KinematicTree,
    state: &KinematicState,
    segment_forces: &[SpatialVec],
) -> Result<Vec<SpatialVec>> {
    state.require(tree)?;
    check_dimension("external forces", segment_forces.len(), tree.nb_segment())?;
    let mut out = vec![SpatialVec::zero(); tree.nb_bodies()];
    for (segment, f) in segment_forces.iter().enumerate() {
        if let (Some(b), _) = segment_anchor(tree, segment)? {
            out[b] = out[b] + state.x_base[b].apply_force(f);
        }
    }
    Ok(out)
}

/// Evaluate an optional force set and map it onto bodies.
pub(crate) fn resolve(
    tree: &KinematicTree,
    state: &KinematicState,
    forces: Option<&dyn ExternalForceSet>,
) -> Result<Option<Vec<SpatialVec>>> {
    forces
        .map(|set| body_forces(tree, state, &set.segment_forces(tree, state)?))
        .transpose()
}

/// Constant world-frame forces, one slot per segment.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalForces {
    forces: Vec<SpatialVec>,
}

impl ExternalForces {
    /// No force on any segment of `tree`.
    pub fn new(tree: &KinematicTree) -> Self {
        Self {
            forces: vec![SpatialVec::zero(); tree.nb_segment()],
        }
    }

    /// Add a spatial force `[moment about world origin; force]` to a segment.
    pub fn add(&mut self, segment: usize, wrench: SpatialVec) -> Result<()> {
        let len = self.forces.len();
        let slot = self.forces.get_mut(segment).ok_or(ArborError::Index {
            what: "segment",
            index: segment,
            len,
        })?;
        *slot = *slot + wrench;
        Ok(())
    }

    /// Add a pure force acting through a world point.
    pub fn add_at_point(&mut self, segment: usize, force: Vec3, point: Vec3) -> Result<()> {
        self.add(segment, SpatialVec::new(point.cross(&force), force))
    }

    /// Add a force to the segment called `name`.
    pub fn add_by_name(&mut self, tree: &KinematicTree, name: &str, wrench: SpatialVec) -> Result<()> {
        self.add(tree.segment_index(name)?, wrench)
    }

    pub fn forces(&self) -> &[SpatialVec] {
        &self.forces
    }
}

impl ExternalForceSet for ExternalForces {
    fn segment_forces(
        &self,
        _tree: &KinematicTree,
        _state: &KinematicState,
    ) -> Result<Vec<SpatialVec>> {
        Ok(self.forces.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinematics::update_kinematics;
    use approx::assert_relative_eq;
    use arbor_math::{DVec, Mat3, SpatialTransform};
    use arbor_model::{DofRanges, DofSequence, SegmentCharacteristics};

    fn slider() -> KinematicTree {
        let mut tree = KinematicTree::new();
        tree.add_segment(
            "cart",
            "",
            DofSequence::new("x", "z").unwrap(),
            DofRanges::default(),
            SegmentCharacteristics::new(2.0, Vec3::zeros(), Mat3::identity()),
            SpatialTransform::identity(),
        )
        .unwrap();
        tree.add_segment(
            "marker_plate",
            "cart",
            DofSequence::fixed(),
            DofRanges::default(),
            SegmentCharacteristics::massless(),
            SpatialTransform::translation(Vec3::new(0.0, 1.0, 0.0)),
        )
        .unwrap();
        tree
    }

    #[test]
    fn forces_land_on_the_carrying_body() {
        let tree = slider();
        let mut state = KinematicState::new();
        let q = DVec::from_vec(vec![3.0, std::f64::consts::FRAC_PI_2]);
        update_kinematics(&tree, &mut state, &q, None, None).unwrap();

        let mut ext = ExternalForces::new(&tree);
        // push along world y through the cart origin at (3, 0, 0)
        ext.add_at_point(0, Vec3::new(0.0, 1.0, 0.0), Vec3::new(3.0, 0.0, 0.0))
            .unwrap();
        ext.add_by_name(&tree, "marker_plate", SpatialVec::zero()).unwrap();
        let bodies = body_forces(&tree, &state, &ext.segment_forces(&tree, &state).unwrap()).unwrap();

        assert_eq!(bodies.len(), 2);
        assert_eq!(bodies[0], SpatialVec::zero());
        // rotated body frame sees world +y as +x, with no moment about its origin
        assert_relative_eq!(bodies[1].linear(), Vec3::new(1.0, 0.0, 0.0), epsilon = 1e-12);
        assert_relative_eq!(bodies[1].angular(), Vec3::zeros(), epsilon = 1e-12);
    }

    #[test]
    fn wrong_count_and_index_are_rejected() {
        let tree = slider();
        let mut state = KinematicState::new();
        update_kinematics(&tree, &mut state, &DVec::zeros(2), None, None).unwrap();
        assert!(matches!(
            body_forces(&tree, &state, &[SpatialVec::zero()]),
            Err(ArborError::Dimension { .. })
        ));
        let mut ext = ExternalForces::new(&tree);
        assert!(matches!(
            ext.add(4, SpatialVec::zero()),
            Err(ArborError::Index { .. })
        ));
        assert!(ext.add_by_name(&tree, "nope", SpatialVec::zero()).is_err());
    }
}
