//! Kinematic tree: segments expanded into movable bodies.
//!
//! Each segment DoF becomes its own massless movable body chained to the
//! previous one; translations come first, then rotations. The segment's
//! inertia is carried by the last body of its chain. A segment without DoF
//! becomes a fixed body whose inertia is merged into its movable parent.
//! Bodies are stored in topological order, so a parent always precedes its
//! children and the velocity indices of a body's DoFs increase with the body
//! index.

use crate::config::ModelConfig;
use crate::error::{ArborError, Result};
use crate::joint::Joint;
use crate::segment::{BodyRef, DofRanges, DofSequence, Rotations, Segment, SegmentCharacteristics};
use arbor_math::{SpatialMat, SpatialTransform, Vec3};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

static NEXT_REVISION: AtomicU64 = AtomicU64::new(1);

fn next_revision() -> u64 {
    NEXT_REVISION.fetch_add(1, Ordering::Relaxed)
}

/// A movable body: one joint of a segment's DoF chain.
#[derive(Debug, Clone, PartialEq)]
pub struct Body {
    /// `<segment>_<dof>` name of the joint carried by this body.
    pub name: String,
    /// Parent movable body, `None` for bodies attached to the world.
    pub parent: Option<usize>,
    /// Joint connecting the body to its parent.
    pub joint: Joint,
    /// Spatial inertia in body frame, including merged fixed bodies.
    pub inertia: SpatialMat,
    /// Index of the first DoF in Qdot (and of the vector slots in Q).
    pub q_index: usize,
    /// Quaternion ordinal for spherical joints.
    pub quat_ordinal: Option<usize>,
    /// Segment that owns the body.
    pub segment: usize,
}

/// A zero-DoF segment rigidly attached to a movable body.
#[derive(Debug, Clone, PartialEq)]
pub struct FixedBody {
    pub name: String,
    /// Movable body the fixed body is welded to, `None` for the world.
    pub parent: Option<usize>,
    /// Transform from the movable parent frame to the fixed body frame.
    pub parent_to_body: SpatialTransform,
    pub segment: usize,
}

/// Names accepted as "attached to the world" for a segment parent.
const ROOT_SENTINELS: [&str; 2] = ["", "root"];

fn is_root_sentinel(name: &str) -> bool {
    ROOT_SENTINELS
        .iter()
        .any(|s| s.eq_ignore_ascii_case(name.trim()))
}

/// Ordered list of segments together with their body expansion.
#[derive(Debug, Clone)]
pub struct KinematicTree {
    segments: Vec<Segment>,
    bodies: Vec<Body>,
    fixed_bodies: Vec<FixedBody>,
    children: Vec<Vec<usize>>,
    gravity: Vec3,
    config: ModelConfig,
    nb_dof: usize,
    nb_q: usize,
    nb_qdot: usize,
    nb_qddot: usize,
    nb_root: usize,
    nb_quat: usize,
    mass: f64,
    revision: u64,
}

impl Default for KinematicTree {
    fn default() -> Self {
        Self::new()
    }
}

impl KinematicTree {
    /// Empty tree with the default configuration.
    pub fn new() -> Self {
        Self::with_config(ModelConfig::default())
    }

    /// Empty tree using `config` (gravity and solver tolerances).
    pub fn with_config(config: ModelConfig) -> Self {
        Self {
            segments: Vec::new(),
            bodies: Vec::new(),
            fixed_bodies: Vec::new(),
            children: Vec::new(),
            gravity: config.gravity,
            config,
            nb_dof: 0,
            nb_q: 0,
            nb_qdot: 0,
            nb_qddot: 0,
            nb_root: 0,
            nb_quat: 0,
            mass: 0.0,
            revision: next_revision(),
        }
    }

    /// Append a segment and return its index.
    ///
    /// `parent` names an existing segment, or the root sentinel (`""` or
    /// `"root"`, any case) for a segment attached to the world.
    /// `reference_frame` is the segment pose in its parent frame.
    pub fn add_segment(
        &mut self,
        name: &str,
        parent: &str,
        dofs: DofSequence,
        ranges: DofRanges,
        characteristics: SegmentCharacteristics,
        reference_frame: SpatialTransform,
    ) -> Result<usize> {
        if self.segments.iter().any(|s| s.name == name) {
            return Err(ArborError::configuration(format!(
                "segment '{name}' already exists"
            )));
        }
        let parent_segment = match self.segments.iter().position(|s| s.name == parent) {
            Some(idx) => Some(idx),
            None if is_root_sentinel(parent) => None,
            None => {
                return Err(ArborError::configuration(format!(
                    "parent '{parent}' of segment '{name}' is not a known segment"
                )));
            }
        };
        let nb_dof = dofs.nb_dof();
        let ranges = ranges.resolved(nb_dof)?;

        let index = self.segments.len();
        let first_dof = self.nb_qdot;
        let quat_ordinal = dofs.is_quaternion().then_some(self.nb_quat);

        // movable body to hang from, and the offset from its frame
        let (mut parent_body, mut x_t) = match parent_segment.map(|p| self.segments[p].frame) {
            None => (None, reference_frame),
            Some(BodyRef::Movable(b)) => (Some(b), reference_frame),
            Some(BodyRef::Fixed(f)) => {
                let fixed = &self.fixed_bodies[f];
                (fixed.parent, reference_frame.compose(&fixed.parent_to_body))
            }
        };

        let frame = if nb_dof == 0 {
            self.fixed_bodies.push(FixedBody {
                name: name.to_string(),
                parent: parent_body,
                parent_to_body: x_t,
                segment: index,
            });
            BodyRef::Fixed(self.fixed_bodies.len() - 1)
        } else {
            let mut joints: Vec<(Joint, Option<usize>)> = dofs
                .translations
                .iter()
                .map(|a| (Joint::prismatic(SpatialTransform::identity(), a.unit()), None))
                .collect();
            match &dofs.rotations {
                Rotations::Euler(axes) => joints.extend(
                    axes.iter()
                        .map(|a| (Joint::revolute(SpatialTransform::identity(), a.unit()), None)),
                ),
                Rotations::Quaternion => joints.push((
                    Joint::spherical(SpatialTransform::identity()),
                    quat_ordinal,
                )),
            }

            let dof_names = dofs.dof_names();
            let mut q_index = first_dof;
            for (mut joint, ordinal) in joints {
                joint.parent_to_joint = x_t;
                let ndof = joint.ndof();
                let body = self.bodies.len();
                self.bodies.push(Body {
                    name: format!("{name}_{}", dof_names[q_index - first_dof]),
                    parent: parent_body,
                    joint,
                    inertia: SpatialMat::zero(),
                    q_index,
                    quat_ordinal: ordinal,
                    segment: index,
                });
                self.children.push(Vec::new());
                if let Some(p) = parent_body {
                    self.children[p].push(body);
                }
                parent_body = Some(body);
                x_t = SpatialTransform::identity();
                q_index += ndof;
            }
            BodyRef::Movable(self.bodies.len() - 1)
        };

        if parent_segment.is_none() {
            self.nb_root += nb_dof;
        }
        self.revision = next_revision();
        self.nb_dof += nb_dof;
        self.nb_q += dofs.nb_q();
        self.nb_qdot += nb_dof;
        self.nb_qddot += nb_dof;
        if dofs.is_quaternion() {
            self.nb_quat += 1;
        }

        debug!(
            segment = name,
            parent = parent,
            nb_dof,
            mass = characteristics.mass,
            "added segment"
        );

        self.segments.push(Segment {
            name: name.to_string(),
            parent: parent_segment,
            dofs,
            ranges,
            characteristics,
            reference_frame,
            first_dof,
            quat_ordinal,
            frame,
        });
        self.refresh_inertias();
        Ok(index)
    }

    /// Replace the mass properties of a segment, keeping the topology.
    pub fn update_segment_characteristics(
        &mut self,
        index: usize,
        characteristics: SegmentCharacteristics,
    ) -> Result<()> {
        let len = self.segments.len();
        let segment = self.segments.get_mut(index).ok_or(ArborError::Index {
            what: "segment",
            index,
            len,
        })?;
        debug!(segment = %segment.name, mass = characteristics.mass, "updated segment characteristics");
        segment.characteristics = characteristics;
        self.refresh_inertias();
        Ok(())
    }

    /// Rebuild body inertias and total mass from the segment characteristics.
    fn refresh_inertias(&mut self) {
        for body in &mut self.bodies {
            body.inertia = SpatialMat::zero();
        }
        for segment in &self.segments {
            let inertia = segment.characteristics.spatial_inertia().to_matrix();
            match segment.frame {
                BodyRef::Movable(b) => {
                    self.bodies[b].inertia = self.bodies[b].inertia + inertia;
                }
                BodyRef::Fixed(f) => {
                    let fixed = &self.fixed_bodies[f];
                    if let Some(b) = fixed.parent {
                        self.bodies[b].inertia =
                            self.bodies[b].inertia + inertia.transform_to_parent(&fixed.parent_to_body);
                    }
                }
            }
        }
        self.mass = self
            .segments
            .iter()
            .map(|s| s.characteristics.mass)
            .sum();
    }

    pub fn gravity(&self) -> Vec3 {
        self.gravity
    }

    pub fn set_gravity(&mut self, gravity: Vec3) {
        self.gravity = gravity;
    }

    /// Identifier of the current body layout.
    ///
    /// Unique across trees; it changes whenever a segment is added and is
    /// shared by clones until one of them is modified.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn nb_segment(&self) -> usize {
        self.segments.len()
    }

    /// Segment by index.
    pub fn segment(&self, index: usize) -> Result<&Segment> {
        self.segments.get(index).ok_or(ArborError::Index {
            what: "segment",
            index,
            len: self.segments.len(),
        })
    }

    /// Index of the segment called `name`.
    pub fn segment_index(&self, name: &str) -> Result<usize> {
        self.segments
            .iter()
            .position(|s| s.name == name)
            .ok_or_else(|| ArborError::NotFound {
                what: "segment",
                name: name.to_string(),
            })
    }

    /// Segment by name.
    pub fn segment_by_name(&self, name: &str) -> Result<&Segment> {
        let index = self.segment_index(name)?;
        Ok(&self.segments[index])
    }

    pub fn bodies(&self) -> &[Body] {
        &self.bodies
    }

    pub fn nb_bodies(&self) -> usize {
        self.bodies.len()
    }

    pub fn fixed_bodies(&self) -> &[FixedBody] {
        &self.fixed_bodies
    }

    /// Direct children of a movable body.
    pub fn children(&self, body: usize) -> &[usize] {
        &self.children[body]
    }

    /// Total number of DoFs.
    pub fn nb_dof(&self) -> usize {
        self.nb_dof
    }

    /// Size of the generalized coordinates vector.
    pub fn nb_q(&self) -> usize {
        self.nb_q
    }

    /// Size of the generalized velocities vector.
    pub fn nb_qdot(&self) -> usize {
        self.nb_qdot
    }

    /// Size of the generalized accelerations vector.
    pub fn nb_qddot(&self) -> usize {
        self.nb_qddot
    }

    /// Size of the generalized torques vector.
    pub fn nb_generalized_torque(&self) -> usize {
        self.nb_qddot
    }

    /// Number of DoFs carried by segments attached to the world.
    pub fn nb_root(&self) -> usize {
        self.nb_root
    }

    /// Number of quaternion joints.
    pub fn nb_quat(&self) -> usize {
        self.nb_quat
    }

    /// Total mass of the segments.
    pub fn mass(&self) -> f64 {
        self.mass
    }

    /// Slot of a quaternion's scalar part in Q.
    pub fn quat_w_index(&self, ordinal: usize) -> usize {
        self.nb_q - self.nb_quat + ordinal
    }

    /// Frame body of a segment.
    pub fn segment_body(&self, index: usize) -> Result<BodyRef> {
        Ok(self.segment(index)?.frame())
    }

    /// Owning segment of a body reference.
    pub fn body_segment(&self, body: BodyRef) -> usize {
        match body {
            BodyRef::Movable(b) => self.bodies[b].segment,
            BodyRef::Fixed(f) => self.fixed_bodies[f].segment,
        }
    }

    /// Segment name to frame body, in segment order.
    pub fn body_id_mapping(&self) -> Vec<(&str, BodyRef)> {
        self.segments
            .iter()
            .map(|s| (s.name.as_str(), s.frame))
            .collect()
    }

    /// `<segment>_<dof>` for every DoF, then `<segment>_QuatW` for every quaternion.
    pub fn name_dof(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .segments
            .iter()
            .flat_map(|s| {
                s.dofs
                    .dof_names()
                    .into_iter()
                    .map(move |d| format!("{}_{d}", s.name))
            })
            .collect();
        names.extend(
            self.segments
                .iter()
                .filter(|s| s.is_quaternion())
                .map(|s| format!("{}_QuatW", s.name)),
        );
        names
    }

    /// Qdot index of the DoF `dof_name` (e.g. `RotX`) of segment `segment_name`.
    pub fn dof_index(&self, segment_name: &str, dof_name: &str) -> Result<usize> {
        let segment = self.segment_by_name(segment_name)?;
        segment
            .dofs
            .dof_names()
            .iter()
            .position(|d| d == dof_name)
            .map(|k| segment.first_dof + k)
            .ok_or_else(|| ArborError::NotFound {
                what: "dof",
                name: format!("{segment_name}_{dof_name}"),
            })
    }

    /// For every movable body, its DoFs followed by all descendant DoFs in pre-order.
    pub fn body_subtrees(&self) -> Vec<Vec<usize>> {
        let mut subtrees = Vec::with_capacity(self.bodies.len());
        let mut stack = Vec::new();
        for b in 0..self.bodies.len() {
            let mut dofs = Vec::new();
            stack.push(b);
            while let Some(n) = stack.pop() {
                let body = &self.bodies[n];
                dofs.extend(body.q_index..body.q_index + body.joint.ndof());
                stack.extend(self.children[n].iter().rev());
            }
            subtrees.push(dofs);
        }
        subtrees
    }

    /// For every DoF, the ordered DoFs of its subtree: the DoFs of its own
    /// body first, then every descendant DoF.
    pub fn dof_subtrees(&self) -> Vec<Vec<usize>> {
        let mut out = vec![Vec::new(); self.nb_qdot];
        for (body, subtree) in self.bodies.iter().zip(self.body_subtrees()) {
            for k in 0..body.joint.ndof() {
                out[body.q_index + k] = subtree.clone();
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::Range;
    use arbor_math::Mat3;
    use approx::assert_relative_eq;

    fn unit_segment() -> SegmentCharacteristics {
        SegmentCharacteristics::new(1.0, Vec3::new(0.0, 0.0, -0.5), Mat3::identity() * 0.1)
    }

    fn add(tree: &mut KinematicTree, name: &str, parent: &str, trans: &str, rot: &str) -> usize {
        tree.add_segment(
            name,
            parent,
            DofSequence::new(trans, rot).unwrap(),
            DofRanges::default(),
            unit_segment(),
            SpatialTransform::translation(Vec3::new(0.0, 0.0, -1.0)),
        )
        .unwrap()
    }

    #[test]
    fn empty_tree_has_no_dofs() {
        let tree = KinematicTree::new();
        assert_eq!(tree.nb_q(), 0);
        assert_eq!(tree.nb_qdot(), 0);
        assert_eq!(tree.nb_qddot(), 0);
        assert_eq!(tree.nb_segment(), 0);
        assert!(tree.dof_subtrees().is_empty());
        assert_eq!(tree.gravity(), Vec3::new(0.0, 0.0, -9.81));
    }

    #[test]
    fn counts_and_roots() {
        let mut tree = KinematicTree::new();
        add(&mut tree, "pelvis", "ROOT", "xyz", "q");
        add(&mut tree, "thigh", "pelvis", "", "xy");
        add(&mut tree, "shank", "thigh", "", "x");

        assert_eq!(tree.nb_dof(), 9);
        assert_eq!(tree.nb_qdot(), 9);
        assert_eq!(tree.nb_q(), 10);
        assert_eq!(tree.nb_generalized_torque(), 9);
        assert_eq!(tree.nb_root(), 6);
        assert_eq!(tree.nb_quat(), 1);
        assert_eq!(tree.quat_w_index(0), 9);
        assert_relative_eq!(tree.mass(), 3.0);
        // 3 prismatic + 1 spherical + 2 + 1 revolute
        assert_eq!(tree.nb_bodies(), 7);
    }

    #[test]
    fn unknown_parent_is_rejected() {
        let mut tree = KinematicTree::new();
        let err = tree.add_segment(
            "arm",
            "torso",
            DofSequence::new("", "x").unwrap(),
            DofRanges::default(),
            unit_segment(),
            SpatialTransform::identity(),
        );
        assert!(matches!(err, Err(ArborError::Configuration { .. })));
        assert_eq!(tree.nb_segment(), 0);
        assert_eq!(tree.nb_q(), 0);
    }

    #[test]
    fn duplicate_name_and_bad_ranges_leave_tree_unchanged() {
        let mut tree = KinematicTree::new();
        add(&mut tree, "a", "", "", "z");
        assert!(tree
            .add_segment(
                "a",
                "",
                DofSequence::new("", "x").unwrap(),
                DofRanges::default(),
                unit_segment(),
                SpatialTransform::identity(),
            )
            .is_err());
        let bad = DofRanges {
            qdot: vec![Range::new(-1.0, 1.0).unwrap(); 3],
            ..DofRanges::default()
        };
        assert!(tree
            .add_segment(
                "b",
                "a",
                DofSequence::new("", "x").unwrap(),
                bad,
                unit_segment(),
                SpatialTransform::identity(),
            )
            .is_err());
        assert_eq!(tree.nb_segment(), 1);
        assert_eq!(tree.nb_bodies(), 1);
        assert_eq!(tree.nb_qdot(), 1);
    }

    #[test]
    fn segment_lookup_errors() {
        let mut tree = KinematicTree::new();
        add(&mut tree, "a", "", "", "z");
        assert_eq!(tree.segment(0).unwrap().name(), "a");
        assert!(matches!(tree.segment(3), Err(ArborError::Index { index: 3, len: 1, .. })));
        assert!(matches!(tree.segment_by_name("b"), Err(ArborError::NotFound { .. })));
    }

    #[test]
    fn dof_names_and_indices() {
        let mut tree = KinematicTree::new();
        add(&mut tree, "pelvis", "", "z", "q");
        add(&mut tree, "arm", "pelvis", "", "y");
        assert_eq!(
            tree.name_dof(),
            vec![
                "pelvis_TransZ",
                "pelvis_QuatX",
                "pelvis_QuatY",
                "pelvis_QuatZ",
                "arm_RotY",
                "pelvis_QuatW"
            ]
        );
        assert_eq!(tree.dof_index("arm", "RotY").unwrap(), 4);
        assert_eq!(tree.dof_index("pelvis", "QuatY").unwrap(), 2);
        assert!(tree.dof_index("arm", "RotX").is_err());
    }

    #[test]
    fn fixed_segment_merges_into_movable_parent() {
        let mut tree = KinematicTree::new();
        add(&mut tree, "upper", "", "", "x");
        tree.add_segment(
            "hand",
            "upper",
            DofSequence::fixed(),
            DofRanges::default(),
            SegmentCharacteristics::new(2.0, Vec3::zeros(), Mat3::zeros()),
            SpatialTransform::translation(Vec3::new(0.0, 0.0, -1.0)),
        )
        .unwrap();
        add(&mut tree, "finger", "hand", "", "y");

        assert_eq!(tree.fixed_bodies().len(), 1);
        assert_eq!(tree.segment(1).unwrap().frame(), BodyRef::Fixed(0));
        assert_eq!(tree.body_segment(BodyRef::Fixed(0)), 1);
        assert_eq!(tree.segment_body(2).unwrap(), BodyRef::Movable(1));
        assert!(tree.segment_body(3).is_err());
        // finger hangs from the movable upper body through the composed offset
        let finger = &tree.bodies()[1];
        assert_eq!(finger.parent, Some(0));
        assert_relative_eq!(
            finger.joint.parent_to_joint.pos,
            Vec3::new(0.0, 0.0, -2.0),
            epsilon = 1e-12
        );
        // the upper body now carries both masses
        assert_relative_eq!(tree.bodies()[0].inertia.data[(3, 3)], 3.0, epsilon = 1e-12);
        assert_eq!(tree.nb_root(), 1);
    }

    #[test]
    fn update_characteristics_refreshes_mass() {
        let mut tree = KinematicTree::new();
        add(&mut tree, "a", "", "", "x");
        tree.update_segment_characteristics(0, SegmentCharacteristics::new(4.0, Vec3::zeros(), Mat3::identity()))
            .unwrap();
        assert_relative_eq!(tree.mass(), 4.0);
        assert_relative_eq!(tree.bodies()[0].inertia.data[(4, 4)], 4.0);
        assert!(tree
            .update_segment_characteristics(5, SegmentCharacteristics::massless())
            .is_err());
    }

    #[test]
    fn revision_tracks_the_body_layout() {
        let mut tree = KinematicTree::new();
        let other = KinematicTree::new();
        assert_ne!(tree.revision(), other.revision());

        let empty = tree.revision();
        tree.add_segment(
            "a",
            "",
            DofSequence::new("", "x").unwrap(),
            DofRanges::default(),
            SegmentCharacteristics::massless(),
            SpatialTransform::identity(),
        )
        .unwrap();
        assert_ne!(tree.revision(), empty);

        let copy = tree.clone();
        assert_eq!(copy.revision(), tree.revision());
        let before = tree.revision();
        tree.update_segment_characteristics(0, SegmentCharacteristics::new(1.0, Vec3::zeros(), Mat3::identity()))
            .unwrap();
        assert_eq!(tree.revision(), before);
    }

    #[test]
    fn subtrees_follow_topology() {
        let mut tree = KinematicTree::new();
        add(&mut tree, "root", "", "", "q"); // dofs 0..3
        add(&mut tree, "left", "root", "", "xy"); // 3, 4
        add(&mut tree, "right", "root", "", "z"); // 5
        add(&mut tree, "left_tip", "left", "", "x"); // 6

        let subtrees = tree.dof_subtrees();
        assert_eq!(subtrees.len(), 7);
        assert_eq!(subtrees[0], vec![0, 1, 2, 3, 4, 6, 5]);
        assert_eq!(subtrees[2], subtrees[0]);
        assert_eq!(subtrees[3], vec![3, 4, 6]);
        assert_eq!(subtrees[4], vec![4, 6]);
        assert_eq!(subtrees[5], vec![5]);
        assert_eq!(subtrees[6], vec![6]);
    }

    #[test]
    fn deep_chain_subtrees_do_not_recurse() {
        let mut tree = KinematicTree::new();
        let mut parent = String::new();
        for i in 0..2000 {
            let name = format!("s{i}");
            add(&mut tree, &name, &parent, "", "x");
            parent = name;
        }
        let subtrees = tree.body_subtrees();
        assert_eq!(subtrees[0].len(), 2000);
        assert_eq!(subtrees[1999], vec![1999]);
    }
}
