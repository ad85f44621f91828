//! `Model`: a kinematic tree together with its kinematic cache.
//!
//! Every query that takes generalized coordinates refreshes the cache
//! first, unless it already holds exactly those inputs. The `*_current`
//! variants read the cache as it stands.

use crate::constrained::{self, ContactConstraintSet};
use crate::external::{self, ExternalForceSet};
use crate::markers::{self, Marker, RemovedAxes};
use crate::state::KinematicState;
use crate::{aba, com, crba, energy, floating_base, jacobian, kinematics, minv, qdot, rnea};
use arbor_math::{DMat, DVec, Mat3, Mat4, SpatialTransform, SpatialVec, Vec3};
use arbor_model::{
    BodyRef, DofRanges, DofSequence, KinematicTree, ModelConfig, Result, Segment,
    SegmentCharacteristics,
};
use tracing::trace;

/// Articulated system with cached kinematics.
///
/// `Clone` is a deep copy: the clone shares nothing with the original.
#[derive(Debug, Clone, Default)]
pub struct Model {
    tree: KinematicTree,
    state: KinematicState,
}

impl Model {
    /// Empty model with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty model with the given configuration.
    pub fn with_config(config: ModelConfig) -> Self {
        Self::from_tree(KinematicTree::with_config(config))
    }

    /// Wrap an existing tree with an empty cache.
    pub fn from_tree(tree: KinematicTree) -> Self {
        Self {
            tree,
            state: KinematicState::new(),
        }
    }

    /// Independent copy of the tree and its cache.
    pub fn deep_copy(&self) -> Self {
        self.clone()
    }

    /// Underlying kinematic tree.
    pub fn tree(&self) -> &KinematicTree {
        &self.tree
    }

    /// Cached kinematic state.
    pub fn state(&self) -> &KinematicState {
        &self.state
    }

    // ── Building ──

    /// Append a segment; see [`KinematicTree::add_segment`].
    pub fn add_segment(
        &mut self,
        name: &str,
        parent: &str,
        dofs: DofSequence,
        ranges: DofRanges,
        characteristics: SegmentCharacteristics,
        reference_frame: SpatialTransform,
    ) -> Result<usize> {
        self.state.invalidate();
        self.tree
            .add_segment(name, parent, dofs, ranges, characteristics, reference_frame)
    }

    /// Replace the inertial data of a segment.
    pub fn update_segment_characteristics(
        &mut self,
        index: usize,
        characteristics: SegmentCharacteristics,
    ) -> Result<()> {
        self.tree.update_segment_characteristics(index, characteristics)
    }

    /// Set the world gravity vector.
    pub fn set_gravity(&mut self, gravity: Vec3) {
        self.tree.set_gravity(gravity);
    }

    /// World gravity vector.
    pub fn gravity(&self) -> Vec3 {
        self.tree.gravity()
    }

    // ── Topology ──

    /// Size of the generalized coordinate vector.
    pub fn nb_q(&self) -> usize {
        self.tree.nb_q()
    }

    /// Size of the generalized velocity vector.
    pub fn nb_qdot(&self) -> usize {
        self.tree.nb_qdot()
    }

    /// Size of the generalized acceleration vector.
    pub fn nb_qddot(&self) -> usize {
        self.tree.nb_qddot()
    }

    /// Size of the generalized force vector.
    pub fn nb_generalized_torque(&self) -> usize {
        self.tree.nb_generalized_torque()
    }

    /// Number of degrees of freedom.
    pub fn nb_dof(&self) -> usize {
        self.tree.nb_dof()
    }

    /// Degrees of freedom of the segments attached to the world.
    pub fn nb_root(&self) -> usize {
        self.tree.nb_root()
    }

    /// Number of quaternion joints.
    pub fn nb_quat(&self) -> usize {
        self.tree.nb_quat()
    }

    /// Number of segments.
    pub fn nb_segment(&self) -> usize {
        self.tree.nb_segment()
    }

    /// Total mass.
    pub fn mass(&self) -> f64 {
        self.tree.mass()
    }

    /// Segment by index.
    pub fn segment(&self, index: usize) -> Result<&Segment> {
        self.tree.segment(index)
    }

    /// Segment by name.
    pub fn segment_by_name(&self, name: &str) -> Result<&Segment> {
        self.tree.segment_by_name(name)
    }

    /// Body carrying the frame of a segment.
    pub fn segment_body(&self, index: usize) -> Result<BodyRef> {
        self.tree.segment_body(index)
    }

    /// Body names paired with their body references.
    pub fn body_id_mapping(&self) -> Vec<(&str, BodyRef)> {
        self.tree.body_id_mapping()
    }

    /// Name of every degree of freedom, in Qdot order.
    pub fn name_dof(&self) -> Vec<String> {
        self.tree.name_dof()
    }

    /// For each degree of freedom, the degrees of freedom it moves.
    pub fn dof_subtrees(&self) -> Vec<Vec<usize>> {
        self.tree.dof_subtrees()
    }

    // ── Kinematic cache ──

    /// Recompute kinematics unconditionally.
    pub fn update_kinematics(&mut self, q: &DVec, qdot: Option<&DVec>, qddot: Option<&DVec>) -> Result<()> {
        kinematics::update_kinematics(&self.tree, &mut self.state, q, qdot, qddot)
    }

    /// Bring the cache to `(q, qdot, qddot)`, reusing it when it matches.
    fn refresh(&mut self, q: &DVec, qdot: Option<&DVec>, qddot: Option<&DVec>) -> Result<()> {
        if self.state.is_current(q, qdot, qddot) && self.state.require(&self.tree).is_ok() {
            trace!("kinematic cache reused");
            return Ok(());
        }
        self.update_kinematics(q, qdot, qddot)
    }

    fn body_forces(&self, f_ext: Option<&dyn ExternalForceSet>) -> Result<Option<Vec<SpatialVec>>> {
        external::resolve(&self.tree, &self.state, f_ext)
    }

    // ── Kinematics ──

    /// Homogeneous world pose of a segment.
    pub fn global_jcs(&mut self, q: &DVec, segment: usize) -> Result<Mat4> {
        self.refresh(q, None, None)?;
        self.global_jcs_current(segment)
    }

    /// Homogeneous world pose of a segment, from the cache.
    pub fn global_jcs_current(&self, segment: usize) -> Result<Mat4> {
        kinematics::global_jcs(&self.tree, &self.state, segment)
    }

    /// Homogeneous world poses of every segment.
    pub fn all_global_jcs(&mut self, q: &DVec) -> Result<Vec<Mat4>> {
        self.refresh(q, None, None)?;
        self.all_global_jcs_current()
    }

    /// Homogeneous world poses of every segment, from the cache.
    pub fn all_global_jcs_current(&self) -> Result<Vec<Mat4>> {
        kinematics::all_global_jcs(&self.tree, &self.state)
    }

    /// Homogeneous pose of a segment in its parent frame.
    pub fn local_jcs(&self, segment: usize) -> Result<Mat4> {
        kinematics::local_jcs(&self.tree, segment)
    }

    /// Homogeneous pose of `segment` in the frame of `relative_to`.
    pub fn relative_jcs(&mut self, q: &DVec, segment: usize, relative_to: usize) -> Result<Mat4> {
        self.refresh(q, None, None)?;
        kinematics::relative_jcs(&self.tree, &self.state, segment, relative_to)
    }

    /// World mesh vertices, one list per segment.
    pub fn mesh_points(&mut self, q: &DVec) -> Result<Vec<Vec<Vec3>>> {
        self.refresh(q, None, None)?;
        kinematics::mesh_points(&self.tree, &self.state)
    }

    /// World mesh vertices of every segment as the columns of a 3×N matrix.
    pub fn mesh_points_in_matrix(&mut self, q: &DVec) -> Result<DMat> {
        self.refresh(q, None, None)?;
        kinematics::mesh_points_in_matrix(&self.tree, &self.state)
    }

    /// World mesh vertices of one segment.
    pub fn mesh_points_of(&mut self, q: &DVec, segment: usize) -> Result<Vec<Vec3>> {
        self.refresh(q, None, None)?;
        kinematics::segment_mesh_points(&self.tree, &self.state, segment)
    }

    /// World position of a point given in segment coordinates.
    pub fn point_position(&mut self, q: &DVec, segment: usize, local: &Vec3) -> Result<Vec3> {
        self.refresh(q, None, None)?;
        jacobian::point_position(&self.tree, &self.state, segment, local)
    }

    /// 3×nb_qdot Jacobian of a segment point.
    pub fn point_jacobian(&mut self, q: &DVec, segment: usize, local: &Vec3) -> Result<DMat> {
        self.refresh(q, None, None)?;
        self.point_jacobian_current(segment, local)
    }

    /// 3×nb_qdot Jacobian of a segment point, from the cache.
    pub fn point_jacobian_current(&self, segment: usize, local: &Vec3) -> Result<DMat> {
        jacobian::point_jacobian(&self.tree, &self.state, segment, local)
    }

    /// 9×nb_qdot Jacobian of the segment rotation matrix.
    pub fn rotation_jacobian(&mut self, q: &DVec, segment: usize) -> Result<DMat> {
        self.refresh(q, None, None)?;
        jacobian::rotation_jacobian(&self.tree, &self.state, segment)
    }

    /// World velocity of a segment point.
    pub fn point_velocity(&mut self, q: &DVec, qdot: &DVec, segment: usize, local: &Vec3) -> Result<Vec3> {
        self.refresh(q, Some(qdot), None)?;
        jacobian::point_velocity(&self.tree, &self.state, segment, local)
    }

    /// World acceleration of a segment point.
    pub fn point_acceleration(
        &mut self,
        q: &DVec,
        qdot: &DVec,
        qddot: &DVec,
        segment: usize,
        local: &Vec3,
    ) -> Result<Vec3> {
        self.refresh(q, Some(qdot), Some(qddot))?;
        jacobian::point_acceleration(&self.tree, &self.state, segment, local)
    }

    /// World angular velocity of a segment.
    pub fn segment_angular_velocity(&mut self, q: &DVec, qdot: &DVec, segment: usize) -> Result<Vec3> {
        self.refresh(q, Some(qdot), None)?;
        jacobian::segment_angular_velocity(&self.tree, &self.state, segment)
    }

    // ── Markers ──

    /// World position of a marker.
    pub fn marker_position(&mut self, q: &DVec, marker: &Marker) -> Result<Vec3> {
        self.refresh(q, None, None)?;
        markers::marker_position(&self.tree, &self.state, marker)
    }

    /// Project a world point onto the plane or axis of a segment left by `axes`.
    pub fn project_point(
        &mut self,
        q: &DVec,
        world_point: &Vec3,
        segment: usize,
        axes: RemovedAxes,
    ) -> Result<Vec3> {
        self.refresh(q, None, None)?;
        markers::project_point(&self.tree, &self.state, world_point, segment, axes)
    }

    /// Project a world point with the constraints of a marker.
    pub fn project_marker(&mut self, q: &DVec, world_point: &Vec3, marker: &Marker) -> Result<Vec3> {
        self.refresh(q, None, None)?;
        markers::project_marker(&self.tree, &self.state, world_point, marker)
    }

    /// Project world points onto their markers, pairwise.
    pub fn project_markers(&mut self, q: &DVec, world_points: &[Vec3], markers: &[Marker]) -> Result<Vec<Vec3>> {
        self.refresh(q, None, None)?;
        markers::project_markers(&self.tree, &self.state, world_points, markers)
    }

    /// 3×nb_qdot Jacobian of a projected marker.
    pub fn project_point_jacobian(&mut self, q: &DVec, world_point: &Vec3, marker: &Marker) -> Result<DMat> {
        self.refresh(q, None, None)?;
        markers::project_point_jacobian(&self.tree, &self.state, world_point, marker)
    }

    // ── Mass matrix ──

    /// Joint-space mass matrix.
    pub fn mass_matrix(&mut self, q: &DVec) -> Result<DMat> {
        self.refresh(q, None, None)?;
        self.mass_matrix_current()
    }

    /// Joint-space mass matrix, from the cache.
    pub fn mass_matrix_current(&self) -> Result<DMat> {
        crba::mass_matrix(&self.tree, &self.state)
    }

    /// Inverse of the joint-space mass matrix.
    pub fn mass_matrix_inverse(&mut self, q: &DVec) -> Result<DMat> {
        self.refresh(q, None, None)?;
        minv::mass_matrix_inverse(&self.tree, &self.state)
    }

    // ── Dynamics ──

    /// Generalized forces producing `qddot` (RNEA).
    pub fn inverse_dynamics(
        &mut self,
        q: &DVec,
        qdot: &DVec,
        qddot: &DVec,
        f_ext: Option<&dyn ExternalForceSet>,
    ) -> Result<DVec> {
        self.refresh(q, Some(qdot), None)?;
        let forces = self.body_forces(f_ext)?;
        rnea::rnea(&self.tree, &self.state, qddot, forces.as_deref())
    }

    /// Coriolis, centrifugal, gravity and external terms.
    pub fn non_linear_effects(
        &mut self,
        q: &DVec,
        qdot: &DVec,
        f_ext: Option<&dyn ExternalForceSet>,
    ) -> Result<DVec> {
        self.refresh(q, Some(qdot), None)?;
        let forces = self.body_forces(f_ext)?;
        rnea::non_linear_effects(&self.tree, &self.state, forces.as_deref())
    }

    /// Accelerations produced by `tau` (ABA).
    pub fn forward_dynamics(
        &mut self,
        q: &DVec,
        qdot: &DVec,
        tau: &DVec,
        f_ext: Option<&dyn ExternalForceSet>,
    ) -> Result<DVec> {
        self.refresh(q, Some(qdot), None)?;
        let forces = self.body_forces(f_ext)?;
        aba::aba(&self.tree, &self.state, tau, forces.as_deref())
    }

    /// Root accelerations of an unactuated floating base.
    pub fn forward_dynamics_free_floating_base(
        &mut self,
        q: &DVec,
        qdot: &DVec,
        qjoints_ddot: &DVec,
    ) -> Result<DVec> {
        self.refresh(q, Some(qdot), None)?;
        floating_base::forward_dynamics_free_floating_base(&self.tree, &self.state, qjoints_ddot)
    }

    /// Accelerations under contact constraints; forces go back to `constraints`.
    pub fn forward_dynamics_constraints_direct(
        &mut self,
        q: &DVec,
        qdot: &DVec,
        tau: &DVec,
        constraints: &mut dyn ContactConstraintSet,
        f_ext: Option<&dyn ExternalForceSet>,
    ) -> Result<DVec> {
        self.refresh(q, Some(qdot), None)?;
        let forces = self.body_forces(f_ext)?;
        constrained::forward_dynamics_constraints_direct(
            &self.tree,
            &self.state,
            tau,
            constraints,
            forces.as_deref(),
        )
    }

    /// Constraint forces of the constrained dynamics solve.
    pub fn contact_forces(
        &mut self,
        q: &DVec,
        qdot: &DVec,
        tau: &DVec,
        constraints: &mut dyn ContactConstraintSet,
        f_ext: Option<&dyn ExternalForceSet>,
    ) -> Result<DVec> {
        self.refresh(q, Some(qdot), None)?;
        let forces = self.body_forces(f_ext)?;
        constrained::contact_forces(&self.tree, &self.state, tau, constraints, forces.as_deref())
    }

    /// Post-impact velocities; impulses go back to `constraints`.
    pub fn compute_constraint_impulses_direct(
        &mut self,
        q: &DVec,
        qdot_pre: &DVec,
        constraints: &mut dyn ContactConstraintSet,
    ) -> Result<DVec> {
        self.refresh(q, Some(qdot_pre), None)?;
        constrained::compute_constraint_impulses_direct(&self.tree, &self.state, qdot_pre, constraints)
    }

    // ── Center of mass ──

    /// Whole-body center of mass.
    pub fn center_of_mass(&mut self, q: &DVec) -> Result<Vec3> {
        self.refresh(q, None, None)?;
        self.center_of_mass_current()
    }

    /// Whole-body center of mass, from the cache.
    pub fn center_of_mass_current(&self) -> Result<Vec3> {
        com::center_of_mass(&self.tree, &self.state)
    }

    /// World center of mass of every segment.
    pub fn com_by_segment(&mut self, q: &DVec) -> Result<Vec<Vec3>> {
        self.refresh(q, None, None)?;
        com::com_by_segment(&self.tree, &self.state)
    }

    /// World center of mass of one segment.
    pub fn com_by_segment_of(&mut self, q: &DVec, segment: usize) -> Result<Vec3> {
        self.refresh(q, None, None)?;
        com::com_by_segment_of(&self.tree, &self.state, segment)
    }

    /// Segment centers of mass as the columns of a 3×nb_segment matrix.
    pub fn com_by_segment_matrix(&mut self, q: &DVec) -> Result<DMat> {
        self.refresh(q, None, None)?;
        com::com_by_segment_matrix(&self.tree, &self.state)
    }

    /// 3×nb_qdot Jacobian of the whole-body center of mass.
    pub fn com_jacobian(&mut self, q: &DVec) -> Result<DMat> {
        self.refresh(q, None, None)?;
        com::com_jacobian(&self.tree, &self.state)
    }

    /// 3×nb_qdot Jacobian of a segment center of mass.
    pub fn com_by_segment_jacobian(&mut self, q: &DVec, segment: usize) -> Result<DMat> {
        self.refresh(q, None, None)?;
        com::com_by_segment_jacobian(&self.tree, &self.state, segment)
    }

    /// Velocity of the whole-body center of mass.
    pub fn com_velocity(&mut self, q: &DVec, qdot: &DVec) -> Result<Vec3> {
        self.refresh(q, Some(qdot), None)?;
        com::com_velocity(&self.tree, &self.state)
    }

    /// Acceleration of the whole-body center of mass.
    pub fn com_acceleration(&mut self, q: &DVec, qdot: &DVec, qddot: &DVec) -> Result<Vec3> {
        self.refresh(q, Some(qdot), Some(qddot))?;
        com::com_acceleration(&self.tree, &self.state)
    }

    /// Velocity of a segment center of mass.
    pub fn com_by_segment_velocity(&mut self, q: &DVec, qdot: &DVec, segment: usize) -> Result<Vec3> {
        self.refresh(q, Some(qdot), None)?;
        com::com_by_segment_velocity(&self.tree, &self.state, segment)
    }

    /// Acceleration of a segment center of mass.
    pub fn com_by_segment_acceleration(
        &mut self,
        q: &DVec,
        qdot: &DVec,
        qddot: &DVec,
        segment: usize,
    ) -> Result<Vec3> {
        self.refresh(q, Some(qdot), Some(qddot))?;
        com::com_by_segment_acceleration(&self.tree, &self.state, segment)
    }

    /// Angular momentum about the center of mass.
    ///
    /// A given `qddot` is also written into the cached accelerations.
    pub fn angular_momentum(&mut self, q: &DVec, qdot: &DVec, qddot: Option<&DVec>) -> Result<Vec3> {
        self.refresh(q, Some(qdot), qddot)?;
        com::angular_momentum(&self.tree, &self.state)
    }

    /// Per-segment angular momentum about the whole-body center of mass.
    pub fn segments_angular_momentum(
        &mut self,
        q: &DVec,
        qdot: &DVec,
        qddot: Option<&DVec>,
    ) -> Result<Vec<Vec3>> {
        self.refresh(q, Some(qdot), qddot)?;
        com::segments_angular_momentum(&self.tree, &self.state)
    }

    /// Whole-body rotational inertia about the center of mass, world axes.
    pub fn body_inertia(&mut self, q: &DVec) -> Result<Mat3> {
        self.refresh(q, None, None)?;
        com::body_inertia(&self.tree, &self.state)
    }

    /// Equivalent whole-body angular velocity.
    pub fn body_angular_velocity(&mut self, q: &DVec, qdot: &DVec) -> Result<Vec3> {
        self.refresh(q, Some(qdot), None)?;
        com::body_angular_velocity(&self.tree, &self.state)
    }

    // ── Energy ──

    /// Kinetic energy ½ q̇ᵀ M q̇.
    pub fn kinetic_energy(&mut self, q: &DVec, qdot: &DVec) -> Result<f64> {
        self.refresh(q, Some(qdot), None)?;
        energy::kinetic_energy(&self.tree, &self.state)
    }

    /// Gravitational potential energy.
    pub fn potential_energy(&mut self, q: &DVec) -> Result<f64> {
        self.refresh(q, None, None)?;
        energy::potential_energy(&self.tree, &self.state)
    }

    /// Kinetic minus potential energy.
    pub fn lagrangian(&mut self, q: &DVec, qdot: &DVec) -> Result<f64> {
        self.refresh(q, Some(qdot), None)?;
        energy::lagrangian(&self.tree, &self.state)
    }

    /// Kinetic plus potential energy.
    pub fn total_energy(&mut self, q: &DVec, qdot: &DVec) -> Result<f64> {
        self.refresh(q, Some(qdot), None)?;
        energy::total_energy(&self.tree, &self.state)
    }

    // ── Generalized velocities ──

    /// dQ/dt with stabilization gain `k_stab`.
    pub fn compute_qdot(&self, q: &DVec, qdot: &DVec, k_stab: f64) -> Result<DVec> {
        qdot::compute_qdot(&self.tree, q, qdot, k_stab)
    }

    /// dQ/dt with the configured stabilization gain.
    pub fn compute_qdot_default(&self, q: &DVec, qdot: &DVec) -> Result<DVec> {
        self.compute_qdot(q, qdot, self.tree.config().quaternion_stabilization)
    }
}
