//! Forward dynamics and impacts under bilateral contact constraints.
//!
//! Constraints are supplied by a [`ContactConstraintSet`]; the solver builds
//! the KKT system around the mass matrix and solves it with a dense LU.

use crate::crba::mass_matrix;
use crate::jacobian::{point_bias_acceleration, point_jacobian};
use crate::rnea::non_linear_effects;
use crate::state::KinematicState;
use arbor_math::{DMat, DVec, SpatialVec, Vec3};
use arbor_model::{ArborError, KinematicTree, Result, check_dimension};
use tracing::{debug, warn};

/// A set of bilateral constraints `G(q) q̈ = γ(q, q̇)`.
pub trait ContactConstraintSet {
    /// Number of scalar constraints.
    fn nb_constraints(&self) -> usize;

    /// Constraint Jacobian G, nb_constraints × nb_qdot.
    fn jacobian(&self, tree: &KinematicTree, state: &KinematicState) -> Result<DMat>;

    /// Acceleration bias γ such that G q̈ = γ.
    fn bias(&self, tree: &KinematicTree, state: &KinematicState) -> Result<DVec>;

    /// Constrained velocities G q̇⁺ sought by an impact.
    fn target_velocity(&self) -> DVec {
        DVec::zeros(self.nb_constraints())
    }

    /// Receive the constraint forces of the last forward-dynamics solve.
    fn set_forces(&mut self, forces: &DVec);

    /// Receive the constraint impulses of the last impact solve.
    fn set_impulses(&mut self, _impulses: &DVec) {}
}

/// Jacobian of the set, checked against its declared size.
fn checked_jacobian(
    tree: &KinematicTree,
    state: &KinematicState,
    constraints: &dyn ContactConstraintSet,
) -> Result<DMat> {
    let g = constraints.jacobian(tree, state)?;
    if g.nrows() != constraints.nb_constraints() {
        return Err(ArborError::configuration(format!(
            "constraint Jacobian has {} rows for {} constraints",
            g.nrows(),
            constraints.nb_constraints()
        )));
    }
    check_dimension("constraint Jacobian columns", g.ncols(), tree.nb_qdot())?;
    Ok(g)
}

/// Solve `[H Gᵀ; G 0] x = rhs`.
fn solve_kkt(h: &DMat, g: &DMat, rhs: DVec) -> Result<DVec> {
    let nv = h.nrows();
    let nc = g.nrows();
    let mut kkt = DMat::zeros(nv + nc, nv + nc);
    kkt.view_mut((0, 0), (nv, nv)).copy_from(h);
    kkt.view_mut((nv, 0), (nc, nv)).copy_from(g);
    kkt.view_mut((0, nv), (nv, nc)).copy_from(&g.transpose());
    kkt.lu().solve(&rhs).ok_or_else(|| {
        warn!(nv, nc, "singular constrained dynamics system");
        ArborError::numeric("constrained dynamics system is singular")
    })
}

/// Constrained accelerations and constraint forces.
fn solve_constrained(
    tree: &KinematicTree,
    state: &KinematicState,
    tau: &DVec,
    constraints: &dyn ContactConstraintSet,
    f_ext: Option<&[SpatialVec]>,
) -> Result<(DVec, DVec)> {
    check_dimension("Tau", tau.len(), tree.nb_generalized_torque())?;
    let g = checked_jacobian(tree, state, constraints)?;
    let gamma = constraints.bias(tree, state)?;
    if gamma.len() != g.nrows() {
        return Err(ArborError::configuration(format!(
            "constraint bias has {} entries for {} constraints",
            gamma.len(),
            g.nrows()
        )));
    }

    let h = mass_matrix(tree, state)?;
    let c = non_linear_effects(tree, state, f_ext)?;
    let nv = h.nrows();
    let nc = g.nrows();

    let mut rhs = DVec::zeros(nv + nc);
    rhs.rows_mut(0, nv).copy_from(&(tau - c));
    rhs.rows_mut(nv, nc).copy_from(&gamma);
    let x = solve_kkt(&h, &g, rhs)?;

    let qddot = x.rows(0, nv).into_owned();
    let forces = -x.rows(nv, nc).into_owned();
    debug!(nb_constraints = nc, "solved constrained forward dynamics");
    Ok((qddot, forces))
}

/// Forward dynamics with the constraints enforced; forces go back to `constraints`.
pub fn forward_dynamics_constraints_direct(
    tree: &KinematicTree,
    state: &KinematicState,
    tau: &DVec,
    constraints: &mut dyn ContactConstraintSet,
    f_ext: Option<&[SpatialVec]>,
) -> Result<DVec> {
    let (qddot, forces) = solve_constrained(tree, state, tau, constraints, f_ext)?;
    constraints.set_forces(&forces);
    Ok(qddot)
}

/// Constraint forces λ of the constrained forward dynamics.
pub fn contact_forces(
    tree: &KinematicTree,
    state: &KinematicState,
    tau: &DVec,
    constraints: &mut dyn ContactConstraintSet,
    f_ext: Option<&[SpatialVec]>,
) -> Result<DVec> {
    let (_, forces) = solve_constrained(tree, state, tau, constraints, f_ext)?;
    constraints.set_forces(&forces);
    Ok(forces)
}

/// Post-impact velocities: `[H Gᵀ; G 0][q̇⁺; -Λ] = [H q̇⁻; v⁺]`.
///
/// Without constraints the pre-impact velocities are returned unchanged.
pub fn compute_constraint_impulses_direct(
    tree: &KinematicTree,
    state: &KinematicState,
    qdot_pre: &DVec,
    constraints: &mut dyn ContactConstraintSet,
) -> Result<DVec> {
    check_dimension("Qdot", qdot_pre.len(), tree.nb_qdot())?;
    if constraints.nb_constraints() == 0 {
        return Ok(qdot_pre.clone());
    }
    let g = checked_jacobian(tree, state, constraints)?;
    let target = constraints.target_velocity();
    check_dimension("target velocity", target.len(), g.nrows())?;

    let h = mass_matrix(tree, state)?;
    let nv = h.nrows();
    let nc = g.nrows();
    let mut rhs = DVec::zeros(nv + nc);
    rhs.rows_mut(0, nv).copy_from(&(&h * qdot_pre));
    rhs.rows_mut(nv, nc).copy_from(&target);
    let x = solve_kkt(&h, &g, rhs)?;

    constraints.set_impulses(&(-x.rows(nv, nc).into_owned()));
    Ok(x.rows(0, nv).into_owned())
}

/// One scalar constraint: a segment point may not move along a world direction.
#[derive(Debug, Clone, PartialEq)]
pub struct PointContact {
    pub name: String,
    pub segment: usize,
    /// Contact point in segment coordinates.
    pub point: Vec3,
    /// Constrained direction in the world frame.
    pub normal: Vec3,
}

/// Point contacts, each blocking one world direction of a segment point.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointContacts {
    contacts: Vec<PointContact>,
    forces: DVec,
    impulses: DVec,
}

impl PointContacts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block motion of `point` (segment coordinates) along the world `normal`.
    pub fn add(
        &mut self,
        tree: &KinematicTree,
        name: &str,
        segment: usize,
        point: Vec3,
        normal: Vec3,
    ) -> Result<()> {
        tree.segment(segment)?;
        let norm = normal.norm();
        if norm <= f64::EPSILON {
            return Err(ArborError::configuration(format!(
                "contact '{name}' has a zero normal"
            )));
        }
        self.contacts.push(PointContact {
            name: name.to_string(),
            segment,
            point,
            normal: normal / norm,
        });
        self.forces = DVec::zeros(self.contacts.len());
        self.impulses = DVec::zeros(self.contacts.len());
        Ok(())
    }

    /// Block all three world directions of `point`.
    pub fn add_3d(&mut self, tree: &KinematicTree, name: &str, segment: usize, point: Vec3) -> Result<()> {
        for (axis, normal) in ["X", "Y", "Z"].iter().zip([Vec3::x(), Vec3::y(), Vec3::z()]) {
            self.add(tree, &format!("{name}_{axis}"), segment, point, normal)?;
        }
        Ok(())
    }

    pub fn contacts(&self) -> &[PointContact] {
        &self.contacts
    }

    /// Forces of the last constrained solve, one per contact.
    pub fn forces(&self) -> &DVec {
        &self.forces
    }

    /// Impulses of the last impact solve, one per contact.
    pub fn impulses(&self) -> &DVec {
        &self.impulses
    }
}

impl ContactConstraintSet for PointContacts {
    fn nb_constraints(&self) -> usize {
        self.contacts.len()
    }

    fn jacobian(&self, tree: &KinematicTree, state: &KinematicState) -> Result<DMat> {
        let mut g = DMat::zeros(self.contacts.len(), tree.nb_qdot());
        for (row, contact) in self.contacts.iter().enumerate() {
            let jac = point_jacobian(tree, state, contact.segment, &contact.point)?;
            let projected = jac.transpose() * contact.normal;
            g.row_mut(row).copy_from(&projected.transpose());
        }
        Ok(g)
    }

    fn bias(&self, tree: &KinematicTree, state: &KinematicState) -> Result<DVec> {
        self.contacts
            .iter()
            .map(|c| {
                let a = point_bias_acceleration(tree, state, c.segment, &c.point)?;
                Ok(-c.normal.dot(&a))
            })
            .collect::<Result<Vec<f64>>>()
            .map(DVec::from_vec)
    }

    fn set_forces(&mut self, forces: &DVec) {
        self.forces = forces.clone();
    }

    fn set_impulses(&mut self, impulses: &DVec) {
        self.impulses = impulses.clone();
    }
}
