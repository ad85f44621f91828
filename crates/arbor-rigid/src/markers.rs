//! Skin markers and their projection onto segment planes or axes.
//!
//! A marker may drop some of its coordinates in the segment frame, which
//! constrains it to a plane or an axis of that segment. Projection maps a
//! world point into the segment frame, zeroes the dropped coordinates and
//! maps the result back to the world.

use crate::jacobian::{point_jacobian, rotation_jacobian};
use crate::kinematics::segment_transform;
use crate::state::KinematicState;
use arbor_math::{DMat, Vec3};
use arbor_model::{Axis, KinematicTree, Result};

/// Segment-frame axes dropped by a marker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemovedAxes {
    pub x: bool,
    pub y: bool,
    pub z: bool,
}

impl RemovedAxes {
    /// Parse a sequence of axis letters such as `"xz"`.
    pub fn from_sequence(axes: &str) -> Result<Self> {
        let mut out = Self::default();
        for c in axes.chars() {
            match Axis::from_char(c)? {
                Axis::X => out.x = true,
                Axis::Y => out.y = true,
                Axis::Z => out.z = true,
            }
        }
        Ok(out)
    }

    /// Whether any axis is dropped.
    pub fn any(&self) -> bool {
        self.x || self.y || self.z
    }

    /// Whether `axis` is dropped.
    pub fn contains(&self, axis: Axis) -> bool {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }

    fn apply(&self, mut p: Vec3) -> Vec3 {
        for axis in [Axis::X, Axis::Y, Axis::Z] {
            if self.contains(axis) {
                p[axis.index()] = 0.0;
            }
        }
        p
    }
}

/// A named point fixed on a segment.
#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub name: String,
    pub segment: usize,
    /// Position in segment coordinates.
    pub position: Vec3,
    pub removed_axes: RemovedAxes,
}

impl Marker {
    pub fn new(name: &str, segment: usize, position: Vec3, removed_axes: RemovedAxes) -> Self {
        Self {
            name: name.to_string(),
            segment,
            position,
            removed_axes,
        }
    }

    /// Whether the marker is confined to a plane or an axis of its segment.
    pub fn is_constrained(&self) -> bool {
        self.removed_axes.any()
    }
}

/// World position of a marker.
pub fn marker_position(tree: &KinematicTree, state: &KinematicState, marker: &Marker) -> Result<Vec3> {
    Ok(segment_transform(tree, state, marker.segment)?.point_to_parent(&marker.position))
}

/// Project a world point onto the plane or axis of `segment` left by `axes`.
///
/// With no axis removed the point is returned unchanged.
pub fn project_point(
    tree: &KinematicTree,
    state: &KinematicState,
    world_point: &Vec3,
    segment: usize,
    axes: RemovedAxes,
) -> Result<Vec3> {
    let xf = segment_transform(tree, state, segment)?;
    if !axes.any() {
        return Ok(*world_point);
    }
    let local = axes.apply(xf.point_from_parent(world_point));
    Ok(xf.point_to_parent(&local))
}

/// Project a world point with the constraints of `marker`.
pub fn project_marker(
    tree: &KinematicTree,
    state: &KinematicState,
    world_point: &Vec3,
    marker: &Marker,
) -> Result<Vec3> {
    project_point(tree, state, world_point, marker.segment, marker.removed_axes)
}

/// Project one world point per marker.
pub fn project_markers(
    tree: &KinematicTree,
    state: &KinematicState,
    world_points: &[Vec3],
    markers: &[Marker],
) -> Result<Vec<Vec3>> {
    arbor_model::check_dimension("marker points", world_points.len(), markers.len())?;
    world_points
        .iter()
        .zip(markers)
        .map(|(p, m)| project_marker(tree, state, p, m))
        .collect()
}

/// Jacobian of a projected marker, 3 × nb_qdot.
///
/// Unconstrained markers yield a zero matrix.
pub fn project_point_jacobian(
    tree: &KinematicTree,
    state: &KinematicState,
    world_point: &Vec3,
    marker: &Marker,
) -> Result<DMat> {
    let nv = tree.nb_qdot();
    if !marker.is_constrained() {
        segment_transform(tree, state, marker.segment)?;
        return Ok(DMat::zeros(3, nv));
    }
    let xf = segment_transform(tree, state, marker.segment)?;
    let local = marker.removed_axes.apply(xf.point_from_parent(world_point));

    // origin motion plus the rotation of each kept coordinate axis
    let mut jac = point_jacobian(tree, state, marker.segment, &Vec3::zeros())?;
    let rot_jac = rotation_jacobian(tree, state, marker.segment)?;
    for axis in [Axis::X, Axis::Y, Axis::Z] {
        if marker.removed_axes.contains(axis) {
            continue;
        }
        let n = axis.index();
        jac += rot_jac.rows(3 * n, 3) * local[n];
    }
    Ok(jac)
}
