//! Forward kinematics: body transforms, velocities and accelerations.

use crate::state::KinematicState;
use arbor_math::{DMat, DVec, Mat4, SpatialTransform, SpatialVec, Vec3};
use arbor_model::{BodyRef, KinematicTree, Result, check_dimension};
use tracing::trace;

/// Recompute every body transform, velocity and acceleration from generalized coordinates.
///
/// Missing `qdot` means zero velocities; missing `qddot` leaves the
/// velocity-product accelerations in `state.a`.
pub fn update_kinematics(
    tree: &KinematicTree,
    state: &mut KinematicState,
    q: &DVec,
    qdot: Option<&DVec>,
    qddot: Option<&DVec>,
) -> Result<()> {
    check_dimension("Q", q.len(), tree.nb_q())?;
    if let Some(qd) = qdot {
        check_dimension("Qdot", qd.len(), tree.nb_qdot())?;
    }
    if let Some(qdd) = qddot {
        check_dimension("Qddot", qdd.len(), tree.nb_qddot())?;
    }

    let nb = tree.nb_bodies();
    state.invalidate();
    state.resize(nb);

    for (i, body) in tree.bodies().iter().enumerate() {
        let joint = &body.joint;
        let slots = body.q_index..body.q_index + joint.ndof();
        let quat_w = body
            .quat_ordinal
            .map_or(1.0, |k| q[tree.quat_w_index(k)]);

        // x_lambda: parent → body (Plücker transform)
        let x_joint = joint.joint_transform(&q.as_slice()[slots.clone()], quat_w);
        let x_lambda = x_joint.compose(&joint.parent_to_joint);

        let v_joint = qdot.map_or(SpatialVec::zero(), |qd| {
            joint.joint_velocity(&qd.as_slice()[slots.clone()])
        });
        let a_joint = qddot.map_or(SpatialVec::zero(), |qdd| {
            joint.joint_velocity(&qdd.as_slice()[slots.clone()])
        });

        match body.parent {
            None => {
                state.x_base[i] = x_lambda;
                state.v[i] = v_joint;
                state.c[i] = SpatialVec::zero();
                state.a[i] = a_joint;
            }
            Some(p) => {
                state.x_base[i] = x_lambda.compose(&state.x_base[p]);
                state.v[i] = x_lambda.apply_motion(&state.v[p]) + v_joint;
                state.c[i] = state.v[i].cross_motion(&v_joint);
                state.a[i] = x_lambda.apply_motion(&state.a[p]) + state.c[i] + a_joint;
            }
        }
        state.x_lambda[i] = x_lambda;
    }

    state.set_key(tree, q, qdot, qddot);
    trace!(nb_bodies = nb, velocities = qdot.is_some(), accelerations = qddot.is_some(), "kinematics updated");
    Ok(())
}

/// Movable body carrying a segment and the transform from that body's frame
/// to the segment frame. `None` when the segment is welded to the world.
pub fn segment_anchor(
    tree: &KinematicTree,
    segment: usize,
) -> Result<(Option<usize>, SpatialTransform)> {
    Ok(match tree.segment(segment)?.frame() {
        BodyRef::Movable(b) => (Some(b), SpatialTransform::identity()),
        BodyRef::Fixed(f) => {
            let fixed = &tree.fixed_bodies()[f];
            (fixed.parent, fixed.parent_to_body)
        }
    })
}

/// World-to-segment transform.
pub fn segment_transform(
    tree: &KinematicTree,
    state: &KinematicState,
    segment: usize,
) -> Result<SpatialTransform> {
    state.require(tree)?;
    let (anchor, offset) = segment_anchor(tree, segment)?;
    Ok(match anchor {
        Some(b) => offset.compose(&state.x_base[b]),
        None => offset,
    })
}

/// Pose of a segment in the world frame, as a homogeneous matrix.
pub fn global_jcs(tree: &KinematicTree, state: &KinematicState, segment: usize) -> Result<Mat4> {
    Ok(segment_transform(tree, state, segment)?.to_homogeneous())
}

/// Poses of every segment in the world frame.
pub fn all_global_jcs(tree: &KinematicTree, state: &KinematicState) -> Result<Vec<Mat4>> {
    (0..tree.nb_segment())
        .map(|s| global_jcs(tree, state, s))
        .collect()
}

/// Pose of `segment` expressed in the frame of `relative_to`.
pub fn relative_jcs(
    tree: &KinematicTree,
    state: &KinematicState,
    segment: usize,
    relative_to: usize,
) -> Result<Mat4> {
    let world_to_segment = segment_transform(tree, state, segment)?;
    let world_to_reference = segment_transform(tree, state, relative_to)?;
    Ok(world_to_segment
        .compose(&world_to_reference.inverse())
        .to_homogeneous())
}

/// Pose of a segment in its parent's frame.
pub fn local_jcs(tree: &KinematicTree, segment: usize) -> Result<Mat4> {
    Ok(tree.segment(segment)?.reference_frame().to_homogeneous())
}

/// Mesh vertices of a segment in the world frame.
pub fn segment_mesh_points(
    tree: &KinematicTree,
    state: &KinematicState,
    segment: usize,
) -> Result<Vec<Vec3>> {
    let xf = segment_transform(tree, state, segment)?;
    Ok(tree.segment(segment)?
        .characteristics()
        .mesh
        .iter()
        .map(|p| xf.point_to_parent(p))
        .collect())
}

/// Mesh vertices of every segment in the world frame, one list per segment.
pub fn mesh_points(tree: &KinematicTree, state: &KinematicState) -> Result<Vec<Vec<Vec3>>> {
    (0..tree.nb_segment())
        .map(|s| segment_mesh_points(tree, state, s))
        .collect()
}

/// Mesh vertices of every segment in the world frame, packed as the
/// columns of a 3×N matrix in segment order.
pub fn mesh_points_in_matrix(tree: &KinematicTree, state: &KinematicState) -> Result<DMat> {
    let points: Vec<Vec3> = mesh_points(tree, state)?.into_iter().flatten().collect();
    Ok(DMat::from_fn(3, points.len(), |r, c| points[c][r]))
}
