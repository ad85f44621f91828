//! Cached kinematic state of a tree for one (Q, Qdot, Qddot) evaluation.

use arbor_math::{DVec, SpatialTransform, SpatialVec};
use arbor_model::{ArborError, KinematicTree, Result};

/// Inputs the cached state was computed from.
#[derive(Debug, Clone, PartialEq)]
struct CacheKey {
    revision: u64,
    q: DVec,
    qdot: Option<DVec>,
    qddot: Option<DVec>,
}

/// Per-body transforms, velocities and accelerations.
///
/// All spatial quantities are expressed in body coordinates. When the state
/// was computed without Qdot the velocities are zero; without Qddot the
/// accelerations are the velocity-product (bias) accelerations. Gravity is
/// never included in `a`.
#[derive(Debug, Clone, Default)]
pub struct KinematicState {
    /// Parent-to-body transforms.
    pub x_lambda: Vec<SpatialTransform>,
    /// World-to-body transforms.
    pub x_base: Vec<SpatialTransform>,
    /// Body spatial velocities.
    pub v: Vec<SpatialVec>,
    /// Velocity-product terms v ×ₘ (S q̇).
    pub c: Vec<SpatialVec>,
    /// Body spatial accelerations.
    pub a: Vec<SpatialVec>,
    key: Option<CacheKey>,
}

impl KinematicState {
    /// Empty state; nothing is computed yet.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn resize(&mut self, nb: usize) {
        self.x_lambda.resize(nb, SpatialTransform::identity());
        self.x_base.resize(nb, SpatialTransform::identity());
        self.v.resize(nb, SpatialVec::zero());
        self.c.resize(nb, SpatialVec::zero());
        self.a.resize(nb, SpatialVec::zero());
    }

    pub(crate) fn set_key(
        &mut self,
        tree: &KinematicTree,
        q: &DVec,
        qdot: Option<&DVec>,
        qddot: Option<&DVec>,
    ) {
        self.key = Some(CacheKey {
            revision: tree.revision(),
            q: q.clone(),
            qdot: qdot.cloned(),
            qddot: qddot.cloned(),
        });
    }

    /// Forget the cached evaluation.
    pub fn invalidate(&mut self) {
        self.key = None;
    }

    /// Coordinates of the cached evaluation, if any.
    pub fn q(&self) -> Option<&DVec> {
        self.key.as_ref().map(|k| &k.q)
    }

    /// Velocities of the cached evaluation, if they were supplied.
    pub fn qdot(&self) -> Option<&DVec> {
        self.key.as_ref().and_then(|k| k.qdot.as_ref())
    }

    /// Accelerations of the cached evaluation, if they were supplied.
    pub fn qddot(&self) -> Option<&DVec> {
        self.key.as_ref().and_then(|k| k.qddot.as_ref())
    }

    /// Whether the cache already reflects the requested inputs.
    ///
    /// A `None` input is not required: a state computed with velocities
    /// serves a positions-only request for the same `q`.
    pub fn is_current(&self, q: &DVec, qdot: Option<&DVec>, qddot: Option<&DVec>) -> bool {
        let Some(key) = &self.key else {
            return false;
        };
        key.q == *q
            && qdot.is_none_or(|v| key.qdot.as_ref() == Some(v))
            && qddot.is_none_or(|v| key.qddot.as_ref() == Some(v))
    }

    /// Fail unless the state holds an evaluation of `tree` in its current layout.
    pub fn require(&self, tree: &KinematicTree) -> Result<()> {
        match &self.key {
            Some(key) if key.revision == tree.revision() && self.x_base.len() == tree.nb_bodies() => {
                Ok(())
            }
            _ => Err(ArborError::configuration(
                "kinematics have not been computed for this tree",
            )),
        }
    }
}
