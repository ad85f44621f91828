//! Segments: the named rigid parts a kinematic tree is assembled from.

use crate::error::{ArborError, Result};
use arbor_math::{Mat3, SpatialInertia, SpatialTransform, Vec3};
use serde::{Deserialize, Serialize};

/// Cartesian axis of a translation or rotation DoF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    /// Parse a single axis letter (`x`, `y` or `z`, any case).
    pub fn from_char(c: char) -> Result<Self> {
        match c.to_ascii_lowercase() {
            'x' => Ok(Axis::X),
            'y' => Ok(Axis::Y),
            'z' => Ok(Axis::Z),
            other => Err(ArborError::configuration(format!(
                "unknown axis '{other}' in DoF sequence"
            ))),
        }
    }

    /// Unit vector along the axis.
    pub fn unit(self) -> Vec3 {
        match self {
            Axis::X => Vec3::x(),
            Axis::Y => Vec3::y(),
            Axis::Z => Vec3::z(),
        }
    }

    /// Upper-case letter used in DoF names.
    pub fn letter(self) -> char {
        match self {
            Axis::X => 'X',
            Axis::Y => 'Y',
            Axis::Z => 'Z',
        }
    }

    /// Index of the axis in a 3-vector.
    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

/// How a segment's orientation is parameterized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rotations {
    /// Successive rotations about the listed axes of the current frame.
    Euler(Vec<Axis>),
    /// A quaternion: 3 interleaved slots plus a trailing scalar slot.
    Quaternion,
}

/// Translation and rotation DoFs of a segment, in the order they are applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DofSequence {
    /// Translations, applied first.
    pub translations: Vec<Axis>,
    /// Rotations, applied after the translations.
    pub rotations: Rotations,
}

impl DofSequence {
    /// Parse sequences such as `("xyz", "zxy")`; the rotation sequence `"q"` marks a quaternion.
    pub fn new(translations: &str, rotations: &str) -> Result<Self> {
        let translations = translations
            .chars()
            .map(Axis::from_char)
            .collect::<Result<Vec<_>>>()?;
        let rotations = if rotations.eq_ignore_ascii_case("q") {
            Rotations::Quaternion
        } else {
            Rotations::Euler(
                rotations
                    .chars()
                    .map(Axis::from_char)
                    .collect::<Result<Vec<_>>>()?,
            )
        };
        Ok(Self {
            translations,
            rotations,
        })
    }

    /// A segment rigidly attached to its parent.
    pub fn fixed() -> Self {
        Self {
            translations: Vec::new(),
            rotations: Rotations::Euler(Vec::new()),
        }
    }

    /// Number of translation DoFs.
    pub fn nb_dof_trans(&self) -> usize {
        self.translations.len()
    }

    /// Number of rotation DoFs (3 for a quaternion).
    pub fn nb_dof_rot(&self) -> usize {
        match &self.rotations {
            Rotations::Euler(axes) => axes.len(),
            Rotations::Quaternion => 3,
        }
    }

    /// Number of velocity DoFs.
    pub fn nb_dof(&self) -> usize {
        self.nb_dof_trans() + self.nb_dof_rot()
    }

    /// Number of position slots (one more than `nb_dof` for a quaternion).
    pub fn nb_q(&self) -> usize {
        self.nb_dof() + usize::from(self.is_quaternion())
    }

    /// Whether the rotation is quaternion-parameterized.
    pub fn is_quaternion(&self) -> bool {
        matches!(self.rotations, Rotations::Quaternion)
    }

    /// DoF names in velocity order, e.g. `TransX`, `RotZ`, `QuatY`.
    pub fn dof_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .translations
            .iter()
            .map(|a| format!("Trans{}", a.letter()))
            .collect();
        match &self.rotations {
            Rotations::Euler(axes) => {
                names.extend(axes.iter().map(|a| format!("Rot{}", a.letter())));
            }
            Rotations::Quaternion => {
                names.extend(["QuatX", "QuatY", "QuatZ"].iter().map(|s| s.to_string()));
            }
        }
        names
    }
}

/// Closed interval of admissible values for one DoF.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl Range {
    /// Create a range; `min` must not exceed `max`.
    pub fn new(min: f64, max: f64) -> Result<Self> {
        if min > max {
            return Err(ArborError::configuration(format!(
                "range minimum {min} exceeds maximum {max}"
            )));
        }
        Ok(Self { min, max })
    }

    /// Whether `value` lies inside the range.
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Per-DoF ranges for positions, velocities and accelerations.
///
/// Empty vectors are filled with defaults when the segment is added.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DofRanges {
    pub q: Vec<Range>,
    pub qdot: Vec<Range>,
    pub qddot: Vec<Range>,
}

impl DofRanges {
    pub(crate) fn resolved(mut self, nb_dof: usize) -> Result<Self> {
        use std::f64::consts::PI;
        fill_ranges(&mut self.q, nb_dof, PI, "Q ranges")?;
        fill_ranges(&mut self.qdot, nb_dof, 10.0 * PI, "Qdot ranges")?;
        fill_ranges(&mut self.qddot, nb_dof, 100.0 * PI, "Qddot ranges")?;
        Ok(self)
    }
}

fn fill_ranges(
    ranges: &mut Vec<Range>,
    nb_dof: usize,
    bound: f64,
    what: &'static str,
) -> Result<()> {
    if ranges.is_empty() {
        *ranges = vec![
            Range {
                min: -bound,
                max: bound
            };
            nb_dof
        ];
    }
    crate::error::check_dimension(what, ranges.len(), nb_dof)
}

/// Mass properties and visual geometry of a segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentCharacteristics {
    /// Mass in kg.
    pub mass: f64,
    /// Center of mass in the segment frame.
    pub com: Vec3,
    /// Rotational inertia about the center of mass.
    pub inertia: Mat3,
    /// Mesh vertices in the segment frame.
    #[serde(default)]
    pub mesh: Vec<Vec3>,
}

impl SegmentCharacteristics {
    pub fn new(mass: f64, com: Vec3, inertia: Mat3) -> Self {
        Self {
            mass,
            com,
            inertia,
            mesh: Vec::new(),
        }
    }

    /// Massless segment with no geometry.
    pub fn massless() -> Self {
        Self::new(0.0, Vec3::zeros(), Mat3::zeros())
    }

    /// Attach mesh vertices.
    pub fn with_mesh(mut self, mesh: Vec<Vec3>) -> Self {
        self.mesh = mesh;
        self
    }

    /// Spatial inertia in the segment frame.
    pub fn spatial_inertia(&self) -> SpatialInertia {
        SpatialInertia::new(self.mass, self.com, self.inertia)
    }
}

/// Which body carries a segment's frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyRef {
    /// The last movable body of the segment's DoF chain.
    Movable(usize),
    /// A zero-DoF segment merged into its movable parent.
    Fixed(usize),
}

/// A node of the kinematic tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub(crate) name: String,
    pub(crate) parent: Option<usize>,
    pub(crate) dofs: DofSequence,
    pub(crate) ranges: DofRanges,
    pub(crate) characteristics: SegmentCharacteristics,
    pub(crate) reference_frame: SpatialTransform,
    pub(crate) first_dof: usize,
    pub(crate) quat_ordinal: Option<usize>,
    pub(crate) frame: BodyRef,
}

impl Segment {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parent segment index, `None` when attached to the world.
    pub fn parent(&self) -> Option<usize> {
        self.parent
    }

    pub fn dofs(&self) -> &DofSequence {
        &self.dofs
    }

    pub fn ranges(&self) -> &DofRanges {
        &self.ranges
    }

    pub fn characteristics(&self) -> &SegmentCharacteristics {
        &self.characteristics
    }

    /// Pose of the segment in its parent frame.
    pub fn reference_frame(&self) -> &SpatialTransform {
        &self.reference_frame
    }

    pub fn nb_dof(&self) -> usize {
        self.dofs.nb_dof()
    }

    pub fn nb_dof_trans(&self) -> usize {
        self.dofs.nb_dof_trans()
    }

    pub fn nb_q(&self) -> usize {
        self.dofs.nb_q()
    }

    pub fn is_quaternion(&self) -> bool {
        self.dofs.is_quaternion()
    }

    /// Index of the segment's first DoF in Qdot.
    pub fn first_dof(&self) -> usize {
        self.first_dof
    }

    /// Position of this segment's quaternion among all quaternion joints.
    pub fn quat_ordinal(&self) -> Option<usize> {
        self.quat_ordinal
    }

    /// Body carrying the segment frame.
    pub fn frame(&self) -> BodyRef {
        self.frame
    }
}
