//! Geometry aliases and conversions shared by all crates

use nalgebra::{Matrix3, Quaternion, Rotation3, UnitQuaternion, Vector3};

pub type Real = f64;

pub type Vec3 = Vector3<Real>;
pub type Mat3 = Matrix3<Real>;
pub type Rotation = UnitQuaternion<Real>;

/// Largest deviation from orthonormality accepted for a rotation matrix
pub const ROTATION_TOLERANCE: Real = 1e-3;

/// Iteration bound when projecting a matrix onto the rotation group
const PROJECTION_MAX_ITER: usize = 100;

/// Build a rotation from a 3x3 rotation matrix
///
/// Slightly non-orthogonal input (rounding in persisted files) is projected
/// onto the closest proper rotation. Returns `None` for matrices that are
/// not finite, not orthonormal within [`ROTATION_TOLERANCE`], or reflections.
pub fn rotation_from_matrix(m: &Mat3) -> Option<Rotation> {
    if !is_rotation_matrix(m) {
        return None;
    }
    let rotation = Rotation3::from_matrix_eps(
        m,
        Real::EPSILON,
        PROJECTION_MAX_ITER,
        Rotation3::identity(),
    );
    Some(UnitQuaternion::from_rotation_matrix(&rotation))
}

/// Whether `m` is a proper rotation (orthonormal, determinant +1) within
/// [`ROTATION_TOLERANCE`]
pub fn is_rotation_matrix(m: &Mat3) -> bool {
    if m.iter().any(|v| !v.is_finite()) {
        return false;
    }
    let orthonormal = (m.transpose() * m - Mat3::identity())
        .iter()
        .all(|v| v.abs() <= ROTATION_TOLERANCE);
    orthonormal && (m.determinant() - 1.0).abs() <= ROTATION_TOLERANCE
}

/// Rotation matrix of a unit quaternion
pub fn rotation_to_matrix(r: &Rotation) -> Mat3 {
    r.to_rotation_matrix().into_inner()
}

/// Build a rotation from quaternion components, normalizing them.
/// Returns `None` for a zero quaternion.
pub fn rotation_from_xyzw(x: Real, y: Real, z: Real, w: Real) -> Option<Rotation> {
    UnitQuaternion::try_new(Quaternion::new(w, x, y, z), Real::EPSILON)
}

/// Build a 3x3 matrix from nine row-major values
pub fn mat3_from_rows(values: &[Real]) -> Option<Mat3> {
    if values.len() != 9 {
        return None;
    }
    Some(Mat3::from_row_slice(values))
}

/// Nine row-major values of a 3x3 matrix
#[rustfmt::skip]
pub fn mat3_to_rows(m: &Mat3) -> [Real; 9] {
    [
        m[(0, 0)], m[(0, 1)], m[(0, 2)],
        m[(1, 0)], m[(1, 1)], m[(1, 2)],
        m[(2, 0)], m[(2, 1)], m[(2, 2)],
    ]
}

/// Approximate equality for rotations (q and -q are the same rotation)
pub fn rotations_close(a: &Rotation, b: &Rotation, eps: Real) -> bool {
    a.angle_to(b) <= eps
}

/// Serde adapter writing a `Mat3` as nine row-major numbers.
///
/// nalgebra's own serde support is column-major, which is surprising for
/// camera intrinsics and rotation matrices in hand-edited files.
pub mod row_major {
    use super::{mat3_from_rows, mat3_to_rows, Mat3, Real};
    use serde::{de::Error, Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(m: &Mat3, serializer: S) -> Result<S::Ok, S::Error> {
        mat3_to_rows(m).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Mat3, D::Error> {
        let values = Vec::<Real>::deserialize(deserializer)?;
        mat3_from_rows(&values)
            .ok_or_else(|| D::Error::invalid_length(values.len(), &"9 row-major values"))
    }
}
