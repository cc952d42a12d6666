//! Poses pairing an object model with an image

use serde::{Deserialize, Serialize, Serializer};
use std::path::Path;
use std::sync::Arc;

use crate::image::{file_name_of, Image};
use crate::math::{rotation_from_matrix, rotation_to_matrix, row_major, Mat3, Rotation, Vec3};
use crate::object_model::ObjectModel;

/// Unique identifier for a pose, derived from its image and object model
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PoseId(pub String);

impl PoseId {
    /// Number of hex characters kept from the digest
    pub const LEN: usize = 16;

    /// Derive the id for a pose of `object_model` in `image`.
    ///
    /// Only the file names enter the hash, the same keys the storage
    /// layouts use, so the id does not depend on how the data directories
    /// are spelled.
    pub fn derive(image: &Path, object_model: &Path) -> Self {
        let mut key = Vec::new();
        key.extend_from_slice(file_name_of(image).as_bytes());
        key.push(0);
        key.extend_from_slice(file_name_of(object_model).as_bytes());
        let digest = sha256_hex(&key);
        Self(digest[..Self::LEN].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PoseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PoseId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Compute SHA256 hash of data and return as hex string
pub fn sha256_hex(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Position and rotation of an object model in an image's camera frame
#[derive(Debug, Clone, PartialEq)]
pub struct Pose {
    id: PoseId,
    image: Arc<Image>,
    object_model: Arc<ObjectModel>,
    position: Vec3,
    rotation: Rotation,
}

impl Pose {
    /// Create a pose with an id derived from the image and object model
    pub fn new(
        image: Arc<Image>,
        object_model: Arc<ObjectModel>,
        position: Vec3,
        rotation: Rotation,
    ) -> Self {
        let id = PoseId::derive(image.path(), object_model.path());
        Self::with_id(id, image, object_model, position, rotation)
    }

    /// Create a pose with an explicit id, e.g. one read back from storage
    pub fn with_id(
        id: PoseId,
        image: Arc<Image>,
        object_model: Arc<ObjectModel>,
        position: Vec3,
        rotation: Rotation,
    ) -> Self {
        Self {
            id,
            image,
            object_model,
            position,
            rotation,
        }
    }

    pub fn id(&self) -> &PoseId {
        &self.id
    }

    pub fn image(&self) -> &Arc<Image> {
        &self.image
    }

    pub fn object_model(&self) -> &Arc<ObjectModel> {
        &self.object_model
    }

    pub fn position(&self) -> &Vec3 {
        &self.position
    }

    pub fn rotation(&self) -> &Rotation {
        &self.rotation
    }

    pub fn rotation_matrix(&self) -> Mat3 {
        rotation_to_matrix(&self.rotation)
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    pub fn set_rotation(&mut self, rotation: Rotation) {
        self.rotation = rotation;
    }

    /// Set the rotation from a rotation matrix. Returns `false` and keeps
    /// the current rotation when `matrix` is not a proper rotation.
    pub fn set_rotation_matrix(&mut self, matrix: &Mat3) -> bool {
        match rotation_from_matrix(matrix) {
            Some(rotation) => {
                self.rotation = rotation;
                true
            }
            None => false,
        }
    }
}

/// Flat serialized form of a pose, referring to its image and model by path
#[derive(Serialize)]
struct PoseView<'a> {
    id: &'a PoseId,
    image: &'a Path,
    object_model: &'a Path,
    position: [f64; 3],
    /// Quaternion as [x, y, z, w]
    rotation: [f64; 4],
    #[serde(with = "row_major")]
    rotation_matrix: Mat3,
}

impl Serialize for Pose {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let q = self.rotation.quaternion();
        PoseView {
            id: &self.id,
            image: self.image.path(),
            object_model: self.object_model.path(),
            position: [self.position.x, self.position.y, self.position.z],
            rotation: [q.i, q.j, q.k, q.w],
            rotation_matrix: self.rotation_matrix(),
        }
        .serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixtures() -> (Arc<Image>, Arc<ObjectModel>) {
        (
            Arc::new(Image::new("/data/images/0001.png", Mat3::identity())),
            Arc::new(ObjectModel::new("/data/models/cup.obj")),
        )
    }

    #[test]
    fn test_pose_id_is_deterministic() {
        let a = PoseId::derive(Path::new("/a.png"), Path::new("/m.obj"));
        let b = PoseId::derive(Path::new("/a.png"), Path::new("/m.obj"));
        let c = PoseId::derive(Path::new("/b.png"), Path::new("/m.obj"));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_str().len(), PoseId::LEN);
    }

    #[test]
    fn test_pose_id_separates_paths() {
        // "ab" + "c" must not collide with "a" + "bc"
        let a = PoseId::derive(Path::new("ab"), Path::new("c"));
        let b = PoseId::derive(Path::new("a"), Path::new("bc"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_pose_id_ignores_directory_spelling() {
        let a = PoseId::derive(
            Path::new("/data/images/0001.png"),
            Path::new("/data/models/cup.obj"),
        );
        let b = PoseId::derive(Path::new("/data/./images/0001.png"), Path::new("models/cup.obj"));
        assert_eq!(a, b);
    }

    #[test]
    fn test_new_pose_uses_derived_id() {
        let (image, model) = fixtures();
        let pose = Pose::new(image.clone(), model.clone(), Vec3::zeros(), Rotation::identity());
        assert_eq!(pose.id(), &PoseId::derive(image.path(), model.path()));
    }

    #[test]
    fn test_set_values() {
        let (image, model) = fixtures();
        let mut pose = Pose::new(image, model, Vec3::zeros(), Rotation::identity());
        pose.set_position(Vec3::new(1.0, 2.0, 3.0));
        assert!(pose.set_rotation_matrix(&Mat3::new(0.0, -1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0)));
        assert_eq!(pose.position().y, 2.0);
        assert!((pose.rotation_matrix()[(1, 0)] - 1.0).abs() < 1e-9);

        assert!(!pose.set_rotation_matrix(&-Mat3::identity()));
        assert!((pose.rotation_matrix()[(1, 0)] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_sha256() {
        let hash = sha256_hex(b"hello world");
        assert_eq!(hash, "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9");
    }

    #[test]
    fn test_pose_serializes_flat() {
        let (image, model) = fixtures();
        let pose = Pose::new(image, model, Vec3::new(0.0, 0.0, 1.5), Rotation::identity());
        let json = serde_json::to_value(&pose).unwrap();
        assert_eq!(json["image"], "/data/images/0001.png");
        assert_eq!(json["object_model"], "/data/models/cup.obj");
        assert_eq!(json["position"][2], 1.5);
        assert_eq!(json["rotation"][3], 1.0);
        assert_eq!(json["rotation_matrix"][0], 1.0);
    }
}
