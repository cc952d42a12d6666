//! JSON storage strategy
//!
//! All poses live in one JSON file keyed by image file name:
//!
//! ```json
//! {
//!   "0001.png": [
//!     { "id": "3f2a...", "obj": "cup.obj", "R": [1, 0, 0, 0, 1, 0, 0, 0, 1], "t": [0, 0, 0.5] }
//!   ]
//! }
//! ```
//!
//! The images, segmentation images and object models directories and the
//! poses file are watched for external changes.

use otiat_core::math::{mat3_from_rows, mat3_to_rows, rotation_from_matrix};
use otiat_core::{DataSet, Image, ObjectModel, Pose, PoseId, Vec3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::catalog::CatalogPaths;
use crate::fingerprint::ChangeTracker;
use crate::strategy::{find_image, find_object_model, StorageError, StorageStrategy};

/// A single pose as written to the poses file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoseRecord {
    /// Pose id; derived from the image and model when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<PoseId>,
    /// Object model file name
    pub obj: String,
    /// Row-major rotation matrix
    #[serde(rename = "R")]
    pub rotation: Vec<f64>,
    /// Translation
    pub t: [f64; 3],
}

impl PoseRecord {
    fn from_pose(pose: &Pose) -> Self {
        let p = pose.position();
        Self {
            id: Some(pose.id().clone()),
            obj: pose.object_model().file_name(),
            rotation: mat3_to_rows(&pose.rotation_matrix()).to_vec(),
            t: [p.x, p.y, p.z],
        }
    }
}

/// Contents of the poses file
pub type PosesFile = BTreeMap<String, Vec<PoseRecord>>;

pub struct JsonStrategy {
    catalog: CatalogPaths,
    poses_file: PathBuf,
    tracker: ChangeTracker,
}

impl JsonStrategy {
    pub fn new(catalog: CatalogPaths, poses_file: impl Into<PathBuf>) -> Self {
        let poses_file = poses_file.into();
        let mut tracker = ChangeTracker::new();
        tracker.watch(&catalog.images, DataSet::IMAGES);
        if let Some(segmentation) = &catalog.segmentation_images {
            tracker.watch(segmentation, DataSet::IMAGES);
        }
        tracker.watch(&catalog.object_models, DataSet::OBJECT_MODELS);
        tracker.watch(&poses_file, DataSet::POSES);

        Self {
            catalog,
            poses_file,
            tracker,
        }
    }

    pub fn poses_file(&self) -> &Path {
        &self.poses_file
    }

    fn read_poses_file(&self) -> Result<PosesFile, StorageError> {
        if !self.poses_file.exists() {
            debug!(path = %self.poses_file.display(), "Poses file not found, starting empty");
            return Ok(PosesFile::new());
        }
        let content = std::fs::read_to_string(&self.poses_file)?;
        if content.trim().is_empty() {
            return Ok(PosesFile::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    fn write_poses_file(&mut self, poses: &PosesFile) -> Result<(), StorageError> {
        let content = serde_json::to_string_pretty(poses)?;
        if let Some(parent) = self.poses_file.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.poses_file, content)?;
        self.tracker.refresh(DataSet::POSES);
        Ok(())
    }
}

impl StorageStrategy for JsonStrategy {
    fn load_images(&mut self) -> Result<Vec<Image>, StorageError> {
        self.tracker.refresh(DataSet::IMAGES);
        self.catalog.load_images()
    }

    fn load_object_models(&mut self) -> Result<Vec<ObjectModel>, StorageError> {
        self.tracker.refresh(DataSet::OBJECT_MODELS);
        self.catalog.load_object_models()
    }

    fn load_poses(
        &mut self,
        images: &[Arc<Image>],
        object_models: &[Arc<ObjectModel>],
    ) -> Result<Vec<Pose>, StorageError> {
        self.tracker.refresh(DataSet::POSES);
        let file = self.read_poses_file()?;

        let mut poses = Vec::new();
        for (image_name, records) in &file {
            let Some(image) = find_image(images, image_name) else {
                warn!(
                    image = %image_name,
                    poses = records.len(),
                    "Skipping poses of unknown image"
                );
                continue;
            };
            for record in records {
                let Some(model) = find_object_model(object_models, &record.obj) else {
                    warn!(
                        image = %image_name,
                        object_model = %record.obj,
                        "Skipping pose of unknown object model"
                    );
                    continue;
                };
                let Some(rotation) = mat3_from_rows(&record.rotation)
                    .and_then(|m| rotation_from_matrix(&m))
                else {
                    warn!(
                        image = %image_name,
                        object_model = %record.obj,
                        "Skipping pose with malformed rotation"
                    );
                    continue;
                };
                let id = record
                    .id
                    .clone()
                    .unwrap_or_else(|| PoseId::derive(image.path(), model.path()));
                poses.push(Pose::with_id(
                    id,
                    image.clone(),
                    model.clone(),
                    Vec3::from(record.t),
                    rotation,
                ));
            }
        }

        info!(path = %self.poses_file.display(), count = poses.len(), "Loaded poses");
        Ok(poses)
    }

    fn persist_pose(&mut self, pose: &Pose, delete: bool) -> Result<(), StorageError> {
        let mut file = self.read_poses_file()?;
        let image_name = pose.image().file_name();

        let bucket = file.entry(image_name.clone()).or_default();
        let before = bucket.len();
        let model_name = pose.object_model().file_name();
        bucket.retain(|record| match &record.id {
            Some(id) => id != pose.id(),
            None => record.obj != model_name,
        });
        let existed = bucket.len() != before;

        if delete {
            if !existed {
                return Err(StorageError::PoseNotFound(pose.id().clone()));
            }
        } else {
            bucket.push(PoseRecord::from_pose(pose));
        }
        if bucket.is_empty() {
            file.remove(&image_name);
        }

        self.write_poses_file(&file)?;
        debug!(pose = %pose.id(), delete, "Persisted pose");
        Ok(())
    }

    fn poll_changes(&mut self) -> DataSet {
        self.tracker.poll()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use otiat_core::math::rotations_close;
    use otiat_core::Rotation;
    use std::f64::consts::FRAC_PI_4;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        strategy: JsonStrategy,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let images = dir.path().join("images");
        let models = dir.path().join("models");
        std::fs::create_dir_all(&images).unwrap();
        std::fs::create_dir_all(&models).unwrap();
        std::fs::write(images.join("0001.png"), b"png").unwrap();
        std::fs::write(images.join("0002.png"), b"png").unwrap();
        std::fs::write(models.join("cup.obj"), b"obj").unwrap();

        let catalog = CatalogPaths {
            images,
            object_models: models,
            ..Default::default()
        };
        let strategy = JsonStrategy::new(catalog, dir.path().join("out/poses.json"));
        Fixture { dir, strategy }
    }

    type Loaded = (Vec<Arc<Image>>, Vec<Arc<ObjectModel>>, Vec<Pose>);

    fn unposed(image: &Arc<Image>, model: &Arc<ObjectModel>) -> Pose {
        Pose::new(image.clone(), model.clone(), Vec3::zeros(), Rotation::identity())
    }

    fn load_all(strategy: &mut JsonStrategy) -> Loaded {
        let images: Vec<_> = strategy.load_images().unwrap().into_iter().map(Arc::new).collect();
        let models: Vec<_> =
            strategy.load_object_models().unwrap().into_iter().map(Arc::new).collect();
        let poses = strategy.load_poses(&images, &models).unwrap();
        (images, models, poses)
    }

    #[test]
    fn test_missing_poses_file_is_empty() {
        let mut f = fixture();
        let (images, _, poses) = load_all(&mut f.strategy);
        assert_eq!(images.len(), 2);
        assert!(poses.is_empty());
    }

    #[test]
    fn test_persist_and_reload() {
        let mut f = fixture();
        let (images, models, _) = load_all(&mut f.strategy);

        let rotation = Rotation::from_axis_angle(&Vec3::y_axis(), FRAC_PI_4);
        let position = Vec3::new(0.1, 0.2, 0.8);
        let pose = Pose::new(images[0].clone(), models[0].clone(), position, rotation);
        f.strategy.persist_pose(&pose, false).unwrap();

        let (_, _, poses) = load_all(&mut f.strategy);
        assert_eq!(poses.len(), 1);
        assert_eq!(poses[0].id(), pose.id());
        assert_eq!(poses[0].position(), pose.position());
        assert!(rotations_close(poses[0].rotation(), &rotation, 1e-9));
    }

    #[test]
    fn test_update_replaces_record() {
        let mut f = fixture();
        let (images, models, _) = load_all(&mut f.strategy);

        let mut pose = unposed(&images[0], &models[0]);
        f.strategy.persist_pose(&pose, false).unwrap();
        pose.set_position(Vec3::new(1.0, 1.0, 1.0));
        f.strategy.persist_pose(&pose, false).unwrap();

        let content = std::fs::read_to_string(f.strategy.poses_file()).unwrap();
        let file: PosesFile = serde_json::from_str(&content).unwrap();
        assert_eq!(file["0001.png"].len(), 1);
        assert_eq!(file["0001.png"][0].t, [1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_delete() {
        let mut f = fixture();
        let (images, models, _) = load_all(&mut f.strategy);
        let pose = unposed(&images[1], &models[0]);

        assert!(matches!(
            f.strategy.persist_pose(&pose, true),
            Err(StorageError::PoseNotFound(_))
        ));

        f.strategy.persist_pose(&pose, false).unwrap();
        f.strategy.persist_pose(&pose, true).unwrap();
        let (_, _, poses) = load_all(&mut f.strategy);
        assert!(poses.is_empty());
    }

    #[test]
    fn test_unknown_references_skipped() {
        let mut f = fixture();
        std::fs::create_dir_all(f.dir.path().join("out")).unwrap();
        std::fs::write(
            f.strategy.poses_file(),
            r#"{
                "missing.png": [{"obj": "cup.obj", "R": [1,0,0,0,1,0,0,0,1], "t": [0,0,1]}],
                "0001.png": [
                    {"obj": "gone.obj", "R": [1,0,0,0,1,0,0,0,1], "t": [0,0,1]},
                    {"obj": "cup.obj", "R": [1,0,0], "t": [0,0,1]},
                    {"obj": "cup.obj", "R": [1,0,0,0,1,0,0,0,1], "t": [0,0,2]}
                ]
            }"#,
        )
        .unwrap();

        let (images, models, poses) = load_all(&mut f.strategy);
        assert_eq!(poses.len(), 1);
        assert_eq!(poses[0].position().z, 2.0);
        assert_eq!(poses[0].id(), &PoseId::derive(images[0].path(), models[0].path()));
    }

    #[test]
    fn test_improper_rotations_skipped() {
        let mut f = fixture();
        std::fs::create_dir_all(f.dir.path().join("out")).unwrap();
        std::fs::write(
            f.strategy.poses_file(),
            r#"{
                "0001.png": [
                    {"obj": "cup.obj", "R": [-1,0,0,0,-1,0,0,0,-1], "t": [0,0,1]},
                    {"obj": "cup.obj", "R": [0,1,0,1,0,0,0,0,1], "t": [0,0,1]},
                    {"obj": "cup.obj", "R": [1e300,0,0,0,1e300,0,0,0,-1e300], "t": [0,0,1]}
                ],
                "0002.png": [{"obj": "cup.obj", "R": [0,-1,0,1,0,0,0,0,1], "t": [0,0,3]}]
            }"#,
        )
        .unwrap();

        let (_, _, poses) = load_all(&mut f.strategy);
        assert_eq!(poses.len(), 1);
        assert_eq!(poses[0].image().file_name(), "0002.png");
        assert_eq!(poses[0].position().z, 3.0);
    }

    #[test]
    fn test_id_independent_of_directory_spelling() {
        let mut f = fixture();
        let (images, models, _) = load_all(&mut f.strategy);
        let pose = unposed(&images[0], &models[0]);
        f.strategy.persist_pose(&pose, false).unwrap();

        let catalog = CatalogPaths {
            images: f.dir.path().join(".").join("images"),
            object_models: f.dir.path().join(".").join("models"),
            ..Default::default()
        };
        let mut other = JsonStrategy::new(catalog, f.strategy.poses_file().to_path_buf());
        let (images, models, poses) = load_all(&mut other);
        assert_eq!(poses.len(), 1);
        assert_eq!(unposed(&images[0], &models[0]).id(), poses[0].id());
    }

    #[test]
    fn test_own_writes_not_reported() {
        let mut f = fixture();
        let (images, models, _) = load_all(&mut f.strategy);
        assert!(f.strategy.poll_changes().is_empty());

        let pose = unposed(&images[0], &models[0]);
        f.strategy.persist_pose(&pose, false).unwrap();
        assert!(f.strategy.poll_changes().is_empty());

        std::fs::write(f.dir.path().join("models/plate.ply"), b"ply").unwrap();
        assert_eq!(f.strategy.poll_changes(), DataSet::OBJECT_MODELS);

        std::fs::write(f.strategy.poses_file(), "{}").unwrap();
        assert_eq!(f.strategy.poll_changes(), DataSet::POSES);
    }
}
