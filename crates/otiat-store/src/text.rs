//! Plain text storage strategy: one file per pose
//!
//! `<poses dir>/<pose id>.txt` holds four lines:
//!
//! ```text
//! 0001.png
//! cup.obj
//! 0.1 0.2 0.8
//! 1 0 0 0 1 0 0 0 1
//! ```
//!
//! image file name, object model file name, translation, and the row-major
//! rotation matrix.

use otiat_core::math::{mat3_from_rows, mat3_to_rows, rotation_from_matrix};
use otiat_core::{DataSet, Image, ObjectModel, Pose, PoseId, Vec3};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::catalog::{list_files, CatalogPaths};
use crate::fingerprint::ChangeTracker;
use crate::strategy::{find_image, find_object_model, StorageError, StorageStrategy};

const POSE_FILE_EXTENSION: &str = "txt";

pub struct TextStrategy {
    catalog: CatalogPaths,
    poses_dir: PathBuf,
    tracker: ChangeTracker,
}

/// Parsed content of a pose file, before references are resolved
#[derive(Debug, Clone, PartialEq)]
struct PoseText {
    image: String,
    object_model: String,
    position: [f64; 3],
    rotation: [f64; 9],
}

impl TextStrategy {
    pub fn new(catalog: CatalogPaths, poses_dir: impl Into<PathBuf>) -> Self {
        let poses_dir = poses_dir.into();
        let mut tracker = ChangeTracker::new();
        tracker.watch(&catalog.images, DataSet::IMAGES);
        if let Some(segmentation) = &catalog.segmentation_images {
            tracker.watch(segmentation, DataSet::IMAGES);
        }
        tracker.watch(&catalog.object_models, DataSet::OBJECT_MODELS);
        tracker.watch(&poses_dir, DataSet::POSES);

        Self {
            catalog,
            poses_dir,
            tracker,
        }
    }

    pub fn pose_file(&self, id: &PoseId) -> PathBuf {
        self.poses_dir.join(format!("{}.{}", id, POSE_FILE_EXTENSION))
    }
}

fn parse_numbers<const N: usize>(
    line: Option<&str>,
    path: &Path,
    what: &str,
) -> Result<[f64; N], StorageError> {
    let malformed = |reason: String| StorageError::Malformed {
        path: path.to_path_buf(),
        reason,
    };
    let line = line.ok_or_else(|| malformed(format!("missing {} line", what)))?;
    let values = line
        .split_whitespace()
        .map(|v| v.parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| malformed(format!("invalid {}: {}", what, e)))?;
    values
        .try_into()
        .map_err(|v: Vec<f64>| malformed(format!("{} needs {} values, got {}", what, N, v.len())))
}

fn parse_pose_text(content: &str, path: &Path) -> Result<PoseText, StorageError> {
    let mut lines = content.lines().map(str::trim).filter(|l| !l.is_empty());
    let mut name = |what: &str| {
        lines.next().map(str::to_string).ok_or_else(|| StorageError::Malformed {
            path: path.to_path_buf(),
            reason: format!("missing {} line", what),
        })
    };
    let image = name("image")?;
    let object_model = name("object model")?;
    let position = parse_numbers::<3>(lines.next(), path, "translation")?;
    let rotation = parse_numbers::<9>(lines.next(), path, "rotation")?;
    Ok(PoseText {
        image,
        object_model,
        position,
        rotation,
    })
}

fn format_pose_text(pose: &Pose) -> String {
    let p = pose.position();
    let r = mat3_to_rows(&pose.rotation_matrix());
    let rotation: Vec<String> = r.iter().map(|v| v.to_string()).collect();
    format!(
        "{}\n{}\n{} {} {}\n{}\n",
        pose.image().file_name(),
        pose.object_model().file_name(),
        p.x,
        p.y,
        p.z,
        rotation.join(" ")
    )
}

impl StorageStrategy for TextStrategy {
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
        if !self.poses_dir.is_dir() {
            debug!(path = %self.poses_dir.display(), "Poses directory not found, starting empty");
            return Ok(Vec::new());
        }

        let mut poses = Vec::new();
        for path in list_files(&self.poses_dir, &[POSE_FILE_EXTENSION])? {
            let parsed = std::fs::read_to_string(&path)
                .map_err(StorageError::from)
                .and_then(|content| parse_pose_text(&content, &path));
            let text = match parsed {
                Ok(text) => text,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable pose file");
                    continue;
                }
            };

            let (Some(image), Some(model)) = (
                find_image(images, &text.image),
                find_object_model(object_models, &text.object_model),
            ) else {
                warn!(
                    path = %path.display(),
                    image = %text.image,
                    object_model = %text.object_model,
                    "Skipping pose with unknown references"
                );
                continue;
            };

            let id = path
                .file_stem()
                .map(|s| PoseId(s.to_string_lossy().into_owned()))
                .unwrap_or_else(|| PoseId::derive(image.path(), model.path()));
            let Some(rotation) =
                mat3_from_rows(&text.rotation).and_then(|m| rotation_from_matrix(&m))
            else {
                warn!(path = %path.display(), "Skipping pose with improper rotation matrix");
                continue;
            };
            poses.push(Pose::with_id(
                id,
                image.clone(),
                model.clone(),
                Vec3::from(text.position),
                rotation,
            ));
        }

        info!(path = %self.poses_dir.display(), count = poses.len(), "Loaded poses");
        Ok(poses)
    }

    fn persist_pose(&mut self, pose: &Pose, delete: bool) -> Result<(), StorageError> {
        let path = self.pose_file(pose.id());
        if delete {
            if !path.exists() {
                return Err(StorageError::PoseNotFound(pose.id().clone()));
            }
            std::fs::remove_file(&path)?;
        } else {
            std::fs::create_dir_all(&self.poses_dir)?;
            std::fs::write(&path, format_pose_text(pose))?;
        }
        self.tracker.refresh(DataSet::POSES);
        debug!(pose = %pose.id(), delete, "Persisted pose");
        Ok(())
    }

    fn poll_changes(&mut self) -> DataSet {
        self.tracker.poll()
    }
}
