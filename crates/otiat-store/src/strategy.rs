//! Storage strategies: pluggable persistence for images, object models and poses

use otiat_core::{DataSet, Image, ObjectModel, Pose, PoseId};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Directory not found: {0}")]
    MissingDirectory(PathBuf),
    #[error("Malformed pose file {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },
    #[error("Pose {0} is not persisted")]
    PoseNotFound(PoseId),
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Backend that loads and persists the store's data.
///
/// Loads are called in dependency order: images and object models first,
/// then poses, which refer to both.
pub trait StorageStrategy: Send + Sync {
    /// Load all images
    fn load_images(&mut self) -> Result<Vec<Image>, StorageError>;

    /// Load all object models
    fn load_object_models(&mut self) -> Result<Vec<ObjectModel>, StorageError>;

    /// Load all poses, resolving their references against the given images and models
    fn load_poses(
        &mut self,
        images: &[Arc<Image>],
        object_models: &[Arc<ObjectModel>],
    ) -> Result<Vec<Pose>, StorageError>;

    /// Write a pose, or delete it when `delete` is set
    fn persist_pose(&mut self, pose: &Pose, delete: bool) -> Result<(), StorageError>;

    /// Data sets changed by someone else since the last call
    fn poll_changes(&mut self) -> DataSet {
        DataSet::empty()
    }
}

/// Find the image a persisted pose refers to by its file name
pub(crate) fn find_image<'a>(images: &'a [Arc<Image>], file_name: &str) -> Option<&'a Arc<Image>> {
    images.iter().find(|i| i.file_name() == file_name)
}

/// Find the object model a persisted pose refers to by its file name
pub(crate) fn find_object_model<'a>(
    object_models: &'a [Arc<ObjectModel>],
    file_name: &str,
) -> Option<&'a Arc<ObjectModel>> {
    object_models.iter().find(|m| m.file_name() == file_name)
}
