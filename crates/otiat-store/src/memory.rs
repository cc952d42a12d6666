//! In-memory storage strategy
//!
//! Holds everything in a shared map. A [`MemoryHandle`] lets the owner seed
//! data, inject failures and simulate external changes while the strategy
//! itself is owned by a store.

use otiat_core::{DataSet, Image, ObjectModel, Pose, PoseId};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::strategy::{StorageError, StorageStrategy};

#[derive(Debug, Default)]
struct Inner {
    images: Vec<Image>,
    object_models: Vec<ObjectModel>,
    poses: BTreeMap<PoseId, Pose>,
    fail_loads: bool,
    fail_persist: bool,
    pending_changes: DataSet,
    persist_calls: usize,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStrategy {
    inner: Arc<Mutex<Inner>>,
}

/// Shared control over a [`MemoryStrategy`]
#[derive(Debug, Clone)]
pub struct MemoryHandle {
    inner: Arc<Mutex<Inner>>,
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryStrategy {
    pub fn new(images: Vec<Image>, object_models: Vec<ObjectModel>) -> Self {
        let strategy = Self::default();
        {
            let mut inner = lock(&strategy.inner);
            inner.images = images;
            inner.object_models = object_models;
        }
        strategy
    }

    pub fn handle(&self) -> MemoryHandle {
        MemoryHandle {
            inner: self.inner.clone(),
        }
    }
}

impl MemoryHandle {
    pub fn set_fail_loads(&self, fail: bool) {
        lock(&self.inner).fail_loads = fail;
    }

    pub fn set_fail_persist(&self, fail: bool) {
        lock(&self.inner).fail_persist = fail;
    }

    /// Replace a stored pose as if another process had written it
    pub fn put_pose(&self, pose: Pose) {
        let mut inner = lock(&self.inner);
        inner.poses.insert(pose.id().clone(), pose);
        inner.pending_changes |= DataSet::POSES;
    }

    pub fn push_image(&self, image: Image) {
        let mut inner = lock(&self.inner);
        inner.images.push(image);
        inner.pending_changes |= DataSet::IMAGES;
    }

    pub fn push_object_model(&self, object_model: ObjectModel) {
        let mut inner = lock(&self.inner);
        inner.object_models.push(object_model);
        inner.pending_changes |= DataSet::OBJECT_MODELS;
    }

    /// Ids currently persisted
    pub fn persisted(&self) -> Vec<PoseId> {
        lock(&self.inner).poses.keys().cloned().collect()
    }

    pub fn persisted_pose(&self, id: &PoseId) -> Option<Pose> {
        lock(&self.inner).poses.get(id).cloned()
    }

    pub fn persist_calls(&self) -> usize {
        lock(&self.inner).persist_calls
    }
}

impl StorageStrategy for MemoryStrategy {
    fn load_images(&mut self) -> Result<Vec<Image>, StorageError> {
        let inner = lock(&self.inner);
        if inner.fail_loads {
            return Err(StorageError::Unavailable("images".to_string()));
        }
        Ok(inner.images.clone())
    }

    fn load_object_models(&mut self) -> Result<Vec<ObjectModel>, StorageError> {
        let inner = lock(&self.inner);
        if inner.fail_loads {
            return Err(StorageError::Unavailable("object models".to_string()));
        }
        Ok(inner.object_models.clone())
    }

    fn load_poses(
        &mut self,
        images: &[Arc<Image>],
        object_models: &[Arc<ObjectModel>],
    ) -> Result<Vec<Pose>, StorageError> {
        let inner = lock(&self.inner);
        if inner.fail_loads {
            return Err(StorageError::Unavailable("poses".to_string()));
        }
        // Re-point stored poses at the caller's shared images and models
        let poses = inner
            .poses
            .values()
            .filter_map(|pose| {
                let image = images.iter().find(|i| i.path() == pose.image().path())?;
                let model = object_models
                    .iter()
                    .find(|m| m.path() == pose.object_model().path())?;
                Some(Pose::with_id(
                    pose.id().clone(),
                    image.clone(),
                    model.clone(),
                    *pose.position(),
                    *pose.rotation(),
                ))
            })
            .collect();
        Ok(poses)
    }

    fn persist_pose(&mut self, pose: &Pose, delete: bool) -> Result<(), StorageError> {
        let mut inner = lock(&self.inner);
        inner.persist_calls += 1;
        if inner.fail_persist {
            return Err(StorageError::Unavailable("persistence disabled".to_string()));
        }
        if delete {
            inner
                .poses
                .remove(pose.id())
                .map(|_| ())
                .ok_or_else(|| StorageError::PoseNotFound(pose.id().clone()))
        } else {
            inner.poses.insert(pose.id().clone(), pose.clone());
            Ok(())
        }
    }

    fn poll_changes(&mut self) -> DataSet {
        let mut inner = lock(&self.inner);
        std::mem::take(&mut inner.pending_changes)
    }
}
