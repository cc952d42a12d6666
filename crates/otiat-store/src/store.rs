//! Pose store: the authoritative cache of images, object models and poses
//!
//! The store owns every pose. Lookups hand out shared borrows; the only way
//! to change a pose is through [`PoseStore::add_pose`],
//! [`PoseStore::update_pose`] and [`PoseStore::remove_pose`], each of which
//! persists through the storage strategy before touching memory.
//!
//! Two indices (image path and object model path to pose positions) are
//! rebuilt after every load and mutation, before observers are notified.

use otiat_core::{DataSet, Image, ObjectModel, Pose, PoseId, Rotation, Vec3};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::strategy::{StorageError, StorageStrategy};

/// Loading state of the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreState {
    /// A load is in progress, or no load has completed yet
    Loading,
    /// Data is loaded and consistent
    Ready,
    /// The last load failed; see [`PoseStore::last_error`]
    Error,
}

/// Store event for observers
#[derive(Debug, Clone)]
pub enum StoreEvent {
    /// State transition, with the load error when entering `Error`
    StateChanged {
        state: StoreState,
        error: Option<String>,
    },
    /// Data sets were reloaded
    DataChanged(DataSet),
    PoseAdded(Pose),
    PoseUpdated(Pose),
    PoseDeleted(Pose),
}

pub struct PoseStore {
    strategy: Box<dyn StorageStrategy>,
    images: Vec<Arc<Image>>,
    object_models: Vec<Arc<ObjectModel>>,
    poses: Vec<Pose>,
    /// Image path -> positions in `poses`
    poses_by_image: HashMap<PathBuf, Vec<usize>>,
    /// Object model path -> positions in `poses`
    poses_by_object_model: HashMap<PathBuf, Vec<usize>>,
    state: StoreState,
    last_error: Option<StorageError>,
    events: broadcast::Sender<StoreEvent>,
}

impl PoseStore {
    /// Create an empty store. Nothing is loaded until [`PoseStore::load`] is called.
    pub fn new(strategy: Box<dyn StorageStrategy>) -> Self {
        let (events, _) = broadcast::channel(100);
        Self {
            strategy,
            images: Vec::new(),
            object_models: Vec::new(),
            poses: Vec::new(),
            poses_by_image: HashMap::new(),
            poses_by_object_model: HashMap::new(),
            state: StoreState::Loading,
            last_error: None,
            events,
        }
    }

    /// Subscribe to store events
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> StoreState {
        self.state
    }

    /// Error of the last failed load, cleared by the next successful one
    pub fn last_error(&self) -> Option<&StorageError> {
        self.last_error.as_ref()
    }

    pub fn images(&self) -> &[Arc<Image>] {
        &self.images
    }

    pub fn object_models(&self) -> &[Arc<ObjectModel>] {
        &self.object_models
    }

    pub fn poses(&self) -> &[Pose] {
        &self.poses
    }

    /// Loaded image with the given path
    pub fn image(&self, path: &Path) -> Option<&Arc<Image>> {
        self.images.iter().find(|i| i.path() == path)
    }

    /// Loaded object model with the given path
    pub fn object_model(&self, path: &Path) -> Option<&Arc<ObjectModel>> {
        self.object_models.iter().find(|m| m.path() == path)
    }

    /// (Re-)load the selected data sets. Poses are always reloaded since
    /// they refer to images and object models.
    pub fn load(&mut self, selector: DataSet) -> StoreState {
        self.set_state(StoreState::Loading);
        let changed = selector | DataSet::POSES;

        match self.load_data(selector) {
            Ok(()) => {
                self.rebuild_indices();
                self.last_error = None;
                info!(
                    data = %changed,
                    images = self.images.len(),
                    object_models = self.object_models.len(),
                    poses = self.poses.len(),
                    "Store loaded"
                );
                self.set_state(StoreState::Ready);
                self.emit(StoreEvent::DataChanged(changed));
            }
            Err(e) => {
                warn!(data = %changed, error = %e, "Failed to load store data");
                self.last_error = Some(e);
                self.rebuild_indices();
                self.set_state(StoreState::Error);
            }
        }
        self.state
    }

    /// Reload everything
    pub fn reload(&mut self) -> StoreState {
        self.load(DataSet::ALL)
    }

    /// Reload the data sets the strategy reports as changed on disk
    pub fn poll_external_changes(&mut self) -> DataSet {
        let changed = self.strategy.poll_changes();
        if !changed.is_empty() {
            info!(data = %changed, "External data change detected");
            self.load(changed);
        }
        changed
    }

    /// Load into locals first so a failure leaves the previous data intact
    fn load_data(&mut self, selector: DataSet) -> Result<(), StorageError> {
        let images = if selector.contains(DataSet::IMAGES) {
            to_shared(self.strategy.load_images()?)
        } else {
            self.images.clone()
        };
        let object_models = if selector.contains(DataSet::OBJECT_MODELS) {
            to_shared(self.strategy.load_object_models()?)
        } else {
            self.object_models.clone()
        };
        let poses = self.strategy.load_poses(&images, &object_models)?;

        self.images = images;
        self.object_models = object_models;
        self.poses = poses;
        Ok(())
    }

    /// Poses of an image. Never triggers I/O.
    pub fn poses_for_image(&self, image: &Image) -> Vec<&Pose> {
        self.poses_for_image_path(image.path())
    }

    pub fn poses_for_image_path(&self, path: &Path) -> Vec<&Pose> {
        self.collect(self.poses_by_image.get(path))
    }

    /// Poses of an object model. Never triggers I/O.
    pub fn poses_for_object_model(&self, object_model: &ObjectModel) -> Vec<&Pose> {
        self.poses_for_object_model_path(object_model.path())
    }

    pub fn poses_for_object_model_path(&self, path: &Path) -> Vec<&Pose> {
        self.collect(self.poses_by_object_model.get(path))
    }

    /// Poses of an object model within one image
    pub fn poses_for_image_and_object_model(
        &self,
        image: &Image,
        object_model: &ObjectModel,
    ) -> Vec<&Pose> {
        self.poses_for_image_and_object_model_path(image.path(), object_model.path())
    }

    pub fn poses_for_image_and_object_model_path(
        &self,
        image: &Path,
        object_model: &Path,
    ) -> Vec<&Pose> {
        self.poses_for_image_path(image)
            .into_iter()
            .filter(|p| p.object_model().path() == object_model)
            .collect()
    }

    pub fn pose_by_id(&self, id: &PoseId) -> Option<&Pose> {
        self.poses.iter().find(|p| p.id() == id)
    }

    /// Create and persist a pose. Returns `None` and changes nothing when
    /// persistence fails, a pose with the same id already exists, or the
    /// object model is already placed in the image.
    pub fn add_pose(
        &mut self,
        image: &Arc<Image>,
        object_model: &Arc<ObjectModel>,
        position: Vec3,
        rotation: Rotation,
    ) -> Option<Pose> {
        let pose = Pose::new(image.clone(), object_model.clone(), position, rotation);

        if self.pose_by_id(pose.id()).is_some()
            || !self.poses_for_image_and_object_model(image, object_model).is_empty()
        {
            warn!(pose = %pose.id(), "Pose already exists");
            return None;
        }

        if let Err(e) = self.strategy.persist_pose(&pose, false) {
            warn!(pose = %pose.id(), error = %e, "Failed to persist new pose");
            return None;
        }

        self.poses.push(pose.clone());
        self.rebuild_indices();
        debug!(pose = %pose.id(), image = %image.path().display(), "Pose added");
        self.emit(StoreEvent::PoseAdded(pose.clone()));
        Some(pose)
    }

    /// Change a pose's position and rotation. Returns `false` when the pose
    /// is unknown or persisting fails; in the latter case the previous
    /// values are restored.
    pub fn update_pose(&mut self, id: &PoseId, position: Vec3, rotation: Rotation) -> bool {
        let Some(index) = self.poses.iter().position(|p| p.id() == id) else {
            debug!(pose = %id, "Update of unknown pose");
            return false;
        };

        let pose = &mut self.poses[index];
        let previous_position = *pose.position();
        let previous_rotation = *pose.rotation();
        pose.set_position(position);
        pose.set_rotation(rotation);

        if let Err(e) = self.strategy.persist_pose(&self.poses[index], false) {
            warn!(pose = %id, error = %e, "Failed to persist pose update, restoring");
            let pose = &mut self.poses[index];
            pose.set_position(previous_position);
            pose.set_rotation(previous_rotation);
            return false;
        }

        self.rebuild_indices();
        debug!(pose = %id, "Pose updated");
        self.emit(StoreEvent::PoseUpdated(self.poses[index].clone()));
        true
    }

    /// Delete a pose. Returns `false` when the pose is unknown or the
    /// persistent deletion fails; the pose then stays in the store.
    pub fn remove_pose(&mut self, id: &PoseId) -> bool {
        let Some(index) = self.poses.iter().position(|p| p.id() == id) else {
            debug!(pose = %id, "Removal of unknown pose");
            return false;
        };

        if let Err(e) = self.strategy.persist_pose(&self.poses[index], true) {
            warn!(pose = %id, error = %e, "Failed to delete pose from storage");
            return false;
        }

        let pose = self.poses.remove(index);
        self.rebuild_indices();
        debug!(pose = %id, "Pose deleted");
        self.emit(StoreEvent::PoseDeleted(pose));
        true
    }

    fn collect(&self, indices: Option<&Vec<usize>>) -> Vec<&Pose> {
        indices
            .map(|indices| indices.iter().map(|&i| &self.poses[i]).collect())
            .unwrap_or_default()
    }

    fn rebuild_indices(&mut self) {
        self.poses_by_image.clear();
        self.poses_by_object_model.clear();
        for (i, pose) in self.poses.iter().enumerate() {
            self.poses_by_image
                .entry(pose.image().path().to_path_buf())
                .or_default()
                .push(i);
            self.poses_by_object_model
                .entry(pose.object_model().path().to_path_buf())
                .or_default()
                .push(i);
        }
    }

    fn set_state(&mut self, state: StoreState) {
        self.state = state;
        let error = match state {
            StoreState::Error => self.last_error.as_ref().map(|e| e.to_string()),
            _ => None,
        };
        self.emit(StoreEvent::StateChanged { state, error });
    }

    fn emit(&self, event: StoreEvent) {
        // No subscribers is not an error
        let _ = self.events.send(event);
    }
}

fn to_shared<T>(items: Vec<T>) -> Vec<Arc<T>> {
    items.into_iter().map(Arc::new).collect()
}
