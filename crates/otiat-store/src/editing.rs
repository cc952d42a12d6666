//! Pose editing session
//!
//! Sits between the pose list of the selected image and a viewport. Edits
//! are staged here and only reach the store on [`PoseEditor::save`]; the
//! unmodified values are remembered so a session can be restored.

use otiat_core::{Pose, PoseId, Rotation, Vec3};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::store::PoseStore;

/// Position and rotation of a pose
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseValues {
    pub position: Vec3,
    pub rotation: Rotation,
}

impl PoseValues {
    fn of(pose: &Pose) -> Self {
        Self {
            position: *pose.position(),
            rotation: *pose.rotation(),
        }
    }

    fn apply(&self, pose: &mut Pose) {
        pose.set_position(self.position);
        pose.set_rotation(self.rotation);
    }
}

/// Editor event for observers (viewports, pose lists)
#[derive(Debug, Clone)]
pub enum EditorEvent {
    SelectedPoseChanged {
        selected: Option<PoseId>,
        deselected: Option<PoseId>,
    },
    /// A pose's displayed values changed (staged or restored)
    PoseValuesChanged(Pose),
    /// The session went from clean to dirty or back
    DirtyChanged(bool),
}

/// Outcome of [`PoseEditor::save`]
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SaveReport {
    pub saved: Vec<PoseId>,
    pub failed: Vec<PoseId>,
}

impl SaveReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct PoseEditor {
    current_image: Option<PathBuf>,
    /// Poses of the current image with staged values applied
    poses: Vec<Pose>,
    selected: Option<PoseId>,
    /// Stored values of every pose with staged edits
    unmodified: BTreeMap<PoseId, PoseValues>,
    events: broadcast::Sender<EditorEvent>,
}

impl Default for PoseEditor {
    fn default() -> Self {
        Self::new()
    }
}

impl PoseEditor {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(100);
        Self {
            current_image: None,
            poses: Vec::new(),
            selected: None,
            unmodified: BTreeMap::new(),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EditorEvent> {
        self.events.subscribe()
    }

    pub fn current_image(&self) -> Option<&Path> {
        self.current_image.as_deref()
    }

    /// Poses of the current image, with staged values
    pub fn poses(&self) -> &[Pose] {
        &self.poses
    }

    pub fn selected(&self) -> Option<&PoseId> {
        self.selected.as_ref()
    }

    pub fn is_dirty(&self) -> bool {
        !self.unmodified.is_empty()
    }

    /// Ids of poses with unsaved edits
    pub fn dirty_poses(&self) -> Vec<PoseId> {
        self.unmodified.keys().cloned().collect()
    }

    /// Current (possibly staged) values of a pose of the current image
    pub fn staged(&self, id: &PoseId) -> Option<PoseValues> {
        self.pose(id).map(PoseValues::of)
    }

    /// Switch to another image. Unsaved edits of the previous image are
    /// dropped; call [`PoseEditor::save`] first to keep them.
    pub fn select_image(&mut self, store: &PoseStore, image: &Path) {
        if self.is_dirty() {
            warn!(
                image = %self.current_image.as_deref().unwrap_or(Path::new("")).display(),
                poses = self.unmodified.len(),
                "Discarding unsaved pose edits"
            );
            self.unmodified.clear();
            self.emit(EditorEvent::DirtyChanged(false));
        }
        self.select_pose(None);

        self.current_image = Some(image.to_path_buf());
        self.poses = store.poses_for_image_path(image).into_iter().cloned().collect();
        debug!(image = %image.display(), poses = self.poses.len(), "Editing image");
    }

    /// Select a pose of the current image, or clear the selection
    pub fn select_pose(&mut self, id: Option<&PoseId>) -> bool {
        if self.selected.as_ref() == id {
            return true;
        }
        if let Some(id) = id {
            if self.pose(id).is_none() {
                return false;
            }
        }
        let deselected = std::mem::replace(&mut self.selected, id.cloned());
        self.emit(EditorEvent::SelectedPoseChanged {
            selected: self.selected.clone(),
            deselected,
        });
        true
    }

    /// Stage a new position. Returns `false` for poses not in the current image.
    pub fn set_position(&mut self, id: &PoseId, position: Vec3) -> bool {
        self.stage(id, |values| values.position = position)
    }

    /// Stage a new rotation. Returns `false` for poses not in the current image.
    pub fn set_rotation(&mut self, id: &PoseId, rotation: Rotation) -> bool {
        self.stage(id, |values| values.rotation = rotation)
    }

    fn stage(&mut self, id: &PoseId, change: impl FnOnce(&mut PoseValues)) -> bool {
        let was_dirty = self.is_dirty();
        let Some(pose) = self.poses.iter_mut().find(|p| p.id() == id) else {
            return false;
        };

        let original = *self
            .unmodified
            .entry(id.clone())
            .or_insert_with(|| PoseValues::of(pose));
        let mut values = PoseValues::of(pose);
        change(&mut values);
        values.apply(pose);

        if values == original {
            self.unmodified.remove(id);
        }
        let pose = pose.clone();
        self.emit(EditorEvent::PoseValuesChanged(pose));
        self.emit_dirty_edge(was_dirty);
        true
    }

    /// Write every staged pose through the store. Poses that fail to
    /// persist stay dirty.
    pub fn save(&mut self, store: &mut PoseStore) -> SaveReport {
        let was_dirty = self.is_dirty();
        let mut report = SaveReport::default();

        for id in self.dirty_poses() {
            let Some(values) = self.staged(&id) else {
                self.unmodified.remove(&id);
                continue;
            };
            if store.update_pose(&id, values.position, values.rotation) {
                self.unmodified.remove(&id);
                report.saved.push(id);
            } else {
                report.failed.push(id);
            }
        }

        if !report.failed.is_empty() {
            warn!(
                failed = report.failed.len(),
                saved = report.saved.len(),
                "Some poses could not be saved"
            );
        }
        self.emit_dirty_edge(was_dirty);
        report
    }

    /// Drop staged edits and return to the stored values
    pub fn restore(&mut self) {
        let was_dirty = self.is_dirty();
        let unmodified = std::mem::take(&mut self.unmodified);
        for (id, values) in unmodified {
            if let Some(pose) = self.poses.iter_mut().find(|p| p.id() == &id) {
                values.apply(pose);
                let pose = pose.clone();
                self.emit(EditorEvent::PoseValuesChanged(pose));
            }
        }
        self.emit_dirty_edge(was_dirty);
    }

    /// Re-read the current image's poses after the store changed. Staged
    /// edits survive for poses that still exist.
    pub fn on_data_changed(&mut self, store: &PoseStore) {
        let Some(image) = self.current_image.clone() else {
            return;
        };
        let was_dirty = self.is_dirty();

        let staged: BTreeMap<PoseId, PoseValues> = self
            .unmodified
            .keys()
            .filter_map(|id| self.staged(id).map(|v| (id.clone(), v)))
            .collect();

        self.poses = store.poses_for_image_path(&image).into_iter().cloned().collect();
        self.unmodified.clear();
        for (id, values) in staged {
            if let Some(pose) = self.poses.iter_mut().find(|p| p.id() == &id) {
                let stored = PoseValues::of(pose);
                if stored != values {
                    values.apply(pose);
                    self.unmodified.insert(id, stored);
                }
            }
        }

        if let Some(selected) = self.selected.clone() {
            if self.pose(&selected).is_none() {
                self.select_pose(None);
            }
        }
        self.emit_dirty_edge(was_dirty);
    }

    fn pose(&self, id: &PoseId) -> Option<&Pose> {
        self.poses.iter().find(|p| p.id() == id)
    }

    fn emit_dirty_edge(&self, was_dirty: bool) {
        let dirty = self.is_dirty();
        if dirty != was_dirty {
            self.emit(EditorEvent::DirtyChanged(dirty));
        }
    }

    fn emit(&self, event: EditorEvent) {
        let _ = self.events.send(event);
    }
}
