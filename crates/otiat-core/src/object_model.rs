//! 3D object models that poses refer to

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::image::file_name_of;

/// Optional display metadata for an object model
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectModelInfo {
    /// Human-readable name shown in galleries
    #[serde(default)]
    pub name: Option<String>,
    /// Color code identifying the object in segmentation images (e.g. "#ff0000")
    #[serde(default)]
    pub segmentation_code: Option<String>,
}

/// A 3D mesh file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectModel {
    path: PathBuf,
    info: ObjectModelInfo,
}

impl ObjectModel {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            info: ObjectModelInfo::default(),
        }
    }

    pub fn with_info(mut self, info: ObjectModelInfo) -> Self {
        self.info = info;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn info(&self) -> &ObjectModelInfo {
        &self.info
    }

    pub fn file_name(&self) -> String {
        file_name_of(&self.path)
    }

    /// Configured name, or the file stem when none was given
    pub fn display_name(&self) -> String {
        if let Some(name) = &self.info.name {
            return name.clone();
        }
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.file_name())
    }
}
