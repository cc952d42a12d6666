//! Images to annotate

use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::math::{row_major, Mat3};

/// A 2D image with its camera intrinsics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Image {
    /// Path to the image file
    path: PathBuf,
    /// Path to the companion segmentation image, if one exists
    segmentation_path: Option<PathBuf>,
    /// Camera intrinsics matrix K
    #[serde(with = "row_major")]
    intrinsics: Mat3,
}

impl Image {
    pub fn new(path: impl Into<PathBuf>, intrinsics: Mat3) -> Self {
        Self {
            path: path.into(),
            segmentation_path: None,
            intrinsics,
        }
    }

    /// Attach a segmentation image
    pub fn with_segmentation(mut self, path: impl Into<PathBuf>) -> Self {
        self.segmentation_path = Some(path.into());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn segmentation_path(&self) -> Option<&Path> {
        self.segmentation_path.as_deref()
    }

    pub fn intrinsics(&self) -> &Mat3 {
        &self.intrinsics
    }

    /// File name of the image, used as the key in pose files
    pub fn file_name(&self) -> String {
        file_name_of(&self.path)
    }
}

/// File name of `path`, or the whole path when it has none.
///
/// This is the key images and object models are stored under.
pub fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}
