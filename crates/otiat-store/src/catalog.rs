//! Discovery of images and object models in directories
//!
//! Both file-backed strategies share this: images come from one directory,
//! segmentation images from an optional second one (matched by file stem),
//! object models from a third.

use otiat_core::math::mat3_from_rows;
use otiat_core::image::file_name_of;
use otiat_core::{Image, Mat3, ObjectModel, ObjectModelInfo};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::strategy::StorageError;

pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tif", "tiff"];
pub const OBJECT_MODEL_EXTENSIONS: &[&str] =
    &["obj", "ply", "stl", "3ds", "fbx", "dae", "gltf", "glb"];

/// Per-image camera information file in the images directory
pub const IMAGE_INFO_FILE: &str = "info.json";
/// Per-model display metadata file in the object models directory
pub const OBJECT_MODEL_INFO_FILE: &str = "models.json";

/// Where images and object models live on disk
#[derive(Debug, Clone, Default)]
pub struct CatalogPaths {
    pub images: PathBuf,
    pub segmentation_images: Option<PathBuf>,
    pub object_models: PathBuf,
    /// Segmentation color codes keyed by object model file name
    pub segmentation_codes: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct ImageInfo {
    #[serde(rename = "K")]
    k: Vec<f64>,
}

impl CatalogPaths {
    /// Load all images, sorted by file name
    pub fn load_images(&self) -> Result<Vec<Image>, StorageError> {
        let files = list_files(&self.images, IMAGE_EXTENSIONS)?;
        let infos = read_image_infos(&self.images.join(IMAGE_INFO_FILE));

        let segmentations = match &self.segmentation_images {
            Some(dir) if dir.is_dir() => list_files(dir, IMAGE_EXTENSIONS)?,
            Some(dir) => {
                warn!(path = %dir.display(), "Segmentation images directory not found");
                Vec::new()
            }
            None => Vec::new(),
        };

        let images = files
            .into_iter()
            .map(|path| {
                let name = file_name_of(&path);
                let intrinsics = match infos.get(&name) {
                    Some(k) => *k,
                    None => {
                        debug!(image = %name, "No intrinsics found, using identity");
                        Mat3::identity()
                    }
                };
                let mut image = Image::new(path.clone(), intrinsics);
                let segmentation = segmentations
                    .iter()
                    .find(|s| s.file_stem() == path.file_stem());
                if let Some(segmentation) = segmentation {
                    image = image.with_segmentation(segmentation.clone());
                }
                image
            })
            .collect();

        Ok(images)
    }

    /// Load all object models, sorted by file name
    pub fn load_object_models(&self) -> Result<Vec<ObjectModel>, StorageError> {
        let files = list_files(&self.object_models, OBJECT_MODEL_EXTENSIONS)?;
        let mut infos = read_object_model_infos(&self.object_models.join(OBJECT_MODEL_INFO_FILE));

        let models = files
            .into_iter()
            .map(|path| {
                let name = file_name_of(&path);
                let mut info = infos.remove(&name).unwrap_or_default();
                if let Some(code) = self.segmentation_codes.get(&name) {
                    info.segmentation_code = Some(code.clone());
                }
                ObjectModel::new(path).with_info(info)
            })
            .collect();

        Ok(models)
    }
}

/// List files in `dir` whose extension is one of `extensions`, sorted by name
pub(crate) fn list_files(dir: &Path, extensions: &[&str]) -> Result<Vec<PathBuf>, StorageError> {
    if !dir.is_dir() {
        return Err(StorageError::MissingDirectory(dir.to_path_buf()));
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let matches = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .is_some_and(|e| extensions.contains(&e.as_str()));
        if matches {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn read_image_infos(path: &Path) -> HashMap<String, Mat3> {
    if !path.exists() {
        return HashMap::new();
    }
    let parsed: Result<HashMap<String, ImageInfo>, StorageError> = std::fs::read_to_string(path)
        .map_err(StorageError::from)
        .and_then(|content| Ok(serde_json::from_str(&content)?));

    match parsed {
        Ok(infos) => infos
            .into_iter()
            .filter_map(|(name, info)| match mat3_from_rows(&info.k) {
                Some(k) => Some((name, k)),
                None => {
                    warn!(
                        image = %name,
                        values = info.k.len(),
                        "Intrinsics must have 9 values, ignoring"
                    );
                    None
                }
            })
            .collect(),
        Err(e) => {
            warn!(
                path = %path.display(),
                error = %e,
                "Failed to read image info, using identity intrinsics"
            );
            HashMap::new()
        }
    }
}

fn read_object_model_infos(path: &Path) -> HashMap<String, ObjectModelInfo> {
    if !path.exists() {
        return HashMap::new();
    }
    let parsed: Result<HashMap<String, ObjectModelInfo>, StorageError> =
        std::fs::read_to_string(path)
            .map_err(StorageError::from)
            .and_then(|content| Ok(serde_json::from_str(&content)?));

    parsed.unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "Failed to read object model info");
        HashMap::new()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        std::fs::write(path, b"x").unwrap();
    }

    #[test]
    fn test_images_sorted_and_filtered() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("b.png"));
        touch(&dir.path().join("a.JPG"));
        touch(&dir.path().join("notes.txt"));

        let paths = CatalogPaths {
            images: dir.path().to_path_buf(),
            object_models: dir.path().to_path_buf(),
            ..Default::default()
        };
        let images = paths.load_images().unwrap();
        let names: Vec<String> = images.iter().map(|i| i.file_name()).collect();
        assert_eq!(names, vec!["a.JPG", "b.png"]);
    }

    #[test]
    fn test_missing_directory_is_error() {
        let paths = CatalogPaths {
            images: PathBuf::from("/definitely/not/here"),
            ..Default::default()
        };
        assert!(matches!(paths.load_images(), Err(StorageError::MissingDirectory(_))));
    }

    #[test]
    fn test_segmentation_and_intrinsics() {
        let images = TempDir::new().unwrap();
        let segmentation = TempDir::new().unwrap();
        touch(&images.path().join("0001.jpg"));
        touch(&images.path().join("0002.jpg"));
        touch(&segmentation.path().join("0001.png"));
        std::fs::write(
            images.path().join(IMAGE_INFO_FILE),
            r#"{"0001.jpg": {"K": [500, 0, 320, 0, 500, 240, 0, 0, 1]}}"#,
        )
        .unwrap();

        let paths = CatalogPaths {
            images: images.path().to_path_buf(),
            segmentation_images: Some(segmentation.path().to_path_buf()),
            ..Default::default()
        };
        let loaded = paths.load_images().unwrap();
        assert_eq!(loaded.len(), 2);
        let expected = segmentation.path().join("0001.png");
        assert_eq!(loaded[0].segmentation_path(), Some(expected.as_path()));
        // info.json is keyed by the same name the image reports
        assert_eq!(loaded[0].file_name(), "0001.png");
        assert_eq!(loaded[0].intrinsics()[(0, 2)], 320.0);
        assert!(loaded[1].segmentation_path().is_none());
        assert_eq!(*loaded[1].intrinsics(), Mat3::identity());
    }

    #[test]
    fn test_object_model_metadata() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("cup.obj"));
        touch(&dir.path().join("plate.ply"));
        std::fs::write(
            dir.path().join(OBJECT_MODEL_INFO_FILE),
            r#"{"cup.obj": {"name": "Coffee cup"}}"#,
        )
        .unwrap();

        let mut codes = HashMap::new();
        codes.insert("plate.ply".to_string(), "#00ff00".to_string());
        let paths = CatalogPaths {
            object_models: dir.path().to_path_buf(),
            segmentation_codes: codes,
            ..Default::default()
        };
        let models = paths.load_object_models().unwrap();
        assert_eq!(models.len(), 2);
        assert_eq!(models[0].display_name(), "Coffee cup");
        assert_eq!(models[1].info().segmentation_code.as_deref(), Some("#00ff00"));
    }
}
