//! Configuration loading and validation

use anyhow::Result;
use otiat_store::{CatalogPaths, JsonStrategy, StorageStrategy, TextStrategy};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    /// Segmentation color codes keyed by object model file name
    #[serde(default)]
    pub segmentation_codes: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Bind address for web server
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Poll the storage for external changes
    #[serde(default = "default_true")]
    pub watch: bool,
    /// Interval between change polls in milliseconds
    #[serde(default = "default_watch_interval")]
    pub watch_interval_ms: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            watch: true,
            watch_interval_ms: default_watch_interval(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_true() -> bool {
    true
}

fn default_watch_interval() -> u64 {
    1000
}

/// Which storage strategy persists poses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// All poses in one JSON file
    #[default]
    Json,
    /// One text file per pose in a directory
    Text,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub kind: StorageKind,
    /// Directory of images to annotate
    #[serde(default = "default_images_path")]
    pub images_path: String,
    /// Directory of segmentation images (empty to disable)
    #[serde(default)]
    pub segmentation_images_path: String,
    /// Directory of object models
    #[serde(default = "default_object_models_path")]
    pub object_models_path: String,
    /// Poses file (json) or directory (text); empty for the default of `kind`
    #[serde(default)]
    pub poses_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            kind: StorageKind::default(),
            images_path: default_images_path(),
            segmentation_images_path: String::new(),
            object_models_path: default_object_models_path(),
            poses_path: String::new(),
        }
    }
}

fn default_images_path() -> String {
    "./images".to_string()
}

fn default_object_models_path() -> String {
    "./models".to_string()
}

impl StorageKind {
    /// Where poses live when no path is configured
    pub fn default_poses_path(self) -> &'static str {
        match self {
            StorageKind::Json => "./poses.json",
            StorageKind::Text => "./poses",
        }
    }
}

impl StorageConfig {
    /// Configured poses location, or the default of the storage kind
    pub fn poses_path(&self) -> PathBuf {
        let path = self.poses_path.trim();
        if path.is_empty() {
            PathBuf::from(self.kind.default_poses_path())
        } else {
            PathBuf::from(path)
        }
    }
}

impl Config {
    /// Directory layout for the storage strategies
    pub fn to_catalog_paths(&self) -> CatalogPaths {
        let segmentation = self.storage.segmentation_images_path.trim();
        CatalogPaths {
            images: PathBuf::from(&self.storage.images_path),
            segmentation_images: (!segmentation.is_empty()).then(|| PathBuf::from(segmentation)),
            object_models: PathBuf::from(&self.storage.object_models_path),
            segmentation_codes: self.segmentation_codes.clone(),
        }
    }

    /// Build the configured storage strategy
    pub fn to_strategy(&self) -> Box<dyn StorageStrategy> {
        let catalog = self.to_catalog_paths();
        let poses = self.storage.poses_path();
        match self.storage.kind {
            StorageKind::Json => Box::new(JsonStrategy::new(catalog, poses)),
            StorageKind::Text => Box::new(TextStrategy::new(catalog, poses)),
        }
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(Config::default())
    }
}
