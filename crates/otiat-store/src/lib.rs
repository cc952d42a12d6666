//! Otiat Store - Pose store and storage strategies
//!
//! This crate provides:
//! - `PoseStore`: the authoritative cache of images, object models and
//!   poses with per-image and per-model indices and a typed event bus
//! - Storage strategies: JSON file, one text file per pose, and in-memory
//! - Change tracking so external edits on disk trigger reloads
//! - `PoseEditor`: staged pose edits with dirty tracking, save and restore

pub mod catalog;
pub mod editing;
pub mod fingerprint;
pub mod json;
pub mod memory;
pub mod store;
pub mod strategy;
pub mod text;

pub use catalog::CatalogPaths;
pub use editing::{EditorEvent, PoseEditor, PoseValues, SaveReport};
pub use json::JsonStrategy;
pub use memory::{MemoryHandle, MemoryStrategy};
pub use store::{PoseStore, StoreEvent, StoreState};
pub use strategy::{StorageError, StorageStrategy};
pub use text::TextStrategy;
