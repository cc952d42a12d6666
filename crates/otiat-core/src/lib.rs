//! Otiat Core - Images, object models and poses
//!
//! This crate provides the entity types shared by the Otiat crates:
//! - Images with camera intrinsics and optional segmentation images
//! - Object models with display metadata
//! - Poses pairing an object model with an image, with deterministic ids
//! - The `DataSet` bit set used to describe which data changed

pub mod data_set;
pub mod image;
pub mod math;
pub mod object_model;
pub mod pose;

pub use data_set::DataSet;
pub use image::Image;
pub use math::{Mat3, Rotation, Vec3};
pub use object_model::{ObjectModel, ObjectModelInfo};
pub use pose::{sha256_hex, Pose, PoseId};
