//! REST API handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use otiat_core::math::{mat3_from_rows, rotation_from_matrix, rotation_from_xyzw};
use otiat_core::{Image, ObjectModel, Pose, PoseId, Rotation, Vec3};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::state::AppState;

/// API error response
#[derive(Serialize)]
struct ApiError {
    error: String,
}

impl ApiError {
    fn new(msg: impl Into<String>) -> Self {
        Self { error: msg.into() }
    }
}

fn error_response(status: StatusCode, msg: impl Into<String>) -> axum::response::Response {
    (status, Json(ApiError::new(msg))).into_response()
}

/// Rotation given either as a quaternion or as a row-major matrix
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RotationInput {
    Quaternion { x: f64, y: f64, z: f64, w: f64 },
    Matrix(Vec<f64>),
}

impl RotationInput {
    fn to_rotation(&self) -> Option<Rotation> {
        match self {
            Self::Quaternion { x, y, z, w } => rotation_from_xyzw(*x, *y, *z, *w),
            Self::Matrix(values) => mat3_from_rows(values).and_then(|m| rotation_from_matrix(&m)),
        }
    }
}

fn parse_rotation(rotation: Option<&RotationInput>) -> Result<Rotation, axum::response::Response> {
    match rotation {
        None => Ok(Rotation::identity()),
        Some(input) => input.to_rotation().ok_or_else(|| {
            error_response(
                StatusCode::UNPROCESSABLE_ENTITY,
                "Rotation must be a non-zero quaternion or a proper 3x3 rotation matrix",
            )
        }),
    }
}

/// Get store state and counts
pub async fn get_state(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.summary().await)
}

/// List all images
pub async fn list_images(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let store = state.store.read().await;
    let images: Vec<Image> = store.images().iter().map(|i| (**i).clone()).collect();
    Json(images)
}

/// List all object models
pub async fn list_object_models(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let store = state.store.read().await;
    let models: Vec<ObjectModel> = store.object_models().iter().map(|m| (**m).clone()).collect();
    Json(models)
}

/// Pose list filter
#[derive(Debug, Default, Deserialize)]
pub struct PoseQuery {
    image: Option<PathBuf>,
    object_model: Option<PathBuf>,
}

/// List poses, optionally for one image and/or object model
pub async fn list_poses(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PoseQuery>,
) -> impl IntoResponse {
    let store = state.store.read().await;
    let poses: Vec<&Pose> = match (&query.image, &query.object_model) {
        (Some(image), Some(model)) => store.poses_for_image_and_object_model_path(image, model),
        (Some(image), None) => store.poses_for_image_path(image),
        (None, Some(model)) => store.poses_for_object_model_path(model),
        (None, None) => store.poses().iter().collect(),
    };
    let poses: Vec<Pose> = poses.into_iter().cloned().collect();
    Json(poses)
}

/// Get a specific pose by ID
pub async fn get_pose(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let store = state.store.read().await;
    match store.pose_by_id(&PoseId(id)) {
        Some(pose) => Json(pose.clone()).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "Pose not found"),
    }
}

/// Create pose request body
#[derive(Debug, Deserialize)]
pub struct CreatePoseRequest {
    image: PathBuf,
    object_model: PathBuf,
    #[serde(default)]
    position: [f64; 3],
    #[serde(default)]
    rotation: Option<RotationInput>,
}

/// Create a pose
pub async fn create_pose(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreatePoseRequest>,
) -> impl IntoResponse {
    let rotation = match parse_rotation(req.rotation.as_ref()) {
        Ok(r) => r,
        Err(response) => return response,
    };

    let mut store = state.store.write().await;
    let Some(image) = store.image(&req.image).cloned() else {
        return error_response(StatusCode::NOT_FOUND, "Image not found");
    };
    let Some(model) = store.object_model(&req.object_model).cloned() else {
        return error_response(StatusCode::NOT_FOUND, "Object model not found");
    };

    match store.add_pose(&image, &model, Vec3::from(req.position), rotation) {
        Some(pose) => {
            info!(pose = %pose.id(), image = %req.image.display(), "Pose created");
            (StatusCode::CREATED, Json(pose)).into_response()
        }
        None => error_response(
            StatusCode::CONFLICT,
            "Pose could not be stored (it may already exist)",
        ),
    }
}

/// Update pose request body
#[derive(Debug, Deserialize)]
pub struct UpdatePoseRequest {
    position: [f64; 3],
    #[serde(default)]
    rotation: Option<RotationInput>,
}

/// Update a pose's position and rotation
pub async fn update_pose(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdatePoseRequest>,
) -> impl IntoResponse {
    let rotation = match parse_rotation(req.rotation.as_ref()) {
        Ok(r) => r,
        Err(response) => return response,
    };

    let id = PoseId(id);
    let mut store = state.store.write().await;
    if store.pose_by_id(&id).is_none() {
        return error_response(StatusCode::NOT_FOUND, "Pose not found");
    }

    if store.update_pose(&id, Vec3::from(req.position), rotation) {
        match store.pose_by_id(&id) {
            Some(pose) => Json(pose.clone()).into_response(),
            None => error_response(StatusCode::NOT_FOUND, "Pose not found"),
        }
    } else {
        error_response(StatusCode::CONFLICT, "Pose update could not be stored")
    }
}

/// Delete a pose
pub async fn delete_pose(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let id = PoseId(id);
    let mut store = state.store.write().await;
    if store.pose_by_id(&id).is_none() {
        return error_response(StatusCode::NOT_FOUND, "Pose not found");
    }

    if store.remove_pose(&id) {
        info!(pose = %id, "Pose deleted");
        StatusCode::NO_CONTENT.into_response()
    } else {
        error_response(StatusCode::CONFLICT, "Pose deletion could not be stored")
    }
}

/// Reload everything from storage; responds once the reload has completed
pub async fn reload(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    info!("Reload requested");
    match state.reload().await {
        Ok(_) => Json(state.summary().await).into_response(),
        Err(e) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Reload failed: {}", e),
        ),
    }
}
