//! Web server setup and routing

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::info;

use crate::api;
use crate::state::AppState;
use crate::ws;

/// Build the API router
pub fn router(state: Arc<AppState>) -> Router {
    let images = ServeDir::new(&state.config.storage.images_path);
    let models = ServeDir::new(&state.config.storage.object_models_path);
    Router::new()
        // API routes
        .route("/api/state", get(api::get_state))
        .route("/api/images", get(api::list_images))
        .route("/api/object-models", get(api::list_object_models))
        .route("/api/poses", get(api::list_poses).post(api::create_pose))
        .route(
            "/api/poses/{id}",
            get(api::get_pose).put(api::update_pose).delete(api::delete_pose),
        )
        .route("/api/reload", post(api::reload))
        // WebSocket for real-time updates
        .route("/ws", get(ws::websocket_handler))
        // Serve image and model files to viewers
        .nest_service("/files/images", images)
        .nest_service("/files/models", models)
        // CORS
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        // State
        .with_state(state)
}

/// Run the web server and, if enabled, the storage watcher
pub async fn run(state: Arc<AppState>, bind: &str) -> Result<()> {
    if state.config.daemon.watch {
        tokio::spawn(state.clone().run_watch());
    }

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(address = %bind, protocol = "HTTP", "Starting web server");
    axum::serve(listener, app).await?;
    Ok(())
}
