//! WebSocket handler for real-time updates

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use otiat_core::{DataSet, Pose, PoseId};
use otiat_store::{StoreEvent, StoreState};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::state::{AppState, StoreSummary};

/// WebSocket message types
#[derive(Serialize)]
#[serde(tag = "type", content = "data")]
enum WsMessage {
    #[serde(rename = "state")]
    State(StoreSummary),
    #[serde(rename = "state_changed")]
    StateChanged {
        state: StoreState,
        error: Option<String>,
    },
    #[serde(rename = "data_changed")]
    DataChanged { data: DataSet },
    #[serde(rename = "pose_added")]
    PoseAdded(Pose),
    #[serde(rename = "pose_updated")]
    PoseUpdated(Pose),
    #[serde(rename = "pose_deleted")]
    PoseDeleted { id: PoseId },
    #[serde(rename = "pong")]
    Pong,
}

impl From<StoreEvent> for WsMessage {
    fn from(event: StoreEvent) -> Self {
        match event {
            StoreEvent::StateChanged { state, error } => WsMessage::StateChanged { state, error },
            StoreEvent::DataChanged(data) => WsMessage::DataChanged { data },
            StoreEvent::PoseAdded(pose) => WsMessage::PoseAdded(pose),
            StoreEvent::PoseUpdated(pose) => WsMessage::PoseUpdated(pose),
            StoreEvent::PoseDeleted(pose) => WsMessage::PoseDeleted { id: pose.id().clone() },
        }
    }
}

/// WebSocket upgrade handler
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut store_events = state.subscribe();

    info!("WebSocket client connected");

    // Send current state on connect
    let msg = WsMessage::State(state.summary().await);
    if let Ok(json) = serde_json::to_string(&msg) {
        if sender.send(Message::Text(json.into())).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            // Forward store events to client
            event = store_events.recv() => {
                match event {
                    Ok(event) => {
                        let msg = WsMessage::from(event);
                        if let Ok(json) = serde_json::to_string(&msg) {
                            if sender.send(Message::Text(json.into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        debug!(skipped = n, "Store event channel lagged");
                    }
                    Err(e) => {
                        debug!(error = %e, "Store event channel error");
                        break;
                    }
                }
            }

            // Handle incoming messages from client
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Text(text))) => {
                        if text.as_str() == "ping" {
                            if let Ok(pong) = serde_json::to_string(&WsMessage::Pong) {
                                if sender.send(Message::Text(pong.into())).await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    info!("WebSocket client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use otiat_core::{Image, Mat3, ObjectModel, Rotation, Vec3};

    #[test]
    fn test_event_messages() {
        let msg = WsMessage::from(StoreEvent::DataChanged(DataSet::IMAGES | DataSet::POSES));
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "data_changed");
        assert_eq!(json["data"]["data"], serde_json::json!(["images", "poses"]));

        let pose = Pose::new(
            Arc::new(Image::new("/a.png", Mat3::identity())),
            Arc::new(ObjectModel::new("/m.obj")),
            Vec3::zeros(),
            Rotation::identity(),
        );
        let id = pose.id().clone();
        let json = serde_json::to_value(WsMessage::from(StoreEvent::PoseDeleted(pose))).unwrap();
        assert_eq!(json["type"], "pose_deleted");
        assert_eq!(json["data"]["id"], id.as_str());

        let json = serde_json::to_value(WsMessage::from(StoreEvent::StateChanged {
            state: StoreState::Error,
            error: Some("boom".to_string()),
        }))
        .unwrap();
        assert_eq!(json["data"]["state"], "error");
    }
}
