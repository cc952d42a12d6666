//! Application state management

use anyhow::Result;
use otiat_store::{PoseStore, StoreEvent, StoreState};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

use crate::config::Config;

/// Shared application state
pub struct AppState {
    /// The pose store; every mutation takes the write lock
    pub store: Arc<RwLock<PoseStore>>,
    /// Configuration
    pub config: Config,
    /// Event broadcast for WebSocket clients
    pub events: broadcast::Sender<StoreEvent>,
}

/// Snapshot of the store for status queries
#[derive(Debug, Clone, Serialize)]
pub struct StoreSummary {
    pub state: StoreState,
    pub error: Option<String>,
    pub images: usize,
    pub object_models: usize,
    pub poses: usize,
}

impl StoreSummary {
    pub fn of(store: &PoseStore) -> Self {
        Self {
            state: store.state(),
            error: store.last_error().map(|e| e.to_string()),
            images: store.images().len(),
            object_models: store.object_models().len(),
            poses: store.poses().len(),
        }
    }
}

impl AppState {
    /// Create application state with the configured storage strategy
    pub async fn new(config: Config) -> Result<Arc<Self>> {
        let store = PoseStore::new(config.to_strategy());
        Self::with_store(config, store).await
    }

    /// Create application state around an existing store and run the initial load
    pub async fn with_store(config: Config, store: PoseStore) -> Result<Arc<Self>> {
        let (events, _) = broadcast::channel(100);
        let mut rx = store.subscribe();

        let state = Arc::new(Self {
            store: Arc::new(RwLock::new(store)),
            config,
            events,
        });

        // Forward store events to WebSocket clients
        let events = state.events.clone();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        let _ = events.send(event);
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        debug!(skipped = n, "Store event channel lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        let result = state.reload().await?;
        if result != StoreState::Ready {
            let summary = state.summary().await;
            warn!(error = ?summary.error, "Initial load failed, store is in error state");
        }

        Ok(state)
    }

    /// Reload everything on the blocking pool; completes when the reload has finished
    pub async fn reload(&self) -> Result<StoreState> {
        let store = self.store.clone();
        let state = tokio::task::spawn_blocking(move || store.blocking_write().reload()).await?;
        Ok(state)
    }

    /// Ask the storage for external changes and reload what changed
    pub async fn poll_changes(&self) -> Result<()> {
        let store = self.store.clone();
        let changed =
            tokio::task::spawn_blocking(move || store.blocking_write().poll_external_changes())
                .await?;
        if !changed.is_empty() {
            debug!(data = %changed, "Reloaded after external change");
        }
        Ok(())
    }

    /// Poll for external changes until the task is dropped
    pub async fn run_watch(self: Arc<Self>) {
        let period = Duration::from_millis(self.config.daemon.watch_interval_ms.max(100));
        let mut ticker = tokio::time::interval(period);
        info!(interval_ms = period.as_millis() as u64, "Watching storage for external changes");

        loop {
            ticker.tick().await;
            if let Err(e) = self.poll_changes().await {
                warn!(error = %e, "Change poll failed");
            }
        }
    }

    pub async fn summary(&self) -> StoreSummary {
        StoreSummary::of(&*self.store.read().await)
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }
}
