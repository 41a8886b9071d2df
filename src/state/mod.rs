/// Live connection registry and fan-out primitives.
pub mod connections;
/// Session, player, and result domain types.
pub mod game;

use std::sync::Arc;

use crate::{config::AppConfig, dao::store::QuizStore, state::connections::ConnectionRegistry};

/// Cheaply cloneable handle to the central application state.
pub type SharedState = Arc<AppState>;

/// Central application state wiring configuration, the persistence gateway,
/// and the in-memory connection registry together.
pub struct AppState {
    config: AppConfig,
    store: Arc<dyn QuizStore>,
    connections: ConnectionRegistry,
}

impl AppState {
    /// Construct the shared state around an injected storage backend.
    pub fn new(config: AppConfig, store: Arc<dyn QuizStore>) -> SharedState {
        Arc::new(Self {
            config,
            store,
            connections: ConnectionRegistry::new(),
        })
    }

    /// Immutable runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Handle to the persistence gateway.
    pub fn store(&self) -> Arc<dyn QuizStore> {
        self.store.clone()
    }

    /// Registry of live connections keyed by their identifier.
    pub fn connections(&self) -> &ConnectionRegistry {
        &self.connections
    }
}
