use std::sync::Arc;

use clinic_dispatch::{CampaignEngine, Orchestrator};

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable: everything is behind an `Arc` or already `Clone`.
#[derive(Clone)]
pub struct AppState {
    /// Database pool. `None` when the engine runs on the in-memory store.
    pub pool: Option<clinic_db::DbPool>,
    pub config: Arc<ServerConfig>,
    /// Campaign lifecycle and batch dispatch.
    pub engine: Arc<CampaignEngine>,
    /// Server-side campaign drivers.
    pub orchestrator: Arc<Orchestrator>,
}
