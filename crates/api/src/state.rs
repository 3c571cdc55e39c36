use std::sync::Arc;

use agency_engine::Engine;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via
/// `State<AppState>`. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub engine: Engine,
    /// Present when the engine runs on PostgreSQL; the health check pings it.
    pub pool: Option<agency_db::DbPool>,
}
