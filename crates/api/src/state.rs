use std::sync::Arc;

use crate::config::ServerConfig;
use crate::watchlist::WatchlistClient;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: gatehouse_db::DbPool,
    /// Server and policy configuration.
    pub config: Arc<ServerConfig>,
    /// Event bus for publishing visit transitions.
    pub event_bus: Arc<gatehouse_events::EventBus>,
    /// Watchlist service consulted on check-in.
    pub watchlist: Arc<dyn WatchlistClient>,
}
