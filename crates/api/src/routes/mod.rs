//! Route definitions.
//!
//! [`api_routes`] assembles every `/api/v1` route group; `main.rs` and the
//! integration tests both consume it so the wiring is exercised once.

pub mod health;
pub mod visit;

use axum::Router;

use crate::state::AppState;

/// All routes mounted under `/api/v1`.
pub fn api_routes() -> Router<AppState> {
    Router::new().merge(visit::router())
}
