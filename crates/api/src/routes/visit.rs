//! Visit lifecycle routes.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::visit;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/visits", post(visit::create_visit).get(visit::list_visits))
        .route("/visits/{id}", get(visit::get_visit))
        .route("/visits/{id}/approve", post(visit::approve_visit))
        .route("/visits/{id}/reject", post(visit::reject_visit))
        .route("/visits/{id}/delegate", post(visit::delegate_visit))
        .route("/visits/{id}/check-in", post(visit::check_in_visit))
        .route("/visits/{id}/check-out", post(visit::check_out_visit))
        .route("/visits/{id}/cancel", post(visit::cancel_visit))
}
