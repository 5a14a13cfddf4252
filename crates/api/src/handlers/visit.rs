//! Handlers for the visit lifecycle workflow.
//!
//! Every transition follows the same shape: load the row, check the caller's
//! presented `version` against the stored one, apply the transition through
//! the core engine, and write back under the repository's compare-and-swap.
//! A lost race surfaces as 409 CONFLICT; the caller re-reads and retries.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;

use gatehouse_core::error::CoreError;
use gatehouse_core::policy::resolve_chain;
use gatehouse_core::types::DbId;
use gatehouse_core::workflow::{VisitStatus, VisitType, VisitWorkflow};
use gatehouse_db::models::visit::{
    ApproveRequest, CancelRequest, CheckInRequest, CheckOutRequest, CreateVisitRequest,
    DelegateRequest, NewVisit, RejectRequest, Visit, VisitFilters,
};
use gatehouse_db::repositories::VisitRepo;
use gatehouse_events::VisitEvent;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::middleware::rbac::RequireAuth;
use crate::response::DataResponse;
use crate::state::AppState;
use crate::watchlist::WatchlistError;

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

async fn load_visit(pool: &gatehouse_db::DbPool, id: DbId) -> AppResult<Visit> {
    VisitRepo::find_by_id(pool, id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound { entity: "Visit", id }))
}

/// Reject a request whose presented version is already stale. The CAS write
/// re-checks this, but failing early gives the caller the precise error
/// before any side effect (e.g. the watchlist lookup) runs.
fn ensure_version(visit: &Visit, presented: i32) -> AppResult<()> {
    if visit.version != presented {
        return Err(AppError::Core(CoreError::Conflict(format!(
            "Visit {} is at version {}, caller presented {}; re-read and retry",
            visit.id, visit.version, presented
        ))));
    }
    Ok(())
}

/// Host-scope check for write operations. Distinct from read-side filtering:
/// an out-of-scope writer gets an explicit authorization error.
fn ensure_scope(auth: &AuthUser, visit: &Visit) -> AppResult<()> {
    if !auth.scope().covers(visit.host_id, &visit.host_name) {
        return Err(AppError::Core(CoreError::Forbidden(format!(
            "User {} does not host visit {}",
            auth.user_id, visit.id
        ))));
    }
    Ok(())
}

/// Persist a transition under the version check and return the updated row.
async fn commit(
    state: &AppState,
    visit: &Visit,
    workflow: &VisitWorkflow,
) -> AppResult<Visit> {
    VisitRepo::update_workflow(&state.pool, visit.id, visit.version, workflow)
        .await?
        .ok_or_else(|| {
            AppError::Core(CoreError::Conflict(format!(
                "Visit {} was modified concurrently; re-read and retry",
                visit.id
            )))
        })
}

fn publish(state: &AppState, event_type: &str, visit: &Visit, actor: Option<DbId>) {
    let mut event = VisitEvent::new(event_type, visit.id)
        .with_payload(serde_json::json!({ "status": visit.status.clone() }));
    if let Some(user_id) = actor {
        event = event.with_actor(user_id);
    }
    state.event_bus.publish(event);
}

// ---------------------------------------------------------------------------
// Create / read
// ---------------------------------------------------------------------------

/// POST /api/v1/visits
///
/// Create a visit. The approval policy is resolved from the configuration
/// snapshot; a non-empty chain puts the visit in `pending_approval`,
/// otherwise it is `scheduled` immediately. Non-admin callers may only
/// create visits they host themselves.
pub async fn create_visit(
    RequireAuth(auth): RequireAuth,
    State(state): State<AppState>,
    Json(input): Json<CreateVisitRequest>,
) -> AppResult<impl IntoResponse> {
    let visit_type = VisitType::parse(&input.visit_type).map_err(AppError::Core)?;

    if input.host_name.trim().is_empty() {
        return Err(AppError::Core(CoreError::Validation(
            "host_name is required".into(),
        )));
    }
    if let Some(departure) = input.expected_departure {
        if departure <= input.expected_arrival {
            return Err(AppError::Core(CoreError::Validation(
                "expected_departure must be after expected_arrival".into(),
            )));
        }
    }

    let host_id = if auth.scope() == gatehouse_core::visibility::VisitScope::All {
        input.host_id
    } else {
        match input.host_id {
            Some(id) if id != auth.user_id => {
                return Err(AppError::Core(CoreError::Forbidden(
                    "Employees may only schedule visits they host".into(),
                )));
            }
            _ => Some(auth.user_id),
        }
    };

    let now = Utc::now();
    let chain = resolve_chain(visit_type, input.expected_arrival, host_id, &state.config.policy);
    let workflow = VisitWorkflow::new(chain, now);

    let new_visit = NewVisit {
        visitor_id: input.visitor_id,
        host_id,
        host_name: input.host_name,
        location_id: input.location_id,
        visit_type: visit_type.as_str().to_string(),
        status: workflow.status.as_str().to_string(),
        expected_arrival: input.expected_arrival,
        expected_departure: input.expected_departure,
        approval_chain: workflow.chain,
    };
    let visit = VisitRepo::create(&state.pool, &new_visit).await?;

    tracing::info!(
        user_id = auth.user_id,
        visit_id = visit.id,
        visit_type = %visit.visit_type,
        status = %visit.status,
        chain_len = visit.approval_chain.0.len(),
        "Visit created"
    );
    publish(&state, "visit.created", &visit, Some(auth.user_id));

    Ok((StatusCode::CREATED, Json(DataResponse { data: visit })))
}

/// GET /api/v1/visits
///
/// List visits inside the caller's visibility scope, with optional status
/// and type filters plus pagination.
pub async fn list_visits(
    RequireAuth(auth): RequireAuth,
    State(state): State<AppState>,
    Query(filters): Query<VisitFilters>,
) -> AppResult<impl IntoResponse> {
    if let Some(status) = &filters.status {
        if VisitStatus::parse(status).is_err() {
            return Err(AppError::Core(CoreError::Validation(format!(
                "Unknown status filter '{status}'"
            ))));
        }
    }
    if let Some(visit_type) = &filters.visit_type {
        VisitType::parse(visit_type).map_err(AppError::Core)?;
    }

    let visits = VisitRepo::list(&state.pool, &auth.scope(), &filters).await?;
    Ok(Json(DataResponse { data: visits }))
}

/// GET /api/v1/visits/{id}
///
/// Fetch a single visit. An out-of-scope id reads as not-found, matching
/// the list filter's semantics (reads filter; writes reject).
pub async fn get_visit(
    RequireAuth(auth): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let visit = load_visit(&state.pool, id).await?;
    if !auth.scope().covers(visit.host_id, &visit.host_name) {
        return Err(AppError::Core(CoreError::NotFound { entity: "Visit", id }));
    }
    Ok(Json(DataResponse { data: visit }))
}

// ---------------------------------------------------------------------------
// Approval transitions
// ---------------------------------------------------------------------------

/// POST /api/v1/visits/{id}/approve
///
/// Approve the pending step. Only the step's assigned approver (or an admin)
/// may act; the engine answers anyone else with 403, not a state error.
pub async fn approve_visit(
    RequireAuth(auth): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<ApproveRequest>,
) -> AppResult<impl IntoResponse> {
    let visit = load_visit(&state.pool, id).await?;
    ensure_version(&visit, input.version)?;

    let mut workflow = visit.workflow()?;
    workflow.approve(&auth.actor(), input.comment, Utc::now())?;

    let updated = commit(&state, &visit, &workflow).await?;

    tracing::info!(
        user_id = auth.user_id,
        visit_id = id,
        status = %updated.status,
        "Visit approval step accepted"
    );
    publish(&state, "visit.approved", &updated, Some(auth.user_id));

    Ok(Json(DataResponse { data: updated }))
}

/// POST /api/v1/visits/{id}/reject
///
/// Reject the pending step. Terminal; requires a non-empty reason.
pub async fn reject_visit(
    RequireAuth(auth): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<RejectRequest>,
) -> AppResult<impl IntoResponse> {
    let visit = load_visit(&state.pool, id).await?;
    ensure_version(&visit, input.version)?;

    let mut workflow = visit.workflow()?;
    workflow.reject(&auth.actor(), &input.reason, Utc::now())?;

    let updated = commit(&state, &visit, &workflow).await?;

    tracing::info!(user_id = auth.user_id, visit_id = id, "Visit rejected");
    publish(&state, "visit.rejected", &updated, Some(auth.user_id));

    Ok(Json(DataResponse { data: updated }))
}

/// POST /api/v1/visits/{id}/delegate
///
/// Reassign the pending step to another user without advancing the chain.
pub async fn delegate_visit(
    RequireAuth(auth): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<DelegateRequest>,
) -> AppResult<impl IntoResponse> {
    let visit = load_visit(&state.pool, id).await?;
    ensure_version(&visit, input.version)?;

    let mut workflow = visit.workflow()?;
    workflow.delegate(&auth.actor(), input.to_user_id, input.reason, Utc::now())?;

    let updated = commit(&state, &visit, &workflow).await?;

    tracing::info!(
        user_id = auth.user_id,
        visit_id = id,
        to_user_id = input.to_user_id,
        "Visit approval step delegated"
    );
    publish(&state, "visit.delegated", &updated, Some(auth.user_id));

    Ok(Json(DataResponse { data: updated }))
}

// ---------------------------------------------------------------------------
// Presence transitions
// ---------------------------------------------------------------------------

/// POST /api/v1/visits/{id}/check-in
///
/// Check the visitor in. Consults the watchlist service first and fails
/// closed when it is unreachable — the check has a compliance purpose and
/// must not be silently skipped.
pub async fn check_in_visit(
    RequireAuth(auth): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<CheckInRequest>,
) -> AppResult<impl IntoResponse> {
    let visit = load_visit(&state.pool, id).await?;
    ensure_scope(&auth, &visit)?;
    ensure_version(&visit, input.version)?;

    let listed = state
        .watchlist
        .is_listed(visit.visitor_id)
        .await
        .map_err(|e: WatchlistError| AppError::Dependency(e.to_string()))?;
    if listed {
        tracing::warn!(
            visit_id = id,
            visitor_id = visit.visitor_id,
            "Check-in denied: visitor is on the watchlist"
        );
        return Err(AppError::WatchlistDenied(format!(
            "Visitor {} is on the watchlist",
            visit.visitor_id
        )));
    }

    let mut workflow = visit.workflow()?;
    workflow.check_in(&input.method, Utc::now())?;

    let updated = commit(&state, &visit, &workflow).await?;

    tracing::info!(
        user_id = auth.user_id,
        visit_id = id,
        method = %input.method,
        "Visitor checked in"
    );
    publish(&state, "visit.checked_in", &updated, Some(auth.user_id));

    Ok(Json(DataResponse { data: updated }))
}

/// POST /api/v1/visits/{id}/check-out
pub async fn check_out_visit(
    RequireAuth(auth): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<CheckOutRequest>,
) -> AppResult<impl IntoResponse> {
    let visit = load_visit(&state.pool, id).await?;
    ensure_scope(&auth, &visit)?;
    ensure_version(&visit, input.version)?;

    let mut workflow = visit.workflow()?;
    workflow.check_out(Utc::now())?;

    let updated = commit(&state, &visit, &workflow).await?;

    tracing::info!(user_id = auth.user_id, visit_id = id, "Visitor checked out");
    publish(&state, "visit.checked_out", &updated, Some(auth.user_id));

    Ok(Json(DataResponse { data: updated }))
}

/// POST /api/v1/visits/{id}/cancel
///
/// Cancel a visit that has not started. Not permitted once the visitor is
/// on site.
pub async fn cancel_visit(
    RequireAuth(auth): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<CancelRequest>,
) -> AppResult<impl IntoResponse> {
    let visit = load_visit(&state.pool, id).await?;
    ensure_scope(&auth, &visit)?;
    ensure_version(&visit, input.version)?;

    let mut workflow = visit.workflow()?;
    workflow.cancel(input.reason)?;

    let updated = commit(&state, &visit, &workflow).await?;

    tracing::info!(user_id = auth.user_id, visit_id = id, "Visit cancelled");
    publish(&state, "visit.cancelled", &updated, Some(auth.user_id));

    Ok(Json(DataResponse { data: updated }))
}
