//! Visit row model and transition request DTOs.

use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;

use gatehouse_core::error::CoreError;
use gatehouse_core::types::{DbId, Timestamp};
use gatehouse_core::workflow::{ApprovalStep, VisitStatus, VisitWorkflow};

/// A row from the `visits` table.
///
/// `status` and `visit_type` are stored as text; the workflow engine owns the
/// vocabulary and the conversion via [`Visit::workflow`].
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Visit {
    pub id: DbId,
    pub visitor_id: DbId,
    pub host_id: Option<DbId>,
    pub host_name: String,
    pub location_id: Option<DbId>,
    pub visit_type: String,
    pub status: String,
    pub expected_arrival: Timestamp,
    pub expected_departure: Option<Timestamp>,
    pub actual_arrival: Option<Timestamp>,
    pub actual_departure: Option<Timestamp>,
    pub check_in_method: Option<String>,
    pub cancellation_reason: Option<String>,
    pub approval_chain: Json<Vec<ApprovalStep>>,
    pub approval_stale: bool,
    pub version: i32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Visit {
    /// Lift the mutable workflow portion of this row into the core engine.
    pub fn workflow(&self) -> Result<VisitWorkflow, CoreError> {
        Ok(VisitWorkflow {
            status: VisitStatus::parse(&self.status)?,
            chain: self.approval_chain.0.clone(),
            actual_arrival: self.actual_arrival,
            actual_departure: self.actual_departure,
            check_in_method: self.check_in_method.clone(),
            cancellation_reason: self.cancellation_reason.clone(),
            approval_stale: self.approval_stale,
        })
    }
}

/// Insert payload for a new visit, built by the create handler after the
/// approval chain has been resolved.
#[derive(Debug, Clone)]
pub struct NewVisit {
    pub visitor_id: DbId,
    pub host_id: Option<DbId>,
    pub host_name: String,
    pub location_id: Option<DbId>,
    pub visit_type: String,
    pub status: String,
    pub expected_arrival: Timestamp,
    pub expected_departure: Option<Timestamp>,
    pub approval_chain: Vec<ApprovalStep>,
}

/// Request body for creating a visit.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateVisitRequest {
    pub visitor_id: DbId,
    pub host_id: Option<DbId>,
    pub host_name: String,
    pub location_id: Option<DbId>,
    pub visit_type: String,
    pub expected_arrival: Timestamp,
    pub expected_departure: Option<Timestamp>,
}

/// Request body for the approve endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ApproveRequest {
    pub version: i32,
    pub comment: Option<String>,
}

/// Request body for the reject endpoint. The reason is mandatory and
/// validated by the engine.
#[derive(Debug, Clone, Deserialize)]
pub struct RejectRequest {
    pub version: i32,
    pub reason: String,
}

/// Request body for the delegate endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct DelegateRequest {
    pub version: i32,
    pub to_user_id: DbId,
    pub reason: Option<String>,
}

/// Request body for the check-in endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckInRequest {
    pub version: i32,
    /// Free-form tag describing how check-in occurred (`manual`,
    /// `biometric`, kiosk identifiers, ...).
    pub method: String,
}

/// Request body for the check-out endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckOutRequest {
    pub version: i32,
}

/// Request body for the cancel endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct CancelRequest {
    pub version: i32,
    pub reason: Option<String>,
}

/// Optional filters for visit list queries, on top of visibility scoping.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VisitFilters {
    pub status: Option<String>,
    pub visit_type: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}
