//! Repository for the `visits` table.
//!
//! Every state transition funnels through [`VisitRepo::update_workflow`], a
//! compare-and-swap on the row's `version`. Handlers and the background sweep
//! both use this single entry point, which is what guarantees at-most-one
//! winning transition when they race.

use sqlx::types::Json;
use sqlx::PgPool;

use gatehouse_core::types::{DbId, Timestamp};
use gatehouse_core::visibility::VisitScope;
use gatehouse_core::workflow::{VisitStatus, VisitWorkflow};

use crate::models::visit::{NewVisit, Visit, VisitFilters};

/// Column list for visits queries.
const COLUMNS: &str = "id, visitor_id, host_id, host_name, location_id, visit_type, status, \
    expected_arrival, expected_departure, actual_arrival, actual_departure, \
    check_in_method, cancellation_reason, approval_chain, approval_stale, \
    version, created_at, updated_at";

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 200;

fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

fn clamp_offset(offset: Option<i64>) -> i64 {
    offset.unwrap_or(0).max(0)
}

/// Provides persistence operations for visits.
pub struct VisitRepo;

impl VisitRepo {
    /// Insert a new visit, returning the created row.
    pub async fn create(pool: &PgPool, input: &NewVisit) -> Result<Visit, sqlx::Error> {
        let query = format!(
            "INSERT INTO visits
                (visitor_id, host_id, host_name, location_id, visit_type, status,
                 expected_arrival, expected_departure, approval_chain)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Visit>(&query)
            .bind(input.visitor_id)
            .bind(input.host_id)
            .bind(&input.host_name)
            .bind(input.location_id)
            .bind(&input.visit_type)
            .bind(&input.status)
            .bind(input.expected_arrival)
            .bind(input.expected_departure)
            .bind(Json(&input.approval_chain))
            .fetch_one(pool)
            .await
    }

    /// Find a visit by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Visit>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM visits WHERE id = $1");
        sqlx::query_as::<_, Visit>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List visits inside the caller's scope, newest expected arrival first.
    ///
    /// The host scope matches by `host_id`; the display-name clause only
    /// applies to rows without an identity linkage.
    pub async fn list(
        pool: &PgPool,
        scope: &VisitScope,
        filters: &VisitFilters,
    ) -> Result<Vec<Visit>, sqlx::Error> {
        let (scope_user, scope_name): (Option<DbId>, Option<&str>) = match scope {
            VisitScope::All => (None, None),
            VisitScope::Host {
                user_id,
                display_name,
            } => (Some(*user_id), Some(display_name.as_str())),
        };

        let query = format!(
            "SELECT {COLUMNS} FROM visits
             WHERE ($1::bigint IS NULL
                    OR host_id = $1
                    OR (host_id IS NULL AND host_name = $2))
               AND ($3::text IS NULL OR status = $3)
               AND ($4::text IS NULL OR visit_type = $4)
             ORDER BY expected_arrival DESC
             LIMIT $5 OFFSET $6"
        );
        sqlx::query_as::<_, Visit>(&query)
            .bind(scope_user)
            .bind(scope_name)
            .bind(&filters.status)
            .bind(&filters.visit_type)
            .bind(clamp_limit(filters.limit))
            .bind(clamp_offset(filters.offset))
            .fetch_all(pool)
            .await
    }

    /// Apply one workflow transition under a version check.
    ///
    /// Returns the updated row, or `None` when the stored version no longer
    /// matches `expected_version` (the caller lost a race and must re-read).
    pub async fn update_workflow(
        pool: &PgPool,
        id: DbId,
        expected_version: i32,
        workflow: &VisitWorkflow,
    ) -> Result<Option<Visit>, sqlx::Error> {
        let query = format!(
            "UPDATE visits SET
                status              = $1,
                approval_chain      = $2,
                actual_arrival      = $3,
                actual_departure    = $4,
                check_in_method     = $5,
                cancellation_reason = $6,
                approval_stale      = $7,
                version             = version + 1,
                updated_at          = now()
             WHERE id = $8 AND version = $9
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Visit>(&query)
            .bind(workflow.status.as_str())
            .bind(Json(&workflow.chain))
            .bind(workflow.actual_arrival)
            .bind(workflow.actual_departure)
            .bind(&workflow.check_in_method)
            .bind(&workflow.cancellation_reason)
            .bind(workflow.approval_stale)
            .bind(id)
            .bind(expected_version)
            .fetch_optional(pool)
            .await
    }

    /// Visits still on site whose arrival is at or before `cutoff`.
    /// Sweep input for auto-checkout.
    pub async fn list_checked_in_before(
        pool: &PgPool,
        cutoff: Timestamp,
    ) -> Result<Vec<Visit>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM visits
             WHERE status = $1 AND actual_arrival <= $2
             ORDER BY actual_arrival ASC"
        );
        sqlx::query_as::<_, Visit>(&query)
            .bind(VisitStatus::CheckedIn.as_str())
            .bind(cutoff)
            .fetch_all(pool)
            .await
    }

    /// All visits awaiting approval. The sweep evaluates per-step timeouts
    /// in the engine (the deadline lives inside the JSONB chain).
    pub async fn list_pending_approval(pool: &PgPool) -> Result<Vec<Visit>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM visits
             WHERE status = $1
             ORDER BY created_at ASC"
        );
        sqlx::query_as::<_, Visit>(&query)
            .bind(VisitStatus::PendingApproval.as_str())
            .fetch_all(pool)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_is_clamped_into_range() {
        assert_eq!(clamp_limit(None), DEFAULT_LIMIT);
        assert_eq!(clamp_limit(Some(0)), 1);
        assert_eq!(clamp_limit(Some(10_000)), MAX_LIMIT);
    }

    #[test]
    fn offset_never_goes_negative() {
        assert_eq!(clamp_offset(None), 0);
        assert_eq!(clamp_offset(Some(-5)), 0);
        assert_eq!(clamp_offset(Some(30)), 30);
    }
}
