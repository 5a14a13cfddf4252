//! Periodic sweep for time-triggered visit transitions.
//!
//! Two passes per tick, both through the same version-checked repository
//! entry point the HTTP handlers use:
//!
//! - **Auto-checkout**: visitors on site longer than `auto_checkout_hours`
//!   are checked out, with `actual_departure` set to the configured boundary
//!   (`actual_arrival + hours`), not the sweep time.
//! - **Escalation**: approval steps pending longer than
//!   `approval_timeout_hours` are skipped in favour of the configured
//!   escalation approver, or flagged stale when none is configured.
//!
//! A manual transition racing the sweep costs the sweep its CAS write; the
//! conflict is logged at debug and discarded since the desired end state was
//! reached either way. One visit's error never halts the sweep for others,
//! and re-running the sweep immediately double-applies nothing (every pass
//! re-reads current state and version).

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use gatehouse_core::policy::PolicyConfig;
use gatehouse_core::workflow::EscalationOutcome;
use gatehouse_db::models::visit::Visit;
use gatehouse_db::repositories::VisitRepo;
use gatehouse_db::DbPool;
use gatehouse_events::{EventBus, VisitEvent};

/// Run the visit sweep loop until `cancel` is triggered.
pub async fn run(
    pool: DbPool,
    policy: PolicyConfig,
    event_bus: Arc<EventBus>,
    interval_secs: u64,
    cancel: CancellationToken,
) {
    tracing::info!(
        interval_secs,
        auto_checkout_hours = policy.auto_checkout_hours,
        approval_timeout_hours = policy.approval_timeout_hours,
        escalation_configured = policy.escalation_approver.is_some(),
        "Visit sweep started"
    );

    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Visit sweep stopping");
                break;
            }
            _ = interval.tick() => {
                sweep_once(&pool, &policy, &event_bus).await;
            }
        }
    }
}

/// One full sweep pass. Public for tests and for one-shot maintenance runs.
pub async fn sweep_once(pool: &DbPool, policy: &PolicyConfig, event_bus: &EventBus) {
    auto_checkout_pass(pool, policy, event_bus).await;
    escalation_pass(pool, policy, event_bus).await;
}

async fn auto_checkout_pass(pool: &DbPool, policy: &PolicyConfig, event_bus: &EventBus) {
    let cutoff = Utc::now() - chrono::Duration::hours(policy.auto_checkout_hours);
    let overdue = match VisitRepo::list_checked_in_before(pool, cutoff).await {
        Ok(rows) => rows,
        Err(e) => {
            tracing::error!(error = %e, "Auto-checkout: failed to list overdue visits");
            return;
        }
    };

    for visit in overdue {
        if let Err(e) = auto_check_out(pool, policy, event_bus, &visit).await {
            tracing::error!(visit_id = visit.id, error = %e, "Auto-checkout failed");
        }
    }
}

async fn auto_check_out(
    pool: &DbPool,
    policy: &PolicyConfig,
    event_bus: &EventBus,
    visit: &Visit,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut workflow = visit.workflow()?;
    let departure = workflow.auto_check_out(policy.auto_checkout_hours)?;

    match VisitRepo::update_workflow(pool, visit.id, visit.version, &workflow).await? {
        Some(updated) => {
            tracing::info!(visit_id = updated.id, "Visitor auto-checked out");
            event_bus.publish(
                VisitEvent::new("visit.auto_checked_out", updated.id)
                    .with_payload(serde_json::json!({ "departure": departure })),
            );
        }
        None => {
            // A manual check-out (or other transition) won the race.
            tracing::debug!(visit_id = visit.id, "Auto-checkout lost a version race, skipping");
        }
    }
    Ok(())
}

async fn escalation_pass(pool: &DbPool, policy: &PolicyConfig, event_bus: &EventBus) {
    let pending = match VisitRepo::list_pending_approval(pool).await {
        Ok(rows) => rows,
        Err(e) => {
            tracing::error!(error = %e, "Escalation: failed to list pending visits");
            return;
        }
    };

    let now = Utc::now();
    for visit in pending {
        if let Err(e) = escalate_if_overdue(pool, policy, event_bus, &visit, now).await {
            tracing::error!(visit_id = visit.id, error = %e, "Escalation failed");
        }
    }
}

async fn escalate_if_overdue(
    pool: &DbPool,
    policy: &PolicyConfig,
    event_bus: &EventBus,
    visit: &Visit,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut workflow = visit.workflow()?;
    if !workflow.approval_overdue(now, policy.approval_timeout_hours) {
        return Ok(());
    }
    // Already flagged on a previous sweep and still without a target:
    // nothing new to record.
    if visit.approval_stale && policy.escalation_approver.is_none() {
        return Ok(());
    }

    let outcome = workflow.escalate(policy.escalation_approver.as_ref(), now)?;
    if outcome == EscalationOutcome::FlaggedStale && visit.approval_stale {
        return Ok(());
    }

    match VisitRepo::update_workflow(pool, visit.id, visit.version, &workflow).await? {
        Some(updated) => match outcome {
            EscalationOutcome::Escalated => {
                tracing::info!(visit_id = updated.id, "Approval step escalated");
                event_bus.publish(VisitEvent::new("visit.approval_escalated", updated.id));
            }
            EscalationOutcome::FlaggedStale => {
                tracing::warn!(
                    visit_id = updated.id,
                    "Approval overdue with no escalation target; flagged stale"
                );
                event_bus.publish(VisitEvent::new("visit.approval_stale", updated.id));
            }
        },
        None => {
            // An approver acted while the sweep was evaluating this visit.
            tracing::debug!(visit_id = visit.id, "Escalation lost a version race, skipping");
        }
    }
    Ok(())
}
