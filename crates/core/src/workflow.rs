//! Visit lifecycle state machine.
//!
//! This module lives in `core` (zero internal deps) so the same transition
//! entry points are shared by the HTTP handlers and the background sweep.
//! Every method takes `now` and the acting identity explicitly, which keeps
//! the engine deterministic and unit-testable without a clock or a database.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::roles::ROLE_ADMIN;
use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Status and type vocabularies
// ---------------------------------------------------------------------------

/// Lifecycle status of a visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisitStatus {
    PendingApproval,
    Scheduled,
    CheckedIn,
    CheckedOut,
    Rejected,
    Cancelled,
}

impl VisitStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VisitStatus::PendingApproval => "pending_approval",
            VisitStatus::Scheduled => "scheduled",
            VisitStatus::CheckedIn => "checked_in",
            VisitStatus::CheckedOut => "checked_out",
            VisitStatus::Rejected => "rejected",
            VisitStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "pending_approval" => Ok(VisitStatus::PendingApproval),
            "scheduled" => Ok(VisitStatus::Scheduled),
            "checked_in" => Ok(VisitStatus::CheckedIn),
            "checked_out" => Ok(VisitStatus::CheckedOut),
            "rejected" => Ok(VisitStatus::Rejected),
            "cancelled" => Ok(VisitStatus::Cancelled),
            other => Err(CoreError::Internal(format!("Unknown visit status '{other}'"))),
        }
    }

    /// Terminal statuses admit no further transition.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            VisitStatus::CheckedOut | VisitStatus::Rejected | VisitStatus::Cancelled
        )
    }
}

/// Category of a visit. Drives approval-chain selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisitType {
    General,
    Meeting,
    Interview,
    Delivery,
    Contractor,
    Vip,
    Maintenance,
}

impl VisitType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VisitType::General => "general",
            VisitType::Meeting => "meeting",
            VisitType::Interview => "interview",
            VisitType::Delivery => "delivery",
            VisitType::Contractor => "contractor",
            VisitType::Vip => "vip",
            VisitType::Maintenance => "maintenance",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "general" => Ok(VisitType::General),
            "meeting" => Ok(VisitType::Meeting),
            "interview" => Ok(VisitType::Interview),
            "delivery" => Ok(VisitType::Delivery),
            "contractor" => Ok(VisitType::Contractor),
            "vip" => Ok(VisitType::Vip),
            "maintenance" => Ok(VisitType::Maintenance),
            other => Err(CoreError::Validation(format!("Unknown visit type '{other}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Approval chain
// ---------------------------------------------------------------------------

/// The identity responsible for an approval step: either a specific user or
/// a role resolved at action time (the actor's JWT role must match).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Approver {
    User { id: DbId },
    Role { name: String },
}

impl Approver {
    pub fn role(name: impl Into<String>) -> Self {
        Approver::Role { name: name.into() }
    }

    pub fn user(id: DbId) -> Self {
        Approver::User { id }
    }
}

/// Status of a single approval step.
///
/// `Queued` marks steps not yet reached, so a chain has at most one step in
/// `Pending`/`Delegated` at any time. A `Delegated` step is still the active
/// step; it has merely been reassigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Queued,
    Pending,
    Approved,
    Rejected,
    Delegated,
    Skipped,
}

/// One link in a visit's approval chain. Stored as JSONB on the visit row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalStep {
    pub approver: Approver,
    pub status: StepStatus,
    /// When the step became the active one. Reset on delegation so the
    /// escalation timeout measures time on the current assignee's desk.
    #[serde(default)]
    pub pending_since: Option<Timestamp>,
    #[serde(default)]
    pub acted_by: Option<DbId>,
    #[serde(default)]
    pub acted_at: Option<Timestamp>,
    #[serde(default)]
    pub comment: Option<String>,
    /// Audit link recorded on delegation. The step itself is reassigned, not
    /// replaced.
    #[serde(default)]
    pub delegated_to: Option<DbId>,
}

impl ApprovalStep {
    /// A fresh, not-yet-reached step for the given approver.
    pub fn queued(approver: Approver) -> Self {
        Self {
            approver,
            status: StepStatus::Queued,
            pending_since: None,
            acted_by: None,
            acted_at: None,
            comment: None,
            delegated_to: None,
        }
    }

    /// Whether this step is the one currently awaiting a decision.
    pub fn is_active(&self) -> bool {
        matches!(self.status, StepStatus::Pending | StepStatus::Delegated)
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

/// The authenticated identity attempting a transition.
#[derive(Debug, Clone)]
pub struct Actor {
    pub user_id: DbId,
    pub role: String,
}

impl Actor {
    pub fn is_admin(&self) -> bool {
        self.role == ROLE_ADMIN
    }
}

// ---------------------------------------------------------------------------
// Workflow engine
// ---------------------------------------------------------------------------

/// Outcome of an escalation attempt by the background sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationOutcome {
    /// The active step was skipped and the escalation approver promoted.
    Escalated,
    /// No usable escalation target; the visit was flagged stale instead.
    FlaggedStale,
}

/// The mutable workflow portion of a visit.
///
/// The DB layer converts a `visits` row into this struct, applies exactly one
/// transition, and writes the result back under a version check. All state
/// validation lives here; the repository only does the compare-and-swap.
#[derive(Debug, Clone)]
pub struct VisitWorkflow {
    pub status: VisitStatus,
    pub chain: Vec<ApprovalStep>,
    pub actual_arrival: Option<Timestamp>,
    pub actual_departure: Option<Timestamp>,
    pub check_in_method: Option<String>,
    pub cancellation_reason: Option<String>,
    /// Set by the sweep when an approval timed out with no escalation target.
    pub approval_stale: bool,
}

impl VisitWorkflow {
    /// Initialize the workflow for a newly created visit.
    ///
    /// A non-empty chain puts the visit in `PendingApproval` with the first
    /// step promoted to `Pending`; an empty chain schedules it immediately.
    pub fn new(mut chain: Vec<ApprovalStep>, now: Timestamp) -> Self {
        let status = if chain.is_empty() {
            VisitStatus::Scheduled
        } else {
            chain[0].status = StepStatus::Pending;
            chain[0].pending_since = Some(now);
            VisitStatus::PendingApproval
        };
        Self {
            status,
            chain,
            actual_arrival: None,
            actual_departure: None,
            check_in_method: None,
            cancellation_reason: None,
            approval_stale: false,
        }
    }

    /// Index of the step currently awaiting a decision, if any.
    pub fn active_step_index(&self) -> Option<usize> {
        self.chain.iter().position(|s| s.is_active())
    }

    fn active_step_mut(&mut self) -> Result<(usize, &mut ApprovalStep), CoreError> {
        let idx = self.active_step_index().ok_or_else(|| {
            CoreError::Internal("Visit is pending approval but has no active step".into())
        })?;
        Ok((idx, &mut self.chain[idx]))
    }

    /// Whether `actor` may decide the currently active step.
    ///
    /// Admins may always act; otherwise the actor must match the step's
    /// approver (by user id, or by role name for role-addressed steps).
    pub fn may_act_on_step(&self, actor: &Actor) -> bool {
        if actor.is_admin() {
            return true;
        }
        let Some(idx) = self.active_step_index() else {
            return false;
        };
        match &self.chain[idx].approver {
            Approver::User { id } => *id == actor.user_id,
            Approver::Role { name } => *name == actor.role,
        }
    }

    fn require_status(&self, expected: VisitStatus, op: &str) -> Result<(), CoreError> {
        if self.status != expected {
            return Err(CoreError::InvalidState(format!(
                "Cannot {op} a visit in status '{}'",
                self.status.as_str()
            )));
        }
        Ok(())
    }

    fn require_approver(&self, actor: &Actor, op: &str) -> Result<(), CoreError> {
        if !self.may_act_on_step(actor) {
            return Err(CoreError::Forbidden(format!(
                "User {} is not the pending approver for this visit and may not {op}",
                actor.user_id
            )));
        }
        Ok(())
    }

    /// Approve the active step. Advances to the next queued step, or to
    /// `Scheduled` when the chain is exhausted.
    pub fn approve(
        &mut self,
        actor: &Actor,
        comment: Option<String>,
        now: Timestamp,
    ) -> Result<(), CoreError> {
        self.require_status(VisitStatus::PendingApproval, "approve")?;
        self.require_approver(actor, "approve")?;

        let (idx, step) = self.active_step_mut()?;
        step.status = StepStatus::Approved;
        step.acted_by = Some(actor.user_id);
        step.acted_at = Some(now);
        step.comment = comment;
        self.approval_stale = false;

        match self.chain.get_mut(idx + 1) {
            Some(next) => {
                next.status = StepStatus::Pending;
                next.pending_since = Some(now);
            }
            None => self.status = VisitStatus::Scheduled,
        }
        Ok(())
    }

    /// Reject the active step. Terminal; a non-empty reason is required.
    pub fn reject(&mut self, actor: &Actor, reason: &str, now: Timestamp) -> Result<(), CoreError> {
        self.require_status(VisitStatus::PendingApproval, "reject")?;
        self.require_approver(actor, "reject")?;
        if reason.trim().is_empty() {
            return Err(CoreError::Validation("A rejection reason is required".into()));
        }

        let (_, step) = self.active_step_mut()?;
        step.status = StepStatus::Rejected;
        step.acted_by = Some(actor.user_id);
        step.acted_at = Some(now);
        step.comment = Some(reason.to_string());
        self.status = VisitStatus::Rejected;
        Ok(())
    }

    /// Reassign the active step to another user without advancing the chain.
    pub fn delegate(
        &mut self,
        actor: &Actor,
        to_user_id: DbId,
        reason: Option<String>,
        now: Timestamp,
    ) -> Result<(), CoreError> {
        self.require_status(VisitStatus::PendingApproval, "delegate")?;
        self.require_approver(actor, "delegate")?;

        let (_, step) = self.active_step_mut()?;
        if step.approver == Approver::user(to_user_id) {
            return Err(CoreError::Validation(format!(
                "Step is already assigned to user {to_user_id}"
            )));
        }
        step.status = StepStatus::Delegated;
        step.approver = Approver::user(to_user_id);
        step.delegated_to = Some(to_user_id);
        step.acted_by = Some(actor.user_id);
        step.acted_at = Some(now);
        step.comment = reason;
        step.pending_since = Some(now);
        Ok(())
    }

    /// Check the visitor in. Allowed only from `Scheduled`.
    pub fn check_in(&mut self, method: &str, now: Timestamp) -> Result<(), CoreError> {
        self.require_status(VisitStatus::Scheduled, "check in")?;
        if method.trim().is_empty() {
            return Err(CoreError::Validation("A check-in method is required".into()));
        }
        self.status = VisitStatus::CheckedIn;
        self.actual_arrival = Some(now);
        self.check_in_method = Some(method.to_string());
        Ok(())
    }

    /// Check the visitor out. `departure_at` is `now` for manual checkout and
    /// the configured boundary (`arrival + auto_checkout_hours`) for the
    /// sweep, so both triggers leave an identical audit trail shape.
    pub fn check_out(&mut self, departure_at: Timestamp) -> Result<(), CoreError> {
        self.require_status(VisitStatus::CheckedIn, "check out")?;
        self.status = VisitStatus::CheckedOut;
        self.actual_departure = Some(departure_at);
        Ok(())
    }

    /// Check the visitor out at the end of the allowed stay:
    /// `actual_arrival + auto_checkout_hours`, regardless of when the
    /// overstay is noticed. Returns the departure timestamp recorded.
    pub fn auto_check_out(&mut self, auto_checkout_hours: i64) -> Result<Timestamp, CoreError> {
        self.require_status(VisitStatus::CheckedIn, "auto check out")?;
        let arrival = self.actual_arrival.ok_or_else(|| {
            CoreError::Internal("Checked-in visit without actual_arrival".into())
        })?;
        let departure = arrival + Duration::hours(auto_checkout_hours);
        self.check_out(departure)?;
        Ok(departure)
    }

    /// Cancel the visit. Not permitted once the visitor is on site.
    pub fn cancel(&mut self, reason: Option<String>) -> Result<(), CoreError> {
        match self.status {
            VisitStatus::PendingApproval | VisitStatus::Scheduled => {
                self.status = VisitStatus::Cancelled;
                self.cancellation_reason = reason;
                Ok(())
            }
            other => Err(CoreError::InvalidState(format!(
                "Cannot cancel a visit in status '{}'",
                other.as_str()
            ))),
        }
    }

    /// Whether the active step has sat with its assignee longer than
    /// `timeout_hours`. Used by the sweep to select escalation candidates.
    pub fn approval_overdue(&self, now: Timestamp, timeout_hours: i64) -> bool {
        if self.status != VisitStatus::PendingApproval {
            return false;
        }
        let Some(idx) = self.active_step_index() else {
            return false;
        };
        match self.chain[idx].pending_since {
            Some(since) => now - since >= Duration::hours(timeout_hours),
            None => false,
        }
    }

    /// Escalate a timed-out step: mark it `Skipped` with a system note and
    /// promote `target` as the new pending step.
    ///
    /// When no target is given, or the stalled step is already held by the
    /// target, the visit is flagged stale instead — never auto-rejected.
    pub fn escalate(
        &mut self,
        target: Option<&Approver>,
        now: Timestamp,
    ) -> Result<EscalationOutcome, CoreError> {
        self.require_status(VisitStatus::PendingApproval, "escalate")?;
        let (idx, _) = self.active_step_mut()?;

        let target = match target {
            Some(t) if *t != self.chain[idx].approver => t.clone(),
            _ => {
                self.approval_stale = true;
                return Ok(EscalationOutcome::FlaggedStale);
            }
        };

        let step = &mut self.chain[idx];
        step.status = StepStatus::Skipped;
        step.acted_at = Some(now);
        step.comment = Some("Skipped by escalation after approval timeout".to_string());

        let mut escalated = ApprovalStep::queued(target);
        escalated.status = StepStatus::Pending;
        escalated.pending_since = Some(now);
        self.chain.insert(idx + 1, escalated);
        self.approval_stale = false;
        Ok(EscalationOutcome::Escalated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roles::{APPROVER_HOST_MANAGER, APPROVER_SECURITY, ROLE_EMPLOYEE};
    use assert_matches::assert_matches;
    use chrono::{Duration, TimeZone, Utc};

    fn t0() -> Timestamp {
        Utc.with_ymd_and_hms(2026, 3, 10, 14, 0, 0).unwrap()
    }

    fn host() -> Actor {
        Actor {
            user_id: 11,
            role: ROLE_EMPLOYEE.to_string(),
        }
    }

    fn manager() -> Actor {
        Actor {
            user_id: 12,
            role: APPROVER_HOST_MANAGER.to_string(),
        }
    }

    fn admin() -> Actor {
        Actor {
            user_id: 1,
            role: ROLE_ADMIN.to_string(),
        }
    }

    fn two_step_chain() -> Vec<ApprovalStep> {
        vec![
            ApprovalStep::queued(Approver::user(11)),
            ApprovalStep::queued(Approver::role(APPROVER_HOST_MANAGER)),
        ]
    }

    // -----------------------------------------------------------------------
    // Creation
    // -----------------------------------------------------------------------

    #[test]
    fn empty_chain_starts_scheduled() {
        let wf = VisitWorkflow::new(vec![], t0());
        assert_eq!(wf.status, VisitStatus::Scheduled);
        assert!(wf.chain.is_empty());
    }

    #[test]
    fn non_empty_chain_starts_pending_with_first_step_active() {
        let wf = VisitWorkflow::new(two_step_chain(), t0());
        assert_eq!(wf.status, VisitStatus::PendingApproval);
        assert_eq!(wf.active_step_index(), Some(0));
        assert_eq!(wf.chain[0].status, StepStatus::Pending);
        assert_eq!(wf.chain[0].pending_since, Some(t0()));
        assert_eq!(wf.chain[1].status, StepStatus::Queued);
    }

    // -----------------------------------------------------------------------
    // Approve
    // -----------------------------------------------------------------------

    #[test]
    fn approve_advances_to_next_step() {
        let mut wf = VisitWorkflow::new(two_step_chain(), t0());
        wf.approve(&host(), Some("ok".into()), t0()).unwrap();

        assert_eq!(wf.status, VisitStatus::PendingApproval);
        assert_eq!(wf.chain[0].status, StepStatus::Approved);
        assert_eq!(wf.chain[0].acted_by, Some(11));
        assert_eq!(wf.chain[1].status, StepStatus::Pending);
        assert_eq!(wf.active_step_index(), Some(1));
    }

    #[test]
    fn approving_last_step_schedules_the_visit() {
        let mut wf = VisitWorkflow::new(two_step_chain(), t0());
        wf.approve(&host(), None, t0()).unwrap();
        wf.approve(&manager(), None, t0()).unwrap();

        assert_eq!(wf.status, VisitStatus::Scheduled);
        assert!(wf.active_step_index().is_none());
        assert!(wf
            .chain
            .iter()
            .all(|s| matches!(s.status, StepStatus::Approved)));
    }

    #[test]
    fn wrong_actor_gets_forbidden_not_invalid_state() {
        let mut wf = VisitWorkflow::new(two_step_chain(), t0());
        let stranger = Actor {
            user_id: 99,
            role: ROLE_EMPLOYEE.to_string(),
        };
        assert_matches!(
            wf.approve(&stranger, None, t0()),
            Err(CoreError::Forbidden(_))
        );
        // State untouched.
        assert_eq!(wf.chain[0].status, StepStatus::Pending);
    }

    #[test]
    fn admin_may_override_any_step() {
        let mut wf = VisitWorkflow::new(two_step_chain(), t0());
        assert!(wf.approve(&admin(), None, t0()).is_ok());
    }

    #[test]
    fn approve_from_scheduled_is_invalid_state() {
        let mut wf = VisitWorkflow::new(vec![], t0());
        assert_matches!(
            wf.approve(&admin(), None, t0()),
            Err(CoreError::InvalidState(_))
        );
    }

    // -----------------------------------------------------------------------
    // Reject
    // -----------------------------------------------------------------------

    #[test]
    fn reject_is_terminal() {
        let mut wf = VisitWorkflow::new(two_step_chain(), t0());
        wf.reject(&host(), "visitor unknown", t0()).unwrap();

        assert_eq!(wf.status, VisitStatus::Rejected);
        assert_eq!(wf.chain[0].status, StepStatus::Rejected);
        assert_matches!(
            wf.approve(&admin(), None, t0()),
            Err(CoreError::InvalidState(_))
        );
    }

    #[test]
    fn reject_requires_a_reason() {
        let mut wf = VisitWorkflow::new(two_step_chain(), t0());
        assert_matches!(
            wf.reject(&host(), "   ", t0()),
            Err(CoreError::Validation(_))
        );
        assert_eq!(wf.status, VisitStatus::PendingApproval);
    }

    // -----------------------------------------------------------------------
    // Delegate
    // -----------------------------------------------------------------------

    #[test]
    fn delegate_reassigns_without_advancing() {
        let mut wf = VisitWorkflow::new(two_step_chain(), t0());
        wf.delegate(&host(), 42, Some("on leave".into()), t0())
            .unwrap();

        assert_eq!(wf.status, VisitStatus::PendingApproval);
        assert_eq!(wf.active_step_index(), Some(0));
        assert_eq!(wf.chain[0].status, StepStatus::Delegated);
        assert_eq!(wf.chain[0].approver, Approver::user(42));
        assert_eq!(wf.chain[0].delegated_to, Some(42));
        assert_eq!(wf.chain[0].acted_by, Some(11));
    }

    #[test]
    fn delegate_target_may_then_approve() {
        let mut wf = VisitWorkflow::new(two_step_chain(), t0());
        wf.delegate(&host(), 42, None, t0()).unwrap();

        let delegate = Actor {
            user_id: 42,
            role: ROLE_EMPLOYEE.to_string(),
        };
        wf.approve(&delegate, None, t0()).unwrap();
        assert_eq!(wf.active_step_index(), Some(1));
        // Audit link to the delegation survives the approval.
        assert_eq!(wf.chain[0].delegated_to, Some(42));
    }

    #[test]
    fn original_approver_loses_the_step_after_delegation() {
        let mut wf = VisitWorkflow::new(two_step_chain(), t0());
        wf.delegate(&host(), 42, None, t0()).unwrap();
        assert_matches!(
            wf.approve(&host(), None, t0()),
            Err(CoreError::Forbidden(_))
        );
    }

    #[test]
    fn delegating_to_current_assignee_is_a_validation_error() {
        let mut wf = VisitWorkflow::new(two_step_chain(), t0());
        assert_matches!(
            wf.delegate(&host(), 11, None, t0()),
            Err(CoreError::Validation(_))
        );
    }

    // -----------------------------------------------------------------------
    // Check-in / check-out
    // -----------------------------------------------------------------------

    #[test]
    fn check_in_sets_arrival_and_method() {
        let mut wf = VisitWorkflow::new(vec![], t0());
        wf.check_in("biometric", t0()).unwrap();

        assert_eq!(wf.status, VisitStatus::CheckedIn);
        assert_eq!(wf.actual_arrival, Some(t0()));
        assert_eq!(wf.check_in_method.as_deref(), Some("biometric"));
        assert!(wf.actual_departure.is_none());
    }

    #[test]
    fn check_in_before_approval_is_invalid_state() {
        let mut wf = VisitWorkflow::new(two_step_chain(), t0());
        assert_matches!(
            wf.check_in("manual", t0()),
            Err(CoreError::InvalidState(_))
        );
    }

    #[test]
    fn check_out_sets_departure() {
        let mut wf = VisitWorkflow::new(vec![], t0());
        wf.check_in("manual", t0()).unwrap();
        let later = t0() + Duration::hours(2);
        wf.check_out(later).unwrap();

        assert_eq!(wf.status, VisitStatus::CheckedOut);
        assert_eq!(wf.actual_departure, Some(later));
    }

    #[test]
    fn double_check_out_is_invalid_state() {
        let mut wf = VisitWorkflow::new(vec![], t0());
        wf.check_in("manual", t0()).unwrap();
        wf.check_out(t0()).unwrap();
        assert_matches!(wf.check_out(t0()), Err(CoreError::InvalidState(_)));
    }

    #[test]
    fn auto_check_out_departs_at_the_stay_boundary() {
        let mut wf = VisitWorkflow::new(vec![], t0());
        wf.check_in("manual", t0()).unwrap();

        // No clock input at all: the recorded departure is the boundary of
        // the allowed stay, never the time the overstay was noticed.
        let departure = wf.auto_check_out(8).unwrap();
        assert_eq!(departure, t0() + Duration::hours(8));
        assert_eq!(wf.status, VisitStatus::CheckedOut);
        assert_eq!(wf.actual_departure, Some(departure));
    }

    #[test]
    fn auto_check_out_only_applies_to_visitors_on_site() {
        let mut wf = VisitWorkflow::new(vec![], t0());
        assert_matches!(wf.auto_check_out(8), Err(CoreError::InvalidState(_)));

        wf.check_in("manual", t0()).unwrap();
        wf.check_out(t0()).unwrap();
        assert_matches!(wf.auto_check_out(8), Err(CoreError::InvalidState(_)));
    }

    #[test]
    fn arrival_departure_invariant_holds_across_lifecycle() {
        let mut wf = VisitWorkflow::new(vec![], t0());
        assert!(wf.actual_arrival.is_none() && wf.actual_departure.is_none());
        wf.check_in("manual", t0()).unwrap();
        assert!(wf.actual_arrival.is_some() && wf.actual_departure.is_none());
        wf.check_out(t0()).unwrap();
        assert!(wf.actual_arrival.is_some() && wf.actual_departure.is_some());
    }

    // -----------------------------------------------------------------------
    // Cancel
    // -----------------------------------------------------------------------

    #[test]
    fn cancel_allowed_while_pending_or_scheduled() {
        let mut pending = VisitWorkflow::new(two_step_chain(), t0());
        pending.cancel(Some("host sick".into())).unwrap();
        assert_eq!(pending.status, VisitStatus::Cancelled);
        assert_eq!(pending.cancellation_reason.as_deref(), Some("host sick"));

        let mut scheduled = VisitWorkflow::new(vec![], t0());
        scheduled.cancel(None).unwrap();
        assert_eq!(scheduled.status, VisitStatus::Cancelled);
    }

    #[test]
    fn cancel_after_check_in_is_invalid_state() {
        let mut wf = VisitWorkflow::new(vec![], t0());
        wf.check_in("manual", t0()).unwrap();
        assert_matches!(wf.cancel(None), Err(CoreError::InvalidState(_)));
    }

    #[test]
    fn cancelled_is_terminal() {
        let mut wf = VisitWorkflow::new(vec![], t0());
        wf.cancel(None).unwrap();
        assert_matches!(wf.check_in("manual", t0()), Err(CoreError::InvalidState(_)));
        assert_matches!(wf.cancel(None), Err(CoreError::InvalidState(_)));
    }

    // -----------------------------------------------------------------------
    // Escalation
    // -----------------------------------------------------------------------

    #[test]
    fn overdue_detection_uses_pending_since() {
        let wf = VisitWorkflow::new(two_step_chain(), t0());
        assert!(!wf.approval_overdue(t0() + Duration::hours(23), 24));
        assert!(wf.approval_overdue(t0() + Duration::hours(24), 24));
    }

    #[test]
    fn delegation_resets_the_escalation_clock() {
        let mut wf = VisitWorkflow::new(two_step_chain(), t0());
        let delegated_at = t0() + Duration::hours(23);
        wf.delegate(&host(), 42, None, delegated_at).unwrap();
        assert!(!wf.approval_overdue(t0() + Duration::hours(25), 24));
        assert!(wf.approval_overdue(delegated_at + Duration::hours(24), 24));
    }

    #[test]
    fn escalate_skips_step_and_promotes_target() {
        let mut wf = VisitWorkflow::new(two_step_chain(), t0());
        let target = Approver::role(APPROVER_SECURITY);
        let outcome = wf.escalate(Some(&target), t0() + Duration::hours(25)).unwrap();

        assert_eq!(outcome, EscalationOutcome::Escalated);
        assert_eq!(wf.chain.len(), 3);
        assert_eq!(wf.chain[0].status, StepStatus::Skipped);
        assert!(wf.chain[0].comment.as_deref().unwrap().contains("escalation"));
        assert_eq!(wf.chain[1].status, StepStatus::Pending);
        assert_eq!(wf.chain[1].approver, target);
        // The rest of the original chain still follows.
        assert_eq!(wf.chain[2].status, StepStatus::Queued);
        assert_eq!(wf.status, VisitStatus::PendingApproval);
    }

    #[test]
    fn escalate_without_target_flags_stale() {
        let mut wf = VisitWorkflow::new(two_step_chain(), t0());
        let outcome = wf.escalate(None, t0()).unwrap();
        assert_eq!(outcome, EscalationOutcome::FlaggedStale);
        assert!(wf.approval_stale);
        assert_eq!(wf.status, VisitStatus::PendingApproval);
        assert_eq!(wf.chain[0].status, StepStatus::Pending);
    }

    #[test]
    fn escalate_does_not_loop_onto_the_target() {
        let mut wf = VisitWorkflow::new(two_step_chain(), t0());
        let target = Approver::role(APPROVER_SECURITY);
        wf.escalate(Some(&target), t0()).unwrap();
        // Second sweep: the stalled step is already the escalation target.
        let outcome = wf.escalate(Some(&target), t0()).unwrap();
        assert_eq!(outcome, EscalationOutcome::FlaggedStale);
        assert_eq!(wf.chain.len(), 3);
    }

    #[test]
    fn approval_clears_stale_flag() {
        let mut wf = VisitWorkflow::new(two_step_chain(), t0());
        wf.escalate(None, t0()).unwrap();
        assert!(wf.approval_stale);
        wf.approve(&host(), None, t0()).unwrap();
        assert!(!wf.approval_stale);
    }

    // -----------------------------------------------------------------------
    // Single-active-step invariant
    // -----------------------------------------------------------------------

    #[test]
    fn at_most_one_active_step_throughout() {
        let mut wf = VisitWorkflow::new(two_step_chain(), t0());
        let active = |wf: &VisitWorkflow| wf.chain.iter().filter(|s| s.is_active()).count();

        assert_eq!(active(&wf), 1);
        wf.delegate(&host(), 42, None, t0()).unwrap();
        assert_eq!(active(&wf), 1);
        wf.escalate(Some(&Approver::role(APPROVER_SECURITY)), t0())
            .unwrap();
        assert_eq!(active(&wf), 1);
        let security = Actor {
            user_id: 7,
            role: APPROVER_SECURITY.to_string(),
        };
        wf.approve(&security, None, t0()).unwrap();
        assert_eq!(active(&wf), 1);
        wf.approve(&manager(), None, t0()).unwrap();
        assert_eq!(active(&wf), 0);
        assert_eq!(wf.status, VisitStatus::Scheduled);
    }
}
