//! Approval policy resolution.
//!
//! `resolve_chain` is a pure function from visit attributes and a policy
//! snapshot to the required approval chain. It has no side effects, so
//! re-evaluating it for audit purposes reproduces the original chain from
//! the same inputs.

use chrono::Timelike;
use serde::{Deserialize, Serialize};

use crate::roles::{APPROVER_HOST_MANAGER, APPROVER_SAFETY_OFFICER, APPROVER_SECURITY};
use crate::types::{DbId, Timestamp};
use crate::workflow::{ApprovalStep, Approver, VisitType};

/// Default on-site duration before the sweep auto-checks a visitor out.
pub const DEFAULT_AUTO_CHECKOUT_HOURS: i64 = 8;

/// Default time an approval step may sit unanswered before escalation.
pub const DEFAULT_APPROVAL_TIMEOUT_HOURS: i64 = 24;

/// Policy configuration snapshot, read once per resolution call.
///
/// Modelled as an explicit struct rather than scattered flags so the
/// resolver can be tested deterministically in isolation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Company-wide "require approval" switch for otherwise unregulated
    /// visit types.
    pub require_approval: bool,
    /// Operating hours as UTC hours of day, `open` inclusive, `close`
    /// exclusive. Arrivals outside this window need a security sign-off.
    pub operating_hours_open: u32,
    pub operating_hours_close: u32,
    /// Fixed escalation approver for timed-out steps. `None` leaves stalled
    /// visits pending and flagged stale.
    pub escalation_approver: Option<Approver>,
    pub auto_checkout_hours: i64,
    pub approval_timeout_hours: i64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            require_approval: false,
            operating_hours_open: 8,
            operating_hours_close: 18,
            escalation_approver: None,
            auto_checkout_hours: DEFAULT_AUTO_CHECKOUT_HOURS,
            approval_timeout_hours: DEFAULT_APPROVAL_TIMEOUT_HOURS,
        }
    }
}

impl PolicyConfig {
    /// Whether `arrival` falls outside the configured operating hours.
    pub fn is_after_hours(&self, arrival: Timestamp) -> bool {
        let hour = arrival.hour();
        hour < self.operating_hours_open || hour >= self.operating_hours_close
    }
}

/// The approver for the visit's host: a specific user when the directory
/// linkage is present, otherwise the `host` role as a fallback.
fn host_approver(host_id: Option<DbId>) -> Approver {
    match host_id {
        Some(id) => Approver::user(id),
        None => Approver::role("host"),
    }
}

/// Resolve the required approval chain for a visit.
///
/// Rules in priority order, first match wins:
/// 1. VIP visits: host approval, then the host's manager.
/// 2. Contractor visits: the designated safety officer.
/// 3. Arrivals outside operating hours: security.
/// 4. Company-wide "require approval": host approval.
/// 5. Otherwise: no approval (visit is scheduled immediately).
///
/// The after-hours rule is additive: combined with rule 1 or 2 the security
/// step is appended last rather than replacing the chain.
pub fn resolve_chain(
    visit_type: VisitType,
    expected_arrival: Timestamp,
    host_id: Option<DbId>,
    policy: &PolicyConfig,
) -> Vec<ApprovalStep> {
    let mut approvers: Vec<Approver> = match visit_type {
        VisitType::Vip => vec![
            host_approver(host_id),
            Approver::role(APPROVER_HOST_MANAGER),
        ],
        VisitType::Contractor => vec![Approver::role(APPROVER_SAFETY_OFFICER)],
        _ => vec![],
    };

    if policy.is_after_hours(expected_arrival) {
        approvers.push(Approver::role(APPROVER_SECURITY));
    } else if approvers.is_empty() && policy.require_approval {
        approvers.push(host_approver(host_id));
    }

    approvers.into_iter().map(ApprovalStep::queued).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn midday() -> Timestamp {
        Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
    }

    fn late_evening() -> Timestamp {
        Utc.with_ymd_and_hms(2026, 3, 10, 21, 30, 0).unwrap()
    }

    fn approvers(chain: &[ApprovalStep]) -> Vec<&Approver> {
        chain.iter().map(|s| &s.approver).collect()
    }

    #[test]
    fn vip_gets_host_then_manager() {
        let chain = resolve_chain(VisitType::Vip, midday(), Some(11), &PolicyConfig::default());
        assert_eq!(
            approvers(&chain),
            vec![
                &Approver::user(11),
                &Approver::role(APPROVER_HOST_MANAGER)
            ]
        );
    }

    #[test]
    fn contractor_gets_safety_officer() {
        let chain = resolve_chain(
            VisitType::Contractor,
            midday(),
            Some(11),
            &PolicyConfig::default(),
        );
        assert_eq!(approvers(&chain), vec![&Approver::role(APPROVER_SAFETY_OFFICER)]);
    }

    #[test]
    fn after_hours_appends_security_to_vip_chain() {
        let chain = resolve_chain(
            VisitType::Vip,
            late_evening(),
            Some(11),
            &PolicyConfig::default(),
        );
        assert_eq!(chain.len(), 3);
        assert_eq!(chain[2].approver, Approver::role(APPROVER_SECURITY));
    }

    #[test]
    fn after_hours_alone_yields_single_security_step() {
        let chain = resolve_chain(
            VisitType::General,
            late_evening(),
            Some(11),
            &PolicyConfig::default(),
        );
        assert_eq!(approvers(&chain), vec![&Approver::role(APPROVER_SECURITY)]);
    }

    #[test]
    fn after_hours_takes_priority_over_require_approval() {
        let policy = PolicyConfig {
            require_approval: true,
            ..PolicyConfig::default()
        };
        let chain = resolve_chain(VisitType::General, late_evening(), Some(11), &policy);
        assert_eq!(approvers(&chain), vec![&Approver::role(APPROVER_SECURITY)]);
    }

    #[test]
    fn require_approval_yields_host_step() {
        let policy = PolicyConfig {
            require_approval: true,
            ..PolicyConfig::default()
        };
        let chain = resolve_chain(VisitType::General, midday(), Some(11), &policy);
        assert_eq!(approvers(&chain), vec![&Approver::user(11)]);
    }

    #[test]
    fn host_step_falls_back_to_role_without_identity_linkage() {
        let policy = PolicyConfig {
            require_approval: true,
            ..PolicyConfig::default()
        };
        let chain = resolve_chain(VisitType::General, midday(), None, &policy);
        assert_eq!(approvers(&chain), vec![&Approver::role("host")]);
    }

    #[test]
    fn default_policy_requires_nothing_for_general_visits() {
        let chain = resolve_chain(
            VisitType::General,
            midday(),
            Some(11),
            &PolicyConfig::default(),
        );
        assert!(chain.is_empty());
    }

    #[test]
    fn boundary_hours_are_open_inclusive_close_exclusive() {
        let policy = PolicyConfig::default(); // 8..18
        let at_open = Utc.with_ymd_and_hms(2026, 3, 10, 8, 0, 0).unwrap();
        let at_close = Utc.with_ymd_and_hms(2026, 3, 10, 18, 0, 0).unwrap();
        assert!(!policy.is_after_hours(at_open));
        assert!(policy.is_after_hours(at_close));
    }

    #[test]
    fn resolution_is_deterministic() {
        let policy = PolicyConfig {
            require_approval: true,
            ..PolicyConfig::default()
        };
        let a = resolve_chain(VisitType::Vip, late_evening(), Some(11), &policy);
        let b = resolve_chain(VisitType::Vip, late_evening(), Some(11), &policy);
        assert_eq!(
            serde_json::to_value(&a).unwrap(),
            serde_json::to_value(&b).unwrap()
        );
    }
}
