//! Read-side visibility scoping.
//!
//! Narrows the visit set a caller may see based on role. The scope is applied
//! by the repository at query time and re-checked by write handlers, which
//! reject out-of-scope actors with an authorization error rather than
//! silently filtering.

use crate::roles::ROLE_ADMIN;
use crate::types::DbId;

/// The set of visits visible to a caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VisitScope {
    /// Administrators see everything.
    All,
    /// Restricted roles see only visits they host. The display-name match is
    /// a compatibility fallback for rows without a host identity linkage,
    /// not a security boundary.
    Host {
        user_id: DbId,
        display_name: String,
    },
}

impl VisitScope {
    /// Compute the scope for a caller.
    pub fn for_caller(role: &str, user_id: DbId, display_name: &str) -> Self {
        if role == ROLE_ADMIN {
            VisitScope::All
        } else {
            VisitScope::Host {
                user_id,
                display_name: display_name.to_string(),
            }
        }
    }

    /// Whether a visit with the given host fields falls inside this scope.
    ///
    /// The name fallback only applies when the row has no `host_id`; a name
    /// collision on a linked row never grants visibility.
    pub fn covers(&self, host_id: Option<DbId>, host_name: &str) -> bool {
        match self {
            VisitScope::All => true,
            VisitScope::Host {
                user_id,
                display_name,
            } => match host_id {
                Some(id) => id == *user_id,
                None => host_name == display_name,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roles::ROLE_EMPLOYEE;

    #[test]
    fn admin_scope_covers_everything() {
        let scope = VisitScope::for_caller(ROLE_ADMIN, 1, "Alice Admin");
        assert_eq!(scope, VisitScope::All);
        assert!(scope.covers(Some(999), "Somebody Else"));
        assert!(scope.covers(None, "Somebody Else"));
    }

    #[test]
    fn employee_scope_matches_host_id() {
        let scope = VisitScope::for_caller(ROLE_EMPLOYEE, 11, "Asha Rao");
        assert!(scope.covers(Some(11), "Asha Rao"));
        assert!(!scope.covers(Some(12), "Asha Rao"));
    }

    #[test]
    fn name_fallback_only_applies_without_identity_linkage() {
        let scope = VisitScope::for_caller(ROLE_EMPLOYEE, 11, "Asha Rao");
        // Unlinked row, matching name: visible.
        assert!(scope.covers(None, "Asha Rao"));
        // Linked row hosted by a different user who shares the name: hidden.
        assert!(!scope.covers(Some(12), "Asha Rao"));
        // Unlinked row, different name: hidden.
        assert!(!scope.covers(None, "Someone Else"));
    }
}
