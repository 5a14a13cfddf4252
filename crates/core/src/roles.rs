//! Well-known role name constants.
//!
//! Caller roles (`admin`, `employee`) come from the JWT issued by the
//! identity provider. Approver roles name the party responsible for an
//! approval step when no specific user id is known at resolution time.

/// Sees every visit and may override any approval step.
pub const ROLE_ADMIN: &str = "admin";

/// Restricted role: sees only visits it hosts.
pub const ROLE_EMPLOYEE: &str = "employee";

/// Approver role for the host's manager (VIP second step).
pub const APPROVER_HOST_MANAGER: &str = "host-manager";

/// Approver role for the designated safety officer (contractor visits).
pub const APPROVER_SAFETY_OFFICER: &str = "safety-officer";

/// Approver role for security (after-hours arrivals).
pub const APPROVER_SECURITY: &str = "security";
