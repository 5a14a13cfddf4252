use gatehouse_core::policy::{
    PolicyConfig, DEFAULT_APPROVAL_TIMEOUT_HOURS, DEFAULT_AUTO_CHECKOUT_HOURS,
};
use gatehouse_core::workflow::Approver;

use crate::auth::jwt::JwtConfig;

/// How often the background sweep runs, in seconds.
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

/// Server configuration loaded from environment variables.
///
/// All fields except `JWT_SECRET` have sensible defaults suitable for local
/// development. In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Background sweep cadence in seconds (default: `60`).
    pub sweep_interval_secs: u64,
    /// Webhook endpoint for outbound visit notifications. Unset disables
    /// external delivery (events are still logged).
    pub notify_webhook_url: Option<String>,
    /// Base URL of the watchlist service consulted at check-in. Unset
    /// disables the check (logged prominently at startup).
    pub watchlist_url: Option<String>,
    /// JWT token configuration (secret, expiry).
    pub jwt: JwtConfig,
    /// Approval policy snapshot used for chain resolution and the sweep.
    pub policy: PolicyConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default   |
    /// |---------------------------|-----------|
    /// | `HOST`                    | `0.0.0.0` |
    /// | `PORT`                    | `3000`    |
    /// | `CORS_ORIGINS`            | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`    | `30`      |
    /// | `SWEEP_INTERVAL_SECS`     | `60`      |
    /// | `NOTIFY_WEBHOOK_URL`      | unset     |
    /// | `WATCHLIST_URL`           | unset     |
    /// | `REQUIRE_APPROVAL`        | `false`   |
    /// | `OPERATING_HOURS_OPEN`    | `8`       |
    /// | `OPERATING_HOURS_CLOSE`   | `18`      |
    /// | `ESCALATION_APPROVER_ID`  | unset     |
    /// | `ESCALATION_APPROVER_ROLE`| unset     |
    /// | `AUTO_CHECKOUT_HOURS`     | `8`       |
    /// | `APPROVAL_TIMEOUT_HOURS`  | `24`      |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = parsed_env("PORT").unwrap_or(3000);

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = parsed_env("REQUEST_TIMEOUT_SECS").unwrap_or(30);
        let sweep_interval_secs: u64 =
            parsed_env("SWEEP_INTERVAL_SECS").unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS);

        let notify_webhook_url = non_empty_env("NOTIFY_WEBHOOK_URL");
        let watchlist_url = non_empty_env("WATCHLIST_URL");

        let jwt = JwtConfig::from_env();
        let policy = policy_from_env();

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            sweep_interval_secs,
            notify_webhook_url,
            watchlist_url,
            jwt,
            policy,
        }
    }
}

/// Build the approval policy snapshot from environment variables.
///
/// The escalation target may be a specific user (`ESCALATION_APPROVER_ID`)
/// or a role name (`ESCALATION_APPROVER_ROLE`); the id wins when both are
/// set. Neither set means stalled approvals are flagged stale, not escalated.
fn policy_from_env() -> PolicyConfig {
    let escalation_approver = parsed_env::<i64>("ESCALATION_APPROVER_ID")
        .map(Approver::user)
        .or_else(|| non_empty_env("ESCALATION_APPROVER_ROLE").map(Approver::role));

    PolicyConfig {
        require_approval: parsed_env("REQUIRE_APPROVAL").unwrap_or(false),
        operating_hours_open: parsed_env("OPERATING_HOURS_OPEN").unwrap_or(8),
        operating_hours_close: parsed_env("OPERATING_HOURS_CLOSE").unwrap_or(18),
        escalation_approver,
        auto_checkout_hours: parsed_env("AUTO_CHECKOUT_HOURS")
            .unwrap_or(DEFAULT_AUTO_CHECKOUT_HOURS),
        approval_timeout_hours: parsed_env("APPROVAL_TIMEOUT_HOURS")
            .unwrap_or(DEFAULT_APPROVAL_TIMEOUT_HOURS),
    }
}

/// Read an env var and parse it, panicking on malformed values.
///
/// A present-but-garbled variable is a deployment mistake we want to surface
/// at startup, not a thing to silently default away.
fn parsed_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().map(|v| {
        v.parse()
            .unwrap_or_else(|_| panic!("{name} must be a valid {}", std::any::type_name::<T>()))
    })
}

/// Read an env var, treating empty strings as unset.
fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
