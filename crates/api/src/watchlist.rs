//! Watchlist service client.
//!
//! The check-in path consults this collaborator before accepting a visitor.
//! It is a compliance check, so check-in fails closed when the service is
//! unreachable rather than silently skipping it.

use async_trait::async_trait;
use serde::Deserialize;

use gatehouse_core::types::DbId;

/// Error from a watchlist lookup.
#[derive(Debug, thiserror::Error)]
pub enum WatchlistError {
    #[error("Watchlist service unreachable: {0}")]
    Unreachable(String),

    #[error("Watchlist service returned HTTP {0}")]
    HttpStatus(u16),
}

/// Seam for the external watchlist/blacklist service.
#[async_trait]
pub trait WatchlistClient: Send + Sync {
    /// Whether the visitor appears on the watchlist.
    async fn is_listed(&self, visitor_id: DbId) -> Result<bool, WatchlistError>;
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct LookupResponse {
    listed: bool,
}

/// Client for the watchlist service's HTTP lookup endpoint.
pub struct HttpWatchlist {
    base_url: String,
    client: reqwest::Client,
}

impl HttpWatchlist {
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(5))
            .build()
            .expect("Failed to build reqwest HTTP client");
        Self { base_url, client }
    }
}

#[async_trait]
impl WatchlistClient for HttpWatchlist {
    async fn is_listed(&self, visitor_id: DbId) -> Result<bool, WatchlistError> {
        let url = format!(
            "{}/api/v1/watchlist/{visitor_id}",
            self.base_url.trim_end_matches('/')
        );
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| WatchlistError::Unreachable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(WatchlistError::HttpStatus(response.status().as_u16()));
        }

        let body: LookupResponse = response
            .json()
            .await
            .map_err(|e| WatchlistError::Unreachable(e.to_string()))?;
        Ok(body.listed)
    }
}

// ---------------------------------------------------------------------------
// Disabled implementation
// ---------------------------------------------------------------------------

/// Used when no `WATCHLIST_URL` is configured: every lookup passes.
/// The deployment choice is logged at startup so it is never silent.
pub struct DisabledWatchlist;

#[async_trait]
impl WatchlistClient for DisabledWatchlist {
    async fn is_listed(&self, _visitor_id: DbId) -> Result<bool, WatchlistError> {
        Ok(false)
    }
}
