use crate::types::DbId;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Validation failed: {0}")]
    Validation(String),

    /// Version mismatch on a compare-and-swap write. The caller must re-read
    /// the visit and retry (or abandon).
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The actor is authenticated but not permitted to perform this
    /// transition. Distinct from [`CoreError::InvalidState`] so clients can
    /// present "not allowed" rather than "bad request".
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The requested transition is not legal from the visit's current state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
