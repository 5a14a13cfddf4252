//! Request handlers.
//!
//! Handlers load the visit, delegate all state validation to the workflow
//! engine in `gatehouse_core`, persist the result through the repository's
//! version-checked update, and map errors via [`AppError`](crate::error::AppError).

pub mod visit;
