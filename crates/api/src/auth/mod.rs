//! Authentication building blocks (JWT claims and token validation).
//!
//! User management and login live in the identity service; this crate only
//! validates the tokens it issues.

pub mod jwt;
