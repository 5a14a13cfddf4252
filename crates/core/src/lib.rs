//! Gatehouse domain logic.
//!
//! This crate has zero internal dependencies so it can be used by the DB
//! and API layers as well as any future worker or CLI tooling. It owns the
//! visit state machine, the approval policy resolver, visibility scoping,
//! and the shared error taxonomy.

pub mod error;
pub mod policy;
pub mod roles;
pub mod types;
pub mod visibility;
pub mod workflow;
