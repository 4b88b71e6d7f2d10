//! Shared domain types for the terraflow orchestration engine.
//!
//! This crate contains the serializable workflow model: versioned node/edge
//! graphs, execution records, node results, and retry policy configuration.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, semver,
//! thiserror.

pub mod retry;
pub mod workflow;
