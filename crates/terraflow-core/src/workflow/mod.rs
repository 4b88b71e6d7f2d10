//! Workflow engine core: graph ordering, node execution, and failure recovery.
//!
//! - `definition` -- YAML/JSON parsing, structural validation, filesystem load/save
//! - `graph` -- DAG builder, cycle detection, deterministic topological ordering
//! - `context` -- Execution context with node output tracking and dot-path lookup
//! - `condition` -- Decision evaluation (comparison, threshold, data-check, expression)
//! - `retry` -- Per-task-type retry policy resolution
//! - `tracker` -- Bounded error history and cumulative failure statistics
//! - `compensation` -- LIFO undo stacks for partial-failure cleanup
//! - `registry` -- Node executor trait, metadata, and kind-keyed registry
//! - `nodes` -- Built-in executors for the five node kinds
//! - `engine` -- Sequential topological execution with retries and cancellation
//! - `service` -- Orchestrator facade: create/inspect/cancel executions

pub mod compensation;
pub mod condition;
pub mod context;
pub mod definition;
pub mod engine;
pub mod graph;
pub mod nodes;
pub mod registry;
pub mod retry;
pub mod service;
pub mod tracker;
