//! terraflow-core: the workflow orchestration engine.
//!
//! Executes versioned DAGs of typed nodes in dependency order through a
//! pluggable executor registry, with per-task-type retry policies, error
//! tracking, and LIFO compensation on failure.

pub mod workflow;
