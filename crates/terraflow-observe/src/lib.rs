//! Observability setup for terraflow services.

pub mod tracing_setup;
