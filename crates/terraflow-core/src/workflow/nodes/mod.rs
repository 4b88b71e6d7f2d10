//! Built-in executors for the five node kinds.
//!
//! External effects (catalog fetches, processing jobs, deliveries) go through
//! the collaborator traits below, implemented outside the engine and injected
//! at registration time. Trigger and decision executors are self-contained.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use terraflow_types::workflow::NodeKind;

use super::registry::ExecutorRegistry;

pub mod data_input;
pub mod decision;
pub mod output;
pub mod processing;
pub mod trigger;

pub use data_input::DataInputExecutor;
pub use decision::DecisionExecutor;
pub use output::OutputExecutor;
pub use processing::ProcessingExecutor;
pub use trigger::TriggerExecutor;

// ---------------------------------------------------------------------------
// Collaborator traits
// ---------------------------------------------------------------------------

/// Fetches source data described by a data-input node's config.
///
/// Returns a flat metadata map recorded as the node's output. Errors are
/// treated as retryable by the executor.
#[async_trait]
pub trait DataSourceProvider: Send + Sync {
    async fn fetch(
        &self,
        config: &HashMap<String, Value>,
    ) -> anyhow::Result<HashMap<String, Value>>;
}

/// Runs one processing operation against a payload.
///
/// The returned map must carry a `status` field; anything other than
/// `"success"` is a retryable node failure.
#[async_trait]
pub trait ProcessingProvider: Send + Sync {
    async fn process(
        &self,
        operation: &str,
        payload: &HashMap<String, Value>,
    ) -> anyhow::Result<HashMap<String, Value>>;
}

/// Delivers a payload to a destination, returning a location reference.
#[async_trait]
pub trait OutputSink: Send + Sync {
    async fn deliver(
        &self,
        destination: &str,
        payload: &HashMap<String, Value>,
    ) -> anyhow::Result<String>;

    /// Undo a delivery during compensation. No-op by default.
    async fn revoke(&self, _location: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Registration helper
// ---------------------------------------------------------------------------

/// Register the five built-in executors with their collaborators.
pub fn register_builtins(
    registry: &ExecutorRegistry,
    data_source: Arc<dyn DataSourceProvider>,
    processing: Arc<dyn ProcessingProvider>,
    sink: Arc<dyn OutputSink>,
) {
    registry.register(NodeKind::Trigger, Arc::new(TriggerExecutor::new()));
    registry.register(
        NodeKind::DataInput,
        Arc::new(DataInputExecutor::new(data_source)),
    );
    registry.register(
        NodeKind::Processing,
        Arc::new(ProcessingExecutor::new(processing)),
    );
    registry.register(NodeKind::Decision, Arc::new(DecisionExecutor::new()));
    registry.register(NodeKind::Output, Arc::new(OutputExecutor::new(sink)));
}
