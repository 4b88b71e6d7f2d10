//! Node executor trait, metadata, and the kind-keyed registry.
//!
//! The engine dispatches every node through `ExecutorRegistry::resolve`, so
//! adding a node kind means registering an executor, never touching the
//! engine. Executors are trait objects behind `Arc`, registered once at
//! startup and shared across executions.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use terraflow_types::retry::ErrorKind;
use terraflow_types::workflow::{NodeExecutionResult, NodeKind, WorkflowNode};

use super::context::ExecutionContext;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Failure of one node execution attempt, classified for retry decisions.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("invalid node configuration: {0}")]
    Validation(String),

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("attempt timed out: {0}")]
    Timeout(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl NodeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            NodeError::Validation(_) => ErrorKind::Validation,
            NodeError::Transient(_) => ErrorKind::Transient,
            NodeError::Timeout(_) => ErrorKind::Timeout,
            NodeError::Internal(_) => ErrorKind::Internal,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("no executor registered for node kind '{0}'")]
    NotFound(NodeKind),
}

// ---------------------------------------------------------------------------
// NodeMetadata
// ---------------------------------------------------------------------------

/// Introspection data describing an executor. Never consulted during
/// execution; serves workflow builders and diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct NodeMetadata {
    pub name: String,
    pub description: String,
    pub category: String,
    /// JSON schema fragment describing the expected node config.
    pub config_schema: Value,
    /// Config keys that must be present for `validate` to pass.
    pub required_config: Vec<String>,
    /// Output fields the executor produces on success.
    pub outputs: Vec<String>,
}

// ---------------------------------------------------------------------------
// NodeExecutor
// ---------------------------------------------------------------------------

/// One executor per node kind.
///
/// `validate` is a cheap structural pre-check run before the first attempt;
/// a false return is a terminal validation failure, never retried.
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    async fn execute(
        &self,
        node: &WorkflowNode,
        ctx: &mut ExecutionContext,
    ) -> Result<NodeExecutionResult, NodeError>;

    fn validate(&self, node: &WorkflowNode) -> bool;

    fn metadata(&self) -> NodeMetadata;
}

// ---------------------------------------------------------------------------
// ExecutorRegistry
// ---------------------------------------------------------------------------

/// Kind-keyed executor registry, shared across executions.
#[derive(Default)]
pub struct ExecutorRegistry {
    executors: DashMap<NodeKind, Arc<dyn NodeExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace the executor for a kind.
    pub fn register(&self, kind: NodeKind, executor: Arc<dyn NodeExecutor>) {
        tracing::debug!(kind = %kind, "registered node executor");
        self.executors.insert(kind, executor);
    }

    /// Resolve the executor for a kind.
    pub fn resolve(&self, kind: NodeKind) -> Result<Arc<dyn NodeExecutor>, RegistryError> {
        self.executors
            .get(&kind)
            .map(|e| Arc::clone(&e))
            .ok_or(RegistryError::NotFound(kind))
    }

    /// Metadata for a registered kind.
    pub fn metadata(&self, kind: NodeKind) -> Result<NodeMetadata, RegistryError> {
        Ok(self.resolve(kind)?.metadata())
    }

    /// Metadata for every registered kind.
    pub fn all_metadata(&self) -> HashMap<NodeKind, NodeMetadata> {
        self.executors
            .iter()
            .map(|entry| (*entry.key(), entry.value().metadata()))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoExecutor;

    #[async_trait]
    impl NodeExecutor for EchoExecutor {
        async fn execute(
            &self,
            node: &WorkflowNode,
            _ctx: &mut ExecutionContext,
        ) -> Result<NodeExecutionResult, NodeError> {
            Ok(NodeExecutionResult::success(HashMap::from([(
                "echo".to_string(),
                json!(node.id),
            )])))
        }

        fn validate(&self, _node: &WorkflowNode) -> bool {
            true
        }

        fn metadata(&self) -> NodeMetadata {
            NodeMetadata {
                name: "echo".to_string(),
                description: "echoes the node id".to_string(),
                category: "test".to_string(),
                config_schema: json!({}),
                required_config: vec![],
                outputs: vec!["echo".to_string()],
            }
        }
    }

    #[test]
    fn test_register_and_resolve() {
        let registry = ExecutorRegistry::new();
        registry.register(NodeKind::Processing, Arc::new(EchoExecutor));

        assert!(registry.resolve(NodeKind::Processing).is_ok());
        assert!(matches!(
            registry.resolve(NodeKind::Output).err().unwrap(),
            RegistryError::NotFound(NodeKind::Output)
        ));
    }

    #[test]
    fn test_metadata_lookup() {
        let registry = ExecutorRegistry::new();
        registry.register(NodeKind::Processing, Arc::new(EchoExecutor));

        let meta = registry.metadata(NodeKind::Processing).unwrap();
        assert_eq!(meta.name, "echo");
        assert_eq!(registry.all_metadata().len(), 1);
    }

    #[test]
    fn test_node_error_kinds() {
        assert_eq!(
            NodeError::Validation("bad".into()).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            NodeError::Transient("flaky".into()).kind(),
            ErrorKind::Transient
        );
        assert_eq!(NodeError::Timeout("slow".into()).kind(), ErrorKind::Timeout);
        assert_eq!(NodeError::Internal("bug".into()).kind(), ErrorKind::Internal);
    }
}
