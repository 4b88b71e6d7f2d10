//! Processing node executor.
//!
//! Resolves the input payload (an explicit `inputNode` reference, or the
//! latest recorded output as a compatibility fallback), delegates the
//! operation to the `ProcessingProvider`, and checks the returned `status`
//! field. A non-success status is a retryable failure.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use terraflow_types::workflow::{NodeExecutionResult, WorkflowNode};

use super::ProcessingProvider;
use crate::workflow::context::ExecutionContext;
use crate::workflow::registry::{NodeError, NodeExecutor, NodeMetadata};

pub struct ProcessingExecutor {
    provider: Arc<dyn ProcessingProvider>,
}

impl ProcessingExecutor {
    pub fn new(provider: Arc<dyn ProcessingProvider>) -> Self {
        Self { provider }
    }
}

/// Resolve the payload a node operates on.
///
/// Prefers the node's `inputNode` config; falls back to the latest recorded
/// output for configs written without an explicit reference.
pub(super) fn resolve_payload(
    node: &WorkflowNode,
    ctx: &ExecutionContext,
) -> Result<HashMap<String, Value>, NodeError> {
    if let Some(input_node) = node.config_str("inputNode") {
        return ctx.output(input_node).cloned().ok_or_else(|| {
            NodeError::Internal(format!(
                "input node '{input_node}' has no recorded output"
            ))
        });
    }
    Ok(ctx.latest_output().cloned().unwrap_or_default())
}

#[async_trait]
impl NodeExecutor for ProcessingExecutor {
    async fn execute(
        &self,
        node: &WorkflowNode,
        ctx: &mut ExecutionContext,
    ) -> Result<NodeExecutionResult, NodeError> {
        let operation = node
            .config_str("processingType")
            .ok_or_else(|| NodeError::Validation("missing 'processingType' config".to_string()))?;
        let payload = resolve_payload(node, ctx)?;

        tracing::debug!(
            execution_id = %ctx.execution_id,
            node_id = node.id.as_str(),
            operation,
            "running processing operation"
        );

        let output = self
            .provider
            .process(operation, &payload)
            .await
            .map_err(|e| NodeError::Transient(e.to_string()))?;

        let status = output.get("status").and_then(Value::as_str).unwrap_or("");
        if status != "success" {
            let message = output
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("processing returned non-success status");
            return Err(NodeError::Transient(format!(
                "operation '{operation}' failed: {message}"
            )));
        }

        Ok(NodeExecutionResult::success(output))
    }

    fn validate(&self, node: &WorkflowNode) -> bool {
        node.config_str("processingType")
            .is_some_and(|s| !s.trim().is_empty())
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            name: "Processing".to_string(),
            description: "Runs one processing operation through the processing provider"
                .to_string(),
            category: "compute".to_string(),
            config_schema: json!({
                "type": "object",
                "properties": {
                    "processingType": { "type": "string" },
                    "inputNode": { "type": "string" }
                },
                "required": ["processingType"]
            }),
            required_config: vec!["processingType".to_string()],
            outputs: vec!["status".to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use terraflow_types::workflow::NodeKind;
    use uuid::Uuid;

    use crate::workflow::compensation::CompensationManager;

    struct FakeProcessing {
        status: &'static str,
    }

    #[async_trait]
    impl ProcessingProvider for FakeProcessing {
        async fn process(
            &self,
            operation: &str,
            payload: &HashMap<String, Value>,
        ) -> anyhow::Result<HashMap<String, Value>> {
            Ok(HashMap::from([
                ("status".to_string(), json!(self.status)),
                ("operation".to_string(), json!(operation)),
                ("inputFields".to_string(), json!(payload.len())),
            ]))
        }
    }

    fn ctx() -> ExecutionContext {
        ExecutionContext::new(
            Uuid::now_v7(),
            Uuid::now_v7(),
            Uuid::now_v7(),
            "analyst@example.com",
            HashMap::new(),
            Arc::new(CompensationManager::new()),
        )
    }

    fn node(config: HashMap<String, Value>) -> WorkflowNode {
        WorkflowNode::new("ndvi", NodeKind::Processing, config)
    }

    #[tokio::test]
    async fn test_processes_explicit_input_node() {
        let executor = ProcessingExecutor::new(Arc::new(FakeProcessing { status: "success" }));
        let mut ctx = ctx();
        ctx.record_output(
            "load",
            HashMap::from([("sceneId".to_string(), json!("S2A"))]),
        )
        .unwrap();

        let node = node(HashMap::from([
            ("processingType".to_string(), json!("ndvi")),
            ("inputNode".to_string(), json!("load")),
        ]));
        let result = executor.execute(&node, &mut ctx).await.unwrap();
        assert!(result.success);
        assert_eq!(result.data["operation"], json!("ndvi"));
        assert_eq!(result.data["inputFields"], json!(1));
    }

    #[tokio::test]
    async fn test_missing_input_node_output_is_internal() {
        let executor = ProcessingExecutor::new(Arc::new(FakeProcessing { status: "success" }));
        let node = node(HashMap::from([
            ("processingType".to_string(), json!("ndvi")),
            ("inputNode".to_string(), json!("never-ran")),
        ]));
        let err = executor.execute(&node, &mut ctx()).await.unwrap_err();
        assert!(matches!(err, NodeError::Internal(_)));
    }

    #[tokio::test]
    async fn test_latest_output_fallback() {
        let executor = ProcessingExecutor::new(Arc::new(FakeProcessing { status: "success" }));
        let mut ctx = ctx();
        ctx.record_output(
            "load",
            HashMap::from([("sceneId".to_string(), json!("S2A"))]),
        )
        .unwrap();

        let node = node(HashMap::from([(
            "processingType".to_string(),
            json!("ndvi"),
        )]));
        let result = executor.execute(&node, &mut ctx).await.unwrap();
        assert_eq!(result.data["inputFields"], json!(1));
    }

    #[tokio::test]
    async fn test_non_success_status_is_retryable_failure() {
        let executor = ProcessingExecutor::new(Arc::new(FakeProcessing { status: "queued" }));
        let node = node(HashMap::from([(
            "processingType".to_string(),
            json!("ndvi"),
        )]));
        let err = executor.execute(&node, &mut ctx()).await.unwrap_err();
        assert!(matches!(err, NodeError::Transient(_)));
    }

    #[test]
    fn test_validate_requires_processing_type() {
        let executor = ProcessingExecutor::new(Arc::new(FakeProcessing { status: "success" }));
        assert!(!executor.validate(&node(HashMap::new())));
        assert!(executor.validate(&node(HashMap::from([(
            "processingType".to_string(),
            json!("ndvi")
        )]))));
    }
}
