//! Output node executor.
//!
//! Delivers the resolved payload through the `OutputSink` and registers a
//! compensation action that revokes the delivery if the execution later
//! fails.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use terraflow_types::workflow::{NodeExecutionResult, WorkflowNode};

use super::processing::resolve_payload;
use super::OutputSink;
use crate::workflow::compensation::CompensationAction;
use crate::workflow::context::ExecutionContext;
use crate::workflow::registry::{NodeError, NodeExecutor, NodeMetadata};

pub struct OutputExecutor {
    sink: Arc<dyn OutputSink>,
}

impl OutputExecutor {
    pub fn new(sink: Arc<dyn OutputSink>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl NodeExecutor for OutputExecutor {
    async fn execute(
        &self,
        node: &WorkflowNode,
        ctx: &mut ExecutionContext,
    ) -> Result<NodeExecutionResult, NodeError> {
        let destination = node
            .config_str("destination")
            .ok_or_else(|| NodeError::Validation("missing 'destination' config".to_string()))?;
        let payload = resolve_payload(node, ctx)?;

        let location = self
            .sink
            .deliver(destination, &payload)
            .await
            .map_err(|e| NodeError::Transient(e.to_string()))?;

        tracing::info!(
            execution_id = %ctx.execution_id,
            node_id = node.id.as_str(),
            destination,
            location = location.as_str(),
            "payload delivered"
        );

        // Undo the delivery if a later node fails terminally.
        let sink = Arc::clone(&self.sink);
        let undo_location = location.clone();
        ctx.push_compensation(CompensationAction::new(
            format!("revoke delivery at {location}"),
            move || async move { sink.revoke(&undo_location).await },
        ));

        Ok(NodeExecutionResult::success(HashMap::from([
            ("destination".to_string(), json!(destination)),
            ("location".to_string(), json!(location)),
            ("status".to_string(), json!("delivered")),
        ])))
    }

    fn validate(&self, node: &WorkflowNode) -> bool {
        node.config_str("destination")
            .is_some_and(|s| !s.trim().is_empty())
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            name: "Output".to_string(),
            description: "Delivers a payload to a destination through the output sink"
                .to_string(),
            category: "data".to_string(),
            config_schema: json!({
                "type": "object",
                "properties": {
                    "destination": { "type": "string" },
                    "inputNode": { "type": "string" }
                },
                "required": ["destination"]
            }),
            required_config: vec!["destination".to_string()],
            outputs: vec![
                "destination".to_string(),
                "location".to_string(),
                "status".to_string(),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use std::sync::Mutex;
    use terraflow_types::workflow::NodeKind;
    use uuid::Uuid;

    use crate::workflow::compensation::CompensationManager;

    #[derive(Default)]
    struct FakeSink {
        delivered: Mutex<Vec<String>>,
        revoked: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl OutputSink for FakeSink {
        async fn deliver(
            &self,
            destination: &str,
            _payload: &HashMap<String, Value>,
        ) -> anyhow::Result<String> {
            let location = format!("{destination}/result-1");
            self.delivered.lock().unwrap().push(location.clone());
            Ok(location)
        }

        async fn revoke(&self, location: &str) -> anyhow::Result<()> {
            self.revoked.lock().unwrap().push(location.to_string());
            Ok(())
        }
    }

    fn ctx(compensation: Arc<CompensationManager>) -> ExecutionContext {
        ExecutionContext::new(
            Uuid::now_v7(),
            Uuid::now_v7(),
            Uuid::now_v7(),
            "analyst@example.com",
            HashMap::new(),
            compensation,
        )
    }

    fn node() -> WorkflowNode {
        WorkflowNode::new(
            "publish",
            NodeKind::Output,
            HashMap::from([("destination".to_string(), json!("catalog"))]),
        )
    }

    #[tokio::test]
    async fn test_deliver_records_location() {
        let sink = Arc::new(FakeSink::default());
        let dyn_sink: Arc<dyn OutputSink> = sink.clone();
        let executor = OutputExecutor::new(dyn_sink);
        let mut ctx = ctx(Arc::new(CompensationManager::new()));

        let result = executor.execute(&node(), &mut ctx).await.unwrap();
        assert!(result.success);
        assert_eq!(result.data["location"], json!("catalog/result-1"));
        assert_eq!(result.data["status"], json!("delivered"));
        assert_eq!(sink.delivered.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delivery_registers_revoke_compensation() {
        let sink = Arc::new(FakeSink::default());
        let dyn_sink: Arc<dyn OutputSink> = sink.clone();
        let executor = OutputExecutor::new(dyn_sink);
        let compensation = Arc::new(CompensationManager::new());
        let mut ctx = ctx(Arc::clone(&compensation));
        let execution_id = ctx.execution_id;

        executor.execute(&node(), &mut ctx).await.unwrap();
        assert_eq!(compensation.pending(execution_id), 1);

        compensation.compensate(execution_id).await;
        assert_eq!(
            *sink.revoked.lock().unwrap(),
            vec!["catalog/result-1".to_string()]
        );
    }

    #[tokio::test]
    async fn test_missing_destination_is_validation() {
        let executor = OutputExecutor::new(Arc::new(FakeSink::default()));
        let bare = WorkflowNode::new("publish", NodeKind::Output, HashMap::new());
        let mut ctx = ctx(Arc::new(CompensationManager::new()));

        let err = executor.execute(&bare, &mut ctx).await.unwrap_err();
        assert!(matches!(err, NodeError::Validation(_)));
        assert!(!executor.validate(&bare));
    }
}
