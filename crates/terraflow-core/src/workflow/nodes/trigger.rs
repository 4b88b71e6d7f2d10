//! Trigger node executor.
//!
//! Triggers are entry points; by the time the engine runs one, the execution
//! already exists, so the executor only records how the run started.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use terraflow_types::workflow::{NodeExecutionResult, WorkflowNode};

use crate::workflow::context::ExecutionContext;
use crate::workflow::registry::{NodeError, NodeExecutor, NodeMetadata};

/// Self-contained executor for trigger nodes.
#[derive(Default)]
pub struct TriggerExecutor;

impl TriggerExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NodeExecutor for TriggerExecutor {
    async fn execute(
        &self,
        node: &WorkflowNode,
        ctx: &mut ExecutionContext,
    ) -> Result<NodeExecutionResult, NodeError> {
        let trigger_type = node.config_str("triggerType").unwrap_or("manual");
        tracing::info!(
            execution_id = %ctx.execution_id,
            node_id = node.id.as_str(),
            trigger_type,
            "workflow triggered"
        );

        Ok(NodeExecutionResult::success(HashMap::from([
            ("triggerType".to_string(), json!(trigger_type)),
            ("triggeredBy".to_string(), json!(ctx.triggered_by)),
            ("triggeredAt".to_string(), json!(Utc::now().to_rfc3339())),
            ("parameters".to_string(), json!(ctx.parameters)),
        ])))
    }

    fn validate(&self, node: &WorkflowNode) -> bool {
        // triggerType is optional but must be a string when present
        node.config
            .get("triggerType")
            .is_none_or(|v| v.is_string())
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            name: "Trigger".to_string(),
            description: "Entry point recording how the execution started".to_string(),
            category: "control".to_string(),
            config_schema: json!({
                "type": "object",
                "properties": {
                    "triggerType": { "type": "string", "default": "manual" }
                }
            }),
            required_config: vec![],
            outputs: vec![
                "triggerType".to_string(),
                "triggeredBy".to_string(),
                "triggeredAt".to_string(),
                "parameters".to_string(),
            ],
        }
    }
}
