//! Decision node executor.
//!
//! Evaluates the node's condition against the execution context and records
//! the selected path. The engine reads `selectedPath` from the output to
//! decide which conditional edges are live.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::json;
use terraflow_types::workflow::{NodeExecutionResult, WorkflowNode};

use crate::workflow::condition::ConditionEvaluator;
use crate::workflow::context::ExecutionContext;
use crate::workflow::registry::{NodeError, NodeExecutor, NodeMetadata};

/// Output field carrying the selected branch label.
pub const SELECTED_PATH_FIELD: &str = "selectedPath";

#[derive(Default)]
pub struct DecisionExecutor {
    evaluator: ConditionEvaluator,
}

impl DecisionExecutor {
    pub fn new() -> Self {
        Self {
            evaluator: ConditionEvaluator::new(),
        }
    }
}

#[async_trait]
impl NodeExecutor for DecisionExecutor {
    async fn execute(
        &self,
        node: &WorkflowNode,
        ctx: &mut ExecutionContext,
    ) -> Result<NodeExecutionResult, NodeError> {
        // Evaluation is deterministic over the node's config and the current
        // context, so a failure cannot be fixed by retrying.
        let condition_met = self
            .evaluator
            .evaluate(node, ctx)
            .map_err(|e| NodeError::Validation(e.to_string()))?;

        let selected_path = if condition_met { "true" } else { "false" };
        tracing::info!(
            execution_id = %ctx.execution_id,
            node_id = node.id.as_str(),
            selected_path,
            "decision evaluated"
        );

        Ok(NodeExecutionResult::success(HashMap::from([
            ("conditionMet".to_string(), json!(condition_met)),
            (SELECTED_PATH_FIELD.to_string(), json!(selected_path)),
        ])))
    }

    fn validate(&self, node: &WorkflowNode) -> bool {
        match node.config_str("conditionType").unwrap_or("comparison") {
            "expression" => node.config_str("expression").is_some(),
            "comparison" => {
                node.config_str("field").is_some()
                    && node.config_str("operator").is_some()
                    && node.config.contains_key("value")
            }
            "threshold" => node.config_str("field").is_some() && node.config.contains_key("value"),
            "data-check" => node.config_str("field").is_some(),
            _ => false,
        }
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            name: "Decision".to_string(),
            description: "Selects a branch by evaluating a condition over node outputs"
                .to_string(),
            category: "control".to_string(),
            config_schema: json!({
                "type": "object",
                "properties": {
                    "conditionType": {
                        "type": "string",
                        "enum": ["comparison", "threshold", "data-check", "expression"],
                        "default": "comparison"
                    },
                    "field": { "type": "string" },
                    "operator": { "type": "string" },
                    "value": {},
                    "check": { "type": "string" },
                    "expression": { "type": "string" }
                }
            }),
            required_config: vec![],
            outputs: vec!["conditionMet".to_string(), SELECTED_PATH_FIELD.to_string()],
        }
    }
}
