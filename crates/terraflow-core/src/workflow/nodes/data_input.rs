//! Data-input node executor.
//!
//! Delegates the actual fetch to the injected `DataSourceProvider` and
//! records the returned metadata map as the node's output. Provider failures
//! are retryable; the catalog defaults give this task type the largest retry
//! budget.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use terraflow_types::workflow::{NodeExecutionResult, WorkflowNode};

use super::DataSourceProvider;
use crate::workflow::context::ExecutionContext;
use crate::workflow::registry::{NodeError, NodeExecutor, NodeMetadata};

pub struct DataInputExecutor {
    provider: Arc<dyn DataSourceProvider>,
}

impl DataInputExecutor {
    pub fn new(provider: Arc<dyn DataSourceProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl NodeExecutor for DataInputExecutor {
    async fn execute(
        &self,
        node: &WorkflowNode,
        ctx: &mut ExecutionContext,
    ) -> Result<NodeExecutionResult, NodeError> {
        let data_source = node
            .config_str("dataSource")
            .ok_or_else(|| NodeError::Validation("missing 'dataSource' config".to_string()))?;

        tracing::debug!(
            execution_id = %ctx.execution_id,
            node_id = node.id.as_str(),
            data_source,
            "fetching source data"
        );

        let data = self
            .provider
            .fetch(&node.config)
            .await
            .map_err(|e| NodeError::Transient(e.to_string()))?;

        Ok(NodeExecutionResult::success(data)
            .with_message(format!("loaded data from '{data_source}'")))
    }

    fn validate(&self, node: &WorkflowNode) -> bool {
        node.config_str("dataSource")
            .is_some_and(|s| !s.trim().is_empty())
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            name: "Data Input".to_string(),
            description: "Loads source data through the configured data source provider"
                .to_string(),
            category: "data".to_string(),
            config_schema: json!({
                "type": "object",
                "properties": {
                    "dataSource": { "type": "string" }
                },
                "required": ["dataSource"]
            }),
            required_config: vec!["dataSource".to_string()],
            outputs: vec![],
        }
    }
}
