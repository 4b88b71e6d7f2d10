//! Execution context: per-run mutable state with node output tracking.
//!
//! `ExecutionContext` is exclusively owned by its execution; executors borrow
//! it mutably one at a time, so none of its fields need locking. It stores
//! node outputs keyed by node id, user-defined variables, the input
//! parameters, and identity fields, with size limits to prevent unbounded
//! memory growth.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};
use uuid::Uuid;

use super::compensation::{CompensationAction, CompensationManager};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum serialized size of a single node output (1 MB).
pub const MAX_NODE_OUTPUT_SIZE: usize = 1_048_576;

/// Maximum total serialized size of all context data (10 MB).
pub const MAX_CONTEXT_SIZE: usize = 10_485_760;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("total context size ({actual} bytes) exceeds maximum ({max} bytes)")]
    ContextTooLarge { actual: usize, max: usize },

    #[error("failed to serialize node output: {0}")]
    Serialize(String),
}

// ---------------------------------------------------------------------------
// ExecutionContext
// ---------------------------------------------------------------------------

/// Mutable state that flows through one workflow execution.
pub struct ExecutionContext {
    pub workflow_id: Uuid,
    pub execution_id: Uuid,
    /// Threaded through all tracing output of this run.
    pub correlation_id: Uuid,
    pub triggered_by: String,
    /// Input parameters supplied when the execution was created.
    pub parameters: HashMap<String, Value>,
    /// Outputs of completed nodes, keyed by node id.
    node_outputs: HashMap<String, HashMap<String, Value>>,
    /// User-defined variables set by executors.
    variables: HashMap<String, Value>,
    /// Id of the node whose output was recorded last.
    last_output_node: Option<String>,
    compensation: Arc<CompensationManager>,
}

impl ExecutionContext {
    pub fn new(
        workflow_id: Uuid,
        execution_id: Uuid,
        correlation_id: Uuid,
        triggered_by: impl Into<String>,
        parameters: HashMap<String, Value>,
        compensation: Arc<CompensationManager>,
    ) -> Self {
        Self {
            workflow_id,
            execution_id,
            correlation_id,
            triggered_by: triggered_by.into(),
            parameters,
            node_outputs: HashMap::new(),
            variables: HashMap::new(),
            last_output_node: None,
            compensation,
        }
    }

    /// Record the output of a completed node.
    ///
    /// A single output above `MAX_NODE_OUTPUT_SIZE` is replaced with a marker
    /// map describing the overflow. Exceeding `MAX_CONTEXT_SIZE` in total is
    /// an error.
    pub fn record_output(
        &mut self,
        node_id: &str,
        output: HashMap<String, Value>,
    ) -> Result<(), ContextError> {
        let serialized =
            serde_json::to_string(&output).map_err(|e| ContextError::Serialize(e.to_string()))?;

        if serialized.len() > MAX_NODE_OUTPUT_SIZE {
            tracing::warn!(
                node_id,
                size = serialized.len(),
                max = MAX_NODE_OUTPUT_SIZE,
                "node output exceeds size limit, truncating"
            );
            let truncated = HashMap::from([
                ("_truncated".to_string(), json!(true)),
                ("_original_size".to_string(), json!(serialized.len())),
            ]);
            self.node_outputs.insert(node_id.to_string(), truncated);
        } else {
            self.node_outputs.insert(node_id.to_string(), output);
        }
        self.last_output_node = Some(node_id.to_string());

        let total = self.total_size();
        if total > MAX_CONTEXT_SIZE {
            return Err(ContextError::ContextTooLarge {
                actual: total,
                max: MAX_CONTEXT_SIZE,
            });
        }
        Ok(())
    }

    /// The full output map of a completed node.
    pub fn output(&self, node_id: &str) -> Option<&HashMap<String, Value>> {
        self.node_outputs.get(node_id)
    }

    /// Dot-path lookup: `"nodeId.field"` or deeper (`"nodeId.stats.mean"`).
    ///
    /// The first segment names the producing node; the rest traverse nested
    /// JSON objects. Returns `None` for unknown nodes or missing fields.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let node_id = segments.next()?;
        let field = segments.next()?;
        let mut value = self.node_outputs.get(node_id)?.get(field)?;
        for segment in segments {
            value = value.get(segment)?;
        }
        Some(value)
    }

    /// Output of the most recently completed node.
    ///
    /// Compatibility shim for configs written without an explicit input node
    /// reference; new configs should always name their input node.
    pub fn latest_output(&self) -> Option<&HashMap<String, Value>> {
        self.last_output_node
            .as_deref()
            .and_then(|id| self.node_outputs.get(id))
    }

    pub fn set_variable(&mut self, name: impl Into<String>, value: Value) {
        self.variables.insert(name.into(), value);
    }

    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    /// Register an undo action for this execution's compensation stack.
    pub fn push_compensation(&self, action: CompensationAction) {
        self.compensation.register(self.execution_id, action);
    }

    /// Total serialized size of outputs, variables, and parameters in bytes.
    pub fn total_size(&self) -> usize {
        let outputs: usize = self
            .node_outputs
            .values()
            .map(|v| serde_json::to_string(v).map(|s| s.len()).unwrap_or(0))
            .sum();
        let variables: usize = self
            .variables
            .values()
            .map(|v| serde_json::to_string(v).map(|s| s.len()).unwrap_or(0))
            .sum();
        let parameters: usize = self
            .parameters
            .values()
            .map(|v| serde_json::to_string(v).map(|s| s.len()).unwrap_or(0))
            .sum();
        outputs + variables + parameters
    }

    /// Build the JSON object passed to expression evaluation.
    ///
    /// Shape:
    /// ```json
    /// {
    ///   "nodes": { "<node_id>": { <output fields> }, ... },
    ///   "parameters": { ... },
    ///   "variables": { ... },
    ///   "workflow": { "id": "...", "execution_id": "...", "triggered_by": "..." }
    /// }
    /// ```
    pub fn to_expression_context(&self) -> Value {
        let mut nodes = serde_json::Map::new();
        for (id, output) in &self.node_outputs {
            nodes.insert(id.clone(), json!(output));
        }

        json!({
            "nodes": nodes,
            "parameters": self.parameters,
            "variables": self.variables,
            "workflow": {
                "id": self.workflow_id.to_string(),
                "execution_id": self.execution_id.to_string(),
                "triggered_by": self.triggered_by,
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
