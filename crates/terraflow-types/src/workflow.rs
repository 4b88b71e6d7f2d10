//! Workflow domain types for terraflow.
//!
//! Defines the canonical representation of a workflow: an append-only list of
//! versioned graph snapshots (nodes + edges) with a pointer to the currently
//! active version. This module also contains execution tracking types
//! (`WorkflowExecution`, `ExecutionLog`) and per-node result types.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Node and edge model
// ---------------------------------------------------------------------------

/// The kind of node in a workflow graph.
///
/// Each kind is handled by a matching executor resolved through the registry;
/// the engine itself never inspects the kind beyond dispatch and decision
/// routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeKind {
    Trigger,
    DataInput,
    Processing,
    Decision,
    Output,
}

impl NodeKind {
    /// Stable string key used for retry policies and error statistics.
    pub fn task_type(self) -> &'static str {
        match self {
            NodeKind::Trigger => "trigger",
            NodeKind::DataInput => "data-input",
            NodeKind::Processing => "processing",
            NodeKind::Decision => "decision",
            NodeKind::Output => "output",
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.task_type())
    }
}

/// Canvas position of a node. Cosmetic only, irrelevant to execution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodePosition {
    pub x: f64,
    pub y: f64,
}

/// A single node in a workflow graph version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowNode {
    /// Node ID, unique within its version.
    pub id: String,
    /// Node kind, used to resolve the matching executor.
    #[serde(rename = "type")]
    pub kind: NodeKind,
    /// Human-readable label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Visual builder position. Omitted from serialized form when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<NodePosition>,
    /// Executor-specific configuration, interpreted by the matching executor.
    #[serde(default)]
    pub config: HashMap<String, Value>,
}

impl WorkflowNode {
    /// Build a node with the given id, kind, and config entries.
    pub fn new(
        id: impl Into<String>,
        kind: NodeKind,
        config: HashMap<String, Value>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            name: None,
            position: None,
            config,
        }
    }

    /// Fetch a config value as a string slice.
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(Value::as_str)
    }
}

/// The kind of edge connecting two nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// Always followed once the source node completes.
    #[default]
    Default,
    /// Followed only when the source decision's selected path matches the
    /// edge label.
    Conditional,
}

/// A directed edge between two nodes in the same version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowEdge {
    /// Source node ID.
    pub source: String,
    /// Target node ID.
    pub target: String,
    /// Branch label for conditional edges (e.g. "true" / "false").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Edge kind.
    #[serde(default)]
    pub kind: EdgeKind,
}

impl WorkflowEdge {
    /// Build an unconditional edge.
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            label: None,
            kind: EdgeKind::Default,
        }
    }

    /// Build a conditional edge carrying a branch label.
    pub fn conditional(
        source: impl Into<String>,
        target: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            label: Some(label.into()),
            kind: EdgeKind::Conditional,
        }
    }
}

// ---------------------------------------------------------------------------
// Workflow aggregate with append-only versions
// ---------------------------------------------------------------------------

/// One immutable snapshot of a workflow graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowVersion {
    /// Semantic version string (e.g. "1.0.0").
    pub version: String,
    /// Nodes in declaration order. Order is the tie-break for scheduling.
    pub nodes: Vec<WorkflowNode>,
    /// Edges between nodes of this version.
    #[serde(default)]
    pub edges: Vec<WorkflowEdge>,
    /// What changed relative to the previous version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changelog: Option<String>,
    /// Who created this version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    /// When this version was created.
    pub created_at: DateTime<Utc>,
}

/// Errors raised by workflow version bookkeeping.
#[derive(Debug, thiserror::Error)]
pub enum VersionError {
    #[error("version '{0}' is not valid semver: {1}")]
    InvalidVersion(String, String),

    #[error("version '{0}' already exists")]
    DuplicateVersion(String),

    #[error("version '{0}' not found")]
    UnknownVersion(String),
}

/// A workflow: name, append-only version history, and the active version.
///
/// Invariants maintained by the methods below:
/// - `current_version` resolves to an entry of `versions` (deserialized
///   workflows can violate this; `current()` reports it as an error)
/// - versions are append-only; existing snapshots are never mutated
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    /// UUIDv7 assigned on creation.
    pub id: Uuid,
    /// Human-readable workflow name.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Version string of the active version.
    pub current_version: String,
    /// Version history, oldest first.
    pub versions: Vec<WorkflowVersion>,
    /// Maximum concurrent executions of this workflow (None = unlimited).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent_runs: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Workflow {
    /// Create a workflow with an initial version.
    pub fn new(
        name: impl Into<String>,
        initial: WorkflowVersion,
    ) -> Result<Self, VersionError> {
        validate_semver(&initial.version)?;
        let now = Utc::now();
        Ok(Self {
            id: Uuid::now_v7(),
            name: name.into(),
            description: None,
            current_version: initial.version.clone(),
            versions: vec![initial],
            max_concurrent_runs: None,
            created_by: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Append a new version and move the current pointer to it.
    ///
    /// Rejects duplicate or non-semver version strings; never mutates
    /// existing snapshots.
    pub fn append_version(&mut self, version: WorkflowVersion) -> Result<(), VersionError> {
        validate_semver(&version.version)?;
        if self.versions.iter().any(|v| v.version == version.version) {
            return Err(VersionError::DuplicateVersion(version.version));
        }
        self.current_version = version.version.clone();
        self.versions.push(version);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Look up a version snapshot by its version string.
    pub fn version(&self, version: &str) -> Result<&WorkflowVersion, VersionError> {
        self.versions
            .iter()
            .find(|v| v.version == version)
            .ok_or_else(|| VersionError::UnknownVersion(version.to_string()))
    }

    /// The currently active version snapshot.
    ///
    /// `new` and `append_version` keep the pointer valid, but the fields are
    /// public and the struct deserializes, so a stale pointer is reachable
    /// and surfaces as `UnknownVersion` instead of panicking.
    pub fn current(&self) -> Result<&WorkflowVersion, VersionError> {
        self.version(&self.current_version)
    }
}

fn validate_semver(version: &str) -> Result<(), VersionError> {
    semver::Version::parse(version)
        .map(|_| ())
        .map_err(|e| VersionError::InvalidVersion(version.to_string(), e.to_string()))
}

// ---------------------------------------------------------------------------
// Node execution results
// ---------------------------------------------------------------------------

/// The outcome of a single node execution. Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeExecutionResult {
    /// Whether the node completed successfully.
    pub success: bool,
    /// Output data, readable by downstream nodes via dot-path lookup.
    #[serde(default)]
    pub data: HashMap<String, Value>,
    /// Human-readable outcome message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Non-fatal warnings collected during execution.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    /// Executor-specific metadata, never read by the engine.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

impl NodeExecutionResult {
    /// A successful result carrying output data.
    pub fn success(data: HashMap<String, Value>) -> Self {
        Self {
            success: true,
            data,
            message: None,
            warnings: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    /// A failed result with a human-readable message.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: HashMap::new(),
            message: Some(message.into()),
            warnings: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    /// Attach a message (builder-style, consumed and returned).
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Attach a warning (builder-style, consumed and returned).
    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Execution records
// ---------------------------------------------------------------------------

/// Overall status of a workflow execution.
///
/// `Running` is entered exactly once; `Completed`, `Failed`, and `Cancelled`
/// are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    /// Whether this status is terminal (no further transitions).
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }
}

/// Status of one node within an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    /// Reached only via a decision branch that was not selected.
    Skipped,
}

/// Severity of an execution log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

/// One structured log entry attached to an execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionLog {
    pub timestamp: DateTime<Utc>,
    /// Node ID the entry refers to, or "system" for engine-level entries.
    pub node_id: String,
    pub level: LogLevel,
    pub message: String,
}

impl ExecutionLog {
    /// Build an entry timestamped now.
    pub fn new(node_id: impl Into<String>, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            node_id: node_id.into(),
            level,
            message: message.into(),
        }
    }
}

/// A single execution instance of a workflow version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecution {
    /// UUIDv7 execution ID.
    pub id: Uuid,
    /// ID of the workflow being executed.
    pub workflow_id: Uuid,
    /// Version string of the snapshot used.
    pub version: String,
    /// Current status.
    pub status: ExecutionStatus,
    /// User that triggered this execution.
    pub triggered_by: String,
    /// Correlation ID threaded through all log output of this run.
    pub correlation_id: Uuid,
    /// Input parameters supplied at creation.
    #[serde(default)]
    pub parameters: HashMap<String, Value>,
    /// Ordered structured log entries.
    #[serde(default)]
    pub logs: Vec<ExecutionLog>,
    /// Per-node results, keyed by node ID. Skipped nodes are absent.
    #[serde(default)]
    pub node_results: HashMap<String, NodeExecutionResult>,
    /// Per-node statuses, including skipped nodes.
    #[serde(default)]
    pub node_statuses: HashMap<String, NodeRunStatus>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Final error message when the execution failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkflowExecution {
    /// Create a pending execution for a workflow version.
    pub fn new(
        workflow_id: Uuid,
        version: impl Into<String>,
        triggered_by: impl Into<String>,
        parameters: HashMap<String, Value>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            workflow_id,
            version: version.into(),
            status: ExecutionStatus::Pending,
            triggered_by: triggered_by.into(),
            correlation_id: Uuid::now_v7(),
            parameters,
            logs: Vec::new(),
            node_results: HashMap::new(),
            node_statuses: HashMap::new(),
            started_at: Utc::now(),
            completed_at: None,
            error: None,
        }
    }

    /// Append a log entry timestamped now.
    pub fn log(&mut self, node_id: &str, level: LogLevel, message: impl Into<String>) {
        self.logs.push(ExecutionLog::new(node_id, level, message));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
