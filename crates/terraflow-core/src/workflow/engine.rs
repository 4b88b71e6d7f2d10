//! Sequential topological execution with retries, skipping, and compensation.
//!
//! The engine runs one execution's nodes in deterministic topological order
//! inside a single async task; concurrency across executions comes from the
//! orchestrator spawning one engine run per execution.
//!
//! # Per-node flow
//!
//! 1. Cooperative cancellation check (the current node always finishes).
//! 2. Liveness check: a node runs when at least one incoming edge is live,
//!    i.e. its source executed and the edge is unconditional or its label
//!    matches the source decision's selected path. Dead nodes are SKIPPED.
//! 3. Resolve the executor and run its structural `validate` pre-check; a
//!    failed pre-check is a terminal validation error, never retried.
//! 4. Execute under the policy timeout, retrying per the task type's policy.
//!    Every failed attempt is recorded with the shared error tracker.
//! 5. On exhausted retries the execution fails, remaining nodes are left
//!    untouched, and the compensation stack drains in LIFO order.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use terraflow_types::retry::{ErrorKind, ErrorRecord};
use terraflow_types::workflow::{
    EdgeKind, ExecutionStatus, LogLevel, NodeKind, NodeRunStatus, WorkflowExecution,
    WorkflowNode, WorkflowVersion,
};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use super::compensation::CompensationManager;
use super::context::ExecutionContext;
use super::graph::{GraphError, WorkflowGraph};
use super::nodes::decision::SELECTED_PATH_FIELD;
use super::registry::ExecutorRegistry;
use super::retry::RetryPolicyResolver;
use super::tracker::ErrorTracker;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Infrastructure failures that prevent an execution from starting.
///
/// Node failures are not errors at this level; they are recorded in the
/// execution itself.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Graph(#[from] GraphError),
}

// ---------------------------------------------------------------------------
// ExecutionEngine
// ---------------------------------------------------------------------------

/// Runs one workflow version to completion, mutating the shared execution
/// record as it goes.
pub struct ExecutionEngine {
    registry: Arc<ExecutorRegistry>,
    policies: Arc<RetryPolicyResolver>,
    tracker: Arc<ErrorTracker>,
    compensation: Arc<CompensationManager>,
}

impl ExecutionEngine {
    pub fn new(
        registry: Arc<ExecutorRegistry>,
        policies: Arc<RetryPolicyResolver>,
        tracker: Arc<ErrorTracker>,
        compensation: Arc<CompensationManager>,
    ) -> Self {
        Self {
            registry,
            policies,
            tracker,
            compensation,
        }
    }

    /// Execute all nodes of a version in topological order.
    ///
    /// Always leaves the execution in a terminal status on return; `Err` is
    /// only possible for a structurally invalid version, before RUNNING is
    /// entered.
    pub async fn run(
        &self,
        version: &WorkflowVersion,
        execution: &RwLock<WorkflowExecution>,
        ctx: &mut ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        let graph = WorkflowGraph::build(version)?;
        let order = graph.topological_order();

        let execution_id = {
            let mut exec = execution.write().await;
            exec.status = ExecutionStatus::Running;
            exec.log("system", LogLevel::Info, "execution started");
            for node in &order {
                exec.node_statuses
                    .insert(node.id.clone(), NodeRunStatus::Pending);
            }
            exec.id
        };

        tracing::info!(
            execution_id = %execution_id,
            correlation_id = %ctx.correlation_id,
            version = version.version.as_str(),
            nodes = order.len(),
            "starting workflow execution"
        );

        // Nodes that ran to success, and the branch each decision selected.
        let mut executed: HashSet<String> = HashSet::new();
        let mut selected_paths: HashMap<String, String> = HashMap::new();

        for node in order {
            if cancel.is_cancelled() {
                self.finish_cancelled(execution).await;
                return Ok(());
            }

            if !is_live(&graph, node, &executed, &selected_paths) {
                tracing::debug!(
                    execution_id = %execution_id,
                    node_id = node.id.as_str(),
                    "node skipped, no live incoming edge"
                );
                let mut exec = execution.write().await;
                exec.node_statuses
                    .insert(node.id.clone(), NodeRunStatus::Skipped);
                exec.log(&node.id, LogLevel::Info, "skipped, branch not selected");
                continue;
            }

            let executor = match self.registry.resolve(node.kind) {
                Ok(executor) => executor,
                Err(e) => {
                    self.record_failure(
                        execution_id,
                        node,
                        1,
                        ErrorKind::Validation,
                        e.to_string(),
                    );
                    self.finish_failed(execution, &node.id, e.to_string()).await;
                    return Ok(());
                }
            };

            if !executor.validate(node) {
                let message = format!("node '{}' failed config validation", node.id);
                self.record_failure(execution_id, node, 1, ErrorKind::Validation, message.clone());
                execution
                    .write()
                    .await
                    .log(&node.id, LogLevel::Error, message.clone());
                self.finish_failed(execution, &node.id, message).await;
                return Ok(());
            }

            {
                let mut exec = execution.write().await;
                exec.node_statuses
                    .insert(node.id.clone(), NodeRunStatus::Running);
                exec.log(&node.id, LogLevel::Info, format!("executing {} node", node.kind));
            }

            let policy = self.policies.policy_for(node.kind.task_type());
            let mut attempt: u32 = 1;

            loop {
                let outcome =
                    tokio::time::timeout(policy.timeout(), executor.execute(node, ctx)).await;

                let failure: (ErrorKind, String) = match outcome {
                    Ok(Ok(result)) if result.success => {
                        match ctx.record_output(&node.id, result.data.clone()) {
                            Ok(()) => {
                                if node.kind == NodeKind::Decision {
                                    if let Some(path) = result
                                        .data
                                        .get(SELECTED_PATH_FIELD)
                                        .and_then(|v| v.as_str())
                                    {
                                        selected_paths.insert(node.id.clone(), path.to_string());
                                    }
                                }

                                let mut exec = execution.write().await;
                                exec.node_statuses
                                    .insert(node.id.clone(), NodeRunStatus::Completed);
                                for warning in &result.warnings {
                                    exec.log(&node.id, LogLevel::Warning, warning.clone());
                                }
                                exec.log(&node.id, LogLevel::Info, "node completed");
                                exec.node_results.insert(node.id.clone(), result);
                                executed.insert(node.id.clone());
                                break;
                            }
                            // context overflow is not worth retrying
                            Err(e) => (ErrorKind::Internal, e.to_string()),
                        }
                    }
                    Ok(Ok(result)) => (
                        ErrorKind::Transient,
                        result
                            .message
                            .unwrap_or_else(|| "node reported failure".to_string()),
                    ),
                    Ok(Err(node_err)) => (node_err.kind(), node_err.to_string()),
                    Err(_elapsed) => (
                        ErrorKind::Timeout,
                        format!("attempt exceeded {}s timeout", policy.timeout_secs),
                    ),
                };

                let (kind, message) = failure;
                self.record_failure(execution_id, node, attempt, kind, message.clone());
                execution.write().await.log(
                    &node.id,
                    LogLevel::Error,
                    format!("attempt {attempt} failed ({kind}): {message}"),
                );

                if policy.should_retry(attempt, kind) && !cancel.is_cancelled() {
                    let delay = policy.delay_for(attempt);
                    tracing::warn!(
                        execution_id = %execution_id,
                        node_id = node.id.as_str(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "retrying node after backoff"
                    );
                    execution.write().await.log(
                        &node.id,
                        LogLevel::Info,
                        format!(
                            "retrying (attempt {} of {}) after {}ms",
                            attempt + 1,
                            policy.max_attempts,
                            delay.as_millis()
                        ),
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                } else {
                    self.finish_failed(execution, &node.id, message).await;
                    return Ok(());
                }
            }
        }

        // Success: the undo stack is discarded without running.
        let cleared = self.compensation.discard(execution_id);
        if cleared > 0 {
            tracing::debug!(
                execution_id = %execution_id,
                actions = cleared,
                "discarded compensation actions on success"
            );
        }

        let mut exec = execution.write().await;
        exec.status = ExecutionStatus::Completed;
        exec.completed_at = Some(Utc::now());
        exec.log("system", LogLevel::Info, "execution completed");
        tracing::info!(execution_id = %execution_id, "workflow execution completed");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Terminal transitions
    // -----------------------------------------------------------------------

    fn record_failure(
        &self,
        execution_id: uuid::Uuid,
        node: &WorkflowNode,
        attempt: u32,
        kind: ErrorKind,
        message: String,
    ) {
        tracing::warn!(
            execution_id = %execution_id,
            node_id = node.id.as_str(),
            task_type = node.kind.task_type(),
            attempt,
            kind = %kind,
            error = message.as_str(),
            "node attempt failed"
        );
        self.tracker.record(ErrorRecord::new(
            node.kind.task_type(),
            &node.id,
            execution_id,
            attempt,
            kind,
            message,
        ));
    }

    async fn finish_failed(
        &self,
        execution: &RwLock<WorkflowExecution>,
        node_id: &str,
        message: String,
    ) {
        let execution_id = {
            let mut exec = execution.write().await;
            exec.node_statuses
                .insert(node_id.to_string(), NodeRunStatus::Failed);
            exec.status = ExecutionStatus::Failed;
            exec.error = Some(message.clone());
            exec.completed_at = Some(Utc::now());
            exec.log("system", LogLevel::Error, format!("execution failed: {message}"));
            exec.id
        };

        tracing::error!(
            execution_id = %execution_id,
            node_id,
            error = message.as_str(),
            "workflow execution failed"
        );

        let outcome = self.compensation.compensate(execution_id).await;
        if outcome.executed > 0 {
            execution.write().await.log(
                "system",
                LogLevel::Info,
                format!(
                    "ran {} compensation action(s), {} failed",
                    outcome.executed, outcome.failed
                ),
            );
        }
    }

    async fn finish_cancelled(&self, execution: &RwLock<WorkflowExecution>) {
        let execution_id = {
            let mut exec = execution.write().await;
            exec.status = ExecutionStatus::Cancelled;
            exec.completed_at = Some(Utc::now());
            exec.log("system", LogLevel::Info, "execution cancelled");
            exec.id
        };

        tracing::info!(execution_id = %execution_id, "workflow execution cancelled");

        // Undo side effects of the nodes that did run.
        let outcome = self.compensation.compensate(execution_id).await;
        if outcome.executed > 0 {
            execution.write().await.log(
                "system",
                LogLevel::Info,
                format!(
                    "ran {} compensation action(s), {} failed",
                    outcome.executed, outcome.failed
                ),
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Liveness
// ---------------------------------------------------------------------------

/// A node is live when it is a root, or at least one incoming edge comes
/// from an executed node and is unconditional or matches the selected path.
fn is_live(
    graph: &WorkflowGraph<'_>,
    node: &WorkflowNode,
    executed: &HashSet<String>,
    selected_paths: &HashMap<String, String>,
) -> bool {
    if graph.is_root(&node.id) {
        return true;
    }
    graph.incoming(&node.id).any(|edge| {
        if !executed.contains(&edge.source) {
            return false;
        }
        match edge.kind {
            EdgeKind::Default => true,
            EdgeKind::Conditional => {
                edge.label.as_deref() == selected_paths.get(&edge.source).map(String::as_str)
            }
        }
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
