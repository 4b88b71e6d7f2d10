//! Orchestrator facade: create, inspect, and cancel workflow executions.
//!
//! `create_execution` validates the graph up front, spawns the engine run as
//! its own task, and returns the execution id immediately. Execution records
//! live in an in-memory map and are returned as snapshots; a persistence
//! layer can subscribe outside the engine.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use terraflow_types::retry::ErrorRecord;
use terraflow_types::workflow::{
    ExecutionStatus, NodeKind, VersionError, Workflow, WorkflowExecution,
};
use tokio::sync::{RwLock, Semaphore};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::compensation::CompensationManager;
use super::context::ExecutionContext;
use super::engine::ExecutionEngine;
use super::graph::{GraphError, WorkflowGraph};
use super::registry::{ExecutorRegistry, NodeExecutor, NodeMetadata, RegistryError};
use super::retry::RetryPolicyResolver;
use super::tracker::{ErrorSummary, ErrorTracker, TaskErrorStats};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Version(#[from] VersionError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("workflow '{0}' is at its concurrent execution limit")]
    ConcurrencyLimitReached(String),

    #[error("unknown execution '{0}'")]
    UnknownExecution(Uuid),

    #[error("execution '{0}' already finished")]
    AlreadyFinished(Uuid),
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// The engine's public face. One instance serves all workflows.
pub struct Orchestrator {
    registry: Arc<ExecutorRegistry>,
    engine: Arc<ExecutionEngine>,
    tracker: Arc<ErrorTracker>,
    compensation: Arc<CompensationManager>,
    executions: DashMap<Uuid, Arc<RwLock<WorkflowExecution>>>,
    cancellation_tokens: Arc<DashMap<Uuid, CancellationToken>>,
    /// Per-workflow concurrency semaphores keyed by workflow name.
    concurrency_semaphores: DashMap<String, Arc<Semaphore>>,
}

impl Orchestrator {
    /// Build an orchestrator around a caller-owned error tracker.
    ///
    /// The tracker outlives individual executions; `ErrorTracker::reset` is
    /// the only way to clear its history.
    pub fn new(policies: RetryPolicyResolver, tracker: Arc<ErrorTracker>) -> Self {
        let registry = Arc::new(ExecutorRegistry::new());
        let compensation = Arc::new(CompensationManager::new());
        let engine = Arc::new(ExecutionEngine::new(
            Arc::clone(&registry),
            Arc::new(policies),
            Arc::clone(&tracker),
            Arc::clone(&compensation),
        ));
        Self {
            registry,
            engine,
            tracker,
            compensation,
            executions: DashMap::new(),
            cancellation_tokens: Arc::new(DashMap::new()),
            concurrency_semaphores: DashMap::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Executor registration
    // -----------------------------------------------------------------------

    /// Register or replace the executor for a node kind.
    pub fn register_executor(&self, kind: NodeKind, executor: Arc<dyn NodeExecutor>) {
        self.registry.register(kind, executor);
    }

    /// Introspection metadata for a registered node kind.
    pub fn node_metadata(&self, kind: NodeKind) -> Result<NodeMetadata, ServiceError> {
        Ok(self.registry.metadata(kind)?)
    }

    pub fn registry(&self) -> &Arc<ExecutorRegistry> {
        &self.registry
    }

    // -----------------------------------------------------------------------
    // Execution lifecycle
    // -----------------------------------------------------------------------

    /// Validate and start an execution; returns its id immediately.
    ///
    /// `version` selects a snapshot from the workflow's history; `None` uses
    /// the current version. The run itself happens on a spawned task.
    pub fn create_execution(
        &self,
        workflow: &Workflow,
        version: Option<&str>,
        parameters: HashMap<String, Value>,
        triggered_by: &str,
    ) -> Result<Uuid, ServiceError> {
        let snapshot = match version {
            Some(v) => workflow.version(v)?,
            None => workflow.current()?,
        }
        .clone();

        // Surface structural problems before anything is spawned.
        WorkflowGraph::build(&snapshot)?;

        let permit = self.acquire_permit(workflow)?;

        let execution = WorkflowExecution::new(
            workflow.id,
            &snapshot.version,
            triggered_by,
            parameters.clone(),
        );
        let execution_id = execution.id;

        let mut ctx = ExecutionContext::new(
            workflow.id,
            execution_id,
            execution.correlation_id,
            triggered_by,
            parameters,
            Arc::clone(&self.compensation),
        );

        let token = CancellationToken::new();
        self.cancellation_tokens.insert(execution_id, token.clone());

        let lock = Arc::new(RwLock::new(execution));
        self.executions.insert(execution_id, Arc::clone(&lock));

        tracing::info!(
            execution_id = %execution_id,
            workflow = workflow.name.as_str(),
            version = snapshot.version.as_str(),
            triggered_by,
            "execution created"
        );

        let engine = Arc::clone(&self.engine);
        let tokens = Arc::clone(&self.cancellation_tokens);
        tokio::spawn(async move {
            // Held for the duration of the run.
            let _permit = permit;
            if let Err(e) = engine.run(&snapshot, &lock, &mut ctx, &token).await {
                // Only reachable for a structurally invalid snapshot, which
                // create_execution already rejected.
                tracing::error!(
                    execution_id = %execution_id,
                    error = %e,
                    "engine run aborted"
                );
                let mut exec = lock.write().await;
                exec.status = ExecutionStatus::Failed;
                exec.error = Some(e.to_string());
                exec.completed_at = Some(Utc::now());
            }
            tokens.remove(&execution_id);
        });

        Ok(execution_id)
    }

    /// Snapshot of an execution: status, logs, per-node results.
    pub async fn execution(&self, id: Uuid) -> Result<WorkflowExecution, ServiceError> {
        let entry = self
            .executions
            .get(&id)
            .ok_or(ServiceError::UnknownExecution(id))?;
        let lock = Arc::clone(entry.value());
        drop(entry);
        Ok(lock.read().await.clone())
    }

    /// Request cooperative cancellation; the current node finishes first.
    pub async fn cancel_execution(&self, id: Uuid) -> Result<(), ServiceError> {
        let snapshot = self.execution(id).await?;
        if snapshot.status.is_terminal() {
            return Err(ServiceError::AlreadyFinished(id));
        }
        if let Some(token) = self.cancellation_tokens.get(&id) {
            tracing::info!(execution_id = %id, "cancellation requested");
            token.cancel();
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Error monitoring surface
    // -----------------------------------------------------------------------

    pub fn error_stats(&self, task_type: &str) -> Option<TaskErrorStats> {
        self.tracker.stats(task_type)
    }

    pub fn recent_errors(&self, task_type: &str, limit: usize) -> Vec<ErrorRecord> {
        self.tracker.recent_errors(task_type, limit)
    }

    pub fn error_summary(&self) -> ErrorSummary {
        self.tracker.summary()
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn acquire_permit(
        &self,
        workflow: &Workflow,
    ) -> Result<Option<tokio::sync::OwnedSemaphorePermit>, ServiceError> {
        let Some(max) = workflow.max_concurrent_runs else {
            return Ok(None);
        };
        let semaphore = self
            .concurrency_semaphores
            .entry(workflow.name.clone())
            .or_insert_with(|| Arc::new(Semaphore::new(max as usize)))
            .clone();
        let permit = semaphore
            .try_acquire_owned()
            .map_err(|_| ServiceError::ConcurrencyLimitReached(workflow.name.clone()))?;
        Ok(Some(permit))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
