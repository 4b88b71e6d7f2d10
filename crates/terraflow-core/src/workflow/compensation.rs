//! LIFO compensation stacks for partial-failure cleanup.
//!
//! Each node that produces an external side effect registers an undo action
//! for its execution. When the execution fails terminally, the actions run in
//! reverse registration order. A failing action is logged and the drain
//! continues; compensation is best-effort, never transactional. On success
//! the stack is discarded without running anything.

use std::path::PathBuf;

use dashmap::DashMap;
use futures_util::future::BoxFuture;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// CompensationAction
// ---------------------------------------------------------------------------

type ActionFn = Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// One undo action with a human-readable description for logging.
pub struct CompensationAction {
    description: String,
    action: ActionFn,
}

impl CompensationAction {
    /// Wrap an async closure as a compensation action.
    pub fn new<F, Fut>(description: impl Into<String>, f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            description: description.into(),
            action: Box::new(move || Box::pin(f())),
        }
    }

    /// Delete a file created during execution.
    pub fn delete_file(path: PathBuf) -> Self {
        Self::new(format!("delete file {}", path.display()), move || async move {
            tokio::fs::remove_file(&path).await?;
            Ok(())
        })
    }

    /// Delete a directory (recursively) created during execution.
    pub fn delete_dir(path: PathBuf) -> Self {
        Self::new(format!("delete directory {}", path.display()), move || async move {
            tokio::fs::remove_dir_all(&path).await?;
            Ok(())
        })
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    async fn run(self) -> anyhow::Result<()> {
        (self.action)().await
    }
}

impl std::fmt::Debug for CompensationAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompensationAction")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// CompensationManager
// ---------------------------------------------------------------------------

/// Outcome of draining one execution's compensation stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompensationOutcome {
    pub executed: usize,
    pub failed: usize,
}

/// Per-execution LIFO stacks of undo actions, shared across executions.
#[derive(Default)]
pub struct CompensationManager {
    stacks: DashMap<Uuid, Vec<CompensationAction>>,
}

impl CompensationManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push an undo action onto the execution's stack.
    pub fn register(&self, execution_id: Uuid, action: CompensationAction) {
        tracing::debug!(
            execution_id = %execution_id,
            action = action.description(),
            "registered compensation action"
        );
        self.stacks.entry(execution_id).or_default().push(action);
    }

    /// Number of pending actions for an execution.
    pub fn pending(&self, execution_id: Uuid) -> usize {
        self.stacks.get(&execution_id).map_or(0, |s| s.len())
    }

    /// Run all registered actions in reverse registration order.
    ///
    /// An action's own failure is logged and the remaining actions still run.
    pub async fn compensate(&self, execution_id: Uuid) -> CompensationOutcome {
        let Some((_, mut stack)) = self.stacks.remove(&execution_id) else {
            return CompensationOutcome::default();
        };

        let mut outcome = CompensationOutcome::default();
        while let Some(action) = stack.pop() {
            let description = action.description().to_string();
            outcome.executed += 1;
            match action.run().await {
                Ok(()) => {
                    tracing::info!(
                        execution_id = %execution_id,
                        action = description.as_str(),
                        "compensation action completed"
                    );
                }
                Err(e) => {
                    outcome.failed += 1;
                    tracing::warn!(
                        execution_id = %execution_id,
                        action = description.as_str(),
                        error = %e,
                        "compensation action failed, continuing"
                    );
                }
            }
        }
        outcome
    }

    /// Drop the stack without running anything (successful execution).
    pub fn discard(&self, execution_id: Uuid) -> usize {
        self.stacks
            .remove(&execution_id)
            .map_or(0, |(_, stack)| stack.len())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::Mutex;

    fn recording_action(
        label: &str,
        log: Arc<Mutex<Vec<String>>>,
        fail: bool,
    ) -> CompensationAction {
        let label = label.to_string();
        CompensationAction::new(label.clone(), move || async move {
            log.lock().unwrap().push(label.clone());
            if fail {
                anyhow::bail!("undo of {label} failed");
            }
            Ok(())
        })
    }

    #[test]
    fn test_manager_shared_across_tasks() {
        fn assert_send_sync<T: Send + Sync>() {}
        // registered actions cross task boundaries inside the engine
        assert_send_sync::<CompensationAction>();
        assert_send_sync::<CompensationManager>();
    }

    #[tokio::test]
    async fn test_compensation_runs_in_reverse_order() {
        let manager = CompensationManager::new();
        let execution_id = Uuid::now_v7();
        let log = Arc::new(Mutex::new(Vec::new()));

        for label in ["first", "second", "third"] {
            manager.register(execution_id, recording_action(label, Arc::clone(&log), false));
        }

        let outcome = manager.compensate(execution_id).await;
        assert_eq!(outcome.executed, 3);
        assert_eq!(outcome.failed, 0);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["third", "second", "first"],
            "LIFO order"
        );
    }

    #[tokio::test]
    async fn test_failing_action_does_not_abort_drain() {
        let manager = CompensationManager::new();
        let execution_id = Uuid::now_v7();
        let log = Arc::new(Mutex::new(Vec::new()));

        manager.register(execution_id, recording_action("a", Arc::clone(&log), false));
        manager.register(execution_id, recording_action("b", Arc::clone(&log), true));
        manager.register(execution_id, recording_action("c", Arc::clone(&log), false));

        let outcome = manager.compensate(execution_id).await;
        assert_eq!(outcome.executed, 3);
        assert_eq!(outcome.failed, 1);
        assert_eq!(*log.lock().unwrap(), vec!["c", "b", "a"]);
    }

    #[tokio::test]
    async fn test_discard_clears_without_running() {
        let manager = CompensationManager::new();
        let execution_id = Uuid::now_v7();
        let log = Arc::new(Mutex::new(Vec::new()));

        manager.register(execution_id, recording_action("a", Arc::clone(&log), false));
        manager.register(execution_id, recording_action("b", Arc::clone(&log), false));
        assert_eq!(manager.pending(execution_id), 2);

        let cleared = manager.discard(execution_id);
        assert_eq!(cleared, 2);
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(manager.pending(execution_id), 0);
    }

    #[tokio::test]
    async fn test_compensate_unknown_execution_is_noop() {
        let manager = CompensationManager::new();
        let outcome = manager.compensate(Uuid::now_v7()).await;
        assert_eq!(outcome, CompensationOutcome::default());
    }

    #[tokio::test]
    async fn test_delete_file_action() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scene.tif");
        std::fs::write(&path, b"bands").unwrap();

        let manager = CompensationManager::new();
        let execution_id = Uuid::now_v7();
        manager.register(execution_id, CompensationAction::delete_file(path.clone()));

        let outcome = manager.compensate(execution_id).await;
        assert_eq!(outcome.failed, 0);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_stacks_are_isolated_per_execution() {
        let manager = CompensationManager::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let exec_a = Uuid::now_v7();
        let exec_b = Uuid::now_v7();

        manager.register(exec_a, recording_action("a", Arc::clone(&log), false));
        manager.register(exec_b, recording_action("b", Arc::clone(&log), false));

        manager.compensate(exec_a).await;
        assert_eq!(*log.lock().unwrap(), vec!["a"]);
        assert_eq!(manager.pending(exec_b), 1);
    }
}
