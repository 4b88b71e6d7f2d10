//! Error tracking: bounded failure history and cumulative statistics.
//!
//! One `ErrorTracker` is shared across all executions. Per task type it keeps
//! the last `MAX_RECENT_ERRORS` records in a ring buffer plus counters that
//! survive buffer eviction. Clearing is an explicit admin operation
//! (`reset`), never implicit.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use terraflow_types::retry::{ErrorKind, ErrorRecord};

/// Ring buffer capacity per task type.
pub const MAX_RECENT_ERRORS: usize = 100;

// ---------------------------------------------------------------------------
// Read-side views
// ---------------------------------------------------------------------------

/// Cumulative statistics for one task type.
#[derive(Debug, Clone, Serialize)]
pub struct TaskErrorStats {
    pub task_type: String,
    /// All-time failure count, unaffected by ring buffer eviction.
    pub total_errors: u64,
    pub errors_by_kind: HashMap<ErrorKind, u64>,
    pub first_error_at: DateTime<Utc>,
    pub last_error_at: DateTime<Utc>,
}

/// Aggregate view across all task types.
#[derive(Debug, Clone, Serialize, Default)]
pub struct ErrorSummary {
    pub total_errors: u64,
    pub errors_by_task_type: HashMap<String, u64>,
}

// ---------------------------------------------------------------------------
// ErrorTracker
// ---------------------------------------------------------------------------

struct TaskErrorState {
    recent: VecDeque<ErrorRecord>,
    total: u64,
    by_kind: HashMap<ErrorKind, u64>,
    first_at: DateTime<Utc>,
    last_at: DateTime<Utc>,
}

/// Concurrency-safe error history, keyed by task type.
#[derive(Default)]
pub struct ErrorTracker {
    states: DashMap<String, TaskErrorState>,
}

impl ErrorTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one failure. Evicts the oldest record past the buffer cap.
    pub fn record(&self, record: ErrorRecord) {
        let mut entry = self
            .states
            .entry(record.task_type.clone())
            .or_insert_with(|| TaskErrorState {
                recent: VecDeque::with_capacity(MAX_RECENT_ERRORS),
                total: 0,
                by_kind: HashMap::new(),
                first_at: record.timestamp,
                last_at: record.timestamp,
            });

        entry.total += 1;
        *entry.by_kind.entry(record.kind).or_insert(0) += 1;
        entry.last_at = record.timestamp;
        if entry.recent.len() == MAX_RECENT_ERRORS {
            entry.recent.pop_front();
        }
        entry.recent.push_back(record);
    }

    /// Cumulative stats for one task type, `None` if it never failed.
    pub fn stats(&self, task_type: &str) -> Option<TaskErrorStats> {
        self.states.get(task_type).map(|state| TaskErrorStats {
            task_type: task_type.to_string(),
            total_errors: state.total,
            errors_by_kind: state.by_kind.clone(),
            first_error_at: state.first_at,
            last_error_at: state.last_at,
        })
    }

    /// The most recent records for a task type, newest last.
    pub fn recent_errors(&self, task_type: &str, limit: usize) -> Vec<ErrorRecord> {
        self.states.get(task_type).map_or_else(Vec::new, |state| {
            let skip = state.recent.len().saturating_sub(limit);
            state.recent.iter().skip(skip).cloned().collect()
        })
    }

    /// Aggregate totals across all task types.
    pub fn summary(&self) -> ErrorSummary {
        let mut summary = ErrorSummary::default();
        for entry in self.states.iter() {
            summary.total_errors += entry.total;
            summary
                .errors_by_task_type
                .insert(entry.key().clone(), entry.total);
        }
        summary
    }

    /// Clear all history and counters. Admin operation.
    pub fn reset(&self) {
        self.states.clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
