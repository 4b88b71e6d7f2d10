//! Retry policy configuration and error records.
//!
//! A `RetryPolicy` describes how failures of one task type are retried:
//! attempt budget, backoff strategy, delay bounds, which error kinds are
//! retryable, and the per-attempt execution timeout. Policies are plain data;
//! the resolver and retry loop live in the engine crate.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Error classification
// ---------------------------------------------------------------------------

/// Classification of a node failure, used for retry decisions and stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad node configuration or input. Never retried.
    Validation,
    /// Temporary failure (network, upstream hiccup). Retryable.
    Transient,
    /// The attempt exceeded the policy timeout. Retryable.
    Timeout,
    /// Unexpected internal failure. Not retried by default.
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Transient => "transient",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded failure of a node attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// Task-type key of the failing node (e.g. "data-input").
    pub task_type: String,
    /// Node ID within the workflow version.
    pub node_id: String,
    /// Execution the failure belongs to.
    pub execution_id: Uuid,
    /// 1-based attempt number.
    pub attempt: u32,
    pub timestamp: DateTime<Utc>,
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorRecord {
    /// Build a record timestamped now.
    pub fn new(
        task_type: impl Into<String>,
        node_id: impl Into<String>,
        execution_id: Uuid,
        attempt: u32,
        kind: ErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            task_type: task_type.into(),
            node_id: node_id.into(),
            execution_id,
            attempt,
            timestamp: Utc::now(),
            kind,
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Backoff
// ---------------------------------------------------------------------------

/// How the delay between attempts grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Constant delay: `initial`.
    Fixed,
    /// Delay grows linearly: `initial * attempt`.
    Linear,
    /// Delay grows geometrically: `initial * multiplier^(attempt - 1)`,
    /// capped at `max_delay`.
    #[default]
    Exponential,
}

/// Retry behaviour for one task type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum attempts including the first (1 = no retries).
    pub max_attempts: u32,
    /// Base delay before the first retry, in milliseconds.
    pub initial_delay_ms: u64,
    /// Growth factor for the exponential strategy.
    pub multiplier: f64,
    /// Upper bound on any single delay, in milliseconds.
    pub max_delay_ms: u64,
    pub strategy: BackoffStrategy,
    /// Error kinds that qualify for a retry.
    pub retryable: Vec<ErrorKind>,
    /// Per-attempt execution timeout, in seconds.
    pub timeout_secs: u64,
}

impl Default for RetryPolicy {
    /// The fallback policy applied to unregistered task types.
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1_000,
            multiplier: 2.0,
            max_delay_ms: 15_000,
            strategy: BackoffStrategy::Exponential,
            retryable: vec![ErrorKind::Transient, ErrorKind::Timeout],
            timeout_secs: 300,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the given 1-based attempt fails.
    ///
    /// Attempt numbers below 1 are clamped to 1 so a miscounted caller gets
    /// the initial delay rather than a zero or negative exponent.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let millis = match self.strategy {
            BackoffStrategy::Fixed => self.initial_delay_ms,
            BackoffStrategy::Linear => self.initial_delay_ms.saturating_mul(attempt as u64),
            BackoffStrategy::Exponential => {
                let grown =
                    self.initial_delay_ms as f64 * self.multiplier.powi(attempt as i32 - 1);
                if grown.is_finite() {
                    grown.min(self.max_delay_ms as f64) as u64
                } else {
                    self.max_delay_ms
                }
            }
        };
        Duration::from_millis(millis.min(self.max_delay_ms))
    }

    /// Whether another attempt should be made after a failure of `kind` on
    /// the given 1-based attempt.
    ///
    /// Validation failures are terminal regardless of configuration.
    pub fn should_retry(&self, attempt: u32, kind: ErrorKind) -> bool {
        if kind == ErrorKind::Validation {
            return false;
        }
        attempt < self.max_attempts && self.retryable.contains(&kind)
    }

    /// Per-attempt execution timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
