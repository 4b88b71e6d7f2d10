//! Per-task-type retry policy resolution.
//!
//! The resolver maps a task-type key (the node kind's string form) to its
//! `RetryPolicy`. Unregistered task types fall back to `RetryPolicy::default()`
//! so a newly added node kind always has bounded retry behaviour.

use std::collections::HashMap;

use terraflow_types::retry::{BackoffStrategy, ErrorKind, RetryPolicy};

/// Resolves retry policies by task type. Immutable after construction.
pub struct RetryPolicyResolver {
    policies: HashMap<String, RetryPolicy>,
}

impl RetryPolicyResolver {
    /// An empty resolver; everything gets the default policy.
    pub fn empty() -> Self {
        Self {
            policies: HashMap::new(),
        }
    }

    /// The built-in per-task-type defaults.
    ///
    /// Data loads get the largest budget because upstream imagery catalogs
    /// rate-limit aggressively; triggers are nearly local and get two fixed
    /// attempts.
    pub fn with_defaults() -> Self {
        let mut resolver = Self::empty();
        resolver.register(
            "data-input",
            RetryPolicy {
                max_attempts: 5,
                initial_delay_ms: 2_000,
                multiplier: 2.0,
                max_delay_ms: 30_000,
                strategy: BackoffStrategy::Exponential,
                retryable: vec![ErrorKind::Transient, ErrorKind::Timeout],
                timeout_secs: 120,
            },
        );
        resolver.register(
            "processing",
            RetryPolicy {
                max_attempts: 3,
                initial_delay_ms: 1_000,
                multiplier: 1.5,
                max_delay_ms: 10_000,
                strategy: BackoffStrategy::Exponential,
                retryable: vec![ErrorKind::Transient, ErrorKind::Timeout],
                timeout_secs: 600,
            },
        );
        resolver.register(
            "output",
            RetryPolicy {
                max_attempts: 4,
                initial_delay_ms: 500,
                multiplier: 2.0,
                max_delay_ms: 8_000,
                strategy: BackoffStrategy::Exponential,
                retryable: vec![ErrorKind::Transient, ErrorKind::Timeout],
                timeout_secs: 60,
            },
        );
        resolver.register(
            "trigger",
            RetryPolicy {
                max_attempts: 2,
                initial_delay_ms: 500,
                multiplier: 1.0,
                max_delay_ms: 500,
                strategy: BackoffStrategy::Fixed,
                retryable: vec![ErrorKind::Transient],
                timeout_secs: 30,
            },
        );
        resolver
    }

    /// Register or replace the policy for a task type.
    pub fn register(&mut self, task_type: impl Into<String>, policy: RetryPolicy) {
        self.policies.insert(task_type.into(), policy);
    }

    /// Policy for a task type, falling back to the documented default.
    pub fn policy_for(&self, task_type: &str) -> RetryPolicy {
        self.policies
            .get(task_type)
            .cloned()
            .unwrap_or_default()
    }
}
