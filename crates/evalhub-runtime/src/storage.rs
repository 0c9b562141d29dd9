//! Optional storage handle for per-benchmark dispatch state
//!
//! The persistence layer itself lives elsewhere; the dispatcher only reports
//! what happened to each benchmark through this trait.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

/// Outcome of dispatching one benchmark
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BenchmarkState {
    /// The job was rejected during validation; nothing was created
    Invalid {
        /// Aggregated validation message
        reason: String,
    },
    /// Both the ConfigMap and the Job were created
    Submitted,
    /// Submission of this benchmark failed
    Failed {
        /// Error message
        reason: String,
    },
}

/// Failure reported by a storage backend
#[derive(Debug, Error)]
#[error("storage error: {message}")]
pub struct StorageError {
    /// What went wrong
    pub message: String,
}

impl StorageError {
    /// Create a storage error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Receives dispatch state for benchmarks
#[cfg_attr(test, automock)]
#[async_trait]
pub trait EvaluationStorage: Send + Sync {
    /// Record the state of `benchmark_id` within `job_id`
    async fn record_benchmark_state(
        &self,
        job_id: &str,
        benchmark_id: &str,
        state: BenchmarkState,
    ) -> Result<(), StorageError>;
}
