//! Dispatch error types
//!
//! Configuration problems are the caller's fault and are reported for every
//! benchmark at once. Cluster problems may be transient; callers inspect
//! [`RuntimeError::is_retryable`] to decide whether to try again.

use std::fmt;

use thiserror::Error;

use crate::cluster::ClusterError;

/// Why a single benchmark's runtime configuration was rejected
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// The benchmark names a provider the registry does not know
    #[error("benchmark '{benchmark}': provider '{provider}' not found")]
    ProviderNotFound {
        /// Benchmark id
        benchmark: String,
        /// Unknown provider id
        provider: String,
    },

    /// The provider declares no Kubernetes runtime adapter
    #[error("benchmark '{benchmark}': provider '{provider}' has no kubernetes runtime adapter")]
    MissingRuntimeAdapter {
        /// Benchmark id
        benchmark: String,
        /// Provider id
        provider: String,
    },

    /// The adapter's image is empty
    #[error("benchmark '{benchmark}': runtime adapter image is required (provider '{provider}')")]
    MissingImage {
        /// Benchmark id
        benchmark: String,
        /// Provider id
        provider: String,
    },

    /// Anything else malformed about the benchmark or its adapter
    #[error("benchmark '{benchmark}': {message}")]
    MalformedBenchmark {
        /// Benchmark id (or `#<index>` if the id is empty)
        benchmark: String,
        /// What is malformed
        message: String,
    },
}

impl ConfigurationError {
    /// Benchmark this error refers to
    pub fn benchmark(&self) -> &str {
        match self {
            Self::ProviderNotFound { benchmark, .. }
            | Self::MissingRuntimeAdapter { benchmark, .. }
            | Self::MissingImage { benchmark, .. }
            | Self::MalformedBenchmark { benchmark, .. } => benchmark,
        }
    }

    /// True for an unknown provider
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ProviderNotFound { .. })
    }
}

/// All configuration errors of one job, in benchmark order
#[derive(Debug, Default)]
pub struct ConfigurationErrors(Vec<ConfigurationError>);

impl ConfigurationErrors {
    /// Create an empty collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error
    pub fn push(&mut self, err: ConfigurationError) {
        self.0.push(err);
    }

    /// Individual errors
    pub fn errors(&self) -> &[ConfigurationError] {
        &self.0
    }

    /// Number of errors
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Ids of the benchmarks that have at least one error
    pub fn benchmarks(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = Vec::new();
        for err in &self.0 {
            if !ids.contains(&err.benchmark()) {
                ids.push(err.benchmark());
            }
        }
        ids
    }
}

impl fmt::Display for ConfigurationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid evaluation job configuration: ")?;
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", err)?;
        }
        Ok(())
    }
}

impl std::error::Error for ConfigurationErrors {}

/// One failed delete during teardown
#[derive(Debug, Error)]
#[error("benchmark '{benchmark}': failed to delete {kind} '{name}': {source}")]
pub struct TeardownFailure {
    /// Benchmark id
    pub benchmark: String,
    /// Object kind
    pub kind: &'static str,
    /// Object name
    pub name: String,
    /// Underlying failure
    #[source]
    pub source: ClusterError,
}

/// All failed deletes of one teardown call
#[derive(Debug, Default)]
pub struct TeardownErrors(pub Vec<TeardownFailure>);

impl TeardownErrors {
    /// Individual failures
    pub fn failures(&self) -> &[TeardownFailure] {
        &self.0
    }
}

impl fmt::Display for TeardownErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, failure) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", failure)?;
        }
        Ok(())
    }
}

/// Error returned by the runtime dispatcher
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Validation rejected the job; nothing was created
    #[error(transparent)]
    InvalidConfiguration(#[from] ConfigurationErrors),

    /// The ConfigMap payload could not be rendered
    #[error("failed to render configuration for benchmark '{benchmark}': {source}")]
    Serialization {
        /// Benchmark id
        benchmark: String,
        /// Underlying serde error
        #[source]
        source: serde_json::Error,
    },

    /// Creating an object failed; earlier benchmarks were left in place
    #[error(
        "failed to create {kind} '{name}' for benchmark '{benchmark}' (already submitted: [{}]): {source}",
        .submitted.join(", ")
    )]
    Submission {
        /// Benchmark whose submission failed
        benchmark: String,
        /// Kind of the object that failed
        kind: &'static str,
        /// Name of the object that failed
        name: String,
        /// Benchmarks fully submitted before the failure, in order
        submitted: Vec<String>,
        /// Underlying failure
        #[source]
        source: ClusterError,
    },

    /// One or more deletes failed during teardown
    #[error("teardown of job '{job_id}' failed: {errors}")]
    Teardown {
        /// Job id
        job_id: String,
        /// Failed deletes
        errors: TeardownErrors,
    },

    /// A read-only lookup failed
    #[error("failed to look up {kind} '{name}': {source}")]
    Cluster {
        /// Object kind
        kind: &'static str,
        /// Object name
        name: String,
        /// Underlying failure
        #[source]
        source: ClusterError,
    },
}

impl RuntimeError {
    /// True when the request itself is at fault (maps to a 4xx response)
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidConfiguration(_))
    }

    /// True if a caller-level retry could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::InvalidConfiguration(_) | Self::Serialization { .. } => false,
            Self::Submission { source, .. } | Self::Cluster { source, .. } => source.is_retryable(),
            Self::Teardown { errors, .. } => errors.0.iter().any(|f| f.source.is_retryable()),
        }
    }

    /// Configuration errors, if validation rejected the job
    pub fn configuration_errors(&self) -> Option<&ConfigurationErrors> {
        match self {
            Self::InvalidConfiguration(errors) => Some(errors),
            _ => None,
        }
    }
}
