//! Common types for eval-hub: errors, Kubernetes client helpers and retries

#![deny(missing_docs)]

pub mod error;
pub mod kube_utils;
pub mod retry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Default namespace evaluation resources are created in
pub const DEFAULT_NAMESPACE: &str = "default";

/// Label key identifying the component that manages a resource
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Value of [`LABEL_MANAGED_BY`] for resources created by eval-hub
pub const LABEL_MANAGED_BY_EVALHUB: &str = "eval-hub";

/// Label key for the (sanitized) evaluation job id
pub const LABEL_JOB_ID: &str = "evalhub.io/job-id";

/// Label key for the (sanitized) benchmark id
pub const LABEL_BENCHMARK_ID: &str = "evalhub.io/benchmark-id";

/// Label key for the (sanitized) provider id
pub const LABEL_PROVIDER_ID: &str = "evalhub.io/provider-id";

/// Annotation key carrying the unmodified evaluation job id
pub const ANNOTATION_JOB_ID: &str = "evalhub.io/job-id";

/// Annotation key carrying the unmodified benchmark id
pub const ANNOTATION_BENCHMARK_ID: &str = "evalhub.io/benchmark-id";
