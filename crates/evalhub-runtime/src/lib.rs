//! Kubernetes runtime dispatch for eval-hub evaluation jobs
//!
//! For every benchmark of an [`EvaluationJob`], the [`RuntimeDispatcher`]:
//! - resolves the benchmark's provider and its Kubernetes runtime adapter
//! - renders the benchmark's configuration into a ConfigMap
//! - creates a Job that runs the adapter image with that ConfigMap mounted
//!
//! Validation covers the whole job before anything is created. Object names
//! are a pure function of (job id, benchmark id), which makes
//! [`RuntimeDispatcher::teardown`] repeatable without stored state.

#![deny(missing_docs)]

pub mod cluster;
pub mod dispatcher;
pub mod error;
pub mod naming;
pub mod provider;
pub mod render;
pub mod resources;
pub mod storage;
pub mod types;

pub use cluster::{ClusterClient, ClusterError, DeletePropagation, KubeClusterClient};
pub use dispatcher::{
    validate_job, BenchmarkResources, DispatcherConfig, RuntimeDispatcher, ValidatedBenchmark,
    DEFAULT_API_TIMEOUT,
};
pub use error::{ConfigurationError, ConfigurationErrors, RuntimeError, TeardownErrors};
pub use naming::{config_map_name, job_name, ResourceNames};
pub use provider::{EnvVar, K8sRuntime, ProviderCatalog, ProviderRegistry, ProviderResource, Runtime};
pub use render::{render_benchmark_config, CONFIG_FILE_KEY};
pub use resources::{compile_benchmark, CompiledBenchmark, ResourceSettings};
pub use storage::{BenchmarkState, EvaluationStorage, StorageError};
pub use types::{BenchmarkConfig, EvaluationJob, EvaluationJobConfig, ModelRef};
