//! RuntimeDispatcher: turns an evaluation job into one Job + ConfigMap per benchmark
//!
//! Dispatch runs in two phases:
//! - Validation: every benchmark is checked against the provider registry.
//!   Any failure rejects the whole job before a single object is created.
//! - Submission: benchmarks are submitted in order, ConfigMap first, then the
//!   Job that mounts it. The first failure stops submission; objects created
//!   for earlier benchmarks stay in place and are listed in the error.
//!   Objects left by an earlier run of the same job are adopted, so running
//!   the job again resumes where it failed.
//!
//! Object names are derived from (job id, benchmark id), so teardown and
//! inspection need nothing but those ids. Every cluster call runs under
//! [`DispatcherConfig::api_timeout`].

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Resource;
use tracing::{debug, error, info, warn};

use evalhub_common::{ANNOTATION_BENCHMARK_ID, ANNOTATION_JOB_ID};

use crate::cluster::{
    ClusterClient, ClusterError, DeletePropagation, CONFIG_OBJECT_KIND, EXECUTION_UNIT_KIND,
};
use crate::error::{
    ConfigurationError, ConfigurationErrors, RuntimeError, TeardownErrors, TeardownFailure,
};
use crate::naming::ResourceNames;
use crate::provider::{K8sRuntime, ProviderRegistry};
use crate::resources::{compile_benchmark, ResourceSettings, RESERVED_ENV_VARS};
use crate::storage::{BenchmarkState, EvaluationStorage};
use crate::types::{BenchmarkConfig, EvaluationJob};

/// Default deadline for a single cluster API call
pub const DEFAULT_API_TIMEOUT: Duration = Duration::from_secs(15);

/// Dispatcher settings
#[derive(Clone, Debug, PartialEq)]
pub struct DispatcherConfig {
    /// Deadline applied to every cluster API call
    pub api_timeout: Duration,
    /// Settings applied to every built Job
    pub resources: ResourceSettings,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            api_timeout: DEFAULT_API_TIMEOUT,
            resources: ResourceSettings::default(),
        }
    }
}

/// A benchmark that passed validation, paired with its resolved adapter
#[derive(Clone, Debug)]
pub struct ValidatedBenchmark<'a> {
    /// The benchmark as submitted
    pub benchmark: &'a BenchmarkConfig,
    /// Its provider's Kubernetes runtime adapter
    pub adapter: K8sRuntime,
}

/// Presence of one benchmark's objects in the cluster
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BenchmarkResources {
    /// Benchmark id
    pub benchmark_id: String,
    /// Derived Job name
    pub job_name: String,
    /// Derived ConfigMap name
    pub config_map_name: String,
    /// Whether the Job exists
    pub execution_unit_present: bool,
    /// Whether the ConfigMap exists
    pub config_object_present: bool,
}

/// Dispatches evaluation jobs onto a cluster namespace
pub struct RuntimeDispatcher {
    providers: Arc<dyn ProviderRegistry>,
    cluster: Arc<dyn ClusterClient>,
    config: DispatcherConfig,
}

impl RuntimeDispatcher {
    /// Create a dispatcher over a provider registry and a namespaced cluster client
    pub fn new(
        providers: Arc<dyn ProviderRegistry>,
        cluster: Arc<dyn ClusterClient>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            providers,
            cluster,
            config,
        }
    }

    /// Current settings
    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Check every benchmark of `job` against this dispatcher's providers
    pub fn validate<'a>(
        &self,
        job: &'a EvaluationJob,
    ) -> Result<Vec<ValidatedBenchmark<'a>>, ConfigurationErrors> {
        validate_job(self.providers.as_ref(), job)
    }

    /// Validate `job`, then create a ConfigMap and a Job for each benchmark.
    ///
    /// When `storage` is given, the outcome of each benchmark is recorded
    /// there; storage failures are logged and do not affect the result.
    pub async fn run_evaluation_job(
        &self,
        job: &EvaluationJob,
        storage: Option<&dyn EvaluationStorage>,
    ) -> Result<(), RuntimeError> {
        info!(
            job = %job.id,
            benchmarks = job.config.benchmarks.len(),
            "dispatching evaluation job"
        );

        let validated = match self.validate(job) {
            Ok(v) => v,
            Err(errors) => {
                warn!(job = %job.id, errors = errors.len(), "evaluation job rejected: {}", errors);
                if let Some(storage) = storage {
                    let reason = errors.to_string();
                    for benchmark in &job.config.benchmarks {
                        record(
                            storage,
                            &job.id,
                            &benchmark.id,
                            BenchmarkState::Invalid {
                                reason: reason.clone(),
                            },
                        )
                        .await;
                    }
                }
                return Err(errors.into());
            }
        };

        let mut submitted: Vec<String> = Vec::with_capacity(validated.len());
        for entry in &validated {
            let benchmark = entry.benchmark;
            match self.submit_benchmark(job, entry, &submitted).await {
                Ok(()) => {
                    submitted.push(benchmark.id.clone());
                    if let Some(storage) = storage {
                        record(storage, &job.id, &benchmark.id, BenchmarkState::Submitted).await;
                    }
                }
                Err(err) => {
                    error!(
                        job = %job.id,
                        benchmark = %benchmark.id,
                        submitted = submitted.len(),
                        error = %err,
                        "benchmark submission failed"
                    );
                    if let Some(storage) = storage {
                        let state = BenchmarkState::Failed {
                            reason: err.to_string(),
                        };
                        record(storage, &job.id, &benchmark.id, state).await;
                    }
                    return Err(err);
                }
            }
        }

        info!(job = %job.id, submitted = submitted.len(), "evaluation job dispatched");
        Ok(())
    }

    async fn submit_benchmark(
        &self,
        job: &EvaluationJob,
        entry: &ValidatedBenchmark<'_>,
        submitted: &[String],
    ) -> Result<(), RuntimeError> {
        let benchmark = entry.benchmark;
        let compiled = compile_benchmark(
            &job.id,
            &job.config.model,
            benchmark,
            &entry.adapter,
            &self.config.resources,
        )
        .map_err(|source| RuntimeError::Serialization {
            benchmark: benchmark.id.clone(),
            source,
        })?;
        let names = &compiled.names;

        let submission_error = |kind: &'static str, name: &str, source: ClusterError| {
            RuntimeError::Submission {
                benchmark: benchmark.id.clone(),
                kind,
                name: name.to_string(),
                submitted: submitted.to_vec(),
                source,
            }
        };

        self.create_or_adopt(
            CONFIG_OBJECT_KIND,
            &names.config_map,
            &job.id,
            &benchmark.id,
            self.cluster.create_config_object(&compiled.config_map),
            || self.cluster.get_config_object(&names.config_map),
        )
        .await
        .map_err(|e| submission_error(CONFIG_OBJECT_KIND, &names.config_map, e))?;

        self.create_or_adopt(
            EXECUTION_UNIT_KIND,
            &names.job,
            &job.id,
            &benchmark.id,
            self.cluster.create_execution_unit(&compiled.job),
            || self.cluster.get_execution_unit(&names.job),
        )
        .await
        .map_err(|e| submission_error(EXECUTION_UNIT_KIND, &names.job, e))?;

        info!(
            job = %job.id,
            benchmark = %benchmark.id,
            provider = %benchmark.provider_id,
            job_name = %names.job,
            config_map = %names.config_map,
            "submitted benchmark"
        );
        Ok(())
    }

    /// Create an object, or accept an existing one this benchmark created earlier.
    ///
    /// A name collision with an object annotated for another (job, benchmark)
    /// pair stays an `AlreadyExists` error.
    async fn create_or_adopt<T, C, G, GF>(
        &self,
        kind: &'static str,
        name: &str,
        job_id: &str,
        benchmark_id: &str,
        create: C,
        get: G,
    ) -> Result<(), ClusterError>
    where
        T: Resource,
        C: Future<Output = Result<T, ClusterError>>,
        G: FnOnce() -> GF,
        GF: Future<Output = Result<T, ClusterError>>,
    {
        match self.with_deadline("create", kind, name, create).await {
            Ok(_) => {
                debug!(job = %job_id, benchmark = %benchmark_id, %kind, %name, "created");
                Ok(())
            }
            Err(ClusterError::AlreadyExists { .. }) => {
                let existing = self.with_deadline("get", kind, name, get()).await?;
                if created_for(existing.meta(), job_id, benchmark_id) {
                    info!(
                        job = %job_id,
                        benchmark = %benchmark_id,
                        %kind,
                        %name,
                        "adopted object from an earlier submission"
                    );
                    Ok(())
                } else {
                    warn!(job = %job_id, benchmark = %benchmark_id, %kind, %name, "name taken by a foreign object");
                    Err(ClusterError::AlreadyExists {
                        kind,
                        name: name.to_string(),
                    })
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Delete the Job and ConfigMap of every listed benchmark.
    ///
    /// Already-absent objects count as deleted, so repeating a teardown is
    /// harmless. Every benchmark is attempted; failures are aggregated.
    pub async fn teardown<S: AsRef<str>>(
        &self,
        job_id: &str,
        benchmark_ids: &[S],
    ) -> Result<(), RuntimeError> {
        info!(job = %job_id, benchmarks = benchmark_ids.len(), "tearing down evaluation job");

        let mut failures = Vec::new();
        for benchmark_id in benchmark_ids {
            let benchmark_id = benchmark_id.as_ref();
            let names = ResourceNames::for_benchmark(job_id, benchmark_id);

            let (job_result, config_result) = futures::future::join(
                self.with_deadline(
                    "delete",
                    EXECUTION_UNIT_KIND,
                    &names.job,
                    self.cluster
                        .delete_execution_unit(&names.job, DeletePropagation::Background),
                ),
                self.with_deadline(
                    "delete",
                    CONFIG_OBJECT_KIND,
                    &names.config_map,
                    self.cluster.delete_config_object(&names.config_map),
                ),
            )
            .await;

            for (kind, name, result) in [
                (EXECUTION_UNIT_KIND, &names.job, job_result),
                (CONFIG_OBJECT_KIND, &names.config_map, config_result),
            ] {
                match result {
                    Ok(()) => debug!(job = %job_id, benchmark = %benchmark_id, %kind, %name, "deleted"),
                    Err(e) if e.is_not_found() => {
                        debug!(job = %job_id, benchmark = %benchmark_id, %kind, %name, "already absent")
                    }
                    Err(e) => {
                        warn!(job = %job_id, benchmark = %benchmark_id, %kind, %name, error = %e, "delete failed");
                        failures.push(TeardownFailure {
                            benchmark: benchmark_id.to_string(),
                            kind,
                            name: name.clone(),
                            source: e,
                        });
                    }
                }
            }
        }

        if failures.is_empty() {
            info!(job = %job_id, "evaluation job torn down");
            Ok(())
        } else {
            Err(RuntimeError::Teardown {
                job_id: job_id.to_string(),
                errors: TeardownErrors(failures),
            })
        }
    }

    /// Report which objects of the listed benchmarks currently exist
    pub async fn inspect<S: AsRef<str>>(
        &self,
        job_id: &str,
        benchmark_ids: &[S],
    ) -> Result<Vec<BenchmarkResources>, RuntimeError> {
        let mut resources = Vec::with_capacity(benchmark_ids.len());
        for benchmark_id in benchmark_ids {
            let benchmark_id = benchmark_id.as_ref();
            let names = ResourceNames::for_benchmark(job_id, benchmark_id);

            let execution_unit_present = present(
                EXECUTION_UNIT_KIND,
                &names.job,
                self.with_deadline(
                    "get",
                    EXECUTION_UNIT_KIND,
                    &names.job,
                    self.cluster.get_execution_unit(&names.job),
                )
                .await,
            )?;
            let config_object_present = present(
                CONFIG_OBJECT_KIND,
                &names.config_map,
                self.with_deadline(
                    "get",
                    CONFIG_OBJECT_KIND,
                    &names.config_map,
                    self.cluster.get_config_object(&names.config_map),
                )
                .await,
            )?;

            resources.push(BenchmarkResources {
                benchmark_id: benchmark_id.to_string(),
                job_name: names.job,
                config_map_name: names.config_map,
                execution_unit_present,
                config_object_present,
            });
        }
        Ok(resources)
    }

    async fn with_deadline<T, F>(
        &self,
        operation: &'static str,
        kind: &'static str,
        name: &str,
        call: F,
    ) -> Result<T, ClusterError>
    where
        F: Future<Output = Result<T, ClusterError>>,
    {
        let timeout = self.config.api_timeout;
        match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ClusterError::Timeout {
                operation,
                kind,
                name: name.to_string(),
                timeout,
            }),
        }
    }
}

/// Check every benchmark of `job` against `providers` without touching the cluster.
///
/// Returns the resolved adapters in benchmark order, or every problem found.
pub fn validate_job<'a>(
    providers: &dyn ProviderRegistry,
    job: &'a EvaluationJob,
) -> Result<Vec<ValidatedBenchmark<'a>>, ConfigurationErrors> {
    let mut errors = ConfigurationErrors::new();
    let mut validated = Vec::with_capacity(job.config.benchmarks.len());
    let mut seen = HashSet::new();

    for (index, benchmark) in job.config.benchmarks.iter().enumerate() {
        let reference = if benchmark.id.is_empty() {
            format!("#{}", index)
        } else {
            benchmark.id.clone()
        };
        let before = errors.len();

        if benchmark.id.trim().is_empty() {
            errors.push(ConfigurationError::MalformedBenchmark {
                benchmark: reference.clone(),
                message: "benchmark id must not be empty".to_string(),
            });
        } else if !seen.insert(benchmark.id.as_str()) {
            errors.push(ConfigurationError::MalformedBenchmark {
                benchmark: reference.clone(),
                message: "duplicate benchmark id within job".to_string(),
            });
        }

        let Some(provider) = providers.lookup(&benchmark.provider_id) else {
            errors.push(ConfigurationError::ProviderNotFound {
                benchmark: reference,
                provider: benchmark.provider_id.clone(),
            });
            continue;
        };

        let Some(adapter) = provider.k8s_runtime() else {
            errors.push(ConfigurationError::MissingRuntimeAdapter {
                benchmark: reference,
                provider: benchmark.provider_id.clone(),
            });
            continue;
        };

        if adapter.image.trim().is_empty() {
            errors.push(ConfigurationError::MissingImage {
                benchmark: reference.clone(),
                provider: benchmark.provider_id.clone(),
            });
        }

        for env in &adapter.env {
            if let Some(message) = invalid_env_var(&env.name) {
                errors.push(ConfigurationError::MalformedBenchmark {
                    benchmark: reference.clone(),
                    message,
                });
            }
        }

        if errors.len() == before {
            validated.push(ValidatedBenchmark {
                benchmark,
                adapter: adapter.clone(),
            });
        }
    }

    if errors.is_empty() {
        Ok(validated)
    } else {
        Err(errors)
    }
}

/// True if `meta` carries the identity annotations of (job_id, benchmark_id)
fn created_for(meta: &ObjectMeta, job_id: &str, benchmark_id: &str) -> bool {
    let Some(annotations) = meta.annotations.as_ref() else {
        return false;
    };
    annotations.get(ANNOTATION_JOB_ID).map(String::as_str) == Some(job_id)
        && annotations.get(ANNOTATION_BENCHMARK_ID).map(String::as_str) == Some(benchmark_id)
}

fn present<T>(
    kind: &'static str,
    name: &str,
    result: Result<T, ClusterError>,
) -> Result<bool, RuntimeError> {
    match result {
        Ok(_) => Ok(true),
        Err(e) if e.is_not_found() => Ok(false),
        Err(source) => Err(RuntimeError::Cluster {
            kind,
            name: name.to_string(),
            source,
        }),
    }
}

fn invalid_env_var(name: &str) -> Option<String> {
    if name.is_empty() {
        Some("runtime adapter env var name must not be empty".to_string())
    } else if name.contains('=') {
        Some(format!("runtime adapter env var '{}' must not contain '='", name))
    } else if RESERVED_ENV_VARS.contains(&name) {
        Some(format!("runtime adapter env var '{}' is reserved", name))
    } else {
        None
    }
}

async fn record(
    storage: &dyn EvaluationStorage,
    job_id: &str,
    benchmark_id: &str,
    state: BenchmarkState,
) {
    if let Err(e) = storage
        .record_benchmark_state(job_id, benchmark_id, state)
        .await
    {
        warn!(job = %job_id, benchmark = %benchmark_id, error = %e, "failed to record benchmark state");
    }
}
