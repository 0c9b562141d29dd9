//! Builds the ConfigMap and Job for one benchmark
//!
//! Objects are assembled as JSON and converted into `k8s_openapi` types.
//! Building is pure: nothing here touches the cluster.

use std::collections::BTreeMap;

use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::ConfigMap;
use serde_json::json;

use evalhub_common::kube_utils::sanitize_dns_label;
use evalhub_common::{
    ANNOTATION_BENCHMARK_ID, ANNOTATION_JOB_ID, LABEL_BENCHMARK_ID, LABEL_JOB_ID,
    LABEL_MANAGED_BY, LABEL_MANAGED_BY_EVALHUB, LABEL_PROVIDER_ID,
};

use crate::naming::ResourceNames;
use crate::provider::K8sRuntime;
use crate::render::{render_benchmark_config, CONFIG_FILE_KEY};
use crate::types::{BenchmarkConfig, ModelRef};

/// Name of the benchmark container
pub const CONTAINER_NAME: &str = "evaluation";

/// Name of the pod volume backed by the benchmark ConfigMap
pub const CONFIG_VOLUME_NAME: &str = "evalhub-config";

/// Default directory the ConfigMap is mounted at
pub const DEFAULT_CONFIG_MOUNT_PATH: &str = "/etc/evalhub";

/// Default Job `backoffLimit`
pub const DEFAULT_BACKOFF_LIMIT: i32 = 0;

/// Env vars set by the dispatcher; providers may not override them
pub const RESERVED_ENV_VARS: &[&str] = &[
    "JOB_ID",
    "BENCHMARK_ID",
    "PROVIDER_ID",
    "MODEL_URL",
    "MODEL_NAME",
    "EVALHUB_CONFIG_PATH",
    "SERVICE_URL",
];

/// Cluster-wide settings applied to every built Job
#[derive(Clone, Debug, PartialEq)]
pub struct ResourceSettings {
    /// eval-hub URL passed to the benchmark as `SERVICE_URL`
    pub service_url: Option<String>,
    /// Directory the ConfigMap is mounted at
    pub config_mount_path: String,
    /// Job `backoffLimit`
    pub backoff_limit: i32,
    /// Service account the benchmark pod runs as
    pub service_account: Option<String>,
}

impl Default for ResourceSettings {
    fn default() -> Self {
        Self {
            service_url: None,
            config_mount_path: DEFAULT_CONFIG_MOUNT_PATH.to_string(),
            backoff_limit: DEFAULT_BACKOFF_LIMIT,
            service_account: None,
        }
    }
}

impl ResourceSettings {
    /// Path of the rendered payload inside the container
    pub fn config_file_path(&self) -> String {
        format!(
            "{}/{}",
            self.config_mount_path.trim_end_matches('/'),
            CONFIG_FILE_KEY
        )
    }
}

/// Everything needed to submit one benchmark
#[derive(Clone, Debug)]
pub struct CompiledBenchmark {
    /// Benchmark id
    pub benchmark_id: String,
    /// Derived object names
    pub names: ResourceNames,
    /// ConfigMap carrying the rendered payload; must be created first
    pub config_map: ConfigMap,
    /// Job that mounts the ConfigMap
    pub job: Job,
}

/// Build the ConfigMap and Job for `benchmark` of job `job_id`.
///
/// `adapter` must already be validated (non-empty image).
pub fn compile_benchmark(
    job_id: &str,
    model: &ModelRef,
    benchmark: &BenchmarkConfig,
    adapter: &K8sRuntime,
    settings: &ResourceSettings,
) -> Result<CompiledBenchmark, serde_json::Error> {
    let names = ResourceNames::for_benchmark(job_id, &benchmark.id);
    let payload = render_benchmark_config(job_id, model, benchmark)?;
    let labels = labels(job_id, benchmark);
    let annotations = annotations(job_id, &benchmark.id);
    let data = BTreeMap::from([(CONFIG_FILE_KEY, payload)]);

    let config_map: ConfigMap = serde_json::from_value(json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": {
            "name": names.config_map,
            "labels": labels,
            "annotations": annotations,
        },
        "data": data,
    }))?;

    let job = build_job(job_id, model, benchmark, adapter, settings, &names, &labels, &annotations)?;

    Ok(CompiledBenchmark {
        benchmark_id: benchmark.id.clone(),
        names,
        config_map,
        job,
    })
}

#[allow(clippy::too_many_arguments)]
fn build_job(
    job_id: &str,
    model: &ModelRef,
    benchmark: &BenchmarkConfig,
    adapter: &K8sRuntime,
    settings: &ResourceSettings,
    names: &ResourceNames,
    labels: &BTreeMap<String, String>,
    annotations: &BTreeMap<String, String>,
) -> Result<Job, serde_json::Error> {
    let mut container = json!({
        "name": CONTAINER_NAME,
        "image": adapter.image,
        "imagePullPolicy": image_pull_policy(&adapter.image),
        "env": container_env(job_id, model, benchmark, adapter, settings),
        "volumeMounts": [{
            "name": CONFIG_VOLUME_NAME,
            "mountPath": settings.config_mount_path,
            "readOnly": true,
        }],
    });

    if let Some(entrypoint) = adapter.entrypoint.as_deref().filter(|e| !e.is_empty()) {
        container["command"] = json!([entrypoint]);
    }

    let limits = resource_limits(adapter);
    if !limits.is_empty() {
        container["resources"] = json!({ "limits": limits });
    }

    let mut pod_spec = json!({
        "restartPolicy": "Never",
        "containers": [container],
        "volumes": [{
            "name": CONFIG_VOLUME_NAME,
            "configMap": { "name": names.config_map },
        }],
    });
    if let Some(sa) = &settings.service_account {
        pod_spec["serviceAccountName"] = json!(sa);
    }

    serde_json::from_value(json!({
        "apiVersion": "batch/v1",
        "kind": "Job",
        "metadata": {
            "name": names.job,
            "labels": labels,
            "annotations": annotations,
        },
        "spec": {
            "backoffLimit": settings.backoff_limit,
            "template": {
                "metadata": { "labels": labels },
                "spec": pod_spec,
            },
        },
    }))
}

fn labels(job_id: &str, benchmark: &BenchmarkConfig) -> BTreeMap<String, String> {
    BTreeMap::from([
        (
            LABEL_MANAGED_BY.to_string(),
            LABEL_MANAGED_BY_EVALHUB.to_string(),
        ),
        (LABEL_JOB_ID.to_string(), sanitize_dns_label(job_id, 63)),
        (
            LABEL_BENCHMARK_ID.to_string(),
            sanitize_dns_label(&benchmark.id, 63),
        ),
        (
            LABEL_PROVIDER_ID.to_string(),
            sanitize_dns_label(&benchmark.provider_id, 63),
        ),
    ])
}

/// Label values are lossy; annotations keep the exact ids
fn annotations(job_id: &str, benchmark_id: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (ANNOTATION_JOB_ID.to_string(), job_id.to_string()),
        (ANNOTATION_BENCHMARK_ID.to_string(), benchmark_id.to_string()),
    ])
}

fn container_env(
    job_id: &str,
    model: &ModelRef,
    benchmark: &BenchmarkConfig,
    adapter: &K8sRuntime,
    settings: &ResourceSettings,
) -> Vec<serde_json::Value> {
    let mut env: Vec<serde_json::Value> = adapter
        .env
        .iter()
        .map(|e| json!({ "name": e.name, "value": e.value }))
        .collect();

    let mut push = |name: &str, value: &str| env.push(json!({ "name": name, "value": value }));
    push("JOB_ID", job_id);
    push("BENCHMARK_ID", &benchmark.id);
    push("PROVIDER_ID", &benchmark.provider_id);
    push("MODEL_URL", &model.url);
    push("MODEL_NAME", &model.name);
    push("EVALHUB_CONFIG_PATH", &settings.config_file_path());
    if let Some(url) = &settings.service_url {
        push("SERVICE_URL", url);
    }
    env
}

fn resource_limits(adapter: &K8sRuntime) -> BTreeMap<&'static str, String> {
    let mut limits = BTreeMap::new();
    if let Some(cpu) = adapter.cpu_limit.as_deref().filter(|c| !c.is_empty()) {
        limits.insert("cpu", cpu.to_string());
    }
    if let Some(memory) = adapter.memory_limit.as_deref().filter(|m| !m.is_empty()) {
        limits.insert("memory", memory.to_string());
    }
    limits
}

/// Determine image pull policy based on image tag
fn image_pull_policy(image: &str) -> &'static str {
    let tag_or_digest = image.rsplit('/').next().unwrap_or(image);
    if image.contains('@') {
        "IfNotPresent"
    } else if !tag_or_digest.contains(':') || tag_or_digest.ends_with(":latest") {
        "Always"
    } else {
        "IfNotPresent"
    }
}
