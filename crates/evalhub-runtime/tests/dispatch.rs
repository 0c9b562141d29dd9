//! End-to-end dispatch tests against an in-memory cluster
//!
//! The real-cluster test at the bottom is ignored by default and only runs
//! when `K8S_INTEGRATION_TEST=1`:
//!
//! ```bash
//! K8S_INTEGRATION_TEST=1 cargo test -p evalhub-runtime --test dispatch -- --ignored
//! ```

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use evalhub_runtime::{
    config_map_name, job_name, BenchmarkConfig, ClusterClient, ClusterError, DeletePropagation,
    DispatcherConfig, EnvVar, EvaluationJob, EvaluationJobConfig, K8sRuntime, ModelRef,
    ProviderCatalog, ProviderResource, RuntimeDispatcher, RuntimeError, CONFIG_FILE_KEY,
};

const JOB_ID: &str = "1936da05-2f27-4fd4-b000-ebcb71af1fbe";
const PROVIDER: &str = "lm_evaluation_harness";

// ---------------------------------------------------------------------------
// MemoryCluster
// ---------------------------------------------------------------------------

/// In-memory namespace that enforces name uniqueness like the API server
#[derive(Default)]
struct MemoryCluster {
    jobs: Mutex<BTreeMap<String, Job>>,
    config_maps: Mutex<BTreeMap<String, ConfigMap>>,
    /// Every mutating call in order, e.g. `create ConfigMap eval-cfg-...`
    log: Mutex<Vec<String>>,
    /// Job name whose next create answers 500
    failing_job: Mutex<Option<String>>,
}

impl MemoryCluster {
    fn record(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }

    fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn job(&self, name: &str) -> Option<Job> {
        self.jobs.lock().unwrap().get(name).cloned()
    }

    fn config_map(&self, name: &str) -> Option<ConfigMap> {
        self.config_maps.lock().unwrap().get(name).cloned()
    }

    fn fail_job_create_once(&self, name: &str) {
        *self.failing_job.lock().unwrap() = Some(name.to_string());
    }

    fn object_count(&self) -> usize {
        self.jobs.lock().unwrap().len() + self.config_maps.lock().unwrap().len()
    }
}

fn name_of(meta: &ObjectMeta) -> String {
    meta.name.clone().unwrap_or_default()
}

#[async_trait]
impl ClusterClient for MemoryCluster {
    async fn create_execution_unit(&self, job: &Job) -> Result<Job, ClusterError> {
        let name = name_of(&job.metadata);
        self.record(format!("create Job {}", name));
        {
            let mut failing = self.failing_job.lock().unwrap();
            if failing.as_deref() == Some(name.as_str()) {
                *failing = None;
                return Err(ClusterError::from(kube::Error::Api(
                    kube::error::ErrorResponse {
                        status: "Failure".to_string(),
                        message: "etcdserver: request timed out".to_string(),
                        reason: "InternalError".to_string(),
                        code: 500,
                    },
                )));
            }
        }
        let mut jobs = self.jobs.lock().unwrap();
        if jobs.contains_key(&name) {
            return Err(ClusterError::AlreadyExists { kind: "Job", name });
        }
        jobs.insert(name, job.clone());
        Ok(job.clone())
    }

    async fn get_execution_unit(&self, name: &str) -> Result<Job, ClusterError> {
        self.job(name).ok_or_else(|| ClusterError::NotFound {
            kind: "Job",
            name: name.to_string(),
        })
    }

    async fn delete_execution_unit(
        &self,
        name: &str,
        propagation: DeletePropagation,
    ) -> Result<(), ClusterError> {
        self.record(format!("delete Job {} {:?}", name, propagation));
        match self.jobs.lock().unwrap().remove(name) {
            Some(_) => Ok(()),
            None => Err(ClusterError::NotFound {
                kind: "Job",
                name: name.to_string(),
            }),
        }
    }

    async fn create_config_object(&self, config_map: &ConfigMap) -> Result<ConfigMap, ClusterError> {
        let name = name_of(&config_map.metadata);
        self.record(format!("create ConfigMap {}", name));
        let mut config_maps = self.config_maps.lock().unwrap();
        if config_maps.contains_key(&name) {
            return Err(ClusterError::AlreadyExists {
                kind: "ConfigMap",
                name,
            });
        }
        config_maps.insert(name, config_map.clone());
        Ok(config_map.clone())
    }

    async fn get_config_object(&self, name: &str) -> Result<ConfigMap, ClusterError> {
        self.config_map(name).ok_or_else(|| ClusterError::NotFound {
            kind: "ConfigMap",
            name: name.to_string(),
        })
    }

    async fn delete_config_object(&self, name: &str) -> Result<(), ClusterError> {
        self.record(format!("delete ConfigMap {}", name));
        match self.config_maps.lock().unwrap().remove(name) {
            Some(_) => Ok(()),
            None => Err(ClusterError::NotFound {
                kind: "ConfigMap",
                name: name.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn adapter(image: &str) -> K8sRuntime {
    K8sRuntime {
        image: image.to_string(),
        entrypoint: Some("/bin/sh".to_string()),
        cpu_limit: Some("500m".to_string()),
        memory_limit: Some("1Gi".to_string()),
        env: vec![EnvVar::new("VAR_NAME", "VALUE")],
    }
}

fn catalog(image: &str) -> ProviderCatalog {
    ProviderCatalog::from_providers([ProviderResource::with_k8s(PROVIDER, adapter(image))])
        .unwrap()
}

fn evaluation_job(benchmark_ids: &[&str]) -> EvaluationJob {
    EvaluationJob::new(
        JOB_ID,
        EvaluationJobConfig {
            model: ModelRef {
                url: "http://test.com".to_string(),
                name: "test".to_string(),
            },
            benchmarks: benchmark_ids
                .iter()
                .map(|id| BenchmarkConfig {
                    id: id.to_string(),
                    provider_id: PROVIDER.to_string(),
                    parameters: BTreeMap::from([
                        ("num_examples".to_string(), serde_json::json!(1)),
                        ("max_tokens".to_string(), serde_json::json!(128)),
                        ("temperature".to_string(), serde_json::json!(0.2)),
                    ]),
                })
                .collect(),
        },
    )
}

fn dispatcher(image: &str, cluster: Arc<MemoryCluster>) -> RuntimeDispatcher {
    RuntimeDispatcher::new(Arc::new(catalog(image)), cluster, DispatcherConfig::default())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn empty_image_fails_before_anything_is_created() {
    let cluster = Arc::new(MemoryCluster::default());
    let d = dispatcher("", cluster.clone());

    let err = d
        .run_evaluation_job(&evaluation_job(&["bench-1", "bench-2"]), None)
        .await
        .unwrap_err();

    assert!(err.to_string().contains("runtime adapter image is required"));
    assert!(matches!(err, RuntimeError::InvalidConfiguration(_)));
    assert!(cluster.log().is_empty());
}

#[tokio::test]
async fn dispatch_creates_objects_and_teardown_removes_them() {
    let cluster = Arc::new(MemoryCluster::default());
    let d = dispatcher("docker.io/library/busybox:1.36", cluster.clone());
    let job = evaluation_job(&["arc_easy", "arc"]);

    d.run_evaluation_job(&job, None).await.unwrap();
    assert_eq!(cluster.object_count(), 4);

    for id in ["arc_easy", "arc"] {
        let cm = cluster.config_map(&config_map_name(JOB_ID, id)).unwrap();
        let payload = &cm.data.as_ref().unwrap()[CONFIG_FILE_KEY];
        let payload: serde_json::Value = serde_json::from_str(payload).unwrap();
        assert_eq!(payload["benchmark_id"], id);
        assert_eq!(payload["job_id"], JOB_ID);
        assert_eq!(payload["parameters"]["max_tokens"], 128);

        let created = cluster.job(&job_name(JOB_ID, id)).unwrap();
        let value = serde_json::to_value(&created).unwrap();
        let container = &value["spec"]["template"]["spec"]["containers"][0];
        assert_eq!(container["image"], "docker.io/library/busybox:1.36");
        assert_eq!(container["command"], serde_json::json!(["/bin/sh"]));
        assert_eq!(container["resources"]["limits"]["cpu"], "500m");
        assert_eq!(container["resources"]["limits"]["memory"], "1Gi");
        assert_eq!(
            value["spec"]["template"]["spec"]["volumes"][0]["configMap"]["name"],
            config_map_name(JOB_ID, id).as_str()
        );
    }

    let status = d.inspect(JOB_ID, job.benchmark_ids().as_slice()).await.unwrap();
    assert!(status
        .iter()
        .all(|r| r.execution_unit_present && r.config_object_present));

    d.teardown(JOB_ID, job.benchmark_ids().as_slice()).await.unwrap();
    assert_eq!(cluster.object_count(), 0);
}

#[tokio::test]
async fn each_config_map_is_created_before_its_job() {
    let cluster = Arc::new(MemoryCluster::default());
    let d = dispatcher("busybox:1.36", cluster.clone());

    d.run_evaluation_job(&evaluation_job(&["arc_easy", "arc"]), None)
        .await
        .unwrap();

    assert_eq!(
        cluster.log(),
        vec![
            format!("create ConfigMap {}", config_map_name(JOB_ID, "arc_easy")),
            format!("create Job {}", job_name(JOB_ID, "arc_easy")),
            format!("create ConfigMap {}", config_map_name(JOB_ID, "arc")),
            format!("create Job {}", job_name(JOB_ID, "arc")),
        ]
    );
}

#[tokio::test]
async fn teardown_is_repeatable() {
    let cluster = Arc::new(MemoryCluster::default());
    let d = dispatcher("busybox:1.36", cluster.clone());
    let job = evaluation_job(&["arc_easy", "arc"]);

    d.run_evaluation_job(&job, None).await.unwrap();
    d.teardown(JOB_ID, job.benchmark_ids().as_slice()).await.unwrap();
    d.teardown(JOB_ID, job.benchmark_ids().as_slice()).await.unwrap();

    // Never-dispatched benchmarks tear down cleanly too
    d.teardown(JOB_ID, &["never-dispatched"]).await.unwrap();
    assert_eq!(cluster.object_count(), 0);
    assert!(cluster
        .log()
        .iter()
        .any(|entry| entry.ends_with("Background")));
}

#[tokio::test]
async fn redispatch_adopts_objects_it_already_created() {
    let cluster = Arc::new(MemoryCluster::default());
    let d = dispatcher("busybox:1.36", cluster.clone());
    let job = evaluation_job(&["arc_easy", "arc"]);

    d.run_evaluation_job(&job, None).await.unwrap();
    d.run_evaluation_job(&job, None).await.unwrap();
    assert_eq!(cluster.object_count(), 4);
}

#[tokio::test]
async fn retry_after_transient_failure_resumes_submission() {
    let cluster = Arc::new(MemoryCluster::default());
    cluster.fail_job_create_once(&job_name(JOB_ID, "arc"));
    let d = dispatcher("busybox:1.36", cluster.clone());
    let job = evaluation_job(&["arc_easy", "arc"]);

    let err = d.run_evaluation_job(&job, None).await.unwrap_err();
    match &err {
        RuntimeError::Submission {
            benchmark,
            submitted,
            ..
        } => {
            assert_eq!(benchmark, "arc");
            assert_eq!(submitted, &vec!["arc_easy".to_string()]);
        }
        other => panic!("expected Submission, got {:?}", other),
    }
    assert!(err.is_retryable());

    d.run_evaluation_job(&job, None).await.unwrap();
    assert_eq!(cluster.object_count(), 4);
    assert!(cluster.job(&job_name(JOB_ID, "arc")).is_some());
}

#[tokio::test]
async fn name_taken_by_a_foreign_object_is_a_permanent_failure() {
    let cluster = Arc::new(MemoryCluster::default());
    let name = config_map_name(JOB_ID, "arc");
    cluster.config_maps.lock().unwrap().insert(
        name.clone(),
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(name),
                ..Default::default()
            },
            ..Default::default()
        },
    );
    let d = dispatcher("busybox:1.36", cluster.clone());

    let err = d
        .run_evaluation_job(&evaluation_job(&["arc"]), None)
        .await
        .unwrap_err();
    match &err {
        RuntimeError::Submission {
            source: ClusterError::AlreadyExists { kind, .. },
            submitted,
            ..
        } => {
            assert_eq!(*kind, "ConfigMap");
            assert!(submitted.is_empty());
        }
        other => panic!("expected AlreadyExists, got {:?}", other),
    }
    assert!(!err.is_retryable());
    assert!(cluster.job(&job_name(JOB_ID, "arc")).is_none());
}

#[tokio::test]
async fn documents_drive_a_full_dispatch() {
    let providers_yaml = r#"
providers:
  - provider_id: lm_evaluation_harness
    runtime:
      k8s:
        image: docker.io/library/busybox:1.36
        entrypoint: /bin/sh
        cpu_limit: 500m
        memory_limit: 1Gi
        env:
          - name: VAR_NAME
            value: VALUE
"#;
    let job_yaml = format!(
        r#"
id: {JOB_ID}
model:
  url: http://test.com
  name: test
benchmarks:
  - id: arc_easy
    provider_id: lm_evaluation_harness
    parameters:
      num_examples: 1
  - id: arc
    provider_id: lm_evaluation_harness
"#
    );

    let dir = tempfile::tempdir().unwrap();
    let providers_path = dir.path().join("providers.yaml");
    let job_path = dir.path().join("job.yaml");
    std::fs::write(&providers_path, providers_yaml).unwrap();
    std::fs::write(&job_path, job_yaml).unwrap();

    let catalog = ProviderCatalog::load(&providers_path).unwrap();
    let job = EvaluationJob::load(&job_path).unwrap();

    let cluster = Arc::new(MemoryCluster::default());
    let d = RuntimeDispatcher::new(Arc::new(catalog), cluster.clone(), DispatcherConfig::default());
    d.run_evaluation_job(&job, None).await.unwrap();

    assert!(cluster.job(&job_name(JOB_ID, "arc_easy")).is_some());
    assert!(cluster.job(&job_name(JOB_ID, "arc")).is_some());
}

/// Dispatch against the cluster in the current kubeconfig context
#[tokio::test]
#[ignore]
async fn real_cluster_dispatch_and_teardown() {
    if std::env::var("K8S_INTEGRATION_TEST").as_deref() != Ok("1") {
        eprintln!("K8S_INTEGRATION_TEST != 1, skipping");
        return;
    }

    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    let client = evalhub_common::kube_utils::create_client(None)
        .await
        .expect("kubeconfig should be available");
    let namespace = std::env::var("EVALHUB_NAMESPACE")
        .unwrap_or_else(|_| evalhub_common::DEFAULT_NAMESPACE.to_string());
    let cluster = Arc::new(evalhub_runtime::KubeClusterClient::new(client, namespace));

    let d = RuntimeDispatcher::new(
        Arc::new(catalog("docker.io/library/busybox:1.36")),
        cluster.clone(),
        DispatcherConfig::default(),
    );
    let job = evaluation_job(&["arc_easy", "arc"]);

    // Leftovers from an aborted run would collide with the derived names
    d.teardown(JOB_ID, job.benchmark_ids().as_slice()).await.unwrap();

    d.run_evaluation_job(&job, None).await.unwrap();
    let status = d.inspect(JOB_ID, job.benchmark_ids().as_slice()).await.unwrap();
    assert!(status
        .iter()
        .all(|r| r.execution_unit_present && r.config_object_present));

    d.teardown(JOB_ID, job.benchmark_ids().as_slice()).await.unwrap();
}
