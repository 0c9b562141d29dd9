//! CLI commands

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use tracing::debug;

use evalhub_common::kube_utils;
use evalhub_common::DEFAULT_NAMESPACE;
use evalhub_runtime::resources::DEFAULT_CONFIG_MOUNT_PATH;
use evalhub_runtime::{
    ClusterClient, DispatcherConfig, KubeClusterClient, ProviderRegistry, ResourceSettings,
    RuntimeDispatcher,
};

use crate::{Error, Result};

pub mod names;
pub mod run;
pub mod status;
pub mod teardown;

/// Options shared by every subcommand
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Path to kubeconfig (inferred when unset)
    #[arg(long, env = "KUBECONFIG", global = true)]
    pub kubeconfig: Option<PathBuf>,

    /// Namespace Jobs and ConfigMaps are created in
    #[arg(
        short = 'n',
        long,
        env = "EVALHUB_NAMESPACE",
        default_value = DEFAULT_NAMESPACE,
        global = true
    )]
    pub namespace: String,

    /// eval-hub URL passed to benchmarks as SERVICE_URL
    #[arg(long, env = "SERVICE_URL", global = true)]
    pub service_url: Option<String>,

    /// Deadline for each cluster API call, in seconds
    #[arg(long, env = "EVALHUB_API_TIMEOUT_SECS", default_value = "15", global = true)]
    pub api_timeout_secs: u64,

    /// Directory the benchmark ConfigMap is mounted at
    #[arg(
        long,
        env = "EVALHUB_CONFIG_MOUNT_PATH",
        default_value = DEFAULT_CONFIG_MOUNT_PATH,
        global = true
    )]
    pub config_mount_path: String,

    /// Service account benchmark pods run as
    #[arg(long, env = "EVALHUB_SERVICE_ACCOUNT", global = true)]
    pub service_account: Option<String>,
}

impl GlobalArgs {
    /// Dispatcher settings derived from the flags
    pub fn dispatcher_config(&self) -> Result<DispatcherConfig> {
        if self.api_timeout_secs == 0 {
            return Err(Error::validation("--api-timeout-secs must be greater than 0"));
        }
        Ok(DispatcherConfig {
            api_timeout: Duration::from_secs(self.api_timeout_secs),
            resources: ResourceSettings {
                service_url: self.service_url.clone().filter(|u| !u.is_empty()),
                config_mount_path: self.config_mount_path.clone(),
                service_account: self.service_account.clone().filter(|s| !s.is_empty()),
                ..Default::default()
            },
        })
    }

    /// Connect to the cluster, scoped to `--namespace`
    pub async fn connect(&self) -> Result<Arc<dyn ClusterClient>> {
        let client = kube_utils::create_client(self.kubeconfig.as_deref()).await?;
        debug!(namespace = %self.namespace, "connected to cluster");
        Ok(Arc::new(KubeClusterClient::new(client, self.namespace.clone())))
    }

    /// Build a dispatcher over `providers` and an existing cluster client
    pub fn dispatcher_with(
        &self,
        providers: Arc<dyn ProviderRegistry>,
        cluster: Arc<dyn ClusterClient>,
    ) -> Result<RuntimeDispatcher> {
        Ok(RuntimeDispatcher::new(providers, cluster, self.dispatcher_config()?))
    }
}

/// Identifies the benchmarks of one evaluation job
#[derive(Args, Debug, Clone)]
pub struct JobSelector {
    /// Evaluation job id
    #[arg(long = "job-id")]
    pub job_id: String,

    /// Benchmark id (repeatable)
    #[arg(short = 'b', long = "benchmark", required = true, num_args = 1..)]
    pub benchmarks: Vec<String>,
}

impl JobSelector {
    /// Reject empty ids before any name is derived
    pub fn validate(&self) -> Result<()> {
        if self.job_id.trim().is_empty() {
            return Err(Error::validation("--job-id must not be empty"));
        }
        if self.benchmarks.iter().any(|b| b.trim().is_empty()) {
            return Err(Error::validation("--benchmark must not be empty"));
        }
        Ok(())
    }
}

/// No-op registry for commands that never submit anything
pub(crate) struct NoProviders;

impl ProviderRegistry for NoProviders {
    fn lookup(&self, _provider_id: &str) -> Option<evalhub_runtime::ProviderResource> {
        None
    }
}
