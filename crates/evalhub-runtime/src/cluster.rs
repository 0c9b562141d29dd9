//! Cluster access for execution units (Jobs) and configuration objects (ConfigMaps)
//!
//! Provides a trait-based abstraction scoped to a single namespace, allowing
//! tests to mock Kubernetes interactions while production code uses real API
//! calls through [`KubeClusterClient`].

use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::{Api, DeleteParams, PostParams};
use kube::Client;
use thiserror::Error;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use evalhub_common::kube_utils::{is_conflict, is_not_found};

/// Kind reported for execution units
pub const EXECUTION_UNIT_KIND: &str = "Job";

/// Kind reported for configuration objects
pub const CONFIG_OBJECT_KIND: &str = "ConfigMap";

/// Field manager recorded on objects this crate creates
pub const FIELD_MANAGER: &str = "evalhub-runtime";

/// What happens to dependents (the Job's pods) when an execution unit is deleted
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeletePropagation {
    /// Delete the owner now, garbage-collect dependents in the background
    Background,
}

impl DeletePropagation {
    fn delete_params(self) -> DeleteParams {
        match self {
            Self::Background => DeleteParams::background(),
        }
    }
}

/// Failure of a single cluster API call
#[derive(Debug, Error)]
pub enum ClusterError {
    /// The object does not exist
    #[error("{kind} '{name}' not found")]
    NotFound {
        /// Object kind
        kind: &'static str,
        /// Object name
        name: String,
    },

    /// An object with that name already exists
    #[error("{kind} '{name}' already exists")]
    AlreadyExists {
        /// Object kind
        kind: &'static str,
        /// Object name
        name: String,
    },

    /// The call did not finish within the caller's deadline
    #[error("{operation} {kind} '{name}' timed out after {timeout:?}")]
    Timeout {
        /// Operation that was attempted (create, get, delete)
        operation: &'static str,
        /// Object kind
        kind: &'static str,
        /// Object name
        name: String,
        /// Deadline that expired
        timeout: Duration,
    },

    /// Any other API, transport or auth failure
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },
}

impl ClusterError {
    /// True if the object was absent
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// True if repeating the call later could succeed.
    ///
    /// Timeouts, transport failures, throttling and server errors are
    /// transient; other 4xx responses (forbidden, invalid) are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Kube {
                source: kube::Error::Api(ae),
            } => ae.code == 429 || ae.code >= 500,
            Self::Kube { .. } => true,
            Self::NotFound { .. } | Self::AlreadyExists { .. } => false,
        }
    }

    fn from_kube(kind: &'static str, name: &str, err: kube::Error) -> Self {
        if is_not_found(&err) {
            Self::NotFound {
                kind,
                name: name.to_string(),
            }
        } else if is_conflict(&err) {
            Self::AlreadyExists {
                kind,
                name: name.to_string(),
            }
        } else {
            Self::Kube { source: err }
        }
    }
}

/// Namespaced operations the dispatcher performs against the cluster
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Create a Job
    async fn create_execution_unit(&self, job: &Job) -> Result<Job, ClusterError>;

    /// Get a Job by name
    async fn get_execution_unit(&self, name: &str) -> Result<Job, ClusterError>;

    /// Delete a Job by name with the given propagation policy
    async fn delete_execution_unit(
        &self,
        name: &str,
        propagation: DeletePropagation,
    ) -> Result<(), ClusterError>;

    /// Create a ConfigMap
    async fn create_config_object(&self, config_map: &ConfigMap)
        -> Result<ConfigMap, ClusterError>;

    /// Get a ConfigMap by name
    async fn get_config_object(&self, name: &str) -> Result<ConfigMap, ClusterError>;

    /// Delete a ConfigMap by name
    async fn delete_config_object(&self, name: &str) -> Result<(), ClusterError>;
}

/// Real cluster client backed by kube-rs
pub struct KubeClusterClient {
    client: Client,
    namespace: String,
}

impl KubeClusterClient {
    /// Create a client scoped to `namespace`
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }

    /// Namespace all operations target
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn jobs(&self) -> Api<Job> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    fn config_maps(&self) -> Api<ConfigMap> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    fn post_params() -> PostParams {
        PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        }
    }
}

fn object_name<'a>(meta: &'a k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta) -> &'a str {
    meta.name.as_deref().unwrap_or_default()
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn create_execution_unit(&self, job: &Job) -> Result<Job, ClusterError> {
        let name = object_name(&job.metadata);
        let created = self
            .jobs()
            .create(&Self::post_params(), job)
            .await
            .map_err(|e| ClusterError::from_kube(EXECUTION_UNIT_KIND, name, e))?;
        debug!(namespace = %self.namespace, job = %name, "created Job");
        Ok(created)
    }

    async fn get_execution_unit(&self, name: &str) -> Result<Job, ClusterError> {
        self.jobs()
            .get(name)
            .await
            .map_err(|e| ClusterError::from_kube(EXECUTION_UNIT_KIND, name, e))
    }

    async fn delete_execution_unit(
        &self,
        name: &str,
        propagation: DeletePropagation,
    ) -> Result<(), ClusterError> {
        self.jobs()
            .delete(name, &propagation.delete_params())
            .await
            .map_err(|e| ClusterError::from_kube(EXECUTION_UNIT_KIND, name, e))?;
        debug!(namespace = %self.namespace, job = %name, ?propagation, "deleted Job");
        Ok(())
    }

    async fn create_config_object(
        &self,
        config_map: &ConfigMap,
    ) -> Result<ConfigMap, ClusterError> {
        let name = object_name(&config_map.metadata);
        let created = self
            .config_maps()
            .create(&Self::post_params(), config_map)
            .await
            .map_err(|e| ClusterError::from_kube(CONFIG_OBJECT_KIND, name, e))?;
        debug!(namespace = %self.namespace, config_map = %name, "created ConfigMap");
        Ok(created)
    }

    async fn get_config_object(&self, name: &str) -> Result<ConfigMap, ClusterError> {
        self.config_maps()
            .get(name)
            .await
            .map_err(|e| ClusterError::from_kube(CONFIG_OBJECT_KIND, name, e))
    }

    async fn delete_config_object(&self, name: &str) -> Result<(), ClusterError> {
        self.config_maps()
            .delete(name, &DeleteParams::default())
            .await
            .map_err(|e| ClusterError::from_kube(CONFIG_OBJECT_KIND, name, e))?;
        debug!(namespace = %self.namespace, config_map = %name, "deleted ConfigMap");
        Ok(())
    }
}
