//! Provider registry: provider id to runtime adapter
//!
//! The dispatcher only sees the [`ProviderRegistry`] trait. Plain maps
//! implement it for tests and embedding; [`ProviderCatalog`] loads the
//! providers file used by the CLI.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};

use evalhub_common::Error;

/// A single environment variable set on the benchmark container
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    /// Variable name
    pub name: String,
    /// Variable value
    #[serde(default)]
    pub value: String,
}

impl EnvVar {
    /// Create an env var
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Kubernetes runtime adapter: how to containerize a provider's benchmarks
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct K8sRuntime {
    /// Container image; required, an empty image fails validation
    #[serde(default)]
    pub image: String,
    /// Container entrypoint (overrides the image's)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<String>,
    /// CPU limit quantity, e.g. `500m`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_limit: Option<String>,
    /// Memory limit quantity, e.g. `1Gi`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_limit: Option<String>,
    /// Extra environment variables
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
}

/// Runtime adapters a provider can declare
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Runtime {
    /// Kubernetes adapter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k8s: Option<K8sRuntime>,
}

/// A registered evaluation provider
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderResource {
    /// Provider identifier referenced by benchmarks
    pub provider_id: String,
    /// Runtime adapters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<Runtime>,
}

impl ProviderResource {
    /// Create a provider with a Kubernetes runtime adapter
    pub fn with_k8s(provider_id: impl Into<String>, k8s: K8sRuntime) -> Self {
        Self {
            provider_id: provider_id.into(),
            runtime: Some(Runtime { k8s: Some(k8s) }),
        }
    }

    /// The Kubernetes runtime adapter, if declared
    pub fn k8s_runtime(&self) -> Option<&K8sRuntime> {
        self.runtime.as_ref().and_then(|r| r.k8s.as_ref())
    }
}

/// Lookup of providers by id
pub trait ProviderRegistry: Send + Sync {
    /// Resolve a provider; `None` when it is not registered
    fn lookup(&self, provider_id: &str) -> Option<ProviderResource>;
}

impl ProviderRegistry for BTreeMap<String, ProviderResource> {
    fn lookup(&self, provider_id: &str) -> Option<ProviderResource> {
        self.get(provider_id).cloned()
    }
}

impl ProviderRegistry for HashMap<String, ProviderResource> {
    fn lookup(&self, provider_id: &str) -> Option<ProviderResource> {
        self.get(provider_id).cloned()
    }
}

#[derive(Deserialize)]
struct CatalogFile {
    #[serde(default)]
    providers: Vec<ProviderResource>,
}

/// Immutable set of providers loaded from configuration
#[derive(Clone, Debug, Default)]
pub struct ProviderCatalog {
    providers: BTreeMap<String, ProviderResource>,
}

impl ProviderCatalog {
    /// Build a catalog, rejecting empty or duplicate provider ids
    pub fn from_providers(
        providers: impl IntoIterator<Item = ProviderResource>,
    ) -> Result<Self, Error> {
        let mut map = BTreeMap::new();
        for provider in providers {
            if provider.provider_id.trim().is_empty() {
                return Err(Error::config("provider_id must not be empty"));
            }
            if map.contains_key(&provider.provider_id) {
                return Err(Error::config(format!(
                    "duplicate provider '{}'",
                    provider.provider_id
                )));
            }
            map.insert(provider.provider_id.clone(), provider);
        }
        Ok(Self { providers: map })
    }

    /// Parse a providers document (`providers: [...]`) from YAML or JSON
    pub fn from_yaml_str(text: &str, source_name: &str) -> Result<Self, Error> {
        let file: CatalogFile = serde_yaml::from_str(text).map_err(|e| {
            Error::serialization_for("ProviderCatalog", format!("{}: {}", source_name, e))
        })?;
        Self::from_providers(file.providers).map_err(|e| match e {
            Error::Config { message, .. } => Error::config_from(source_name, message),
            other => other,
        })
    }

    /// Load a providers document from a file
    pub fn load(path: &Path) -> Result<Self, Error> {
        let source_name = path.display().to_string();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::config_from(&source_name, format!("failed to read: {}", e)))?;
        Self::from_yaml_str(&text, &source_name)
    }

    /// Number of registered providers
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// True if no providers are registered
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Registered provider ids, sorted
    pub fn provider_ids(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }
}

impl ProviderRegistry for ProviderCatalog {
    fn lookup(&self, provider_id: &str) -> Option<ProviderResource> {
        self.providers.get(provider_id).cloned()
    }
}
