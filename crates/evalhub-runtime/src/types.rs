//! Evaluation job data model
//!
//! These types mirror the request body accepted by the eval-hub API. They are
//! deserialized from YAML or JSON (JSON is a subset of YAML) with snake_case
//! field names.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use evalhub_common::Error;

/// Reference to the model under evaluation
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelRef {
    /// Endpoint serving the model
    pub url: String,
    /// Model name as known to the serving endpoint
    pub name: String,
}

/// A single benchmark within an evaluation job
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkConfig {
    /// Benchmark identifier, unique within its job
    pub id: String,
    /// Provider whose runtime adapter executes this benchmark
    pub provider_id: String,
    /// Provider-interpreted parameters, kept exactly as supplied.
    ///
    /// Non-finite floats (`.inf`, `.nan`) are rejected at load time; JSON
    /// cannot carry them and they would otherwise turn into `null`.
    #[serde(default, deserialize_with = "parameters::deserialize")]
    pub parameters: BTreeMap<String, serde_json::Value>,
}

/// What to evaluate and with which benchmarks
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationJobConfig {
    /// Model under evaluation
    pub model: ModelRef,
    /// Benchmarks in submission order
    #[serde(default)]
    pub benchmarks: Vec<BenchmarkConfig>,
}

/// An evaluation job: an identifier plus its configuration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationJob {
    /// Job identifier (typically a UUID)
    pub id: String,
    /// Model and benchmarks
    #[serde(flatten)]
    pub config: EvaluationJobConfig,
}

impl EvaluationJob {
    /// Create a job from an id and configuration
    pub fn new(id: impl Into<String>, config: EvaluationJobConfig) -> Self {
        Self {
            id: id.into(),
            config,
        }
    }

    /// Benchmark ids in submission order
    pub fn benchmark_ids(&self) -> Vec<String> {
        self.config.benchmarks.iter().map(|b| b.id.clone()).collect()
    }

    /// Parse a job document from YAML or JSON text
    pub fn from_yaml_str(text: &str, source_name: &str) -> Result<Self, Error> {
        let job: Self = serde_yaml::from_str(text).map_err(|e| {
            Error::serialization_for("EvaluationJob", format!("{}: {}", source_name, e))
        })?;
        if job.id.trim().is_empty() {
            return Err(Error::config_from(source_name, "job id must not be empty"));
        }
        Ok(job)
    }

    /// Load a job document from a file
    pub fn load(path: &Path) -> Result<Self, Error> {
        let source_name = path.display().to_string();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::config_from(&source_name, format!("failed to read: {}", e)))?;
        Self::from_yaml_str(&text, &source_name)
    }
}

mod parameters {
    use std::collections::BTreeMap;

    use serde::de::{Deserializer, Error as _};
    use serde::Deserialize;
    use serde_json::Value;
    use serde_yaml::Value as YamlValue;

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<BTreeMap<String, Value>, D::Error>
    where
        D: Deserializer<'de>,
    {
        BTreeMap::<String, YamlValue>::deserialize(deserializer)?
            .into_iter()
            .map(|(key, value)| {
                let value = to_json(value, &key).map_err(D::Error::custom)?;
                Ok((key, value))
            })
            .collect()
    }

    fn to_json(value: YamlValue, path: &str) -> Result<Value, String> {
        Ok(match value {
            YamlValue::Null => Value::Null,
            YamlValue::Bool(b) => Value::Bool(b),
            YamlValue::Number(n) => {
                if let Some(u) = n.as_u64() {
                    Value::from(u)
                } else if let Some(i) = n.as_i64() {
                    Value::from(i)
                } else {
                    n.as_f64()
                        .and_then(serde_json::Number::from_f64)
                        .map(Value::Number)
                        .ok_or_else(|| {
                            format!("parameter '{}' is not a finite number ({})", path, n)
                        })?
                }
            }
            YamlValue::String(s) => Value::String(s),
            YamlValue::Sequence(items) => Value::Array(
                items
                    .into_iter()
                    .enumerate()
                    .map(|(i, item)| to_json(item, &format!("{}[{}]", path, i)))
                    .collect::<Result<_, _>>()?,
            ),
            YamlValue::Mapping(map) => {
                let mut object = serde_json::Map::new();
                for (key, item) in map {
                    let key = match key {
                        YamlValue::String(s) => s,
                        YamlValue::Number(n) => n.to_string(),
                        YamlValue::Bool(b) => b.to_string(),
                        _ => return Err(format!("parameter '{}' has a non-scalar key", path)),
                    };
                    let child = format!("{}.{}", path, key);
                    object.insert(key, to_json(item, &child)?);
                }
                Value::Object(object)
            }
            YamlValue::Tagged(tagged) => to_json(tagged.value, path)?,
        })
    }
}
