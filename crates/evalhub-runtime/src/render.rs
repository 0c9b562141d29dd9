//! Renders a benchmark's parameters into the ConfigMap payload
//!
//! The payload is a JSON document mounted into the benchmark container. Values
//! pass through `serde_json::Value` untouched, so integers stay integers and
//! floats stay floats (`1.0` is written as `1.0`).

use std::collections::BTreeMap;

use serde::Serialize;

use crate::types::{BenchmarkConfig, ModelRef};

/// ConfigMap data key (and file name inside the mount) of the payload
pub const CONFIG_FILE_KEY: &str = "job.json";

#[derive(Serialize)]
struct RenderedBenchmark<'a> {
    job_id: &'a str,
    benchmark_id: &'a str,
    provider_id: &'a str,
    model: &'a ModelRef,
    parameters: &'a BTreeMap<String, serde_json::Value>,
}

/// Render the payload for one benchmark of a job.
///
/// Output is byte-stable for identical input: struct fields serialize in
/// declaration order and parameter keys in sorted order.
pub fn render_benchmark_config(
    job_id: &str,
    model: &ModelRef,
    benchmark: &BenchmarkConfig,
) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&RenderedBenchmark {
        job_id,
        benchmark_id: &benchmark.id,
        provider_id: &benchmark.provider_id,
        model,
        parameters: &benchmark.parameters,
    })
}
