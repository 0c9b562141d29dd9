//! Run command - Submit an evaluation job
//!
//! Usage: evalhub run --job job.yaml --providers providers.yaml [--dry-run]

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use tracing::info;

use evalhub_runtime::{
    compile_benchmark, config_map_name, job_name, validate_job, ClusterClient, EvaluationJob,
    ProviderCatalog, ResourceSettings,
};

use super::GlobalArgs;
use crate::Result;

/// Submit an evaluation job
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Evaluation job document (YAML or JSON)
    #[arg(short = 'f', long = "job")]
    pub job: PathBuf,

    /// Provider catalog document (YAML or JSON)
    #[arg(short = 'p', long = "providers", env = "EVALHUB_PROVIDERS")]
    pub providers: PathBuf,

    /// Print the objects that would be created instead of creating them
    #[arg(long)]
    pub dry_run: bool,
}

pub async fn run(args: RunArgs, global: &GlobalArgs) -> Result<()> {
    let out = if args.dry_run {
        dry_run(&args, global)?
    } else {
        run_with(&args, global, global.connect().await?).await?
    };
    print!("{}", out);
    Ok(())
}

fn load(args: &RunArgs) -> Result<(ProviderCatalog, EvaluationJob)> {
    let catalog = ProviderCatalog::load(&args.providers)?;
    let job = EvaluationJob::load(&args.job)?;
    info!(
        job = %job.id,
        providers = catalog.len(),
        benchmarks = job.config.benchmarks.len(),
        "loaded evaluation job"
    );
    Ok((catalog, job))
}

/// Load the job and provider files and render what `run` would create
pub fn dry_run(args: &RunArgs, global: &GlobalArgs) -> Result<String> {
    let (catalog, job) = load(args)?;
    let config = global.dispatcher_config()?;
    render_manifests(&catalog, &job, &config.resources)
}

/// Load the job and provider files and submit the job through `cluster`.
///
/// Returns one line per benchmark naming the objects it got.
pub async fn run_with(
    args: &RunArgs,
    global: &GlobalArgs,
    cluster: Arc<dyn ClusterClient>,
) -> Result<String> {
    let (catalog, job) = load(args)?;
    let dispatcher = global.dispatcher_with(Arc::new(catalog), cluster)?;
    dispatcher.run_evaluation_job(&job, None).await?;

    let mut out = String::new();
    for id in job.benchmark_ids() {
        out.push_str(&format!(
            "{}  job/{}  configmap/{}\n",
            id,
            job_name(&job.id, &id),
            config_map_name(&job.id, &id)
        ));
    }
    Ok(out)
}

/// Validate `job` and render every object it would create as a YAML stream
pub fn render_manifests(
    catalog: &ProviderCatalog,
    job: &EvaluationJob,
    settings: &ResourceSettings,
) -> Result<String> {
    let mut out = String::new();
    for entry in validate_job(catalog, job)? {
        let compiled = compile_benchmark(
            &job.id,
            &job.config.model,
            entry.benchmark,
            &entry.adapter,
            settings,
        )?;
        out.push_str("---\n");
        out.push_str(&serde_yaml::to_string(&compiled.config_map)?);
        out.push_str("---\n");
        out.push_str(&serde_yaml::to_string(&compiled.job)?);
    }
    Ok(out)
}
