//! Status command - Show which objects of a job exist

use std::sync::Arc;

use clap::Args;

use evalhub_runtime::{BenchmarkResources, ClusterClient};

use super::{GlobalArgs, JobSelector, NoProviders};
use crate::Result;

/// Show whether each benchmark's Job and ConfigMap exist
#[derive(Args, Debug)]
pub struct StatusArgs {
    #[command(flatten)]
    pub selector: JobSelector,
}

pub async fn run(args: StatusArgs, global: &GlobalArgs) -> Result<()> {
    args.selector.validate()?;
    print!("{}", run_with(&args, global, global.connect().await?).await?);
    Ok(())
}

/// Inspect the selected benchmarks through `cluster` and format a table
pub async fn run_with(
    args: &StatusArgs,
    global: &GlobalArgs,
    cluster: Arc<dyn ClusterClient>,
) -> Result<String> {
    args.selector.validate()?;
    let dispatcher = global.dispatcher_with(Arc::new(NoProviders), cluster)?;
    let resources = dispatcher
        .inspect(&args.selector.job_id, args.selector.benchmarks.as_slice())
        .await?;
    Ok(format_status(&resources))
}

fn presence(present: bool) -> &'static str {
    if present {
        "present"
    } else {
        "absent"
    }
}

fn format_status(resources: &[BenchmarkResources]) -> String {
    let mut out = String::from("BENCHMARK\tJOB\tCONFIGMAP\n");
    for r in resources {
        out.push_str(&format!(
            "{}\t{} ({})\t{} ({})\n",
            r.benchmark_id,
            r.job_name,
            presence(r.execution_unit_present),
            r.config_map_name,
            presence(r.config_object_present),
        ));
    }
    out
}
