//! Names command - Print derived object names

use clap::Args;

use evalhub_runtime::ResourceNames;

use super::JobSelector;
use crate::Result;

/// Print the Job and ConfigMap names of each benchmark
#[derive(Args, Debug)]
pub struct NamesArgs {
    #[command(flatten)]
    pub selector: JobSelector,
}

pub fn run(args: NamesArgs) -> Result<()> {
    args.selector.validate()?;
    print!("{}", format_names(&args.selector));
    Ok(())
}

fn format_names(selector: &JobSelector) -> String {
    selector
        .benchmarks
        .iter()
        .map(|id| {
            let names = ResourceNames::for_benchmark(&selector.job_id, id);
            format!("{}\tjob/{}\tconfigmap/{}\n", id, names.job, names.config_map)
        })
        .collect()
}
