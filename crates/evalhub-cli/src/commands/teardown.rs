//! Teardown command - Delete a job's Jobs and ConfigMaps
//!
//! Deleting an already-absent object succeeds, so the command can be rerun
//! after a partial failure.

use std::sync::Arc;

use clap::Args;
use tracing::info;

use evalhub_common::retry::{retry_with_backoff, RetryConfig};
use evalhub_runtime::{ClusterClient, RuntimeError};

use super::{GlobalArgs, JobSelector, NoProviders};
use crate::Result;

/// Delete every object created for the listed benchmarks
#[derive(Args, Debug)]
pub struct TeardownArgs {
    #[command(flatten)]
    pub selector: JobSelector,

    /// Extra attempts after a transient failure (0 disables retrying)
    #[arg(long, default_value = "3")]
    pub retries: u32,
}

impl TeardownArgs {
    fn retry_config(&self) -> RetryConfig {
        if self.retries == 0 {
            RetryConfig::no_retry()
        } else {
            RetryConfig::with_max_attempts(self.retries.saturating_add(1))
        }
    }
}

pub async fn run(args: TeardownArgs, global: &GlobalArgs) -> Result<()> {
    args.selector.validate()?;
    run_with(&args, global, global.connect().await?).await
}

/// Tear down through `cluster`, retrying transient failures `--retries` times
pub async fn run_with(
    args: &TeardownArgs,
    global: &GlobalArgs,
    cluster: Arc<dyn ClusterClient>,
) -> Result<()> {
    args.selector.validate()?;
    let dispatcher = global.dispatcher_with(Arc::new(NoProviders), cluster)?;
    let selector = &args.selector;

    retry_with_backoff(
        &args.retry_config(),
        "teardown",
        RuntimeError::is_retryable,
        || dispatcher.teardown(&selector.job_id, selector.benchmarks.as_slice()),
    )
    .await?;

    info!(job = %selector.job_id, benchmarks = selector.benchmarks.len(), "teardown complete");
    Ok(())
}
