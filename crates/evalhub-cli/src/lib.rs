//! eval-hub CLI library

pub mod commands;
pub mod error;

pub use error::{Error, Result};

use clap::{Parser, Subcommand};

use commands::GlobalArgs;

/// eval-hub - Dispatch evaluation benchmarks onto Kubernetes
#[derive(Parser, Debug)]
#[command(name = "evalhub")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate an evaluation job and create a Job per benchmark
    Run(commands::run::RunArgs),
    /// Delete the Jobs and ConfigMaps of an evaluation job
    Teardown(commands::teardown::TeardownArgs),
    /// Show which objects of an evaluation job exist
    Status(commands::status::StatusArgs),
    /// Print derived object names without contacting the cluster
    Names(commands::names::NamesArgs),
}

impl Cli {
    /// Run the CLI command
    pub async fn run(self) -> Result<()> {
        match self.command {
            Commands::Run(args) => commands::run::run(args, &self.global).await,
            Commands::Teardown(args) => commands::teardown::run(args, &self.global).await,
            Commands::Status(args) => commands::status::run(args, &self.global).await,
            Commands::Names(args) => commands::names::run(args),
        }
    }
}
