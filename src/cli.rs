//! Command-line interface.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::config::DEFAULT_CONFIG_PATH;
use crate::replication::Operation;

/// regsync: replicate container images between registries.
#[derive(Debug, Parser)]
#[command(name = "regsync", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Path to the configuration file.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Number of workers, overriding the configuration file.
    #[arg(long, global = true)]
    pub workers: Option<usize>,

    /// Enable debug logging.
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OperationArg {
    Transfer,
    Delete,
}

impl From<OperationArg> for Operation {
    fn from(arg: OperationArg) -> Self {
        match arg {
            OperationArg::Transfer => Operation::Transfer,
            OperationArg::Delete => Operation::Delete,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Loads targets, policies and jobs from a seed file and runs every job.
    Run {
        /// TOML file with `[[targets]]`, `[[policies]]` and `[[jobs]]`.
        #[arg(long)]
        file: PathBuf,
    },

    /// Prints the transition table built for an operation.
    Graph {
        operation: OperationArg,
    },

    /// Prints the log of a job.
    Log {
        job_id: i64,
    },
}
