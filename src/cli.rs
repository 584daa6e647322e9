// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines all subcommands and their arguments.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "verdigris")]
#[command(about = "Blue/green deployments for load-balanced container services")]
#[command(version)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only print the final result
    #[arg(short, long, global = true, conflicts_with = "json")]
    pub quiet: bool,

    /// Print JSON lines
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new verdigris.yml configuration file
    Init {
        /// Deployment group name
        #[arg(short, long)]
        group: Option<String>,

        /// Artifact repository images are resolved from
        #[arg(short, long)]
        repository: Option<String>,

        /// Overwrite an existing configuration
        #[arg(long)]
        force: bool,
    },

    /// Check the configuration and the group it describes
    Validate,

    /// Run a deployment against simulated infrastructure
    Simulate(SimulateArgs),

    /// List recorded deployments
    History {
        /// JSON-lines record file
        #[arg(long, default_value = ".verdigris/history.jsonl")]
        record_file: PathBuf,
    },
}

#[derive(clap::Args, Debug)]
pub struct SimulateArgs {
    /// Image tag to deploy
    #[arg(default_value = "latest")]
    pub tag: String,

    /// Pool serving production before the deployment
    #[arg(long, default_value = "blue")]
    pub active: String,

    /// Comma-separated health probe script for the new pool
    /// (pass, fail, partial, stale, outage, hang)
    #[arg(long, value_delimiter = ',')]
    pub probes: Vec<String>,

    /// Probe outcome once the script runs out
    #[arg(long, default_value = "pass")]
    pub probe_fallback: String,

    /// The scheduler cannot find the image
    #[arg(long)]
    pub missing_image: bool,

    /// New replicas never start
    #[arg(long)]
    pub stall: bool,

    /// No capacity is associated with the new pool
    #[arg(long)]
    pub no_capacity: bool,

    /// Draining the old pool fails
    #[arg(long)]
    pub fail_drain: bool,

    /// Transient scheduler outages before replicas launch
    #[arg(long, default_value_t = 0)]
    pub outages: u32,

    /// Approve verification as soon as it starts
    #[arg(long, conflicts_with = "reject")]
    pub approve: bool,

    /// Reject verification with this reason
    #[arg(long)]
    pub reject: Option<String>,

    /// Divide every configured duration by this factor
    #[arg(long, default_value_t = 1000)]
    pub speedup: u32,

    /// Append the deployment record to this JSON-lines file
    #[arg(long)]
    pub record_file: Option<PathBuf>,

    /// Directory for lock files shared between processes
    #[arg(long)]
    pub lock_dir: Option<PathBuf>,

    /// Break an existing deploy lock
    #[arg(long)]
    pub force: bool,
}
