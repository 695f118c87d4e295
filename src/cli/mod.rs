pub mod jobs;
pub mod profile;
pub mod registry;
pub mod run;
pub mod status;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::jobs::sorting::JobType;
use crate::report::ReportFormat;

#[derive(Parser)]
#[command(
    name = "dbp-scheduler",
    version,
    about = "Schedule and run data broker scans and opt-outs"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to the platform config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Manage the broker registry
    Registry {
        #[command(subcommand)]
        command: RegistryCommand,
    },
    /// Manage the profiles to look for
    Profile {
        #[command(subcommand)]
        command: ProfileCommand,
    },
    /// Show the eligible jobs of one broker in the order they would run
    Jobs {
        /// Broker ID
        #[arg(long)]
        broker: String,
        #[arg(long, value_enum, default_value = "all")]
        job_type: JobType,
        /// Use the background-task priority order
        #[arg(long)]
        background: bool,
        /// Ignore preferred run dates
        #[arg(long)]
        all_dates: bool,
    },
    /// Run a scheduling pass
    Run {
        #[arg(long, value_enum, default_value = "all")]
        job_type: JobType,
        /// Only run jobs of this broker
        #[arg(long)]
        broker: Option<String>,
        /// Use the background-task priority order
        #[arg(long)]
        background: bool,
        /// Ignore preferred run dates
        #[arg(long)]
        all_dates: bool,
        /// Show the automation surface while it runs
        #[arg(long)]
        show_web_view: bool,
        /// Brokers processed at once (overrides the config file)
        #[arg(long)]
        max_concurrency: Option<usize>,
    },
    /// Show the state of every scan and opt-out job
    Status {
        #[arg(long, value_enum, default_value = "terminal")]
        format: ReportFormat,
        /// Output file path (stdout if not specified)
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum RegistryCommand {
    /// Fetch the latest broker registry
    Update,
    /// Load broker descriptors from a local JSON file
    Import {
        file: PathBuf,
    },
    /// Show registry metadata
    Info,
}

#[derive(Subcommand)]
pub enum ProfileCommand {
    /// Add a profile query; every broker gets a scan job for it
    Add {
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
        #[arg(long)]
        city: Option<String>,
        #[arg(long)]
        state: Option<String>,
        #[arg(long)]
        birth_year: Option<u16>,
    },
    /// List profile queries
    List,
    /// Stop scanning for a profile query
    Deprecate {
        id: i64,
    },
    /// Mark a match as removed by hand; its opt-out will not run again
    RemoveMatch {
        extracted_profile_id: i64,
    },
}
