//! Command-line definitions.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "opwatch", version)]
#[command(about = "Wait for long-running cloud operations to settle", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a status command repeatedly until the state it reports settles
    ///
    /// Exit status: 0 succeeded, 1 failed or timed out, 2 the outcome could
    /// not be determined (command error, unknown state, bad configuration).
    Wait(Box<WaitArgs>),

    /// Show the built-in provider presets
    Presets,
}

#[derive(Debug, Clone, Default, Args)]
pub struct WaitArgs {
    /// Built-in state table and cadence (see `opwatch presets`)
    #[arg(
        long,
        value_name = "NAME",
        conflicts_with_all = ["in_progress", "succeeded", "failed"]
    )]
    pub preset: Option<String>,

    /// States that mean "keep waiting"
    #[arg(long, value_delimiter = ',', value_name = "STATE")]
    pub in_progress: Vec<String>,

    /// States that mean the operation succeeded
    #[arg(long, value_delimiter = ',', value_name = "STATE")]
    pub succeeded: Vec<String>,

    /// States that mean the operation failed
    #[arg(long, value_delimiter = ',', value_name = "STATE")]
    pub failed: Vec<String>,

    /// JSON pointer to the state in the command's output; without it the
    /// whole trimmed output is the state
    #[arg(long, value_name = "POINTER")]
    pub state_pointer: Option<String>,

    /// Delay between status checks, e.g. `30s`
    #[arg(long, value_parser = humantime::parse_duration)]
    pub interval: Option<Duration>,

    /// Total wait budget, e.g. `30m`
    #[arg(long, value_parser = humantime::parse_duration)]
    pub timeout: Option<Duration>,

    /// Deadline of a single status check
    #[arg(long, value_parser = humantime::parse_duration)]
    pub attempt_timeout: Option<Duration>,

    /// Keep polling when the status command itself fails
    #[arg(long)]
    pub retry_fetch_errors: bool,

    /// Config file (default: ./opwatch.toml if present)
    #[arg(long, env = "OPWATCH_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Status command and its arguments, after `--`
    #[arg(last = true, required = true, num_args = 1.., value_name = "COMMAND")]
    pub command: Vec<String>,
}
