use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::settings::Overrides;

#[derive(Parser, Debug)]
#[command(
    name = "ftpmirror",
    version,
    about = "Mirror a local directory to an FTP server"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v for verbose, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode: suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Settings file (defaults to <config dir>/ftpmirror/ftpmirror.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: Overrides,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a single reconciliation pass
    ///
    /// Remote state is kept in memory only. A fresh process without --full or
    /// --calibrate only records the local tree as the baseline and uploads
    /// nothing; use `watch` for incremental mirroring.
    Sync(SyncArgs),

    /// Run passes periodically until interrupted
    Watch(WatchArgs),

    /// Measure the server clock offset and adopt remote timestamps
    Calibrate,

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(clap::Args, Debug)]
pub struct SyncArgs {
    /// Upload every local file, ignoring what is believed to be on the server
    #[arg(long, conflicts_with = "calibrate")]
    pub full: bool,

    /// Calibrate against server listings before the pass
    #[arg(long)]
    pub calibrate: bool,

    /// Preview the pass without contacting the server
    #[arg(long, conflicts_with = "calibrate")]
    pub dry_run: bool,
}

#[derive(clap::Args, Debug)]
pub struct WatchArgs {
    /// Seconds between passes
    #[arg(long, default_value = "1", conflicts_with = "schedule")]
    pub interval: u64,

    /// Cron expression for passes (e.g., "*/5 * * * *" for every 5 minutes)
    #[arg(long)]
    pub schedule: Option<String>,

    /// Make the first pass a full resync
    #[arg(long, conflicts_with = "calibrate")]
    pub full: bool,

    /// Make the first pass a calibration
    #[arg(long)]
    pub calibrate: bool,
}

#[derive(clap::Args, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: clap_complete::Shell,
}
