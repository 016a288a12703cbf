use std::path::PathBuf;
use std::time::Duration;

use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

mod cli;
mod config;
mod error;
mod sync;
mod transport;

use cli::args::{Cli, Commands, SyncArgs, WatchArgs};
use config::paths::default_settings_path;
use config::settings::{resolve, Overrides, SettingsFile};
use config::types::{SyncConfig, Verbosity};
use error::MirrorError;
use sync::schedule::log_outcome;
use sync::{Mirror, PassKind, PassOutcome, Scheduler, Trigger};
use transport::FtpTransport;

fn main() {
    let cli = Cli::parse();

    let verbosity = Verbosity::from((cli.quiet, cli.verbose));

    // RUST_LOG env var overrides CLI flags
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(verbosity.as_tracing_filter())),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!("Verbosity level: {:?}", verbosity);

    if let Err(err) = run(cli) {
        display_error(&err);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), MirrorError> {
    let Cli {
        command,
        quiet,
        config,
        overrides,
        ..
    } = cli;

    match command {
        Commands::Completions(args) => {
            let mut cmd = Cli::command();
            clap_complete::generate(args.shell, &mut cmd, "ftpmirror", &mut std::io::stdout());
            Ok(())
        }
        Commands::Sync(args) => execute_sync(&args, load_config(config, &overrides)?, quiet),
        Commands::Watch(args) => execute_watch(&args, load_config(config, &overrides)?, quiet),
        Commands::Calibrate => {
            let scheduler = scheduler(load_config(config, &overrides)?)?;
            if let PassOutcome::Calibrated(report) = run_once(&scheduler, PassKind::Calibrate)? {
                println!("Probe: {}", report.probe);
                match report.offset {
                    Some(offset) => println!(
                        "Server clock offset: {} ({} remote files adopted from {} directories)",
                        offset, report.adopted, report.directories_listed
                    ),
                    None => println!("Probe not found in the server listing; no offset measured"),
                }
            }
            Ok(())
        }
    }
}

fn load_config(path: Option<PathBuf>, overrides: &Overrides) -> Result<SyncConfig, MirrorError> {
    let settings = match path {
        Some(path) => SettingsFile::load(&path, true)?,
        None => SettingsFile::load(&default_settings_path()?, false)?,
    };
    let config = resolve(&settings, overrides)?;
    tracing::debug!(
        server = %config.server.address(),
        local = %config.local_root.display(),
        recursive = config.recursive,
        "Resolved configuration"
    );
    Ok(config)
}

fn scheduler(config: SyncConfig) -> Result<Scheduler, MirrorError> {
    let transport = FtpTransport::new(&config);
    let activity = transport.activity();
    let mirror = Mirror::new(config, Box::new(transport))?;
    Ok(Scheduler::new(mirror).with_activity(activity))
}

/// One-shot passes run on an idle scheduler, so the slot is always free.
fn run_once(scheduler: &Scheduler, kind: PassKind) -> Result<PassOutcome, MirrorError> {
    scheduler
        .trigger(kind)
        .unwrap_or_else(|| Err(MirrorError::Schedule("Another pass is already running".to_string())))
}

fn execute_sync(args: &SyncArgs, config: SyncConfig, quiet: bool) -> Result<(), MirrorError> {
    let scheduler = scheduler(config)?;

    if args.dry_run {
        return scheduler.preview(args.full).unwrap_or(Ok(()));
    }

    if args.calibrate {
        log_outcome(PassKind::Calibrate, run_once(&scheduler, PassKind::Calibrate));
    }

    let kind = if args.full {
        PassKind::FullResync
    } else {
        PassKind::Sync
    };
    if let PassOutcome::Synced(report) = run_once(&scheduler, kind)? {
        if !quiet {
            if report.is_noop() {
                eprintln!("Already in sync. Nothing to do.");
            } else {
                eprintln!("Sync complete: {}", report);
            }
        }
    }
    Ok(())
}

fn execute_watch(args: &WatchArgs, config: SyncConfig, quiet: bool) -> Result<(), MirrorError> {
    // Validate the trigger before anything touches the network
    let trigger = match &args.schedule {
        Some(expr) => Trigger::cron(expr)?,
        None => Trigger::every(Duration::from_secs(args.interval))?,
    };

    if !quiet {
        eprintln!(
            "Watching {} -> ftp://{}/{}",
            config.local_root.display(),
            config.server.address(),
            config.server.url_path
        );
        match &args.schedule {
            Some(expr) => eprintln!("Cron: {}", expr),
            None => eprintln!("Every {}s. Press Ctrl+C to stop.", args.interval),
        }
    }

    let first = if args.full {
        PassKind::FullResync
    } else if args.calibrate {
        PassKind::Calibrate
    } else {
        PassKind::Sync
    };

    let scheduler = scheduler(config)?;
    scheduler.run(&trigger, first)?;

    if !quiet {
        eprintln!("Stopped. {} files tracked.", scheduler.tracked_files());
    }
    Ok(())
}

/// Display a MirrorError with optional suggestion hint to stderr.
fn display_error(err: &MirrorError) {
    eprintln!("error: {}", err);
    if let Some(suggestion) = err.suggestion() {
        eprintln!("  hint: {}", suggestion);
    }
}
