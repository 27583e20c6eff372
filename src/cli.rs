use clap::{Args, Parser, Subcommand};
use librarian_config::{Config, LogLevel};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "librarian", version, about = "Files a media inbox into a date-partitioned archive")]
pub struct Cli {
    /// Configuration file (TOML, YAML or JSON).
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// DEBUG, INFO, WARNING or ERROR. `RUST_LOG` takes precedence.
    #[arg(long, global = true)]
    pub log_level: Option<LogLevel>,

    /// Inbox directory (overrides config).
    #[arg(long, global = true)]
    pub inbox: Option<PathBuf>,

    /// Archive root directory (overrides config).
    #[arg(long, global = true)]
    pub archive: Option<PathBuf>,

    /// Ledger database file (overrides config).
    #[arg(long, global = true)]
    pub database: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Watch the inbox and archive files until interrupted.
    Start(StartArgs),
    /// Archive the given files once, then exit.
    Ingest(IngestArgs),
    /// Show the last recorded heartbeat and recent history.
    Status(StatusArgs),
}

#[derive(Debug, Args)]
pub struct StartArgs {
    /// Seconds a file must stay unchanged before it is ingested.
    #[arg(long, value_name = "SECS")]
    pub stability_delay: Option<f64>,

    /// Minimum seconds since a file's last modification.
    #[arg(long, value_name = "SECS")]
    pub min_file_age: Option<f64>,

    /// Seconds between full inbox rescans.
    #[arg(long, value_name = "SECS")]
    pub periodic_scan_interval: Option<f64>,
}

#[derive(Debug, Args)]
pub struct IngestArgs {
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Number of past heartbeats to show.
    #[arg(long, default_value_t = 10)]
    pub history: u32,
}

impl Cli {
    /// Apply command-line overrides on top of the loaded configuration.
    pub fn apply(&self, config: &mut Config) {
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        if let Some(inbox) = &self.inbox {
            config.inbox = inbox.clone();
        }
        if let Some(archive) = &self.archive {
            config.archive = archive.clone();
        }
        if let Some(database) = &self.database {
            config.database = database.clone();
        }
        if let Command::Start(args) = &self.command {
            if let Some(delay) = args.stability_delay {
                config.stability.delay = delay;
            }
            if let Some(age) = args.min_file_age {
                config.stability.min_file_age = age;
            }
            if let Some(interval) = args.periodic_scan_interval {
                config.stability.periodic_scan_interval = interval;
            }
        }
    }
}
