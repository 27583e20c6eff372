mod cli;
mod error;
mod status;

use crate::cli::{Cli, Command};
use crate::error::{AppError, Result};
use clap::Parser;
use exn::ResultExt;
use librarian_config::Config;
use librarian_ingest::{DenyList, Heartbeat, Ingestor, Outcome, Service, Settings, StatusReporter};
use librarian_ledger::{Database, Ledger, StatusStore};
use librarian_metadata::Extractor;
use librarian_storage::BackendHandle;
use librarian_storage::backend::LocalBackend;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.as_directive().into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let db = open_database(&config).await;
    let result = dispatch(&cli.command, &config, db.as_ref()).await;
    if let Some(db) = db {
        db.close().await;
    }
    result
}

async fn dispatch(command: &Command, config: &Config, db: Option<&Database>) -> Result<()> {
    match command {
        Command::Start(_) => {
            let (ingestor, heartbeat) = build_ingestor(config, db)?;
            run(config, ingestor, heartbeat).await
        },
        Command::Ingest(args) => {
            let (ingestor, _) = build_ingestor(config, db)?;
            ingest_once(&ingestor, &args.files).await
        },
        Command::Status(args) => show_status(config, db, args.history).await,
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load(cli.config.as_deref()).or_raise(|| AppError::Config)?;
    cli.apply(&mut config);
    config.validate().or_raise(|| AppError::Config)?;
    config.resolve_paths().or_raise(|| AppError::Config)
}

/// Without a ledger the service still archives files; it just can't record
/// them.
async fn open_database(config: &Config) -> Option<Database> {
    if let Some(parent) = config.database.parent()
        && let Err(err) = tokio::fs::create_dir_all(parent).await
    {
        tracing::warn!(path = %parent.display(), error = %err, "Unable to create the ledger directory");
    }
    match Database::connect(&config.database).await {
        Ok(db) => {
            tracing::info!(path = %config.database.display(), "Connected to the ledger");
            Some(db)
        },
        Err(err) => {
            tracing::warn!(
                path = %config.database.display(),
                error = ?err,
                "Ledger unavailable; files will be archived without being recorded"
            );
            None
        },
    }
}

fn build_ingestor(config: &Config, db: Option<&Database>) -> Result<(Ingestor, Arc<Heartbeat>)> {
    let heartbeat = Heartbeat::new(&config.heartbeat.service_name, db.map(StatusStore::from))
        .with_history_retention(config.heartbeat.history_retention());
    let heartbeat = Arc::new(heartbeat);
    let archive = LocalBackend::new("archive", &config.archive).or_raise(|| AppError::Archive)?;
    let archive: BackendHandle = Arc::new(archive);
    let deny_list = DenyList::from_config(&config.filter).or_raise(|| AppError::Config)?;
    let ingestor = Ingestor::new(&config.inbox, archive, Extractor::standard(), deny_list)
        .with_ledger(db.map(Ledger::from))
        .with_reporter(heartbeat.clone() as Arc<dyn StatusReporter>)
        .with_rename_limit(config.max_rename_attempts);
    Ok((ingestor, heartbeat))
}

async fn run(config: &Config, ingestor: Ingestor, heartbeat: Arc<Heartbeat>) -> Result<()> {
    // Installed before any task starts, so a signal during startup still
    // stops the service through `stop()`.
    let signal = shutdown_signal()?;
    tracing::info!(
        inbox = %config.inbox.display(),
        archive = %config.archive.display(),
        stability_delay = config.stability.delay,
        min_file_age = config.stability.min_file_age,
        "Starting librarian"
    );
    let service = Service::start(Settings::from(config), Arc::new(ingestor), Some(heartbeat))
        .await
        .or_raise(|| AppError::Start)?;
    tracing::info!(watching = service.is_watching(), "Librarian running");
    signal.await;
    tracing::info!("Shutting down");
    service.stop().await;
    Ok(())
}

/// Resolves on SIGINT or SIGTERM. The handlers are registered when this is
/// called, not when the future is first polled.
#[cfg(unix)]
fn shutdown_signal() -> Result<impl Future<Output = ()>> {
    use tokio::signal::unix::{SignalKind, signal};
    let mut interrupt = signal(SignalKind::interrupt()).or_raise(|| AppError::Signal)?;
    let mut terminate = signal(SignalKind::terminate()).or_raise(|| AppError::Signal)?;
    Ok(async move {
        tokio::select! {
            _ = interrupt.recv() => {},
            _ = terminate.recv() => {},
        }
    })
}

#[cfg(not(unix))]
fn shutdown_signal() -> Result<impl Future<Output = ()>> {
    let mut ctrl_c = tokio::signal::windows::ctrl_c().or_raise(|| AppError::Signal)?;
    Ok(async move {
        ctrl_c.recv().await;
    })
}

async fn show_status(config: &Config, db: Option<&Database>, history: u32) -> Result<()> {
    let Some(db) = db else {
        exn::bail!(AppError::Ledger);
    };
    let store = StatusStore::from(db);
    let name = &config.heartbeat.service_name;
    let latest = store.get(name).await.or_raise(|| AppError::Ledger)?;
    let recent = store.history(name, history).await.or_raise(|| AppError::Ledger)?;
    print!("{}", status::render(name, latest.as_ref(), &recent));
    Ok(())
}

async fn ingest_once(ingestor: &Ingestor, files: &[PathBuf]) -> Result<()> {
    let mut failed = 0;
    for file in files {
        let path = match std::path::absolute(file) {
            Ok(path) => path,
            Err(err) => {
                tracing::error!(path = %file.display(), error = %err, "Unable to resolve path");
                failed += 1;
                continue;
            },
        };
        match ingestor.process(&path).await {
            Some(Outcome::Filtered) => tracing::info!(path = %path.display(), "Skipped deny-listed file"),
            Some(_) => {},
            None => failed += 1,
        }
    }
    if failed > 0 {
        exn::bail!(AppError::Ingest { failed, total: files.len() });
    }
    Ok(())
}
