//! Long-running inbox service.
//!
//! Four tasks share one [`StabilityTracker`]:
//!
//! - **listener**: registers paths forwarded by the [`InboxWatcher`],
//! - **checker**: polls the tracker every `check_interval` and ingests
//!   promoted files one at a time,
//! - **rescan**: re-registers every inbox file every `rescan_interval`, in
//!   case filesystem events were missed,
//! - **heartbeat**: see [`Heartbeat`].

use crate::error::{ErrorKind, Result};
use crate::filter::DenyList;
use crate::heartbeat::Heartbeat;
use crate::ingest::Ingestor;
use crate::stability::{Registration, Settled, StabilityTracker};
use crate::watch::InboxWatcher;
use exn::ResultExt;
use futures::StreamExt;
use librarian_config::Config;
use librarian_storage::StorageBackend;
use librarian_storage::backend::LocalBackend;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Bounded wait for each task on shutdown.
const JOIN_TIMEOUT: Duration = Duration::from_secs(5);
const EVENT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub stability_delay: Duration,
    pub min_file_age: Duration,
    pub check_interval: Duration,
    pub rescan_interval: Duration,
    pub heartbeat_interval: Duration,
}
impl Default for Settings {
    fn default() -> Self {
        Self {
            stability_delay: Duration::from_secs(5),
            min_file_age: Duration::from_secs(2),
            check_interval: Duration::from_secs(1),
            rescan_interval: Duration::from_secs(60),
            heartbeat_interval: Duration::from_secs(60),
        }
    }
}
impl From<&Config> for Settings {
    fn from(config: &Config) -> Self {
        Self {
            stability_delay: config.stability.delay(),
            min_file_age: config.stability.min_file_age(),
            check_interval: config.stability.check_interval(),
            rescan_interval: config.stability.periodic_scan_interval(),
            heartbeat_interval: config.heartbeat.interval(),
        }
    }
}

pub struct Service {
    shutdown: CancellationToken,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
    watcher: Option<InboxWatcher>,
}
impl Service {
    /// Create the inbox if needed, start every task and register the files
    /// already waiting in the inbox.
    ///
    /// Failing to watch the inbox is not fatal: the periodic rescan still
    /// picks files up, just later.
    pub async fn start(settings: Settings, ingestor: Arc<Ingestor>, heartbeat: Option<Arc<Heartbeat>>) -> Result<Self> {
        let inbox =
            LocalBackend::new("inbox", ingestor.inbox()).or_raise(|| ErrorKind::Inbox(ingestor.inbox().to_path_buf()))?;
        let shutdown = CancellationToken::new();
        let tracker = Arc::new(StabilityTracker::new(settings.stability_delay, settings.min_file_age));
        let mut tasks = Vec::with_capacity(4);

        if let Some(heartbeat) = heartbeat {
            tasks.push(("heartbeat", heartbeat.spawn(settings.heartbeat_interval, shutdown.clone())));
        }

        let (paths, events) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let watcher = match InboxWatcher::start(inbox.root(), paths) {
            Ok(watcher) => Some(watcher),
            Err(err) => {
                tracing::warn!(error = ?err, "Unable to watch inbox; relying on periodic rescans");
                None
            },
        };
        tasks.push(("listener", tokio::spawn(listen(events, tracker.clone(), ingestor.clone(), shutdown.clone()))));

        let registered = scan_inbox(&inbox, &tracker, ingestor.deny_list()).await;
        tracing::info!(inbox = %inbox.root().display(), files = registered, "Registered existing inbox files");

        let checker = check(tracker.clone(), ingestor.clone(), settings.check_interval, shutdown.clone());
        tasks.push(("checker", tokio::spawn(checker)));
        let rescanner = rescan(inbox, tracker, ingestor, settings.rescan_interval, shutdown.clone());
        tasks.push(("rescan", tokio::spawn(rescanner)));

        Ok(Self { shutdown, tasks, watcher })
    }

    /// Whether filesystem events are being received, as opposed to relying
    /// on periodic rescans alone.
    pub fn is_watching(&self) -> bool {
        self.watcher.is_some()
    }

    /// Stop every task. A file being ingested is finished first; files
    /// promoted alongside it are left for the next run.
    pub async fn stop(mut self) {
        self.shutdown.cancel();
        drop(self.watcher.take());
        for (name, task) in self.tasks.drain(..) {
            let abort = task.abort_handle();
            match tokio::time::timeout(JOIN_TIMEOUT, task).await {
                Ok(Ok(())) => tracing::debug!(task = name, "Task stopped"),
                Ok(Err(err)) => tracing::warn!(task = name, error = %err, "Task failed"),
                Err(_) => {
                    tracing::warn!(task = name, "Task did not stop in time; aborting");
                    abort.abort();
                },
            }
        }
        tracing::info!("Service stopped");
    }
}

/// Register every regular file below the inbox root. Returns how many were
/// new (or changed) to the tracker.
pub async fn scan_inbox(inbox: &LocalBackend, tracker: &StabilityTracker, deny_list: &DenyList) -> usize {
    let mut files = inbox.list_stream(None);
    let mut registered = 0;
    while let Some(file) = files.next().await {
        match file {
            Ok(file) if deny_list.is_denied(&file.path) => {},
            Ok(file) => {
                let path = inbox.root().join(&file.path);
                if matches!(tracker.register(&path).await, Registration::New | Registration::Reset) {
                    registered += 1;
                }
            },
            Err(err) => tracing::warn!(error = ?err, "Unable to scan part of the inbox"),
        }
    }
    registered
}

async fn listen(
    mut events: mpsc::Receiver<PathBuf>,
    tracker: Arc<StabilityTracker>,
    ingestor: Arc<Ingestor>,
    shutdown: CancellationToken,
) {
    loop {
        let path = tokio::select! {
            _ = shutdown.cancelled() => break,
            path = events.recv() => match path {
                Some(path) => path,
                None => break,
            },
        };
        let relative = path.strip_prefix(ingestor.inbox()).unwrap_or(&path);
        if ingestor.deny_list().is_denied(relative) {
            continue;
        }
        if tracker.register(&path).await == Registration::New {
            tracing::debug!(path = %path.display(), "Tracking new inbox file");
        }
    }
    tracing::debug!("Event listener stopped");
}

async fn check(
    tracker: Arc<StabilityTracker>,
    ingestor: Arc<Ingestor>,
    interval: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {},
        }
        for path in tracker.poll(SystemTime::now()).await {
            if shutdown.is_cancelled() {
                tracker.finish(&path, Settled::LeftInPlace);
                continue;
            }
            let settled = match ingestor.process(&path).await {
                Some(outcome) => outcome.settled(),
                None => settled_by_existence(&path).await,
            };
            tracker.finish(&path, settled);
        }
    }
    tracing::debug!("Stability checker stopped");
}

/// After a failure the file may or may not still be in the inbox.
async fn settled_by_existence(path: &Path) -> Settled {
    match tokio::fs::try_exists(path).await {
        Ok(false) => Settled::Removed,
        _ => Settled::LeftInPlace,
    }
}

async fn rescan(
    inbox: LocalBackend,
    tracker: Arc<StabilityTracker>,
    ingestor: Arc<Ingestor>,
    interval: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {},
        }
        let registered = scan_inbox(&inbox, &tracker, ingestor.deny_list()).await;
        tracker.prune().await;
        tracing::debug!(files = registered, "Periodic inbox rescan");
    }
    tracing::debug!("Periodic rescan stopped");
}
