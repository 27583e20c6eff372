//! Service health reporting.
//!
//! The ingest pipeline reports what it is doing through [`StatusReporter`];
//! [`Heartbeat`] periodically persists that state for the monitoring
//! dashboard.

use librarian_ledger::{ServiceStatus, Status, StatusStore};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use time::UtcDateTime;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Point-in-time view of a service's health.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub timestamp: UtcDateTime,
    pub status: Status,
    pub current_task: Option<String>,
}

pub trait StatusReporter: Send + Sync {
    /// `None` means idle.
    fn set_current_task(&self, task: Option<String>);
    fn set_status(&self, status: Status);
    fn snapshot(&self) -> StatusSnapshot;
}

/// Reports nothing, to no-one.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;
impl StatusReporter for NoopReporter {
    fn set_current_task(&self, _task: Option<String>) {}

    fn set_status(&self, _status: Status) {}

    fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot { timestamp: UtcDateTime::now(), status: Status::Ok, current_task: None }
    }
}

#[derive(Debug, Default)]
struct State {
    status: Status,
    current_task: Option<String>,
}

/// Shared service state plus the periodic task that writes it to the
/// `system_status` tables.
///
/// Without a [`StatusStore`] (the ledger database is unavailable) beats are
/// only logged.
#[derive(Debug)]
pub struct Heartbeat {
    service_name: String,
    state: Mutex<State>,
    store: Option<StatusStore>,
    retention: Option<Duration>,
}
impl Heartbeat {
    pub fn new(service_name: impl Into<String>, store: Option<StatusStore>) -> Self {
        Self { service_name: service_name.into(), state: Mutex::default(), store, retention: None }
    }

    /// Drop history older than `retention` after every persisted beat.
    /// `None` keeps history forever.
    pub fn with_history_retention(mut self, retention: Option<Duration>) -> Self {
        self.retention = retention;
        self
    }

    /// Write a single heartbeat. Failures are logged and otherwise ignored.
    pub async fn beat(&self) {
        let snapshot = self.snapshot();
        let Some(store) = &self.store else {
            tracing::debug!(
                service = %self.service_name,
                status = %snapshot.status,
                task = ?snapshot.current_task,
                "Heartbeat (not persisted)"
            );
            return;
        };
        let status = ServiceStatus {
            service_name: self.service_name.clone(),
            status: snapshot.status,
            current_task: snapshot.current_task,
            last_heartbeat: snapshot.timestamp,
        };
        if let Err(err) = store.beat(&status).await {
            tracing::warn!(service = %self.service_name, error = ?err, "Unable to record heartbeat");
            return;
        }
        self.prune(store, snapshot.timestamp).await;
    }

    async fn prune(&self, store: &StatusStore, now: UtcDateTime) {
        let Some(cutoff) = self
            .retention
            .and_then(|retention| time::Duration::try_from(retention).ok())
            .and_then(|retention| now.checked_sub(retention))
        else {
            return;
        };
        match store.prune_history(cutoff).await {
            Ok(0) => {},
            Ok(removed) => tracing::debug!(service = %self.service_name, removed, "Pruned heartbeat history"),
            Err(err) => tracing::warn!(service = %self.service_name, error = ?err, "Unable to prune heartbeat history"),
        }
    }

    /// Beat immediately, then once every `interval` until `shutdown` is
    /// cancelled.
    pub fn spawn(self: Arc<Self>, interval: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => self.beat().await,
                }
            }
            tracing::debug!(service = %self.service_name, "Heartbeat stopped");
        })
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
impl StatusReporter for Heartbeat {
    fn set_current_task(&self, task: Option<String>) {
        self.state().current_task = task;
    }

    fn set_status(&self, status: Status) {
        self.state().status = status;
    }

    fn snapshot(&self) -> StatusSnapshot {
        let state = self.state();
        StatusSnapshot { timestamp: UtcDateTime::now(), status: state.status, current_task: state.current_task.clone() }
    }
}
