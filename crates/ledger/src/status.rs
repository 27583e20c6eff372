//! Heartbeat persistence for the monitoring dashboard.

use crate::Database;
use crate::error::{ErrorKind, Result};
use crate::models::{ServiceStatus, StatusRow};
use exn::ResultExt;
use sqlx::SqlitePool;
use time::UtcDateTime;

/// Writes service heartbeats into `system_status` (latest beat per service)
/// and `system_status_history` (every beat, until pruned).
#[derive(Debug, Clone)]
pub struct StatusStore {
    pool: SqlitePool,
}
impl From<&Database> for StatusStore {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone() }
    }
}
impl StatusStore {
    /// Record a heartbeat. Both tables are written in one transaction.
    pub async fn beat(&self, status: &ServiceStatus) -> Result<()> {
        let at = status.last_heartbeat.unix_timestamp();
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        sqlx::query(include_str!("../queries/upsert_status.sql"))
            .bind(&status.service_name)
            .bind(status.status.as_str())
            .bind(status.current_task.as_deref())
            .bind(at)
            .bind(UtcDateTime::now().unix_timestamp())
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        sqlx::query(include_str!("../queries/insert_status_history.sql"))
            .bind(&status.service_name)
            .bind(status.status.as_str())
            .bind(status.current_task.as_deref())
            .bind(at)
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    /// Latest heartbeat of a service, if it has ever reported.
    pub async fn get(&self, service_name: &str) -> Result<Option<ServiceStatus>> {
        let row: Option<StatusRow> = sqlx::query_as(include_str!("../queries/get_status.sql"))
            .bind(service_name)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(ServiceStatus::try_from).transpose()
    }

    /// Most recent heartbeats of a service, newest first.
    pub async fn history(&self, service_name: &str, limit: u32) -> Result<Vec<ServiceStatus>> {
        let rows: Vec<StatusRow> = sqlx::query_as(include_str!("../queries/get_status_history.sql"))
            .bind(service_name)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(ServiceStatus::try_from).collect()
    }

    /// Delete history older than `cutoff`, for every service. The latest
    /// beat in `system_status` is never touched. Returns the number of rows
    /// removed.
    pub async fn prune_history(&self, cutoff: UtcDateTime) -> Result<u64> {
        let result = sqlx::query(include_str!("../queries/prune_status_history.sql"))
            .bind(cutoff.unix_timestamp())
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected())
    }
}
