//! Repository for [`MediaAsset`] entries.

use crate::Database;
use crate::error::{ErrorKind, Result};
use crate::models::{AssetRow, MediaAsset, NewAsset, NewAssetRow};
use exn::ResultExt;
use sqlx::SqlitePool;
use time::UtcDateTime;

/// Result of recording a newly archived file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recorded {
    /// A new ledger row was created.
    Inserted,
    /// A row with the same content hash already exists (for example, left
    /// over from a previous run that crashed between the move and the
    /// ledger write). Nothing was changed.
    AlreadyPresent,
}

/// Append-only access to the `media_assets` table.
///
/// Hash uniqueness is enforced by the database itself, so concurrent writers
/// (or a restart racing a previous run) can never create two rows for the
/// same content.
#[derive(Debug, Clone)]
pub struct Ledger {
    pool: SqlitePool,
}
impl From<&Database> for Ledger {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone() }
    }
}
impl Ledger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Record a file that has been durably moved into the archive.
    ///
    /// Inserting a hash that is already known is not an error: it returns
    /// [`Recorded::AlreadyPresent`] and leaves the existing row untouched.
    pub async fn record(&self, asset: &NewAsset) -> Result<Recorded> {
        let row = NewAssetRow::try_from(asset)?;
        let result = sqlx::query(include_str!("../queries/insert_asset.sql"))
            .bind(row.file_hash)
            .bind(row.original_name)
            .bind(row.original_path)
            .bind(row.final_path)
            .bind(row.size_bytes)
            .bind(row.captured_at)
            .bind(row.latitude)
            .bind(row.longitude)
            .bind(row.ingested_at)
            .bind(UtcDateTime::now().unix_timestamp())
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(match result.rows_affected() {
            0 => Recorded::AlreadyPresent,
            _ => Recorded::Inserted,
        })
    }

    /// Look up the asset with the given content hash, wherever in the archive
    /// it was placed.
    pub async fn get_by_hash(&self, file_hash: impl AsRef<str>) -> Result<Option<MediaAsset>> {
        let row: Option<AssetRow> = sqlx::query_as(include_str!("../queries/get_asset_by_hash.sql"))
            .bind(file_hash.as_ref())
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(MediaAsset::try_from).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Location;
    use std::path::PathBuf;
    use time::macros::datetime;

    fn asset(hash_byte: char, final_path: &str) -> NewAsset {
        NewAsset {
            file_hash: hash_byte.to_string().repeat(64),
            original_name: "IMG_0001.jpg".to_string(),
            original_path: PathBuf::from("/inbox/IMG_0001.jpg"),
            final_path: PathBuf::from(final_path),
            size_bytes: 4096,
            captured_at: Some(datetime!(2025-06-15 08:00:00)),
            location: Some(Location { latitude: 48.8566, longitude: 2.3522 }),
            ingested_at: UtcDateTime::now(),
        }
    }

    async fn ledger() -> (Database, Ledger) {
        let db = Database::connect_in_memory().await.unwrap();
        let ledger = Ledger::from(&db);
        (db, ledger)
    }

    #[tokio::test]
    async fn test_record_and_fetch() {
        let (_db, ledger) = ledger().await;
        let new = asset('a', "/archive/2025/2025-06-15/IMG_0001.jpg");
        assert_eq!(ledger.record(&new).await.unwrap(), Recorded::Inserted);

        let stored = ledger.get_by_hash(&new.file_hash).await.unwrap().unwrap();
        assert_eq!(stored.final_path, new.final_path);
        assert_eq!(stored.original_name, "IMG_0001.jpg");
        assert_eq!(stored.captured_at, new.captured_at);
        assert_eq!(stored.location, new.location);
        assert!(stored.is_ingested);
        assert!(!stored.enrichment.is_geocoded);
        assert!(!stored.enrichment.is_backed_up);
    }

    #[tokio::test]
    async fn test_duplicate_hash_is_a_no_op() {
        let (_db, ledger) = ledger().await;
        let first = asset('b', "/archive/2025/2025-06-15/a.jpg");
        let second = asset('b', "/archive/2025/2025-06-15/a_1.jpg");
        assert_eq!(ledger.record(&first).await.unwrap(), Recorded::Inserted);
        assert_eq!(ledger.record(&second).await.unwrap(), Recorded::AlreadyPresent);
        // The original row is left untouched.
        let stored = ledger.get_by_hash(&first.file_hash).await.unwrap().unwrap();
        assert_eq!(stored.final_path, first.final_path);
        assert_eq!(stored.id, ledger.get_by_hash(&second.file_hash).await.unwrap().unwrap().id);
    }

    #[tokio::test]
    async fn test_final_path_is_unique() {
        let (_db, ledger) = ledger().await;
        ledger.record(&asset('c', "/archive/2025/2025-06-15/a.jpg")).await.unwrap();
        let err = ledger.record(&asset('d', "/archive/2025/2025-06-15/a.jpg")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Database));
    }

    #[tokio::test]
    async fn test_asset_without_metadata() {
        let (_db, ledger) = ledger().await;
        let mut new = asset('e', "/archive/2025/2025-06-15/b.jpg");
        new.captured_at = None;
        new.location = None;
        ledger.record(&new).await.unwrap();
        let stored = ledger.get_by_hash(&new.file_hash).await.unwrap().unwrap();
        assert_eq!(stored.captured_at, None);
        assert_eq!(stored.location, None);
    }

    #[tokio::test]
    async fn test_unknown_hash() {
        let (_db, ledger) = ledger().await;
        ledger.record(&asset('f', "/archive/x.jpg")).await.unwrap();
        assert!(ledger.get_by_hash("0".repeat(64)).await.unwrap().is_none());
    }
}
