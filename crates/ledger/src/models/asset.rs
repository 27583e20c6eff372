use crate::error::{Error, ErrorKind};
use crate::models::{Location, path_to_row, timestamp_from_row, wall_clock_from_row, wall_clock_to_row};
use exn::ResultExt;
use std::path::PathBuf;
use time::{PrimitiveDateTime, UtcDateTime};

/// A file that has just been moved into the archive and needs recording.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAsset {
    /// BLAKE3 hex digest of the file content.
    pub file_hash: String,
    pub original_name: String,
    pub original_path: PathBuf,
    /// Absolute path of the file inside the archive.
    pub final_path: PathBuf,
    pub size_bytes: u64,
    pub captured_at: Option<PrimitiveDateTime>,
    pub location: Option<Location>,
    pub ingested_at: UtcDateTime,
}

/// Status of the downstream stages (geocoding, thumbnails, curation, backup).
///
/// Never written by ingestion; every flag starts out `false`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Enrichment {
    pub is_geocoded: bool,
    pub geocoded_at: Option<UtcDateTime>,
    pub is_thumbnailed: bool,
    pub thumbnailed_at: Option<UtcDateTime>,
    pub is_curated: bool,
    pub curated_at: Option<UtcDateTime>,
    pub is_backed_up: bool,
    pub backed_up_at: Option<UtcDateTime>,
    pub has_errors: bool,
    pub error_message: Option<String>,
}

/// A ledger entry: one per uniquely-ingested file, ever.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaAsset {
    pub id: i64,
    pub file_hash: String,
    pub original_name: String,
    pub original_path: PathBuf,
    pub final_path: PathBuf,
    pub size_bytes: u64,
    pub captured_at: Option<PrimitiveDateTime>,
    pub location: Option<Location>,
    pub ingested_at: UtcDateTime,
    pub created_at: UtcDateTime,
    pub is_ingested: bool,
    pub enrichment: Enrichment,
}

pub(crate) struct NewAssetRow {
    pub(crate) file_hash: String,
    pub(crate) original_name: String,
    pub(crate) original_path: String,
    pub(crate) final_path: String,
    pub(crate) size_bytes: i64,
    pub(crate) captured_at: Option<i64>,
    pub(crate) latitude: Option<f64>,
    pub(crate) longitude: Option<f64>,
    pub(crate) ingested_at: i64,
}
impl TryFrom<&NewAsset> for NewAssetRow {
    type Error = Error;
    fn try_from(asset: &NewAsset) -> Result<Self, Self::Error> {
        if asset.file_hash.len() != 64 {
            exn::bail!(ErrorKind::InvalidData("file hash"));
        }
        Ok(Self {
            file_hash: asset.file_hash.clone(),
            original_name: asset.original_name.clone(),
            original_path: path_to_row(&asset.original_path)?,
            final_path: path_to_row(&asset.final_path)?,
            size_bytes: i64::try_from(asset.size_bytes).or_raise(|| ErrorKind::InvalidData("file size"))?,
            captured_at: asset.captured_at.map(wall_clock_to_row),
            latitude: asset.location.map(|l| l.latitude),
            longitude: asset.location.map(|l| l.longitude),
            ingested_at: asset.ingested_at.unix_timestamp(),
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct AssetRow {
    id: i64,
    file_hash: String,
    original_name: String,
    original_path: String,
    final_path: String,
    size_bytes: i64,
    captured_at: Option<i64>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    ingested_at: i64,
    created_at: i64,
    is_ingested: bool,
    is_geocoded: bool,
    geocoded_at: Option<i64>,
    is_thumbnailed: bool,
    thumbnailed_at: Option<i64>,
    is_curated: bool,
    curated_at: Option<i64>,
    is_backed_up: bool,
    backed_up_at: Option<i64>,
    has_errors: bool,
    error_message: Option<String>,
}
impl TryFrom<AssetRow> for MediaAsset {
    type Error = Error;
    fn try_from(row: AssetRow) -> Result<Self, Self::Error> {
        let stage = |value: Option<i64>, field| value.map(|v| timestamp_from_row(v, field)).transpose();
        let location = match (row.latitude, row.longitude) {
            (Some(latitude), Some(longitude)) => Some(Location { latitude, longitude }),
            _ => None,
        };
        Ok(Self {
            id: row.id,
            file_hash: row.file_hash,
            original_name: row.original_name,
            original_path: PathBuf::from(row.original_path),
            final_path: PathBuf::from(row.final_path),
            size_bytes: u64::try_from(row.size_bytes).or_raise(|| ErrorKind::InvalidData("file size"))?,
            captured_at: row.captured_at.map(wall_clock_from_row).transpose()?,
            location,
            ingested_at: timestamp_from_row(row.ingested_at, "ingest time")?,
            created_at: timestamp_from_row(row.created_at, "creation time")?,
            is_ingested: row.is_ingested,
            enrichment: Enrichment {
                is_geocoded: row.is_geocoded,
                geocoded_at: stage(row.geocoded_at, "geocode time")?,
                is_thumbnailed: row.is_thumbnailed,
                thumbnailed_at: stage(row.thumbnailed_at, "thumbnail time")?,
                is_curated: row.is_curated,
                curated_at: stage(row.curated_at, "curation time")?,
                is_backed_up: row.is_backed_up,
                backed_up_at: stage(row.backed_up_at, "backup time")?,
                has_errors: row.has_errors,
                error_message: row.error_message,
            },
        })
    }
}
