mod asset;
mod status;

pub(crate) use self::asset::{AssetRow, NewAssetRow};
pub use self::asset::{Enrichment, MediaAsset, NewAsset};
pub use self::status::{ServiceStatus, Status};
pub(crate) use self::status::StatusRow;
pub use librarian_metadata::Location;

use crate::error::{ErrorKind, Result};
use exn::{OptionExt, ResultExt};
use std::path::Path;
use time::{PrimitiveDateTime, UtcDateTime};

/// SQLx has no encoding for paths.
pub(crate) fn path_to_row(path: &Path) -> Result<String> {
    Ok(path.to_str().ok_or_raise(|| ErrorKind::InvalidData("path"))?.to_string())
}

pub(crate) fn timestamp_from_row(value: i64, field: &'static str) -> Result<UtcDateTime> {
    UtcDateTime::from_unix_timestamp(value).or_raise(|| ErrorKind::InvalidData(field))
}

/// Capture times carry no offset; they're stored as if they were UTC so that
/// reading them back yields the same wall-clock time.
pub(crate) fn wall_clock_to_row(value: PrimitiveDateTime) -> i64 {
    value.assume_utc().unix_timestamp()
}

pub(crate) fn wall_clock_from_row(value: i64) -> Result<PrimitiveDateTime> {
    let utc = timestamp_from_row(value, "capture time")?;
    Ok(PrimitiveDateTime::new(utc.date(), utc.time()))
}
