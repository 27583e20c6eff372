use crate::error::{ErrorKind, Result};
use crate::models::{DateSource, Found};
use crate::strategy::Strategy;
use exn::ResultExt;
use std::path::Path;
use time::{PrimitiveDateTime, UtcDateTime};

/// Last resort: the file's modification time, taken as UTC.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileModified;

impl Strategy for FileModified {
    fn source(&self) -> DateSource {
        DateSource::FileModified
    }

    fn read(&self, path: &Path) -> Result<Found> {
        let modified = std::fs::metadata(path)
            .and_then(|metadata| metadata.modified())
            .or_raise(|| ErrorKind::Io(path.to_path_buf()))?;
        let utc = UtcDateTime::from(modified);
        Ok(Found { captured_at: Some(PrimitiveDateTime::new(utc.date(), utc.time())), location: None })
    }
}
