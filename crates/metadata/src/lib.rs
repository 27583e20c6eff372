mod consts;
pub mod error;
pub mod models;
mod strategy;
mod timestamp;

use std::path::Path;
use tracing::instrument;

pub use crate::models::{DateSource, Found, Location, Metadata};
pub use crate::strategy::{Exif, ExifTool, Extractor, FileModified, Strategy};
pub use crate::timestamp::{parse_timestamp, path_components};

/// Easy, top-level entrypoint for reading the capture date and location of a
/// media file with the [standard](Extractor::standard) fallback chain.
///
/// Blocking, and discovers `exiftool` on every call. Long-running callers
/// should build one [`Extractor`] and reuse it.
#[instrument(skip(path), fields(path = %path.display()))]
pub fn extract(path: &Path) -> Metadata {
    Extractor::standard().extract(path)
}
