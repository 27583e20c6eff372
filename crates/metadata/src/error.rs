//! Metadata Error Types
//!
//! Errors raised by individual extraction strategies. They never escape
//! [`Extractor::extract`](crate::Extractor::extract), which treats a failing
//! strategy the same as one that found nothing.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A metadata error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for metadata operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The file could not be opened or stat-ed.
    #[display("unable to read file: {}", _0.display())]
    Io(#[error(not(source))] PathBuf),
    /// The exiftool process could not be run, or exited unsuccessfully.
    #[display("exiftool failed: {_0}")]
    ExifTool(#[error(not(source))] String),
    /// The file has no EXIF block, or it is corrupt.
    #[display("no readable EXIF data")]
    Exif,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}
