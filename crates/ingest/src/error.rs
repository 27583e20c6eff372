//! Ingest Error Types
//!
//! Every error here aborts the current file only. The file stays in the inbox
//! and the service carries on with the next one.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// An ingest error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for ingest operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// No tier of the metadata chain produced a capture timestamp.
    #[display("no capture date for {}", _0.display())]
    NoCaptureDate(#[error(not(source))] PathBuf),
    /// The file's contents could not be read to completion.
    #[display("unable to hash {}", _0.display())]
    Hash(#[error(not(source))] PathBuf),
    /// The inbox file vanished or could not be touched.
    #[display("inbox file unavailable: {}", _0.display())]
    Inbox(#[error(not(source))] PathBuf),
    /// An archive storage operation failed.
    #[display("archive storage operation failed")]
    Storage,
    /// Every `name_N` sibling up to the attempt limit is taken.
    #[display("no free name for {} in the archive", _0.display())]
    NameExhausted(#[error(not(source))] PathBuf),
    /// The inbox could not be watched for changes.
    #[display("unable to watch inbox")]
    Watch,
    /// A blocking task panicked or was cancelled.
    #[display("background task failed")]
    Task,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Hash(_) | Self::Inbox(_) | Self::Storage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_exhaustion_is_fatal() {
        assert!(!ErrorKind::NameExhausted(PathBuf::from("2025/2025-06-15/a.jpg")).is_retryable());
        assert!(!ErrorKind::NoCaptureDate(PathBuf::from("a.jpg")).is_retryable());
        assert!(ErrorKind::Storage.is_retryable());
    }
}
