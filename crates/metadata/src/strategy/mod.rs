//! The metadata fallback chain.
//!
//! Each [`Strategy`] reads what it can from a file. [`Extractor`] runs them in
//! order and stops at the first one that yields a capture timestamp; a
//! location found along the way is kept even if a later strategy is the one
//! that supplies the timestamp.

mod exif;
mod exiftool;
mod filesystem;

pub use self::exif::Exif;
pub use self::exiftool::ExifTool;
pub use self::filesystem::FileModified;
use crate::error::Result;
use crate::models::{DateSource, Found, Metadata};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::instrument;

/// A single source of metadata.
///
/// Strategies are blocking: run [`Extractor::extract`] inside
/// [`spawn_blocking`](https://docs.rs/tokio/latest/tokio/task/fn.spawn_blocking.html)
/// from async code.
pub trait Strategy: Send + Sync {
    /// The tier reported when this strategy supplies the capture timestamp.
    fn source(&self) -> DateSource;

    /// Read whatever this strategy can find. An error is treated exactly like
    /// an empty [`Found`] by the chain.
    fn read(&self, path: &Path) -> Result<Found>;
}

/// Ordered chain of [`Strategy`]s combined by "first timestamp wins".
#[derive(Clone)]
pub struct Extractor {
    strategies: Arc<[Box<dyn Strategy>]>,
}
impl fmt::Debug for Extractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.strategies.iter().map(|s| s.source())).finish()
    }
}
impl Extractor {
    pub fn new(strategies: Vec<Box<dyn Strategy>>) -> Self {
        Self { strategies: strategies.into() }
    }

    /// `exiftool` (when installed), then embedded EXIF, then the file's
    /// modification time.
    pub fn standard() -> Self {
        let mut strategies: Vec<Box<dyn Strategy>> = Vec::with_capacity(3);
        if let Some(exiftool) = ExifTool::discover() {
            strategies.push(Box::new(exiftool));
        }
        strategies.push(Box::new(Exif));
        strategies.push(Box::new(FileModified));
        Self::new(strategies)
    }

    /// Best-effort metadata for the file at `path`. Never fails: when no tier
    /// yields a timestamp, [`Metadata::captured_at`] is `None`.
    #[instrument(skip(self), fields(path = %path.display()))]
    pub fn extract(&self, path: &Path) -> Metadata {
        let mut location = None;
        for strategy in self.strategies.iter() {
            let found = match strategy.read(path) {
                Ok(found) => found,
                Err(err) => {
                    tracing::debug!(source = %strategy.source(), error = ?err, "Metadata source yielded nothing");
                    continue;
                },
            };
            location = location.or(found.location);
            if let Some(captured_at) = found.captured_at {
                let source = strategy.source();
                if source.is_degraded() {
                    tracing::warn!(%source, "No embedded capture date; falling back to the file modification time");
                }
                return Metadata { captured_at: Some(captured_at), location, source: Some(source) };
            }
        }
        Metadata { captured_at: None, location, source: None }
    }
}
