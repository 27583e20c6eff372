//! Storage backend trait and implementations.
//!
//! This module defines the `StorageBackend` trait, the interface the ingest
//! pipeline uses to inspect and populate the archive.

mod local;

pub use self::local::LocalBackend;
use crate::error::Result;
use crate::models::FileInfo;
use async_trait::async_trait;
use futures::Stream;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::pin::Pin;

type FileInfoStream<'a> = Pin<Box<dyn Stream<Item = Result<FileInfo>> + Send + 'a>>;
type BoxSyncRead = Box<dyn Read + Send + 'static>;

/// Unified interface for archive storage.
///
/// # Path Handling
/// All paths are relative to the archive root and must be validated using
/// [`validate_path`](crate::validate_path) before use. Implementations should
/// enforce this validation. The only exception is the `source` argument of
/// [`import()`](Self::import), which is an absolute path on the local
/// filesystem outside of the archive.
///
/// # Examples
///
/// ```
/// use std::io::Read;
/// use std::path::Path;
/// use librarian_storage::backend::StorageBackend;
/// use librarian_storage::error::{ErrorKind, Result};
///
/// async fn first_bytes(backend: &dyn StorageBackend, path: &Path) -> Result<Vec<u8>> {
///     let mut head = Vec::new();
///     if backend.exists(path).await? {
///         let reader = backend.reader(path).await?;
///         reader.take(16).read_to_end(&mut head).map_err(ErrorKind::Io)?;
///     }
///     Ok(head)
/// }
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Name of the configured backend (used for logging only).
    fn name(&self) -> &str;

    /// Resolve a relative archive path into the location recorded in the
    /// ledger as the asset's final path.
    fn locate(&self, path: &Path) -> Result<PathBuf>;

    /// Stream file metadata matching an optional prefix, recursively.
    ///
    /// Asking for a prefix that doesn't exist yields an empty stream rather
    /// than an error.
    ///
    /// # Examples
    ///
    /// ```
    /// use futures::TryStreamExt;
    /// use std::path::Path;
    /// # use librarian_storage::{backend::StorageBackend, error::Result};
    /// # async fn example(backend: &dyn StorageBackend) -> Result<()> {
    /// let mut day = backend.list_stream(Some(Path::new("2025/2025-06-15")));
    /// while let Some(info) = day.try_next().await? {
    ///     println!("{}: {} bytes", info.path.display(), info.size);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a>;

    /// Check if a file exists.
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Open a file for streaming reads.
    ///
    /// Returns a `'static` boxed [`Read`](std::io::Read) suitable for use
    /// inside [`spawn_blocking`](tokio::task::spawn_blocking), so that large
    /// media files can be hashed without buffering them in memory.
    async fn reader(&self, path: &Path) -> Result<BoxSyncRead>;

    /// Ensure a directory exists (idempotent).
    async fn create_dir(&self, path: &Path) -> Result<()>;

    /// Move a file from the local filesystem into the archive.
    ///
    /// `source` is an absolute path outside the archive; `to` is relative to
    /// the archive root. Once this returns `Ok`, the file exists at `to` with
    /// identical bytes and no longer exists at `source`.
    ///
    /// # Notes
    /// - Implementations should create parent directories as needed.
    /// - Returns [`AlreadyExists`](crate::error::ErrorKind::AlreadyExists)
    ///   rather than overwriting an existing file at `to`, even one that
    ///   appears while the import is running.
    /// - Returns [`NotFound`](crate::error::ErrorKind::NotFound) if `source`
    ///   has disappeared.
    async fn import(&self, source: &Path, to: &Path) -> Result<()>;
}
