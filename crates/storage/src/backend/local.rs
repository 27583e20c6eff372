//! Local filesystem storage backend.
//!
//! Files are stored in a configured directory and accessed using standard
//! filesystem operations via `tokio::fs` for async I/O.

use crate::backend::{BoxSyncRead, FileInfoStream};
use crate::error::ErrorKind;
use crate::{FileInfo, StorageBackend, error::Result, path::validate as validate_path};
use async_stream::stream;
use async_trait::async_trait;
use exn::ResultExt;
use std::fs::{Metadata, create_dir_all as sync_create_dir};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{self, DirEntry};

enum WalkEntry {
    File(FileInfo),
    Descend(PathBuf),
    Skip,
}

/// Local filesystem storage backend.
///
/// Stores files in a directory on the local filesystem. All paths are relative
/// to the configured root directory.
///
/// # Examples
///
/// ```no_run
/// use librarian_storage::backend::LocalBackend;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = LocalBackend::new("originals", "/srv/media/Storage/Originals")?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct LocalBackend {
    name: String,
    /// Root directory of the archive
    root: PathBuf,
}
impl LocalBackend {
    /// Create a new local filesystem backend, creating the root directory if
    /// it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not absolute, or exists but is not a
    /// directory.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() {
            exn::bail!(ErrorKind::InvalidPath(root));
        }
        if root.exists() {
            if !root.is_dir() {
                exn::bail!(ErrorKind::InvalidPath(root));
            }
        } else {
            // Only happens once at startup; not worth making the constructor async.
            sync_create_dir(&root).map_err(|e| Self::map_io_error(e, &root))?;
        }
        Ok(Self { name: name.into(), root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the absolute path for a relative storage path.
    fn absolute_path(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let validated = validate_path(path.as_ref())?;
        Ok(self.root.join(validated))
    }

    /// Convert an absolute path back to a relative storage path.
    fn relative_path(&self, absolute: impl AsRef<Path>) -> Result<PathBuf> {
        let absolute = absolute.as_ref();
        if !absolute.is_absolute() {
            exn::bail!(ErrorKind::BackendError(format!(
                "attempting to get relative path of non-absolute path `{:?}`",
                absolute
            )))
        }
        let relative = absolute.strip_prefix(&self.root).or_raise(|| {
            ErrorKind::BackendError(format!("path `{:?}` is not within root `{:?}`", absolute, self.root))
        })?;
        Ok(validate_path(relative)?)
    }

    fn metadata(path: &Path, metadata: Metadata) -> Result<FileInfo> {
        let modified = metadata.modified().map_err(ErrorKind::Io)?.into();
        Ok(FileInfo::new(PathBuf::from(path), metadata.len(), modified))
    }

    fn map_io_error(e: io::Error, path: &Path) -> ErrorKind {
        match e.kind() {
            io::ErrorKind::NotFound => ErrorKind::NotFound(path.to_path_buf()),
            io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied(path.to_path_buf()),
            io::ErrorKind::AlreadyExists => ErrorKind::AlreadyExists(path.to_path_buf()),
            _ => ErrorKind::Io(e),
        }
    }

    /// Errors can't be `?`-ed inside the `stream!` loop, so the fallible part
    /// of walking a single entry lives here.
    async fn process_entry(&self, entry: DirEntry, prefix: Option<&Path>) -> Result<WalkEntry> {
        let path = entry.path();
        let metadata = entry.metadata().await.map_err(|e| Self::map_io_error(e, &path))?;
        let relative = self.relative_path(&path)?;
        if let Some(pfx) = prefix
            && !relative.starts_with(pfx)
        {
            return Ok(WalkEntry::Skip);
        }
        if metadata.is_dir() {
            return Ok(WalkEntry::Descend(path));
        }
        if metadata.is_file() {
            return Ok(WalkEntry::File(Self::metadata(&relative, metadata)?));
        }
        // Most likely a broken symlink.
        Ok(WalkEntry::Skip)
    }
}

/// Name of the hidden sibling a cross-device copy is written to before being
/// renamed into place.
fn staging_path(target: &Path) -> PathBuf {
    let name = target.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    target.with_file_name(format!(".{name}.partial"))
}

/// Give `source` the name `target`, failing with `AlreadyExists` instead of
/// replacing a file that is already there.
///
/// A hard link is created first and `source` unlinked afterwards; `rename`
/// would silently replace `target`. Filesystems without hard links (FAT
/// reports `EPERM`) fall back to check-then-rename.
fn move_into_place(source: &Path, target: &Path) -> io::Result<()> {
    match std::fs::hard_link(source, target) {
        Ok(()) => std::fs::remove_file(source),
        Err(err) if matches!(err.kind(), io::ErrorKind::Unsupported | io::ErrorKind::PermissionDenied) => {
            if target.try_exists()? {
                return Err(io::Error::from(io::ErrorKind::AlreadyExists));
            }
            std::fs::rename(source, target)
        },
        Err(err) => Err(err),
    }
}

/// Copy `source` next to `target`, flush it to disk, move it into place and
/// only then remove `source`. A failed copy never leaves a partial file
/// behind at `target`.
fn copy_across_devices(source: &Path, target: &Path) -> io::Result<()> {
    let staging = staging_path(target);
    let copied = std::fs::copy(source, &staging)
        .and_then(|_| std::fs::File::open(&staging)?.sync_all())
        .and_then(|_| move_into_place(&staging, target));
    if let Err(err) = copied {
        _ = std::fs::remove_file(&staging);
        return Err(err);
    }
    std::fs::remove_file(source)
}

/// Same-filesystem moves, falling back to a copy across devices.
fn import_blocking(source: &Path, target: &Path) -> io::Result<()> {
    match move_into_place(source, target) {
        Err(err) if err.kind() == io::ErrorKind::CrossesDevices => {
            tracing::debug!(
                source = %source.display(),
                target = %target.display(),
                "Source is on a different filesystem; copying instead of renaming"
            );
            copy_across_devices(source, target)
        },
        result => result,
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn locate(&self, path: &Path) -> Result<PathBuf> {
        self.absolute_path(path)
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a> {
        let validated_prefix = match prefix.map(validate_path).transpose() {
            Ok(pfx) => pfx,
            Err(e) => return Box::pin(futures::stream::once(async { Result::Err(e) })),
        };

        // Walk from the parent of the prefix so that a prefix naming a file,
        // or a directory that doesn't exist yet, doesn't error.
        // "2025/2025-06-15" starts in "2025" and matches:
        // - [MATCH] "2025/2025-06-15/a.jpg"
        // - [NOT MATCH] "2025/2025-06-150/a.jpg" (Path::starts_with is component-based)
        let start_dir = validated_prefix
            .as_ref()
            .map(|prefix| self.root.join(prefix).parent().unwrap_or(&self.root).to_path_buf())
            .unwrap_or_else(|| self.root.clone());
        let mut stack = vec![start_dir];

        Box::pin(stream! {
            'dirs: while let Some(current) = stack.pop() {
                let mut entries = match fs::read_dir(&current).await {
                    Ok(entries) => entries,
                    // A directory that doesn't exist is an empty listing.
                    Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
                    Err(err) => {
                        yield Err(exn::Exn::from(Self::map_io_error(err, &current)));
                        continue 'dirs;
                    }
                };

                'entries: loop {
                    let entry = match entries.next_entry().await {
                        Ok(Some(entry)) => entry,
                        Ok(None) => break 'entries,
                        Err(e) => { yield Err(exn::Exn::from(Self::map_io_error(e, &current))); continue 'entries; },
                    };
                    match self.process_entry(entry, validated_prefix.as_deref()).await {
                        Ok(WalkEntry::File(f)) => yield Ok(f),
                        Ok(WalkEntry::Descend(d)) => stack.push(d),
                        Ok(WalkEntry::Skip) => {},
                        Err(e) => yield Err(e),
                    };
                }
            }
        })
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::try_exists(&abs_path).await.map_err(ErrorKind::Io)?)
    }

    async fn reader(&self, path: &Path) -> Result<BoxSyncRead> {
        let abs_path = self.absolute_path(path)?;
        let file = fs::File::open(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?;
        Ok(Box::new(file.into_std().await))
    }

    async fn create_dir(&self, path: &Path) -> Result<()> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::create_dir_all(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?)
    }

    async fn import(&self, source: &Path, to: &Path) -> Result<()> {
        if !source.is_absolute() {
            exn::bail!(ErrorKind::InvalidPath(source.to_path_buf()));
        }
        let target = self.absolute_path(to)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await.map_err(|e| Self::map_io_error(e, to))?;
        }
        let from = source.to_path_buf();
        let imported = tokio::task::spawn_blocking(move || import_blocking(&from, &target))
            .await
            .map_err(|e| ErrorKind::BackendError(format!("import task failed: {e}")))?;
        match imported {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                exn::bail!(ErrorKind::AlreadyExists(to.to_path_buf()))
            },
            Err(err) => exn::bail!(Self::map_io_error(err, source)),
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use futures::TryStreamExt;
    use std::io::Read;

    fn archive() -> (tempfile::TempDir, LocalBackend) {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("originals", temp_dir.path()).unwrap();
        (temp_dir, backend)
    }

    /// Place a file under the archive root without going through the backend.
    fn put(backend: &LocalBackend, path: &str, data: &[u8]) {
        let path = backend.root().join(path);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, data).unwrap();
    }

    async fn listing(backend: &LocalBackend, prefix: Option<&str>) -> Vec<PathBuf> {
        let files: Vec<FileInfo> = backend.list_stream(prefix.map(Path::new)).try_collect().await.unwrap();
        let mut paths: Vec<_> = files.into_iter().map(|f| f.path).collect();
        paths.sort();
        paths
    }

    #[test]
    fn test_new_requires_absolute_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert!(LocalBackend::new("originals", temp_dir.path()).is_ok());
        assert!(LocalBackend::new("originals", "relative/path").is_err());
        assert!(LocalBackend::new("originals", "./relative").is_err());
    }

    #[test]
    fn test_new_creates_missing_root() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path().join("Storage/Originals");
        LocalBackend::new("originals", &root).unwrap();
        assert!(root.is_dir());
    }

    #[test]
    fn test_absolute_and_relative_paths() {
        let (temp_dir, backend) = archive();
        let expected = temp_dir.path().join("2025/2025-06-15/a.jpg");
        assert_eq!(backend.absolute_path("2025/2025-06-15/a.jpg").unwrap(), expected);
        assert_eq!(backend.locate(Path::new("2025/2025-06-15/a.jpg")).unwrap(), expected);
        assert!(backend.absolute_path("../etc/passwd").is_err());
        assert_eq!(backend.relative_path(&expected).unwrap(), Path::new("2025/2025-06-15/a.jpg"));
        assert!(backend.relative_path("/other/file.jpg").is_err());
    }

    #[tokio::test]
    async fn test_import_moves_file() {
        let (archive_dir, backend) = archive();
        let inbox = tempfile::tempdir().unwrap();
        let source = inbox.path().join("IMG_0001.jpg");
        std::fs::write(&source, b"jpeg bytes").unwrap();

        backend.import(&source, Path::new("2025/2025-06-15/IMG_0001.jpg")).await.unwrap();
        assert!(!source.exists());
        let data = std::fs::read(archive_dir.path().join("2025/2025-06-15/IMG_0001.jpg")).unwrap();
        assert_eq!(data, b"jpeg bytes");
    }

    #[tokio::test]
    async fn test_import_refuses_to_overwrite() {
        let (archive_dir, backend) = archive();
        put(&backend, "2025/2025-06-15/a.jpg", b"original");
        let inbox = tempfile::tempdir().unwrap();
        let source = inbox.path().join("a.jpg");
        std::fs::write(&source, b"newcomer").unwrap();

        let err = backend.import(&source, Path::new("2025/2025-06-15/a.jpg")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::AlreadyExists(_)));
        // Neither side was touched.
        assert_eq!(std::fs::read(&source).unwrap(), b"newcomer");
        assert_eq!(std::fs::read(archive_dir.path().join("2025/2025-06-15/a.jpg")).unwrap(), b"original");
    }

    #[test]
    fn test_move_into_place_keeps_an_existing_target() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("incoming.jpg");
        let target = dir.path().join("a.jpg");
        std::fs::write(&source, b"newcomer").unwrap();
        // Stands in for a file that appeared after the destination was chosen.
        std::fs::write(&target, b"original").unwrap();

        let err = move_into_place(&source, &target).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(std::fs::read(&source).unwrap(), b"newcomer");
        assert_eq!(std::fs::read(&target).unwrap(), b"original");
    }

    #[test]
    fn test_move_into_place_unlinks_source() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("incoming.jpg");
        let target = dir.path().join("a.jpg");
        std::fs::write(&source, b"bytes").unwrap();

        move_into_place(&source, &target).unwrap();
        assert!(!source.exists());
        assert_eq!(std::fs::read(&target).unwrap(), b"bytes");
    }

    #[tokio::test]
    async fn test_import_missing_source() {
        let (_archive_dir, backend) = archive();
        let inbox = tempfile::tempdir().unwrap();
        let err = backend.import(&inbox.path().join("gone.jpg"), Path::new("gone.jpg")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_import_requires_absolute_source() {
        let (_archive_dir, backend) = archive();
        let err = backend.import(Path::new("relative.jpg"), Path::new("a.jpg")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidPath(_)));
    }

    #[test]
    fn test_copy_across_devices_preserves_bytes() {
        let source_dir = tempfile::tempdir().unwrap();
        let target_dir = tempfile::tempdir().unwrap();
        let source = source_dir.path().join("clip.mov");
        let target = target_dir.path().join("clip.mov");
        let payload: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&source, &payload).unwrap();

        copy_across_devices(&source, &target).unwrap();
        assert!(!source.exists());
        assert!(!staging_path(&target).exists());
        assert_eq!(std::fs::read(&target).unwrap(), payload);
    }

    #[test]
    fn test_copy_across_devices_cleans_up_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.jpg");
        assert!(copy_across_devices(&dir.path().join("missing.jpg"), &target).is_err());
        assert!(!target.exists());
        assert!(!staging_path(&target).exists());
    }

    #[test]
    fn test_copy_across_devices_never_overwrites() {
        let source_dir = tempfile::tempdir().unwrap();
        let target_dir = tempfile::tempdir().unwrap();
        let source = source_dir.path().join("clip.mov");
        let target = target_dir.path().join("clip.mov");
        std::fs::write(&source, b"newcomer").unwrap();
        std::fs::write(&target, b"original").unwrap();

        let err = copy_across_devices(&source, &target).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert!(source.exists());
        assert!(!staging_path(&target).exists());
        assert_eq!(std::fs::read(&target).unwrap(), b"original");
    }

    #[tokio::test]
    async fn test_reader_streams_contents() {
        let (_archive_dir, backend) = archive();
        put(&backend, "file.jpg", b"0123456789");
        let mut reader = backend.reader(Path::new("file.jpg")).await.unwrap();
        let mut buffer = String::new();
        reader.read_to_string(&mut buffer).unwrap();
        assert_eq!(buffer, "0123456789");
    }

    #[tokio::test]
    async fn test_create_dir_is_idempotent() {
        let (temp_dir, backend) = archive();
        backend.create_dir(Path::new("2025/2025-06-15")).await.unwrap();
        backend.create_dir(Path::new("2025/2025-06-15")).await.unwrap();
        assert!(temp_dir.path().join("2025/2025-06-15").is_dir());
    }

    #[tokio::test]
    async fn test_exists() {
        let (_archive_dir, backend) = archive();
        put(&backend, "file.jpg", b"data");
        assert!(backend.exists(Path::new("file.jpg")).await.unwrap());
        assert!(!backend.exists(Path::new("other.jpg")).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_reports_size() {
        let (_archive_dir, backend) = archive();
        put(&backend, "2025/2025-06-15/a.jpg", b"Hello, world!");
        let files: Vec<FileInfo> = backend.list_stream(None).try_collect().await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, PathBuf::from("2025/2025-06-15/a.jpg"));
        assert_eq!(files[0].size, 13);
    }

    #[tokio::test]
    async fn test_list_with_prefix() {
        let (_archive_dir, backend) = archive();
        put(&backend, "2025/2025-06-15/a.jpg", b"data");
        put(&backend, "2025/2025-06-15/b.jpg", b"data");
        put(&backend, "2025/2025-06-16/c.jpg", b"data");
        assert_eq!(listing(&backend, None).await.len(), 3);
        assert_eq!(
            listing(&backend, Some("2025/2025-06-15")).await,
            vec![PathBuf::from("2025/2025-06-15/a.jpg"), PathBuf::from("2025/2025-06-15/b.jpg")]
        );
    }

    #[tokio::test]
    async fn test_list_nonexistent_prefix() {
        let (_archive_dir, backend) = archive();
        assert!(listing(&backend, Some("1999/1999-01-01")).await.is_empty());
    }

    #[tokio::test]
    async fn test_path_security() {
        let (_archive_dir, backend) = archive();
        assert!(backend.exists(Path::new("../etc/passwd")).await.is_err());
        assert!(backend.reader(Path::new("../etc/passwd")).await.is_err());
        assert!(backend.create_dir(Path::new("../escape")).await.is_err());
    }
}
