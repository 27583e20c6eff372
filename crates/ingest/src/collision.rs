use crate::error::{ErrorKind, Result};
use crate::hash::hash_stored;
use derive_more::Display;
use exn::ResultExt;
use futures::TryStreamExt;
use librarian_storage::BackendHandle;
use std::path::{Path, PathBuf};

/// Default number of `name_N` siblings tried before giving up with
/// [`ErrorKind::NameExhausted`].
pub const MAX_RENAME_ATTEMPTS: u32 = 10_000;

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum MoveReason {
    #[display("no collision")]
    NoCollision,
    #[display("name collision: renamed")]
    Renamed,
}

/// What to do with an incoming file whose intended archive path is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Move the file to `path` (relative to the archive root).
    Move { path: PathBuf, reason: MoveReason },
    /// The archive already holds identical content at `existing`.
    Skip { existing: PathBuf },
}

/// Decide where a file with content `digest` should go, given that it would
/// like to live at `intended`.
///
/// 1. Nothing at `intended`: move there.
/// 2. Identical content at `intended`: skip, the incoming file is redundant.
/// 3. Different content at `intended`: move to the first free
///    [sibling](unique_sibling), trying at most `max_attempts`. Existing
///    archive files are never overwritten.
pub async fn resolve(
    backend: &BackendHandle,
    intended: &Path,
    digest: &blake3::Hash,
    max_attempts: u32,
) -> Result<Decision> {
    if !backend.exists(intended).await.or_raise(|| ErrorKind::Storage)? {
        return Ok(Decision::Move { path: intended.to_path_buf(), reason: MoveReason::NoCollision });
    }
    if hash_stored(backend, intended).await? == *digest {
        return Ok(Decision::Skip { existing: intended.to_path_buf() });
    }
    let path = unique_sibling(backend, intended, max_attempts).await?;
    tracing::info!(intended = %intended.display(), renamed = %path.display(), "Name collision with different content");
    Ok(Decision::Move { path, reason: MoveReason::Renamed })
}

/// First of `stem_1.ext`, `stem_2.ext`, … up to `stem_{max_attempts}.ext`
/// that doesn't exist yet. Files without an extension get `name_1`,
/// `name_2`, …
pub async fn unique_sibling(backend: &BackendHandle, path: &Path, max_attempts: u32) -> Result<PathBuf> {
    for counter in 1..=max_attempts {
        let candidate = sibling(path, counter);
        if !backend.exists(&candidate).await.or_raise(|| ErrorKind::Storage)? {
            return Ok(candidate);
        }
    }
    exn::bail!(ErrorKind::NameExhausted(path.to_path_buf()))
}

fn sibling(path: &Path, counter: u32) -> PathBuf {
    let mut name = path.file_stem().unwrap_or_default().to_os_string();
    name.push(format!("_{counter}"));
    if let Some(extension) = path.extension() {
        name.push(".");
        name.push(extension);
    }
    path.with_file_name(name)
}

/// Look for a file with content `digest` directly inside `directory` (not in
/// subdirectories), ignoring `exclude`.
///
/// Archive files that can't be read are skipped with a warning rather than
/// failing the search.
pub async fn find_duplicate_in_directory(
    backend: &BackendHandle,
    directory: &Path,
    digest: &blake3::Hash,
    exclude: Option<&Path>,
) -> Result<Option<PathBuf>> {
    let mut files = backend.list_stream(Some(directory));
    while let Some(file) = files.try_next().await.or_raise(|| ErrorKind::Storage)? {
        if file.path.parent() != Some(directory) || exclude == Some(file.path.as_path()) {
            continue;
        }
        match hash_stored(backend, &file.path).await {
            Ok(existing) if existing == *digest => return Ok(Some(file.path)),
            Ok(_) => {},
            Err(err) => {
                tracing::warn!(path = %file.path.display(), error = ?err, "Unable to hash archived file; skipping");
            },
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use librarian_storage::backend::LocalBackend;
    use rstest::rstest;
    use std::sync::Arc;

    fn archive() -> (tempfile::TempDir, BackendHandle) {
        let dir = tempfile::tempdir().unwrap();
        let backend: BackendHandle = Arc::new(LocalBackend::new("archive", dir.path()).unwrap());
        (dir, backend)
    }

    fn put(dir: &tempfile::TempDir, path: &str, data: &[u8]) {
        let path = dir.path().join(path);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, data).unwrap();
    }

    #[rstest]
    #[case("2025/2025-06-15/IMG_0001.jpg", 1, "2025/2025-06-15/IMG_0001_1.jpg")]
    #[case("2025/2025-06-15/IMG_0001.jpg", 42, "2025/2025-06-15/IMG_0001_42.jpg")]
    #[case("2025/2025-06-15/README", 2, "2025/2025-06-15/README_2")]
    #[case("2025/2025-06-15/clip.tar.gz", 1, "2025/2025-06-15/clip.tar_1.gz")]
    fn sibling_names(#[case] path: &str, #[case] counter: u32, #[case] expected: &str) {
        assert_eq!(sibling(Path::new(path), counter), PathBuf::from(expected));
    }

    #[tokio::test]
    async fn free_destination() {
        let (_dir, backend) = archive();
        let digest = blake3::hash(b"new");
        let intended = Path::new("2025/2025-06-15/a.jpg");
        let decision = resolve(&backend, intended, &digest, MAX_RENAME_ATTEMPTS).await.unwrap();
        assert_eq!(
            decision,
            Decision::Move { path: PathBuf::from("2025/2025-06-15/a.jpg"), reason: MoveReason::NoCollision }
        );
    }

    #[tokio::test]
    async fn identical_content_is_skipped() {
        let (dir, backend) = archive();
        put(&dir, "2025/2025-06-15/a.jpg", b"same");
        let digest = blake3::hash(b"same");
        let intended = Path::new("2025/2025-06-15/a.jpg");
        let decision = resolve(&backend, intended, &digest, MAX_RENAME_ATTEMPTS).await.unwrap();
        assert_eq!(decision, Decision::Skip { existing: PathBuf::from("2025/2025-06-15/a.jpg") });
    }

    #[tokio::test]
    async fn different_content_is_renamed_past_taken_siblings() {
        let (dir, backend) = archive();
        put(&dir, "2025/2025-06-15/a.jpg", b"first");
        put(&dir, "2025/2025-06-15/a_1.jpg", b"second");
        let digest = blake3::hash(b"third");
        let intended = Path::new("2025/2025-06-15/a.jpg");
        let decision = resolve(&backend, intended, &digest, MAX_RENAME_ATTEMPTS).await.unwrap();
        assert_eq!(
            decision,
            Decision::Move { path: PathBuf::from("2025/2025-06-15/a_2.jpg"), reason: MoveReason::Renamed }
        );
    }

    #[tokio::test]
    async fn renaming_gives_up_after_the_attempt_limit() {
        let (dir, backend) = archive();
        for name in ["a.jpg", "a_1.jpg", "a_2.jpg"] {
            put(&dir, &format!("2025/2025-06-15/{name}"), name.as_bytes());
        }
        let intended = Path::new("2025/2025-06-15/a.jpg");

        let err = resolve(&backend, intended, &blake3::hash(b"fourth"), 2).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NameExhausted(path) if path == intended));
        assert!(!err.is_retryable());
        // One more attempt finds the free name.
        assert_eq!(unique_sibling(&backend, intended, 3).await.unwrap(), PathBuf::from("2025/2025-06-15/a_3.jpg"));
    }

    #[tokio::test]
    async fn duplicate_found_under_another_name() {
        let (dir, backend) = archive();
        put(&dir, "2025/2025-06-15/original.jpg", b"pixels");
        put(&dir, "2025/2025-06-15/other.jpg", b"other pixels");
        // Same content one level deeper and in the neighbouring day don't count.
        put(&dir, "2025/2025-06-15/nested/copy.jpg", b"needle");
        put(&dir, "2025/2025-06-16/copy.jpg", b"needle");

        let day = Path::new("2025/2025-06-15");
        let found = find_duplicate_in_directory(&backend, day, &blake3::hash(b"pixels"), None).await.unwrap();
        assert_eq!(found, Some(PathBuf::from("2025/2025-06-15/original.jpg")));
        let missing = find_duplicate_in_directory(&backend, day, &blake3::hash(b"needle"), None).await.unwrap();
        assert_eq!(missing, None);
    }

    #[tokio::test]
    async fn duplicate_search_honours_exclusion() {
        let (dir, backend) = archive();
        put(&dir, "2025/2025-06-15/a.jpg", b"pixels");
        let day = Path::new("2025/2025-06-15");
        let excluded = Path::new("2025/2025-06-15/a.jpg");
        let found = find_duplicate_in_directory(&backend, day, &blake3::hash(b"pixels"), Some(excluded)).await.unwrap();
        assert_eq!(found, None);
    }

    #[tokio::test]
    async fn missing_directory_has_no_duplicates() {
        let (_dir, backend) = archive();
        let found = find_duplicate_in_directory(&backend, Path::new("2030/2030-01-01"), &blake3::hash(b"x"), None)
            .await
            .unwrap();
        assert_eq!(found, None);
    }
}
