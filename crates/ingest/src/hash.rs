//! Streaming BLAKE3 content digests.
//!
//! Files are read in fixed-size chunks so that large videos are never held in
//! memory. Digests are compared as [`blake3::Hash`] (constant-time equality)
//! and stored as 64 lowercase hex characters.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use librarian_storage::BackendHandle;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

pub const CHUNK_SIZE: usize = 64 * 1024;

/// Digest everything `reader` yields.
pub fn hash_reader(mut reader: impl Read) -> io::Result<blake3::Hash> {
    let mut hasher = blake3::Hasher::new();
    let mut buffer = vec![0; CHUNK_SIZE];
    loop {
        match reader.read(&mut buffer) {
            Ok(0) => return Ok(hasher.finalize()),
            Ok(read) => {
                hasher.update(&buffer[..read]);
            },
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
}

/// Digest a file on the local filesystem (usually in the inbox).
pub async fn hash_file(path: &Path) -> Result<blake3::Hash> {
    let owned = path.to_path_buf();
    tokio::task::spawn_blocking(move || File::open(&owned).and_then(hash_reader))
        .await
        .or_raise(|| ErrorKind::Task)?
        .or_raise(|| ErrorKind::Hash(path.to_path_buf()))
}

/// Digest a file already in the archive.
pub async fn hash_stored(backend: &BackendHandle, path: &Path) -> Result<blake3::Hash> {
    let reader = backend.reader(path).await.or_raise(|| ErrorKind::Storage)?;
    tokio::task::spawn_blocking(move || hash_reader(reader))
        .await
        .or_raise(|| ErrorKind::Task)?
        .or_raise(|| ErrorKind::Hash(path.to_path_buf()))
}

/// Abbreviated hex digest for log lines.
pub fn short(digest: &blake3::Hash) -> String {
    digest.to_hex().as_str()[..12].to_string()
}
