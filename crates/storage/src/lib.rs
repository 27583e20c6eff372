//! Storage for the organized media archive.
//!
//! The archive is addressed through [`StorageBackend`] using paths relative to
//! the archive root (`{YYYY}/{YYYY-MM-DD}/{filename}`). Files enter the archive
//! exclusively through [`StorageBackend::import`], which moves a file from the
//! local filesystem (the inbox) into the backend without ever overwriting an
//! existing archive entry.

pub mod backend;
pub mod error;
mod models;
mod path;

pub use crate::backend::StorageBackend;
pub use crate::models::FileInfo;
pub use crate::path::validate as validate_path;
use std::sync::Arc;

pub type BackendHandle = Arc<dyn StorageBackend + Send + Sync>;
