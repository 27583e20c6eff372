//! SQLite ledger for the media archive.
//!
//! The ledger records every file that has been durably moved into the archive,
//! keyed by the BLAKE3 hash of its content. Unlike a cache, the ledger is only
//! ever appended to by the ingest pipeline: rows are never updated or deleted
//! here, and at most one row exists per content hash.
//!
//! # Architecture
//! - **MediaAssets**: one row per uniquely-ingested file, with provenance
//!   (where it came from), where it ended up, and status flags reserved for
//!   downstream enrichment stages.
//! - **Service status**: the current heartbeat of each service plus a
//!   history of recent beats, read by the monitoring dashboard and pruned
//!   after a configurable number of days.

mod db;
pub mod error;
mod models;
mod repo;
mod status;

pub use crate::db::Database;
pub use crate::models::{Enrichment, Location, MediaAsset, NewAsset, ServiceStatus, Status};
pub use crate::repo::{Ledger, Recorded};
pub use crate::status::StatusStore;
