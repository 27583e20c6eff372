mod collision;
pub mod error;
mod filter;
mod hash;
mod heartbeat;
mod ingest;
mod service;
mod stability;
mod watch;

pub use crate::collision::{
    Decision, MAX_RENAME_ATTEMPTS, MoveReason, find_duplicate_in_directory, resolve, unique_sibling,
};
pub use crate::filter::DenyList;
pub use crate::hash::{hash_file, hash_reader, hash_stored};
pub use crate::heartbeat::{Heartbeat, NoopReporter, StatusReporter, StatusSnapshot};
pub use crate::ingest::{Ingestor, Outcome};
pub use crate::service::{Service, Settings, scan_inbox};
pub use crate::stability::{Registration, Settled, StabilityTracker};
pub use crate::watch::{InboxWatcher, registrable_paths};
