//! File stability detection.
//!
//! A file dropped into the inbox may still be being written (a sync client
//! mid-download, a camera mid-copy). Paths are tracked from the moment they
//! are first seen and only handed over for ingestion once their modification
//! time has stopped changing for long enough.
//!
//! ```text
//! unseen ──register──▶ pending ──poll (stable)──▶ processing ──finish──▶ removed
//!                        ▲   │                                    │
//!                        └───┘ mtime changed: clock reset         └──▶ parked (left in inbox)
//! ```
//!
//! The tracker is shared between the event listener, the periodic rescan and
//! the checker. Its lock is never held across I/O: [`poll`](StabilityTracker::poll)
//! snapshots the pending map, stats every file without the lock, then applies
//! the results.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};

/// Outcome of [`StabilityTracker::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// First sighting; the stability clock starts now.
    New,
    /// Already pending but modified since; the stability clock restarted.
    Reset,
    /// Already pending and untouched.
    Unchanged,
    /// Currently being ingested.
    Processing,
    /// Previously left in the inbox and not modified since.
    Parked,
    /// Not a regular file (directory, vanished, broken symlink).
    Ignored,
}

/// How a promoted file left the ingest pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settled {
    /// Moved into the archive or deleted as a duplicate.
    Removed,
    /// Still in the inbox (filtered, or ingestion failed). It will not be
    /// promoted again until its modification time changes.
    LeftInPlace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Pending {
    modified: SystemTime,
    registered_at: SystemTime,
}

#[derive(Debug, Default)]
struct State {
    pending: HashMap<PathBuf, Pending>,
    /// Modification time at promotion.
    processing: HashMap<PathBuf, SystemTime>,
    parked: HashMap<PathBuf, SystemTime>,
}

#[derive(Debug)]
pub struct StabilityTracker {
    /// Time a file must go unmodified after being registered.
    delay: Duration,
    /// Minimum age of the file's modification time.
    min_file_age: Duration,
    state: Mutex<State>,
}
impl StabilityTracker {
    pub fn new(delay: Duration, min_file_age: Duration) -> Self {
        Self { delay, min_file_age, state: Mutex::default() }
    }

    /// Start (or continue) tracking `path`, as reported by a filesystem event
    /// or a scan. Idempotent for unchanged files.
    pub async fn register(&self, path: &Path) -> Registration {
        let modified = match tokio::fs::metadata(path).await {
            Ok(metadata) if metadata.is_file() => metadata.modified(),
            _ => return Registration::Ignored,
        };
        match modified {
            Ok(modified) => self.observe(path, modified, SystemTime::now()),
            Err(_) => Registration::Ignored,
        }
    }

    /// Record that `path` was seen at `now` with modification time `modified`.
    pub fn observe(&self, path: &Path, modified: SystemTime, now: SystemTime) -> Registration {
        let mut state = self.state();
        if state.processing.contains_key(path) {
            return Registration::Processing;
        }
        match state.parked.get(path) {
            Some(parked) if *parked == modified => return Registration::Parked,
            Some(_) => {
                tracing::debug!(path = %path.display(), "Parked file was modified; tracking it again");
                state.parked.remove(path);
            },
            None => {},
        }
        match state.pending.entry(path.to_path_buf()) {
            Entry::Vacant(entry) => {
                entry.insert(Pending { modified, registered_at: now });
                Registration::New
            },
            Entry::Occupied(mut entry) if entry.get().modified != modified => {
                entry.insert(Pending { modified, registered_at: now });
                Registration::Reset
            },
            Entry::Occupied(_) => Registration::Unchanged,
        }
    }

    /// Check every pending file and promote the ones that are stable at `now`.
    ///
    /// Promoted paths move to the processing set (so events and rescans
    /// ignore them) and must be handed back with [`finish`](Self::finish).
    /// Vanished files are dropped silently.
    pub async fn poll(&self, now: SystemTime) -> Vec<PathBuf> {
        let snapshot: Vec<(PathBuf, Pending)> =
            self.state().pending.iter().map(|(path, pending)| (path.clone(), *pending)).collect();

        let mut observed = Vec::with_capacity(snapshot.len());
        for (path, seen) in snapshot {
            let modified = match tokio::fs::metadata(&path).await {
                Ok(metadata) if metadata.is_file() => metadata.modified().ok(),
                _ => None,
            };
            observed.push((path, seen, modified));
        }

        let mut state = self.state();
        let mut stable = Vec::new();
        for (path, seen, modified) in observed {
            // Re-registered while we weren't holding the lock; judge it next time.
            if state.pending.get(&path) != Some(&seen) {
                continue;
            }
            let Some(modified) = modified else {
                tracing::debug!(path = %path.display(), "Pending file vanished");
                state.pending.remove(&path);
                continue;
            };
            if modified != seen.modified {
                state.pending.insert(path, Pending { modified, registered_at: now });
                continue;
            }
            let age = now.duration_since(modified).unwrap_or_default();
            let quiet = now.duration_since(seen.registered_at).unwrap_or_default();
            if age >= self.min_file_age && quiet >= self.delay {
                state.pending.remove(&path);
                state.processing.insert(path.clone(), modified);
                stable.push(path);
            }
        }
        stable.sort();
        stable
    }

    /// Release a path promoted by [`poll`](Self::poll).
    pub fn finish(&self, path: &Path, settled: Settled) {
        let mut state = self.state();
        let Some(modified) = state.processing.remove(path) else {
            return;
        };
        if settled == Settled::LeftInPlace {
            state.parked.insert(path.to_path_buf(), modified);
        }
    }

    /// Forget parked files that no longer exist.
    pub async fn prune(&self) {
        let parked: Vec<PathBuf> = self.state().parked.keys().cloned().collect();
        let mut vanished = HashSet::new();
        for path in parked {
            if !tokio::fs::try_exists(&path).await.unwrap_or(true) {
                vanished.insert(path);
            }
        }
        if !vanished.is_empty() {
            self.state().parked.retain(|path, _| !vanished.contains(path));
        }
    }

    pub fn pending_count(&self) -> usize {
        self.state().pending.len()
    }

    pub fn is_pending(&self, path: &Path) -> bool {
        self.state().pending.contains_key(path)
    }

    pub fn is_processing(&self, path: &Path) -> bool {
        self.state().processing.contains_key(path)
    }

    pub fn is_parked(&self, path: &Path) -> bool {
        self.state().parked.contains_key(path)
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    const SECOND: Duration = Duration::from_secs(1);

    /// A file last modified an hour ago, plus that modification time.
    fn old_file(dir: &Path, name: &str) -> (PathBuf, SystemTime) {
        let path = dir.join(name);
        let modified = SystemTime::now() - Duration::from_secs(3600);
        File::create(&path).unwrap().set_modified(modified).unwrap();
        let modified = File::open(&path).unwrap().metadata().unwrap().modified().unwrap();
        (path, modified)
    }

    fn touch(path: &Path, modified: SystemTime) -> SystemTime {
        File::options().write(true).open(path).unwrap().set_modified(modified).unwrap();
        File::open(path).unwrap().metadata().unwrap().modified().unwrap()
    }

    #[tokio::test]
    async fn registration_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let (path, _) = old_file(dir.path(), "a.jpg");
        let tracker = StabilityTracker::new(5 * SECOND, 2 * SECOND);

        assert_eq!(tracker.register(&path).await, Registration::New);
        assert_eq!(tracker.register(&path).await, Registration::Unchanged);
        assert_eq!(tracker.pending_count(), 1);
        assert_eq!(tracker.register(dir.path()).await, Registration::Ignored);
        assert_eq!(tracker.register(&dir.path().join("missing.jpg")).await, Registration::Ignored);
        assert_eq!(tracker.pending_count(), 1);
    }

    #[tokio::test]
    async fn promotion_waits_for_stability_delay() {
        let dir = tempfile::tempdir().unwrap();
        let (path, modified) = old_file(dir.path(), "a.jpg");
        let tracker = StabilityTracker::new(5 * SECOND, 2 * SECOND);
        let t0 = modified + Duration::from_secs(600);

        assert_eq!(tracker.observe(&path, modified, t0), Registration::New);
        assert!(tracker.poll(t0 + SECOND).await.is_empty());
        assert!(tracker.poll(t0 + 4 * SECOND).await.is_empty());
        assert_eq!(tracker.poll(t0 + 5 * SECOND).await, vec![path.clone()]);
        assert!(tracker.is_processing(&path));
        assert!(!tracker.is_pending(&path));
        // Promoted exactly once.
        assert!(tracker.poll(t0 + 10 * SECOND).await.is_empty());
        assert_eq!(tracker.register(&path).await, Registration::Processing);
    }

    #[tokio::test]
    async fn promotion_waits_for_minimum_age() {
        let dir = tempfile::tempdir().unwrap();
        let (path, modified) = old_file(dir.path(), "a.jpg");
        let tracker = StabilityTracker::new(Duration::ZERO, 2 * SECOND);

        tracker.observe(&path, modified, modified);
        assert!(tracker.poll(modified + SECOND).await.is_empty());
        assert_eq!(tracker.poll(modified + 2 * SECOND).await, vec![path]);
    }

    #[tokio::test]
    async fn modification_resets_the_clock() {
        let dir = tempfile::tempdir().unwrap();
        let (path, modified) = old_file(dir.path(), "a.jpg");
        let tracker = StabilityTracker::new(5 * SECOND, Duration::ZERO);
        let t0 = modified + Duration::from_secs(600);
        tracker.observe(&path, modified, t0);

        // Still being written: the poll notices the new mtime.
        touch(&path, modified + SECOND);
        assert!(tracker.poll(t0 + 6 * SECOND).await.is_empty());
        assert!(tracker.is_pending(&path));
        assert!(tracker.poll(t0 + 10 * SECOND).await.is_empty());
        assert_eq!(tracker.poll(t0 + 11 * SECOND).await, vec![path]);
    }

    #[tokio::test]
    async fn reregistration_with_new_mtime_resets() {
        let dir = tempfile::tempdir().unwrap();
        let (path, modified) = old_file(dir.path(), "a.jpg");
        let tracker = StabilityTracker::new(5 * SECOND, Duration::ZERO);
        let t0 = modified + Duration::from_secs(600);

        tracker.observe(&path, modified, t0);
        let modified = touch(&path, modified + SECOND);
        assert_eq!(tracker.observe(&path, modified, t0 + 3 * SECOND), Registration::Reset);
        assert!(tracker.poll(t0 + 5 * SECOND).await.is_empty());
        assert_eq!(tracker.poll(t0 + 8 * SECOND).await, vec![path]);
    }

    #[tokio::test]
    async fn vanished_files_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let (path, modified) = old_file(dir.path(), "a.jpg");
        let tracker = StabilityTracker::new(Duration::ZERO, Duration::ZERO);
        tracker.observe(&path, modified, modified);

        std::fs::remove_file(&path).unwrap();
        assert!(tracker.poll(SystemTime::now()).await.is_empty());
        assert_eq!(tracker.pending_count(), 0);
    }

    #[tokio::test]
    async fn files_left_in_place_are_parked_until_modified() {
        let dir = tempfile::tempdir().unwrap();
        let (path, modified) = old_file(dir.path(), "a.jpg");
        let tracker = StabilityTracker::new(Duration::ZERO, Duration::ZERO);
        tracker.observe(&path, modified, modified);
        assert_eq!(tracker.poll(SystemTime::now()).await, vec![path.clone()]);

        tracker.finish(&path, Settled::LeftInPlace);
        assert!(tracker.is_parked(&path));
        assert_eq!(tracker.register(&path).await, Registration::Parked);
        assert_eq!(tracker.pending_count(), 0);

        touch(&path, modified + SECOND);
        assert_eq!(tracker.register(&path).await, Registration::New);
        assert!(!tracker.is_parked(&path));
    }

    #[tokio::test]
    async fn removed_files_are_forgotten() {
        let dir = tempfile::tempdir().unwrap();
        let (path, modified) = old_file(dir.path(), "a.jpg");
        let tracker = StabilityTracker::new(Duration::ZERO, Duration::ZERO);
        tracker.observe(&path, modified, modified);
        tracker.poll(SystemTime::now()).await;

        tracker.finish(&path, Settled::Removed);
        assert!(!tracker.is_processing(&path));
        assert!(!tracker.is_parked(&path));
        // The same name arriving again later is a brand new file.
        assert_eq!(tracker.register(&path).await, Registration::New);
    }

    #[tokio::test]
    async fn prune_forgets_vanished_parked_files() {
        let dir = tempfile::tempdir().unwrap();
        let (kept, kept_modified) = old_file(dir.path(), "kept.jpg");
        let (gone, gone_modified) = old_file(dir.path(), "gone.jpg");
        let tracker = StabilityTracker::new(Duration::ZERO, Duration::ZERO);
        tracker.observe(&kept, kept_modified, kept_modified);
        tracker.observe(&gone, gone_modified, gone_modified);
        assert_eq!(tracker.poll(SystemTime::now()).await.len(), 2);
        tracker.finish(&kept, Settled::LeftInPlace);
        tracker.finish(&gone, Settled::LeftInPlace);

        std::fs::remove_file(&gone).unwrap();
        tracker.prune().await;
        assert!(tracker.is_parked(&kept));
        assert!(!tracker.is_parked(&gone));
    }
}
