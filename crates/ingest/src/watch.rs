use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use notify::event::{ModifyKind, RenameMode};
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

/// Recursive filesystem watcher over the inbox.
///
/// notify delivers events on its own thread; every path worth registering is
/// forwarded into a bounded tokio channel. Dropping the watcher stops it.
pub struct InboxWatcher {
    root: PathBuf,
    _watcher: RecommendedWatcher,
}
impl InboxWatcher {
    pub fn start(root: &Path, paths: mpsc::Sender<PathBuf>) -> Result<Self> {
        let watched = root.to_path_buf();
        let mut watcher = RecommendedWatcher::new(
            move |event: notify::Result<Event>| match event {
                Ok(event) => {
                    for path in registrable_paths(&event) {
                        if paths.blocking_send(path).is_err() {
                            // Receiver gone: the service is shutting down.
                            return;
                        }
                    }
                },
                Err(err) => tracing::warn!(inbox = %watched.display(), error = %err, "Inbox watcher error"),
            },
            NotifyConfig::default(),
        )
        .or_raise(|| ErrorKind::Watch)?;
        watcher.watch(root, RecursiveMode::Recursive).or_raise(|| ErrorKind::Watch)?;
        tracing::info!(inbox = %root.display(), "Watching inbox");
        Ok(Self { root: root.to_path_buf(), _watcher: watcher })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Paths from `event` that may have become (or still be becoming) a file
/// ready for ingestion: creations, content or metadata changes, and the
/// destination of renames.
pub fn registrable_paths(event: &Event) -> Vec<PathBuf> {
    match event.kind {
        EventKind::Create(_)
        | EventKind::Modify(
            ModifyKind::Any
            | ModifyKind::Data(_)
            | ModifyKind::Metadata(_)
            | ModifyKind::Other
            | ModifyKind::Name(RenameMode::To | RenameMode::Any),
        ) => event.paths.clone(),
        // Paths are [from, to].
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => event.paths.get(1).cloned().into_iter().collect(),
        _ => Vec::new(),
    }
}
