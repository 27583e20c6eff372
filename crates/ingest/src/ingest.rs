use crate::collision::{Decision, MAX_RENAME_ATTEMPTS, MoveReason, find_duplicate_in_directory, resolve};
use crate::error::{ErrorKind, Result};
use crate::filter::DenyList;
use crate::hash::{hash_file, short};
use crate::heartbeat::{NoopReporter, StatusReporter};
use crate::stability::Settled;
use exn::{OptionExt, ResultExt};
use librarian_ledger::{Ledger, NewAsset, Recorded, Status};
use librarian_metadata::{Extractor, path_components};
use librarian_storage::BackendHandle;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::UtcDateTime;
use tracing::instrument;

/// The result of (successfully) ingesting a single inbox file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Deny-listed: left in the inbox, neither hashed nor moved.
    Filtered,
    /// Moved into the archive at `path` (absolute).
    ///
    /// `recorded` is `None` when no ledger is configured or the ledger write
    /// failed; the file stays archived either way.
    Archived { path: PathBuf, reason: MoveReason, recorded: Option<Recorded> },
    /// The archive already holds identical content at `existing` (absolute);
    /// the inbox copy was deleted.
    Duplicate { existing: PathBuf },
}
impl Outcome {
    /// Whether the inbox file is gone after this outcome.
    pub fn settled(&self) -> Settled {
        match self {
            Self::Filtered => Settled::LeftInPlace,
            Self::Archived { .. } | Self::Duplicate { .. } => Settled::Removed,
        }
    }
}

/// Moves stable inbox files into the date-partitioned archive.
///
/// Every archived file lands at `{YYYY}/{YYYY-MM-DD}/{name}` below the
/// archive root, where the date is the capture date read from the file's
/// metadata. Content is identified by its BLAKE3 digest: content that is
/// already archived (anywhere the ledger knows of, or in that day folder) is
/// deleted from the inbox instead of being archived twice, and a different
/// file with an already-used name is archived under a `name_N` sibling. The
/// move always happens before the ledger write, and a failed ledger write
/// never undoes a move.
pub struct Ingestor {
    inbox: PathBuf,
    archive: BackendHandle,
    extractor: Extractor,
    deny_list: DenyList,
    ledger: Option<Ledger>,
    reporter: Arc<dyn StatusReporter>,
    rename_limit: u32,
}
impl Ingestor {
    pub fn new(inbox: impl Into<PathBuf>, archive: BackendHandle, extractor: Extractor, deny_list: DenyList) -> Self {
        Self {
            inbox: inbox.into(),
            archive,
            extractor,
            deny_list,
            ledger: None,
            reporter: Arc::new(NoopReporter),
            rename_limit: MAX_RENAME_ATTEMPTS,
        }
    }

    /// Record archived files in `ledger`. Without one, files are still
    /// archived but not recorded (degraded mode).
    pub fn with_ledger(mut self, ledger: Option<Ledger>) -> Self {
        self.ledger = ledger;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn StatusReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// How many `name_N` siblings to try before a name collision fails the
    /// file. Defaults to [`MAX_RENAME_ATTEMPTS`].
    pub fn with_rename_limit(mut self, rename_limit: u32) -> Self {
        self.rename_limit = rename_limit;
        self
    }

    pub fn inbox(&self) -> &Path {
        &self.inbox
    }

    pub fn deny_list(&self) -> &DenyList {
        &self.deny_list
    }

    /// Ingest a single file, absorbing any failure.
    ///
    /// Errors are logged and reported as [`Status::Error`]; the file stays in
    /// the inbox. Returns `None` on failure.
    #[instrument(skip(self), fields(path = %path.display()))]
    pub async fn process(&self, path: &Path) -> Option<Outcome> {
        let name = path.file_name().unwrap_or(path.as_os_str()).to_string_lossy();
        self.reporter.set_current_task(Some(format!("Processing {name}")));
        let result = self.ingest_file(path).await;
        self.reporter.set_current_task(None);
        match result {
            Ok(outcome) => {
                if outcome != Outcome::Filtered {
                    self.reporter.set_status(self.healthy_status(&outcome));
                }
                Some(outcome)
            },
            Err(err) => {
                tracing::error!(error = ?err, "Unable to ingest file; leaving it in the inbox");
                self.reporter.set_status(Status::Error);
                None
            },
        }
    }

    /// Files are safe, but possibly not accounted for.
    fn healthy_status(&self, outcome: &Outcome) -> Status {
        match (outcome, &self.ledger) {
            (_, None) | (Outcome::Archived { recorded: None, .. }, _) => Status::Warning,
            _ => Status::Ok,
        }
    }

    /// Ingest a single file: filter, date, hash, deduplicate, move, record.
    #[instrument(skip_all, fields(backend = self.archive.name()))]
    pub async fn ingest_file(&self, path: &Path) -> Result<Outcome> {
        // Paths outside the inbox (manual imports) are judged by name alone.
        let relative = path.strip_prefix(&self.inbox).ok().or_else(|| path.file_name().map(Path::new)).unwrap_or(path);
        if self.deny_list.is_denied(relative) {
            tracing::debug!(path = %path.display(), "Deny-listed; leaving in place");
            return Ok(Outcome::Filtered);
        }
        let file_name = path.file_name().ok_or_raise(|| ErrorKind::Inbox(path.to_path_buf()))?;

        let extractor = self.extractor.clone();
        let source = path.to_path_buf();
        let metadata =
            tokio::task::spawn_blocking(move || extractor.extract(&source)).await.or_raise(|| ErrorKind::Task)?;
        let captured_at = metadata.captured_at.ok_or_raise(|| ErrorKind::NoCaptureDate(path.to_path_buf()))?;

        let digest = hash_file(path).await?;
        if let Some(existing) = self.recorded_copy(&digest).await {
            return self.discard(path, existing, &digest).await;
        }

        let (year, day_folder) = path_components(captured_at);
        let day = Path::new(&year).join(day_folder);
        self.archive.create_dir(&day).await.or_raise(|| ErrorKind::Storage)?;
        let intended = day.join(file_name);
        let (destination, reason) = match resolve(&self.archive, &intended, &digest, self.rename_limit).await? {
            Decision::Skip { existing } => return self.discard(path, self.locate(&existing)?, &digest).await,
            Decision::Move { path, reason } => (path, reason),
        };
        if let Some(existing) = find_duplicate_in_directory(&self.archive, &day, &digest, Some(&destination)).await? {
            return self.discard(path, self.locate(&existing)?, &digest).await;
        }

        // Something else may have removed the file since it was hashed.
        let size = tokio::fs::metadata(path).await.or_raise(|| ErrorKind::Inbox(path.to_path_buf()))?.len();
        self.archive.import(path, &destination).await.or_raise(|| ErrorKind::Storage)?;
        let final_path = self.locate(&destination)?;
        tracing::info!(
            source = %path.display(),
            destination = %final_path.display(),
            hash = %short(&digest),
            date_source = ?metadata.source,
            %reason,
            "Archived"
        );

        let recorded = self
            .record(&NewAsset {
                file_hash: digest.to_string(),
                original_name: file_name.to_string_lossy().into_owned(),
                original_path: path.to_path_buf(),
                final_path: final_path.clone(),
                size_bytes: size,
                captured_at: Some(captured_at),
                location: metadata.location,
                ingested_at: UtcDateTime::now(),
            })
            .await;
        Ok(Outcome::Archived { path: final_path, reason, recorded })
    }

    fn locate(&self, relative: &Path) -> Result<PathBuf> {
        self.archive.locate(relative).or_raise(|| ErrorKind::Storage)
    }

    /// Where the ledger says this content was archived, provided the file is
    /// still there with the same content. Ledger failures only cost the
    /// cross-day check; the day-folder checks still run.
    async fn recorded_copy(&self, digest: &blake3::Hash) -> Option<PathBuf> {
        let ledger = self.ledger.as_ref()?;
        let asset = match ledger.get_by_hash(digest.to_string()).await {
            Ok(asset) => asset?,
            Err(err) => {
                tracing::warn!(hash = %short(digest), error = ?err, "Unable to look up content hash in the ledger");
                return None;
            },
        };
        match hash_file(&asset.final_path).await {
            Ok(existing) if existing == *digest => Some(asset.final_path),
            Ok(_) => {
                tracing::warn!(path = %asset.final_path.display(), "Archived file no longer matches its ledger entry");
                None
            },
            Err(err) => {
                tracing::debug!(path = %asset.final_path.display(), error = ?err, "Recorded copy is gone");
                None
            },
        }
    }

    /// The archive already has this content at `existing` (absolute): drop
    /// the inbox copy.
    async fn discard(&self, path: &Path, existing: PathBuf, digest: &blake3::Hash) -> Result<Outcome> {
        tokio::fs::remove_file(path).await.or_raise(|| ErrorKind::Inbox(path.to_path_buf()))?;
        tracing::info!(
            source = %path.display(),
            existing = %existing.display(),
            hash = %short(digest),
            "Duplicate of archived file; removed from inbox"
        );
        Ok(Outcome::Duplicate { existing })
    }

    async fn record(&self, asset: &NewAsset) -> Option<Recorded> {
        let Some(ledger) = &self.ledger else {
            tracing::debug!(path = %asset.final_path.display(), "No ledger available; not recording");
            return None;
        };
        match ledger.record(asset).await {
            Ok(Recorded::AlreadyPresent) => {
                tracing::info!(hash = %asset.file_hash, "Content hash already recorded in the ledger");
                Some(Recorded::AlreadyPresent)
            },
            Ok(recorded) => Some(recorded),
            Err(err) => {
                tracing::error!(path = %asset.final_path.display(), error = ?err, "Unable to record archived file");
                None
            },
        }
    }
}
