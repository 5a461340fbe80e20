// src/orchestrator.rs
// =============================================================================
// The download orchestrator: the engine's entry point.
//
// A session runs in two strictly separate phases:
//
//   Phase 1 (discover): every input URL is resolved concurrently. We wait for
//   all of them, flatten the results and now know the total number of files.
//
//   Phase 2 (download): every media reference becomes a DownloadTask and all
//   tasks run concurrently. The limiter inside the worker decides how many
//   actually have a request open at once.
//
// Nothing is downloaded while discovery is still going on; the total has to
// be known before the first percentage can be reported.
//
// Individual failures never escape. A bad page contributes zero files, a bad
// file costs one count. Only a destination directory we can't use (or an HTTP
// client we can't build) fails the whole session.
// =============================================================================

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::SessionConfig;
use crate::download::{DownloadOutcome, DownloadTask, DownloadWorker};
use crate::error::{ErrorKind, SessionError};
use crate::fetch::FetchClient;
use crate::limiter::ConcurrencyLimiter;
use crate::progress::{NoopReporter, ProgressReporter, SessionProgress};
use crate::resolver::{MediaReference, UrlResolver};

/// One file that could not be downloaded.
#[derive(Debug, Clone, Serialize)]
pub struct FailedDownload {
    pub url: String,
    pub filename: String,
    pub kind: ErrorKind,
    pub message: String,
}

/// What happened during one session.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionReport {
    /// Media references found in phase 1
    pub total_files: usize,
    /// Files downloaded or already present
    pub succeeded: usize,
    /// The part of `succeeded` that was already on disk
    pub skipped: usize,
    pub failures: Vec<FailedDownload>,
    pub cancelled: bool,
}

impl SessionReport {
    pub fn all_succeeded(&self) -> bool {
        self.failures.is_empty() && !self.cancelled
    }
}

pub struct Orchestrator {
    config: SessionConfig,
    client: FetchClient,
    limiter: ConcurrencyLimiter,
    reporter: Arc<dyn ProgressReporter>,
    cancel: CancellationToken,
}

impl Orchestrator {
    // Builds the shared client and limiter for a session.
    pub fn new(config: SessionConfig) -> Result<Self, SessionError> {
        let config = config.normalized();
        let client = FetchClient::new(&config)?;
        let limiter = ConcurrencyLimiter::new(config.max_concurrent_downloads);

        Ok(Self {
            config,
            client,
            limiter,
            reporter: Arc::new(NoopReporter),
            cancel: CancellationToken::new(),
        })
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that aborts the session when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn limiter(&self) -> &ConcurrencyLimiter {
        &self.limiter
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Runs a session and returns how many files were downloaded (or were
    /// already present).
    pub async fn run<S: AsRef<str>>(
        &self,
        urls: &[S],
        dest_dir: &Path,
    ) -> Result<usize, SessionError> {
        Ok(self.run_with_report(urls, dest_dir).await?.succeeded)
    }

    /// Like [`Orchestrator::run`], but returns the full report including
    /// per-file failures.
    #[instrument(skip(self, urls, dest_dir), fields(dest = %dest_dir.display(), inputs = urls.len()))]
    pub async fn run_with_report<S: AsRef<str>>(
        &self,
        urls: &[S],
        dest_dir: &Path,
    ) -> Result<SessionReport, SessionError> {
        prepare_destination(dest_dir).await?;

        let references = unique_destinations(self.discover(urls).await);
        let progress = SessionProgress::new(Arc::clone(&self.reporter));
        progress.set_total(references.len());

        if references.is_empty() {
            info!("no media found");
            progress.status("No media files found");
            return Ok(SessionReport {
                cancelled: self.cancel.is_cancelled(),
                ..SessionReport::default()
            });
        }

        info!(files = references.len(), "found files to download");
        progress.status(&format!("Found {} files to download", references.len()));

        let report = self.download_all(references, dest_dir, &progress).await;

        progress.status(&format!(
            "Download completed. Files downloaded: {}",
            report.succeeded
        ));
        info!(
            succeeded = report.succeeded,
            failed = report.failures.len(),
            skipped = report.skipped,
            "session finished"
        );
        Ok(report)
    }

    // Phase 1: resolve every non-blank input URL concurrently and flatten.
    async fn discover<S: AsRef<str>>(&self, urls: &[S]) -> Vec<MediaReference> {
        // Owned, so the futures below don't borrow from `urls`; the session
        // future has to stay Send for tokio::spawn.
        let inputs: Vec<String> = urls
            .iter()
            .map(|url| url.as_ref().trim())
            .filter(|url| !url.is_empty())
            .map(str::to_string)
            .collect();
        let fan_out = inputs.len().max(1);

        let resolver = UrlResolver::new(self.client.clone(), self.config.user_agent.clone());
        let resolver = &resolver;
        let cancel = &self.cancel;

        let per_url: Vec<Vec<MediaReference>> = stream::iter(
            inputs
                .into_iter()
                .map(move |url| async move { resolver.resolve(&url, cancel).await }),
        )
        .buffer_unordered(fan_out)
        .collect()
        .await;

        per_url.into_iter().flatten().collect()
    }

    // Phase 2: download every reference concurrently and tally the results.
    async fn download_all(
        &self,
        references: Vec<MediaReference>,
        dest_dir: &Path,
        progress: &SessionProgress,
    ) -> SessionReport {
        let worker = DownloadWorker::new(self.client.clone(), self.limiter.clone(), &self.config);
        let worker = &worker;
        let cancel = &self.cancel;
        let fan_out = references.len().max(1);

        let results: Vec<_> = stream::iter(references.into_iter().map(move |reference| {
            let task = DownloadTask::new(reference, dest_dir);
            async move {
                let result = worker.download(&task, cancel).await;
                match &result {
                    Ok(outcome) => {
                        progress.record_success(matches!(outcome, DownloadOutcome::Skipped))
                    }
                    Err(e) => {
                        warn!(url = %task.reference.url, kind = ?e.kind(), error = %e, "download failed");
                        progress.record_failure();
                    }
                }
                (task, result)
            }
        }))
        .buffer_unordered(fan_out)
        .collect()
        .await;

        let mut report = SessionReport {
            total_files: progress.total(),
            cancelled: cancel.is_cancelled(),
            ..SessionReport::default()
        };

        for (task, result) in results {
            match result {
                Ok(outcome) => {
                    report.succeeded += 1;
                    if outcome == DownloadOutcome::Skipped {
                        report.skipped += 1;
                    }
                }
                Err(e) => report.failures.push(FailedDownload {
                    url: task.reference.url,
                    filename: task.reference.filename,
                    kind: e.kind(),
                    message: e.to_string(),
                }),
            }
        }

        report
    }
}

// Keeps the first reference for every file name.
//
// Two references with the same name would write the same path at the same
// time, and a failing one would delete the file the other just finished.
// Pages commonly link one image twice (<a href="x.jpg"><img src="x.jpg">).
fn unique_destinations(references: Vec<MediaReference>) -> Vec<MediaReference> {
    let mut seen = HashSet::new();
    references
        .into_iter()
        .filter(|reference| {
            let first = seen.insert(reference.filename.clone());
            if !first {
                debug!(url = %reference.url, "duplicate file name, skipping");
            }
            first
        })
        .collect()
}

// Makes sure the destination is a usable directory, creating it if needed.
async fn prepare_destination(dest_dir: &Path) -> Result<(), SessionError> {
    let invalid = |reason: String| SessionError::Destination {
        path: PathBuf::from(dest_dir),
        reason,
    };

    if dest_dir.as_os_str().is_empty() {
        return Err(invalid("path is empty".to_string()));
    }

    match tokio::fs::metadata(dest_dir).await {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(invalid("not a directory".to_string())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => tokio::fs::create_dir_all(dest_dir)
            .await
            .map_err(|e| invalid(e.to_string())),
        Err(e) => Err(invalid(e.to_string())),
    }
}

// -----------------------------------------------------------------------------
// BEGINNER NOTES:
//
// 1. Why buffer_unordered(n) with n = number of items?
//    - Every future is started right away; results come back in whatever
//      order they finish. The real throttling happens in the limiter and the
//      fetch client, not here.
//
// 2. Why `let worker = &worker;` before the `move` closure?
//    - The closure then moves a *reference* into each async block, so all
//      tasks share one worker instead of each needing its own copy.
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_destination_is_created() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("new").join("folder");
        prepare_destination(&dest).await.unwrap();
        assert!(dest.is_dir());
    }

    #[tokio::test]
    async fn test_destination_file_rejected() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("file.txt");
        std::fs::write(&file, b"x").unwrap();

        let err = prepare_destination(&file).await.unwrap_err();
        assert!(matches!(err, SessionError::Destination { .. }));
    }

    #[tokio::test]
    async fn test_blank_inputs_are_ignored() {
        let dir = TempDir::new().unwrap();
        let orchestrator = Orchestrator::new(SessionConfig::default()).unwrap();

        let report = orchestrator
            .run_with_report(&["", "   ", "\t"], dir.path())
            .await
            .unwrap();

        assert_eq!(report.total_files, 0);
        assert_eq!(report.succeeded, 0);
        assert_eq!(orchestrator.limiter().total_acquired(), 0);
    }

    #[test]
    fn test_duplicate_file_names_keep_first() {
        let reference =
            |url: &str| MediaReference::from_url(&url::Url::parse(url).unwrap()).unwrap();
        let unique = unique_destinations(vec![
            reference("http://x.test/a.jpg"),
            reference("http://x.test/b.png"),
            reference("http://x.test/a.jpg"),
            reference("http://cdn.test/other/a.jpg"),
        ]);

        let urls: Vec<&str> = unique.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec!["http://x.test/a.jpg", "http://x.test/b.png"]);
    }

    #[tokio::test]
    async fn test_session_runs_on_spawned_task() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().to_path_buf();
        let orchestrator = Orchestrator::new(SessionConfig::default()).unwrap();
        let urls = vec!["   ".to_string()];

        let session =
            tokio::spawn(async move { orchestrator.run_with_report(&urls, &dest).await });
        let report = session.await.unwrap().unwrap();

        assert_eq!(report.total_files, 0);
    }

    #[test]
    fn test_report_all_succeeded() {
        let mut report = SessionReport::default();
        assert!(report.all_succeeded());
        report.cancelled = true;
        assert!(!report.all_succeeded());
    }
}
