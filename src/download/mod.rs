// src/download/mod.rs
// =============================================================================
// The download worker: one media reference -> one file on disk.
//
// Life of a task:
//   1. If the destination file already exists, we're done (skip, no network).
//   2. Attempt n: take a limiter slot, GET the URL, stream the body to disk.
//   3. On a transient error, give the slot back, sleep 2^n seconds, retry.
//   4. Non-200 responses, filesystem errors and cancellation are final.
//
// An existing file is trusted as complete without looking at its size or
// contents. That is what makes re-running a session cheap.
//
// Submodules:
// - retry: RetryPolicy and the backoff loop
// =============================================================================

mod retry;

pub use retry::{retry_with_backoff, RetryPolicy};

use std::path::{Path, PathBuf};

use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONNECTION, CONTENT_LENGTH, USER_AGENT};
use reqwest::StatusCode;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

use crate::config::SessionConfig;
use crate::error::DownloadError;
use crate::fetch::{FetchClient, FetchError, FetchResponse};
use crate::limiter::ConcurrencyLimiter;
use crate::resolver::MediaReference;

/// A media reference bound to the path it will be written to.
#[derive(Debug, Clone)]
pub struct DownloadTask {
    pub reference: MediaReference,
    pub destination: PathBuf,
}

impl DownloadTask {
    pub fn new(reference: MediaReference, dest_dir: &Path) -> Self {
        let destination = dest_dir.join(&reference.filename);
        Self {
            reference,
            destination,
        }
    }
}

/// How a successful task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// The destination already existed; nothing was fetched.
    Skipped,
    /// The file was fetched; `attempts` counts the first try.
    Downloaded { bytes: u64, attempts: u32 },
}

#[derive(Debug, Clone)]
pub struct DownloadWorker {
    client: FetchClient,
    limiter: ConcurrencyLimiter,
    policy: RetryPolicy,
    chunk_size: usize,
    user_agent: String,
}

impl DownloadWorker {
    pub fn new(client: FetchClient, limiter: ConcurrencyLimiter, config: &SessionConfig) -> Self {
        Self {
            client,
            limiter,
            policy: RetryPolicy::new(config.max_retries, config.backoff_base),
            chunk_size: config.chunk_size.max(1),
            user_agent: config.user_agent.clone(),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    // Runs one task to completion (success, skip or final failure).
    pub async fn download(
        &self,
        task: &DownloadTask,
        cancel: &CancellationToken,
    ) -> Result<DownloadOutcome, DownloadError> {
        let url = task.reference.url.as_str();

        if cancel.is_cancelled() {
            return Err(DownloadError::Cancelled {
                url: url.to_string(),
            });
        }

        let exists = tokio::fs::try_exists(&task.destination)
            .await
            .map_err(|e| DownloadError::io(&task.destination, e))?;
        if exists {
            debug!(path = %task.destination.display(), "file already exists, skipping");
            return Ok(DownloadOutcome::Skipped);
        }

        let (bytes, attempts) = retry_with_backoff(&self.policy, cancel, url, |attempt| {
            self.attempt(task, attempt, cancel)
        })
        .await?;

        info!(url, path = %task.destination.display(), bytes, attempts, "downloaded");
        Ok(DownloadOutcome::Downloaded { bytes, attempts })
    }

    // One attempt. The limiter slot is held only inside this function, so the
    // backoff sleep in the retry loop runs without it.
    async fn attempt(
        &self,
        task: &DownloadTask,
        attempt: u32,
        cancel: &CancellationToken,
    ) -> Result<u64, DownloadError> {
        let url = task.reference.url.as_str();
        let cancelled = || DownloadError::Cancelled {
            url: url.to_string(),
        };

        let _slot = tokio::select! {
            permit = self.limiter.acquire() => permit.map_err(|_| DownloadError::PoolClosed {
                url: url.to_string(),
            })?,
            _ = cancel.cancelled() => return Err(cancelled()),
        };

        debug!(url, attempt, "starting attempt");
        tokio::select! {
            result = self.fetch_to_file(task) => result,
            _ = cancel.cancelled() => Err(cancelled()),
        }
    }

    async fn fetch_to_file(&self, task: &DownloadTask) -> Result<u64, DownloadError> {
        let raw_url = task.reference.url.as_str();

        // Parsing percent-encodes whatever in the path still needs it
        // (spaces, non-ASCII) and leaves existing %xx escapes alone.
        let url = Url::parse(raw_url).map_err(|_| DownloadError::InvalidUrl {
            url: raw_url.to_string(),
        })?;

        let FetchResponse {
            response,
            permits: _permits,
        } = self
            .client
            .get(&url, self.request_headers())
            .await
            .map_err(|e| match e {
                FetchError::Request(source) => DownloadError::network(raw_url, source),
                FetchError::PoolClosed => DownloadError::PoolClosed {
                    url: raw_url.to_string(),
                },
            })?;

        if response.status() != StatusCode::OK {
            return Err(DownloadError::HttpStatus {
                url: raw_url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let expected = declared_length(response.headers());

        if let Some(parent) = task.destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DownloadError::io(parent, e))?;
        }

        let file = File::create(&task.destination)
            .await
            .map_err(|e| DownloadError::io(&task.destination, e))?;
        let mut partial = PartialFile::new(&task.destination);

        let mut writer = BufWriter::with_capacity(self.chunk_size, file);
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| DownloadError::network(raw_url, e))?;
            // keep-alive chunks
            if chunk.is_empty() {
                continue;
            }
            writer
                .write_all(&chunk)
                .await
                .map_err(|e| DownloadError::io(&task.destination, e))?;
            written += chunk.len() as u64;
        }

        writer
            .flush()
            .await
            .map_err(|e| DownloadError::io(&task.destination, e))?;

        verify_complete(raw_url, written, expected)?;

        partial.keep();
        Ok(written)
    }

    fn request_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(agent) = HeaderValue::from_str(&self.user_agent) {
            headers.insert(USER_AGENT, agent);
        }
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        headers
    }
}

// The content-length the server announced, 0 if missing or unparseable.
fn declared_length(headers: &HeaderMap) -> u64 {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(0)
}

// A body shorter than the declared length is a truncated transfer.
// An undeclared (0) length can't be checked and is accepted.
fn verify_complete(url: &str, written: u64, expected: u64) -> Result<(), DownloadError> {
    if expected > 0 && written < expected {
        return Err(DownloadError::Incomplete {
            url: url.to_string(),
            written,
            expected,
        });
    }
    Ok(())
}

// Deletes a half-written file unless keep() is called.
//
// Cleanup runs from Drop so it also happens when the attempt future is
// dropped by cancellation. Without it the next session would see the
// truncated file and skip it as already downloaded.
struct PartialFile {
    path: PathBuf,
    keep: bool,
}

impl PartialFile {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            keep: false,
        }
    }

    fn keep(&mut self) {
        self.keep = true;
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if !self.keep {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}
