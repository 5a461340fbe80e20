// src/lib.rs
// =============================================================================
// media-harvest: bulk media downloader engine.
//
// Give it a list of URLs (direct media links or HTML pages that embed media)
// and a destination folder; it finds the media, downloads it with bounded
// parallelism, retries transient failures and reports progress.
//
// Module map (leaves first):
// - config: SessionConfig with every tunable
// - error: ErrorKind and the error enums
// - fetch: connection-limited HTTP client
// - resolver: input URL -> media references (one HTML hop)
// - limiter: admission gate for downloads
// - download: the per-file worker with retry/backoff
// - progress: ProgressReporter trait and session counters
// - orchestrator: the two-phase session driver (entry point)
// - input: reading link lists
//
// Typical use:
//
//     let orchestrator = Orchestrator::new(SessionConfig::default())?;
//     let downloaded = orchestrator.run(&urls, Path::new("downloads")).await?;
// =============================================================================

pub mod config;
pub mod download;
pub mod error;
pub mod fetch;
pub mod input;
pub mod limiter;
pub mod orchestrator;
pub mod progress;
pub mod resolver;

pub use config::SessionConfig;
pub use download::{DownloadOutcome, DownloadTask, DownloadWorker, RetryPolicy};
pub use error::{DownloadError, ErrorKind, ResolveError, SessionError};
pub use fetch::FetchClient;
pub use limiter::ConcurrencyLimiter;
pub use orchestrator::{FailedDownload, Orchestrator, SessionReport};
pub use progress::{ChannelReporter, NoopReporter, ProgressEvent, ProgressReporter};
pub use resolver::{MediaReference, UrlResolver};
