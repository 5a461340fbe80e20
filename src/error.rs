// src/error.rs
// =============================================================================
// Error types for the whole engine.
//
// Every failure maps onto one closed ErrorKind. Callers match on the kind
// (retry it? give up? report it?) instead of catching everything the same way.
//
// - DownloadError: one file failed to download
// - ResolveError: one input URL could not be turned into media references
// - SessionError: the whole session could not start
//
// Only SessionError ever reaches the caller of Orchestrator::run. The other
// two are contained at the task boundary and end up in the log and in the
// session report.
// =============================================================================

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Classification used to decide what happens after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Connection error, reset, timeout or truncated body. Retried with backoff.
    Transient,
    /// Non-200 response or a request that can never succeed. Not retried.
    Unretryable,
    /// Fetching or parsing an HTML page failed. Degrades to "no media found".
    Discovery,
    /// Creating a directory or writing the file failed. Not retried.
    Filesystem,
    /// The session was cancelled while the task was running.
    Cancelled,
}

/// Errors that can occur while downloading one file.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network-level error (connect, reset, timeout, body read).
    #[error("network error downloading {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Server declared a content-length and sent fewer bytes.
    #[error("incomplete download of {url}: {written}/{expected} bytes")]
    Incomplete {
        url: String,
        written: u64,
        expected: u64,
    },

    /// Any response other than 200 OK.
    #[error("HTTP {status} downloading {url}")]
    HttpStatus { url: String, status: u16 },

    /// Creating the parent directory or writing the file failed.
    #[error("IO error writing to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid URL: {url}")]
    InvalidUrl { url: String },

    /// A connection gate was closed underneath us.
    #[error("connection pool closed while downloading {url}")]
    PoolClosed { url: String },

    #[error("download of {url} cancelled")]
    Cancelled { url: String },
}

impl DownloadError {
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            // A request that could not even be built will fail the same way
            // every time.
            Self::Network { source, .. } if source.is_builder() => ErrorKind::Unretryable,
            Self::Network { .. } | Self::Incomplete { .. } => ErrorKind::Transient,
            Self::HttpStatus { .. } | Self::InvalidUrl { .. } | Self::PoolClosed { .. } => {
                ErrorKind::Unretryable
            }
            Self::Io { .. } => ErrorKind::Filesystem,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

/// Errors that can occur while resolving one input URL.
///
/// All of these are `ErrorKind::Discovery`: the resolver logs them and
/// returns an empty list.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("invalid URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to fetch {url}: status {status}")]
    Status { url: String, status: u16 },

    #[error("not an HTML page: {url} ({content_type})")]
    NotHtml { url: String, content_type: String },

    #[error("connection pool closed while fetching {url}")]
    PoolClosed { url: String },

    #[error("resolution of {url} cancelled")]
    Cancelled { url: String },
}

impl ResolveError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            _ => ErrorKind::Discovery,
        }
    }
}

/// Errors that abort a session before any work starts.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid destination directory {path}: {reason}")]
    Destination { path: PathBuf, reason: String },

    #[error("failed to create HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}
