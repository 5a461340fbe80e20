// src/config.rs
// =============================================================================
// Session configuration.
//
// Every knob the engine uses lives here instead of being a hidden constant:
// - how many downloads may have an open request at once (the limiter)
// - how many TCP connections the HTTP client may open, overall and per host
// - connect/read timeouts
// - retry count and backoff base
//
// The CLI maps its flags onto this struct; library users can start from
// SessionConfig::default() and override what they need.
// =============================================================================

use std::time::Duration;

/// Maximum number of downloads with an open network request.
pub const DEFAULT_MAX_CONCURRENT_DOWNLOADS: usize = 50;

/// Maximum number of simultaneous connections across all hosts.
pub const DEFAULT_MAX_CONNECTIONS: usize = 50;

/// Maximum number of simultaneous connections to a single host.
pub const DEFAULT_MAX_CONNECTIONS_PER_HOST: usize = 10;

/// Attempts per file, including the first one.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(60);

/// First backoff delay; attempt n waits `base * 2^n`.
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Size of the write buffer used while streaming a body to disk (32 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 32 * 1024;

/// Idle pooled connections are dropped after this long.
pub const DEFAULT_POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// Browser-like User-Agent; some media hosts refuse obvious bots.
pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

// Tunables for one download session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Capacity of the concurrency limiter
    pub max_concurrent_downloads: usize,
    /// Connection ceiling of the fetch client, all hosts together
    pub max_connections: usize,
    /// Connection ceiling of the fetch client, per host
    pub max_connections_per_host: usize,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub pool_idle_timeout: Duration,
    /// Attempts per file (>= 1)
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub chunk_size: usize,
    pub user_agent: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_concurrent_downloads: DEFAULT_MAX_CONCURRENT_DOWNLOADS,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            max_connections_per_host: DEFAULT_MAX_CONNECTIONS_PER_HOST,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            pool_idle_timeout: DEFAULT_POOL_IDLE_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base: DEFAULT_BACKOFF_BASE,
            chunk_size: DEFAULT_CHUNK_SIZE,
            user_agent: BROWSER_USER_AGENT.to_string(),
        }
    }
}

impl SessionConfig {
    // Clamps values that would make the engine stall or spin.
    //
    // A zero-capacity semaphore would never hand out a permit, and a zero
    // retry count would mean "never try", so both are raised to 1.
    pub fn normalized(mut self) -> Self {
        self.max_concurrent_downloads = self.max_concurrent_downloads.max(1);
        self.max_connections = self.max_connections.max(1);
        self.max_connections_per_host = self.max_connections_per_host.max(1);
        self.max_retries = self.max_retries.max(1);
        self.chunk_size = self.chunk_size.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_behavior() {
        let config = SessionConfig::default();
        assert_eq!(config.max_concurrent_downloads, 50);
        assert_eq!(config.max_connections, 50);
        assert_eq!(config.max_connections_per_host, 10);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.connect_timeout, Duration::from_secs(60));
        assert_eq!(config.read_timeout, Duration::from_secs(60));
        assert_eq!(config.chunk_size, 32768);
    }

    #[test]
    fn test_normalized_raises_zeroes() {
        let config = SessionConfig {
            max_concurrent_downloads: 0,
            max_connections: 0,
            max_connections_per_host: 0,
            max_retries: 0,
            chunk_size: 0,
            ..SessionConfig::default()
        }
        .normalized();

        assert_eq!(config.max_concurrent_downloads, 1);
        assert_eq!(config.max_connections, 1);
        assert_eq!(config.max_connections_per_host, 1);
        assert_eq!(config.max_retries, 1);
        assert_eq!(config.chunk_size, 1);
    }
}
