// src/cli.rs
// =============================================================================
// This file defines our command-line interface using the `clap` crate.
//
// We use the "derive" API which lets us define the CLI structure using
// Rust structs and attributes (the #[...] things).
//
// Every tuning flag maps 1:1 onto a SessionConfig field; the defaults come
// from the constants in config.rs so the CLI and the library agree.
// =============================================================================

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use media_harvest::config::{
    SessionConfig, DEFAULT_MAX_CONCURRENT_DOWNLOADS, DEFAULT_MAX_CONNECTIONS,
    DEFAULT_MAX_CONNECTIONS_PER_HOST, DEFAULT_MAX_RETRIES,
};

#[derive(Parser, Debug)]
#[command(
    name = "media-harvest",
    version = "0.1.0",
    about = "Download images and videos from direct links and the HTML pages that embed them",
    long_about = "media-harvest takes a list of links. Links ending in a media extension are \
                  downloaded directly; any other link is fetched once as an HTML page and the \
                  images and videos it references are downloaded instead."
)]
pub struct Cli {
    /// Links to download (each argument may hold several, comma-separated)
    ///
    /// Example: media-harvest --dest out http://x.test/a.jpg,http://x.test/gallery.html
    pub links: Vec<String>,

    /// Text file with more links, comma and/or newline separated
    #[arg(long, short = 'f')]
    pub file: Option<PathBuf>,

    /// Folder to save files into (created if missing)
    #[arg(long, short = 'd')]
    pub dest: PathBuf,

    /// Maximum number of files downloading at the same time
    #[arg(long, default_value_t = DEFAULT_MAX_CONCURRENT_DOWNLOADS)]
    pub concurrency: usize,

    /// Maximum number of open connections across all hosts
    #[arg(long, default_value_t = DEFAULT_MAX_CONNECTIONS)]
    pub max_connections: usize,

    /// Maximum number of open connections to a single host
    #[arg(long, default_value_t = DEFAULT_MAX_CONNECTIONS_PER_HOST)]
    pub per_host: usize,

    /// Attempts per file before giving up (the first try counts)
    #[arg(long, default_value_t = DEFAULT_MAX_RETRIES)]
    pub max_retries: u32,

    /// Seconds to wait for a connection to be established
    #[arg(long, default_value_t = 60)]
    pub connect_timeout: u64,

    /// Seconds to wait for the next bytes of a response
    #[arg(long, default_value_t = 60)]
    pub read_timeout: u64,

    /// Print the session report as JSON instead of a summary
    #[arg(long)]
    pub json: bool,

    /// More log output (-v debug, -vv trace)
    #[arg(long, short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            max_concurrent_downloads: self.concurrency,
            max_connections: self.max_connections,
            max_connections_per_host: self.per_host,
            max_retries: self.max_retries,
            connect_timeout: Duration::from_secs(self.connect_timeout),
            read_timeout: Duration::from_secs(self.read_timeout),
            ..SessionConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["media-harvest", "--dest", "out", "http://x.test/a.jpg"]);
        let config = cli.session_config();

        assert_eq!(cli.links, vec!["http://x.test/a.jpg"]);
        assert_eq!(config.max_concurrent_downloads, 50);
        assert_eq!(config.max_connections_per_host, 10);
        assert_eq!(config.read_timeout, Duration::from_secs(60));
        assert!(!cli.json);
    }

    #[test]
    fn test_overrides() {
        let cli = Cli::parse_from([
            "media-harvest",
            "-d",
            "out",
            "--concurrency",
            "4",
            "--per-host",
            "2",
            "--max-retries",
            "5",
            "--connect-timeout",
            "10",
            "-vv",
        ]);
        let config = cli.session_config();

        assert!(cli.links.is_empty());
        assert_eq!(config.max_concurrent_downloads, 4);
        assert_eq!(config.max_connections_per_host, 2);
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_dest_is_required() {
        assert!(Cli::try_parse_from(["media-harvest", "http://x.test/a.jpg"]).is_err());
    }
}
