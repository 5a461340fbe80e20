// src/main.rs
// =============================================================================
// This is the entry point of our CLI application.
//
// What happens here:
// 1. Parse command-line arguments using clap
// 2. Collect links from the arguments and the optional --file
// 3. Run the download session on its own tokio task
// 4. Meanwhile, drain progress events and draw them as a progress bar
// 5. Print a summary (or JSON) and exit with a proper code
//
// Exit codes: 0 = everything downloaded, 1 = some files failed,
//             2 = error / nothing to do, 130 = cancelled with Ctrl-C
//
// The engine never touches the terminal. It only sends ProgressEvents
// through a channel; this file decides how to show them.
// =============================================================================

mod cli;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, warn};

use cli::Cli;
use media_harvest::input::{parse_links, read_links_file};
use media_harvest::{ChannelReporter, Orchestrator, ProgressEvent, SessionReport};

#[tokio::main]
async fn main() {
    let exit_code = match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            2
        }
    };

    std::process::exit(exit_code);
}

async fn run() -> Result<i32> {
    // Parse first so --help works without any logging set up
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    debug!(?cli, "arguments parsed");

    let links = collect_links(&cli)?;
    if links.is_empty() {
        eprintln!("⚠️  Please pass links or choose a text file with links (--file).");
        return Ok(2);
    }

    if !cli.json {
        println!("🔍 Looking for media in {} link(s)...", links.len());
    }

    let (reporter, mut events) = ChannelReporter::new();
    let orchestrator = Orchestrator::new(cli.session_config())?.with_reporter(Arc::new(reporter));

    // Ctrl-C cancels in-flight requests and pending retries
    let cancel = orchestrator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling downloads");
            cancel.cancel();
        }
    });

    let dest = cli.dest.clone();
    let session = tokio::spawn(async move { orchestrator.run_with_report(&links, &dest).await });

    // The channel closes once the session task drops the orchestrator
    let bar = progress_bar(cli.json);
    while let Some(event) = events.recv().await {
        match event {
            ProgressEvent::Progress(percent) => bar.set_position(percent.round() as u64),
            ProgressEvent::Status(message) => bar.set_message(message),
        }
    }
    bar.finish_and_clear();

    let report = session.await.context("download session panicked")??;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report);
    }

    Ok(exit_code(&report))
}

// Priority: RUST_LOG > -v flags > default (warn, so the bar stays readable).
// Logs go to stderr so --json output on stdout stays parseable.
fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn collect_links(cli: &Cli) -> Result<Vec<String>> {
    let mut links: Vec<String> = cli.links.iter().flat_map(|arg| parse_links(arg)).collect();

    if let Some(path) = &cli.file {
        let from_file = read_links_file(path)
            .with_context(|| format!("error reading file {}", path.display()))?;
        links.extend(from_file);
    }

    Ok(links)
}

fn progress_bar(hidden: bool) -> ProgressBar {
    if hidden {
        return ProgressBar::hidden();
    }

    let style = ProgressStyle::with_template("{bar:40.cyan/blue} {pos:>3}% {wide_msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    let bar = ProgressBar::new(100);
    bar.set_style(style);
    bar
}

fn print_summary(report: &SessionReport) {
    if report.total_files == 0 {
        println!("⚠️  No media files found");
        return;
    }

    for failure in &report.failures {
        println!("❌ {} ({})", failure.url, failure.message);
    }
    if !report.failures.is_empty() {
        println!();
    }

    println!("📊 Summary:");
    println!(
        "   ✅ Downloaded: {} ({} already present)",
        report.succeeded, report.skipped
    );
    println!("   ❌ Failed: {}", report.failures.len());
    println!("   📋 Total: {}", report.total_files);

    if report.cancelled {
        println!("\n⏹️  Cancelled before all files were processed");
    }
}

fn exit_code(report: &SessionReport) -> i32 {
    if report.cancelled {
        130
    } else if report.failures.is_empty() {
        0
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use media_harvest::{ErrorKind, FailedDownload};

    #[test]
    fn test_exit_codes() {
        let mut report = SessionReport::default();
        assert_eq!(exit_code(&report), 0);

        report.failures.push(FailedDownload {
            url: "http://x.test/a.jpg".to_string(),
            filename: "a.jpg".to_string(),
            kind: ErrorKind::Unretryable,
            message: "HTTP 404 downloading http://x.test/a.jpg".to_string(),
        });
        assert_eq!(exit_code(&report), 1);

        report.cancelled = true;
        assert_eq!(exit_code(&report), 130);
    }

    #[test]
    fn test_collect_links_splits_arguments() {
        let cli = Cli::parse_from([
            "media-harvest",
            "--dest",
            "out",
            "http://x.test/a.jpg,http://x.test/b.jpg",
            "http://x.test/page.html",
        ]);
        let links = collect_links(&cli).unwrap();
        assert_eq!(links.len(), 3);
    }
}
