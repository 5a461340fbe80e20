// src/progress.rs
// =============================================================================
// Progress reporting from the engine to whoever is displaying it.
//
// The engine only knows the ProgressReporter trait: a percentage and a status
// line. It never touches a terminal, window or any other UI state.
//
// Download tasks run inside the engine's own async context, which is usually
// not where the UI wants to be updated. ChannelReporter solves that by turning
// every call into a ProgressEvent message; the UI drains the receiving end on
// its own task/thread whenever it likes.
//
// SessionProgress holds the running totals for one session. Many tasks bump
// them at the same time, so they are atomics rather than plain integers.
// =============================================================================

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/// Receives live updates during a session.
pub trait ProgressReporter: Send + Sync {
    /// Percentage of files finished successfully, 0.0 to 100.0.
    fn on_progress(&self, percent: f64);
    fn on_status(&self, message: &str);
}

/// Discards every update.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn on_progress(&self, _percent: f64) {}
    fn on_status(&self, _message: &str) {}
}

/// One update, as delivered through a channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Progress(f64),
    Status(String),
}

/// Forwards updates as [`ProgressEvent`]s over an unbounded channel.
///
/// If the receiver is gone the events are dropped; a closed UI must not
/// stop the downloads.
#[derive(Debug, Clone)]
pub struct ChannelReporter {
    sender: UnboundedSender<ProgressEvent>,
}

impl ChannelReporter {
    pub fn new() -> (Self, UnboundedReceiver<ProgressEvent>) {
        let (sender, receiver) = unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl ProgressReporter for ChannelReporter {
    fn on_progress(&self, percent: f64) {
        let _ = self.sender.send(ProgressEvent::Progress(percent));
    }

    fn on_status(&self, message: &str) {
        let _ = self.sender.send(ProgressEvent::Status(message.to_string()));
    }
}

// Running totals for one session.
//
// `total` is written once, after all input URLs have been resolved.
// `completed` counts successes (downloads and skips) and never exceeds it.
pub struct SessionProgress {
    total: OnceLock<usize>,
    completed: AtomicUsize,
    finished: AtomicUsize,
    reporter: Arc<dyn ProgressReporter>,
}

impl SessionProgress {
    pub fn new(reporter: Arc<dyn ProgressReporter>) -> Self {
        Self {
            total: OnceLock::new(),
            completed: AtomicUsize::new(0),
            finished: AtomicUsize::new(0),
            reporter,
        }
    }

    // Fixes the number of files for this session. Later calls are ignored.
    pub fn set_total(&self, total: usize) {
        let _ = self.total.set(total);
    }

    pub fn total(&self) -> usize {
        self.total.get().copied().unwrap_or(0)
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Tasks that ended, successfully or not.
    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }

    pub fn status(&self, message: &str) {
        self.reporter.on_status(message);
    }

    // A task succeeded. Bumps the count and pushes the new percentage plus a
    // status line built from the new count.
    pub fn record_success(&self, skipped: bool) {
        let total = self.total();
        let completed = self
            .completed
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < total).then_some(n + 1)
            })
            .map(|previous| previous + 1)
            .unwrap_or(total);
        self.finished.fetch_add(1, Ordering::SeqCst);

        self.reporter.on_progress(percent(completed, total));
        let message = if skipped {
            format!(
                "Skipped existing file. Progress: {}/{} files",
                completed, total
            )
        } else {
            format!("Downloaded {}/{} files", completed, total)
        };
        self.reporter.on_status(&message);
    }

    // A task failed. The completed count (and so the percentage) is
    // unchanged; only the attempted counter moves.
    pub fn record_failure(&self) {
        self.finished.fetch_add(1, Ordering::SeqCst);
    }
}

fn percent(completed: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    completed as f64 / total as f64 * 100.0
}
