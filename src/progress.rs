//! Cooperative progress reporting for long-running commands (dedupe scan,
//! compaction, bulk undo). Checked between groups / batches / per-file reads
//! alongside the cancellation token in [`crate::cancel`].

use std::sync::atomic::{AtomicU64, Ordering};

use indicatif::{ProgressBar, ProgressStyle as IndicatifStyle};
use tracing::info;

/// Implementations should be thread-safe so progress can be reported from
/// worker threads independent of the caller driving the loop.
pub trait ProgressTracker: Send + Sync {
    fn set_message(&self, message: &str);
    fn increment(&self, amount: u64);
    fn set_length(&self, length: u64);
    fn position(&self) -> u64;
    fn finish_with_message(&self, message: &str);
}

/// No-op tracker for quiet/scripted invocations.
#[derive(Debug, Default)]
pub struct SilentProgress {
    position: AtomicU64,
    length: AtomicU64,
}

impl SilentProgress {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressTracker for SilentProgress {
    fn set_message(&self, _message: &str) {}

    fn increment(&self, amount: u64) {
        self.position.fetch_add(amount, Ordering::Relaxed);
    }

    fn set_length(&self, length: u64) {
        self.length.store(length, Ordering::Relaxed);
    }

    fn position(&self) -> u64 {
        self.position.load(Ordering::Relaxed)
    }

    fn finish_with_message(&self, _message: &str) {}
}

/// Logs progress to `tracing` at roughly ten evenly-spaced intervals.
/// Useful for non-interactive invocations where a progress bar is not
/// appropriate but operators still want evidence the scan is advancing.
#[derive(Debug)]
pub struct LogProgress {
    name: String,
    position: AtomicU64,
    length: AtomicU64,
    log_interval: u64,
}

impl LogProgress {
    pub fn new(name: impl Into<String>, length: u64) -> Self {
        Self {
            name: name.into(),
            position: AtomicU64::new(0),
            length: AtomicU64::new(length),
            log_interval: std::cmp::max(1, length / 10),
        }
    }
}

impl ProgressTracker for LogProgress {
    fn set_message(&self, message: &str) {
        info!("{}: {}", self.name, message);
    }

    fn increment(&self, amount: u64) {
        let old_pos = self.position.fetch_add(amount, Ordering::Relaxed);
        let new_pos = old_pos + amount;
        let length = self.length.load(Ordering::Relaxed);
        if length > 0 {
            let old_interval = old_pos / self.log_interval;
            let new_interval = new_pos / self.log_interval;
            if new_interval > old_interval {
                let percent = (new_pos * 100) / length;
                info!("{}: {}% ({}/{})", self.name, percent, new_pos, length);
            }
        }
    }

    fn set_length(&self, length: u64) {
        self.length.store(length, Ordering::Relaxed);
    }

    fn position(&self) -> u64 {
        self.position.load(Ordering::Relaxed)
    }

    fn finish_with_message(&self, message: &str) {
        info!("{}: {}", self.name, message);
    }
}

/// Visual progress bar for interactive CLI use, backed by `indicatif`.
pub struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    pub fn new(message: impl Into<String>, length: u64) -> Self {
        let bar = ProgressBar::new(length);
        bar.set_style(
            IndicatifStyle::with_template(
                "{msg} [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
            )
            .unwrap_or_else(|_| IndicatifStyle::default_bar()),
        );
        bar.set_message(message.into());
        Self { bar }
    }
}

impl ProgressTracker for CliProgress {
    fn set_message(&self, message: &str) {
        self.bar.set_message(message.to_string());
    }

    fn increment(&self, amount: u64) {
        self.bar.inc(amount);
    }

    fn set_length(&self, length: u64) {
        self.bar.set_length(length);
    }

    fn position(&self) -> u64 {
        self.bar.position()
    }

    fn finish_with_message(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silent_progress_tracks_position_without_output() {
        let progress = SilentProgress::new();
        progress.set_length(100);
        progress.increment(10);
        assert_eq!(progress.position(), 10);
        progress.finish_with_message("done");
    }

    #[test]
    fn log_progress_tracks_position() {
        let progress = LogProgress::new("scan", 100);
        progress.increment(25);
        assert_eq!(progress.position(), 25);
        progress.increment(25);
        assert_eq!(progress.position(), 50);
    }
}
