//! # Progress Observers
//!
//! The orchestrator reports progress through [`LoadObserver`] instead of
//! printing. Three implementations ship with the crate:
//!
//! | Observer | Output |
//! |----------|--------|
//! | `()` | nothing |
//! | [`LogProgress`] | a `tracing` line every N batches and at each commit |
//! | [`BarProgress`] | an `indicatif` bar, for interactive terminals |
//!
//! Observers only watch. They cannot fail or alter the run.

use std::time::Duration;

use indicatif::{HumanDuration, ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::info;

/// A flush point the orchestrator just passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CommitEvent {
    /// Zero-based index of the last batch covered by this commit.
    pub after_batch: usize,
    /// Rows durable so far, including this commit.
    pub rows_committed: u64,
    /// Whether this is the unconditional commit after the last batch.
    pub is_final: bool,
}

/// Receives progress from a running load.
pub trait LoadObserver {
    /// Called after batch `current` of `total` has been loaded (1-based).
    fn report(&mut self, current: usize, total: usize);

    /// Called after each successful commit.
    fn committed(&mut self, _event: &CommitEvent) {}

    /// Called once when the run ends, successfully or not.
    fn finished(&mut self, _succeeded: bool, _elapsed: Duration) {}
}

impl LoadObserver for () {
    fn report(&mut self, _current: usize, _total: usize) {}
}

impl<O: LoadObserver + ?Sized> LoadObserver for &mut O {
    fn report(&mut self, current: usize, total: usize) {
        (**self).report(current, total);
    }

    fn committed(&mut self, event: &CommitEvent) {
        (**self).committed(event);
    }

    fn finished(&mut self, succeeded: bool, elapsed: Duration) {
        (**self).finished(succeeded, elapsed);
    }
}

// =============================================================================
// LogProgress
// =============================================================================

/// Logs progress through `tracing`, for non-interactive runs.
#[derive(Debug, Clone)]
pub struct LogProgress {
    every: usize,
}

impl LogProgress {
    /// Logs every `every` batches (and always on the last one).
    pub fn every(every: usize) -> Self {
        Self {
            every: every.max(1),
        }
    }
}

impl Default for LogProgress {
    fn default() -> Self {
        Self::every(10)
    }
}

impl LoadObserver for LogProgress {
    fn report(&mut self, current: usize, total: usize) {
        if current % self.every == 0 || current == total {
            let percent = current as f64 * 100.0 / total.max(1) as f64;
            info!(current, total, "inserted batch {current}/{total} ({percent:.1}%)");
        }
    }

    fn committed(&mut self, event: &CommitEvent) {
        info!(
            after_batch = event.after_batch,
            rows = event.rows_committed,
            is_final = event.is_final,
            "committed"
        );
    }

    fn finished(&mut self, succeeded: bool, elapsed: Duration) {
        info!(succeeded, elapsed = %HumanDuration(elapsed), "load finished");
    }
}

// =============================================================================
// BarProgress
// =============================================================================

/// An `indicatif` progress bar over batches.
pub struct BarProgress {
    bar: Option<ProgressBar>,
}

impl BarProgress {
    pub fn new() -> Self {
        Self { bar: None }
    }

    /// A bar that draws nowhere, for tests.
    pub fn hidden() -> Self {
        Self {
            bar: Some(ProgressBar::hidden()),
        }
    }

    fn bar(&mut self, total: usize) -> &ProgressBar {
        self.bar.get_or_insert_with(|| {
            let bar = ProgressBar::new(total as u64);
            let style = ProgressStyle::with_template(
                "  Inserting batches {bar:40.cyan/blue} {pos}/{len} [{elapsed_precise}, ETA {eta_precise}] {msg}",
            )
            .map(|s| s.progress_chars("##-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
            bar.set_style(style);
            bar
        })
    }

    /// Current bar position, if the bar has been created.
    pub fn position(&self) -> Option<u64> {
        self.bar.as_ref().map(ProgressBar::position)
    }
}

impl Default for BarProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadObserver for BarProgress {
    fn report(&mut self, current: usize, total: usize) {
        let bar = self.bar(total);
        bar.set_length(total as u64);
        bar.set_position(current as u64);
    }

    fn committed(&mut self, event: &CommitEvent) {
        if let Some(bar) = &self.bar {
            bar.set_message(format!("{} rows committed", event.rows_committed));
        }
    }

    fn finished(&mut self, succeeded: bool, _elapsed: Duration) {
        if let Some(bar) = self.bar.take() {
            if succeeded {
                bar.finish();
            } else {
                bar.abandon_with_message("aborted");
            }
        }
    }
}
