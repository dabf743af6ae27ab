//! Progress reporting for scan runs.
//!
//! The pipeline never pushes per-file updates at observers. It keeps exact
//! counters internally and a sampler thread hands a [`ProgressSnapshot`] to
//! every [`ProgressObserver`] at a bounded cadence (20ms by default), so a
//! slow consumer such as a terminal never sees more updates than it can draw.
//!
//! [`ScanProgressBar`] is the indicatif-backed observer used by the CLI.
//!
//! # Accessible Mode
//!
//! When accessible mode is enabled the spinner animation is replaced by a
//! plain text line and the redraw rate is lowered.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use crate::pipeline::ScanState;

/// Point-in-time view of a running scan.
///
/// Counts are monotonically non-decreasing within a run and start at zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    /// Files reported by the walkers so far
    pub files_discovered: u64,
    /// Files whose hash completed so far
    pub files_hashed: u64,
    /// Path of the most recently completed hash
    pub last_hashed_path: Option<PathBuf>,
}

/// Receives sampled progress and state transitions from a scan pipeline.
///
/// Implement this trait to drive a UI from a scan. Calls come from the
/// pipeline's sampler thread (progress) and the scan thread (state).
pub trait ProgressObserver: Send + Sync {
    /// Called on every state transition of the run.
    fn on_state(&self, _state: ScanState) {}

    /// Called with the latest progress, at most once per sampling interval.
    fn on_progress(&self, snapshot: &ProgressSnapshot);
}

/// Terminal progress reporter using indicatif.
pub struct ScanProgressBar {
    bar: Mutex<Option<ProgressBar>>,
    quiet: bool,
    accessible: bool,
}

impl ScanProgressBar {
    /// Create a new progress reporter.
    ///
    /// # Examples
    ///
    /// ```
    /// use dupetree::progress::ScanProgressBar;
    ///
    /// let progress = ScanProgressBar::new(false);
    /// ```
    #[must_use]
    pub fn new(quiet: bool) -> Self {
        Self::with_accessible(quiet, false)
    }

    /// Create a new progress reporter with accessible mode.
    #[must_use]
    pub fn with_accessible(quiet: bool, accessible: bool) -> Self {
        Self {
            bar: Mutex::new(None),
            quiet,
            accessible,
        }
    }

    fn style(&self) -> ProgressStyle {
        if self.accessible {
            ProgressStyle::with_template("[{elapsed_precise}] {prefix} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
        } else {
            ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {prefix} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
        }
    }

    fn with_bar(&self, f: impl FnOnce(&ProgressBar)) {
        let guard = self.bar.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(ref bar) = *guard {
            f(bar);
        }
    }
}

impl ProgressObserver for ScanProgressBar {
    fn on_state(&self, state: ScanState) {
        if self.quiet {
            return;
        }

        let mut guard = self.bar.lock().unwrap_or_else(PoisonError::into_inner);
        match state {
            ScanState::Idle => {}
            ScanState::Clearing => {
                let bar = ProgressBar::new_spinner();
                bar.set_style(self.style());
                bar.set_prefix("Clearing previous results");
                let tick = if self.accessible { 500 } else { 100 };
                bar.enable_steady_tick(Duration::from_millis(tick));
                *guard = Some(bar);
            }
            ScanState::Discovering => {
                if let Some(ref bar) = *guard {
                    bar.set_prefix("Scanning");
                }
            }
            ScanState::Completed | ScanState::Canceled | ScanState::Failed => {
                if let Some(bar) = guard.take() {
                    bar.finish_with_message(format!("Scan {}", state));
                }
            }
        }
    }

    fn on_progress(&self, snapshot: &ProgressSnapshot) {
        if self.quiet {
            return;
        }

        let last = snapshot
            .last_hashed_path
            .as_deref()
            .map(|p| truncate_path(p, 40))
            .unwrap_or_default();
        let message = format!(
            "{} discovered, {} hashed {}",
            snapshot.files_discovered, snapshot.files_hashed, last
        );

        self.with_bar(|bar| {
            bar.set_position(snapshot.files_hashed);
            bar.set_message(message);
        });
    }
}

/// Truncate a path for display in the progress bar.
fn truncate_path(path: &Path, max_len: usize) -> String {
    let full = path.to_string_lossy();
    if full.chars().count() <= max_len {
        return full.into_owned();
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let name_len = file_name.chars().count();
    if name_len + 4 > max_len {
        let tail: String = file_name
            .chars()
            .skip(name_len.saturating_sub(max_len.saturating_sub(3)))
            .collect();
        return format!("...{}", tail);
    }

    format!(".../{}", file_name)
}
