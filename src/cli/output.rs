//! Output formatting and progress indicators
//!
//! This module provides utilities for displaying progress bars and formatted
//! messages to the user.

use indicatif::{ProgressBar, ProgressStyle};

use crate::core::events::{Boundary, EventSink, PhaseEvent, PHASE_COMPILE, PHASE_RUN};

/// Create a progress bar for package builds
pub fn create_build_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} packages ({msg})")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▓▒░");
    pb.set_style(style);
    pb
}

/// Progress bar driven by phase events
///
/// The bar advances when a package's build finishes, successfully or not, and
/// shows the package most recently started.
#[derive(Debug, Clone)]
pub struct ProgressSink {
    bar: ProgressBar,
}

impl ProgressSink {
    pub fn new(bar: ProgressBar) -> Self {
        Self { bar }
    }

    pub fn bar(&self) -> &ProgressBar {
        &self.bar
    }
}

impl EventSink for ProgressSink {
    fn emit(&self, event: PhaseEvent) {
        let Some(package) = &event.package else {
            return;
        };
        match (event.phase, event.boundary) {
            (PHASE_RUN, Boundary::Start) => self.bar.set_message(package.to_string()),
            (PHASE_COMPILE, Boundary::Done) => self.bar.inc(1),
            _ => {}
        }
    }
}

/// Print an error and its causes to stderr
pub fn display_error(error: &anyhow::Error) {
    eprintln!("{} Error: {error}", status::ERROR);
    for cause in error.chain().skip(1) {
        eprintln!("  Caused by: {cause}");
    }
}

/// Status message prefixes
pub mod status {
    /// Success prefix (green checkmark)
    pub const SUCCESS: &str = "✓";

    /// Error prefix (red X)
    pub const ERROR: &str = "✗";

    /// Warning prefix (yellow triangle)
    pub const WARNING: &str = "⚠";

    /// Info prefix (blue circle)
    pub const INFO: &str = "ℹ";
}
