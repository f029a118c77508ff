//! Progress bars for long-running categories.
//!
//! Every category that loops over AOI geometries gets one bar with a
//! message such as `Getting forcing from Daymet`. Bars are drawn on
//! stderr through a shared [`MultiProgress`], so concurrent categories do
//! not overwrite each other. When hidden (quiet runs, redirected stderr,
//! tests) the bars still count but draw nothing.

use std::io::IsTerminal;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

const BAR_TEMPLATE: &str = "{spinner} {msg} [{bar:30}] {pos}/{len} ({elapsed})";

/// Shared progress display.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    multi: MultiProgress,
    visible: bool,
}

impl ProgressReporter {
    /// Creates a reporter drawing on stderr unless `quiet` is set or
    /// stderr is not a terminal.
    #[must_use]
    pub fn new(quiet: bool) -> Self {
        if quiet || !std::io::stderr().is_terminal() {
            return Self::hidden();
        }
        Self {
            multi: MultiProgress::with_draw_target(ProgressDrawTarget::stderr()),
            visible: true,
        }
    }

    /// A reporter that never draws.
    #[must_use]
    pub fn hidden() -> Self {
        Self {
            multi: MultiProgress::with_draw_target(ProgressDrawTarget::hidden()),
            visible: false,
        }
    }

    /// Returns true when bars are drawn.
    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Starts a bar of `total` steps labelled `message`.
    #[must_use]
    pub fn start(&self, message: impl Into<String>, total: usize) -> CategoryProgress {
        let bar = self.multi.add(ProgressBar::new(total as u64));
        bar.set_style(
            ProgressStyle::with_template(BAR_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        bar.set_message(message.into());
        if self.visible {
            bar.enable_steady_tick(Duration::from_millis(120));
        }
        CategoryProgress { bar }
    }

    /// Prints a line above the bars (or nothing when hidden).
    pub fn println(&self, line: impl AsRef<str>) {
        if self.visible {
            let _ = self.multi.println(line);
        }
    }
}

/// One category's bar. Cleared on drop if not finished.
#[derive(Debug)]
pub struct CategoryProgress {
    bar: ProgressBar,
}

impl CategoryProgress {
    /// Marks one geometry as done.
    pub fn inc(&self) {
        self.bar.inc(1);
    }

    /// Steps completed so far.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    /// Leaves the bar drawn at its final position.
    pub fn finish(self) {
        self.bar.finish();
    }
}

impl Drop for CategoryProgress {
    fn drop(&mut self) {
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }
}
