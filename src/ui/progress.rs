//! Spinners and download progress with CI fallback

use super::context::UiContext;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Instant;

/// A task spinner that prints plain step lines in CI
pub struct TaskSpinner {
    spinner: Option<cliclack::ProgressBar>,
    interactive: bool,
    started: Instant,
}

impl TaskSpinner {
    pub fn new(ctx: &UiContext) -> Self {
        Self {
            spinner: None,
            interactive: ctx.use_fancy_output(),
            started: Instant::now(),
        }
    }

    /// Start the spinner with a message
    pub fn start(&mut self, message: &str) {
        self.started = Instant::now();

        if self.interactive {
            let spinner = cliclack::spinner();
            spinner.start(message);
            self.spinner = Some(spinner);
        } else {
            println!("{} {}", style("...").dim(), message);
        }
    }

    /// Stop with a success message, annotated with the elapsed time
    pub fn stop(&mut self, message: &str) {
        let timed = format!("{} ({:.1}s)", message, self.started.elapsed().as_secs_f32());
        if let Some(spinner) = self.spinner.take() {
            spinner.stop(&timed);
        } else if self.interactive {
            println!("{} {}", style("✓").green(), timed);
        } else {
            println!("{} {}", style("[OK]").green(), timed);
        }
    }

    /// Stop with an error message
    pub fn stop_error(&mut self, message: &str) {
        if let Some(spinner) = self.spinner.take() {
            spinner.error(message);
        } else if self.interactive {
            println!("{} {}", style("✗").red(), message);
        } else {
            println!("{} {}", style("[FAIL]").red(), message);
        }
    }
}

/// Byte progress for an archive download
///
/// Shows an indicatif bar in interactive mode; in CI it stays silent
/// between the start and finish lines the caller logs, since progress
/// spam is useless in a captured log.
pub struct DownloadProgress {
    bar: Option<ProgressBar>,
}

impl DownloadProgress {
    /// Create a progress indicator for `total` bytes, if known
    pub fn new(ctx: &UiContext, label: &str, total: Option<u64>) -> Self {
        let bar = if ctx.use_fancy_output() {
            let bar = match total {
                Some(len) => {
                    let bar = ProgressBar::new(len);
                    bar.set_style(
                        ProgressStyle::default_bar()
                            .template(
                                "  {spinner:.cyan} {prefix}  {bar:20.cyan/dim} {bytes}/{total_bytes} {elapsed:.dim}",
                            )
                            .unwrap()
                            .progress_chars("━╸─"),
                    );
                    bar
                }
                None => {
                    let bar = ProgressBar::new_spinner();
                    bar.set_style(
                        ProgressStyle::default_spinner()
                            .template("  {spinner:.cyan} {prefix}  {bytes} {elapsed:.dim}")
                            .unwrap(),
                    );
                    bar
                }
            };
            bar.set_prefix(label.to_string());
            bar.enable_steady_tick(std::time::Duration::from_millis(120));
            Some(bar)
        } else {
            None
        };
        Self { bar }
    }

    /// Account for another chunk of downloaded bytes
    pub fn on_chunk(&self, bytes: u64) {
        if let Some(ref bar) = self.bar {
            bar.inc(bytes);
        }
    }

    /// Finish and clear the bar
    pub fn finish(&self) {
        if let Some(ref bar) = self.bar {
            bar.disable_steady_tick();
            bar.finish_and_clear();
        }
    }
}
